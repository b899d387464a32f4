//! The per-action bet state machine (SPEC_FULL §4.2): atomic
//! compare-and-set conditional transitions over the seven-state lifecycle.
//! Every public method here returns `Ok(None)` — not an error — when the
//! row wasn't in the expected prior state; that's the race-arbiter
//! contract the spec requires (§8 invariant 1).

use coinflip_core::error::CoordinatorError;
use coinflip_core::types::{
    is_valid_transition, Amount, Bet, BetId, BetStatus, CoinSide, Commitment, Secret, TxHash,
    UserId,
};
use tracing::warn;

use crate::db::StateDb;

pub struct BetStateMachine<'a> {
    db: &'a StateDb,
}

impl<'a> BetStateMachine<'a> {
    pub fn new(db: &'a StateDb) -> Self {
        Self { db }
    }

    /// Insert a freshly chain-confirmed bet row at status `open`. Called by
    /// the create-bet background task once the chain assigns (or the
    /// orphan id placeholder stands in for) the bet id.
    #[allow(clippy::too_many_arguments)]
    pub fn create_bet(
        &self,
        bet_id: BetId,
        maker: UserId,
        amount: Amount,
        commitment: Commitment,
        txhash: TxHash,
        side: Option<CoinSide>,
        secret: Option<Secret>,
        created_time: i64,
    ) -> Result<Bet, CoordinatorError> {
        let bet = Bet {
            bet_id,
            maker_user_id: maker,
            acceptor_user_id: None,
            amount,
            commitment,
            maker_side: side,
            maker_secret: secret,
            acceptor_guess: None,
            winner_user_id: None,
            payout_amount: None,
            commission_amount: None,
            status: BetStatus::Open,
            created_time,
            accepted_time: None,
            resolved_time: None,
            txhash_create: txhash.clone(),
            txhash_accept: None,
            txhash_resolve: None,
        };
        self.db.put_bet(&bet)?;
        self.db.link_txhash_to_bet(&txhash, bet_id)?;
        Ok(bet)
    }

    /// `open -> accepting`, conditional on the current status being `open`.
    /// The race-winner arbiter among concurrent acceptors (§4.2).
    pub fn mark_accepting(
        &self,
        bet_id: BetId,
        acceptor: UserId,
        guess: CoinSide,
    ) -> Result<Option<Bet>, CoordinatorError> {
        self.try_transition(bet_id, |bet| {
            if bet.status != BetStatus::Open {
                return None;
            }
            let mut next = bet.clone();
            next.status = BetStatus::Accepting;
            next.acceptor_user_id = Some(acceptor);
            next.acceptor_guess = Some(guess);
            Some(next)
        })
    }

    /// `accepting -> open`, clearing acceptor fields. Used when a later
    /// step in the optimistic accept flow fails.
    pub fn revert_accepting(&self, bet_id: BetId) -> Result<Option<Bet>, CoordinatorError> {
        self.try_transition(bet_id, |bet| {
            if bet.status != BetStatus::Accepting {
                return None;
            }
            let mut next = bet.clone();
            next.status = BetStatus::Open;
            next.acceptor_user_id = None;
            next.acceptor_guess = None;
            next.txhash_accept = None;
            Some(next)
        })
    }

    /// `open -> canceling`.
    pub fn mark_canceling(&self, bet_id: BetId) -> Result<Option<Bet>, CoordinatorError> {
        self.try_transition(bet_id, |bet| {
            if bet.status != BetStatus::Open {
                return None;
            }
            let mut next = bet.clone();
            next.status = BetStatus::Canceling;
            Some(next)
        })
    }

    /// `open|canceling -> canceled`.
    pub fn cancel(&self, bet_id: BetId, txhash: Option<TxHash>) -> Result<Option<Bet>, CoordinatorError> {
        self.try_transition(bet_id, |bet| {
            if !matches!(bet.status, BetStatus::Open | BetStatus::Canceling) {
                return None;
            }
            let mut next = bet.clone();
            next.status = BetStatus::Canceled;
            if txhash.is_some() {
                next.txhash_resolve = txhash.clone();
            }
            Some(next)
        })
    }

    /// `accepted|accepting -> revealed|timeout_claimed`.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve(
        &self,
        bet_id: BetId,
        winner: UserId,
        payout: Amount,
        commission: Amount,
        txhash: TxHash,
        status: BetStatus,
        resolved_time: i64,
    ) -> Result<Option<Bet>, CoordinatorError> {
        if !matches!(status, BetStatus::Revealed | BetStatus::TimeoutClaimed) {
            return Err(CoordinatorError::Other(
                "resolve() requires a terminal settlement status".into(),
            ));
        }
        self.try_transition(bet_id, |bet| {
            if !matches!(bet.status, BetStatus::Accepted | BetStatus::Accepting) {
                return None;
            }
            let mut next = bet.clone();
            next.status = status;
            next.winner_user_id = Some(winner);
            next.payout_amount = Some(payout.clone());
            next.commission_amount = Some(commission.clone());
            next.txhash_resolve = Some(txhash.clone());
            next.resolved_time = Some(resolved_time);
            Some(next)
        })
    }

    /// `open|accepting -> accepted`, driven by a confirmed `bet_accepted`
    /// chain event (SPEC_FULL §4.4 projection table). Distinct from
    /// `mark_accepting`: this is the chain's own truth arriving, so it
    /// accepts either prior state rather than the local optimistic-flow
    /// table — a bet whose local `mark_accepting` lost the race (or was
    /// never attempted, e.g. after a crash) still lands in `accepted` once
    /// the chain confirms it.
    #[allow(clippy::too_many_arguments)]
    pub fn mark_accepted_from_event(
        &self,
        bet_id: BetId,
        acceptor: UserId,
        guess: CoinSide,
        txhash: TxHash,
        accepted_time: i64,
    ) -> Result<Option<Bet>, CoordinatorError> {
        self.try_transition(bet_id, |bet| {
            if !matches!(bet.status, BetStatus::Open | BetStatus::Accepting) {
                return None;
            }
            let mut next = bet.clone();
            next.status = BetStatus::Accepted;
            next.acceptor_user_id = Some(acceptor);
            next.acceptor_guess = Some(guess);
            next.txhash_accept = Some(txhash.clone());
            next.accepted_time = Some(accepted_time);
            Some(next)
        })
    }

    /// `open|canceling -> canceled`, driven by a confirmed `bet_canceled`
    /// chain event. Conditional on the same prior states as the
    /// request-path `cancel`, so a duplicate or late-arriving event is
    /// harmless (SPEC_FULL §4.4 "all projections use conditional updates").
    pub fn mark_canceled_from_event(
        &self,
        bet_id: BetId,
        txhash: TxHash,
    ) -> Result<Option<Bet>, CoordinatorError> {
        self.try_transition(bet_id, |bet| {
            if !matches!(bet.status, BetStatus::Open | BetStatus::Canceling) {
                return None;
            }
            let mut next = bet.clone();
            next.status = BetStatus::Canceled;
            next.txhash_resolve = Some(txhash.clone());
            Some(next)
        })
    }

    /// Generic conditional update used by indexer projection. Validates the
    /// transition table unless `force` is set — only the indexer's event
    /// projection and startup reconciliation may force.
    pub fn update_status(
        &self,
        bet_id: BetId,
        to: BetStatus,
        force: bool,
    ) -> Result<Option<Bet>, CoordinatorError> {
        self.try_transition(bet_id, |bet| {
            if !force && !is_valid_transition(bet.status, to) {
                warn!(bet_id = bet_id.0, from = bet.status.as_str(), to = to.as_str(), "illegal transition rejected");
                return None;
            }
            let mut next = bet.clone();
            next.status = to;
            Some(next)
        })
    }

    /// Unconditional force-apply, used only by startup reconciliation
    /// (SPEC_FULL §4.4: "this is the only path that uses force"). `mutate`
    /// receives the current row and returns the row to persist — no
    /// precondition is checked, since the chain is the authority calling
    /// the shots here, not a competing local writer.
    pub fn force_apply_chain_state(
        &self,
        bet_id: BetId,
        mutate: impl Fn(&Bet) -> Bet,
    ) -> Result<Option<Bet>, CoordinatorError> {
        self.try_transition(bet_id, |bet| Some(mutate(bet)))
    }

    /// Read-modify-CAS-write loop: reads the current row, asks `f` whether
    /// and how to transform it, and retries the compare-and-swap on
    /// contention. Returns `Ok(None)` if `f` declines (row not in the
    /// expected state) or if the row doesn't exist.
    fn try_transition(
        &self,
        bet_id: BetId,
        f: impl Fn(&Bet) -> Option<Bet>,
    ) -> Result<Option<Bet>, CoordinatorError> {
        loop {
            let Some(raw) = self.db.get_bet_raw(bet_id)? else {
                return Ok(None);
            };
            let current: Bet = bincode::deserialize(&raw).map_err(|e| {
                CoordinatorError::Serialization(e.to_string())
            })?;
            let Some(next) = f(&current) else {
                return Ok(None);
            };
            if self.db.cas_bet(bet_id, Some(&raw), &next)? {
                return Ok(Some(next));
            }
            // Lost the CAS race to a concurrent writer; retry against the
            // fresh row rather than surfacing a spurious failure, unless
            // the fresh row is no longer in the state `f` expects — in
            // which case the next loop iteration's `f(&current)` call
            // will correctly return `None`.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coinflip_core::types::Amount;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_db() -> StateDb {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("coinflip_state_test_{n}_{}", std::process::id()));
        StateDb::open(&dir).unwrap()
    }

    fn sample_bet(db: &StateDb, id: u64) -> Bet {
        let sm = BetStateMachine::new(db);
        sm.create_bet(
            BetId(id),
            UserId(1),
            Amount::from(100u32),
            Commitment([0u8; 32]),
            TxHash([1u8; 32]),
            Some(CoinSide::Heads),
            Some(Secret([2u8; 32])),
            1_000,
        )
        .unwrap()
    }

    #[test]
    fn mark_accepting_only_succeeds_once() {
        let db = temp_db();
        let bet = sample_bet(&db, 1);
        let sm = BetStateMachine::new(&db);

        let first = sm.mark_accepting(bet.bet_id, UserId(2), CoinSide::Tails).unwrap();
        assert!(first.is_some());

        let second = sm.mark_accepting(bet.bet_id, UserId(3), CoinSide::Heads).unwrap();
        assert!(second.is_none(), "second acceptor must lose the race");
    }

    #[test]
    fn revert_accepting_clears_acceptor_fields() {
        let db = temp_db();
        let bet = sample_bet(&db, 2);
        let sm = BetStateMachine::new(&db);

        sm.mark_accepting(bet.bet_id, UserId(2), CoinSide::Tails).unwrap();
        let reverted = sm.revert_accepting(bet.bet_id).unwrap().unwrap();
        assert_eq!(reverted.status, BetStatus::Open);
        assert!(reverted.acceptor_user_id.is_none());
        assert!(reverted.acceptor_guess.is_none());
    }

    #[test]
    fn illegal_transition_rejected_without_force() {
        let db = temp_db();
        let bet = sample_bet(&db, 3);
        let sm = BetStateMachine::new(&db);

        let result = sm.update_status(bet.bet_id, BetStatus::Revealed, false).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn force_bypasses_validation() {
        let db = temp_db();
        let bet = sample_bet(&db, 4);
        let sm = BetStateMachine::new(&db);

        let result = sm.update_status(bet.bet_id, BetStatus::Revealed, true).unwrap();
        assert!(result.is_some());
    }

    #[test]
    fn cancel_from_open_or_canceling() {
        let db = temp_db();
        let bet = sample_bet(&db, 5);
        let sm = BetStateMachine::new(&db);
        let canceled = sm.cancel(bet.bet_id, None).unwrap().unwrap();
        assert_eq!(canceled.status, BetStatus::Canceled);
    }

    #[test]
    fn mark_accepted_from_event_applies_over_open_or_accepting() {
        let db = temp_db();
        let bet = sample_bet(&db, 6);
        let sm = BetStateMachine::new(&db);

        let accepted = sm
            .mark_accepted_from_event(bet.bet_id, UserId(9), CoinSide::Heads, TxHash([3u8; 32]), 2_000)
            .unwrap()
            .unwrap();
        assert_eq!(accepted.status, BetStatus::Accepted);
        assert_eq!(accepted.acceptor_user_id, Some(UserId(9)));
    }

    #[test]
    fn mark_accepted_from_event_is_idempotent() {
        let db = temp_db();
        let bet = sample_bet(&db, 7);
        let sm = BetStateMachine::new(&db);

        sm.mark_accepted_from_event(bet.bet_id, UserId(9), CoinSide::Heads, TxHash([3u8; 32]), 2_000)
            .unwrap();
        let second = sm
            .mark_accepted_from_event(bet.bet_id, UserId(9), CoinSide::Heads, TxHash([3u8; 32]), 2_000)
            .unwrap();
        assert!(second.is_none(), "replaying the same event must not re-apply");
    }

    #[test]
    fn mark_canceled_from_event_applies_over_open_or_canceling() {
        let db = temp_db();
        let bet = sample_bet(&db, 8);
        let sm = BetStateMachine::new(&db);

        let canceled = sm
            .mark_canceled_from_event(bet.bet_id, TxHash([4u8; 32]))
            .unwrap()
            .unwrap();
        assert_eq!(canceled.status, BetStatus::Canceled);
    }
}
