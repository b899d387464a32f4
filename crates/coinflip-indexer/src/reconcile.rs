//! Startup reconciliation and the stuck-bet recovery sweep (SPEC_FULL §4.4,
//! §4.2 "recovery sweep"). Both walk non-terminal bets and compare the
//! mirror's status against the contract's own `bet` query, applying the
//! chain's answer with `force_apply_chain_state` — "the only path that uses
//! force" per the projection table's closing note.

use std::sync::Arc;

use coinflip_chain::ChainClient;
use coinflip_core::error::CoordinatorError;
use coinflip_core::types::{Bet, BetId, BetStatus, OrphanPolicy};
use coinflip_notify::{InMemoryNotificationBus, NotificationBus, NotificationEvent};
use coinflip_state::{BetStateMachine, StateDb};
use coinflip_vault::Vault;
use tracing::{info, warn};

use crate::projection::resolve_user;

/// Outcome of comparing the mirror against the chain's own `bet` query for
/// one non-terminal row, used by tests to assert the right branch ran.
#[derive(Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Chain's status matched the mirror's; nothing changed.
    Unchanged,
    /// Chain disagreed; the mirror was force-applied to match.
    Updated,
    /// Chain has no record of this bet id; orphan handling ran.
    Orphan,
}

pub struct Reconciler<C: ChainClient> {
    chain: Arc<C>,
    db: Arc<StateDb>,
    vault: Arc<Vault>,
    notify: Arc<InMemoryNotificationBus>,
    contract_addr: String,
    orphan_policy: OrphanPolicy,
}

impl<C: ChainClient> Reconciler<C> {
    pub fn new(
        chain: Arc<C>,
        db: Arc<StateDb>,
        vault: Arc<Vault>,
        notify: Arc<InMemoryNotificationBus>,
        contract_addr: String,
        orphan_policy: OrphanPolicy,
    ) -> Self {
        Self { chain, db, vault, notify, contract_addr, orphan_policy }
    }

    /// Run once at process startup, before the indexer's poll loop and
    /// before any request handler is allowed to serve traffic (SPEC_FULL
    /// §4.4 "runs once at startup, before serving any request").
    pub async fn reconcile_startup(&self) -> Result<(), CoordinatorError> {
        let bets = self.db.iter_non_terminal_bets()?;
        info!(count = bets.len(), "startup reconciliation: comparing non-terminal bets against chain");
        for bet in bets {
            if let Err(e) = self.reconcile_one(&bet).await {
                warn!(bet_id = bet.bet_id.0, error = %e, "reconciliation failed for bet, leaving as-is");
            }
        }
        Ok(())
    }

    /// Periodic recovery sweep: bets stuck in a transitional status
    /// (`accepting`/`canceling`) longer than `STUCK_TRANSITIONAL_THRESHOLD_SECS`
    /// are re-checked against the chain the same way startup reconciliation
    /// does (SPEC_FULL §4.2 "recovery sweep").
    pub async fn stuck_bet_sweep(&self, now: i64) -> Result<(), CoordinatorError> {
        let threshold = coinflip_core::STUCK_TRANSITIONAL_THRESHOLD_SECS as i64;
        let candidates = self
            .db
            .iter_bets_in_status(&[BetStatus::Accepting, BetStatus::Canceling])?;
        for bet in candidates {
            let stuck_since = bet.accepted_time.unwrap_or(bet.created_time);
            if now - stuck_since < threshold {
                continue;
            }
            if let Err(e) = self.reconcile_one(&bet).await {
                warn!(bet_id = bet.bet_id.0, error = %e, "stuck-bet sweep failed, will retry next tick");
            }
        }
        Ok(())
    }

    async fn reconcile_one(&self, bet: &Bet) -> Result<ReconcileOutcome, CoordinatorError> {
        let query = serde_json::json!({ "bet": { "bet_id": bet.bet_id.0 } });
        let response = self.chain.query_contract(&self.contract_addr, query).await?;

        if response.is_null() {
            return self.handle_orphan(bet).await;
        }

        let Some(chain_status) = response.get("status").and_then(|v| v.as_str()) else {
            return self.handle_orphan(bet).await;
        };
        let Some(parsed_status) = parse_contract_status(chain_status) else {
            warn!(bet_id = bet.bet_id.0, chain_status, "unrecognized contract status during reconciliation");
            return Ok(ReconcileOutcome::Unchanged);
        };

        let winner_addr = response.get("winner").and_then(|v| v.as_str());
        let acceptor_addr = response.get("acceptor").and_then(|v| v.as_str());
        let winner_user_id = winner_addr.map(|a| resolve_user(&self.db, a)).transpose()?;
        let acceptor_user_id = acceptor_addr.map(|a| resolve_user(&self.db, a)).transpose()?;

        if parsed_status.as_str() == bet.status.as_str() {
            // Status already agrees; still worth a pass to backfill an
            // acceptor/winner the chain knows about but a missed event left
            // blank locally (SPEC_FULL §4.4 "fill in missing acceptor/winner
            // if present").
            let missing_winner = winner_user_id.is_some() && bet.winner_user_id.is_none();
            let missing_acceptor = acceptor_user_id.is_some() && bet.acceptor_user_id.is_none();
            if !missing_winner && !missing_acceptor {
                return Ok(ReconcileOutcome::Unchanged);
            }
            let sm = BetStateMachine::new(&self.db);
            let filled = sm.force_apply_chain_state(bet.bet_id, |current| {
                let mut next = current.clone();
                if next.winner_user_id.is_none() {
                    next.winner_user_id = winner_user_id;
                }
                if next.acceptor_user_id.is_none() {
                    next.acceptor_user_id = acceptor_user_id;
                }
                next
            })?;
            return Ok(match filled {
                Some(_) => ReconcileOutcome::Updated,
                None => ReconcileOutcome::Unchanged,
            });
        }

        let sm = BetStateMachine::new(&self.db);
        let applied = sm.force_apply_chain_state(bet.bet_id, |current| {
            let mut next = current.clone();
            next.status = parsed_status;
            if winner_user_id.is_some() {
                next.winner_user_id = winner_user_id;
            }
            if acceptor_user_id.is_some() {
                next.acceptor_user_id = acceptor_user_id;
            }
            next
        })?;

        let Some(updated) = applied else {
            return Ok(ReconcileOutcome::Unchanged);
        };

        if updated.status.is_terminal() {
            self.release_funds(&updated);
        }

        info!(
            bet_id = bet.bet_id.0,
            from = bet.status.as_str(),
            to = updated.status.as_str(),
            winner = ?winner_addr,
            acceptor = ?acceptor_addr,
            "reconciliation force-applied chain status"
        );
        Ok(ReconcileOutcome::Updated)
    }

    async fn handle_orphan(&self, bet: &Bet) -> Result<ReconcileOutcome, CoordinatorError> {
        if bet.bet_id.is_placeholder() {
            if let Some(resolved) = self.resolve_placeholder(bet).await? {
                info!(old_id = bet.bet_id.0, new_id = resolved.0, "orphan placeholder resolved via open_bets listing");
                return Ok(ReconcileOutcome::Updated);
            }
        }

        match self.orphan_policy {
            OrphanPolicy::Cancel => {
                let sm = BetStateMachine::new(&self.db);
                if let Some(canceled) = sm.cancel(bet.bet_id, None)? {
                    self.release_funds(&canceled);
                    warn!(bet_id = bet.bet_id.0, "orphan bet canceled per OrphanPolicy::Cancel");
                }
            }
            OrphanPolicy::Escalate => {
                self.notify.publish(NotificationEvent::OperatorAlert {
                    message: format!(
                        "bet {} has no resolvable chain record; left in status {} pending operator review",
                        bet.bet_id,
                        bet.status.as_str()
                    ),
                });
                warn!(bet_id = bet.bet_id.0, "orphan bet escalated to operator per OrphanPolicy::Escalate");
            }
        }
        Ok(ReconcileOutcome::Orphan)
    }

    /// Search the contract's `open_bets` listing for a row whose commitment
    /// matches this placeholder row, and rewrite the id if found (SPEC_FULL
    /// §4.4 orphan resolution, only applicable while the real id was never
    /// learned — i.e. the create-bet task crashed before `bet_created`
    /// projected).
    async fn resolve_placeholder(&self, bet: &Bet) -> Result<Option<BetId>, CoordinatorError> {
        let query = serde_json::json!({ "open_bets": {} });
        let response = self.chain.query_contract(&self.contract_addr, query).await?;
        let Some(entries) = response.get("bets").and_then(|v| v.as_array()) else {
            return Ok(None);
        };

        for entry in entries {
            let Some(commitment_hex) = entry.get("commitment").and_then(|v| v.as_str()) else {
                continue;
            };
            if commitment_hex.eq_ignore_ascii_case(&bet.commitment.to_hex()) {
                let Some(chain_id) = entry.get("bet_id").and_then(|v| v.as_u64()) else {
                    continue;
                };
                let new_id = BetId(chain_id);
                self.db.rewrite_bet_id(bet.bet_id, new_id)?;
                return Ok(Some(new_id));
            }
        }
        Ok(None)
    }

    fn release_funds(&self, bet: &Bet) {
        if let Err(e) = self.vault.unlock(bet.maker_user_id, &bet.amount) {
            warn!(bet_id = bet.bet_id.0, error = %e, "failed to unlock maker funds during reconciliation");
        }
        if let Some(acceptor) = bet.acceptor_user_id {
            if let Err(e) = self.vault.unlock(acceptor, &bet.amount) {
                warn!(bet_id = bet.bet_id.0, error = %e, "failed to unlock acceptor funds during reconciliation");
            }
        }
    }
}

fn parse_contract_status(s: &str) -> Option<BetStatus> {
    match s {
        "open" => Some(BetStatus::Open),
        "accepting" => Some(BetStatus::Accepting),
        "accepted" => Some(BetStatus::Accepted),
        "canceling" => Some(BetStatus::Canceling),
        "canceled" => Some(BetStatus::Canceled),
        "revealed" => Some(BetStatus::Revealed),
        "timeout_claimed" => Some(BetStatus::TimeoutClaimed),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coinflip_chain::MockChainClient;
    use coinflip_core::types::{Amount, CoinSide, Commitment, Secret, TxHash, UserId};
    use coinflip_vault::PendingLockTable;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn harness() -> (Reconciler<MockChainClient>, Arc<MockChainClient>, Arc<StateDb>, Arc<Vault>) {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("coinflip_reconcile_test_{n}_{}", std::process::id()));
        let db = Arc::new(StateDb::open(&dir).unwrap());
        let vault = Arc::new(Vault::new(Arc::clone(&db), Arc::new(PendingLockTable::new())));
        let notify = Arc::new(InMemoryNotificationBus::new());
        let chain = Arc::new(MockChainClient::new());
        let reconciler = Reconciler::new(
            Arc::clone(&chain),
            Arc::clone(&db),
            Arc::clone(&vault),
            notify,
            "cosmos1contract".into(),
            OrphanPolicy::Escalate,
        );
        (reconciler, chain, db, vault)
    }

    fn seed_open_bet(db: &StateDb, id: u64, maker: UserId) -> Bet {
        let sm = BetStateMachine::new(db);
        sm.create_bet(
            BetId(id),
            maker,
            Amount::from(50u32),
            Commitment([7u8; 32]),
            TxHash([1u8; 32]),
            Some(CoinSide::Heads),
            Some(Secret([2u8; 32])),
            1_000,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn matching_status_is_unchanged() {
        let (reconciler, chain, db, _vault) = harness();
        let bet = seed_open_bet(&db, 1, UserId(1));
        chain.queue_contract_response(serde_json::json!({ "status": "open" }));

        let outcome = reconciler.reconcile_one(&bet).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Unchanged);
    }

    #[tokio::test]
    async fn matching_status_backfills_missing_acceptor() {
        let (reconciler, chain, db, _vault) = harness();
        let bet = seed_open_bet(&db, 10, UserId(1));
        chain.queue_contract_response(serde_json::json!({ "status": "open", "acceptor": "cosmos1acceptor" }));

        let outcome = reconciler.reconcile_one(&bet).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Updated);
        let updated = db.get_bet(bet.bet_id).unwrap().unwrap();
        assert_eq!(updated.acceptor_user_id, db.user_for_address("cosmos1acceptor").unwrap());
        assert_eq!(updated.status, BetStatus::Open);
    }

    #[tokio::test]
    async fn mismatched_status_force_applies_and_unlocks() {
        let (reconciler, chain, db, vault) = harness();
        let maker = UserId(1);
        vault.credit_available(maker, &Amount::from(50u32)).unwrap();
        vault.lock(maker, &Amount::from(50u32)).unwrap();
        let bet = seed_open_bet(&db, 2, maker);
        chain.queue_contract_response(serde_json::json!({ "status": "canceled" }));

        let outcome = reconciler.reconcile_one(&bet).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Updated);
        assert_eq!(vault.get_balance(maker).unwrap().locked, Amount::from(0u8));
    }

    #[tokio::test]
    async fn mismatched_status_writes_winner_and_acceptor() {
        let (reconciler, chain, db, vault) = harness();
        let maker = UserId(1);
        vault.credit_available(maker, &Amount::from(50u32)).unwrap();
        vault.lock(maker, &Amount::from(50u32)).unwrap();
        let bet = seed_open_bet(&db, 4, maker);
        chain.queue_contract_response(serde_json::json!({
            "status": "revealed",
            "winner": "cosmos1acceptor",
            "acceptor": "cosmos1acceptor",
        }));

        let outcome = reconciler.reconcile_one(&bet).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Updated);
        let updated = db.get_bet(bet.bet_id).unwrap().unwrap();
        assert_eq!(updated.status, BetStatus::Revealed);
        let acceptor_id = db.user_for_address("cosmos1acceptor").unwrap();
        assert_eq!(updated.winner_user_id, acceptor_id);
        assert_eq!(updated.acceptor_user_id, acceptor_id);
    }

    #[tokio::test]
    async fn missing_chain_record_escalates_by_default() {
        let (reconciler, chain, db, _vault) = harness();
        let bet = seed_open_bet(&db, 3, UserId(1));
        chain.queue_contract_response(serde_json::Value::Null);

        let outcome = reconciler.reconcile_one(&bet).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Orphan);
        // status is untouched under Escalate
        assert_eq!(db.get_bet(bet.bet_id).unwrap().unwrap().status, BetStatus::Open);
    }

    #[tokio::test]
    async fn placeholder_orphan_resolves_via_open_bets_listing() {
        let (reconciler, chain, db, _vault) = harness();
        let placeholder = BetId::placeholder(1_700_000_000_000);
        let sm = BetStateMachine::new(&db);
        sm.create_bet(
            placeholder,
            UserId(1),
            Amount::from(50u32),
            Commitment([9u8; 32]),
            TxHash([3u8; 32]),
            Some(CoinSide::Heads),
            Some(Secret([4u8; 32])),
            1_000,
        )
        .unwrap();
        let bet = db.get_bet(placeholder).unwrap().unwrap();

        chain.queue_contract_response(serde_json::Value::Null);
        chain.queue_contract_response(serde_json::json!({
            "bets": [{ "bet_id": 55, "commitment": Commitment([9u8; 32]).to_hex() }]
        }));

        let outcome = reconciler.reconcile_one(&bet).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Updated);
        assert!(db.get_bet(BetId(55)).unwrap().is_some());
        assert!(db.get_bet(placeholder).unwrap().is_none());
    }
}
