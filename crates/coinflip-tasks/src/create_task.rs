//! Create-bet background task (SPEC_FULL §4.2 "Create is special"). Inserts
//! the pending row under a placeholder id immediately so the indexer has
//! something to rewrite once `bet_created` confirms, then waits on the
//! submission's outcome.

use std::sync::Arc;

use coinflip_chain::ChainClient;
use coinflip_core::types::{Amount, BetId, CoinSide, Commitment, Secret, TxHash, UserId};
use coinflip_notify::{InMemoryNotificationBus, NotificationBus, NotificationEvent};
use coinflip_state::{BetStateMachine, StateDb};
use coinflip_vault::{LockId, Vault};
use tracing::{info, warn};

use crate::confirm::{poll_confirmation, ConfirmOutcome, PollWindow};

pub struct CreateBetTask<C: ChainClient> {
    pub chain: Arc<C>,
    pub db: Arc<StateDb>,
    pub vault: Arc<Vault>,
    pub notify: Arc<InMemoryNotificationBus>,
}

impl<C: ChainClient> CreateBetTask<C> {
    /// Run to completion. The caller (`coinflip-node`) wraps this in
    /// `tokio::spawn`; every fallible step here is matched and logged, not
    /// propagated, since a detached task has no one to return a `Result` to.
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        placeholder_id: BetId,
        maker: UserId,
        maker_address: String,
        amount: Amount,
        commitment: Commitment,
        side: CoinSide,
        secret: Secret,
        tx_hash: TxHash,
        lock_id: LockId,
        now: i64,
    ) {
        let sm = BetStateMachine::new(&self.db);
        if let Err(e) = sm.create_bet(
            placeholder_id,
            maker,
            amount.clone(),
            commitment,
            tx_hash.clone(),
            Some(side),
            Some(secret),
            now,
        ) {
            warn!(bet_id = placeholder_id.0, error = %e, "failed to insert pending create-bet row");
            return;
        }

        let tx_hash_str = tx_hash.to_hex();
        match poll_confirmation(self.chain.as_ref(), &tx_hash_str, PollWindow::Game).await {
            ConfirmOutcome::Confirmed => {
                info!(bet_id = placeholder_id.0, tx_hash = %tx_hash, "create-bet confirmed, deferring to indexer");
                self.vault.remove_pending_lock_delayed(
                    lock_id,
                    std::time::Duration::from_secs(coinflip_core::PENDING_LOCK_REMOVAL_DELAY_SECS),
                );
            }
            ConfirmOutcome::Rejected { raw_log } => {
                warn!(bet_id = placeholder_id.0, raw_log, "create-bet rejected by chain");
                if let Err(e) = sm.cancel(placeholder_id, None) {
                    warn!(bet_id = placeholder_id.0, error = %e, "failed to cancel rejected pending row");
                }
                self.vault.remove_pending_lock(lock_id);
                if let Err(e) = self.vault.unlock(maker, &amount) {
                    warn!(bet_id = placeholder_id.0, error = %e, "failed to unlock funds after create-bet rejection");
                }
                self.notify.publish(NotificationEvent::BetCreateFailed { reason: raw_log });
            }
            ConfirmOutcome::TimedOut => {
                warn!(
                    bet_id = placeholder_id.0,
                    address = maker_address,
                    "create-bet confirmation window exhausted, leaving pending row for reconciliation"
                );
            }
        }
    }
}
