//! Accept-bet background task (SPEC_FULL §4.2). The handler has already won
//! the `mark_accepting` race and locked the acceptor's stake before this
//! task is spawned — it only waits on the submission's outcome.

use std::sync::Arc;

use coinflip_chain::ChainClient;
use coinflip_core::types::{Amount, BetId, UserId};
use coinflip_notify::{InMemoryNotificationBus, NotificationBus, NotificationEvent};
use coinflip_state::{BetStateMachine, StateDb};
use coinflip_vault::{LockId, Vault};
use tracing::{info, warn};

use crate::confirm::{poll_confirmation, ConfirmOutcome, PollWindow};

pub struct AcceptBetTask<C: ChainClient> {
    pub chain: Arc<C>,
    pub db: Arc<StateDb>,
    pub vault: Arc<Vault>,
    pub notify: Arc<InMemoryNotificationBus>,
}

impl<C: ChainClient> AcceptBetTask<C> {
    pub async fn run(
        &self,
        bet_id: BetId,
        acceptor: UserId,
        stake: Amount,
        tx_hash: String,
        lock_id: LockId,
    ) {
        let sm = BetStateMachine::new(&self.db);

        match poll_confirmation(self.chain.as_ref(), &tx_hash, PollWindow::Game).await {
            ConfirmOutcome::Confirmed => {
                info!(bet_id = bet_id.0, tx_hash, "accept-bet confirmed, deferring to indexer");
                self.vault.remove_pending_lock_delayed(
                    lock_id,
                    std::time::Duration::from_secs(coinflip_core::PENDING_LOCK_REMOVAL_DELAY_SECS),
                );
            }
            ConfirmOutcome::Rejected { raw_log } => {
                warn!(bet_id = bet_id.0, raw_log, "accept-bet rejected by chain");
                if let Err(e) = sm.revert_accepting(bet_id) {
                    warn!(bet_id = bet_id.0, error = %e, "failed to revert accepting state");
                }
                self.vault.remove_pending_lock(lock_id);
                if let Err(e) = self.vault.unlock(acceptor, &stake) {
                    warn!(bet_id = bet_id.0, error = %e, "failed to unlock stake after accept rejection");
                }
                self.notify.publish(NotificationEvent::AcceptFailed {
                    bet_id,
                    reason: raw_log,
                });
            }
            ConfirmOutcome::TimedOut => {
                warn!(
                    bet_id = bet_id.0,
                    "accept-bet confirmation window exhausted, leaving bet in accepting for recovery sweep"
                );
            }
        }
    }
}
