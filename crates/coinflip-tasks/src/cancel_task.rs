//! Cancel-bet background task (SPEC_FULL §4.2). The handler has already
//! transitioned the row to `canceling` before this task is spawned; unlike
//! create/accept, cancel does not register a new pending lock — it is
//! releasing funds already locked by the original create, which the
//! indexer's `bet_canceled` projection handles once confirmed.

use std::sync::Arc;

use coinflip_chain::ChainClient;
use coinflip_core::types::{BetId, BetStatus};
use coinflip_notify::{InMemoryNotificationBus, NotificationBus, NotificationEvent};
use coinflip_state::{BetStateMachine, StateDb};
use tracing::{info, warn};

use crate::confirm::{poll_confirmation, ConfirmOutcome, PollWindow};

pub struct CancelBetTask<C: ChainClient> {
    pub chain: Arc<C>,
    pub db: Arc<StateDb>,
    pub notify: Arc<InMemoryNotificationBus>,
}

impl<C: ChainClient> CancelBetTask<C> {
    pub async fn run(&self, bet_id: BetId, tx_hash: String) {
        let sm = BetStateMachine::new(&self.db);

        match poll_confirmation(self.chain.as_ref(), &tx_hash, PollWindow::Game).await {
            ConfirmOutcome::Confirmed => {
                info!(bet_id = bet_id.0, tx_hash, "cancel-bet confirmed, deferring to indexer");
            }
            ConfirmOutcome::Rejected { raw_log } => {
                warn!(bet_id = bet_id.0, raw_log, "cancel-bet rejected by chain");
                // canceling -> open is a valid transition, no dedicated
                // revert method needed.
                if let Err(e) = sm.update_status(bet_id, BetStatus::Open, false) {
                    warn!(bet_id = bet_id.0, error = %e, "failed to revert canceling state");
                }
                self.notify.publish(NotificationEvent::CancelFailed {
                    bet_id,
                    reason: raw_log,
                });
            }
            ConfirmOutcome::TimedOut => {
                warn!(
                    bet_id = bet_id.0,
                    "cancel-bet confirmation window exhausted, leaving bet in canceling for recovery sweep"
                );
            }
        }
    }
}
