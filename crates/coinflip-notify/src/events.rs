//! Notification payloads (SPEC_FULL §2, §4.2). One variant per publish site
//! named in the spec: the optimistic accept flow's "bet accepting" and
//! revert notifications, the three targeted failure notifications, bet
//! settlement, and the operator-alert topic used by orphan escalation
//! (§4.4).

use coinflip_core::types::{Amount, BetId, TierId, UserId};
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// Published the instant `mark_accepting` wins the race, before the
    /// relayer submission even lands in the mempool.
    BetAccepting { bet_id: BetId, acceptor: UserId },
    /// Published when the optimistic accept is rolled back after a chain
    /// rejection, timeout, or any failure past the initial lock.
    AcceptReverted { bet_id: BetId, reason: String },
    BetCreateFailed { reason: String },
    AcceptFailed { bet_id: BetId, reason: String },
    CancelFailed { bet_id: BetId, reason: String },
    BetResolved {
        bet_id: BetId,
        winner: UserId,
        payout: Amount,
    },
    BetTimeoutClaimed { bet_id: BetId, winner: UserId },
    JackpotWon {
        tier_id: TierId,
        winner: UserId,
        amount: Amount,
    },
    /// Out-of-band operator channel, not client-facing. Used when
    /// `OrphanPolicy::Escalate` declines to guess at a bet's true state.
    OperatorAlert { message: String },
}

impl NotificationEvent {
    /// The user this event is addressed to, if any — client fan-out can use
    /// this to filter a shared broadcast stream down to a per-connection
    /// feed. `None` means the event has no single addressee (operator
    /// alerts, jackpot wins broadcast to all watchers).
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            NotificationEvent::BetAccepting { acceptor, .. } => Some(*acceptor),
            NotificationEvent::AcceptReverted { .. } => None,
            NotificationEvent::BetCreateFailed { .. } => None,
            NotificationEvent::AcceptFailed { .. } => None,
            NotificationEvent::CancelFailed { .. } => None,
            NotificationEvent::BetResolved { winner, .. } => Some(*winner),
            NotificationEvent::BetTimeoutClaimed { winner, .. } => Some(*winner),
            NotificationEvent::JackpotWon { winner, .. } => Some(*winner),
            NotificationEvent::OperatorAlert { .. } => None,
        }
    }

    pub fn is_operator_alert(&self) -> bool {
        matches!(self, NotificationEvent::OperatorAlert { .. })
    }
}
