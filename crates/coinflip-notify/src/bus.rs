//! Minimal publish interface (SPEC_FULL §2): every component publishes
//! through this trait, WebSocket fan-out to connected clients lives outside
//! this crate. Grounded on the teacher's `mpsc`-channel handle shape in
//! `chronx-p2p::network::P2pHandle` (one sender shared by producers, one
//! receiver per consumer) — here widened to `tokio::sync::broadcast` since
//! more than one consumer needs its own independent copy of every event.

use coinflip_core::types::UserId;
use tokio::sync::broadcast;
use tracing::debug;

use crate::events::NotificationEvent;

/// Default channel capacity, matching `chronx-p2p`'s `mpsc::channel(256)`
/// sizing for its gossip send/receive handles.
const DEFAULT_CAPACITY: usize = 256;

pub trait NotificationBus: Send + Sync {
    /// Publish an event. Per the spec ("a failure in the notification bus
    /// is always non-fatal"), this never returns an error — a publish with
    /// no subscribers is simply dropped.
    fn publish(&self, event: NotificationEvent);

    /// Subscribe to the full event stream. Callers filter by
    /// `NotificationEvent::user_id()` for a per-connection feed.
    fn subscribe(&self) -> broadcast::Receiver<NotificationEvent>;
}

/// Single process-wide in-memory broadcast bus.
pub struct InMemoryNotificationBus {
    tx: broadcast::Sender<NotificationEvent>,
}

impl InMemoryNotificationBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Convenience for handlers that only care about one user's events.
    pub fn subscribe_user(&self, user: UserId) -> UserFilteredReceiver {
        UserFilteredReceiver {
            inner: self.tx.subscribe(),
            user,
        }
    }
}

impl Default for InMemoryNotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus for InMemoryNotificationBus {
    fn publish(&self, event: NotificationEvent) {
        // send() only errors when there are zero receivers; that is the
        // normal state between client connections, not a failure.
        if self.tx.send(event).is_err() {
            debug!("notification published with no active subscribers");
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.tx.subscribe()
    }
}

/// A subscription pre-filtered to one user's events plus broadcast-to-all
/// events (operator alerts excluded — those never reach a player feed).
pub struct UserFilteredReceiver {
    inner: broadcast::Receiver<NotificationEvent>,
    user: UserId,
}

impl UserFilteredReceiver {
    /// Waits for the next event addressed to this user, silently skipping
    /// everyone else's and any lagged-behind gap (`RecvError::Lagged`).
    pub async fn recv(&mut self) -> Option<NotificationEvent> {
        loop {
            match self.inner.recv().await {
                Ok(event) if event.is_operator_alert() => continue,
                Ok(event) if event.user_id().is_none() || event.user_id() == Some(self.user) => {
                    return Some(event)
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coinflip_core::types::{Amount, BetId};

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = InMemoryNotificationBus::new();
        bus.publish(NotificationEvent::OperatorAlert {
            message: "test".into(),
        });
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = InMemoryNotificationBus::new();
        let mut rx = bus.subscribe();
        bus.publish(NotificationEvent::BetAccepting {
            bet_id: BetId(1),
            acceptor: UserId(7),
        });
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, NotificationEvent::BetAccepting { .. }));
    }

    #[tokio::test]
    async fn user_filtered_receiver_skips_other_users_and_alerts() {
        let bus = InMemoryNotificationBus::new();
        let mut rx = bus.subscribe_user(UserId(1));

        bus.publish(NotificationEvent::BetResolved {
            bet_id: BetId(1),
            winner: UserId(2),
            payout: Amount::from(10u32),
        });
        bus.publish(NotificationEvent::OperatorAlert {
            message: "ignored".into(),
        });
        bus.publish(NotificationEvent::BetResolved {
            bet_id: BetId(2),
            winner: UserId(1),
            payout: Amount::from(20u32),
        });

        let event = rx.recv().await.unwrap();
        match event {
            NotificationEvent::BetResolved { bet_id, .. } => assert_eq!(bet_id, BetId(2)),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
