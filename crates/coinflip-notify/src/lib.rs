pub mod bus;
pub mod events;

pub use bus::{InMemoryNotificationBus, NotificationBus, UserFilteredReceiver};
pub use events::NotificationEvent;
