pub mod client;
pub mod mock;
pub mod types;

pub use client::{ChainClient, HttpChainClient};
pub use mock::MockChainClient;
pub use types::{BroadcastResult, ChainEvent, TxQueryResult};
