pub mod balance;
pub mod bets;
pub mod db;
pub mod pools;

pub use balance::BalanceLedger;
pub use bets::BetStateMachine;
pub use db::StateDb;
pub use pools::PoolLedger;
