pub mod pending_lock;
pub mod vault;

pub use pending_lock::{LockId, PendingLockTable};
pub use vault::{EffectiveBalance, Vault};
