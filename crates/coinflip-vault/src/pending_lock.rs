//! The ephemeral pending-lock table (SPEC_FULL §3 "PendingLock", §4.3). A
//! single process-wide, in-memory map — never a sled tree, since it exists
//! only to mask the latency between a local lock and the chain REST
//! surface reflecting it. Guarded by a synchronous mutex: every critical
//! section here is pure bookkeeping, never held across an `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use coinflip_core::types::Amount;

pub type LockId = u64;

#[derive(Clone, Debug)]
struct PendingLock {
    id: LockId,
    amount: Amount,
    inserted_at: Instant,
}

/// Process-wide pending-lock map, keyed by chain address. Must outlive
/// individual request handlers — held as a single shared `Arc` by the
/// vault (SPEC_FULL §9 "global singletons become injected collaborators").
pub struct PendingLockTable {
    next_id: AtomicU64,
    locks: Mutex<HashMap<String, Vec<PendingLock>>>,
    ttl: Duration,
}

impl PendingLockTable {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(coinflip_core::PENDING_LOCK_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            locks: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Register a new pending lock for `address`. Returns its id, used to
    /// remove it later (normal path) without waiting for TTL expiry.
    pub fn add(&self, address: &str, amount: Amount) -> LockId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut locks = self.locks.lock().unwrap();
        locks.entry(address.to_string()).or_default().push(PendingLock {
            id,
            amount,
            inserted_at: Instant::now(),
        });
        id
    }

    /// Remove a lock immediately by id, searching across all addresses
    /// (the caller usually knows the address too, but removal by id alone
    /// keeps the background task's bookkeeping simple).
    pub fn remove(&self, lock_id: LockId) {
        let mut locks = self.locks.lock().unwrap();
        for entries in locks.values_mut() {
            entries.retain(|l| l.id != lock_id);
        }
        locks.retain(|_, v| !v.is_empty());
    }

    /// Total pending-lock amount outstanding for `address`, after sweeping
    /// expired entries. Subtracted from the chain-reported available
    /// balance when reporting effective balance (SPEC_FULL §4.3).
    pub fn total(&self, address: &str) -> Amount {
        self.sweep_expired(address);
        let locks = self.locks.lock().unwrap();
        locks
            .get(address)
            .map(|entries| entries.iter().fold(Amount::from(0u8), |acc, l| acc + &l.amount))
            .unwrap_or_else(|| Amount::from(0u8))
    }

    /// Whether `address` currently has any outstanding pending locks, used
    /// by the chain-sync double-spend guard (§4.3).
    pub fn has_any(&self, address: &str) -> bool {
        self.sweep_expired(address);
        self.locks
            .lock()
            .unwrap()
            .get(address)
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }

    fn sweep_expired(&self, address: &str) {
        let mut locks = self.locks.lock().unwrap();
        if let Some(entries) = locks.get_mut(address) {
            let ttl = self.ttl;
            entries.retain(|l| l.inserted_at.elapsed() < ttl);
        }
    }
}

impl Default for PendingLockTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_total() {
        let table = PendingLockTable::new();
        table.add("addr1", Amount::from(100u32));
        table.add("addr1", Amount::from(50u32));
        assert_eq!(table.total("addr1"), Amount::from(150u32));
    }

    #[test]
    fn remove_by_id() {
        let table = PendingLockTable::new();
        let id = table.add("addr1", Amount::from(100u32));
        table.add("addr1", Amount::from(50u32));
        table.remove(id);
        assert_eq!(table.total("addr1"), Amount::from(50u32));
    }

    #[test]
    fn expiry_sweeps_old_entries() {
        let table = PendingLockTable::with_ttl(Duration::from_millis(10));
        table.add("addr1", Amount::from(100u32));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(table.total("addr1"), Amount::from(0u8));
    }

    #[test]
    fn unrelated_address_unaffected() {
        let table = PendingLockTable::new();
        table.add("addr1", Amount::from(100u32));
        assert_eq!(table.total("addr2"), Amount::from(0u8));
    }
}
