//! Mediates every mirror-balance mutation (SPEC_FULL §4.3). The single
//! `effective_balance` function lives here and nowhere else (§9 design
//! note) — both `get_balance` and any external-facing endpoint call
//! through it. Race-free mutation itself is delegated to
//! [`coinflip_state::BalanceLedger`]; this crate layers the pending-lock
//! mask and the chain-sync double-spend guard on top.

use std::sync::Arc;
use std::time::Duration;

use coinflip_core::error::CoordinatorError;
use coinflip_core::types::{Amount, UserId, VaultBalance};
use coinflip_state::{BalanceLedger, StateDb};
use tracing::debug;

use crate::pending_lock::{LockId, PendingLockTable};

fn zero() -> Amount {
    Amount::from(0u8)
}

/// What a balance-reporting endpoint actually shows a user: chain-mirror
/// figures net of pending locks and off-chain spend, with bonus covering
/// any spend overflow (SPEC_FULL §3 VaultBalance invariant, §4.3 contract).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EffectiveBalance {
    pub available: Amount,
    pub locked: Amount,
    pub total: Amount,
}

pub struct Vault {
    db: Arc<StateDb>,
    pending_locks: Arc<PendingLockTable>,
}

impl Vault {
    pub fn new(db: Arc<StateDb>, pending_locks: Arc<PendingLockTable>) -> Self {
        Self { db, pending_locks }
    }

    pub fn pending_locks(&self) -> &Arc<PendingLockTable> {
        &self.pending_locks
    }

    fn ledger(&self) -> BalanceLedger<'_> {
        BalanceLedger::new(&self.db)
    }

    /// Atomic move of `amount` from `available` to `locked`. `false` (no
    /// mutation) if `available < amount` — never a partial lock.
    pub fn lock(&self, user: UserId, amount: &Amount) -> Result<bool, CoordinatorError> {
        self.ledger().lock(user, amount)
    }

    /// Inverse of `lock`: moves `amount` back from `locked` to `available`.
    pub fn unlock(&self, user: UserId, amount: &Amount) -> Result<bool, CoordinatorError> {
        self.ledger().unlock(user, amount)
    }

    /// Off-chain spend (announcements, VIP, pins): increments
    /// `offchain_spent`, which `effective_balance` subtracts on the read path.
    pub fn deduct(&self, user: UserId, amount: &Amount) -> Result<(), CoordinatorError> {
        self.ledger().deduct(user, amount).map(|_| ())
    }

    /// Credit to `available` (reverting an off-chain spend, refunds, etc).
    pub fn credit_available(&self, user: UserId, amount: &Amount) -> Result<(), CoordinatorError> {
        self.ledger().credit_available(user, amount).map(|_| ())
    }

    /// Prize distribution always credits `bonus`, never `available`
    /// (SPEC_FULL §4.5 "credit `current_amount` to the winner's `bonus`",
    /// and §4.2 resolve path for bet payouts).
    pub fn credit_winner(&self, user: UserId, amount: &Amount) -> Result<(), CoordinatorError> {
        self.ledger().credit_bonus(user, amount).map(|_| ())
    }

    /// Mirror-internal balance row (no pending locks, no chain query).
    pub fn get_balance(&self, user: UserId) -> Result<VaultBalance, CoordinatorError> {
        Ok(self.db.get_balance(user)?.unwrap_or_else(|| VaultBalance::zero(user)))
    }

    /// The one place `available − pending − offchain_spent + bonus
    /// overflow` is computed (SPEC_FULL §9). `chain_available` is the
    /// chain-authoritative figure for this address; pass the mirror's own
    /// `available` when no live chain query is available.
    pub fn effective_balance(
        &self,
        user: UserId,
        address: &str,
        chain_available: &Amount,
    ) -> Result<EffectiveBalance, CoordinatorError> {
        let bal = self.get_balance(user)?;
        let pending = self.pending_locks.total(address);

        let after_pending = if *chain_available < pending {
            zero()
        } else {
            chain_available - &pending
        };

        let spend = &bal.offchain_spent;
        let available_after_spend = if *spend > after_pending {
            zero()
        } else {
            &after_pending - spend
        };
        let spend_overflow = if *spend > after_pending {
            spend - &after_pending
        } else {
            zero()
        };
        let bonus_after_overflow = if spend_overflow > bal.bonus {
            zero()
        } else {
            &bal.bonus - &spend_overflow
        };

        let available = available_after_spend + bonus_after_overflow;
        let total = &available + &bal.locked;
        Ok(EffectiveBalance {
            available,
            locked: bal.locked,
            total,
        })
    }

    /// Sync the mirror from an authoritative chain balance, *unless* the
    /// user has pending locks or pending bets — the double-spend guard at
    /// the mirror level (SPEC_FULL §4.3).
    pub fn sync_from_chain(
        &self,
        user: UserId,
        address: &str,
        chain_available: Amount,
        has_pending_bets: bool,
    ) -> Result<bool, CoordinatorError> {
        if self.pending_locks.has_any(address) || has_pending_bets {
            debug!(address, "skipping chain sync: pending work outstanding");
            return Ok(false);
        }
        self.ledger().set_available(user, chain_available)
    }

    pub fn add_pending_lock(&self, address: &str, amount: Amount) -> LockId {
        self.pending_locks.add(address, amount)
    }

    pub fn remove_pending_lock(&self, lock_id: LockId) {
        self.pending_locks.remove(lock_id);
    }

    /// Schedule removal of a pending lock after `delay` — used after a
    /// confirmed tx to give the chain REST surface time to reflect the
    /// new balance before the pending-lock mask is lifted (SPEC_FULL §4.2).
    pub fn remove_pending_lock_delayed(&self, lock_id: LockId, delay: Duration) {
        let locks = Arc::clone(&self.pending_locks);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            locks.remove(lock_id);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> (Vault, UserId) {
        let n = std::sync::atomic::AtomicU64::new(0);
        let id = n.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "coinflip_vault_test_{id}_{}",
            std::process::id()
        ));
        let db = Arc::new(StateDb::open(&dir).unwrap());
        let vault = Vault::new(db, Arc::new(PendingLockTable::new()));
        (vault, UserId(1))
    }

    #[test]
    fn lock_then_unlock_is_noop() {
        let (vault, user) = vault();
        vault.credit_available(user, &Amount::from(1000u32)).unwrap();
        let before = vault.get_balance(user).unwrap();

        assert!(vault.lock(user, &Amount::from(100u32)).unwrap());
        vault.unlock(user, &Amount::from(100u32)).unwrap();

        let after = vault.get_balance(user).unwrap();
        assert_eq!(before.available, after.available);
        assert_eq!(before.locked, after.locked);
    }

    #[test]
    fn lock_fails_on_insufficient_balance() {
        let (vault, user) = vault();
        vault.credit_available(user, &Amount::from(50u32)).unwrap();
        assert!(!vault.lock(user, &Amount::from(100u32)).unwrap());
    }

    #[test]
    fn effective_balance_subtracts_pending_locks() {
        let (vault, user) = vault();
        vault.add_pending_lock("addr1", Amount::from(30u32));
        let eff = vault
            .effective_balance(user, "addr1", &Amount::from(100u32))
            .unwrap();
        assert_eq!(eff.available, Amount::from(70u32));
    }

    #[test]
    fn offchain_spend_overflow_consumes_bonus() {
        let (vault, user) = vault();
        vault.credit_winner(user, &Amount::from(20u32)).unwrap();
        vault.deduct(user, &Amount::from(15u32)).unwrap();
        let eff = vault
            .effective_balance(user, "addr1", &Amount::from(10u32))
            .unwrap();
        // chain_available=10, offchain_spent=15 -> overflow 5 eats into bonus(20) -> 15
        assert_eq!(eff.available, Amount::from(15u32));
    }

    #[test]
    fn sync_skipped_when_pending_locks_outstanding() {
        let (vault, user) = vault();
        vault.credit_available(user, &Amount::from(10u32)).unwrap();
        vault.add_pending_lock("addr1", Amount::from(5u32));
        let synced = vault
            .sync_from_chain(user, "addr1", Amount::from(999u32), false)
            .unwrap();
        assert!(!synced);
        assert_eq!(vault.get_balance(user).unwrap().available, Amount::from(10u32));
    }
}
