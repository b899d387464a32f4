//! The per-user vault balance ledger (SPEC_FULL §4.3): the same
//! read-modify-CAS-write shape as [`crate::bets::BetStateMachine`], applied
//! to [`VaultBalance`] rows instead of [`Bet`] rows. `coinflip-vault` builds
//! its pending-lock bookkeeping and `effective_balance` formula on top of
//! this; this module only owns safe concurrent mutation of the mirror row.

use coinflip_core::error::CoordinatorError;
use coinflip_core::types::{Amount, UserId, VaultBalance};

use crate::db::StateDb;

pub struct BalanceLedger<'a> {
    db: &'a StateDb,
}

impl<'a> BalanceLedger<'a> {
    pub fn new(db: &'a StateDb) -> Self {
        Self { db }
    }

    /// Move `amount` from `available` to `locked`. No-op (`Ok(false)`) if
    /// `available < amount` — never a partial lock.
    pub fn lock(&self, user: UserId, amount: &Amount) -> Result<bool, CoordinatorError> {
        self.try_mutate(user, |bal| {
            if bal.available < *amount {
                return None;
            }
            let mut next = bal.clone();
            next.available = &next.available - amount;
            next.locked = &next.locked + amount;
            Some(next)
        })
    }

    /// Move `amount` back from `locked` to `available`, clamping rather
    /// than underflowing if a concurrent settlement already released funds.
    pub fn unlock(&self, user: UserId, amount: &Amount) -> Result<bool, CoordinatorError> {
        self.try_mutate(user, |bal| {
            let mut next = bal.clone();
            next.locked = if next.locked < *amount {
                Amount::from(0u8)
            } else {
                &next.locked - amount
            };
            next.available = &next.available + amount;
            Some(next)
        })
    }

    pub fn deduct(&self, user: UserId, amount: &Amount) -> Result<bool, CoordinatorError> {
        self.try_mutate(user, |bal| {
            let mut next = bal.clone();
            next.offchain_spent = &next.offchain_spent + amount;
            Some(next)
        })
    }

    pub fn credit_available(&self, user: UserId, amount: &Amount) -> Result<bool, CoordinatorError> {
        self.try_mutate(user, |bal| {
            let mut next = bal.clone();
            next.available = &next.available + amount;
            Some(next)
        })
    }

    pub fn credit_bonus(&self, user: UserId, amount: &Amount) -> Result<bool, CoordinatorError> {
        self.try_mutate(user, |bal| {
            let mut next = bal.clone();
            next.bonus = &next.bonus + amount;
            Some(next)
        })
    }

    /// Overwrite `available` with a chain-authoritative figure. Callers are
    /// responsible for the double-spend guard (pending locks / pending
    /// bets) — this ledger only guarantees the write itself is race-free.
    pub fn set_available(&self, user: UserId, amount: Amount) -> Result<bool, CoordinatorError> {
        self.try_mutate(user, |bal| {
            let mut next = bal.clone();
            next.available = amount.clone();
            Some(next)
        })
    }

    fn try_mutate(
        &self,
        user: UserId,
        f: impl Fn(&VaultBalance) -> Option<VaultBalance>,
    ) -> Result<bool, CoordinatorError> {
        loop {
            let raw = self.db.get_balance_raw(user)?;
            let current = match &raw {
                Some(bytes) => bincode::deserialize(bytes)
                    .map_err(|e| CoordinatorError::Serialization(e.to_string()))?,
                None => VaultBalance::zero(user),
            };
            let Some(next) = f(&current) else {
                return Ok(false);
            };
            if self.db.cas_balance(user, raw.as_ref(), &next)? {
                return Ok(true);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_db() -> StateDb {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("coinflip_balance_test_{n}_{}", std::process::id()));
        StateDb::open(&dir).unwrap()
    }

    #[test]
    fn lock_fails_below_available() {
        let db = temp_db();
        let ledger = BalanceLedger::new(&db);
        ledger.credit_available(UserId(1), &Amount::from(50u32)).unwrap();
        assert!(!ledger.lock(UserId(1), &Amount::from(100u32)).unwrap());
    }

    #[test]
    fn lock_then_unlock_roundtrips() {
        let db = temp_db();
        let ledger = BalanceLedger::new(&db);
        ledger.credit_available(UserId(1), &Amount::from(100u32)).unwrap();
        assert!(ledger.lock(UserId(1), &Amount::from(40u32)).unwrap());
        let mid = db.get_balance(UserId(1)).unwrap().unwrap();
        assert_eq!(mid.available, Amount::from(60u32));
        assert_eq!(mid.locked, Amount::from(40u32));

        assert!(ledger.unlock(UserId(1), &Amount::from(40u32)).unwrap());
        let end = db.get_balance(UserId(1)).unwrap().unwrap();
        assert_eq!(end.available, Amount::from(100u32));
        assert_eq!(end.locked, Amount::from(0u8));
    }

    #[test]
    fn credit_bonus_never_touches_available() {
        let db = temp_db();
        let ledger = BalanceLedger::new(&db);
        ledger.credit_bonus(UserId(1), &Amount::from(25u32)).unwrap();
        let bal = db.get_balance(UserId(1)).unwrap().unwrap();
        assert_eq!(bal.bonus, Amount::from(25u32));
        assert_eq!(bal.available, Amount::from(0u8));
    }
}
