//! CAS-retry mutation of jackpot pool rows (SPEC_FULL §4.5), the same
//! read-modify-CAS-write shape as [`crate::bets::BetStateMachine`] and
//! [`crate::balance::BalanceLedger`].

use coinflip_core::error::CoordinatorError;
use coinflip_core::types::{JackpotPool, TierId};

use crate::db::StateDb;

pub struct PoolLedger<'a> {
    db: &'a StateDb,
}

impl<'a> PoolLedger<'a> {
    pub fn new(db: &'a StateDb) -> Self {
        Self { db }
    }

    /// Read-modify-CAS-write a pool row. `f` returning `None` means the
    /// pool doesn't exist or declined the mutation (analogous to the bet
    /// state machine's race-arbiter contract).
    pub fn try_mutate(
        &self,
        tier_id: TierId,
        cycle: u32,
        f: impl Fn(&JackpotPool) -> Option<JackpotPool>,
    ) -> Result<Option<JackpotPool>, CoordinatorError> {
        loop {
            let Some(raw) = self.db.get_pool_raw(tier_id, cycle)? else {
                return Ok(None);
            };
            let current: JackpotPool = bincode::deserialize(&raw)
                .map_err(|e| CoordinatorError::Serialization(e.to_string()))?;
            let Some(next) = f(&current) else {
                return Ok(None);
            };
            if self.db.cas_pool(tier_id, cycle, Some(&raw), &next)? {
                return Ok(Some(next));
            }
        }
    }
}
