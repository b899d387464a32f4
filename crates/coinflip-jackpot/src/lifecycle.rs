//! Pool lifecycle bookkeeping around the draw itself (SPEC_FULL §4.5): make
//! sure every active tier always has an open pool, and retry draws that are
//! `drawing` but found no eligible winner last time.

use std::sync::Arc;

use coinflip_core::error::CoordinatorError;
use coinflip_core::types::{JackpotPool, PoolStatus};
use coinflip_state::StateDb;
use tracing::info;

use crate::vip::VipLookup;
use coinflip_vault::Vault;

/// Ensures every active tier has a non-completed pool, opening cycle 1 (or
/// the next cycle after the last completed one) where none exists. Call once
/// at startup and again on each lifecycle sweep tick.
pub fn backfill_pools(db: &StateDb) -> Result<(), CoordinatorError> {
    for tier in db.iter_tiers()? {
        if !tier.active {
            continue;
        }
        if db.active_pool_for_tier(tier.id)?.is_some() {
            continue;
        }
        let next_cycle = db.latest_cycle_for_tier(tier.id)? + 1;
        let pool = JackpotPool::new_filling(tier.id, next_cycle);
        db.put_pool(&pool)?;
        info!(tier_id = tier.id.0, cycle = next_cycle, "opened jackpot pool");
    }
    Ok(())
}

/// Retries every tier's active pool if it is stuck `drawing` (the previous
/// attempt found no eligible winner). Tiers whose pool is still `filling`
/// are left alone — they are driven by [`crate::contribution::contribute_settled_bet`].
pub async fn sweep_stuck_draws(
    db: &Arc<StateDb>,
    vault: &Arc<Vault>,
    vip: &Arc<dyn VipLookup>,
) -> Result<(), CoordinatorError> {
    for tier in db.iter_tiers()? {
        if !tier.active {
            continue;
        }
        let Some(pool) = db.active_pool_for_tier(tier.id)? else { continue };
        if pool.status != PoolStatus::Drawing {
            continue;
        }
        crate::engine::run_draw(db, vault, vip.as_ref(), &tier, &pool, None).await?;
    }
    Ok(())
}
