//! Contribution accounting (SPEC_FULL §4.5): fan each settled bet into every
//! active tier's current pool, idempotent on `(pool_id, bet_id)`.

use coinflip_core::error::CoordinatorError;
use coinflip_core::types::{Amount, Bet, BetStatus, JackpotContribution, PoolStatus, TierId};
use coinflip_state::{PoolLedger, StateDb};
use tracing::debug;

/// `(tier_id, cycle)` pools whose `current_amount` just reached
/// `target_amount` as a result of this bet's contribution — the caller
/// triggers a draw for each.
pub fn contribute_settled_bet(
    db: &StateDb,
    bet: &Bet,
) -> Result<Vec<(TierId, u32)>, CoordinatorError> {
    if !matches!(bet.status, BetStatus::Revealed | BetStatus::TimeoutClaimed) {
        return Ok(Vec::new());
    }

    let total_pot = &bet.amount * Amount::from(2u8);
    let mut due_draws = Vec::new();

    for tier in db.iter_tiers()? {
        if !tier.active {
            continue;
        }
        let Some(pool) = db.active_pool_for_tier(tier.id)? else {
            // No open pool yet for this tier; the lifecycle backfill will
            // open one on its next sweep. Skip rather than fail the caller.
            continue;
        };
        if pool.status != PoolStatus::Filling {
            continue;
        }

        let contribution_amount =
            (&total_pot * Amount::from(tier.contribution_bps)) / Amount::from(10_000u32);
        if contribution_amount == Amount::from(0u8) {
            continue;
        }

        let contribution = JackpotContribution {
            tier_id: tier.id,
            cycle: pool.cycle,
            bet_id: bet.bet_id,
            amount: contribution_amount.clone(),
        };
        if !db.insert_contribution_if_new(&contribution)? {
            debug!(bet_id = bet.bet_id.0, tier_id = tier.id.0, "contribution already recorded");
            continue;
        }

        if increment_pool(db, tier.id, pool.cycle, &contribution_amount, &tier.target_amount)? {
            due_draws.push((tier.id, pool.cycle));
        }
    }

    Ok(due_draws)
}

/// CAS-retry increment of a pool's `current_amount`, conditional on it
/// still being `filling`. Returns `true` if this increment crossed the pool
/// into `drawing`.
fn increment_pool(
    db: &StateDb,
    tier_id: TierId,
    cycle: u32,
    amount: &Amount,
    target: &Amount,
) -> Result<bool, CoordinatorError> {
    let ledger = PoolLedger::new(db);
    let applied = ledger.try_mutate(tier_id, cycle, |pool| {
        if pool.status != PoolStatus::Filling {
            return None;
        }
        let mut next = pool.clone();
        next.current_amount = &next.current_amount + amount;
        if next.current_amount >= *target {
            next.status = PoolStatus::Drawing;
        }
        Some(next)
    })?;
    Ok(applied.map(|p| p.status == PoolStatus::Drawing).unwrap_or(false))
}
