//! Top-level jackpot engine (SPEC_FULL §4.5): wires contribution accounting,
//! the draw, and lifecycle bookkeeping behind one handle the node binary
//! hands to the indexer (settlement hook) and a periodic sweep task.

use std::sync::Arc;

use coinflip_core::error::CoordinatorError;
use coinflip_core::types::{Bet, JackpotPool, JackpotTier, PoolStatus, TierId};
use coinflip_notify::{InMemoryNotificationBus, NotificationBus, NotificationEvent};
use coinflip_state::{PoolLedger, StateDb};
use coinflip_vault::Vault;
use tracing::{info, warn};

use crate::contribution::contribute_settled_bet;
use crate::draw::{draw_winner, eligible_set, generate_seed};
use crate::vip::{NoVip, VipLookup};

pub struct JackpotEngine {
    db: Arc<StateDb>,
    vault: Arc<Vault>,
    notify: Arc<InMemoryNotificationBus>,
    vip: Arc<dyn VipLookup>,
}

impl JackpotEngine {
    pub fn new(db: Arc<StateDb>, vault: Arc<Vault>, notify: Arc<InMemoryNotificationBus>) -> Self {
        Self { db, vault, notify, vip: Arc::new(NoVip) }
    }

    pub fn with_vip_lookup(mut self, vip: Arc<dyn VipLookup>) -> Self {
        self.vip = vip;
        self
    }

    /// Called by the indexer once a bet settles (`revealed` or
    /// `timeout_claimed`). Contributes the settled pot to every active
    /// tier's current pool and, for any pool that just crossed its target,
    /// runs the draw inline.
    pub async fn on_bet_settled(&self, bet: &Bet) -> Result<(), CoordinatorError> {
        let due = contribute_settled_bet(&self.db, bet)?;
        for (tier_id, cycle) in due {
            self.trigger_draw(tier_id, cycle).await?;
        }
        Ok(())
    }

    async fn trigger_draw(&self, tier_id: TierId, cycle: u32) -> Result<(), CoordinatorError> {
        let Some(tier) = self.db.get_tier(tier_id)? else {
            warn!(tier_id = tier_id.0, "draw triggered for unknown tier");
            return Ok(());
        };
        let Some(pool) = self.db.get_pool(tier_id, cycle)? else {
            warn!(tier_id = tier_id.0, cycle, "draw triggered for missing pool");
            return Ok(());
        };
        run_draw(&self.db, &self.vault, self.vip.as_ref(), &tier, &pool, Some(self.notify.as_ref())).await
    }

    /// Periodic lifecycle sweep: backfill any tier missing an open pool,
    /// then retry every pool stuck in `drawing` with no eligible winner.
    pub async fn sweep(&self) -> Result<(), CoordinatorError> {
        crate::lifecycle::backfill_pools(&self.db)?;
        crate::lifecycle::sweep_stuck_draws(&self.db, &self.vault, &self.vip).await
    }
}

/// Runs the draw for one pool already confirmed to be `drawing`. Shared by
/// [`JackpotEngine::trigger_draw`] and the lifecycle retry sweep, which has
/// no fresh `NotificationBus` handle at hand and so passes `None`.
pub(crate) async fn run_draw(
    db: &Arc<StateDb>,
    vault: &Arc<Vault>,
    vip: &dyn VipLookup,
    tier: &JackpotTier,
    pool: &JackpotPool,
    notify: Option<&InMemoryNotificationBus>,
) -> Result<(), CoordinatorError> {
    if pool.status != PoolStatus::Drawing {
        return Ok(());
    }

    let eligible = eligible_set(db, tier.min_games, tier.vip_required, vip)?;
    let seed = generate_seed();
    let Some(winner) = draw_winner(&seed, &eligible) else {
        info!(tier_id = tier.id.0, cycle = pool.cycle, "no eligible winner yet, leaving pool in drawing");
        return Ok(());
    };

    let ledger = PoolLedger::new(db);
    let completed = ledger.try_mutate(tier.id, pool.cycle, |p| {
        if p.status != PoolStatus::Drawing {
            return None;
        }
        let mut next = p.clone();
        next.status = PoolStatus::Completed;
        next.winner_user_id = Some(winner);
        next.draw_seed = Some(seed);
        next.completed_at = Some(chrono::Utc::now().timestamp());
        Some(next)
    })?;

    let Some(completed) = completed else {
        // Another task already completed or mutated this pool; nothing left to do here.
        return Ok(());
    };

    vault.credit_winner(winner, &completed.current_amount)?;
    info!(
        tier_id = tier.id.0,
        cycle = completed.cycle,
        winner = winner.0,
        amount = %completed.current_amount,
        "jackpot draw completed"
    );

    if let Some(bus) = notify {
        bus.publish(NotificationEvent::JackpotWon {
            tier_id: tier.id,
            winner,
            amount: completed.current_amount.clone(),
        });
    }

    let next_cycle = completed.cycle + 1;
    db.put_pool(&JackpotPool::new_filling(tier.id, next_cycle))?;

    Ok(())
}
