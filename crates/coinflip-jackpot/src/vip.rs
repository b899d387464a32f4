//! VIP subscriptions are out of scope (spec §1 explicit non-goals), but a
//! VIP-exclusive jackpot tier's eligibility filter is a mechanical detail
//! that touches the draw itself — the same treatment the relayer gives the
//! gas-granter override (SPEC_FULL §4.1 "mechanical mechanism... in scope
//! because it touches message construction"). Callers inject whatever VIP
//! lookup their surrounding system has; this crate ships only the no-op.

use coinflip_core::types::UserId;

pub trait VipLookup: Send + Sync {
    /// The caller's current VIP tier, or 0 if not a subscriber.
    fn vip_tier(&self, user: UserId) -> u8;
}

/// Default when no VIP subsystem is wired in: every tier-gated pool with a
/// `vip_required` filter simply has no eligible VIP users.
pub struct NoVip;

impl VipLookup for NoVip {
    fn vip_tier(&self, _user: UserId) -> u8 {
        0
    }
}
