//! The seeded draw algorithm (SPEC_FULL §4.5 steps 1–5). Seed generation
//! uses `rand::rngs::OsRng`; the per-step shuffle hash uses `sha3::Sha3_256`
//! (SPEC_FULL §4.5 "AMBIENT" note) so the draw is reproducible from the
//! published seed and the eligible-set snapshot taken at draw time.

use std::collections::HashMap;

use coinflip_core::error::CoordinatorError;
use coinflip_core::types::{BetStatus, TierId, UserId};
use coinflip_state::StateDb;
use rand::rngs::OsRng;
use rand::RngCore;
use sha3::{Digest, Sha3_256};

use crate::vip::VipLookup;

/// Users eligible to win tier `tier_id`'s draw: participated in at least
/// `min_games` settled bets, and (for VIP-gated tiers) hold the required
/// VIP level. Snapshotted fresh at draw time per the spec's reproducibility
/// property.
pub fn eligible_set(
    db: &StateDb,
    min_games: u32,
    vip_required: Option<u8>,
    vip: &dyn VipLookup,
) -> Result<Vec<UserId>, CoordinatorError> {
    let mut settled_counts: HashMap<UserId, u32> = HashMap::new();
    for bet in db.iter_all_bets()? {
        if !matches!(bet.status, BetStatus::Revealed | BetStatus::TimeoutClaimed) {
            continue;
        }
        *settled_counts.entry(bet.maker_user_id).or_insert(0) += 1;
        if let Some(acceptor) = bet.acceptor_user_id {
            *settled_counts.entry(acceptor).or_insert(0) += 1;
        }
    }

    let mut eligible: Vec<UserId> = settled_counts
        .into_iter()
        .filter(|(_, count)| *count >= min_games)
        .map(|(user, _)| user)
        .collect();

    if let Some(required) = vip_required {
        eligible.retain(|user| vip.vip_tier(*user) >= required);
    }

    eligible.sort_by_key(|u| u.0);
    Ok(eligible)
}

pub fn generate_seed() -> [u8; 32] {
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    seed
}

/// Fisher–Yates shuffle of `0..n`, deriving each swap index from
/// `sha3_256(seed || be_u32(i))` (SPEC_FULL §4.5 step 4). Returns the
/// permuted index order; `result[0]` is the winning index into the
/// eligible-set slice the caller passed in.
pub fn shuffle_indices(seed: &[u8; 32], n: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    for i in (1..n).rev() {
        let j = swap_index(seed, i as u32) as usize % (i + 1);
        indices.swap(i, j);
    }
    indices
}

fn swap_index(seed: &[u8; 32], i: u32) -> u32 {
    let mut hasher = Sha3_256::new();
    hasher.update(seed);
    hasher.update(i.to_be_bytes());
    let digest = hasher.finalize();
    let mut low4 = [0u8; 4];
    low4.copy_from_slice(&digest[28..32]);
    u32::from_be_bytes(low4)
}

/// Runs the full draw over a snapshot of the eligible set: `None` if the
/// set is empty (caller leaves the pool `drawing` for the lifecycle sweep
/// to retry), `Some(winner)` otherwise.
pub fn draw_winner(seed: &[u8; 32], eligible: &[UserId]) -> Option<UserId> {
    if eligible.is_empty() {
        return None;
    }
    let order = shuffle_indices(seed, eligible.len());
    Some(eligible[order[0]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_is_reproducible_from_seed_and_set() {
        let seed = [7u8; 32];
        let set: Vec<UserId> = (1..=10).map(UserId).collect();
        let a = draw_winner(&seed, &set);
        let b = draw_winner(&seed, &set);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_eligible_set_yields_no_winner() {
        let seed = [1u8; 32];
        assert_eq!(draw_winner(&seed, &[]), None);
    }

    #[test]
    fn different_seeds_can_pick_different_winners() {
        let set: Vec<UserId> = (1..=20).map(UserId).collect();
        let a = draw_winner(&[1u8; 32], &set);
        let b = draw_winner(&[2u8; 32], &set);
        assert!(a.is_some() && b.is_some());
        // Not a strict guarantee for every seed pair, but overwhelmingly
        // likely for two fixed distinct seeds over 20 entries; demonstrates
        // the seed actually participates in the outcome.
        assert_ne!(a, b);
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let seed = [9u8; 32];
        let order = shuffle_indices(&seed, 8);
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..8).collect::<Vec<_>>());
    }
}
