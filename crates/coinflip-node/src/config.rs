//! Jackpot tier bootstrap config, loaded once on a fresh database — the
//! same shape as `chronx_genesis::GenesisParams` (a JSON file parsed on
//! first run, with an ephemeral fallback for local development).

use std::path::Path;

use coinflip_core::types::{Amount, JackpotTier, TierId};
use serde::Deserialize;

#[derive(Deserialize)]
struct TierConfigEntry {
    id: u32,
    name: String,
    target_amount: String,
    min_games: u32,
    contribution_bps: u32,
    vip_required: Option<u8>,
}

/// Load jackpot tier definitions from `path`, or fall back to a single
/// always-on tier with no VIP gate — enough to exercise the draw loop
/// without requiring an operator to hand-author a config for local runs.
pub fn load_or_default_tiers(path: Option<&Path>) -> anyhow::Result<Vec<JackpotTier>> {
    let Some(path) = path else {
        tracing::warn!("no --jackpot-tiers file provided, seeding a single default tier");
        return Ok(vec![JackpotTier {
            id: TierId(1),
            name: "daily".into(),
            target_amount: Amount::from(1_000_000u64),
            min_games: 1,
            contribution_bps: 100,
            active: true,
            vip_required: None,
        }]);
    };

    let json = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading jackpot tiers config {}: {e}", path.display()))?;
    let entries: Vec<TierConfigEntry> = serde_json::from_str(&json)
        .map_err(|e| anyhow::anyhow!("parsing jackpot tiers config: {e}"))?;

    entries
        .into_iter()
        .map(|e| {
            let target_amount = e
                .target_amount
                .parse::<Amount>()
                .map_err(|_| anyhow::anyhow!("tier {} has a malformed target_amount", e.id))?;
            Ok(JackpotTier {
                id: TierId(e.id),
                name: e.name,
                target_amount,
                min_games: e.min_games,
                contribution_bps: e.contribution_bps,
                active: true,
                vip_required: e.vip_required,
            })
        })
        .collect()
}
