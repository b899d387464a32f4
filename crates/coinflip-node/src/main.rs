//! coinflip-node — process wiring for the off-chain coordination core.
//!
//! Startup sequence:
//!   1. Open (or initialize) the state database
//!   2. Seed jackpot tiers on a fresh database, backfill open pools
//!   3. Run startup reconciliation before any background loop starts
//!   4. Start the indexer's block-polling loop, the stuck-bet recovery
//!      sweep, and the jackpot lifecycle sweep as background tasks
//!
//! The HTTP/WebSocket request surface that drives the relayer and bet state
//! machine from player actions is a separate, external collaborator — this
//! binary wires and runs only the coordination core itself.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use coinflip_chain::HttpChainClient;
use coinflip_core::types::OrphanPolicy;
use coinflip_indexer::{Indexer, Projector, Reconciler};
use coinflip_jackpot::JackpotEngine;
use coinflip_notify::InMemoryNotificationBus;
use coinflip_relayer::{Fee, Relayer, RelayerSigner, TxBuilder};
use coinflip_state::StateDb;
use coinflip_vault::{PendingLockTable, Vault};

/// How often the stuck-bet recovery sweep and the jackpot lifecycle sweep
/// run. Distinct from the indexer's own poll interval and from
/// `STUCK_TRANSITIONAL_THRESHOLD_SECS` (which governs how long a bet must
/// be stuck before the sweep acts on it, not how often the sweep runs).
const SWEEP_INTERVAL_SECS: u64 = 30;

#[derive(Parser, Debug)]
#[command(
    name = "coinflip-node",
    version,
    about = "Off-chain coordination core for the two-party commit-reveal coin-flip game"
)]
struct Args {
    /// Directory for the persistent state database.
    #[arg(long, default_value = "~/.coinflip/data")]
    data_dir: PathBuf,

    /// Cosmos SDK REST gateway base URL.
    #[arg(long)]
    chain_rest_base: String,

    /// Game contract address on chain.
    #[arg(long)]
    contract_addr: String,

    /// Chain id, included in every signed transaction.
    #[arg(long)]
    chain_id: String,

    /// Bech32 address prefix for the relayer's own signing identity.
    #[arg(long, default_value = "cosmos")]
    bech32_prefix: String,

    /// Hex-encoded 32-byte secp256k1 secret scalar for the relayer's
    /// signing identity. Without it, the relayer starts in a not-ready
    /// state (every relay attempt fails `RelayerNotReady`) — useful for
    /// running the indexer/reconciler alone against a read-only deployment.
    #[arg(long)]
    relayer_secret_hex: Option<String>,

    /// Flat fee amount for relayed transactions.
    #[arg(long, default_value = "5000")]
    fee_amount: String,

    /// Fee denom.
    #[arg(long, default_value = "uatom")]
    fee_denom: String,

    /// Gas limit for relayed transactions.
    #[arg(long, default_value_t = 200_000)]
    fee_gas_limit: u64,

    /// Treasury account sponsoring gas for granted users, if any.
    #[arg(long)]
    fee_granter: Option<String>,

    /// Path to a JSON jackpot tier config; a single default tier is seeded
    /// if omitted.
    #[arg(long)]
    jackpot_tiers: Option<PathBuf>,

    /// How a non-terminal bet with no resolvable chain record is handled.
    #[arg(long, default_value = "escalate")]
    orphan_policy: OrphanPolicyArg,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OrphanPolicyArg {
    Cancel,
    Escalate,
}

impl From<OrphanPolicyArg> for OrphanPolicy {
    fn from(a: OrphanPolicyArg) -> Self {
        match a {
            OrphanPolicyArg::Cancel => OrphanPolicy::Cancel,
            OrphanPolicyArg::Escalate => OrphanPolicy::Escalate,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,coinflip=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("coinflip-node starting");

    // ── State database ────────────────────────────────────────────────────
    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let db = Arc::new(StateDb::open(&data_dir).context("opening state database")?);

    // ── Vault / notification bus ─────────────────────────────────────────
    let vault = Arc::new(Vault::new(Arc::clone(&db), Arc::new(PendingLockTable::new())));
    let notify = Arc::new(InMemoryNotificationBus::new());

    // ── Jackpot tiers: seed on a fresh database, then backfill pools ─────
    if db.iter_tiers()?.is_empty() {
        let tiers = config::load_or_default_tiers(args.jackpot_tiers.as_deref())
            .context("loading jackpot tier config")?;
        for tier in &tiers {
            db.put_tier(tier)?;
            info!(tier_id = tier.id.0, name = %tier.name, "seeded jackpot tier");
        }
    }
    coinflip_jackpot::lifecycle::backfill_pools(&db).context("backfilling jackpot pools")?;

    let jackpot = Arc::new(JackpotEngine::new(Arc::clone(&db), Arc::clone(&vault), Arc::clone(&notify)));

    // ── Chain clients. The relayer owns one instance (it broadcasts and
    // queries its own sequence); the indexer/reconciler share a second,
    // equally stateless instance — both just thin REST adapters over the
    // same gateway.
    let relayer_chain = HttpChainClient::new(args.chain_rest_base.clone());
    let indexer_chain = Arc::new(HttpChainClient::new(args.chain_rest_base.clone()));

    let signer = match &args.relayer_secret_hex {
        Some(hex_secret) => {
            let bytes = hex::decode(hex_secret).context("decoding --relayer-secret-hex")?;
            Some(
                RelayerSigner::from_secret_bytes(&bytes, &args.bech32_prefix)
                    .map_err(|e| anyhow::anyhow!(e))?,
            )
        }
        None => {
            warn!("no --relayer-secret-hex provided, relayer starts not-ready");
            None
        }
    };
    let builder = TxBuilder::new(args.chain_id.clone(), args.contract_addr.clone());
    let fee = Fee {
        amount: args.fee_amount.clone(),
        denom: args.fee_denom.clone(),
        gas_limit: args.fee_gas_limit,
        granter: args.fee_granter.clone(),
    };
    let _relayer = Arc::new(Relayer::new(relayer_chain, signer, builder, fee));

    // ── Startup reconciliation, before any background loop starts ───────
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&indexer_chain),
        Arc::clone(&db),
        Arc::clone(&vault),
        Arc::clone(&notify),
        args.contract_addr.clone(),
        args.orphan_policy.into(),
    ));
    reconciler
        .reconcile_startup()
        .await
        .context("startup reconciliation")?;

    // ── Indexer poll loop ─────────────────────────────────────────────────
    let projector = Projector {
        db: Arc::clone(&db),
        vault: Arc::clone(&vault),
        notify: Arc::clone(&notify),
        jackpot: Arc::clone(&jackpot),
    };
    let indexer = Arc::new(Indexer::new(
        Arc::clone(&indexer_chain),
        Arc::clone(&db),
        projector,
        args.contract_addr.clone(),
    ));
    indexer
        .seed_cursor_if_absent()
        .await
        .context("seeding indexer cursor at boot")?;
    tokio::spawn({
        let indexer = Arc::clone(&indexer);
        async move {
            let interval = Duration::from_secs(coinflip_core::INDEXER_POLL_INTERVAL_SECS);
            loop {
                tokio::time::sleep(interval).await;
                let now = chrono::Utc::now().timestamp();
                if let Err(e) = indexer.tick(now).await {
                    warn!(error = %e, "indexer tick failed");
                }
            }
        }
    });

    // ── Stuck-bet recovery sweep ──────────────────────────────────────────
    tokio::spawn({
        let reconciler = Arc::clone(&reconciler);
        async move {
            let interval = Duration::from_secs(SWEEP_INTERVAL_SECS);
            loop {
                tokio::time::sleep(interval).await;
                let now = chrono::Utc::now().timestamp();
                if let Err(e) = reconciler.stuck_bet_sweep(now).await {
                    warn!(error = %e, "stuck-bet sweep failed");
                }
            }
        }
    });

    // ── Jackpot lifecycle sweep ───────────────────────────────────────────
    tokio::spawn({
        let jackpot = Arc::clone(&jackpot);
        async move {
            let interval = Duration::from_secs(SWEEP_INTERVAL_SECS);
            loop {
                tokio::time::sleep(interval).await;
                if let Err(e) = jackpot.sweep().await {
                    warn!(error = %e, "jackpot lifecycle sweep failed");
                }
            }
        }
    });

    info!("node ready");
    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutting down");
    db.flush().ok();
    Ok(())
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
