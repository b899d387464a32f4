//! ─── Coordination core constants ────────────────────────────────────────────
//!
//! Timeouts and thresholds from SPEC_FULL §5/§6. These are defaults; the
//! binary's `Args` (see `coinflip-node`) may override the env-configurable
//! ones at startup.

// ── Relayer ──────────────────────────────────────────────────────────────────

/// Retry budget for a `sequence_mismatch` before the relayer gives up.
pub const MAX_SEQ_RETRIES: u32 = 3;

/// Per-user in-flight guard cooldown for game actions (create/accept/reveal/cancel).
pub const IN_FLIGHT_GUARD_GAME_SECS: u64 = 1;

/// Per-user in-flight guard cooldown for vault actions (withdraw).
pub const IN_FLIGHT_GUARD_VAULT_SECS: u64 = 30;

// ── Pending locks ────────────────────────────────────────────────────────────

/// Pending-lock TTL — safety net; normal removal is the background task's job.
pub const PENDING_LOCK_TTL_SECS: u64 = 90;

/// Delay before a background task removes its pending lock after a tx lands,
/// giving the chain REST surface time to reflect the new balance.
pub const PENDING_LOCK_REMOVAL_DELAY_SECS: u64 = 5;

// ── Background confirmation ──────────────────────────────────────────────────

/// Poll interval while waiting for a submitted tx to confirm.
pub const CONFIRM_POLL_INTERVAL_SECS: u64 = 2;

/// Poll window for game actions (create/accept/cancel).
pub const CONFIRM_POLL_WINDOW_GAME_SECS: u64 = 60;

/// Poll window for vault-ish / longer-running confirmations.
pub const CONFIRM_POLL_WINDOW_LONG_SECS: u64 = 90;

/// How long a bet may sit in `accepting`/`canceling` before the recovery
/// sweep treats it as stuck and reconciles against the chain.
pub const STUCK_TRANSITIONAL_THRESHOLD_SECS: i64 = 120;

// ── Balance cache ────────────────────────────────────────────────────────────

pub const BALANCE_CACHE_TTL_SECS: u64 = 30;

// ── Chain client ─────────────────────────────────────────────────────────────

pub const CHAIN_CALL_TIMEOUT_SECS: u64 = 5;
pub const CHAIN_CALL_RETRY_ATTEMPTS: u32 = 3;

// ── Indexer ──────────────────────────────────────────────────────────────────

pub const INDEXER_POLL_INTERVAL_SECS: u64 = 3;

/// Max blocks processed per indexer tick, to bound catch-up latency.
pub const INDEXER_MAX_BLOCKS_PER_TICK: u64 = 10;

// ── Jackpot ──────────────────────────────────────────────────────────────────

pub const JACKPOT_SEED_BYTES: usize = 32;

// ── Bet limits ───────────────────────────────────────────────────────────────

pub const DEFAULT_MAX_OPEN_BETS_PER_USER: u32 = 10;
pub const DEFAULT_MAX_BATCH_SIZE: u32 = 20;
