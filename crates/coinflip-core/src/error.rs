use thiserror::Error;

/// The coordination core's unified error taxonomy (SPEC_FULL §7). One
/// variant per failure kind named in the spec's error table, plus the
/// component-specific variants implied by §3's invariants.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    // ── Validation ───────────────────────────────────────────────────────────
    #[error("amount {amount} below minimum bet {min}")]
    BelowMinBet { amount: String, min: String },

    #[error("malformed commitment: expected 32 bytes hex")]
    MalformedCommitment,

    #[error("malformed secret: expected 32 bytes hex")]
    MalformedSecret,

    // ── Precondition ─────────────────────────────────────────────────────────
    #[error("insufficient balance: need {need}, have {have}")]
    InsufficientBalance { need: String, have: String },

    #[error("user {0} already has the maximum number of open bets")]
    TooManyOpenBets(String),

    #[error("bet {0} is not in the expected state for this operation")]
    BetNotInExpectedState(String),

    #[error("a user cannot accept their own bet")]
    SelfAccept,

    #[error("action already in progress for this address")]
    ActionInProgress,

    // ── Race-lost ────────────────────────────────────────────────────────────
    #[error("conditional transition lost the race: bet {0} was mutated concurrently")]
    TransitionRaceLost(String),

    // ── Chain / relayer ──────────────────────────────────────────────────────
    #[error("relayer signer not initialized")]
    RelayerNotReady,

    #[error("chain rejected transaction from mempool: {raw_log}")]
    CheckTxRejected { raw_log: String },

    #[error("broadcast timed out")]
    BroadcastTimeout,

    #[error("sequence mismatch exceeded retry budget (expected {expected})")]
    SequenceMismatch { expected: u64 },

    #[error("confirmation poll window exhausted for tx {0}")]
    ConfirmationTimeout(String),

    #[error("chain endpoint unavailable: {0}")]
    ChainUnavailable(String),

    // ── Indexer ──────────────────────────────────────────────────────────────
    #[error("duplicate chain event, ignored: {0}")]
    DuplicateEvent(String),

    #[error("event attribute missing: {0}")]
    MissingEventAttribute(&'static str),

    #[error("bet {0} is an orphan with no resolvable chain id")]
    OrphanUnresolved(u64),

    // ── Jackpot ──────────────────────────────────────────────────────────────
    #[error("jackpot tier not found: {0}")]
    TierNotFound(u32),

    #[error("no eligible users for jackpot draw")]
    NoEligibleUsers,

    // ── Storage / serialization ──────────────────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

impl CoordinatorError {
    /// Stable machine-readable code for the HTTP surface consumed by the
    /// core (§6) — request handlers outside the core translate this into
    /// the documented status codes (409/410/400/429/...).
    pub fn code(&self) -> &'static str {
        match self {
            CoordinatorError::BelowMinBet { .. } => "BELOW_MIN_BET",
            CoordinatorError::MalformedCommitment => "MALFORMED_COMMITMENT",
            CoordinatorError::MalformedSecret => "MALFORMED_SECRET",
            CoordinatorError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            CoordinatorError::TooManyOpenBets(_) => "TOO_MANY_OPEN_BETS",
            CoordinatorError::BetNotInExpectedState(_) => "BET_NOT_IN_EXPECTED_STATE",
            CoordinatorError::SelfAccept => "SELF_ACCEPT",
            CoordinatorError::ActionInProgress => "ACTION_IN_PROGRESS",
            CoordinatorError::TransitionRaceLost(_) => "BET_ALREADY_CLAIMED",
            CoordinatorError::RelayerNotReady => "RELAYER_NOT_READY",
            CoordinatorError::CheckTxRejected { .. } => "CHAIN_TX_FAILED",
            CoordinatorError::BroadcastTimeout => "BROADCAST_TIMEOUT",
            CoordinatorError::SequenceMismatch { .. } => "SEQUENCE_MISMATCH",
            CoordinatorError::ConfirmationTimeout(_) => "CONFIRMATION_TIMEOUT",
            CoordinatorError::ChainUnavailable(_) => "CHAIN_UNAVAILABLE",
            CoordinatorError::DuplicateEvent(_) => "DUPLICATE_EVENT",
            CoordinatorError::MissingEventAttribute(_) => "MISSING_EVENT_ATTRIBUTE",
            CoordinatorError::OrphanUnresolved(_) => "ORPHAN_UNRESOLVED",
            CoordinatorError::TierNotFound(_) => "TIER_NOT_FOUND",
            CoordinatorError::NoEligibleUsers => "NO_ELIGIBLE_USERS",
            CoordinatorError::Storage(_) => "STORAGE_ERROR",
            CoordinatorError::Serialization(_) => "SERIALIZATION_ERROR",
            CoordinatorError::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether raw chain logs may be safely attached to this error for
    /// debugging. Never true for anything that could embed signer material.
    pub fn is_debuggable(&self) -> bool {
        !matches!(self, CoordinatorError::RelayerNotReady)
    }
}
