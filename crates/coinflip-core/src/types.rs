//! Core data types shared across the coordination core.
//!
//! These mirror the entities of the mirror database: [`Bet`], [`VaultBalance`],
//! [`TxEvent`], and the jackpot configuration/instance rows. Nothing here
//! touches chain RPC or storage — those live in `coinflip-chain` and
//! `coinflip-state` respectively.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix timestamp (seconds, UTC).
pub type Timestamp = i64;

/// Arbitrary-precision, non-negative token amount (on-chain denom base units).
pub type Amount = num_bigint::BigUint;

// ── Address ────────────────────────────────────────────────────────────────

/// A bech32-encoded chain address (e.g. `cosmos1...`). Opaque to the core —
/// only the relayer and chain client ever decode/derive the raw bytes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ── UserId ─────────────────────────────────────────────────────────────────

/// Internal user identifier. Resolved from a chain [`Address`] by the
/// indexer's address book the first time that address is seen in an event.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.0)
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

// ── TxHash ─────────────────────────────────────────────────────────────────

/// 32-byte transaction hash as returned by the chain's broadcast/query RPCs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            // hex::decode does not validate length; surface as a malformed digit error
            // via a zero-length decode so callers get a consistent error type.
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({}…)", &self.to_hex()[..12])
    }
}

// ── BetId ──────────────────────────────────────────────────────────────────

/// Chain-assigned bet identifier. Before the chain assigns one, a pending
/// submission is keyed only by its `tx_hash`; the indexer rewrites the row's
/// id once `bet_created` is observed (see `coinflip-indexer`).
///
/// The "orphan" placeholder id (used while the id is unresolved) is a local
/// millisecond timestamp, matching the shape the original dealt with — it is
/// never mistaken for a real chain id because chain ids start from a small
/// counter and placeholders are always in the billions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BetId(pub u64);

impl BetId {
    /// Construct a placeholder id from the current time, used until the
    /// create-bet background task resolves the real chain-assigned id.
    pub fn placeholder(now_millis: u64) -> Self {
        Self(now_millis)
    }

    /// A placeholder id always looks like a millisecond Unix timestamp from
    /// the 2020s onward (> 1.6e12); real chain-assigned ids are small
    /// sequential counters and never reach that range in this system's
    /// lifetime.
    pub fn is_placeholder(&self) -> bool {
        self.0 > 1_600_000_000_000
    }
}

impl fmt::Display for BetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for BetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BetId({})", self.0)
    }
}

// ── Commitment / secret ───────────────────────────────────────────────────

/// 32-byte commitment hash binding a maker to their secret side.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment(pub [u8; 32]);

impl Commitment {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({}…)", &self.to_hex()[..12])
    }
}

/// 32-byte reveal secret, kept server-side only until reveal.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret(pub [u8; 32]);

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(REDACTED)")
    }
}

// ── CoinSide ───────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoinSide {
    Heads,
    Tails,
}

// ── BetStatus ──────────────────────────────────────────────────────────────

/// The seven-state bet lifecycle. Terminal states: `Canceled`, `Revealed`,
/// `TimeoutClaimed`. See the valid-transitions table in `coinflip-state`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetStatus {
    Open,
    Accepting,
    Accepted,
    Canceling,
    Canceled,
    Revealed,
    TimeoutClaimed,
}

impl BetStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BetStatus::Canceled | BetStatus::Revealed | BetStatus::TimeoutClaimed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BetStatus::Open => "open",
            BetStatus::Accepting => "accepting",
            BetStatus::Accepted => "accepted",
            BetStatus::Canceling => "canceling",
            BetStatus::Canceled => "canceled",
            BetStatus::Revealed => "revealed",
            BetStatus::TimeoutClaimed => "timeout_claimed",
        }
    }
}

/// Returns whether `from -> to` is a legal transition per the spec's table.
/// `force` bypasses this check; only the indexer's startup reconciliation
/// and event projection are permitted to call with `force = true`.
pub fn is_valid_transition(from: BetStatus, to: BetStatus) -> bool {
    use BetStatus::*;
    matches!(
        (from, to),
        (Open, Accepting)
            | (Open, Canceling)
            | (Open, Canceled)
            | (Accepting, Accepted)
            | (Accepting, Open)
            | (Canceling, Canceled)
            | (Canceling, Open)
            | (Accepted, Revealed)
            | (Accepted, TimeoutClaimed)
    )
}

// ── Bet ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bet {
    pub bet_id: BetId,
    pub maker_user_id: UserId,
    pub acceptor_user_id: Option<UserId>,
    pub amount: Amount,
    pub commitment: Commitment,
    /// Kept server-side only until reveal; never serialized back to clients.
    pub maker_side: Option<CoinSide>,
    pub maker_secret: Option<Secret>,
    pub acceptor_guess: Option<CoinSide>,
    pub winner_user_id: Option<UserId>,
    pub payout_amount: Option<Amount>,
    pub commission_amount: Option<Amount>,
    pub status: BetStatus,
    pub created_time: Timestamp,
    pub accepted_time: Option<Timestamp>,
    pub resolved_time: Option<Timestamp>,
    pub txhash_create: TxHash,
    pub txhash_accept: Option<TxHash>,
    pub txhash_resolve: Option<TxHash>,
}

impl Bet {
    /// Invariant check per §3: exactly one of maker/acceptor equals the
    /// winner once the bet is settled. Intended for tests and defensive
    /// assertions at the projection boundary, not for hot-path validation.
    pub fn winner_is_participant(&self) -> bool {
        match (self.winner_user_id, self.acceptor_user_id) {
            (None, _) => true,
            (Some(w), Some(acceptor)) => w == self.maker_user_id || w == acceptor,
            (Some(w), None) => w == self.maker_user_id,
        }
    }
}

// ── VaultBalance ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VaultBalance {
    pub user_id: UserId,
    pub available: Amount,
    pub locked: Amount,
    pub bonus: Amount,
    pub offchain_spent: Amount,
}

impl VaultBalance {
    pub fn zero(user_id: UserId) -> Self {
        Self {
            user_id,
            available: Amount::from(0u8),
            locked: Amount::from(0u8),
            bonus: Amount::from(0u8),
            offchain_spent: Amount::from(0u8),
        }
    }

    /// Effective spendable = max(0, available - offchain_spent)
    ///                       + max(0, bonus - max(0, offchain_spent - available))
    ///
    /// This is the *mirror-internal* spendable figure (no pending locks, no
    /// chain-reported balance); `coinflip-vault::effective_balance` layers
    /// pending-lock and chain-sync concerns on top of this.
    pub fn spendable(&self) -> Amount {
        let zero = Amount::from(0u8);
        let available_after_spend = if self.offchain_spent > self.available {
            zero.clone()
        } else {
            &self.available - &self.offchain_spent
        };
        let spend_overflow = if self.offchain_spent > self.available {
            &self.offchain_spent - &self.available
        } else {
            zero.clone()
        };
        let bonus_after_overflow = if spend_overflow > self.bonus {
            zero
        } else {
            &self.bonus - &spend_overflow
        };
        available_after_spend + bonus_after_overflow
    }
}

// ── TxEvent ────────────────────────────────────────────────────────────────

/// A single extracted contract event, keyed for deduplication by
/// `(tx_hash, event_type)`. `attributes` retains the raw string map so the
/// indexer's projection logic can read action-specific fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxEvent {
    pub tx_hash: TxHash,
    pub event_type: EventType,
    pub attributes: std::collections::BTreeMap<String, String>,
    pub height: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    BetCreated,
    BetAccepted,
    BetRevealed,
    BetCanceled,
    BetTimeoutClaimed,
    CommissionPaid,
}

impl EventType {
    /// Map a contract `action` attribute value to a stable event type.
    /// Tolerates the `wasm-<action>` event-name fork some chain SDK
    /// versions emit in place of a bare `wasm` type + `action` attribute.
    pub fn from_action_str(action: &str) -> Option<Self> {
        let stripped = action.strip_prefix("wasm-").unwrap_or(action);
        match stripped {
            "create_bet" => Some(EventType::BetCreated),
            "accept_bet" => Some(EventType::BetAccepted),
            "reveal" => Some(EventType::BetRevealed),
            "cancel_bet" => Some(EventType::BetCanceled),
            "claim_timeout" => Some(EventType::BetTimeoutClaimed),
            "commission_paid" => Some(EventType::CommissionPaid),
            _ => None,
        }
    }
}

// ── Jackpot ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TierId(pub u32);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JackpotTier {
    pub id: TierId,
    pub name: String,
    pub target_amount: Amount,
    pub min_games: u32,
    /// Basis points (1/10000) of each settled pot's total contributed here.
    pub contribution_bps: u32,
    pub active: bool,
    pub vip_required: Option<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    Filling,
    Drawing,
    Completed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JackpotPool {
    pub tier_id: TierId,
    pub cycle: u32,
    pub current_amount: Amount,
    pub status: PoolStatus,
    pub winner_user_id: Option<UserId>,
    pub draw_seed: Option<[u8; 32]>,
    pub completed_at: Option<Timestamp>,
}

impl JackpotPool {
    pub fn new_filling(tier_id: TierId, cycle: u32) -> Self {
        Self {
            tier_id,
            cycle,
            current_amount: Amount::from(0u8),
            status: PoolStatus::Filling,
            winner_user_id: None,
            draw_seed: None,
            completed_at: None,
        }
    }
}

/// Idempotency guard: one row per `(pool_id, bet_id)` contribution.
/// `pool_id` is `(tier_id, cycle)` — a pool instance within a tier's history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JackpotContribution {
    pub tier_id: TierId,
    pub cycle: u32,
    pub bet_id: BetId,
    pub amount: Amount,
}

/// How the indexer's startup reconciliation should treat a non-terminal bet
/// whose commitment cannot be found in the chain's open-bets listing.
/// See SPEC_FULL §4.4 — resolves the distilled spec's stated open question.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Conservatively mark the bet canceled and release funds (original
    /// behavior). Can race a late reveal per the spec's own caveat.
    Cancel,
    /// Leave the row in its current non-terminal status and raise an
    /// operator alert instead of guessing.
    Escalate,
}

impl Default for OrphanPolicy {
    fn default() -> Self {
        OrphanPolicy::Escalate
    }
}
