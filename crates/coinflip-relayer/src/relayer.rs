//! The relayer: one signing identity, one broadcast mutex, one
//! per-address in-flight guard (SPEC_FULL §4.1, §5).

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use coinflip_chain::client::ChainClient;
use coinflip_core::error::CoordinatorError;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::message::{Action, Fee, TxBuilder};
use crate::signer::RelayerSigner;

/// Broadcast mode. Only `AsyncBroadcast` is implemented — the spec
/// explicitly scopes the relayer to returning after check-tx, leaving
/// confirmation to the caller's background task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayMode {
    AsyncBroadcast,
}

#[derive(Clone, Debug)]
pub struct RelayResult {
    pub success: bool,
    pub tx_hash: Option<String>,
    pub raw_log: Option<String>,
    pub error: Option<CoordinatorError>,
}

impl RelayResult {
    fn ok(tx_hash: String) -> Self {
        Self {
            success: true,
            tx_hash: Some(tx_hash),
            raw_log: None,
            error: None,
        }
    }

    fn err(error: CoordinatorError, raw_log: Option<String>) -> Self {
        Self {
            success: false,
            tx_hash: None,
            raw_log,
            error: Some(error),
        }
    }
}

/// Cached `(account_number, sequence)` pair for the relayer's own signer,
/// guarded by an async mutex held across the sign+broadcast call — this is
/// the process-wide serialization point the spec requires.
struct SequenceCache {
    account_number: Option<u64>,
    sequence: Option<u64>,
}

/// Per-address cooldown window. A second action for the same address
/// within the window fails fast with `ActionInProgress` rather than
/// queueing behind the broadcast mutex.
struct InFlightGuard {
    entries: StdMutex<HashMap<String, Instant>>,
}

impl InFlightGuard {
    fn new() -> Self {
        Self {
            entries: StdMutex::new(HashMap::new()),
        }
    }

    /// Attempt to acquire the guard for `address`. Returns `false` if an
    /// action is already in progress within `window`.
    fn try_acquire(&self, address: &str, window: Duration) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        if let Some(started) = entries.get(address) {
            if now.duration_since(*started) < window {
                return false;
            }
        }
        entries.insert(address.to_string(), now);
        true
    }

    fn release(&self, address: &str) {
        self.entries.lock().unwrap().remove(address);
    }
}

/// Which cooldown tier an action falls into (SPEC_FULL §5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionClass {
    Game,
    Vault,
}

impl ActionClass {
    fn window(&self) -> Duration {
        match self {
            ActionClass::Game => Duration::from_secs(coinflip_core::IN_FLIGHT_GUARD_GAME_SECS),
            ActionClass::Vault => Duration::from_secs(coinflip_core::IN_FLIGHT_GUARD_VAULT_SECS),
        }
    }
}

impl From<Action> for ActionClass {
    fn from(a: Action) -> Self {
        match a {
            Action::Withdraw => ActionClass::Vault,
            _ => ActionClass::Game,
        }
    }
}

pub struct Relayer<C: ChainClient> {
    chain: C,
    signer: Option<RelayerSigner>,
    builder: TxBuilder,
    fee: Fee,
    seq_cache: AsyncMutex<SequenceCache>,
    in_flight: InFlightGuard,
}

impl<C: ChainClient> Relayer<C> {
    pub fn new(chain: C, signer: Option<RelayerSigner>, builder: TxBuilder, fee: Fee) -> Self {
        Self {
            chain,
            signer,
            builder,
            fee,
            seq_cache: AsyncMutex::new(SequenceCache {
                account_number: None,
                sequence: None,
            }),
            in_flight: InFlightGuard::new(),
        }
    }

    pub fn address(&self) -> Option<&str> {
        self.signer.as_ref().map(|s| s.address())
    }

    /// Acquire the per-address in-flight guard for `address`, classed by
    /// `action`. Returns an error if another action is already pending.
    pub fn acquire_in_flight(&self, address: &str, action: Action) -> Result<(), CoordinatorError> {
        let class: ActionClass = action.into();
        if self.in_flight.try_acquire(address, class.window()) {
            Ok(())
        } else {
            Err(CoordinatorError::ActionInProgress)
        }
    }

    pub fn release_in_flight(&self, address: &str) {
        self.in_flight.release(address);
    }

    /// Look up (or fetch and cache) the relayer's own `(account_number, sequence)`.
    async fn resolve_sequence(
        &self,
        cache: &mut SequenceCache,
    ) -> Result<(u64, u64), CoordinatorError> {
        if let (Some(an), Some(seq)) = (cache.account_number, cache.sequence) {
            return Ok((an, seq));
        }
        let signer = self.signer.as_ref().ok_or(CoordinatorError::RelayerNotReady)?;
        let (account_number, sequence) = self.chain.query_account(signer.address()).await?;
        cache.account_number = Some(account_number);
        cache.sequence = Some(sequence);
        Ok((account_number, sequence))
    }

    /// Relay `action` on behalf of `on_behalf_of`. Caller must already hold
    /// the in-flight guard for `on_behalf_of` (via `acquire_in_flight`).
    pub async fn relay(
        &self,
        action: Action,
        on_behalf_of: &str,
        payload: serde_json::Value,
        _mode: RelayMode,
    ) -> RelayResult {
        let signer = match self.signer.as_ref() {
            Some(s) => s,
            None => return RelayResult::err(CoordinatorError::RelayerNotReady, None),
        };

        // Hold the broadcast mutex for the duration of sign+broadcast —
        // the single serialization point for all outbound sequence numbers.
        let mut cache = self.seq_cache.lock().await;

        let mut retries_left = coinflip_core::MAX_SEQ_RETRIES;
        loop {
            let (account_number, sequence) = match self.resolve_sequence(&mut cache).await {
                Ok(v) => v,
                Err(e) => return RelayResult::err(e, None),
            };

            let signed = match self.builder.build_signed(
                signer,
                action,
                on_behalf_of,
                payload.clone(),
                account_number,
                sequence,
                self.fee.clone(),
            ) {
                Ok(tx) => tx,
                Err(e) => return RelayResult::err(CoordinatorError::Other(e), None),
            };

            match self.chain.broadcast_sync(signed.to_bytes()).await {
                Ok(result) if result.code == 0 => {
                    cache.sequence = Some(sequence + 1);
                    info!(tx_hash = %result.tx_hash, action = action_name(action), "relayed action");
                    return RelayResult::ok(result.tx_hash);
                }
                Ok(result) => {
                    if let Some(expected) = parse_expected_sequence(&result.raw_log) {
                        if retries_left > 0 {
                            retries_left -= 1;
                            warn!(
                                expected,
                                got = sequence,
                                "sequence mismatch, retrying with corrected sequence"
                            );
                            cache.sequence = Some(expected);
                            continue;
                        }
                        return RelayResult::err(
                            CoordinatorError::SequenceMismatch { expected },
                            Some(result.raw_log),
                        );
                    }
                    return RelayResult::err(
                        CoordinatorError::CheckTxRejected {
                            raw_log: result.raw_log.clone(),
                        },
                        Some(result.raw_log),
                    );
                }
                Err(e) => return RelayResult::err(e, None),
            }
        }
    }
}

fn action_name(action: Action) -> &'static str {
    action.contract_method()
}

/// Parse the chain's `expected N` sequence-mismatch hint out of a raw log
/// line, e.g. `"account sequence mismatch, expected 42, got 41"`.
fn parse_expected_sequence(raw_log: &str) -> Option<u64> {
    let idx = raw_log.find("expected ")?;
    let rest = &raw_log[idx + "expected ".len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_expected_sequence_hint() {
        let log = "account sequence mismatch, expected 42, got 41: incorrect account sequence";
        assert_eq!(parse_expected_sequence(log), Some(42));
    }

    #[test]
    fn no_hint_returns_none() {
        assert_eq!(parse_expected_sequence("insufficient funds"), None);
    }

    #[test]
    fn in_flight_guard_blocks_second_attempt() {
        let guard = InFlightGuard::new();
        assert!(guard.try_acquire("addr1", Duration::from_secs(1)));
        assert!(!guard.try_acquire("addr1", Duration::from_secs(1)));
        guard.release("addr1");
        assert!(guard.try_acquire("addr1", Duration::from_secs(1)));
    }
}
