//! The fixed-interval, bounded-window confirmation poll every background
//! task waits on before deciding whether to defer, revert, or leave a bet
//! in its transitional state (SPEC_FULL §4.2).

use std::time::Duration;

use coinflip_chain::ChainClient;
use tracing::warn;

/// Poll window a confirmation wait runs under; game actions get the
/// shorter window, longer-running submissions the extended one (SPEC_FULL
/// §5 timeouts table).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollWindow {
    Game,
    Long,
}

impl PollWindow {
    fn duration(self) -> Duration {
        match self {
            PollWindow::Game => Duration::from_secs(coinflip_core::CONFIRM_POLL_WINDOW_GAME_SECS),
            PollWindow::Long => Duration::from_secs(coinflip_core::CONFIRM_POLL_WINDOW_LONG_SECS),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// `code == 0` and the chain has indexed the tx; the indexer owns the
    /// rest of the transition from here.
    Confirmed,
    /// `code != 0`; carries the chain's raw log for the failure notification.
    Rejected { raw_log: String },
    /// The poll window elapsed with the tx still unindexed.
    TimedOut,
}

/// Poll `query_tx` at `CONFIRM_POLL_INTERVAL_SECS` until the tx is indexed
/// or `window` elapses. A transient query error is logged and treated the
/// same as "not yet indexed" — it does not shorten the window.
pub async fn poll_confirmation<C: ChainClient>(
    chain: &C,
    tx_hash: &str,
    window: PollWindow,
) -> ConfirmOutcome {
    let interval = Duration::from_secs(coinflip_core::CONFIRM_POLL_INTERVAL_SECS);
    let deadline = tokio::time::Instant::now() + window.duration();

    loop {
        match chain.query_tx(tx_hash).await {
            Ok(Some(result)) if result.code == 0 => return ConfirmOutcome::Confirmed,
            Ok(Some(result)) => return ConfirmOutcome::Rejected { raw_log: result.raw_log },
            Ok(None) => {}
            Err(e) => warn!(tx_hash, error = %e, "transient error polling for tx confirmation"),
        }

        if tokio::time::Instant::now() >= deadline {
            return ConfirmOutcome::TimedOut;
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coinflip_chain::{ChainEvent, MockChainClient, TxQueryResult};

    #[tokio::test]
    async fn confirmed_on_code_zero() {
        let chain = MockChainClient::new();
        chain.set_tx(
            "AA",
            TxQueryResult {
                tx_hash: "AA".into(),
                code: 0,
                height: 5,
                raw_log: String::new(),
                events: Vec::<ChainEvent>::new(),
            },
        );
        let outcome = poll_confirmation(&chain, "AA", PollWindow::Game).await;
        assert_eq!(outcome, ConfirmOutcome::Confirmed);
    }

    #[tokio::test]
    async fn rejected_carries_raw_log() {
        let chain = MockChainClient::new();
        chain.set_tx(
            "BB",
            TxQueryResult {
                tx_hash: "BB".into(),
                code: 5,
                height: 5,
                raw_log: "out of gas".into(),
                events: Vec::<ChainEvent>::new(),
            },
        );
        let outcome = poll_confirmation(&chain, "BB", PollWindow::Game).await;
        assert_eq!(outcome, ConfirmOutcome::Rejected { raw_log: "out of gas".into() });
    }
}
