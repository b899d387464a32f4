//! Thin, synchronous-feeling adapter over the chain's RPC/REST surfaces
//! (SPEC_FULL §4.6). Retries transient network errors only; application
//! errors (4xx/5xx, non-zero check-tx code) propagate verbatim.

use std::time::Duration;

use coinflip_core::error::CoordinatorError;
use tracing::warn;

use crate::types::{
    extract_events, parse_height, AbciInfoResponse, AccountResponse, BroadcastTxResponse,
    GetTxResponse, SearchTxsResponse, SmartQueryResponse,
};
use crate::types::{BroadcastResult, TxQueryResult};

const CHAIN_CALL_TIMEOUT: Duration = Duration::from_secs(coinflip_core::CHAIN_CALL_TIMEOUT_SECS);

/// The three chain primitives the rest of the core depends on, plus block
/// height polling. Implemented once over `reqwest`; tests substitute an
/// in-memory stub that implements the same trait.
pub trait ChainClient: Send + Sync {
    /// Broadcast a signed transaction in `BROADCAST_MODE_SYNC`. Returns once
    /// check-tx (mempool admission) completes — not confirmation.
    fn broadcast_sync(
        &self,
        tx_bytes: Vec<u8>,
    ) -> impl std::future::Future<Output = Result<BroadcastResult, CoordinatorError>> + Send;

    /// Query a transaction by hash. `Ok(None)` means the chain has not
    /// indexed it yet (distinct from a network error).
    fn query_tx(
        &self,
        tx_hash: &str,
    ) -> impl std::future::Future<Output = Result<Option<TxQueryResult>, CoordinatorError>> + Send;

    /// Smart-contract query against `contract_addr` with a JSON payload
    /// (base64-encoded on the wire per the Cosmos REST gateway convention).
    fn query_contract(
        &self,
        contract_addr: &str,
        payload: serde_json::Value,
    ) -> impl std::future::Future<Output = Result<serde_json::Value, CoordinatorError>> + Send;

    /// Current chain height, used as the indexer's polling cursor.
    fn current_height(
        &self,
    ) -> impl std::future::Future<Output = Result<u64, CoordinatorError>> + Send;

    /// All confirmed (`code = 0` or not) transactions included in block
    /// `height`, used by the indexer's block-polling loop.
    fn txs_at_height(
        &self,
        height: u64,
    ) -> impl std::future::Future<Output = Result<Vec<TxQueryResult>, CoordinatorError>> + Send;

    /// `(account_number, sequence)` for a signer address, used by the
    /// relayer to seed its sequence cache. Not one of the four primitives
    /// named in SPEC_FULL §4.6, but implied by the relayer's algorithm
    /// ("fetch cached (account_number, sequence); if absent, query").
    fn query_account(
        &self,
        address: &str,
    ) -> impl std::future::Future<Output = Result<(u64, u64), CoordinatorError>> + Send;
}

/// HTTP implementation speaking the Cosmos SDK REST gateway.
pub struct HttpChainClient {
    client: reqwest::Client,
    rest_base: String,
}

impl HttpChainClient {
    pub fn new(rest_base: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(CHAIN_CALL_TIMEOUT)
            .build()
            .expect("reqwest client builder with static config is infallible");
        Self {
            client,
            rest_base: rest_base.into(),
        }
    }

    /// Retry only on transport-level failure (connect/timeout); an HTTP
    /// response of any status is returned immediately so callers see chain
    /// errors verbatim.
    async fn with_retry<T, F, Fut>(&self, mut f: F) -> Result<T, CoordinatorError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, reqwest::Error>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_connect() || e.is_timeout() => {
                    if attempt >= coinflip_core::CHAIN_CALL_RETRY_ATTEMPTS {
                        return Err(CoordinatorError::ChainUnavailable(e.to_string()));
                    }
                    warn!(attempt, error = %e, "transient chain RPC error, retrying");
                    tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
                }
                Err(e) => return Err(CoordinatorError::ChainUnavailable(e.to_string())),
            }
        }
    }

    fn smart_query_url(&self, contract_addr: &str, payload: &serde_json::Value) -> String {
        use base64::Engine;
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(payload.to_string().as_bytes());
        format!(
            "{}/cosmwasm/wasm/v1/contract/{}/smart/{}",
            self.rest_base, contract_addr, encoded
        )
    }
}

impl ChainClient for HttpChainClient {
    async fn broadcast_sync(&self, tx_bytes: Vec<u8>) -> Result<BroadcastResult, CoordinatorError> {
        use base64::Engine;
        let body = serde_json::json!({
            "tx_bytes": base64::engine::general_purpose::STANDARD.encode(&tx_bytes),
            "mode": "BROADCAST_MODE_SYNC",
        });
        let url = format!("{}/cosmos/tx/v1beta1/txs", self.rest_base);

        let resp = self
            .with_retry(|| self.client.post(&url).json(&body).send())
            .await?;

        let parsed: BroadcastTxResponse = resp
            .json()
            .await
            .map_err(|e| CoordinatorError::Other(format!("decoding broadcast response: {e}")))?;

        Ok(BroadcastResult {
            tx_hash: parsed.tx_response.txhash,
            code: parsed.tx_response.code,
            raw_log: parsed.tx_response.raw_log,
        })
    }

    async fn query_tx(&self, tx_hash: &str) -> Result<Option<TxQueryResult>, CoordinatorError> {
        let url = format!("{}/cosmos/tx/v1beta1/txs/{}", self.rest_base, tx_hash);
        let resp = self.with_retry(|| self.client.get(&url).send()).await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            // Not-yet-indexed is usually a 404 on this gateway, but some
            // chain versions answer with a generic error code — treat any
            // non-success as "not found yet" rather than a hard failure,
            // since callers poll this repeatedly until it resolves.
            return Ok(None);
        }

        let parsed: GetTxResponse = resp
            .json()
            .await
            .map_err(|e| CoordinatorError::Other(format!("decoding tx query response: {e}")))?;
        let raw = parsed.tx_response;
        Ok(Some(TxQueryResult {
            tx_hash: raw.txhash.clone(),
            code: raw.code,
            height: parse_height(&raw.height),
            raw_log: raw.raw_log.clone(),
            events: extract_events(&raw),
        }))
    }

    async fn query_contract(
        &self,
        contract_addr: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, CoordinatorError> {
        let url = self.smart_query_url(contract_addr, &payload);
        let resp = self.with_retry(|| self.client.get(&url).send()).await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CoordinatorError::Other(format!(
                "contract query failed ({status}): {text}"
            )));
        }

        let parsed: SmartQueryResponse = resp
            .json()
            .await
            .map_err(|e| CoordinatorError::Other(format!("decoding smart query response: {e}")))?;
        Ok(parsed.data)
    }

    async fn current_height(&self) -> Result<u64, CoordinatorError> {
        let url = format!(
            "{}/cosmos/base/tendermint/v1beta1/blocks/latest",
            self.rest_base
        );
        let resp = self.with_retry(|| self.client.get(&url).send()).await?;
        let parsed: AbciInfoResponse = resp
            .json()
            .await
            .map_err(|e| CoordinatorError::Other(format!("decoding latest-block response: {e}")))?;
        Ok(parse_height(&parsed.block.header.height))
    }

    async fn txs_at_height(&self, height: u64) -> Result<Vec<TxQueryResult>, CoordinatorError> {
        let url = format!(
            "{}/cosmos/tx/v1beta1/txs?events=tx.height={}",
            self.rest_base, height
        );
        let resp = self.with_retry(|| self.client.get(&url).send()).await?;
        let parsed: SearchTxsResponse = resp
            .json()
            .await
            .map_err(|e| CoordinatorError::Other(format!("decoding search-txs response: {e}")))?;

        Ok(parsed
            .tx_responses
            .iter()
            .map(|raw| TxQueryResult {
                tx_hash: raw.txhash.clone(),
                code: raw.code,
                height: parse_height(&raw.height),
                raw_log: raw.raw_log.clone(),
                events: extract_events(raw),
            })
            .collect())
    }

    async fn query_account(&self, address: &str) -> Result<(u64, u64), CoordinatorError> {
        let url = format!(
            "{}/cosmos/auth/v1beta1/accounts/{}",
            self.rest_base, address
        );
        let resp = self.with_retry(|| self.client.get(&url).send()).await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok((0, 0));
        }
        let parsed: AccountResponse = resp
            .json()
            .await
            .map_err(|e| CoordinatorError::Other(format!("decoding account response: {e}")))?;
        let account_number = parsed.account.account_number.parse().unwrap_or(0);
        let sequence = parsed.account.sequence.parse().unwrap_or(0);
        Ok((account_number, sequence))
    }
}
