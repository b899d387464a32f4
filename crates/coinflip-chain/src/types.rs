//! Wire-level shapes returned by the chain's REST gateway, trimmed to the
//! fields the core actually reads. See SPEC_FULL §6.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result of a `broadcast_sync` call — the mempool-admission ("check-tx")
/// outcome, not confirmation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BroadcastResult {
    pub tx_hash: String,
    pub code: u32,
    pub raw_log: String,
}

/// A single extracted chain event, gathered from either the modern
/// (`tx_response.events[]`) or legacy (`tx_response.logs[].events[]`)
/// location — callers never need to know which one it came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEvent {
    pub event_type: String,
    pub attributes: BTreeMap<String, String>,
}

impl ChainEvent {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|s| s.as_str())
    }
}

/// Result of querying a single transaction by hash.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxQueryResult {
    pub tx_hash: String,
    pub code: u32,
    pub height: u64,
    pub raw_log: String,
    pub events: Vec<ChainEvent>,
}

// ── Raw REST response shapes ─────────────────────────────────────────────────
// Deserialized directly from the Cosmos SDK REST gateway; kept private to
// this crate and mapped into the types above at the call site.

#[derive(Deserialize)]
pub(crate) struct BroadcastTxResponse {
    pub tx_response: RawTxResponse,
}

#[derive(Deserialize)]
pub(crate) struct GetTxResponse {
    pub tx_response: RawTxResponse,
}

#[derive(Deserialize)]
pub(crate) struct RawTxResponse {
    pub txhash: String,
    pub code: u32,
    #[serde(default)]
    pub raw_log: String,
    #[serde(default)]
    pub height: String,
    #[serde(default)]
    pub events: Vec<RawEvent>,
    #[serde(default)]
    pub logs: Vec<RawLog>,
}

#[derive(Deserialize)]
pub(crate) struct RawLog {
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

#[derive(Deserialize)]
pub(crate) struct RawEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub attributes: Vec<RawAttribute>,
}

#[derive(Deserialize)]
pub(crate) struct RawAttribute {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Deserialize)]
pub(crate) struct SmartQueryResponse {
    pub data: serde_json::Value,
}

#[derive(Deserialize)]
pub(crate) struct AbciInfoResponse {
    pub block: RawBlock,
}

#[derive(Deserialize)]
pub(crate) struct RawBlock {
    pub header: RawBlockHeader,
}

#[derive(Deserialize)]
pub(crate) struct RawBlockHeader {
    pub height: String,
}

#[derive(Deserialize)]
pub(crate) struct SearchTxsResponse {
    pub tx_responses: Vec<RawTxResponse>,
}

#[derive(Deserialize)]
pub(crate) struct AccountResponse {
    pub account: RawAccount,
}

#[derive(Deserialize)]
pub(crate) struct RawAccount {
    #[serde(default)]
    pub account_number: String,
    #[serde(default)]
    pub sequence: String,
}

/// Gather events from both the modern and legacy locations of a raw tx
/// response (SPEC_FULL §9, §6 "Event-stream ambiguity"). Duplicate
/// `(type, attributes)` pairs across the two locations are not
/// deduplicated here — that is the indexer's job via `tx_events`.
pub(crate) fn extract_events(raw: &RawTxResponse) -> Vec<ChainEvent> {
    let mut out = Vec::new();
    for ev in raw.events.iter().chain(raw.logs.iter().flat_map(|l| l.events.iter())) {
        let attributes = ev
            .attributes
            .iter()
            .map(|a| (a.key.clone(), a.value.clone()))
            .collect();
        out.push(ChainEvent {
            event_type: ev.event_type.clone(),
            attributes,
        });
    }
    out
}

pub(crate) fn parse_height(s: &str) -> u64 {
    s.parse().unwrap_or(0)
}
