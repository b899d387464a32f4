//! An in-memory stand-in for [`ChainClient`], used by every other crate's
//! test suite instead of a live chain node (SPEC_FULL §8 "Test tooling").
//! Programmed with canned responses; records every broadcast for assertions.

use std::collections::HashMap;
use std::sync::Mutex;

use coinflip_core::error::CoordinatorError;

use crate::client::ChainClient;
use crate::types::{BroadcastResult, TxQueryResult};

#[derive(Default)]
pub struct MockChainClient {
    inner: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    height: u64,
    broadcasts: Vec<Vec<u8>>,
    next_broadcast: std::collections::VecDeque<BroadcastResult>,
    txs: HashMap<String, TxQueryResult>,
    blocks: HashMap<u64, Vec<TxQueryResult>>,
    contract_responses: std::collections::VecDeque<serde_json::Value>,
    accounts: HashMap<String, (u64, u64)>,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_height(&self, height: u64) {
        self.inner.lock().unwrap().height = height;
    }

    pub fn queue_broadcast(&self, result: BroadcastResult) {
        self.inner.lock().unwrap().next_broadcast.push_back(result);
    }

    pub fn set_tx(&self, hash: &str, result: TxQueryResult) {
        self.inner.lock().unwrap().txs.insert(hash.to_string(), result);
    }

    pub fn set_block(&self, height: u64, txs: Vec<TxQueryResult>) {
        self.inner.lock().unwrap().blocks.insert(height, txs);
    }

    pub fn queue_contract_response(&self, value: serde_json::Value) {
        self.inner
            .lock()
            .unwrap()
            .contract_responses
            .push_back(value);
    }

    pub fn broadcasts(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().broadcasts.clone()
    }

    pub fn set_account(&self, address: &str, account_number: u64, sequence: u64) {
        self.inner
            .lock()
            .unwrap()
            .accounts
            .insert(address.to_string(), (account_number, sequence));
    }
}

impl ChainClient for MockChainClient {
    async fn broadcast_sync(&self, tx_bytes: Vec<u8>) -> Result<BroadcastResult, CoordinatorError> {
        let mut state = self.inner.lock().unwrap();
        state.broadcasts.push(tx_bytes);
        Ok(state.next_broadcast.pop_front().unwrap_or(BroadcastResult {
            tx_hash: "MOCKHASH".into(),
            code: 0,
            raw_log: String::new(),
        }))
    }

    async fn query_tx(&self, tx_hash: &str) -> Result<Option<TxQueryResult>, CoordinatorError> {
        Ok(self.inner.lock().unwrap().txs.get(tx_hash).cloned())
    }

    async fn query_contract(
        &self,
        _contract_addr: &str,
        _payload: serde_json::Value,
    ) -> Result<serde_json::Value, CoordinatorError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .contract_responses
            .pop_front()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn current_height(&self) -> Result<u64, CoordinatorError> {
        Ok(self.inner.lock().unwrap().height)
    }

    async fn txs_at_height(&self, height: u64) -> Result<Vec<TxQueryResult>, CoordinatorError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .blocks
            .get(&height)
            .cloned()
            .unwrap_or_default())
    }

    async fn query_account(&self, address: &str) -> Result<(u64, u64), CoordinatorError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .accounts
            .get(address)
            .copied()
            .unwrap_or((0, 0)))
    }
}
