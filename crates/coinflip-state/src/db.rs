use std::path::Path;

use coinflip_core::error::CoordinatorError;
use coinflip_core::types::{
    Bet, BetId, BetStatus, JackpotContribution, JackpotPool, JackpotTier, TierId, TxEvent,
    TxHash, UserId, VaultBalance,
};

/// Durable mirror store, backed by sled (SPEC_FULL §3 "Storage").
///
/// Named trees:
///   bets                  — BetId be-bytes       → bincode(Bet)
///   bets_by_txhash        — TxHash bytes         → BetId be-bytes (pending lookup before id is known)
///   vault_balances        — UserId be-bytes      → bincode(VaultBalance)
///   tx_events             — tx_hash || event_type → bincode(TxEvent)  (dedup key)
///   jackpot_tiers         — TierId be-bytes      → bincode(JackpotTier)
///   jackpot_pools         — TierId || cycle      → bincode(JackpotPool)
///   jackpot_contributions — TierId || cycle || BetId → bincode(JackpotContribution)
///   address_book          — address utf8 bytes   → UserId be-bytes
///   meta                  — utf8 key bytes        → raw bytes
pub struct StateDb {
    _db: sled::Db,
    bets: sled::Tree,
    bets_by_txhash: sled::Tree,
    vault_balances: sled::Tree,
    tx_events: sled::Tree,
    jackpot_tiers: sled::Tree,
    jackpot_pools: sled::Tree,
    jackpot_contributions: sled::Tree,
    address_book: sled::Tree,
    meta: sled::Tree,
}

fn storage_err(e: impl std::fmt::Display) -> CoordinatorError {
    CoordinatorError::Storage(e.to_string())
}

fn ser_err(e: impl std::fmt::Display) -> CoordinatorError {
    CoordinatorError::Serialization(e.to_string())
}

impl StateDb {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CoordinatorError> {
        let db = sled::open(path).map_err(storage_err)?;
        Ok(Self {
            bets: db.open_tree("bets").map_err(storage_err)?,
            bets_by_txhash: db.open_tree("bets_by_txhash").map_err(storage_err)?,
            vault_balances: db.open_tree("vault_balances").map_err(storage_err)?,
            tx_events: db.open_tree("tx_events").map_err(storage_err)?,
            jackpot_tiers: db.open_tree("jackpot_tiers").map_err(storage_err)?,
            jackpot_pools: db.open_tree("jackpot_pools").map_err(storage_err)?,
            jackpot_contributions: db
                .open_tree("jackpot_contributions")
                .map_err(storage_err)?,
            address_book: db.open_tree("address_book").map_err(storage_err)?,
            meta: db.open_tree("meta").map_err(storage_err)?,
            _db: db,
        })
    }

    // ── Bets ─────────────────────────────────────────────────────────────────

    pub fn get_bet(&self, id: BetId) -> Result<Option<Bet>, CoordinatorError> {
        match self.bets.get(bet_key(id)).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    /// Raw bytes of a bet row, for compare-and-swap transitions.
    pub(crate) fn get_bet_raw(&self, id: BetId) -> Result<Option<sled::IVec>, CoordinatorError> {
        self.bets.get(bet_key(id)).map_err(storage_err)
    }

    pub fn put_bet(&self, bet: &Bet) -> Result<(), CoordinatorError> {
        let bytes = bincode::serialize(bet).map_err(ser_err)?;
        self.bets.insert(bet_key(bet.bet_id), bytes).map_err(storage_err)?;
        Ok(())
    }

    /// Compare-and-swap a bet row: succeeds only if the bytes currently
    /// stored equal `expected_old`. This is the atomic arbiter the bet
    /// state machine's conditional transitions rely on (SPEC_FULL §4.2).
    pub(crate) fn cas_bet(
        &self,
        id: BetId,
        expected_old: Option<&sled::IVec>,
        new: &Bet,
    ) -> Result<bool, CoordinatorError> {
        let new_bytes = bincode::serialize(new).map_err(ser_err)?;
        match self
            .bets
            .compare_and_swap(bet_key(id), expected_old, Some(new_bytes))
            .map_err(storage_err)?
        {
            Ok(()) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    pub fn bet_exists(&self, id: BetId) -> bool {
        self.bets.contains_key(bet_key(id)).unwrap_or(false)
    }

    pub fn iter_non_terminal_bets(&self) -> Result<Vec<Bet>, CoordinatorError> {
        let mut out = Vec::new();
        for item in self.bets.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let bet: Bet = bincode::deserialize(&bytes).map_err(ser_err)?;
            if !bet.status.is_terminal() {
                out.push(bet);
            }
        }
        Ok(out)
    }

    pub fn iter_bets_in_status(&self, statuses: &[BetStatus]) -> Result<Vec<Bet>, CoordinatorError> {
        let mut out = Vec::new();
        for item in self.bets.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let bet: Bet = bincode::deserialize(&bytes).map_err(ser_err)?;
            if statuses.iter().any(|s| matches_status(&bet.status, s)) {
                out.push(bet);
            }
        }
        Ok(out)
    }

    pub fn iter_all_bets(&self) -> Result<Vec<Bet>, CoordinatorError> {
        let mut out = Vec::new();
        for item in self.bets.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(bincode::deserialize(&bytes).map_err(ser_err)?);
        }
        Ok(out)
    }

    // ── Pending create (pre-id) lookup ──────────────────────────────────────

    pub fn link_txhash_to_bet(&self, tx_hash: &TxHash, id: BetId) -> Result<(), CoordinatorError> {
        self.bets_by_txhash
            .insert(tx_hash.0, id.0.to_be_bytes())
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn bet_id_for_txhash(&self, tx_hash: &TxHash) -> Result<Option<BetId>, CoordinatorError> {
        match self.bets_by_txhash.get(tx_hash.0).map_err(storage_err)? {
            Some(bytes) => {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&bytes);
                Ok(Some(BetId(u64::from_be_bytes(arr))))
            }
            None => Ok(None),
        }
    }

    /// Rewrite a pending bet's id once the chain assigns the real one,
    /// moving the row under the new key and dropping the placeholder.
    pub fn rewrite_bet_id(
        &self,
        old_id: BetId,
        new_id: BetId,
    ) -> Result<Option<Bet>, CoordinatorError> {
        let Some(bytes) = self.bets.get(bet_key(old_id)).map_err(storage_err)? else {
            return Ok(None);
        };
        let mut bet: Bet = bincode::deserialize(&bytes).map_err(ser_err)?;
        bet.bet_id = new_id;
        let new_bytes = bincode::serialize(&bet).map_err(ser_err)?;
        self.bets.insert(bet_key(new_id), new_bytes).map_err(storage_err)?;
        self.bets.remove(bet_key(old_id)).map_err(storage_err)?;
        self.link_txhash_to_bet(&bet.txhash_create, new_id)?;
        Ok(Some(bet))
    }

    // ── Vault balances ───────────────────────────────────────────────────────

    pub fn get_balance(&self, user: UserId) -> Result<Option<VaultBalance>, CoordinatorError> {
        match self.vault_balances.get(user_key(user)).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn get_balance_raw(
        &self,
        user: UserId,
    ) -> Result<Option<sled::IVec>, CoordinatorError> {
        self.vault_balances.get(user_key(user)).map_err(storage_err)
    }

    pub fn put_balance(&self, bal: &VaultBalance) -> Result<(), CoordinatorError> {
        let bytes = bincode::serialize(bal).map_err(ser_err)?;
        self.vault_balances
            .insert(user_key(bal.user_id), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    pub(crate) fn cas_balance(
        &self,
        user: UserId,
        expected_old: Option<&sled::IVec>,
        new: &VaultBalance,
    ) -> Result<bool, CoordinatorError> {
        let new_bytes = bincode::serialize(new).map_err(ser_err)?;
        match self
            .vault_balances
            .compare_and_swap(user_key(user), expected_old, Some(new_bytes))
            .map_err(storage_err)?
        {
            Ok(()) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    // ── Address book ─────────────────────────────────────────────────────────

    pub fn user_for_address(&self, address: &str) -> Result<Option<UserId>, CoordinatorError> {
        match self.address_book.get(address.as_bytes()).map_err(storage_err)? {
            Some(bytes) => {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&bytes);
                Ok(Some(UserId(u64::from_be_bytes(arr))))
            }
            None => Ok(None),
        }
    }

    pub fn link_address(&self, address: &str, user: UserId) -> Result<(), CoordinatorError> {
        self.address_book
            .insert(address.as_bytes(), user.0.to_be_bytes().to_vec())
            .map_err(storage_err)?;
        Ok(())
    }

    /// Allocate the next sequential internal user id (stored in `meta`).
    pub fn next_user_id(&self) -> Result<UserId, CoordinatorError> {
        let key = "next_user_id";
        let current = self
            .get_meta(key)?
            .map(|b| {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&b[..8]);
                u64::from_be_bytes(arr)
            })
            .unwrap_or(1);
        self.put_meta(key, &(current + 1).to_be_bytes())?;
        Ok(UserId(current))
    }

    // ── tx_events (dedup) ─────────────────────────────────────────────────────

    /// Attempt to record `(tx_hash, event_type)` as seen. Returns `true` if
    /// this is the first time (projection should proceed), `false` if it
    /// was already present (SPEC_FULL §4.4 dedup).
    pub fn record_event_if_new(&self, event: &TxEvent) -> Result<bool, CoordinatorError> {
        let key = event_key(&event.tx_hash, event.event_type);
        let bytes = bincode::serialize(event).map_err(ser_err)?;
        let prev = self
            .tx_events
            .compare_and_swap(key, None::<&[u8]>, Some(bytes))
            .map_err(storage_err)?;
        Ok(prev.is_ok())
    }

    pub fn event_seen(&self, tx_hash: &TxHash, event_type: coinflip_core::types::EventType) -> bool {
        self.tx_events
            .contains_key(event_key(tx_hash, event_type))
            .unwrap_or(false)
    }

    // ── Jackpot tiers / pools / contributions ───────────────────────────────

    pub fn get_tier(&self, id: TierId) -> Result<Option<JackpotTier>, CoordinatorError> {
        match self.jackpot_tiers.get(id.0.to_be_bytes()).map_err(storage_err)? {
            Some(b) => Ok(Some(bincode::deserialize(&b).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    pub fn put_tier(&self, tier: &JackpotTier) -> Result<(), CoordinatorError> {
        let b = bincode::serialize(tier).map_err(ser_err)?;
        self.jackpot_tiers
            .insert(tier.id.0.to_be_bytes(), b)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn iter_tiers(&self) -> Result<Vec<JackpotTier>, CoordinatorError> {
        let mut out = Vec::new();
        for item in self.jackpot_tiers.iter() {
            let (_, b) = item.map_err(storage_err)?;
            out.push(bincode::deserialize(&b).map_err(ser_err)?);
        }
        Ok(out)
    }

    pub fn get_pool(&self, tier_id: TierId, cycle: u32) -> Result<Option<JackpotPool>, CoordinatorError> {
        match self
            .jackpot_pools
            .get(pool_key(tier_id, cycle))
            .map_err(storage_err)?
        {
            Some(b) => Ok(Some(bincode::deserialize(&b).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn get_pool_raw(
        &self,
        tier_id: TierId,
        cycle: u32,
    ) -> Result<Option<sled::IVec>, CoordinatorError> {
        self.jackpot_pools
            .get(pool_key(tier_id, cycle))
            .map_err(storage_err)
    }

    pub fn put_pool(&self, pool: &JackpotPool) -> Result<(), CoordinatorError> {
        let b = bincode::serialize(pool).map_err(ser_err)?;
        self.jackpot_pools
            .insert(pool_key(pool.tier_id, pool.cycle), b)
            .map_err(storage_err)?;
        Ok(())
    }

    pub(crate) fn cas_pool(
        &self,
        tier_id: TierId,
        cycle: u32,
        expected_old: Option<&sled::IVec>,
        new: &JackpotPool,
    ) -> Result<bool, CoordinatorError> {
        let new_bytes = bincode::serialize(new).map_err(ser_err)?;
        match self
            .jackpot_pools
            .compare_and_swap(pool_key(tier_id, cycle), expected_old, Some(new_bytes))
            .map_err(storage_err)?
        {
            Ok(()) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    /// The single non-completed pool for a tier, if any (invariant: at most one).
    pub fn active_pool_for_tier(&self, tier_id: TierId) -> Result<Option<JackpotPool>, CoordinatorError> {
        let mut latest: Option<JackpotPool> = None;
        for item in self.jackpot_pools.scan_prefix(tier_id.0.to_be_bytes()) {
            let (_, b) = item.map_err(storage_err)?;
            let pool: JackpotPool = bincode::deserialize(&b).map_err(ser_err)?;
            if pool.status != coinflip_core::types::PoolStatus::Completed {
                if latest.as_ref().map(|p| pool.cycle > p.cycle).unwrap_or(true) {
                    latest = Some(pool);
                }
            }
        }
        Ok(latest)
    }

    pub fn latest_cycle_for_tier(&self, tier_id: TierId) -> Result<u32, CoordinatorError> {
        let mut max_cycle = 0u32;
        let mut any = false;
        for item in self.jackpot_pools.scan_prefix(tier_id.0.to_be_bytes()) {
            let (_, b) = item.map_err(storage_err)?;
            let pool: JackpotPool = bincode::deserialize(&b).map_err(ser_err)?;
            any = true;
            if pool.cycle > max_cycle {
                max_cycle = pool.cycle;
            }
        }
        if any {
            Ok(max_cycle)
        } else {
            Ok(0)
        }
    }

    /// Insert a contribution row iff one doesn't already exist for this
    /// `(pool, bet)` pair (SPEC_FULL §4.5 idempotency guard).
    pub fn insert_contribution_if_new(
        &self,
        contribution: &JackpotContribution,
    ) -> Result<bool, CoordinatorError> {
        let key = contribution_key(contribution.tier_id, contribution.cycle, contribution.bet_id);
        let bytes = bincode::serialize(contribution).map_err(ser_err)?;
        let prev = self
            .jackpot_contributions
            .compare_and_swap(key, None::<&[u8]>, Some(bytes))
            .map_err(storage_err)?;
        Ok(prev.is_ok())
    }

    pub fn contribution_exists(&self, tier_id: TierId, cycle: u32, bet_id: BetId) -> bool {
        self.jackpot_contributions
            .contains_key(contribution_key(tier_id, cycle, bet_id))
            .unwrap_or(false)
    }

    // ── Meta ──────────────────────────────────────────────────────────────────

    pub fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), CoordinatorError> {
        self.meta.insert(key.as_bytes(), value).map_err(storage_err)?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, CoordinatorError> {
        self.meta
            .get(key.as_bytes())
            .map(|v| v.map(|iv| iv.to_vec()))
            .map_err(storage_err)
    }

    pub fn flush(&self) -> Result<(), CoordinatorError> {
        self._db.flush().map_err(storage_err)?;
        Ok(())
    }
}

fn matches_status(a: &BetStatus, b: &BetStatus) -> bool {
    a.as_str() == b.as_str()
}

fn bet_key(id: BetId) -> [u8; 8] {
    id.0.to_be_bytes()
}

fn user_key(id: UserId) -> [u8; 8] {
    id.0.to_be_bytes()
}

fn event_key(tx_hash: &TxHash, event_type: coinflip_core::types::EventType) -> Vec<u8> {
    let mut key = tx_hash.0.to_vec();
    key.push(event_type as u8);
    key
}

fn pool_key(tier_id: TierId, cycle: u32) -> Vec<u8> {
    let mut key = tier_id.0.to_be_bytes().to_vec();
    key.extend_from_slice(&cycle.to_be_bytes());
    key
}

fn contribution_key(tier_id: TierId, cycle: u32, bet_id: BetId) -> Vec<u8> {
    let mut key = pool_key(tier_id, cycle);
    key.extend_from_slice(&bet_id.0.to_be_bytes());
    key
}
