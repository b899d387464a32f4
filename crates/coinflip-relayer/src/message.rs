//! Builds the signed transaction bytes for a relayed action (SPEC_FULL
//! §4.1, step 3-4). The contract address, chain id, and relayer's own
//! address are the only pieces of chain-specific knowledge baked in here;
//! everything else is assembled from the caller's payload.

use serde::{Deserialize, Serialize};

use crate::signer::RelayerSigner;

/// A high-level action the relayer can execute on a player's behalf.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CreateBet,
    AcceptBet,
    Reveal,
    CancelBet,
    ClaimTimeout,
    Withdraw,
}

impl Action {
    pub fn contract_method(&self) -> &'static str {
        match self {
            Action::CreateBet => "create_bet",
            Action::AcceptBet => "accept_bet",
            Action::Reveal => "reveal",
            Action::CancelBet => "cancel_bet",
            Action::ClaimTimeout => "claim_timeout",
            Action::Withdraw => "withdraw",
        }
    }
}

/// Fee for the outer transaction. `granter`, when set, sponsors gas from a
/// treasury account (e.g. for VIP users) instead of the relayer's own
/// balance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Fee {
    pub amount: String,
    pub denom: String,
    pub gas_limit: u64,
    pub granter: Option<String>,
}

/// An authz-wrapped `MsgExecuteContract`, addressed to the on-behalf-of
/// granter, ready to be signed and broadcast by the relayer.
///
/// This models the Cosmos SDK `MsgExec { grantee, msgs: [MsgExecuteContract] }`
/// shape at the JSON level; exact protobuf/amino byte encoding is the
/// chain client's concern and is out of scope for the coordination core.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthzExecMessage {
    pub grantee: String,
    pub granter: String,
    pub contract_addr: String,
    pub method: String,
    pub payload: serde_json::Value,
}

/// The full sign-doc: body + auth info (account/sequence/chain id/fee),
/// mirroring what a Cosmos SDK `SignDoc` covers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignDoc {
    pub chain_id: String,
    pub account_number: u64,
    pub sequence: u64,
    pub fee: Fee,
    pub msg: AuthzExecMessage,
}

/// A signed, broadcast-ready transaction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignedTx {
    pub sign_doc: SignDoc,
    pub signature: Vec<u8>,
    pub signer_pubkey: Vec<u8>,
}

impl SignedTx {
    /// Canonical bytes handed to `ChainClient::broadcast_sync`.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("SignDoc serializes infallibly")
    }
}

pub struct TxBuilder {
    pub chain_id: String,
    pub contract_addr: String,
}

impl TxBuilder {
    pub fn new(chain_id: impl Into<String>, contract_addr: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            contract_addr: contract_addr.into(),
        }
    }

    /// Build and sign a transaction executing `action` on behalf of
    /// `on_behalf_of`, at the given `(account_number, sequence)`.
    pub fn build_signed(
        &self,
        signer: &RelayerSigner,
        action: Action,
        on_behalf_of: &str,
        payload: serde_json::Value,
        account_number: u64,
        sequence: u64,
        fee: Fee,
    ) -> Result<SignedTx, String> {
        let msg = AuthzExecMessage {
            grantee: signer.address().to_string(),
            granter: on_behalf_of.to_string(),
            contract_addr: self.contract_addr.clone(),
            method: action.contract_method().to_string(),
            payload,
        };
        let sign_doc = SignDoc {
            chain_id: self.chain_id.clone(),
            account_number,
            sequence,
            fee,
            msg,
        };
        let bytes = serde_json::to_vec(&sign_doc).map_err(|e| format!("encoding sign doc: {e}"))?;
        let signature = signer.sign(&bytes)?;
        Ok(SignedTx {
            sign_doc,
            signature,
            signer_pubkey: signer.public_key_bytes(),
        })
    }
}
