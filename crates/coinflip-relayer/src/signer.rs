//! Holds the single signing identity the relayer broadcasts on behalf of
//! many users (SPEC_FULL §4.1 "Signing"). Mirrors the teacher's
//! `chronx_crypto::KeyPair`: secret material lives in a zeroizing buffer,
//! `Debug` never prints it, and the address is derived once at construction.

use bech32::{ToBase32, Variant};
use k256::ecdsa::signature::Signer as _;
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// secp256k1 keypair for the relayer's single signing identity, plus its
/// derived bech32 address.
pub struct RelayerSigner {
    signing_key: Zeroizing<Vec<u8>>,
    verifying_key: VerifyingKey,
    address: String,
    bech32_prefix: String,
}

impl RelayerSigner {
    /// Build a signer from a raw 32-byte secp256k1 secret scalar.
    pub fn from_secret_bytes(secret: &[u8], bech32_prefix: &str) -> Result<Self, String> {
        let signing_key =
            SigningKey::from_slice(secret).map_err(|e| format!("invalid relayer secret key: {e}"))?;
        let verifying_key = VerifyingKey::from(&signing_key);
        let address = derive_cosmos_address(&verifying_key, bech32_prefix)?;
        Ok(Self {
            signing_key: Zeroizing::new(secret.to_vec()),
            verifying_key,
            address,
            bech32_prefix: bech32_prefix.to_string(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn bech32_prefix(&self) -> &str {
        &self.bech32_prefix
    }

    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.verifying_key.to_encoded_point(true).as_bytes().to_vec()
    }

    /// Sign the canonical sign-doc bytes for a transaction.
    pub fn sign(&self, sign_doc: &[u8]) -> Result<Vec<u8>, String> {
        let signing_key = SigningKey::from_slice(&self.signing_key)
            .map_err(|e| format!("reconstructing signing key: {e}"))?;
        let sig: Signature = signing_key.sign(sign_doc);
        Ok(sig.to_bytes().to_vec())
    }
}

impl std::fmt::Debug for RelayerSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RelayerSigner {{ address: {} }}", self.address)
    }
}

/// Derive a Cosmos-SDK-family bech32 address: `ripemd160(sha256(pubkey))`.
fn derive_cosmos_address(vk: &VerifyingKey, prefix: &str) -> Result<String, String> {
    let pubkey = vk.to_encoded_point(true);
    let sha = Sha256::digest(pubkey.as_bytes());
    let ripemd = Ripemd160::digest(sha);
    bech32::encode(prefix, ripemd.to_base32(), Variant::Bech32)
        .map_err(|e| format!("bech32 encoding address: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_stable_address() {
        let secret = [7u8; 32];
        let a = RelayerSigner::from_secret_bytes(&secret, "cosmos").unwrap();
        let b = RelayerSigner::from_secret_bytes(&secret, "cosmos").unwrap();
        assert_eq!(a.address(), b.address());
        assert!(a.address().starts_with("cosmos1"));
    }

    #[test]
    fn different_secrets_different_addresses() {
        let a = RelayerSigner::from_secret_bytes(&[1u8; 32], "cosmos").unwrap();
        let b = RelayerSigner::from_secret_bytes(&[2u8; 32], "cosmos").unwrap();
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn debug_never_prints_secret() {
        let signer = RelayerSigner::from_secret_bytes(&[9u8; 32], "cosmos").unwrap();
        let debug = format!("{:?}", signer);
        assert!(!debug.contains("signing_key"));
    }
}
