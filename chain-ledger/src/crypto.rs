//! Signing capability used by the ledger
//!
//! This module provides:
//! - Ed25519 key pair generation and signing
//! - Verification keyed by a participant [`Identity`] (hex public key)

use crate::types::{Identity, TxSignature};
use crate::{Error, Result};
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};

/// Ed25519 key pair for signing
#[derive(Debug)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_seed(&rand::random::<[u8; 32]>())
    }

    /// Create from seed (32 bytes) - deterministic generation
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Restore from a hex-encoded secret key
    pub fn from_secret_hex(secret: &str) -> Result<Self> {
        let raw = hex::decode(secret.trim())
            .map_err(|e| Error::InvalidKey(format!("secret key is not hex: {}", e)))?;
        let seed: [u8; 32] = raw
            .try_into()
            .map_err(|_| Error::InvalidKey("secret key must be 32 bytes".to_string()))?;
        Ok(Self::from_seed(&seed))
    }

    /// Public identity (hex public key)
    pub fn identity(&self) -> Identity {
        Identity::new(hex::encode(self.verifying_key.to_bytes()))
    }

    /// Hex-encoded secret key (USE WITH CAUTION - should be protected)
    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Sign a payload
    pub fn sign(&self, payload: &[u8]) -> TxSignature {
        TxSignature::from_bytes(self.signing_key.sign(payload).to_bytes())
    }
}

/// Verify `signature` over `payload` with the key encoded in `identity`
///
/// Malformed identities or signatures verify as false.
pub fn verify_signature(identity: &Identity, payload: &[u8], signature: &TxSignature) -> bool {
    let Some(sig_bytes) = signature.to_bytes() else {
        return false;
    };

    let key_bytes: [u8; 32] = match hex::decode(identity.as_str()) {
        Ok(raw) => match raw.try_into() {
            Ok(bytes) => bytes,
            Err(_) => return false,
        },
        Err(_) => return false,
    };

    let verifying_key = match VerifyingKey::from_bytes(&key_bytes) {
        Ok(key) => key,
        Err(_) => return false,
    };

    verifying_key
        .verify(payload, &DalekSignature::from_bytes(&sig_bytes))
        .is_ok()
}
