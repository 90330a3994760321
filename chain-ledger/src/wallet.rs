//! Node wallet: key pair plus key file persistence
//!
//! The key file `wallet-{node_id}.txt` holds the hex public key on the first
//! line and the hex secret key on the second.

use crate::crypto::KeyPair;
use crate::types::{Identity, Transaction};
use crate::{Error, Result};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};

/// Key pair owned by one node
#[derive(Debug)]
pub struct Wallet {
    node_id: String,
    keypair: KeyPair,
}

impl Wallet {
    /// Create a wallet with fresh keys
    pub fn create(node_id: impl Into<String>) -> Self {
        Self::from_keypair(node_id, KeyPair::generate())
    }

    /// Wrap an existing key pair
    pub fn from_keypair(node_id: impl Into<String>, keypair: KeyPair) -> Self {
        Self {
            node_id: node_id.into(),
            keypair,
        }
    }

    /// Path of the key file for `node_id` under `dir`
    pub fn key_file(dir: impl AsRef<Path>, node_id: &str) -> PathBuf {
        dir.as_ref().join(format!("wallet-{}.txt", node_id))
    }

    /// Load keys previously written by [`Wallet::save`]
    pub fn load(dir: impl AsRef<Path>, node_id: &str) -> Result<Self> {
        let path = Self::key_file(dir, node_id);
        let content = std::fs::read_to_string(&path)?;
        let mut lines = content.lines();

        let public = lines
            .next()
            .ok_or_else(|| Error::InvalidKey(format!("{} is empty", path.display())))?;
        let secret = lines
            .next()
            .ok_or_else(|| Error::InvalidKey(format!("{} has no secret key", path.display())))?;

        let keypair = KeyPair::from_secret_hex(secret)?;
        if keypair.identity().as_str() != public.trim() {
            return Err(Error::InvalidKey(format!(
                "public key in {} does not match secret key",
                path.display()
            )));
        }

        tracing::info!(node_id, identity = %keypair.identity(), "Wallet loaded");
        Ok(Self::from_keypair(node_id, keypair))
    }

    /// Write keys to the key file
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = Self::key_file(dir, &self.node_id);
        std::fs::write(
            &path,
            format!("{}\n{}", self.identity(), self.keypair.secret_hex()),
        )?;

        tracing::debug!(path = %path.display(), "Wallet saved");
        Ok(())
    }

    /// Node this wallet belongs to
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Public identity
    pub fn identity(&self) -> Identity {
        self.keypair.identity()
    }

    /// Underlying key pair
    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    /// Build a transaction from this wallet, signed over its canonical payload
    pub fn sign_transaction(&self, recipient: Identity, amount: Decimal) -> Transaction {
        let mut tx = Transaction::new(
            self.identity(),
            recipient,
            Default::default(),
            amount,
        );
        tx.signature = self.keypair.sign(&tx.canonical_bytes());
        tx
    }
}
