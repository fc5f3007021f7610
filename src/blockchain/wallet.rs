//! Wallet management and transaction signing.
//!
//! # Security
//! - Private keys come from an environment variable or an encrypted keystore
//! - Keys are never logged or serialized
//! - The wallet is read-only after construction and shared by every pipeline

use alloy::consensus::{SignableTransaction, Signed, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, TxHash};
use alloy::signers::local::PrivateKeySigner;
use std::path::Path;

use crate::blockchain::types::{BlockchainError, BlockchainResult, SignerConfig};

/// Wallet for transaction signing.
#[derive(Debug, Clone)]
pub struct Wallet {
    /// The underlying signer (private key).
    signer: PrivateKeySigner,
    /// Chain ID for EIP-155 replay protection; `None` signs Homestead-style.
    chain_id: Option<u64>,
}

impl Wallet {
    /// Create a wallet from a hex-encoded private key string.
    ///
    /// # Arguments
    /// * `private_key_hex` - Hex string (with or without 0x prefix)
    /// * `chain_id` - Chain ID for transaction signing, `None` to sign without one
    ///
    /// # Security
    /// The private key is parsed and stored securely. It is never logged.
    pub fn from_private_key(private_key_hex: &str, chain_id: Option<u64>) -> BlockchainResult<Self> {
        // Strip 0x prefix if present
        let key_hex = private_key_hex.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| BlockchainError::Wallet(format!("Invalid private key format: {}", e)))?;

        tracing::info!(
            address = %signer.address(),
            chain_id = ?chain_id,
            "Wallet initialized"
        );

        Ok(Self { signer, chain_id })
    }

    /// Load wallet from the named environment variable.
    pub fn from_env(var: &str, chain_id: Option<u64>) -> BlockchainResult<Self> {
        let private_key = std::env::var(var).map_err(|_| {
            BlockchainError::Wallet(format!("Environment variable {} not set", var))
        })?;

        Self::from_private_key(&private_key, chain_id)
    }

    /// Decrypt an encrypted JSON keystore; the password is the first line of `password_file`.
    pub fn from_keystore(
        keystore_path: &Path,
        password_file: &Path,
        chain_id: Option<u64>,
    ) -> BlockchainResult<Self> {
        let password = std::fs::read_to_string(password_file).map_err(|e| {
            BlockchainError::Wallet(format!(
                "Cannot read password file {}: {}",
                password_file.display(),
                e
            ))
        })?;
        let password = password.lines().next().unwrap_or_default();

        let signer = PrivateKeySigner::decrypt_keystore(keystore_path, password).map_err(|e| {
            BlockchainError::Wallet(format!(
                "Cannot decrypt keystore {}: {}",
                keystore_path.display(),
                e
            ))
        })?;

        tracing::info!(address = %signer.address(), "Wallet loaded from keystore");
        Ok(Self { signer, chain_id })
    }

    /// Load the wallet described by the signer config.
    pub fn from_config(config: &SignerConfig, chain_id: Option<u64>) -> BlockchainResult<Self> {
        match (&config.keystore_path, &config.password_file) {
            (Some(keystore), Some(password)) => {
                Self::from_keystore(Path::new(keystore), Path::new(password), chain_id)
            }
            (Some(_), None) => Err(BlockchainError::Wallet(
                "keystore_path set without password_file".to_string(),
            )),
            _ => Self::from_env(&config.private_key_env, chain_id),
        }
    }

    /// Get the wallet's address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Get the chain ID this wallet signs for.
    pub fn chain_id(&self) -> Option<u64> {
        self.chain_id
    }

    /// Sign a legacy transaction. The wallet's chain ID overrides whatever `tx` carries.
    pub fn sign_legacy(&self, mut tx: TxLegacy) -> BlockchainResult<Signed<TxLegacy>> {
        tx.chain_id = self.chain_id;
        let signature = self
            .signer
            .sign_transaction_sync(&mut tx)
            .map_err(|e| BlockchainError::SigningFailed(e.to_string()))?;
        Ok(tx.into_signed(signature))
    }
}

/// Canonical wire bytes and hash of a signed transaction.
pub fn encode_signed(signed: Signed<TxLegacy>) -> (TxHash, Vec<u8>) {
    let envelope = TxEnvelope::Legacy(signed);
    let hash = *envelope.tx_hash();
    (hash, envelope.encoded_2718())
}
