//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the node client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Node connection settings.
    pub node: NodeConfig,

    /// Where the signing key comes from.
    pub signer: SignerConfig,

    /// Receipt polling bounds.
    pub confirmation: ConfirmationConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Node connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    pub failover_urls: Vec<String>,

    /// Chain ID used for EIP-155 replay protection.
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Sign with the chain ID (EIP-155). When false, Homestead-style signatures are produced.
    pub replay_protection: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: 1,
            rpc_timeout_secs: 10,
            replay_protection: true,
        }
    }
}

/// Signing key source.
///
/// An encrypted keystore wins over the environment variable when both are set.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignerConfig {
    /// Environment variable holding a hex private key.
    pub private_key_env: String,

    /// Path to an encrypted JSON keystore file.
    pub keystore_path: Option<String>,

    /// Path to a file whose first line is the keystore password.
    pub password_file: Option<String>,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            private_key_env: "NODE_CLIENT_PRIVATE_KEY".to_string(),
            keystore_path: None,
            password_file: None,
        }
    }
}

/// Confirmation polling configuration.
///
/// The attempt ceiling and the wall-clock timeout are independent bounds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Delay between receipt polls in milliseconds.
    pub poll_interval_ms: u64,

    /// Maximum number of receipt-absent polls.
    pub max_attempts: u32,

    /// Overall deadline in seconds.
    pub timeout_secs: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_attempts: 30,
            timeout_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
