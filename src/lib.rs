//! JSON-RPC client for EVM nodes: transaction pipeline, confirmation
//! tracking, contract deployment and wire-to-domain normalization.

pub mod blockchain;
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use blockchain::{BlockchainClient, BlockchainError, BlockchainResult};
pub use config::ClientConfig;
pub use lifecycle::Shutdown;
