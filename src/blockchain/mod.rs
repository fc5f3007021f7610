//! Node client subsystem.
//!
//! # Data Flow
//! ```text
//! TransactionIntent
//!     → transaction.rs (build, estimate, sign, broadcast)
//!     → confirmation.rs (poll receipt until terminal)
//!     → deploy.rs (one pipeline + tracker per compiled contract)
//!
//! node JSON (hex quantities)
//!     → models.rs (serde records)
//!     → mapper.rs (normalize to decimal, merge receipts)
//! ```
//!
//! # Security Constraints
//! - Private keys come from the environment or an encrypted keystore only
//! - Never log private keys or sensitive data
//! - All RPC calls have configurable timeouts

pub mod client;
pub mod compiler;
pub mod confirmation;
pub mod contract;
pub mod deploy;
pub mod mapper;
pub mod models;
pub mod quantity;
pub mod transaction;
pub mod transport;
pub mod types;
pub mod wallet;

pub use client::BlockchainClient;
pub use confirmation::{ConfirmationHandle, ConfirmationPolicy, ConfirmationTracker, ReceiptFetcher};
pub use deploy::{DeployedContract, DeploymentCoordinator};
pub use mapper::{BlockRef, Normalize};
pub use transaction::{TransactionIntent, TxPipeline};
pub use transport::{HttpTransport, RpcTransport};
pub use types::{BlockchainError, BlockchainResult, Consensus, OperationKind};
pub use wallet::Wallet;
