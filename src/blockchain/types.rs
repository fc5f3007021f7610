//! Chain-specific types and error definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::config::schema::{ConfirmationConfig, NodeConfig, SignerConfig};

/// Label attached to every contract deployment failure.
pub const DEPLOY_CONTRACT_OP: &str = "DeployContract";

/// Label attached to contract invocation failures.
pub const INVOKE_CONTRACT_OP: &str = "InvokeContract";

/// Label attached to plain value transfers.
pub const SEND_TRANSACTION_OP: &str = "SendTransaction";

/// What a transaction is meant to do on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Plain native-currency transfer.
    Transfer,
    /// Contract creation; the payload is the init code and there is no recipient.
    ContractCreate,
    /// Call into an existing contract.
    ContractCall,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Transfer => "transfer",
            OperationKind::ContractCreate => "contract_create",
            OperationKind::ContractCall => "contract_call",
        }
    }
}

/// Consensus engine advertised by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consensus {
    Poa,
    Raft,
    Pow,
    Scrypt,
    Unknown,
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// Numeric literal could not be parsed, or was negative.
    #[error("Invalid number '{input}': {reason}")]
    InvalidNumber { input: String, reason: &'static str },

    /// A wire field that must be numeric did not parse during normalization.
    #[error("Malformed quantity in field '{field}': '{value}'")]
    MalformedQuantity { field: &'static str, value: String },

    /// Caller-supplied argument failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Gas price suggestion or gas estimation failed.
    #[error("Gas estimation failed: {0}")]
    GasEstimationFailed(String),

    /// The transaction could not be signed.
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// The node refused the raw transaction.
    #[error("Broadcast failed: {0}")]
    BroadcastFailed(String),

    /// No receipt after the maximum number of polls.
    #[error("get txId:{tx_hash} opType({op_label}) gave no receipt after {attempts} polls")]
    PollLimitExceeded {
        tx_hash: String,
        op_label: String,
        attempts: u32,
    },

    /// No receipt before the confirmation deadline.
    #[error("get txId:{tx_hash} opType({op_label}) timeout({secs}s)")]
    Timeout {
        tx_hash: String,
        op_label: String,
        secs: u64,
    },

    /// The transaction was mined but its execution failed.
    #[error("{op_label} was mined in tx {tx_hash} but reverted, bloom: {bloom}")]
    OnChainRevert {
        tx_hash: String,
        op_label: String,
        bloom: String,
    },

    /// The receipt predates status codes and carries only a state root.
    #[error("Receipt for {tx_hash} has no status field")]
    MissingStatus { tx_hash: String },

    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Transport(String),

    /// The node has no record matching the request.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The node returned a payload we could not decode.
    #[error("Failed to decode {method} response: {reason}")]
    Decode { method: String, reason: String },

    /// Invalid private key format or derivation error.
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Solidity compilation failed.
    #[error("Compiler error: {0}")]
    Compiler(String),

    /// The client was closed while the request was in flight.
    #[error("Request cancelled: client closed")]
    Cancelled,

    /// A failure inside a named operation.
    #[error("{label} failed: {source}")]
    Operation {
        label: String,
        #[source]
        source: Box<BlockchainError>,
    },
}

impl BlockchainError {
    /// Wrap this error with the name of the operation that produced it.
    pub fn in_operation(self, label: impl Into<String>) -> Self {
        BlockchainError::Operation {
            label: label.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with operation labels peeled away.
    pub fn root_cause(&self) -> &BlockchainError {
        match self {
            BlockchainError::Operation { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether sending the same transaction again may succeed.
    ///
    /// A confirmed revert is final; resubmitting it only burns gas.
    pub fn is_resubmittable(&self) -> bool {
        matches!(
            self.root_cause(),
            BlockchainError::Transport(_)
                | BlockchainError::BroadcastFailed(_)
                | BlockchainError::GasEstimationFailed(_)
                | BlockchainError::PollLimitExceeded { .. }
                | BlockchainError::Timeout { .. }
                | BlockchainError::Cancelled
        )
    }
}

/// Result type for blockchain operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;
