//! Wire-level records returned by the node.
//!
//! Numeric fields arrive as `0x` hex strings and are rewritten in place to
//! decimal by [`crate::blockchain::mapper::Normalize`]. Field names follow the
//! node's camelCase JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::blockchain::quantity::parse_quantity;
use crate::blockchain::types::{BlockchainError, BlockchainResult, Consensus};

/// Block header fields shared by blocks and uncle headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub hash: Option<String>,
    pub parent_hash: String,
    #[serde(rename = "sha3Uncles")]
    pub uncle_hash: String,
    #[serde(rename = "miner")]
    pub coinbase: String,
    #[serde(rename = "stateRoot")]
    pub root: String,
    #[serde(rename = "transactionsRoot")]
    pub tx_hash: String,
    #[serde(rename = "receiptsRoot")]
    pub receipt_hash: String,
    #[serde(rename = "logsBloom")]
    pub bloom: String,
    pub difficulty: String,
    pub number: String,
    pub gas_limit: String,
    pub gas_used: String,
    #[serde(rename = "timestamp")]
    pub time: String,
    #[serde(rename = "extraData")]
    pub extra: String,
    pub mix_hash: String,
    pub nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_difficulty: Option<String>,
}

/// An uncle as reported inside a block: a full header or just its hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Uncle {
    Header(Box<Header>),
    Hash(String),
}

/// A block, generic over how its transactions are represented.
///
/// `Block` carries plain transactions; [`MixedBlock`] carries transactions
/// merged with their receipts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block<T = Transaction> {
    #[serde(flatten)]
    pub header: Header,
    #[serde(default)]
    pub transactions: Vec<T>,
    #[serde(default)]
    pub uncles: Vec<Uncle>,
}

/// Block whose transactions carry their receipt outcome.
pub type MixedBlock = Block<MixedTransaction>;

/// A transaction as returned by `eth_getTransactionByHash` or inside a full block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: String,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub block_number: Option<String>,
    #[serde(default)]
    pub transaction_index: Option<String>,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(rename = "nonce")]
    pub account_nonce: String,
    #[serde(rename = "value")]
    pub amount: String,
    #[serde(rename = "gas")]
    pub gas_limit: String,
    #[serde(rename = "gasPrice")]
    pub price: String,
    #[serde(rename = "input")]
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<String>,
}

/// A transaction merged with its receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixedTransaction {
    #[serde(flatten)]
    pub tx: Transaction,
    pub status: String,
    pub contract_address: Option<String>,
    /// Fee paid in whole native-currency units, as a decimal string.
    pub cost: String,
}

/// A transaction receipt as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: String,
    #[serde(default)]
    pub block_hash: Option<String>,
    pub block_number: String,
    pub transaction_index: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    pub cumulative_gas_used: String,
    pub gas_used: String,
    #[serde(default)]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub logs: Vec<Value>,
    pub logs_bloom: String,
    /// Post-state root; only receipts from before status codes carry it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Outcome recorded in a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Failed,
}

impl Receipt {
    /// The `status` field, which a root-only receipt lacks.
    pub fn recorded_status(&self) -> BlockchainResult<&str> {
        self.status.as_deref().ok_or_else(|| BlockchainError::MissingStatus {
            tx_hash: self.transaction_hash.clone(),
        })
    }

    /// Interpret `status`, which may be in wire (`0x1`) or domain (`1`) form.
    pub fn outcome(&self) -> BlockchainResult<ReceiptStatus> {
        let status = parse_quantity(self.recorded_status()?)?;
        Ok(if status.is_zero() {
            ReceiptStatus::Failed
        } else {
            ReceiptStatus::Success
        })
    }
}

/// Node description from `admin_nodeInfo`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub enode: String,
    #[serde(default)]
    pub enr: Option<String>,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub ports: Value,
    #[serde(default)]
    pub listen_addr: String,
    #[serde(default)]
    pub protocols: Map<String, Value>,
}

impl NodeInfo {
    /// Consensus engine named in the `eth` protocol's chain config.
    pub fn consensus(&self) -> Consensus {
        let config = self
            .protocols
            .get("eth")
            .and_then(|eth| eth.get("config"))
            .and_then(Value::as_object);

        let Some(config) = config else {
            return Consensus::Unknown;
        };
        let present = |key: &str| config.get(key).is_some_and(|v| !v.is_null());

        if present("clique") {
            Consensus::Poa
        } else if present("raft") {
            Consensus::Raft
        } else if present("ethash") {
            Consensus::Pow
        } else if present("scrypt") {
            Consensus::Scrypt
        } else {
            Consensus::Unknown
        }
    }
}
