//! Shared utilities for integration tests: a scripted in-memory node.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy::consensus::{Transaction as _, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{keccak256, Bytes};
use async_trait::async_trait;
use serde_json::{json, Value};

use evm_node_client::blockchain::{BlockchainClient, BlockchainError, BlockchainResult, RpcTransport, Wallet};
use evm_node_client::config::ClientConfig;

/// Anvil's first account.
pub const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const TEST_SENDER: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
pub const RECIPIENT: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";

/// Which receipt poll is being answered.
#[derive(Debug, Clone)]
pub struct ReceiptQuery {
    /// Position of the transaction among broadcasts, if it was broadcast here.
    pub broadcast: Option<usize>,
    /// Zero-based poll count for this hash.
    pub poll: u32,
    pub tx_hash: String,
}

type ReceiptPlan = Box<dyn Fn(&ReceiptQuery) -> Option<Value> + Send + Sync>;

/// A transaction the node accepted.
#[derive(Debug, Clone)]
pub struct Broadcast {
    pub tx_hash: String,
    pub nonce: u64,
    pub raw: Bytes,
}

/// In-memory JSON-RPC node.
///
/// Gas and nonce methods have fixed answers; receipts follow a plan;
/// anything else must be scripted with [`MockNode::with_reply`].
pub struct MockNode {
    replies: Mutex<HashMap<String, Value>>,
    receipts: ReceiptPlan,
    calls: Mutex<Vec<(String, Value)>>,
    broadcasts: Mutex<Vec<Broadcast>>,
    polls: Mutex<HashMap<String, u32>>,
    broadcast_error: Option<String>,
}

impl Default for MockNode {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNode {
    pub fn new() -> Self {
        let mut replies = HashMap::new();
        replies.insert("eth_gasPrice".to_string(), json!("0x3b9aca00"));
        replies.insert("eth_estimateGas".to_string(), json!("0x5208"));
        replies.insert("eth_getTransactionCount".to_string(), json!("0x5"));
        Self {
            replies: Mutex::new(replies),
            receipts: Box::new(|q| Some(success_receipt(&q.tx_hash, None))),
            calls: Mutex::new(Vec::new()),
            broadcasts: Mutex::new(Vec::new()),
            polls: Mutex::new(HashMap::new()),
            broadcast_error: None,
        }
    }

    pub fn with_reply(self, method: &str, reply: Value) -> Self {
        self.replies.lock().unwrap().insert(method.to_string(), reply);
        self
    }

    pub fn with_receipts<F>(mut self, plan: F) -> Self
    where
        F: Fn(&ReceiptQuery) -> Option<Value> + Send + Sync + 'static,
    {
        self.receipts = Box::new(plan);
        self
    }

    /// Refuse every raw transaction with `reason`.
    pub fn rejecting_broadcasts(mut self, reason: &str) -> Self {
        self.broadcast_error = Some(reason.to_string());
        self
    }

    pub fn broadcasts(&self) -> Vec<Broadcast> {
        self.broadcasts.lock().unwrap().clone()
    }

    /// Every method called, in order.
    pub fn methods(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn accept_raw(&self, params: &Value) -> BlockchainResult<Value> {
        if let Some(reason) = &self.broadcast_error {
            return Err(BlockchainError::Transport(reason.clone()));
        }
        let raw: Bytes = serde_json::from_value(params[0].clone())
            .map_err(|e| BlockchainError::Transport(format!("bad raw transaction: {}", e)))?;
        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref())
            .map_err(|e| BlockchainError::Transport(format!("rlp: {}", e)))?;

        let tx_hash = keccak256(&raw).to_string();
        self.broadcasts.lock().unwrap().push(Broadcast {
            tx_hash: tx_hash.clone(),
            nonce: envelope.nonce(),
            raw,
        });
        Ok(json!(tx_hash))
    }

    fn answer_receipt(&self, params: &Value) -> Value {
        let tx_hash = params[0].as_str().unwrap_or_default().to_string();
        let poll = {
            let mut polls = self.polls.lock().unwrap();
            let count = polls.entry(tx_hash.clone()).or_insert(0);
            let current = *count;
            *count += 1;
            current
        };
        let broadcast = self
            .broadcasts
            .lock()
            .unwrap()
            .iter()
            .position(|b| b.tx_hash == tx_hash);

        (self.receipts)(&ReceiptQuery {
            broadcast,
            poll,
            tx_hash,
        })
        .unwrap_or(Value::Null)
    }
}

#[async_trait]
impl RpcTransport for MockNode {
    async fn request(&self, method: &str, params: Value) -> BlockchainResult<Value> {
        self.calls.lock().unwrap().push((method.to_string(), params.clone()));
        match method {
            "eth_sendRawTransaction" => self.accept_raw(&params),
            "eth_getTransactionReceipt" => Ok(self.answer_receipt(&params)),
            _ => self
                .replies
                .lock()
                .unwrap()
                .get(method)
                .cloned()
                .ok_or_else(|| BlockchainError::Transport(format!("the method {} does not exist", method))),
        }
    }
}

/// Client signing with [`TEST_PRIVATE_KEY`] over `node`.
pub fn client_for(node: &Arc<MockNode>) -> BlockchainClient {
    client_with_config(node, ClientConfig::default())
}

pub fn client_with_config(node: &Arc<MockNode>, config: ClientConfig) -> BlockchainClient {
    let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY, Some(31337)).unwrap();
    BlockchainClient::with_transport(config, wallet, node.clone())
}

/// Wire receipt with status 1.
pub fn success_receipt(tx_hash: &str, contract_address: Option<&str>) -> Value {
    json!({
        "transactionHash": tx_hash,
        "blockHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
        "blockNumber": "0x10",
        "transactionIndex": "0x0",
        "from": TEST_SENDER,
        "to": null,
        "cumulativeGasUsed": "0x5208",
        "gasUsed": "0x5208",
        "contractAddress": contract_address,
        "logs": [],
        "logsBloom": "0x00",
        "status": "0x1"
    })
}

/// Wire receipt with status 0 and a recognisable bloom.
pub fn reverted_receipt(tx_hash: &str) -> Value {
    let mut receipt = success_receipt(tx_hash, None);
    receipt["status"] = json!("0x0");
    receipt["logsBloom"] = json!("0xdeadbeef");
    receipt
}

/// Deterministic contract address for the `index`th deployment.
pub fn contract_address(index: usize) -> String {
    format!("0x{:040x}", index + 0xc0de)
}
