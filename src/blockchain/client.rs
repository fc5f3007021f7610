//! Node client with an explicit open/close lifecycle.
//!
//! # Responsibilities
//! - Own the transport, the signing wallet and the cancellation signal
//! - Query chain state and return it in domain (decimal) form
//! - Expose the raw calls the transaction pipeline is built from
//! - Fail every in-flight call with `Cancelled` once closed

use std::sync::Arc;

use alloy::primitives::{Address, Bytes};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::blockchain::confirmation::{ConfirmationPolicy, ConfirmationTracker, ReceiptFetcher};
use crate::blockchain::mapper::{merge_block, BlockRef, Normalize};
use crate::blockchain::models::{Block, MixedBlock, NodeInfo, Receipt, Transaction};
use crate::blockchain::quantity::{quantity_to_u128, quantity_to_u64, to_domain_decimal};
use crate::blockchain::transport::{HttpTransport, RpcTransport};
use crate::blockchain::types::{BlockchainError, BlockchainResult, Consensus, NodeConfig};
use crate::blockchain::wallet::Wallet;
use crate::config::ClientConfig;
use crate::lifecycle::Shutdown;

/// Chain ID to sign with, or `None` for Homestead-style signatures.
pub fn signing_chain_id(node: &NodeConfig) -> Option<u64> {
    node.replay_protection.then_some(node.chain_id)
}

/// Connection to one node, shared by every pipeline and tracker built from it.
///
/// Clones share the transport and the cancellation signal, so closing any
/// clone closes them all.
#[derive(Clone)]
pub struct BlockchainClient {
    transport: Arc<dyn RpcTransport>,
    wallet: Wallet,
    config: ClientConfig,
    shutdown: Arc<Shutdown>,
}

impl BlockchainClient {
    /// Open a client over HTTP using the configured endpoints and signer.
    pub fn open(config: ClientConfig) -> BlockchainResult<Self> {
        let transport = HttpTransport::new(&config.node)?;
        let wallet = Wallet::from_config(&config.signer, signing_chain_id(&config.node))?;

        tracing::info!(
            rpc_url = %config.node.rpc_url,
            endpoints = transport.endpoint_count(),
            sender = %wallet.address(),
            "Node client opened"
        );
        Ok(Self::with_transport(config, wallet, Arc::new(transport)))
    }

    /// Build a client on top of an existing transport.
    pub fn with_transport(config: ClientConfig, wallet: Wallet, transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            transport,
            wallet,
            config,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    /// Cancel everything in flight and refuse further calls.
    pub fn close(&self) {
        if !self.shutdown.is_triggered() {
            tracing::info!("Node client closed");
        }
        self.shutdown.trigger();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_triggered()
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    /// Sender address derived from the signing key.
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// A confirmation tracker polling through this client.
    pub fn tracker(&self) -> ConfirmationTracker {
        ConfirmationTracker::new(
            Arc::new(self.clone()),
            ConfirmationPolicy::from(&self.config.confirmation),
        )
        .with_cancellation(self.shutdown.subscribe())
    }

    /// Wait for `tx_hash` to reach a terminal state; the receipt comes back normalized.
    pub async fn confirm(&self, tx_hash: &str, op_label: &str) -> BlockchainResult<Receipt> {
        let mut receipt = self.tracker().spawn(tx_hash, op_label).wait().await?;
        receipt.normalize()?;
        Ok(receipt)
    }

    async fn raw(&self, method: &str, params: Value) -> BlockchainResult<Value> {
        if self.is_closed() {
            return Err(BlockchainError::Cancelled);
        }
        let mut signal = self.shutdown.subscribe();
        tokio::select! {
            result = self.transport.request(method, params) => result,
            _ = signal.cancelled() => Err(BlockchainError::Cancelled),
        }
    }

    async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> BlockchainResult<R> {
        let value = self.raw(method, params).await?;
        decode(method, value)
    }

    /// Like [`Self::call`], but a `null` result is `NotFound`.
    async fn call_required<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        what: impl FnOnce() -> String,
    ) -> BlockchainResult<R> {
        let value = self.raw(method, params).await?;
        if value.is_null() {
            return Err(BlockchainError::NotFound(what()));
        }
        decode(method, value)
    }

    // ----- chain state -----

    /// Latest block height, in decimal.
    pub async fn block_number(&self) -> BlockchainResult<String> {
        let hex: String = self
            .call_required("eth_blockNumber", json!([]), || "block number".to_string())
            .await?;
        to_domain_decimal(&hex)
    }

    /// Balance of `address` at `block` (height, or a tag such as `latest`), in decimal wei.
    pub async fn balance(&self, address: &str, block: &str) -> BlockchainResult<String> {
        let address = parse_address(address)?;
        let block = match BlockRef::parse(block)? {
            BlockRef::Hash(hash) => {
                return Err(BlockchainError::InvalidInput(format!(
                    "balance needs a block height or tag, got hash {}",
                    hash
                )))
            }
            other => other,
        };
        let hex: String = self
            .call_required("eth_getBalance", json!([address, block.rpc_arg()]), || {
                format!("balance of {}", address)
            })
            .await?;
        to_domain_decimal(&hex)
    }

    /// Accounts managed by the node.
    pub async fn accounts(&self) -> BlockchainResult<Vec<String>> {
        self.call("eth_accounts", json!([])).await
    }

    /// Current clique signers.
    pub async fn signers(&self) -> BlockchainResult<Vec<String>> {
        self.call("clique_getSigners", json!([])).await
    }

    pub async fn node_info(&self) -> BlockchainResult<NodeInfo> {
        self.call_required("admin_nodeInfo", json!([]), || "node info".to_string())
            .await
    }

    /// Consensus engine named in the node's chain config.
    pub async fn consensus(&self) -> BlockchainResult<Consensus> {
        Ok(self.node_info().await?.consensus())
    }

    /// Ask a permissioned node to accept `enode`, on behalf of account `from`.
    pub async fn add_peer(&self, enode: &str, from: &str) -> BlockchainResult<String> {
        if enode.is_empty() {
            return Err(BlockchainError::InvalidInput("enode is empty".to_string()));
        }
        let from = parse_address(from)?;
        let reply: Value = self.call("permission_addPeer", json!([enode, from])).await?;
        let reply = match reply {
            Value::String(s) => s,
            other => other.to_string(),
        };
        if reply == "false" {
            return Err(BlockchainError::Transport(format!("addPeer enode {} failed", enode)));
        }
        Ok(reply)
    }

    pub async fn peer_count(&self) -> BlockchainResult<u64> {
        let hex: String = self
            .call_required("net_peerCount", json!([]), || "peer count".to_string())
            .await?;
        quantity_to_u64(&hex)
    }

    pub async fn peers(&self) -> BlockchainResult<Value> {
        self.call("admin_peers", json!([])).await
    }

    /// Vote to add (`auth = true`) or drop a clique signer.
    pub async fn propose(&self, address: &str, auth: bool) -> BlockchainResult<Value> {
        let address = parse_address(address)?;
        self.call("clique_propose", json!([address, auth])).await
    }

    pub async fn unlock_account(&self, account: &str, password: &str, duration_secs: u64) -> BlockchainResult<bool> {
        self.call("personal_unlockAccount", json!([account, password, duration_secs]))
            .await
    }

    pub async fn set_etherbase(&self, address: &str) -> BlockchainResult<bool> {
        self.call("miner_setEtherbase", json!([address])).await
    }

    pub async fn miner_start(&self) -> BlockchainResult<Value> {
        self.call("miner_start", json!([])).await
    }

    pub async fn miner_stop(&self) -> BlockchainResult<Value> {
        self.call("miner_stop", json!([])).await
    }

    pub async fn mining(&self) -> BlockchainResult<bool> {
        self.call("eth_mining", json!([])).await
    }

    /// Point the etherbase at the node's first account and start mining.
    pub async fn start_miner(&self) -> BlockchainResult<()> {
        let accounts = self.accounts().await?;
        let first = accounts
            .first()
            .ok_or_else(|| BlockchainError::NotFound("node has no accounts".to_string()))?;
        if !self.set_etherbase(first).await? {
            return Err(BlockchainError::Transport(format!(
                "node refused etherbase {}",
                first
            )));
        }
        self.miner_start().await?;
        tracing::info!(etherbase = %first, "Mining started");
        Ok(())
    }

    // ----- transactions and blocks -----

    /// Transaction by hash, normalized.
    pub async fn transaction_by_hash(&self, tx_hash: &str) -> BlockchainResult<Transaction> {
        let mut tx: Transaction = self
            .call_required("eth_getTransactionByHash", json!([tx_hash]), || {
                format!("transaction {}", tx_hash)
            })
            .await?;
        tx.normalize()?;
        Ok(tx)
    }

    /// Receipt in wire form, `None` while the transaction is unmined.
    pub async fn transaction_receipt(&self, tx_hash: &str) -> BlockchainResult<Option<Receipt>> {
        self.call("eth_getTransactionReceipt", json!([tx_hash])).await
    }

    /// Receipt, normalized.
    pub async fn transaction_detail(&self, tx_hash: &str) -> BlockchainResult<Receipt> {
        let mut receipt = self
            .transaction_receipt(tx_hash)
            .await?
            .ok_or_else(|| BlockchainError::NotFound(format!("receipt for transaction {}", tx_hash)))?;
        receipt.normalize()?;
        Ok(receipt)
    }

    async fn wire_block(&self, input: &str) -> BlockchainResult<Block> {
        let block_ref = BlockRef::parse(input)?;
        self.call_required(
            block_ref.rpc_method(),
            json!([block_ref.rpc_arg(), true]),
            || format!("block {}", input),
        )
        .await
    }

    /// Block by decimal height or hash, with full transactions, normalized.
    pub async fn block_by_number_or_hash(&self, input: &str) -> BlockchainResult<Block> {
        let mut block = self.wire_block(input).await?;
        block.normalize()?;
        Ok(block)
    }

    /// Block by decimal height or hash, each transaction merged with its receipt.
    pub async fn mixed_block_by_number_or_hash(&self, input: &str) -> BlockchainResult<MixedBlock> {
        let block = self.wire_block(input).await?;
        let mut mixed = merge_block(block, self).await?;
        mixed.normalize()?;
        Ok(mixed)
    }

    /// Forward an arbitrary method; `params` is sent as given.
    pub async fn call_rpc_api(&self, method: &str, params: Vec<Value>) -> BlockchainResult<Value> {
        self.raw(method, Value::Array(params)).await
    }

    // ----- pipeline primitives -----

    /// Next nonce for the signing account, counting pending transactions.
    pub async fn pending_nonce(&self) -> BlockchainResult<u64> {
        let hex: String = self
            .call_required(
                "eth_getTransactionCount",
                json!([self.address(), "pending"]),
                || "transaction count".to_string(),
            )
            .await?;
        quantity_to_u64(&hex)
    }

    /// Gas price suggested by the node, in wei.
    pub async fn suggest_gas_price(&self) -> BlockchainResult<u128> {
        let hex: String = self
            .call_required("eth_gasPrice", json!([]), || "gas price".to_string())
            .await?;
        quantity_to_u128(&hex)
    }

    /// Gas the node expects `request` to consume.
    pub async fn estimate_gas(&self, request: &TransactionRequest) -> BlockchainResult<u64> {
        let hex: String = self
            .call_required("eth_estimateGas", json!([request]), || "gas estimate".to_string())
            .await?;
        quantity_to_u64(&hex)
    }

    /// Submit canonical transaction bytes. Returns the hash the node reports.
    pub async fn send_raw_transaction(&self, raw: &[u8]) -> BlockchainResult<String> {
        self.call_required(
            "eth_sendRawTransaction",
            json!([Bytes::copy_from_slice(raw)]),
            || "transaction hash".to_string(),
        )
        .await
    }

    /// Execute `request` against the latest state without broadcasting.
    pub async fn eth_call(&self, request: &TransactionRequest) -> BlockchainResult<Bytes> {
        self.call_required("eth_call", json!([request, "latest"]), || "call result".to_string())
            .await
    }
}

#[async_trait]
impl ReceiptFetcher for BlockchainClient {
    async fn fetch_receipt(&self, tx_hash: &str) -> BlockchainResult<Option<Receipt>> {
        self.transaction_receipt(tx_hash).await
    }
}

impl std::fmt::Debug for BlockchainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainClient")
            .field("rpc_url", &self.config.node.rpc_url)
            .field("chain_id", &self.config.node.chain_id)
            .field("sender", &self.wallet.address())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn decode<R: DeserializeOwned>(method: &str, value: Value) -> BlockchainResult<R> {
    serde_json::from_value(value).map_err(|e| BlockchainError::Decode {
        method: method.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn parse_address(input: &str) -> BlockchainResult<Address> {
    input
        .trim()
        .parse()
        .map_err(|_| BlockchainError::InvalidInput(format!("'{}' is not a hex address", input)))
}
