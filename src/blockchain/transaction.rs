//! Transaction building, gas estimation, signing and broadcast.
//!
//! # Responsibilities
//! - Turn a [`TransactionIntent`] into a broadcast transaction
//! - Ask the node for a gas price and a gas limit
//! - Sign with the client wallet and submit the canonical bytes
//!
//! Each stage consumes the value produced by the one before it:
//!
//! ```text
//! TransactionIntent ─build─▶ BuiltTx ─estimate─▶ EstimatedTx ─sign─▶ SignedTx ─broadcast─▶ TxHash
//! ```
//!
//! Nothing here retries. Sending the same intent twice broadcasts twice; the
//! node is expected to reject the second one on its nonce.

use alloy::consensus::TxLegacy;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash, TxKind, U256};
use alloy::rpc::types::TransactionRequest;

use crate::blockchain::client::{parse_address, BlockchainClient};
use crate::blockchain::quantity::parse_amount;
use crate::blockchain::types::{BlockchainError, BlockchainResult, OperationKind};
use crate::blockchain::wallet::encode_signed;
use crate::observability::metrics;

/// What the caller wants a transaction to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionIntent {
    pub kind: OperationKind,
    pub nonce: u64,
    /// Absent for contract creation.
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
}

impl TransactionIntent {
    pub fn transfer(nonce: u64, to: Address, value: U256) -> Self {
        Self {
            kind: OperationKind::Transfer,
            nonce,
            to: Some(to),
            value,
            data: Bytes::new(),
        }
    }

    /// Deploy `init_code`, endowing the new contract with `value`.
    pub fn contract_create(nonce: u64, value: U256, init_code: Bytes) -> Self {
        Self {
            kind: OperationKind::ContractCreate,
            nonce,
            to: None,
            value,
            data: init_code,
        }
    }

    pub fn contract_call(nonce: u64, to: Address, value: U256, data: Bytes) -> Self {
        Self {
            kind: OperationKind::ContractCall,
            nonce,
            to: Some(to),
            value,
            data,
        }
    }

    fn tx_kind(&self) -> TxKind {
        match self.to {
            Some(to) => TxKind::Call(to),
            None => TxKind::Create,
        }
    }
}

/// An intent checked against its kind, with the sender resolved.
#[derive(Debug, Clone)]
pub struct BuiltTx {
    intent: TransactionIntent,
    from: Address,
}

impl BuiltTx {
    pub fn intent(&self) -> &TransactionIntent {
        &self.intent
    }

    pub fn sender(&self) -> Address {
        self.from
    }

    /// Call message handed to the node for gas estimation.
    pub fn call_request(&self, gas_price: u128) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(self.from)
            .with_kind(self.intent.tx_kind())
            .with_gas_price(gas_price)
            .with_value(self.intent.value)
            .with_input(self.intent.data.clone())
    }
}

/// A built transaction with the node's gas price and limit attached.
#[derive(Debug, Clone)]
pub struct EstimatedTx {
    intent: TransactionIntent,
    gas_price: u128,
    gas_limit: u64,
}

impl EstimatedTx {
    pub fn gas_price(&self) -> u128 {
        self.gas_price
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }
}

/// Canonical bytes of a signed transaction, ready to broadcast.
#[derive(Debug, Clone)]
pub struct SignedTx {
    kind: OperationKind,
    hash: TxHash,
    raw: Vec<u8>,
}

impl SignedTx {
    pub fn hash(&self) -> TxHash {
        self.hash
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

/// Runs intents through the pipeline on behalf of one client.
#[derive(Debug, Clone)]
pub struct TxPipeline {
    client: BlockchainClient,
}

impl TxPipeline {
    pub fn new(client: BlockchainClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &BlockchainClient {
        &self.client
    }

    /// Check the recipient against the operation kind and resolve the sender.
    pub fn build(&self, intent: TransactionIntent) -> BlockchainResult<BuiltTx> {
        match (intent.kind, intent.to) {
            (OperationKind::ContractCreate, Some(to)) => {
                return Err(BlockchainError::InvalidInput(format!(
                    "contract creation must not have a recipient, got {}",
                    to
                )))
            }
            (OperationKind::Transfer | OperationKind::ContractCall, None) => {
                return Err(BlockchainError::InvalidInput(format!(
                    "{} needs a recipient",
                    intent.kind.as_str()
                )))
            }
            _ => {}
        }

        Ok(BuiltTx {
            intent,
            from: self.client.address(),
        })
    }

    /// Ask the node for a gas price, then for a gas limit at that price.
    pub async fn estimate(&self, built: BuiltTx) -> BlockchainResult<EstimatedTx> {
        let gas_price = self
            .client
            .suggest_gas_price()
            .await
            .map_err(|e| {
                stage_error(e, |e| BlockchainError::GasEstimationFailed(format!("gas price: {}", e)))
            })?;

        let request = built.call_request(gas_price);
        let gas_limit = self
            .client
            .estimate_gas(&request)
            .await
            .map_err(|e| stage_error(e, BlockchainError::GasEstimationFailed))?;

        tracing::debug!(
            kind = built.intent.kind.as_str(),
            nonce = built.intent.nonce,
            gas_price,
            gas_limit,
            "Gas estimated"
        );

        Ok(EstimatedTx {
            intent: built.intent,
            gas_price,
            gas_limit,
        })
    }

    /// Sign as a legacy transaction and encode it.
    pub fn sign(&self, estimated: EstimatedTx) -> BlockchainResult<SignedTx> {
        let EstimatedTx {
            intent,
            gas_price,
            gas_limit,
        } = estimated;
        let kind = intent.kind;

        let tx = TxLegacy {
            chain_id: None,
            nonce: intent.nonce,
            gas_price,
            gas_limit,
            to: intent.tx_kind(),
            value: intent.value,
            input: intent.data,
        };
        let (hash, raw) = encode_signed(self.client.wallet().sign_legacy(tx)?);

        Ok(SignedTx { kind, hash, raw })
    }

    /// Submit the signed bytes. Returns the locally computed hash.
    pub async fn broadcast(&self, signed: SignedTx) -> BlockchainResult<TxHash> {
        let reported = self
            .client
            .send_raw_transaction(&signed.raw)
            .await
            .map_err(|e| stage_error(e, BlockchainError::BroadcastFailed))?;

        if reported.parse::<TxHash>().ok() != Some(signed.hash) {
            tracing::warn!(
                tx_hash = %signed.hash,
                reported = %reported,
                "Node reported a different transaction hash"
            );
        }

        metrics::record_broadcast(signed.kind.as_str());
        tracing::info!(
            tx_hash = %signed.hash,
            kind = signed.kind.as_str(),
            "Transaction broadcast"
        );
        Ok(signed.hash)
    }

    /// Run every stage in order.
    pub async fn send(&self, intent: TransactionIntent) -> BlockchainResult<TxHash> {
        let built = self.build(intent)?;
        let estimated = self.estimate(built).await?;
        let signed = self.sign(estimated)?;
        self.broadcast(signed).await
    }

    /// String front door: `to` is a hex address (ignored for creation),
    /// `amount` a decimal or prefixed quantity where empty means zero.
    pub async fn send_transaction(
        &self,
        kind: OperationKind,
        nonce: u64,
        to: &str,
        amount: &str,
        data: &[u8],
    ) -> BlockchainResult<String> {
        let value = parse_amount(amount)?;
        let data = Bytes::copy_from_slice(data);
        let intent = match kind {
            OperationKind::ContractCreate => TransactionIntent::contract_create(nonce, value, data),
            OperationKind::Transfer => TransactionIntent {
                data,
                ..TransactionIntent::transfer(nonce, parse_address(to)?, value)
            },
            OperationKind::ContractCall => {
                TransactionIntent::contract_call(nonce, parse_address(to)?, value, data)
            }
        };
        let hash = self.send(intent).await?;
        Ok(hash.to_string())
    }
}

/// Reclassify a collaborator failure as a stage failure. Cancellation stays as is.
fn stage_error(e: BlockchainError, wrap: impl FnOnce(String) -> BlockchainError) -> BlockchainError {
    match e {
        BlockchainError::Cancelled => e,
        other => wrap(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::transport::RpcTransport;
    use crate::blockchain::wallet::Wallet;
    use crate::config::ClientConfig;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const RECIPIENT: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";

    #[derive(Default)]
    struct GasNode {
        fail_estimate: bool,
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl RpcTransport for GasNode {
        async fn request(&self, method: &str, params: Value) -> BlockchainResult<Value> {
            self.calls.lock().unwrap().push((method.to_string(), params.clone()));
            match method {
                "eth_gasPrice" => Ok(json!("0x3b9aca00")),
                "eth_estimateGas" if self.fail_estimate => {
                    Err(BlockchainError::Transport("execution reverted".into()))
                }
                "eth_estimateGas" => Ok(json!("0x5208")),
                "eth_sendRawTransaction" => Ok(json!(format!("0x{}", "ab".repeat(32)))),
                other => Err(BlockchainError::Transport(format!("unexpected {}", other))),
            }
        }
    }

    fn pipeline(node: GasNode) -> (TxPipeline, Arc<GasNode>) {
        let node = Arc::new(node);
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY, Some(31337)).unwrap();
        let client = BlockchainClient::with_transport(ClientConfig::default(), wallet, node.clone());
        (TxPipeline::new(client), node)
    }

    fn recipient() -> Address {
        RECIPIENT.parse().unwrap()
    }

    #[test]
    fn test_build_rejects_recipient_mismatch() {
        let (pipeline, _) = pipeline(GasNode::default());

        let mut create = TransactionIntent::contract_create(0, U256::ZERO, Bytes::from_static(&[0x60]));
        create.to = Some(recipient());
        assert!(matches!(pipeline.build(create), Err(BlockchainError::InvalidInput(_))));

        let mut transfer = TransactionIntent::transfer(0, recipient(), U256::from(1));
        transfer.to = None;
        assert!(matches!(pipeline.build(transfer), Err(BlockchainError::InvalidInput(_))));
    }

    #[test]
    fn test_built_tx_resolves_sender() {
        let (pipeline, _) = pipeline(GasNode::default());
        let built = pipeline
            .build(TransactionIntent::transfer(3, recipient(), U256::from(5)))
            .unwrap();
        assert_eq!(built.sender(), pipeline.client().address());
        let request = built.call_request(7);
        assert_eq!(request.gas_price, Some(7));
        assert_eq!(request.value, Some(U256::from(5)));
    }

    #[tokio::test]
    async fn test_estimate_queries_price_then_limit() {
        let (pipeline, node) = pipeline(GasNode::default());
        let built = pipeline
            .build(TransactionIntent::transfer(0, recipient(), U256::from(1)))
            .unwrap();
        let estimated = pipeline.estimate(built).await.unwrap();
        assert_eq!(estimated.gas_price(), 1_000_000_000);
        assert_eq!(estimated.gas_limit(), 21_000);

        let calls = node.calls.lock().unwrap();
        assert_eq!(calls[0].0, "eth_gasPrice");
        assert_eq!(calls[1].0, "eth_estimateGas");
        assert_eq!(calls[1].1[0]["gasPrice"], "0x3b9aca00");
    }

    #[tokio::test]
    async fn test_estimate_failure_is_classified() {
        let (pipeline, node) = pipeline(GasNode {
            fail_estimate: true,
            ..GasNode::default()
        });
        let built = pipeline
            .build(TransactionIntent::transfer(0, recipient(), U256::from(1)))
            .unwrap();
        let err = pipeline.estimate(built).await.unwrap_err();
        assert!(matches!(err, BlockchainError::GasEstimationFailed(_)));
        assert!(!node.calls.lock().unwrap().iter().any(|(m, _)| m == "eth_sendRawTransaction"));
    }

    #[tokio::test]
    async fn test_signed_tx_encodes_intent() {
        let (pipeline, _) = pipeline(GasNode::default());
        let built = pipeline
            .build(TransactionIntent::contract_create(9, U256::ZERO, Bytes::from_static(&[0x60, 0x80])))
            .unwrap();
        let signed = pipeline.sign(pipeline.estimate(built).await.unwrap()).unwrap();
        assert_eq!(signed.hash(), alloy::primitives::keccak256(signed.raw()));
    }

    #[tokio::test]
    async fn test_send_transaction_returns_local_hash() {
        let (pipeline, node) = pipeline(GasNode::default());
        let hash = pipeline
            .send_transaction(OperationKind::Transfer, 0, RECIPIENT, "1000", &[])
            .await
            .unwrap();

        let calls = node.calls.lock().unwrap();
        let (method, params) = calls.last().unwrap();
        assert_eq!(method, "eth_sendRawTransaction");
        let raw: Bytes = serde_json::from_value(params[0].clone()).unwrap();
        assert_eq!(hash, alloy::primitives::keccak256(&raw).to_string());
    }

    #[tokio::test]
    async fn test_malformed_amount_is_not_zero() {
        let (pipeline, node) = pipeline(GasNode::default());
        let err = pipeline
            .send_transaction(OperationKind::Transfer, 0, RECIPIENT, "12abc", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, BlockchainError::InvalidNumber { .. }));
        assert!(node.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_recipient_is_rejected() {
        let (pipeline, _) = pipeline(GasNode::default());
        let err = pipeline
            .send_transaction(OperationKind::ContractCall, 0, "nope", "", &[0xa9])
            .await
            .unwrap_err();
        assert!(matches!(err, BlockchainError::InvalidInput(_)));
    }
}
