//! Transaction pipeline and confirmation through the client.

use std::sync::Arc;
use std::time::Duration;

use alloy::consensus::{Transaction as _, TxEnvelope};
use alloy::dyn_abi::DynSolValue;
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{Address, U256};
use serde_json::json;

use evm_node_client::blockchain::types::{INVOKE_CONTRACT_OP, SEND_TRANSACTION_OP};
use evm_node_client::blockchain::{BlockchainError, OperationKind, TxPipeline};

mod common;
use common::{success_receipt, MockNode, RECIPIENT};

const COUNTER_ABI: &str = r#"[
    {"type":"function","name":"increment","stateMutability":"nonpayable",
     "inputs":[{"name":"by","type":"uint256"}],"outputs":[]},
    {"type":"function","name":"count","stateMutability":"view",
     "inputs":[],"outputs":[{"name":"","type":"uint256"}]}
]"#;

const COUNTER: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

fn decode(raw: &[u8]) -> TxEnvelope {
    TxEnvelope::decode_2718(&mut &raw[..]).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_transfer_is_sent_and_confirmed() {
    let node = Arc::new(
        MockNode::new().with_receipts(|q| (q.poll >= 2).then(|| success_receipt(&q.tx_hash, None))),
    );
    let client = common::client_for(&node);
    let pipeline = TxPipeline::new(client.clone());

    let tx_hash = pipeline
        .send_transaction(OperationKind::Transfer, 7, RECIPIENT, "1000000000000000000", &[])
        .await
        .unwrap();

    let broadcasts = node.broadcasts();
    assert_eq!(broadcasts.len(), 1);
    assert_eq!(broadcasts[0].tx_hash, tx_hash);

    let tx = decode(&broadcasts[0].raw);
    assert_eq!(tx.nonce(), 7);
    assert_eq!(tx.gas_limit(), 21_000);
    assert_eq!(tx.chain_id(), Some(31337));
    assert_eq!(tx.value(), U256::from(10u64).pow(U256::from(18)));
    assert_eq!(tx.to(), Some(RECIPIENT.parse::<Address>().unwrap()));

    let receipt = client
        .tracker()
        .spawn(tx_hash.as_str(), SEND_TRANSACTION_OP)
        .wait()
        .await
        .unwrap();
    assert_eq!(receipt.transaction_hash, tx_hash);
    assert_eq!(node.calls_to("eth_getTransactionReceipt").len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_confirmed_receipt_is_normalized() {
    let node = Arc::new(
        MockNode::new().with_receipts(|q| (q.poll >= 1).then(|| success_receipt(&q.tx_hash, None))),
    );
    let client = common::client_for(&node);

    let tx_hash = TxPipeline::new(client.clone())
        .send_transaction(OperationKind::Transfer, 0, RECIPIENT, "1", &[])
        .await
        .unwrap();
    let receipt = client.confirm(&tx_hash, SEND_TRANSACTION_OP).await.unwrap();

    assert_eq!(receipt.transaction_hash, tx_hash);
    assert_eq!(receipt.block_number, "16");
    assert_eq!(receipt.gas_used, "21000");
    assert_eq!(receipt.status.as_deref(), Some("1"));
    assert_eq!(receipt, client.transaction_detail(&tx_hash).await.unwrap());
}

#[tokio::test]
async fn test_stages_run_in_order() {
    let node = Arc::new(MockNode::new());
    let pipeline = TxPipeline::new(common::client_for(&node));

    pipeline
        .send_transaction(OperationKind::ContractCreate, 0, "", "", &[0x60, 0x80])
        .await
        .unwrap();

    assert_eq!(
        node.methods(),
        vec!["eth_gasPrice", "eth_estimateGas", "eth_sendRawTransaction"]
    );

    let estimate = &node.calls_to("eth_estimateGas")[0][0];
    let from: Address = estimate["from"].as_str().unwrap().parse().unwrap();
    assert_eq!(from, common::TEST_SENDER.parse::<Address>().unwrap());
    assert!(estimate.get("to").map_or(true, |to| to.is_null()));

    let tx = decode(&node.broadcasts()[0].raw);
    assert!(tx.to().is_none());
}

#[tokio::test]
async fn test_rejected_broadcast_is_resubmittable() {
    let node = Arc::new(MockNode::new().rejecting_broadcasts("nonce too low"));
    let pipeline = TxPipeline::new(common::client_for(&node));

    let err = pipeline
        .send_transaction(OperationKind::Transfer, 0, RECIPIENT, "1", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, BlockchainError::BroadcastFailed(ref m) if m.contains("nonce too low")));
    assert!(err.is_resubmittable());
}

#[tokio::test]
async fn test_invoke_contract_encodes_call() {
    let node = Arc::new(MockNode::new());
    let pipeline = TxPipeline::new(common::client_for(&node));

    pipeline
        .invoke_contract(COUNTER, COUNTER_ABI, 3, "increment", &[DynSolValue::Uint(U256::from(2), 256)])
        .await
        .unwrap();

    let tx = decode(&node.broadcasts()[0].raw);
    assert_eq!(tx.nonce(), 3);
    assert_eq!(tx.value(), U256::ZERO);
    assert_eq!(tx.input().len(), 4 + 32);
    assert_eq!(tx.input()[35], 2);
}

#[tokio::test]
async fn test_invoke_failure_is_labelled() {
    let node = Arc::new(MockNode::new());
    let pipeline = TxPipeline::new(common::client_for(&node));

    let err = pipeline
        .invoke_contract(COUNTER, COUNTER_ABI, 0, "decrement", &[])
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with(INVOKE_CONTRACT_OP));
    assert!(node.broadcasts().is_empty());
}

#[tokio::test]
async fn test_query_contract_decodes_outputs() {
    let word = format!("0x{:064x}", 42);
    let node = Arc::new(MockNode::new().with_reply("eth_call", json!(word)));
    let pipeline = TxPipeline::new(common::client_for(&node));

    let outputs = pipeline.query_contract(COUNTER, COUNTER_ABI, "count", &[]).await.unwrap();
    assert_eq!(outputs, vec![DynSolValue::Uint(U256::from(42), 256)]);

    let call = &node.calls_to("eth_call")[0];
    assert_eq!(call[1], "latest");
    assert!(node.broadcasts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_close_cancels_running_tracker() {
    let node = Arc::new(MockNode::new().with_receipts(|_| None));
    let client = common::client_for(&node);

    let handle = client.tracker().spawn("0xabc", SEND_TRANSACTION_OP);
    tokio::time::sleep(Duration::from_millis(3500)).await;
    client.close();

    let err = handle.wait().await.unwrap_err();
    assert!(matches!(err, BlockchainError::Cancelled));
    assert!(node.calls_to("eth_getTransactionReceipt").len() < 30);

    let err = TxPipeline::new(client)
        .send_transaction(OperationKind::Transfer, 0, RECIPIENT, "1", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, BlockchainError::Cancelled));
}
