//! Multi-contract deployment.
//!
//! Each compiled contract gets its own nonce (`base + index`), its own
//! creation transaction and its own confirmation tracker. Results are
//! collected in order and the run stops at the first failure. Contracts
//! confirmed before the failure stay deployed; nothing is rolled back.

use alloy::primitives::{Address, TxHash, U256};
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::blockchain::client::BlockchainClient;
use crate::blockchain::compiler::{CompiledContract, Solc};
use crate::blockchain::confirmation::ConfirmationTracker;
use crate::blockchain::quantity::parse_quantity;
use crate::blockchain::transaction::{TransactionIntent, TxPipeline};
use crate::blockchain::types::{BlockchainError, BlockchainResult, DEPLOY_CONTRACT_OP};

/// A contract confirmed on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployedContract {
    pub name: String,
    pub address: Address,
    pub tx_hash: TxHash,
    /// Inclusion height, in decimal.
    pub block_number: String,
}

/// Deploys compiled contracts one nonce after another.
#[derive(Clone)]
pub struct DeploymentCoordinator {
    pipeline: TxPipeline,
    tracker: ConfirmationTracker,
}

impl DeploymentCoordinator {
    pub fn new(client: BlockchainClient) -> Self {
        let tracker = client.tracker();
        Self {
            pipeline: TxPipeline::new(client),
            tracker,
        }
    }

    /// Use `tracker` instead of the client's configured one.
    pub fn with_tracker(pipeline: TxPipeline, tracker: ConfirmationTracker) -> Self {
        Self { pipeline, tracker }
    }

    /// Deploy `contracts` in order.
    ///
    /// With no `base_nonce`, the signing account's pending nonce is used.
    /// Every failure is reported under the `DeployContract` label.
    pub async fn deploy(
        &self,
        contracts: &[CompiledContract],
        base_nonce: Option<u64>,
    ) -> BlockchainResult<Vec<DeployedContract>> {
        let deployment_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "deployment",
            %deployment_id,
            contracts = contracts.len()
        );

        self.deploy_all(contracts, base_nonce)
            .instrument(span)
            .await
            .map_err(|e| e.in_operation(DEPLOY_CONTRACT_OP))
    }

    /// Compile `source` with `solc` and deploy every contract it defines.
    ///
    /// Nothing is sent if compilation fails.
    pub async fn deploy_source(
        &self,
        solc: &Solc,
        source: &str,
        base_nonce: Option<u64>,
    ) -> BlockchainResult<Vec<DeployedContract>> {
        let contracts = solc
            .compile_source(source)
            .await
            .map_err(|e| e.in_operation(DEPLOY_CONTRACT_OP))?;
        self.deploy(&contracts, base_nonce).await
    }

    async fn deploy_all(
        &self,
        contracts: &[CompiledContract],
        base_nonce: Option<u64>,
    ) -> BlockchainResult<Vec<DeployedContract>> {
        let base_nonce = match base_nonce {
            Some(nonce) => nonce,
            None => self.pipeline.client().pending_nonce().await?,
        };

        let mut deployed = Vec::with_capacity(contracts.len());
        for (index, contract) in contracts.iter().enumerate() {
            let nonce = base_nonce.checked_add(index as u64).ok_or_else(|| {
                BlockchainError::InvalidInput(format!("nonce overflow at {}", contract.name))
            })?;
            deployed.push(self.deploy_one(contract, nonce).await?);
        }

        tracing::info!(deployed = deployed.len(), "Deployment complete");
        Ok(deployed)
    }

    async fn deploy_one(&self, contract: &CompiledContract, nonce: u64) -> BlockchainResult<DeployedContract> {
        if contract.bytecode.is_empty() {
            return Err(BlockchainError::InvalidInput(format!(
                "contract {} has no bytecode",
                contract.name
            )));
        }

        let intent = TransactionIntent::contract_create(nonce, U256::ZERO, contract.bytecode.clone());
        let tx_hash = self.pipeline.send(intent).await?;

        // Own tracker per deployment; wait for it before moving to the next nonce.
        let receipt = self
            .tracker
            .spawn(tx_hash.to_string(), DEPLOY_CONTRACT_OP)
            .wait()
            .await?;

        let address = receipt
            .contract_address
            .as_deref()
            .ok_or_else(|| {
                BlockchainError::NotFound(format!("contract address in receipt for {}", tx_hash))
            })?
            .parse::<Address>()
            .map_err(|e| BlockchainError::Decode {
                method: "eth_getTransactionReceipt".to_string(),
                reason: format!("contractAddress: {}", e),
            })?;
        let block_number = parse_quantity(&receipt.block_number)?.to_string();

        tracing::info!(
            contract = %contract.name,
            %address,
            %tx_hash,
            nonce,
            "Contract deployed"
        );

        Ok(DeployedContract {
            name: contract.name.clone(),
            address,
            tx_hash,
            block_number,
        })
    }
}
