//! Command-line front end for the node client.
//!
//! ```text
//! node-client --config node.toml block 1024 --mixed
//! node-client send 0x7099...79c8 1000000000000000000 --wait
//! node-client deploy build/combined.json
//! node-client deploy contracts/Counter.sol --source --solc /opt/solc-0.8.24
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;

use evm_node_client::blockchain::compiler::{parse_combined_json, Solc};
use evm_node_client::blockchain::types::SEND_TRANSACTION_OP;
use evm_node_client::blockchain::{BlockchainClient, DeploymentCoordinator, OperationKind, TxPipeline};
use evm_node_client::config::{load_config, ClientConfig};
use evm_node_client::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "node-client")]
#[command(about = "Query an EVM node, send transactions and deploy contracts", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Latest block height
    BlockNumber,
    /// Block by decimal height or hash
    Block {
        input: String,
        /// Merge every transaction with its receipt
        #[arg(long)]
        mixed: bool,
    },
    /// Transaction by hash
    Tx { hash: String },
    /// Normalized receipt by transaction hash
    Receipt { hash: String },
    /// Balance in wei
    Balance {
        address: String,
        #[arg(long, default_value = "latest")]
        block: String,
    },
    /// Pending nonce of the signing account
    Nonce,
    /// Transfer native currency
    Send {
        to: String,
        amount: String,
        /// Defaults to the pending nonce
        #[arg(long)]
        nonce: Option<u64>,
        /// Wait for the receipt
        #[arg(long)]
        wait: bool,
    },
    /// Deploy every contract in a `solc --combined-json` output file
    Deploy {
        file: PathBuf,
        #[arg(long)]
        nonce: Option<u64>,
        /// FILE is Solidity source; compile it first
        #[arg(long)]
        source: bool,
        /// Compiler used with --source
        #[arg(long, default_value = "solc")]
        solc: PathBuf,
    },
    /// Consensus engine of the node
    Consensus,
    /// Raw JSON-RPC call
    Rpc {
        method: String,
        /// JSON array of parameters
        params: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };

    logging::init(&config.observability.log_level);

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let client = BlockchainClient::open(config)?;

    // Ctrl-C cancels whatever is in flight.
    let closer = client.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, closing client");
            closer.close();
        }
    });

    let result = run(&client, cli.command).await;
    client.close();
    result
}

async fn run(client: &BlockchainClient, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::BlockNumber => print_json(&client.block_number().await?),
        Commands::Block { input, mixed } => {
            if mixed {
                print_json(&client.mixed_block_by_number_or_hash(&input).await?)
            } else {
                print_json(&client.block_by_number_or_hash(&input).await?)
            }
        }
        Commands::Tx { hash } => print_json(&client.transaction_by_hash(&hash).await?),
        Commands::Receipt { hash } => print_json(&client.transaction_detail(&hash).await?),
        Commands::Balance { address, block } => print_json(&client.balance(&address, &block).await?),
        Commands::Nonce => print_json(&client.pending_nonce().await?),
        Commands::Send {
            to,
            amount,
            nonce,
            wait,
        } => {
            let nonce = match nonce {
                Some(nonce) => nonce,
                None => client.pending_nonce().await?,
            };
            let pipeline = TxPipeline::new(client.clone());
            let tx_hash = pipeline
                .send_transaction(OperationKind::Transfer, nonce, &to, &amount, &[])
                .await?;

            if wait {
                print_json(&client.confirm(&tx_hash, SEND_TRANSACTION_OP).await?)
            } else {
                print_json(&tx_hash)
            }
        }
        Commands::Deploy {
            file,
            nonce,
            source,
            solc,
        } => {
            let coordinator = DeploymentCoordinator::new(client.clone());
            let deployed = if source {
                let text = tokio::fs::read_to_string(&file).await?;
                coordinator.deploy_source(&Solc::new(solc), &text, nonce).await?
            } else {
                let output = tokio::fs::read(&file).await?;
                coordinator.deploy(&parse_combined_json(&output)?, nonce).await?
            };
            print_json(&deployed)
        }
        Commands::Consensus => print_json(&client.consensus().await?),
        Commands::Rpc { method, params } => {
            let params = match params {
                Some(text) => match serde_json::from_str(&text)? {
                    Value::Array(items) => items,
                    single => vec![single],
                },
                None => Vec::new(),
            };
            print_json(&client.call_rpc_api(&method, params).await?)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
