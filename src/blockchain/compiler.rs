//! Solidity compilation through the `solc` command line.

use std::path::PathBuf;
use std::process::Stdio;

use alloy::primitives::Bytes;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::blockchain::types::{BlockchainError, BlockchainResult};

const BASE_OUTPUTS: &str = "bin,bin-runtime,srcmap,srcmap-runtime,abi,userdoc,devdoc";

/// One deployable contract from compiler output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledContract {
    /// Contract name without its source-unit prefix.
    pub name: String,
    /// ABI as JSON text.
    pub abi: String,
    /// Init code.
    pub bytecode: Bytes,
}

#[derive(Debug, Deserialize)]
struct CombinedOutput {
    contracts: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct CombinedContract {
    #[serde(default)]
    abi: Value,
    #[serde(default)]
    bin: String,
}

/// Parse `solc --combined-json` output, sorted by contract name.
///
/// Older compilers emit each ABI as a JSON-encoded string; newer ones inline it.
pub fn parse_combined_json(output: &[u8]) -> BlockchainResult<Vec<CompiledContract>> {
    let combined: CombinedOutput = serde_json::from_slice(output)
        .map_err(|e| BlockchainError::Compiler(format!("unreadable combined-json output: {}", e)))?;

    let mut contracts = Vec::with_capacity(combined.contracts.len());
    for (qualified, entry) in combined.contracts {
        let entry: CombinedContract = serde_json::from_value(entry)
            .map_err(|e| BlockchainError::Compiler(format!("{}: {}", qualified, e)))?;
        let name = qualified.rsplit(':').next().unwrap_or(&qualified).to_string();

        let abi = match entry.abi {
            Value::String(text) => text,
            Value::Array(items) => Value::Array(items).to_string(),
            other => {
                return Err(BlockchainError::Compiler(format!(
                    "{}: unexpected abi value {}",
                    qualified, other
                )))
            }
        };

        let hex = entry.bin.trim();
        let bytecode: Bytes = alloy::hex::decode(hex)
            .map_err(|e| BlockchainError::Compiler(format!("{}: bad bytecode: {}", qualified, e)))?
            .into();

        contracts.push(CompiledContract { name, abi, bytecode });
    }

    contracts.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(contracts)
}

/// `major.minor.patch` of a compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolcVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SolcVersion {
    /// Find the first `x.y.z` in `solc --version` output.
    pub fn parse(output: &str) -> Option<Self> {
        output
            .split(|c: char| !(c.is_ascii_digit() || c == '.'))
            .find_map(|token| {
                let mut parts = token.split('.');
                let major = parts.next()?.parse().ok()?;
                let minor = parts.next()?.parse().ok()?;
                let patch = parts.next()?.parse().ok()?;
                Some(Self { major, minor, patch })
            })
    }

    /// Output selection passed to `--combined-json`.
    pub fn combined_outputs(&self) -> String {
        if self.major > 0 || self.minor > 4 || self.patch > 6 {
            format!("{},metadata,hashes", BASE_OUTPUTS)
        } else {
            BASE_OUTPUTS.to_string()
        }
    }
}

impl std::fmt::Display for SolcVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A `solc` executable.
#[derive(Debug, Clone)]
pub struct Solc {
    path: PathBuf,
}

impl Default for Solc {
    fn default() -> Self {
        Self::new("solc")
    }
}

impl Solc {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn version(&self) -> BlockchainResult<SolcVersion> {
        let output = Command::new(&self.path)
            .arg("--version")
            .output()
            .await
            .map_err(|e| BlockchainError::Compiler(format!("cannot run {}: {}", self.path.display(), e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        SolcVersion::parse(&stdout)
            .ok_or_else(|| BlockchainError::Compiler(format!("can't parse solc version {:?}", stdout)))
    }

    /// Compile Solidity source fed on stdin.
    pub async fn compile_source(&self, source: &str) -> BlockchainResult<Vec<CompiledContract>> {
        let version = self.version().await?;
        let mut child = Command::new(&self.path)
            .arg("--combined-json")
            .arg(version.combined_outputs())
            .args(["--optimize", "--allow-paths", "., ./, ../", "--", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BlockchainError::Compiler(format!("cannot run {}: {}", self.path.display(), e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(source.as_bytes())
                .await
                .map_err(|e| BlockchainError::Compiler(format!("cannot write source: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| BlockchainError::Compiler(e.to_string()))?;
        if !output.status.success() {
            return Err(BlockchainError::Compiler(format!(
                "solc: {}\n{}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let contracts = parse_combined_json(&output.stdout)?;
        tracing::info!(
            solc = %version,
            contracts = contracts.len(),
            "Compiled contract source"
        );
        Ok(contracts)
    }
}
