//! JSON-RPC transport with timeout and failover.
//!
//! # Responsibilities
//! - Connect to one primary and any number of failover endpoints
//! - Bound every request by the configured timeout
//! - Move on to the next endpoint on connection errors and timeouts
//! - Return node-side JSON-RPC errors immediately (another node would say the same)

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use alloy::providers::{Provider, ProviderBuilder};
use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;

use crate::blockchain::types::{BlockchainError, BlockchainResult, NodeConfig};
use crate::observability::metrics;

/// A single request/response JSON-RPC call.
///
/// A `null` result comes back as `Value::Null`; interpreting it is the caller's job.
/// Implementations must tolerate concurrent calls.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> BlockchainResult<Value>;
}

/// HTTP transport backed by alloy providers.
#[derive(Clone)]
pub struct HttpTransport {
    /// List of providers (primary + failovers).
    providers: Vec<Arc<dyn Provider + Send + Sync>>,
    /// Request timeout duration.
    timeout_duration: Duration,
}

impl HttpTransport {
    /// Create a transport for the configured endpoints.
    ///
    /// No connection is made here; the first request does that.
    pub fn new(config: &NodeConfig) -> BlockchainResult<Self> {
        let mut providers = Vec::new();

        // 1. Add primary provider
        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            BlockchainError::Transport(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        providers.push(Arc::new(ProviderBuilder::new().connect_http(primary_url)) as Arc<dyn Provider + Send + Sync>);

        // 2. Add failover providers
        for url_str in &config.failover_urls {
            if let Ok(url) = url_str.parse() {
                providers.push(Arc::new(ProviderBuilder::new().connect_http(url)) as Arc<dyn Provider + Send + Sync>);
            } else {
                tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL");
            }
        }

        tracing::debug!(
            rpc_url = %config.rpc_url,
            endpoints = providers.len(),
            "HTTP transport ready"
        );

        Ok(Self {
            providers,
            timeout_duration: Duration::from_secs(config.rpc_timeout_secs),
        })
    }

    /// Number of configured endpoints.
    pub fn endpoint_count(&self) -> usize {
        self.providers.len()
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> BlockchainResult<Value> {
        let raw_params = serde_json::value::to_raw_value(&params).map_err(|e| {
            BlockchainError::Transport(format!("Cannot encode params for {}: {}", method, e))
        })?;

        for (i, provider) in self.providers.iter().enumerate() {
            let fut = provider.raw_request_dyn(Cow::Owned(method.to_string()), &raw_params);
            match timeout(self.timeout_duration, fut).await {
                Ok(Ok(raw)) => {
                    metrics::record_rpc_request(method, true);
                    return serde_json::from_str(raw.get()).map_err(|e| BlockchainError::Decode {
                        method: method.to_string(),
                        reason: e.to_string(),
                    });
                }
                Ok(Err(e)) if e.as_error_resp().is_some() => {
                    metrics::record_rpc_request(method, false);
                    return Err(BlockchainError::Transport(e.to_string()));
                }
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, method, error = %e, "RPC error, trying next provider");
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, method, "RPC timeout, trying next provider");
                }
            }
        }

        metrics::record_rpc_request(method, false);
        Err(BlockchainError::Transport(format!(
            "All RPC providers failed for {}",
            method
        )))
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoints", &self.providers.len())
            .field("timeout", &self.timeout_duration)
            .finish()
    }
}
