//! Metrics collection and exposition.
//!
//! # Metrics
//! - `node_client_rpc_requests_total` (counter): RPC calls by method, outcome
//! - `node_client_transactions_broadcast_total` (counter): broadcasts by kind
//! - `node_client_confirmations_total` (counter): tracker outcomes by operation
//! - `node_client_confirmation_polls` (histogram): receipt polls per tracked tx
//!
//! Recording is a no-op until a recorder is installed, so library users
//! that never call [`init_metrics`] pay nothing.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_rpc_request(method: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    metrics::counter!(
        "node_client_rpc_requests_total",
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_broadcast(kind: &'static str) {
    metrics::counter!("node_client_transactions_broadcast_total", "kind" => kind).increment(1);
}

pub fn record_confirmation(operation: &str, outcome: &'static str, polls: u32) {
    metrics::counter!(
        "node_client_confirmations_total",
        "operation" => operation.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("node_client_confirmation_polls").record(polls as f64);
}
