//! Configuration validation.
//!
//! Serde handles syntax; this pass checks values. Every problem is reported,
//! not just the first.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ClientConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a parsed configuration.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = config.node.rpc_url.parse::<url::Url>() {
        errors.push(ValidationError {
            field: "node.rpc_url",
            message: format!("'{}' is not a valid URL: {}", config.node.rpc_url, e),
        });
    }
    for failover in &config.node.failover_urls {
        if let Err(e) = failover.parse::<url::Url>() {
            errors.push(ValidationError {
                field: "node.failover_urls",
                message: format!("'{}' is not a valid URL: {}", failover, e),
            });
        }
    }
    if config.node.rpc_timeout_secs == 0 {
        errors.push(ValidationError {
            field: "node.rpc_timeout_secs",
            message: "must be greater than zero".to_string(),
        });
    }
    if config.confirmation.max_attempts == 0 {
        errors.push(ValidationError {
            field: "confirmation.max_attempts",
            message: "must be greater than zero".to_string(),
        });
    }
    if config.confirmation.timeout_secs == 0 {
        errors.push(ValidationError {
            field: "confirmation.timeout_secs",
            message: "must be greater than zero".to_string(),
        });
    }
    if config.signer.keystore_path.is_some() && config.signer.password_file.is_none() {
        errors.push(ValidationError {
            field: "signer.password_file",
            message: "required when signer.keystore_path is set".to_string(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError {
            field: "observability.metrics_address",
            message: format!("'{}' is not a socket address", config.observability.metrics_address),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
