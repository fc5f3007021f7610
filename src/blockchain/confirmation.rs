//! Confirmation monitoring.
//!
//! A tracker polls for a transaction's receipt until one of four things
//! happens: the receipt shows success, the receipt shows a revert, the poll
//! ceiling is reached, or the wall-clock deadline passes. The ceiling and the
//! deadline are independent; whichever trips first decides the outcome.
//!
//! ```text
//! spawn(tx_hash, op) ──▶ [task] poll ──▶ None ──▶ sleep ──▶ poll ...
//!        │                      ├──▶ Some(status=1) ──▶ Ok(receipt)
//!        │                      ├──▶ Some(status=0) ──▶ OnChainRevert
//!        │                      └──▶ RPC error ──────▶ propagated as-is
//!        ▼
//! ConfirmationHandle::wait(self) ──▶ TxResultStatus (exactly once)
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::blockchain::models::{Receipt, ReceiptStatus};
use crate::blockchain::types::{BlockchainError, BlockchainResult, ConfirmationConfig};
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;

/// Outcome of tracking one transaction.
pub type TxResultStatus = BlockchainResult<Receipt>;

/// Source of wire-form receipts.
#[async_trait]
pub trait ReceiptFetcher: Send + Sync {
    /// `Ok(None)` means the transaction is not mined yet.
    async fn fetch_receipt(&self, tx_hash: &str) -> BlockchainResult<Option<Receipt>>;
}

/// Bounds applied while waiting for a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    /// Pause after each receipt-absent poll.
    pub poll_interval: Duration,
    /// Receipt-absent polls allowed before giving up.
    pub max_attempts: u32,
    /// Deadline for the whole wait, in-flight RPCs included.
    pub timeout: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self::from(&ConfirmationConfig::default())
    }
}

impl From<&ConfirmationConfig> for ConfirmationPolicy {
    fn from(config: &ConfirmationConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_attempts: config.max_attempts,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Polls a [`ReceiptFetcher`] until a transaction reaches a terminal state.
#[derive(Clone)]
pub struct ConfirmationTracker {
    fetcher: Arc<dyn ReceiptFetcher>,
    policy: ConfirmationPolicy,
    cancel: Option<ShutdownSignal>,
}

impl ConfirmationTracker {
    pub fn new(fetcher: Arc<dyn ReceiptFetcher>, policy: ConfirmationPolicy) -> Self {
        Self {
            fetcher,
            policy,
            cancel: None,
        }
    }

    /// Abort tracking with `Cancelled` once `signal` fires.
    pub fn with_cancellation(mut self, signal: ShutdownSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    pub fn policy(&self) -> ConfirmationPolicy {
        self.policy
    }

    /// Start tracking on a separate task.
    ///
    /// The result can only be read through [`ConfirmationHandle::wait`].
    pub fn spawn(&self, tx_hash: impl Into<String>, op_label: impl Into<String>) -> ConfirmationHandle {
        let tx_hash = tx_hash.into();
        let op_label = op_label.into();
        let tracker = self.clone();
        let (hash, label) = (tx_hash.clone(), op_label.clone());
        let task = tokio::spawn(async move { tracker.confirm(&hash, &label).await });

        ConfirmationHandle {
            tx_hash,
            op_label,
            task,
        }
    }

    /// Track on the caller's task and return the terminal outcome.
    pub async fn confirm(&self, tx_hash: &str, op_label: &str) -> TxResultStatus {
        let mut polls = 0u32;
        let result = {
            let bounded = timeout(self.policy.timeout, self.poll(tx_hash, op_label, &mut polls));
            let outcome = match self.cancel.clone() {
                Some(mut signal) => tokio::select! {
                    outcome = bounded => Some(outcome),
                    _ = signal.cancelled() => None,
                },
                None => Some(bounded.await),
            };
            match outcome {
                Some(Ok(result)) => result,
                Some(Err(_)) => Err(BlockchainError::Timeout {
                    tx_hash: tx_hash.to_string(),
                    op_label: op_label.to_string(),
                    secs: self.policy.timeout.as_secs(),
                }),
                None => Err(BlockchainError::Cancelled),
            }
        };

        metrics::record_confirmation(op_label, outcome_label(&result), polls);
        match &result {
            Ok(receipt) => tracing::info!(
                tx_hash,
                op_label,
                polls,
                block_number = %receipt.block_number,
                "Transaction confirmed"
            ),
            Err(e) => tracing::warn!(tx_hash, op_label, polls, error = %e, "Transaction not confirmed"),
        }
        result
    }

    async fn poll(&self, tx_hash: &str, op_label: &str, polls: &mut u32) -> TxResultStatus {
        loop {
            let receipt = self.fetcher.fetch_receipt(tx_hash).await?;
            *polls += 1;

            let Some(receipt) = receipt else {
                if *polls >= self.policy.max_attempts {
                    return Err(BlockchainError::PollLimitExceeded {
                        tx_hash: tx_hash.to_string(),
                        op_label: op_label.to_string(),
                        attempts: *polls,
                    });
                }
                tracing::debug!(tx_hash, op_label, attempt = *polls, "Transaction pending");
                sleep(self.policy.poll_interval).await;
                continue;
            };

            return match receipt.outcome()? {
                ReceiptStatus::Success => Ok(receipt),
                ReceiptStatus::Failed => Err(BlockchainError::OnChainRevert {
                    tx_hash: tx_hash.to_string(),
                    op_label: op_label.to_string(),
                    bloom: receipt.logs_bloom,
                }),
            };
        }
    }
}

fn outcome_label(result: &TxResultStatus) -> &'static str {
    match result {
        Ok(_) => "confirmed",
        Err(BlockchainError::OnChainRevert { .. }) => "reverted",
        Err(BlockchainError::PollLimitExceeded { .. }) => "poll_limit",
        Err(BlockchainError::Timeout { .. }) => "timeout",
        Err(BlockchainError::Cancelled) => "cancelled",
        Err(_) => "error",
    }
}

/// The single consumer side of a spawned tracker.
#[derive(Debug)]
pub struct ConfirmationHandle {
    tx_hash: String,
    op_label: String,
    task: JoinHandle<TxResultStatus>,
}

impl ConfirmationHandle {
    pub fn tx_hash(&self) -> &str {
        &self.tx_hash
    }

    pub fn op_label(&self) -> &str {
        &self.op_label
    }

    /// Wait for the tracker to finish and take its result.
    pub async fn wait(self) -> TxResultStatus {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(BlockchainError::Cancelled),
        }
    }
}
