//! Retry policy for estimation, submission and finality polling
//!
//! Every wait is raced against a cancellation token so an operator (or a
//! test) can stop an otherwise unbounded loop.

use crate::chain::LedgerKind;
use crate::config::RetryConfig;
use crate::error::{BridgeError, BridgeResult};

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Transaction retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Fixed backoff between failed estimation or submission attempts
    pub backoff: Duration,
    /// Log every n-th consecutive failure
    pub log_every: u64,
    /// Receipt polling interval for the core space
    pub core_poll_interval: Duration,
    /// Receipt polling interval for the EVM space
    pub evm_poll_interval: Duration,
    /// Polling interval while waiting for a nonce to become visible
    pub nonce_poll_interval: Duration,
    /// Upper bound on consecutive failures, unlimited when `None`
    pub max_attempts: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            backoff: Duration::from_millis(config.backoff_ms),
            log_every: config.log_every.max(1),
            core_poll_interval: Duration::from_secs(config.core_poll_secs),
            evm_poll_interval: Duration::from_millis(config.evm_poll_ms),
            nonce_poll_interval: Duration::from_millis(config.nonce_poll_ms),
            max_attempts: config.max_attempts,
        }
    }

    /// Receipt polling interval for a ledger
    pub fn poll_interval(&self, kind: LedgerKind) -> Duration {
        match kind {
            LedgerKind::Core => self.core_poll_interval,
            LedgerKind::Evm => self.evm_poll_interval,
        }
    }

    /// Check if the n-th consecutive failure should be logged
    pub fn should_log(&self, failures: u64) -> bool {
        failures > 0 && failures % self.log_every == 0
    }

    /// Fail once the attempt budget is spent
    pub fn check_budget(&self, failures: u64, operation: &str) -> BridgeResult<()> {
        match self.max_attempts {
            Some(max) if failures >= max => Err(BridgeError::RetriesExhausted {
                operation: operation.to_string(),
                attempts: failures,
            }),
            _ => Ok(()),
        }
    }

    /// Sleep for the fixed backoff unless cancelled
    pub async fn back_off(&self, cancel: &CancellationToken, operation: &str) -> BridgeResult<()> {
        pause(self.backoff, cancel, operation).await
    }
}

/// Sleep for `duration` unless `cancel` fires first
pub async fn pause(
    duration: Duration,
    cancel: &CancellationToken,
    operation: &str,
) -> BridgeResult<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(BridgeError::Cancelled {
            operation: operation.to_string(),
        }),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
