//! Transaction submission with unbounded retry and per-ledger finality waits

use super::gas::ResourcePolicy;
use super::retry::{pause, RetryPolicy};
use crate::chain::{ChainClient, LedgerKind, Outcome, PendingCall, Receipt, ResourceLimits};
use crate::error::{BridgeError, BridgeResult};

use ethers::types::H256;
use serde::Deserialize;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What to do with a finalized transaction whose execution failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the workflow with `BridgeError::ExecutionFailed`
    FailFast,
    /// Log the failure and hand the receipt back to the workflow
    LogAndContinue,
}

/// Submits calls and waits for them to become final
pub struct SubmissionEngine {
    /// Gas/storage markups
    resources: ResourcePolicy,
    /// Backoff and polling
    retry: RetryPolicy,
    core_failure: FailurePolicy,
    evm_failure: FailurePolicy,
}

impl SubmissionEngine {
    /// Create a new submission engine
    pub fn new(
        resources: ResourcePolicy,
        retry: RetryPolicy,
        core_failure: FailurePolicy,
        evm_failure: FailurePolicy,
    ) -> Self {
        Self {
            resources,
            retry,
            core_failure,
            evm_failure,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn failure_policy(&self, kind: LedgerKind) -> FailurePolicy {
        match kind {
            LedgerKind::Core => self.core_failure,
            LedgerKind::Evm => self.evm_failure,
        }
    }

    /// Submit `call` and return its final receipt, then apply the ledger's
    /// execution-failure policy
    pub async fn transact(
        &self,
        client: &dyn ChainClient,
        call: &PendingCall,
        task: &str,
        cancel: &CancellationToken,
    ) -> BridgeResult<Receipt> {
        let receipt = self.submit_and_confirm(client, call, cancel).await?;
        self.check_execution(client.kind(), task, receipt)
    }

    /// Submit `call` until the network accepts it, then wait for finality.
    ///
    /// A receipt whose execution failed is still returned; see `transact`.
    pub async fn submit_and_confirm(
        &self,
        client: &dyn ChainClient,
        call: &PendingCall,
        cancel: &CancellationToken,
    ) -> BridgeResult<Receipt> {
        let started = Instant::now();
        let tx_hash = self.send(client, call, cancel).await?;
        let receipt = self.wait_for_finality(client, tx_hash, cancel).await?;
        crate::metrics::record_tx_latency(client.kind(), started.elapsed().as_secs_f64());
        Ok(receipt)
    }

    /// Submit `call` until the network accepts it, re-estimating every round
    pub async fn send(
        &self,
        client: &dyn ChainClient,
        call: &PendingCall,
        cancel: &CancellationToken,
    ) -> BridgeResult<H256> {
        let kind = client.kind();
        let mut submit_failures: u64 = 0;

        loop {
            // Fresh estimate on every round
            let limits = self.estimate_with_retry(client, call, cancel).await?;

            match client.submit(call, &limits).await {
                Ok(tx_hash) => {
                    info!(
                        "Transaction sent on {}: {:?} (nonce {}, after {} rejected submissions)",
                        kind, tx_hash, call.nonce, submit_failures
                    );
                    crate::metrics::record_tx_submitted(kind);
                    return Ok(tx_hash);
                }
                Err(e) => {
                    submit_failures += 1;
                    crate::metrics::record_submission_retry(kind);
                    if self.retry.should_log(submit_failures) {
                        warn!(
                            "Send retried {} times on {}. Received error: {}",
                            submit_failures, kind, e
                        );
                        warn!("Rejected call: {:?} with {:?}", call, limits);
                    }
                    self.retry.check_budget(submit_failures, "submission")?;
                    self.retry.back_off(cancel, "submission").await?;
                }
            }
        }
    }

    /// Estimate until the ledger answers, then apply markups
    async fn estimate_with_retry(
        &self,
        client: &dyn ChainClient,
        call: &PendingCall,
        cancel: &CancellationToken,
    ) -> BridgeResult<ResourceLimits> {
        let kind = client.kind();
        let mut failures: u64 = 0;

        loop {
            match self.quote(client, call).await {
                Ok(limits) => return Ok(limits),
                Err(e) => {
                    failures += 1;
                    crate::metrics::record_estimation_retry(kind);
                    if self.retry.should_log(failures) {
                        warn!(
                            "Estimate retried {} times on {}. Received error: {}",
                            failures, kind, e
                        );
                    }
                    self.retry.check_budget(failures, "estimation")?;
                    self.retry.back_off(cancel, "estimation").await?;
                }
            }
        }
    }

    async fn quote(&self, client: &dyn ChainClient, call: &PendingCall) -> BridgeResult<ResourceLimits> {
        let estimate = client.estimate(call).await?;
        let fee_price = client.fee_price().await?;
        Ok(self
            .resources
            .limits(client.kind(), &estimate, fee_price, call.gas_override))
    }

    /// Poll the ledger until the transaction's receipt is final
    pub async fn wait_for_finality(
        &self,
        client: &dyn ChainClient,
        tx_hash: H256,
        cancel: &CancellationToken,
    ) -> BridgeResult<Receipt> {
        let kind = client.kind();
        let interval = self.retry.poll_interval(kind);
        let started = Instant::now();

        loop {
            match client.outcome(tx_hash).await {
                Ok(Outcome::Final(receipt)) => {
                    crate::metrics::record_finality_wait(kind, started.elapsed().as_secs_f64());
                    debug!("Transaction {:?} final on {}", tx_hash, kind);
                    return Ok(receipt);
                }
                Ok(Outcome::Pending) => {
                    debug!("Transaction {:?} not yet final on {}", tx_hash, kind);
                }
                Err(e) => {
                    // Lookup failures say nothing about the transaction
                    warn!("Receipt lookup for {:?} on {} failed: {}", tx_hash, kind, e);
                }
            }

            pause(interval, cancel, "transaction finality").await?;
        }
    }

    /// Apply the ledger's failure policy to a finalized receipt
    pub fn check_execution(&self, kind: LedgerKind, task: &str, receipt: Receipt) -> BridgeResult<Receipt> {
        if receipt.success {
            crate::metrics::record_tx_confirmed(kind);
            return Ok(receipt);
        }

        crate::metrics::record_tx_failed(kind);
        match self.failure_policy(kind) {
            FailurePolicy::FailFast => {
                error!("{} failed on {} (tx {:?})", task, kind, receipt.tx_hash);
                Err(BridgeError::ExecutionFailed {
                    ledger: kind,
                    task: task.to_string(),
                    tx_hash: format!("{:?}", receipt.tx_hash),
                })
            }
            FailurePolicy::LogAndContinue => {
                error!(
                    "{} failed on {} (tx {:?}), continuing",
                    task, kind, receipt.tx_hash
                );
                Ok(receipt)
            }
        }
    }
}

impl Default for SubmissionEngine {
    fn default() -> Self {
        Self::new(
            ResourcePolicy::default(),
            RetryPolicy::default(),
            FailurePolicy::FailFast,
            FailurePolicy::FailFast,
        )
    }
}
