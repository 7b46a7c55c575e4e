//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Transaction submission and finality per ledger
//! - Estimation and submission retries
//! - Contract deployments
//! - Workflow outcomes

use crate::chain::LedgerKind;
use crate::error::BridgeResult;

use axum::{routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::{info, warn};

lazy_static! {
    // Transaction metrics
    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "crossspace_transactions_submitted_total",
        "Total transactions accepted by the network",
        &["ledger"]
    ).unwrap();

    pub static ref TX_CONFIRMED: CounterVec = register_counter_vec!(
        "crossspace_transactions_confirmed_total",
        "Total transactions finalized with a successful status",
        &["ledger"]
    ).unwrap();

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "crossspace_transactions_failed_total",
        "Total transactions finalized with a failed status",
        &["ledger"]
    ).unwrap();

    pub static ref TX_LATENCY: HistogramVec = register_histogram_vec!(
        "crossspace_transaction_latency_seconds",
        "Time from first estimate to final receipt",
        &["ledger"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();

    pub static ref FINALITY_WAIT: HistogramVec = register_histogram_vec!(
        "crossspace_finality_wait_seconds",
        "Time from submission to final receipt",
        &["ledger"],
        vec![0.5, 1.0, 5.0, 30.0, 60.0, 120.0, 300.0, 600.0]
    ).unwrap();

    // Retry metrics
    pub static ref ESTIMATION_RETRIES: CounterVec = register_counter_vec!(
        "crossspace_estimation_retries_total",
        "Total failed resource estimations",
        &["ledger"]
    ).unwrap();

    pub static ref SUBMISSION_RETRIES: CounterVec = register_counter_vec!(
        "crossspace_submission_retries_total",
        "Total rejected submissions",
        &["ledger"]
    ).unwrap();

    // Deployment metrics
    pub static ref CONTRACTS_DEPLOYED: CounterVec = register_counter_vec!(
        "crossspace_contracts_deployed_total",
        "Total contracts created",
        &["ledger"]
    ).unwrap();

    // Workflow metrics
    pub static ref WORKFLOWS: CounterVec = register_counter_vec!(
        "crossspace_workflows_total",
        "Workflow runs by outcome",
        &["workflow", "outcome"]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> BridgeResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

// Helper functions to record metrics

pub fn record_tx_submitted(ledger: LedgerKind) {
    TX_SUBMITTED.with_label_values(&[ledger.as_str()]).inc();
}

pub fn record_tx_confirmed(ledger: LedgerKind) {
    TX_CONFIRMED.with_label_values(&[ledger.as_str()]).inc();
}

pub fn record_tx_failed(ledger: LedgerKind) {
    TX_FAILED.with_label_values(&[ledger.as_str()]).inc();
}

pub fn record_tx_latency(ledger: LedgerKind, latency_secs: f64) {
    TX_LATENCY
        .with_label_values(&[ledger.as_str()])
        .observe(latency_secs);
}

pub fn record_finality_wait(ledger: LedgerKind, wait_secs: f64) {
    FINALITY_WAIT
        .with_label_values(&[ledger.as_str()])
        .observe(wait_secs);
}

pub fn record_estimation_retry(ledger: LedgerKind) {
    ESTIMATION_RETRIES.with_label_values(&[ledger.as_str()]).inc();
}

pub fn record_submission_retry(ledger: LedgerKind) {
    SUBMISSION_RETRIES.with_label_values(&[ledger.as_str()]).inc();
}

pub fn record_contract_deployed(ledger: LedgerKind) {
    CONTRACTS_DEPLOYED.with_label_values(&[ledger.as_str()]).inc();
}

pub fn record_workflow(workflow: &str, succeeded: bool) {
    let outcome = if succeeded { "success" } else { "failure" };
    WORKFLOWS.with_label_values(&[workflow, outcome]).inc();
}
