//! Error types for the cross-space driver

use crate::chain::LedgerKind;
use thiserror::Error;

/// Main error type for the driver
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("RPC error on {ledger}: {message}")]
    Rpc { ledger: LedgerKind, message: String },

    #[error("Resource estimation failed on {ledger}: {message}")]
    Estimation { ledger: LedgerKind, message: String },

    #[error("Submission rejected by {ledger}: {message}")]
    Submission { ledger: LedgerKind, message: String },

    #[error("{task} failed on {ledger} (tx {tx_hash})")]
    ExecutionFailed {
        ledger: LedgerKind,
        task: String,
        tx_hash: String,
    },

    #[error("Receipt for {tx_hash} on {ledger} carries no created contract")]
    MissingContractAddress { ledger: LedgerKind, tx_hash: String },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("Artifact {name}: {message}")]
    Artifact { name: String, message: String },

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Invalid address {input}: {message}")]
    Address { input: String, message: String },

    #[error("{name} is not deployed (missing from manifest)")]
    NotDeployed { name: String },

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Gave up on {operation} after {attempts} attempts")]
    RetriesExhausted { operation: String, attempts: u64 },

    #[error("Cancelled while waiting for {operation}")]
    Cancelled { operation: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Check if the error was caused by the operator cancelling the run
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BridgeError::Cancelled { .. })
    }
}

/// Result type for driver operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_classification() {
        let cancelled = BridgeError::Cancelled {
            operation: "transaction finality".into(),
        };
        assert!(cancelled.is_cancelled());

        let reverted = BridgeError::ExecutionFailed {
            ledger: LedgerKind::Evm,
            task: "approve".into(),
            tx_hash: "0x01".into(),
        };
        assert!(!reverted.is_cancelled());
        assert_eq!(reverted.to_string(), "approve failed on evm (tx 0x01)");
    }
}
