//! Finality classification for the two spaces
//!
//! The spaces report receipts under different guarantees:
//! - Core: receipts show up before the executing epoch is irreversible. Only a
//!   receipt whose state root is populated may be trusted.
//! - EVM: a receipt carrying a status is authoritative.

use super::{LedgerKind, Outcome, Receipt};

use ethers::types::H256;

/// How a ledger signals that a receipt can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalityModel {
    /// Trust a receipt once its state root is non-zero
    StateRoot,
    /// Trust any receipt with a definite status
    Receipt,
}

impl FinalityModel {
    pub fn for_ledger(kind: LedgerKind) -> Self {
        match kind {
            LedgerKind::Core => FinalityModel::StateRoot,
            LedgerKind::Evm => FinalityModel::Receipt,
        }
    }

    /// Check if a receipt has reached finality under this model
    pub fn is_final(&self, receipt: &Receipt) -> bool {
        match self {
            FinalityModel::StateRoot => receipt
                .state_root
                .map(|root| root != H256::zero())
                .unwrap_or(false),
            FinalityModel::Receipt => true,
        }
    }

    /// Turn an optional network receipt into an outcome
    pub fn classify(&self, receipt: Option<Receipt>) -> Outcome {
        match receipt {
            Some(receipt) if self.is_final(&receipt) => Outcome::Final(receipt),
            _ => Outcome::Pending,
        }
    }
}
