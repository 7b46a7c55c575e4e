//! Chain module - uniform client capability over the two bridged spaces
//!
//! This module provides:
//! - The `ChainClient` trait both ledger adapters implement
//! - Transaction, estimate and receipt types shared by the submission engine
//! - Per-ledger finality classification
//! - CIP-37 address codec for the core space

pub mod core_address;
pub mod core_space;
pub mod evm_space;
pub mod finality;

pub use core_space::CoreSpaceClient;
pub use evm_space::EvmSpaceClient;

use crate::error::{BridgeError, BridgeResult};

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two execution spaces driven by this tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    /// Storage-collateral metered space, finality gated on the state root
    Core,
    /// Gas metered EVM space, receipts are final once they carry a status
    Evm,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Core => "core",
            LedgerKind::Evm => "evm",
        }
    }

    /// The ledger on the other side of the bridge
    pub fn companion(&self) -> LedgerKind {
        match self {
            LedgerKind::Core => LedgerKind::Evm,
            LedgerKind::Evm => LedgerKind::Core,
        }
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unsigned contract invocation or creation
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCall {
    /// Target contract, `None` creates a contract from `data`
    pub to: Option<Address>,
    pub data: Bytes,
    pub value: U256,
    pub nonce: U256,
    /// Fixed gas limit for call shapes whose estimate is unreliable
    pub gas_override: Option<U256>,
}

impl PendingCall {
    pub fn create(init_code: Bytes, nonce: U256) -> Self {
        Self {
            to: None,
            data: init_code,
            value: U256::zero(),
            nonce,
            gas_override: None,
        }
    }

    pub fn invoke(to: Address, data: Bytes, nonce: U256) -> Self {
        Self {
            to: Some(to),
            data,
            value: U256::zero(),
            nonce,
            gas_override: None,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// Raw resource estimate returned by a ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceEstimate {
    pub gas: U256,
    /// Storage collateral, only reported by the core space
    pub storage: Option<U256>,
}

/// Limits and price a transaction is signed with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub gas: U256,
    pub gas_price: U256,
    /// Storage limit, required by the core space
    pub storage: Option<U256>,
}

/// Ledger confirmation record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: H256,
    pub success: bool,
    pub contract_created: Option<Address>,
    /// Block number (EVM) or epoch number (core) the transaction landed in
    pub block_marker: Option<U256>,
    /// Core receipts only
    pub state_root: Option<H256>,
}

/// Result of polling for a transaction's outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    Final(Receipt),
}

/// Uniform capability over one ledger
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Which space this client talks to
    fn kind(&self) -> LedgerKind;

    /// Signing identity of this client
    fn sender(&self) -> Address;

    /// Render an address the way this ledger's tooling displays it
    fn display_address(&self, address: Address) -> String;

    /// Network-reported next usable nonce for `account`
    async fn next_nonce(&self, account: Address) -> BridgeResult<U256>;

    /// Current fee price
    async fn fee_price(&self) -> BridgeResult<U256>;

    async fn estimate(&self, call: &PendingCall) -> BridgeResult<ResourceEstimate>;

    /// Sign `call` with `limits` and hand it to the network
    async fn submit(&self, call: &PendingCall, limits: &ResourceLimits) -> BridgeResult<H256>;

    async fn outcome(&self, tx_hash: H256) -> BridgeResult<Outcome>;

    /// Read-only call against the latest state
    async fn call(&self, to: Address, data: Bytes) -> BridgeResult<Bytes>;

    async fn balance(&self, account: Address) -> BridgeResult<U256>;
}

/// Parse either a CIP-37 core address or a hex address
pub fn parse_address(input: &str) -> BridgeResult<Address> {
    if input.contains(':') {
        return core_address::decode(input).map(|decoded| decoded.address);
    }

    input.parse::<Address>().map_err(|e| BridgeError::Address {
        input: input.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_companion_ledger() {
        assert_eq!(LedgerKind::Core.companion(), LedgerKind::Evm);
        assert_eq!(LedgerKind::Evm.companion(), LedgerKind::Core);
    }

    #[test]
    fn test_parse_hex_and_core_addresses() {
        let hex = parse_address("0x106d49f8505410eb4e671d51f7d96d2c87807b09").unwrap();
        let core = parse_address("cfx:aajg4wt2mbmbb44sp6szd783ry0jtad5bea80xdy7p").unwrap();
        assert_eq!(hex, core);
        assert!(parse_address("not-an-address").is_err());
    }

    #[test]
    fn test_pending_call_builders() {
        let call = PendingCall::invoke(Address::repeat_byte(1), Bytes::from(vec![1, 2]), 7.into())
            .with_value(10.into());
        assert_eq!(call.to, Some(Address::repeat_byte(1)));
        assert_eq!(call.value, U256::from(10));
        assert_eq!(call.gas_override, None);
        assert_eq!(PendingCall::create(Bytes::new(), U256::zero()).to, None);
    }
}
