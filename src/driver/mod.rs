//! Bridge workflows
//!
//! One driver serves every contract-set version; the `ContractSet` in the
//! context decides names, upgradeability and the access model. Each step
//! of a workflow is one confirmed transaction, issued in order.

mod setup;
mod status;
mod transfer;

pub use setup::UpgradeTarget;

use crate::chain::LedgerKind;
use crate::context::BridgeContext;
use crate::contracts::{abi, bridge};
use crate::deploy::DeploymentSequencer;
use crate::error::BridgeResult;

use ethers::types::{Address, U256};
use std::sync::Arc;

/// Bridging lifecycle of one native token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Unregistered,
    /// `registerMetadata` confirmed on the native side
    MetadataRegistered,
    /// A mirror exists on the companion side
    MirrorCreated,
    /// Mirror exists and the two bridge sides are linked
    Crossable,
}

/// Default amount moved by the cross and withdraw workflows, 1 token
pub fn default_amount() -> U256 {
    U256::exp10(18)
}

pub struct BridgeDriver {
    ctx: Arc<BridgeContext>,
}

impl BridgeDriver {
    pub fn new(ctx: Arc<BridgeContext>) -> Self {
        Self { ctx }
    }

    fn sequencer(&self) -> DeploymentSequencer<'_> {
        DeploymentSequencer::new(&self.ctx)
    }

    fn account(&self, kind: LedgerKind) -> Address {
        self.ctx.client(kind).sender()
    }

    /// Mirror of `native` (living on `native_kind`) on the companion side,
    /// zero when it has none
    pub async fn mirror(&self, native_kind: LedgerKind, native: Address) -> BridgeResult<Address> {
        let companion = native_kind.companion();
        let companion_side = self.ctx.side(companion).await?;
        let output = self
            .ctx
            .read(companion, companion_side, bridge::mapped_tokens(native))
            .await?;
        abi::decode_address(&output)
    }

    /// Manifest marker written once `registerMetadata` for `token` is confirmed
    fn metadata_key(&self, native_kind: LedgerKind, token: Address) -> String {
        format!("{}Metadata", self.ctx.client(native_kind).display_address(token))
    }

    /// Core side's recorded EVM side, zero until linked
    async fn linked_evm_side(&self) -> BridgeResult<Address> {
        let core_side = self.ctx.side(LedgerKind::Core).await?;
        let output = self
            .ctx
            .read(LedgerKind::Core, core_side, bridge::evm_side())
            .await?;
        abi::decode_address(&output)
    }
}
