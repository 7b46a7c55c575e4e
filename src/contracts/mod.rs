//! Contract interfaces the driver calls into
//!
//! The bridge sides, tokens, beacons and the cross-space gateway are opaque
//! collaborators; this module only knows their call signatures and which
//! contract set a deployment uses.

pub mod abi;
pub mod artifacts;
pub mod bridge;

pub use artifacts::ArtifactStore;

use crate::chain::LedgerKind;

use ethers::types::{Address, H160};
use serde::Deserialize;

/// Built-in contract moving the native asset between the two spaces
pub const CROSS_SPACE_GATEWAY: Address = H160([
    0x08, 0x88, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x06,
]);

/// `DEFAULT_ADMIN_ROLE` of OpenZeppelin access control
pub const DEFAULT_ADMIN_ROLE: [u8; 32] = [0u8; 32];

/// Artifact of the beacon contract every upgradeable deployment sits behind
pub const BEACON_ARTIFACT: &str = "UpgradeableBeacon";
/// Artifact of the forwarding proxy
pub const PROXY_ARTIFACT: &str = "BeaconProxy";
/// Artifact deployed by the faucet workflow on both sides
pub const FAUCET_ARTIFACT: &str = "FaucetToken";

/// Generation of bridge contracts a deployment uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractSetVersion {
    /// Plain, ownable bridge sides
    V1,
    /// Bridge sides behind beacon proxies with role-based access
    V2,
}

/// How admin rights over a bridge side are held
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessModel {
    Ownable,
    Roles,
}

/// Names and shape of one contract-set version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractSet {
    pub version: ContractSetVersion,
    /// Whether the bridge sides and token template sit behind beacons
    pub upgradeable: bool,
    pub access: AccessModel,
}

impl ContractSet {
    pub fn for_version(version: ContractSetVersion) -> Self {
        match version {
            ContractSetVersion::V1 => Self {
                version,
                upgradeable: false,
                access: AccessModel::Ownable,
            },
            ContractSetVersion::V2 => Self {
                version,
                upgradeable: true,
                access: AccessModel::Roles,
            },
        }
    }

    /// Manifest name and artifact of the bridge side living on `kind`
    pub fn side(&self, kind: LedgerKind) -> &'static str {
        match kind {
            LedgerKind::Core => "ConfluxSide",
            LedgerKind::Evm => "EvmSide",
        }
    }

    /// Manifest name of the mapped-token template on `kind`
    pub fn token_template(&self, kind: LedgerKind) -> &'static str {
        match kind {
            LedgerKind::Core => "ConfluxMappedToken",
            LedgerKind::Evm => "EvmMappedToken",
        }
    }

    /// Artifact the token template is built from
    pub fn token_template_artifact(&self) -> &'static str {
        "MappedToken"
    }

    /// Manifest name of the faucet token deployed on `kind`
    pub fn faucet_token(&self, kind: LedgerKind) -> &'static str {
        match kind {
            LedgerKind::Core => "ConfluxFaucetToken",
            LedgerKind::Evm => "EvmFaucetToken",
        }
    }

    /// Name, symbol and decimals of the faucet token on `kind`
    pub fn faucet_metadata(&self, kind: LedgerKind) -> (&'static str, &'static str, u8) {
        match kind {
            LedgerKind::Core => ("Conflux Faucet Token", "CFT", 18),
            LedgerKind::Evm => ("Evm Faucet Token", "EFT", 18),
        }
    }
}
