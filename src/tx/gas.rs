//! Resource limit and fee price markups for the two spaces

use crate::chain::{LedgerKind, ResourceEstimate, ResourceLimits};
use crate::config::GasConfig;

use ethers::types::U256;
use tracing::debug;

/// Turns raw estimates into the limits a transaction is signed with
#[derive(Debug, Clone)]
pub struct ResourcePolicy {
    /// Safety margin on core storage collateral (e.g., 30 = 30% margin)
    storage_margin_percent: u64,
    /// Markup on the reported fee price, both spaces
    fee_markup_percent: u64,
    /// Multiplier on EVM gas estimates (e.g., 150 = 1.5x)
    evm_gas_multiplier_percent: u64,
    /// Lowest gas limit ever sent to the EVM space
    evm_gas_floor: U256,
}

impl ResourcePolicy {
    pub fn new(config: &GasConfig) -> Self {
        Self {
            storage_margin_percent: config.storage_margin_percent,
            fee_markup_percent: config.fee_markup_percent,
            evm_gas_multiplier_percent: config.evm_gas_multiplier_percent,
            evm_gas_floor: U256::from(config.evm_gas_floor),
        }
    }

    /// Compute signing limits from an estimate, the current fee price and an
    /// optional fixed gas limit
    pub fn limits(
        &self,
        kind: LedgerKind,
        estimate: &ResourceEstimate,
        fee_price: U256,
        gas_override: Option<U256>,
    ) -> ResourceLimits {
        let gas_price = round_percent(fee_price, 100 + self.fee_markup_percent);

        let limits = match kind {
            LedgerKind::Core => {
                let storage = estimate.storage.unwrap_or_default();
                ResourceLimits {
                    gas: gas_override.unwrap_or(estimate.gas),
                    gas_price,
                    storage: Some(ceil_percent(storage, 100 + self.storage_margin_percent)),
                }
            }
            LedgerKind::Evm => {
                let gas = gas_override.unwrap_or_else(|| {
                    round_percent(estimate.gas, self.evm_gas_multiplier_percent)
                        .max(self.evm_gas_floor)
                });
                ResourceLimits {
                    gas,
                    gas_price,
                    storage: None,
                }
            }
        };

        debug!("Resource limits on {}: {:?}", kind, limits);
        limits
    }
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        Self::new(&GasConfig::default())
    }
}

/// `value * percent / 100`, rounded half up
fn round_percent(value: U256, percent: u64) -> U256 {
    (value * U256::from(percent) + U256::from(50)) / U256::from(100)
}

/// `value * percent / 100`, rounded up
fn ceil_percent(value: U256, percent: u64) -> U256 {
    (value * U256::from(percent) + U256::from(99)) / U256::from(100)
}
