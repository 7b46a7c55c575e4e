//! Read-only views: link status, balances, token states and listings

use super::{BridgeDriver, TokenState};
use crate::chain::LedgerKind;
use crate::contracts::{abi, bridge};
use crate::error::BridgeResult;

use ethers::types::{Address, Bytes, U256};
use ethers::utils::format_units;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balance {
    pub ledger: LedgerKind,
    pub label: String,
    pub amount: U256,
}

/// Snapshot logged by `show`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub core_side: Address,
    pub evm_side: Address,
    /// EVM side as recorded by the core side
    pub linked_evm_side: Address,
    /// Core side as recorded by the EVM side
    pub linked_core_side: Address,
    pub balances: Vec<Balance>,
    /// Lifecycle of each deployed faucet token, keyed by its native space
    pub faucet_states: Vec<(LedgerKind, TokenState)>,
}

impl StatusReport {
    pub fn is_linked(&self) -> bool {
        self.linked_evm_side == self.evm_side
    }
}

impl BridgeDriver {
    /// Where `token`, native to `native_kind`, is in its bridging lifecycle
    pub async fn token_state(&self, native_kind: LedgerKind, token: Address) -> BridgeResult<TokenState> {
        let mirror = self.mirror(native_kind, token).await?;
        if !mirror.is_zero() {
            let evm_side = self.ctx.side(LedgerKind::Evm).await?;
            return Ok(if self.linked_evm_side().await? == evm_side {
                TokenState::Crossable
            } else {
                TokenState::MirrorCreated
            });
        }

        let marker = self.metadata_key(native_kind, token);
        Ok(if self.ctx.manifest().contains(&marker).await {
            TokenState::MetadataRegistered
        } else {
            TokenState::Unregistered
        })
    }

    /// Every native token with a mirror created through the side on `kind`
    pub async fn tokens(&self, kind: LedgerKind) -> BridgeResult<Vec<Address>> {
        let side = self.ctx.side(kind).await?;
        let mut tokens = Vec::new();

        loop {
            let cursor = U256::from(tokens.len());
            let output = self.ctx.read(kind, side, bridge::get_tokens(cursor)).await?;
            let page = abi::decode_address_array(&output)?;
            if page.is_empty() {
                break;
            }
            tokens.extend(page);
        }

        for token in &tokens {
            info!("{} side token: {:?}", kind, token);
        }
        Ok(tokens)
    }

    async fn token_balance(&self, kind: LedgerKind, token: Address, holder: Address) -> BridgeResult<U256> {
        let output = self.ctx.read(kind, token, bridge::balance_of(holder)).await?;
        abi::decode_uint(&output)
    }

    async fn read_address(&self, kind: LedgerKind, to: Address, data: Bytes) -> BridgeResult<Address> {
        abi::decode_address(&self.ctx.read(kind, to, data).await?)
    }

    /// Log link status and the balances of the admin and the bridge sides
    pub async fn show(&self) -> BridgeResult<StatusReport> {
        let contracts = self.ctx.contracts();
        let core_side = self.ctx.side(LedgerKind::Core).await?;
        let evm_side = self.ctx.side(LedgerKind::Evm).await?;
        let core_admin = self.account(LedgerKind::Core);
        let evm_admin = self.account(LedgerKind::Evm);

        let linked_evm_side = self.linked_evm_side().await?;
        let linked_core_side = self
            .read_address(LedgerKind::Evm, evm_side, bridge::cfx_side())
            .await?;
        info!("EvmSide registered: {:?}", linked_evm_side);
        info!("ConfluxSide registered: {:?}", linked_core_side);

        let mut balances = vec![
            Balance {
                ledger: LedgerKind::Core,
                label: "admin native".to_string(),
                amount: self.ctx.client(LedgerKind::Core).balance(core_admin).await?,
            },
            Balance {
                ledger: LedgerKind::Evm,
                label: "admin native".to_string(),
                amount: self.ctx.client(LedgerKind::Evm).balance(evm_admin).await?,
            },
        ];
        let mut faucet_states = Vec::new();

        for native_kind in [LedgerKind::Core, LedgerKind::Evm] {
            let name = contracts.faucet_token(native_kind);
            if !self.ctx.manifest().contains(name).await {
                continue;
            }
            let token = self.ctx.address(name).await?;
            let (_, symbol, _) = contracts.faucet_metadata(native_kind);
            let companion = native_kind.companion();

            for (holder, who) in [
                (self.account(native_kind), "admin"),
                (self.ctx.side(native_kind).await?, contracts.side(native_kind)),
            ] {
                balances.push(Balance {
                    ledger: native_kind,
                    label: format!("{} ${}", who, symbol),
                    amount: self.token_balance(native_kind, token, holder).await?,
                });
            }

            let state = self.token_state(native_kind, token).await?;
            info!("{} ${} is {:?}", native_kind, symbol, state);
            faucet_states.push((native_kind, state));

            let mirror = self.mirror(native_kind, token).await?;
            if mirror.is_zero() {
                continue;
            }
            for (holder, who) in [
                (self.account(companion), "admin"),
                (self.ctx.side(companion).await?, contracts.side(companion)),
            ] {
                balances.push(Balance {
                    ledger: companion,
                    label: format!("{} mapped ${}", who, symbol),
                    amount: self.token_balance(companion, mirror, holder).await?,
                });
            }
        }

        for balance in &balances {
            info!(
                "{} {} balance: {}",
                balance.ledger,
                balance.label,
                format_units(balance.amount, 18u32).unwrap_or_else(|_| balance.amount.to_string())
            );
        }
        Ok(StatusReport {
            core_side,
            evm_side,
            linked_evm_side,
            linked_core_side,
            balances,
            faucet_states,
        })
    }
}
