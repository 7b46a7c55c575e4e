//! Moving tokens and the native asset between the two spaces

use super::BridgeDriver;
use crate::chain::LedgerKind;
use crate::contracts::{bridge, CROSS_SPACE_GATEWAY};
use crate::error::{BridgeError, BridgeResult};

use ethers::types::{Address, U256};
use ethers::utils::format_units;
use tracing::info;

impl BridgeDriver {
    /// Cross `amount` of both faucet tokens to the other side
    pub async fn cross(&self, amount: U256) -> BridgeResult<()> {
        let contracts = self.ctx.contracts();
        let core_token = self.ctx.address(contracts.faucet_token(LedgerKind::Core)).await?;
        let evm_token = self.ctx.address(contracts.faucet_token(LedgerKind::Evm)).await?;

        self.cross_core_token(core_token, self.account(LedgerKind::Evm), amount)
            .await?;
        self.cross_evm_token(evm_token, self.account(LedgerKind::Core), amount)
            .await
    }

    /// Lock a core-native token on the core side and credit its mirror to
    /// `evm_recipient`
    pub async fn cross_core_token(
        &self,
        token: Address,
        evm_recipient: Address,
        amount: U256,
    ) -> BridgeResult<()> {
        let core_side = self.ctx.side(LedgerKind::Core).await?;

        self.ctx
            .transact(
                LedgerKind::Core,
                token,
                bridge::approve(core_side, amount),
                U256::zero(),
                "approve token to ConfluxSide",
            )
            .await?;

        self.register(LedgerKind::Core, token).await?;

        self.ctx
            .transact(
                LedgerKind::Core,
                core_side,
                bridge::cross_to_evm(token, evm_recipient, amount),
                U256::zero(),
                "cross token to evm space",
            )
            .await?;
        Ok(())
    }

    /// Lock an EVM-native token on the EVM side, then claim its mirror on
    /// the core side for `core_recipient`.
    ///
    /// No registration step; the core side creates the mirror on the first
    /// `crossFromEvm` of a token.
    pub async fn cross_evm_token(
        &self,
        token: Address,
        core_recipient: Address,
        amount: U256,
    ) -> BridgeResult<()> {
        let evm_side = self.ctx.side(LedgerKind::Evm).await?;
        let core_side = self.ctx.side(LedgerKind::Core).await?;

        self.ctx
            .transact(
                LedgerKind::Evm,
                token,
                bridge::approve(evm_side, amount),
                U256::zero(),
                "approve token to EvmSide",
            )
            .await?;

        self.ctx
            .transact(
                LedgerKind::Evm,
                evm_side,
                bridge::lock_token(token, core_recipient, amount),
                U256::zero(),
                "lock token in EvmSide",
            )
            .await?;

        self.ctx
            .transact(
                LedgerKind::Core,
                core_side,
                bridge::cross_from_evm(token, self.account(LedgerKind::Evm), amount),
                U256::zero(),
                "cross token from EvmSide",
            )
            .await?;
        Ok(())
    }

    /// Send `amount` of both faucet tokens' mirrors back to their native side
    pub async fn withdraw(&self, amount: U256) -> BridgeResult<()> {
        let contracts = self.ctx.contracts();
        let core_token = self.ctx.address(contracts.faucet_token(LedgerKind::Core)).await?;
        let evm_token = self.ctx.address(contracts.faucet_token(LedgerKind::Evm)).await?;

        self.withdraw_core_token(core_token, self.account(LedgerKind::Core), amount)
            .await?;
        self.withdraw_evm_token(evm_token, self.account(LedgerKind::Evm), amount)
            .await
    }

    async fn require_mirror(&self, native_kind: LedgerKind, token: Address) -> BridgeResult<Address> {
        let mirror = self.mirror(native_kind, token).await?;
        if mirror.is_zero() {
            return Err(BridgeError::Precondition(format!(
                "{} has no mirror on {}, cross it first",
                self.ctx.client(native_kind).display_address(token),
                native_kind.companion()
            )));
        }
        Ok(mirror)
    }

    /// Lock the EVM mirror of core-native `token` and release the native
    /// token to `core_recipient`
    pub async fn withdraw_core_token(
        &self,
        token: Address,
        core_recipient: Address,
        amount: U256,
    ) -> BridgeResult<()> {
        let mirror = self.require_mirror(LedgerKind::Core, token).await?;
        let evm_side = self.ctx.side(LedgerKind::Evm).await?;
        let core_side = self.ctx.side(LedgerKind::Core).await?;

        self.ctx
            .transact(
                LedgerKind::Evm,
                mirror,
                bridge::approve(evm_side, amount),
                U256::zero(),
                "approve mapped token to EvmSide",
            )
            .await?;

        self.ctx
            .transact(
                LedgerKind::Evm,
                evm_side,
                bridge::lock_mapped_token(mirror, core_recipient, amount),
                U256::zero(),
                "lock mapped token in EvmSide",
            )
            .await?;

        self.ctx
            .transact(
                LedgerKind::Core,
                core_side,
                bridge::withdraw_from_evm(token, self.account(LedgerKind::Evm), amount),
                U256::zero(),
                "withdraw from EvmSide",
            )
            .await?;
        Ok(())
    }

    /// Burn the core mirror of EVM-native `token` and release the native
    /// token to `evm_recipient`
    pub async fn withdraw_evm_token(
        &self,
        token: Address,
        evm_recipient: Address,
        amount: U256,
    ) -> BridgeResult<()> {
        self.require_mirror(LedgerKind::Evm, token).await?;
        let core_side = self.ctx.side(LedgerKind::Core).await?;

        self.ctx
            .transact(
                LedgerKind::Core,
                core_side,
                bridge::withdraw_to_evm(token, evm_recipient, amount),
                U256::zero(),
                "withdraw mapped token to EvmSide",
            )
            .await?;
        Ok(())
    }

    /// Move `amount` of the native asset from the core space to
    /// `recipient` in the EVM space through the built-in gateway.
    ///
    /// Returns the recipient's EVM balance afterwards.
    pub async fn cross_native(&self, amount: U256, recipient: Option<Address>) -> BridgeResult<U256> {
        let recipient = recipient.unwrap_or_else(|| self.account(LedgerKind::Evm));

        self.ctx
            .transact(
                LedgerKind::Core,
                CROSS_SPACE_GATEWAY,
                bridge::transfer_evm(recipient),
                amount,
                "transfer native asset to evm space",
            )
            .await?;

        let balance = self.ctx.client(LedgerKind::Evm).balance(recipient).await?;
        info!(
            "balance: {}",
            format_units(balance, 18u32).unwrap_or_else(|_| balance.to_string())
        );
        Ok(balance)
    }
}
