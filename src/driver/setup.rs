//! Deployment, token registration, upgrades and admin handover

use super::{BridgeDriver, TokenState};
use crate::chain::LedgerKind;
use crate::contracts::{abi, bridge, AccessModel, FAUCET_ARTIFACT};
use crate::error::{BridgeError, BridgeResult};

use ethers::types::{Address, U256};
use tracing::{debug, info, warn};

/// What an upgrade replaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeTarget {
    /// The bridge side on the chosen ledger
    BridgeSide,
    /// The mapped-token template every mirror forwards to
    TokenTemplate,
}

fn initialized_key(side: &str) -> String {
    format!("{}Initialized", side)
}

fn minted_key(token: &str) -> String {
    format!("{}Minted", token)
}

impl BridgeDriver {
    /// Deploy both bridge sides and link them
    pub async fn deploy(&self) -> BridgeResult<(Address, Address)> {
        info!(
            "Deploying {:?} contract set (run {})",
            self.ctx.contracts().version,
            self.ctx.run_id()
        );

        // The two halves only share the manifest
        let (core_side, evm_side) = futures::try_join!(
            self.deploy_side(LedgerKind::Core),
            self.deploy_side(LedgerKind::Evm)
        )?;

        self.link(core_side, evm_side).await?;
        Ok((core_side, evm_side))
    }

    async fn deploy_side(&self, kind: LedgerKind) -> BridgeResult<Address> {
        let contracts = self.ctx.contracts();
        let artifacts = self.ctx.artifacts();
        let sequencer = self.sequencer();
        let side = contracts.side(kind);

        if !contracts.upgradeable {
            let code = artifacts.creation_code(side, &[]).await?;
            return Ok(sequencer.deploy_plain(kind, side, code).await?.address);
        }

        let template = sequencer
            .deploy_behind_proxy(
                kind,
                contracts.token_template(kind),
                artifacts
                    .creation_code(contracts.token_template_artifact(), &[])
                    .await?,
                false,
            )
            .await?;
        let token_beacon = template.beacon.address;

        let deployed = sequencer
            .deploy_behind_proxy(kind, side, artifacts.creation_code(side, &[]).await?, true)
            .await?;
        let proxy = deployed.entry_point();

        let marker = initialized_key(side);
        if self.ctx.manifest().contains(&marker).await {
            debug!("{} already initialized", side);
        } else {
            let receipt = self
                .ctx
                .transact_once(
                    kind,
                    &marker,
                    proxy,
                    bridge::initialize(token_beacon),
                    &format!("initialize {}", side),
                )
                .await?;
            if receipt.success {
                self.ctx.record(kind, &marker, token_beacon).await?;
            }
        }

        Ok(proxy)
    }

    /// Point the core side at the EVM side, unless it already is
    async fn link(&self, core_side: Address, evm_side: Address) -> BridgeResult<()> {
        if self.linked_evm_side().await? == evm_side {
            info!("Bridge sides already linked");
            return Ok(());
        }

        self.ctx
            .transact(
                LedgerKind::Core,
                core_side,
                bridge::set_evm_side(evm_side),
                U256::zero(),
                "register both sides",
            )
            .await?;
        Ok(())
    }

    /// Deploy a faucet token on each side and mint 100 tokens to the admin
    pub async fn faucet(&self) -> BridgeResult<(Address, Address)> {
        futures::try_join!(
            self.deploy_faucet(LedgerKind::Core),
            self.deploy_faucet(LedgerKind::Evm)
        )
    }

    async fn deploy_faucet(&self, kind: LedgerKind) -> BridgeResult<Address> {
        let contracts = self.ctx.contracts();
        let (name, symbol, decimals) = contracts.faucet_metadata(kind);
        let code = self
            .ctx
            .artifacts()
            .creation_code(FAUCET_ARTIFACT, &bridge::faucet_token_args(name, symbol, decimals))
            .await?;

        let token = self
            .sequencer()
            .deploy_plain(kind, contracts.faucet_token(kind), code)
            .await?;

        let marker = minted_key(contracts.faucet_token(kind));
        if self.ctx.manifest().contains(&marker).await {
            debug!("{} already minted", contracts.faucet_token(kind));
        } else {
            let owner = self.account(kind);
            let receipt = self
                .ctx
                .transact_once(
                    kind,
                    &marker,
                    token.address,
                    bridge::mint(owner, U256::exp10(20)),
                    &format!("mint {}", symbol),
                )
                .await?;
            if receipt.success {
                self.ctx.record(kind, &marker, owner).await?;
            }
        }

        Ok(token.address)
    }

    /// Make `token`, native to `native_kind`, crossable: register its
    /// metadata on the native side and create its mirror on the companion.
    ///
    /// Both steps are skipped when a mirror already exists; metadata
    /// registration is skipped when a previous run recorded it.
    pub async fn register(&self, native_kind: LedgerKind, token: Address) -> BridgeResult<Address> {
        let companion = native_kind.companion();

        let existing = self.mirror(native_kind, token).await?;
        if !existing.is_zero() {
            info!(
                "{} already mapped to {} on {}",
                self.ctx.client(native_kind).display_address(token),
                self.ctx.client(companion).display_address(existing),
                companion
            );
            return Ok(existing);
        }

        let marker = self.metadata_key(native_kind, token);
        if self.ctx.manifest().contains(&marker).await {
            debug!("Metadata of {:?} registered by an earlier run", token);
        } else {
            let native_side = self.ctx.side(native_kind).await?;
            let receipt = self
                .ctx
                .transact_once(
                    native_kind,
                    &marker,
                    native_side,
                    bridge::register_metadata(token),
                    &format!("register metadata to {} space", companion),
                )
                .await?;
            if receipt.success {
                self.ctx.record(native_kind, &marker, token).await?;
                debug!("{:?} is {:?}", token, TokenState::MetadataRegistered);
            }
        }

        let companion_side = self.ctx.side(companion).await?;
        self.ctx
            .transact(
                companion,
                companion_side,
                bridge::create_mapped_token(token),
                U256::zero(),
                &format!("create mapped token in {} side", companion),
            )
            .await?;

        let mirror = self.mirror(native_kind, token).await?;
        if mirror.is_zero() {
            return Err(BridgeError::Precondition(format!(
                "no mirror of {:?} visible on {} after createMappedToken",
                token, companion
            )));
        }
        debug!("{:?} is {:?}", token, TokenState::MirrorCreated);

        info!(
            "Mapped {} to {} on {}",
            self.ctx.client(native_kind).display_address(token),
            self.ctx.client(companion).display_address(mirror),
            companion
        );
        Ok(mirror)
    }

    /// Replace the implementation behind a beacon on `kind`
    pub async fn upgrade(&self, kind: LedgerKind, target: UpgradeTarget) -> BridgeResult<Address> {
        let contracts = self.ctx.contracts();
        if !contracts.upgradeable {
            return Err(BridgeError::Precondition(format!(
                "{:?} contracts are not upgradeable",
                contracts.version
            )));
        }

        let (name, artifact) = match target {
            UpgradeTarget::BridgeSide => (contracts.side(kind), contracts.side(kind)),
            UpgradeTarget::TokenTemplate => (
                contracts.token_template(kind),
                contracts.token_template_artifact(),
            ),
        };

        let code = self.ctx.artifacts().creation_code(artifact, &[]).await?;
        self.sequencer().upgrade(kind, name, code).await
    }

    /// Hand admin rights over the bridge side on `kind` to `new_admin`
    pub async fn handover(&self, kind: LedgerKind, new_admin: Address) -> BridgeResult<()> {
        let side = self.ctx.side(kind).await?;
        let current = self.account(kind);

        if new_admin == current {
            return Err(BridgeError::Precondition(
                "new admin is the current admin".to_string(),
            ));
        }

        match self.ctx.contracts().access {
            AccessModel::Ownable => {
                self.ctx
                    .transact(
                        kind,
                        side,
                        bridge::transfer_ownership(new_admin),
                        U256::zero(),
                        "transfer ownership",
                    )
                    .await?;
            }
            AccessModel::Roles => {
                let before = self.admin_count(kind, side).await?;
                if before.is_zero() {
                    return Err(BridgeError::Precondition(format!(
                        "{} side has no admin to hand over from",
                        kind
                    )));
                }

                self.ctx
                    .transact(
                        kind,
                        side,
                        bridge::grant_admin(new_admin),
                        U256::zero(),
                        "grant admin role",
                    )
                    .await?;

                // Renouncing must never leave the side without an admin
                let after = self.admin_count(kind, side).await?;
                if after < U256::from(2) || !self.is_admin(kind, side, new_admin, after).await? {
                    warn!("{} side reports {} admins after grant", kind, after);
                    return Err(BridgeError::Precondition(format!(
                        "grant to {:?} not visible on {} side, keeping current admin",
                        new_admin, kind
                    )));
                }

                self.ctx
                    .transact(
                        kind,
                        side,
                        bridge::renounce_admin(current),
                        U256::zero(),
                        "renounce admin role",
                    )
                    .await?;
            }
        }

        info!(
            "{} side admin handed over to {}",
            kind,
            self.ctx.client(kind).display_address(new_admin)
        );
        Ok(())
    }

    async fn admin_count(&self, kind: LedgerKind, side: Address) -> BridgeResult<U256> {
        let output = self
            .ctx
            .read(kind, side, bridge::admin_member_count())
            .await?;
        abi::decode_uint(&output)
    }

    async fn is_admin(
        &self,
        kind: LedgerKind,
        side: Address,
        account: Address,
        count: U256,
    ) -> BridgeResult<bool> {
        let mut index = U256::zero();
        while index < count {
            let output = self.ctx.read(kind, side, bridge::admin_member(index)).await?;
            if abi::decode_address(&output)? == account {
                return Ok(true);
            }
            index += U256::one();
        }
        Ok(false)
    }
}
