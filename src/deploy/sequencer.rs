//! Ordered implementation -> beacon -> proxy rollout and beacon upgrades
//!
//! Every step is one confirmed transaction whose created address feeds the
//! next step. A step whose manifest key already exists is skipped and the
//! recorded address is threaded through instead, so an interrupted rollout
//! resumes where it stopped.

use crate::chain::LedgerKind;
use crate::context::BridgeContext;
use crate::contracts::{abi, bridge, BEACON_ARTIFACT, PROXY_ARTIFACT};
use crate::error::{BridgeError, BridgeResult};

use ethers::abi::Token;
use ethers::types::{Address, Bytes, U256};
use std::future::Future;
use tracing::{info, warn};

/// One deployed contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub address: Address,
    /// Taken from the manifest rather than deployed in this run
    pub resumed: bool,
}

/// Result of `deploy_behind_proxy`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployed {
    pub implementation: Placement,
    pub beacon: Placement,
    pub proxy: Option<Placement>,
}

impl Deployed {
    /// Address callers talk to: the proxy when there is one, else the beacon
    pub fn entry_point(&self) -> Address {
        self.proxy
            .map(|proxy| proxy.address)
            .unwrap_or(self.beacon.address)
    }
}

fn impl_key(name: &str) -> String {
    format!("{}Impl", name)
}

fn beacon_key(name: &str) -> String {
    format!("{}Beacon", name)
}

pub struct DeploymentSequencer<'a> {
    ctx: &'a BridgeContext,
}

impl<'a> DeploymentSequencer<'a> {
    pub fn new(ctx: &'a BridgeContext) -> Self {
        Self { ctx }
    }

    /// Deploy `init_code` under `key` unless the manifest already has it.
    ///
    /// `init_code` is only awaited when the step actually runs.
    async fn place(
        &self,
        kind: LedgerKind,
        key: &str,
        init_code: impl Future<Output = BridgeResult<Bytes>>,
    ) -> BridgeResult<Placement> {
        if self.ctx.manifest().contains(key).await {
            let address = self.ctx.address(key).await?;
            info!("{} already deployed at {:?}, skipping", key, address);
            return Ok(Placement {
                address,
                resumed: true,
            });
        }

        let address = self
            .ctx
            .create(kind, init_code.await?, &format!("deploy {}", key))
            .await?;
        self.ctx.record(kind, key, address).await?;
        Ok(Placement {
            address,
            resumed: false,
        })
    }

    /// Deploy a contract that is not upgradeable, recorded as `name`
    pub async fn deploy_plain(
        &self,
        kind: LedgerKind,
        name: &str,
        init_code: Bytes,
    ) -> BridgeResult<Placement> {
        self.place(kind, name, async move { Ok::<_, BridgeError>(init_code) }).await
    }

    /// Deploy `<name>Impl`, then `<name>Beacon` pointing at it, then, if
    /// `with_proxy`, the proxy `<name>` forwarding through the beacon
    pub async fn deploy_behind_proxy(
        &self,
        kind: LedgerKind,
        name: &str,
        init_code: Bytes,
        with_proxy: bool,
    ) -> BridgeResult<Deployed> {
        let artifacts = self.ctx.artifacts();

        let implementation = self
            .place(kind, &impl_key(name), async move { Ok::<_, BridgeError>(init_code) })
            .await?;

        let beacon = self
            .place(kind, &beacon_key(name), async {
                artifacts
                    .creation_code(BEACON_ARTIFACT, &[Token::Address(implementation.address)])
                    .await
            })
            .await?;

        let proxy = if with_proxy {
            let placed = self
                .place(kind, name, async {
                    artifacts
                        .creation_code(
                            PROXY_ARTIFACT,
                            &[Token::Address(beacon.address), Token::Bytes(Vec::new())],
                        )
                        .await
                })
                .await?;
            Some(placed)
        } else {
            None
        };

        Ok(Deployed {
            implementation,
            beacon,
            proxy,
        })
    }

    /// Deploy a new implementation for `name` and point `<name>Beacon` at it.
    ///
    /// The beacon and proxy addresses stay as recorded. `<name>Impl` is only
    /// replaced once the beacon reports the new implementation.
    pub async fn upgrade(
        &self,
        kind: LedgerKind,
        name: &str,
        new_init_code: Bytes,
    ) -> BridgeResult<Address> {
        let beacon = self.ctx.address(&beacon_key(name)).await?;

        let implementation = self
            .ctx
            .create(kind, new_init_code, &format!("deploy new {}", impl_key(name)))
            .await?;
        self.ctx
            .transact(
                kind,
                beacon,
                bridge::upgrade_to(implementation),
                U256::zero(),
                &format!("upgrade {}", beacon_key(name)),
            )
            .await?;

        let current = abi::decode_address(
            &self
                .ctx
                .read(kind, beacon, bridge::implementation())
                .await?,
        )?;
        if current != implementation {
            warn!(
                "{} reports implementation {:?}, expected {:?}",
                beacon_key(name),
                current,
                implementation
            );
            return Err(BridgeError::Precondition(format!(
                "{} still points at {:?} after upgrade",
                beacon_key(name),
                current
            )));
        }

        let display = self.ctx.client(kind).display_address(implementation);
        self.ctx.manifest().replace(&impl_key(name), display).await?;

        info!("{} now points at {:?}", beacon_key(name), implementation);
        Ok(implementation)
    }
}
