//! Per-run context shared by every workflow
//!
//! Built once in `main`: both ledger clients, the submission engine, the
//! nonce allocator, the deployment manifest and the contract set in use.

use crate::chain::{ChainClient, LedgerKind, PendingCall, Receipt};
use crate::contracts::{ArtifactStore, ContractSet};
use crate::deploy::DeploymentRecord;
use crate::error::{BridgeError, BridgeResult};
use crate::tx::{SequenceAllocator, SubmissionEngine};

use ethers::types::{Address, Bytes, H256, U256};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

pub struct BridgeContext {
    core: Arc<dyn ChainClient>,
    evm: Arc<dyn ChainClient>,
    engine: SubmissionEngine,
    nonces: SequenceAllocator,
    manifest: Arc<DeploymentRecord>,
    artifacts: ArtifactStore,
    contracts: ContractSet,
    cancel: CancellationToken,
    run_id: Uuid,
}

impl BridgeContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        core: Arc<dyn ChainClient>,
        evm: Arc<dyn ChainClient>,
        engine: SubmissionEngine,
        nonces: SequenceAllocator,
        manifest: Arc<DeploymentRecord>,
        artifacts: ArtifactStore,
        contracts: ContractSet,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            core,
            evm,
            engine,
            nonces,
            manifest,
            artifacts,
            contracts,
            cancel,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn client(&self, kind: LedgerKind) -> &dyn ChainClient {
        match kind {
            LedgerKind::Core => self.core.as_ref(),
            LedgerKind::Evm => self.evm.as_ref(),
        }
    }

    pub fn manifest(&self) -> &DeploymentRecord {
        &self.manifest
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn contracts(&self) -> &ContractSet {
        &self.contracts
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Invoke `to` on `kind` with the next nonce and wait for the final receipt
    pub async fn transact(
        &self,
        kind: LedgerKind,
        to: Address,
        data: Bytes,
        value: U256,
        task: &str,
    ) -> BridgeResult<Receipt> {
        let client = self.client(kind);
        let nonce = self.nonces.next(client).await?;
        let call = PendingCall::invoke(to, data, nonce).with_value(value);

        info!("{} on {}..", task, kind);
        self.engine.transact(client, &call, task, &self.cancel).await
    }

    /// Invoke `to` on `kind` for a step that must land at most once.
    ///
    /// The transaction hash is recorded under `<step>Pending` before the
    /// finality wait. A later run finds it and waits on that transaction
    /// instead of sending the step again; only a hash whose receipt failed
    /// is superseded by a fresh submission.
    pub async fn transact_once(
        &self,
        kind: LedgerKind,
        step: &str,
        to: Address,
        data: Bytes,
        task: &str,
    ) -> BridgeResult<Receipt> {
        let client = self.client(kind);
        let pending = pending_key(step);

        if let Some(recorded) = self.manifest.get(&pending).await {
            let tx_hash = recorded.parse::<H256>().map_err(|e| {
                BridgeError::Manifest(format!("{} = {} is not a transaction hash: {}", pending, recorded, e))
            })?;
            info!("{} on {} was sent by an earlier run, waiting on {:?}", task, kind, tx_hash);
            let receipt = self
                .engine
                .wait_for_finality(client, tx_hash, &self.cancel)
                .await?;
            if receipt.success {
                return self.engine.check_execution(kind, task, receipt);
            }
            warn!("{} from an earlier run failed on {}, sending it again", task, kind);
        }

        let nonce = self.nonces.next(client).await?;
        let call = PendingCall::invoke(to, data, nonce);

        info!("{} on {}..", task, kind);
        let tx_hash = self.engine.send(client, &call, &self.cancel).await?;
        self.manifest.replace(&pending, format!("{:?}", tx_hash)).await?;

        let receipt = self
            .engine
            .wait_for_finality(client, tx_hash, &self.cancel)
            .await?;
        self.engine.check_execution(kind, task, receipt)
    }

    /// Create a contract on `kind` and return its address
    pub async fn create(&self, kind: LedgerKind, init_code: Bytes, task: &str) -> BridgeResult<Address> {
        let client = self.client(kind);
        let nonce = self.nonces.next(client).await?;
        let call = PendingCall::create(init_code, nonce);

        info!("{} on {}..", task, kind);
        let receipt = self.engine.transact(client, &call, task, &self.cancel).await?;
        let address = receipt
            .contract_created
            .ok_or_else(|| BridgeError::MissingContractAddress {
                ledger: kind,
                tx_hash: format!("{:?}", receipt.tx_hash),
            })?;
        crate::metrics::record_contract_deployed(kind);
        Ok(address)
    }

    /// Read-only call against the latest state of `kind`
    pub async fn read(&self, kind: LedgerKind, to: Address, data: Bytes) -> BridgeResult<Bytes> {
        self.client(kind).call(to, data).await
    }

    /// Record `address` under `name` in the form `kind`'s tooling displays it
    pub async fn record(&self, kind: LedgerKind, name: &str, address: Address) -> BridgeResult<()> {
        let display = self.client(kind).display_address(address);
        self.manifest.record(name, display).await
    }

    /// Address recorded under `name`
    pub async fn address(&self, name: &str) -> BridgeResult<Address> {
        self.manifest.address(name).await
    }

    /// Address of the bridge side deployed on `kind`
    pub async fn side(&self, kind: LedgerKind) -> BridgeResult<Address> {
        self.address(self.contracts.side(kind)).await
    }

    /// Wait until the network has caught up with every nonce handed out here
    pub async fn settle(&self) -> BridgeResult<()> {
        for kind in [LedgerKind::Core, LedgerKind::Evm] {
            let client = self.client(kind);
            let Some(target) = self.nonces.peek(kind, client.sender()).await else {
                continue;
            };
            self.nonces
                .wait_until_visible(client, client.sender(), target, &self.cancel)
                .await?;
        }
        Ok(())
    }
}

fn pending_key(step: &str) -> String {
    format!("{}Pending", step)
}
