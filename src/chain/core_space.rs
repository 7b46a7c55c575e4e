//! Core space client
//!
//! Talks `cfx_*` JSON-RPC, signs core transactions (which carry a storage
//! limit and an epoch height) and gates receipts on their state root.

use super::core_address;
use super::finality::FinalityModel;
use super::{ChainClient, LedgerKind, Outcome, PendingCall, Receipt, ResourceEstimate, ResourceLimits};
use crate::config::CoreConfig;
use crate::error::{BridgeError, BridgeResult};

use async_trait::async_trait;
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, H256, U256, U64};
use ethers::utils::keccak256;
use ethers::utils::rlp::RlpStream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tracing::debug;

const LATEST_STATE: &str = "latest_state";

/// Call object accepted by `cfx_call` and `cfx_estimateGasAndCollateral`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CoreCallRequest {
    from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<String>,
    data: Bytes,
    value: U256,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<U256>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoreEstimate {
    gas_used: U256,
    storage_collateralized: U256,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoreReceipt {
    transaction_hash: H256,
    outcome_status: U64,
    contract_created: Option<String>,
    state_root: H256,
    epoch_number: Option<U256>,
}

/// Client for the core space
pub struct CoreSpaceClient {
    provider: Provider<Http>,
    wallet: LocalWallet,
    network_id: u64,
    sender: Address,
}

impl CoreSpaceClient {
    /// Create a new core space client
    pub fn new(config: &CoreConfig, wallet: LocalWallet) -> BridgeResult<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| BridgeError::Config(format!("Invalid core RPC URL: {}", e)))?;
        let sender = core_address::user_address(wallet.address());

        debug!(
            "Core client for network {} signing as {}",
            config.network_id,
            core_address::encode(&sender, config.network_id)
        );

        Ok(Self {
            provider,
            wallet,
            network_id: config.network_id,
            sender,
        })
    }

    async fn request<P, R>(&self, method: &str, params: P) -> BridgeResult<R>
    where
        P: Debug + Serialize + Send + Sync,
        R: Debug + Serialize + DeserializeOwned + Send,
    {
        self.provider
            .request(method, params)
            .await
            .map_err(|e| BridgeError::Rpc {
                ledger: LedgerKind::Core,
                message: format!("{}: {}", method, e),
            })
    }

    fn call_request(&self, call: &PendingCall) -> CoreCallRequest {
        CoreCallRequest {
            from: self.display_address(self.sender),
            to: call.to.map(|to| self.display_address(to)),
            data: call.data.clone(),
            value: call.value,
            nonce: Some(call.nonce),
        }
    }

    async fn epoch_number(&self) -> BridgeResult<U256> {
        self.request("cfx_epochNumber", [LATEST_STATE]).await
    }

    fn unsigned_rlp(
        &self,
        call: &PendingCall,
        limits: &ResourceLimits,
        storage_limit: U256,
        epoch_height: U256,
    ) -> RlpStream {
        let mut stream = RlpStream::new_list(9);
        stream.append(&call.nonce);
        stream.append(&limits.gas_price);
        stream.append(&limits.gas);
        match call.to {
            Some(to) => {
                stream.append(&to);
            }
            None => {
                stream.append_empty_data();
            }
        }
        stream.append(&call.value);
        stream.append(&storage_limit);
        stream.append(&epoch_height);
        stream.append(&self.network_id);
        stream.append(&call.data.to_vec());
        stream
    }

    /// RLP-encode and sign a core transaction
    fn sign_transaction(
        &self,
        call: &PendingCall,
        limits: &ResourceLimits,
        epoch_height: U256,
    ) -> BridgeResult<Bytes> {
        let storage_limit = limits.storage.ok_or_else(|| {
            BridgeError::Internal("core transaction requires a storage limit".to_string())
        })?;

        let unsigned = self.unsigned_rlp(call, limits, storage_limit, epoch_height).out();
        let hash = H256::from(keccak256(&unsigned));
        let signature = self
            .wallet
            .sign_hash(hash)
            .map_err(|e| BridgeError::Wallet(e.to_string()))?;

        // Core signatures carry the bare recovery id
        let recovery_id = if signature.v >= 27 {
            signature.v - 27
        } else {
            signature.v
        };

        let mut stream = RlpStream::new_list(4);
        stream.append_raw(&unsigned, 1);
        stream.append(&recovery_id);
        stream.append(&signature.r);
        stream.append(&signature.s);
        Ok(Bytes::from(stream.out().freeze()))
    }
}

#[async_trait]
impl ChainClient for CoreSpaceClient {
    fn kind(&self) -> LedgerKind {
        LedgerKind::Core
    }

    fn sender(&self) -> Address {
        self.sender
    }

    fn display_address(&self, address: Address) -> String {
        core_address::encode(&address, self.network_id)
    }

    async fn next_nonce(&self, account: Address) -> BridgeResult<U256> {
        self.request("cfx_getNextNonce", [self.display_address(account)])
            .await
    }

    async fn fee_price(&self) -> BridgeResult<U256> {
        self.request("cfx_gasPrice", ()).await
    }

    async fn estimate(&self, call: &PendingCall) -> BridgeResult<ResourceEstimate> {
        let request = self.call_request(call);
        let estimate: CoreEstimate = self
            .request("cfx_estimateGasAndCollateral", (request, LATEST_STATE))
            .await
            .map_err(|e| BridgeError::Estimation {
                ledger: LedgerKind::Core,
                message: e.to_string(),
            })?;

        Ok(ResourceEstimate {
            gas: estimate.gas_used,
            storage: Some(estimate.storage_collateralized),
        })
    }

    async fn submit(&self, call: &PendingCall, limits: &ResourceLimits) -> BridgeResult<H256> {
        let epoch_height = self.epoch_number().await?;
        let raw = self.sign_transaction(call, limits, epoch_height)?;

        self.request("cfx_sendRawTransaction", [raw])
            .await
            .map_err(|e| BridgeError::Submission {
                ledger: LedgerKind::Core,
                message: e.to_string(),
            })
    }

    async fn outcome(&self, tx_hash: H256) -> BridgeResult<Outcome> {
        let raw: Option<CoreReceipt> = self
            .request("cfx_getTransactionReceipt", [tx_hash])
            .await?;

        let receipt = match raw {
            Some(raw) => {
                let contract_created = raw
                    .contract_created
                    .as_deref()
                    .map(|created| core_address::decode(created).map(|d| d.address))
                    .transpose()?;

                Some(Receipt {
                    tx_hash: raw.transaction_hash,
                    success: raw.outcome_status.is_zero(),
                    contract_created,
                    block_marker: raw.epoch_number,
                    state_root: Some(raw.state_root),
                })
            }
            None => None,
        };

        Ok(FinalityModel::for_ledger(LedgerKind::Core).classify(receipt))
    }

    async fn call(&self, to: Address, data: Bytes) -> BridgeResult<Bytes> {
        let request = CoreCallRequest {
            from: self.display_address(self.sender),
            to: Some(self.display_address(to)),
            data,
            value: U256::zero(),
            nonce: None,
        };
        self.request("cfx_call", (request, LATEST_STATE)).await
    }

    async fn balance(&self, account: Address) -> BridgeResult<U256> {
        self.request("cfx_getBalance", [self.display_address(account)])
            .await
    }
}
