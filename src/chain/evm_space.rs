//! EVM space client built on an ethers HTTP provider and a local wallet

use super::finality::FinalityModel;
use super::{ChainClient, LedgerKind, Outcome, PendingCall, Receipt, ResourceEstimate, ResourceLimits};
use crate::config::EvmConfig;
use crate::error::{BridgeError, BridgeResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::time::Duration;
use tracing::debug;

/// Client for the EVM space
pub struct EvmSpaceClient {
    provider: Provider<Http>,
    wallet: LocalWallet,
    chain_id: u64,
}

impl EvmSpaceClient {
    /// Create a new EVM space client
    pub fn new(config: &EvmConfig, wallet: LocalWallet) -> BridgeResult<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| BridgeError::Config(format!("Invalid EVM RPC URL: {}", e)))?
            .interval(Duration::from_millis(100));
        let wallet = wallet.with_chain_id(config.chain_id);

        debug!(
            "EVM client for chain {} signing as {:?}",
            config.chain_id,
            wallet.address()
        );

        Ok(Self {
            provider,
            wallet,
            chain_id: config.chain_id,
        })
    }

    fn rpc_error(message: impl ToString) -> BridgeError {
        BridgeError::Rpc {
            ledger: LedgerKind::Evm,
            message: message.to_string(),
        }
    }

    /// Build a legacy transaction request
    fn build_tx(&self, call: &PendingCall, limits: Option<&ResourceLimits>) -> TypedTransaction {
        let mut tx = TransactionRequest::new()
            .from(self.wallet.address())
            .data(call.data.clone())
            .value(call.value)
            .nonce(call.nonce)
            .chain_id(self.chain_id);

        if let Some(to) = call.to {
            tx = tx.to(to);
        }
        if let Some(limits) = limits {
            tx = tx.gas(limits.gas).gas_price(limits.gas_price);
        }

        TypedTransaction::Legacy(tx)
    }
}

#[async_trait]
impl ChainClient for EvmSpaceClient {
    fn kind(&self) -> LedgerKind {
        LedgerKind::Evm
    }

    fn sender(&self) -> Address {
        self.wallet.address()
    }

    fn display_address(&self, address: Address) -> String {
        format!("{:#x}", address)
    }

    async fn next_nonce(&self, account: Address) -> BridgeResult<U256> {
        self.provider
            .get_transaction_count(account, Some(BlockNumber::Pending.into()))
            .await
            .map_err(Self::rpc_error)
    }

    async fn fee_price(&self) -> BridgeResult<U256> {
        self.provider.get_gas_price().await.map_err(Self::rpc_error)
    }

    async fn estimate(&self, call: &PendingCall) -> BridgeResult<ResourceEstimate> {
        let tx = self.build_tx(call, None);
        let gas = self
            .provider
            .estimate_gas(&tx, None)
            .await
            .map_err(|e| BridgeError::Estimation {
                ledger: LedgerKind::Evm,
                message: e.to_string(),
            })?;

        Ok(ResourceEstimate { gas, storage: None })
    }

    async fn submit(&self, call: &PendingCall, limits: &ResourceLimits) -> BridgeResult<H256> {
        let tx = self.build_tx(call, Some(limits));

        let signature = self
            .wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| BridgeError::Wallet(e.to_string()))?;
        let raw = tx.rlp_signed(&signature);

        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| BridgeError::Submission {
                ledger: LedgerKind::Evm,
                message: e.to_string(),
            })?;

        Ok(pending.tx_hash())
    }

    async fn outcome(&self, tx_hash: H256) -> BridgeResult<Outcome> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(Self::rpc_error)?
            .and_then(|receipt| {
                // A receipt without status predates byzantium and is not definite
                let status = receipt.status?;
                Some(Receipt {
                    tx_hash: receipt.transaction_hash,
                    success: status == U64::from(1),
                    contract_created: receipt.contract_address,
                    block_marker: receipt.block_number.map(|b| U256::from(b.as_u64())),
                    state_root: None,
                })
            });

        Ok(FinalityModel::for_ledger(LedgerKind::Evm).classify(receipt))
    }

    async fn call(&self, to: Address, data: Bytes) -> BridgeResult<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new()
            .from(self.wallet.address())
            .to(to)
            .data(data)
            .into();

        self.provider.call(&tx, None).await.map_err(Self::rpc_error)
    }

    async fn balance(&self, account: Address) -> BridgeResult<U256> {
        self.provider
            .get_balance(account, None)
            .await
            .map_err(Self::rpc_error)
    }
}
