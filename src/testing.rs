//! In-memory ledger for sequencer and driver tests
//!
//! Enforces strict nonce ordering, creates contracts at deterministic
//! addresses, and understands just enough of the bridge, beacon and token
//! calls for workflows to observe their own effects.

use crate::chain::core_address;
use crate::chain::{
    ChainClient, LedgerKind, Outcome, PendingCall, Receipt, ResourceEstimate, ResourceLimits,
};
use crate::context::BridgeContext;
use crate::contracts::abi::selector;
use crate::contracts::{
    ArtifactStore, ContractSet, ContractSetVersion, BEACON_ARTIFACT, FAUCET_ARTIFACT,
    PROXY_ARTIFACT,
};
use crate::deploy::DeploymentRecord;
use crate::error::{BridgeError, BridgeResult};
use crate::tx::{FailurePolicy, ResourcePolicy, RetryPolicy, SequenceAllocator, SubmissionEngine};

use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::types::{Address, Bytes, H256, U256};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const IMPL_CODE: [u8; 2] = [0x60, 0x01];
pub const BEACON_CODE: [u8; 2] = [0xbe, 0xac];
pub const PROXY_CODE: [u8; 2] = [0x9a, 0x0c];
pub const FAUCET_CODE: [u8; 2] = [0xfa, 0x0c];

/// Page size of the fake `getTokens`
pub const TOKEN_PAGE: usize = 2;

const CORE_NETWORK_ID: u64 = 1;

#[derive(Default)]
struct LedgerState {
    next_nonce: u64,
    created: u64,
    creations: usize,
    receipts: HashMap<H256, Receipt>,
    beacon_args: HashMap<Address, Address>,
    proxy_args: HashMap<Address, Address>,
    /// beacon -> implementation
    beacons: HashMap<Address, Address>,
    /// (bridge, native) -> mirror
    mapped: HashMap<(Address, Address), Address>,
    /// bridge -> natives with a mirror, in creation order
    listed: HashMap<Address, Vec<Address>>,
    admins: HashMap<Address, Vec<Address>>,
    owners: HashMap<Address, Address>,
    links: HashMap<Address, Address>,
    /// (token, holder) -> balance
    balances: HashMap<(Address, Address), U256>,
    invocations: Vec<(Address, [u8; 4], U256)>,
    reverting: HashSet<[u8; 4]>,
    /// Selectors whose receipts are held back
    stalling: HashSet<[u8; 4]>,
    held: HashSet<H256>,
}

pub struct FakeLedger {
    kind: LedgerKind,
    sender: Address,
    state: Mutex<LedgerState>,
}

impl FakeLedger {
    pub fn new(kind: LedgerKind, sender: Address) -> Self {
        Self {
            kind,
            sender,
            state: Mutex::new(LedgerState::default()),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut LedgerState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    /// Make every call to `signature` revert
    pub fn revert_on(&self, signature: &str) {
        self.with_state(|s| {
            s.reverting.insert(selector(signature));
        });
    }

    /// Execute calls to `signature` but report them pending until `release`
    pub fn stall_on(&self, signature: &str) {
        self.with_state(|s| {
            s.stalling.insert(selector(signature));
        });
    }

    pub fn release(&self) {
        self.with_state(|s| {
            s.stalling.clear();
            s.held.clear();
        });
    }

    pub fn clear_reverts(&self) {
        self.with_state(|s| s.reverting.clear());
    }

    pub fn creations(&self) -> usize {
        self.with_state(|s| s.creations)
    }

    /// Number of successful and failed invocations of `signature`
    pub fn invocations(&self, signature: &str) -> usize {
        let wanted = selector(signature);
        self.with_state(|s| s.invocations.iter().filter(|(_, sel, _)| *sel == wanted).count())
    }

    /// Call value of every invocation of `signature`, in order
    pub fn invocation_values(&self, signature: &str) -> Vec<U256> {
        let wanted = selector(signature);
        self.with_state(|s| {
            s.invocations
                .iter()
                .filter(|(_, sel, _)| *sel == wanted)
                .map(|(_, _, value)| *value)
                .collect()
        })
    }

    /// Bridge-independent view of every invoked selector, in submission order
    pub fn invocation_order(&self) -> Vec<[u8; 4]> {
        self.with_state(|s| s.invocations.iter().map(|(_, sel, _)| *sel).collect())
    }

    pub fn beacon_constructor_arg(&self, beacon: Address) -> Option<Address> {
        self.with_state(|s| s.beacon_args.get(&beacon).copied())
    }

    pub fn proxy_constructor_arg(&self, proxy: Address) -> Option<Address> {
        self.with_state(|s| s.proxy_args.get(&proxy).copied())
    }

    pub fn beacon_implementation(&self, beacon: Address) -> Option<Address> {
        self.with_state(|s| s.beacons.get(&beacon).copied())
    }

    pub fn mirror_of(&self, bridge: Address, native: Address) -> Option<Address> {
        self.with_state(|s| s.mapped.get(&(bridge, native)).copied())
    }

    pub fn link_of(&self, core_side: Address) -> Option<Address> {
        self.with_state(|s| s.links.get(&core_side).copied())
    }

    pub fn admins_of(&self, contract: Address) -> Vec<Address> {
        self.with_state(|s| s.admins.get(&contract).cloned().unwrap_or_default())
    }

    pub fn owner_of(&self, contract: Address) -> Option<Address> {
        self.with_state(|s| s.owners.get(&contract).copied())
    }

    /// Pretend a mirror of `native` already exists on `bridge`
    pub fn seed_mirror(&self, bridge: Address, native: Address, mirror: Address) {
        self.with_state(|s| {
            s.mapped.insert((bridge, native), mirror);
            s.listed.entry(bridge).or_default().push(native);
        });
    }

    fn next_address(&self, state: &mut LedgerState) -> Address {
        state.created += 1;
        let base = match self.kind {
            LedgerKind::Core => 0x8000_0000u64,
            LedgerKind::Evm => 0x4000_0000u64,
        };
        Address::from_low_u64_be(base + state.created)
    }

    fn execute(&self, state: &mut LedgerState, call: &PendingCall) -> (bool, Option<Address>) {
        let Some(to) = call.to else {
            let created = self.next_address(state);
            state.creations += 1;
            let code = call.data.as_ref();
            if code.starts_with(&BEACON_CODE) && code.len() == 2 + 32 {
                let implementation = Address::from_slice(&code[14..34]);
                state.beacon_args.insert(created, implementation);
                state.beacons.insert(created, implementation);
            } else if code.starts_with(&PROXY_CODE) && code.len() >= 2 + 32 {
                state
                    .proxy_args
                    .insert(created, Address::from_slice(&code[14..34]));
            }
            return (true, Some(created));
        };

        if call.data.len() < 4 {
            return (true, None);
        }
        let mut sel = [0u8; 4];
        sel.copy_from_slice(&call.data[..4]);
        let args = &call.data[4..];
        state.invocations.push((to, sel, call.value));

        if state.reverting.contains(&sel) {
            return (false, None);
        }

        if sel == selector("createMappedToken(address)") {
            let native = arg_address(args, 0);
            let mirror = self.next_address(state);
            state.mapped.insert((to, native), mirror);
            state.listed.entry(to).or_default().push(native);
        } else if sel == selector("crossFromEvm(address,address,uint256)") {
            let native = arg_address(args, 0);
            if !state.mapped.contains_key(&(to, native)) {
                let mirror = self.next_address(state);
                state.mapped.insert((to, native), mirror);
                state.listed.entry(to).or_default().push(native);
            }
        } else if sel == selector("upgradeTo(address)") {
            state.beacons.insert(to, arg_address(args, 0));
        } else if sel == selector("initialize(address)") {
            state.admins.insert(to, vec![self.sender]);
        } else if sel == selector("setEvmSide(address)") {
            state.links.insert(to, arg_address(args, 0));
        } else if sel == selector("grantRole(bytes32,address)") {
            let account = arg_address(args, 1);
            let admins = state.admins.entry(to).or_default();
            if !admins.contains(&account) {
                admins.push(account);
            }
        } else if sel == selector("renounceRole(bytes32,address)") {
            let account = arg_address(args, 1);
            if account == self.sender {
                state.admins.entry(to).or_default().retain(|a| *a != account);
            } else {
                return (false, None);
            }
        } else if sel == selector("transferOwnership(address)") {
            state.owners.insert(to, arg_address(args, 0));
        } else if sel == selector("mint(address,uint256)") {
            let holder = arg_address(args, 0);
            let amount = arg_uint(args, 1);
            *state.balances.entry((to, holder)).or_default() += amount;
        }

        (true, None)
    }
}

fn arg_word(args: &[u8], index: usize) -> &[u8] {
    let start = index * 32;
    args.get(start..start + 32).unwrap_or(&[0u8; 32])
}

fn arg_address(args: &[u8], index: usize) -> Address {
    Address::from_slice(&arg_word(args, index)[12..])
}

fn arg_uint(args: &[u8], index: usize) -> U256 {
    U256::from_big_endian(arg_word(args, index))
}

#[async_trait]
impl ChainClient for FakeLedger {
    fn kind(&self) -> LedgerKind {
        self.kind
    }

    fn sender(&self) -> Address {
        self.sender
    }

    fn display_address(&self, address: Address) -> String {
        match self.kind {
            LedgerKind::Core => core_address::encode(&address, CORE_NETWORK_ID),
            LedgerKind::Evm => format!("{:?}", address),
        }
    }

    async fn next_nonce(&self, _account: Address) -> BridgeResult<U256> {
        Ok(self.with_state(|s| U256::from(s.next_nonce)))
    }

    async fn fee_price(&self) -> BridgeResult<U256> {
        Ok(U256::from(1_000_000_000u64))
    }

    async fn estimate(&self, _call: &PendingCall) -> BridgeResult<ResourceEstimate> {
        Ok(ResourceEstimate {
            gas: U256::from(21_000),
            storage: match self.kind {
                LedgerKind::Core => Some(U256::from(64)),
                LedgerKind::Evm => None,
            },
        })
    }

    async fn submit(&self, call: &PendingCall, _limits: &ResourceLimits) -> BridgeResult<H256> {
        let kind = self.kind;
        self.with_state(|state| {
            if call.nonce != U256::from(state.next_nonce) {
                return Err(BridgeError::Submission {
                    ledger: kind,
                    message: format!(
                        "nonce {} rejected, expected {}",
                        call.nonce, state.next_nonce
                    ),
                });
            }
            state.next_nonce += 1;

            let (success, contract_created) = self.execute(state, call);
            let tx_hash = H256::from_low_u64_be(state.next_nonce);
            let stalled = call
                .data
                .get(..4)
                .and_then(|sel| <[u8; 4]>::try_from(sel).ok())
                .is_some_and(|sel| state.stalling.contains(&sel));
            if stalled {
                state.held.insert(tx_hash);
            }
            state.receipts.insert(
                tx_hash,
                Receipt {
                    tx_hash,
                    success,
                    contract_created,
                    block_marker: Some(U256::from(state.next_nonce)),
                    state_root: match kind {
                        LedgerKind::Core => Some(H256::repeat_byte(0x01)),
                        LedgerKind::Evm => None,
                    },
                },
            );
            Ok(tx_hash)
        })
    }

    async fn outcome(&self, tx_hash: H256) -> BridgeResult<Outcome> {
        Ok(self.with_state(|s| match s.receipts.get(&tx_hash) {
            Some(_) if s.held.contains(&tx_hash) => Outcome::Pending,
            Some(receipt) => Outcome::Final(receipt.clone()),
            None => Outcome::Pending,
        }))
    }

    async fn call(&self, to: Address, data: Bytes) -> BridgeResult<Bytes> {
        if data.len() < 4 {
            return Ok(Bytes::new());
        }
        let sel = &data[..4];
        let args = &data[4..];

        let token = self.with_state(|s| {
            if sel == selector("mappedTokens(address)") {
                let mirror = s.mapped.get(&(to, arg_address(args, 0))).copied();
                Some(Token::Address(mirror.unwrap_or_default()))
            } else if sel == selector("implementation()") {
                Some(Token::Address(s.beacons.get(&to).copied().unwrap_or_default()))
            } else if sel == selector("getTokens(uint256)") {
                let cursor = arg_uint(args, 0).as_usize();
                let listed = s.listed.get(&to).cloned().unwrap_or_default();
                let page = listed
                    .into_iter()
                    .skip(cursor)
                    .take(TOKEN_PAGE)
                    .map(Token::Address)
                    .collect();
                Some(Token::Array(page))
            } else if sel == selector("getRoleMemberCount(bytes32)") {
                let count = s.admins.get(&to).map(|a| a.len()).unwrap_or_default();
                Some(Token::Uint(U256::from(count)))
            } else if sel == selector("getRoleMember(bytes32,uint256)") {
                let index = arg_uint(args, 1).as_usize();
                let member = s.admins.get(&to).and_then(|a| a.get(index)).copied();
                Some(Token::Address(member.unwrap_or_default()))
            } else if sel == selector("evmSide()") {
                Some(Token::Address(s.links.get(&to).copied().unwrap_or_default()))
            } else if sel == selector("cfxSide()") {
                Some(Token::Address(Address::zero()))
            } else if sel == selector("balanceOf(address)") {
                let balance = s.balances.get(&(to, arg_address(args, 0))).copied();
                Some(Token::Uint(balance.unwrap_or_default()))
            } else {
                None
            }
        });

        match token {
            Some(token) => Ok(Bytes::from(abi::encode(&[token]))),
            None => Err(BridgeError::Rpc {
                ledger: self.kind,
                message: format!("execution reverted: unknown selector 0x{}", hex::encode(sel)),
            }),
        }
    }

    async fn balance(&self, _account: Address) -> BridgeResult<U256> {
        Ok(U256::exp10(18))
    }
}

/// Fake artifacts for every contract a workflow deploys
pub fn fake_artifacts() -> ArtifactStore {
    let store = ArtifactStore::new("unused");
    for name in ["ConfluxSide", "EvmSide", "MappedToken"] {
        store.insert(name, Bytes::from(IMPL_CODE.to_vec()));
    }
    store.insert(BEACON_ARTIFACT, Bytes::from(BEACON_CODE.to_vec()));
    store.insert(PROXY_ARTIFACT, Bytes::from(PROXY_CODE.to_vec()));
    store.insert(FAUCET_ARTIFACT, Bytes::from(FAUCET_CODE.to_vec()));
    store
}

/// Retry policy that gives up quickly instead of spinning forever on a bug
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        backoff: Duration::from_millis(1),
        log_every: 1,
        core_poll_interval: Duration::from_millis(1),
        evm_poll_interval: Duration::from_millis(1),
        nonce_poll_interval: Duration::from_millis(1),
        max_attempts: Some(3),
    }
}

pub fn evm_admin() -> Address {
    Address::repeat_byte(0xad)
}

pub fn core_admin() -> Address {
    core_address::user_address(evm_admin())
}

/// Two fake ledgers wired into a context
pub struct FakeHarness {
    pub ctx: Arc<BridgeContext>,
    pub core: Arc<FakeLedger>,
    pub evm: Arc<FakeLedger>,
    pub manifest: Arc<DeploymentRecord>,
    /// Interrupts every wait of this run
    pub cancel: CancellationToken,
    version: ContractSetVersion,
    policies: (FailurePolicy, FailurePolicy),
}

impl FakeHarness {
    pub fn new(version: ContractSetVersion) -> Self {
        Self::with_policies(version, FailurePolicy::FailFast, FailurePolicy::FailFast)
    }

    pub fn with_policies(version: ContractSetVersion, core: FailurePolicy, evm: FailurePolicy) -> Self {
        let core_ledger = Arc::new(FakeLedger::new(LedgerKind::Core, core_admin()));
        let evm_ledger = Arc::new(FakeLedger::new(LedgerKind::Evm, evm_admin()));
        let manifest = Arc::new(DeploymentRecord::in_memory());
        Self::assemble(core_ledger, evm_ledger, manifest, version, (core, evm))
    }

    fn assemble(
        core: Arc<FakeLedger>,
        evm: Arc<FakeLedger>,
        manifest: Arc<DeploymentRecord>,
        version: ContractSetVersion,
        policies: (FailurePolicy, FailurePolicy),
    ) -> Self {
        let engine = SubmissionEngine::new(
            ResourcePolicy::default(),
            fast_retry(),
            policies.0,
            policies.1,
        );
        let nonces = SequenceAllocator::new(engine.retry_policy().nonce_poll_interval);
        let cancel = CancellationToken::new();
        let ctx = BridgeContext::new(
            core.clone(),
            evm.clone(),
            engine,
            nonces,
            manifest.clone(),
            fake_artifacts(),
            ContractSet::for_version(version),
            cancel.clone(),
        );
        Self {
            ctx: Arc::new(ctx),
            core,
            evm,
            manifest,
            cancel,
            version,
            policies,
        }
    }

    /// A later process run: same ledgers and manifest, fresh context
    pub fn rerun(&self) -> Self {
        Self::assemble(
            self.core.clone(),
            self.evm.clone(),
            self.manifest.clone(),
            self.version,
            self.policies,
        )
    }
}
