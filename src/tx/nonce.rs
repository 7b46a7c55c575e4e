//! Nonce allocation for dependent transaction bursts
//!
//! Handles:
//! - One local counter per (ledger, account), seeded from the network once
//! - Serialized allocation so concurrent callers never share a nonce
//! - Waiting for a prior run's nonces to become visible before resuming

use super::retry::pause;
use crate::chain::{ChainClient, LedgerKind};
use crate::error::BridgeResult;

use dashmap::DashMap;
use ethers::types::{Address, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Allocates monotonically increasing nonces per ledger and account
pub struct SequenceAllocator {
    /// Next nonce to hand out, `None` until seeded from the network
    counters: DashMap<(LedgerKind, Address), Arc<Mutex<Option<U256>>>>,
    /// Polling interval for `wait_until_visible`
    poll_interval: Duration,
}

impl SequenceAllocator {
    /// Create a new allocator
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            counters: DashMap::new(),
            poll_interval,
        }
    }

    fn slot(&self, key: (LedgerKind, Address)) -> Arc<Mutex<Option<U256>>> {
        // Clone the slot out so the map shard is not held across an await
        self.counters
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Allocate the next nonce for the client's signing account
    pub async fn next(&self, client: &dyn ChainClient) -> BridgeResult<U256> {
        let kind = client.kind();
        let account = client.sender();
        let slot = self.slot((kind, account));

        let mut counter = slot.lock().await;
        let nonce = match *counter {
            Some(nonce) => nonce,
            None => {
                let seeded = client.next_nonce(account).await?;
                info!("Seeded {} nonce for {:?} at {}", kind, account, seeded);
                seeded
            }
        };
        *counter = Some(nonce + U256::one());

        debug!("Allocated nonce {} on {}", nonce, kind);
        Ok(nonce)
    }

    /// The nonce the next allocation would return, if seeded
    pub async fn peek(&self, kind: LedgerKind, account: Address) -> Option<U256> {
        let slot = self.counters.get(&(kind, account))?.clone();
        let counter = *slot.lock().await;
        counter
    }

    /// Poll the network until `account`'s next nonce reaches `target`
    pub async fn wait_until_visible(
        &self,
        client: &dyn ChainClient,
        account: Address,
        target: U256,
        cancel: &CancellationToken,
    ) -> BridgeResult<U256> {
        loop {
            let visible = client.next_nonce(account).await?;
            if visible >= target {
                return Ok(visible);
            }

            debug!(
                "Waiting for {} nonce {} (network reports {})",
                client.kind(),
                target,
                visible
            );
            pause(self.poll_interval, cancel, "nonce visibility").await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainClient;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn mock_client(kind: LedgerKind, network_nonce: u64) -> (MockChainClient, Arc<AtomicU64>) {
        let queries = Arc::new(AtomicU64::new(0));
        let counted = queries.clone();

        let mut client = MockChainClient::new();
        client.expect_kind().return_const(kind);
        client.expect_sender().return_const(Address::repeat_byte(0x11));
        client.expect_next_nonce().returning(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(U256::from(network_nonce))
        });
        (client, queries)
    }

    #[tokio::test]
    async fn test_sequential_allocation_queries_network_once() {
        let allocator = SequenceAllocator::new(Duration::from_millis(10));
        let (client, queries) = mock_client(LedgerKind::Core, 7);

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(allocator.next(&client).await.unwrap().as_u64());
        }

        assert_eq!(seen, vec![7, 8, 9, 10, 11]);
        assert_eq!(queries.load(Ordering::SeqCst), 1);
        assert_eq!(
            allocator.peek(LedgerKind::Core, Address::repeat_byte(0x11)).await,
            Some(U256::from(12))
        );
    }

    #[tokio::test]
    async fn test_concurrent_callers_get_unique_gapless_nonces() {
        let allocator = Arc::new(SequenceAllocator::new(Duration::from_millis(10)));
        let (client, _) = mock_client(LedgerKind::Evm, 100);
        let client = Arc::new(client);

        let mut handles = Vec::new();
        for _ in 0..64 {
            let allocator = allocator.clone();
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                allocator.next(client.as_ref()).await.unwrap().as_u64()
            }));
        }

        let mut nonces = HashSet::new();
        for handle in handles {
            assert!(nonces.insert(handle.await.unwrap()));
        }
        let expected: HashSet<u64> = (100..164).collect();
        assert_eq!(nonces, expected);
    }

    #[tokio::test]
    async fn test_ledgers_are_counted_independently() {
        let allocator = SequenceAllocator::new(Duration::from_millis(10));
        let (core, _) = mock_client(LedgerKind::Core, 3);
        let (evm, _) = mock_client(LedgerKind::Evm, 40);

        assert_eq!(allocator.next(&core).await.unwrap(), U256::from(3));
        assert_eq!(allocator.next(&evm).await.unwrap(), U256::from(40));
        assert_eq!(allocator.next(&core).await.unwrap(), U256::from(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_visible_polls_until_target() {
        let allocator = SequenceAllocator::new(Duration::from_secs(1));
        let reported = Arc::new(AtomicU64::new(0));
        let source = reported.clone();

        let mut client = MockChainClient::new();
        client.expect_kind().return_const(LedgerKind::Core);
        client.expect_next_nonce().returning(move |_| {
            // network catches up by one per poll
            Ok(U256::from(source.fetch_add(1, Ordering::SeqCst)))
        });

        let cancel = CancellationToken::new();
        let visible = allocator
            .wait_until_visible(&client, Address::zero(), 3.into(), &cancel)
            .await
            .unwrap();
        assert_eq!(visible, U256::from(3));
        assert_eq!(reported.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_wait_until_visible_cancellable() {
        let allocator = SequenceAllocator::new(Duration::from_secs(60));
        let mut client = MockChainClient::new();
        client.expect_kind().return_const(LedgerKind::Core);
        client.expect_next_nonce().returning(|_| Ok(U256::zero()));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = allocator
            .wait_until_visible(&client, Address::zero(), 1.into(), &cancel)
            .await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
