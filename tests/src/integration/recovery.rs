//! # Bootstrap and Recovery
//!
//! Restarts over a populated store: genesis reconciliation, batch and loose
//! reconstruction, crash leftovers and store corruption.

use super::support::*;
use async_trait::async_trait;
use qc_06_txpool::domain::{
    Batch, Bucket, ErrorClass, Object, PendingTx, PoolConfig, PoolError, StoreError,
};
use qc_06_txpool::{BuildLeaseApi, MemoryObjectStore, ObjectStore, TxPool};
use shared_types::Hash;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How a [`FaultyStore`] corrupts listings.
#[derive(Clone, Copy)]
enum Fault {
    /// Every page after the first repeats the last ID of the previous page.
    ReplayLast,
    /// The continuation token never advances.
    StuckToken,
}

/// Delegates to an in-memory store but corrupts `list_unaccept`.
struct FaultyStore {
    inner: Arc<MemoryObjectStore>,
    fault: Fault,
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn get(
        &self,
        cancel: &CancellationToken,
        bucket: Bucket,
        id: &Hash,
    ) -> Result<Object, StoreError> {
        self.inner.get(cancel, bucket, id).await
    }

    async fn put(
        &self,
        cancel: &CancellationToken,
        bucket: Bucket,
        raw: Vec<u8>,
    ) -> Result<Hash, StoreError> {
        self.inner.put(cancel, bucket, raw).await
    }

    async fn remove(
        &self,
        cancel: &CancellationToken,
        bucket: Bucket,
        id: &Hash,
    ) -> Result<(), StoreError> {
        self.inner.remove(cancel, bucket, id).await
    }

    async fn acquire(
        &self,
        cancel: &CancellationToken,
        bucket: Bucket,
        ids: &[Hash],
    ) -> Result<(), StoreError> {
        self.inner.acquire(cancel, bucket, ids).await
    }

    async fn accept(
        &self,
        cancel: &CancellationToken,
        bucket: Bucket,
        height: u64,
        ids: &[Hash],
    ) -> Result<(), StoreError> {
        self.inner.accept(cancel, bucket, height, ids).await
    }

    async fn list_unaccept(
        &self,
        cancel: &CancellationToken,
        bucket: Bucket,
        token: &[u8],
    ) -> Result<(Vec<Hash>, Vec<u8>), StoreError> {
        let (mut page, next) = self.inner.list_unaccept(cancel, bucket, token).await?;
        match self.fault {
            Fault::ReplayLast => {
                if let Ok(previous) = Hash::try_from(token) {
                    page.insert(0, previous);
                }
                Ok((page, next))
            }
            Fault::StuckToken => {
                let stuck = if token.is_empty() { next } else { token.to_vec() };
                Ok((page, stuck))
            }
        }
    }
}

fn pool_over(store: Arc<dyn ObjectStore>, chain: Arc<ScriptedChain>) -> TxPool {
    TxPool::new(PoolConfig::for_testing(BUILDER), chain, store).unwrap()
}

fn pending(nonce: u64, batched: bool) -> PendingTx {
    PendingTx::from_tx(create_tx(nonce, nonce + 1, batched)).unwrap()
}

// =============================================================================
// RESTART
// =============================================================================

#[tokio::test]
async fn test_restart_restores_outstanding_work() {
    let h = Harness::start().await;
    h.submit(&[create_tx(0, 1, false)]).await.unwrap();
    h.submit(&[create_tx(1, 2, false)]).await.unwrap();
    h.submit(&[create_tx(2, 3, true), create_tx(3, 3, true)])
        .await
        .unwrap();

    // One entry leased, one accepted: only the accepted one stays gone.
    let accepted = create_tx(9, 50, false);
    h.submit(&[accepted.clone()]).await.unwrap();
    let leased = h.fetch(encode(&accepted).len() * 2).await.unwrap();
    assert_eq!(leased[0], accepted);
    h.accept(1, &[id_of(&accepted)]).await.unwrap();
    assert_eq!(h.size().await, 4);

    let restarted = h.restart();
    assert_eq!(
        restarted.pool.size_to_build(&restarted.cancel).await,
        Err(PoolError::NotReady)
    );
    restarted.pool.bootstrap(&restarted.cancel).await.unwrap();
    assert_eq!(restarted.size().await, 4);
    assert_eq!(restarted.pool.leased_count().await, 0);

    // The restored batch still leases as one unit.
    let all = restarted.fetch(1 << 20).await.unwrap();
    assert_eq!(all.len(), 4);
    assert!(all[0].batched && all[1].batched);
}

#[tokio::test]
async fn test_leases_do_not_survive_restart() {
    let h = Harness::start().await;
    let tx = create_tx(0, 1, false);
    h.submit(&[tx.clone()]).await.unwrap();
    h.fetch(1 << 20).await.unwrap();
    assert_eq!(h.size().await, 0);

    let restarted = h.restart();
    restarted.pool.bootstrap(&restarted.cancel).await.unwrap();
    assert_eq!(restarted.size().await, 1);
    assert_eq!(restarted.fetch(1 << 20).await.unwrap(), vec![tx]);
}

#[tokio::test]
async fn test_genesis_reconciled_on_every_start() {
    let key = random_key();
    let genesis = vec![create_tx(100, 1, false), create_tx(101, 1, false)];
    let chain = Arc::new(ScriptedChain::with_keeper(&key).with_genesis(genesis.clone()));
    let store = Arc::new(MemoryObjectStore::new());

    for _ in 0..2 {
        let h = Harness::build(store.clone(), chain.clone(), key.clone());
        h.pool.bootstrap(&h.cancel).await.unwrap();
        assert_eq!(h.size().await, 0);
        let objects = h
            .pool
            .load_by_ids(&h.cancel, &genesis.iter().map(id_of).collect::<Vec<_>>())
            .await
            .unwrap();
        assert!(objects.iter().all(|o| o.height == 0));
    }

    // Resubmitting genesis content hits the permanent object.
    let h = Harness::build(store, chain, key);
    h.pool.bootstrap(&h.cancel).await.unwrap();
    assert_eq!(
        h.submit(&genesis[..1]).await.unwrap_err().class(),
        ErrorClass::Storage
    );
}

// =============================================================================
// PAGINATION
// =============================================================================

#[tokio::test]
async fn test_listing_pages_cover_every_live_object_once() {
    let store = MemoryObjectStore::new().with_page_size(3);
    let cancel = CancellationToken::new();
    let mut expected = HashSet::new();
    for n in 0..10 {
        expected.insert(store.insert_raw(Bucket::Txs, encode(&create_tx(n, 1, false))));
    }
    let permanent = store.insert_raw(Bucket::Txs, encode(&create_tx(99, 1, false)));
    store
        .accept(&cancel, Bucket::Txs, 4, &[permanent])
        .await
        .unwrap();

    let mut seen = Vec::new();
    let mut token = Vec::new();
    loop {
        let (page, next) = store.list_unaccept(&cancel, Bucket::Txs, &token).await.unwrap();
        assert!(page.len() <= 3);
        seen.extend(page);
        if next.is_empty() {
            break;
        }
        token = next;
    }
    assert_eq!(seen.len(), expected.len());
    assert_eq!(seen.into_iter().collect::<HashSet<_>>(), expected);
}

#[tokio::test]
async fn test_bootstrap_walks_every_page() {
    let store = Arc::new(MemoryObjectStore::new().with_page_size(2));
    for n in 0..7 {
        store.insert_raw(Bucket::Txs, encode(&create_tx(n, 1, false)));
    }
    let members = vec![pending(20, true), pending(21, true)];
    for m in &members {
        store.insert_raw(Bucket::Txs, m.raw.clone());
    }
    store.insert_raw(Bucket::TxsBatch, Batch::new(members).unwrap().raw.clone());

    let key = random_key();
    let h = Harness::build(store, Arc::new(ScriptedChain::with_keeper(&key)), key);
    h.pool.bootstrap(&h.cancel).await.unwrap();
    assert_eq!(h.size().await, 9);
}

#[tokio::test]
async fn test_duplicate_listing_is_fatal() {
    let inner = Arc::new(MemoryObjectStore::new().with_page_size(2));
    for n in 0..5 {
        inner.insert_raw(Bucket::Txs, encode(&create_tx(n, 1, false)));
    }
    let key = random_key();
    let pool = pool_over(
        Arc::new(FaultyStore {
            inner,
            fault: Fault::ReplayLast,
        }),
        Arc::new(ScriptedChain::with_keeper(&key)),
    );
    let cancel = CancellationToken::new();

    let err = pool.bootstrap(&cancel).await.unwrap_err();
    assert!(matches!(err, PoolError::DuplicateListing { bucket: Bucket::Txs, .. }));
    assert_eq!(err.class(), ErrorClass::Consistency);
    assert!(!pool.is_ready());
    assert_eq!(
        pool.submit_txs(&cancel, vec![encode(&create_tx(50, 1, false))])
            .await
            .unwrap_err(),
        PoolError::NotReady
    );
}

#[tokio::test]
async fn test_stuck_listing_token_is_fatal() {
    let inner = Arc::new(MemoryObjectStore::new().with_page_size(1));
    inner.insert_raw(Bucket::TxsBatch, vec![1]);
    inner.insert_raw(Bucket::TxsBatch, vec![2]);
    let key = random_key();
    let pool = pool_over(
        Arc::new(FaultyStore {
            inner,
            fault: Fault::StuckToken,
        }),
        Arc::new(ScriptedChain::with_keeper(&key)),
    );
    let err = pool.bootstrap(&CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Storage);
    assert!(!pool.is_ready());
}

// =============================================================================
// CRASH LEFTOVERS AND CORRUPTION
// =============================================================================

#[tokio::test]
async fn test_members_written_without_batch_index_are_skipped() {
    let store = Arc::new(MemoryObjectStore::new());
    // Crash after the member writes, before the batch index write.
    store.insert_raw(Bucket::Txs, pending(1, true).raw);
    store.insert_raw(Bucket::Txs, pending(2, true).raw);
    store.insert_raw(Bucket::Txs, pending(3, false).raw);

    let key = random_key();
    let h = Harness::build(store, Arc::new(ScriptedChain::with_keeper(&key)), key);
    h.pool.bootstrap(&h.cancel).await.unwrap();
    assert_eq!(h.size().await, 1);
}

#[tokio::test]
async fn test_index_of_accepted_batch_is_cleaned_up() {
    let store = Arc::new(MemoryObjectStore::new());
    let cancel = CancellationToken::new();
    let members = vec![pending(1, true), pending(2, true)];
    let ids: Vec<Hash> = members.iter().map(|m| m.id).collect();
    for m in &members {
        store.insert_raw(Bucket::Txs, m.raw.clone());
    }
    let batch_id = store.insert_raw(Bucket::TxsBatch, Batch::new(members).unwrap().raw.clone());
    // Crash after accept, before the janitor removed the index.
    store.accept(&cancel, Bucket::Txs, 12, &ids).await.unwrap();

    let key = random_key();
    let h = Harness::build(store.clone(), Arc::new(ScriptedChain::with_keeper(&key)), key);
    h.pool.bootstrap(&h.cancel).await.unwrap();
    assert_eq!(h.size().await, 0);

    h.pool.janitor().drain().await;
    assert!(!store.contains(Bucket::TxsBatch, &batch_id));
}

#[tokio::test]
async fn test_batch_index_with_missing_member_is_dropped() {
    let store = Arc::new(MemoryObjectStore::new());
    let members = vec![pending(1, true), pending(2, true)];
    store.insert_raw(Bucket::Txs, members[1].raw.clone());
    let batch_id = store.insert_raw(Bucket::TxsBatch, Batch::new(members).unwrap().raw.clone());

    let key = random_key();
    let h = Harness::build(store, Arc::new(ScriptedChain::with_keeper(&key)), key);
    h.pool.bootstrap(&h.cancel).await.unwrap();
    assert!(h.pool.is_ready());
    // The surviving member has no batch to belong to.
    assert_eq!(h.size().await, 0);

    h.pool.janitor().drain().await;
    assert!(!h.store.contains(Bucket::TxsBatch, &batch_id));
}

#[tokio::test]
async fn test_restart_after_rejected_batch_with_saturated_janitor() {
    let key = random_key();
    let chain = Arc::new(ScriptedChain::with_keeper(&key));
    let config = PoolConfig {
        janitor_queue_depth: 2,
        ..PoolConfig::for_testing(BUILDER)
    };
    let h = Harness::build_with_config(Arc::new(MemoryObjectStore::new()), chain, key, config);
    h.pool.bootstrap(&h.cancel).await.unwrap();

    let txs: Vec<_> = (0..3).map(|n| create_tx(n, 2, true)).collect();
    let outcome = h.submit(&txs).await.unwrap();
    let batch_id = outcome.batch_id.unwrap();
    assert_eq!(h.fetch(1 << 20).await.unwrap().len(), 3);

    // Four removals against a queue of two: some members may be dropped,
    // the index never is.
    h.report(&[], &[outcome.ids[1]]).await.unwrap();
    h.pool.janitor().drain().await;
    assert!(!h.store.contains(Bucket::TxsBatch, &batch_id));

    let restarted = h.restart();
    restarted.pool.bootstrap(&restarted.cancel).await.unwrap();
    assert_eq!(restarted.size().await, 0);
}

#[tokio::test]
async fn test_failed_bootstrap_can_be_retried() {
    let key = random_key();
    let chain = Arc::new(ScriptedChain::with_keeper(&key));
    let store = Arc::new(MemoryObjectStore::new());
    store.insert_raw(Bucket::Txs, encode(&create_tx(0, 1, false)));

    chain.set_keepers(vec![], 0);
    let h = Harness::build(store, chain.clone(), key.clone());
    let err = h.pool.bootstrap(&h.cancel).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Unauthorized);
    assert!(!h.pool.is_ready());

    chain.set_keepers(vec![key.verifying_key().to_bytes()], 1);
    h.pool.bootstrap(&h.cancel).await.unwrap();
    assert!(h.pool.is_ready());
    assert_eq!(h.size().await, 1);
}
