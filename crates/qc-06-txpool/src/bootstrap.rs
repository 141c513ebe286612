//! # Bootstrap and Recovery
//!
//! Rebuilds the pending index from the object store and the chain
//! collaborator before the pool serves any request.
//!
//! ## Steps
//!
//! | Step | Source | Failure |
//! |------|--------|---------|
//! | 1. Genesis | `genesis_txs`, `txs` bucket | fatal |
//! | 2. Keeper snapshot | `get_account(builder)` | fatal |
//! | 3. Batches | `list_unaccept("txs:batch")` + members | fatal, duplicate listing included |
//! | 4. Loose transactions | `list_unaccept("txs")` minus batch members | fatal |
//!
//! The new index is assembled off to the side and swapped in only when every
//! step succeeded. Leases do not survive a restart: anything the builder held
//! is pending again.

use crate::auth::BuilderAuthorization;
use crate::domain::{Bucket, Object, PendingState, PendingTx, PoolError, StoreError};
use crate::ports::ChainClient;
use crate::service::{cancellable, PoolState, TxPool};
use shared_types::{content_hash, short_hash, Hash};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

impl TxPool {
    /// Rebuilds state and marks the pool ready.
    ///
    /// On failure the pool is left not-ready and every RPC keeps failing
    /// with `NotReady`; bootstrap may be retried.
    #[instrument(skip_all)]
    pub async fn bootstrap(&self, cancel: &CancellationToken) -> Result<(), PoolError> {
        let mut state = self.state.write().await;
        self.ready.store(false, Ordering::Release);

        let chain = self.chain().await;
        self.reconcile_genesis(cancel, chain.as_ref()).await?;

        let account = cancellable(cancel, chain.get_account(cancel, &self.builder)).await?;
        let keepers = BuilderAuthorization::from_account(&account)?;

        let mut pending = PendingState::new();
        let claimed = self.restore_batches(cancel, &mut pending).await?;
        let loose = self.restore_loose(cancel, &mut pending, &claimed).await?;

        info!(
            outstanding = pending.len(),
            batches = pending.entry_count().saturating_sub(loose),
            loose,
            keepers = keepers.keys.len(),
            threshold = keepers.threshold,
            "Bootstrap complete"
        );
        *state = PoolState { pending, keepers };
        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Makes sure every genesis transaction is permanent at height 0.
    async fn reconcile_genesis(
        &self,
        cancel: &CancellationToken,
        chain: &dyn ChainClient,
    ) -> Result<(), PoolError> {
        let genesis = cancellable(cancel, chain.genesis_txs(cancel)).await?;
        if genesis.is_empty() {
            return Ok(());
        }

        let mut raws = Vec::with_capacity(genesis.len());
        let mut ids = Vec::with_capacity(genesis.len());
        for tx in &genesis {
            let raw = tx.to_bytes()?;
            let id = content_hash(&raw);
            self.known.insert(id, Object::accepted(raw.clone(), 0));
            raws.push(raw);
            ids.push(id);
        }

        let permanent = match cancellable(cancel, self.store.get(cancel, Bucket::Txs, &ids[0])).await
        {
            Ok(obj) => obj.height >= 0,
            Err(PoolError::Store(StoreError::NotFound { .. } | StoreError::Expired { .. })) => {
                false
            }
            Err(e) => return Err(e),
        };
        if permanent {
            debug!(count = ids.len(), "Genesis already accepted");
            return Ok(());
        }

        for raw in raws {
            match cancellable(cancel, self.store.put(cancel, Bucket::Txs, raw)).await {
                Ok(_) | Err(PoolError::Store(StoreError::Duplicate { .. })) => {}
                Err(e) => return Err(e),
            }
        }
        cancellable(cancel, self.store.accept(cancel, Bucket::Txs, 0, &ids)).await?;
        info!(count = ids.len(), "Accepted genesis transactions");
        Ok(())
    }

    /// Lists every non-permanent ID in a bucket. A repeated ID is fatal.
    async fn list_all(
        &self,
        cancel: &CancellationToken,
        bucket: Bucket,
    ) -> Result<Vec<Hash>, PoolError> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        let mut token = Vec::new();
        loop {
            let (page, next) =
                cancellable(cancel, self.store.list_unaccept(cancel, bucket, &token)).await?;
            for id in page {
                if !seen.insert(id) {
                    return Err(PoolError::DuplicateListing { bucket, id });
                }
                ids.push(id);
            }
            if next.is_empty() {
                break;
            }
            if next == token {
                return Err(StoreError::InvalidPageToken(next.len()).into());
            }
            token = next;
        }
        Ok(ids)
    }

    /// Reinserts stored batches; returns the member IDs they claim.
    async fn restore_batches(
        &self,
        cancel: &CancellationToken,
        pending: &mut PendingState,
    ) -> Result<HashSet<Hash>, PoolError> {
        let mut claimed = HashSet::new();
        for batch_id in self.list_all(cancel, Bucket::TxsBatch).await? {
            let Some(batch) = self.load_batch(cancel, &batch_id).await? else {
                debug!(batch = %short_hash(&batch_id), "Skipping leftover batch index");
                self.janitor.schedule(Bucket::TxsBatch, batch_id);
                continue;
            };
            for member in batch.members() {
                claimed.insert(member.id);
                self.known
                    .insert(member.id, Object::submitted(member.raw.clone()));
            }
            pending.insert_batch(batch)?;
        }
        Ok(claimed)
    }

    /// Reinserts loose transactions; returns how many were restored.
    async fn restore_loose(
        &self,
        cancel: &CancellationToken,
        pending: &mut PendingState,
        claimed: &HashSet<Hash>,
    ) -> Result<usize, PoolError> {
        let mut restored = 0;
        for id in self.list_all(cancel, Bucket::Txs).await? {
            if claimed.contains(&id) {
                continue;
            }
            let obj = cancellable(cancel, self.store.get(cancel, Bucket::Txs, &id)).await?;
            let tx = PendingTx::from_stored(id, obj.raw)?;
            if tx.is_batched() {
                // Member of a batch whose index was never written.
                warn!(id = %short_hash(&id), "Skipping batched transaction without a batch");
                continue;
            }
            self.known.insert(id, Object::submitted(tx.raw.clone()));
            pending.insert_tx(tx)?;
            restored += 1;
        }
        Ok(restored)
    }
}
