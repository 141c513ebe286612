//! # Build-Lease Pool Service
//!
//! `TxPool` owns the pending index and wires it to the chain collaborator,
//! the object store, the known-object cache and the janitor.
//!
//! ## Locking
//!
//! One `tokio::sync::RwLock` guards the pending index and the keeper
//! snapshot. `size_to_build` reads; every other mutating operation writes.
//! `submit_txs` runs chain validation and store writes before taking the
//! lock. `fetch_to_build` holds the write lock across `acquire`, so leases
//! are serialized. The chain client sits in its own lock so `set_chain` never
//! waits on pool work.
//!
//! ## Failure Atomicity
//!
//! Each privileged operation authorizes, plans against the index, performs
//! every external call, and only then mutates. A failure or cancellation in
//! the middle leaves the index untouched.

use crate::adapters::{Janitor, KnownObjects};
use crate::auth::{AuthorizationGate, BuilderAuthorization, Credentials};
use crate::domain::{
    AcceptOutcome, Batch, BuildStatusOutcome, Bucket, Object, PendingEntry, PendingState,
    PendingTx, PoolConfig, PoolError, StoreError, SubmitOutcome, HEIGHT_SUBMITTED,
};
use crate::ports::{BuildLeaseApi, ChainClient, ObjectStore, SystemTimeSource, TimeSource};
use async_trait::async_trait;
use shared_types::{content_hash, short_hash, Address, Block, Hash, Transaction};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Runs `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<T, E, F>(cancel: &CancellationToken, fut: F) -> Result<T, PoolError>
where
    F: Future<Output = Result<T, E>>,
    PoolError: From<E>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PoolError::Cancelled),
        result = fut => result.map_err(PoolError::from),
    }
}

/// State guarded by the pool lock.
#[derive(Debug, Default)]
pub(crate) struct PoolState {
    pub(crate) pending: PendingState,
    pub(crate) keepers: BuilderAuthorization,
}

/// The build-lease transaction pool.
pub struct TxPool {
    config: PoolConfig,
    pub(crate) builder: Address,
    gate: AuthorizationGate,
    pub(crate) state: RwLock<PoolState>,
    pub(crate) ready: AtomicBool,
    chain: RwLock<Arc<dyn ChainClient>>,
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) known: KnownObjects,
    pub(crate) janitor: Janitor,
    time_source: Arc<dyn TimeSource>,
}

impl TxPool {
    /// Creates a pool that is not ready until [`TxPool::bootstrap`] succeeds.
    ///
    /// Must be called from within a Tokio runtime (the janitor is spawned here).
    pub fn new(
        config: PoolConfig,
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self, PoolError> {
        Self::with_time_source(config, chain, store, Arc::new(SystemTimeSource))
    }

    pub fn with_time_source(
        config: PoolConfig,
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn ObjectStore>,
        time_source: Arc<dyn TimeSource>,
    ) -> Result<Self, PoolError> {
        config.validate()?;
        let builder = config.builder_address()?;
        let gate = AuthorizationGate::new(&config)?;
        let known = KnownObjects::new(config.known_objects_capacity, config.known_objects_ttl());
        let janitor = Janitor::spawn(Arc::clone(&store), config.janitor_queue_depth);

        Ok(Self {
            config,
            builder,
            gate,
            state: RwLock::new(PoolState::default()),
            ready: AtomicBool::new(false),
            chain: RwLock::new(chain),
            store,
            known,
            janitor,
            time_source,
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// True once bootstrap has succeeded.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn known_objects(&self) -> &KnownObjects {
        &self.known
    }

    pub fn janitor(&self) -> &Janitor {
        &self.janitor
    }

    /// Replaces the chain client. In-flight calls keep the client they started with.
    pub async fn set_chain(&self, chain: Arc<dyn ChainClient>) {
        *self.chain.write().await = chain;
        info!("Chain client replaced");
    }

    pub(crate) async fn chain(&self) -> Arc<dyn ChainClient> {
        Arc::clone(&*self.chain.read().await)
    }

    /// Current keeper snapshot.
    pub async fn builder_authorization(&self) -> BuilderAuthorization {
        self.state.read().await.keepers.clone()
    }

    /// Number of transactions held by the builder.
    pub async fn leased_count(&self) -> usize {
        self.state.read().await.pending.leased_count()
    }

    fn ensure_ready(&self) -> Result<(), PoolError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(PoolError::NotReady)
        }
    }

    fn authorize(
        &self,
        creds: &Credentials<'_>,
        keepers: &BuilderAuthorization,
    ) -> Result<(), PoolError> {
        self.gate
            .authorize(creds, keepers, self.time_source.now_secs())
            .map_err(|e| {
                warn!(error = %e, "Rejected builder request");
                PoolError::from(e)
            })
    }

    /// Decodes and structurally validates a submission.
    fn validate_submission(&self, txs: Vec<Vec<u8>>) -> Result<PendingEntry, PoolError> {
        if txs.is_empty() {
            return Err(PoolError::EmptySubmission);
        }
        let mut decoded = Vec::with_capacity(txs.len());
        for raw in txs {
            if raw.len() > self.config.max_tx_size {
                return Err(PoolError::TooLarge {
                    size: raw.len(),
                    max: self.config.max_tx_size,
                });
            }
            decoded.push(PendingTx::from_raw(raw)?);
        }

        if decoded.len() == 1 {
            let tx = decoded.remove(0);
            if tx.is_batched() {
                return Err(PoolError::InvalidTransaction(
                    "batched transaction submitted without its batch".into(),
                ));
            }
            return Ok(PendingEntry::Single(tx));
        }
        Ok(PendingEntry::Batch(Batch::new(decoded)?))
    }

    /// Loads a transaction, cache first.
    pub(crate) async fn load_tx(
        &self,
        cancel: &CancellationToken,
        id: &Hash,
    ) -> Result<PendingTx, PoolError> {
        if let Some(obj) = self.known.get(id) {
            if !obj.raw.is_empty() {
                return PendingTx::from_stored(*id, obj.raw);
            }
        }
        let obj = cancellable(cancel, self.store.get(cancel, Bucket::Txs, id)).await?;
        PendingTx::from_stored(*id, obj.raw)
    }

    /// Rebuilds a batch from its index object and member objects.
    ///
    /// Returns `None` if only the index object is left over: a member is
    /// already permanent (the batch was accepted) or gone (its removal ran
    /// before the index's).
    pub(crate) async fn load_batch(
        &self,
        cancel: &CancellationToken,
        batch_id: &Hash,
    ) -> Result<Option<Batch>, PoolError> {
        let index = cancellable(cancel, self.store.get(cancel, Bucket::TxsBatch, batch_id)).await?;
        let actual = content_hash(&index.raw);
        if actual != *batch_id {
            return Err(PoolError::HashMismatch {
                expected: *batch_id,
                actual,
            });
        }

        let ids = Batch::decode_index(&index.raw)?;
        let mut members = Vec::with_capacity(ids.len());
        for id in &ids {
            let obj = match cancellable(cancel, self.store.get(cancel, Bucket::Txs, id)).await {
                Ok(obj) => obj,
                Err(PoolError::Store(
                    StoreError::NotFound { .. } | StoreError::Expired { .. },
                )) => {
                    debug!(
                        batch = %short_hash(batch_id),
                        member = %short_hash(id),
                        "Batch member is gone"
                    );
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };
            if obj.height > HEIGHT_SUBMITTED {
                return Ok(None);
            }
            members.push(PendingTx::from_stored(*id, obj.raw)?);
        }
        Batch::from_stored(*batch_id, members).map(Some)
    }

    fn cache_submitted(&self, entry: &PendingEntry) {
        for tx in entry.txs() {
            self.known.insert(tx.id, Object::submitted(tx.raw.clone()));
        }
    }
}

#[async_trait]
impl BuildLeaseApi for TxPool {
    async fn size_to_build(&self, _cancel: &CancellationToken) -> Result<usize, PoolError> {
        self.ensure_ready()?;
        Ok(self.state.read().await.pending.len())
    }

    #[instrument(skip(self, cancel, txs), fields(count = txs.len()))]
    async fn submit_txs(
        &self,
        cancel: &CancellationToken,
        txs: Vec<Vec<u8>>,
    ) -> Result<SubmitOutcome, PoolError> {
        self.ensure_ready()?;
        let entry = self.validate_submission(txs)?;
        let decoded: Vec<Transaction> = entry.txs().iter().map(|t| t.tx.clone()).collect();

        let chain = self.chain().await;
        cancellable(cancel, chain.pre_verify_txs(cancel, &decoded)).await?;

        for tx in entry.txs() {
            let id = cancellable(cancel, self.store.put(cancel, Bucket::Txs, tx.raw.clone())).await?;
            if id != tx.id {
                return Err(PoolError::HashMismatch {
                    expected: tx.id,
                    actual: id,
                });
            }
        }
        if let PendingEntry::Batch(batch) = &entry {
            let id =
                cancellable(cancel, self.store.put(cancel, Bucket::TxsBatch, batch.raw.clone()))
                    .await?;
            if id != batch.id {
                return Err(PoolError::HashMismatch {
                    expected: batch.id,
                    actual: id,
                });
            }
        }

        let outcome = SubmitOutcome {
            ids: entry.tx_ids(),
            batch_id: entry.batch_id(),
        };
        self.cache_submitted(&entry);
        self.state.write().await.pending.insert_entry_checked(entry)?;

        info!(
            txs = outcome.ids.len(),
            batch = ?outcome.batch_id.as_ref().map(short_hash),
            "Admitted transactions"
        );
        Ok(outcome)
    }

    async fn load_by_ids(
        &self,
        cancel: &CancellationToken,
        ids: &[Hash],
    ) -> Result<Vec<Object>, PoolError> {
        self.ensure_ready()?;
        let mut objects = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(obj) = self.known.get(id) {
                objects.push(obj);
                continue;
            }
            let obj = cancellable(cancel, self.store.get(cancel, Bucket::Txs, id)).await?;
            self.known.insert(*id, obj.clone());
            objects.push(obj);
        }
        Ok(objects)
    }

    #[instrument(skip(self, cancel, creds))]
    async fn fetch_to_build(
        &self,
        cancel: &CancellationToken,
        creds: &Credentials<'_>,
        budget: usize,
    ) -> Result<Vec<Transaction>, PoolError> {
        self.ensure_ready()?;
        let mut state = self.state.write().await;
        self.authorize(creds, &state.keepers)?;

        let plan = state.pending.plan_fetch(budget);
        if plan.is_empty() {
            debug!(pending = state.pending.len(), "Nothing fits the build budget");
            return Ok(Vec::new());
        }

        cancellable(cancel, self.store.acquire(cancel, Bucket::Txs, &plan.tx_ids)).await?;
        if !plan.batches.is_empty() {
            // A requeue reads the index back, so it must outlive the lease too.
            cancellable(
                cancel,
                self.store.acquire(cancel, Bucket::TxsBatch, &plan.batches),
            )
            .await?;
        }

        let leased = state.pending.commit_fetch(&plan);
        let mut txs = Vec::with_capacity(plan.tx_ids.len());
        for entry in leased {
            for tx in entry.into_txs() {
                self.known.insert(tx.id, Object::processing(tx.raw));
                txs.push(tx.tx);
            }
        }

        info!(
            entries = plan.entries.len(),
            txs = txs.len(),
            bytes = plan.size,
            remaining = state.pending.len(),
            "Leased transactions to builder"
        );
        Ok(txs)
    }

    #[instrument(skip(self, cancel, creds, unknown, rejected), fields(unknown = unknown.len(), rejected = rejected.len()))]
    async fn update_build_status(
        &self,
        cancel: &CancellationToken,
        creds: &Credentials<'_>,
        unknown: &[Hash],
        rejected: &[Hash],
    ) -> Result<BuildStatusOutcome, PoolError> {
        self.ensure_ready()?;
        let mut state = self.state.write().await;
        self.authorize(creds, &state.keepers)?;

        let (retire, mut ignored) = state.pending.plan_reject(rejected);
        let (requeue, ignored_unknown) = state.pending.plan_requeue(unknown, &retire);
        ignored.extend(ignored_unknown);
        if !ignored.is_empty() {
            debug!(count = ignored.len(), "Ignoring status for transactions that are not leased");
        }

        // Every load happens before the index changes.
        let mut restored = Vec::with_capacity(requeue.singles.len() + requeue.batches.len());
        let mut stale_batches = Vec::new();
        for id in &requeue.singles {
            restored.push(PendingEntry::Single(self.load_tx(cancel, id).await?));
        }
        for batch_id in &requeue.batches {
            match self.load_batch(cancel, batch_id).await? {
                Some(batch) => restored.push(PendingEntry::Batch(batch)),
                None => stale_batches.push(*batch_id),
            }
        }

        for entry in &restored {
            state.pending.check_requeue(entry)?;
        }

        state.pending.retire(&retire);
        state.pending.release(&requeue);

        let mut requeued = Vec::new();
        for entry in restored {
            let ids = entry.tx_ids();
            self.cache_submitted(&entry);
            match state.pending.insert_entry_checked(entry) {
                Ok(()) => requeued.extend(ids),
                Err(e) => {
                    error!(error = %e, "Failed to requeue leased work");
                    for id in &ids {
                        self.known.remove(id);
                    }
                }
            }
        }

        for id in &retire.tx_ids {
            self.known.mark_rejected(*id);
        }
        // Indexes go first so members are never left behind a listed batch.
        self.janitor.schedule_all(Bucket::TxsBatch, &retire.batches);
        self.janitor.schedule_all(Bucket::Txs, &retire.tx_ids);
        if !stale_batches.is_empty() {
            warn!(count = stale_batches.len(), "Dropping leased batches that can no longer be rebuilt");
            self.janitor.schedule_all(Bucket::TxsBatch, &stale_batches);
        }

        info!(
            rejected = retire.tx_ids.len(),
            requeued = requeued.len(),
            "Applied build status"
        );
        Ok(BuildStatusOutcome {
            rejected: retire.tx_ids,
            requeued,
            ignored,
        })
    }

    #[instrument(skip(self, cancel, creds, block), fields(height = block.height, txs = block.txs.len()))]
    async fn accept_by_block(
        &self,
        cancel: &CancellationToken,
        creds: &Credentials<'_>,
        block: &Block,
    ) -> Result<AcceptOutcome, PoolError> {
        self.ensure_ready()?;
        let mut state = self.state.write().await;
        self.authorize(creds, &state.keepers)?;

        if block.builder != self.builder {
            return Err(PoolError::BuilderMismatch {
                expected: self.builder,
                actual: block.builder,
            });
        }
        if block.height == 0 {
            return Err(PoolError::InvalidBlock(
                "accepted blocks must have height > 0".into(),
            ));
        }
        let mut seen = HashSet::with_capacity(block.txs.len());
        if let Some(dup) = block.txs.iter().find(|id| !seen.insert(**id)) {
            return Err(PoolError::InvalidBlock(format!(
                "transaction {} listed twice",
                short_hash(dup)
            )));
        }

        let plan = state.pending.plan_accept(&block.txs)?;
        if !block.txs.is_empty() {
            cancellable(
                cancel,
                self.store.accept(cancel, Bucket::Txs, block.height, &block.txs),
            )
            .await?;
        }
        state.pending.apply_accept(&plan);

        for id in &block.txs {
            self.known.set_height(id, block.height as i64);
        }
        self.janitor.schedule_all(Bucket::TxsBatch, &plan.batches);

        info!(
            tracked = plan.tracked.len(),
            batches = plan.batches.len(),
            leased = state.pending.leased_count(),
            "Accepted block"
        );
        Ok(AcceptOutcome {
            height: block.height,
            accepted: block.txs.clone(),
            batches: plan.batches,
        })
    }

    #[instrument(skip(self, cancel, creds))]
    async fn update_builder_keepers(
        &self,
        cancel: &CancellationToken,
        creds: &Credentials<'_>,
    ) -> Result<BuilderAuthorization, PoolError> {
        self.ensure_ready()?;
        let mut state = self.state.write().await;
        self.authorize(creds, &state.keepers)?;

        let chain = self.chain().await;
        let account = cancellable(cancel, chain.get_account(cancel, &self.builder)).await?;
        let keepers = BuilderAuthorization::from_account(&account)?;

        info!(
            keys = keepers.keys.len(),
            threshold = keepers.threshold,
            "Refreshed builder keepers"
        );
        state.keepers = keepers.clone();
        Ok(keepers)
    }
}
