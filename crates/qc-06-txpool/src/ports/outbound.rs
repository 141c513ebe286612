//! Outbound (Driven) ports for the build-lease pool.
//!
//! These traits define the external systems the pool depends on: the chain
//! collaborator, the durable object store and a clock.

use crate::domain::{Bucket, ChainError, Object, StoreError};
use async_trait::async_trait;
use shared_types::{Account, Address, Hash, Transaction};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Minimum lease left on every object after a successful `acquire` (10 minutes).
pub const ACQUIRE_GRACE_MS: u64 = 10 * 60 * 1000;

/// Chain collaborator.
///
/// Performs semantic validation and supplies genesis transactions and
/// account state. Every call receives the caller's cancellation token.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Transactions included at height 0.
    async fn genesis_txs(&self, cancel: &CancellationToken)
        -> Result<Vec<Transaction>, ChainError>;

    /// Current state of an account, including its keepers and threshold.
    async fn get_account(
        &self,
        cancel: &CancellationToken,
        address: &Address,
    ) -> Result<Account, ChainError>;

    /// Semantic and economic admission check for a submission.
    ///
    /// # Returns
    /// - `Ok(())`: every transaction may be admitted
    /// - `Err(ChainError::Rejected)`: at least one transaction is invalid
    async fn pre_verify_txs(
        &self,
        cancel: &CancellationToken,
        txs: &[Transaction],
    ) -> Result<(), ChainError>;
}

/// Durable, content-addressed, bucket-scoped object store.
///
/// Non-permanent objects expire unless their lease is extended with
/// [`ObjectStore::acquire`]; [`ObjectStore::accept`] makes them permanent.
/// Objects read back from the store report height `-1` while non-permanent
/// and their accepted height once permanent.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Reads an object.
    ///
    /// # Errors
    /// - `NotFound`: no object with this ID
    /// - `Expired`: the object's lease lapsed
    async fn get(
        &self,
        cancel: &CancellationToken,
        bucket: Bucket,
        id: &Hash,
    ) -> Result<Object, StoreError>;

    /// Stores `raw` under its content address and returns the address.
    ///
    /// # Errors
    /// - `Duplicate`: a live object with the same content exists
    async fn put(
        &self,
        cancel: &CancellationToken,
        bucket: Bucket,
        raw: Vec<u8>,
    ) -> Result<Hash, StoreError>;

    /// Deletes a non-permanent object.
    ///
    /// # Errors
    /// - `NotFound`, `Permanent`
    async fn remove(
        &self,
        cancel: &CancellationToken,
        bucket: Bucket,
        id: &Hash,
    ) -> Result<(), StoreError>;

    /// Extends leases so every listed object has at least
    /// [`ACQUIRE_GRACE_MS`] left. All-or-nothing.
    ///
    /// # Errors
    /// - `NotFound`, `Expired`, `Permanent`
    async fn acquire(
        &self,
        cancel: &CancellationToken,
        bucket: Bucket,
        ids: &[Hash],
    ) -> Result<(), StoreError>;

    /// Marks every listed object permanent at `height`. All-or-nothing.
    ///
    /// # Errors
    /// - `NotFound`, `Expired`, `Permanent` (already accepted at another height)
    async fn accept(
        &self,
        cancel: &CancellationToken,
        bucket: Bucket,
        height: u64,
        ids: &[Hash],
    ) -> Result<(), StoreError>;

    /// Lists one page of non-permanent live object IDs.
    ///
    /// Pass an empty token for the first page; an empty returned token means
    /// the listing is complete.
    async fn list_unaccept(
        &self,
        cancel: &CancellationToken,
        bucket: Bucket,
        token: &[u8],
    ) -> Result<(Vec<Hash>, Vec<u8>), StoreError>;
}

/// Time source for consistent timestamp handling.
///
/// Abstracted to allow testing with deterministic time.
pub trait TimeSource: Send + Sync {
    /// Returns the current timestamp in milliseconds.
    fn now(&self) -> Timestamp;

    /// Returns the current time in whole seconds.
    fn now_secs(&self) -> u64 {
        self.now() / 1000
    }
}

/// Default system time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }
}

/// Manually driven clock for deterministic tests.
#[derive(Debug, Default)]
pub struct MockTimeSource {
    time: AtomicU64,
}

impl MockTimeSource {
    pub fn new(initial: Timestamp) -> Self {
        Self {
            time: AtomicU64::new(initial),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.time.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, time: Timestamp) {
        self.time.store(time, Ordering::SeqCst);
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        self.time.load(Ordering::SeqCst)
    }
}
