//! # Inbound Port - BuildLeaseApi
//!
//! Primary driving port exposing the build-lease pool.
//!
//! ## Authorization
//!
//! | Method | Caller |
//! |--------|--------|
//! | `size_to_build` | anyone |
//! | `submit_txs` | anyone |
//! | `load_by_ids` | anyone |
//! | `fetch_to_build` | builder (bearer token) |
//! | `update_build_status` | builder (bearer token) |
//! | `accept_by_block` | builder (bearer token) |
//! | `update_builder_keepers` | builder (bearer token) |

use crate::auth::{BuilderAuthorization, Credentials};
use crate::domain::{AcceptOutcome, BuildStatusOutcome, Object, PoolError, SubmitOutcome};
use async_trait::async_trait;
use shared_types::{Block, Hash, Transaction};
use tokio_util::sync::CancellationToken;

/// Primary API of the build-lease pool.
///
/// Every call fails with `NotReady` until bootstrap has succeeded.
///
/// # Example
///
/// ```rust,ignore
/// use qc_06_txpool::ports::BuildLeaseApi;
///
/// async fn build(pool: &impl BuildLeaseApi, cancel: &CancellationToken, creds: &Credentials<'_>) {
///     let txs = pool.fetch_to_build(cancel, creds, 4096).await?;
///     // ... assemble the block, then report it
///     pool.accept_by_block(cancel, creds, &block).await?;
/// }
/// ```
#[async_trait]
pub trait BuildLeaseApi: Send + Sync {
    /// Number of outstanding transactions (batch members counted individually).
    async fn size_to_build(&self, cancel: &CancellationToken) -> Result<usize, PoolError>;

    /// Admits one transaction, or several as an atomic batch.
    ///
    /// # Errors
    /// - Validation: oversize, malformed, batched flag misuse, duplicate member
    /// - Semantic: refused by the chain collaborator
    /// - Storage: including `Duplicate` for an already stored transaction
    async fn submit_txs(
        &self,
        cancel: &CancellationToken,
        txs: Vec<Vec<u8>>,
    ) -> Result<SubmitOutcome, PoolError>;

    /// Objects by transaction ID, cache first.
    async fn load_by_ids(
        &self,
        cancel: &CancellationToken,
        ids: &[Hash],
    ) -> Result<Vec<Object>, PoolError>;

    /// Leases the highest-priority work that fits in `budget` bytes.
    async fn fetch_to_build(
        &self,
        cancel: &CancellationToken,
        creds: &Credentials<'_>,
        budget: usize,
    ) -> Result<Vec<Transaction>, PoolError>;

    /// Reports leased transactions the builder could not place (`unknown`)
    /// or found invalid (`rejected`). Rejection wins for IDs in both lists.
    async fn update_build_status(
        &self,
        cancel: &CancellationToken,
        creds: &Credentials<'_>,
        unknown: &[Hash],
        rejected: &[Hash],
    ) -> Result<BuildStatusOutcome, PoolError>;

    /// Marks the transactions of an accepted block permanent.
    async fn accept_by_block(
        &self,
        cancel: &CancellationToken,
        creds: &Credentials<'_>,
        block: &Block,
    ) -> Result<AcceptOutcome, PoolError>;

    /// Reloads the builder account's keepers and threshold.
    async fn update_builder_keepers(
        &self,
        cancel: &CancellationToken,
        creds: &Credentials<'_>,
    ) -> Result<BuilderAuthorization, PoolError>;
}
