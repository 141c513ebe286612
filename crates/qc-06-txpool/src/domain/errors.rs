//! Pool error types.
//!
//! Every failure is classified into one of the [`ErrorClass`] families so the
//! transport layer can map it without inspecting individual variants.

use super::entities::Bucket;
use shared_types::{address_to_string, short_hash, Address, CodecError, Hash};
use thiserror::Error;

/// Error taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed transaction/batch/block or oversize payload.
    Validation,
    /// The chain collaborator refused the transactions.
    Semantic,
    /// Object store failure.
    Storage,
    /// Missing or invalid capability.
    Unauthorized,
    /// Content-hash mismatch or duplicate listing.
    Consistency,
    /// The caller's context was cancelled.
    Cancelled,
    /// The pool has not finished bootstrapping.
    NotReady,
}

/// Object store errors.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No object with this digest in the bucket.
    #[error("object {} not found in {bucket}", short_hash(.id))]
    NotFound { bucket: Bucket, id: Hash },

    /// A live object with the same content already exists.
    #[error("object {} already exists in {bucket}", short_hash(.id))]
    Duplicate { bucket: Bucket, id: Hash },

    /// The object's lease lapsed; it has been evicted.
    #[error("object {} in {bucket} has expired", short_hash(.id))]
    Expired { bucket: Bucket, id: Hash },

    /// The operation is not allowed on a permanent object.
    #[error("object {} in {bucket} is permanent", short_hash(.id))]
    Permanent { bucket: Bucket, id: Hash },

    /// Objects must carry content.
    #[error("empty object rejected by {0}")]
    EmptyObject(Bucket),

    /// Pagination token could not be interpreted.
    #[error("invalid pagination token ({0} bytes)")]
    InvalidPageToken(usize),

    /// The caller cancelled the request.
    #[error("store request cancelled")]
    Cancelled,

    /// Backend-specific failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Chain collaborator errors.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ChainError {
    /// Semantic or economic admission check failed.
    #[error("transactions rejected by chain: {0}")]
    Rejected(String),

    /// Account lookup found nothing.
    #[error("account {} not found", address_to_string(.0))]
    AccountNotFound(Address),

    /// The chain client could not be reached.
    #[error("chain unavailable: {0}")]
    Unavailable(String),

    /// The caller cancelled the request.
    #[error("chain request cancelled")]
    Cancelled,
}

/// Authorization failures. Never partially authenticated.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("audience mismatch: expected {expected}, got {actual}")]
    AudienceMismatch { expected: String, actual: String },

    #[error("subject mismatch: expected {expected}, got {actual}")]
    SubjectMismatch { expected: String, actual: String },

    #[error("token id does not match request payload")]
    TokenIdMismatch,

    #[error("token key is not a valid ed25519 key")]
    InvalidKey,

    #[error("token signature verification failed")]
    InvalidSignature,

    #[error("token expired at {expiration} (now {now})")]
    Expired { expiration: u64, now: u64 },

    #[error("token not valid before {not_before} (now {now})")]
    NotYetValid { not_before: u64, now: u64 },

    #[error("token key does not satisfy keeper threshold {threshold}")]
    ThresholdUnmet { threshold: u16 },

    #[error("builder account has no usable keepers (threshold {threshold}, {keys} keys)")]
    InvalidKeepers { threshold: u16, keys: usize },

    #[error("token encoding failed: {0}")]
    Codec(#[from] CodecError),
}

/// Configuration errors.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid builder address: {0}")]
    InvalidBuilder(String),

    #[error("audience cannot be empty")]
    EmptyAudience,

    #[error("invalid limit: {0}")]
    InvalidLimit(String),

    #[error("config parse error: {0}")]
    Parse(String),
}

/// Top-level pool error.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PoolError {
    // ---------------------------------------------------------------- validation
    #[error("empty submission")]
    EmptySubmission,

    #[error("transaction of {size} bytes exceeds limit of {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("block builder {} is not the configured builder {}", address_to_string(.actual), address_to_string(.expected))]
    BuilderMismatch { expected: Address, actual: Address },

    #[error("transaction {} is already pending", short_hash(.0))]
    AlreadyPending(Hash),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    // ---------------------------------------------------------------- semantic
    #[error(transparent)]
    Chain(#[from] ChainError),

    // ---------------------------------------------------------------- storage
    #[error(transparent)]
    Store(#[from] StoreError),

    // ---------------------------------------------------------------- authorization
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    // ---------------------------------------------------------------- consistency
    #[error("content hash mismatch: expected {}, got {}", short_hash(.expected), short_hash(.actual))]
    HashMismatch { expected: Hash, actual: Hash },

    #[error("duplicate id {} listed in {bucket}", short_hash(.id))]
    DuplicateListing { bucket: Bucket, id: Hash },

    #[error("batch conflict: {0}")]
    BatchConflict(String),

    // ---------------------------------------------------------------- lifecycle
    #[error("request cancelled")]
    Cancelled,

    #[error("pool is not ready (bootstrap incomplete)")]
    NotReady,
}

impl PoolError {
    /// Taxonomy family of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::EmptySubmission
            | Self::TooLarge { .. }
            | Self::InvalidTransaction(_)
            | Self::InvalidBatch(_)
            | Self::InvalidBlock(_)
            | Self::BuilderMismatch { .. }
            | Self::AlreadyPending(_)
            | Self::UnknownMethod(_)
            | Self::Codec(_)
            | Self::Config(_) => ErrorClass::Validation,
            Self::Chain(ChainError::Cancelled)
            | Self::Store(StoreError::Cancelled)
            | Self::Cancelled => ErrorClass::Cancelled,
            Self::Chain(_) => ErrorClass::Semantic,
            Self::Store(_) => ErrorClass::Storage,
            Self::Unauthorized(_) => ErrorClass::Unauthorized,
            Self::HashMismatch { .. } | Self::DuplicateListing { .. } | Self::BatchConflict(_) => {
                ErrorClass::Consistency
            }
            Self::NotReady => ErrorClass::NotReady,
        }
    }

    /// Returns true for unauthorized-class errors.
    pub fn is_unauthorized(&self) -> bool {
        self.class() == ErrorClass::Unauthorized
    }
}
