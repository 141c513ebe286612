//! Core domain entities for the build-lease pool.
//!
//! - [`Object`]: a stored or cached blob plus its lifecycle height
//! - [`ObjectState`]: typed view of the height sentinels
//! - [`Bucket`]: object-store namespaces
//! - [`PendingTx`]: a decoded, validated transaction waiting for a lease

use super::errors::PoolError;
use serde::{Deserialize, Serialize};
use shared_types::{content_hash, Hash, Transaction};
use std::fmt;

/// Height of a rejected object. Its raw bytes are cleared.
pub const HEIGHT_REJECTED: i64 = -2;
/// Height of a submitted object awaiting a lease.
pub const HEIGHT_SUBMITTED: i64 = -1;
/// Height of an object currently leased to the builder.
pub const HEIGHT_PROCESSING: i64 = 0;

/// A content-addressed blob together with its lifecycle height.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    pub raw: Vec<u8>,
    pub height: i64,
}

impl Object {
    pub fn submitted(raw: Vec<u8>) -> Self {
        Self {
            raw,
            height: HEIGHT_SUBMITTED,
        }
    }

    pub fn processing(raw: Vec<u8>) -> Self {
        Self {
            raw,
            height: HEIGHT_PROCESSING,
        }
    }

    /// A rejected marker. Never carries content.
    pub fn rejected() -> Self {
        Self {
            raw: Vec::new(),
            height: HEIGHT_REJECTED,
        }
    }

    pub fn accepted(raw: Vec<u8>, height: u64) -> Self {
        Self {
            raw,
            height: height as i64,
        }
    }

    /// Content address of the raw bytes.
    pub fn id(&self) -> Hash {
        content_hash(&self.raw)
    }

    pub fn state(&self) -> ObjectState {
        ObjectState::from_height(self.height)
    }

    /// Moves the object to `height`. Entering the rejected state clears raw.
    pub fn set_height(&mut self, height: i64) {
        self.height = height;
        if height == HEIGHT_REJECTED {
            self.raw.clear();
        }
    }
}

/// Lifecycle state encoded by an object height.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectState {
    Rejected,
    Submitted,
    Processing,
    Accepted(u64),
}

impl ObjectState {
    pub fn from_height(height: i64) -> Self {
        match height {
            h if h <= HEIGHT_REJECTED => Self::Rejected,
            HEIGHT_SUBMITTED => Self::Submitted,
            HEIGHT_PROCESSING => Self::Processing,
            h => Self::Accepted(h as u64),
        }
    }

    pub fn height(&self) -> i64 {
        match self {
            Self::Rejected => HEIGHT_REJECTED,
            Self::Submitted => HEIGHT_SUBMITTED,
            Self::Processing => HEIGHT_PROCESSING,
            Self::Accepted(h) => *h as i64,
        }
    }
}

/// Object-store namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Bucket {
    /// Transaction objects.
    Txs,
    /// Batch index objects (sorted member IDs).
    TxsBatch,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Txs => "txs",
            Self::TxsBatch => "txs:batch",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded transaction together with its canonical bytes and ID.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingTx {
    pub id: Hash,
    pub raw: Vec<u8>,
    pub tx: Transaction,
}

impl PendingTx {
    /// Decodes `raw`, rejecting non-canonical encodings.
    pub fn from_raw(raw: Vec<u8>) -> Result<Self, PoolError> {
        if raw.is_empty() {
            return Err(PoolError::InvalidTransaction("empty transaction".into()));
        }
        let tx = Transaction::from_bytes(&raw)?;
        Ok(Self {
            id: content_hash(&raw),
            raw,
            tx,
        })
    }

    /// Decodes `raw` and checks it is the object stored under `expected`.
    pub fn from_stored(expected: Hash, raw: Vec<u8>) -> Result<Self, PoolError> {
        let actual = content_hash(&raw);
        if actual != expected {
            return Err(PoolError::HashMismatch { expected, actual });
        }
        Self::from_raw(raw)
    }

    pub fn from_tx(tx: Transaction) -> Result<Self, PoolError> {
        let raw = tx.to_bytes()?;
        Ok(Self {
            id: content_hash(&raw),
            raw,
            tx,
        })
    }

    /// Encoded length in bytes.
    pub fn size(&self) -> usize {
        self.raw.len()
    }

    pub fn is_batched(&self) -> bool {
        self.tx.is_batched()
    }
}
