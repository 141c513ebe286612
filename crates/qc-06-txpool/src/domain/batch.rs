//! Atomic transaction batches.
//!
//! A batch is admitted, leased, accepted or rejected as one unit. Its ID is
//! the content address of its index object: the bincode encoding of the
//! sorted member IDs, stored in the `txs:batch` bucket.

use super::entities::PendingTx;
use super::errors::PoolError;
use shared_types::{content_hash, short_hash, CodecError, Hash};
use std::collections::HashSet;

/// Fewest members a batch may have.
pub const MIN_BATCH_MEMBERS: usize = 2;

/// A validated batch of transactions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    pub id: Hash,
    /// Encoded index object.
    pub raw: Vec<u8>,
    members: Vec<PendingTx>,
}

impl Batch {
    /// Validates membership and derives the batch ID.
    ///
    /// Members are kept in priority order with ties broken by ID, so a batch
    /// rebuilt from the store lists its members exactly as it did on submit.
    pub fn new(mut members: Vec<PendingTx>) -> Result<Self, PoolError> {
        if members.len() < MIN_BATCH_MEMBERS {
            return Err(PoolError::InvalidBatch(format!(
                "batch needs at least {} transactions, got {}",
                MIN_BATCH_MEMBERS,
                members.len()
            )));
        }

        let mut seen = HashSet::with_capacity(members.len());
        for member in &members {
            if !member.is_batched() {
                return Err(PoolError::InvalidBatch(format!(
                    "transaction {} is missing the batched flag",
                    short_hash(&member.id)
                )));
            }
            if !seen.insert(member.id) {
                return Err(PoolError::InvalidBatch(format!(
                    "transaction {} appears twice",
                    short_hash(&member.id)
                )));
            }
        }

        members.sort_by(|a, b| a.tx.priority_cmp(&b.tx).then_with(|| a.id.cmp(&b.id)));
        let ids: Vec<Hash> = members.iter().map(|m| m.id).collect();
        let raw = Self::encode_index(&ids)?;

        Ok(Self {
            id: content_hash(&raw),
            raw,
            members,
        })
    }

    /// Rebuilds a stored batch and checks it is the one indexed under `expected`.
    pub fn from_stored(expected: Hash, members: Vec<PendingTx>) -> Result<Self, PoolError> {
        let batch = Self::new(members)?;
        if batch.id != expected {
            return Err(PoolError::HashMismatch {
                expected,
                actual: batch.id,
            });
        }
        Ok(batch)
    }

    /// Index encoding of a member set (order-insensitive).
    pub fn encode_index(ids: &[Hash]) -> Result<Vec<u8>, PoolError> {
        let mut sorted = ids.to_vec();
        sorted.sort_unstable();
        bincode::serialize(&sorted)
            .map_err(|e| PoolError::Codec(CodecError::Encode(e.to_string())))
    }

    /// Decodes an index object. Only canonical, strictly sorted lists are accepted.
    pub fn decode_index(raw: &[u8]) -> Result<Vec<Hash>, PoolError> {
        let ids: Vec<Hash> = bincode::deserialize(raw)
            .map_err(|e| PoolError::Codec(CodecError::Decode(e.to_string())))?;
        if ids.len() < MIN_BATCH_MEMBERS {
            return Err(PoolError::InvalidBatch(format!(
                "index lists {} members",
                ids.len()
            )));
        }
        if ids.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PoolError::InvalidBatch("index is not strictly sorted".into()));
        }
        if Self::encode_index(&ids)? != raw {
            return Err(PoolError::Codec(CodecError::NonCanonical));
        }
        Ok(ids)
    }

    pub fn members(&self) -> &[PendingTx] {
        &self.members
    }

    pub fn into_members(self) -> Vec<PendingTx> {
        self.members
    }

    pub fn member_ids(&self) -> Vec<Hash> {
        self.members.iter().map(|m| m.id).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Sum of member sizes.
    pub fn size(&self) -> usize {
        self.members.iter().map(PendingTx::size).sum()
    }

    /// Sum of member tips; the batch's priority.
    pub fn tip_total(&self) -> u64 {
        self.members
            .iter()
            .fold(0u64, |acc, m| acc.saturating_add(m.tx.gas_tip))
    }

    pub fn fee_cap_total(&self) -> u64 {
        self.members
            .iter()
            .fold(0u64, |acc, m| acc.saturating_add(m.tx.gas_fee_cap))
    }

    pub fn min_nonce(&self) -> u64 {
        self.members.iter().map(|m| m.tx.nonce).min().unwrap_or(0)
    }
}
