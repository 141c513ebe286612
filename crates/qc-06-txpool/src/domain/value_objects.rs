//! Value objects for the pending index and the build-lease operations.

use super::batch::Batch;
use super::entities::PendingTx;
use serde::{Deserialize, Serialize};
use shared_types::Hash;
use std::cmp::Ordering;

/// Priority reference to a pending entry.
///
/// Implements `Ord` such that the entry leased first sorts first: higher
/// tip, then higher fee cap, then lower nonce, then lower ID. A batch uses
/// the sums of its members' tips and fee caps and its lowest nonce.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PriorityKey {
    pub gas_tip: u64,
    pub gas_fee_cap: u64,
    pub nonce: u64,
    pub id: Hash,
}

impl Ord for PriorityKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .gas_tip
            .cmp(&self.gas_tip)
            .then_with(|| other.gas_fee_cap.cmp(&self.gas_fee_cap))
            .then_with(|| self.nonce.cmp(&other.nonce))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for PriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A unit of leasable work: one transaction or one whole batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PendingEntry {
    Single(PendingTx),
    Batch(Batch),
}

impl PendingEntry {
    /// Transaction ID for singles, batch ID for batches.
    pub fn id(&self) -> Hash {
        match self {
            Self::Single(tx) => tx.id,
            Self::Batch(batch) => batch.id,
        }
    }

    pub fn batch_id(&self) -> Option<Hash> {
        match self {
            Self::Single(_) => None,
            Self::Batch(batch) => Some(batch.id),
        }
    }

    /// Byte size counted against a build budget.
    pub fn size(&self) -> usize {
        match self {
            Self::Single(tx) => tx.size(),
            Self::Batch(batch) => batch.size(),
        }
    }

    pub fn priority_key(&self) -> PriorityKey {
        match self {
            Self::Single(tx) => PriorityKey {
                gas_tip: tx.tx.gas_tip,
                gas_fee_cap: tx.tx.gas_fee_cap,
                nonce: tx.tx.nonce,
                id: tx.id,
            },
            Self::Batch(batch) => PriorityKey {
                gas_tip: batch.tip_total(),
                gas_fee_cap: batch.fee_cap_total(),
                nonce: batch.min_nonce(),
                id: batch.id,
            },
        }
    }

    /// IDs of every transaction in the entry.
    pub fn tx_ids(&self) -> Vec<Hash> {
        match self {
            Self::Single(tx) => vec![tx.id],
            Self::Batch(batch) => batch.member_ids(),
        }
    }

    pub fn txs(&self) -> &[PendingTx] {
        match self {
            Self::Single(tx) => std::slice::from_ref(tx),
            Self::Batch(batch) => batch.members(),
        }
    }

    pub fn into_txs(self) -> Vec<PendingTx> {
        match self {
            Self::Single(tx) => vec![tx],
            Self::Batch(batch) => batch.into_members(),
        }
    }
}

/// Entries selected by a fetch, not yet committed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchPlan {
    /// Entry IDs in lease order.
    pub entries: Vec<Hash>,
    /// Every transaction ID released by the entries.
    pub tx_ids: Vec<Hash>,
    /// IDs of the batches among the entries.
    pub batches: Vec<Hash>,
    /// Total bytes.
    pub size: usize,
}

impl FetchPlan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Leased work that a status report retires.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetirePlan {
    /// Every transaction ID leaving the leased set, batch mates included.
    pub tx_ids: Vec<Hash>,
    /// Batches retired whole.
    pub batches: Vec<Hash>,
}

/// Leased work that a status report returns to the pending set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequeuePlan {
    pub singles: Vec<Hash>,
    pub batches: Vec<Hash>,
}

impl RequeuePlan {
    pub fn is_empty(&self) -> bool {
        self.singles.is_empty() && self.batches.is_empty()
    }
}

/// What a block acceptance removes from the index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AcceptPlan {
    /// Block transactions the pool was tracking (leased or pending).
    pub tracked: Vec<Hash>,
    /// Batches completed by the block.
    pub batches: Vec<Hash>,
}

/// Result of a successful submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    /// Admitted transaction IDs in submission order.
    pub ids: Vec<Hash>,
    /// Batch ID when more than one transaction was submitted.
    pub batch_id: Option<Hash>,
}

/// Result of a build status report.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStatusOutcome {
    /// Transactions moved to rejected, batch mates included.
    pub rejected: Vec<Hash>,
    /// Transactions returned to the pending set, batch mates included.
    pub requeued: Vec<Hash>,
    /// Reported IDs that were not leased.
    pub ignored: Vec<Hash>,
}

/// Result of a block acceptance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptOutcome {
    pub height: u64,
    pub accepted: Vec<Hash>,
    pub batches: Vec<Hash>,
}
