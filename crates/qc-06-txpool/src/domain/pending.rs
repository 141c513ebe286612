//! # Pending State - Priority Index and Lease Tracking
//!
//! In-memory index of the work the builder can lease, plus a record of what
//! it currently holds.
//!
//! ## Data Structures
//!
//! - `ids`: outstanding transaction IDs, batch members expanded
//! - `entries` / `by_priority`: leasable units (singles or whole batches) in lease order
//! - `batches`: pending batch ID -> member IDs
//! - `leased` / `leased_batches`: what the builder holds, so reports cascade to whole batches
//!
//! ## Invariants Enforced
//!
//! - A transaction ID is either pending or leased, never both
//! - Every member of a pending batch is in `ids`
//! - No two batches share a member
//! - Planning never mutates; `commit_*`, `retire`, `release` and `apply_accept`
//!   only run after the external calls of the operation succeeded

use super::batch::Batch;
use super::entities::PendingTx;
use super::errors::PoolError;
use super::value_objects::{
    AcceptPlan, FetchPlan, PendingEntry, PriorityKey, RequeuePlan, RetirePlan,
};
use shared_types::{short_hash, Hash};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Pending and leased work.
#[derive(Debug, Default)]
pub struct PendingState {
    /// Outstanding (not leased) transaction IDs.
    ids: HashSet<Hash>,

    /// Leasable entries indexed by entry ID (tx ID or batch ID).
    entries: HashMap<Hash, PendingEntry>,

    /// Entry keys in lease order.
    by_priority: BTreeSet<PriorityKey>,

    /// Pending batch ID -> member IDs.
    batches: HashMap<Hash, Vec<Hash>>,

    /// Pending batch member -> batch ID.
    member_of: HashMap<Hash, Hash>,

    /// Leased transaction -> batch it was leased with.
    leased: HashMap<Hash, Option<Hash>>,

    /// Leased batch ID -> member IDs.
    leased_batches: HashMap<Hash, Vec<Hash>>,
}

impl PendingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outstanding transactions.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of leasable entries (a batch counts once).
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of transactions held by the builder.
    pub fn leased_count(&self) -> usize {
        self.leased.len()
    }

    /// Checks if a transaction is outstanding.
    pub fn contains(&self, id: &Hash) -> bool {
        self.ids.contains(id)
    }

    pub fn is_leased(&self, id: &Hash) -> bool {
        self.leased.contains_key(id)
    }

    /// Member IDs of a pending batch.
    pub fn batch_members(&self, batch_id: &Hash) -> Option<&[Hash]> {
        self.batches.get(batch_id).map(Vec::as_slice)
    }

    /// Member IDs of a leased batch.
    pub fn leased_batch_members(&self, batch_id: &Hash) -> Option<&[Hash]> {
        self.leased_batches.get(batch_id).map(Vec::as_slice)
    }

    /// Entries in lease order.
    pub fn entries(&self) -> impl Iterator<Item = &PendingEntry> + '_ {
        self.by_priority
            .iter()
            .filter_map(|key| self.entries.get(&key.id))
    }

    fn is_tracked(&self, id: &Hash) -> bool {
        self.ids.contains(id) || self.leased.contains_key(id)
    }

    // =========================================================================
    // ADMISSION
    // =========================================================================

    /// Indexes a single transaction.
    pub fn insert_tx(&mut self, tx: PendingTx) -> Result<(), PoolError> {
        if self.is_tracked(&tx.id) {
            return Err(PoolError::AlreadyPending(tx.id));
        }
        self.ids.insert(tx.id);
        self.insert_entry(PendingEntry::Single(tx));
        Ok(())
    }

    /// Indexes a batch as one entry.
    pub fn insert_batch(&mut self, batch: Batch) -> Result<(), PoolError> {
        if self.batches.contains_key(&batch.id) || self.leased_batches.contains_key(&batch.id) {
            return Err(PoolError::AlreadyPending(batch.id));
        }
        for member in batch.members() {
            if self.is_tracked(&member.id) {
                return Err(PoolError::BatchConflict(format!(
                    "transaction {} of batch {} is already tracked",
                    short_hash(&member.id),
                    short_hash(&batch.id)
                )));
            }
        }

        let members = batch.member_ids();
        for id in &members {
            self.ids.insert(*id);
            self.member_of.insert(*id, batch.id);
        }
        self.batches.insert(batch.id, members);
        self.insert_entry(PendingEntry::Batch(batch));
        Ok(())
    }

    pub fn insert_entry_checked(&mut self, entry: PendingEntry) -> Result<(), PoolError> {
        match entry {
            PendingEntry::Single(tx) => self.insert_tx(tx),
            PendingEntry::Batch(batch) => self.insert_batch(batch),
        }
    }

    /// Fails if a leased entry could not go back to the index once released.
    ///
    /// Leased IDs are not counted as conflicts; only work that is already
    /// outstanding is.
    pub fn check_requeue(&self, entry: &PendingEntry) -> Result<(), PoolError> {
        if let PendingEntry::Batch(batch) = entry {
            if self.batches.contains_key(&batch.id) {
                return Err(PoolError::AlreadyPending(batch.id));
            }
        }
        match entry.tx_ids().into_iter().find(|id| self.ids.contains(id)) {
            Some(id) => Err(PoolError::AlreadyPending(id)),
            None => Ok(()),
        }
    }

    fn insert_entry(&mut self, entry: PendingEntry) {
        self.by_priority.insert(entry.priority_key());
        self.entries.insert(entry.id(), entry);
    }

    fn remove_entry(&mut self, entry_id: &Hash) -> Option<PendingEntry> {
        let entry = self.entries.remove(entry_id)?;
        self.by_priority.remove(&entry.priority_key());
        for id in entry.tx_ids() {
            self.ids.remove(&id);
            self.member_of.remove(&id);
        }
        if let PendingEntry::Batch(batch) = &entry {
            self.batches.remove(&batch.id);
        }
        Some(entry)
    }

    // =========================================================================
    // LEASING
    // =========================================================================

    /// Selects the longest prefix of the lease order that fits in `budget` bytes.
    ///
    /// Stops at the first entry that does not fit; nothing behind it is
    /// considered, so the order of what remains is untouched.
    pub fn plan_fetch(&self, budget: usize) -> FetchPlan {
        let mut plan = FetchPlan::default();
        for entry in self.entries() {
            let size = entry.size();
            match plan.size.checked_add(size) {
                Some(total) if total <= budget => plan.size = total,
                _ => break,
            }
            plan.entries.push(entry.id());
            plan.tx_ids.extend(entry.tx_ids());
            plan.batches.extend(entry.batch_id());
        }
        plan
    }

    /// Moves the planned entries to the leased set.
    pub fn commit_fetch(&mut self, plan: &FetchPlan) -> Vec<PendingEntry> {
        let mut leased = Vec::with_capacity(plan.entries.len());
        for entry_id in &plan.entries {
            let Some(entry) = self.remove_entry(entry_id) else {
                continue;
            };
            let batch_id = entry.batch_id();
            let tx_ids = entry.tx_ids();
            for id in &tx_ids {
                self.leased.insert(*id, batch_id);
            }
            if let Some(batch_id) = batch_id {
                self.leased_batches.insert(batch_id, tx_ids);
            }
            leased.push(entry);
        }
        leased
    }

    // =========================================================================
    // STATUS REPORTS
    // =========================================================================

    /// Plans the rejection of leased transactions. Batch mates are included.
    ///
    /// Returns the plan and the reported IDs that were not leased.
    pub fn plan_reject(&self, ids: &[Hash]) -> (RetirePlan, Vec<Hash>) {
        let mut plan = RetirePlan::default();
        let mut ignored = Vec::new();
        let mut seen = HashSet::new();

        for id in ids {
            match self.leased.get(id) {
                None => ignored.push(*id),
                Some(None) => {
                    if seen.insert(*id) {
                        plan.tx_ids.push(*id);
                    }
                }
                Some(Some(batch_id)) => {
                    if plan.batches.contains(batch_id) {
                        continue;
                    }
                    plan.batches.push(*batch_id);
                    for member in self.leased_batches.get(batch_id).into_iter().flatten() {
                        if seen.insert(*member) {
                            plan.tx_ids.push(*member);
                        }
                    }
                }
            }
        }
        (plan, ignored)
    }

    /// Plans returning leased transactions to the pending set.
    ///
    /// Anything covered by `rejected` is skipped: rejection wins.
    pub fn plan_requeue(&self, ids: &[Hash], rejected: &RetirePlan) -> (RequeuePlan, Vec<Hash>) {
        let mut plan = RequeuePlan::default();
        let mut ignored = Vec::new();

        for id in ids {
            if rejected.tx_ids.contains(id) {
                continue;
            }
            match self.leased.get(id) {
                None => ignored.push(*id),
                Some(None) => {
                    if !plan.singles.contains(id) {
                        plan.singles.push(*id);
                    }
                }
                Some(Some(batch_id)) => {
                    if !plan.batches.contains(batch_id) && !rejected.batches.contains(batch_id) {
                        plan.batches.push(*batch_id);
                    }
                }
            }
        }
        (plan, ignored)
    }

    /// Drops retired transactions from the leased set.
    pub fn retire(&mut self, plan: &RetirePlan) {
        for id in &plan.tx_ids {
            self.leased.remove(id);
        }
        for batch_id in &plan.batches {
            self.leased_batches.remove(batch_id);
        }
    }

    /// Drops requeued work from the leased set. Callers re-insert the
    /// reloaded entries afterwards.
    pub fn release(&mut self, plan: &RequeuePlan) {
        for id in &plan.singles {
            self.leased.remove(id);
        }
        for batch_id in &plan.batches {
            if let Some(members) = self.leased_batches.remove(batch_id) {
                for id in members {
                    self.leased.remove(&id);
                }
            }
        }
    }

    // =========================================================================
    // ACCEPTANCE
    // =========================================================================

    /// Checks a block against the tracked batches.
    ///
    /// A block that includes part of a batch (leased or pending) is invalid.
    pub fn plan_accept(&self, block_ids: &[Hash]) -> Result<AcceptPlan, PoolError> {
        let in_block: HashSet<&Hash> = block_ids.iter().collect();
        let mut plan = AcceptPlan::default();

        for id in block_ids {
            let batch = match self.leased.get(id) {
                Some(&batch) => {
                    plan.tracked.push(*id);
                    batch.map(|b| (b, self.leased_batches.get(&b)))
                }
                None if self.ids.contains(id) => {
                    plan.tracked.push(*id);
                    self.member_of
                        .get(id)
                        .map(|b| (*b, self.batches.get(b)))
                }
                None => None,
            };

            let Some((batch_id, members)) = batch else {
                continue;
            };
            if plan.batches.contains(&batch_id) {
                continue;
            }
            let members = members.map(Vec::as_slice).unwrap_or_default();
            if let Some(missing) = members.iter().find(|m| !in_block.contains(m)) {
                return Err(PoolError::InvalidBlock(format!(
                    "block includes part of batch {} but not transaction {}",
                    short_hash(&batch_id),
                    short_hash(missing)
                )));
            }
            plan.batches.push(batch_id);
        }
        Ok(plan)
    }

    /// Removes accepted transactions (and completed batches) from the index.
    pub fn apply_accept(&mut self, plan: &AcceptPlan) {
        for id in &plan.tracked {
            if self.leased.remove(id).is_some() {
                continue;
            }
            let entry_id = self.member_of.get(id).copied().unwrap_or(*id);
            self.remove_entry(&entry_id);
        }
        for batch_id in &plan.batches {
            self.leased_batches.remove(batch_id);
        }
    }
}
