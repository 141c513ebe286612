//! Best-effort background removal of retired store objects.
//!
//! Removals are queued on a bounded channel and executed by one spawned
//! task. A full queue drops the request; a failed removal is logged and
//! forgotten. Objects that are never removed simply expire in the store.

use crate::domain::Bucket;
use crate::ports::ObjectStore;
use shared_types::{short_hash, Hash};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug)]
struct Removal {
    bucket: Bucket,
    id: Hash,
}

/// Statistics for the janitor
#[derive(Debug, Default)]
pub struct JanitorStats {
    /// Removals accepted onto the queue
    pub scheduled: AtomicU64,
    /// Removals the store confirmed
    pub completed: AtomicU64,
    /// Removals the store refused
    pub failed: AtomicU64,
    /// Removals dropped because the queue was full
    pub dropped: AtomicU64,
}

impl JanitorStats {
    /// Number of queued removals not yet attempted.
    pub fn in_flight(&self) -> u64 {
        self.scheduled.load(Ordering::SeqCst).saturating_sub(
            self.completed.load(Ordering::SeqCst) + self.failed.load(Ordering::SeqCst),
        )
    }
}

/// Handle to the removal worker.
#[derive(Clone)]
pub struct Janitor {
    sender: mpsc::Sender<Removal>,
    stats: Arc<JanitorStats>,
}

impl Janitor {
    /// Spawns the removal worker on the current Tokio runtime.
    ///
    /// The worker stops once every `Janitor` handle has been dropped.
    pub fn spawn(store: Arc<dyn ObjectStore>, queue_depth: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Removal>(queue_depth.max(1));
        let stats = Arc::new(JanitorStats::default());
        let worker_stats = Arc::clone(&stats);

        tokio::spawn(async move {
            let cancel = CancellationToken::new();
            while let Some(removal) = receiver.recv().await {
                match store.remove(&cancel, removal.bucket, &removal.id).await {
                    Ok(()) => {
                        worker_stats.completed.fetch_add(1, Ordering::SeqCst);
                        debug!(
                            bucket = %removal.bucket,
                            id = %short_hash(&removal.id),
                            "Removed retired object"
                        );
                    }
                    Err(e) => {
                        worker_stats.failed.fetch_add(1, Ordering::SeqCst);
                        debug!(
                            bucket = %removal.bucket,
                            id = %short_hash(&removal.id),
                            error = %e,
                            "Best-effort removal failed"
                        );
                    }
                }
            }
        });

        Self { sender, stats }
    }

    /// Queues a removal without waiting.
    pub fn schedule(&self, bucket: Bucket, id: Hash) {
        match self.sender.try_send(Removal { bucket, id }) {
            Ok(()) => {
                self.stats.scheduled.fetch_add(1, Ordering::SeqCst);
            }
            Err(_) => {
                self.stats.dropped.fetch_add(1, Ordering::SeqCst);
                warn!(
                    bucket = %bucket,
                    id = %short_hash(&id),
                    "Removal queue full or closed, dropping request"
                );
            }
        }
    }

    pub fn schedule_all(&self, bucket: Bucket, ids: &[Hash]) {
        for id in ids {
            self.schedule(bucket, *id);
        }
    }

    pub fn stats(&self) -> &JanitorStats {
        &self.stats
    }

    /// Waits until every queued removal has been attempted.
    pub async fn drain(&self) {
        while self.stats.in_flight() > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
    }
}
