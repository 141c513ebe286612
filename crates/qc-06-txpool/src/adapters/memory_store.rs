//! In-memory object store.
//!
//! Reference implementation of [`ObjectStore`] for tests and single-process
//! deployments. Each bucket is a `BTreeMap` so listings page in ID order.

use crate::domain::{Bucket, Object, StoreError, HEIGHT_SUBMITTED};
use crate::ports::{ObjectStore, SystemTimeSource, TimeSource, Timestamp, ACQUIRE_GRACE_MS};
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{content_hash, Hash};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Default lifetime of a non-permanent object (1 hour).
pub const DEFAULT_OBJECT_TTL_MS: u64 = 60 * 60 * 1000;
/// Default listing page size.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Clone, Debug)]
struct StoredObject {
    raw: Vec<u8>,
    /// Accepted height, or `None` while non-permanent.
    height: Option<u64>,
    expires_at: Timestamp,
}

impl StoredObject {
    fn is_permanent(&self) -> bool {
        self.height.is_some()
    }

    fn is_live(&self, now: Timestamp) -> bool {
        self.is_permanent() || now < self.expires_at
    }

    fn to_object(&self) -> Object {
        Object {
            raw: self.raw.clone(),
            height: self.height.map_or(HEIGHT_SUBMITTED, |h| h as i64),
        }
    }
}

type BucketMap = BTreeMap<Hash, StoredObject>;

/// Content-addressed in-memory store with lease expiry.
pub struct MemoryObjectStore {
    buckets: RwLock<HashMap<Bucket, BucketMap>>,
    object_ttl_ms: u64,
    page_size: usize,
    time_source: Arc<dyn TimeSource>,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::with_time_source(Arc::new(SystemTimeSource))
    }

    pub fn with_time_source(time_source: Arc<dyn TimeSource>) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            object_ttl_ms: DEFAULT_OBJECT_TTL_MS,
            page_size: DEFAULT_PAGE_SIZE,
            time_source,
        }
    }

    pub fn with_object_ttl(mut self, ttl_ms: u64) -> Self {
        self.object_ttl_ms = ttl_ms;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Number of stored objects in a bucket, expired ones included.
    pub fn object_count(&self, bucket: Bucket) -> usize {
        self.buckets.read().get(&bucket).map_or(0, BTreeMap::len)
    }

    /// Checks if a live object exists.
    pub fn contains(&self, bucket: Bucket, id: &Hash) -> bool {
        let now = self.time_source.now();
        self.buckets
            .read()
            .get(&bucket)
            .and_then(|objects| objects.get(id))
            .is_some_and(|obj| obj.is_live(now))
    }

    /// Writes an object as it would appear after a crash, bypassing checks.
    pub fn insert_raw(&self, bucket: Bucket, raw: Vec<u8>) -> Hash {
        let id = content_hash(&raw);
        let expires_at = self.time_source.now() + self.object_ttl_ms;
        self.buckets.write().entry(bucket).or_default().insert(
            id,
            StoredObject {
                raw,
                height: None,
                expires_at,
            },
        );
        id
    }

    /// Looks up a live object, evicting it if its lease lapsed.
    fn live<'a>(
        objects: &'a mut BucketMap,
        bucket: Bucket,
        id: &Hash,
        now: Timestamp,
    ) -> Result<&'a mut StoredObject, StoreError> {
        let expired = match objects.get(id) {
            None => return Err(StoreError::NotFound { bucket, id: *id }),
            Some(obj) => !obj.is_live(now),
        };
        if expired {
            objects.remove(id);
            return Err(StoreError::Expired { bucket, id: *id });
        }
        objects
            .get_mut(id)
            .ok_or(StoreError::NotFound { bucket, id: *id })
    }

    fn check_cancel(cancel: &CancellationToken) -> Result<(), StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(
        &self,
        cancel: &CancellationToken,
        bucket: Bucket,
        id: &Hash,
    ) -> Result<Object, StoreError> {
        Self::check_cancel(cancel)?;
        let now = self.time_source.now();
        let mut buckets = self.buckets.write();
        let objects = buckets.entry(bucket).or_default();
        Self::live(objects, bucket, id, now).map(|obj| obj.to_object())
    }

    async fn put(
        &self,
        cancel: &CancellationToken,
        bucket: Bucket,
        raw: Vec<u8>,
    ) -> Result<Hash, StoreError> {
        Self::check_cancel(cancel)?;
        if raw.is_empty() {
            return Err(StoreError::EmptyObject(bucket));
        }
        let id = content_hash(&raw);
        let now = self.time_source.now();
        let mut buckets = self.buckets.write();
        let objects = buckets.entry(bucket).or_default();

        if objects.get(&id).is_some_and(|obj| obj.is_live(now)) {
            return Err(StoreError::Duplicate { bucket, id });
        }
        objects.insert(
            id,
            StoredObject {
                raw,
                height: None,
                expires_at: now + self.object_ttl_ms,
            },
        );
        Ok(id)
    }

    async fn remove(
        &self,
        cancel: &CancellationToken,
        bucket: Bucket,
        id: &Hash,
    ) -> Result<(), StoreError> {
        Self::check_cancel(cancel)?;
        let mut buckets = self.buckets.write();
        let objects = buckets.entry(bucket).or_default();
        match objects.get(id) {
            None => Err(StoreError::NotFound { bucket, id: *id }),
            Some(obj) if obj.is_permanent() => Err(StoreError::Permanent { bucket, id: *id }),
            Some(_) => {
                objects.remove(id);
                Ok(())
            }
        }
    }

    async fn acquire(
        &self,
        cancel: &CancellationToken,
        bucket: Bucket,
        ids: &[Hash],
    ) -> Result<(), StoreError> {
        Self::check_cancel(cancel)?;
        let now = self.time_source.now();
        let mut buckets = self.buckets.write();
        let objects = buckets.entry(bucket).or_default();

        // Validate everything before touching any lease.
        for id in ids {
            let obj = Self::live(objects, bucket, id, now)?;
            if obj.is_permanent() {
                return Err(StoreError::Permanent { bucket, id: *id });
            }
        }

        let min_expiry = now + ACQUIRE_GRACE_MS;
        for id in ids {
            if let Some(obj) = objects.get_mut(id) {
                obj.expires_at = obj.expires_at.max(min_expiry);
            }
        }
        Ok(())
    }

    async fn accept(
        &self,
        cancel: &CancellationToken,
        bucket: Bucket,
        height: u64,
        ids: &[Hash],
    ) -> Result<(), StoreError> {
        Self::check_cancel(cancel)?;
        let now = self.time_source.now();
        let mut buckets = self.buckets.write();
        let objects = buckets.entry(bucket).or_default();

        for id in ids {
            let obj = Self::live(objects, bucket, id, now)?;
            if obj.height.is_some_and(|h| h != height) {
                return Err(StoreError::Permanent { bucket, id: *id });
            }
        }

        for id in ids {
            if let Some(obj) = objects.get_mut(id) {
                obj.height = Some(height);
            }
        }
        Ok(())
    }

    async fn list_unaccept(
        &self,
        cancel: &CancellationToken,
        bucket: Bucket,
        token: &[u8],
    ) -> Result<(Vec<Hash>, Vec<u8>), StoreError> {
        Self::check_cancel(cancel)?;
        let start = if token.is_empty() {
            Bound::Unbounded
        } else {
            let after =
                Hash::try_from(token).map_err(|_| StoreError::InvalidPageToken(token.len()))?;
            Bound::Excluded(after)
        };

        let now = self.time_source.now();
        let buckets = self.buckets.read();
        let Some(objects) = buckets.get(&bucket) else {
            return Ok((Vec::new(), Vec::new()));
        };

        let page: Vec<Hash> = objects
            .range((start, Bound::Unbounded))
            .filter(|(_, obj)| !obj.is_permanent() && obj.is_live(now))
            .map(|(id, _)| *id)
            .take(self.page_size)
            .collect();

        let next = match page.last() {
            Some(last) if page.len() == self.page_size => last.to_vec(),
            _ => Vec::new(),
        };
        Ok((page, next))
    }
}
