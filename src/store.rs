//! Repository interfaces and in-memory implementations.
//!
//! The persistent store and the blob store are external collaborators;
//! this module pins down the interface the tracking core needs from them.
//! Mutations go through closure-based read-modify-write methods executed
//! under the store's write path, so counter increments, set-once
//! timestamps, and `failures` appends cannot lose updates under
//! concurrent webhook or hit handling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::error::TrackError;
use crate::model::{SentRecord, UrlClick};

/// Store for [`SentRecord`]s and their [`UrlClick`] children.
pub trait SentEmailStore: Send + Sync {
    /// Persist a new record, assigning its id. Returns the saved record.
    fn insert(&self, record: SentRecord) -> SentRecord;

    /// Whether a non-deleted record already uses this correlation token.
    fn token_in_use(&self, token: &str) -> bool;

    /// Record with this correlation token.
    fn find_by_token(&self, token: &str) -> Option<SentRecord>;

    /// Record with this provider message id.
    fn find_by_message_id(&self, message_id: &str) -> Option<SentRecord>;

    /// Read-modify-write the record with this correlation token.
    /// Returns the updated record, or `None` on a lookup miss.
    fn update_by_token(
        &self,
        token: &str,
        apply: &mut dyn FnMut(&mut SentRecord),
    ) -> Option<SentRecord>;

    /// Read-modify-write the record with this provider message id.
    /// Returns the updated record, or `None` on a lookup miss.
    fn update_by_message_id(
        &self,
        message_id: &str,
        apply: &mut dyn FnMut(&mut SentRecord),
    ) -> Option<SentRecord>;

    /// Increment the click counter for this exact (token, URL) pair,
    /// creating the row with count 1 if it does not exist.
    fn upsert_url_click(&self, record_id: u64, hash: &str, url: &str) -> UrlClick;

    /// All click rows for a record.
    fn url_clicks(&self, record_id: u64) -> Vec<UrlClick>;

    /// Up to `limit` records created before `cutoff`, oldest first.
    fn find_expired(&self, cutoff: DateTime<Utc>, limit: usize) -> Vec<SentRecord>;

    /// Delete records by id, cascading to their UrlClick children.
    fn delete_records(&self, ids: &[u64]);

    /// Number of stored records.
    fn count(&self) -> usize;
}

impl<S: SentEmailStore + ?Sized> SentEmailStore for Arc<S> {
    fn insert(&self, record: SentRecord) -> SentRecord {
        (**self).insert(record)
    }
    fn token_in_use(&self, token: &str) -> bool {
        (**self).token_in_use(token)
    }
    fn find_by_token(&self, token: &str) -> Option<SentRecord> {
        (**self).find_by_token(token)
    }
    fn find_by_message_id(&self, message_id: &str) -> Option<SentRecord> {
        (**self).find_by_message_id(message_id)
    }
    fn update_by_token(
        &self,
        token: &str,
        apply: &mut dyn FnMut(&mut SentRecord),
    ) -> Option<SentRecord> {
        (**self).update_by_token(token, apply)
    }
    fn update_by_message_id(
        &self,
        message_id: &str,
        apply: &mut dyn FnMut(&mut SentRecord),
    ) -> Option<SentRecord> {
        (**self).update_by_message_id(message_id, apply)
    }
    fn upsert_url_click(&self, record_id: u64, hash: &str, url: &str) -> UrlClick {
        (**self).upsert_url_click(record_id, hash, url)
    }
    fn url_clicks(&self, record_id: u64) -> Vec<UrlClick> {
        (**self).url_clicks(record_id)
    }
    fn find_expired(&self, cutoff: DateTime<Utc>, limit: usize) -> Vec<SentRecord> {
        (**self).find_expired(cutoff, limit)
    }
    fn delete_records(&self, ids: &[u64]) {
        (**self).delete_records(ids)
    }
    fn count(&self) -> usize {
        (**self).count()
    }
}

/// Blob storage for externally stored message bodies. Writes are a single
/// best-effort attempt; callers log and continue on failure.
pub trait ContentStore: Send + Sync {
    /// Write content at a path, overwriting.
    fn put(&self, path: &str, content: &str) -> Result<(), TrackError>;

    /// Read content back, if present.
    fn get(&self, path: &str) -> Option<String>;

    /// Delete a batch of paths. Missing paths are not an error.
    fn delete(&self, paths: &[String]) -> Result<(), TrackError>;
}

impl<S: ContentStore + ?Sized> ContentStore for Arc<S> {
    fn put(&self, path: &str, content: &str) -> Result<(), TrackError> {
        (**self).put(path, content)
    }
    fn get(&self, path: &str) -> Option<String> {
        (**self).get(path)
    }
    fn delete(&self, paths: &[String]) -> Result<(), TrackError> {
        (**self).delete(paths)
    }
}

/// Thread-safe in-memory record store, for development and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<u64, SentRecord>>,
    /// Record ids in insertion order.
    order: RwLock<Vec<u64>>,
    url_clicks: RwLock<Vec<UrlClick>>,
    next_id: RwLock<u64>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store wrapped in an Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// All records, in insertion order.
    pub fn all(&self) -> Vec<SentRecord> {
        let records = self.records.read().unwrap();
        let order = self.order.read().unwrap();
        order.iter().filter_map(|id| records.get(id).cloned()).collect()
    }

    fn update_where(
        &self,
        matches: impl Fn(&SentRecord) -> bool,
        apply: &mut dyn FnMut(&mut SentRecord),
    ) -> Option<SentRecord> {
        let mut records = self.records.write().unwrap();
        let order = self.order.read().unwrap();
        let id = *order.iter().find(|id| {
            records.get(id).map(|r| matches(r)).unwrap_or(false)
        })?;
        let record = records.get_mut(&id)?;
        apply(record);
        Some(record.clone())
    }
}

impl SentEmailStore for MemoryStore {
    fn insert(&self, mut record: SentRecord) -> SentRecord {
        let mut next_id = self.next_id.write().unwrap();
        *next_id += 1;
        record.id = *next_id;

        let mut records = self.records.write().unwrap();
        let mut order = self.order.write().unwrap();
        records.insert(record.id, record.clone());
        order.push(record.id);
        record
    }

    fn token_in_use(&self, token: &str) -> bool {
        let records = self.records.read().unwrap();
        records.values().any(|r| r.hash == token)
    }

    fn find_by_token(&self, token: &str) -> Option<SentRecord> {
        let records = self.records.read().unwrap();
        records.values().find(|r| r.hash == token).cloned()
    }

    fn find_by_message_id(&self, message_id: &str) -> Option<SentRecord> {
        let records = self.records.read().unwrap();
        records
            .values()
            .find(|r| r.message_id.as_deref() == Some(message_id))
            .cloned()
    }

    fn update_by_token(
        &self,
        token: &str,
        apply: &mut dyn FnMut(&mut SentRecord),
    ) -> Option<SentRecord> {
        self.update_where(|r| r.hash == token, apply)
    }

    fn update_by_message_id(
        &self,
        message_id: &str,
        apply: &mut dyn FnMut(&mut SentRecord),
    ) -> Option<SentRecord> {
        self.update_where(|r| r.message_id.as_deref() == Some(message_id), apply)
    }

    fn upsert_url_click(&self, record_id: u64, hash: &str, url: &str) -> UrlClick {
        let mut clicks = self.url_clicks.write().unwrap();
        if let Some(row) = clicks
            .iter_mut()
            .find(|c| c.hash == hash && c.url == url)
        {
            row.clicks += 1;
            return row.clone();
        }
        let row = UrlClick {
            sent_email_id: record_id,
            hash: hash.to_string(),
            url: url.to_string(),
            clicks: 1,
        };
        clicks.push(row.clone());
        row
    }

    fn url_clicks(&self, record_id: u64) -> Vec<UrlClick> {
        let clicks = self.url_clicks.read().unwrap();
        clicks
            .iter()
            .filter(|c| c.sent_email_id == record_id)
            .cloned()
            .collect()
    }

    fn find_expired(&self, cutoff: DateTime<Utc>, limit: usize) -> Vec<SentRecord> {
        let records = self.records.read().unwrap();
        let order = self.order.read().unwrap();
        order
            .iter()
            .filter_map(|id| records.get(id))
            .filter(|r| r.created_at < cutoff)
            .take(limit)
            .cloned()
            .collect()
    }

    fn delete_records(&self, ids: &[u64]) {
        let mut records = self.records.write().unwrap();
        let mut order = self.order.write().unwrap();
        let mut clicks = self.url_clicks.write().unwrap();
        for id in ids {
            records.remove(id);
        }
        order.retain(|id| !ids.contains(id));
        clicks.retain(|c| !ids.contains(&c.sent_email_id));
    }

    fn count(&self) -> usize {
        self.records.read().unwrap().len()
    }
}

/// Thread-safe in-memory blob store, for development and tests.
///
/// Writes can be forced to fail with [`set_fail_writes`](Self::set_fail_writes)
/// to exercise the best-effort content path.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    blobs: RwLock<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryContentStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store wrapped in an Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make subsequent `put` calls fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored blobs.
    pub fn count(&self) -> usize {
        self.blobs.read().unwrap().len()
    }
}

impl ContentStore for MemoryContentStore {
    fn put(&self, path: &str, content: &str) -> Result<(), TrackError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TrackError::Storage("write failed".to_string()));
        }
        let mut blobs = self.blobs.write().unwrap();
        blobs.insert(path.to_string(), content.to_string());
        Ok(())
    }

    fn get(&self, path: &str) -> Option<String> {
        let blobs = self.blobs.read().unwrap();
        blobs.get(path).cloned()
    }

    fn delete(&self, paths: &[String]) -> Result<(), TrackError> {
        let mut blobs = self.blobs.write().unwrap();
        for path in paths {
            blobs.remove(path);
        }
        Ok(())
    }
}
