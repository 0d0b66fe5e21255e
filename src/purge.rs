//! Retention sweep: delete records older than the configured window.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::config::TrackerConfig;
use crate::store::{ContentStore, SentEmailStore};

const BATCH_SIZE: usize = 1000;

/// Deletes expired records in batches, cascading to their click rows and
/// externally stored bodies.
pub struct RecordPurger {
    config: Arc<TrackerConfig>,
    store: Arc<dyn SentEmailStore>,
    content: Arc<dyn ContentStore>,
}

impl RecordPurger {
    pub fn new(
        config: Arc<TrackerConfig>,
        store: Arc<dyn SentEmailStore>,
        content: Arc<dyn ContentStore>,
    ) -> Self {
        Self {
            config,
            store,
            content,
        }
    }

    /// Delete all records older than the retention window and return how
    /// many were deleted.
    ///
    /// `override_days` takes precedence over the configured window; an
    /// effective window of zero (or none at all) disables purging. Blob
    /// deletion is best-effort: a failing content store is logged and the
    /// records are deleted anyway.
    pub fn purge(&self, override_days: Option<u32>) -> usize {
        let days = match override_days.or(self.config.expire_days) {
            Some(days) if days > 0 => days,
            _ => return 0,
        };
        let cutoff = Utc::now() - Duration::days(i64::from(days));

        let mut deleted = 0;
        loop {
            let batch = self.store.find_expired(cutoff, BATCH_SIZE);
            if batch.is_empty() {
                break;
            }

            let paths: Vec<String> = batch
                .iter()
                .filter_map(|record| record.content.file_path())
                .map(|path| path.to_string())
                .collect();
            if !paths.is_empty() {
                if let Err(err) = self.content.delete(&paths) {
                    tracing::warn!(error = %err, count = paths.len(), "Failed to delete stored message content");
                }
            }

            let ids: Vec<u64> = batch.iter().map(|record| record.id).collect();
            self.store.delete_records(&ids);
            deleted += ids.len();

            if batch.len() < BATCH_SIZE {
                break;
            }
        }

        if deleted > 0 {
            tracing::info!(deleted, days, "Purged expired email records");
        }
        deleted
    }
}
