//! Activity log: short human-readable entries, newest first.

use crate::error::StoreError;
use crate::store::{keys, load_or_default, save, KeyValueStore};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub time: i64,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityPage {
    pub entries: Vec<ActivityEntry>,
    pub total: usize,
    pub page: usize,
    pub pages: usize,
}

pub struct ActivityLog<'a> {
    kv: &'a dyn KeyValueStore,
    /// Entries kept after each append. None = unbounded
    limit: Option<usize>,
}

impl<'a> ActivityLog<'a> {
    pub fn new(kv: &'a dyn KeyValueStore, limit: Option<usize>) -> Self {
        Self { kv, limit: limit.map(|n| n.max(1)) }
    }

    fn entries(&self) -> Result<Vec<ActivityEntry>, StoreError> {
        load_or_default(self.kv, keys::ACTIVITY_LOG)
    }

    pub fn append(&self, message: &str) -> Result<(), StoreError> {
        let mut log = self.entries()?;
        log.insert(0, ActivityEntry { time: chrono::Utc::now().timestamp(), message: message.to_string() });
        if let Some(limit) = self.limit {
            log.truncate(limit);
        }
        tracing::info!(entry = message, "activity");
        save(self.kv, keys::ACTIVITY_LOG, &log)
    }

    /// Up to `limit` newest entries.
    pub fn recent(&self, limit: usize) -> Result<Vec<ActivityEntry>, StoreError> {
        let mut log = self.entries()?;
        log.truncate(limit);
        Ok(log)
    }

    /// One page of the log. Pages are 1-based; out-of-range pages clamp to the last one.
    pub fn page(&self, page: usize, per_page: usize) -> Result<ActivityPage, StoreError> {
        let log = self.entries()?;
        let per_page = per_page.max(1);
        let total = log.len();
        let pages = total.div_ceil(per_page).max(1);
        let page = page.clamp(1, pages);
        let entries = log.into_iter().skip((page - 1) * per_page).take(per_page).collect();
        Ok(ActivityPage { entries, total, page, pages })
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.kv.delete(keys::ACTIVITY_LOG)
    }
}
