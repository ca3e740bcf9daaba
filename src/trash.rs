//! Trash bin - soft delete with a fixed retention window
//!
//! A soft-deleted record leaves its collection and is kept, whole, inside a
//! trash entry until the window passes. Expiry is only evaluated when
//! [`Trash::purge_expired`] runs; nothing is scheduled here.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{self, Record};
use crate::storage::schema::TRASH_KEY;
use crate::storage::{Store, TRASH_COLLECTION};
use crate::{Error, Result};

/// Days a soft-deleted record is kept before it may be purged
pub const RETENTION_DAYS: u32 = 30;

/// Longest retention window a ledger may be configured with
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// A soft-deleted record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrashEntry {
    pub id: String,
    /// Collection the record was removed from
    pub collection: String,
    /// Key of the record inside its original collection
    pub record_id: String,
    pub record: Record,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub deleted_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl TrashEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Soft-delete operations under one retention policy
#[derive(Debug, Clone, Copy)]
pub struct Trash {
    retention: Duration,
}

impl Default for Trash {
    fn default() -> Self {
        Self::new(RETENTION_DAYS)
    }
}

impl Trash {
    pub fn new(retention_days: u32) -> Self {
        Self {
            retention: Duration::days(i64::from(retention_days)),
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Move `record` from `collection` into the trash
    pub fn soft_delete(&self, store: &mut Store, collection: &str, record: &Record) -> Result<TrashEntry> {
        self.soft_delete_at(store, collection, record, Utc::now())
    }

    pub fn soft_delete_at(
        &self,
        store: &mut Store,
        collection: &str,
        record: &Record,
        now: DateTime<Utc>,
    ) -> Result<TrashEntry> {
        if collection == TRASH_COLLECTION {
            return Err(Error::Validation("records in the trash cannot be soft-deleted".into()));
        }
        let key_field = store.registry().get(collection)?.key.clone();
        let record_id = record.key(&key_field).ok_or_else(|| {
            Error::Validation(format!("record has no usable '{}' field", key_field))
        })?;

        let expires_at = now.checked_add_signed(self.retention).ok_or_else(|| {
            Error::Validation(format!(
                "retention of {} days runs past the supported date range",
                self.retention.num_days()
            ))
        })?;

        let entry = TrashEntry {
            id: Record::generate_id(),
            collection: collection.to_string(),
            record_id,
            record: record.clone(),
            deleted_at: now,
            expires_at,
        };

        store.transaction(|records| {
            records.delete(collection, &entry.record_id)?;
            records.put(TRASH_COLLECTION, &Record::from_typed(&entry)?)
        })?;

        tracing::info!(
            "Moved {}/{} to trash (expires {})",
            entry.collection,
            entry.record_id,
            entry.expires_at.to_rfc3339()
        );
        Ok(entry)
    }

    /// Load a record by key and soft-delete it
    pub fn soft_delete_by_id(&self, store: &mut Store, collection: &str, id: &str) -> Result<TrashEntry> {
        let record = store.reader().get(collection, id)?;
        self.soft_delete(store, collection, &record)
    }

    /// Every readable trash entry, oldest first. Rows that are not trash
    /// entries are logged and left out.
    pub fn entries(&self, store: &Store) -> Result<Vec<TrashEntry>> {
        let rows = store.reader().all(TRASH_COLLECTION)?;
        Ok(record::parse_valid(TRASH_COLLECTION, &rows))
    }

    /// Permanently remove entries whose expiry has passed
    pub fn purge_expired(&self, store: &mut Store) -> Result<Vec<TrashEntry>> {
        self.purge_expired_at(store, Utc::now())
    }

    /// Rows are selected on `expires_at` alone, so a row that is not a
    /// readable entry is still removed once it expires. Only readable
    /// entries are returned.
    pub fn purge_expired_at(&self, store: &mut Store, now: DateTime<Utc>) -> Result<Vec<TrashEntry>> {
        let expired_rows = store.reader().query_at_most(
            TRASH_COLLECTION,
            "expires_at",
            &serde_json::Value::from(now.timestamp_millis()),
        )?;
        if expired_rows.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = expired_rows.iter().filter_map(|row| row.key(TRASH_KEY)).collect();
        store.transaction(|records| {
            for key in &keys {
                records.delete(TRASH_COLLECTION, key)?;
            }
            Ok(())
        })?;

        tracing::info!("Purged {} expired trash entries", keys.len());
        Ok(record::parse_valid(TRASH_COLLECTION, &expired_rows))
    }

    /// Put a trashed record back into its original collection.
    ///
    /// Overwrites any record that has since taken the same key.
    pub fn restore(&self, store: &mut Store, entry_id: &str) -> Result<Record> {
        let entry: TrashEntry = store.reader().get(TRASH_COLLECTION, entry_id)?.to_typed()?;

        store.transaction(|records| {
            records.put(&entry.collection, &entry.record)?;
            records.delete(TRASH_COLLECTION, &entry.id)?;
            Ok(())
        })?;

        tracing::info!("Restored {}/{} from trash", entry.collection, entry.record_id);
        Ok(entry.record)
    }

    /// Permanently remove one entry regardless of expiry
    pub fn discard(&self, store: &Store, entry_id: &str) -> Result<bool> {
        store.writer().delete(TRASH_COLLECTION, entry_id)
    }
}
