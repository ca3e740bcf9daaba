//! # famledger - Personal & Family Finance Ledger
//!
//! A local ledger for income, expenses, loans, debts, accounts, budgets and
//! recurring items, kept in a single embedded SQLite file.
//!
//! famledger provides:
//! - A declarative schema registry of named record collections
//! - Versioned store open/upgrade that only ever adds collections and indexes
//! - Generic record access (get/put/delete/query-by-index) per collection
//! - Pure aggregation helpers (grouping, sums, percentage variance)
//! - A soft-delete trash bin with a fixed retention window
//! - Monthly reports, budget usage and JSON export/import

pub mod record;
pub mod domain;
pub mod storage;
pub mod aggregate;
pub mod trash;
pub mod report;
pub mod export;
pub mod config;
pub mod output;
pub mod ui;

// Re-exports for convenient access
pub use record::Record;
pub use storage::{AccessMode, RecordAccess, SchemaRegistry, Store};
pub use trash::{Trash, TrashEntry};

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for ledger operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to open store at {path}: {reason}")]
    StoreOpen { path: String, reason: String },

    #[error("Record not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("No index on {collection}.{field}")]
    UnknownIndex { collection: String, field: String },

    #[error("Collection {0} was opened read-only")]
    ReadOnly(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn not_found(collection: &str, id: &str) -> Self {
        Error::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    /// True for lookup misses the caller may recover from
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
