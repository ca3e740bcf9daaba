//! Storage Layer - SQLite-backed persistence
//!
//! Each declared collection is a table of JSON documents:
//! - `<collection>(key, data)` with `key` the record's primary key value
//! - `idx_<collection>_<field>` expression indexes over `data`
//!
//! The schema version is kept in `PRAGMA user_version`.

pub mod schema;
pub mod upgrade;
pub mod records;
pub mod sqlite;

pub use records::{AccessMode, RecordAccess};
pub use schema::{CollectionSchema, SchemaRegistry, TRASH_COLLECTION, default_registry};
pub use sqlite::{Store, StoreStats};
pub use upgrade::UpgradeReport;
