//! Schema upgrades
//!
//! The on-disk version lives in `PRAGMA user_version`. An upgrade pass only
//! creates collections and indexes declared in the registry but missing on
//! disk; existing tables, indexes and rows are never touched.

use std::collections::BTreeSet;

use rusqlite::Connection;

use super::schema::{self, SchemaRegistry};
use crate::Result;

/// What a single upgrade pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeReport {
    pub from_version: u32,
    pub to_version: u32,
    pub created_collections: Vec<String>,
    /// (collection, field) pairs
    pub created_indexes: Vec<(String, String)>,
}

impl UpgradeReport {
    pub fn is_noop(&self) -> bool {
        self.created_collections.is_empty() && self.created_indexes.is_empty()
    }
}

impl std::fmt::Display for UpgradeReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Schema upgrade v{} -> v{}:", self.from_version, self.to_version)?;
        writeln!(f, "  Collections created: {}", self.created_collections.len())?;
        write!(f, "  Indexes created: {}", self.created_indexes.len())
    }
}

/// Get current schema version from database
pub fn current_version(conn: &Connection) -> Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version.max(0) as u32)
}

/// Collections (tables) currently present on disk
pub fn existing_collections(conn: &Connection) -> Result<BTreeSet<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<BTreeSet<_>>>()?;
    Ok(names)
}

/// Secondary index fields present on disk for one collection
pub fn existing_indexes(conn: &Connection, collection: &str) -> Result<BTreeSet<String>> {
    let prefix = schema::index_name(collection, "");
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1 AND sql IS NOT NULL",
    )?;
    let fields = stmt
        .query_map([collection], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?
        .into_iter()
        .filter_map(|name| name.strip_prefix(&prefix).map(str::to_string))
        .collect();
    Ok(fields)
}

/// Run one upgrade pass from the on-disk version to `target_version`.
///
/// Runs inside a single transaction so a failed pass leaves the store at its
/// previous version.
pub fn apply_upgrade(
    conn: &mut Connection,
    registry: &SchemaRegistry,
    target_version: u32,
) -> Result<UpgradeReport> {
    let tx = conn.transaction()?;
    let from_version = current_version(&tx)?;
    let tables = existing_collections(&tx)?;
    let mut report = UpgradeReport {
        from_version,
        to_version: target_version,
        ..Default::default()
    };

    for collection in &registry.collections {
        if !tables.contains(&collection.name) {
            tx.execute(&schema::create_table_sql(collection), [])?;
            report.created_collections.push(collection.name.clone());
        }

        let indexes = existing_indexes(&tx, &collection.name)?;
        for field in &collection.indexes {
            if !indexes.contains(field) {
                tx.execute(&schema::create_index_sql(&collection.name, field), [])?;
                report
                    .created_indexes
                    .push((collection.name.clone(), field.clone()));
            }
        }
    }

    tx.pragma_update(None, "user_version", target_version)?;
    tx.commit()?;

    tracing::info!(
        "Upgraded schema v{} -> v{} ({} collections, {} indexes created)",
        report.from_version,
        report.to_version,
        report.created_collections.len(),
        report.created_indexes.len()
    );
    Ok(report)
}
