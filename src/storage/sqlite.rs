//! SQLite store - the session handle for one ledger file

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;

use super::records::{AccessMode, RecordAccess};
use super::schema::SchemaRegistry;
use super::upgrade::{self, UpgradeReport};
use crate::{Error, Result};

const IN_MEMORY: &str = ":memory:";

/// An open ledger store.
///
/// Owns the only connection of a session; all record access borrows it.
pub struct Store {
    conn: Connection,
    registry: SchemaRegistry,
    path: Option<PathBuf>,
    version: u32,
    last_upgrade: Option<UpgradeReport>,
}

impl Store {
    /// Open a store file at the registry's declared version
    pub fn open(path: &Path, registry: SchemaRegistry) -> Result<Self> {
        let version = registry.version;
        Self::open_or_upgrade(path, registry, version)
    }

    /// Open a store file (creates if doesn't exist) and upgrade it to
    /// `target_version` when the file is older.
    ///
    /// Any refusal by the engine is reported as [`Error::StoreOpen`].
    pub fn open_or_upgrade(path: &Path, registry: SchemaRegistry, target_version: u32) -> Result<Self> {
        let label = path.display().to_string();
        let conn = Connection::open(path).map_err(|e| store_open(&label, e))?;
        Self::initialize(conn, registry, target_version, Some(path.to_path_buf()), &label)
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory(registry: SchemaRegistry) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| store_open(IN_MEMORY, e))?;
        let version = registry.version;
        Self::initialize(conn, registry, version, None, IN_MEMORY)
    }

    fn initialize(
        mut conn: Connection,
        registry: SchemaRegistry,
        target_version: u32,
        path: Option<PathBuf>,
        label: &str,
    ) -> Result<Self> {
        registry.validate()?;
        if target_version == 0 {
            return Err(store_open(label, "target version must be at least 1"));
        }

        // Surface contention immediately instead of waiting on locks
        conn.busy_timeout(Duration::ZERO)
            .map_err(|e| store_open(label, e))?;

        let on_disk = upgrade::current_version(&conn).map_err(|e| store_open(label, e))?;
        if on_disk > target_version {
            tracing::warn!(
                "Refusing to open {} at v{}: store is already at v{}",
                label,
                target_version,
                on_disk
            );
            return Err(store_open(
                label,
                format!(
                    "requested version {} is lower than existing version {}",
                    target_version, on_disk
                ),
            ));
        }

        let last_upgrade = if on_disk < target_version {
            let report = upgrade::apply_upgrade(&mut conn, &registry, target_version)
                .map_err(|e| store_open(label, e))?;
            Some(report)
        } else {
            None
        };

        tracing::debug!("Opened store {} at v{}", label, target_version);
        Ok(Self {
            conn,
            registry,
            path,
            version: target_version,
            last_upgrade,
        })
    }

    /// Close the session, reporting any engine error
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| Error::Storage(e))
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// File backing this store, `None` when in memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The upgrade pass run while opening, if any
    pub fn last_upgrade(&self) -> Option<&UpgradeReport> {
        self.last_upgrade.as_ref()
    }

    // ========== Record Access ==========

    /// Read-only record access
    pub fn reader(&self) -> RecordAccess<'_> {
        RecordAccess::new(&self.conn, &self.registry, AccessMode::ReadOnly)
    }

    /// Read-write record access; each call commits on its own
    pub fn writer(&self) -> RecordAccess<'_> {
        RecordAccess::new(&self.conn, &self.registry, AccessMode::ReadWrite)
    }

    /// Run `f` as one unit of work: commit if it returns `Ok`, roll back
    /// otherwise.
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&RecordAccess<'_>) -> Result<T>,
    {
        let tx = self.conn.transaction()?;
        let outcome = {
            let records = RecordAccess::new(&tx, &self.registry, AccessMode::ReadWrite);
            f(&records)
        };

        match outcome {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                tx.rollback()?;
                tracing::debug!("Transaction rolled back: {}", e);
                Err(e)
            }
        }
    }

    // ========== Introspection ==========

    /// Collections present on disk
    pub fn collections_on_disk(&self) -> Result<Vec<String>> {
        Ok(upgrade::existing_collections(&self.conn)?.into_iter().collect())
    }

    /// Secondary index fields present on disk for a collection
    pub fn indexes_on_disk(&self, collection: &str) -> Result<Vec<String>> {
        Ok(upgrade::existing_indexes(&self.conn, collection)?
            .into_iter()
            .collect())
    }

    /// Record counts per declared collection
    pub fn stats(&self) -> Result<StoreStats> {
        let reader = self.reader();
        let collections = self
            .registry
            .names()
            .map(|name| Ok((name.to_string(), reader.count(name)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(StoreStats {
            version: self.version,
            collections,
        })
    }
}

fn store_open(label: &str, reason: impl std::fmt::Display) -> Error {
    Error::StoreOpen {
        path: label.to_string(),
        reason: reason.to_string(),
    }
}

/// Store statistics
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub version: u32,
    pub collections: Vec<(String, usize)>,
}

impl StoreStats {
    pub fn total_records(&self) -> usize {
        self.collections.iter().map(|(_, n)| n).sum()
    }
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Store Statistics (schema v{}):", self.version)?;
        for (name, count) in &self.collections {
            writeln!(f, "  {}: {}", name, count)?;
        }
        write!(f, "  Total: {}", self.total_records())
    }
}
