//! Export and import of record sets as a single JSON document

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::Record;
use crate::storage::{Store, TRASH_COLLECTION};
use crate::{Error, Result};

/// Every record of a store at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub generated_at: DateTime<Utc>,
    pub schema_version: u32,
    pub collections: BTreeMap<String, Vec<Record>>,
}

impl ExportBundle {
    pub fn record_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Upsert bundle records, keep everything else
    #[default]
    Merge,
    /// Empty each collection present in the bundle first
    Replace,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub collections: usize,
    pub records: usize,
    pub cleared: usize,
}

impl std::fmt::Display for ImportReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported {} records into {} collections ({} removed first)",
            self.records, self.collections, self.cleared
        )
    }
}

/// Collect every declared collection into a bundle
pub fn export_all(store: &Store, include_trash: bool) -> Result<ExportBundle> {
    let reader = store.reader();
    let mut collections = BTreeMap::new();
    for name in store.registry().names() {
        if name == TRASH_COLLECTION && !include_trash {
            continue;
        }
        collections.insert(name.to_string(), reader.all(name)?);
    }

    Ok(ExportBundle {
        generated_at: Utc::now(),
        schema_version: store.version(),
        collections,
    })
}

/// File name for a bundle generated at `at`
pub fn export_filename(at: DateTime<Utc>) -> String {
    format!("famledger-export-{}.json", at.format("%Y%m%d-%H%M%S"))
}

/// Write a bundle as pretty JSON into `dir`, returning the file path
pub fn write_bundle(bundle: &ExportBundle, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(export_filename(bundle.generated_at));
    std::fs::write(&path, serde_json::to_string_pretty(bundle)?)?;
    tracing::info!("Exported {} records to {}", bundle.record_count(), path.display());
    Ok(path)
}

pub fn read_bundle(path: &Path) -> Result<ExportBundle> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Load a bundle into the store as one transaction.
///
/// Unknown collections fail the whole import before anything is written.
pub fn import_bundle(store: &mut Store, bundle: &ExportBundle, mode: ImportMode) -> Result<ImportReport> {
    for name in bundle.collections.keys() {
        if !store.registry().contains(name) {
            return Err(Error::UnknownCollection(name.clone()));
        }
    }

    let report = store.transaction(|records| {
        let mut report = ImportReport::default();
        for (name, items) in &bundle.collections {
            if mode == ImportMode::Replace {
                report.cleared += records.clear(name)?;
            }
            for record in items {
                records.put(name, record)?;
            }
            report.collections += 1;
            report.records += items.len();
        }
        Ok(report)
    })?;

    tracing::info!("{}", report);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::default_registry;
    use crate::trash::Trash;
    use chrono::TimeZone;
    use serde_json::json;

    fn seeded() -> Store {
        let mut store = Store::open_in_memory(default_registry()).unwrap();
        {
            let records = store.writer();
            records
                .put("expenses", &Record::try_from(json!({"id": "e1", "amount": 5})).unwrap())
                .unwrap();
            records
                .put("expenses", &Record::try_from(json!({"id": "e0", "amount": 1})).unwrap())
                .unwrap();
            records
                .put("income", &Record::try_from(json!({"id": "i1", "amount": 9})).unwrap())
                .unwrap();
        }
        Trash::default()
            .soft_delete_by_id(&mut store, "expenses", "e0")
            .unwrap();
        store
    }

    #[test]
    fn test_export_filename() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        assert_eq!(export_filename(at), "famledger-export-20240305-070809.json");
    }

    #[test]
    fn test_export_skips_trash_unless_asked() {
        let store = seeded();
        let bundle = export_all(&store, false).unwrap();
        assert!(!bundle.collections.contains_key("trash"));
        assert_eq!(bundle.record_count(), 2);
        assert_eq!(bundle.schema_version, 1);

        let with_trash = export_all(&store, true).unwrap();
        assert_eq!(with_trash.collections["trash"].len(), 1);
    }

    #[test]
    fn test_write_read_and_replace_import() {
        let dir = tempfile::tempdir().unwrap();
        let source = seeded();
        let bundle = export_all(&source, false).unwrap();
        let path = write_bundle(&bundle, dir.path()).unwrap();

        let loaded = read_bundle(&path).unwrap();
        assert_eq!(loaded.collections, bundle.collections);

        let mut target = Store::open_in_memory(default_registry()).unwrap();
        target
            .writer()
            .put("expenses", &Record::try_from(json!({"id": "stale"})).unwrap())
            .unwrap();

        let report = import_bundle(&mut target, &loaded, ImportMode::Replace).unwrap();
        assert_eq!(report.cleared, 1);
        assert_eq!(report.records, 2);

        let expenses = target.reader().all("expenses").unwrap();
        assert_eq!(expenses, loaded.collections["expenses"]);
    }

    #[test]
    fn test_import_rejects_unknown_collection() {
        let mut store = seeded();
        let mut collections = BTreeMap::new();
        collections.insert("expenses".to_string(), vec![Record::new().with("id", "new")]);
        collections.insert("mystery".to_string(), vec![Record::new().with("id", "x")]);
        let bundle = ExportBundle {
            generated_at: Utc::now(),
            schema_version: 1,
            collections,
        };

        let err = import_bundle(&mut store, &bundle, ImportMode::Merge).unwrap_err();
        assert!(matches!(err, Error::UnknownCollection(name) if name == "mystery"));
        assert!(store.reader().find("expenses", "new").unwrap().is_none());
    }

    #[test]
    fn test_import_rejects_malformed_trash_rows() {
        let mut store = seeded();
        let mut collections = BTreeMap::new();
        collections.insert("income".to_string(), vec![Record::new().with("id", "i2")]);
        collections.insert(
            "trash".to_string(),
            vec![Record::new().with("id", "t9").with("expires_at", 1000)],
        );
        let bundle = ExportBundle {
            generated_at: Utc::now(),
            schema_version: 1,
            collections,
        };

        let err = import_bundle(&mut store, &bundle, ImportMode::Merge).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(store.reader().find("income", "i2").unwrap().is_none());
        assert_eq!(store.reader().count("trash").unwrap(), 1);
    }
}
