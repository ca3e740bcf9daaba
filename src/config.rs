use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::storage::{SchemaRegistry, default_registry};
use crate::trash::{MAX_RETENTION_DAYS, RETENTION_DAYS};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LedgerConfig {
    pub database: Option<String>,
    pub retention_days: Option<u32>,
    pub export_dir: Option<String>,
    /// Replaces the built-in schema when present
    pub schema: Option<SchemaRegistry>,
}

impl LedgerConfig {
    /// Database path, relative paths resolved against `base`
    pub fn database_path_in(&self, base: &Path) -> PathBuf {
        match &self.database {
            Some(db) => base.join(db),
            None => default_database_path_in(base),
        }
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days.unwrap_or(RETENTION_DAYS)
    }

    pub fn export_dir_in(&self, base: &Path) -> PathBuf {
        match &self.export_dir {
            Some(dir) => base.join(dir),
            None => base.to_path_buf(),
        }
    }

    pub fn registry(&self) -> SchemaRegistry {
        self.schema.clone().unwrap_or_else(default_registry)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("famledger.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".famledger").join("famledger.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<LedgerConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: LedgerConfig = toml::from_str(&contents)?;
    if let Some(days) = config.retention_days.filter(|days| *days > MAX_RETENTION_DAYS) {
        anyhow::bail!(
            "retention_days = {} in {} exceeds the maximum of {}",
            days,
            path.display(),
            MAX_RETENTION_DAYS
        );
    }
    if let Some(schema) = &config.schema {
        schema.validate()?;
    }
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &LedgerConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config(Some(dir.path().join("absent.toml").as_path())).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::default();
        let base = Path::new("/home/me");
        assert_eq!(config.retention_days(), 30);
        assert_eq!(
            config.database_path_in(base),
            PathBuf::from("/home/me/.famledger/famledger.db")
        );
        assert_eq!(config.export_dir_in(base), PathBuf::from("/home/me"));
        assert_eq!(config.registry(), default_registry());
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("famledger.toml");
        let config = LedgerConfig {
            database: Some("books.db".into()),
            retention_days: Some(7),
            export_dir: None,
            schema: None,
        };

        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &config, true).unwrap();

        let loaded = load_config(Some(path.as_path())).unwrap().unwrap();
        assert_eq!(loaded.retention_days(), 7);
        assert_eq!(loaded.database.as_deref(), Some("books.db"));
    }

    #[test]
    fn test_schema_override_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("famledger.toml");
        std::fs::write(
            &path,
            r#"
            [schema]
            version = 2

            [[schema.collections]]
            name = "expenses"
            indexes = ["category"]
            "#,
        )
        .unwrap();

        // no trash collection declared
        assert!(load_config(Some(path.as_path())).is_err());
    }

    #[test]
    fn test_retention_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("famledger.toml");

        std::fs::write(&path, "retention_days = 4294967295\n").unwrap();
        let err = load_config(Some(path.as_path())).unwrap_err();
        assert!(err.to_string().contains("retention_days"));

        std::fs::write(&path, "retention_days = 36500\n").unwrap();
        let loaded = load_config(Some(path.as_path())).unwrap().unwrap();
        assert_eq!(loaded.retention_days(), 36_500);
    }

    #[test]
    fn test_ensure_db_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("ledger.db");
        ensure_db_dir(&db).unwrap();
        assert!(db.parent().unwrap().is_dir());
    }
}
