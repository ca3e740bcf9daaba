//! Schema registry - declared collections, key fields and secondary indexes
//!
//! Every collection is stored as its own table:
//!
//! ```sql
//! CREATE TABLE <collection> (key TEXT PRIMARY KEY, data TEXT NOT NULL)
//! ```
//!
//! Secondary indexes are non-unique expression indexes over the JSON body.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Name of the soft-delete holding collection
pub const TRASH_COLLECTION: &str = "trash";

/// Key field of trash entries
pub const TRASH_KEY: &str = "id";

/// Indexes the trash bin looks entries up by
pub const TRASH_INDEXES: [&str; 2] = ["collection", "expires_at"];

/// Version of the built-in registry
pub const SCHEMA_VERSION: u32 = 1;

fn collection_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid regex"))
}

fn field_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"))
}

fn default_key() -> String {
    "id".to_string()
}

/// One declared collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    /// Primary key field inside each record
    #[serde(default = "default_key")]
    pub key: String,
    /// Non-unique secondary index fields
    #[serde(default)]
    pub indexes: Vec<String>,
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>, key: impl Into<String>, indexes: &[&str]) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            indexes: indexes.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn has_index(&self, field: &str) -> bool {
        self.indexes.iter().any(|f| f == field)
    }
}

/// Static mapping from collection name to key field and index list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRegistry {
    pub version: u32,
    #[serde(default)]
    pub collections: Vec<CollectionSchema>,
}

impl SchemaRegistry {
    pub fn new(version: u32, collections: Vec<CollectionSchema>) -> Self {
        Self { version, collections }
    }

    /// Look up a collection by name
    pub fn get(&self, name: &str) -> Result<&CollectionSchema> {
        self.collections
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::UnknownCollection(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collections.iter().any(|c| c.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.collections.iter().map(|c| c.name.as_str())
    }

    /// Check the registry before it is used to create anything on disk
    pub fn validate(&self) -> Result<()> {
        if self.version == 0 {
            return Err(Error::Schema("schema version must be at least 1".into()));
        }

        let mut seen = HashSet::new();
        let mut index_names = HashSet::new();
        for collection in &self.collections {
            let name = collection.name.as_str();
            if !collection_name_re().is_match(name) || name.starts_with("sqlite_") {
                return Err(Error::Schema(format!("invalid collection name '{}'", name)));
            }
            if !seen.insert(name) {
                return Err(Error::Schema(format!("duplicate collection '{}'", name)));
            }
            if !field_name_re().is_match(&collection.key) {
                return Err(Error::Schema(format!(
                    "invalid key field '{}' in '{}'",
                    collection.key, name
                )));
            }

            let mut fields = HashSet::new();
            for field in &collection.indexes {
                if !field_name_re().is_match(field) {
                    return Err(Error::Schema(format!(
                        "invalid index field '{}' in '{}'",
                        field, name
                    )));
                }
                if field == &collection.key {
                    return Err(Error::Schema(format!(
                        "'{}' is the key of '{}' and cannot be a secondary index",
                        field, name
                    )));
                }
                if !fields.insert(field.as_str()) {
                    return Err(Error::Schema(format!(
                        "duplicate index '{}' in '{}'",
                        field, name
                    )));
                }
                // Index names share one namespace across all tables.
                if !index_names.insert(index_name(name, field)) {
                    return Err(Error::Schema(format!(
                        "index '{}' on '{}' collides with another collection's index",
                        field, name
                    )));
                }
            }
        }

        // A collection table may not take a name reserved for an index
        if let Some(name) = self.names().find(|name| index_names.contains(*name)) {
            return Err(Error::Schema(format!(
                "collection '{}' collides with a generated index name",
                name
            )));
        }

        let trash = self.get(TRASH_COLLECTION).map_err(|_| {
            Error::Schema(format!("registry must declare the '{}' collection", TRASH_COLLECTION))
        })?;
        if trash.key != TRASH_KEY {
            return Err(Error::Schema(format!(
                "'{}' must be keyed by '{}', not '{}'",
                TRASH_COLLECTION, TRASH_KEY, trash.key
            )));
        }
        for field in TRASH_INDEXES {
            if !trash.has_index(field) {
                return Err(Error::Schema(format!(
                    "'{}' must index '{}'",
                    TRASH_COLLECTION, field
                )));
            }
        }

        Ok(())
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        default_registry()
    }
}

/// The built-in ledger schema
pub fn default_registry() -> SchemaRegistry {
    SchemaRegistry::new(
        SCHEMA_VERSION,
        vec![
            CollectionSchema::new("income", "id", &["date", "category", "account"]),
            CollectionSchema::new("expenses", "id", &["date", "category", "account"]),
            CollectionSchema::new("accounts", "id", &["type"]),
            CollectionSchema::new("transfers", "id", &["date", "from_account", "to_account"]),
            CollectionSchema::new("loans", "id", &["status", "due_date", "counterparty"]),
            CollectionSchema::new("debts", "id", &["status", "due_date", "priority"]),
            CollectionSchema::new("goals", "id", &["status"]),
            CollectionSchema::new("budgets", "id", &["month", "category"]),
            CollectionSchema::new("categories", "id", &["kind"]),
            CollectionSchema::new("recurring", "id", &["frequency", "next_date"]),
            CollectionSchema::new(
                "inter_module_loans",
                "id",
                &["source", "destination", "status", "date"],
            ),
            CollectionSchema::new(TRASH_COLLECTION, TRASH_KEY, &TRASH_INDEXES),
        ],
    )
}

/// Name of the index for `collection.field`
pub fn index_name(collection: &str, field: &str) -> String {
    format!("idx_{}_{}", collection, field)
}

/// SQL expression an index (and any query using it) is built over
pub fn field_expr(field: &str) -> String {
    format!("json_extract(data, '$.{}')", field)
}

/// SQL to create a collection table
pub fn create_table_sql(collection: &CollectionSchema) -> String {
    format!(
        r#"CREATE TABLE IF NOT EXISTS "{}" (
    key TEXT PRIMARY KEY NOT NULL,
    data TEXT NOT NULL
)"#,
        collection.name
    )
}

/// SQL to create one secondary index
pub fn create_index_sql(collection: &str, field: &str) -> String {
    format!(
        r#"CREATE INDEX IF NOT EXISTS "{}" ON "{}"({})"#,
        index_name(collection, field),
        collection,
        field_expr(field)
    )
}

/// All schema creation statements for a registry
pub fn all_schema_statements(registry: &SchemaRegistry) -> Vec<String> {
    let mut stmts: Vec<String> = registry.collections.iter().map(create_table_sql).collect();
    for collection in &registry.collections {
        stmts.extend(
            collection
                .indexes
                .iter()
                .map(|field| create_index_sql(&collection.name, field)),
        );
    }
    stmts
}
