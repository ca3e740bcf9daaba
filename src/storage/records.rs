//! Record access - generic CRUD scoped to one collection per call

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use super::schema::{self, CollectionSchema, SchemaRegistry, TRASH_COLLECTION};
use crate::domain::LedgerRecord;
use crate::record::Record;
use crate::trash::TrashEntry;
use crate::{Error, Result};

/// Whether an accessor may write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// Record operations over an open store session.
///
/// Obtained from [`Store::reader`](super::Store::reader),
/// [`Store::writer`](super::Store::writer) or inside
/// [`Store::transaction`](super::Store::transaction).
pub struct RecordAccess<'s> {
    conn: &'s Connection,
    registry: &'s SchemaRegistry,
    mode: AccessMode,
}

impl<'s> RecordAccess<'s> {
    pub(crate) fn new(conn: &'s Connection, registry: &'s SchemaRegistry, mode: AccessMode) -> Self {
        Self { conn, registry, mode }
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn registry(&self) -> &SchemaRegistry {
        self.registry
    }

    fn schema(&self, collection: &str) -> Result<&'s CollectionSchema> {
        self.registry.get(collection)
    }

    fn writable(&self, collection: &str) -> Result<&'s CollectionSchema> {
        let schema = self.schema(collection)?;
        if self.mode == AccessMode::ReadOnly {
            return Err(Error::ReadOnly(collection.to_string()));
        }
        Ok(schema)
    }

    // ========== Reads ==========

    /// Get a record by key, or `NotFound`
    pub fn get(&self, collection: &str, id: &str) -> Result<Record> {
        self.find(collection, id)?
            .ok_or_else(|| Error::not_found(collection, id))
    }

    /// Get a record by key if present
    pub fn find(&self, collection: &str, id: &str) -> Result<Option<Record>> {
        let schema = self.schema(collection)?;
        let data: Option<String> = self
            .conn
            .query_row(
                &format!(r#"SELECT data FROM "{}" WHERE key = ?1"#, schema.name),
                [id],
                |row| row.get(0),
            )
            .optional()?;

        data.map(|d| d.parse()).transpose()
    }

    /// All records whose indexed `field` equals `value`, in insertion order
    pub fn query_by_index(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Record>> {
        let schema = self.schema(collection)?;
        if !schema.has_index(field) {
            return Err(Error::UnknownIndex {
                collection: collection.to_string(),
                field: field.to_string(),
            });
        }

        // JSON null is never stored by json_extract equality
        let Some(bound) = to_sql_value(value) else {
            return Ok(Vec::new());
        };

        let sql = format!(
            r#"SELECT data FROM "{}" WHERE {} = ?1 ORDER BY rowid"#,
            schema.name,
            schema::field_expr(field)
        );
        self.collect_records(&sql, [bound])
    }

    /// Records whose indexed `field` is at most `bound`, in insertion order.
    ///
    /// Records where the field is absent or null never match.
    pub fn query_at_most(&self, collection: &str, field: &str, bound: &Value) -> Result<Vec<Record>> {
        let schema = self.schema(collection)?;
        if !schema.has_index(field) {
            return Err(Error::UnknownIndex {
                collection: collection.to_string(),
                field: field.to_string(),
            });
        }
        let Some(bound) = to_sql_value(bound) else {
            return Ok(Vec::new());
        };

        let sql = format!(
            r#"SELECT data FROM "{}" WHERE {} <= ?1 ORDER BY rowid"#,
            schema.name,
            schema::field_expr(field)
        );
        self.collect_records(&sql, [bound])
    }

    /// Every record in a collection, in insertion order
    pub fn all(&self, collection: &str) -> Result<Vec<Record>> {
        let schema = self.schema(collection)?;
        let sql = format!(r#"SELECT data FROM "{}" ORDER BY rowid"#, schema.name);
        self.collect_records(&sql, [])
    }

    /// Count records in a collection
    pub fn count(&self, collection: &str) -> Result<usize> {
        let schema = self.schema(collection)?;
        let count: i64 = self.conn.query_row(
            &format!(r#"SELECT COUNT(*) FROM "{}""#, schema.name),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn collect_records<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Record>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.iter().map(|data| data.parse()).collect()
    }

    // ========== Writes ==========

    /// Insert or fully replace a record by its key
    pub fn put(&self, collection: &str, record: &Record) -> Result<()> {
        let schema = self.writable(collection)?;
        let key = record.key(&schema.key).ok_or_else(|| {
            Error::Validation(format!(
                "record for '{}' has no usable '{}' field",
                collection, schema.key
            ))
        })?;
        if schema.name == TRASH_COLLECTION {
            record.to_typed::<TrashEntry>().map_err(|e| {
                Error::Validation(format!("record {} is not a trash entry: {}", key, e))
            })?;
        }

        self.conn.execute(
            &format!(
                r#"INSERT INTO "{}" (key, data) VALUES (?1, ?2)
                   ON CONFLICT(key) DO UPDATE SET data = excluded.data"#,
                schema.name
            ),
            params![key, record.to_string()],
        )?;
        tracing::debug!("put {}/{}", collection, key);
        Ok(())
    }

    /// Store a new record, generating its key when absent. Returns the key.
    pub fn create(&self, collection: &str, mut record: Record) -> Result<String> {
        let schema = self.writable(collection)?;
        let id = match record.key(&schema.key) {
            Some(id) => id,
            None => {
                let id = Record::generate_id();
                record.set(schema.key.clone(), id.clone());
                id
            }
        };
        self.put(collection, &record)?;
        Ok(id)
    }

    /// Remove a record by key. Absent keys are not an error; returns whether
    /// a record was removed.
    pub fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let schema = self.writable(collection)?;
        let removed = self.conn.execute(
            &format!(r#"DELETE FROM "{}" WHERE key = ?1"#, schema.name),
            [id],
        )?;
        tracing::debug!("delete {}/{} (removed: {})", collection, id, removed);
        Ok(removed > 0)
    }

    /// Remove every record in a collection. Returns the number removed.
    pub fn clear(&self, collection: &str) -> Result<usize> {
        let schema = self.writable(collection)?;
        let removed = self
            .conn
            .execute(&format!(r#"DELETE FROM "{}""#, schema.name), [])?;
        Ok(removed)
    }

    // ========== Typed ==========

    pub fn put_typed<T: LedgerRecord>(&self, item: &T) -> Result<()> {
        self.put(T::COLLECTION, &Record::from_typed(item)?)
    }

    pub fn get_typed<T: LedgerRecord>(&self, id: &str) -> Result<T> {
        self.get(T::COLLECTION, id)?.to_typed()
    }

    pub fn all_typed<T: LedgerRecord>(&self) -> Result<Vec<T>> {
        self.all(T::COLLECTION)?
            .iter()
            .map(Record::to_typed)
            .collect()
    }
}

/// Bind value for comparing against `json_extract` output
fn to_sql_value(value: &Value) -> Option<SqlValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => Some(match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
        }),
        Value::String(s) => Some(SqlValue::Text(s.clone())),
        // json_extract returns arrays and objects as minified JSON text
        other => Some(SqlValue::Text(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;
    use crate::storage::schema::{CollectionSchema, default_registry};
    use serde_json::json;

    fn store() -> Store {
        Store::open_in_memory(default_registry()).unwrap()
    }

    fn record(value: Value) -> Record {
        Record::try_from(value).unwrap()
    }

    #[test]
    fn test_put_get_round_trip() {
        let store = store();
        let records = store.writer();

        let expense = record(json!({"id": "a1", "amount": 1000, "category": "food"}));
        records.put("expenses", &expense).unwrap();

        let retrieved = records.get("expenses", "a1").unwrap();
        assert_eq!(retrieved, expense);
        assert_eq!(crate::aggregate::sum(&[retrieved], "amount"), 1000.0);
    }

    #[test]
    fn test_put_replaces_whole_record() {
        let store = store();
        let records = store.writer();

        records
            .put("expenses", &record(json!({"id": "a1", "amount": 10, "note": "lunch"})))
            .unwrap();
        records
            .put("expenses", &record(json!({"id": "a1", "amount": 12})))
            .unwrap();

        let retrieved = records.get("expenses", "a1").unwrap();
        assert_eq!(retrieved.number("amount"), 12.0);
        assert!(!retrieved.contains("note"));
        assert_eq!(records.count("expenses").unwrap(), 1);
    }

    #[test]
    fn test_delete_then_get_is_not_found() {
        let store = store();
        let records = store.writer();

        records.put("income", &record(json!({"id": "i1", "amount": 5}))).unwrap();
        assert!(records.delete("income", "i1").unwrap());

        let err = records.get("income", "i1").unwrap_err();
        assert!(err.is_not_found());

        // deleting again is a no-op
        assert!(!records.delete("income", "i1").unwrap());
    }

    #[test]
    fn test_put_requires_key() {
        let store = store();
        let err = store
            .writer()
            .put("expenses", &record(json!({"amount": 3})))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_create_generates_id() {
        let store = store();
        let records = store.writer();

        let id = records
            .create("goals", record(json!({"name": "Holiday", "status": "active"})))
            .unwrap();
        let stored = records.get("goals", &id).unwrap();
        assert_eq!(stored.str_field("id"), Some(id.as_str()));

        let kept = records
            .create("goals", record(json!({"id": "g-fixed", "name": "Car"})))
            .unwrap();
        assert_eq!(kept, "g-fixed");
    }

    #[test]
    fn test_query_by_index() {
        let store = store();
        let records = store.writer();

        records.put("expenses", &record(json!({"id": "1", "category": "food", "amount": 5}))).unwrap();
        records.put("expenses", &record(json!({"id": "2", "category": "rent", "amount": 700}))).unwrap();
        records.put("expenses", &record(json!({"id": "3", "category": "food", "amount": 8}))).unwrap();

        let food = records
            .query_by_index("expenses", "category", &json!("food"))
            .unwrap();
        let ids: Vec<_> = food.iter().filter_map(|r| r.str_field("id")).collect();
        assert_eq!(ids, vec!["1", "3"]);

        let none = records
            .query_by_index("expenses", "category", &json!("travel"))
            .unwrap();
        assert!(none.is_empty());
    }

    fn readings_store() -> Store {
        let mut registry = default_registry();
        registry
            .collections
            .push(CollectionSchema::new("readings", "id", &["value"]));
        Store::open_in_memory(registry).unwrap()
    }

    #[test]
    fn test_query_by_numeric_and_null_values() {
        let store = readings_store();
        let records = store.writer();

        records.put("readings", &record(json!({"id": "r1", "value": 1000}))).unwrap();
        records.put("readings", &record(json!({"id": "r2", "value": 2000}))).unwrap();

        let hits = records
            .query_by_index("readings", "value", &json!(1000))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(records.query_by_index("readings", "value", &Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_query_at_most() {
        let store = readings_store();
        let records = store.writer();

        records.put("readings", &record(json!({"id": "r1", "value": 1000}))).unwrap();
        records.put("readings", &record(json!({"id": "r2", "value": 2000}))).unwrap();
        records.put("readings", &record(json!({"id": "r3"}))).unwrap();

        let low = records
            .query_at_most("readings", "value", &json!(1500))
            .unwrap();
        let ids: Vec<_> = low.iter().filter_map(|r| r.str_field("id")).collect();
        assert_eq!(ids, vec!["r1"]);
        assert_eq!(records.query_at_most("readings", "value", &json!(5000)).unwrap().len(), 2);
        assert!(matches!(
            records.query_at_most("readings", "note", &json!(1)),
            Err(Error::UnknownIndex { .. })
        ));
    }

    #[test]
    fn test_trash_only_accepts_trash_entries() {
        let store = store();
        let records = store.writer();

        let err = records
            .put("trash", &record(json!({"id": "t1", "expires_at": 1000})))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(records.create("trash", record(json!({"note": "junk"}))).is_err());
        assert_eq!(records.count("trash").unwrap(), 0);

        let entry = record(json!({
            "id": "t2",
            "collection": "expenses",
            "record_id": "a1",
            "record": {"id": "a1", "amount": 5},
            "deleted_at": 1000,
            "expires_at": 2000,
        }));
        records.put("trash", &entry).unwrap();
        assert_eq!(records.get("trash", "t2").unwrap(), entry);
    }

    #[test]
    fn test_query_requires_declared_index() {
        let store = store();
        let err = store
            .reader()
            .query_by_index("expenses", "note", &json!("x"))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownIndex { .. }));
    }

    #[test]
    fn test_unknown_collection() {
        let store = store();
        let err = store.reader().get("bogus", "1").unwrap_err();
        assert!(matches!(err, Error::UnknownCollection(_)));
    }

    #[test]
    fn test_reader_cannot_write() {
        let store = store();
        let reader = store.reader();
        assert_eq!(reader.mode(), AccessMode::ReadOnly);

        let err = reader.put("expenses", &record(json!({"id": "1"}))).unwrap_err();
        assert!(matches!(err, Error::ReadOnly(_)));
        assert!(matches!(reader.delete("expenses", "1"), Err(Error::ReadOnly(_))));
    }

    #[test]
    fn test_all_keeps_insertion_order_across_updates() {
        let store = store();
        let records = store.writer();

        records.put("categories", &record(json!({"id": "b", "name": "B"}))).unwrap();
        records.put("categories", &record(json!({"id": "a", "name": "A"}))).unwrap();
        records.put("categories", &record(json!({"id": "b", "name": "B2"}))).unwrap();

        let all = records.all("categories").unwrap();
        let names: Vec<_> = all.iter().filter_map(|r| r.str_field("name")).collect();
        assert_eq!(names, vec!["B2", "A"]);

        assert_eq!(records.clear("categories").unwrap(), 2);
        assert_eq!(records.count("categories").unwrap(), 0);
    }
}
