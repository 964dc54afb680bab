use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::data::SortOrder;

/// The three document collections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Images,
    Histories,
    Imports,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Self::Images, Self::Histories, Self::Imports];

    /// Backing table name
    pub const fn table(self) -> &'static str {
        match self {
            Self::Images => "images",
            Self::Histories => "histories",
            Self::Imports => "imports",
        }
    }
}

/// Store-native ordering on a (possibly nested) document field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldOrder {
    /// Dotted path into the document, e.g. `value.updatedAt`
    pub field: &'static str,
    pub order: SortOrder,
}

/// Storage failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("document encoding error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid document field path {0:?}")]
    InvalidField(String),

    #[error("database connection mutex poisoned")]
    Poisoned,
}

/// Minimal document-store surface the record facade needs.
///
/// Documents are JSON objects addressed by a string key within a collection.
pub trait DocumentStore: Send + Sync {
    /// Persist a new document under `id`
    fn insert(&self, collection: Collection, id: &str, doc: &Value) -> Result<(), StoreError>;

    /// Fetch a document by key
    fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError>;

    /// First document whose `field` (dotted path) equals `value`, with its key
    fn find_by_field(
        &self,
        collection: Collection,
        field: &str,
        value: &str,
    ) -> Result<Option<(String, Value)>, StoreError>;

    /// One page of documents in store-native order
    fn list(
        &self,
        collection: Collection,
        order: FieldOrder,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Value>, StoreError>;

    /// Every document, in insertion order
    fn all(&self, collection: Collection) -> Result<Vec<Value>, StoreError>;

    fn count(&self, collection: Collection) -> Result<usize, StoreError>;

    /// Overwrite an existing document; false if `id` does not exist
    fn replace(&self, collection: Collection, id: &str, doc: &Value) -> Result<bool, StoreError>;

    /// Remove a document; false if `id` does not exist
    fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError>;
}

/// The Library manages the SQLite document database.
/// It stores images, puzzle level histories and import bookkeeping,
/// one JSON document per row.
#[derive(Clone)]
pub struct Library {
    conn: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

impl Library {
    /// Open (or create) the database at `path` and initialize the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        // Ensure the parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "📁 database opened");

        let library = Library {
            conn: Arc::new(Mutex::new(conn)),
            db_path: Some(path.to_path_buf()),
        };
        library.init_schema()?;

        Ok(library)
    }

    /// In-memory database (used by tests)
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let library = Library {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
            db_path: None,
        };
        library.init_schema()?;
        Ok(library)
    }

    /// Get the path where the database should be stored by default
    ///
    /// - Linux: ~/.local/share/mirai-puzzle-api/mirai_puzzle.db
    /// - macOS: ~/Library/Application Support/mirai-puzzle-api/mirai_puzzle.db
    /// - Windows: %APPDATA%\mirai-puzzle-api\mirai_puzzle.db
    pub fn default_db_path() -> PathBuf {
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        path.push("mirai-puzzle-api");
        path.push("mirai_puzzle.db");
        path
    }

    /// Get the path to the database file (None when in memory)
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Initialize the database schema.
    /// Creates all collection tables and indexes if they don't exist.
    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;

        for collection in Collection::ALL {
            conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        id      TEXT PRIMARY KEY,
                        body    TEXT NOT NULL
                    )",
                    collection.table()
                ),
                [],
            )?;
        }

        // Histories are addressed by value.id, not by the row key
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_histories_value_id
             ON histories(json_extract(body, '$.value.id'))",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_imports_started_at
             ON imports(json_extract(body, '$.started_at'))",
            [],
        )?;

        tracing::debug!("database schema initialized");

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

/// Turn `value.id` into `$.value.id`, refusing anything that is not a plain path
fn json_path(field: &str) -> Result<String, StoreError> {
    let valid = !field.is_empty()
        && field
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));

    if valid {
        Ok(format!("$.{field}"))
    } else {
        Err(StoreError::InvalidField(field.to_string()))
    }
}

fn decode_rows(rows: Vec<String>) -> Result<Vec<Value>, StoreError> {
    rows.iter()
        .map(|body| serde_json::from_str(body).map_err(StoreError::from))
        .collect()
}

/// LIMIT/OFFSET value; saturates instead of wrapping negative
fn to_sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn direction(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    }
}

impl DocumentStore for Library {
    fn insert(&self, collection: Collection, id: &str, doc: &Value) -> Result<(), StoreError> {
        let body = serde_json::to_string(doc)?;
        self.lock()?.execute(
            &format!("INSERT INTO {} (id, body) VALUES (?1, ?2)", collection.table()),
            params![id, body],
        )?;
        Ok(())
    }

    fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        let body: Option<String> = self
            .lock()?
            .query_row(
                &format!("SELECT body FROM {} WHERE id = ?1", collection.table()),
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        body.map(|b| serde_json::from_str(&b).map_err(StoreError::from))
            .transpose()
    }

    fn find_by_field(
        &self,
        collection: Collection,
        field: &str,
        value: &str,
    ) -> Result<Option<(String, Value)>, StoreError> {
        let path = json_path(field)?;
        let row: Option<(String, String)> = self
            .lock()?
            .query_row(
                &format!(
                    "SELECT id, body FROM {} WHERE json_extract(body, '{}') = ?1
                     ORDER BY rowid LIMIT 1",
                    collection.table(),
                    path
                ),
                params![value],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((id, body)) => Ok(Some((id, serde_json::from_str(&body)?))),
            None => Ok(None),
        }
    }

    fn list(
        &self,
        collection: Collection,
        order: FieldOrder,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Value>, StoreError> {
        let path = json_path(order.field)?;
        let dir = direction(order.order);

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT body FROM {} ORDER BY json_extract(body, '{}') {dir}, rowid {dir}
             LIMIT ?1 OFFSET ?2",
            collection.table(),
            path
        ))?;

        let rows = stmt
            .query_map(params![to_sql_count(limit), to_sql_count(skip)], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        decode_rows(rows)
    }

    fn all(&self, collection: Collection) -> Result<Vec<Value>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare(&format!("SELECT body FROM {} ORDER BY rowid", collection.table()))?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        decode_rows(rows)
    }

    fn count(&self, collection: Collection) -> Result<usize, StoreError> {
        let count: i64 = self.lock()?.query_row(
            &format!("SELECT COUNT(*) FROM {}", collection.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn replace(&self, collection: Collection, id: &str, doc: &Value) -> Result<bool, StoreError> {
        let body = serde_json::to_string(doc)?;
        let changed = self.lock()?.execute(
            &format!("UPDATE {} SET body = ?1 WHERE id = ?2", collection.table()),
            params![body, id],
        )?;
        Ok(changed > 0)
    }

    fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        let changed = self.lock()?.execute(
            &format!("DELETE FROM {} WHERE id = ?1", collection.table()),
            params![id],
        )?;
        Ok(changed > 0)
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(name: &str, created_at: &str) -> Value {
        json!({ "name": name, "created_at": created_at, "value": { "id": format!("v-{name}") } })
    }

    #[test]
    fn test_insert_get_replace_delete() {
        let lib = Library::open_in_memory().unwrap();

        lib.insert(Collection::Images, "a", &doc("one", "t1")).unwrap();
        assert_eq!(lib.get(Collection::Images, "a").unwrap().unwrap()["name"], "one");
        assert!(lib.get(Collection::Images, "missing").unwrap().is_none());
        // Collections are independent
        assert!(lib.get(Collection::Imports, "a").unwrap().is_none());

        assert!(lib.replace(Collection::Images, "a", &doc("uno", "t1")).unwrap());
        assert_eq!(lib.get(Collection::Images, "a").unwrap().unwrap()["name"], "uno");
        assert!(!lib.replace(Collection::Images, "missing", &doc("x", "t")).unwrap());

        assert!(lib.delete(Collection::Images, "a").unwrap());
        assert!(!lib.delete(Collection::Images, "a").unwrap());
        assert_eq!(lib.count(Collection::Images).unwrap(), 0);
    }

    #[test]
    fn test_duplicate_key_is_an_error() {
        let lib = Library::open_in_memory().unwrap();
        lib.insert(Collection::Imports, "k", &doc("a", "t")).unwrap();
        assert!(matches!(
            lib.insert(Collection::Imports, "k", &doc("b", "t")),
            Err(StoreError::Db(_))
        ));
    }

    #[test]
    fn test_find_by_nested_field() {
        let lib = Library::open_in_memory().unwrap();
        lib.insert(Collection::Histories, "row1", &doc("first", "t1")).unwrap();
        lib.insert(Collection::Histories, "row2", &doc("second", "t2")).unwrap();

        let (id, body) = lib
            .find_by_field(Collection::Histories, "value.id", "v-second")
            .unwrap()
            .unwrap();
        assert_eq!(id, "row2");
        assert_eq!(body["name"], "second");

        assert!(lib
            .find_by_field(Collection::Histories, "value.id", "nope")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_field_paths_are_validated() {
        let lib = Library::open_in_memory().unwrap();
        for bad in ["", "value..id", "name') OR 1=1 --", "a.b c"] {
            assert!(matches!(
                lib.find_by_field(Collection::Histories, bad, "x"),
                Err(StoreError::InvalidField(_))
            ));
        }
    }

    #[test]
    fn test_list_orders_and_paginates() {
        let lib = Library::open_in_memory().unwrap();
        lib.insert(Collection::Images, "b", &doc("b", "2024-01-02")).unwrap();
        lib.insert(Collection::Images, "c", &doc("c", "2024-01-03")).unwrap();
        lib.insert(Collection::Images, "a", &doc("a", "2024-01-01")).unwrap();

        let names = |docs: Vec<Value>| -> Vec<String> {
            docs.iter().map(|d| d["name"].as_str().unwrap().to_string()).collect()
        };

        let desc = FieldOrder { field: "created_at", order: SortOrder::Desc };
        assert_eq!(names(lib.list(Collection::Images, desc, 0, 10).unwrap()), ["c", "b", "a"]);
        assert_eq!(names(lib.list(Collection::Images, desc, 1, 1).unwrap()), ["b"]);
        assert!(lib.list(Collection::Images, desc, 5, 10).unwrap().is_empty());
        assert!(lib.list(Collection::Images, desc, usize::MAX, 10).unwrap().is_empty());

        let asc = FieldOrder { field: "created_at", order: SortOrder::Asc };
        assert_eq!(names(lib.list(Collection::Images, asc, 0, 2).unwrap()), ["a", "b"]);

        // Insertion order for `all`
        assert_eq!(names(lib.all(Collection::Images).unwrap()), ["b", "c", "a"]);
        assert_eq!(lib.count(Collection::Images).unwrap(), 3);
    }

    #[test]
    fn test_open_creates_file() {
        let dir = std::env::temp_dir().join(format!("mirai-lib-{}", uuid::Uuid::new_v4().simple()));
        let path = dir.join("nested").join("test.db");

        let lib = Library::open(&path).unwrap();
        lib.insert(Collection::Imports, "x", &doc("persisted", "t")).unwrap();
        drop(lib);

        let reopened = Library::open(&path).unwrap();
        assert_eq!(reopened.path(), Some(path.as_path()));
        assert_eq!(reopened.get(Collection::Imports, "x").unwrap().unwrap()["name"], "persisted");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
