//! SQLite Dataset
//!
//! The dataset collaborator the orchestrator queries: schema introspection,
//! read-only dry runs and result execution over rusqlite with r2d2 pooling.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use query_cascade_core::ValidationResult;
use query_cascade_validation::{is_read_only, strip_trailing_terminators, CardinalityPolicy};

use crate::models::query::QueryData;
use crate::utils::error::{AppError, AppResult};

/// Type alias for the connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

const READ_ONLY_ERROR: &str = "Only read-only queries are allowed";

/// A column as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Human-written description of one table and its columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub table_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
}

/// Semantic metadata file: a JSON array of [`TableMetadata`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SemanticMetadata {
    pub tables: Vec<TableMetadata>,
}

impl SemanticMetadata {
    pub fn from_json(content: &str) -> AppResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn table(&self, name: &str) -> Option<&TableMetadata> {
        self.tables.iter().find(|t| t.table_name == name)
    }
}

/// Render one table the way generation prompts expect it:
/// `Table: t - desc` then `Columns: c (TYPE) - desc, ...`.
pub fn format_table_schema(
    table: &str,
    columns: &[ColumnInfo],
    metadata: Option<&TableMetadata>,
) -> String {
    let table_desc = metadata
        .map(|m| m.description.trim())
        .filter(|d| !d.is_empty())
        .map(|d| format!(" - {}", d))
        .unwrap_or_default();

    let rendered: Vec<String> = columns
        .iter()
        .map(|col| {
            let desc = metadata
                .and_then(|m| m.columns.get(&col.name))
                .map(|d| format!(" - {}", d))
                .unwrap_or_default();
            format!("{} ({}){}", col.name, col.data_type, desc)
        })
        .collect();

    format!("Table: {}{}\nColumns: {}", table, table_desc, rendered.join(", "))
}

// ============================================================================
// Dataset trait
// ============================================================================

/// Everything the orchestrator needs from a dataset.
#[async_trait]
pub trait Dataset: Send + Sync {
    /// Full schema text, tables separated by a blank line
    async fn get_schema(&self) -> AppResult<String>;

    async fn get_table_names(&self) -> AppResult<Vec<String>>;

    async fn get_table_columns(&self, table: &str) -> AppResult<Vec<ColumnInfo>>;

    /// Compile and count a candidate without returning rows.
    ///
    /// Engine rejections come back as an invalid [`ValidationResult`];
    /// `Err` is reserved for infrastructure failures.
    async fn dry_run(&self, sql: &str) -> AppResult<ValidationResult>;

    async fn execute(&self, sql: &str) -> AppResult<QueryData>;

    /// Optional descriptions used for prompts and relevance ranking
    fn metadata(&self) -> Option<&SemanticMetadata> {
        None
    }

    /// Schema text for a single table
    async fn describe_table(&self, table: &str) -> AppResult<String> {
        let columns = self.get_table_columns(table).await?;
        let meta = self.metadata().and_then(|m| m.table(table));
        Ok(format_table_schema(table, &columns, meta))
    }
}

// ============================================================================
// SQLite implementation
// ============================================================================

/// Read-only SQLite dataset behind an r2d2 pool
#[derive(Clone)]
pub struct SqliteDataset {
    pool: DbPool,
    metadata: Option<SemanticMetadata>,
    cardinality: CardinalityPolicy,
}

impl std::fmt::Debug for SqliteDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDataset")
            .field("metadata", &self.metadata.is_some())
            .field("cardinality", &self.cardinality)
            .finish()
    }
}

impl SqliteDataset {
    /// Create a dataset from an existing connection pool.
    pub fn from_pool(pool: DbPool) -> Self {
        Self {
            pool,
            metadata: None,
            cardinality: CardinalityPolicy::default(),
        }
    }

    /// Open an existing database file read-only
    pub fn open(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Err(AppError::not_found(format!(
                "Database file not found: {}",
                path.display()
            )));
        }

        let manager = SqliteConnectionManager::file(path).with_flags(
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        );
        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        debug!(path = %path.display(), "opened dataset");
        Ok(Self::from_pool(pool))
    }

    /// Create an in-memory dataset seeded by `init_sql`.
    ///
    /// The pool holds exactly one connection that never expires, so the
    /// seeded tables live as long as the dataset.
    pub fn new_in_memory_with(init_sql: &str) -> AppResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        {
            let conn = pool
                .get()
                .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))?;
            conn.execute_batch(init_sql)?;
        }

        Ok(Self::from_pool(pool))
    }

    pub fn with_metadata(mut self, metadata: SemanticMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Attach metadata from a JSON file
    pub fn load_metadata(self, path: &Path) -> AppResult<Self> {
        let metadata = SemanticMetadata::load(path)?;
        debug!(tables = metadata.tables.len(), "loaded semantic metadata");
        Ok(self.with_metadata(metadata))
    }

    pub fn with_max_rows(mut self, max_rows: u64) -> Self {
        self.cardinality = CardinalityPolicy::new(max_rows);
        self
    }

    /// Run blocking SQLite work off the async executor
    async fn with_connection<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Connection) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))?;
            f(&conn)
        })
        .await
        .map_err(|e| AppError::database(format!("Task join error: {}", e)))?
    }
}

fn count_rows(conn: &Connection, sql: &str) -> Result<u64, rusqlite::Error> {
    let stmt = conn.prepare(sql)?;
    if !stmt.readonly() {
        return Err(rusqlite::Error::InvalidQuery);
    }
    drop(stmt);

    // own lines so a trailing `--` comment cannot swallow the parenthesis
    let wrapped = format!("SELECT COUNT(*) FROM (\n{}\n)", sql);
    let count: i64 = conn.query_row(&wrapped, [], |row| row.get(0))?;
    Ok(count.max(0) as u64)
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<blob {} bytes>", bytes.len())),
    }
}

#[async_trait]
impl Dataset for SqliteDataset {
    async fn get_schema(&self) -> AppResult<String> {
        let tables = self.get_table_names().await?;
        let mut sections = Vec::with_capacity(tables.len());
        for table in &tables {
            sections.push(self.describe_table(table).await?);
        }
        Ok(sections.join("\n\n"))
    }

    async fn get_table_names(&self) -> AppResult<Vec<String>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .await
    }

    async fn get_table_columns(&self, table: &str) -> AppResult<Vec<ColumnInfo>> {
        let table = table.to_string();
        let columns = self
            .with_connection(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")?;
                let columns = stmt
                    .query_map([&table], |row| {
                        Ok(ColumnInfo {
                            name: row.get(0)?,
                            data_type: row.get(1)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((table, columns))
            })
            .await?;

        match columns {
            (table, cols) if cols.is_empty() => {
                Err(AppError::not_found(format!("Table not found: {}", table)))
            }
            (_, cols) => Ok(cols),
        }
    }

    async fn dry_run(&self, sql: &str) -> AppResult<ValidationResult> {
        let sql = strip_trailing_terminators(sql).trim().to_string();
        if sql.is_empty() {
            return Ok(ValidationResult::invalid("Empty query"));
        }
        if !is_read_only(&sql) {
            warn!("rejected non read-only candidate");
            return Ok(ValidationResult::invalid(READ_ONLY_ERROR));
        }

        let policy = self.cardinality;
        self.with_connection(move |conn| {
            let result = match count_rows(conn, &sql) {
                Ok(count) => policy
                    .warnings(count)
                    .into_iter()
                    .fold(ValidationResult::valid(count), |r, w| r.with_warning(w)),
                Err(rusqlite::Error::InvalidQuery) => ValidationResult::invalid(READ_ONLY_ERROR),
                Err(e) => ValidationResult::invalid(e.to_string()),
            };
            Ok(result)
        })
        .await
    }

    async fn execute(&self, sql: &str) -> AppResult<QueryData> {
        let sql = strip_trailing_terminators(sql).trim().to_string();
        if !is_read_only(&sql) {
            return Err(AppError::validation(READ_ONLY_ERROR));
        }

        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            if !stmt.readonly() {
                return Err(AppError::validation(READ_ONLY_ERROR));
            }
            let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

            let mut rows = Vec::new();
            let mut cursor = stmt.query([])?;
            while let Some(row) = cursor.next()? {
                let mut record = Map::with_capacity(columns.len());
                for (idx, name) in columns.iter().enumerate() {
                    record.insert(name.clone(), value_to_json(row.get_ref(idx)?));
                }
                rows.push(record);
            }

            Ok(QueryData {
                row_count: rows.len(),
                columns,
                rows,
            })
        })
        .await
    }

    fn metadata(&self) -> Option<&SemanticMetadata> {
        self.metadata.as_ref()
    }
}
