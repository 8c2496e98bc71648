//! SQLite-backed `ExternalDatabases`.
//!
//! Every call opens a fresh read-only connection on a blocking thread, so the
//! registry itself holds no connection state and is safe to share.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use tracing::debug;

use super::{ColumnInfo, DbStructure, ExternalDatabases, ForeignKey, QueryRows, TableSchema};
use crate::error::StoreError;

/// Named SQLite database files.
#[derive(Debug, Clone, Default)]
pub struct SqliteDatabases {
    databases: HashMap<String, PathBuf>,
}

impl SqliteDatabases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.insert(name, path);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.databases.insert(name.into(), path.into());
    }

    fn path_for(&self, db_name: &str) -> Result<PathBuf, StoreError> {
        self.databases
            .get(db_name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "database",
                name: db_name.to_string(),
            })
    }
}

#[async_trait]
impl ExternalDatabases for SqliteDatabases {
    async fn structure(&self, db_name: &str) -> Result<DbStructure, StoreError> {
        let path = self.path_for(db_name)?;
        tokio::task::spawn_blocking(move || read_structure(&path))
            .await
            .map_err(|e| StoreError::Database(format!("schema task failed: {}", e)))?
    }

    async fn run_read_query(&self, db_name: &str, sql: &str) -> Result<QueryRows, StoreError> {
        let path = self.path_for(db_name)?;
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || run_query(&path, &sql))
            .await
            .map_err(|e| StoreError::Database(format!("query task failed: {}", e)))?
    }
}

fn open_read_only(path: &Path) -> Result<Connection, StoreError> {
    Ok(Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?)
}

fn read_structure(path: &Path) -> Result<DbStructure, StoreError> {
    let conn = open_read_only(path)?;

    let table_names: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt.query_map([], |row| row.get(0))?;
        names.collect::<Result<_, _>>()?
    };

    let mut structure = DbStructure::default();
    for table in table_names {
        let mut columns = Vec::new();
        let mut keyed: Vec<(i64, String)> = Vec::new();
        {
            let mut stmt =
                conn.prepare("SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1)")?;
            let mut rows = stmt.query([&table])?;
            while let Some(row) = rows.next()? {
                let name: String = row.get(0)?;
                let not_null: i64 = row.get(2)?;
                let pk: i64 = row.get(3)?;
                if pk > 0 {
                    keyed.push((pk, name.clone()));
                }
                columns.push(ColumnInfo {
                    name,
                    data_type: row.get(1)?,
                    nullable: not_null == 0 && pk == 0,
                });
            }
        }
        keyed.sort();

        let foreign_keys = {
            let mut stmt = conn
                .prepare("SELECT \"from\", \"table\", \"to\" FROM pragma_foreign_key_list(?1)")?;
            let keys = stmt.query_map([&table], |row| {
                Ok(ForeignKey {
                    column: row.get(0)?,
                    referred_table: row.get(1)?,
                    referred_column: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                })
            })?;
            keys.collect::<Result<Vec<_>, _>>()?
        };

        structure.tables.insert(
            table,
            TableSchema {
                columns,
                primary_keys: keyed.into_iter().map(|(_, name)| name).collect(),
                foreign_keys,
            },
        );
    }

    debug!(
        "[SqliteDatabases] {} tables in {}",
        structure.tables.len(),
        path.display()
    );
    Ok(structure)
}

fn run_query(path: &Path, sql: &str) -> Result<QueryRows, StoreError> {
    let conn = open_read_only(path)?;
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let column_count = columns.len();

    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        let mut values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            values.push(sqlite_to_json(row.get_ref(idx)?));
        }
        rows.push(values);
    }

    Ok(QueryRows { columns, rows })
}

fn sqlite_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Number(n.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<blob {} bytes>", bytes.len())),
    }
}
