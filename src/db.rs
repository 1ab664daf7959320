use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};
use tracing::{debug, info};

use crate::error::IndexError;
use crate::record::ColumnValue;

/// The store contract the ingestion pipeline runs against.
///
/// Statement execution is autocommitted, so every insert commits on its own;
/// no transaction ever spans more than one file. Existence checks bind the
/// looked-up name as a parameter instead of concatenating it into the SQL.
pub trait RelationalStore {
    fn table_exists(&self, table: &str) -> Result<bool, IndexError>;

    /// Run a DDL statement (identifier templating, no bound values).
    fn execute_ddl(&self, statement: &str) -> Result<(), IndexError>;

    /// Run a parameterized statement, returning the affected row count.
    fn execute(&self, statement: &str, values: &[ColumnValue]) -> Result<usize, IndexError>;

    fn drop_table(&self, table: &str) -> Result<(), IndexError>;
}

impl<R: RelationalStore> RelationalStore for &R {
    fn table_exists(&self, table: &str) -> Result<bool, IndexError> {
        (*self).table_exists(table)
    }

    fn execute_ddl(&self, statement: &str) -> Result<(), IndexError> {
        (*self).execute_ddl(statement)
    }

    fn execute(&self, statement: &str, values: &[ColumnValue]) -> Result<usize, IndexError> {
        (*self).execute(statement, values)
    }

    fn drop_table(&self, table: &str) -> Result<(), IndexError> {
        (*self).drop_table(table)
    }
}

/// SQLite-backed store holding one connection for the whole batch.
///
/// The database is a file: existence is file existence and creation happens
/// on first open, outside any transaction. The connection is released when
/// the store is dropped, on every exit path.
pub struct SqliteStore {
    path: Utf8PathBuf,
    connection: Connection,
}

impl SqliteStore {
    pub fn database_exists(path: &Utf8Path) -> bool {
        path.as_std_path().exists()
    }

    pub fn open(path: &Utf8Path) -> Result<Self, IndexError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| IndexError::Filesystem(err.to_string()))?;
        }
        let existed = Self::database_exists(path);
        let connection = Connection::open(path.as_std_path())
            .map_err(|err| IndexError::Connection(err.to_string()))?;
        info!(database = path.as_str(), created = !existed, "database opened");
        Ok(Self {
            path: path.to_owned(),
            connection,
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn server_version(&self) -> Result<String, IndexError> {
        self.connection
            .query_row("SELECT sqlite_version()", [], |row| row.get(0))
            .map_err(|err| IndexError::Database(err.to_string()))
    }
}

impl RelationalStore for SqliteStore {
    fn table_exists(&self, table: &str) -> Result<bool, IndexError> {
        let mut statement = self
            .connection
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1")
            .map_err(|err| IndexError::Database(err.to_string()))?;
        let exists = statement
            .exists([table])
            .map_err(|err| IndexError::Database(err.to_string()))?;
        debug!(table, exists, "checked table existence");
        Ok(exists)
    }

    fn execute_ddl(&self, statement: &str) -> Result<(), IndexError> {
        self.connection
            .execute_batch(statement)
            .map_err(|err| IndexError::Schema(err.to_string()))
    }

    fn execute(&self, statement: &str, values: &[ColumnValue]) -> Result<usize, IndexError> {
        self.connection
            .execute(statement, params_from_iter(values.iter().map(sql_value)))
            .map_err(|err| IndexError::Database(err.to_string()))
    }

    fn drop_table(&self, table: &str) -> Result<(), IndexError> {
        self.connection
            .execute_batch(&format!("DROP TABLE {table};"))
            .map_err(|err| IndexError::Schema(err.to_string()))
    }
}

fn sql_value(value: &ColumnValue) -> SqlValue {
    match value {
        ColumnValue::Null => SqlValue::Null,
        ColumnValue::Integer(value) => SqlValue::Integer(*value),
        ColumnValue::Real(value) => SqlValue::Real(*value),
        ColumnValue::Text(value) => SqlValue::Text(value.clone()),
    }
}
