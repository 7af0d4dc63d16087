//! Bundled SQLite driver.
//!
//! Each database identifier (service name or SID) maps to one file under a
//! root directory: `<root>/<identifier>.db`. Host, port, and credentials in
//! the descriptor are carried for logging only; SQLite has no listener and
//! no accounts.
//!
//! Connections open in WAL mode with foreign keys on and a busy timeout, so
//! several pooled connections can share one file. The first statement of a
//! unit of work opens a transaction that stays open until `commit` or
//! `reset`, matching the client-library behaviour the pool is written for.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dbpool_types::{Params, Row, Value};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, ErrorCode, OpenFlags};

use crate::driver::{ConnectTarget, Cursor, Driver, DriverConnection, DriverError, DriverErrorKind};
use crate::dsn::Dsn;
use crate::statement::Statement;

/// Opens SQLite files named after the descriptor's database identifier.
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    root: PathBuf,
    busy_timeout_ms: u64,
}

impl SqliteDriver {
    /// Creates a driver that keeps its database files under `root`.
    ///
    /// The directory must already exist.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            busy_timeout_ms: 5_000,
        }
    }

    /// Sets the per-connection busy timeout.
    pub fn with_busy_timeout_ms(mut self, busy_timeout_ms: u64) -> Self {
        self.busy_timeout_ms = busy_timeout_ms;
        self
    }

    /// Directory holding the database files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File that backs the database named by `dsn`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverErrorKind::Unreachable`] if the identifier cannot be
    /// used as a file name.
    pub fn database_path(&self, dsn: &Dsn) -> Result<PathBuf, DriverError> {
        let id = dsn.database().as_str();
        if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
            return Err(DriverError::new(
                DriverErrorKind::Unreachable,
                format!("database identifier {id:?} is not a valid file name"),
            ));
        }
        Ok(self.root.join(format!("{id}.db")))
    }
}

impl Driver for SqliteDriver {
    type Connection = SqliteConnection;

    fn connect(&self, target: &ConnectTarget) -> Result<SqliteConnection, DriverError> {
        let path = self.database_path(&target.dsn)?;
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&path, flags).map_err(map_error)?;
        conn.busy_timeout(Duration::from_millis(self.busy_timeout_ms))
            .map_err(map_error)?;

        // In-memory databases report "memory", which is acceptable.
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))
            .map_err(map_error)?;
        if journal_mode != "wal" && journal_mode != "memory" {
            return Err(DriverError::new(
                DriverErrorKind::Unreachable,
                format!("failed to set WAL journal mode, got: {journal_mode}"),
            ));
        }
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(map_error)?;

        tracing::debug!(
            path = %path.display(),
            username = %target.username,
            "opened sqlite connection"
        );

        Ok(SqliteConnection { conn })
    }
}

/// A pooled SQLite connection.
#[derive(Debug)]
pub struct SqliteConnection {
    conn: Connection,
}

impl DriverConnection for SqliteConnection {
    type Cursor<'c> = SqliteCursor<'c>;

    fn cursor(&mut self) -> Result<SqliteCursor<'_>, DriverError> {
        Ok(SqliteCursor {
            conn: &self.conn,
            rows: VecDeque::new(),
        })
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT").map_err(map_error)?;
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<(), DriverError> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK").map_err(map_error)?;
        }
        Ok(())
    }

    fn ping(&mut self) -> Result<(), DriverError> {
        self.conn
            .query_row("SELECT 1", [], |_| Ok(()))
            .map_err(map_error)
    }
}

/// Statement runner over a borrowed [`SqliteConnection`].
#[derive(Debug)]
pub struct SqliteCursor<'c> {
    conn: &'c Connection,
    rows: VecDeque<Row>,
}

impl SqliteCursor<'_> {
    fn begin(&self) -> Result<(), DriverError> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN").map_err(map_error)?;
        }
        Ok(())
    }
}

impl Cursor for SqliteCursor<'_> {
    fn execute(&mut self, statement: &Statement, params: &Params) -> Result<(), DriverError> {
        self.rows.clear();
        self.begin()?;

        let conn = self.conn;
        let mut stmt = conn.prepare(statement.text()).map_err(map_error)?;
        bind(&mut stmt, params)?;

        let columns = stmt.column_count();
        if columns == 0 {
            stmt.raw_execute().map_err(map_error)?;
            return Ok(());
        }

        let mut rows = stmt.raw_query();
        while let Some(row) = rows.next().map_err(map_error)? {
            self.rows.push_back(read_row(row, columns)?);
        }
        Ok(())
    }

    fn fetch_first(
        &mut self,
        statement: &Statement,
        params: &Params,
    ) -> Result<Option<Row>, DriverError> {
        self.rows.clear();
        self.begin()?;

        let conn = self.conn;
        let mut stmt = conn.prepare(statement.text()).map_err(map_error)?;
        bind(&mut stmt, params)?;

        let columns = stmt.column_count();
        if columns == 0 {
            stmt.raw_execute().map_err(map_error)?;
            return Ok(None);
        }

        let mut rows = stmt.raw_query();
        let first = match rows.next().map_err(map_error)? {
            Some(row) => Some(read_row(row, columns)?),
            None => None,
        };
        Ok(first)
    }

    fn execute_many(
        &mut self,
        statement: &Statement,
        batches: &[Params],
    ) -> Result<(), DriverError> {
        self.rows.clear();
        self.begin()?;

        let conn = self.conn;
        let mut stmt = conn.prepare(statement.text()).map_err(map_error)?;
        let returns_rows = stmt.column_count() > 0;
        for params in batches {
            bind(&mut stmt, params)?;
            if returns_rows {
                let mut rows = stmt.raw_query();
                while rows.next().map_err(map_error)?.is_some() {}
            } else {
                stmt.raw_execute().map_err(map_error)?;
            }
        }
        Ok(())
    }

    fn fetch_one(&mut self) -> Result<Option<Row>, DriverError> {
        Ok(self.rows.pop_front())
    }

    fn fetch_all(&mut self) -> Result<Vec<Row>, DriverError> {
        Ok(self.rows.drain(..).collect())
    }
}

fn bind(stmt: &mut rusqlite::Statement<'_>, params: &Params) -> Result<(), DriverError> {
    for index in 1..=stmt.parameter_count() {
        let value = match params {
            Params::None => None,
            Params::Positional(values) => values.get(index - 1),
            Params::Named(_) => stmt
                .parameter_name(index)
                .map(|name| name.trim_start_matches(|c| matches!(c, ':' | '@' | '$')))
                .and_then(|name| params.get_named(name)),
        }
        .ok_or_else(|| DriverError::statement(format!("no value bound for parameter {index}")))?;

        stmt.raw_bind_parameter(index, to_sql(value))
            .map_err(map_error)?;
    }
    Ok(())
}

fn read_row(row: &rusqlite::Row<'_>, columns: usize) -> Result<Row, DriverError> {
    let mut values = Vec::with_capacity(columns);
    for index in 0..columns {
        values.push(from_sql(row.get_ref(index).map_err(map_error)?));
    }
    Ok(Row::new(values))
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(v) => SqlValue::Integer(*v),
        Value::Float(v) => SqlValue::Real(*v),
        Value::Text(v) => SqlValue::Text(v.clone()),
        Value::Blob(v) => SqlValue::Blob(v.clone()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Float(v),
        ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => Value::Blob(v.to_vec()),
    }
}

fn map_error(err: rusqlite::Error) -> DriverError {
    let kind = match &err {
        rusqlite::Error::SqliteFailure(e, _) => match e.code {
            ErrorCode::CannotOpen => DriverErrorKind::Unreachable,
            ErrorCode::PermissionDenied => DriverErrorKind::Authentication,
            ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt | ErrorCode::SystemIoFailure => {
                DriverErrorKind::ConnectionLost
            }
            _ => DriverErrorKind::Statement,
        },
        _ => DriverErrorKind::Statement,
    };
    DriverError::new(kind, err.to_string())
}
