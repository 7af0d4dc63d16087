//! The seam between the pool manager and a concrete database client.
//!
//! A [`Driver`] opens physical connections, a [`DriverConnection`] hands out
//! cursors and owns the transaction, and a [`Cursor`] runs one statement at
//! a time and buffers its rows. The pool manager only ever talks to these
//! traits.

use dbpool_types::{Params, Row};
use thiserror::Error;

use crate::dsn::Dsn;
use crate::statement::Statement;

/// How a driver failure should be treated by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// The server rejected the statement: bad SQL, constraint violation,
    /// type mismatch. The connection stays usable.
    Statement,
    /// The link to the server dropped. The connection is discarded.
    ConnectionLost,
    /// The server could not be reached.
    Unreachable,
    /// The server refused the credentials. A connection that reports this
    /// mid-operation is discarded.
    Authentication,
}

/// An error reported by a driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DriverError {
    kind: DriverErrorKind,
    message: String,
}

impl DriverError {
    /// Creates an error of the given kind.
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a [`DriverErrorKind::Statement`] error.
    pub fn statement(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Statement, message)
    }

    /// Shorthand for a [`DriverErrorKind::ConnectionLost`] error.
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::ConnectionLost, message)
    }

    /// The failure class.
    pub fn kind(&self) -> DriverErrorKind {
        self.kind
    }

    /// Driver-supplied message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns `true` when the connection that produced this error must not
    /// be reused.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self.kind,
            DriverErrorKind::ConnectionLost
                | DriverErrorKind::Unreachable
                | DriverErrorKind::Authentication
        )
    }
}

/// Where and as whom to connect.
#[derive(Clone)]
pub struct ConnectTarget {
    /// Connection descriptor.
    pub dsn: Dsn,
    /// Account name.
    pub username: String,
    /// Account password.
    pub password: String,
}

impl std::fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectTarget")
            .field("dsn", &self.dsn)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Opens physical connections.
pub trait Driver: Send + Sync + 'static {
    /// The connection type this driver produces.
    type Connection: DriverConnection;

    /// Opens one physical connection.
    ///
    /// # Errors
    ///
    /// Returns [`DriverErrorKind::Unreachable`] or
    /// [`DriverErrorKind::Authentication`] when no session can be opened.
    fn connect(&self, target: &ConnectTarget) -> Result<Self::Connection, DriverError>;
}

/// One physical connection with an implicit transaction.
pub trait DriverConnection: Send + 'static {
    /// Cursor type borrowed from this connection.
    type Cursor<'c>: Cursor
    where
        Self: 'c;

    /// Opens a cursor. It is closed when dropped.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] if the connection cannot provide a cursor.
    fn cursor(&mut self) -> Result<Self::Cursor<'_>, DriverError>;

    /// Commits the current transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] if the commit fails.
    fn commit(&mut self) -> Result<(), DriverError>;

    /// Returns the connection to a clean state after an operation that did
    /// not reach its commit. The default does nothing.
    ///
    /// # Errors
    ///
    /// An error here causes the pool to discard the connection.
    fn reset(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    /// Round-trips to the server to prove the connection is alive.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] if the connection is unusable.
    fn ping(&mut self) -> Result<(), DriverError>;
}

/// Runs statements on a leased connection and buffers their results.
pub trait Cursor {
    /// Executes one statement. Any rows it produces are buffered for
    /// [`fetch_one`](Self::fetch_one) / [`fetch_all`](Self::fetch_all).
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] if execution fails.
    fn execute(&mut self, statement: &Statement, params: &Params) -> Result<(), DriverError>;

    /// Executes one statement once per parameter batch.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] at the first failing batch.
    fn execute_many(&mut self, statement: &Statement, batches: &[Params])
        -> Result<(), DriverError>;

    /// Executes a query and reads only its first row. Later rows are never
    /// produced, so an error in one of them does not surface.
    ///
    /// The default buffers the whole result through
    /// [`execute`](Self::execute); drivers that can stop early should.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] if execution or the first row fails.
    fn fetch_first(
        &mut self,
        statement: &Statement,
        params: &Params,
    ) -> Result<Option<Row>, DriverError> {
        self.execute(statement, params)?;
        self.fetch_one()
    }

    /// Takes the next buffered row.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] if the row cannot be read.
    fn fetch_one(&mut self) -> Result<Option<Row>, DriverError>;

    /// Takes every remaining buffered row.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] if the rows cannot be read.
    fn fetch_all(&mut self) -> Result<Vec<Row>, DriverError>;
}
