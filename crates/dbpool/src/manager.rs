//! The connection pool manager.
//!
//! Callers never hold a connection. Every operation checks one out, opens a
//! cursor, runs the statement, commits, and hands the connection back
//! through a drop guard, so the lease ends on success, on error, and while
//! unwinding from a panic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use dbpool_types::{Params, Row};
use r2d2::{ManageConnection, Pool, PooledConnection};

use crate::config::PoolConfig;
use crate::driver::{ConnectTarget, Cursor, Driver, DriverConnection, DriverError};
use crate::dsn::Dsn;
use crate::error::{InitError, PoolError};
use crate::pool::{build_pool, DriverManager};
use crate::statement::Statement;

/// How long one blocking wait lasts before the closed flag is rechecked.
const WAIT_SLICE: Duration = Duration::from_secs(1);

/// A point-in-time view of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Open physical connections.
    pub connections: u32,
    /// Connections available for checkout.
    pub idle: u32,
    /// Connections currently leased to an operation.
    pub leased: u32,
    /// Configured minimum.
    pub min_size: u32,
    /// Configured maximum.
    pub max_size: u32,
    /// Configured growth step.
    pub increment: u32,
    /// Whether [`ConnectionPoolManager::shutdown`] has run.
    pub closed: bool,
}

/// Owns a bounded pool of connections and runs statements on it.
///
/// The manager is `Sync`; share it between threads by reference or `Arc`.
/// Calls block until a connection is idle unless the config sets an
/// acquire timeout. Dropping the manager shuts the pool down.
pub struct ConnectionPoolManager<D: Driver> {
    dsn: Dsn,
    min_size: u32,
    max_size: u32,
    increment: u32,
    acquire_timeout: Option<Duration>,
    closed: Arc<AtomicBool>,
    pool: RwLock<Option<Pool<DriverManager<D>>>>,
}

impl<D: Driver> ConnectionPoolManager<D> {
    /// Validates `config`, connects once to prove the database is reachable,
    /// then opens `min_size` connections.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Init`] on an invalid config (checked before any
    /// connection attempt), an unreachable database, rejected credentials,
    /// or if the initial connections are not open within `init_timeout_ms`.
    pub fn new(config: PoolConfig, driver: D) -> Result<Self, PoolError> {
        config.validate()?;
        let dsn = Dsn::from_config(&config)?;

        let target = ConnectTarget {
            dsn: dsn.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        };
        let closed = Arc::new(AtomicBool::new(false));
        let manager = DriverManager::new(driver, target, &config.session_init, Arc::clone(&closed));

        // A bad address or password fails here once instead of being
        // retried by the pool until init_timeout.
        let first = manager.connect().map_err(InitError::Connect)?;
        drop(first);

        let pool = build_pool(manager, &config).map_err(InitError::Build)?;

        tracing::info!(
            host = dsn.host(),
            port = dsn.port(),
            database = dsn.database().as_str(),
            identifier = dsn.database().kind(),
            username = %config.username,
            min_size = config.min_size,
            max_size = config.max_size,
            increment = config.increment,
            "connection pool ready"
        );

        Ok(Self {
            dsn,
            min_size: config.min_size,
            max_size: config.max_size,
            increment: config.increment,
            acquire_timeout: config.acquire_timeout(),
            closed,
            pool: RwLock::new(Some(pool)),
        })
    }

    /// Runs a statement and commits.
    ///
    /// # Errors
    ///
    /// [`PoolError::Bind`], [`PoolError::Statement`],
    /// [`PoolError::ConnectionLost`], [`PoolError::Acquire`], or
    /// [`PoolError::Closed`].
    pub fn execute(
        &self,
        statement: impl Into<Statement>,
        params: impl Into<Params>,
    ) -> Result<(), PoolError> {
        let statement = statement.into();
        let params = params.into();
        statement.check(&params)?;

        self.with_cursor("execute", |cursor| cursor.execute(&statement, &params))
    }

    /// Runs a statement once per parameter batch on one connection, then
    /// commits. An empty batch list does nothing.
    ///
    /// # Errors
    ///
    /// As [`execute`](Self::execute). Every batch is checked before the
    /// connection is leased.
    pub fn execute_many<I, P>(
        &self,
        statement: impl Into<Statement>,
        batches: I,
    ) -> Result<(), PoolError>
    where
        I: IntoIterator<Item = P>,
        P: Into<Params>,
    {
        let statement = statement.into();
        let batches: Vec<Params> = batches.into_iter().map(Into::into).collect();
        for params in &batches {
            statement.check(params)?;
        }

        if batches.is_empty() {
            return if self.is_closed() {
                Err(PoolError::Closed)
            } else {
                Ok(())
            };
        }

        self.with_cursor("execute_many", |cursor| {
            cursor.execute_many(&statement, &batches)
        })
    }

    /// Runs a query and returns its first row, or `None` when it matched
    /// nothing.
    ///
    /// # Errors
    ///
    /// As [`execute`](Self::execute).
    pub fn fetch_one(
        &self,
        statement: impl Into<Statement>,
        params: impl Into<Params>,
    ) -> Result<Option<Row>, PoolError> {
        let statement = statement.into();
        let params = params.into();
        statement.check(&params)?;

        self.with_cursor("fetch_one", |cursor| cursor.fetch_first(&statement, &params))
    }

    /// Runs a query and returns every row.
    ///
    /// # Errors
    ///
    /// As [`execute`](Self::execute).
    pub fn fetch_all(
        &self,
        statement: impl Into<Statement>,
        params: impl Into<Params>,
    ) -> Result<Vec<Row>, PoolError> {
        let statement = statement.into();
        let params = params.into();
        statement.check(&params)?;

        self.with_cursor("fetch_all", |cursor| {
            cursor.execute(&statement, &params)?;
            cursor.fetch_all()
        })
    }

    /// The descriptor every connection uses.
    pub fn dsn(&self) -> &Dsn {
        &self.dsn
    }

    /// Current connection counts.
    pub fn status(&self) -> PoolStatus {
        let (connections, idle, closed) = match self.handle() {
            Ok(pool) => {
                let state = pool.state();
                (state.connections, state.idle_connections, false)
            }
            Err(_) => (0, 0, true),
        };

        PoolStatus {
            connections,
            idle,
            leased: connections.saturating_sub(idle),
            min_size: self.min_size,
            max_size: self.max_size,
            increment: self.increment,
            closed,
        }
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the pool. Idle connections are closed on the calling thread
    /// before this returns; leased ones close when their operation finishes.
    /// Later calls do nothing.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let pool = self
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(pool) = pool else {
            tracing::debug!("connection pool already shut down");
            return;
        };

        let state = pool.state();
        // Each checked-out connection reports broken on return and is closed
        // by `r2d2` right here.
        let mut drained = 0u32;
        while let Some(conn) = pool.try_get() {
            drop(conn);
            drained += 1;
        }

        tracing::info!(
            connections = state.connections,
            idle_closed = drained,
            leased = state.connections.saturating_sub(state.idle_connections),
            "shut down connection pool"
        );
    }

    fn handle(&self) -> Result<Pool<DriverManager<D>>, PoolError> {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(PoolError::Closed)
    }

    fn checkout(&self) -> Result<PooledConnection<DriverManager<D>>, PoolError> {
        let pool = self.handle()?;

        if let Some(timeout) = self.acquire_timeout {
            let conn = pool
                .get_timeout(timeout)
                .map_err(|source| PoolError::Acquire { timeout, source })?;
            return self.unless_closed(conn);
        }

        let started = Instant::now();
        loop {
            match pool.get_timeout(WAIT_SLICE) {
                Ok(conn) => return self.unless_closed(conn),
                Err(err) => {
                    if self.is_closed() {
                        return Err(PoolError::Closed);
                    }
                    tracing::debug!(
                        waited_ms = started.elapsed().as_millis() as u64,
                        error = %err,
                        "still waiting for an idle connection"
                    );
                }
            }
        }
    }

    /// A waiter can win a connection after `shutdown` ran. Dropping it here
    /// closes it instead of running the statement.
    fn unless_closed(
        &self,
        conn: PooledConnection<DriverManager<D>>,
    ) -> Result<PooledConnection<DriverManager<D>>, PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        Ok(conn)
    }

    fn with_cursor<T>(
        &self,
        operation: &'static str,
        op: impl FnOnce(&mut dyn Cursor) -> Result<T, DriverError>,
    ) -> Result<T, PoolError> {
        let started = Instant::now();
        let mut lease = LeasedConnection::new(self.checkout()?);
        let result = lease.run(op);
        drop(lease);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(value) => {
                tracing::debug!(operation, elapsed_ms, "statement committed");
                Ok(value)
            }
            Err(err) => {
                tracing::debug!(operation, elapsed_ms, error = %err, "statement failed");
                Err(err.into())
            }
        }
    }
}

impl<D: Driver> Drop for ConnectionPoolManager<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<D: Driver> std::fmt::Debug for ConnectionPoolManager<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPoolManager")
            .field("dsn", &self.dsn)
            .field("status", &self.status())
            .finish()
    }
}

/// One checked-out connection for the span of a single operation.
///
/// If the operation does not reach its commit, dropping the lease asks the
/// driver to reset the connection. A connection that lost its link or
/// failed to reset is discarded instead of returned.
struct LeasedConnection<D: Driver> {
    conn: PooledConnection<DriverManager<D>>,
    committed: bool,
}

impl<D: Driver> LeasedConnection<D> {
    fn new(conn: PooledConnection<DriverManager<D>>) -> Self {
        Self {
            conn,
            committed: false,
        }
    }

    fn run<T>(
        &mut self,
        op: impl FnOnce(&mut dyn Cursor) -> Result<T, DriverError>,
    ) -> Result<T, DriverError> {
        let result = Self::cursor_then_commit(&mut self.conn.conn, op);
        match &result {
            Ok(_) => self.committed = true,
            Err(err) if err.is_connection_lost() => self.conn.broken = true,
            Err(_) => {}
        }
        result
    }

    fn cursor_then_commit<T>(
        conn: &mut D::Connection,
        op: impl FnOnce(&mut dyn Cursor) -> Result<T, DriverError>,
    ) -> Result<T, DriverError> {
        let value = {
            let mut cursor = conn.cursor()?;
            let cursor: &mut dyn Cursor = &mut cursor;
            op(cursor)?
        };
        conn.commit()?;
        Ok(value)
    }
}

impl<D: Driver> Drop for LeasedConnection<D> {
    fn drop(&mut self) {
        if self.committed || self.conn.broken {
            return;
        }
        if let Err(err) = self.conn.conn.reset() {
            tracing::warn!(error = %err, "failed to reset connection, discarding it");
            self.conn.broken = true;
        }
    }
}
