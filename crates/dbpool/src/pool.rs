//! `r2d2` plumbing: the connection manager adapter and its handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dbpool_types::Params;
use r2d2::event::{AcquireEvent, CheckinEvent, CheckoutEvent, HandleEvent, ReleaseEvent, TimeoutEvent};
use r2d2::{HandleError, ManageConnection, Pool};

use crate::config::PoolConfig;
use crate::driver::{ConnectTarget, Cursor, Driver, DriverConnection, DriverError};
use crate::statement::Statement;

/// A driver connection plus the pool's health flag for it.
pub(crate) struct Managed<C> {
    pub(crate) conn: C,
    /// Set when the connection must not go back to the idle set.
    pub(crate) broken: bool,
}

/// Adapts a [`Driver`] to `r2d2`.
///
/// Once `closed` is set no new connection opens and every connection that
/// comes back to the pool is reported broken, so `r2d2` closes it on the
/// returning thread.
pub(crate) struct DriverManager<D: Driver> {
    driver: D,
    target: ConnectTarget,
    session_init: Vec<Statement>,
    closed: Arc<AtomicBool>,
}

impl<D: Driver> DriverManager<D> {
    pub(crate) fn new(
        driver: D,
        target: ConnectTarget,
        session_init: &[String],
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            driver,
            target,
            session_init: session_init.iter().map(Statement::new).collect(),
            closed,
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<D: Driver> ManageConnection for DriverManager<D> {
    type Connection = Managed<D::Connection>;
    type Error = DriverError;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        if self.is_closed() {
            return Err(DriverError::connection_lost("connection pool is shut down"));
        }
        let mut conn = self.driver.connect(&self.target)?;

        if !self.session_init.is_empty() {
            {
                let mut cursor = conn.cursor()?;
                for statement in &self.session_init {
                    cursor.execute(statement, &Params::None)?;
                }
            }
            conn.commit()?;
        }

        Ok(Managed {
            conn,
            broken: false,
        })
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.conn.ping()
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.broken || self.is_closed()
    }
}

/// Routes background connection failures to `tracing`.
#[derive(Debug)]
struct TracingErrorHandler {
    closed: Arc<AtomicBool>,
}

impl HandleError<DriverError> for TracingErrorHandler {
    fn handle_error(&self, error: DriverError) {
        if self.closed.load(Ordering::Acquire) {
            tracing::debug!(error = %error, "skipped refill of a shut down pool");
            return;
        }
        tracing::warn!(kind = ?error.kind(), error = %error, "pool failed to open a connection");
    }
}

/// Emits connection lifecycle events as `tracing` events.
#[derive(Debug)]
struct TracingEventHandler;

impl HandleEvent for TracingEventHandler {
    fn handle_acquire(&self, event: AcquireEvent) {
        tracing::debug!(conn_id = event.connection_id(), "opened pooled connection");
    }

    fn handle_release(&self, event: ReleaseEvent) {
        tracing::debug!(
            conn_id = event.connection_id(),
            age_ms = event.age().as_millis() as u64,
            "closed pooled connection"
        );
    }

    fn handle_checkout(&self, event: CheckoutEvent) {
        tracing::trace!(
            conn_id = event.connection_id(),
            wait_ms = event.duration().as_millis() as u64,
            "leased connection"
        );
    }

    fn handle_timeout(&self, event: TimeoutEvent) {
        tracing::debug!(
            timeout_ms = event.timeout().as_millis() as u64,
            "timed out waiting for an idle connection"
        );
    }

    fn handle_checkin(&self, event: CheckinEvent) {
        tracing::trace!(
            conn_id = event.connection_id(),
            held_ms = event.duration().as_millis() as u64,
            "returned connection"
        );
    }
}

/// Builds the `r2d2` pool. Blocks until `min_size` connections are open.
///
/// Fixed-size pools never reap: idle timeout and max lifetime are both off.
/// Pools that can grow close connections idle past `idle_timeout`, after
/// which `r2d2` tops the idle set back up to `min_size`.
pub(crate) fn build_pool<D: Driver>(
    manager: DriverManager<D>,
    config: &PoolConfig,
) -> Result<Pool<DriverManager<D>>, r2d2::Error> {
    let closed = Arc::clone(&manager.closed);
    let idle_timeout = if config.is_fixed_size() {
        None
    } else {
        config.idle_timeout()
    };

    Pool::builder()
        .max_size(config.max_size)
        .min_idle(Some(config.min_size))
        .connection_timeout(config.init_timeout())
        .test_on_check_out(config.ping_on_checkout)
        .idle_timeout(idle_timeout)
        .max_lifetime(None)
        .error_handler(Box::new(TracingErrorHandler { closed }))
        .event_handler(Box::new(TracingEventHandler))
        .build(manager)
}
