//! Managed database connection pool.
//!
//! Wraps a bounded `r2d2` pool behind four calls: [`execute`], [`execute_many`],
//! [`fetch_one`], and [`fetch_all`]. Each call leases a connection, opens a
//! cursor, runs the statement, commits, and returns the connection, and the
//! return happens on every exit path. Connections are never handed out.
//!
//! # Design decisions
//!
//! - **Fixed-size pools by default**: `min_size == max_size` connections are
//!   opened at construction. A pool that grows under load adds connection
//!   setup to the moment the database is busiest.
//! - **Blocking checkout**: a call waits for an idle connection for as long
//!   as it takes unless an acquire timeout is configured.
//! - **Commit on success**: every call commits before returning. There is no
//!   transaction that outlives a call.
//! - **Service name over SID**: when both identifiers are configured the
//!   descriptor uses the service name.
//! - **Driver seam**: the pool talks to the database through the [`Driver`]
//!   traits. [`SqliteDriver`] is bundled.
//!
//! [`execute`]: ConnectionPoolManager::execute
//! [`execute_many`]: ConnectionPoolManager::execute_many
//! [`fetch_one`]: ConnectionPoolManager::fetch_one
//! [`fetch_all`]: ConnectionPoolManager::fetch_all

mod config;
mod driver;
mod dsn;
mod error;
mod manager;
mod pool;
mod sqlite;
mod statement;

pub use config::{ConfigError, PoolConfig};
pub use dbpool_types::{Params, Row, Value};
pub use driver::{ConnectTarget, Cursor, Driver, DriverConnection, DriverError, DriverErrorKind};
pub use dsn::{DatabaseId, Dsn};
pub use error::{InitError, PoolError};
pub use manager::{ConnectionPoolManager, PoolStatus};
pub use sqlite::{SqliteConnection, SqliteCursor, SqliteDriver};
pub use statement::{BindError, Placeholder, Statement};
