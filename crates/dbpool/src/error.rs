//! Error types for the pool manager.

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::driver::{DriverError, DriverErrorKind};
use crate::statement::BindError;

/// Why a pool could not be constructed. Never retried.
#[derive(Debug, Error)]
pub enum InitError {
    /// The config was rejected before any connection was attempted.
    #[error("invalid pool configuration: {0}")]
    Config(#[from] ConfigError),

    /// The first connection attempt failed: unreachable server or
    /// rejected credentials.
    #[error("failed to connect to database: {0}")]
    Connect(#[source] DriverError),

    /// The initial connections could not all be opened in time.
    #[error("failed to open initial pool connections: {0}")]
    Build(#[from] r2d2::Error),
}

/// Errors surfaced by [`ConnectionPoolManager`](crate::ConnectionPoolManager).
#[derive(Debug, Error)]
pub enum PoolError {
    /// Pool construction failed.
    #[error(transparent)]
    Init(#[from] InitError),

    /// The parameters do not fit the statement's placeholders. Raised
    /// before a connection is checked out.
    #[error("parameter binding rejected: {0}")]
    Bind(#[from] BindError),

    /// No connection became idle within the configured acquire timeout.
    #[error("timed out after {timeout:?} waiting for an idle connection")]
    Acquire {
        /// The configured wait bound.
        timeout: Duration,
        /// The pool's report.
        #[source]
        source: r2d2::Error,
    },

    /// The server rejected the statement.
    #[error("statement failed: {0}")]
    Statement(#[source] DriverError),

    /// The connection dropped mid-operation, or its session was no longer
    /// accepted by the server. It was discarded.
    #[error("connection lost: {0}")]
    ConnectionLost(#[source] DriverError),

    /// The pool has been shut down.
    #[error("connection pool is shut down")]
    Closed,
}

impl From<DriverError> for PoolError {
    fn from(err: DriverError) -> Self {
        match err.kind() {
            DriverErrorKind::ConnectionLost
            | DriverErrorKind::Unreachable
            | DriverErrorKind::Authentication => Self::ConnectionLost(err),
            DriverErrorKind::Statement => Self::Statement(err),
        }
    }
}

impl From<ConfigError> for PoolError {
    fn from(err: ConfigError) -> Self {
        Self::Init(InitError::Config(err))
    }
}
