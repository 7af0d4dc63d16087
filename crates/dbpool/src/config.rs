//! Pool configuration and validation.

use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Everything needed to reach the database and size the pool.
///
/// Exactly one database identifier is used: `service_name` when it is set
/// and non-empty, otherwise `sid`. Fixed-size pools (`min_size == max_size`)
/// are the default and the recommended shape.
#[derive(Clone, Deserialize)]
pub struct PoolConfig {
    /// Database host name or address.
    pub host: String,

    /// Listener port.
    pub port: u16,

    /// Account used for every pooled connection.
    pub username: String,

    /// Password for `username`.
    pub password: String,

    /// System identifier of the database instance.
    #[serde(default)]
    pub sid: Option<String>,

    /// Service name of the database. Wins over `sid` when both are set.
    #[serde(default)]
    pub service_name: Option<String>,

    /// Connections opened at construction and kept open.
    #[serde(default = "default_pool_size")]
    pub min_size: u32,

    /// Upper bound on open connections.
    #[serde(default = "default_pool_size")]
    pub max_size: u32,

    /// Growth step between `min_size` and `max_size`.
    #[serde(default = "default_increment")]
    pub increment: u32,

    /// How long a checkout may wait for an idle connection. Waits forever
    /// when unset.
    #[serde(default)]
    pub acquire_timeout_ms: Option<u64>,

    /// How long construction waits for the first `min_size` connections.
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,

    /// Ping each connection before handing it out.
    #[serde(default = "default_ping_on_checkout")]
    pub ping_on_checkout: bool,

    /// Idle time after which connections above `min_size` are closed.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,

    /// Statements run, then committed, on every new physical connection.
    #[serde(default)]
    pub session_init: Vec<String>,
}

fn default_pool_size() -> u32 {
    5
}

fn default_increment() -> u32 {
    1
}

fn default_init_timeout_ms() -> u64 {
    30_000
}

fn default_ping_on_checkout() -> bool {
    true
}

impl PoolConfig {
    /// Creates a config with default sizing and no database identifier.
    ///
    /// Call [`with_service_name`](Self::with_service_name) or
    /// [`with_sid`](Self::with_sid) before building a pool from it.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            sid: None,
            service_name: None,
            min_size: default_pool_size(),
            max_size: default_pool_size(),
            increment: default_increment(),
            acquire_timeout_ms: None,
            init_timeout_ms: default_init_timeout_ms(),
            ping_on_checkout: default_ping_on_checkout(),
            idle_timeout_secs: None,
            session_init: Vec::new(),
        }
    }

    /// Sets the service name.
    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    /// Sets the system identifier.
    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    /// Sets the pool size bounds and growth step.
    pub fn with_sizes(mut self, min_size: u32, max_size: u32, increment: u32) -> Self {
        self.min_size = min_size;
        self.max_size = max_size;
        self.increment = increment;
        self
    }

    /// Sets a fixed pool size (`min_size == max_size == size`).
    pub fn with_fixed_size(self, size: u32) -> Self {
        self.with_sizes(size, size, 1)
    }

    /// Bounds how long a checkout waits for an idle connection.
    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = Some(timeout_ms);
        self
    }

    /// Sets how long construction waits for the initial connections.
    pub fn with_init_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.init_timeout_ms = timeout_ms;
        self
    }

    /// Appends a statement run on every new physical connection.
    pub fn with_session_init(mut self, statement: impl Into<String>) -> Self {
        self.session_init.push(statement.into());
        self
    }

    /// Returns `true` when the pool never grows or shrinks.
    pub fn is_fixed_size(&self) -> bool {
        self.min_size == self.max_size
    }

    /// Checkout wait bound, if any.
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }

    /// Initial connection wait bound.
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    /// Idle shrink threshold, if any.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    /// Checks the config without contacting the database.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if non_empty(&self.service_name).is_none() && non_empty(&self.sid).is_none() {
            return Err(ConfigError::MissingIdentifier);
        }
        if self.max_size == 0 {
            return Err(ConfigError::ZeroMaxSize);
        }
        if self.min_size > self.max_size {
            return Err(ConfigError::InvalidSizing {
                min_size: self.min_size,
                max_size: self.max_size,
            });
        }
        if self.increment == 0 {
            return Err(ConfigError::ZeroIncrement);
        }
        if self.init_timeout_ms == 0 {
            return Err(ConfigError::ZeroInitTimeout);
        }
        if !self.is_fixed_size() && self.increment > self.max_size - self.min_size {
            return Err(ConfigError::IncrementTooLarge {
                increment: self.increment,
                headroom: self.max_size - self.min_size,
            });
        }
        Ok(())
    }
}

/// Treats `Some("")` and whitespace-only strings as absent.
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("sid", &self.sid)
            .field("service_name", &self.service_name)
            .field("min_size", &self.min_size)
            .field("max_size", &self.max_size)
            .field("increment", &self.increment)
            .field("acquire_timeout_ms", &self.acquire_timeout_ms)
            .field("init_timeout_ms", &self.init_timeout_ms)
            .field("ping_on_checkout", &self.ping_on_checkout)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("session_init", &self.session_init)
            .finish()
    }
}

/// Reasons a [`PoolConfig`] is rejected before any connection is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Neither `service_name` nor `sid` was given.
    #[error("one of service_name or sid must be set")]
    MissingIdentifier,

    /// The host is empty.
    #[error("host must not be empty")]
    EmptyHost,

    /// `max_size` is zero.
    #[error("max_size must be at least 1")]
    ZeroMaxSize,

    /// `min_size` exceeds `max_size`.
    #[error("min_size ({min_size}) cannot exceed max_size ({max_size})")]
    InvalidSizing {
        /// Configured minimum.
        min_size: u32,
        /// Configured maximum.
        max_size: u32,
    },

    /// `increment` is zero.
    #[error("increment must be at least 1")]
    ZeroIncrement,

    /// `init_timeout_ms` is zero.
    #[error("init_timeout_ms must be at least 1")]
    ZeroInitTimeout,

    /// `increment` is larger than the room between `min_size` and `max_size`.
    #[error("increment ({increment}) exceeds the {headroom} connections between min_size and max_size")]
    IncrementTooLarge {
        /// Configured increment.
        increment: u32,
        /// `max_size - min_size`.
        headroom: u32,
    },
}
