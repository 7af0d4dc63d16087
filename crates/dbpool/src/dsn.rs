//! Connection descriptor construction.

use std::fmt;

use crate::config::{non_empty, ConfigError, PoolConfig};

/// Which database on the listener a descriptor points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseId {
    /// A service name.
    ServiceName(String),
    /// A system identifier.
    Sid(String),
}

impl DatabaseId {
    /// The identifier text.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ServiceName(v) | Self::Sid(v) => v,
        }
    }

    /// Descriptor key for this identifier kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServiceName(_) => "SERVICE_NAME",
            Self::Sid(_) => "SID",
        }
    }
}

/// A TCP connection descriptor: host, port, and one database identifier.
///
/// Renders in the `(DESCRIPTION=...)` form accepted by the client library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    host: String,
    port: u16,
    id: DatabaseId,
}

impl Dsn {
    /// Creates a descriptor from its parts.
    pub fn new(host: impl Into<String>, port: u16, id: DatabaseId) -> Self {
        Self {
            host: host.into(),
            port,
            id,
        }
    }

    /// Builds the descriptor for a config. A non-empty `service_name` is
    /// used when present; `sid` only when it is not.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingIdentifier`] when neither is set.
    pub fn from_config(config: &PoolConfig) -> Result<Self, ConfigError> {
        let id = if let Some(service_name) = non_empty(&config.service_name) {
            DatabaseId::ServiceName(service_name.to_string())
        } else if let Some(sid) = non_empty(&config.sid) {
            DatabaseId::Sid(sid.to_string())
        } else {
            return Err(ConfigError::MissingIdentifier);
        };

        Ok(Self::new(config.host.trim(), config.port, id))
    }

    /// Host part.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port part.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Database identifier.
    pub fn database(&self) -> &DatabaseId {
        &self.id
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(DESCRIPTION=(ADDRESS=(PROTOCOL=TCP)(HOST={})(PORT={}))(CONNECT_DATA=({}={})))",
            self.host,
            self.port,
            self.id.kind(),
            self.id.as_str()
        )
    }
}
