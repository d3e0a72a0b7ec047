//! Database connection configuration.
//!
//! Replaces loosely-typed config mappings with an explicit struct: the five
//! required fields are enforced by [`DbConfigBuilder::build`], so a config
//! that reaches the registry has already passed the shape check and any
//! remaining validation failure happens before network activity.
//!
//! Configs are identified by [`ConfigKey`], a deterministic hash of their
//! contents: equal configs always resolve to the same pool manager, and any
//! field difference describes a distinct pool.

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MIN_CONNECTIONS: u32 = 2;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport security mode requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    Allow,
    Prefer,
    #[default]
    Require,
    VerifyCa,
    VerifyFull,
}

impl FromStr for SslMode {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disable" => Ok(Self::Disable),
            "allow" => Ok(Self::Allow),
            "prefer" => Ok(Self::Prefer),
            "require" => Ok(Self::Require),
            "verify-ca" => Ok(Self::VerifyCa),
            "verify-full" => Ok(Self::VerifyFull),
            other => Err(DbError::invalid_config(format!("unknown sslmode '{other}'"))),
        }
    }
}

impl std::fmt::Display for SslMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disable => "disable",
            Self::Allow => "allow",
            Self::Prefer => "prefer",
            Self::Require => "require",
            Self::VerifyCa => "verify-ca",
            Self::VerifyFull => "verify-full",
        };
        write!(f, "{s}")
    }
}

/// Shape of the rows a cursor produces.
///
/// `Positional` rows expose values by index only; `Mapped` rows also carry
/// column names for by-name access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorShape {
    #[default]
    Positional,
    Mapped,
}

/// Connection pool sizing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolOptions {
    /// Connections opened eagerly when a pool is built (default: 2).
    pub min_connections: u32,
    /// Ceiling on idle plus checked-out connections (default: 5).
    pub max_connections: u32,
    /// How long `acquire` waits for a free checkout slot before reporting
    /// pool exhaustion (default: 30s).
    pub acquire_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            min_connections: DEFAULT_MIN_CONNECTIONS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }
}

impl PoolOptions {
    /// Validate pool options.
    pub fn validate(&self) -> DbResult<()> {
        if self.max_connections == 0 {
            return Err(DbError::invalid_config(
                "max_connections must be greater than 0",
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(DbError::invalid_config(format!(
                "min_connections ({}) cannot exceed max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }
}

/// Deterministic identity derived from a config's contents, used as the
/// registry lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConfigKey(u64);

/// A database connection configuration.
///
/// Immutable once registered: the registry keys pools by [`ConfigKey`], so
/// mutating a clone after registration simply describes a different pool.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    /// Sensitive - never serialized, redacted from Debug output.
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub sslmode: SslMode,
    /// Run a liveness probe on every checkout before handing the connection
    /// to a session (default: true).
    #[serde(default = "default_pre_ping")]
    pub pre_ping: bool,
    #[serde(default)]
    pub cursor_shape: CursorShape,
    #[serde(default)]
    pub pool: PoolOptions,
}

fn default_pre_ping() -> bool {
    true
}

impl DbConfig {
    /// Start building a configuration.
    pub fn builder() -> DbConfigBuilder {
        DbConfigBuilder::default()
    }

    /// The registry key for this configuration. Two configs with identical
    /// field contents yield the same key.
    pub fn key(&self) -> ConfigKey {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        ConfigKey(hasher.finish())
    }

    /// Re-check field contents. Catches configs deserialized from external
    /// sources that bypassed the builder.
    pub fn validate(&self) -> DbResult<()> {
        for (field, value) in [
            ("host", &self.host),
            ("dbname", &self.dbname),
            ("user", &self.user),
        ] {
            if value.is_empty() {
                return Err(DbError::invalid_config(format!(
                    "field '{field}' must not be empty"
                )));
            }
        }
        if self.port == 0 {
            return Err(DbError::invalid_config("field 'port' must not be 0"));
        }
        self.pool.validate()
    }
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("sslmode", &self.sslmode)
            .field("pre_ping", &self.pre_ping)
            .field("cursor_shape", &self.cursor_shape)
            .field("pool", &self.pool)
            .finish()
    }
}

/// Builder enforcing the required fields at construction time.
#[derive(Debug, Clone)]
pub struct DbConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    dbname: Option<String>,
    user: Option<String>,
    password: Option<String>,
    sslmode: SslMode,
    pre_ping: bool,
    cursor_shape: CursorShape,
    pool: PoolOptions,
}

impl Default for DbConfigBuilder {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            dbname: None,
            user: None,
            password: None,
            sslmode: SslMode::default(),
            pre_ping: true,
            cursor_shape: CursorShape::default(),
            pool: PoolOptions::default(),
        }
    }
}

impl DbConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn dbname(mut self, dbname: impl Into<String>) -> Self {
        self.dbname = Some(dbname.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn sslmode(mut self, sslmode: SslMode) -> Self {
        self.sslmode = sslmode;
        self
    }

    pub fn pre_ping(mut self, pre_ping: bool) -> Self {
        self.pre_ping = pre_ping;
        self
    }

    pub fn cursor_shape(mut self, cursor_shape: CursorShape) -> Self {
        self.cursor_shape = cursor_shape;
        self
    }

    pub fn pool(mut self, pool: PoolOptions) -> Self {
        self.pool = pool;
        self
    }

    /// Finish the configuration. Fails with [`DbError::InvalidConfig`] if a
    /// required field is missing or a provided value is unusable.
    pub fn build(self) -> DbResult<DbConfig> {
        let config = DbConfig {
            host: self.host.ok_or_else(|| DbError::missing_field("host"))?,
            port: self.port.ok_or_else(|| DbError::missing_field("port"))?,
            dbname: self.dbname.ok_or_else(|| DbError::missing_field("dbname"))?,
            user: self.user.ok_or_else(|| DbError::missing_field("user"))?,
            password: self
                .password
                .ok_or_else(|| DbError::missing_field("password"))?,
            sslmode: self.sslmode,
            pre_ping: self.pre_ping,
            cursor_shape: self.cursor_shape,
            pool: self.pool,
        };
        config.validate()?;
        Ok(config)
    }
}
