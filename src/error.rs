//! Error types for pgkeeper.
//!
//! All fallible operations return [`DbError`] via the [`DbResult`] alias.
//! The variants map one-to-one onto the recovery behavior of the pool
//! manager: connection-level faults trigger a full pool reset, pool-level
//! faults a pool replacement, and everything else passes through to the
//! caller untouched.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// A required configuration field is missing or empty. Raised before any
    /// network activity is attempted.
    #[error("invalid database config: {message}")]
    InvalidConfig { message: String },

    /// The readiness gate gave up waiting for the database target. Carries
    /// the final connection attempt's native error so callers see the
    /// driver's own diagnostics rather than a generic timeout message.
    #[error("database not reachable after {waited_ms} ms: {source}")]
    ServiceUnavailable {
        waited_ms: u64,
        #[source]
        source: Box<DbError>,
    },

    /// Transport, authentication or interface fault on an established or
    /// attempted connection.
    #[error("connection error: {message}")]
    Connection { message: String },

    /// Pool capacity or internal pool fault, e.g. exhaustion. Distinct from
    /// connection-level faults: the pool object is replaced, its
    /// connections are not torn down.
    #[error("pool error: {message}")]
    Pool { message: String },

    /// A statement failed. `sql_state` preserves the server's SQLSTATE code
    /// when available (e.g. "42P01" for undefined table).
    #[error("query failed: {message}")]
    Query {
        message: String,
        sql_state: Option<String>,
    },

    #[error("{message}")]
    Internal { message: String },
}

impl DbError {
    /// Create an invalid-config error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an invalid-config error for a missing required field.
    pub fn missing_field(field: &str) -> Self {
        Self::InvalidConfig {
            message: format!("missing required field '{field}'"),
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a pool error.
    pub fn pool(message: impl Into<String>) -> Self {
        Self::Pool {
            message: message.into(),
        }
    }

    /// Create a query error with optional SQLSTATE.
    pub fn query(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True for faults of the connection itself (transport, auth,
    /// interface). The session protocol answers these with a full pool
    /// reset.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ServiceUnavailable { .. }
        )
    }

    /// True for faults of the pool rather than any single connection.
    pub fn is_pool_level(&self) -> bool {
        matches!(self, Self::Pool { .. })
    }

    /// Check if this error is worth retrying at the caller's discretion.
    /// The pool manager itself never retries.
    pub fn is_retryable(&self) -> bool {
        self.is_connection_level() || self.is_pool_level()
    }

    /// Get the SQLSTATE code for this error, if available.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Query { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }
}

/// Classify sqlx driver errors into the pgkeeper taxonomy.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => {
                DbError::connection(format!("configuration: {msg}"))
            }
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::query(db_err.message(), code)
            }
            sqlx::Error::Io(io_err) => DbError::connection(format!("I/O error: {io_err}")),
            sqlx::Error::Tls(tls_err) => DbError::connection(format!("TLS error: {tls_err}")),
            sqlx::Error::Protocol(msg) => DbError::connection(format!("protocol error: {msg}")),
            sqlx::Error::PoolTimedOut => DbError::pool("driver pool timed out"),
            sqlx::Error::PoolClosed => DbError::pool("driver pool is closed"),
            sqlx::Error::RowNotFound => DbError::query("no rows returned", None),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::query(format!("column not found: {col}"), None)
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => {
                DbError::internal(format!("column index {index} out of bounds (len: {len})"))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("failed to decode column {index}: {source}"))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("decode error: {source}")),
            sqlx::Error::WorkerCrashed => DbError::internal("database worker crashed"),
            _ => DbError::internal(format!("unknown database error: {err}")),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
