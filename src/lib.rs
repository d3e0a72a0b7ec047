//! pgkeeper - managed PostgreSQL access.
//!
//! Maintains a pool of reusable connections per distinct configuration,
//! verifies liveness before use, recovers from broken connections by
//! resetting pools, and scopes units of work to cursors that commit on
//! success and roll back on failure.
//!
//! ```no_run
//! use pgkeeper::{DbConfig, PgConnectionFactory, PoolRegistry};
//!
//! # async fn demo() -> Result<(), pgkeeper::DbError> {
//! let registry = PoolRegistry::new(PgConnectionFactory);
//! let config = DbConfig::builder()
//!     .host("localhost")
//!     .port(5432)
//!     .dbname("app")
//!     .user("app")
//!     .password("secret")
//!     .build()?;
//!
//! let row = registry.query_one(&config, "SELECT 1", &[]).await?;
//! assert!(row.is_some());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;

pub use config::{ConfigKey, CursorShape, DbConfig, DbConfigBuilder, PoolOptions, SslMode};
pub use db::{
    Checkout, ConnectionFactory, ConnectionPool, Cursor, PgConnectionFactory, PoolManager,
    PoolRegistry, QueryOutput, QueryParam, RawConnection, Row, wait_for_ready,
};
pub use error::{DbError, DbResult};
