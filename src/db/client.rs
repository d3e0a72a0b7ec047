//! The database client seam.
//!
//! The pool never talks to the wire itself: it drives implementations of
//! these traits. The production implementation over raw sqlx connections
//! lives in [`postgres`](super::postgres); tests substitute scripted mocks.

use crate::config::DbConfig;
use crate::db::types::{QueryOutput, QueryParam};
use crate::error::DbResult;
use async_trait::async_trait;

/// Opens raw connections for a pool.
///
/// One factory serves every pool generation of a manager, so
/// implementations must be cheap to share.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: RawConnection;

    /// Establish a single live connection to the configured target.
    async fn connect(&self, config: &DbConfig) -> DbResult<Self::Connection>;
}

/// A single live database session.
///
/// Exclusively owned: either idle in a pool or checked out to exactly one
/// holder, never shared.
#[async_trait]
pub trait RawConnection: Send + 'static {
    /// Cheap liveness probe (a no-op round trip).
    async fn ping(&mut self) -> DbResult<()>;

    /// Open a transaction on this connection.
    async fn begin(&mut self) -> DbResult<()>;

    /// Commit the current transaction.
    async fn commit(&mut self) -> DbResult<()>;

    /// Roll back the current transaction.
    async fn rollback(&mut self) -> DbResult<()>;

    /// Execute a statement, returning the number of rows affected.
    async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64>;

    /// Execute a statement and fetch all result rows.
    async fn query(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<QueryOutput>;

    /// Close the session, releasing server-side resources.
    async fn close(self) -> DbResult<()>;
}
