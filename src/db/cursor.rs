//! Scoped cursor bound to one checked-out connection.

use crate::config::CursorShape;
use crate::db::client::RawConnection;
use crate::db::types::{QueryParam, Row};
use crate::error::DbResult;

/// Executes statements for a single unit of work.
///
/// Handed to the closure passed to `PoolManager::with_cursor`. Every
/// statement runs inside the session's transaction, which is committed or
/// rolled back when the closure returns.
pub struct Cursor<'c, C: RawConnection> {
    conn: &'c mut C,
    shape: CursorShape,
}

impl<'c, C: RawConnection> Cursor<'c, C> {
    pub(crate) fn new(conn: &'c mut C, shape: CursorShape) -> Self {
        Self { conn, shape }
    }

    /// The row shape this cursor produces.
    pub fn shape(&self) -> CursorShape {
        self.shape
    }

    /// Execute a statement, returning the number of rows affected.
    pub async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        self.conn.execute(sql, params).await
    }

    /// Execute a statement and fetch every result row.
    pub async fn query(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<Vec<Row>> {
        let output = self.conn.query(sql, params).await?;
        Ok(output.into_rows(self.shape))
    }

    /// Execute a statement and fetch the first row, if any.
    pub async fn query_one(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<Option<Row>> {
        let output = self.conn.query(sql, params).await?;
        Ok(output.into_rows(self.shape).into_iter().next())
    }

    /// Run the statement once per parameter set, all inside the session's
    /// transaction. Returns the total number of rows affected.
    pub async fn execute_many(
        &mut self,
        sql: &str,
        param_sets: &[Vec<QueryParam>],
    ) -> DbResult<u64> {
        let mut affected = 0;
        for params in param_sets {
            affected += self.conn.execute(sql, params).await?;
        }
        Ok(affected)
    }
}
