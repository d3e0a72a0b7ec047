//! Bounded connection pool.
//!
//! One pool serves one database target. A connection is either idle (owned
//! by the pool) or checked out (owned by exactly one [`Checkout`]); the
//! semaphore caps idle-plus-checked-out at `max_connections`. A closed pool
//! turns late releases into closes, which lets the manager retire a whole
//! generation without touching connections other sessions still hold.
//!
//! # Concurrency
//!
//! - The idle stack sits behind a `std::sync::Mutex` that is never held
//!   across an await point.
//! - Checkout slots are owned semaphore permits carried inside the
//!   [`Checkout`], so a slot is freed exactly when its connection is
//!   released or discarded.
//! - The closed flag is checked under the idle lock on release, so a
//!   connection can never slip into the idle set of a pool that
//!   `close_all` has already drained.

use crate::config::DbConfig;
use crate::db::client::{ConnectionFactory, RawConnection};
use crate::error::{DbError, DbResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, info};

/// A connection checked out of a pool, together with its checkout slot.
#[derive(Debug)]
pub struct Checkout<C> {
    pub(crate) conn: C,
    _permit: OwnedSemaphorePermit,
}

impl<C> Checkout<C> {
    /// The underlying connection.
    pub fn connection(&mut self) -> &mut C {
        &mut self.conn
    }
}

/// Bounded set of live connections to one database target.
pub struct ConnectionPool<F: ConnectionFactory> {
    factory: Arc<F>,
    config: DbConfig,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<F::Connection>>,
    closed: AtomicBool,
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Create an empty pool. No connections are opened until [`warm`] or
    /// [`acquire`] runs.
    ///
    /// [`warm`]: ConnectionPool::warm
    /// [`acquire`]: ConnectionPool::acquire
    pub fn new(factory: Arc<F>, config: DbConfig) -> Self {
        let max = config.pool.max_connections as usize;
        Self {
            permits: Arc::new(Semaphore::new(max)),
            idle: Mutex::new(Vec::with_capacity(max)),
            closed: AtomicBool::new(false),
            factory,
            config,
        }
    }

    /// Eagerly open `min_connections`. On failure, closes whatever it
    /// already opened and reports the native connect error.
    pub async fn warm(&self) -> DbResult<()> {
        let min = self.config.pool.min_connections as usize;
        let mut opened = Vec::with_capacity(min);
        for _ in 0..min {
            match self.factory.connect(&self.config).await {
                Ok(conn) => opened.push(conn),
                Err(err) => {
                    for conn in opened {
                        let _ = conn.close().await;
                    }
                    return Err(err);
                }
            }
        }

        let leftover = {
            let mut idle = self.idle.lock().unwrap();
            if self.closed.load(Ordering::Acquire) {
                Some(opened)
            } else {
                idle.extend(opened);
                None
            }
        };
        match leftover {
            // The pool was closed while we were connecting.
            Some(conns) => {
                for conn in conns {
                    let _ = conn.close().await;
                }
            }
            None => {
                info!(
                    dbname = %self.config.dbname,
                    connections = min,
                    "connection pool warmed"
                );
            }
        }
        Ok(())
    }

    /// Wait for a checkout slot, then hand out an idle connection or open a
    /// new one. Exhaustion (no slot within `acquire_timeout`) surfaces as a
    /// pool-level error, distinct from connection-level failures.
    pub async fn acquire(&self) -> DbResult<Checkout<F::Connection>> {
        if self.is_closed() {
            return Err(DbError::pool("connection pool is closed"));
        }
        let acquired = timeout(
            self.config.pool.acquire_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await;
        let permit = match acquired {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(DbError::pool("connection pool is closed")),
            Err(_) => {
                return Err(DbError::pool(format!(
                    "no connection available within {:?} ({} connections in use)",
                    self.config.pool.acquire_timeout, self.config.pool.max_connections
                )));
            }
        };

        let reused = self.idle.lock().unwrap().pop();
        let conn = match reused {
            Some(conn) => {
                debug!(dbname = %self.config.dbname, "reusing idle connection");
                conn
            }
            None => {
                debug!(dbname = %self.config.dbname, "opening new connection");
                self.factory.connect(&self.config).await?
            }
        };
        Ok(Checkout {
            conn,
            _permit: permit,
        })
    }

    /// Return a connection to the idle set. If the pool was closed in the
    /// meantime the connection is closed instead of re-pooled.
    pub async fn release(&self, checkout: Checkout<F::Connection>) {
        let Checkout { conn, _permit } = checkout;
        let stale = {
            let mut idle = self.idle.lock().unwrap();
            if self.closed.load(Ordering::Acquire) {
                Some(conn)
            } else {
                debug!(dbname = %self.config.dbname, "returning connection to pool");
                idle.push(conn);
                None
            }
        };
        if let Some(conn) = stale {
            debug!(
                dbname = %self.config.dbname,
                "pool closed, dropping returned connection"
            );
            let _ = conn.close().await;
        }
        // The permit drops here, freeing the checkout slot.
    }

    /// Close a connection without returning it to the idle set.
    pub async fn discard(&self, checkout: Checkout<F::Connection>) {
        debug!(dbname = %self.config.dbname, "discarding connection");
        let Checkout { conn, _permit } = checkout;
        let _ = conn.close().await;
    }

    /// Close every idle connection and refuse further checkouts.
    /// Idempotent: a second call finds nothing left to close.
    pub async fn close_all(&self) {
        self.closed.store(true, Ordering::Release);
        let drained: Vec<F::Connection> = {
            let mut idle = self.idle.lock().unwrap();
            idle.drain(..).collect()
        };
        if !drained.is_empty() {
            info!(
                dbname = %self.config.dbname,
                count = drained.len(),
                "closing pooled connections"
            );
        }
        for conn in drained {
            if let Err(err) = conn.close().await {
                debug!(error = %err, "error closing pooled connection");
            }
        }
    }

    /// Flag the pool closed without touching idle connections. Used when a
    /// generation is replaced wholesale; stragglers close on release.
    pub fn retire(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of connections currently idle in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap().len()
    }

    pub fn max_connections(&self) -> u32 {
        self.config.pool.max_connections
    }
}
