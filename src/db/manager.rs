//! Pool manager: checkout, liveness probing, and the session protocol.
//!
//! One manager owns one configuration and the current pool *generation*.
//! Sessions move through checkout (probed first when `pre_ping` is on), a
//! transaction-scoped cursor, then commit-and-release or
//! rollback-release-and-reset.
//!
//! A broken connection is never returned to service without the whole pool
//! being rebuilt behind it: a broken network path usually invalidates every
//! pooled connection at once, so one conservative full reset replaces
//! per-connection eviction. The extra reconnect cost buys simplicity and
//! correctness under partial outages.
//!
//! # Generations
//!
//! The manager holds `RwLock<Arc<ConnectionPool>>`. A session clones the
//! current generation under a brief read lock and then works lock-free;
//! reset swaps generations under the write lock. Closing a generation only
//! touches idle connections - checked-out connections are owned by their
//! sessions, and a late release into a closed generation closes the
//! connection instead of re-pooling it. A reset therefore never invalidates
//! a connection another session is actively using.

use crate::config::{CursorShape, DbConfig};
use crate::db::client::{ConnectionFactory, RawConnection};
use crate::db::cursor::Cursor;
use crate::db::pool::{Checkout, ConnectionPool};
use crate::error::{DbError, DbResult};
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Serves cursor sessions for one database configuration.
pub struct PoolManager<F: ConnectionFactory> {
    name: String,
    factory: Arc<F>,
    config: DbConfig,
    pool: RwLock<Arc<ConnectionPool<F>>>,
}

impl<F: ConnectionFactory> PoolManager<F> {
    /// Build a manager with an eagerly warmed pool. Connect failures during
    /// the initial warm-up propagate to the caller.
    pub async fn new(factory: Arc<F>, config: DbConfig) -> DbResult<Self> {
        let name = config.dbname.clone();
        let pool = Arc::new(ConnectionPool::new(Arc::clone(&factory), config.clone()));
        pool.warm().await?;
        Ok(Self {
            name,
            factory,
            config,
            pool: RwLock::new(pool),
        })
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// The current pool generation.
    pub async fn current_pool(&self) -> Arc<ConnectionPool<F>> {
        Arc::clone(&*self.pool.read().await)
    }

    /// Run one unit of work against a scoped cursor.
    ///
    /// The closure receives a cursor bound to a freshly checked-out (and,
    /// with `pre_ping`, probed) connection with an open transaction. An
    /// `Ok` return commits and returns the connection to the pool; an `Err`
    /// return rolls back, returns the connection, resets the pool, and
    /// surfaces the closure's error unchanged. The error type only needs a
    /// `From<DbError>` conversion for the manager's own failures.
    pub async fn with_cursor<T, E, W>(&self, work: W) -> Result<T, E>
    where
        T: Send,
        E: From<DbError> + Send,
        W: for<'c> FnOnce(Cursor<'c, F::Connection>) -> BoxFuture<'c, Result<T, E>> + Send,
    {
        self.with_cursor_shape(self.config.cursor_shape, work).await
    }

    /// Same as [`PoolManager::with_cursor`], with the row shape overridden
    /// for this session only.
    pub async fn with_cursor_shape<T, E, W>(&self, shape: CursorShape, work: W) -> Result<T, E>
    where
        T: Send,
        E: From<DbError> + Send,
        W: for<'c> FnOnce(Cursor<'c, F::Connection>) -> BoxFuture<'c, Result<T, E>> + Send,
    {
        let (pool, mut checkout) = match self.checkout().await {
            Ok(pair) => pair,
            Err(err) => return Err(E::from(err)),
        };

        if let Err(err) = checkout.conn.begin().await {
            self.abort_session(&pool, checkout).await;
            return Err(E::from(err));
        }

        debug!(db = %self.name, "cursor session started");
        let outcome = work(Cursor::new(&mut checkout.conn, shape)).await;
        match outcome {
            Ok(value) => match checkout.conn.commit().await {
                Ok(()) => {
                    debug!(db = %self.name, "cursor session committed");
                    pool.release(checkout).await;
                    Ok(value)
                }
                Err(err) => {
                    warn!(
                        db = %self.name,
                        error = %err,
                        "commit failed, resetting connection pool"
                    );
                    self.abort_session(&pool, checkout).await;
                    Err(E::from(err))
                }
            },
            Err(err) => {
                // Recovery is a side effect only; the caller's failure is
                // surfaced unchanged afterwards.
                warn!(db = %self.name, "cursor session failed, resetting connection pool");
                self.abort_session(&pool, checkout).await;
                Err(err)
            }
        }
    }

    /// Roll back best-effort, return the connection to its generation, then
    /// reset. The connection goes back before cleanup so the reset sweeps
    /// it up with the rest of its generation.
    async fn abort_session(&self, pool: &Arc<ConnectionPool<F>>, mut checkout: Checkout<F::Connection>) {
        if let Err(err) = checkout.conn.rollback().await {
            debug!(db = %self.name, error = %err, "rollback failed on broken connection");
        }
        pool.release(checkout).await;
        self.reset().await;
    }

    /// Checkout honoring the liveness-probe protocol.
    async fn checkout(&self) -> DbResult<(Arc<ConnectionPool<F>>, Checkout<F::Connection>)> {
        let pool = self.current_pool().await;

        if !self.config.pre_ping {
            return match pool.acquire().await {
                Ok(checkout) => Ok((pool, checkout)),
                Err(err) => {
                    warn!(
                        db = %self.name,
                        error = %err,
                        "checkout failed, resetting connection pool"
                    );
                    self.reset().await;
                    Err(err)
                }
            };
        }

        match self.probe_checkout(&pool).await {
            Ok(checkout) => Ok((pool, checkout)),
            Err(err) if err.is_pool_level() => {
                // Exhaustion: every connection is legitimately in use, so
                // the pool object is replaced rather than its connections
                // closed.
                warn!(
                    db = %self.name,
                    error = %err,
                    "pool-level checkout failure, replacing pool"
                );
                let fresh = self.replace_pool().await;
                let checkout = fresh.acquire().await?;
                Ok((fresh, checkout))
            }
            Err(err) => {
                warn!(
                    db = %self.name,
                    error = %err,
                    "liveness probe failed, resetting connection pool"
                );
                let fresh = self.reset().await;
                let checkout = fresh.acquire().await?;
                Ok((fresh, checkout))
            }
        }
    }

    /// Acquire plus liveness probe. A connection that fails the probe is
    /// discarded, never re-pooled.
    async fn probe_checkout(
        &self,
        pool: &Arc<ConnectionPool<F>>,
    ) -> DbResult<Checkout<F::Connection>> {
        let mut checkout = pool.acquire().await?;
        match checkout.conn.ping().await {
            Ok(()) => Ok(checkout),
            Err(err) => {
                pool.discard(checkout).await;
                Err(err)
            }
        }
    }

    /// Close every pooled connection and swap in a fresh pool for the same
    /// configuration.
    ///
    /// Warm-up failures are logged, not raised: the fresh pool then fills
    /// lazily, which is what lets sessions recover as soon as the target is
    /// reachable again. Safe to call repeatedly.
    pub async fn reset(&self) -> Arc<ConnectionPool<F>> {
        warn!(db = %self.name, "resetting connection pool");
        let fresh = self.swap_generation().await;
        if let Err(err) = fresh.warm().await {
            warn!(
                db = %self.name,
                error = %err,
                "pool warm-up failed, connections will be opened on demand"
            );
        }
        fresh
    }

    /// Swap in a fresh pool without closing the old generation's
    /// connections; the retired generation closes stragglers on release.
    async fn replace_pool(&self) -> Arc<ConnectionPool<F>> {
        let fresh = Arc::new(ConnectionPool::new(
            Arc::clone(&self.factory),
            self.config.clone(),
        ));
        let old = {
            let mut current = self.pool.write().await;
            std::mem::replace(&mut *current, Arc::clone(&fresh))
        };
        old.retire();
        if let Err(err) = fresh.warm().await {
            warn!(
                db = %self.name,
                error = %err,
                "pool warm-up failed, connections will be opened on demand"
            );
        }
        fresh
    }

    /// Swap generations and close the old one's idle connections (swap
    /// under the write lock, close outside it).
    async fn swap_generation(&self) -> Arc<ConnectionPool<F>> {
        let fresh = Arc::new(ConnectionPool::new(
            Arc::clone(&self.factory),
            self.config.clone(),
        ));
        let old = {
            let mut current = self.pool.write().await;
            std::mem::replace(&mut *current, Arc::clone(&fresh))
        };
        old.close_all().await;
        fresh
    }

    /// Close the current pool without replacement. Registry shutdown path.
    pub(crate) async fn close(&self) {
        let pool = self.current_pool().await;
        pool.close_all().await;
    }
}
