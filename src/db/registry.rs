//! Per-configuration pool registry.
//!
//! Deduplicates configurations by content key and maps each one to a
//! singleton [`PoolManager`]. Creation is single-flight: concurrent first
//! registrations of one configuration construct exactly one manager and run
//! the readiness gate exactly once.
//!
//! The registry is an explicit, injectable object - construct one at
//! process start, share it, and call [`PoolRegistry::close_all`] on
//! shutdown. Entries are never evicted; the map grows monotonically, one
//! entry per distinct configuration ever seen.

use crate::config::{ConfigKey, DbConfig};
use crate::db::client::ConnectionFactory;
use crate::db::cursor::Cursor;
use crate::db::manager::PoolManager;
use crate::db::readiness::{self, wait_for_ready};
use crate::db::types::{QueryParam, Row};
use crate::error::{DbError, DbResult};
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info};

/// Registry of pool managers, keyed by configuration contents.
pub struct PoolRegistry<F: ConnectionFactory> {
    factory: Arc<F>,
    /// Per-key lazy managers. The OnceCell ensures single-flight creation.
    managers: RwLock<HashMap<ConfigKey, Arc<OnceCell<Arc<PoolManager<F>>>>>>,
    readiness_timeout: Duration,
}

impl<F: ConnectionFactory> PoolRegistry<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory: Arc::new(factory),
            managers: RwLock::new(HashMap::new()),
            readiness_timeout: readiness::DEFAULT_MAX_WAIT,
        }
    }

    /// Override how long first registrations wait for the target to become
    /// reachable.
    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    /// Ensure a pool manager exists for this configuration. Idempotent per
    /// config key; repeat calls are cheap no-ops.
    pub async fn register(&self, config: &DbConfig) -> DbResult<()> {
        self.manager(config).await.map(|_| ())
    }

    /// Fetch the manager for a configuration, registering it first if
    /// absent. First registration validates the config, waits for the
    /// target to accept connections, then builds and warms the pool.
    pub async fn manager(&self, config: &DbConfig) -> DbResult<Arc<PoolManager<F>>> {
        config.validate()?;
        let key = config.key();

        // Get or insert the cell for this key, double-checked so the common
        // path stays on the read lock.
        let cell = {
            let managers = self.managers.read().await;
            match managers.get(&key) {
                Some(cell) => Arc::clone(cell),
                None => {
                    drop(managers);
                    let mut managers = self.managers.write().await;
                    Arc::clone(
                        managers
                            .entry(key)
                            .or_insert_with(|| Arc::new(OnceCell::new())),
                    )
                }
            }
        };

        // Single-flight creation. A failed attempt leaves the cell empty so
        // a later registration can retry.
        let manager = cell
            .get_or_try_init(|| async {
                info!(dbname = %config.dbname, "registering database configuration");
                wait_for_ready(self.factory.as_ref(), config, self.readiness_timeout).await?;
                let manager =
                    PoolManager::new(Arc::clone(&self.factory), config.clone()).await?;
                Ok::<_, DbError>(Arc::new(manager))
            })
            .await?;

        Ok(Arc::clone(manager))
    }

    /// Run a unit of work through a scoped cursor, registering the
    /// configuration first if needed. See `PoolManager::with_cursor` for
    /// the commit/rollback contract.
    pub async fn with_cursor<T, E, W>(&self, config: &DbConfig, work: W) -> Result<T, E>
    where
        T: Send,
        E: From<DbError> + Send,
        W: for<'c> FnOnce(Cursor<'c, F::Connection>) -> BoxFuture<'c, Result<T, E>> + Send,
    {
        let manager = self.manager(config).await.map_err(E::from)?;
        manager.with_cursor(work).await
    }

    /// Execute a statement and fetch all rows.
    pub async fn query(
        &self,
        config: &DbConfig,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Vec<Row>> {
        let sql = sql.to_owned();
        let params = params.to_vec();
        self.with_cursor(config, move |mut cursor| {
            Box::pin(async move { cursor.query(&sql, &params).await })
        })
        .await
    }

    /// Execute a statement and fetch the first row, if any.
    pub async fn query_one(
        &self,
        config: &DbConfig,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Option<Row>> {
        let sql = sql.to_owned();
        let params = params.to_vec();
        self.with_cursor(config, move |mut cursor| {
            Box::pin(async move { cursor.query_one(&sql, &params).await })
        })
        .await
    }

    /// Execute a statement with no result rows, returning rows affected.
    pub async fn execute(
        &self,
        config: &DbConfig,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let sql = sql.to_owned();
        let params = params.to_vec();
        self.with_cursor(config, move |mut cursor| {
            Box::pin(async move { cursor.execute(&sql, &params).await })
        })
        .await
    }

    /// Reset the pool for a configuration, registering it first if absent.
    pub async fn reset(&self, config: &DbConfig) -> DbResult<()> {
        let manager = self.manager(config).await?;
        manager.reset().await;
        Ok(())
    }

    /// Number of fully registered managers.
    pub async fn manager_count(&self) -> usize {
        let managers = self.managers.read().await;
        managers.values().filter(|cell| cell.get().is_some()).count()
    }

    /// Shutdown hook: close every pool and drain the registry. The registry
    /// can be repopulated afterwards.
    pub async fn close_all(&self) {
        let drained: Vec<_> = {
            let mut managers = self.managers.write().await;
            managers.drain().collect()
        };
        for (key, cell) in drained {
            if let Some(manager) = cell.get() {
                debug!(?key, "closing pool");
                manager.close().await;
            }
        }
        info!("all pools closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::postgres::PgConnectionFactory;

    #[tokio::test]
    async fn test_new_registry_is_empty() {
        let registry = PoolRegistry::new(PgConnectionFactory);
        assert_eq!(registry.manager_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_any_io() {
        let registry = PoolRegistry::new(PgConnectionFactory);
        let mut config = DbConfig::builder()
            .host("localhost")
            .port(5432)
            .dbname("app")
            .user("app")
            .password("p")
            .build()
            .unwrap();
        config.user = String::new();

        let err = registry.register(&config).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidConfig { .. }));
        assert_eq!(registry.manager_count().await, 0);
    }
}
