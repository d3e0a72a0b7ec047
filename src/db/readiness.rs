//! Startup gate: wait for the database target to accept connections.
//!
//! Fixed-interval polling, no backoff and no jitter. This is a bounded
//! startup gate, not a steady-state resilience mechanism.

use crate::config::DbConfig;
use crate::db::client::{ConnectionFactory, RawConnection};
use crate::error::{DbError, DbResult};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

/// Default ceiling for [`wait_for_ready`].
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(10);

/// Delay between connection attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Poll the target until a connection succeeds or `max_wait` elapses.
///
/// After the deadline, one final unconditional attempt is made and its
/// native error is what callers get (wrapped as
/// [`DbError::ServiceUnavailable`]): the driver's own diagnostics beat any
/// synthesized timeout message.
pub async fn wait_for_ready<F: ConnectionFactory>(
    factory: &F,
    config: &DbConfig,
    max_wait: Duration,
) -> DbResult<()> {
    let started = Instant::now();
    while started.elapsed() < max_wait {
        match factory.connect(config).await {
            Ok(conn) => {
                debug!(
                    dbname = %config.dbname,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "database target is ready"
                );
                let _ = conn.close().await;
                return Ok(());
            }
            Err(err) => {
                debug!(dbname = %config.dbname, error = %err, "database target not ready yet");
                sleep(POLL_INTERVAL).await;
            }
        }
    }

    match factory.connect(config).await {
        Ok(conn) => {
            info!(dbname = %config.dbname, "database target became ready at the deadline");
            let _ = conn.close().await;
            Ok(())
        }
        Err(err) => Err(DbError::ServiceUnavailable {
            waited_ms: started.elapsed().as_millis() as u64,
            source: Box::new(err),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::{QueryOutput, QueryParam};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyFactory {
        attempts: AtomicUsize,
        succeed_after: usize,
    }

    struct NullConn;

    #[async_trait]
    impl RawConnection for NullConn {
        async fn ping(&mut self) -> DbResult<()> {
            Ok(())
        }
        async fn begin(&mut self) -> DbResult<()> {
            Ok(())
        }
        async fn commit(&mut self) -> DbResult<()> {
            Ok(())
        }
        async fn rollback(&mut self) -> DbResult<()> {
            Ok(())
        }
        async fn execute(&mut self, _sql: &str, _params: &[QueryParam]) -> DbResult<u64> {
            Ok(0)
        }
        async fn query(&mut self, _sql: &str, _params: &[QueryParam]) -> DbResult<QueryOutput> {
            Ok(QueryOutput::empty())
        }
        async fn close(self) -> DbResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl ConnectionFactory for FlakyFactory {
        type Connection = NullConn;

        async fn connect(&self, _config: &DbConfig) -> DbResult<Self::Connection> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt >= self.succeed_after {
                Ok(NullConn)
            } else {
                Err(DbError::connection("connection refused (startup)"))
            }
        }
    }

    fn config() -> DbConfig {
        DbConfig::builder()
            .host("localhost")
            .port(5432)
            .dbname("readiness_test")
            .user("u")
            .password("p")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_immediate_success_returns_without_sleeping() {
        let factory = FlakyFactory {
            attempts: AtomicUsize::new(0),
            succeed_after: 0,
        };
        let started = std::time::Instant::now();
        wait_for_ready(&factory, &config(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(90));
        assert_eq!(factory.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_a_few_attempts() {
        let factory = FlakyFactory {
            attempts: AtomicUsize::new(0),
            succeed_after: 2,
        };
        wait_for_ready(&factory, &config(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(factory.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeout_surfaces_native_error() {
        let factory = FlakyFactory {
            attempts: AtomicUsize::new(0),
            succeed_after: usize::MAX,
        };
        let started = std::time::Instant::now();
        let err = wait_for_ready(&factory, &config(), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(started.elapsed() >= Duration::from_millis(200));
        match &err {
            DbError::ServiceUnavailable { source, .. } => {
                assert!(source.to_string().contains("connection refused (startup)"));
            }
            other => panic!("expected ServiceUnavailable, got: {other}"),
        }
        // The driver's diagnostic must also appear in the rendered message.
        assert!(err.to_string().contains("connection refused (startup)"));
    }
}
