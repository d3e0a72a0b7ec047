//! Scriptable in-memory database client for protocol tests.
//!
//! The mock implements the client seam with controllable reachability,
//! probe failures and scripted result sets, and records every lifecycle
//! event so tests can assert on commit/rollback/close ordering.

#![allow(dead_code)]

use async_trait::async_trait;
use pgkeeper::{
    ConnectionFactory, DbConfig, DbError, DbResult, QueryOutput, QueryParam, RawConnection,
};
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Lifecycle events across every mock connection, in observation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connected(usize),
    Began(usize),
    Committed(usize),
    RolledBack(usize),
    Closed(usize),
}

struct Shared {
    reachable: bool,
    fail_pings: bool,
    results: HashMap<String, QueryOutput>,
    events: Vec<Event>,
}

struct MockInner {
    next_id: AtomicUsize,
    shared: Mutex<Shared>,
}

/// Cloneable factory handle; clones share all state.
#[derive(Clone)]
pub struct MockFactory {
    inner: Arc<MockInner>,
}

pub fn output(columns: &[&str], rows: Vec<Vec<JsonValue>>) -> QueryOutput {
    QueryOutput {
        columns: columns
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .into(),
        rows,
    }
}

impl MockFactory {
    pub fn new() -> Self {
        let mut results = HashMap::new();
        results.insert(
            "SELECT 1".to_string(),
            output(&["?column?"], vec![vec![json!(1)]]),
        );
        Self {
            inner: Arc::new(MockInner {
                next_id: AtomicUsize::new(0),
                shared: Mutex::new(Shared {
                    reachable: true,
                    fail_pings: false,
                    results,
                    events: Vec::new(),
                }),
            }),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.inner.shared.lock().unwrap().reachable = reachable;
    }

    pub fn set_fail_pings(&self, fail: bool) {
        self.inner.shared.lock().unwrap().fail_pings = fail;
    }

    /// Script the result set returned for an exact SQL string.
    pub fn script(&self, sql: &str, columns: &[&str], rows: Vec<Vec<JsonValue>>) {
        self.inner
            .shared
            .lock()
            .unwrap()
            .results
            .insert(sql.to_string(), output(columns, rows));
    }

    pub fn events(&self) -> Vec<Event> {
        self.inner.shared.lock().unwrap().events.clone()
    }

    /// Total connections ever opened.
    pub fn connect_count(&self) -> usize {
        self.inner.next_id.load(Ordering::SeqCst)
    }

    pub fn committed_ids(&self) -> Vec<usize> {
        self.ids(|e| match e {
            Event::Committed(id) => Some(*id),
            _ => None,
        })
    }

    pub fn rolled_back_ids(&self) -> Vec<usize> {
        self.ids(|e| match e {
            Event::RolledBack(id) => Some(*id),
            _ => None,
        })
    }

    pub fn closed_ids(&self) -> Vec<usize> {
        self.ids(|e| match e {
            Event::Closed(id) => Some(*id),
            _ => None,
        })
    }

    pub fn began_ids(&self) -> Vec<usize> {
        self.ids(|e| match e {
            Event::Began(id) => Some(*id),
            _ => None,
        })
    }

    fn ids(&self, pick: impl Fn(&Event) -> Option<usize>) -> Vec<usize> {
        self.events().iter().filter_map(pick).collect()
    }

    /// A connection must never be closed twice.
    pub fn assert_no_double_close(&self) {
        let closed = self.closed_ids();
        let mut unique = closed.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(
            closed.len(),
            unique.len(),
            "a connection was closed more than once: {closed:?}"
        );
    }
}

pub struct MockConnection {
    id: usize,
    inner: Arc<MockInner>,
}

impl MockConnection {
    pub fn id(&self) -> usize {
        self.id
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    type Connection = MockConnection;

    async fn connect(&self, _config: &DbConfig) -> DbResult<MockConnection> {
        {
            let shared = self.inner.shared.lock().unwrap();
            if !shared.reachable {
                return Err(DbError::connection("connection refused (mock)"));
            }
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .shared
            .lock()
            .unwrap()
            .events
            .push(Event::Connected(id));
        Ok(MockConnection {
            id,
            inner: Arc::clone(&self.inner),
        })
    }
}

#[async_trait]
impl RawConnection for MockConnection {
    async fn ping(&mut self) -> DbResult<()> {
        let shared = self.inner.shared.lock().unwrap();
        if !shared.reachable || shared.fail_pings {
            return Err(DbError::connection(format!(
                "mock connection {} lost",
                self.id
            )));
        }
        Ok(())
    }

    async fn begin(&mut self) -> DbResult<()> {
        let mut shared = self.inner.shared.lock().unwrap();
        if !shared.reachable {
            return Err(DbError::connection("mock target unreachable"));
        }
        shared.events.push(Event::Began(self.id));
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        let mut shared = self.inner.shared.lock().unwrap();
        if !shared.reachable {
            return Err(DbError::connection("mock target unreachable"));
        }
        shared.events.push(Event::Committed(self.id));
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        // Best-effort like a real driver: recorded even when the target is
        // gone, so tests can observe the attempt.
        self.inner
            .shared
            .lock()
            .unwrap()
            .events
            .push(Event::RolledBack(self.id));
        Ok(())
    }

    async fn execute(&mut self, sql: &str, _params: &[QueryParam]) -> DbResult<u64> {
        let shared = self.inner.shared.lock().unwrap();
        if !shared.reachable {
            return Err(DbError::connection("mock target unreachable"));
        }
        if sql.starts_with("FAIL") {
            return Err(DbError::query(
                "forced statement failure",
                Some("XX000".to_string()),
            ));
        }
        Ok(1)
    }

    async fn query(&mut self, sql: &str, _params: &[QueryParam]) -> DbResult<QueryOutput> {
        let shared = self.inner.shared.lock().unwrap();
        if !shared.reachable {
            return Err(DbError::connection("mock target unreachable"));
        }
        if sql.starts_with("FAIL") {
            return Err(DbError::query(
                "forced statement failure",
                Some("XX000".to_string()),
            ));
        }
        Ok(shared
            .results
            .get(sql)
            .cloned()
            .unwrap_or_else(QueryOutput::empty))
    }

    async fn close(self) -> DbResult<()> {
        self.inner
            .shared
            .lock()
            .unwrap()
            .events
            .push(Event::Closed(self.id));
        Ok(())
    }
}

/// Install a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
