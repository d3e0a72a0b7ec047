//! Managed database access.
//!
//! This module provides the connection lifecycle machinery:
//! - The client seam the pool drives ([`client`], [`postgres`])
//! - Bounded connection pooling ([`pool`])
//! - The session protocol with liveness probing and reset recovery
//!   ([`manager`], [`cursor`])
//! - Per-configuration deduplication ([`registry`])
//! - The startup readiness gate ([`readiness`])

pub mod client;
pub mod cursor;
pub mod manager;
pub mod pool;
pub mod postgres;
pub mod readiness;
pub mod registry;
pub mod types;

pub use client::{ConnectionFactory, RawConnection};
pub use cursor::Cursor;
pub use manager::PoolManager;
pub use pool::{Checkout, ConnectionPool};
pub use postgres::{PgClientConnection, PgConnectionFactory};
pub use readiness::{DEFAULT_MAX_WAIT, POLL_INTERVAL, wait_for_ready};
pub use registry::PoolRegistry;
pub use types::{QueryOutput, QueryParam, Row};
