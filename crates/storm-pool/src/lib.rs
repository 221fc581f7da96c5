//! storm-pool: bounded broker for daemon RPC connections.
//!
//! The daemon behind Storm only tolerates a handful of concurrent RPC
//! sessions, and each one is expensive to establish. The broker keeps at
//! most `max_connections` of them dialed or checked out at any instant,
//! reuses idle ones, closes them after `idle_ttl` of disuse, and queues
//! callers fairly when the cap is reached.
//!
//! # Architecture
//!
//! ```text
//! Pool (cloneable handle)
//!   └── mailbox ──► Coordinator task (single writer)
//!                     ├── IdleSet     (FIFO ordered by expiry)
//!                     ├── WaiterQueue (FIFO of reply slots)
//!                     ├── ExpiryTimer (one wake-up, earliest deadline)
//!                     └── Provider    (dials new connections)
//! ```
//!
//! Every state change goes through the coordinator, one event at a time, so
//! the pool state needs no lock. Handoff to a caller is a single-use reply
//! slot: either the caller receives the connection or the caller had already
//! given up and the connection stays with the coordinator. A cancelled
//! `acquire` therefore never loses a connection.
//!
//! # Example
//!
//! ```rust,ignore
//! let pool = Pool::new(PoolConfig::default(), move || DaemonClient::new(settings.clone()))?;
//!
//! let mut conn = pool.acquire_timeout(Duration::from_secs(5)).await?;
//! let status = conn.session_status().await;
//! pool.release(conn);
//! ```

pub mod config;
pub mod connection;
mod coordinator;
pub mod error;
mod idle;
pub mod pool;
mod waiter;

pub use config::PoolConfig;
pub use connection::{Connection, Provider};
pub use error::{ConfigError, PoolError, PoolResult};
pub use pool::{Pool, PoolStats};
