//! # eventlog-pg
//!
//! PostgreSQL storage engine for [`eventlog_core`].
//!
//! Events live in one `events` table, list-partitioned by context, then by
//! stream name, then by event type. Partitions are created on demand the
//! first time a row needs them. Every mutation runs in a SERIALIZABLE
//! transaction through the [`TransactionCoordinator`], which retries
//! conflicts with backoff and heals missing partitions.
//!
//! ## Usage
//!
//! ```ignore
//! use eventlog_core::{AppendOptions, Event, EventLog, EventLogConfig, ReadOptions, Stream};
//! use eventlog_pg::{PgEventLog, PoolConfig};
//!
//! let log = PgEventLog::connect(&PoolConfig::from_env()?, EventLogConfig::from_env()).await?;
//! log.migrate().await?;
//!
//! let stream = Stream::new("Order", "OrderCreated", "abc");
//! log.append(&stream, vec![Event::new("OrderCreated")], AppendOptions::default()).await?;
//! let events = log.read(&stream, ReadOptions::new()).await?;
//! ```

pub mod append;
pub mod delete;
pub mod errors;
pub mod event_log;
pub mod filter;
pub mod link;
pub mod partition;
pub mod pool;
mod read;
pub mod row;
pub mod safe_position;
pub mod schema;
pub mod statement;
pub mod transaction;

pub use append::{EventModifier, PlainEvents};
pub use event_log::{AppendBatch, PgEventLog};
pub use filter::{EventFilter, PartitionFilter};
pub use link::LinkModifier;
pub use partition::PgPartitionCatalog;
pub use pool::{ConnectionPool, PoolConfig, PoolError};
pub use statement::{SqlBuilder, SqlValue, Statement};
pub use transaction::{TransactionCoordinator, UnitOfWork};
