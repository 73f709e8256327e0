//! # eventlog-core
//!
//! Domain types and ports of an append-only event log with stream-scoped
//! optimistic concurrency, three-level partitioning and link events.
//! Provides no storage; see `eventlog-pg` for the PostgreSQL engine.
//!
//! ## Modules
//!
//! - [`event`]: [`Event`], [`LinkEvent`]
//! - [`stream`]: [`Stream`], [`StreamFilter`]
//! - [`partition`]: [`Partition`], [`PartitionLevel`]
//! - [`options`]: [`AppendOptions`], [`ReadOptions`], [`ExpectedRevision`]
//! - [`port`]: [`EventLog`], [`PartitionCatalog`], [`Middleware`], [`EventClassResolver`], [`SafePositionSource`]
//! - [`config`]: [`EventLogConfig`], [`RetryPolicy`]
//! - [`error`]: [`EventLogError`]
//!
//! ## Usage
//!
//! ```rust
//! use eventlog_core::{Event, ExpectedRevision, ReadOptions, Stream};
//! use serde_json::json;
//!
//! let stream = Stream::new("Order", "OrderCreated", "abc");
//! let event = Event::new("OrderCreated").with_data(json!({"total": 10}));
//!
//! assert!(ExpectedRevision::NoStream.validate(&stream, None).is_ok());
//! let options = ReadOptions::new().backward().max_count(10);
//! assert_eq!(options.effective_max_count(), 10);
//! # let _ = event;
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod options;
pub mod partition;
pub mod port;
pub mod stream;

pub use config::{EventLogConfig, RetryPolicy};
pub use error::{EventLogError, Result};
pub use event::{Event, LinkEvent, LinkEventBuilder, LINK_EVENT_TYPE};
pub use options::{
    AppendOptions, Direction, ExpectedRevision, ReadFilter, ReadOptions, DEFAULT_MAX_COUNT,
};
pub use partition::{Partition, PartitionLevel};
pub use port::{
    EventClassResolver, EventLog, Middleware, MiddlewareChain, PartitionCatalog,
    SafePositionSource, TypeRegistry,
};
pub use stream::{Stream, StreamFilter, StreamFilterShape, STREAMS_SYSTEM_STREAM};
