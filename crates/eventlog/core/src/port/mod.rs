//! Ports of the event log.
//!
//! Traits the storage backend implements ([`EventLog`], [`PartitionCatalog`],
//! [`SafePositionSource`]) and the hooks it calls out to ([`Middleware`],
//! [`EventClassResolver`]).

pub mod event_log;
pub mod middleware;
pub mod partition_catalog;
pub mod resolver;
pub mod safe_position;

pub use event_log::EventLog;
pub use middleware::{Middleware, MiddlewareChain};
pub use partition_catalog::PartitionCatalog;
pub use resolver::{EventClassResolver, TypeRegistry};
pub use safe_position::SafePositionSource;
