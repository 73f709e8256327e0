//! Translation of read options into SQL.

mod event_filter;
mod partition_filter;

pub use event_filter::EventFilter;
pub use partition_filter::PartitionFilter;
