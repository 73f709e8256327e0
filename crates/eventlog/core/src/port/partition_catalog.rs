//! PartitionCatalog port trait definition.

use crate::error::Result;
use crate::partition::Partition;
use crate::stream::StreamFilter;
use async_trait::async_trait;

/// Catalog of the context → stream name → event type partition forest.
///
/// Partitions are created lazily and never deleted. Creating one is
/// idempotent: a writer that loses a creation race re-reads the row the
/// winner inserted.
#[async_trait]
pub trait PartitionCatalog: Send + Sync {
    /// Look up the leaf partition of a `(context, stream_name, event_type)`
    /// triple without creating anything.
    async fn find_leaf(
        &self,
        context: &str,
        stream_name: &str,
        event_type: &str,
    ) -> Result<Option<Partition>>;

    /// Look up or create, level by level, the partitions a row with this
    /// triple routes through. Returns the leaf.
    async fn ensure(&self, context: &str, stream_name: &str, event_type: &str)
        -> Result<Partition>;

    /// Leaf partitions matching the stream descriptors (OR-combined) and
    /// event types (OR-combined).
    async fn resolve(
        &self,
        streams: &[StreamFilter],
        event_types: &[String],
    ) -> Result<Vec<Partition>>;
}
