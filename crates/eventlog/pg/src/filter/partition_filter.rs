use crate::schema::PARTITIONS_TABLE;
use crate::statement::{SqlBuilder, NO_VALUES};
use eventlog_core::{StreamFilter, StreamFilterShape};
use tracing::warn;

/// Builds the lookup of leaf partitions matching a read filter.
///
/// Stream descriptors are OR-combined at context or stream-name
/// granularity (a stream id narrows nothing at this level); event types are
/// AND-ed with them.
#[derive(Debug)]
pub struct PartitionFilter<'a> {
    streams: &'a [StreamFilter],
    event_types: &'a [String],
}

impl<'a> PartitionFilter<'a> {
    pub fn new(streams: &'a [StreamFilter], event_types: &'a [String]) -> Self {
        Self {
            streams,
            event_types,
        }
    }

    pub fn build(&self) -> SqlBuilder {
        let mut builder = SqlBuilder::new()
            .select("partitions.id")
            .select("partitions.context")
            .select("partitions.stream_name")
            .select("partitions.event_type")
            .select("partitions.table_name")
            .from(PARTITIONS_TABLE)
            .where_and("partitions.event_type IS NOT NULL", NO_VALUES);

        let mut valid = 0;
        for descriptor in self.streams {
            let (Some(shape), Some(context)) =
                (descriptor.shape(), descriptor.context.as_deref())
            else {
                warn!(?descriptor, "ignoring invalid stream filter");
                continue;
            };
            builder = match shape {
                StreamFilterShape::Context => {
                    builder.where_or("partitions.context = ?", [context])
                }
                StreamFilterShape::StreamName | StreamFilterShape::Stream => builder.where_or(
                    "partitions.context = ? AND partitions.stream_name = ?",
                    [context, descriptor.stream_name.as_deref().unwrap_or_default()],
                ),
            };
            valid += 1;
        }
        if valid == 0 && !self.streams.is_empty() {
            builder = builder.where_and("FALSE", NO_VALUES);
        }

        if !self.event_types.is_empty() {
            builder = builder.where_and(
                "partitions.event_type = ANY(?)",
                [self.event_types.to_vec()],
            );
        }

        builder.order("partitions.id ASC")
    }
}
