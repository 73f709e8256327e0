use crate::schema::{qualified_columns, EVENTS_TABLE, EVENT_COLUMNS};
use crate::statement::{SqlBuilder, NO_VALUES};
use eventlog_core::{
    EventLogError, ReadOptions, Result, Stream, StreamFilter, StreamFilterShape,
    STREAMS_SYSTEM_STREAM,
};
use tracing::warn;

/// Builds the read statement of a stream, the all-stream or `$streams`.
///
/// - A regular stream is matched on its identity and ordered by
///   `stream_revision`; stream descriptors in the filter are ignored.
/// - The all-stream is ordered by `global_position`; stream descriptors
///   form the OR-group, event types the AND-group.
/// - `$streams` is the all-stream restricted to first events.
#[derive(Debug)]
pub struct EventFilter<'a> {
    stream: &'a Stream,
    options: &'a ReadOptions,
}

impl<'a> EventFilter<'a> {
    pub fn new(stream: &'a Stream, options: &'a ReadOptions) -> Self {
        Self { stream, options }
    }

    pub fn build(&self) -> Result<SqlBuilder> {
        let mut builder = self.select().from(EVENTS_TABLE);
        if self.options.resolve_link_tos {
            builder = builder.join(
                "LEFT JOIN events original ON original.id = events.link_id \
                 AND original.global_position = events.link_global_position",
                NO_VALUES,
            );
        }

        let direction = self.options.direction;
        if self.stream.is_regular() {
            builder = builder.where_and(
                "events.context = ? AND events.stream_name = ? AND events.stream_id = ?",
                [
                    self.stream.context.as_str(),
                    self.stream.stream_name.as_str(),
                    self.stream.stream_id.as_str(),
                ],
            );
            if let Some(revision) = self.options.from_revision {
                builder = builder.where_and(
                    &format!("events.stream_revision {} ?", direction.bound_operator()),
                    [revision],
                );
            }
            builder = builder.order(format!("events.stream_revision {}", direction.sql()));
        } else {
            if self.stream.is_system_stream() {
                if self.stream.stream_name != STREAMS_SYSTEM_STREAM {
                    return Err(EventLogError::InvalidRequest(format!(
                        "unknown system stream {}",
                        self.stream.stream_name
                    )));
                }
                builder = builder.where_and("events.stream_revision = 0", NO_VALUES);
            }
            builder = stream_descriptors(builder, &self.options.filter.streams);
            if let Some(position) = self.options.from_position {
                builder = builder.where_and(
                    &format!("events.global_position {} ?", direction.bound_operator()),
                    [position],
                );
            }
            builder = builder.order(format!("events.global_position {}", direction.sql()));
        }

        if !self.options.filter.event_types.is_empty() {
            builder = builder.where_and(
                "events.type = ANY(?)",
                [self.options.filter.event_types.clone()],
            );
        }

        Ok(builder.limit(self.options.effective_max_count()))
    }

    fn select(&self) -> SqlBuilder {
        if !self.options.resolve_link_tos {
            return SqlBuilder::new().select(qualified_columns("events"));
        }
        EVENT_COLUMNS.iter().fold(SqlBuilder::new(), |builder, column| {
            builder.select(format!(
                "CASE WHEN original.id IS NULL THEN events.{column} ELSE original.{column} END AS {column}"
            ))
        })
    }
}

/// Add the OR-group of valid stream descriptors.
///
/// Invalid descriptors are skipped; when every given descriptor is invalid
/// the read matches nothing instead of everything.
fn stream_descriptors(mut builder: SqlBuilder, streams: &[StreamFilter]) -> SqlBuilder {
    let mut valid = 0;
    for descriptor in streams {
        let (Some(shape), Some(context)) = (descriptor.shape(), descriptor.context.as_deref())
        else {
            warn!(?descriptor, "ignoring invalid stream filter");
            continue;
        };
        let stream_name = descriptor.stream_name.as_deref().unwrap_or_default();
        let stream_id = descriptor.stream_id.as_deref().unwrap_or_default();
        builder = match shape {
            StreamFilterShape::Stream => builder.where_or(
                "events.context = ? AND events.stream_name = ? AND events.stream_id = ?",
                [context, stream_name, stream_id],
            ),
            StreamFilterShape::StreamName => builder.where_or(
                "events.context = ? AND events.stream_name = ?",
                [context, stream_name],
            ),
            StreamFilterShape::Context => builder.where_or("events.context = ?", [context]),
        };
        valid += 1;
    }
    if valid == 0 && !streams.is_empty() {
        builder = builder.where_and("FALSE", NO_VALUES);
    }
    builder
}
