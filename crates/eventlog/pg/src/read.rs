//! Reads: single and all-stream reads, paginated reads, grouped reads.

use crate::errors::db_error;
use crate::event_log::PgEventLog;
use crate::filter::EventFilter;
use crate::link::resolve_links;
use crate::row::EventRow;
use crate::schema::qualified_columns;
use crate::statement::SqlBuilder;
use eventlog_core::{
    Direction, Event, EventLogError, PartitionCatalog, ReadOptions, Result, Stream,
    StreamFilterShape,
};
use futures::stream::{unfold, BoxStream};
use futures::StreamExt;
use tracing::debug;

/// Position of a paginated read between two pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageCursor {
    Start,
    At(i64),
    Done,
}

impl PgEventLog {
    /// Rows of a read, middlewares not applied.
    pub(crate) async fn read_rows(
        &self,
        stream: &Stream,
        options: &ReadOptions,
    ) -> Result<Vec<Event>> {
        let statement = EventFilter::new(stream, options).build()?.render();
        let rows: Vec<EventRow> = statement
            .fetch_all(self.pool.pool())
            .await
            .map_err(db_error)?;

        if rows.is_empty() && stream.is_regular() && !self.stream_exists(stream).await? {
            return Err(EventLogError::stream_not_found(stream.clone()));
        }
        Ok(rows.into_iter().map(Event::from).collect())
    }

    /// Whether a regular stream has at least one event.
    pub async fn stream_exists(&self, stream: &Stream) -> Result<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS ( \
                 SELECT 1 FROM events \
                 WHERE context = $1 AND stream_name = $2 AND stream_id = $3 \
             )",
        )
        .bind(&stream.context)
        .bind(&stream.stream_name)
        .bind(&stream.stream_id)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_error)
    }

    /// Read `stream` page by page.
    ///
    /// Each page is one bounded read of `max_count` events starting at the
    /// cursor; the sequence ends after an empty or short page. Consuming the
    /// stream again requires calling this method again.
    pub fn read_paginated<'a>(
        &'a self,
        stream: &'a Stream,
        options: ReadOptions,
    ) -> BoxStream<'a, Result<Vec<Event>>> {
        let options = self.normalize(options);
        unfold(PageCursor::Start, move |cursor| {
            let options = options.clone();
            async move {
                let from = match cursor {
                    PageCursor::Done => return None,
                    PageCursor::At(from) => from,
                    PageCursor::Start => match self.initial_cursor(stream, &options).await {
                        Ok(Some(from)) => from,
                        Ok(None) => return None,
                        Err(err) => return Some((Err(err), PageCursor::Done)),
                    },
                };
                match self.read_page(stream, &options, from).await {
                    Ok(Some((page, next))) => Some((Ok(page), next)),
                    Ok(None) => None,
                    Err(err) => Some((Err(err), PageCursor::Done)),
                }
            }
        })
        .boxed()
    }

    async fn initial_cursor(&self, stream: &Stream, options: &ReadOptions) -> Result<Option<i64>> {
        let by_revision = stream.is_regular();
        let explicit = if by_revision {
            options.from_revision.map(i64::from)
        } else {
            options.from_position
        };
        if let Some(from) = explicit {
            return Ok(Some(from));
        }
        if options.direction.is_forward() {
            return Ok(Some(0));
        }

        let mut probe = options.clone().max_count(1);
        probe.resolve_link_tos = false;
        let tail = self.read_rows(stream, &probe).await?;
        Ok(tail.first().and_then(|event| cursor_of(event, by_revision)))
    }

    async fn read_page(
        &self,
        stream: &Stream,
        options: &ReadOptions,
        from: i64,
    ) -> Result<Option<(Vec<Event>, PageCursor)>> {
        let by_revision = stream.is_regular();
        let mut page_options = options.clone();
        page_options.resolve_link_tos = false;
        if by_revision {
            page_options.from_revision = Some(i32::try_from(from).map_err(|_| {
                EventLogError::InvalidRequest(format!("revision cursor {from} out of range"))
            })?);
        } else {
            page_options.from_position = Some(from);
        }

        let mut page = self.read_rows(stream, &page_options).await?;
        let Some(last) = page.last() else {
            return Ok(None);
        };
        let next = next_cursor(
            last,
            by_revision,
            options.direction,
            page.len(),
            options.effective_max_count(),
        );
        debug!(%stream, from, size = page.len(), ?next, "read page");

        if options.resolve_link_tos {
            page = resolve_links(self.pool.pool(), &self.catalog, page).await?;
        }
        self.middlewares.deserialize_all(&mut page)?;
        Ok(Some((page, next)))
    }

    /// One representative event per matching leaf partition, or per
    /// explicitly requested stream within a matching leaf.
    ///
    /// Each leaf is probed directly with `LIMIT 1`, so the cost grows with
    /// the number of matching partitions rather than with the log size.
    /// Results are ordered by global position in the read direction.
    pub async fn read_grouped(&self, options: ReadOptions) -> Result<Vec<Event>> {
        let options = self.normalize(options);
        let leaves = self
            .catalog
            .resolve(&options.filter.streams, &options.filter.event_types)
            .await?;
        let direction = options.direction;

        let mut probes = Vec::new();
        for leaf in &leaves {
            let mut whole_leaf = options.filter.streams.is_empty();
            let mut stream_ids = Vec::new();
            for descriptor in &options.filter.streams {
                let matches_leaf = descriptor.context.as_deref() == Some(leaf.context.as_str())
                    && (descriptor.stream_name.is_none()
                        || descriptor.stream_name == leaf.stream_name);
                if !matches_leaf {
                    continue;
                }
                match descriptor.shape() {
                    Some(StreamFilterShape::Stream) => {
                        if let Some(stream_id) = descriptor.stream_id.as_deref() {
                            stream_ids.push(stream_id);
                        }
                    }
                    Some(_) => whole_leaf = true,
                    None => {}
                }
            }

            if whole_leaf {
                probes.push(probe(&leaf.table_name, None, &options));
            }
            for stream_id in stream_ids {
                probes.push(probe(&leaf.table_name, Some(stream_id), &options));
            }
        }

        let Some(union) = SqlBuilder::union_all(probes) else {
            return Ok(Vec::new());
        };
        let rows: Vec<EventRow> = union
            .order(format!("global_position {}", direction.sql()))
            .render()
            .fetch_all(self.pool.pool())
            .await
            .map_err(db_error)?;
        debug!(leaves = leaves.len(), events = rows.len(), "grouped read");

        let mut events: Vec<Event> = rows.into_iter().map(Event::from).collect();
        events.dedup_by_key(|event| event.global_position);
        if options.resolve_link_tos {
            events = resolve_links(self.pool.pool(), &self.catalog, events).await?;
        }
        self.middlewares.deserialize_all(&mut events)?;
        Ok(events)
    }
}

fn probe(table: &str, stream_id: Option<&str>, options: &ReadOptions) -> SqlBuilder {
    let direction = options.direction;
    let mut builder = SqlBuilder::new()
        .select(qualified_columns(table))
        .from(table);
    if let Some(stream_id) = stream_id {
        builder = builder.where_and(&format!("{table}.stream_id = ?"), [stream_id]);
    }
    if let Some(position) = options.from_position {
        builder = builder.where_and(
            &format!("{table}.global_position {} ?", direction.bound_operator()),
            [position],
        );
    }
    builder
        .order(format!("{table}.global_position {}", direction.sql()))
        .limit(1)
}

fn cursor_of(event: &Event, by_revision: bool) -> Option<i64> {
    if by_revision {
        event.stream_revision.map(i64::from)
    } else {
        event.global_position
    }
}

/// Cursor after a page ending with `last`: the next revision or position in
/// the read direction, or `Done` after a short page or before the start of
/// the log.
fn next_cursor(
    last: &Event,
    by_revision: bool,
    direction: Direction,
    page_size: usize,
    max_count: i64,
) -> PageCursor {
    if (page_size as i64) < max_count {
        return PageCursor::Done;
    }
    let Some(current) = cursor_of(last, by_revision) else {
        return PageCursor::Done;
    };
    let next = if direction.is_forward() {
        current + 1
    } else {
        current - 1
    };
    if next < 0 {
        PageCursor::Done
    } else {
        PageCursor::At(next)
    }
}
