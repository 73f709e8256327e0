//! Append engine.
//!
//! One [`AppendCommand`] appends a batch to one stream:
//!
//! 1. take the shared side of the safe-position lock;
//! 2. read the stream's last revision and check the expected revision;
//! 3. shape each event through the [`EventModifier`] and the middleware chain;
//! 4. insert the rows with consecutive revisions.
//!
//! A row routed to a partition that does not exist yet fails the command with
//! [`EventLogError::MissingPartitions`], which the transaction coordinator
//! heals before running the command again.

use crate::errors::{db_error, is_missing_partition};
use crate::row::EventRow;
use crate::safe_position::SAFE_POSITION_LOCK_KEY;
use crate::transaction::{TransactionCoordinator, UnitOfWork};
use async_trait::async_trait;
use eventlog_core::{
    AppendOptions, Event, EventLogError, MiddlewareChain, Result, Stream,
};
use sqlx::PgConnection;
use uuid::Uuid;

/// Transformation applied to each event right before it is written.
///
/// Plain appends use [`PlainEvents`]; link appends turn originals into link
/// rows with [`LinkModifier`](crate::link::LinkModifier).
pub trait EventModifier: Send + Sync {
    fn modify(&self, event: Event) -> Result<Event>;
}

/// Writes events as given.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainEvents;

impl EventModifier for PlainEvents {
    fn modify(&self, event: Event) -> Result<Event> {
        Ok(event)
    }
}

/// Appends one batch of events to one stream.
pub struct AppendCommand<'a> {
    pub stream: &'a Stream,
    pub events: &'a [Event],
    pub options: &'a AppendOptions,
    pub modifier: &'a dyn EventModifier,
    pub middlewares: &'a MiddlewareChain,
}

#[async_trait]
impl UnitOfWork for AppendCommand<'_> {
    type Output = Vec<Event>;

    async fn run(&self, conn: &mut PgConnection) -> Result<Vec<Event>> {
        if !self.stream.is_regular() {
            return Err(EventLogError::system_stream(self.stream.clone()));
        }
        if !self.stream.is_valid() {
            return Err(EventLogError::InvalidRequest(format!(
                "stream {} needs a context, a stream name and a stream id",
                self.stream
            )));
        }

        sqlx::query("SELECT pg_advisory_xact_lock_shared($1)")
            .bind(SAFE_POSITION_LOCK_KEY)
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;

        let current = last_revision(conn, self.stream).await?;
        self.options
            .expected_revision
            .validate(self.stream, current)?;

        let mut shaped = Vec::with_capacity(self.events.len());
        for event in self.events {
            let mut event = self.modifier.modify(event.clone())?;
            self.middlewares.serialize(&mut event)?;
            shaped.push(event);
        }

        let first_revision = current.map_or(0, |revision| revision + 1);
        let mut persisted = Vec::with_capacity(shaped.len());
        for (offset, event) in shaped.iter().enumerate() {
            let type_id = event_type_id(conn, &event.event_type).await?;
            let revision = first_revision + offset as i32;
            let row = insert_event(conn, self.stream, event, revision, type_id)
                .await
                .map_err(|err| {
                    if is_missing_partition(&err) {
                        EventLogError::MissingPartitions {
                            stream: self.stream.clone(),
                            event_types: distinct_types(&shaped),
                        }
                    } else {
                        db_error(err)
                    }
                })?;
            persisted.push(Event::from(row));
        }

        self.middlewares.deserialize_all(&mut persisted)?;
        Ok(persisted)
    }
}

/// Several appends committed atomically.
///
/// Each command runs inline on the transaction opened for the whole batch.
pub struct AppendMany<'a> {
    pub commands: Vec<AppendCommand<'a>>,
}

#[async_trait]
impl UnitOfWork for AppendMany<'_> {
    type Output = Vec<Vec<Event>>;

    async fn run(&self, conn: &mut PgConnection) -> Result<Vec<Vec<Event>>> {
        let mut results = Vec::with_capacity(self.commands.len());
        for command in &self.commands {
            results.push(TransactionCoordinator::run_inline(&mut *conn, command).await?);
        }
        Ok(results)
    }
}

/// Last stream revision, `None` for a stream without events.
pub(crate) async fn last_revision(conn: &mut PgConnection, stream: &Stream) -> Result<Option<i32>> {
    sqlx::query_scalar(
        "SELECT stream_revision FROM events \
         WHERE context = $1 AND stream_name = $2 AND stream_id = $3 \
         ORDER BY stream_revision DESC LIMIT 1",
    )
    .bind(&stream.context)
    .bind(&stream.stream_name)
    .bind(&stream.stream_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error)
}

/// Id of an event type, registering it on first use.
async fn event_type_id(conn: &mut PgConnection, event_type: &str) -> Result<i64> {
    sqlx::query_scalar(
        "WITH inserted AS ( \
             INSERT INTO event_types (type) VALUES ($1) \
             ON CONFLICT (type) DO NOTHING RETURNING id \
         ) \
         SELECT id FROM inserted \
         UNION ALL SELECT id FROM event_types WHERE type = $1 \
         LIMIT 1",
    )
    .bind(event_type)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_error)
}

async fn insert_event(
    conn: &mut PgConnection,
    stream: &Stream,
    event: &Event,
    revision: i32,
    type_id: i64,
) -> std::result::Result<EventRow, sqlx::Error> {
    sqlx::query_as(
        "INSERT INTO events ( \
             id, context, stream_name, stream_id, stream_revision, type, event_type_id, \
             data, metadata, link_id, link_partition_id, link_global_position \
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         RETURNING id, context, stream_name, stream_id, global_position, stream_revision, \
             type, data, metadata, link_id, link_partition_id, link_global_position, created_at",
    )
    .bind(event.id.unwrap_or_else(Uuid::new_v4))
    .bind(&stream.context)
    .bind(&stream.stream_name)
    .bind(&stream.stream_id)
    .bind(revision)
    .bind(&event.event_type)
    .bind(type_id)
    .bind(&event.data)
    .bind(&event.metadata)
    .bind(event.link_id)
    .bind(event.link_partition_id)
    .bind(event.link_global_position)
    .fetch_one(&mut *conn)
    .await
}

/// Event types of a batch, in first-seen order.
fn distinct_types(events: &[Event]) -> Vec<String> {
    let mut types: Vec<String> = Vec::new();
    for event in events {
        if !types.contains(&event.event_type) {
            types.push(event.event_type.clone());
        }
    }
    types
}
