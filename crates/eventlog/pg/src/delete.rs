//! Hard deletion of streams and single events.

use crate::errors::db_error;
use crate::row::EventRow;
use crate::schema::{qualified_columns, EVENTS_TABLE};
use crate::statement::SqlBuilder;
use crate::transaction::UnitOfWork;
use async_trait::async_trait;
use eventlog_core::{Event, EventLogError, Result, Stream};
use sqlx::PgConnection;
use tracing::info;

/// Removes every event of one regular stream.
pub struct DeleteStream<'a> {
    pub stream: &'a Stream,
}

#[async_trait]
impl UnitOfWork for DeleteStream<'_> {
    type Output = bool;

    async fn run(&self, conn: &mut PgConnection) -> Result<bool> {
        if !self.stream.is_regular() {
            return Err(EventLogError::system_stream(self.stream.clone()));
        }
        let deleted = sqlx::query(
            "DELETE FROM events WHERE context = $1 AND stream_name = $2 AND stream_id = $3",
        )
        .bind(&self.stream.context)
        .bind(&self.stream.stream_name)
        .bind(&self.stream.stream_id)
        .execute(&mut *conn)
        .await
        .map_err(db_error)?
        .rows_affected();

        info!(stream = %self.stream, deleted, "stream deleted");
        Ok(deleted > 0)
    }
}

/// Removes one event and shifts the later revisions of its stream down by one.
pub struct DeleteEvent<'a> {
    pub event: &'a Event,
    pub force: bool,
    pub max_records_to_lock: i64,
}

#[async_trait]
impl UnitOfWork for DeleteEvent<'_> {
    type Output = bool;

    async fn run(&self, conn: &mut PgConnection) -> Result<bool> {
        let (Some(stream), Some(id), Some(position)) =
            (self.event.stream(), self.event.id, self.event.global_position)
        else {
            return Err(EventLogError::InvalidRequest(
                "only persisted events can be deleted".to_string(),
            ));
        };

        // Reload: the caller's copy may carry a stale revision.
        let row: Option<EventRow> = SqlBuilder::new()
            .select(qualified_columns(EVENTS_TABLE))
            .from(EVENTS_TABLE)
            .where_and(
                "events.context = ? AND events.stream_name = ? AND events.type = ?",
                [
                    stream.context.as_str(),
                    stream.stream_name.as_str(),
                    self.event.event_type.as_str(),
                ],
            )
            .where_and("events.global_position = ?", [position])
            .where_and("events.id = ?", [id])
            .render()
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_error)?;
        let Some(row) = row else {
            return Ok(false);
        };

        let later: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM events \
             WHERE context = $1 AND stream_name = $2 AND stream_id = $3 AND stream_revision > $4",
        )
        .bind(&row.context)
        .bind(&row.stream_name)
        .bind(&row.stream_id)
        .bind(row.stream_revision)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_error)?;
        check_lock_budget(&stream, later, self.max_records_to_lock, self.force)?;

        sqlx::query(
            "DELETE FROM events \
             WHERE context = $1 AND stream_name = $2 AND type = $3 AND global_position = $4",
        )
        .bind(&row.context)
        .bind(&row.stream_name)
        .bind(&row.event_type)
        .bind(row.global_position)
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;

        sqlx::query(
            "UPDATE events SET stream_revision = stream_revision - 1 \
             WHERE context = $1 AND stream_name = $2 AND stream_id = $3 AND stream_revision > $4",
        )
        .bind(&row.context)
        .bind(&row.stream_name)
        .bind(&row.stream_id)
        .bind(row.stream_revision)
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;

        info!(%stream, revision = row.stream_revision, renumbered = later, "event deleted");
        Ok(true)
    }
}

fn check_lock_budget(stream: &Stream, count: i64, max: i64, force: bool) -> Result<()> {
    if count > max && !force {
        return Err(EventLogError::TooManyRecordsToLock {
            stream: stream.clone(),
            count,
        });
    }
    Ok(())
}
