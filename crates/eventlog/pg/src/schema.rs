//! Persisted schema of the event log.
//!
//! ```sql
//! CREATE TABLE events (
//!     id                   UUID NOT NULL,
//!     context              VARCHAR NOT NULL,
//!     stream_name          VARCHAR NOT NULL,
//!     stream_id            VARCHAR NOT NULL,
//!     global_position      BIGSERIAL NOT NULL,
//!     stream_revision      INT NOT NULL,
//!     type                 VARCHAR NOT NULL,
//!     event_type_id        BIGINT,
//!     data                 JSONB NOT NULL DEFAULT '{}',
//!     metadata             JSONB NOT NULL DEFAULT '{}',
//!     link_id              UUID,
//!     link_partition_id    BIGINT,
//!     link_global_position BIGINT,
//!     created_at           TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! ) PARTITION BY LIST (context);
//!
//! CREATE TABLE partitions (
//!     id          BIGSERIAL PRIMARY KEY,
//!     context     VARCHAR NOT NULL,
//!     stream_name VARCHAR,
//!     event_type  VARCHAR,
//!     table_name  VARCHAR NOT NULL UNIQUE
//! );
//!
//! CREATE TABLE event_types (
//!     id   BIGSERIAL PRIMARY KEY,
//!     type VARCHAR NOT NULL UNIQUE
//! );
//! ```
//!
//! `events` has no physical partitions until the partition catalog creates
//! them; indexes declared on the parent are inherited by every partition.

use crate::errors::db_error;
use eventlog_core::Result;
use sqlx::PgPool;
use tracing::info;

/// Name of the partitioned log table.
pub const EVENTS_TABLE: &str = "events";
/// Name of the partition catalog table.
pub const PARTITIONS_TABLE: &str = "partitions";

/// Columns of the `events` relation, in table order.
pub const EVENT_COLUMNS: [&str; 14] = [
    "id",
    "context",
    "stream_name",
    "stream_id",
    "global_position",
    "stream_revision",
    "type",
    "event_type_id",
    "data",
    "metadata",
    "link_id",
    "link_partition_id",
    "link_global_position",
    "created_at",
];

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id                   UUID NOT NULL,
        context              VARCHAR NOT NULL,
        stream_name          VARCHAR NOT NULL,
        stream_id            VARCHAR NOT NULL,
        global_position      BIGSERIAL NOT NULL,
        stream_revision      INT NOT NULL,
        type                 VARCHAR NOT NULL,
        event_type_id        BIGINT,
        data                 JSONB NOT NULL DEFAULT '{}'::jsonb,
        metadata             JSONB NOT NULL DEFAULT '{}'::jsonb,
        link_id              UUID,
        link_partition_id    BIGINT,
        link_global_position BIGINT,
        created_at           TIMESTAMPTZ NOT NULL DEFAULT NOW()
    ) PARTITION BY LIST (context)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_events_stream_revision
    ON events (context, stream_name, stream_id, stream_revision)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_events_global_position
    ON events (global_position)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_events_id
    ON events (id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS partitions (
        id          BIGSERIAL PRIMARY KEY,
        context     VARCHAR NOT NULL,
        stream_name VARCHAR,
        event_type  VARCHAR,
        table_name  VARCHAR NOT NULL,
        CONSTRAINT uq_partitions_table_name UNIQUE (table_name)
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_partitions_by_context
    ON partitions (context)
    WHERE stream_name IS NULL AND event_type IS NULL
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_partitions_by_stream_name
    ON partitions (context, stream_name)
    WHERE stream_name IS NOT NULL AND event_type IS NULL
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_partitions_by_event_type
    ON partitions (context, stream_name, event_type)
    WHERE event_type IS NOT NULL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS event_types (
        id   BIGSERIAL PRIMARY KEY,
        type VARCHAR NOT NULL,
        CONSTRAINT uq_event_types_type UNIQUE (type)
    )
    "#,
];

/// Create the `events`, `partitions` and `event_types` relations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    for statement in MIGRATIONS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(db_error)?;
    }
    info!("event log schema is up to date");
    Ok(())
}

/// Comma-separated column list qualified with `alias`.
pub fn qualified_columns(alias: &str) -> String {
    EVENT_COLUMNS
        .iter()
        .map(|column| format!("{alias}.{column}"))
        .collect::<Vec<_>>()
        .join(", ")
}
