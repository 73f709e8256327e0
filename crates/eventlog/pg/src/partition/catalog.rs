//! PostgreSQL partition catalog.
//!
//! Physical storage is a forest of declarative LIST partitions:
//!
//! ```text
//! events                        PARTITION BY LIST (context)
//! └── contexts_<hash>           FOR VALUES IN ('<context>')      PARTITION BY LIST (stream_name)
//!     └── stream_names_<hash>   FOR VALUES IN ('<stream_name>')  PARTITION BY LIST (type)
//!         └── event_types_<hash> FOR VALUES IN ('<event_type>')
//! ```
//!
//! Every physical table has one row in `partitions`. Rows and tables are
//! created together, level by level, in a serializable transaction of their
//! own; a creator that loses a race retries and re-reads the winner's row.

use super::naming::{next_table_name, quote_literal, table_name};
use crate::errors::{db_error, is_duplicate_relation, is_unique_violation};
use crate::filter::PartitionFilter;
use crate::pool::ConnectionPool;
use crate::row::PartitionRow;
use crate::schema::{EVENTS_TABLE, PARTITIONS_TABLE};
use crate::statement::{SqlBuilder, NO_VALUES};
use crate::transaction::{TransactionCoordinator, UnitOfWork};
use async_trait::async_trait;
use dashmap::DashMap;
use eventlog_core::{
    EventLogError, Partition, PartitionCatalog, PartitionLevel, Result, RetryPolicy, StreamFilter,
};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info, instrument};

type LeafKey = (String, String, String);

/// Partition catalog backed by the `partitions` table.
///
/// Leaf lookups are cached; partitions are never dropped, so a cached entry
/// never goes stale.
pub struct PgPartitionCatalog {
    pool: PgPool,
    coordinator: TransactionCoordinator,
    leaves: DashMap<LeafKey, Partition>,
}

impl std::fmt::Debug for PgPartitionCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgPartitionCatalog")
            .field("cached_leaves", &self.leaves.len())
            .finish_non_exhaustive()
    }
}

impl PgPartitionCatalog {
    pub fn new(pool: &ConnectionPool, retry: RetryPolicy) -> Self {
        Self {
            pool: pool.pool().clone(),
            coordinator: TransactionCoordinator::new(pool, retry),
            leaves: DashMap::new(),
        }
    }

    /// Partitions with the given catalog ids, in id order.
    pub async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<Partition>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<PartitionRow> = sqlx::query_as(
            "SELECT id, context, stream_name, event_type, table_name \
             FROM partitions WHERE id = ANY($1) ORDER BY id",
        )
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(Partition::from).collect())
    }

    /// Every catalog row, roots first.
    pub async fn list(&self) -> Result<Vec<Partition>> {
        let rows: Vec<PartitionRow> = sqlx::query_as(
            "SELECT id, context, stream_name, event_type, table_name FROM partitions ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(Partition::from).collect())
    }

    fn cache_key(context: &str, stream_name: &str, event_type: &str) -> LeafKey {
        (
            context.to_string(),
            stream_name.to_string(),
            event_type.to_string(),
        )
    }
}

#[async_trait]
impl PartitionCatalog for PgPartitionCatalog {
    async fn find_leaf(
        &self,
        context: &str,
        stream_name: &str,
        event_type: &str,
    ) -> Result<Option<Partition>> {
        let key = Self::cache_key(context, stream_name, event_type);
        if let Some(leaf) = self.leaves.get(&key) {
            return Ok(Some(leaf.clone()));
        }

        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        let leaf = find_partition(&mut *conn, context, Some(stream_name), Some(event_type)).await?;
        if let Some(leaf) = &leaf {
            self.leaves.insert(key, leaf.clone());
        }
        Ok(leaf)
    }

    #[instrument(skip(self))]
    async fn ensure(&self, context: &str, stream_name: &str, event_type: &str) -> Result<Partition> {
        if let Some(leaf) = self.find_leaf(context, stream_name, event_type).await? {
            return Ok(leaf);
        }

        let leaf = self
            .coordinator
            .transaction(&EnsurePartitions {
                context,
                stream_name,
                event_type,
            })
            .await?;
        self.leaves.insert(
            Self::cache_key(context, stream_name, event_type),
            leaf.clone(),
        );
        Ok(leaf)
    }

    async fn resolve(
        &self,
        streams: &[StreamFilter],
        event_types: &[String],
    ) -> Result<Vec<Partition>> {
        let statement = PartitionFilter::new(streams, event_types).build().render();
        let rows: Vec<PartitionRow> = statement
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(Partition::from).collect())
    }
}

/// Look up or create the three partitions of a triple. Returns the leaf.
struct EnsurePartitions<'a> {
    context: &'a str,
    stream_name: &'a str,
    event_type: &'a str,
}

#[async_trait]
impl UnitOfWork for EnsurePartitions<'_> {
    type Output = Partition;

    async fn run(&self, conn: &mut PgConnection) -> Result<Partition> {
        let context = match find_partition(conn, self.context, None, None).await? {
            Some(partition) => partition,
            None => create_partition(conn, None, self.context, None, None).await?,
        };

        let stream_name =
            match find_partition(conn, self.context, Some(self.stream_name), None).await? {
                Some(partition) => partition,
                None => {
                    create_partition(
                        conn,
                        Some(&context),
                        self.context,
                        Some(self.stream_name),
                        None,
                    )
                    .await?
                }
            };

        match find_partition(conn, self.context, Some(self.stream_name), Some(self.event_type))
            .await?
        {
            Some(partition) => Ok(partition),
            None => {
                create_partition(
                    conn,
                    Some(&stream_name),
                    self.context,
                    Some(self.stream_name),
                    Some(self.event_type),
                )
                .await
            }
        }
    }
}

/// Catalog row of exactly one level: missing parts are matched with `IS NULL`.
async fn find_partition(
    conn: &mut PgConnection,
    context: &str,
    stream_name: Option<&str>,
    event_type: Option<&str>,
) -> Result<Option<Partition>> {
    let mut builder = SqlBuilder::new()
        .select("id")
        .select("context")
        .select("stream_name")
        .select("event_type")
        .select("table_name")
        .from(PARTITIONS_TABLE)
        .where_and("context = ?", [context]);
    builder = match stream_name {
        Some(stream_name) => builder.where_and("stream_name = ?", [stream_name]),
        None => builder.where_and("stream_name IS NULL", NO_VALUES),
    };
    builder = match event_type {
        Some(event_type) => builder.where_and("event_type = ?", [event_type]),
        None => builder.where_and("event_type IS NULL", NO_VALUES),
    };

    let row: Option<PartitionRow> = builder
        .render()
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error)?;
    Ok(row.map(Partition::from))
}

async fn create_partition(
    conn: &mut PgConnection,
    parent: Option<&Partition>,
    context: &str,
    stream_name: Option<&str>,
    event_type: Option<&str>,
) -> Result<Partition> {
    let level = match (stream_name, event_type) {
        (Some(_), Some(_)) => PartitionLevel::EventType,
        (Some(_), None) => PartitionLevel::StreamName,
        _ => PartitionLevel::Context,
    };
    let name = free_table_name(
        conn,
        table_name(level, context, stream_name, event_type),
    )
    .await?;

    let (parent_table, bound) = match level {
        PartitionLevel::Context => (EVENTS_TABLE, context),
        PartitionLevel::StreamName => (
            parent.map_or(EVENTS_TABLE, |p| p.table_name.as_str()),
            stream_name.unwrap_or_default(),
        ),
        PartitionLevel::EventType => (
            parent.map_or(EVENTS_TABLE, |p| p.table_name.as_str()),
            event_type.unwrap_or_default(),
        ),
    };
    let ddl = partition_ddl(&name, parent_table, bound, level);
    debug!(%ddl, "creating partition table");

    sqlx::query(&ddl)
        .execute(&mut *conn)
        .await
        .map_err(|err| race_or_db_error(err, &name))?;

    let row: PartitionRow = sqlx::query_as(
        "INSERT INTO partitions (context, stream_name, event_type, table_name) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id, context, stream_name, event_type, table_name",
    )
    .bind(context)
    .bind(stream_name)
    .bind(event_type)
    .bind(&name)
    .fetch_one(&mut *conn)
    .await
    .map_err(|err| race_or_db_error(err, &name))?;

    info!(table_name = %name, ?level, context, stream_name, event_type, "partition created");
    Ok(row.into())
}

/// First name in the successor chain of `candidate` that is neither in the
/// catalog nor an existing relation.
async fn free_table_name(conn: &mut PgConnection, candidate: String) -> Result<String> {
    let mut name = candidate;
    loop {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM partitions WHERE table_name = $1) \
             OR to_regclass($1) IS NOT NULL",
        )
        .bind(&name)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_error)?;
        if !taken {
            return Ok(name);
        }
        debug!(table_name = %name, "partition table name taken, trying successor");
        name = next_table_name(&name);
    }
}

fn partition_ddl(name: &str, parent: &str, bound: &str, level: PartitionLevel) -> String {
    let mut ddl = format!(
        "CREATE TABLE {name} PARTITION OF {parent} FOR VALUES IN ({})",
        quote_literal(bound)
    );
    if let Some(key) = level.child_partition_key() {
        ddl.push_str(&format!(" PARTITION BY LIST ({key})"));
    }
    ddl
}

fn race_or_db_error(err: sqlx::Error, table_name: &str) -> EventLogError {
    if is_unique_violation(&err) || is_duplicate_relation(&err) {
        EventLogError::PartitionRace(format!("{table_name}: {err}"))
    } else {
        db_error(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_ddl_lists_children_by_stream_name() {
        let ddl = partition_ddl(
            "contexts_abc123",
            "events",
            "Order",
            PartitionLevel::Context,
        );
        assert_eq!(
            ddl,
            "CREATE TABLE contexts_abc123 PARTITION OF events FOR VALUES IN ('Order') \
             PARTITION BY LIST (stream_name)"
        );
    }

    #[test]
    fn test_stream_name_ddl_lists_children_by_type() {
        let ddl = partition_ddl(
            "stream_names_abc123",
            "contexts_abc123",
            "Order'Created",
            PartitionLevel::StreamName,
        );
        assert_eq!(
            ddl,
            "CREATE TABLE stream_names_abc123 PARTITION OF contexts_abc123 \
             FOR VALUES IN ('Order''Created') PARTITION BY LIST (type)"
        );
    }

    #[test]
    fn test_leaf_ddl_is_not_partitioned() {
        let ddl = partition_ddl(
            "event_types_abc123",
            "stream_names_abc123",
            "A",
            PartitionLevel::EventType,
        );
        assert_eq!(
            ddl,
            "CREATE TABLE event_types_abc123 PARTITION OF stream_names_abc123 FOR VALUES IN ('A')"
        );
    }

    #[test]
    fn test_non_race_errors_are_not_partition_races() {
        let err = race_or_db_error(sqlx::Error::RowNotFound, "contexts_abc123");
        assert!(!matches!(err, EventLogError::PartitionRace(_)));
    }
}
