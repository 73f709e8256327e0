//! Link events.
//!
//! A link row is an event of type `$>` whose `link_id`,
//! `link_global_position` and `link_partition_id` point back at an original
//! event. Links are written through the regular append path with a
//! [`LinkModifier`]; they are resolved either inline by a read (see
//! [`EventFilter`](crate::filter::EventFilter)) or in batch by
//! [`resolve_links`].

use crate::append::EventModifier;
use crate::errors::db_error;
use crate::partition::PgPartitionCatalog;
use crate::row::EventRow;
use crate::schema::qualified_columns;
use crate::statement::SqlBuilder;
use eventlog_core::{Event, EventLogError, LinkEvent, Result};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Turns each persisted original into a link row pointing back at it.
#[derive(Debug, Default)]
pub struct LinkModifier {
    partitions: HashMap<Uuid, i64>,
}

impl LinkModifier {
    /// `partitions` maps each original's id to the id of the leaf partition
    /// holding it.
    pub fn new(partitions: HashMap<Uuid, i64>) -> Self {
        Self { partitions }
    }
}

impl EventModifier for LinkModifier {
    fn modify(&self, original: Event) -> Result<Event> {
        let mut builder = LinkEvent::builder().original(&original);
        if let Some(partition_id) = original.id.and_then(|id| self.partitions.get(&id)) {
            builder = builder.partition_id(*partition_id);
        }
        Ok(builder.build()?.into())
    }
}

/// Replace link rows by the originals they point at.
///
/// Each resolved original carries its link row in [`Event::link`]. Links
/// whose original is gone are returned unchanged. Originals are fetched with
/// one statement: one branch per leaf partition, combined with `UNION ALL`.
pub async fn resolve_links(
    pool: &PgPool,
    catalog: &PgPartitionCatalog,
    events: Vec<Event>,
) -> Result<Vec<Event>> {
    let mut wanted: HashMap<i64, Vec<Uuid>> = HashMap::new();
    for event in events.iter().filter(|event| event.is_link()) {
        if let (Some(partition_id), Some(original_id)) = (event.link_partition_id, event.link_id) {
            wanted.entry(partition_id).or_default().push(original_id);
        }
    }
    if wanted.is_empty() {
        return Ok(events);
    }

    let partition_ids: Vec<i64> = wanted.keys().copied().collect();
    let partitions = catalog.find_by_ids(&partition_ids).await?;
    let branches: Vec<SqlBuilder> = partitions
        .iter()
        .filter_map(|partition| {
            let ids = wanted.get(&partition.id)?;
            Some(
                SqlBuilder::new()
                    .select(qualified_columns(&partition.table_name))
                    .from(partition.table_name.clone())
                    .where_and(
                        &format!("{}.id = ANY(?)", partition.table_name),
                        [ids.clone()],
                    ),
            )
        })
        .collect();

    let Some(statement) = SqlBuilder::union_all(branches) else {
        return Ok(events);
    };
    let rows: Vec<EventRow> = statement
        .render()
        .fetch_all(pool)
        .await
        .map_err(db_error)?;
    debug!(links = events.len(), originals = rows.len(), "resolved link events");

    let originals: HashMap<(Uuid, i64), Event> = rows
        .into_iter()
        .map(|row| ((row.id, row.global_position), Event::from(row)))
        .collect();

    Ok(events
        .into_iter()
        .map(|event| merge(event, &originals))
        .collect())
}

fn merge(event: Event, originals: &HashMap<(Uuid, i64), Event>) -> Event {
    let key = match (event.is_link(), event.link_id, event.link_global_position) {
        (true, Some(id), Some(position)) => (id, position),
        _ => return event,
    };
    match originals.get(&key) {
        Some(original) => {
            let mut original = original.clone();
            original.link = Some(Box::new(event));
            original
        }
        None => event,
    }
}

/// Refuse link targets that cannot be linked to.
pub(crate) fn check_originals(originals: &[Event]) -> Result<()> {
    for original in originals {
        if !original.is_persisted() {
            return Err(EventLogError::InvalidRequest(
                "link target must be a persisted event".to_string(),
            ));
        }
        if original.is_link() {
            return Err(EventLogError::InvalidRequest(
                "link target must not be a link event".to_string(),
            ));
        }
    }
    Ok(())
}
