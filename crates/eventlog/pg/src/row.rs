//! Database row representations.

use chrono::{DateTime, Utc};
use eventlog_core::{Event, Partition};
use uuid::Uuid;

/// Database row representation of an event.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    pub id: Uuid,
    pub context: String,
    pub stream_name: String,
    pub stream_id: String,
    pub global_position: i64,
    pub stream_revision: i32,
    #[sqlx(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
    pub metadata: serde_json::Value,
    pub link_id: Option<Uuid>,
    pub link_partition_id: Option<i64>,
    pub link_global_position: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Self {
            id: Some(row.id),
            event_type: row.event_type,
            global_position: Some(row.global_position),
            context: Some(row.context),
            stream_name: Some(row.stream_name),
            stream_id: Some(row.stream_id),
            stream_revision: Some(row.stream_revision),
            data: row.data,
            metadata: row.metadata,
            link_id: row.link_id,
            link_partition_id: row.link_partition_id,
            link_global_position: row.link_global_position,
            created_at: Some(row.created_at),
            link: None,
        }
    }
}

/// Database row representation of a partition catalog entry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PartitionRow {
    pub id: i64,
    pub context: String,
    pub stream_name: Option<String>,
    pub event_type: Option<String>,
    pub table_name: String,
}

impl From<PartitionRow> for Partition {
    fn from(row: PartitionRow) -> Self {
        Self {
            id: row.id,
            context: row.context,
            stream_name: row.stream_name,
            event_type: row.event_type,
            table_name: row.table_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_row_into_event() {
        let id = Uuid::new_v4();
        let row = EventRow {
            id,
            context: "Order".into(),
            stream_name: "OrderCreated".into(),
            stream_id: "abc".into(),
            global_position: 12,
            stream_revision: 3,
            event_type: "A".into(),
            data: json!({"k": "v"}),
            metadata: json!({}),
            link_id: None,
            link_partition_id: None,
            link_global_position: None,
            created_at: Utc::now(),
        };

        let event: Event = row.into();
        assert_eq!(event.id, Some(id));
        assert_eq!(event.global_position, Some(12));
        assert_eq!(event.stream_revision, Some(3));
        assert_eq!(event.event_type, "A");
        assert!(event.is_persisted());
        assert!(!event.is_link());
    }
}
