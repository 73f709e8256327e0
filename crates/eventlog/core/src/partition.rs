//! Partition catalog rows.

use serde::{Deserialize, Serialize};

/// Level of a partition in the context → stream name → event type forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionLevel {
    Context,
    StreamName,
    EventType,
}

impl PartitionLevel {
    /// Prefix of the physical table names on this level.
    pub fn table_prefix(&self) -> &'static str {
        match self {
            PartitionLevel::Context => "contexts",
            PartitionLevel::StreamName => "stream_names",
            PartitionLevel::EventType => "event_types",
        }
    }

    /// Column the children of a partition on this level are listed by.
    pub fn child_partition_key(&self) -> Option<&'static str> {
        match self {
            PartitionLevel::Context => Some("stream_name"),
            PartitionLevel::StreamName => Some("type"),
            PartitionLevel::EventType => None,
        }
    }
}

/// A catalog row describing one physical storage segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partition {
    pub id: i64,
    pub context: String,
    pub stream_name: Option<String>,
    pub event_type: Option<String>,
    pub table_name: String,
}

impl Partition {
    pub fn level(&self) -> PartitionLevel {
        match (&self.stream_name, &self.event_type) {
            (Some(_), Some(_)) => PartitionLevel::EventType,
            (Some(_), None) => PartitionLevel::StreamName,
            _ => PartitionLevel::Context,
        }
    }

    /// Leaf partitions are the ones event rows physically land in.
    pub fn is_leaf(&self) -> bool {
        self.level() == PartitionLevel::EventType
    }
}
