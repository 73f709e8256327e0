//! Events and link events.
//!
//! An [`Event`] is one fact in the log. Fields assigned by the backend
//! (`global_position`, `stream_revision`, `created_at`) are `None` until the
//! event has been persisted. A [`LinkEvent`] is the immutable description of
//! an event pointing back to an already persisted original.

use crate::error::{EventLogError, Result};
use crate::stream::Stream;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Event type marking link events.
pub const LINK_EVENT_TYPE: &str = "$>";

/// One fact in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Option<Uuid>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub global_position: Option<i64>,
    pub context: Option<String>,
    pub stream_name: Option<String>,
    pub stream_id: Option<String>,
    pub stream_revision: Option<i32>,
    pub data: Value,
    pub metadata: Value,
    pub link_id: Option<Uuid>,
    pub link_partition_id: Option<i64>,
    pub link_global_position: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    /// The link row an original was reached through, set by batch link
    /// resolution only.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub link: Option<Box<Event>>,
}

impl Event {
    /// Create a new, not yet persisted event with empty payloads.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            id: None,
            event_type: event_type.into(),
            global_position: None,
            context: None,
            stream_name: None,
            stream_id: None,
            stream_revision: None,
            data: Value::Object(Default::default()),
            metadata: Value::Object(Default::default()),
            link_id: None,
            link_partition_id: None,
            link_global_position: None,
            created_at: None,
            link: None,
        }
    }

    /// Set a client-supplied id.
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether this event is a link to another event.
    pub fn is_link(&self) -> bool {
        self.event_type == LINK_EVENT_TYPE && self.link_id.is_some()
    }

    /// Whether the backend has assigned a position to this event.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some() && self.global_position.is_some()
    }

    /// The stream this event belongs to, once persisted.
    pub fn stream(&self) -> Option<Stream> {
        match (&self.context, &self.stream_name, &self.stream_id) {
            (Some(context), Some(stream_name), Some(stream_id)) => {
                Some(Stream::new(context, stream_name, stream_id))
            }
            _ => None,
        }
    }
}

/// Immutable description of a link to a persisted original event.
///
/// The link row stores back-references only: `link_id` is the original's
/// id, `link_global_position` its global position and `link_partition_id`
/// the id of the leaf partition holding it. Originals are never updated, so
/// finding the links of an original means scanning for rows whose `link_id`
/// matches it; only the link-to-original direction is a direct lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkEvent {
    original_id: Uuid,
    original_global_position: i64,
    original_partition_id: i64,
}

impl LinkEvent {
    pub fn builder() -> LinkEventBuilder {
        LinkEventBuilder::default()
    }

    pub fn original_id(&self) -> Uuid {
        self.original_id
    }

    pub fn original_global_position(&self) -> i64 {
        self.original_global_position
    }

    pub fn original_partition_id(&self) -> i64 {
        self.original_partition_id
    }
}

impl From<LinkEvent> for Event {
    fn from(link: LinkEvent) -> Self {
        let mut event = Event::new(LINK_EVENT_TYPE);
        event.link_id = Some(link.original_id);
        event.link_global_position = Some(link.original_global_position);
        event.link_partition_id = Some(link.original_partition_id);
        event
    }
}

/// Builder for [`LinkEvent`].
#[derive(Debug, Default)]
pub struct LinkEventBuilder {
    original_id: Option<Uuid>,
    original_global_position: Option<i64>,
    original_partition_id: Option<i64>,
}

impl LinkEventBuilder {
    /// Take the back-references from a persisted original event.
    pub fn original(mut self, event: &Event) -> Self {
        self.original_id = event.id;
        self.original_global_position = event.global_position;
        self
    }

    /// Leaf partition that holds the original.
    pub fn partition_id(mut self, partition_id: i64) -> Self {
        self.original_partition_id = Some(partition_id);
        self
    }

    pub fn build(self) -> Result<LinkEvent> {
        match (
            self.original_id,
            self.original_global_position,
            self.original_partition_id,
        ) {
            (Some(original_id), Some(original_global_position), Some(original_partition_id)) => {
                Ok(LinkEvent {
                    original_id,
                    original_global_position,
                    original_partition_id,
                })
            }
            (None, _, _) | (_, None, _) => Err(EventLogError::InvalidRequest(
                "link target must be a persisted event".to_string(),
            )),
            (_, _, None) => Err(EventLogError::InvalidRequest(
                "link target partition is unknown".to_string(),
            )),
        }
    }
}
