//! Append and read options.

use crate::error::{EventLogError, Result};
use crate::stream::{Stream, StreamFilter};
use serde::{Deserialize, Serialize};

/// Default number of events returned by a read.
pub const DEFAULT_MAX_COUNT: i64 = 1000;

/// Optimistic concurrency precondition of an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedRevision {
    /// No check.
    #[default]
    Any,
    /// The stream must be empty.
    NoStream,
    /// The stream must have at least one event.
    StreamExists,
    /// The last revision of the stream must equal this value.
    Exact(i32),
}

impl ExpectedRevision {
    /// Check the precondition against the current last revision of `stream`
    /// (`None` when the stream is empty).
    pub fn validate(&self, stream: &Stream, current: Option<i32>) -> Result<()> {
        let ok = match (self, current) {
            (Self::Any, _) => true,
            (Self::NoStream, current) => current.is_none(),
            (Self::StreamExists, current) => current.is_some(),
            (Self::Exact(expected), Some(current)) => *expected == current,
            (Self::Exact(_), None) => false,
        };

        if ok {
            Ok(())
        } else {
            Err(EventLogError::wrong_expected_version(
                stream.clone(),
                *self,
                current,
            ))
        }
    }
}

/// Options of an append.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendOptions {
    pub expected_revision: ExpectedRevision,
}

impl AppendOptions {
    pub fn expected_revision(expected_revision: ExpectedRevision) -> Self {
        Self { expected_revision }
    }
}

/// Read direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    pub fn is_forward(&self) -> bool {
        matches!(self, Direction::Forward)
    }

    /// SQL ordering keyword.
    pub fn sql(&self) -> &'static str {
        match self {
            Direction::Forward => "ASC",
            Direction::Backward => "DESC",
        }
    }

    /// Comparison operator used for the start bound.
    pub fn bound_operator(&self) -> &'static str {
        match self {
            Direction::Forward => ">=",
            Direction::Backward => "<=",
        }
    }
}

/// Stream and event-type filter of a read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadFilter {
    /// OR-combined stream descriptors.
    #[serde(default)]
    pub streams: Vec<StreamFilter>,
    /// OR-combined event types.
    #[serde(default)]
    pub event_types: Vec<String>,
}

impl ReadFilter {
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty() && self.event_types.is_empty()
    }
}

/// Options of a read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    pub direction: Direction,
    /// Start revision, used when reading a single stream.
    pub from_revision: Option<i32>,
    /// Start global position, used when reading the all-stream or a system stream.
    pub from_position: Option<i64>,
    pub max_count: i64,
    pub filter: ReadFilter,
    pub resolve_link_tos: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            direction: Direction::Forward,
            from_revision: None,
            from_position: None,
            max_count: DEFAULT_MAX_COUNT,
            filter: ReadFilter::default(),
            resolve_link_tos: false,
        }
    }
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backward(mut self) -> Self {
        self.direction = Direction::Backward;
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn from_revision(mut self, revision: i32) -> Self {
        self.from_revision = Some(revision);
        self
    }

    pub fn from_position(mut self, position: i64) -> Self {
        self.from_position = Some(position);
        self
    }

    pub fn max_count(mut self, max_count: i64) -> Self {
        self.max_count = max_count;
        self
    }

    pub fn with_streams(mut self, streams: Vec<StreamFilter>) -> Self {
        self.filter.streams = streams;
        self
    }

    pub fn with_event_types<I, S>(mut self, event_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.event_types = event_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn resolve_link_tos(mut self) -> Self {
        self.resolve_link_tos = true;
        self
    }

    /// The limit actually applied, falling back to the default for
    /// non-positive values.
    pub fn effective_max_count(&self) -> i64 {
        if self.max_count > 0 {
            self.max_count
        } else {
            DEFAULT_MAX_COUNT
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> Stream {
        Stream::new("Order", "OrderCreated", "abc")
    }

    #[test]
    fn test_any_always_passes() {
        assert!(ExpectedRevision::Any.validate(&stream(), None).is_ok());
        assert!(ExpectedRevision::Any.validate(&stream(), Some(5)).is_ok());
    }

    #[test]
    fn test_no_stream_fails_on_non_empty_stream() {
        assert!(ExpectedRevision::NoStream.validate(&stream(), None).is_ok());
        let err = ExpectedRevision::NoStream
            .validate(&stream(), Some(0))
            .unwrap_err();
        assert!(err.is_wrong_expected_version());
    }

    #[test]
    fn test_stream_exists_fails_on_empty_stream() {
        assert!(ExpectedRevision::StreamExists
            .validate(&stream(), Some(0))
            .is_ok());
        assert!(ExpectedRevision::StreamExists
            .validate(&stream(), None)
            .is_err());
    }

    #[test]
    fn test_exact_revision() {
        assert!(ExpectedRevision::Exact(2).validate(&stream(), Some(2)).is_ok());
        assert!(ExpectedRevision::Exact(0).validate(&stream(), None).is_err());

        match ExpectedRevision::Exact(0).validate(&stream(), Some(2)) {
            Err(EventLogError::WrongExpectedVersion {
                expected, actual, ..
            }) => {
                assert_eq!(expected, ExpectedRevision::Exact(0));
                assert_eq!(actual, Some(2));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_read_options_defaults() {
        let options = ReadOptions::default();
        assert_eq!(options.direction, Direction::Forward);
        assert_eq!(options.max_count, DEFAULT_MAX_COUNT);
        assert!(options.filter.is_empty());
        assert_eq!(ReadOptions::new().max_count(0).effective_max_count(), 1000);
        assert_eq!(ReadOptions::new().max_count(5).effective_max_count(), 5);
    }

    #[test]
    fn test_direction_sql() {
        assert_eq!(Direction::Forward.sql(), "ASC");
        assert_eq!(Direction::Backward.bound_operator(), "<=");
    }
}
