//! Error types for the event log.
//!
//! [`EventLogError`] covers both the failures surfaced to callers
//! (wrong expected revision, missing stream, system stream mutation, too many
//! records to lock) and the internal conditions the transaction coordinator
//! recovers from (serialization conflicts, partition races, missing
//! partitions, a dropped connection).

use crate::options::ExpectedRevision;
use crate::stream::Stream;

/// Errors that can occur when operating on the event log.
#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    /// Optimistic concurrency check failed on append.
    #[error("{}", wrong_expected_version_message(.stream, .expected, .actual))]
    WrongExpectedVersion {
        /// The stream the append targeted.
        stream: Stream,
        /// The expectation supplied by the caller.
        expected: ExpectedRevision,
        /// The last revision of the stream, `None` when the stream is empty.
        actual: Option<i32>,
    },

    /// A named stream was read but has no events.
    #[error("Stream {stream} does not exist")]
    StreamNotFound {
        /// The stream that was not found.
        stream: Stream,
    },

    /// A system stream (or the all-stream) was targeted by a mutation.
    #[error("Stream {stream} is a system stream and cannot be modified")]
    SystemStream {
        /// The offending stream.
        stream: Stream,
    },

    /// Deleting an event would renumber more rows than allowed.
    #[error(
        "Deleting the event would lock {count} records of stream {stream}; pass force to proceed"
    )]
    TooManyRecordsToLock {
        /// The stream of the event being deleted.
        stream: Stream,
        /// Number of later events that would be renumbered.
        count: i64,
    },

    /// Events could not be inserted because their leaf partitions do not exist.
    #[error("Missing partitions for stream {stream}: {event_types:?}")]
    MissingPartitions {
        /// Stream the insert targeted.
        stream: Stream,
        /// Distinct event types of the batch, in first-seen order.
        event_types: Vec<String>,
    },

    /// Serialization failure or deadlock detected by the backend.
    #[error("Serialization conflict: {0}")]
    SerializationConflict(String),

    /// Two writers raced to create the same partition.
    #[error("Partition race: {0}")]
    PartitionRace(String),

    /// The connection to the backend was lost.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The transaction kept conflicting until the retry budget was spent.
    #[error("Transaction gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// The error of the final attempt.
        last: Box<EventLogError>,
    },

    /// A read or query request was malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A middleware hook failed.
    #[error("Middleware error: {0}")]
    Middleware(String),

    /// Payload encoding failure.
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Backend-specific error.
    #[error("Backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl EventLogError {
    /// Create a wrong expected version error.
    pub fn wrong_expected_version(
        stream: Stream,
        expected: ExpectedRevision,
        actual: Option<i32>,
    ) -> Self {
        Self::WrongExpectedVersion {
            stream,
            expected,
            actual,
        }
    }

    /// Create a stream not found error.
    pub fn stream_not_found(stream: Stream) -> Self {
        Self::StreamNotFound { stream }
    }

    /// Create a system stream error.
    pub fn system_stream(stream: Stream) -> Self {
        Self::SystemStream { stream }
    }

    /// Wrap an arbitrary backend error.
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }

    /// Whether the whole transaction should be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SerializationConflict(_) | Self::PartitionRace(_)
        )
    }

    /// Whether the error is a dropped connection.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }

    /// Check if this is a wrong expected version error.
    pub fn is_wrong_expected_version(&self) -> bool {
        matches!(self, Self::WrongExpectedVersion { .. })
    }
}

fn wrong_expected_version_message(
    stream: &Stream,
    expected: &ExpectedRevision,
    actual: &Option<i32>,
) -> String {
    match (expected, actual) {
        (ExpectedRevision::StreamExists, None) => {
            format!("Expected stream {stream} to exist, but it doesn't")
        }
        (ExpectedRevision::NoStream, Some(revision)) => format!(
            "Expected stream {stream} to be absent, but it actually exists (last revision {revision})"
        ),
        (ExpectedRevision::Exact(expected), None) => format!(
            "Expected stream {stream} to be at revision {expected}, but the stream does not exist"
        ),
        (ExpectedRevision::Exact(expected), Some(revision)) => format!(
            "Expected stream {stream} to be at revision {expected}, but it is at revision {revision}"
        ),
        (expected, actual) => format!(
            "Wrong expected revision {expected:?} for stream {stream} (actual {actual:?})"
        ),
    }
}

/// Result type with [`EventLogError`].
pub type Result<T, E = EventLogError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> Stream {
        Stream::new("Order", "OrderCreated", "abc")
    }

    #[test]
    fn test_wrong_expected_version_messages() {
        let absent =
            EventLogError::wrong_expected_version(stream(), ExpectedRevision::StreamExists, None);
        assert!(absent.to_string().contains("to exist"));

        let exists =
            EventLogError::wrong_expected_version(stream(), ExpectedRevision::NoStream, Some(2));
        assert!(exists.to_string().contains("to be absent"));

        let no_stream =
            EventLogError::wrong_expected_version(stream(), ExpectedRevision::Exact(0), None);
        assert!(no_stream.to_string().contains("does not exist"));

        let mismatch =
            EventLogError::wrong_expected_version(stream(), ExpectedRevision::Exact(0), Some(2));
        assert_eq!(
            mismatch.to_string(),
            "Expected stream Order/OrderCreated/abc to be at revision 0, but it is at revision 2"
        );
    }

    #[test]
    fn test_classification() {
        assert!(EventLogError::SerializationConflict("40001".into()).is_retryable());
        assert!(EventLogError::PartitionRace("23505".into()).is_retryable());
        assert!(!EventLogError::ConnectionLost("io".into()).is_retryable());
        assert!(EventLogError::ConnectionLost("io".into()).is_connection_lost());
        assert!(!EventLogError::stream_not_found(stream()).is_retryable());
    }
}
