//! EventLog port trait definition.

use crate::error::Result;
use crate::event::Event;
use crate::options::{AppendOptions, ReadOptions};
use crate::stream::Stream;
use async_trait::async_trait;

/// Append, read and maintenance operations of the event log.
///
/// # Concurrency Model
///
/// Appends are optimistic:
/// 1. The current last revision of the stream is read inside a serializable
///    transaction.
/// 2. If [`AppendOptions::expected_revision`] does not hold,
///    [`EventLogError::WrongExpectedVersion`](crate::EventLogError::WrongExpectedVersion)
///    is returned.
/// 3. Conflicting concurrent writers are detected by the backend and retried
///    transparently.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append `events` to `stream` in the given order.
    ///
    /// Returns the persisted events with their id, global position and
    /// stream revision assigned.
    async fn append(
        &self,
        stream: &Stream,
        events: Vec<Event>,
        options: AppendOptions,
    ) -> Result<Vec<Event>>;

    /// Read events of a stream, the all-stream or a system stream.
    ///
    /// # Errors
    ///
    /// - `EventLogError::StreamNotFound` if a regular stream has no events.
    async fn read(&self, stream: &Stream, options: ReadOptions) -> Result<Vec<Event>>;

    /// Hard-delete every event of a regular stream.
    ///
    /// Returns `true` if any row was removed.
    async fn delete_stream(&self, stream: &Stream) -> Result<bool>;

    /// Delete one persisted event and renumber the later revisions of its
    /// stream so they stay contiguous.
    ///
    /// Without `force`, refuses when more than the configured number of rows
    /// would need renumbering.
    async fn delete_event(&self, event: &Event, force: bool) -> Result<bool>;
}
