//! Stream identity and stream filters.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the system stream that yields one event per stream.
pub const STREAMS_SYSTEM_STREAM: &str = "$streams";

/// Identity of a stream: `(context, stream_name, stream_id)`.
///
/// Streams are never created explicitly. They exist as soon as the first
/// event is appended to them. Two sentinel shapes exist besides regular
/// streams: the all-stream, which matches every event in the log, and system
/// streams, read-only derived views addressed by a reserved name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stream {
    pub context: String,
    pub stream_name: String,
    pub stream_id: String,
    #[serde(default)]
    kind: StreamKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StreamKind {
    #[default]
    Regular,
    All,
    System,
}

impl Stream {
    /// Create a regular stream.
    pub fn new(
        context: impl Into<String>,
        stream_name: impl Into<String>,
        stream_id: impl Into<String>,
    ) -> Self {
        Self {
            context: context.into(),
            stream_name: stream_name.into(),
            stream_id: stream_id.into(),
            kind: StreamKind::Regular,
        }
    }

    /// The stream that matches every event of the log.
    pub fn all() -> Self {
        Self {
            context: String::new(),
            stream_name: String::new(),
            stream_id: String::new(),
            kind: StreamKind::All,
        }
    }

    /// A virtual, read-only system stream addressed by `name`.
    pub fn system(name: impl Into<String>) -> Self {
        Self {
            context: String::new(),
            stream_name: name.into(),
            stream_id: String::new(),
            kind: StreamKind::System,
        }
    }

    /// Shorthand for the `$streams` system stream.
    pub fn streams() -> Self {
        Self::system(STREAMS_SYSTEM_STREAM)
    }

    pub fn is_all_stream(&self) -> bool {
        self.kind == StreamKind::All
    }

    pub fn is_system_stream(&self) -> bool {
        self.kind == StreamKind::System
    }

    /// Whether the stream addresses real rows of one stream.
    pub fn is_regular(&self) -> bool {
        self.kind == StreamKind::Regular
    }

    /// Regular streams need all three identity parts to be non-empty.
    pub fn is_valid(&self) -> bool {
        match self.kind {
            StreamKind::Regular => {
                !self.context.is_empty()
                    && !self.stream_name.is_empty()
                    && !self.stream_id.is_empty()
            }
            StreamKind::All => true,
            StreamKind::System => self.stream_name.starts_with('$'),
        }
    }

    /// Filter descriptor matching exactly this stream.
    pub fn to_filter(&self) -> StreamFilter {
        StreamFilter {
            context: Some(self.context.clone()),
            stream_name: Some(self.stream_name.clone()),
            stream_id: Some(self.stream_id.clone()),
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            StreamKind::All => write!(f, "$all"),
            StreamKind::System => write!(f, "{}", self.stream_name),
            StreamKind::Regular => write!(
                f,
                "{}/{}/{}",
                self.context, self.stream_name, self.stream_id
            ),
        }
    }
}

/// A stream descriptor used in read filters.
///
/// Only three shapes are accepted: a full `(context, stream_name, stream_id)`
/// triple, `(context, stream_name)`, or `context` alone. See [`StreamFilter::shape`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamFilter {
    pub context: Option<String>,
    pub stream_name: Option<String>,
    pub stream_id: Option<String>,
}

/// The accepted shapes of a [`StreamFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFilterShape {
    /// Context, stream name and stream id.
    Stream,
    /// Context and stream name.
    StreamName,
    /// Context only.
    Context,
}

impl StreamFilter {
    /// Match every stream of a context.
    pub fn context(context: impl Into<String>) -> Self {
        Self {
            context: Some(context.into()),
            ..Self::default()
        }
    }

    /// Match every stream of a context with the given name.
    pub fn stream_name(context: impl Into<String>, stream_name: impl Into<String>) -> Self {
        Self {
            context: Some(context.into()),
            stream_name: Some(stream_name.into()),
            stream_id: None,
        }
    }

    /// Match one stream.
    pub fn stream(
        context: impl Into<String>,
        stream_name: impl Into<String>,
        stream_id: impl Into<String>,
    ) -> Self {
        Self {
            context: Some(context.into()),
            stream_name: Some(stream_name.into()),
            stream_id: Some(stream_id.into()),
        }
    }

    /// The shape of this descriptor, or `None` when it has an unsupported
    /// combination of parts (e.g. a stream id without a stream name).
    pub fn shape(&self) -> Option<StreamFilterShape> {
        let present = |part: &Option<String>| part.as_deref().is_some_and(|v| !v.is_empty());
        match (
            present(&self.context),
            present(&self.stream_name),
            present(&self.stream_id),
        ) {
            (true, true, true) => Some(StreamFilterShape::Stream),
            (true, true, false) => Some(StreamFilterShape::StreamName),
            (true, false, false) => Some(StreamFilterShape::Context),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_kinds() {
        let stream = Stream::new("Order", "OrderCreated", "abc");
        assert!(stream.is_regular());
        assert!(stream.is_valid());
        assert_eq!(stream.to_string(), "Order/OrderCreated/abc");

        assert!(Stream::all().is_all_stream());
        assert!(!Stream::all().is_regular());

        let system = Stream::streams();
        assert!(system.is_system_stream());
        assert!(system.is_valid());
        assert!(!Stream::system("streams").is_valid());
    }

    #[test]
    fn test_sentinel_streams_keep_their_kind_through_serde() {
        for stream in [Stream::all(), Stream::streams()] {
            let value = serde_json::to_value(&stream).unwrap();
            let back: Stream = serde_json::from_value(value).unwrap();
            assert_eq!(back, stream);
            assert!(!back.is_regular());
        }

        let legacy = serde_json::json!({
            "context": "Order",
            "stream_name": "OrderCreated",
            "stream_id": "abc",
        });
        let stream: Stream = serde_json::from_value(legacy).unwrap();
        assert!(stream.is_regular());
    }

    #[test]
    fn test_regular_stream_requires_all_parts() {
        assert!(!Stream::new("Order", "", "abc").is_valid());
        assert!(!Stream::new("", "OrderCreated", "abc").is_valid());
    }

    #[test]
    fn test_filter_shapes() {
        assert_eq!(
            StreamFilter::stream("A", "B", "c").shape(),
            Some(StreamFilterShape::Stream)
        );
        assert_eq!(
            StreamFilter::stream_name("A", "B").shape(),
            Some(StreamFilterShape::StreamName)
        );
        assert_eq!(
            StreamFilter::context("A").shape(),
            Some(StreamFilterShape::Context)
        );

        let id_without_name = StreamFilter {
            context: Some("A".into()),
            stream_name: None,
            stream_id: Some("c".into()),
        };
        assert_eq!(id_without_name.shape(), None);
        assert_eq!(StreamFilter::default().shape(), None);
        assert_eq!(StreamFilter::context("").shape(), None);
    }
}
