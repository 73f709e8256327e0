//! Serialization middleware hooks.
//!
//! A [`Middleware`] may rewrite an event right before it is persisted
//! (`serialize`) and right after it is read back (`deserialize`), e.g. to
//! encrypt payloads. The engine only calls the hooks; concrete middlewares
//! live with the application.

use crate::error::Result;
use crate::event::Event;
use std::fmt;
use std::sync::Arc;

/// A pair of hooks around persistence and hydration.
pub trait Middleware: Send + Sync {
    /// Called on every event before it is written.
    fn serialize(&self, _event: &mut Event) -> Result<()> {
        Ok(())
    }

    /// Called on every event after it is read.
    fn deserialize(&self, _event: &mut Event) -> Result<()> {
        Ok(())
    }
}

/// Ordered list of middlewares.
///
/// `serialize` runs in registration order, `deserialize` in reverse order so
/// that the first middleware sees the outermost representation.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("len", &self.middlewares.len())
            .finish()
    }
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware to the end of the chain.
    pub fn with(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    pub fn serialize(&self, event: &mut Event) -> Result<()> {
        for middleware in &self.middlewares {
            middleware.serialize(event)?;
        }
        Ok(())
    }

    pub fn deserialize(&self, event: &mut Event) -> Result<()> {
        for middleware in self.middlewares.iter().rev() {
            middleware.deserialize(event)?;
        }
        Ok(())
    }

    /// Run `deserialize` on every event of a read result.
    pub fn deserialize_all(&self, events: &mut [Event]) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        for event in events.iter_mut() {
            self.deserialize(event)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    struct Tag(&'static str);

    impl Middleware for Tag {
        fn serialize(&self, event: &mut Event) -> Result<()> {
            let trail = event.metadata["trail"].as_str().unwrap_or("").to_string();
            event.metadata = json!({"trail": format!("{trail}{}", self.0)});
            Ok(())
        }

        fn deserialize(&self, event: &mut Event) -> Result<()> {
            let trail = event.metadata["trail"].as_str().unwrap_or("").to_string();
            event.metadata = json!({"trail": format!("{trail}{}", self.0.to_uppercase())});
            Ok(())
        }
    }

    struct Noop;

    impl Middleware for Noop {}

    #[test]
    fn test_chain_order() {
        let chain = MiddlewareChain::new()
            .with(Arc::new(Tag("a")))
            .with(Arc::new(Tag("b")));

        let mut event = Event::new("A");
        chain.serialize(&mut event).unwrap();
        assert_eq!(event.metadata["trail"], json!("ab"));

        chain.deserialize(&mut event).unwrap();
        assert_eq!(event.metadata["trail"], json!("abBA"));
    }

    #[test]
    fn test_default_hooks_leave_event_untouched() {
        let chain = MiddlewareChain::new().with(Arc::new(Noop));
        let mut events = vec![Event::new("A").with_data(json!({"k": 1}))];
        chain.deserialize_all(&mut events).unwrap();
        assert_eq!(events[0].data, json!({"k": 1}));
        assert_eq!(events[0].metadata, Value::Object(Default::default()));
    }
}
