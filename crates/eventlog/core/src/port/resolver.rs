//! Event class resolution.
//!
//! The hydration layer maps the `type` string of a stored event to a concrete
//! application type. The mapping is an explicit registration, never a lookup
//! by reflection.

use std::collections::HashMap;

/// Maps an event type string to the class the hydration layer should build.
pub trait EventClassResolver: Send + Sync {
    type Class;

    fn resolve(&self, event_type: &str) -> Self::Class;
}

/// Map-backed [`EventClassResolver`] with a fallback for unknown types.
#[derive(Debug, Clone)]
pub struct TypeRegistry<C> {
    classes: HashMap<String, C>,
    fallback: C,
}

impl<C: Clone> TypeRegistry<C> {
    pub fn new(fallback: C) -> Self {
        Self {
            classes: HashMap::new(),
            fallback,
        }
    }

    pub fn register(mut self, event_type: impl Into<String>, class: C) -> Self {
        self.classes.insert(event_type.into(), class);
        self
    }

    pub fn is_registered(&self, event_type: &str) -> bool {
        self.classes.contains_key(event_type)
    }
}

impl<C: Clone + Send + Sync> EventClassResolver for TypeRegistry<C> {
    type Class = C;

    fn resolve(&self, event_type: &str) -> C {
        self.classes
            .get(event_type)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}
