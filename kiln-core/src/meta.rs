//! Per-request extension bag

use std::any::Any;
use std::collections::HashMap;

/// Meta key holding the [`Variables`] captured by the matched route
pub const VARIABLES: &str = "variables";
/// Meta key holding the path of an internal redirect
pub const INTERNAL_REDIRECT: &str = "internal_redirect";
/// Meta key holding the name of an alternate generator
pub const ALTERNATE_OUTCOME: &str = "alternate_outcome";
/// Meta key holding the resolved path of a static file
pub const FILE: &str = "file";

/// Route variables captured from the request path
pub type Variables = HashMap<String, String>;

/// String-keyed bag of typed values attached to a request.
#[derive(Default)]
pub struct Meta {
    values: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Meta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    /// Borrow a value if it exists and has type `T`
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|value| value.downcast_ref())
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|value| value.downcast_mut())
    }

    /// Take a value out if it has type `T`; a value of another type is kept
    pub fn remove<T: Any>(&mut self, key: &str) -> Option<T> {
        if !self.values.get(key).is_some_and(|value| value.is::<T>()) {
            return None;
        }
        self.values
            .remove(key)
            .and_then(|value| value.downcast().ok())
            .map(|boxed| *boxed)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

impl std::fmt::Debug for Meta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}
