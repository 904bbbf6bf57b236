//! Shared key/value context with polymorphic attributes.
//!
//! A [`Context`] is a concurrent map from string keys to shared
//! [`Attribute`] values. One context lives with the server for its whole
//! lifetime, one per session inside the session map.

use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

/// Polymorphic value stored in a [`Context`].
///
/// Implemented automatically for any `Clone + Debug + PartialEq + Hash`
/// type, giving attributes value semantics: deep clone, textual
/// representation, type-aware equality and hashing. Downcast through
/// [`Attribute::as_any`] to recover the concrete type.
pub trait Attribute: Send + Sync + fmt::Debug + 'static {
    /// Deep-clone into a fresh shared attribute.
    fn clone_attribute(&self) -> Arc<dyn Attribute>;

    /// Access the concrete type for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Textual representation.
    fn text(&self) -> String {
        format!("{self:?}")
    }

    /// Equality against another attribute; false when types differ.
    fn attr_eq(&self, other: &dyn Attribute) -> bool;

    /// Hash of the underlying value.
    fn hash_value(&self) -> u64;
}

impl<T> Attribute for T
where
    T: Clone + fmt::Debug + PartialEq + Hash + Send + Sync + 'static,
{
    fn clone_attribute(&self) -> Arc<dyn Attribute> {
        Arc::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn attr_eq(&self, other: &dyn Attribute) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn hash_value(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Concurrent attribute map. Reads take a shared lock, writes exclusive.
#[derive(Default)]
pub struct Context {
    map: RwLock<HashMap<String, Arc<dyn Attribute>>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an attribute, cloning the shared handle.
    pub fn attribute(&self, key: &str) -> Option<Arc<dyn Attribute>> {
        self.map.read().unwrap().get(key).cloned()
    }

    /// Insert or replace an attribute.
    pub fn set_attribute(&self, key: impl Into<String>, value: Arc<dyn Attribute>) {
        self.map.write().unwrap().insert(key.into(), value);
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.map.read().unwrap().contains_key(key)
    }

    /// Remove an attribute, returning it when present.
    pub fn remove_attribute(&self, key: &str) -> Option<Arc<dyn Attribute>> {
        self.map.write().unwrap().remove(key)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let map = self.map.read().unwrap();
        f.debug_struct("Context").field("len", &map.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_attribute() {
        let ctx = Context::new();
        ctx.set_attribute("user", Arc::new("alice".to_string()));
        let attr = ctx.attribute("user").unwrap();
        assert_eq!(attr.as_any().downcast_ref::<String>().unwrap(), "alice");
        assert!(ctx.has_attribute("user"));
        assert!(!ctx.has_attribute("missing"));
    }

    #[test]
    fn attribute_value_semantics() {
        let a: Arc<dyn Attribute> = Arc::new(42u64);
        let b = a.clone_attribute();
        assert!(a.attr_eq(b.as_ref()));
        assert_eq!(a.hash_value(), b.hash_value());
        assert_eq!(a.text(), "42");

        let other: Arc<dyn Attribute> = Arc::new("42".to_string());
        assert!(!a.attr_eq(other.as_ref()));
    }

    #[test]
    fn replace_and_remove() {
        let ctx = Context::new();
        ctx.set_attribute("n", Arc::new(1u32));
        ctx.set_attribute("n", Arc::new(2u32));
        let attr = ctx.attribute("n").unwrap();
        assert_eq!(*attr.as_any().downcast_ref::<u32>().unwrap(), 2);

        assert!(ctx.remove_attribute("n").is_some());
        assert!(ctx.attribute("n").is_none());
    }
}
