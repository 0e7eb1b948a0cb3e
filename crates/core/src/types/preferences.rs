//! Free-form user preference document.
//!
//! The shape of a user's preferences is not constrained by the store: the
//! document is persisted as JSONB and treated as an opaque map of keys to
//! arbitrary JSON values. The only rule is that the top level is an object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Errors that can occur when building [`Preferences`] from raw JSON.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PreferencesError {
    /// The document is not a JSON object.
    #[error("preferences must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// A user's preference document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Preferences(Map<String, Value>);

impl Preferences {
    /// An empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an arbitrary JSON value; only objects are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`PreferencesError::NotAnObject`] for any other JSON type.
    pub fn from_value(value: Value) -> Result<Self, PreferencesError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Err(PreferencesError::NotAnObject("null")),
            Value::Bool(_) => Err(PreferencesError::NotAnObject("boolean")),
            Value::Number(_) => Err(PreferencesError::NotAnObject("number")),
            Value::String(_) => Err(PreferencesError::NotAnObject("string")),
            Value::Array(_) => Err(PreferencesError::NotAnObject("array")),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a key, returning the previous value if any.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Shallow merge: keys in `other` overwrite keys here, a `null` in
    /// `other` deletes the key.
    pub fn merge(&mut self, other: Self) {
        for (key, value) in other.0 {
            if value.is_null() {
                self.0.remove(&key);
            } else {
                self.0.insert(key, value);
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Convert into a JSON value for storage.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}
