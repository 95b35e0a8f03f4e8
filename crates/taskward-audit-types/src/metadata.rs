//! Named metadata attached to an audit event.

use crate::FormatError;
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// A single `(name, value)` pair.
///
/// Serialized on its own, a `Metadata` is the one-field object
/// `{"<name>": <value>}`. Inside an [`Event`](crate::Event) the entries are
/// flattened into the event object instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    name: String,
    value: Value,
}

impl Metadata {
    /// Create a metadata entry.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Create a metadata entry from any serializable value.
    pub fn from_serialize<T: Serialize + ?Sized>(
        name: impl Into<String>,
        value: &T,
    ) -> Result<Self, FormatError> {
        Ok(Self::new(name, serde_json::to_value(value)?))
    }

    /// Entry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entry value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Split into name and value.
    pub fn into_parts(self) -> (String, Value) {
        (self.name, self.value)
    }

    pub(crate) fn from_object(object: Map<String, Value>) -> Result<Self, FormatError> {
        if object.len() != 1 {
            return Err(FormatError::MetadataShape(object.len()));
        }
        let (name, value) = object
            .into_iter()
            .next()
            .ok_or(FormatError::MetadataShape(0))?;
        Ok(Self { name, value })
    }
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.name, &self.value)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let object = Map::<String, Value>::deserialize(deserializer)?;
        Self::from_object(object).map_err(D::Error::custom)
    }
}
