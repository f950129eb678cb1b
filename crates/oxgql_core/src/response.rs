//! The single response shape shared by every transport.

use crate::error::{ErrorList, GqlError};
use futures::stream::BoxStream;
use indexmap::IndexMap;
use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A complete GraphQL response.
///
/// Serialization is ordered and shape-stable: `errors` appears first and
/// only when non-empty, `data` always appears (null when execution did not
/// produce a result), and `extensions` appears last and only when non-empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub data: Value,
    pub errors: ErrorList,
    pub extensions: IndexMap<String, Value>,
}

impl Response {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    pub fn from_error(err: GqlError) -> Self {
        Self::from_errors(vec![err])
    }

    pub fn from_errors(errors: ErrorList) -> Self {
        Self {
            data: Value::Null,
            errors,
            ..Self::default()
        }
    }

    /// Attaches a response extension entry.
    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if !self.errors.is_empty() {
            map.serialize_entry("errors", &self.errors)?;
        }
        map.serialize_entry("data", &self.data)?;
        if !self.extensions.is_empty() {
            map.serialize_entry("extensions", &self.extensions)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Response {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Wire {
            #[serde(default)]
            data: Value,
            #[serde(default)]
            errors: ErrorList,
            #[serde(default)]
            extensions: IndexMap<String, Value>,
        }
        let wire = Wire::deserialize(deserializer)?;
        Ok(Self {
            data: wire.data,
            errors: wire.errors,
            extensions: wire.extensions,
        })
    }
}

/// The stream a subscription dispatch yields; queries and mutations emit a
/// single item and close.
pub type ResponseStream = BoxStream<'static, Response>;
