//! Action identifiers and the payloads they tag.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FluxError;

/// Identifies one action method of one action set instance.
///
/// Built as `"<instance id>-<method name>"`, see [`ActionSet`](crate::ActionSet).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(Arc<str>);

impl ActionId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub(crate) fn for_method(base_id: &str, method: &str) -> Self {
        Self::new(format!("{base_id}-{method}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ActionId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ActionId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(ActionId::from)
    }
}

impl From<&str> for ActionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ActionId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl From<&ActionId> for ActionId {
    fn from(id: &ActionId) -> Self {
        id.clone()
    }
}

impl PartialEq<str> for ActionId {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for ActionId {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

/// What the dispatcher hands to every store: which action fired, and the
/// value it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    pub action_id: ActionId,
    pub body: Value,
}

impl Payload {
    pub fn new(action_id: impl Into<ActionId>, body: Value) -> Self {
        Self {
            action_id: action_id.into(),
            body,
        }
    }

    pub fn action_id(&self) -> &ActionId {
        &self.action_id
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// True when this payload was produced by `action_id`.
    pub fn is(&self, action_id: &ActionId) -> bool {
        &self.action_id == action_id
    }

    /// Decode the body into a concrete type.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, FluxError> {
        Ok(T::deserialize(&self.body)?)
    }
}
