//! Dynamic resource attributes
//!
//! [`ResourceData`] holds either a declaration or persisted state as a JSON
//! attribute map, with nested blocks encoded as single-element lists.
//! [`ResourceState`] is the on-disk form of a managed resource.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::schema::validation::is_set;

#[derive(Clone, Default, PartialEq)]
pub struct ResourceData {
    id: Option<String>,
    attributes: Map<String, Value>,
}

impl ResourceData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_attributes(attributes: Map<String, Value>) -> Self {
        Self {
            id: None,
            attributes,
        }
    }

    /// Build from a JSON object; any other JSON value is rejected.
    pub fn from_value(value: Value) -> Result<Self, ProviderError> {
        match value {
            Value::Object(attributes) => Ok(Self::from_attributes(attributes)),
            other => Err(ProviderError::InvalidState(format!(
                "expected an attribute object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id<S: Into<String>>(&mut self, id: S) {
        self.id = Some(id.into());
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Raw value, `None` when absent or null.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key).filter(|value| !value.is_null())
    }

    /// Value only if it is declared with a non-zero value (non-empty string or list).
    pub fn get_ok(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key).filter(|value| is_set(value))
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// First element of a nested block list, if the block is declared.
    pub fn get_block(&self, key: &str) -> Option<&Map<String, Value>> {
        self.get_ok(key)
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(Value::as_object)
    }

    pub fn set<V: Into<Value>>(&mut self, key: &str, value: V) {
        self.attributes.insert(key.to_string(), value.into());
    }

    /// Replace a nested block with a single element.
    pub fn set_block(&mut self, key: &str, block: Map<String, Value>) {
        self.attributes
            .insert(key.to_string(), Value::Array(vec![Value::Object(block)]));
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }
}

/// Keys only; values may contain secrets.
impl fmt::Debug for ResourceData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceData")
            .field("id", &self.id)
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A resource as written to a state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub resource_type: String,
    pub schema_version: u32,
    pub id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl ResourceState {
    pub fn from_data(
        resource_type: &str,
        schema_version: u32,
        data: &ResourceData,
    ) -> Result<Self, ProviderError> {
        let id = data
            .id()
            .ok_or_else(|| ProviderError::InvalidState("resource has no id".to_string()))?;
        Ok(Self {
            resource_type: resource_type.to_string(),
            schema_version,
            id: id.to_string(),
            attributes: data.attributes().clone(),
        })
    }

    pub fn into_data(self) -> ResourceData {
        let mut data = ResourceData::from_attributes(self.attributes);
        data.set_id(self.id);
        data
    }
}

/// A resource as declared by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub resource_type: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Declaration {
    pub fn to_data(&self) -> ResourceData {
        ResourceData::from_attributes(self.attributes.clone())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
