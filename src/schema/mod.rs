//! Resource schema description
//!
//! Schemas are immutable values. A resource builds its schema by taking a
//! shared base fragment and merging its own attributes on top with
//! [`Block::merge`]; nothing mutates a schema shared with another resource.

pub mod validation;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use validation::{Validator, validate_config};

use crate::secrets::hash_key;

/// Schema revisions of the endpoint resources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaGeneration {
    /// Single flat `access_token` credential
    Legacy,
    /// Credential blocks, URLs must not end with a slash
    Strict,
    /// Credential blocks, trailing slash accepted
    #[default]
    Relaxed,
}

impl SchemaGeneration {
    /// Persisted schema version for this generation.
    pub fn version(&self) -> u32 {
        match self {
            SchemaGeneration::Legacy => 0,
            SchemaGeneration::Strict => 1,
            SchemaGeneration::Relaxed => 2,
        }
    }

    pub fn from_version(version: u32) -> Option<Self> {
        match version {
            0 => Some(SchemaGeneration::Legacy),
            1 => Some(SchemaGeneration::Strict),
            2 => Some(SchemaGeneration::Relaxed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaGeneration::Legacy => "legacy",
            SchemaGeneration::Strict => "strict",
            SchemaGeneration::Relaxed => "relaxed",
        }
    }
}

impl fmt::Display for SchemaGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaGeneration {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "legacy" | "0" => Ok(SchemaGeneration::Legacy),
            "strict" | "1" => Ok(SchemaGeneration::Strict),
            "relaxed" | "2" => Ok(SchemaGeneration::Relaxed),
            other => Err(format!(
                "unknown schema generation '{other}', expected legacy, strict or relaxed"
            )),
        }
    }
}

/// Whether a value comes from the declaration, the server, or either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
    Computed,
}

/// How plan computes a diff for an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffRule {
    /// Compare declared and recorded values directly
    Plain,
    /// Compare the declared value's fingerprint against the `<name>_hash` memo
    SuppressSecretChanged,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeType {
    String,
    /// Map of strings, only produced by the server
    Map,
    /// Nested block encoded as a list of objects
    Block(BlockSpec),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockSpec {
    pub block: Block,
    pub min_items: usize,
    pub max_items: usize,
}

/// A single attribute description.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub kind: AttributeType,
    pub presence: Presence,
    /// Never rendered in plans or logs
    pub sensitive: bool,
    /// Changing the value replaces the remote object
    pub force_new: bool,
    pub default: Option<String>,
    pub description: &'static str,
    pub validators: Vec<Validator>,
    pub diff_rule: DiffRule,
    /// Group of sibling attributes of which exactly one must be declared
    pub exactly_one_of: Vec<&'static str>,
}

impl Attribute {
    fn new(kind: AttributeType, presence: Presence) -> Self {
        Self {
            kind,
            presence,
            sensitive: false,
            force_new: false,
            default: None,
            description: "",
            validators: Vec::new(),
            diff_rule: DiffRule::Plain,
            exactly_one_of: Vec::new(),
        }
    }

    pub fn required_string() -> Self {
        Self::new(AttributeType::String, Presence::Required)
    }

    pub fn optional_string() -> Self {
        Self::new(AttributeType::String, Presence::Optional)
    }

    pub fn computed_string() -> Self {
        Self::new(AttributeType::String, Presence::Computed)
    }

    pub fn computed_map() -> Self {
        Self::new(AttributeType::Map, Presence::Computed)
    }

    /// Optional single nested block (`min_items = max_items = 1`).
    pub fn optional_block(block: Block) -> Self {
        Self::new(
            AttributeType::Block(BlockSpec {
                block,
                min_items: 1,
                max_items: 1,
            }),
            Presence::Optional,
        )
    }

    pub fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn with_default<S: Into<String>>(mut self, default: S) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn suppress_secret_changes(mut self) -> Self {
        self.diff_rule = DiffRule::SuppressSecretChanged;
        self
    }

    pub fn exactly_one_of(mut self, group: &[&'static str]) -> Self {
        self.exactly_one_of = group.to_vec();
        self
    }

    pub fn is_computed(&self) -> bool {
        self.presence == Presence::Computed
    }

    pub fn block_spec(&self) -> Option<&BlockSpec> {
        match &self.kind {
            AttributeType::Block(spec) => Some(spec),
            _ => None,
        }
    }
}

/// Ordered set of named attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    attributes: BTreeMap<String, Attribute>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute<S: Into<String>>(mut self, name: S, attribute: Attribute) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    /// Adds a write-only secret plus its computed fingerprint memo.
    pub fn with_secret(self, name: &str, description: &'static str) -> Self {
        self.with_attribute(
            name,
            Attribute::required_string()
                .with_description(description)
                .sensitive()
                .suppress_secret_changes(),
        )
        .with_attribute(
            hash_key(name),
            Attribute::computed_string()
                .with_description("A SHA-256 fingerprint of the attribute value")
                .sensitive(),
        )
    }

    /// Functional merge; attributes of `other` win on name collisions.
    pub fn merge(mut self, other: Block) -> Self {
        self.attributes.extend(other.attributes);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.attributes
            .iter()
            .map(|(name, attribute)| (name.as_str(), attribute))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }
}

/// Versioned top-level schema of a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub version: u32,
    pub block: Block,
}

impl Schema {
    pub fn new(generation: SchemaGeneration, block: Block) -> Self {
        Self {
            version: generation.version(),
            block,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.block.attribute(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.block.attributes()
    }
}

/// A validation error, optionally tied to an attribute path such as
/// `authentication_token.0.token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    pub fn error<S: Into<String>>(summary: S) -> Self {
        Self {
            summary: summary.into(),
            attribute: None,
        }
    }

    pub fn attribute_error<P: Into<String>, S: Into<String>>(path: P, summary: S) -> Self {
        Self {
            summary: summary.into(),
            attribute: Some(path.into()),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.attribute {
            Some(path) => write!(f, "{}: {}", path, self.summary),
            None => f.write_str(&self.summary),
        }
    }
}
