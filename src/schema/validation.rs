//! Declaration validation against a [`Schema`]
//!
//! Runs before any remote call. All findings are collected rather than
//! stopping at the first one.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use url::Url;
use uuid::Uuid;

use super::{AttributeType, Block, Diagnostic, Presence, Schema};

/// Value checks attachable to string attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validator {
    /// Must parse as an absolute `http` or `https` URL with a host
    HttpOrHttpsUrl,
    /// Must not end with `/`
    NoTrailingSlash,
    Uuid,
    /// Must not be empty
    NoZeroValue,
}

impl Validator {
    pub fn check(&self, key: &str, value: &str) -> Result<(), String> {
        match self {
            Validator::HttpOrHttpsUrl => {
                if value.is_empty() {
                    return Err(format!("expected {key:?} url to not be empty, got {value:?}"));
                }
                let parsed = Url::parse(value)
                    .map_err(|err| format!("expected {key:?} to be a valid url, got {value:?}: {err}"))?;
                if parsed.host_str().is_none_or(str::is_empty) {
                    return Err(format!("expected {key:?} to have a host, got {value:?}"));
                }
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(format!(
                        "expected {key:?} to have a url with schema of: \"http,https\", got {value:?}"
                    ));
                }
                Ok(())
            }
            Validator::NoTrailingSlash => {
                if value.ends_with('/') {
                    Err(format!("{key:?} should not end with slash, got {value:?}."))
                } else {
                    Ok(())
                }
            }
            Validator::Uuid => Uuid::parse_str(value)
                .map(|_| ())
                .map_err(|err| format!("expected {key:?} to be a valid UUID, got {value:?}: {err}")),
            Validator::NoZeroValue => {
                if value.is_empty() {
                    Err(format!("{key:?} must not be empty"))
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Validate a declaration (top-level attribute map) against `schema`.
pub fn validate_config(schema: &Schema, config: &Map<String, Value>) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, config, None, &mut diagnostics);
    diagnostics
}

fn validate_block(
    block: &Block,
    values: &Map<String, Value>,
    prefix: Option<&str>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for key in values.keys() {
        if !block.contains(key) {
            diagnostics.push(Diagnostic::attribute_error(
                join_path(prefix, key),
                format!("An argument named {key:?} is not expected here."),
            ));
        }
    }

    let mut groups: BTreeSet<Vec<&'static str>> = BTreeSet::new();

    for (name, attribute) in block.attributes() {
        let path = join_path(prefix, name);

        if !attribute.exactly_one_of.is_empty() {
            let mut group = attribute.exactly_one_of.clone();
            group.sort_unstable();
            groups.insert(group);
        }

        let Some(value) = values.get(name).filter(|value| is_set(value)) else {
            if attribute.presence == Presence::Required {
                diagnostics.push(Diagnostic::attribute_error(
                    path,
                    format!("The argument {name:?} is required, but no definition was found."),
                ));
            }
            continue;
        };

        if attribute.is_computed() {
            diagnostics.push(Diagnostic::attribute_error(
                &path,
                format!(
                    "can't configure a value for {path:?}: its value will be decided automatically"
                ),
            ));
            continue;
        }

        match &attribute.kind {
            AttributeType::String => match value.as_str() {
                Some(text) => {
                    for validator in &attribute.validators {
                        if let Err(message) = validator.check(name, text) {
                            diagnostics.push(Diagnostic::attribute_error(&path, message));
                        }
                    }
                }
                None => diagnostics.push(Diagnostic::attribute_error(
                    &path,
                    format!("expected type of {name:?} to be string"),
                )),
            },
            AttributeType::Map => {
                if !value.is_object() {
                    diagnostics.push(Diagnostic::attribute_error(
                        &path,
                        format!("expected {name:?} to be a map"),
                    ));
                }
            }
            AttributeType::Block(spec) => {
                let Some(items) = value.as_array() else {
                    diagnostics.push(Diagnostic::attribute_error(
                        &path,
                        format!("expected {name:?} to be a list of blocks"),
                    ));
                    continue;
                };
                if items.len() < spec.min_items {
                    diagnostics.push(Diagnostic::attribute_error(
                        &path,
                        format!(
                            "Insufficient {name} blocks: at least {} required",
                            spec.min_items
                        ),
                    ));
                }
                if items.len() > spec.max_items {
                    diagnostics.push(Diagnostic::attribute_error(
                        &path,
                        format!("Too many {name} blocks: no more than {} allowed", spec.max_items),
                    ));
                }
                for (index, item) in items.iter().enumerate() {
                    let item_path = format!("{path}.{index}");
                    match item.as_object() {
                        Some(fields) => {
                            validate_block(&spec.block, fields, Some(&item_path), diagnostics)
                        }
                        None => diagnostics.push(Diagnostic::attribute_error(
                            item_path,
                            format!("expected {name:?} block to be an object"),
                        )),
                    }
                }
            }
        }
    }

    for group in groups {
        let declared: Vec<&str> = group
            .iter()
            .copied()
            .filter(|key| values.get(*key).is_some_and(is_set))
            .collect();
        let listed = group.join(",");
        match declared.len() {
            1 => {}
            0 => diagnostics.push(Diagnostic::attribute_error(
                join_path(prefix, group[0]),
                format!("one of `{listed}` must be specified"),
            )),
            _ => diagnostics.push(Diagnostic::attribute_error(
                join_path(prefix, declared[0]),
                format!(
                    "only one of `{listed}` can be specified, but `{}` were specified.",
                    declared.join(",")
                ),
            )),
        }
    }
}

/// A value counts as declared when it is not null, not an empty string and
/// not an empty list.
pub(crate) fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

fn join_path(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}.{name}"),
        None => name.to_string(),
    }
}
