//! Plan computation
//!
//! Compares a declaration against recorded state using the resource schema.
//! Secret fields are compared through their fingerprint memo so an unchanged
//! declaration never shows a diff even though state holds no plaintext.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::resource_data::ResourceData;
use crate::schema::validation::is_set;
use crate::schema::{Attribute, AttributeType, Block, DiffRule, Schema};
use crate::secrets::{SENSITIVE_PLACEHOLDER, hash_key, suppress_secret_diff};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    NoOp,
    Create,
    Update,
    /// Destroy and re-create, a force-new attribute changed
    Replace,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlanAction::NoOp => "no-op",
            PlanAction::Create => "create",
            PlanAction::Update => "update",
            PlanAction::Replace => "replace",
        })
    }
}

/// One attribute difference. Sensitive values are rendered as a placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeChange {
    pub path: String,
    pub before: Option<String>,
    pub after: Option<String>,
    pub requires_replace: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub action: PlanAction,
    pub changes: Vec<AttributeChange>,
}

impl Plan {
    pub fn is_noop(&self) -> bool {
        self.action == PlanAction::NoOp
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "action: {}", self.action)?;
        for change in &self.changes {
            let marker = if change.requires_replace {
                " (forces replacement)"
            } else {
                ""
            };
            writeln!(
                f,
                "  ~ {}: {} -> {}{}",
                change.path,
                change.before.as_deref().unwrap_or("(none)"),
                change.after.as_deref().unwrap_or("(none)"),
                marker
            )?;
        }
        Ok(())
    }
}

/// Compute the plan for moving `prior` (recorded state, `None` when the
/// resource does not exist) to `config`.
pub fn diff(schema: &Schema, prior: Option<&ResourceData>, config: &ResourceData) -> Plan {
    let empty = Map::new();
    let recorded = prior.map_or(&empty, ResourceData::attributes);

    let mut changes = Vec::new();
    diff_block(&schema.block, recorded, config.attributes(), None, &mut changes);

    let action = match prior {
        None => PlanAction::Create,
        Some(_) if changes.is_empty() => PlanAction::NoOp,
        Some(_) if changes.iter().any(|change| change.requires_replace) => PlanAction::Replace,
        Some(_) => PlanAction::Update,
    };
    Plan { action, changes }
}

fn diff_block(
    block: &Block,
    recorded: &Map<String, Value>,
    declared: &Map<String, Value>,
    prefix: Option<&str>,
    changes: &mut Vec<AttributeChange>,
) {
    for (name, attribute) in block.attributes() {
        if attribute.is_computed() {
            continue;
        }
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{name}"),
            None => name.to_string(),
        };

        match &attribute.kind {
            AttributeType::Block(spec) => {
                let before = first_object(recorded.get(name));
                let after = first_object(declared.get(name));
                match (before, after) {
                    (None, None) => {}
                    (Some(_), None) => changes.push(AttributeChange {
                        path,
                        before: Some(render_block(attribute)),
                        after: None,
                        requires_replace: attribute.force_new,
                    }),
                    (before, Some(after)) => {
                        let empty = Map::new();
                        diff_block(
                            &spec.block,
                            before.unwrap_or(&empty),
                            after,
                            Some(&format!("{path}.0")),
                            changes,
                        );
                    }
                }
            }
            AttributeType::String | AttributeType::Map => {
                if let Some(change) = diff_value(name, path, attribute, recorded, declared) {
                    changes.push(change);
                }
            }
        }
    }
}

fn diff_value(
    name: &str,
    path: String,
    attribute: &Attribute,
    recorded: &Map<String, Value>,
    declared: &Map<String, Value>,
) -> Option<AttributeChange> {
    let before = recorded.get(name).filter(|value| is_set(value)).cloned();
    let after = declared
        .get(name)
        .filter(|value| is_set(value))
        .cloned()
        .or_else(|| attribute.default.clone().map(Value::String));

    let unchanged = match attribute.diff_rule {
        DiffRule::SuppressSecretChanged => {
            let memo = recorded.get(&hash_key(name)).and_then(Value::as_str);
            match after.as_ref().and_then(Value::as_str) {
                Some(secret) => suppress_secret_diff(memo, secret) || before == after,
                None => before.is_none() && memo.is_none_or(str::is_empty),
            }
        }
        DiffRule::Plain => before == after,
    };
    if unchanged {
        return None;
    }

    Some(AttributeChange {
        path,
        before: before.map(|value| render(attribute, &value)),
        after: after.map(|value| render(attribute, &value)),
        requires_replace: attribute.force_new,
    })
}

fn first_object(value: Option<&Value>) -> Option<&Map<String, Value>> {
    value
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(Value::as_object)
}

fn render(attribute: &Attribute, value: &Value) -> String {
    if attribute.sensitive {
        return SENSITIVE_PLACEHOLDER.to_string();
    }
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn render_block(attribute: &Attribute) -> String {
    match attribute.block_spec() {
        Some(spec) if spec.block.attributes().any(|(_, field)| field.sensitive) => {
            SENSITIVE_PLACEHOLDER.to_string()
        }
        _ => "(block)".to_string(),
    }
}
