//! Rule text → [`RuleModel`].
//!
//! Accepts the two syntaxes an ACL policy may be stored in:
//!
//! ```hcl
//! service "web" { policy = "write" }
//! service_prefix "" { policy = "read" }
//! ```
//!
//! ```json
//! {"service": {"web": {"policy": "write"}}, "service_prefix": {"": {"policy": "read"}}}
//! ```
//!
//! Blocks other than `service` / `service_prefix` are ignored. A policy with
//! no service rules is rejected with [`ParseError::Empty`]: it is either
//! malformed or irrelevant to service identity tokens, and is never treated
//! as a valid "grants nothing" policy.

use serde_json::Value;

use super::{ParseError, Rule, RuleKind, RuleModel};

const SERVICE_BLOCK: &str = "service";
const SERVICE_PREFIX_BLOCK: &str = "service_prefix";
const POLICY_ATTR: &str = "policy";

/// Parse raw ACL rule text.
///
/// # Errors
///
/// Returns [`ParseError`] if the text is not valid HCL/JSON, if a service
/// block is malformed, or if no service rules are present.
pub fn parse_rules(text: &str) -> Result<RuleModel, ParseError> {
    let trimmed = text.trim_start();
    let model = if trimmed.starts_with('{') {
        parse_json(trimmed)?
    } else {
        parse_hcl(text)?
    };

    if model.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(model)
}

fn block_kind(identifier: &str) -> Option<RuleKind> {
    match identifier {
        SERVICE_BLOCK => Some(RuleKind::Exact),
        SERVICE_PREFIX_BLOCK => Some(RuleKind::Prefix),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// HCL
// ---------------------------------------------------------------------------

fn parse_hcl(text: &str) -> Result<RuleModel, ParseError> {
    let body: hcl::Body = hcl::parse(text).map_err(|e| ParseError::Syntax(e.to_string()))?;

    let mut model = RuleModel::default();
    for block in body.blocks() {
        let Some(kind) = block_kind(block.identifier()) else {
            continue;
        };

        let name = match block.labels() {
            [label] => label.as_str(),
            labels => {
                return Err(ParseError::Structure(format!(
                    "{} block must have exactly one label, found {}",
                    block.identifier(),
                    labels.len()
                )));
            }
        };

        let permission = block
            .body()
            .attributes()
            .find(|attr| attr.key() == POLICY_ATTR)
            .map(|attr| match attr.expr() {
                hcl::Expression::String(value) => value.clone(),
                // Non-literal values can never equal "write".
                _ => String::new(),
            })
            .unwrap_or_default();

        model.push(kind, Rule::new(name, &permission));
    }
    Ok(model)
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

fn parse_json(text: &str) -> Result<RuleModel, ParseError> {
    let root: Value = serde_json::from_str(text).map_err(|e| ParseError::Syntax(e.to_string()))?;
    let Value::Object(root) = root else {
        return Err(ParseError::Structure(
            "policy document must be a JSON object".to_owned(),
        ));
    };

    let mut model = RuleModel::default();
    for (key, value) in &root {
        let Some(kind) = block_kind(key) else {
            continue;
        };
        // `{"service": {...}}` and the list form `{"service": [{...}, {...}]}`.
        match value {
            Value::Object(entries) => push_json_entries(&mut model, kind, key, entries)?,
            Value::Array(items) => {
                for item in items {
                    let Value::Object(entries) = item else {
                        return Err(ParseError::Structure(format!(
                            "{key} list items must be objects"
                        )));
                    };
                    push_json_entries(&mut model, kind, key, entries)?;
                }
            }
            _ => {
                return Err(ParseError::Structure(format!(
                    "{key} must be an object keyed by service name"
                )));
            }
        }
    }
    Ok(model)
}

fn push_json_entries(
    model: &mut RuleModel,
    kind: RuleKind,
    key: &str,
    entries: &serde_json::Map<String, Value>,
) -> Result<(), ParseError> {
    for (name, body) in entries {
        let Value::Object(fields) = body else {
            return Err(ParseError::Structure(format!(
                "{key} {name:?} must be an object"
            )));
        };
        let permission = match fields.get(POLICY_ATTR) {
            Some(Value::String(value)) => value.as_str(),
            Some(_) => {
                return Err(ParseError::Structure(format!(
                    "{key} {name:?} policy must be a string"
                )));
            }
            None => "",
        };
        model.push(kind, Rule::new(name, permission));
    }
    Ok(())
}
