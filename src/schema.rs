//! Structural validation of raw model output against the material schema.
//!
//! Works on `serde_json::Value` first so recoverable shape problems (a
//! single-element array wrapper around the object) can be fixed before the
//! typed deserialization runs. Anything this module accepts is a
//! [`GraphSpec`] the rest of the pipeline can rely on.

use log::warn;
use serde_json::Value;
use thiserror::Error;

use crate::spec::{GraphSpec, LinkSpec, NodeSpec};

pub const MIN_NODES: usize = 3;
pub const MAX_NODES: usize = 20;
pub const MIN_LINKS: usize = 2;
pub const MAX_LINKS: usize = 40;

pub const DEFAULT_MATERIAL_NAME: &str = "AI_Material";

/// Whether the payload must stand alone or extends an earlier graph.
/// Fragments are exempt from the minimum node/link floors since they only
/// carry the tail of a truncated response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphRole {
    Complete,
    Fragment,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("response is an empty array")]
    EmptyArray,
    #[error("response is an array of {0} objects, expected a single object")]
    MultiObjectArray(usize),
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("field '{field}' has wrong type: {detail}")]
    WrongType { field: String, detail: String },
    #[error("{field} count {actual} outside allowed range {min}..={max}")]
    Cardinality {
        field: &'static str,
        actual: usize,
        min: usize,
        max: usize,
    },
}

fn wrong_type(field: impl Into<String>, detail: impl Into<String>) -> ValidationError {
    ValidationError::WrongType {
        field: field.into(),
        detail: detail.into(),
    }
}

/// Parses and validates a JSON string into a [`GraphSpec`].
pub fn parse_material(text: &str, role: GraphRole) -> Result<GraphSpec, ValidationError> {
    let raw: Value = serde_json::from_str(text)?;
    validate_material(&raw, role)
}

/// Validates an already-parsed JSON value into a [`GraphSpec`].
pub fn validate_material(raw: &Value, role: GraphRole) -> Result<GraphSpec, ValidationError> {
    let obj = match raw {
        Value::Array(items) => match items.as_slice() {
            [] => return Err(ValidationError::EmptyArray),
            [only] => {
                // Some models wrap the object in a one-element array.
                warn!("material payload arrived as a single-element array, unwrapping");
                only
            }
            many => return Err(ValidationError::MultiObjectArray(many.len())),
        },
        other => other,
    };

    let map = obj
        .as_object()
        .ok_or_else(|| wrong_type("$", format!("expected object, got {}", type_name(obj))))?;

    let material_name = match map.get("material_name") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(_) | None => {
            warn!("material_name missing or not a string, using '{DEFAULT_MATERIAL_NAME}'");
            DEFAULT_MATERIAL_NAME.to_string()
        }
    };

    let empty = Vec::new();
    let raw_nodes = match map.get("nodes") {
        None => return Err(ValidationError::MissingField("nodes")),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(wrong_type(
                "nodes",
                format!("expected array, got {}", type_name(other)),
            ));
        }
    };

    let raw_links = match map.get("links") {
        None if role == GraphRole::Fragment => &empty,
        None => return Err(ValidationError::MissingField("links")),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(wrong_type(
                "links",
                format!("expected array, got {}", type_name(other)),
            ));
        }
    };

    if role == GraphRole::Complete {
        check_count("nodes", raw_nodes.len(), MIN_NODES, MAX_NODES)?;
        check_count("links", raw_links.len(), MIN_LINKS, MAX_LINKS)?;
    } else {
        check_count("nodes", raw_nodes.len(), 0, MAX_NODES)?;
        check_count("links", raw_links.len(), 0, MAX_LINKS)?;
    }

    let mut nodes = Vec::with_capacity(raw_nodes.len());
    for (i, raw_node) in raw_nodes.iter().enumerate() {
        let field = format!("nodes[{i}]");
        let node_map = raw_node.as_object().ok_or_else(|| {
            wrong_type(&field, format!("expected object, got {}", type_name(raw_node)))
        })?;
        match node_map.get("type") {
            Some(Value::String(_)) => {}
            Some(other) => {
                return Err(wrong_type(
                    format!("{field}.type"),
                    format!("expected string, got {}", type_name(other)),
                ));
            }
            None => return Err(ValidationError::MissingField("type")),
        }
        let node: NodeSpec = serde_json::from_value(raw_node.clone())
            .map_err(|e| wrong_type(&field, e.to_string()))?;
        nodes.push(node);
    }

    let mut links = Vec::with_capacity(raw_links.len());
    for (i, raw_link) in raw_links.iter().enumerate() {
        let field = format!("links[{i}]");
        let link: LinkSpec = serde_json::from_value(raw_link.clone())
            .map_err(|e| wrong_type(&field, e.to_string()))?;
        links.push(link);
    }

    Ok(GraphSpec {
        material_name,
        nodes,
        links,
    })
}

fn check_count(
    field: &'static str,
    actual: usize,
    min: usize,
    max: usize,
) -> Result<(), ValidationError> {
    if actual < min || actual > max {
        return Err(ValidationError::Cardinality {
            field,
            actual,
            min,
            max,
        });
    }
    Ok(())
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
