use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

const DEFAULT_CATALOG_JSON: &str = include_str!("../assets/node-catalog.json");

/// Value class carried by a socket. Connection compatibility and default
/// value coercion both key off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketKind {
    Float,
    Vector,
    Color,
    Shader,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SocketDescriptor {
    pub name: String,
    pub kind: SocketKind,
}

/// Socket index tables for node types whose sockets are overloaded by a
/// mode property (one logical socket name maps to several concrete
/// sockets, selected by e.g. `data_type`).
#[derive(Debug, Clone, Deserialize)]
pub struct OverloadTable {
    /// Name of the node property that selects the active overload.
    pub selector: String,
    #[serde(rename = "bySelector")]
    pub by_selector: HashMap<String, OverloadIndices>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverloadIndices {
    pub factor: usize,
    pub a: usize,
    pub b: usize,
    pub result: usize,
    #[serde(rename = "visibleInputs")]
    pub visible_inputs: Vec<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeTypeDescriptor {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub inputs: Vec<SocketDescriptor>,
    #[serde(default)]
    pub outputs: Vec<SocketDescriptor>,
    #[serde(default)]
    pub overload: Option<OverloadTable>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawCatalog {
    #[serde(rename = "schemaVersion")]
    #[allow(dead_code)]
    schema_version: u32,
    #[serde(rename = "typeAliases", default)]
    type_aliases: HashMap<String, String>,
    #[serde(rename = "socketAliases", default)]
    socket_aliases: HashMap<String, Vec<String>>,
    #[serde(default)]
    nodes: Vec<NodeTypeDescriptor>,
}

/// Authoritative description of every node type the builder can create.
#[derive(Debug, Clone)]
pub struct NodeCatalog {
    nodes: HashMap<String, NodeTypeDescriptor>,
    type_aliases: HashMap<String, String>,
    socket_aliases: HashMap<String, Vec<String>>,
}

impl NodeCatalog {
    fn from_raw(raw: RawCatalog) -> Result<NodeCatalog> {
        let mut nodes: HashMap<String, NodeTypeDescriptor> = HashMap::new();
        for n in raw.nodes {
            nodes.insert(n.type_name.clone(), n);
        }
        for (alias, target) in &raw.type_aliases {
            if !nodes.contains_key(target) {
                return Err(anyhow!(
                    "catalog alias '{alias}' points at unknown node type '{target}'"
                ));
            }
        }
        // Socket alias keys are matched case-insensitively; normalize once.
        let socket_aliases = raw
            .socket_aliases
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        Ok(NodeCatalog {
            nodes,
            type_aliases: raw.type_aliases,
            socket_aliases,
        })
    }

    /// Maps a requested node type identifier to its canonical descriptor.
    ///
    /// Resolution order: exact canonical name, exact alias, then
    /// case-insensitive match over both sets.
    pub fn resolve_type(&self, requested: &str) -> Option<&NodeTypeDescriptor> {
        if let Some(d) = self.nodes.get(requested) {
            return Some(d);
        }
        if let Some(target) = self.type_aliases.get(requested) {
            return self.nodes.get(target);
        }
        let lower = requested.to_lowercase();
        if let Some(d) = self.nodes.values().find(|d| d.type_name.to_lowercase() == lower) {
            return Some(d);
        }
        self.type_aliases
            .iter()
            .find(|(alias, _)| alias.to_lowercase() == lower)
            .and_then(|(_, target)| self.nodes.get(target))
    }

    /// Canonical name for a requested type, when it resolves at all.
    pub fn canonical_type(&self, requested: &str) -> Option<&str> {
        self.resolve_type(requested).map(|d| d.type_name.as_str())
    }

    pub fn descriptor(&self, canonical: &str) -> Option<&NodeTypeDescriptor> {
        self.nodes.get(canonical)
    }

    /// Alternative socket names to try for a requested socket name.
    pub fn socket_aliases(&self, requested: &str) -> &[String] {
        self.socket_aliases
            .get(&requested.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn parse_catalog(json: &str) -> Result<NodeCatalog> {
    let raw: RawCatalog = serde_json::from_str(json)
        .map_err(|e| anyhow!("failed to parse assets/node-catalog.json: {e}"))?;
    NodeCatalog::from_raw(raw)
}

/// Parsed once per process; the embedded asset never changes at runtime.
pub fn catalog() -> Result<&'static NodeCatalog> {
    static CATALOG: OnceLock<NodeCatalog> = OnceLock::new();
    if let Some(c) = CATALOG.get() {
        return Ok(c);
    }
    let parsed = parse_catalog(DEFAULT_CATALOG_JSON)?;
    Ok(CATALOG.get_or_init(|| parsed))
}
