//! Capability surface of the host node-graph runtime.
//!
//! The builder never talks to a concrete editor directly; it drives this
//! trait. [`MemoryRuntime`] is the catalog-backed implementation used by
//! the binary and the tests. It mirrors one awkward host behavior on
//! purpose: connecting two kind-incompatible sockets reports success but
//! quietly adds no link, so callers must verify membership in [`links`]
//! after every connect.
//!
//! [`links`]: NodeGraphRuntime::links

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use serde::Serialize;

use crate::catalog::{NodeCatalog, SocketKind, catalog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SocketDir {
    Input,
    Output,
}

#[derive(Debug, Clone)]
pub struct RuntimeSocket {
    pub name: String,
    pub kind: SocketKind,
    pub is_linked: bool,
    pub hidden: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeLink {
    pub id: LinkId,
    pub from: NodeHandle,
    pub from_output: usize,
    pub to: NodeHandle,
    pub to_input: usize,
}

/// Concrete value written into an input socket.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketValue {
    Scalar(f64),
    Vector([f64; 3]),
    Color([f64; 4]),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampElement {
    pub position: f64,
    pub color: [f64; 4],
}

/// Node-level property value (enum strings, flags, ramp stop lists).
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Text(String),
    Bool(bool),
    Scalar(f64),
    Ramp(Vec<RampElement>),
}

pub trait NodeGraphRuntime {
    fn create_node(&mut self, type_id: &str) -> Result<NodeHandle>;
    fn set_name(&mut self, node: NodeHandle, name: &str) -> Result<()>;
    fn set_location(&mut self, node: NodeHandle, x: f32, y: f32) -> Result<()>;
    fn set_property(&mut self, node: NodeHandle, name: &str, value: &PropertyValue) -> Result<()>;
    fn set_input_value(&mut self, node: NodeHandle, index: usize, value: &SocketValue)
    -> Result<()>;
    fn input_sockets(&self, node: NodeHandle) -> Vec<RuntimeSocket>;
    fn output_sockets(&self, node: NodeHandle) -> Vec<RuntimeSocket>;
    fn set_socket_hidden(
        &mut self,
        node: NodeHandle,
        dir: SocketDir,
        index: usize,
        hidden: bool,
    ) -> Result<()>;
    /// Requests a connection. A returned id is NOT proof the link exists;
    /// check [`NodeGraphRuntime::links`] afterwards.
    fn connect(
        &mut self,
        from: NodeHandle,
        output: usize,
        to: NodeHandle,
        input: usize,
    ) -> Result<LinkId>;
    fn links(&self) -> &[RuntimeLink];
}

struct MemorySocket {
    name: String,
    kind: SocketKind,
    hidden: bool,
    linked: bool,
    value: Option<SocketValue>,
}

struct MemoryNode {
    type_name: String,
    name: String,
    location: (f32, f32),
    properties: BTreeMap<String, PropertyValue>,
    inputs: Vec<MemorySocket>,
    outputs: Vec<MemorySocket>,
}

/// In-memory node graph driven entirely by the type catalog.
pub struct MemoryRuntime {
    catalog: &'static NodeCatalog,
    nodes: Vec<MemoryNode>,
    links: Vec<RuntimeLink>,
    next_link_id: usize,
}

impl MemoryRuntime {
    pub fn new() -> Result<MemoryRuntime> {
        Ok(MemoryRuntime {
            catalog: catalog()?,
            nodes: Vec::new(),
            links: Vec::new(),
            next_link_id: 0,
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_type(&self, node: NodeHandle) -> Option<&str> {
        self.nodes.get(node.0).map(|n| n.type_name.as_str())
    }

    pub fn node_name(&self, node: NodeHandle) -> Option<&str> {
        self.nodes.get(node.0).map(|n| n.name.as_str())
    }

    pub fn location(&self, node: NodeHandle) -> Option<(f32, f32)> {
        self.nodes.get(node.0).map(|n| n.location)
    }

    pub fn property(&self, node: NodeHandle, name: &str) -> Option<&PropertyValue> {
        self.nodes.get(node.0)?.properties.get(name)
    }

    pub fn input_value(&self, node: NodeHandle, index: usize) -> Option<&SocketValue> {
        self.nodes.get(node.0)?.inputs.get(index)?.value.as_ref()
    }

    fn node(&self, handle: NodeHandle) -> Result<&MemoryNode> {
        self.nodes
            .get(handle.0)
            .ok_or_else(|| anyhow::anyhow!("invalid node handle {}", handle.0))
    }

    fn node_mut(&mut self, handle: NodeHandle) -> Result<&mut MemoryNode> {
        self.nodes
            .get_mut(handle.0)
            .ok_or_else(|| anyhow::anyhow!("invalid node handle {}", handle.0))
    }
}

/// Implicit conversions the host performs between socket kinds.
/// Numeric kinds interconvert; shader sockets only accept shaders.
fn kinds_compatible(from: SocketKind, to: SocketKind) -> bool {
    match (from, to) {
        (a, b) if a == b => true,
        (SocketKind::Shader, _) | (_, SocketKind::Shader) => false,
        _ => true,
    }
}

fn snapshot(sockets: &[MemorySocket]) -> Vec<RuntimeSocket> {
    sockets
        .iter()
        .map(|s| RuntimeSocket {
            name: s.name.clone(),
            kind: s.kind,
            is_linked: s.linked,
            hidden: s.hidden,
        })
        .collect()
}

impl NodeGraphRuntime for MemoryRuntime {
    fn create_node(&mut self, type_id: &str) -> Result<NodeHandle> {
        let Some(desc) = self.catalog.resolve_type(type_id) else {
            bail!("unknown node type '{type_id}'");
        };
        let make = |defs: &[crate::catalog::SocketDescriptor]| {
            defs.iter()
                .map(|d| MemorySocket {
                    name: d.name.clone(),
                    kind: d.kind,
                    hidden: false,
                    linked: false,
                    value: None,
                })
                .collect::<Vec<_>>()
        };
        let node = MemoryNode {
            type_name: desc.type_name.clone(),
            name: desc.type_name.clone(),
            location: (0.0, 0.0),
            properties: BTreeMap::new(),
            inputs: make(&desc.inputs),
            outputs: make(&desc.outputs),
        };
        self.nodes.push(node);
        Ok(NodeHandle(self.nodes.len() - 1))
    }

    fn set_name(&mut self, node: NodeHandle, name: &str) -> Result<()> {
        self.node_mut(node)?.name = name.to_string();
        Ok(())
    }

    fn set_location(&mut self, node: NodeHandle, x: f32, y: f32) -> Result<()> {
        self.node_mut(node)?.location = (x, y);
        Ok(())
    }

    fn set_property(&mut self, node: NodeHandle, name: &str, value: &PropertyValue) -> Result<()> {
        self.node_mut(node)?
            .properties
            .insert(name.to_string(), value.clone());
        Ok(())
    }

    fn set_input_value(
        &mut self,
        node: NodeHandle,
        index: usize,
        value: &SocketValue,
    ) -> Result<()> {
        let n = self.node_mut(node)?;
        let Some(socket) = n.inputs.get_mut(index) else {
            bail!("input index {index} out of range for node '{}'", n.name);
        };
        socket.value = Some(value.clone());
        Ok(())
    }

    fn input_sockets(&self, node: NodeHandle) -> Vec<RuntimeSocket> {
        self.node(node).map(|n| snapshot(&n.inputs)).unwrap_or_default()
    }

    fn output_sockets(&self, node: NodeHandle) -> Vec<RuntimeSocket> {
        self.node(node).map(|n| snapshot(&n.outputs)).unwrap_or_default()
    }

    fn set_socket_hidden(
        &mut self,
        node: NodeHandle,
        dir: SocketDir,
        index: usize,
        hidden: bool,
    ) -> Result<()> {
        let n = self.node_mut(node)?;
        let sockets = match dir {
            SocketDir::Input => &mut n.inputs,
            SocketDir::Output => &mut n.outputs,
        };
        let Some(socket) = sockets.get_mut(index) else {
            bail!("socket index {index} out of range for node '{}'", n.name);
        };
        socket.hidden = hidden;
        Ok(())
    }

    fn connect(
        &mut self,
        from: NodeHandle,
        output: usize,
        to: NodeHandle,
        input: usize,
    ) -> Result<LinkId> {
        let from_kind = {
            let n = self.node(from)?;
            let Some(s) = n.outputs.get(output) else {
                bail!("output index {output} out of range for node '{}'", n.name);
            };
            s.kind
        };
        let to_kind = {
            let n = self.node(to)?;
            let Some(s) = n.inputs.get(input) else {
                bail!("input index {input} out of range for node '{}'", n.name);
            };
            s.kind
        };

        let id = LinkId(self.next_link_id);
        self.next_link_id += 1;

        // Host behavior: an incompatible connect call succeeds but the link
        // never materializes.
        if !kinds_compatible(from_kind, to_kind) {
            return Ok(id);
        }

        // An input socket holds at most one link; a new one replaces it.
        if let Some(pos) = self
            .links
            .iter()
            .position(|l| l.to == to && l.to_input == input)
        {
            let old = self.links.remove(pos);
            let still_used = self
                .links
                .iter()
                .any(|l| l.from == old.from && l.from_output == old.from_output);
            if !still_used && let Ok(n) = self.node_mut(old.from) {
                if let Some(s) = n.outputs.get_mut(old.from_output) {
                    s.linked = false;
                }
            }
        }

        self.links.push(RuntimeLink {
            id,
            from,
            from_output: output,
            to,
            to_input: input,
        });
        self.node_mut(from)?.outputs[output].linked = true;
        self.node_mut(to)?.inputs[input].linked = true;
        Ok(id)
    }

    fn links(&self) -> &[RuntimeLink] {
        &self.links
    }
}
