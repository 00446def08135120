//! Graph construction against a [`NodeGraphRuntime`].
//!
//! Building is best-effort end to end: a node that cannot be created or a
//! link that cannot be made is recorded in the report and never aborts the
//! rest of the graph. Properties are applied before input values so that
//! overloaded nodes expose the right sockets, and every link is verified
//! by membership in the runtime's link list because a connect call can
//! succeed without producing a link.

use anyhow::Result;
use log::{debug, info, warn};
use serde::Serialize;

use crate::catalog::{NodeCatalog, NodeTypeDescriptor, SocketKind, catalog};
use crate::configure::configure_node;
use crate::layout::{DepthGraph, layout};
use crate::resolver::{find_socket, resolve_overload};
use crate::runtime::{NodeGraphRuntime, NodeHandle, SocketDir, SocketValue};
use crate::spec::{GraphSpec, NodeSpec, ValueSpec};

const OUTPUT_NODE_TYPE: &str = "ShaderNodeOutputMaterial";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FailureRecord {
    NodeCreation {
        node: usize,
        requested_type: String,
        reason: String,
    },
    SocketNotFound {
        link: usize,
        node: usize,
        socket: String,
        side: SocketDir,
        available: Vec<String>,
    },
    IncompatibleSockets {
        link: usize,
        from_kind: SocketKind,
        to_kind: SocketKind,
        from_sockets: Vec<String>,
        to_sockets: Vec<String>,
    },
    LinkIndexOutOfRange {
        link: usize,
        index: usize,
        node_count: usize,
    },
    BuildError {
        link: usize,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectivityIssue {
    NoIncoming,
    NoOutgoing,
}

/// Outcome of a build. The realized graph lives in the runtime;
/// `node_handles` is positionally aligned with the requested node list,
/// with `None` for nodes that could not be created.
#[derive(Debug, Default, Serialize)]
pub struct BuildReport {
    pub material_name: String,
    pub node_handles: Vec<Option<NodeHandle>>,
    pub requested_nodes: usize,
    pub created_nodes: usize,
    pub attempted_links: usize,
    pub successful_links: usize,
    pub failures: Vec<FailureRecord>,
    pub unconnected: Vec<(usize, ConnectivityIssue)>,
    /// Whether the terminal output node's Surface input ended up linked;
    /// `None` when the graph has no output node.
    pub surface_connected: Option<bool>,
    /// Set by the session when the material came from a truncated
    /// response that was continued.
    pub truncated: bool,
}

impl BuildReport {
    pub fn is_complete(&self) -> bool {
        self.created_nodes == self.requested_nodes
            && self.successful_links == self.attempted_links
            && self.failures.is_empty()
    }
}

impl std::fmt::Display for BuildReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "material '{}': {}/{} nodes, {}/{} links, {} failure(s)",
            self.material_name,
            self.created_nodes,
            self.requested_nodes,
            self.successful_links,
            self.attempted_links,
            self.failures.len()
        )?;
        if let Some(connected) = self.surface_connected {
            writeln!(
                f,
                "output surface: {}",
                if connected { "connected" } else { "NOT connected" }
            )?;
        }
        for (i, issue) in &self.unconnected {
            writeln!(
                f,
                "node {i}: {}",
                match issue {
                    ConnectivityIssue::NoIncoming => "no incoming links",
                    ConnectivityIssue::NoOutgoing => "no outgoing links",
                }
            )?;
        }
        Ok(())
    }
}

/// Builds the whole graph: nodes with properties and input values, then
/// links, then auto-layout for nodes without an explicit location, then a
/// connectivity audit.
pub fn build(runtime: &mut dyn NodeGraphRuntime, spec: &GraphSpec) -> Result<BuildReport> {
    let cat = catalog()?;
    let mut report = BuildReport {
        material_name: spec.material_name.clone(),
        requested_nodes: spec.nodes.len(),
        ..Default::default()
    };

    for (i, node) in spec.nodes.iter().enumerate() {
        match create_one_node(runtime, cat, i, node) {
            Ok(handle) => {
                report.node_handles.push(Some(handle));
                report.created_nodes += 1;
            }
            Err(e) => {
                warn!("node {i} ('{}') failed: {e:#}", node.node_type);
                report.failures.push(FailureRecord::NodeCreation {
                    node: i,
                    requested_type: node.node_type.clone(),
                    reason: format!("{e:#}"),
                });
                report.node_handles.push(None);
            }
        }
    }

    for (li, link) in spec.links.iter().enumerate() {
        report.attempted_links += 1;
        if connect_one_link(runtime, cat, spec, &report.node_handles, li, &mut report.failures)? {
            report.successful_links += 1;
        }
    }

    apply_layout(runtime, spec, &report.node_handles)?;
    audit_connectivity(runtime, cat, spec, &mut report);

    info!(
        "built material '{}': {}/{} nodes, {}/{} links",
        report.material_name,
        report.created_nodes,
        report.requested_nodes,
        report.successful_links,
        report.attempted_links
    );
    Ok(report)
}

fn create_one_node(
    runtime: &mut dyn NodeGraphRuntime,
    cat: &NodeCatalog,
    index: usize,
    node: &NodeSpec,
) -> Result<NodeHandle> {
    if cat.canonical_type(&node.node_type) != Some(node.node_type.as_str())
        && cat.resolve_type(&node.node_type).is_some()
    {
        debug!(
            "node {index}: converted type '{}' to '{}'",
            node.node_type,
            cat.canonical_type(&node.node_type).unwrap_or_default()
        );
    }
    let handle = runtime.create_node(&node.node_type)?;

    if let Some(name) = node.name.as_deref() {
        runtime.set_name(handle, name)?;
    }
    if let Some([x, y]) = node.location {
        runtime.set_location(handle, x as f32, y as f32)?;
    }

    // Properties first: the selector on overloaded nodes decides which
    // sockets accept which values.
    if let Some(desc) = cat.resolve_type(&node.node_type) {
        configure_node(runtime, handle, node, desc)?;
        bind_inputs(runtime, handle, node, desc);
    }
    Ok(handle)
}

/// Digs the usable value out of a wrapper object. `default_value` wins,
/// then the first entry; an empty wrapper yields nothing.
fn effective_value(value: &ValueSpec) -> Option<&ValueSpec> {
    match value {
        ValueSpec::Wrapped(map) => {
            let inner = map.get("default_value").or_else(|| map.values().next())?;
            effective_value(inner)
        }
        other => Some(other),
    }
}

fn is_vector_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    ["vector", "normal", "displacement", "tangent", "clearcoat"]
        .iter()
        .any(|k| lower.contains(k))
}

fn is_color_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("color") || lower == "a" || lower == "b"
}

fn is_float_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    // "w" only as the whole name; as a substring it would match almost
    // anything.
    lower == "w"
        || [
            "fac",
            "factor",
            "height",
            "detail",
            "roughness",
            "strength",
            "distance",
            "distortion",
            "metallic",
            "specular",
            "phase",
        ]
        .iter()
        .any(|k| lower.contains(k))
}

fn truncate3(v: &[f64]) -> [f64; 3] {
    [v[0], v[1], v[2]]
}

/// Maps a requested array onto a socket value, reconciling dimensionality
/// with what the socket name suggests it wants.
fn coerce_array(socket: &str, items: &[f64], mapping_vector: bool) -> Option<SocketValue> {
    let vector_like = mapping_vector || is_vector_name(socket);
    let color_like = is_color_name(socket);

    if is_float_name(socket) && !mapping_vector {
        return match items.first() {
            Some(&v) => Some(SocketValue::Scalar(v)),
            None => {
                warn!("empty array for float socket '{socket}', using 0.0");
                Some(SocketValue::Scalar(0.0))
            }
        };
    }

    match items.len() {
        4 => {
            if vector_like {
                debug!("converting 4 components to 3 for vector socket '{socket}'");
                Some(SocketValue::Vector(truncate3(items)))
            } else {
                Some(SocketValue::Color([items[0], items[1], items[2], items[3]]))
            }
        }
        3 => {
            if color_like {
                debug!("adding alpha for color socket '{socket}'");
                Some(SocketValue::Color([items[0], items[1], items[2], 1.0]))
            } else {
                Some(SocketValue::Vector(truncate3(items)))
            }
        }
        n if n >= 5 => {
            if vector_like {
                warn!("socket '{socket}' got {n} values, using first 3");
                Some(SocketValue::Vector(truncate3(items)))
            } else {
                warn!("socket '{socket}' got {n} values, using first 4");
                Some(SocketValue::Color([items[0], items[1], items[2], items[3]]))
            }
        }
        n => {
            warn!("socket '{socket}' has unusual value length {n}");
            items.first().map(|&v| SocketValue::Scalar(v))
        }
    }
}

fn bind_inputs(
    runtime: &mut dyn NodeGraphRuntime,
    handle: NodeHandle,
    node: &NodeSpec,
    desc: &NodeTypeDescriptor,
) {
    let selector = node.properties.data_type.as_deref();
    let is_mapping = desc.type_name == "ShaderNodeMapping";

    let mut pending: Vec<(String, ValueSpec)> = node
        .inputs
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    // Convenience properties that are really input values.
    if let Some(ior) = node.properties.ior {
        if !node.inputs.contains_key("IOR") {
            pending.push(("IOR".to_string(), ValueSpec::Scalar(ior)));
        }
    }
    if let Some(density) = node.properties.volume_density {
        if !node.inputs.contains_key("Density") {
            pending.push(("Density".to_string(), ValueSpec::Scalar(density)));
        }
    }

    for (input_name, raw_value) in pending {
        let Some(value) = effective_value(&raw_value) else {
            warn!("empty wrapper value for input '{input_name}', skipping");
            continue;
        };

        let sockets = runtime.input_sockets(handle);
        let index = if desc.overload.is_some() {
            resolve_overload(desc, selector, &input_name, SocketDir::Input)
                .filter(|&i| i < sockets.len())
                .or_else(|| sockets.iter().position(|s| s.name == input_name))
        } else {
            // Value binding matches by exact name only; loose search is
            // reserved for links.
            sockets.iter().position(|s| s.name == input_name)
        };
        let Some(index) = index else {
            debug!(
                "node '{}' has no input named '{input_name}', skipping value",
                desc.type_name
            );
            continue;
        };

        let mapping_vector =
            is_mapping && ["Scale", "Location", "Rotation"].contains(&input_name.as_str());

        let coerced = match value {
            ValueSpec::Scalar(v) => {
                if mapping_vector {
                    debug!("broadcasting {v} to a uniform vector for '{input_name}'");
                    Some(SocketValue::Vector([*v, *v, *v]))
                } else {
                    Some(SocketValue::Scalar(*v))
                }
            }
            ValueSpec::Bool(b) => Some(SocketValue::Bool(*b)),
            ValueSpec::Array(items) => coerce_array(&input_name, items, mapping_vector),
            ValueSpec::Text(text) => match text.parse::<f64>() {
                Ok(v) => Some(SocketValue::Scalar(v)),
                Err(_) => {
                    warn!("cannot convert '{text}' for input '{input_name}', skipping");
                    None
                }
            },
            ValueSpec::Wrapped(_) => None,
        };

        if let Some(socket_value) = coerced {
            if let Err(e) = runtime.set_input_value(handle, index, &socket_value) {
                warn!("failed to set input '{input_name}': {e:#}");
            }
        }
    }
}

fn socket_listing(sockets: &[crate::runtime::RuntimeSocket]) -> Vec<String> {
    sockets
        .iter()
        .map(|s| {
            format!(
                "{} ({:?}{}{})",
                s.name,
                s.kind,
                if s.is_linked { ", linked" } else { "" },
                if s.hidden { ", hidden" } else { "" }
            )
        })
        .collect()
}

fn connect_one_link(
    runtime: &mut dyn NodeGraphRuntime,
    cat: &NodeCatalog,
    spec: &GraphSpec,
    handles: &[Option<NodeHandle>],
    li: usize,
    failures: &mut Vec<FailureRecord>,
) -> Result<bool> {
    let link = &spec.links[li];
    let node_count = spec.nodes.len();

    for index in [link.from_node, link.to_node] {
        if index >= node_count {
            warn!("link {li}: node index {index} out of range ({node_count} nodes)");
            failures.push(FailureRecord::LinkIndexOutOfRange {
                link: li,
                index,
                node_count,
            });
            return Ok(false);
        }
    }
    let (Some(from), Some(to)) = (handles[link.from_node], handles[link.to_node]) else {
        failures.push(FailureRecord::BuildError {
            link: li,
            reason: "an endpoint node was not created".to_string(),
        });
        return Ok(false);
    };

    let from_desc = cat.resolve_type(&spec.nodes[link.from_node].node_type);
    let to_desc = cat.resolve_type(&spec.nodes[link.to_node].node_type);

    let outputs = runtime.output_sockets(from);
    let from_idx = resolve_link_socket(
        cat,
        from_desc,
        &spec.nodes[link.from_node],
        &outputs,
        &link.from_socket,
        SocketDir::Output,
    );
    let Some(from_idx) = from_idx else {
        warn!(
            "link {li}: output socket '{}' not found on node {}",
            link.from_socket, link.from_node
        );
        failures.push(FailureRecord::SocketNotFound {
            link: li,
            node: link.from_node,
            socket: link.from_socket.clone(),
            side: SocketDir::Output,
            available: socket_listing(&outputs),
        });
        return Ok(false);
    };

    let inputs = runtime.input_sockets(to);
    let to_idx = resolve_link_socket(
        cat,
        to_desc,
        &spec.nodes[link.to_node],
        &inputs,
        &link.to_socket,
        SocketDir::Input,
    );
    let Some(to_idx) = to_idx else {
        warn!(
            "link {li}: input socket '{}' not found on node {}",
            link.to_socket, link.to_node
        );
        failures.push(FailureRecord::SocketNotFound {
            link: li,
            node: link.to_node,
            socket: link.to_socket.clone(),
            side: SocketDir::Input,
            available: socket_listing(&inputs),
        });
        return Ok(false);
    };

    let id = match runtime.connect(from, from_idx, to, to_idx) {
        Ok(id) => id,
        Err(e) => {
            failures.push(FailureRecord::BuildError {
                link: li,
                reason: format!("{e:#}"),
            });
            return Ok(false);
        }
    };

    // The runtime may accept the call and still refuse the link; only
    // membership in its link list proves success.
    if !runtime.links().iter().any(|l| l.id == id) {
        warn!(
            "link {li}: connection {} -> {} rejected by the runtime",
            link.from_socket, link.to_socket
        );
        failures.push(FailureRecord::IncompatibleSockets {
            link: li,
            from_kind: outputs[from_idx].kind,
            to_kind: inputs[to_idx].kind,
            from_sockets: socket_listing(&outputs),
            to_sockets: socket_listing(&inputs),
        });
        return Ok(false);
    }

    debug!(
        "link {li}: {}[{}] -> {}[{}]",
        link.from_node, link.from_socket, link.to_node, link.to_socket
    );
    Ok(true)
}

fn resolve_link_socket(
    cat: &NodeCatalog,
    desc: Option<&NodeTypeDescriptor>,
    node: &NodeSpec,
    sockets: &[crate::runtime::RuntimeSocket],
    requested: &str,
    dir: SocketDir,
) -> Option<usize> {
    if let Some(desc) = desc
        && desc.overload.is_some()
        && let Some(i) = resolve_overload(
            desc,
            node.properties.data_type.as_deref(),
            requested,
            dir,
        )
        && i < sockets.len()
    {
        return Some(i);
    }
    find_socket(cat, sockets, requested, dir)
}

fn apply_layout(
    runtime: &mut dyn NodeGraphRuntime,
    spec: &GraphSpec,
    handles: &[Option<NodeHandle>],
) -> Result<()> {
    let graph = DepthGraph::from_links(spec.nodes.len(), &spec.links);
    let positions = layout(&graph);
    for (i, handle) in handles.iter().enumerate() {
        let (Some(handle), None) = (handle, spec.nodes[i].location) else {
            continue;
        };
        let (x, y) = positions[i];
        runtime.set_location(*handle, x, y)?;
    }
    Ok(())
}

fn audit_connectivity(
    runtime: &dyn NodeGraphRuntime,
    cat: &NodeCatalog,
    spec: &GraphSpec,
    report: &mut BuildReport,
) {
    let links = runtime.links();
    for (i, handle) in report.node_handles.iter().enumerate() {
        let Some(handle) = handle else { continue };
        let Some(desc) = cat.resolve_type(&spec.nodes[i].node_type) else {
            continue;
        };

        let has_incoming = links.iter().any(|l| l.to == *handle);
        let has_outgoing = links.iter().any(|l| l.from == *handle);

        // Pure sources have nothing to receive; the terminal node has
        // nothing to send.
        if !has_incoming && !desc.inputs.is_empty() {
            report.unconnected.push((i, ConnectivityIssue::NoIncoming));
        }
        if !has_outgoing && !desc.outputs.is_empty() {
            report.unconnected.push((i, ConnectivityIssue::NoOutgoing));
        }

        if desc.type_name == OUTPUT_NODE_TYPE {
            let surface_linked = runtime
                .input_sockets(*handle)
                .first()
                .is_some_and(|s| s.is_linked);
            report.surface_connected = Some(surface_linked);
        }
    }
}
