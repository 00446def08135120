//! Deterministic repair of common model mistakes in input values.
//!
//! Two families of defects are fixed before building: oversized arrays
//! (a model dumping a whole gradient into a single socket value) and
//! placeholder strings left where a link was meant to be made. Every
//! change is recorded as a [`Correction`] so callers can surface what was
//! altered.

use log::warn;

use crate::spec::{GraphSpec, ValueSpec};

/// Arrays longer than this cannot be a socket value of any supported kind.
const MAX_ARRAY_LEN: usize = 10;

const PLACEHOLDER_TOKENS: [&str; 4] = ["MUST_CONNECT", "CONNECT", "LINK", "FROM_NODE"];

const FALLBACK_COLOR: [f64; 4] = [0.8, 0.8, 0.8, 1.0];

#[derive(Debug, Clone, PartialEq)]
pub enum Correction {
    /// An oversized array was replaced with a kind-appropriate default.
    OversizedArray {
        node: usize,
        socket: String,
        original_len: usize,
        replacement: ValueSpec,
    },
    /// A placeholder string standing in for a link was dropped.
    PlaceholderRemoved {
        node: usize,
        socket: String,
        text: String,
    },
}

/// Repairs all node inputs in place, returning what was changed.
/// Running the pass twice never produces further corrections.
pub fn repair_graph(spec: &mut GraphSpec) -> Vec<Correction> {
    let mut corrections = Vec::new();

    for (node_idx, node) in spec.nodes.iter_mut().enumerate() {
        let mut dropped: Vec<String> = Vec::new();

        for (socket, value) in node.inputs.iter_mut() {
            match value {
                ValueSpec::Array(items) if items.len() > MAX_ARRAY_LEN => {
                    let replacement = oversized_replacement(socket, items);
                    warn!(
                        "node {node_idx} input '{socket}': replacing {}-element array with {replacement:?}",
                        items.len()
                    );
                    corrections.push(Correction::OversizedArray {
                        node: node_idx,
                        socket: socket.clone(),
                        original_len: items.len(),
                        replacement: replacement.clone(),
                    });
                    *value = replacement;
                }
                ValueSpec::Text(text) if is_placeholder(text) => {
                    warn!("node {node_idx} input '{socket}': dropping placeholder '{text}'");
                    corrections.push(Correction::PlaceholderRemoved {
                        node: node_idx,
                        socket: socket.clone(),
                        text: text.clone(),
                    });
                    dropped.push(socket.clone());
                }
                _ => {}
            }
        }

        for socket in dropped {
            node.inputs.remove(&socket);
        }
    }

    corrections
}

fn is_placeholder(text: &str) -> bool {
    let upper = text.trim().to_uppercase();
    PLACEHOLDER_TOKENS.contains(&upper.as_str())
}

/// Picks a sane stand-in for an array too long to be a socket value,
/// keyed off the socket name.
fn oversized_replacement(socket: &str, items: &[f64]) -> ValueSpec {
    let lower = socket.to_lowercase();
    if lower.contains("color") {
        ValueSpec::Array(FALLBACK_COLOR.to_vec())
    } else if ["vector", "normal", "scale", "location", "rotation"]
        .iter()
        .any(|k| lower.contains(k))
    {
        ValueSpec::Array(vec![0.0, 0.0, 0.0])
    } else {
        ValueSpec::Scalar(items.first().copied().unwrap_or(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::NodeSpec;
    use proptest::prelude::*;

    fn graph_with_input(socket: &str, value: ValueSpec) -> GraphSpec {
        let mut node = NodeSpec {
            node_type: "ShaderNodeTexNoise".into(),
            ..Default::default()
        };
        node.inputs.insert(socket.to_string(), value);
        GraphSpec {
            material_name: "Test".into(),
            nodes: vec![node],
            links: Vec::new(),
        }
    }

    #[test]
    fn oversized_color_array_becomes_default_color() {
        let mut spec = graph_with_input("Base Color", ValueSpec::Array(vec![0.1; 16]));
        let corrections = repair_graph(&mut spec);
        assert_eq!(corrections.len(), 1);
        assert_eq!(
            spec.nodes[0].inputs.get("Base Color"),
            Some(&ValueSpec::Array(FALLBACK_COLOR.to_vec()))
        );
    }

    #[test]
    fn oversized_vector_array_becomes_zero_vector() {
        for socket in ["Vector", "Normal", "Scale", "Location", "Rotation"] {
            let mut spec = graph_with_input(socket, ValueSpec::Array(vec![1.0; 11]));
            repair_graph(&mut spec);
            assert_eq!(
                spec.nodes[0].inputs.get(socket),
                Some(&ValueSpec::Array(vec![0.0, 0.0, 0.0])),
                "socket {socket}"
            );
        }
    }

    #[test]
    fn oversized_scalar_array_keeps_first_element() {
        let mut spec = graph_with_input("Roughness", ValueSpec::Array(vec![0.7; 12]));
        repair_graph(&mut spec);
        assert_eq!(
            spec.nodes[0].inputs.get("Roughness"),
            Some(&ValueSpec::Scalar(0.7))
        );
    }

    #[test]
    fn array_at_threshold_is_untouched() {
        let original = ValueSpec::Array(vec![0.5; 10]);
        let mut spec = graph_with_input("Roughness", original.clone());
        assert!(repair_graph(&mut spec).is_empty());
        assert_eq!(spec.nodes[0].inputs.get("Roughness"), Some(&original));
    }

    #[test]
    fn placeholder_strings_are_removed() {
        for text in ["MUST_CONNECT", "must_connect", "Connect", "link", "FROM_NODE"] {
            let mut spec = graph_with_input("Height", ValueSpec::Text(text.into()));
            let corrections = repair_graph(&mut spec);
            assert_eq!(corrections.len(), 1, "text {text}");
            assert!(spec.nodes[0].inputs.is_empty());
        }
    }

    #[test]
    fn ordinary_strings_survive() {
        let mut spec = graph_with_input("Mode", ValueSpec::Text("MULTIPLY".into()));
        assert!(repair_graph(&mut spec).is_empty());
        assert_eq!(spec.nodes[0].inputs.len(), 1);
    }

    proptest! {
        #[test]
        fn repair_is_idempotent(
            socket in "[A-Za-z ]{1,12}",
            values in proptest::collection::vec(-10.0f64..10.0, 0..30)
        ) {
            let mut spec = graph_with_input(&socket, ValueSpec::Array(values));
            repair_graph(&mut spec);
            let after_first = spec.clone();
            let second = repair_graph(&mut spec);
            prop_assert!(second.is_empty());
            prop_assert_eq!(spec, after_first);
        }
    }
}
