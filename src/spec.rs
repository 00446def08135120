//! Data model for untrusted material descriptions.
//!
//! These types mirror the JSON shape a language model is asked to produce:
//! a material name, an indexed node list, and links that address nodes by
//! position in that list. Everything here is lenient on purpose; strictness
//! lives in the schema validator and the repair pass.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single input value as it arrives from the model. Untagged so that
/// `0.5`, `[0.8, 0.2, 0.1, 1.0]`, `"MUST_CONNECT"` and
/// `{"default_value": 0.5}` all parse without a schema hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueSpec {
    Bool(bool),
    Scalar(f64),
    Text(String),
    Array(Vec<f64>),
    Wrapped(BTreeMap<String, ValueSpec>),
}

impl ValueSpec {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            ValueSpec::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// Unwraps one level of `{"some_key": value}` wrapper, as emitted by
    /// models that echo the host API's `default_value` convention. Only
    /// single-key maps are unwrapped; anything else is returned as-is.
    pub fn unwrapped(&self) -> &ValueSpec {
        match self {
            ValueSpec::Wrapped(map) if map.len() == 1 => {
                map.values().next().map(|v| v.unwrapped()).unwrap_or(self)
            }
            other => other,
        }
    }
}

/// Color ramp stop list for ShaderNodeValToRGB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorRampSpec {
    #[serde(default)]
    pub stops: Vec<RampStop>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RampStop {
    #[serde(default = "default_stop_position")]
    pub position: f64,
    #[serde(default)]
    pub color: Vec<f64>,
}

fn default_stop_position() -> f64 {
    0.5
}

/// Node-level configuration carried as flat optional fields alongside the
/// inputs map. Each field only applies to specific node types; the
/// configure pass decides which ones a given node honors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blend_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wave_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bands_direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rings_direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub musgrave_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpolation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_dimensions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wave_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gradient_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_clamp: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invert: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ior: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_density: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_ramp: Option<ColorRampSpec>,
}

impl NodeProperties {
    pub fn is_empty(&self) -> bool {
        *self == NodeProperties::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(rename = "type")]
    pub node_type: String,
    /// Display name override for the created node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Editor position hint. Ignored when auto-layout runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<[f64; 2]>,
    #[serde(default)]
    pub inputs: BTreeMap<String, ValueSpec>,
    #[serde(flatten)]
    pub properties: NodeProperties,
}

/// Connection between two nodes, addressed by index into the nodes array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub from_node: usize,
    pub from_socket: String,
    pub to_node: usize,
    pub to_socket: String,
}

/// A complete validated material description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSpec {
    pub material_name: String,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_spec_parses_all_shapes() {
        let v: ValueSpec = serde_json::from_str("0.5").unwrap();
        assert_eq!(v, ValueSpec::Scalar(0.5));
        let v: ValueSpec = serde_json::from_str("true").unwrap();
        assert_eq!(v, ValueSpec::Bool(true));
        let v: ValueSpec = serde_json::from_str(r#""MUST_CONNECT""#).unwrap();
        assert_eq!(v, ValueSpec::Text("MUST_CONNECT".into()));
        let v: ValueSpec = serde_json::from_str("[0.8, 0.2, 0.1, 1.0]").unwrap();
        assert_eq!(v, ValueSpec::Array(vec![0.8, 0.2, 0.1, 1.0]));
    }

    #[test]
    fn wrapped_value_unwraps_single_key_maps() {
        let v: ValueSpec = serde_json::from_str(r#"{"default_value": 2.5}"#).unwrap();
        assert_eq!(v.unwrapped(), &ValueSpec::Scalar(2.5));

        // Nested wrappers unwrap all the way down.
        let v: ValueSpec =
            serde_json::from_str(r#"{"value": {"default_value": 1.0}}"#).unwrap();
        assert_eq!(v.unwrapped(), &ValueSpec::Scalar(1.0));

        // Multi-key maps stay wrapped.
        let v: ValueSpec = serde_json::from_str(r#"{"a": 1.0, "b": 2.0}"#).unwrap();
        assert!(matches!(v.unwrapped(), ValueSpec::Wrapped(m) if m.len() == 2));
    }

    #[test]
    fn node_spec_parses_flattened_properties() {
        let json = r#"{
            "type": "ShaderNodeMix",
            "data_type": "RGBA",
            "blend_type": "MULTIPLY",
            "inputs": {"Factor": 0.5}
        }"#;
        let node: NodeSpec = serde_json::from_str(json).unwrap();
        assert_eq!(node.node_type, "ShaderNodeMix");
        assert_eq!(node.properties.data_type.as_deref(), Some("RGBA"));
        assert_eq!(node.properties.blend_type.as_deref(), Some("MULTIPLY"));
        assert_eq!(node.inputs.get("Factor"), Some(&ValueSpec::Scalar(0.5)));
    }

    #[test]
    fn color_ramp_property_parses() {
        let json = r#"{
            "type": "ColorRamp",
            "color_ramp": {"stops": [
                {"position": 0.0, "color": [0.0, 0.0, 0.0, 1.0]},
                {"position": 1.0, "color": [1.0, 1.0, 1.0, 1.0]}
            ]}
        }"#;
        let node: NodeSpec = serde_json::from_str(json).unwrap();
        let ramp = node.properties.color_ramp.unwrap();
        assert_eq!(ramp.stops.len(), 2);
        assert_eq!(ramp.stops[1].position, 1.0);
    }
}
