//! Per-type node configuration.
//!
//! Each node type that carries properties gets one small configure
//! function; the registry maps canonical type names to them. Properties
//! must be applied before input values are bound, because on overloaded
//! nodes the selector property decides which sockets are live.
//!
//! Invalid enum values never fail the build: they are normalized to
//! uppercase, checked against the host's allow-list, and replaced by a
//! safe default with a warning.

use anyhow::Result;
use log::warn;

use crate::catalog::NodeTypeDescriptor;
use crate::resolver::apply_socket_visibility;
use crate::runtime::{NodeGraphRuntime, NodeHandle, PropertyValue, RampElement};
use crate::spec::{ColorRampSpec, NodeSpec};

type ConfigureFn =
    fn(&mut dyn NodeGraphRuntime, NodeHandle, &NodeSpec, &NodeTypeDescriptor) -> Result<()>;

const CONFIGURERS: &[(&str, ConfigureFn)] = &[
    ("ShaderNodeValToRGB", configure_color_ramp),
    ("ShaderNodeTexNoise", configure_noise),
    ("ShaderNodeMix", configure_mix),
    ("ShaderNodeMixRGB", configure_mix_rgb),
    ("ShaderNodeTexWave", configure_wave),
    ("ShaderNodeTexVoronoi", configure_voronoi),
    ("ShaderNodeTexMusgrave", configure_musgrave),
    ("ShaderNodeTexGradient", configure_gradient),
    ("ShaderNodeMath", configure_math),
    ("ShaderNodeVectorMath", configure_vector_math),
    ("ShaderNodeMapping", configure_mapping),
    ("ShaderNodeBump", configure_bump),
];

/// Applies all type-specific properties for one node. Types without an
/// entry in the registry have nothing to configure.
pub fn configure_node(
    runtime: &mut dyn NodeGraphRuntime,
    handle: NodeHandle,
    node: &NodeSpec,
    desc: &NodeTypeDescriptor,
) -> Result<()> {
    if let Some((_, f)) = CONFIGURERS
        .iter()
        .find(|(ty, _)| *ty == desc.type_name.as_str())
    {
        f(runtime, handle, node, desc)?;
    }
    Ok(())
}

/// Uppercases, validates against the allow-list, and writes the property,
/// substituting `fallback` on anything unexpected.
fn set_enum(
    runtime: &mut dyn NodeGraphRuntime,
    handle: NodeHandle,
    property: &str,
    raw: &str,
    allowed: &[&str],
    fallback: &str,
) -> Result<()> {
    let value = raw.to_uppercase();
    let value = if allowed.contains(&value.as_str()) {
        value
    } else {
        warn!("invalid {property} '{raw}', using '{fallback}'");
        fallback.to_string()
    };
    runtime.set_property(handle, property, &PropertyValue::Text(value))
}

const BLEND_TYPES: &[&str] = &[
    "MIX",
    "DARKEN",
    "MULTIPLY",
    "BURN",
    "LIGHTEN",
    "SCREEN",
    "DODGE",
    "ADD",
    "OVERLAY",
    "SOFT_LIGHT",
    "LINEAR_LIGHT",
    "DIFFERENCE",
    "EXCLUSION",
    "SUBTRACT",
    "DIVIDE",
    "HUE",
    "SATURATION",
    "COLOR",
    "VALUE",
];

const MATH_OPERATIONS: &[&str] = &[
    "ADD",
    "SUBTRACT",
    "MULTIPLY",
    "DIVIDE",
    "MULTIPLY_ADD",
    "POWER",
    "LOGARITHM",
    "SQRT",
    "INVERSE_SQRT",
    "ABSOLUTE",
    "EXPONENT",
    "MINIMUM",
    "MAXIMUM",
    "LESS_THAN",
    "GREATER_THAN",
    "SIGN",
    "COMPARE",
    "SMOOTH_MIN",
    "SMOOTH_MAX",
    "ROUND",
    "FLOOR",
    "CEIL",
    "TRUNC",
    "FRACT",
    "MODULO",
    "WRAP",
    "SNAP",
    "PINGPONG",
    "SINE",
    "COSINE",
    "TANGENT",
    "ARCSINE",
    "ARCCOSINE",
    "ARCTANGENT",
    "ARCTAN2",
    "SINH",
    "COSH",
    "TANH",
    "RADIANS",
    "DEGREES",
];

const VECTOR_MATH_OPERATIONS: &[&str] = &[
    "ADD",
    "SUBTRACT",
    "MULTIPLY",
    "DIVIDE",
    "MULTIPLY_ADD",
    "CROSS_PRODUCT",
    "PROJECT",
    "REFLECT",
    "REFRACT",
    "FACEFORWARD",
    "DOT_PRODUCT",
    "DISTANCE",
    "LENGTH",
    "SCALE",
    "NORMALIZE",
    "ABSOLUTE",
    "MINIMUM",
    "MAXIMUM",
    "FLOOR",
    "CEIL",
    "FRACTION",
    "MODULO",
    "WRAP",
    "SNAP",
    "SINE",
    "COSINE",
    "TANGENT",
];

/// Universal fallback gradient used when a color ramp node arrives with
/// no usable stop data: a warm dark-to-light brown ramp rather than the
/// host's harsh black-to-white default.
fn default_ramp() -> Vec<RampElement> {
    vec![
        RampElement {
            position: 0.0,
            color: [0.2, 0.15, 0.1, 1.0],
        },
        RampElement {
            position: 0.5,
            color: [0.5, 0.4, 0.3, 1.0],
        },
        RampElement {
            position: 1.0,
            color: [0.8, 0.7, 0.6, 1.0],
        },
    ]
}

fn ramp_elements(ramp: &ColorRampSpec) -> Vec<RampElement> {
    ramp.stops
        .iter()
        .map(|stop| {
            let color = match stop.color.as_slice() {
                [r, g, b, a, ..] => [*r, *g, *b, *a],
                [r, g, b] => [*r, *g, *b, 1.0],
                other => {
                    if !other.is_empty() {
                        warn!("color ramp stop has {} color components, using white", other.len());
                    }
                    [1.0, 1.0, 1.0, 1.0]
                }
            };
            RampElement {
                position: stop.position,
                color,
            }
        })
        .collect()
}

fn configure_color_ramp(
    runtime: &mut dyn NodeGraphRuntime,
    handle: NodeHandle,
    node: &NodeSpec,
    _desc: &NodeTypeDescriptor,
) -> Result<()> {
    let elements = match node.properties.color_ramp.as_ref() {
        Some(ramp) if !ramp.stops.is_empty() => ramp_elements(ramp),
        _ => {
            warn!("color ramp node has no stop data, using warm gradient default");
            default_ramp()
        }
    };
    runtime.set_property(handle, "color_ramp", &PropertyValue::Ramp(elements))?;

    if let Some(mode) = node.properties.color_mode.as_deref() {
        set_enum(runtime, handle, "color_mode", mode, &["RGB", "HSV", "HSL"], "RGB")?;
    }
    if let Some(interp) = node.properties.interpolation.as_deref() {
        // The host enum spells it B_SPLINE.
        let interp = if interp.eq_ignore_ascii_case("BSPLINE") {
            "B_SPLINE"
        } else {
            interp
        };
        set_enum(
            runtime,
            handle,
            "interpolation",
            interp,
            &["CONSTANT", "LINEAR", "EASE", "CARDINAL", "B_SPLINE"],
            "LINEAR",
        )?;
    }
    Ok(())
}

fn configure_noise(
    runtime: &mut dyn NodeGraphRuntime,
    handle: NodeHandle,
    node: &NodeSpec,
    _desc: &NodeTypeDescriptor,
) -> Result<()> {
    if let Some(dims) = node.properties.noise_dimensions.as_deref() {
        set_enum(
            runtime,
            handle,
            "noise_dimensions",
            dims,
            &["1D", "2D", "3D", "4D"],
            "3D",
        )?;
    }
    Ok(())
}

fn configure_mix(
    runtime: &mut dyn NodeGraphRuntime,
    handle: NodeHandle,
    node: &NodeSpec,
    desc: &NodeTypeDescriptor,
) -> Result<()> {
    if let Some(data_type) = node.properties.data_type.as_deref() {
        let value = data_type.to_uppercase();
        let value = if ["FLOAT", "VECTOR", "RGBA"].contains(&value.as_str()) {
            value
        } else {
            warn!("invalid data_type '{data_type}', using 'FLOAT'");
            "FLOAT".to_string()
        };
        runtime.set_property(handle, "data_type", &PropertyValue::Text(value.clone()))?;
        // Only the selector's socket triple stays visible.
        apply_socket_visibility(runtime, handle, desc, &value)?;
    }
    if let Some(blend) = node.properties.blend_type.as_deref() {
        set_enum(runtime, handle, "blend_type", blend, BLEND_TYPES, "MIX")?;
    }
    Ok(())
}

fn configure_mix_rgb(
    runtime: &mut dyn NodeGraphRuntime,
    handle: NodeHandle,
    node: &NodeSpec,
    _desc: &NodeTypeDescriptor,
) -> Result<()> {
    if let Some(blend) = node.properties.blend_type.as_deref() {
        set_enum(runtime, handle, "blend_type", blend, BLEND_TYPES, "MIX")?;
    }
    Ok(())
}

fn configure_wave(
    runtime: &mut dyn NodeGraphRuntime,
    handle: NodeHandle,
    node: &NodeSpec,
    _desc: &NodeTypeDescriptor,
) -> Result<()> {
    let p = &node.properties;
    if let Some(v) = p.wave_type.as_deref() {
        set_enum(runtime, handle, "wave_type", v, &["BANDS", "RINGS"], "BANDS")?;
    }
    if let Some(v) = p.bands_direction.as_deref() {
        set_enum(
            runtime,
            handle,
            "bands_direction",
            v,
            &["X", "Y", "Z", "DIAGONAL"],
            "X",
        )?;
    }
    if let Some(v) = p.rings_direction.as_deref() {
        set_enum(
            runtime,
            handle,
            "rings_direction",
            v,
            &["X", "Y", "Z", "SPHERICAL"],
            "X",
        )?;
    }
    if let Some(v) = p.wave_profile.as_deref() {
        set_enum(runtime, handle, "wave_profile", v, &["SIN", "SAW", "TRI"], "SIN")?;
    }
    Ok(())
}

fn configure_voronoi(
    runtime: &mut dyn NodeGraphRuntime,
    handle: NodeHandle,
    node: &NodeSpec,
    _desc: &NodeTypeDescriptor,
) -> Result<()> {
    if let Some(v) = node.properties.feature.as_deref() {
        set_enum(
            runtime,
            handle,
            "feature",
            v,
            &["F1", "F2", "SMOOTH_F1", "DISTANCE_TO_EDGE", "N_SPHERE_RADIUS"],
            "F1",
        )?;
    }
    if let Some(v) = node.properties.distance.as_deref() {
        set_enum(
            runtime,
            handle,
            "distance",
            v,
            &["EUCLIDEAN", "MANHATTAN", "CHEBYCHEV", "MINKOWSKI"],
            "EUCLIDEAN",
        )?;
    }
    Ok(())
}

fn configure_musgrave(
    runtime: &mut dyn NodeGraphRuntime,
    handle: NodeHandle,
    node: &NodeSpec,
    _desc: &NodeTypeDescriptor,
) -> Result<()> {
    if let Some(v) = node.properties.musgrave_type.as_deref() {
        set_enum(
            runtime,
            handle,
            "musgrave_type",
            v,
            &[
                "MULTIFRACTAL",
                "RIDGED_MULTIFRACTAL",
                "HYBRID_MULTIFRACTAL",
                "FBM",
                "HETERO_TERRAIN",
            ],
            "FBM",
        )?;
    }
    Ok(())
}

fn configure_gradient(
    runtime: &mut dyn NodeGraphRuntime,
    handle: NodeHandle,
    node: &NodeSpec,
    _desc: &NodeTypeDescriptor,
) -> Result<()> {
    if let Some(v) = node.properties.gradient_type.as_deref() {
        set_enum(
            runtime,
            handle,
            "gradient_type",
            v,
            &[
                "LINEAR",
                "QUADRATIC",
                "EASING",
                "DIAGONAL",
                "SPHERICAL",
                "QUADRATIC_SPHERE",
                "RADIAL",
            ],
            "LINEAR",
        )?;
    }
    Ok(())
}

fn configure_math(
    runtime: &mut dyn NodeGraphRuntime,
    handle: NodeHandle,
    node: &NodeSpec,
    _desc: &NodeTypeDescriptor,
) -> Result<()> {
    if let Some(op) = node.properties.operation.as_deref() {
        set_enum(runtime, handle, "operation", op, MATH_OPERATIONS, "ADD")?;
    }
    if let Some(clamp) = node.properties.use_clamp {
        runtime.set_property(handle, "use_clamp", &PropertyValue::Bool(clamp))?;
    }
    Ok(())
}

fn configure_vector_math(
    runtime: &mut dyn NodeGraphRuntime,
    handle: NodeHandle,
    node: &NodeSpec,
    _desc: &NodeTypeDescriptor,
) -> Result<()> {
    if let Some(op) = node.properties.operation.as_deref() {
        set_enum(runtime, handle, "operation", op, VECTOR_MATH_OPERATIONS, "ADD")?;
    }
    Ok(())
}

fn configure_mapping(
    runtime: &mut dyn NodeGraphRuntime,
    handle: NodeHandle,
    node: &NodeSpec,
    _desc: &NodeTypeDescriptor,
) -> Result<()> {
    if let Some(v) = node.properties.vector_type.as_deref() {
        set_enum(
            runtime,
            handle,
            "vector_type",
            v,
            &["POINT", "TEXTURE", "VECTOR", "NORMAL"],
            "POINT",
        )?;
    }
    Ok(())
}

fn configure_bump(
    runtime: &mut dyn NodeGraphRuntime,
    handle: NodeHandle,
    node: &NodeSpec,
    _desc: &NodeTypeDescriptor,
) -> Result<()> {
    if let Some(invert) = node.properties.invert {
        runtime.set_property(handle, "invert", &PropertyValue::Bool(invert))?;
    }
    Ok(())
}
