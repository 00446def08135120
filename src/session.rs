//! Generation session: prompt shaping, the model transport seam, error
//! classification, and the full prompt-to-report pipeline.
//!
//! The session owns no global state; everything the original flow kept in
//! module globals (model choice, transport handle, reference index) lives
//! in one [`Session`] value. The model transport itself is a trait so the
//! pipeline can run against anything that produces response text.

use std::borrow::Cow;

use anyhow::Result;
use log::{info, warn};
use thiserror::Error;

use crate::builder::{self, BuildReport};
use crate::merge::{clean_response_text, is_likely_truncated, merge};
use crate::repair::{Correction, repair_graph};
use crate::runtime::NodeGraphRuntime;
use crate::schema::{GraphRole, ValidationError, parse_material};
use crate::spec::{GraphSpec, NodeSpec};

/// Produces raw response text for a prompt. Implementations wrap an API
/// client; tests use canned responses.
pub trait MaterialGenerator {
    fn generate(&mut self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct ReferenceEntry {
    pub name: String,
    pub summary: String,
}

/// Optional lookup of curated material references folded into the prompt.
pub trait ReferenceLookup {
    fn search(&self, query: &str) -> Vec<ReferenceEntry>;
}

/// Default lookup that never matches anything.
pub struct NoReferences;

impl ReferenceLookup for NoReferences {
    fn search(&self, _query: &str) -> Vec<ReferenceEntry> {
        Vec::new()
    }
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("model '{model}' quota exceeded, try another model or wait until the quota resets")]
    QuotaExceeded { model: String },
    #[error("model '{model}' requires a paid tier, upgrade the API key or pick a free tier model")]
    Unauthorized { model: String },
    #[error("error from model '{model}': {message}")]
    Api { model: String, message: String },
    #[error("response was truncated, try a simpler prompt or start over")]
    Truncated,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("internal error: {0}")]
    Internal(String),
}

/// One generation request. `history` and `current_material` mark a
/// modification of an existing material; creativity enhancement only
/// applies to fresh prompts.
pub struct GenerateRequest<'a> {
    pub prompt: &'a str,
    pub history: &'a [String],
    pub current_material: Option<&'a GraphSpec>,
}

impl<'a> GenerateRequest<'a> {
    pub fn fresh(prompt: &'a str) -> GenerateRequest<'a> {
        GenerateRequest {
            prompt,
            history: &[],
            current_material: None,
        }
    }

    fn is_fresh(&self) -> bool {
        self.history.is_empty() && self.current_material.is_none()
    }
}

#[derive(Debug)]
pub struct GeneratedMaterial {
    pub spec: GraphSpec,
    pub corrections: Vec<Correction>,
    pub truncated: bool,
}

pub struct Session {
    model: String,
    generator: Box<dyn MaterialGenerator>,
    references: Box<dyn ReferenceLookup>,
}

impl Session {
    pub fn new(model: impl Into<String>, generator: Box<dyn MaterialGenerator>) -> Session {
        Session {
            model: model.into(),
            generator,
            references: Box::new(NoReferences),
        }
    }

    pub fn with_references(mut self, references: Box<dyn ReferenceLookup>) -> Session {
        self.references = references;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generates, cleans, validates, optionally continues, and repairs a
    /// material description. Transport and validation problems are hard
    /// errors; everything downstream degrades gracefully.
    pub fn generate_material(
        &mut self,
        request: &GenerateRequest,
    ) -> Result<GeneratedMaterial, GenerateError> {
        let prompt = if request.is_fresh() {
            let enhanced = enhance_creativity(request.prompt);
            if enhanced != request.prompt {
                info!("creativity enhancement applied to '{}'", request.prompt);
            }
            enhanced
        } else {
            Cow::Borrowed(request.prompt)
        };

        let references = if request.current_material.is_none() {
            self.references.search(&prompt)
        } else {
            Vec::new()
        };
        let full_prompt = build_prompt(request, &prompt, &references);

        let raw = self
            .generator
            .generate(&full_prompt)
            .map_err(|e| classify_error(&self.model, &e))?;

        let (cleaned, has_marker) = clean_response_text(&raw);
        let mut spec = match parse_material(&cleaned, GraphRole::Complete) {
            Ok(spec) => spec,
            Err(ValidationError::Json(e)) if is_likely_truncated(&raw) => {
                warn!("response failed to parse and looks cut off: {e}");
                return Err(GenerateError::Truncated);
            }
            Err(e) => return Err(e.into()),
        };

        let mut truncated = has_marker;
        if has_marker {
            info!("response carries a continuation marker, requesting the remainder");
            match self.request_continuation(&spec) {
                Ok((fragment, fragment_marker)) => {
                    spec = merge(spec, fragment);
                    truncated = fragment_marker;
                }
                Err(e) => {
                    warn!("continuation failed, keeping the partial material: {e}");
                }
            }
        }

        ensure_output_node(&mut spec);
        let corrections = repair_graph(&mut spec);

        Ok(GeneratedMaterial {
            spec,
            corrections,
            truncated,
        })
    }

    /// One follow-up round for a truncated response. The prompt carries
    /// counts only, never the partial payload itself.
    fn request_continuation(&mut self, partial: &GraphSpec) -> Result<(GraphSpec, bool)> {
        let prompt = format!(
            "Continue from where you left off.\n\n\
             Previous partial response received:\n\
             - Material name: {}\n\
             - Nodes received: {}\n\
             - Links received: {}\n\n\
             Please provide the REMAINING nodes and links in the same JSON format.\n\
             Return ONLY: {{\"nodes\": [...remaining...], \"links\": [...remaining...]}}",
            partial.material_name,
            partial.nodes.len(),
            partial.links.len()
        );
        let raw = self.generator.generate(&prompt)?;
        let (cleaned, marker) = clean_response_text(&raw);
        let fragment = parse_material(&cleaned, GraphRole::Fragment)?;
        Ok((fragment, marker))
    }
}

/// Appends a terminal output node when a material arrives without one.
pub fn ensure_output_node(spec: &mut GraphSpec) {
    let has_output = spec
        .nodes
        .iter()
        .any(|n| n.node_type == "ShaderNodeOutputMaterial" || n.node_type == "Output");
    if !has_output {
        warn!("material has no output node, appending one");
        spec.nodes.push(NodeSpec {
            node_type: "ShaderNodeOutputMaterial".to_string(),
            location: Some([300.0, 0.0]),
            ..Default::default()
        });
    }
}

fn build_prompt(request: &GenerateRequest, prompt: &str, references: &[ReferenceEntry]) -> String {
    let mut out = String::new();
    out.push_str("Create a procedural shader material as JSON.\n\n");

    if !request.history.is_empty() {
        out.push_str("Earlier requests in this session:\n");
        for earlier in request.history {
            out.push_str("- ");
            out.push_str(earlier);
            out.push('\n');
        }
        out.push('\n');
    }

    if let Some(current) = request.current_material {
        out.push_str("Modify the current material:\n");
        if let Ok(json) = serde_json::to_string(current) {
            out.push_str(&json);
        }
        out.push_str("\n\n");
    }

    for entry in references {
        out.push_str(&format!(
            "Reference material '{}': {}\n",
            entry.name, entry.summary
        ));
    }
    if !references.is_empty() {
        out.push('\n');
    }

    out.push_str("Request: ");
    out.push_str(prompt);
    out
}

fn classify_error(model: &str, err: &anyhow::Error) -> GenerateError {
    let message = format!("{err:#}");
    let lower = message.to_lowercase();
    if message.contains("429") || lower.contains("quota") || lower.contains("resource") {
        GenerateError::QuotaExceeded {
            model: model.to_string(),
        }
    } else if message.contains("401") || message.contains("403") || lower.contains("unauthorized")
    {
        GenerateError::Unauthorized {
            model: model.to_string(),
        }
    } else {
        GenerateError::Api {
            model: model.to_string(),
            message,
        }
    }
}

/// Runs the whole pipeline: generate and repair the description, build it
/// into the runtime, and report. Single-threaded and blocking; retry
/// policy belongs to the caller.
pub fn run_pipeline(
    session: &mut Session,
    runtime: &mut dyn NodeGraphRuntime,
    request: &GenerateRequest,
) -> Result<BuildReport, GenerateError> {
    let generated = session.generate_material(request)?;
    if !generated.corrections.is_empty() {
        info!("applied {} repair correction(s)", generated.corrections.len());
    }
    let mut report =
        builder::build(runtime, &generated.spec).map_err(|e| GenerateError::Internal(format!("{e:#}")))?;
    report.truncated = generated.truncated;
    Ok(report)
}

const GENERIC_ENHANCEMENT: &str = "with realistic detail, 3-4 color variations, surface texture depth with bump mapping, natural imperfections and character, worn areas and weathering, layered complexity for photorealism";

const CREATIVITY_TABLE: &[(&str, &str)] = &[
    (
        "wood",
        "detailed wood texture with natural grain patterns, 3-4 brown color variations (dark to light), subtle scratches and weathering marks, slight roughness variation across surface, visible wood knots and imperfections, aged appearance with character",
    ),
    (
        "bark",
        "detailed tree bark texture with deep grooves and ridges, 3-4 color variations (dark brown to gray), moss and lichen patches, vertical crack patterns, rough bumpy surface with displacement, weathered outer layers revealing inner bark",
    ),
    (
        "metal",
        "realistic metal surface with brushed directional scratches, 3-4 subtle color variations from oxidation and use, anisotropic reflections, fingerprint smudges and handling marks, edge wear revealing bare metal, micro-scratches and surface imperfections",
    ),
    (
        "aluminum",
        "brushed aluminum with linear scratch patterns, silver-gray base color with subtle blue-white highlights, anisotropic reflection streaks, oxidation spots with darker gray patches, fingerprint marks, edge wear with brightness variation",
    ),
    (
        "steel",
        "polished steel surface with mirror-like reflections, subtle blue-gray metallic tint, micro-scratches from handling, smudge marks and fingerprints, edge wear with slight rust tint, heat discoloration zones with color variation",
    ),
    (
        "iron",
        "industrial iron surface with rough texture, dark gray base with rust orange-brown patches, pitted surface with corrosion spots, 3-4 color layers (dark metal, rust, old paint), heavy wear on edges and high points, aged weathered appearance",
    ),
    (
        "rusty",
        "heavily rusted metal with 4-5 color variations (deep red-brown rust, orange surface rust, dark pitting, exposed metal patches), flaking rust texture, corrosion depth with displacement, rust streaks flowing down, aged industrial look",
    ),
    (
        "stone",
        "natural stone surface with 3-4 color variations, cracks and fracture lines, weathered pitted texture, moss and lichen growth in crevices, rough uneven surface with bump mapping, mineral deposits and color streaks",
    ),
    (
        "concrete",
        "rough concrete texture with 4-5 gray color variations (dark to light), visible aggregate particles, subtle cracks and wear patterns, stains and discoloration patches, porous surface texture with fine bumps, industrial weathered appearance",
    ),
    (
        "brick",
        "detailed brick wall with individual brick texture, 3-4 red-orange color variations per brick, visible mortar lines with gray color, surface weathering and erosion, moss growth in joints, slight unevenness and chipped edges",
    ),
    (
        "fabric",
        "woven fabric texture with visible thread pattern, 3-4 subtle color variations from wear, micro-fiber detail with bump mapping, slight fuzz on surface, worn areas with color fading, creases and fold patterns",
    ),
    (
        "leather",
        "natural leather surface with grain pattern, 3-4 brown color variations, subtle wrinkles and creases, worn shiny areas from use, scratches and scuff marks, aged patina with character",
    ),
    (
        "skin",
        "realistic skin texture with pores and micro-details, subtle color variations (undertones and surface tones), fine wrinkles and texture lines, subsurface scattering for translucency, natural irregularities and character",
    ),
    (
        "water",
        "detailed water surface with layered wave patterns, dynamic ripples and foam on peaks, 3-4 blue-green color variations based on depth, caustic light patterns preparation, proper refraction with IOR 1.333, volumetric depth absorption, realistic flow and movement",
    ),
    (
        "glass",
        "crystal clear glass with proper refraction, subtle blue-green tint, surface imperfections and tiny bubbles, fingerprint smudges, micro-scratches visible in certain angles, edge thickness variation, caustic light focusing",
    ),
    (
        "dirt",
        "earth ground texture with 4-5 brown color variations, small pebbles and debris, compressed areas and loose soil, moisture variation with darker patches, plant roots and organic matter, uneven bumpy surface",
    ),
    (
        "mud",
        "wet muddy surface with glossy and matte areas, 3-4 brown color variations (dark wet to light dry), cracked dry sections, water puddles reflecting light, footprints and disturbances, organic debris mixed in",
    ),
    (
        "sand",
        "fine sand texture with individual grain detail, 3-4 beige-tan color variations, subtle ripple patterns from wind, slight moisture darkening in areas, small shell fragments and debris, realistic granular appearance",
    ),
    (
        "paint",
        "painted surface with 2-3 paint layers visible, base color with chips revealing undercoat, brush stroke texture patterns, wear and scratching on edges, fading from sun exposure, slight gloss variation",
    ),
    (
        "plastic",
        "injection-molded plastic surface texture with subtle flow lines, 2-3 color variations from UV fading, scratches and scuff marks from use, slight texture grain pattern, worn shiny areas from handling, matte to semi-gloss variation",
    ),
    (
        "rubber",
        "textured rubber surface with 2-3 color variations, raised grip pattern with displacement, wear smooth areas, dust and dirt accumulation in grooves, slight shine variation from use, flexibility creasing marks",
    ),
];

/// Expands terse prompts into detailed creative descriptions. Exact
/// keyword matches are replaced outright; short prompts containing a
/// keyword get the description appended; very short prompts without any
/// match get a generic detail suffix. Longer prompts pass through.
pub fn enhance_creativity(prompt: &str) -> Cow<'_, str> {
    let lower = prompt.to_lowercase();
    let words = prompt.split_whitespace().count();

    for (keyword, enhancement) in CREATIVITY_TABLE {
        if lower == *keyword
            || lower == format!("{keyword} texture")
            || lower == format!("material {keyword}")
        {
            return Cow::Borrowed(enhancement);
        }
    }

    for (keyword, enhancement) in CREATIVITY_TABLE {
        if lower.contains(keyword) && words <= 3 {
            return Cow::Owned(format!("{prompt} - {enhancement}"));
        }
    }

    if words <= 2 {
        return Cow::Owned(format!("{prompt} {GENERIC_ENHANCEMENT}"));
    }
    Cow::Borrowed(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_keyword_is_replaced() {
        let out = enhance_creativity("wood");
        assert!(out.starts_with("detailed wood texture"));
        let out = enhance_creativity("Wood texture");
        assert!(out.starts_with("detailed wood texture"));
        let out = enhance_creativity("material metal");
        assert!(out.starts_with("realistic metal surface"));
    }

    #[test]
    fn short_prompt_with_keyword_gets_appended_detail() {
        let out = enhance_creativity("old rusty pipe");
        assert!(out.starts_with("old rusty pipe - heavily rusted metal"));
    }

    #[test]
    fn very_short_unknown_prompt_gets_generic_detail() {
        let out = enhance_creativity("alien crystal");
        assert!(out.starts_with("alien crystal with realistic detail"));
    }

    #[test]
    fn long_prompts_pass_through() {
        let prompt = "a very specific hand painted ceramic tile with gold inlay";
        assert_eq!(enhance_creativity(prompt), prompt);
    }

    #[test]
    fn error_classification_buckets() {
        let quota = classify_error("m", &anyhow::anyhow!("HTTP 429: quota exceeded"));
        assert!(matches!(quota, GenerateError::QuotaExceeded { .. }));
        let auth = classify_error("m", &anyhow::anyhow!("403 Forbidden"));
        assert!(matches!(auth, GenerateError::Unauthorized { .. }));
        let auth = classify_error("m", &anyhow::anyhow!("request unauthorized"));
        assert!(matches!(auth, GenerateError::Unauthorized { .. }));
        let api = classify_error("m", &anyhow::anyhow!("connection reset"));
        assert!(matches!(api, GenerateError::Api { .. }));
    }

    #[test]
    fn missing_output_node_is_appended() {
        let mut spec = GraphSpec {
            material_name: "Test".into(),
            nodes: vec![NodeSpec {
                node_type: "ShaderNodeBsdfPrincipled".into(),
                ..Default::default()
            }],
            links: Vec::new(),
        };
        ensure_output_node(&mut spec);
        assert_eq!(spec.nodes.len(), 2);
        assert_eq!(spec.nodes[1].node_type, "ShaderNodeOutputMaterial");
        // Idempotent.
        ensure_output_node(&mut spec);
        assert_eq!(spec.nodes.len(), 2);
    }
}
