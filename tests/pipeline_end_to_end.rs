use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use material_forge::builder::ConnectivityIssue;
use material_forge::runtime::{MemoryRuntime, NodeHandle};
use material_forge::session::{GenerateRequest, MaterialGenerator, Session, run_pipeline};
use serde_json::json;

struct ScriptedGenerator {
    responses: VecDeque<Result<String, String>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MaterialGenerator for ScriptedGenerator {
    fn generate(&mut self, prompt: &str) -> anyhow::Result<String> {
        self.prompts
            .lock()
            .expect("prompt log")
            .push(prompt.to_string());
        match self.responses.pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Err(anyhow::anyhow!("no scripted response left")),
        }
    }
}

fn scripted_session(responses: Vec<Result<String, String>>) -> (Session, Arc<Mutex<Vec<String>>>) {
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let generator = ScriptedGenerator {
        responses: responses.into(),
        prompts: Arc::clone(&prompts),
    };
    (Session::new("scripted", Box::new(generator)), prompts)
}

fn wood_material_json() -> String {
    json!({
        "material_name": "Oak Plank",
        "nodes": [
            {"type": "ShaderNodeTexNoise", "inputs": {"Scale": 8.0, "Detail": 6.0}},
            {"type": "ColorRamp"},
            {"type": "ShaderNodeBsdfPrincipled", "inputs": {"Roughness": 0.6}},
            {"type": "ShaderNodeOutputMaterial"}
        ],
        "links": [
            {"from_node": 0, "from_socket": "Fac", "to_node": 1, "to_socket": "Fac"},
            {"from_node": 1, "from_socket": "Color", "to_node": 2, "to_socket": "Base Color"},
            {"from_node": 2, "from_socket": "BSDF", "to_node": 3, "to_socket": "Surface"}
        ]
    })
    .to_string()
}

#[test]
fn fresh_prompt_builds_a_complete_material() {
    let (mut session, prompts) = scripted_session(vec![Ok(wood_material_json())]);
    let mut runtime = MemoryRuntime::new().expect("runtime");

    let report = run_pipeline(&mut session, &mut runtime, &GenerateRequest::fresh("wood"))
        .expect("pipeline");

    assert!(report.is_complete());
    assert_eq!(report.material_name, "Oak Plank");
    assert_eq!(report.created_nodes, 4);
    assert_eq!(report.successful_links, 3);
    assert_eq!(report.surface_connected, Some(true));
    assert!(!report.truncated);
    assert_eq!(runtime.node_count(), 4);
    // The type alias resolves to a concrete node type.
    assert_eq!(runtime.node_type(NodeHandle(1)), Some("ShaderNodeValToRGB"));
    // The noise texture feeds everything, so only it lacks incoming links.
    assert_eq!(report.unconnected, vec![(0, ConnectivityIssue::NoIncoming)]);

    let prompts = prompts.lock().expect("prompt log");
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("detailed wood texture with natural grain patterns"));
}

#[test]
fn layout_assigns_depth_columns_to_unplaced_nodes() {
    let (mut session, _) = scripted_session(vec![Ok(wood_material_json())]);
    let mut runtime = MemoryRuntime::new().expect("runtime");

    let report = run_pipeline(&mut session, &mut runtime, &GenerateRequest::fresh("wood"))
        .expect("pipeline");

    let x_of = |i: usize| {
        let handle = report.node_handles[i].expect("created node");
        runtime.location(handle).expect("location").0
    };
    assert_eq!(x_of(0), 0.0);
    assert_eq!(x_of(1), 300.0);
    assert_eq!(x_of(2), 600.0);
    assert_eq!(x_of(3), 900.0);
}

#[test]
fn modification_requests_skip_creativity_enhancement() {
    let (mut session, prompts) = scripted_session(vec![Ok(wood_material_json())]);
    let mut runtime = MemoryRuntime::new().expect("runtime");

    let history = vec!["a plain oak material".to_string()];
    let request = GenerateRequest {
        prompt: "wood",
        history: &history,
        current_material: None,
    };
    run_pipeline(&mut session, &mut runtime, &request).expect("pipeline");

    let prompts = prompts.lock().expect("prompt log");
    assert!(prompts[0].contains("Request: wood"));
    assert!(prompts[0].contains("a plain oak material"));
    assert!(!prompts[0].contains("natural grain patterns"));
}

#[test]
fn fenced_response_with_repairs_still_builds() {
    let raw = format!(
        "```json\n{}\n```",
        json!({
            "material_name": "Patched",
            "nodes": [
                {"type": "ShaderNodeTexNoise", "inputs": {"Scale": 5.0}},
                {"type": "ShaderNodeBsdfPrincipled", "inputs": {
                    // Oversized array and a placeholder, both repaired away.
                    "Base Color": [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0, 0.1],
                    "Roughness": "MUST_CONNECT"
                }},
                {"type": "ShaderNodeOutputMaterial"}
            ],
            "links": [
                {"from_node": 0, "from_socket": "Fac", "to_node": 1, "to_socket": "Roughness"},
                {"from_node": 1, "from_socket": "BSDF", "to_node": 2, "to_socket": "Surface"}
            ]
        })
    );
    let (mut session, _) = scripted_session(vec![Ok(raw)]);
    let mut runtime = MemoryRuntime::new().expect("runtime");

    let report = run_pipeline(&mut session, &mut runtime, &GenerateRequest::fresh("patched test material"))
        .expect("pipeline");

    assert!(report.is_complete());
    assert_eq!(report.created_nodes, 3);
    assert_eq!(report.successful_links, 2);
}

#[test]
fn missing_output_node_is_appended_before_building() {
    let response = json!({
        "material_name": "Headless",
        "nodes": [
            {"type": "ShaderNodeTexNoise"},
            {"type": "ColorRamp"},
            {"type": "ShaderNodeBsdfPrincipled"}
        ],
        "links": [
            {"from_node": 0, "from_socket": "Fac", "to_node": 1, "to_socket": "Fac"},
            {"from_node": 1, "from_socket": "Color", "to_node": 2, "to_socket": "Base Color"}
        ]
    })
    .to_string();
    let (mut session, _) = scripted_session(vec![Ok(response)]);
    let mut runtime = MemoryRuntime::new().expect("runtime");

    let report = run_pipeline(&mut session, &mut runtime, &GenerateRequest::fresh("headless test material"))
        .expect("pipeline");

    assert_eq!(report.requested_nodes, 4);
    assert_eq!(
        runtime.node_type(NodeHandle(3)),
        Some("ShaderNodeOutputMaterial")
    );
    // Appended, never wired, so the surface stays unconnected.
    assert_eq!(report.surface_connected, Some(false));
}
