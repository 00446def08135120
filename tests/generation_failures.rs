use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use material_forge::runtime::MemoryRuntime;
use material_forge::schema::ValidationError;
use material_forge::session::{GenerateError, GenerateRequest, MaterialGenerator, Session, run_pipeline};
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

fn partial_material_json() -> String {
    json!({
        "material_name": "Lava",
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
    .to_string()
}

#[test]
fn continuation_round_merges_the_remainder() {
    let fragment = json!({
        "nodes": [
            {"type": "ShaderNodeEmission"},
            {"type": "ShaderNodeOutputMaterial"}
        ],
        "links": [
            {"from_node": 0, "from_socket": "Emission", "to_node": 1, "to_socket": "Surface"}
        ]
    })
    .to_string();
    let (mut session, prompts) = scripted_session(vec![
        Ok(format!("{}\n[CONTINUE]", partial_material_json())),
        Ok(fragment),
    ]);
    let mut runtime = MemoryRuntime::new().expect("runtime");

    let report = run_pipeline(
        &mut session,
        &mut runtime,
        &GenerateRequest::fresh("glowing molten lava flow"),
    )
    .expect("pipeline");

    assert_eq!(report.material_name, "Lava");
    assert_eq!(runtime.node_count(), 5);
    assert_eq!(report.attempted_links, 3);
    assert_eq!(report.successful_links, 3);
    assert!(!report.truncated);

    let prompts = prompts.lock().expect("prompt log");
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("Nodes received: 3"));
    assert!(prompts[1].contains("Links received: 2"));
}

#[test]
fn failed_continuation_keeps_the_partial_material() {
    let (mut session, _) = scripted_session(vec![
        Ok(format!("{}\n[CONTINUE]", partial_material_json())),
        Err("connection reset".to_string()),
    ]);
    let mut runtime = MemoryRuntime::new().expect("runtime");

    let report = run_pipeline(
        &mut session,
        &mut runtime,
        &GenerateRequest::fresh("glowing molten lava flow"),
    )
    .expect("pipeline");

    // Partial nodes plus the auto-appended output node.
    assert_eq!(report.requested_nodes, 4);
    assert!(report.truncated);
}

#[test]
fn quota_errors_are_classified() {
    let (mut session, _) =
        scripted_session(vec![Err("HTTP 429: resource has been exhausted".to_string())]);
    let mut runtime = MemoryRuntime::new().expect("runtime");

    let err = run_pipeline(
        &mut session,
        &mut runtime,
        &GenerateRequest::fresh("anything at all really"),
    )
    .expect_err("quota failure");
    assert!(matches!(err, GenerateError::QuotaExceeded { .. }));
}

#[test]
fn auth_errors_are_classified() {
    let (mut session, _) = scripted_session(vec![Err("HTTP 403 Forbidden".to_string())]);
    let mut runtime = MemoryRuntime::new().expect("runtime");

    let err = run_pipeline(
        &mut session,
        &mut runtime,
        &GenerateRequest::fresh("anything at all really"),
    )
    .expect_err("auth failure");
    assert!(matches!(err, GenerateError::Unauthorized { .. }));
}

#[test]
fn invalid_nodes_field_is_a_validation_error_and_touches_no_runtime() {
    let (mut session, _) = scripted_session(vec![Ok(
        r#"{"material_name": "Bad", "nodes": "none", "links": []}"#.to_string(),
    )]);
    let mut runtime = MemoryRuntime::new().expect("runtime");

    let err = run_pipeline(
        &mut session,
        &mut runtime,
        &GenerateRequest::fresh("anything at all really"),
    )
    .expect_err("validation failure");
    match err {
        GenerateError::Validation(ValidationError::WrongType { field, .. }) => {
            assert_eq!(field, "nodes");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(runtime.node_count(), 0);
}

#[test]
fn cut_off_json_reports_truncation() {
    let (mut session, _) = scripted_session(vec![Ok(
        r#"{"material_name": "Cut", "nodes": [{"type": "ShaderNodeTexNoise""#.to_string(),
    )]);
    let mut runtime = MemoryRuntime::new().expect("runtime");

    let err = run_pipeline(
        &mut session,
        &mut runtime,
        &GenerateRequest::fresh("anything at all really"),
    )
    .expect_err("truncation");
    assert!(matches!(err, GenerateError::Truncated));
}
