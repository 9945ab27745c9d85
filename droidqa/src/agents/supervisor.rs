//! Supervisor agent: judges whether expected results are satisfied.
//!
//! Verdict parsing is fail-closed. An unrecognized status never becomes a
//! pass, and a missing confidence falls back to an uncommitted 0.5.

use std::fmt;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::types::{SupervisorVerdict, TestStatus};
use crate::io::model::{ModelClient, ModelError};
use crate::prompt;

const SUPERVISOR_TEMPERATURE: f32 = 0.0;
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// The supervisor could not produce a verdict at all (model call or prompt
/// failure). A reachable model with a strange reply still yields a verdict,
/// just a failing one.
#[derive(Debug)]
pub struct VerificationError {
    message: String,
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for VerificationError {}

impl From<ModelError> for VerificationError {
    fn from(err: ModelError) -> Self {
        Self {
            message: format!("supervisor model call failed: {err}"),
        }
    }
}

impl From<anyhow::Error> for VerificationError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            message: format!("render supervisor prompt: {err:#}"),
        }
    }
}

/// Interim probe: does the current screen already satisfy the expected
/// result? Optionally contrasts against a before-screenshot.
#[instrument(skip_all)]
pub fn verify_step<M: ModelClient>(
    model: &M,
    expected_result: &str,
    screenshot: &Path,
    ui_texts: &[String],
    before_screenshot: Option<&Path>,
    extra_context: &str,
) -> Result<SupervisorVerdict, VerificationError> {
    let rendered = prompt::render_verify_step(
        expected_result,
        ui_texts,
        before_screenshot.is_some(),
        extra_context,
    )?;
    let mut images: Vec<&Path> = Vec::new();
    if let Some(before) = before_screenshot {
        images.push(before);
    }
    images.push(screenshot);

    let reply = model.generate_structured(&rendered, &images, SUPERVISOR_TEMPERATURE)?;
    Ok(parse_verdict(&reply))
}

/// Final verdict over the whole test: the end state plus what the agent did.
#[instrument(skip_all)]
pub fn verify_test_completion<M: ModelClient>(
    model: &M,
    goal: &str,
    expected_result: &str,
    final_screenshot: &Path,
    action_history: &[String],
    ui_texts: &[String],
) -> Result<SupervisorVerdict, VerificationError> {
    let rendered = prompt::render_verify_final(goal, expected_result, action_history, ui_texts)?;
    let reply = model.generate_structured(&rendered, &[final_screenshot], SUPERVISOR_TEMPERATURE)?;
    Ok(parse_verdict(&reply))
}

fn parse_verdict(data: &Value) -> SupervisorVerdict {
    let status = match data["status"].as_str().map(str::to_ascii_uppercase) {
        Some(ref s) if s == "PASSED" => TestStatus::Passed,
        other => {
            if other.as_deref() != Some("FAILED") {
                debug!(status = ?other, "unrecognized verdict status, treating as failed");
            }
            TestStatus::Failed
        }
    };
    let confidence = data["confidence"]
        .as_f64()
        .unwrap_or(DEFAULT_CONFIDENCE)
        .clamp(0.0, 1.0);

    SupervisorVerdict {
        status,
        evidence: data["evidence"].as_str().unwrap_or_default().to_string(),
        expected_vs_actual: data["expected_vs_actual"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedModel;
    use serde_json::json;

    #[test]
    fn parses_passing_verdict_case_insensitively() {
        let verdict = parse_verdict(&json!({
            "status": "passed",
            "evidence": "note titled Groceries is visible",
            "confidence": 0.93
        }));
        assert_eq!(verdict.status, TestStatus::Passed);
        assert!((verdict.confidence - 0.93).abs() < 1e-9);
    }

    #[test]
    fn unknown_status_fails_closed() {
        let verdict = parse_verdict(&json!({"status": "MAYBE", "confidence": 0.99}));
        assert_eq!(verdict.status, TestStatus::Failed);
        let verdict = parse_verdict(&json!({"evidence": "no status at all"}));
        assert_eq!(verdict.status, TestStatus::Failed);
    }

    #[test]
    fn missing_confidence_defaults_and_clamps() {
        let verdict = parse_verdict(&json!({"status": "PASSED"}));
        assert!((verdict.confidence - 0.5).abs() < 1e-9);
        let verdict = parse_verdict(&json!({"status": "PASSED", "confidence": 7.0}));
        assert!((verdict.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn step_verification_sends_before_and_after_screenshots() {
        let model = ScriptedModel::with_replies(&[r#"{"status": "PASSED", "confidence": 0.9}"#]);
        let before = Path::new("/tmp/before.png");
        let after = Path::new("/tmp/after.png");
        let verdict = verify_step(&model, "note exists", after, &[], Some(before), "")
            .expect("verdict");
        assert_eq!(verdict.status, TestStatus::Passed);
        assert!(model.prompts()[0].contains("BEFORE"));
    }

    #[test]
    fn model_failure_surfaces_as_error() {
        let model = ScriptedModel::new(vec![Err(crate::io::model::ModelError::new(
            "boom",
        ))]);
        let err = verify_test_completion(
            &model,
            "goal",
            "expected",
            Path::new("/tmp/final.png"),
            &[],
            &[],
        )
        .expect_err("model down");
        assert!(err.to_string().contains("supervisor model call failed"));
    }
}
