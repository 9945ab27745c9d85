//! Planner agent: asks the vision model for the next action.

use std::fmt;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::action::Action;
use crate::core::types::{Observation, PlannerResponse};
use crate::io::model::{ModelClient, ModelError};
use crate::prompt;

const PLANNER_TEMPERATURE: f32 = 0.1;

/// The planner could not produce a usable action: the model call failed, the
/// reply was not valid JSON, or its payload did not match the protocol. The
/// raw payload is carried in the message for run-directory diagnostics.
#[derive(Debug)]
pub struct PlanningError {
    message: String,
}

impl PlanningError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for PlanningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PlanningError {}

impl From<ModelError> for PlanningError {
    fn from(err: ModelError) -> Self {
        match err.body() {
            Some(body) => Self::new(format!("planner model call failed: {err}: {body}")),
            None => Self::new(format!("planner model call failed: {err}")),
        }
    }
}

impl From<anyhow::Error> for PlanningError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("render planner prompt: {err:#}"))
    }
}

/// Ask the model for the next action given the current observation.
#[instrument(skip_all, fields(iteration_texts = observation.ui_texts.len()))]
pub fn plan<M: ModelClient>(
    model: &M,
    goal: &str,
    expected_result: &str,
    step_context: &str,
    observation: &Observation,
    history: &[String],
) -> Result<PlannerResponse, PlanningError> {
    let rendered = prompt::render_planner(goal, expected_result, step_context, observation, history)?;
    let reply = model.generate_structured(
        &rendered,
        &[observation.screenshot_path.as_path()],
        PLANNER_TEMPERATURE,
    )?;
    let response = parse_response(&reply)?;
    debug!(
        actions = response.actions.len(),
        is_complete = response.is_complete,
        "planner response parsed"
    );
    Ok(response)
}

/// Decode the model's JSON payload into a [`PlannerResponse`].
///
/// The canonical shape carries a single `"action"` object; a legacy
/// `"actions"` list is still accepted. When both are present the single
/// action wins.
fn parse_response(data: &Value) -> Result<PlannerResponse, PlanningError> {
    let actions = if data.get("action").is_some_and(|a| !a.is_null()) {
        vec![parse_action(&data["action"], data)?]
    } else if let Some(list) = data.get("actions").and_then(Value::as_array) {
        list.iter()
            .map(|item| parse_action(item, data))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        Vec::new()
    };

    let is_complete = data["is_complete"].as_bool().unwrap_or(false);
    if actions.is_empty() && !is_complete {
        return Err(PlanningError::new(format!(
            "planner reply had neither an action nor is_complete: {data}"
        )));
    }

    Ok(PlannerResponse {
        actions,
        stop_condition: data["stop_condition"].as_str().unwrap_or_default().to_string(),
        notes: data["notes"].as_str().unwrap_or_default().to_string(),
        is_complete,
    })
}

fn parse_action(item: &Value, payload: &Value) -> Result<Action, PlanningError> {
    serde_json::from_value(item.clone()).map_err(|e| {
        PlanningError::new(format!("planner proposed an unusable action ({e}): {payload}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::action::ActionKind;
    use crate::test_support::ScriptedModel;

    fn observation() -> Observation {
        Observation {
            ui_texts: vec!["Compose".to_string()],
            ..Observation::default()
        }
    }

    fn plan_with(model: &ScriptedModel) -> Result<PlannerResponse, PlanningError> {
        plan(
            model,
            "open compose",
            "editor visible",
            "",
            &observation(),
            &[],
        )
    }

    #[test]
    fn parses_single_action_shape() {
        let model = ScriptedModel::with_replies(&[r#"{
            "action": {"action_type": "tap_text", "params": {"text": "Compose"}, "description": "tap compose"},
            "stop_condition": "editor opens",
            "notes": "button is visible",
            "is_complete": false
        }"#]);
        let response = plan_with(&model).expect("plan");
        assert_eq!(response.actions.len(), 1);
        assert_eq!(response.actions[0].kind, ActionKind::TapText);
        assert_eq!(response.stop_condition, "editor opens");
        assert!(!response.is_complete);
    }

    #[test]
    fn accepts_legacy_actions_list() {
        let model = ScriptedModel::with_replies(&[r#"{
            "actions": [{"action_type": "back", "params": {}, "description": "go back"}],
            "is_complete": false
        }"#]);
        let response = plan_with(&model).expect("plan");
        assert_eq!(response.actions.len(), 1);
        assert_eq!(response.actions[0].kind, ActionKind::Back);
    }

    #[test]
    fn single_action_wins_over_legacy_list() {
        let model = ScriptedModel::with_replies(&[r#"{
            "action": {"action_type": "home", "params": {}},
            "actions": [{"action_type": "back", "params": {}}]
        }"#]);
        let response = plan_with(&model).expect("plan");
        assert_eq!(response.actions.len(), 1);
        assert_eq!(response.actions[0].kind, ActionKind::Home);
    }

    #[test]
    fn completion_without_action_is_valid() {
        let model = ScriptedModel::with_replies(&[r#"{"is_complete": true, "notes": "done"}"#]);
        let response = plan_with(&model).expect("plan");
        assert!(response.is_complete);
        assert!(response.actions.is_empty());
    }

    #[test]
    fn rejects_unknown_action_kind() {
        let model = ScriptedModel::with_replies(&[r#"{
            "action": {"action_type": "teleport", "params": {}}
        }"#]);
        let err = plan_with(&model).expect_err("unknown kind");
        assert!(err.to_string().contains("unusable action"));
        assert!(err.to_string().contains("teleport"));
    }

    #[test]
    fn rejects_reply_with_nothing_to_do() {
        let model = ScriptedModel::with_replies(&[r#"{"notes": "hmm"}"#]);
        let err = plan_with(&model).expect_err("no action");
        assert!(err.to_string().contains("neither an action"));
    }

    #[test]
    fn planning_is_stateless_across_calls() {
        let reply = r#"{"action": {"action_type": "back", "params": {}}}"#;
        let model = ScriptedModel::with_replies(&[reply, reply]);
        let first = plan_with(&model).expect("first");
        let second = plan_with(&model).expect("second");
        assert_eq!(first, second);
    }
}
