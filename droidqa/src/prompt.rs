//! Prompt rendering for the planner and supervisor.

use std::sync::LazyLock;

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::types::Observation;

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const VERIFY_STEP_TEMPLATE: &str = include_str!("prompts/verify_step.md");
const VERIFY_FINAL_TEMPLATE: &str = include_str!("prompts/verify_final.md");

static ENGINE: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.add_template("planner", PLANNER_TEMPLATE)
        .expect("planner template should be valid");
    env.add_template("verify_step", VERIFY_STEP_TEMPLATE)
        .expect("verify_step template should be valid");
    env.add_template("verify_final", VERIFY_FINAL_TEMPLATE)
        .expect("verify_final template should be valid");
    env
});

/// Render the planner prompt for one iteration.
pub fn render_planner(
    goal: &str,
    expected_result: &str,
    step_context: &str,
    observation: &Observation,
    history: &[String],
) -> Result<String> {
    let failure = observation
        .previous_result
        .as_ref()
        .filter(|r| !r.success)
        .map(|r| {
            format!(
                "{desc} failed: {message}",
                desc = describe_action(&r.action),
                message = r.error_message
            )
        });

    let template = ENGINE.get_template("planner")?;
    let rendered = template.render(context! {
        goal => goal.trim(),
        expected_result => expected_result.trim(),
        step_context => non_empty(step_context),
        activity => non_empty(&observation.activity),
        ui_texts => &observation.ui_texts,
        history => history,
        failure => failure,
        attempted => &observation.attempted_actions,
    })?;
    Ok(rendered)
}

/// Render the interim verification prompt.
pub fn render_verify_step(
    expected_result: &str,
    ui_texts: &[String],
    has_before: bool,
    extra_context: &str,
) -> Result<String> {
    let template = ENGINE.get_template("verify_step")?;
    let rendered = template.render(context! {
        expected_result => expected_result.trim(),
        ui_texts => ui_texts,
        has_before => has_before,
        extra_context => non_empty(extra_context),
    })?;
    Ok(rendered)
}

/// Render the final verification prompt.
pub fn render_verify_final(
    goal: &str,
    expected_result: &str,
    action_history: &[String],
    ui_texts: &[String],
) -> Result<String> {
    let template = ENGINE.get_template("verify_final")?;
    let rendered = template.render(context! {
        goal => goal.trim(),
        expected_result => expected_result.trim(),
        action_history => action_history,
        ui_texts => ui_texts,
    })?;
    Ok(rendered)
}

/// One-line human summary of an action for history and failure sections.
pub fn describe_action(action: &crate::core::action::Action) -> String {
    if action.description.is_empty() {
        action.signature()
    } else {
        format!("{} ({})", action.description, action.kind.as_str())
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::action::{Action, ActionKind};
    use crate::core::types::{ErrorKind, StepResult};
    use serde_json::Map;

    fn observation() -> Observation {
        Observation {
            ui_texts: vec!["Inbox".to_string(), "Compose".to_string()],
            activity: "com.example/.MainActivity".to_string(),
            ..Observation::default()
        }
    }

    #[test]
    fn planner_prompt_includes_goal_and_texts() {
        let prompt = render_planner(
            "Open the compose screen",
            "The compose editor is visible",
            "",
            &observation(),
            &[],
        )
        .expect("render");
        assert!(prompt.contains("Open the compose screen"));
        assert!(prompt.contains("- \"Compose\""));
        assert!(prompt.contains("com.example/.MainActivity"));
        assert!(!prompt.contains("Last action failed"));
        assert!(!prompt.contains("Already attempted"));
    }

    // The vocabulary must offer every action the executor can dispatch.
    #[test]
    fn planner_prompt_offers_every_executable_action() {
        let prompt = render_planner("goal", "expected", "", &observation(), &[]).expect("render");
        for kind in [
            "tap_text",
            "tap_and_type",
            "scroll_until_text",
            "clear_data",
            "relaunch_app",
            "key_event",
        ] {
            assert!(prompt.contains(&format!("`{kind}`")), "missing {kind}");
        }
    }

    #[test]
    fn planner_prompt_surfaces_failure_and_attempts() {
        let mut obs = observation();
        let action = Action::new(ActionKind::TapText, Map::new(), "tap the Send button");
        obs.previous_result = Some(StepResult::failed(
            action,
            ErrorKind::ElementNotFound,
            "element with text \"Send\" not found",
        ));
        obs.attempted_actions = vec!["tap_text:{\"text\":\"Send\"}".to_string()];

        let prompt = render_planner("Send the message", "Message is sent", "", &obs, &[])
            .expect("render");
        assert!(prompt.contains("Last action failed"));
        assert!(prompt.contains("not found"));
        assert!(prompt.contains("Already attempted"));
        assert!(prompt.contains("tap_text:{\"text\":\"Send\"}"));
    }

    #[test]
    fn step_prompt_mentions_before_screenshot_only_when_present() {
        let with = render_verify_step("ok", &[], true, "").expect("render");
        assert!(with.contains("BEFORE"));
        let without = render_verify_step("ok", &[], false, "").expect("render");
        assert!(!without.contains("BEFORE"));
    }

    #[test]
    fn final_prompt_lists_action_history() {
        let prompt = render_verify_final(
            "Create a note",
            "The note exists",
            &["tap the plus button (tap_text)".to_string()],
            &["Notes".to_string()],
        )
        .expect("render");
        assert!(prompt.contains("1. tap the plus button (tap_text)"));
        assert!(prompt.contains("- \"Notes\""));
    }
}
