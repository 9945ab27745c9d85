//! Shared result and observation types for the agent loop.
//!
//! These types define stable contracts between planner, executor, supervisor,
//! and run loop. They are plain data and must remain deterministic across runs.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::action::Action;

/// Classification of an action execution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    None,
    ElementNotFound,
    Transport,
    Timeout,
    InvalidParams,
    Unknown,
}

/// Outcome of executing one action. Created by the executor, read by the
/// run loop, and fed back into the next observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub action: Action,
    pub success: bool,
    pub error_kind: ErrorKind,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub screenshot_path: Option<PathBuf>,
}

impl StepResult {
    pub fn ok(action: Action) -> Self {
        Self {
            action,
            success: true,
            error_kind: ErrorKind::None,
            error_message: String::new(),
            screenshot_path: None,
        }
    }

    pub fn failed(action: Action, error_kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            action,
            success: false,
            error_kind,
            error_message: message.into(),
            screenshot_path: None,
        }
    }
}

/// The grounding bundle handed to the planner (and supervisor) each cycle:
/// screenshot, ground-truth UI texts, and the previous step's outcome.
/// Constructed fresh before every planning call and never mutated after.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    /// Path to the current screenshot.
    pub screenshot_path: PathBuf,
    /// Visible text labels extracted from the live UI tree, deduplicated
    /// with insertion order preserved.
    pub ui_texts: Vec<String>,
    /// Current foreground activity, empty when unavailable.
    pub activity: String,
    /// The last executed action, absent on the first iteration.
    pub previous_action: Option<Action>,
    /// Result of the last executed action, absent on the first iteration.
    pub previous_result: Option<StepResult>,
    /// Signatures of actions already attempted this step, to block repeats.
    pub attempted_actions: Vec<String>,
}

/// Parsed planner output: the next action(s) plus completion signal.
///
/// The current protocol carries exactly one action; the list form survives
/// only to accept legacy responses. When `is_complete` is true the run loop
/// must not execute any contained action.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerResponse {
    pub actions: Vec<Action>,
    pub stop_condition: String,
    pub notes: String,
    pub is_complete: bool,
}

/// Final status of a test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Error,
}

/// Verdict from the supervisor for a step or a whole test.
///
/// Parsing is fail-closed: an unrecognized status string resolves to
/// `Failed`, never `Passed`. Confidence is advisory, clamped to `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorVerdict {
    pub status: TestStatus,
    pub evidence: String,
    #[serde(default)]
    pub expected_vs_actual: String,
    pub confidence: f64,
}

/// A QA test case: a natural-language goal plus what success looks like.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub name: String,
    /// Natural-language description of what to do.
    #[serde(rename = "description")]
    pub goal: String,
    /// Natural-language description of the expected end state.
    pub expected_result: String,
    /// Whether this test is expected to pass. Reporting-only; execution
    /// never branches on it.
    #[serde(default = "default_true")]
    pub should_pass: bool,
}

fn default_true() -> bool {
    true
}

/// Result of running one complete test case. Exactly one is produced per
/// test regardless of internal failures.
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub test: TestCase,
    pub status: TestStatus,
    pub verdict: Option<SupervisorVerdict>,
    pub steps: Vec<StepResult>,
    pub screenshots: Vec<PathBuf>,
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
    pub error_message: Option<String>,
}

impl TestResult {
    /// Whether the outcome matched the test's `should_pass` expectation.
    /// An `Error` status never matches either expectation.
    pub fn outcome_expected(&self) -> bool {
        match self.status {
            TestStatus::Passed => self.test.should_pass,
            TestStatus::Failed => !self.test.should_pass,
            TestStatus::Error => false,
        }
    }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::action::ActionKind;
    use serde_json::Map;

    fn case(should_pass: bool) -> TestCase {
        TestCase {
            id: "t1".to_string(),
            name: "sample".to_string(),
            goal: "open the menu".to_string(),
            expected_result: "menu is open".to_string(),
            should_pass,
        }
    }

    fn result(status: TestStatus, should_pass: bool) -> TestResult {
        TestResult {
            test: case(should_pass),
            status,
            verdict: None,
            steps: Vec::new(),
            screenshots: Vec::new(),
            duration: Duration::from_secs(1),
            error_message: None,
        }
    }

    #[test]
    fn outcome_expected_matrix() {
        assert!(result(TestStatus::Passed, true).outcome_expected());
        assert!(result(TestStatus::Failed, false).outcome_expected());
        assert!(!result(TestStatus::Passed, false).outcome_expected());
        assert!(!result(TestStatus::Failed, true).outcome_expected());
        assert!(!result(TestStatus::Error, true).outcome_expected());
        assert!(!result(TestStatus::Error, false).outcome_expected());
    }

    #[test]
    fn test_case_should_pass_defaults_to_true() {
        let yaml = "id: t1\nname: n\ndescription: d\nexpected_result: e\n";
        let case: TestCase = serde_yaml::from_str(yaml).expect("parse");
        assert!(case.should_pass);
    }

    #[test]
    fn step_result_constructors() {
        let action = Action::new(ActionKind::Back, Map::new(), "back");
        let ok = StepResult::ok(action.clone());
        assert!(ok.success);
        assert_eq!(ok.error_kind, ErrorKind::None);

        let failed = StepResult::failed(action, ErrorKind::Timeout, "timed out");
        assert!(!failed.success);
        assert_eq!(failed.error_kind, ErrorKind::Timeout);
        assert_eq!(failed.error_message, "timed out");
    }
}
