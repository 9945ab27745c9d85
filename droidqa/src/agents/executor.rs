//! Executor agent: dispatches one planned action to the device.
//!
//! The executor never returns an error. Every outcome, including bad
//! parameters from the planner, is folded into a [`StepResult`] so the run
//! loop can feed it back into the next observation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::core::action::{Action, ActionKind};
use crate::core::classify::classify_transport_message;
use crate::core::types::{ErrorKind, StepResult};
use crate::io::device::{Device, DeviceError, ScrollDirection};

const DEFAULT_SWIPE_DURATION_MS: u64 = 300;
const DEFAULT_SCROLL_SWIPES: u32 = 5;
const TAP_SETTLE: Duration = Duration::from_millis(300);

/// Executes planned actions against a device for one app under test.
pub struct Executor<'a, D: Device> {
    device: &'a D,
    package: String,
    width: u32,
    height: u32,
    shots_dir: Option<PathBuf>,
}

impl<'a, D: Device> Executor<'a, D> {
    /// Queries the screen size once; all coordinate conversion uses it.
    pub fn new(device: &'a D, package: impl Into<String>) -> Result<Self, DeviceError> {
        let (width, height) = device.screen_size()?;
        Ok(Self {
            device,
            package: package.into(),
            width,
            height,
            shots_dir: None,
        })
    }

    /// Directory for ad-hoc `screenshot` actions.
    pub fn with_shots_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shots_dir = Some(dir.into());
        self
    }

    pub fn screen(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Perform `action` on the device. Never fails; the outcome is encoded
    /// in the returned [`StepResult`].
    #[instrument(skip_all, fields(kind = action.kind.as_str()))]
    pub fn execute(&self, action: &Action) -> StepResult {
        match self.dispatch(action) {
            Ok(screenshot_path) => {
                debug!("action succeeded");
                StepResult {
                    screenshot_path,
                    ..StepResult::ok(action.clone())
                }
            }
            Err(failure) => {
                warn!(kind = ?failure.kind, message = %failure.message, "action failed");
                StepResult::failed(action.clone(), failure.kind, failure.message)
            }
        }
    }

    /// Execute a batch in order, stopping at (and including) the first
    /// failure. With a screenshot directory, a screenshot is captured after
    /// each successful action and attached to its result; a failed capture
    /// does not fail the step.
    pub fn execute_all(&self, actions: &[Action], screenshot_dir: Option<&Path>) -> Vec<StepResult> {
        let mut results = Vec::with_capacity(actions.len());
        for (index, action) in actions.iter().enumerate() {
            let mut step = self.execute(action);
            if step.success {
                if let Some(dir) = screenshot_dir {
                    let path = dir.join(format!("step_{index:03}.png"));
                    match self.device.take_screenshot(&path) {
                        Ok(()) => step.screenshot_path = Some(path),
                        Err(e) => warn!(error = %e, "batch screenshot failed"),
                    }
                }
            }
            let failed = !step.success;
            results.push(step);
            if failed {
                break;
            }
        }
        results
    }

    fn dispatch(&self, action: &Action) -> Result<Option<PathBuf>, Failure> {
        let params = &action.params;
        match action.kind {
            ActionKind::Tap => {
                let (x, y) = self.pixel_point(params, "x", "y")?;
                self.device.tap(x, y)?;
            }
            ActionKind::TapText => {
                let text = str_param(params, "text")?;
                let partial = bool_param(params, "partial", false);
                self.device.tap_by_text(text, partial)?;
            }
            ActionKind::Swipe => {
                let (x1, y1) = self.pixel_point(params, "x1", "y1")?;
                let (x2, y2) = self.pixel_point(params, "x2", "y2")?;
                let duration = u64_param(params, "duration_ms", DEFAULT_SWIPE_DURATION_MS);
                self.device.swipe(x1, y1, x2, y2, duration)?;
            }
            ActionKind::TypeText => {
                let text = str_param(params, "text")?;
                self.device.type_text(text)?;
            }
            ActionKind::TapAndType => {
                let target = str_param(params, "target_text")?;
                let input = str_param(params, "input_text")?;
                let partial = bool_param(params, "partial", false);
                self.device.tap_by_text(target, partial)?;
                self.device.wait(TAP_SETTLE)?;
                self.device.type_text(input)?;
            }
            ActionKind::KeyEvent => {
                let code = params
                    .get("key_code")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| Failure::invalid("key_event requires an integer key_code"))?;
                self.device.key_event(code)?;
            }
            ActionKind::Back => self.device.back()?,
            ActionKind::Home => self.device.home()?,
            ActionKind::LaunchApp => self.device.launch_app(self.package_param(params))?,
            ActionKind::ForceStop => self.device.force_stop(self.package_param(params))?,
            ActionKind::ClearData => self.device.clear_app_data(self.package_param(params))?,
            ActionKind::RelaunchApp => self.device.relaunch_app(self.package_param(params))?,
            ActionKind::ScrollUntilText => {
                let text = str_param(params, "text")?;
                let direction = ScrollDirection::parse(
                    params
                        .get("direction")
                        .and_then(Value::as_str)
                        .unwrap_or("down"),
                );
                let max_swipes = u64_param(params, "max_swipes", u64::from(DEFAULT_SCROLL_SWIPES));
                let partial = bool_param(params, "partial", false);
                self.device
                    .scroll_until_text(text, direction, max_swipes as u32, partial)?;
            }
            ActionKind::Wait => {
                let seconds = params.get("seconds").and_then(Value::as_f64).unwrap_or(1.0);
                if !(0.0..=60.0).contains(&seconds) {
                    return Err(Failure::invalid(format!(
                        "wait seconds out of range: {seconds}"
                    )));
                }
                self.device.wait(Duration::from_secs_f64(seconds))?;
            }
            ActionKind::Screenshot => {
                let name = params
                    .get("path")
                    .and_then(Value::as_str)
                    .unwrap_or("screenshot.png");
                let path = match &self.shots_dir {
                    Some(dir) => dir.join(name),
                    None => PathBuf::from(name),
                };
                self.device.take_screenshot(&path)?;
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    /// Convert a normalized `[0, 1]` coordinate pair to device pixels.
    /// Fractions are truncated toward zero.
    fn pixel_point(
        &self,
        params: &Map<String, Value>,
        x_key: &str,
        y_key: &str,
    ) -> Result<(i64, i64), Failure> {
        let x = norm_param(params, x_key)?;
        let y = norm_param(params, y_key)?;
        Ok((
            (x * f64::from(self.width)) as i64,
            (y * f64::from(self.height)) as i64,
        ))
    }

    fn package_param<'p>(&'p self, params: &'p Map<String, Value>) -> &'p str {
        params
            .get("package")
            .and_then(Value::as_str)
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(&self.package)
    }
}

struct Failure {
    kind: ErrorKind,
    message: String,
}

impl Failure {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InvalidParams,
            message: message.into(),
        }
    }
}

impl From<DeviceError> for Failure {
    fn from(err: DeviceError) -> Self {
        let message = err.to_string();
        Self {
            kind: classify_transport_message(&message),
            message,
        }
    }
}

fn norm_param(params: &Map<String, Value>, key: &str) -> Result<f64, Failure> {
    let value = params
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| Failure::invalid(format!("missing numeric param {key:?}")))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(Failure::invalid(format!(
            "param {key:?} must be normalized to [0, 1], got {value}"
        )));
    }
    Ok(value)
}

fn str_param<'p>(params: &'p Map<String, Value>, key: &str) -> Result<&'p str, Failure> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Failure::invalid(format!("missing text param {key:?}")))
}

fn bool_param(params: &Map<String, Value>, key: &str, default: bool) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn u64_param(params: &Map<String, Value>, key: &str, default: u64) -> u64 {
    params.get(key).and_then(Value::as_u64).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedDevice;
    use serde_json::json;

    fn action(kind: ActionKind, params: Value) -> Action {
        Action::new(kind, params.as_object().expect("object").clone(), "")
    }

    fn executor(device: &ScriptedDevice) -> Executor<'_, ScriptedDevice> {
        Executor::new(device, "com.example").expect("screen size")
    }

    #[test]
    fn tap_converts_normalized_coordinates_by_truncation() {
        let device = ScriptedDevice::new().with_screen(1080, 1920);
        let exec = executor(&device);

        let result = exec.execute(&action(ActionKind::Tap, json!({"x": 0.5, "y": 0.5})));
        assert!(result.success);
        let result = exec.execute(&action(ActionKind::Tap, json!({"x": 1.0, "y": 1.0})));
        assert!(result.success);
        let result = exec.execute(&action(ActionKind::Tap, json!({"x": 0.333, "y": 0.0})));
        assert!(result.success);

        assert_eq!(
            device
                .calls()
                .into_iter()
                .filter(|c| c.starts_with("tap("))
                .collect::<Vec<_>>(),
            vec!["tap(540, 960)", "tap(1080, 1920)", "tap(359, 0)"]
        );
    }

    #[test]
    fn missing_params_fail_without_touching_the_device() {
        let device = ScriptedDevice::new();
        let exec = executor(&device);

        let result = exec.execute(&action(ActionKind::Tap, json!({"x": 0.5})));
        assert!(!result.success);
        assert_eq!(result.error_kind, ErrorKind::InvalidParams);

        let result = exec.execute(&action(ActionKind::TapText, json!({"text": ""})));
        assert_eq!(result.error_kind, ErrorKind::InvalidParams);

        assert_eq!(device.call_count("tap"), 0);
        assert_eq!(device.call_count("tap_by_text"), 0);
    }

    #[test]
    fn out_of_range_coordinates_are_invalid() {
        let device = ScriptedDevice::new();
        let exec = executor(&device);
        let result = exec.execute(&action(ActionKind::Tap, json!({"x": 1.5, "y": 0.5})));
        assert_eq!(result.error_kind, ErrorKind::InvalidParams);
        assert!(result.error_message.contains("normalized"));
    }

    #[test]
    fn device_errors_are_classified_not_raised() {
        let device = ScriptedDevice::new();
        device.fail_next("tap_by_text", "element with text \"Send\" not found");
        let exec = executor(&device);

        let result = exec.execute(&action(ActionKind::TapText, json!({"text": "Send"})));
        assert!(!result.success);
        assert_eq!(result.error_kind, ErrorKind::ElementNotFound);

        device.fail_next("tap", "adb input tap timed out after 30s");
        let result = exec.execute(&action(ActionKind::Tap, json!({"x": 0.5, "y": 0.5})));
        assert_eq!(result.error_kind, ErrorKind::Timeout);

        device.fail_next("tap", "adb input tap failed (exit 1)");
        let result = exec.execute(&action(ActionKind::Tap, json!({"x": 0.5, "y": 0.5})));
        assert_eq!(result.error_kind, ErrorKind::Transport);
    }

    #[test]
    fn lifecycle_actions_default_to_app_under_test() {
        let device = ScriptedDevice::new();
        let exec = executor(&device);

        assert!(exec.execute(&action(ActionKind::LaunchApp, json!({}))).success);
        assert!(
            exec.execute(&action(
                ActionKind::ForceStop,
                json!({"package": "com.other"})
            ))
            .success
        );
        let calls = device.calls();
        assert!(calls.contains(&"launch_app(com.example)".to_string()));
        assert!(calls.contains(&"force_stop(com.other)".to_string()));
    }

    #[test]
    fn tap_and_type_taps_then_types() {
        let device = ScriptedDevice::new();
        let exec = executor(&device);
        let result = exec.execute(&action(
            ActionKind::TapAndType,
            json!({"target_text": "Title", "input_text": "Groceries"}),
        ));
        assert!(result.success);
        let calls: Vec<String> = device
            .calls()
            .into_iter()
            .filter(|c| !c.starts_with("screen_size") && !c.starts_with("wait"))
            .collect();
        assert_eq!(calls, vec!["tap_by_text(\"Title\", false)", "type_text(Groceries)"]);
    }

    #[test]
    fn text_matching_defaults_to_exact() {
        let device = ScriptedDevice::new();
        let exec = executor(&device);

        let result = exec.execute(&action(ActionKind::TapText, json!({"text": "Send"})));
        assert!(result.success);
        assert!(device.calls().contains(&"tap_by_text(\"Send\", false)".to_string()));

        let result = exec.execute(&action(
            ActionKind::TapText,
            json!({"text": "Send", "partial": true}),
        ));
        assert!(result.success);
        assert!(device.calls().contains(&"tap_by_text(\"Send\", true)".to_string()));
    }

    #[test]
    fn batches_stop_at_the_first_failure() {
        let device = ScriptedDevice::new();
        device.fail_next("back", "adb shell input keyevent failed");
        let exec = executor(&device);

        let actions = vec![
            action(ActionKind::Home, json!({})),
            action(ActionKind::Back, json!({})),
            action(ActionKind::Tap, json!({"x": 0.5, "y": 0.5})),
        ];
        let results = exec.execute_all(&actions, None);

        assert_eq!(results.len(), 2);
        assert!(results[0].success);
        assert!(!results[1].success);
        // The action after the failure never reached the device.
        assert_eq!(device.call_count("tap"), 0);
    }

    #[test]
    fn batch_screenshot_failure_does_not_fail_the_step() {
        let temp = tempfile::tempdir().expect("tempdir");
        let device = ScriptedDevice::new();
        device.fail_next("take_screenshot", "screencap produced no output");
        let exec = executor(&device);

        let actions = vec![
            action(ActionKind::Home, json!({})),
            action(ActionKind::Back, json!({})),
        ];
        let results = exec.execute_all(&actions, Some(temp.path()));

        assert_eq!(results.len(), 2);
        assert!(results[0].success);
        assert!(results[0].screenshot_path.is_none());
        assert!(results[1].success);
        assert_eq!(
            results[1].screenshot_path,
            Some(temp.path().join("step_001.png"))
        );
    }

    #[test]
    fn screenshot_action_records_the_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let device = ScriptedDevice::new();
        let exec = executor(&device).with_shots_dir(temp.path());
        let result = exec.execute(&action(ActionKind::Screenshot, json!({"path": "extra.png"})));
        assert!(result.success);
        assert_eq!(result.screenshot_path, Some(temp.path().join("extra.png")));
    }
}
