//! Scripted doubles for the device and model seams, used by unit tests and
//! available to downstream crates through the `test-support` feature.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::io::device::{Device, DeviceError, DeviceResult, ScrollDirection};
use crate::io::model::{ModelClient, ModelError, ModelResult};

/// A [`Device`] whose behavior is programmed per method.
///
/// Every call is appended to a log for assertions. Failures are queued per
/// method name and consumed in order; once a method's queue is empty it
/// succeeds again. `wait` never sleeps.
pub struct ScriptedDevice {
    screen: (u32, u32),
    ui_texts: RefCell<Vec<String>>,
    activity: RefCell<String>,
    calls: RefCell<Vec<String>>,
    failures: RefCell<HashMap<&'static str, VecDeque<DeviceError>>>,
}

impl Default for ScriptedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedDevice {
    pub fn new() -> Self {
        Self {
            screen: (1080, 1920),
            ui_texts: RefCell::new(Vec::new()),
            activity: RefCell::new("com.example/.MainActivity".to_string()),
            calls: RefCell::new(Vec::new()),
            failures: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_screen(mut self, width: u32, height: u32) -> Self {
        self.screen = (width, height);
        self
    }

    pub fn set_ui_texts(&self, texts: Vec<String>) {
        *self.ui_texts.borrow_mut() = texts;
    }

    pub fn set_activity(&self, activity: impl Into<String>) {
        *self.activity.borrow_mut() = activity.into();
    }

    /// Queue a failure for the next call to `method` (the trait method name).
    pub fn fail_next(&self, method: &'static str, message: impl Into<String>) {
        self.failures
            .borrow_mut()
            .entry(method)
            .or_default()
            .push_back(DeviceError::new(message.into()));
    }

    /// Queue `count` consecutive failures for `method`.
    pub fn fail_times(&self, method: &'static str, count: usize, message: &str) {
        for _ in 0..count {
            self.fail_next(method, message);
        }
    }

    /// The full call log, one `method(args)` entry per call.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Number of logged calls whose method name matches.
    pub fn call_count(&self, method: &str) -> usize {
        let prefix = format!("{method}(");
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }

    fn record(&self, method: &'static str, args: String) -> DeviceResult<()> {
        self.calls.borrow_mut().push(format!("{method}({args})"));
        if let Some(queue) = self.failures.borrow_mut().get_mut(method) {
            if let Some(err) = queue.pop_front() {
                return Err(err);
            }
        }
        Ok(())
    }
}

impl Device for ScriptedDevice {
    fn tap(&self, x: i64, y: i64) -> DeviceResult<()> {
        self.record("tap", format!("{x}, {y}"))
    }

    fn swipe(&self, x1: i64, y1: i64, x2: i64, y2: i64, duration_ms: u64) -> DeviceResult<()> {
        self.record("swipe", format!("{x1}, {y1}, {x2}, {y2}, {duration_ms}"))
    }

    fn type_text(&self, text: &str) -> DeviceResult<()> {
        self.record("type_text", text.to_string())
    }

    fn key_event(&self, key_code: i64) -> DeviceResult<()> {
        self.record("key_event", key_code.to_string())
    }

    fn back(&self) -> DeviceResult<()> {
        self.record("back", String::new())
    }

    fn home(&self) -> DeviceResult<()> {
        self.record("home", String::new())
    }

    fn launch_app(&self, package: &str) -> DeviceResult<()> {
        self.record("launch_app", package.to_string())
    }

    fn force_stop(&self, package: &str) -> DeviceResult<()> {
        self.record("force_stop", package.to_string())
    }

    fn clear_app_data(&self, package: &str) -> DeviceResult<()> {
        self.record("clear_app_data", package.to_string())
    }

    fn relaunch_app(&self, package: &str) -> DeviceResult<()> {
        self.record("relaunch_app", package.to_string())
    }

    fn take_screenshot(&self, path: &Path) -> DeviceResult<()> {
        self.record("take_screenshot", path.display().to_string())?;
        fs::write(path, b"png")
            .map_err(|e| DeviceError::new(format!("write {}: {e}", path.display())))
    }

    fn screen_size(&self) -> DeviceResult<(u32, u32)> {
        self.record("screen_size", String::new())?;
        Ok(self.screen)
    }

    fn dump_ui_texts(&self) -> DeviceResult<Vec<String>> {
        self.record("dump_ui_texts", String::new())?;
        Ok(self.ui_texts.borrow().clone())
    }

    fn current_activity(&self) -> DeviceResult<String> {
        self.record("current_activity", String::new())?;
        Ok(self.activity.borrow().clone())
    }

    fn tap_by_text(&self, text: &str, partial: bool) -> DeviceResult<(i64, i64)> {
        self.record("tap_by_text", format!("{text:?}, {partial}"))?;
        Ok((50, 50))
    }

    fn scroll_until_text(
        &self,
        text: &str,
        direction: ScrollDirection,
        max_attempts: u32,
        partial: bool,
    ) -> DeviceResult<()> {
        self.record(
            "scroll_until_text",
            format!("{text:?}, {direction:?}, {max_attempts}, {partial}"),
        )
    }

    fn wait(&self, duration: Duration) -> DeviceResult<()> {
        self.record("wait", format!("{}ms", duration.as_millis()))
    }
}

/// A [`ModelClient`] that replays a fixed sequence of replies.
pub struct ScriptedModel {
    replies: RefCell<VecDeque<ModelResult<String>>>,
    prompts: RefCell<Vec<String>>,
    temperatures: RefCell<Vec<f32>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ModelResult<String>>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            prompts: RefCell::new(Vec::new()),
            temperatures: RefCell::new(Vec::new()),
        }
    }

    /// Convenience for scripting only successful replies.
    pub fn with_replies(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok((*r).to_string())).collect())
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }

    pub fn temperatures(&self) -> Vec<f32> {
        self.temperatures.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.borrow().len()
    }
}

impl ModelClient for ScriptedModel {
    fn generate(&self, prompt: &str, _images: &[&Path], temperature: f32) -> ModelResult<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.temperatures.borrow_mut().push(temperature);
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::new("scripted model has no more replies")))
    }
}
