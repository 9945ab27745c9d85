//! Device abstraction for UI actions and UI-state queries.
//!
//! The [`Device`] trait decouples the agent loop from the actual transport
//! (currently ADB over subprocess). Tests use scripted devices that return
//! predetermined outcomes without touching hardware.

use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// A failed device transport call: the single error kind every device
/// operation surfaces, carrying the raw diagnostics for classification.
#[derive(Debug, Clone)]
pub struct DeviceError {
    message: String,
    exit_code: Option<i32>,
    detail: Option<String>,
}

impl DeviceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit_code: None,
            detail: None,
        }
    }

    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(code) = self.exit_code {
            write!(f, " (exit {code})")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

impl std::error::Error for DeviceError {}

/// Scroll direction for [`Device::scroll_until_text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrollDirection {
    #[default]
    Down,
    Up,
}

impl ScrollDirection {
    /// Parse the planner's wire value; anything unrecognized scrolls down.
    pub fn parse(value: &str) -> Self {
        match value {
            "up" => ScrollDirection::Up,
            _ => ScrollDirection::Down,
        }
    }
}

/// Primitive UI actions and state queries exposed to the agent loop.
///
/// Every method blocks until the transport call completes (bounded by the
/// transport's own timeout) and fails with a single [`DeviceError`] kind.
/// Coordinates are device pixels; normalized-coordinate conversion is the
/// executor's responsibility.
pub trait Device {
    fn tap(&self, x: i64, y: i64) -> DeviceResult<()>;
    fn swipe(&self, x1: i64, y1: i64, x2: i64, y2: i64, duration_ms: u64) -> DeviceResult<()>;
    fn type_text(&self, text: &str) -> DeviceResult<()>;
    fn key_event(&self, key_code: i64) -> DeviceResult<()>;
    fn back(&self) -> DeviceResult<()>;
    fn home(&self) -> DeviceResult<()>;

    fn launch_app(&self, package: &str) -> DeviceResult<()>;
    fn force_stop(&self, package: &str) -> DeviceResult<()>;
    fn clear_app_data(&self, package: &str) -> DeviceResult<()>;
    fn relaunch_app(&self, package: &str) -> DeviceResult<()>;

    fn take_screenshot(&self, path: &Path) -> DeviceResult<()>;
    /// Screen resolution in pixels as `(width, height)`.
    fn screen_size(&self) -> DeviceResult<(u32, u32)>;
    /// Visible text labels from the live UI tree, deduplicated with
    /// insertion order preserved.
    fn dump_ui_texts(&self) -> DeviceResult<Vec<String>>;
    /// Current foreground activity identifier.
    fn current_activity(&self) -> DeviceResult<String>;

    /// Find an element by visible text and tap its center. Returns the
    /// tapped pixel location.
    fn tap_by_text(&self, text: &str, partial: bool) -> DeviceResult<(i64, i64)>;
    /// Scroll in `direction` until `text` is visible, up to `max_attempts`
    /// gestures.
    fn scroll_until_text(
        &self,
        text: &str,
        direction: ScrollDirection,
        max_attempts: u32,
        partial: bool,
    ) -> DeviceResult<()>;

    /// Sleep for the given duration. Routed through the trait so scripted
    /// test devices can skip it.
    fn wait(&self, duration: Duration) -> DeviceResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_code_and_detail() {
        let err = DeviceError::new("adb command failed")
            .with_exit_code(Some(1))
            .with_detail("error: device offline");
        assert_eq!(
            err.to_string(),
            "adb command failed (exit 1): error: device offline"
        );
    }

    #[test]
    fn error_display_without_extras() {
        let err = DeviceError::new("no such device");
        assert_eq!(err.to_string(), "no such device");
    }

    #[test]
    fn scroll_direction_parses_defensively() {
        assert_eq!(ScrollDirection::parse("up"), ScrollDirection::Up);
        assert_eq!(ScrollDirection::parse("down"), ScrollDirection::Down);
        assert_eq!(ScrollDirection::parse("sideways"), ScrollDirection::Down);
    }
}
