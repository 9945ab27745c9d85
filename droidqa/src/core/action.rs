//! The action vocabulary shared by planner, executor, and run loop.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kinds of actions the executor can perform on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    // UI interaction
    Tap,
    /// Finds an element by visible text and taps it. More reliable than raw coordinates.
    TapText,
    Swipe,
    TypeText,
    /// Tap an element by text, then type into it. For input fields.
    TapAndType,
    KeyEvent,

    // Navigation shortcuts
    Back,
    Home,

    // App lifecycle
    LaunchApp,
    ForceStop,
    ClearData,
    RelaunchApp,

    // Search/scroll
    ScrollUntilText,

    // Utility
    Wait,
    Screenshot,
}

impl ActionKind {
    /// Wire name as emitted to / parsed from the model (`snake_case`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Tap => "tap",
            ActionKind::TapText => "tap_text",
            ActionKind::Swipe => "swipe",
            ActionKind::TypeText => "type_text",
            ActionKind::TapAndType => "tap_and_type",
            ActionKind::KeyEvent => "key_event",
            ActionKind::Back => "back",
            ActionKind::Home => "home",
            ActionKind::LaunchApp => "launch_app",
            ActionKind::ForceStop => "force_stop",
            ActionKind::ClearData => "clear_data",
            ActionKind::RelaunchApp => "relaunch_app",
            ActionKind::ScrollUntilText => "scroll_until_text",
            ActionKind::Wait => "wait",
            ActionKind::Screenshot => "screenshot",
        }
    }
}

/// A single planned action: a kind, kind-specific parameters, and a
/// human-readable description.
///
/// Parameter shapes by kind (normalized 0-1 coordinates):
/// - `tap`: `{"x": f64, "y": f64}`
/// - `swipe`: `{"x1", "y1", "x2", "y2": f64, "duration_ms": u64}`
/// - `type_text`: `{"text": string}`
/// - `tap_text`: `{"text": string, "partial": bool?}`
/// - `tap_and_type`: `{"target_text": string, "input_text": string, "partial": bool?}`
/// - `key_event`: `{"key_code": i64}`
/// - `launch_app` / `force_stop` / `clear_data` / `relaunch_app`: `{"package": string}`
/// - `scroll_until_text`: `{"text": string, "direction": string?, "max_swipes": u32?, "partial": bool?}`
/// - `wait`: `{"seconds": f64}`
/// - `screenshot`: `{"path": string?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "action_type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub description: String,
}

impl Action {
    pub fn new(kind: ActionKind, params: Map<String, Value>, description: impl Into<String>) -> Self {
        Self {
            kind,
            params,
            description: description.into(),
        }
    }

    /// Stable identity for repeat-blocking: kind plus the serialized params.
    pub fn signature(&self) -> String {
        format!(
            "{}:{}",
            self.kind.as_str(),
            Value::Object(self.params.clone())
        )
    }
}
