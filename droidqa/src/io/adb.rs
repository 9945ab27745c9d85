//! ADB-backed [`Device`] implementation.
//!
//! Every operation shells out to the `adb` binary with a hard timeout and
//! bounded output capture. Parse helpers for device output are kept pure so
//! they can be unit tested without a device attached.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::io::device::{Device, DeviceError, DeviceResult, ScrollDirection};
use crate::io::process::run_command_with_timeout;

/// Output cap for text-producing commands (UI dumps, dumpsys).
const TEXT_OUTPUT_LIMIT: usize = 4 * 1024 * 1024;
/// Output cap for screenshots, which arrive as raw PNG bytes on stdout.
const SCREENSHOT_OUTPUT_LIMIT: usize = 32 * 1024 * 1024;

const KEYCODE_BACK: i64 = 4;
const KEYCODE_HOME: i64 = 3;

static WM_SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(?:Override|Physical) size:\s*(\d+)x(\d+)").unwrap());
static NODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<node[^>]*>").unwrap());
static TEXT_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"text="([^"]*)""#).unwrap());
static BOUNDS_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"bounds="\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]""#).unwrap());
static RESUMED_ACTIVITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:mResumedActivity|ResumedActivity)[^\n]*?(\S+/\S+)").unwrap());

/// Talks to a single Android device through the `adb` CLI.
pub struct AdbDevice {
    adb_path: String,
    serial: Option<String>,
    timeout: Duration,
}

impl AdbDevice {
    pub fn new(serial: Option<String>, timeout: Duration) -> Self {
        Self {
            adb_path: "adb".to_owned(),
            serial,
            timeout,
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.adb_path);
        if let Some(serial) = &self.serial {
            cmd.args(["-s", serial]);
        }
        cmd.args(args);
        cmd
    }

    /// Run an adb invocation and return its stdout text, failing on non-zero
    /// exit or timeout.
    #[instrument(skip(self), fields(serial = self.serial.as_deref()))]
    fn run(&self, args: &[&str], output_limit: usize) -> DeviceResult<Vec<u8>> {
        let cmd = self.command(args);
        let output = run_command_with_timeout(cmd, self.timeout, output_limit)
            .map_err(|e| DeviceError::new(format!("adb {}: {e:#}", args.join(" "))))?;

        if output.timed_out {
            return Err(DeviceError::new(format!(
                "adb {} timed out after {}s",
                args.join(" "),
                self.timeout.as_secs()
            )));
        }
        if !output.status.success() {
            return Err(DeviceError::new(format!("adb {} failed", args.join(" ")))
                .with_exit_code(output.status.code())
                .with_detail(output.stderr_text().trim().to_owned()));
        }
        Ok(output.stdout)
    }

    fn shell(&self, shell_args: &[&str]) -> DeviceResult<String> {
        let mut args = vec!["shell"];
        args.extend_from_slice(shell_args);
        let stdout = self.run(&args, TEXT_OUTPUT_LIMIT)?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    /// Whether `package` is installed on the device.
    pub fn is_package_installed(&self, package: &str) -> DeviceResult<bool> {
        let listing = self.shell(&["pm", "list", "packages", package])?;
        Ok(listing
            .lines()
            .any(|line| line.trim() == format!("package:{package}")))
    }

    fn dump_ui_xml(&self) -> DeviceResult<String> {
        self.shell(&["uiautomator", "dump", "/sdcard/window_dump.xml"])?;
        self.shell(&["cat", "/sdcard/window_dump.xml"])
    }

    fn scroll_gesture(&self, direction: ScrollDirection) -> DeviceResult<()> {
        let (width, height) = self.screen_size()?;
        let x = i64::from(width) / 2;
        let (y1, y2) = match direction {
            ScrollDirection::Down => (i64::from(height) * 3 / 4, i64::from(height) / 4),
            ScrollDirection::Up => (i64::from(height) / 4, i64::from(height) * 3 / 4),
        };
        self.swipe(x, y1, x, y2, 300)
    }
}

impl Device for AdbDevice {
    fn tap(&self, x: i64, y: i64) -> DeviceResult<()> {
        self.shell(&["input", "tap", &x.to_string(), &y.to_string()])?;
        Ok(())
    }

    fn swipe(&self, x1: i64, y1: i64, x2: i64, y2: i64, duration_ms: u64) -> DeviceResult<()> {
        self.shell(&[
            "input",
            "swipe",
            &x1.to_string(),
            &y1.to_string(),
            &x2.to_string(),
            &y2.to_string(),
            &duration_ms.to_string(),
        ])?;
        Ok(())
    }

    fn type_text(&self, text: &str) -> DeviceResult<()> {
        let encoded = encode_input_text(text);
        self.shell(&["input", "text", &encoded])?;
        Ok(())
    }

    fn key_event(&self, key_code: i64) -> DeviceResult<()> {
        self.shell(&["input", "keyevent", &key_code.to_string()])?;
        Ok(())
    }

    fn back(&self) -> DeviceResult<()> {
        self.key_event(KEYCODE_BACK)
    }

    fn home(&self) -> DeviceResult<()> {
        self.key_event(KEYCODE_HOME)
    }

    fn launch_app(&self, package: &str) -> DeviceResult<()> {
        // monkey resolves the launcher activity without needing its name.
        self.shell(&[
            "monkey",
            "-p",
            package,
            "-c",
            "android.intent.category.LAUNCHER",
            "1",
        ])?;
        Ok(())
    }

    fn force_stop(&self, package: &str) -> DeviceResult<()> {
        self.shell(&["am", "force-stop", package])?;
        Ok(())
    }

    fn clear_app_data(&self, package: &str) -> DeviceResult<()> {
        self.shell(&["pm", "clear", package])?;
        Ok(())
    }

    fn relaunch_app(&self, package: &str) -> DeviceResult<()> {
        self.force_stop(package)?;
        self.wait(Duration::from_millis(500))?;
        self.launch_app(package)
    }

    fn take_screenshot(&self, path: &Path) -> DeviceResult<()> {
        let png = self.run(&["exec-out", "screencap", "-p"], SCREENSHOT_OUTPUT_LIMIT)?;
        if png.is_empty() {
            return Err(DeviceError::new("screencap produced no output"));
        }
        fs::write(path, &png).map_err(|e| {
            DeviceError::new(format!("write screenshot {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), bytes = png.len(), "screenshot saved");
        Ok(())
    }

    fn screen_size(&self) -> DeviceResult<(u32, u32)> {
        let output = self.shell(&["wm", "size"])?;
        parse_wm_size(&output)
            .ok_or_else(|| DeviceError::new(format!("unparseable wm size output: {output:?}")))
    }

    fn dump_ui_texts(&self) -> DeviceResult<Vec<String>> {
        let xml = self.dump_ui_xml()?;
        Ok(extract_ui_texts(&xml))
    }

    fn current_activity(&self) -> DeviceResult<String> {
        let output = self.shell(&["dumpsys", "activity", "activities"])?;
        Ok(parse_resumed_activity(&output).unwrap_or_default())
    }

    fn tap_by_text(&self, text: &str, partial: bool) -> DeviceResult<(i64, i64)> {
        let xml = self.dump_ui_xml()?;
        let (x1, y1, x2, y2) = find_text_bounds(&xml, text, partial)
            .ok_or_else(|| DeviceError::new(format!("element with text {text:?} not found")))?;
        let (cx, cy) = ((x1 + x2) / 2, (y1 + y2) / 2);
        self.tap(cx, cy)?;
        Ok((cx, cy))
    }

    fn scroll_until_text(
        &self,
        text: &str,
        direction: ScrollDirection,
        max_attempts: u32,
        partial: bool,
    ) -> DeviceResult<()> {
        for attempt in 0..max_attempts {
            let xml = self.dump_ui_xml()?;
            if find_text_bounds(&xml, text, partial).is_some() {
                return Ok(());
            }
            debug!(attempt, text, "text not visible, scrolling");
            self.scroll_gesture(direction)?;
            self.wait(Duration::from_millis(500))?;
        }
        let xml = self.dump_ui_xml()?;
        if find_text_bounds(&xml, text, partial).is_some() {
            return Ok(());
        }
        warn!(text, max_attempts, "scroll target never appeared");
        Err(DeviceError::new(format!(
            "text {text:?} not found after {max_attempts} scrolls"
        )))
    }

    fn wait(&self, duration: Duration) -> DeviceResult<()> {
        std::thread::sleep(duration);
        Ok(())
    }
}

/// Encode text for `input text`: spaces become `%s` and shell metacharacters
/// are backslash-escaped so the device shell passes them through verbatim.
fn encode_input_text(text: &str) -> String {
    let mut encoded = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            ' ' => encoded.push_str("%s"),
            '\\' | '"' | '\'' | '`' | '$' | '&' | '|' | ';' | '(' | ')' | '<' | '>' | '*'
            | '~' | '#' => {
                encoded.push('\\');
                encoded.push(ch);
            }
            _ => encoded.push(ch),
        }
    }
    encoded
}

fn parse_wm_size(output: &str) -> Option<(u32, u32)> {
    // Prefer the override size when present, matching what the user sees.
    let mut physical = None;
    for caps in WM_SIZE_RE.captures_iter(output) {
        let size = (caps[1].parse().ok()?, caps[2].parse().ok()?);
        if caps[0].starts_with("Override") {
            return Some(size);
        }
        physical = Some(size);
    }
    physical
}

fn unescape_xml(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

/// Pull visible text labels out of a uiautomator dump, deduplicated with
/// first-seen order preserved.
fn extract_ui_texts(xml: &str) -> Vec<String> {
    let mut texts = Vec::new();
    for caps in TEXT_ATTR_RE.captures_iter(xml) {
        let text = unescape_xml(&caps[1]);
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        if !texts.iter().any(|t| t == text) {
            texts.push(text.to_owned());
        }
    }
    texts
}

/// Locate the first node whose text matches and return its bounds.
fn find_text_bounds(xml: &str, target: &str, partial: bool) -> Option<(i64, i64, i64, i64)> {
    for node in NODE_RE.find_iter(xml) {
        let node = node.as_str();
        let Some(text_caps) = TEXT_ATTR_RE.captures(node) else {
            continue;
        };
        let text = unescape_xml(&text_caps[1]);
        let matched = if partial {
            text.to_lowercase().contains(&target.to_lowercase())
        } else {
            text == target
        };
        if !matched {
            continue;
        }
        if let Some(b) = BOUNDS_ATTR_RE.captures(node) {
            return Some((
                b[1].parse().ok()?,
                b[2].parse().ok()?,
                b[3].parse().ok()?,
                b[4].parse().ok()?,
            ));
        }
    }
    None
}

fn parse_resumed_activity(output: &str) -> Option<String> {
    let caps = RESUMED_ACTIVITY_RE.captures(output)?;
    Some(caps[1].trim_end_matches('}').to_owned())
}
