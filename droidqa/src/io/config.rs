//! Runner configuration (TOML).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Knobs for the agent loop and device pacing.
///
/// This file is intended to be edited by humans. Missing fields default to
/// values tuned for a mid-range emulator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Hard ceiling on planner/executor iterations per test.
    pub max_iterations: u32,

    /// Consecutive failures of the same step before escalating recovery.
    pub max_retries_per_step: u32,

    /// Scroll gestures allowed while recovering from a missing element.
    pub max_scrolls_per_step: u32,

    /// Run an interim completion probe every this many iterations.
    pub probe_interval: u32,

    /// Minimum probe confidence required to end a test early.
    pub probe_confidence: f64,

    /// Planner history entries included in each prompt.
    pub history_window: usize,

    /// Pause after a recovery gesture before re-observing, in milliseconds.
    pub settle_delay_ms: u64,

    /// Pause between loop iterations after an executed action, in
    /// milliseconds.
    pub step_delay_ms: u64,

    /// Pause between app force-stop and launch during setup, in milliseconds.
    pub post_stop_wait_ms: u64,

    /// Pause after launching the app before the first observation, in
    /// milliseconds.
    pub launch_wait_ms: u64,

    /// Per-command device transport timeout in seconds.
    pub device_timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            max_retries_per_step: 5,
            max_scrolls_per_step: 3,
            probe_interval: 3,
            probe_confidence: 0.8,
            history_window: 5,
            settle_delay_ms: 500,
            step_delay_ms: 1000,
            post_stop_wait_ms: 1000,
            launch_wait_ms: 2000,
            device_timeout_secs: 30,
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.max_retries_per_step == 0 {
            return Err(anyhow!("max_retries_per_step must be > 0"));
        }
        if self.probe_interval == 0 {
            return Err(anyhow!("probe_interval must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.probe_confidence) {
            return Err(anyhow!("probe_confidence must be between 0 and 1"));
        }
        if self.device_timeout_secs == 0 {
            return Err(anyhow!("device_timeout_secs must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunnerConfig::default()`.
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    if !path.exists() {
        let cfg = RunnerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunnerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, RunnerConfig::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_iterations = 5\n").expect("write config");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_iterations, 5);
        assert_eq!(cfg.probe_interval, RunnerConfig::default().probe_interval);
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "probe_confidence = 1.5\n").expect("write config");
        let err = load_config(&path).expect_err("invalid confidence");
        assert!(format!("{err:#}").contains("probe_confidence"));
    }

    #[test]
    fn rejects_zero_iterations() {
        let cfg = RunnerConfig {
            max_iterations: 0,
            ..RunnerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
