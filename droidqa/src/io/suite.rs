//! Test suite file loading.
//!
//! Suites are YAML documents naming the app under test and the list of test
//! cases to run against it.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::info;

use crate::core::types::TestCase;

/// On-disk suite document.
#[derive(Debug, Deserialize)]
pub struct Suite {
    /// Package name of the app under test.
    pub app_package: String,
    pub tests: Vec<TestCase>,
}

impl Suite {
    fn validate(&self) -> Result<()> {
        if self.app_package.trim().is_empty() {
            bail!("suite app_package must not be empty");
        }
        if self.tests.is_empty() {
            bail!("suite contains no tests");
        }
        for test in &self.tests {
            if test.id.trim().is_empty() {
                bail!("test {:?} has an empty id", test.name);
            }
            if test.goal.trim().is_empty() {
                bail!("test {:?} has an empty description", test.id);
            }
            if test.expected_result.trim().is_empty() {
                bail!("test {:?} has an empty expected_result", test.id);
            }
        }
        let mut ids: Vec<&str> = self.tests.iter().map(|t| t.id.as_str()).collect();
        ids.sort_unstable();
        if let Some(dup) = ids.windows(2).find(|w| w[0] == w[1]) {
            bail!("duplicate test id {:?}", dup[0]);
        }
        Ok(())
    }
}

/// Load and validate a suite from `path`.
pub fn load_suite(path: &Path) -> Result<Suite> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read suite file {}", path.display()))?;
    let suite: Suite = serde_yaml::from_str(&contents)
        .with_context(|| format!("parse suite file {}", path.display()))?;
    suite
        .validate()
        .with_context(|| format!("invalid suite file {}", path.display()))?;
    info!(
        app_package = %suite.app_package,
        tests = suite.tests.len(),
        "suite loaded"
    );
    Ok(suite)
}
