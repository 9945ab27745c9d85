//! Run reporting: accumulates test results, writes `report.json`, and prints
//! the console summary.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::core::types::{TestResult, TestStatus};

/// Accumulated results for one suite run.
#[derive(Debug)]
pub struct RunReport {
    run_dir: PathBuf,
    app_package: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    results: Vec<TestResult>,
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    app_package: &'a str,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    passed: usize,
    failed: usize,
    errors: usize,
    unexpected: usize,
    results: &'a [TestResult],
}

impl RunReport {
    pub fn new(run_dir: impl Into<PathBuf>, app_package: impl Into<String>) -> Self {
        Self {
            run_dir: run_dir.into(),
            app_package: app_package.into(),
            started_at: Utc::now(),
            ended_at: None,
            results: Vec::new(),
        }
    }

    pub fn add_result(&mut self, result: TestResult) {
        self.results.push(result);
    }

    pub fn finalize(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    fn count(&self, status: TestStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn passed(&self) -> usize {
        self.count(TestStatus::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(TestStatus::Failed)
    }

    pub fn errors(&self) -> usize {
        self.count(TestStatus::Error)
    }

    /// Results whose outcome contradicts their `should_pass` expectation.
    pub fn unexpected_outcomes(&self) -> Vec<&TestResult> {
        self.results
            .iter()
            .filter(|r| !r.outcome_expected())
            .collect()
    }

    /// Write `report.json` into the run directory.
    pub fn save(&self) -> Result<PathBuf> {
        let document = ReportDocument {
            app_package: &self.app_package,
            started_at: self.started_at,
            ended_at: self.ended_at,
            passed: self.passed(),
            failed: self.failed(),
            errors: self.errors(),
            unexpected: self.unexpected_outcomes().len(),
            results: &self.results,
        };
        let mut json = serde_json::to_string_pretty(&document).context("serialize report")?;
        json.push('\n');
        let path = self.run_dir.join("report.json");
        fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
        info!(path = %path.display(), "report saved");
        Ok(path)
    }

    /// Print the human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!();
        println!("=== Run summary: {} ===", self.app_package);
        for result in &self.results {
            let status = match result.status {
                TestStatus::Passed => "PASSED",
                TestStatus::Failed => "FAILED",
                TestStatus::Error => "ERROR",
            };
            let expectation = if result.outcome_expected() {
                "as expected"
            } else {
                "UNEXPECTED"
            };
            println!(
                "  [{status}] {id}: {name} ({expectation}, {secs:.1}s, {steps} steps)",
                id = result.test.id,
                name = result.test.name,
                secs = result.duration.as_secs_f64(),
                steps = result.steps.len(),
            );
            if let Some(message) = &result.error_message {
                println!("      error: {message}");
            }
        }
        println!(
            "  {} passed, {} failed, {} errors ({} unexpected)",
            self.passed(),
            self.failed(),
            self.errors(),
            self.unexpected_outcomes().len(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TestCase;
    use std::time::Duration;

    fn result(id: &str, status: TestStatus, should_pass: bool) -> TestResult {
        TestResult {
            test: TestCase {
                id: id.to_string(),
                name: format!("test {id}"),
                goal: "do the thing".to_string(),
                expected_result: "thing is done".to_string(),
                should_pass,
            },
            status,
            verdict: None,
            steps: Vec::new(),
            screenshots: Vec::new(),
            duration: Duration::from_secs(3),
            error_message: None,
        }
    }

    #[test]
    fn counts_by_status() {
        let mut report = RunReport::new("/tmp/run", "com.example");
        report.add_result(result("a", TestStatus::Passed, true));
        report.add_result(result("b", TestStatus::Failed, true));
        report.add_result(result("c", TestStatus::Error, true));
        assert_eq!(report.passed(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.errors(), 1);
    }

    #[test]
    fn unexpected_outcomes_ignore_expected_failures() {
        let mut report = RunReport::new("/tmp/run", "com.example");
        report.add_result(result("a", TestStatus::Failed, false));
        report.add_result(result("b", TestStatus::Failed, true));
        let unexpected = report.unexpected_outcomes();
        assert_eq!(unexpected.len(), 1);
        assert_eq!(unexpected[0].test.id, "b");
    }

    #[test]
    fn saves_report_json() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut report = RunReport::new(temp.path(), "com.example");
        report.add_result(result("a", TestStatus::Passed, true));
        report.finalize();
        let path = report.save().expect("save");
        let contents = fs::read_to_string(path).expect("read report");
        let parsed: serde_json::Value = serde_json::from_str(&contents).expect("valid json");
        assert_eq!(parsed["passed"], 1);
        assert_eq!(parsed["app_package"], "com.example");
        assert!(parsed["ended_at"].is_string());
        assert!(contents.ends_with('\n'));
    }
}
