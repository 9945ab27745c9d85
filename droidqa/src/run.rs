//! The closed agent loop: observe, plan, execute, recover, verify.
//!
//! One [`Runner`] drives a whole suite against a single app. Each test is a
//! bounded loop over planner iterations with an escalation ladder for
//! repeated failures and an interim completion probe every few iterations.
//! A test always yields exactly one [`TestResult`]; internal failures become
//! an `Error` status, never a panic or an early return from the suite.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::agents::executor::Executor;
use crate::agents::{planner, supervisor};
use crate::core::recovery::{RecoveryLimits, RecoveryState, RecoveryStep};
use crate::core::types::{Observation, TestCase, TestResult, TestStatus};
use crate::io::config::RunnerConfig;
use crate::io::device::Device;
use crate::io::model::ModelClient;
use crate::io::report::RunReport;
use crate::prompt::describe_action;

pub struct Runner<'a, D: Device, M: ModelClient> {
    device: &'a D,
    model: &'a M,
    config: RunnerConfig,
    run_dir: PathBuf,
    package: String,
    /// Clear app data before the first test of the run.
    fresh: bool,
}

/// Everything accumulated while a single test runs.
struct TestRun {
    dir: PathBuf,
    steps: Vec<crate::core::types::StepResult>,
    screenshots: Vec<PathBuf>,
    history: Vec<String>,
    attempted: Vec<String>,
    step_context: String,
    current_screenshot: PathBuf,
}

impl<'a, D: Device, M: ModelClient> Runner<'a, D, M> {
    pub fn new(
        device: &'a D,
        model: &'a M,
        config: RunnerConfig,
        run_dir: impl Into<PathBuf>,
        package: impl Into<String>,
        fresh: bool,
    ) -> Self {
        Self {
            device,
            model,
            config,
            run_dir: run_dir.into(),
            package: package.into(),
            fresh,
        }
    }

    /// Run every test in order. A failing or erroring test never stops the
    /// suite. Writes `report.json` and prints the summary before returning.
    pub fn run_suite(&self, tests: &[TestCase]) -> Result<RunReport> {
        fs::create_dir_all(&self.run_dir)
            .with_context(|| format!("create run dir {}", self.run_dir.display()))?;
        let mut report = RunReport::new(&self.run_dir, &self.package);

        for (index, test) in tests.iter().enumerate() {
            let fresh_start = self.fresh && index == 0;
            info!(test_id = %test.id, fresh_start, "starting test");
            let result = self.run_test(test, fresh_start);
            info!(test_id = %test.id, status = ?result.status, "test finished");
            report.add_result(result);
        }

        report.finalize();
        report.save()?;
        report.print_summary();
        Ok(report)
    }

    /// Run one test to completion. Infallible by contract: setup, transport,
    /// and model failures all fold into an `Error` result.
    #[instrument(skip_all, fields(test_id = %test.id))]
    pub fn run_test(&self, test: &TestCase, fresh_start: bool) -> TestResult {
        let started = Instant::now();

        let mut run = match self.setup(test, fresh_start) {
            Ok(run) => run,
            Err(message) => {
                warn!(message = %message, "test setup failed");
                return self.error_result(test, started, message);
            }
        };

        let executor = match Executor::new(self.device, &self.package) {
            Ok(executor) => executor.with_shots_dir(&run.dir),
            Err(e) => return self.error_result(test, started, format!("query screen size: {e}")),
        };

        self.action_loop(test, &mut run, &executor);
        self.final_verdict(test, started, run)
    }

    /// Force-stop, optionally clear data, launch, and take the initial
    /// screenshot.
    fn setup(&self, test: &TestCase, fresh_start: bool) -> Result<TestRun, String> {
        let dir = self.run_dir.join(&test.id);
        fs::create_dir_all(&dir).map_err(|e| format!("create {}: {e}", dir.display()))?;

        self.device
            .force_stop(&self.package)
            .map_err(|e| format!("force-stop {}: {e}", self.package))?;
        if fresh_start {
            self.device
                .clear_app_data(&self.package)
                .map_err(|e| format!("clear app data: {e}"))?;
        }
        let _ = self
            .device
            .wait(Duration::from_millis(self.config.post_stop_wait_ms));
        self.device
            .launch_app(&self.package)
            .map_err(|e| format!("launch {}: {e}", self.package))?;
        let _ = self
            .device
            .wait(Duration::from_millis(self.config.launch_wait_ms));

        let initial = dir.join("000_initial.png");
        self.device
            .take_screenshot(&initial)
            .map_err(|e| format!("initial screenshot: {e}"))?;

        Ok(TestRun {
            dir,
            steps: Vec::new(),
            screenshots: vec![initial.clone()],
            history: Vec::new(),
            attempted: Vec::new(),
            step_context: String::new(),
            current_screenshot: initial,
        })
    }

    fn action_loop(&self, test: &TestCase, run: &mut TestRun, executor: &Executor<'_, D>) {
        let limits = RecoveryLimits {
            max_retries: self.config.max_retries_per_step,
            max_scrolls: self.config.max_scrolls_per_step,
        };
        let mut recovery = RecoveryState::new();
        let mut previous: Option<crate::core::types::StepResult> = None;

        for iteration in 1..=self.config.max_iterations {
            // Periodic probe: stop early once the goal is visibly reached.
            if iteration % self.config.probe_interval == 0
                && self.probe_says_done(test, run)
            {
                info!(iteration, "interim probe confirmed completion");
                break;
            }

            let observation = self.observe(run, previous.clone());
            let window = run
                .history
                .len()
                .saturating_sub(self.config.history_window);
            let response = match planner::plan(
                self.model,
                &test.goal,
                &test.expected_result,
                &run.step_context,
                &observation,
                &run.history[window..],
            ) {
                Ok(response) => response,
                Err(e) => {
                    // An unusable plan ends the loop; the verdict still
                    // comes from the final screen.
                    warn!(iteration, error = %e, "planning failed");
                    run.history.push(format!("planning failed: {e}"));
                    break;
                }
            };

            if response.is_complete {
                info!(iteration, "planner declared the goal reached");
                break;
            }
            let Some(action) = response.actions.first() else {
                info!(iteration, "planner returned no action");
                break;
            };

            debug!(iteration, kind = action.kind.as_str(), "executing action");
            let mut step = executor.execute(action);

            run.history.push(format!(
                "{desc} -> {outcome}",
                desc = describe_action(action),
                outcome = if step.success {
                    "ok".to_string()
                } else {
                    format!("failed ({})", step.error_message)
                }
            ));

            let mut abort = false;
            if step.success {
                recovery.on_success();
                run.attempted.clear();
                run.step_context.clear();
            } else {
                run.attempted.push(action.signature());
                let next = recovery.on_failure(step.error_kind, &limits);
                debug!(iteration, ?next, "step failed, recovering");
                abort = self.recover(run, executor, next);
            }

            // The step screenshot comes after any recovery gesture so the
            // next plan sees the post-recovery screen.
            self.capture_step_screenshot(run, iteration, &mut step);

            if abort {
                run.steps.push(step);
                break;
            }

            let _ = self
                .device
                .wait(Duration::from_millis(self.config.step_delay_ms));
            previous = Some(step.clone());
            run.steps.push(step);
        }
    }

    /// Perform the chosen recovery move. Returns true when the loop must
    /// abort. Recovery gestures are best-effort.
    fn recover(&self, run: &mut TestRun, executor: &Executor<'_, D>, step: RecoveryStep) -> bool {
        match step {
            RecoveryStep::Retry => {}
            RecoveryStep::Scroll => {
                let (width, height) = executor.screen();
                let x = i64::from(width) / 2;
                let (y1, y2) = (i64::from(height) * 3 / 4, i64::from(height) / 4);
                if let Err(e) = self.device.swipe(x, y1, x, y2, 300) {
                    warn!(error = %e, "recovery scroll failed");
                }
                let _ = self
                    .device
                    .wait(Duration::from_millis(self.config.settle_delay_ms));
                run.step_context =
                    "The screen was scrolled down to reveal more content.".to_string();
            }
            RecoveryStep::Back => {
                if let Err(e) = self.device.back() {
                    warn!(error = %e, "recovery back failed");
                }
                let _ = self
                    .device
                    .wait(Duration::from_millis(self.config.settle_delay_ms));
                run.step_context =
                    "Back was pressed to leave a possibly wrong screen.".to_string();
            }
            RecoveryStep::Relaunch => {
                if let Err(e) = self.device.relaunch_app(&self.package) {
                    warn!(error = %e, "recovery relaunch failed");
                }
                let _ = self
                    .device
                    .wait(Duration::from_millis(self.config.launch_wait_ms));
                run.step_context =
                    "The app was relaunched after repeated failures; navigation starts over."
                        .to_string();
            }
            RecoveryStep::Abort => {
                warn!("recovery options exhausted, aborting action loop");
                return true;
            }
        }
        false
    }

    /// Interim completion probe. Model or transport trouble never ends the
    /// test here; an unreadable probe just means the loop continues.
    fn probe_says_done(&self, test: &TestCase, run: &TestRun) -> bool {
        let ui_texts = self.device.dump_ui_texts().unwrap_or_default();
        match supervisor::verify_step(
            self.model,
            &test.expected_result,
            &run.current_screenshot,
            &ui_texts,
            None,
            "This is an interim check; the test may still be in progress.",
        ) {
            Ok(verdict) => {
                verdict.status == TestStatus::Passed
                    && verdict.confidence > self.config.probe_confidence
            }
            Err(e) => {
                warn!(error = %e, "interim probe failed, continuing");
                false
            }
        }
    }

    /// Build the planner's view of the world. UI-state queries degrade
    /// gracefully; the screenshot is always present.
    fn observe(
        &self,
        run: &TestRun,
        previous: Option<crate::core::types::StepResult>,
    ) -> Observation {
        let ui_texts = self.device.dump_ui_texts().unwrap_or_else(|e| {
            warn!(error = %e, "ui text dump failed, planning from pixels only");
            Vec::new()
        });
        let activity = self.device.current_activity().unwrap_or_else(|e| {
            warn!(error = %e, "activity query failed");
            String::new()
        });
        Observation {
            screenshot_path: run.current_screenshot.clone(),
            ui_texts,
            activity,
            previous_action: previous.as_ref().map(|r| r.action.clone()),
            previous_result: previous,
            attempted_actions: run.attempted.clone(),
        }
    }

    /// Post-action screenshot, best-effort. On success it becomes the
    /// current observation source and is recorded on the step.
    fn capture_step_screenshot(
        &self,
        run: &mut TestRun,
        iteration: u32,
        step: &mut crate::core::types::StepResult,
    ) {
        let path = run.dir.join(format!("{iteration:03}_step.png"));
        match self.device.take_screenshot(&path) {
            Ok(()) => {
                step.screenshot_path = Some(path.clone());
                run.screenshots.push(path.clone());
                run.current_screenshot = path;
            }
            Err(e) => warn!(error = %e, "step screenshot failed"),
        }
    }

    /// Ask the supervisor for the final verdict over the end state.
    fn final_verdict(&self, test: &TestCase, started: Instant, run: TestRun) -> TestResult {
        let ui_texts = self.device.dump_ui_texts().unwrap_or_default();
        match supervisor::verify_test_completion(
            self.model,
            &test.goal,
            &test.expected_result,
            &run.current_screenshot,
            &run.history,
            &ui_texts,
        ) {
            Ok(verdict) => TestResult {
                test: test.clone(),
                status: verdict.status,
                verdict: Some(verdict),
                steps: run.steps,
                screenshots: run.screenshots,
                duration: started.elapsed(),
                error_message: None,
            },
            Err(e) => TestResult {
                test: test.clone(),
                status: TestStatus::Error,
                verdict: None,
                steps: run.steps,
                screenshots: run.screenshots,
                duration: started.elapsed(),
                error_message: Some(format!("final verification failed: {e}")),
            },
        }
    }

    fn error_result(&self, test: &TestCase, started: Instant, message: String) -> TestResult {
        TestResult {
            test: test.clone(),
            status: TestStatus::Error,
            verdict: None,
            steps: Vec::new(),
            screenshots: Vec::new(),
            duration: started.elapsed(),
            error_message: Some(message),
        }
    }
}
