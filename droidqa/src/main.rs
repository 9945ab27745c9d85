//! Vision-model-driven QA agent for Android apps.
//!
//! Runs natural-language test cases against a device over ADB: a planner
//! model proposes one action at a time, an executor performs it, and a
//! supervisor model delivers the pass/fail verdict.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use droidqa::core::types::TestCase;
use droidqa::exit_codes;
use droidqa::io::adb::AdbDevice;
use droidqa::io::config::{RunnerConfig, load_config};
use droidqa::io::gemini::GeminiClient;
use droidqa::io::model::ModelClient;
use droidqa::io::openai::OpenAiClient;
use droidqa::io::suite::load_suite;
use droidqa::run::Runner;

#[derive(Parser)]
#[command(
    name = "droidqa",
    version,
    about = "Vision-model-driven QA agent for Android apps"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a test suite against a connected device.
    Run {
        /// Path to the suite YAML file.
        #[arg(long)]
        suite: PathBuf,
        /// Path to the runner config TOML (defaults apply when missing).
        #[arg(long, default_value = "droidqa.toml")]
        config: PathBuf,
        /// Model provider to plan and verify with.
        #[arg(long, value_enum, default_value = "gemini")]
        provider: Provider,
        /// Model name, e.g. gemini-2.0-flash or gpt-4o.
        #[arg(long)]
        model: Option<String>,
        /// Device serial, required when several devices are attached.
        #[arg(long)]
        serial: Option<String>,
        /// Override the suite's app package.
        #[arg(long)]
        package: Option<String>,
        /// Run only tests with these ids (repeatable).
        #[arg(long = "test-id")]
        test_ids: Vec<String>,
        /// Clear app data before the first test.
        #[arg(long)]
        fresh: bool,
        /// Directory for run artifacts (default: runs/<timestamp>).
        #[arg(long)]
        output: Option<PathBuf>,
        /// Override max_retries_per_step from the config.
        #[arg(long)]
        max_retries: Option<u32>,
        /// Override max_scrolls_per_step from the config.
        #[arg(long)]
        max_scrolls: Option<u32>,
    },
    /// List the tests in a suite without running anything.
    List {
        /// Path to the suite YAML file.
        #[arg(long)]
        suite: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Provider {
    Gemini,
    Openai,
}

impl Provider {
    fn default_model(self) -> &'static str {
        match self {
            Provider::Gemini => "gemini-2.0-flash",
            Provider::Openai => "gpt-4o",
        }
    }
}

fn main() {
    droidqa::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            suite,
            config,
            provider,
            model,
            serial,
            package,
            test_ids,
            fresh,
            output,
            max_retries,
            max_scrolls,
        } => {
            let suite = load_suite(&suite)?;
            let mut config = load_config(&config)?;
            if let Some(n) = max_retries {
                config.max_retries_per_step = n;
            }
            if let Some(n) = max_scrolls {
                config.max_scrolls_per_step = n;
            }
            config.validate()?;

            let app_package = package.unwrap_or(suite.app_package);
            let tests = select_tests(suite.tests, &test_ids)?;
            let run_dir = output
                .unwrap_or_else(|| PathBuf::from("runs").join(Utc::now().format("%Y%m%d_%H%M%S").to_string()));

            let device = AdbDevice::new(serial, Duration::from_secs(config.device_timeout_secs));
            if !device
                .is_package_installed(&app_package)
                .context("query installed packages")?
            {
                bail!("package {app_package} is not installed on the device");
            }

            let model_name = model.unwrap_or_else(|| provider.default_model().to_string());
            info!(?provider, model = %model_name, run_dir = %run_dir.display(), "starting run");
            match provider {
                Provider::Gemini => {
                    let client = GeminiClient::from_env(model_name)?;
                    run_suite(&device, &client, config, run_dir, &app_package, fresh, &tests)
                }
                Provider::Openai => {
                    let client = OpenAiClient::from_env(model_name)?;
                    run_suite(&device, &client, config, run_dir, &app_package, fresh, &tests)
                }
            }
        }
        Command::List { suite } => {
            let suite = load_suite(&suite)?;
            println!("app: {}", suite.app_package);
            for test in &suite.tests {
                let expectation = if test.should_pass { "pass" } else { "fail" };
                println!("  {}: {} (expected to {})", test.id, test.name, expectation);
            }
            Ok(exit_codes::OK)
        }
    }
}

fn select_tests(tests: Vec<TestCase>, test_ids: &[String]) -> Result<Vec<TestCase>> {
    if test_ids.is_empty() {
        return Ok(tests);
    }
    for id in test_ids {
        if !tests.iter().any(|t| &t.id == id) {
            bail!("no test with id {id:?} in the suite");
        }
    }
    Ok(tests
        .into_iter()
        .filter(|t| test_ids.contains(&t.id))
        .collect())
}

fn run_suite<M: ModelClient>(
    device: &AdbDevice,
    model: &M,
    config: RunnerConfig,
    run_dir: PathBuf,
    package: &str,
    fresh: bool,
    tests: &[TestCase],
) -> Result<i32> {
    let runner = Runner::new(device, model, config, run_dir, package, fresh);
    let report = runner.run_suite(tests)?;
    if report.unexpected_outcomes().is_empty() {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::UNEXPECTED)
    }
}
