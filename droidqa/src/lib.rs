//! Vision-model-driven QA agent for Android apps.
//!
//! This crate implements a closed Planner-Executor-Supervisor loop: each
//! iteration captures an observation of the device screen, asks a vision
//! model for exactly one next action, executes it over ADB, and periodically
//! asks a supervisor model whether the test goal has been reached. The
//! architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (action vocabulary, recovery
//!   ladder, error classification). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (ADB subprocess transport,
//!   model HTTP clients, suite/config/report files). Isolated behind narrow
//!   traits so tests can script them.
//!
//! The orchestration modules ([`run`], [`agents`]) coordinate core logic
//! with I/O to implement the per-test state machine and the suite loop.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod prompt;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
