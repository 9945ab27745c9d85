//! Stable exit codes for the droidqa CLI.

/// Command succeeded and every test outcome matched its expectation.
pub const OK: i32 = 0;
/// Command failed due to invalid usage, suite/config errors, or a missing device/package.
pub const INVALID: i32 = 1;
/// The run completed but at least one test outcome contradicted its `should_pass` flag.
pub const UNEXPECTED: i32 = 2;
