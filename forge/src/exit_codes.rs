//! Stable exit codes for forge CLI commands.

/// Command succeeded; every task completed.
pub const OK: i32 = 0;
/// Invalid input, config or layout, or any other error.
pub const INVALID: i32 = 1;
/// The run finished but at least one task escalated, or a UI document never validated.
pub const ESCALATED: i32 = 2;
/// The generation service failed and the run stopped.
pub const GENERATION_FAILED: i32 = 3;
