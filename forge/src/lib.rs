//! Prompt-to-codebase orchestration.
//!
//! A run turns a natural-language prompt into a project: the planner produces
//! a manifest, the scaffolder lays down config and boilerplate, the
//! decomposer splits the manifest into tasks, and the controller drives each
//! task through generate → evaluate → heal until it completes or escalates.
//!
//! - **[`core`]**: pure, deterministic logic (artifact parsing, path
//!   normalization, scaffolding, the task state machine, UI validation).
//! - **[`io`]**: side effects (config, generation backends, durable storage,
//!   events, run artifacts).
//! - **[`agents`]**: the generating roles, each taking a
//!   [`GenerationService`](io::generation::GenerationService) per call.
//!
//! [`controller`] and [`ui_pipeline`] compose these into the two flows the
//! CLI and server expose.

pub mod agents;
pub mod controller;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod registry;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod ui_pipeline;
