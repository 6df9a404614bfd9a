//! Deterministic, pure logic shared by forge.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod artifact;
pub mod extract;
pub mod invariants;
pub mod path;
pub mod scaffold;
pub mod state_machine;
pub mod static_checks;
pub mod store;
pub mod task_board;
pub mod types;
pub mod ui_schema;
