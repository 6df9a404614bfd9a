//! I/O helpers: configuration, generation backends, storage, events and run artifacts.

pub mod config;
pub mod durable;
pub mod events;
pub mod generation;
pub mod init;
pub mod process;
pub mod prompt;
pub mod run_log;
pub mod schema;
