//! Per-task healing loop as an explicit finite state machine.
//!
//! The controller drives one task at a time through
//! `pending -> generating -> evaluating -> {done | healing -> generating}` and
//! trips to `escalated` once the retry counter passes the ceiling. Transitions
//! are pure so the bound can be tested without any generation.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    Pending,
    Generating,
    Evaluating,
    Healing,
    Done,
    Escalated,
}

impl TaskPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskPhase::Done | TaskPhase::Escalated)
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskPhase::Pending => "pending",
            TaskPhase::Generating => "generating",
            TaskPhase::Evaluating => "evaluating",
            TaskPhase::Healing => "healing",
            TaskPhase::Done => "done",
            TaskPhase::Escalated => "escalated",
        }
    }
}

impl fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    Start,
    /// Generation committed at least one file.
    Generated,
    /// Evaluation passed.
    Passed,
    /// Evaluation failed, or generation produced nothing usable.
    Failed,
    /// The debugger returned a fix strategy.
    FixReady,
}

/// Result of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub phase: TaskPhase,
    pub retries: u32,
}

/// Apply `event` to a task in `phase` with `retries` heal cycles spent.
///
/// A failure increments the counter; the task escalates when the counter
/// exceeds `max_retries`. The counter never decreases.
pub fn transition(
    phase: TaskPhase,
    event: TaskEvent,
    retries: u32,
    max_retries: u32,
) -> Result<Transition, String> {
    let next = |phase| Ok(Transition { phase, retries });
    match (phase, event) {
        (TaskPhase::Pending, TaskEvent::Start) => next(TaskPhase::Generating),
        (TaskPhase::Generating, TaskEvent::Generated) => next(TaskPhase::Evaluating),
        (TaskPhase::Evaluating, TaskEvent::Passed) => next(TaskPhase::Done),
        (TaskPhase::Generating | TaskPhase::Evaluating, TaskEvent::Failed) => {
            let retries = retries.saturating_add(1);
            let phase = if retries > max_retries {
                TaskPhase::Escalated
            } else {
                TaskPhase::Healing
            };
            Ok(Transition { phase, retries })
        }
        (TaskPhase::Healing, TaskEvent::FixReady) => next(TaskPhase::Generating),
        (phase, event) => Err(format!("invalid task transition: {event:?} in phase {phase}")),
    }
}
