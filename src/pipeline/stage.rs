//! Pipeline stages and the transition table.
use serde::Serialize;

/// Where the orchestrator is. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Extracting,
    Synthesizing,
    Reviewing,
    Done,
    Failed,
}

/// Result of the stage just executed, read off the record's `error` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Completed,
    Errored,
}

use Stage::*;
use StepOutcome::*;

/// `(from, outcome) -> to`. Terminal stages have no rows.
pub const TRANSITIONS: &[(Stage, StepOutcome, Stage)] = &[
    (Start, Completed, Extracting),
    (Start, Errored, Extracting),
    (Extracting, Completed, Synthesizing),
    (Extracting, Errored, Failed),
    (Synthesizing, Completed, Reviewing),
    (Synthesizing, Errored, Failed),
    // Reviewer failures are recorded, but there is nothing left to skip.
    (Reviewing, Completed, Done),
    (Reviewing, Errored, Done),
];

impl Stage {
    /// Look up the next stage. Terminal stages map to themselves.
    pub fn next(self, outcome: StepOutcome) -> Stage {
        TRANSITIONS
            .iter()
            .find(|(from, on, _)| *from == self && *on == outcome)
            .map(|(_, _, to)| *to)
            .unwrap_or(self)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Done | Failed)
    }
}

impl StepOutcome {
    pub fn from_error(error: Option<&str>) -> Self {
        if error.is_some() {
            Errored
        } else {
            Completed
        }
    }
}
