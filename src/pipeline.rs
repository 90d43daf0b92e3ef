//! Three-step note pipeline: extraction, synthesis, review.
//!
//! The orchestrator owns the record for the whole invocation. It walks the
//! stage table in `stage`, runs the guarded step for each non-terminal stage,
//! folds the returned delta into the record and picks the next stage from the
//! record's `error` field. It never inspects step failures any other way.
//!
//! ```text
//! Start -> Extracting -> Synthesizing -> Reviewing -> Done
//!              |              |
//!              +--> Failed <--+
//! ```
use crate::interaction_log::InteractionSink;
use crate::lm::ModelCapability;
use crate::record::PipelineRecord;
use serde::Serialize;
use std::sync::Arc;

mod guard;
mod stage;
mod steps;

pub use stage::Stage;
pub use steps::APPROVED;

use guard::guarded;
use stage::StepOutcome;
use steps::{Extractor, Reviewer, Step, StepContext, Synthesizer};

static EXTRACTOR_STEP: Extractor = Extractor;
static SYNTHESIZER_STEP: Synthesizer = Synthesizer;
static REVIEWER_STEP: Reviewer = Reviewer;

/// Final record plus the stages visited to reach it.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub record: PipelineRecord,
    pub stages: Vec<Stage>,
}

/// Sequences the guarded steps over one record per invocation.
pub struct Pipeline {
    lm: Box<dyn ModelCapability>,
    log: Arc<dyn InteractionSink>,
}

impl Pipeline {
    pub fn new(lm: Box<dyn ModelCapability>, log: Arc<dyn InteractionSink>) -> Self {
        Self { lm, log }
    }

    /// Run the pipeline on an already prepared transcript.
    ///
    /// Always returns a record; `error` is the only failure signal.
    pub fn run(&self, transcript: &str, id: &str) -> PipelineRecord {
        self.run_traced(transcript, id).record
    }

    /// Like `run`, also returning the visited stages.
    pub fn run_traced(&self, transcript: &str, id: &str) -> PipelineRun {
        let ctx = StepContext {
            lm: self.lm.as_ref(),
            log: self.log.as_ref(),
        };
        let mut record = PipelineRecord::new(id, transcript);
        let mut stage = Stage::Start;
        let mut stages = vec![stage];

        while !stage.is_terminal() {
            let outcome = match step_for(stage) {
                Some(step) => {
                    let update = guarded(step, &ctx, &record);
                    record = record.apply(update);
                    StepOutcome::from_error(record.error())
                }
                None => StepOutcome::Completed,
            };
            let next = stage.next(outcome);
            tracing::debug!(id, from = ?stage, to = ?next, ?outcome, "stage transition");
            stage = next;
            stages.push(stage);
        }

        tracing::info!(
            id,
            stage = ?stage,
            failed = record.error().is_some(),
            "pipeline finished"
        );
        PipelineRun { record, stages }
    }
}

fn step_for(stage: Stage) -> Option<&'static dyn Step> {
    match stage {
        Stage::Extracting => Some(&EXTRACTOR_STEP),
        Stage::Synthesizing => Some(&SYNTHESIZER_STEP),
        Stage::Reviewing => Some(&REVIEWER_STEP),
        Stage::Start | Stage::Done | Stage::Failed => None,
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
