//! Fault isolation at the step boundary.
//!
//! `guarded` is the single catch-and-convert point: an `Err` or a panic inside
//! a step becomes `PartialUpdate { error: "<Step> failed: <message>" }`.
use super::steps::{Step, StepContext};
use crate::record::{PartialUpdate, PipelineRecord};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Tracing target for step failures.
pub const ERROR_TARGET: &str = "cscribe::pipeline::error";

/// Run `step`, converting any failure into an error update.
pub fn guarded(step: &dyn Step, ctx: &StepContext<'_>, record: &PipelineRecord) -> PartialUpdate {
    let message = match panic::catch_unwind(AssertUnwindSafe(|| step.run(ctx, record))) {
        Ok(Ok(update)) => return update,
        Ok(Err(err)) => err.to_string(),
        Err(payload) => {
            let message = format!("panicked: {}", panic_message(&*payload));
            // The step unwound before it could log its own entry.
            ctx.log.log_interaction(
                step.name(),
                record.prepared_text(),
                &format!("error: {message}"),
            );
            message
        }
    };

    tracing::error!(
        target: ERROR_TARGET,
        component = step.name(),
        id = record.id(),
        message = %message,
        "step failed"
    );
    PartialUpdate::failed(format!("{} failed: {}", step.name(), message))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        return (*text).to_string();
    }
    if let Some(text) = payload.downcast_ref::<String>() {
        return text.clone();
    }
    "unknown panic".to_string()
}
