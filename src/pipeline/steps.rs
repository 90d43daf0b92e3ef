//! Extractor, Synthesizer and Reviewer.
//!
//! Each step reads the record, makes exactly one model call, logs exactly one
//! interaction entry (success or failure) and returns a delta. Failures are
//! returned, never handled here; the guard converts them.
use crate::contracts::{ClinicalNote, CombinedExtraction, Contract};
use crate::interaction_log::InteractionSink;
use crate::lm::{invoke_contract, invoke_text, CapabilityError, ModelCapability};
use crate::record::{PartialUpdate, PipelineRecord};
use serde::Serialize;
use thiserror::Error;

pub const EXTRACTOR: &str = "Extractor";
pub const SYNTHESIZER: &str = "Synthesizer";
pub const REVIEWER: &str = "Reviewer";

/// Literal the Reviewer emits when the note matches the transcript.
pub const APPROVED: &str = "APPROVED";

const EXTRACTOR_PROMPT: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/extractor.md"));
const SYNTHESIZER_PROMPT: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/synthesizer.md"));
const REVIEWER_PROMPT: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/reviewer.md"));

/// Why a step could not produce its update.
#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error("missing required field `{0}`")]
    Precondition(&'static str),
}

/// Collaborators a step may use.
pub struct StepContext<'a> {
    pub lm: &'a dyn ModelCapability,
    pub log: &'a dyn InteractionSink,
}

impl StepContext<'_> {
    fn log_outcome(&self, agent: &str, input: &str, output: Result<String, &StepError>) {
        let output = match output {
            Ok(text) => text,
            Err(err) => format!("error: {err}"),
        };
        self.log.log_interaction(agent, input, &output);
    }
}

/// One transformation of the pipeline record.
pub trait Step: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &'static str;

    fn run(&self, ctx: &StepContext<'_>, record: &PipelineRecord)
        -> Result<PartialUpdate, StepError>;
}

/// Joint demographics + risk extraction in a single call.
pub struct Extractor;

impl Step for Extractor {
    fn name(&self) -> &'static str {
        EXTRACTOR
    }

    fn run(
        &self,
        ctx: &StepContext<'_>,
        record: &PipelineRecord,
    ) -> Result<PartialUpdate, StepError> {
        let dialogue = record.prepared_text();
        let prompt = fill_template(
            EXTRACTOR_PROMPT,
            &[
                ("format_instructions", CombinedExtraction::format_instructions().as_str()),
                ("dialogue", dialogue),
            ],
        );

        let outcome = invoke_contract::<CombinedExtraction>(ctx.lm, &prompt).map_err(StepError::from);
        ctx.log_outcome(self.name(), dialogue, outcome.as_ref().map(json_text));
        let extraction = outcome?;

        report_soft_warnings(self.name(), extraction.risk_assessment.soft_warnings());
        Ok(PartialUpdate::extraction(
            extraction.demographics,
            extraction.risk_assessment,
        ))
    }
}

/// SOAP note drafting, informed by the extracted risks.
pub struct Synthesizer;

impl Step for Synthesizer {
    fn name(&self) -> &'static str {
        SYNTHESIZER
    }

    fn run(
        &self,
        ctx: &StepContext<'_>,
        record: &PipelineRecord,
    ) -> Result<PartialUpdate, StepError> {
        let dialogue = record.prepared_text();
        let outcome = match record.risk_assessment() {
            Some(risk) => {
                let prompt = fill_template(
                    SYNTHESIZER_PROMPT,
                    &[
                        ("risks", json_text(risk).as_str()),
                        ("format_instructions", ClinicalNote::format_instructions().as_str()),
                        ("dialogue", dialogue),
                    ],
                );
                invoke_contract::<ClinicalNote>(ctx.lm, &prompt).map_err(StepError::from)
            }
            None => Err(StepError::Precondition("risk_assessment")),
        };
        ctx.log_outcome(self.name(), dialogue, outcome.as_ref().map(json_text));
        let note = outcome?;

        report_soft_warnings(self.name(), note.soft_warnings());
        Ok(PartialUpdate::note(note))
    }
}

/// Advisory audit of the note against the transcript. Output is free text.
pub struct Reviewer;

impl Step for Reviewer {
    fn name(&self) -> &'static str {
        REVIEWER
    }

    fn run(
        &self,
        ctx: &StepContext<'_>,
        record: &PipelineRecord,
    ) -> Result<PartialUpdate, StepError> {
        let (note_text, outcome) = match record.clinical_note() {
            Some(note) => {
                let note_text = json_text(note);
                let prompt = fill_template(
                    REVIEWER_PROMPT,
                    &[("note", note_text.as_str()), ("dialogue", record.prepared_text())],
                );
                let outcome = invoke_text(ctx.lm, &prompt).map_err(StepError::from);
                (note_text, outcome)
            }
            None => (String::new(), Err(StepError::Precondition("clinical_note"))),
        };
        ctx.log_outcome(self.name(), &note_text, outcome.as_ref().map(Clone::clone));
        let comments = outcome?;

        if comments.trim() != APPROVED {
            tracing::info!(
                id = record.id(),
                "reviewer flagged discrepancies (advisory only)"
            );
        }
        Ok(PartialUpdate::review(comments))
    }
}

/// Replace `{name}` placeholders in one pass. Inserted values are never
/// rescanned, so transcript or model text cannot expand other placeholders.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after_brace = &rest[start + 1..];
        let matched = values.iter().find_map(|(name, value)| {
            after_brace
                .strip_prefix(name)
                .and_then(|tail| tail.strip_prefix('}'))
                .map(|tail| (*value, tail))
        });
        match matched {
            Some((value, tail)) => {
                out.push_str(value);
                rest = tail;
            }
            None => {
                out.push('{');
                rest = after_brace;
            }
        }
    }
    out.push_str(rest);
    out
}

fn json_text<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|err| format!("<unserializable: {err}>"))
}

fn report_soft_warnings(step: &str, warnings: Vec<String>) {
    for warning in warnings {
        tracing::warn!(step, warning = %warning, "model output outside expected range");
    }
}

#[cfg(test)]
mod tests {
    use super::fill_template;

    #[test]
    fn template_values_are_not_rescanned() {
        let filled = fill_template(
            "risks: {risks}\ndialogue: {dialogue}",
            &[("risks", "see {dialogue}"), ("dialogue", "Patient: hi")],
        );
        assert_eq!(filled, "risks: see {dialogue}\ndialogue: Patient: hi");
    }

    #[test]
    fn unknown_placeholders_and_braces_are_kept() {
        let filled = fill_template("{\"a\": 1} {other} {note}", &[("note", "N")]);
        assert_eq!(filled, "{\"a\": 1} {other} N");
    }
}
