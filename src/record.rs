//! Pipeline record and the partial updates steps return.
//!
//! The record is a value threaded through the orchestrator: steps read it,
//! return a `PartialUpdate`, and the orchestrator folds that delta back in with
//! `PipelineRecord::apply`. Steps never hold a mutable handle to the record.
use crate::contracts::{ClinicalNote, ClinicalRisk, Demographics};
use serde::Serialize;

/// Shared state for one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineRecord {
    id: String,
    raw_text: String,
    prepared_text: String,
    demographics: Option<Demographics>,
    risk_assessment: Option<ClinicalRisk>,
    clinical_note: Option<ClinicalNote>,
    review_comments: Option<String>,
    error: Option<String>,
}

impl PipelineRecord {
    /// Build the initial record. The transcript is expected to be prepared
    /// (scrubbed) by the caller, so raw and prepared text start identical.
    pub fn new(id: impl Into<String>, transcript: impl Into<String>) -> Self {
        let transcript = transcript.into();
        Self {
            id: id.into(),
            raw_text: transcript.clone(),
            prepared_text: transcript,
            demographics: None,
            risk_assessment: None,
            clinical_note: None,
            review_comments: None,
            error: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn prepared_text(&self) -> &str {
        &self.prepared_text
    }

    pub fn demographics(&self) -> Option<&Demographics> {
        self.demographics.as_ref()
    }

    pub fn risk_assessment(&self) -> Option<&ClinicalRisk> {
        self.risk_assessment.as_ref()
    }

    pub fn clinical_note(&self) -> Option<&ClinicalNote> {
        self.clinical_note.as_ref()
    }

    pub fn review_comments(&self) -> Option<&str> {
        self.review_comments.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// True once every step ran without setting `error`.
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.clinical_note.is_some() && self.review_comments.is_some()
    }

    /// Fold a step's delta into the record.
    ///
    /// `error` is terminal: once set, later updates are dropped whole.
    pub fn apply(mut self, update: PartialUpdate) -> Self {
        if let Some(existing) = self.error.as_deref() {
            tracing::debug!(
                id = %self.id,
                error = existing,
                "dropping update for record already in error"
            );
            return self;
        }
        if let Some(error) = update.error {
            self.error = Some(error);
            return self;
        }
        if let Some(demographics) = update.demographics {
            self.demographics = Some(demographics);
        }
        if let Some(risk) = update.risk_assessment {
            self.risk_assessment = Some(risk);
        }
        if let Some(note) = update.clinical_note {
            self.clinical_note = Some(note);
        }
        if let Some(comments) = update.review_comments {
            self.review_comments = Some(comments);
        }
        self
    }
}

/// Subset of record fields a single step produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialUpdate {
    pub demographics: Option<Demographics>,
    pub risk_assessment: Option<ClinicalRisk>,
    pub clinical_note: Option<ClinicalNote>,
    pub review_comments: Option<String>,
    pub error: Option<String>,
}

impl PartialUpdate {
    pub fn extraction(demographics: Demographics, risk: ClinicalRisk) -> Self {
        Self {
            demographics: Some(demographics),
            risk_assessment: Some(risk),
            ..Self::default()
        }
    }

    pub fn note(note: ClinicalNote) -> Self {
        Self {
            clinical_note: Some(note),
            ..Self::default()
        }
    }

    pub fn review(comments: String) -> Self {
        Self {
            review_comments: Some(comments),
            ..Self::default()
        }
    }

    pub fn failed(message: String) -> Self {
        Self {
            error: Some(message),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_risk() -> ClinicalRisk {
        ClinicalRisk {
            red_flags: vec!["chest pain".to_string()],
            confidence_score: 8,
        }
    }

    #[test]
    fn new_record_copies_transcript_and_starts_empty() {
        let record = PipelineRecord::new("case_7", "Patient: hello");
        assert_eq!(record.id(), "case_7");
        assert_eq!(record.prepared_text(), "Patient: hello");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["raw_text"], "Patient: hello");
        assert!(record.demographics().is_none());
        assert!(record.risk_assessment().is_none());
        assert!(record.clinical_note().is_none());
        assert!(record.review_comments().is_none());
        assert!(record.error().is_none());
        assert!(!record.is_complete());
    }

    #[test]
    fn apply_merges_only_present_fields() {
        let record = PipelineRecord::new("1", "text")
            .apply(PartialUpdate::extraction(Demographics::default(), sample_risk()));
        assert_eq!(record.risk_assessment(), Some(&sample_risk()));

        let record = record.apply(PartialUpdate::review("APPROVED".to_string()));
        assert_eq!(record.review_comments(), Some("APPROVED"));
        assert!(record.demographics().is_some());
    }

    #[test]
    fn error_is_terminal() {
        let record = PipelineRecord::new("1", "text")
            .apply(PartialUpdate::failed("Extractor failed: boom".to_string()))
            .apply(PartialUpdate::extraction(Demographics::default(), sample_risk()))
            .apply(PartialUpdate::failed("Synthesizer failed: later".to_string()));
        assert_eq!(record.error(), Some("Extractor failed: boom"));
        assert!(record.risk_assessment().is_none());
    }

    #[test]
    fn serializes_absent_fields_as_null() {
        let record = PipelineRecord::new("1", "text");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], "1");
        assert!(value["clinical_note"].is_null());
        assert!(value["error"].is_null());
    }
}
