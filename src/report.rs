//! Rendering of the final record for the terminal.
use crate::pipeline::APPROVED;
use crate::record::PipelineRecord;
use anyhow::{Context, Result};

const RULE: &str = "==================================================";
const SUB_RULE: &str = "--------------------";

/// Final record as pretty JSON.
pub fn render_json(record: &PipelineRecord) -> Result<String> {
    serde_json::to_string_pretty(record).context("serialize pipeline record")
}

/// Human-readable note, review and status.
pub fn render_text(record: &PipelineRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!("case: {}\n", record.id()));

    if let Some(error) = record.error() {
        out.push_str("\nPIPELINE FAILED\n");
        out.push_str(&format!("error: {error}\n"));
    }

    if let Some(demographics) = record.demographics() {
        out.push_str(&format!(
            "patient: age {}, gender {}\n",
            demographics.age, demographics.gender
        ));
    }
    if let Some(risk) = record.risk_assessment() {
        let flags = if risk.red_flags.is_empty() {
            "none".to_string()
        } else {
            risk.red_flags.join("; ")
        };
        out.push_str(&format!(
            "red flags: {flags} (confidence {}/10)\n",
            risk.confidence_score
        ));
    }

    if let Some(note) = record.clinical_note() {
        out.push_str(&format!("\n{RULE}\nSOAP NOTE\n{RULE}\n"));
        out.push_str(&format!("Subjective: {}\n", note.subjective));
        out.push_str(&format!("Objective:  {}\n", note.objective));
        out.push_str(&format!("Assessment: {}\n", note.assessment));
        out.push_str("Plan:\n");
        for (idx, step) in note.plan.iter().enumerate() {
            out.push_str(&format!("  {}. {step}\n", idx + 1));
        }
    }

    if let Some(review) = record.review_comments() {
        let verdict = if review.trim() == APPROVED {
            "approved"
        } else {
            "discrepancies flagged"
        };
        out.push_str(&format!("\n{SUB_RULE}\nREVIEW ({verdict})\n{SUB_RULE}\n"));
        out.push_str(review);
        out.push('\n');
    }

    out
}
