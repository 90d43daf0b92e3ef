//! Structured output contracts for the note pipeline.
//!
//! Every structured model call names one of these shapes. A response is only
//! accepted once it deserializes cleanly into the matching type; anything else
//! is a contract violation reported by the capability layer.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

/// Placeholder used for demographics the transcript does not state.
pub const UNKNOWN: &str = "Unknown";

/// Expected inclusive range for `ClinicalRisk::confidence_score`.
pub const CONFIDENCE_RANGE: std::ops::RangeInclusive<i64> = 1..=10;

/// Schema handed to the model capability alongside a prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDescriptor {
    /// Contract name, used in error messages and logs.
    pub name: &'static str,
    /// JSON Schema for the expected response object.
    pub schema: Value,
}

/// A record shape a structured model response must conform to.
pub trait Contract: Serialize + DeserializeOwned {
    /// Human-readable contract name.
    const NAME: &'static str;

    /// JSON Schema describing the shape.
    fn json_schema() -> Value;

    /// Descriptor passed to the capability for structured calls.
    fn descriptor() -> SchemaDescriptor {
        SchemaDescriptor {
            name: Self::NAME,
            schema: Self::json_schema(),
        }
    }

    /// Prompt section telling the model how to format its answer.
    fn format_instructions() -> String {
        let schema = serde_json::to_string_pretty(&Self::json_schema())
            .unwrap_or_else(|_| Self::json_schema().to_string());
        format!(
            "Respond with a single JSON object that conforms to this JSON schema:\n{schema}\n\
             Return the JSON object only. No prose or code fences."
        )
    }
}

/// Patient demographics extracted from the dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demographics {
    #[serde(default = "unknown", deserialize_with = "string_or_unknown")]
    pub age: String,
    #[serde(default = "unknown", deserialize_with = "string_or_unknown")]
    pub gender: String,
}

impl Default for Demographics {
    fn default() -> Self {
        Self {
            age: unknown(),
            gender: unknown(),
        }
    }
}

impl Contract for Demographics {
    const NAME: &'static str = "Demographics";

    fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "age": {
                    "type": "string",
                    "description": "Patient age if mentioned, else 'Unknown'"
                },
                "gender": {
                    "type": "string",
                    "description": "Patient gender if mentioned, else 'Unknown'"
                }
            },
            "required": ["age", "gender"]
        })
    }
}

/// Urgent findings flagged during triage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicalRisk {
    pub red_flags: Vec<String>,
    pub confidence_score: i64,
}

impl ClinicalRisk {
    /// Soft checks the pipeline reports but never enforces.
    pub fn soft_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !CONFIDENCE_RANGE.contains(&self.confidence_score) {
            warnings.push(format!(
                "confidence_score {} outside {}..={}",
                self.confidence_score,
                CONFIDENCE_RANGE.start(),
                CONFIDENCE_RANGE.end()
            ));
        }
        if self.red_flags.is_empty() {
            warnings.push("red_flags is empty".to_string());
        }
        warnings
    }
}

impl Contract for ClinicalRisk {
    const NAME: &'static str = "ClinicalRisk";

    fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "red_flags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Urgent concerns or severe symptoms."
                },
                "confidence_score": {
                    "type": "integer",
                    "description": "Confidence score (1-10)."
                }
            },
            "required": ["red_flags", "confidence_score"]
        })
    }
}

/// SOAP note produced by the Synthesizer. All four sections arrive together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicalNote {
    pub subjective: String,
    pub objective: String,
    pub assessment: String,
    pub plan: Vec<String>,
}

impl ClinicalNote {
    pub fn soft_warnings(&self) -> Vec<String> {
        if self.plan.is_empty() {
            vec!["plan is empty".to_string()]
        } else {
            Vec::new()
        }
    }
}

impl Contract for ClinicalNote {
    const NAME: &'static str = "ClinicalNote";

    fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "subjective": {
                    "type": "string",
                    "description": "Patient's complaints and symptoms."
                },
                "objective": {
                    "type": "string",
                    "description": "Measurable data/vitals."
                },
                "assessment": {
                    "type": "string",
                    "description": "Diagnosis."
                },
                "plan": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Actionable steps."
                }
            },
            "required": ["subjective", "objective", "assessment", "plan"]
        })
    }
}

/// Joint Extractor output: one model call fills two record fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedExtraction {
    pub demographics: Demographics,
    #[serde(alias = "risk_analysis")]
    pub risk_assessment: ClinicalRisk,
}

impl Contract for CombinedExtraction {
    const NAME: &'static str = "CombinedExtraction";

    fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "demographics": Demographics::json_schema(),
                "risk_assessment": ClinicalRisk::json_schema()
            },
            "required": ["demographics", "risk_assessment"]
        })
    }
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

// Models regularly answer `null`, `""` or a bare number for age.
fn string_or_unknown<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) if !text.trim().is_empty() => text,
        Some(Value::Number(number)) => number.to_string(),
        _ => unknown(),
    })
}
