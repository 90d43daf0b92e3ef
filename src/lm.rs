//! Model capability: prompt in, structured or free-form answer out.
//!
//! The pipeline depends only on `ModelCapability`. Concrete backends live in
//! submodules: a local command (prompt on stdin, answer on stdout) and the
//! Gemini REST API.
//!
//! Structured answers pass through `extract_structured_output`, which accepts
//! a bare JSON object, a fenced code block, a Claude CLI envelope
//! (`structured_output` / `result`), or the first JSON object embedded in
//! prose. The extracted value must then deserialize into the requested
//! contract, otherwise the call fails with `CapabilityError::Contract`.
use crate::contracts::{Contract, SchemaDescriptor};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

mod command;
mod gemini;

pub use command::CommandBackend;
pub use gemini::{GeminiBackend, GeminiSettings};

/// Failure of a single capability call.
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("LM command failed: {0}")]
    Command(String),

    #[error("LM transport error: {0}")]
    Transport(String),

    #[error("LM provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("LM response is not valid JSON: {0}")]
    Parse(String),

    #[error("LM response does not match {contract}: {detail}")]
    Contract {
        contract: &'static str,
        detail: String,
    },

    #[error("LM returned an empty response")]
    Empty,
}

/// Opaque inference capability used by every pipeline step.
pub trait ModelCapability: Send + Sync {
    /// Ask for a JSON value conforming to `schema`.
    fn invoke_structured(
        &self,
        prompt: &str,
        schema: &SchemaDescriptor,
    ) -> Result<Value, CapabilityError>;

    /// Ask for plain text.
    fn invoke_freeform(&self, prompt: &str) -> Result<String, CapabilityError>;
}

/// Invoke the capability and validate the answer against contract `T`.
pub fn invoke_contract<T: Contract>(
    lm: &dyn ModelCapability,
    prompt: &str,
) -> Result<T, CapabilityError> {
    let value = lm.invoke_structured(prompt, &T::descriptor())?;
    serde_json::from_value(value).map_err(|err| CapabilityError::Contract {
        contract: T::NAME,
        detail: err.to_string(),
    })
}

/// Invoke the capability for free text. The answer is trimmed; blank answers
/// are rejected.
pub fn invoke_text(lm: &dyn ModelCapability, prompt: &str) -> Result<String, CapabilityError> {
    let text = lm.invoke_freeform(prompt)?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CapabilityError::Empty);
    }
    Ok(trimmed.to_string())
}

/// Extract structured JSON from a raw LM response.
pub fn extract_structured_output(response: &str) -> Result<Value, CapabilityError> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(CapabilityError::Empty);
    }

    let cleaned = strip_code_fences(trimmed);
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(value) => unwrap_envelope(value),
        Err(err) => extract_json_from_text(&cleaned)
            .map(unwrap_envelope)
            .unwrap_or_else(|| Err(CapabilityError::Parse(err.to_string()))),
    }
}

// Claude CLI `--output-format json` wraps the answer.
fn unwrap_envelope(value: Value) -> Result<Value, CapabilityError> {
    if let Some(structured) = value.get("structured_output") {
        return Ok(structured.clone());
    }
    if value.get("type").and_then(Value::as_str) == Some("result") {
        if let Some(result) = value.get("result").and_then(Value::as_str) {
            let cleaned = strip_code_fences(result);
            return serde_json::from_str(&cleaned)
                .ok()
                .or_else(|| extract_json_from_text(&cleaned))
                .ok_or_else(|| CapabilityError::Parse("envelope result is not JSON".to_string()));
        }
    }
    Ok(value)
}

fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut lines: Vec<&str> = trimmed.lines().collect();
    if let Some(first) = lines.first() {
        if first.trim_start().starts_with("```") {
            lines.remove(0);
        }
    }
    if let Some(last) = lines.last() {
        if last.trim_start().starts_with("```") {
            lines.pop();
        }
    }
    lines.join("\n").trim().to_string()
}

fn extract_json_from_text(raw: &str) -> Option<Value> {
    for (idx, ch) in raw.char_indices() {
        if ch != '{' {
            continue;
        }
        let slice = &raw[idx..];
        let mut deserializer = serde_json::Deserializer::from_str(slice);
        if let Ok(value) = Value::deserialize(&mut deserializer) {
            return Some(value);
        }
    }
    None
}
