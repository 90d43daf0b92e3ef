//! Local LM command backend.
//!
//! Runs a user-configured command with the prompt on stdin and reads the
//! answer from stdout. The command can be any tool that accepts text input and
//! produces text output (`llm`, `ollama run`, `claude --print`, a script).
//!
//! For structured calls the literal argument `{schema}` is replaced with the
//! contract's JSON schema. Free-form calls have no schema, so the placeholder
//! is dropped together with the flag that precedes it
//! (`--json-schema {schema}` disappears).
use super::{extract_structured_output, CapabilityError, ModelCapability};
use crate::contracts::SchemaDescriptor;
use serde_json::Value;
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Instant;

/// Placeholder substituted with the JSON schema for structured calls.
pub const SCHEMA_PLACEHOLDER: &str = "{schema}";

/// Capability backed by a local command.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    argv: Vec<String>,
}

impl CommandBackend {
    /// Parse a shell-style command line and resolve its program.
    pub fn from_command_line(command: &str) -> anyhow::Result<Self> {
        let argv = shell_words::split(command)
            .map_err(|err| anyhow::anyhow!("parse LM command {command:?}: {err}"))?;
        let program = argv
            .first()
            .ok_or_else(|| anyhow::anyhow!("LM command is empty"))?;
        which::which(program)
            .map_err(|err| anyhow::anyhow!("LM command {program:?} not found: {err}"))?;
        Ok(Self { argv })
    }

    fn argv_for(&self, schema: Option<&SchemaDescriptor>) -> Vec<String> {
        match schema {
            Some(schema) => {
                let rendered = schema.schema.to_string();
                self.argv
                    .iter()
                    .map(|arg| {
                        if arg == SCHEMA_PLACEHOLDER {
                            rendered.clone()
                        } else {
                            arg.clone()
                        }
                    })
                    .collect()
            }
            None => {
                let mut argv: Vec<String> = Vec::with_capacity(self.argv.len());
                for arg in &self.argv {
                    if arg == SCHEMA_PLACEHOLDER {
                        let flag_before = argv.len() > 1
                            && argv.last().is_some_and(|flag| flag.starts_with('-'));
                        if flag_before {
                            argv.pop();
                        }
                        continue;
                    }
                    argv.push(arg.clone());
                }
                argv
            }
        }
    }

    fn run(&self, prompt: &str, schema: Option<&SchemaDescriptor>) -> Result<String, CapabilityError> {
        let argv = self.argv_for(schema);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| CapabilityError::Command("LM command is empty".to_string()))?;

        let start = Instant::now();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| CapabilityError::Command(format!("spawn {program}: {err}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .map_err(|err| CapabilityError::Command(format!("write prompt to stdin: {err}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|err| CapabilityError::Command(format!("wait for {program}: {err}")))?;
        let elapsed_ms = start.elapsed().as_millis();

        tracing::info!(
            elapsed_ms,
            prompt_bytes = prompt.len(),
            response_bytes = output.stdout.len(),
            contract = schema.map_or("freeform", |schema| schema.name),
            "lm invoke complete"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CapabilityError::Command(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|err| CapabilityError::Command(format!("stdout is not UTF-8: {err}")))
    }
}

impl ModelCapability for CommandBackend {
    fn invoke_structured(
        &self,
        prompt: &str,
        schema: &SchemaDescriptor,
    ) -> Result<Value, CapabilityError> {
        let response = self.run(prompt, Some(schema))?;
        extract_structured_output(&response)
    }

    fn invoke_freeform(&self, prompt: &str) -> Result<String, CapabilityError> {
        let response = self.run(prompt, None)?;
        Ok(response.trim().to_string())
    }
}
