//! Append-only log of every model interaction.
//!
//! Entries are appended to a JSONL file (default `llm_api_logs.jsonl`):
//!
//! ```jsonl
//! {"timestamp":"2026-10-19T09:12:03.118+02:00","agent":"Extractor","input":"Patient: ...","output":"{...}"}
//! {"timestamp":"2026-10-19T09:12:07.402+02:00","agent":"Synthesizer","input":"Patient: ...","output":"{...}"}
//! ```
//!
//! Logging is best effort. A sink never returns an error to the pipeline; write
//! failures are reported through `tracing` and dropped.
use anyhow::{Context, Result};
use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Default interaction log file name, relative to the working directory.
pub const DEFAULT_LOG_FILE: &str = "llm_api_logs.jsonl";

/// Maximum number of input characters kept in an entry.
pub const INPUT_PREVIEW_CHARS: usize = 500;

/// Marker appended to every input preview.
pub const TRUNCATION_MARKER: &str = "...";

/// One logged model call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionEntry {
    /// Local ISO-8601 time the entry was recorded.
    pub timestamp: String,
    /// Step that made the call.
    pub agent: String,
    /// Input preview (first 500 chars plus marker).
    pub input: String,
    /// Full output, or `error: <message>` for a failed call.
    pub output: String,
}

impl InteractionEntry {
    pub fn new(agent: &str, input: &str, output: &str) -> Self {
        Self {
            timestamp: Local::now().to_rfc3339_opts(SecondsFormat::Millis, false),
            agent: agent.to_string(),
            input: input_preview(input),
            output: output.to_string(),
        }
    }
}

/// Destination for interaction entries.
pub trait InteractionSink: Send + Sync {
    /// Record one interaction. Must not fail the caller.
    fn log_interaction(&self, agent: &str, input: &str, output: &str);
}

/// File-backed sink writing one JSON object per line.
pub struct JsonlInteractionLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlInteractionLog {
    /// Open (or create) the log for appending.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open interaction log for append: {}", path.display()))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, entry: &InteractionEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry).context("serialize interaction entry")?;
        line.push('\n');
        // A poisoned lock still guards a usable handle.
        let mut file = self
            .file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(line.as_bytes())
            .context("write interaction entry")?;
        file.flush().context("flush interaction log")?;
        Ok(())
    }
}

impl InteractionSink for JsonlInteractionLog {
    fn log_interaction(&self, agent: &str, input: &str, output: &str) {
        let entry = InteractionEntry::new(agent, input, output);
        if let Err(err) = self.append(&entry) {
            tracing::warn!(
                path = %self.path.display(),
                agent,
                error = %err,
                "interaction log write failed"
            );
        }
    }
}

/// In-memory sink for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryInteractionLog {
    entries: Mutex<Vec<InteractionEntry>>,
}

#[cfg(test)]
impl MemoryInteractionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far.
    pub fn entries(&self) -> Vec<InteractionEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[cfg(test)]
impl InteractionSink for MemoryInteractionLog {
    fn log_interaction(&self, agent: &str, input: &str, output: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(InteractionEntry::new(agent, input, output));
    }
}

/// Sink that drops everything.
pub struct NullInteractionLog;

impl InteractionSink for NullInteractionLog {
    fn log_interaction(&self, _agent: &str, _input: &str, _output: &str) {}
}

/// Truncate on a char boundary and append the marker.
pub fn input_preview(input: &str) -> String {
    let mut preview: String = input.chars().take(INPUT_PREVIEW_CHARS).collect();
    preview.push_str(TRUNCATION_MARKER);
    preview
}

/// Load all entries from a JSONL log, skipping lines that fail to parse.
pub fn load_interactions(path: &Path) -> Result<Vec<InteractionEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file =
        File::open(path).with_context(|| format!("open interaction log: {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("read line {} of interaction log", line_num + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<InteractionEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                tracing::warn!(line = line_num + 1, error = %err, "skip corrupt interaction entry");
            }
        }
    }

    Ok(entries)
}
