//! Shared test infrastructure for integration tests.
//!
//! `MockLm` writes a `/bin/sh` script that answers by role: the script reads
//! the prompt from stdin and picks a canned reply from the role phrase in it.
//! Behavior is tuned per run through environment variables:
//!
//! - `MOCK_REVIEW`: reviewer output (default `APPROVED`)
//! - `MOCK_FAIL_SYNTHESIZER`: when set, the synthesizer call exits non-zero

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

const MOCK_LM_SCRIPT: &str = r#"#!/bin/sh
prompt=$(cat)
case "$prompt" in
  *"Clinical Auditor"*)
    printf '%s\n' "${MOCK_REVIEW:-APPROVED}"
    ;;
  *"expert physician"*)
    if [ -n "$MOCK_FAIL_SYNTHESIZER" ]; then
      echo "synthesizer offline" >&2
      exit 7
    fi
    printf '%s\n' '{"subjective":"Chest pain for 2 days.","objective":"No vitals recorded.","assessment":"Chest pain, cardiac cause not excluded.","plan":["Run an EKG","Follow up after results"]}'
    ;;
  *"Triage Nurse"*)
    printf '%s\n' '```json' '{"demographics":{"age":null,"gender":"Unknown"},"risk_assessment":{"red_flags":["chest pain"],"confidence_score":8}}' '```'
    ;;
  *)
    echo "mock-lm: unrecognized prompt" >&2
    exit 9
    ;;
esac
"#;

pub const TRANSCRIPT: &str =
    "Patient: I have chest pain for 2 days.\n\nDoctor: Let's run an EKG.";

/// Temp workspace holding the mock LM, an empty config and the log path.
pub struct MockLm {
    pub dir: TempDir,
}

impl MockLm {
    pub fn new() -> anyhow::Result<Self> {
        let dir = TempDir::new()?;
        let script = dir.path().join("mock-lm.sh");
        fs::write(&script, MOCK_LM_SCRIPT)?;
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;
        fs::write(dir.path().join("config.json"), "{}")?;
        Ok(Self { dir })
    }

    pub fn script(&self) -> PathBuf {
        self.dir.path().join("mock-lm.sh")
    }

    pub fn config(&self) -> PathBuf {
        self.dir.path().join("config.json")
    }

    pub fn log_file(&self) -> PathBuf {
        self.dir.path().join("logs/llm_api_logs.jsonl")
    }

    pub fn write_file(&self, name: &str, contents: &str) -> anyhow::Result<PathBuf> {
        let path = self.dir.path().join(name);
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// `cscribe run` against the mock LM with an isolated config and log.
    pub fn run(&self, args: &[&str], envs: &[(&str, &str)]) -> anyhow::Result<Output> {
        let mut command = cscribe();
        command
            .arg("run")
            .arg("--lm")
            .arg(self.script())
            .arg("--config")
            .arg(self.config())
            .arg("--log-file")
            .arg(self.log_file())
            .args(args);
        for (key, value) in envs {
            command.env(key, value);
        }
        Ok(command.output()?)
    }

    /// Parsed interaction log entries.
    pub fn interactions(&self) -> anyhow::Result<Vec<serde_json::Value>> {
        let contents = fs::read_to_string(self.log_file())?;
        contents
            .lines()
            .map(|line| Ok(serde_json::from_str(line)?))
            .collect()
    }
}

pub fn cscribe() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_cscribe"));
    command
        .env_remove("CSCRIBE_LM_COMMAND")
        .env_remove("GOOGLE_API_KEY")
        .env_remove("CSCRIBE_LOG")
        .stdin(Stdio::null());
    command
}

/// Run cscribe with `input` piped to stdin.
pub fn cscribe_with_stdin(args: &[&str], input: &str) -> anyhow::Result<Output> {
    use std::io::Write;

    let mut child = cscribe()
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes())?;
    }
    Ok(child.wait_with_output()?)
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
