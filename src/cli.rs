//! CLI argument parsing for the note pipeline.
//!
//! The CLI only wires inputs to the pipeline; all clinical logic lives in the
//! steps and their prompts.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Record id used when neither `--id` nor a case file supplies one.
pub const DEFAULT_RECORD_ID: &str = "001";

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "cscribe",
    version,
    about = "Turn a doctor-patient dialogue into a reviewed SOAP note",
    after_help = "Commands:\n  run                 Extract, synthesize and review a note\n  scrub               Redact phone numbers, emails and names\n  log                 Show recorded LM interactions\n\nExamples:\n  cscribe run --transcript visit.txt --lm 'claude -p --output-format json'\n  cscribe run --dataset cases.json --case case_12 --json\n  cat visit.txt | cscribe scrub\n  cscribe log --agent Reviewer --tail 5",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    Scrub(ScrubArgs),
    Log(LogArgs),
}

/// Run command inputs: one transcript through the pipeline.
#[derive(Parser, Debug)]
#[command(about = "Run the extractor, synthesizer and reviewer on one dialogue")]
pub struct RunArgs {
    /// Plain-text transcript (stdin when no source is given)
    #[arg(long, value_name = "FILE", conflicts_with = "dataset")]
    pub transcript: Option<PathBuf>,

    /// Case file (JSON array of {id, dialogue, length})
    #[arg(long, value_name = "FILE")]
    pub dataset: Option<PathBuf>,

    /// Case id to pick from the case file
    #[arg(long, value_name = "ID", requires = "dataset", conflicts_with = "index")]
    pub case: Option<String>,

    /// Zero-based case position in the case file (default: last case)
    #[arg(long, value_name = "N", requires = "dataset")]
    pub index: Option<usize>,

    /// Record id (defaults to the case id, else 001)
    #[arg(long, value_name = "ID")]
    pub id: Option<String>,

    /// Pass the transcript through unredacted
    #[arg(long)]
    pub no_scrub: bool,

    /// Emit the final record as JSON
    #[arg(long)]
    pub json: bool,

    /// LM command line (prompt on stdin, answer on stdout)
    #[arg(long, value_name = "CMD")]
    pub lm: Option<String>,

    /// Config file (default: $CONFIG_DIR/cscribe/config.json)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Interaction log path
    #[arg(long, value_name = "PATH", conflicts_with = "no_interaction_log")]
    pub log_file: Option<PathBuf>,

    /// Do not record LM interactions
    #[arg(long)]
    pub no_interaction_log: bool,

    /// Log pipeline progress to stderr
    #[arg(long)]
    pub verbose: bool,
}

/// Scrub command inputs.
#[derive(Parser, Debug)]
#[command(about = "Redact phone numbers, emails and honorific names")]
pub struct ScrubArgs {
    /// Text file to scrub (stdin when omitted)
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,
}

/// Log command inputs for reading back the interaction log.
#[derive(Parser, Debug)]
#[command(about = "Show recorded LM interactions")]
pub struct LogArgs {
    /// Interaction log path (default: config, then llm_api_logs.jsonl)
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Config file (default: $CONFIG_DIR/cscribe/config.json)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Only entries from this agent (Extractor, Synthesizer, Reviewer)
    #[arg(long, value_name = "NAME")]
    pub agent: Option<String>,

    /// Only the last N entries
    #[arg(long, value_name = "N")]
    pub tail: Option<usize>,

    /// Emit entries as JSON lines
    #[arg(long)]
    pub json: bool,
}
