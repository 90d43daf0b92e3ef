use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod cases;
mod cli;
mod config;
mod contracts;
mod interaction_log;
mod lm;
mod pipeline;
mod record;
mod report;
mod scrub;

use cases::{load_cases, select_case, CaseSelector};
use cli::{Command, LogArgs, RootArgs, RunArgs, ScrubArgs, DEFAULT_RECORD_ID};
use interaction_log::{InteractionSink, JsonlInteractionLog, NullInteractionLog};
use pipeline::Pipeline;

fn main() -> Result<()> {
    let args = RootArgs::parse();
    let verbose = matches!(&args.command, Command::Run(run) if run.verbose);
    init_tracing(verbose);

    match args.command {
        Command::Run(args) => cmd_run(args),
        Command::Scrub(args) => cmd_scrub(args),
        Command::Log(args) => cmd_log(args),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = std::env::var(config::LOG_FILTER_ENV)
        .ok()
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .unwrap_or_else(|| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();
}

fn cmd_run(args: RunArgs) -> Result<()> {
    let config = config::load_config(args.config.as_deref())?;
    let env = |key: &str| std::env::var(key).ok();
    let backend = config::resolve_backend(args.lm.as_deref(), &config, &env)?;
    tracing::info!(backend = %backend.describe(), "resolved LM backend");
    let lm = backend.build()?;

    let (case_id, raw) = read_transcript(&args)?;
    if raw.trim().is_empty() {
        return Err(anyhow!("transcript is empty"));
    }
    let id = args
        .id
        .or(case_id)
        .unwrap_or_else(|| DEFAULT_RECORD_ID.to_string());
    let transcript = if args.no_scrub {
        raw
    } else {
        scrub::scrub_pii(&raw)
    };

    let sink: Arc<dyn InteractionSink> = if args.no_interaction_log {
        Arc::new(NullInteractionLog)
    } else {
        let path = config::resolve_log_path(args.log_file.as_deref(), &config);
        match JsonlInteractionLog::open(&path) {
            Ok(log) => {
                tracing::info!(path = %log.path().display(), "recording LM interactions");
                Arc::new(log)
            }
            // The log is best effort; an unusable path must not cost the note.
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %format!("{err:#}"),
                    "interaction log unavailable, continuing without it"
                );
                Arc::new(NullInteractionLog)
            }
        }
    };

    let record = Pipeline::new(lm, sink).run(&transcript, &id);
    tracing::info!(id = %id, complete = record.is_complete(), "note ready");

    if args.json {
        println!("{}", report::render_json(&record)?);
    } else {
        print!("{}", report::render_text(&record));
    }

    match record.error() {
        Some(error) => Err(anyhow!("pipeline failed for {id}: {error}")),
        None => Ok(()),
    }
}

/// Returns the case id (when read from a case file) and the raw transcript.
fn read_transcript(args: &RunArgs) -> Result<(Option<String>, String)> {
    if let Some(path) = &args.transcript {
        return Ok((None, read_text_file(path)?));
    }
    if let Some(path) = &args.dataset {
        let cases = load_cases(path)?;
        let selector = match (&args.case, args.index) {
            (Some(id), _) => CaseSelector::Id(id.clone()),
            (None, Some(index)) => CaseSelector::Index(index),
            (None, None) => CaseSelector::Last,
        };
        let case = select_case(&cases, &selector)?;
        tracing::info!(id = %case.id, words = case.length, "selected case");
        return Ok((Some(case.id.clone()), case.dialogue.clone()));
    }
    Ok((None, read_stdin()?))
}

fn cmd_scrub(args: ScrubArgs) -> Result<()> {
    let text = match &args.input {
        Some(path) => read_text_file(path)?,
        None => read_stdin()?,
    };
    print!("{}", scrub::scrub_pii(&text));
    Ok(())
}

fn cmd_log(args: LogArgs) -> Result<()> {
    let config = config::load_config(args.config.as_deref())?;
    let path = config::resolve_log_path(args.log_file.as_deref(), &config);
    let mut entries = interaction_log::load_interactions(&path)?;

    if let Some(agent) = &args.agent {
        entries.retain(|entry| entry.agent.eq_ignore_ascii_case(agent));
    }
    if let Some(tail) = args.tail {
        let skip = entries.len().saturating_sub(tail);
        entries.drain(..skip);
    }

    for entry in &entries {
        if args.json {
            println!(
                "{}",
                serde_json::to_string(entry).context("serialize interaction entry")?
            );
        } else {
            println!("[{}] {}", entry.timestamp, entry.agent);
            println!("  input:  {}", entry.input.replace('\n', " "));
            println!("  output: {}", entry.output.replace('\n', " "));
        }
    }
    if entries.is_empty() && !args.json {
        eprintln!("no interactions in {}", path.display());
    }
    Ok(())
}

fn read_text_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

fn read_stdin() -> Result<String> {
    let mut text = String::new();
    io::stdin()
        .read_to_string(&mut text)
        .context("read transcript from stdin")?;
    Ok(text)
}
