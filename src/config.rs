//! Backend and interaction-log configuration.
//!
//! The optional config file is JSON:
//!
//! ```json
//! {
//!   "backend": {"kind": "gemini", "model": "gemini-2.5-flash", "temperature": 0.2},
//!   "interaction_log": "logs/llm_api_logs.jsonl"
//! }
//! ```
//!
//! The LM backend is resolved in priority order:
//! 1. `--lm` CLI flag (a command line)
//! 2. `backend` in the config file
//! 3. `CSCRIBE_LM_COMMAND` environment variable
//! 4. Gemini, when `GOOGLE_API_KEY` is set
use crate::interaction_log::DEFAULT_LOG_FILE;
use crate::lm::{CommandBackend, GeminiBackend, GeminiSettings, ModelCapability};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const LM_COMMAND_ENV: &str = "CSCRIBE_LM_COMMAND";
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";
pub const LOG_FILTER_ENV: &str = "CSCRIBE_LOG";

const CONFIG_DIR_NAME: &str = "cscribe";
const CONFIG_FILE_NAME: &str = "config.json";

/// Contents of the optional config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScribeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_log: Option<PathBuf>,
}

/// Backend section of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Command {
        command: String,
    },
    Gemini {
        #[serde(default)]
        model: Option<String>,
        /// Environment variable holding the API key.
        #[serde(default)]
        api_key_env: Option<String>,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

/// A backend ready to be built.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedBackend {
    Command(String),
    Gemini(GeminiSettings),
}

impl ResolvedBackend {
    pub fn describe(&self) -> String {
        match self {
            Self::Command(command) => format!("command `{command}`"),
            Self::Gemini(settings) => format!("gemini model {}", settings.model),
        }
    }

    pub fn build(self) -> Result<Box<dyn ModelCapability>> {
        match self {
            Self::Command(command) => Ok(Box::new(CommandBackend::from_command_line(&command)?)),
            Self::Gemini(settings) => Ok(Box::new(GeminiBackend::new(settings))),
        }
    }
}

/// Default config location (`$CONFIG_DIR/cscribe/config.json`).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load the config: an explicit path must exist, the default path is optional.
pub fn load_config(explicit: Option<&Path>) -> Result<ScribeConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path().filter(|path| path.is_file()) {
            Some(path) => path,
            None => return Ok(ScribeConfig::default()),
        },
    };
    let bytes = fs::read(&path).with_context(|| format!("read config {}", path.display()))?;
    let config: ScribeConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    validate_config(&config)?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Reject values no backend could use.
pub fn validate_config(config: &ScribeConfig) -> Result<()> {
    match &config.backend {
        Some(BackendConfig::Command { command }) if command.trim().is_empty() => {
            Err(anyhow!("backend.command must be non-empty"))
        }
        Some(BackendConfig::Gemini {
            model,
            temperature,
            timeout_secs,
            ..
        }) => {
            if model.as_deref().is_some_and(|model| model.trim().is_empty()) {
                return Err(anyhow!("backend.model must be non-empty"));
            }
            if let Some(temperature) = temperature {
                if !(0.0..=2.0).contains(temperature) {
                    return Err(anyhow!(
                        "backend.temperature must be within 0.0..=2.0 (got {temperature})"
                    ));
                }
            }
            if *timeout_secs == Some(0) {
                return Err(anyhow!("backend.timeout_secs must be positive"));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Pick the LM backend. `env` looks up environment variables.
pub fn resolve_backend(
    lm_flag: Option<&str>,
    config: &ScribeConfig,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<ResolvedBackend> {
    if let Some(command) = lm_flag.map(str::trim).filter(|command| !command.is_empty()) {
        return Ok(ResolvedBackend::Command(command.to_string()));
    }

    match &config.backend {
        Some(BackendConfig::Command { command }) => {
            return Ok(ResolvedBackend::Command(command.trim().to_string()));
        }
        Some(BackendConfig::Gemini {
            model,
            api_key_env,
            base_url,
            temperature,
            timeout_secs,
        }) => {
            let key_var = api_key_env.as_deref().unwrap_or(API_KEY_ENV);
            let api_key = env(key_var)
                .filter(|key| !key.trim().is_empty())
                .ok_or_else(|| anyhow!("gemini backend needs an API key in ${key_var}"))?;
            let defaults = GeminiSettings::with_api_key(api_key);
            return Ok(ResolvedBackend::Gemini(GeminiSettings {
                base_url: base_url.clone().unwrap_or(defaults.base_url),
                model: model.clone().unwrap_or(defaults.model),
                api_key: defaults.api_key,
                temperature: temperature.unwrap_or(defaults.temperature),
                timeout_secs: timeout_secs.unwrap_or(defaults.timeout_secs),
            }));
        }
        None => {}
    }

    if let Some(command) = env(LM_COMMAND_ENV).filter(|command| !command.trim().is_empty()) {
        return Ok(ResolvedBackend::Command(command.trim().to_string()));
    }

    if let Some(api_key) = env(API_KEY_ENV).filter(|key| !key.trim().is_empty()) {
        return Ok(ResolvedBackend::Gemini(GeminiSettings::with_api_key(api_key)));
    }

    Err(anyhow!(
        "no LM backend configured: pass --lm, add a backend to the config file, \
         set ${LM_COMMAND_ENV}, or set ${API_KEY_ENV}"
    ))
}

/// Interaction log location: flag, then config, then the default file.
pub fn resolve_log_path(flag: Option<&Path>, config: &ScribeConfig) -> PathBuf {
    flag.map(Path::to_path_buf)
        .or_else(|| config.interaction_log.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
