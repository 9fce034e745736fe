//! Companion configuration stored in `companion.toml`.
//!
//! Secrets never live in the file: the session cookie and API tokens are read
//! from the environment when a session is assembled.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::core::ledger::DEFAULT_MAX_ATTEMPTS;

/// Environment variable holding the puzzle-site session cookie.
pub const SESSION_ENV: &str = "AOC_SESSION";

pub const DEFAULT_CONFIG_FILE: &str = "companion.toml";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0) Gecko/20100101 Firefox/92.0";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingSecret(String),
}

/// Companion configuration (TOML).
///
/// Missing fields default to values that work against the public site.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompanionConfig {
    /// Event year; the current local year when unset.
    pub year: Option<i32>,
    pub base_url: String,
    pub user_agent: String,
    /// Private leaderboard to report at the end of a run.
    pub leaderboard_id: Option<u64>,
    /// Directory that receives downloaded puzzle inputs.
    pub working_dir: PathBuf,
    /// Directory holding workflow checkpoints.
    pub state_dir: PathBuf,
    pub workflow_id: String,
    /// Submitted answers per puzzle before it is abandoned.
    pub max_attempts: u32,
    /// Re-queue a puzzle after its first half is accepted so the second half
    /// is attempted in the same run.
    pub follow_up_part_two: bool,
    pub executor: ExecutorConfig,
    pub fetch: FetchConfig,
    pub oracle: OracleConfig,
    pub notify: NotifyConfig,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            year: None,
            base_url: "https://adventofcode.com".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            leaderboard_id: None,
            working_dir: PathBuf::from("."),
            state_dir: PathBuf::from(".companion"),
            workflow_id: "default".to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            follow_up_part_two: true,
            executor: ExecutorConfig::default(),
            fetch: FetchConfig::default(),
            oracle: OracleConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutorConfig {
    pub interpreter: String,
    pub timeout_secs: u64,
    /// Truncate captured snippet stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            timeout_secs: 120,
            output_limit_bytes: 100_000,
        }
    }
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FetchConfig {
    /// Attempts per request for transient failures.
    pub max_attempts: u32,
    /// Consecutive rate-limit waits before a request is given up.
    pub max_rate_limit_waits: u32,
    pub request_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_rate_limit_waits: 20,
            request_timeout_secs: 30,
        }
    }
}

/// Which oracle backend answers `write_code` steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum OracleConfig {
    #[serde(rename = "openai")]
    OpenAi(OpenAiConfig),
    Command(CommandOracleConfig),
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig::OpenAi(OpenAiConfig::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OpenAiConfig {
    pub model: String,
    /// Base URL of an OpenAI-compatible API (`.../v1`).
    pub api_base: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 300,
        }
    }
}

/// External program that reads a rendered request on stdin and prints tool
/// invocations as JSON on stdout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommandOracleConfig {
    pub program: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for CommandOracleConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotifyConfig {
    /// Telegram chat that receives progress messages; log-only when unset.
    pub telegram_chat_id: Option<String>,
    /// Environment variable holding the Telegram bot token.
    pub telegram_token_env: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            telegram_chat_id: None,
            telegram_token_env: "TELEGRAM_BOT_TOKEN".to_string(),
        }
    }
}

impl CompanionConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(year) = self.year
            && !(2015..=2100).contains(&year)
        {
            return Err(anyhow!("year must be between 2015 and 2100, got {year}"));
        }
        Url::parse(&self.base_url).with_context(|| format!("base_url {:?}", self.base_url))?;
        if self.user_agent.trim().is_empty() {
            return Err(anyhow!("user_agent must not be empty"));
        }
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        let id_ok = !self.workflow_id.is_empty()
            && self
                .workflow_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !id_ok {
            return Err(anyhow!(
                "workflow_id must be non-empty and use only [A-Za-z0-9_-], got {:?}",
                self.workflow_id
            ));
        }
        if self.executor.interpreter.trim().is_empty() {
            return Err(anyhow!("executor.interpreter must not be empty"));
        }
        if self.executor.timeout_secs == 0 {
            return Err(anyhow!("executor.timeout_secs must be > 0"));
        }
        if self.executor.output_limit_bytes == 0 {
            return Err(anyhow!("executor.output_limit_bytes must be > 0"));
        }
        if self.fetch.max_attempts == 0 {
            return Err(anyhow!("fetch.max_attempts must be > 0"));
        }
        if self.fetch.request_timeout_secs == 0 {
            return Err(anyhow!("fetch.request_timeout_secs must be > 0"));
        }
        match &self.oracle {
            OracleConfig::OpenAi(openai) => {
                if openai.model.trim().is_empty() {
                    return Err(anyhow!("oracle.model must not be empty"));
                }
                Url::parse(&openai.api_base)
                    .with_context(|| format!("oracle.api_base {:?}", openai.api_base))?;
            }
            OracleConfig::Command(command) => {
                if command.program.trim().is_empty() {
                    return Err(anyhow!("oracle.program must not be empty"));
                }
                if command.timeout_secs == 0 {
                    return Err(anyhow!("oracle.timeout_secs must be > 0"));
                }
            }
        }
        Ok(())
    }

    /// Year to work on.
    pub fn effective_year(&self) -> i32 {
        self.year.unwrap_or_else(|| chrono::Local::now().year())
    }
}

/// Read a required secret from the environment.
pub fn secret_from_env(var: &str) -> Result<String, ConfigError> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingSecret(var.to_string())),
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `CompanionConfig::default()`.
pub fn load_config(path: &Path) -> Result<CompanionConfig> {
    if !path.exists() {
        let cfg = CompanionConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CompanionConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &CompanionConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    crate::io::write_atomic(path, &buf)
}
