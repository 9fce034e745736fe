//! Per-run context handed to every workflow step.
//!
//! Configuration is read once when the session is built; steps never consult
//! process-global state.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use url::Url;

use crate::io::config::{CompanionConfig, OracleConfig, SESSION_ENV, secret_from_env};
use crate::io::fetch::{FetchClient, FetchPolicy, ReqwestTransport, ThreadSleeper, TransportConfig};
use crate::io::notify::{LogNotifier, Notifier, TELEGRAM_API_BASE, TelegramNotifier};
use crate::io::oracle::{CommandOracle, OpenAiOracle, Oracle};
use crate::io::sandbox::{CodeRunner, PythonSandbox};
use crate::io::site::{AocSite, PuzzleSite};

/// Knobs the steps read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub working_dir: PathBuf,
    pub max_attempts: u32,
    pub exec_timeout: Duration,
    pub leaderboard_id: Option<u64>,
    pub follow_up_part_two: bool,
}

impl Settings {
    pub fn from_config(cfg: &CompanionConfig) -> Self {
        Self {
            working_dir: cfg.working_dir.clone(),
            max_attempts: cfg.max_attempts,
            exec_timeout: cfg.executor.timeout(),
            leaderboard_id: cfg.leaderboard_id,
            follow_up_part_two: cfg.follow_up_part_two,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&CompanionConfig::default())
    }
}

/// Collaborators plus settings for one workflow run.
pub struct Session<'a> {
    pub site: &'a dyn PuzzleSite,
    pub oracle: &'a dyn Oracle,
    pub runner: &'a dyn CodeRunner,
    pub notifier: &'a dyn Notifier,
    pub settings: Settings,
}

/// Real site client authenticated with the session cookie from the environment.
pub fn build_site(cfg: &CompanionConfig) -> Result<Box<dyn PuzzleSite>> {
    let session_token = secret_from_env(SESSION_ENV)?;
    let transport = ReqwestTransport::new(&TransportConfig {
        session_token,
        user_agent: cfg.user_agent.clone(),
        timeout: Duration::from_secs(cfg.fetch.request_timeout_secs),
    })?;
    let policy = FetchPolicy {
        max_attempts: cfg.fetch.max_attempts,
        max_rate_limit_waits: cfg.fetch.max_rate_limit_waits,
    };
    let base_url = Url::parse(&cfg.base_url).with_context(|| format!("base_url {}", cfg.base_url))?;
    Ok(Box::new(AocSite::new(
        FetchClient::new(transport, ThreadSleeper, policy),
        base_url,
        cfg.effective_year(),
    )))
}

pub fn build_oracle(cfg: &CompanionConfig) -> Result<Box<dyn Oracle>> {
    match &cfg.oracle {
        OracleConfig::OpenAi(openai) => {
            let api_key = secret_from_env(&openai.api_key_env)?;
            info!(model = %openai.model, "using chat-completions oracle");
            Ok(Box::new(OpenAiOracle::new(
                &openai.api_base,
                &api_key,
                &openai.model,
                Duration::from_secs(openai.timeout_secs),
            )?))
        }
        OracleConfig::Command(command) => {
            info!(program = %command.program, "using command oracle");
            Ok(Box::new(CommandOracle::new(
                &command.program,
                &command.args,
                Duration::from_secs(command.timeout_secs),
            )?))
        }
    }
}

pub fn build_runner(cfg: &CompanionConfig) -> Box<dyn CodeRunner> {
    Box::new(PythonSandbox::new(
        cfg.executor.interpreter.clone(),
        cfg.executor.output_limit_bytes,
    ))
}

/// Telegram when a chat is configured and its token is present, else log-only.
pub fn build_notifier(cfg: &CompanionConfig) -> Box<dyn Notifier> {
    let Some(chat_id) = cfg.notify.telegram_chat_id.clone() else {
        return Box::new(LogNotifier);
    };
    let telegram = secret_from_env(&cfg.notify.telegram_token_env)
        .map_err(anyhow::Error::from)
        .and_then(|token| TelegramNotifier::new(TELEGRAM_API_BASE, &token, chat_id));
    match telegram {
        Ok(notifier) => Box::new(notifier),
        Err(err) => {
            warn!(error = %err, "telegram notifications disabled");
            Box::new(LogNotifier)
        }
    }
}
