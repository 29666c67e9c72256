//! Dunning configuration.
//!
//! Loaded from a TOML file. The path is resolved through a chain:
//!
//! 1. `--config <path>`: explicit per-command override
//! 2. `DUNNING_CONFIG` env var
//! 3. `~/.dunning/config.toml`
//!
//! A missing default file yields the defaults; an explicitly named file must exist.

use std::{env, fs, path::PathBuf};

use jiff::civil::Time;
use serde::{Deserialize, Serialize};

/// Dunning configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Obligation snapshot file, used when `--obligations` is not given.
    pub obligations: Option<PathBuf>,

    /// Ledger database file. Defaults to `~/.dunning/ledger.sqlite`.
    pub ledger: Option<PathBuf>,

    pub policy: Policy,
    pub schedule: Schedule,
    pub email: Option<EmailConfig>,
    pub messaging: Option<MessagingConfig>,
    pub notice: NoticeConfig,
}

/// When notices become eligible and for how long.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Policy {
    /// Days before the due date that the reminder is sent.
    pub reminder_offset_days: u16,

    /// Days after the due date that the overdue notice is sent.
    pub overdue_grace_days: u16,

    /// Days past a trigger date during which a missed notice is still sent.
    pub catch_up_days: u16,

    /// Never notify obligations with an absent, zero, or negative amount.
    pub suppress_non_positive: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            reminder_offset_days: 2,
            overdue_grace_days: 10,
            catch_up_days: 7,
            suppress_non_positive: true,
        }
    }
}

/// Daily run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Schedule {
    /// Local wall-clock time of the daily tick.
    pub at: Time,

    /// Worker threads processing obligations within a tick.
    pub workers: usize,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            at: Time::constant(9, 0, 0, 0),
            workers: 1,
        }
    }
}

/// Email delivery through a sendmail-compatible command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EmailConfig {
    /// Program and arguments. The message is written to its stdin.
    #[serde(default = "default_email_command")]
    pub command: Vec<String>,

    /// `From` address.
    pub sender: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Messaging delivery through an HTTP webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MessagingConfig {
    /// Endpoint receiving `{"to": ..., "body": ...}` as JSON.
    pub webhook: String,

    /// Bearer token. Overridden by `DUNNING_MESSAGING_TOKEN`.
    #[serde(default)]
    pub token: Option<String>,

    /// Prefix for numbers written without an international code.
    #[serde(default = "default_country_code")]
    pub country_code: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Text woven into rendered notices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NoticeConfig {
    /// Sender organization, used in subjects and signatures.
    pub organization: Option<String>,

    /// How recipients can reach the organization.
    pub contact: Option<String>,

    /// Days after the due date when collection escalates, announced in overdue notices.
    pub escalation_days: Option<u16>,
}

fn default_email_command() -> Vec<String> {
    vec!["sendmail".to_string(), "-t".to_string()]
}

fn default_country_code() -> String {
    "54".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Load config, resolving the path through the chain described above.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, String> {
        let (path, required) = match explicit {
            Some(path) => (path, true),
            None => match env::var("DUNNING_CONFIG") {
                Ok(path) if !path.is_empty() => (PathBuf::from(path), true),
                _ => (
                    Self::default_path().ok_or("could not determine home directory")?,
                    false,
                ),
            },
        };

        let contents = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default().with_env());
            }
            Err(e) => return Err(format!("failed to read {}: {e}", path.display())),
        };

        let config = Self::parse(&contents)
            .map_err(|e| format!("invalid config at {}: {e}", path.display()))?;
        Ok(config.with_env())
    }

    /// Parse and validate config text.
    pub fn parse(contents: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(contents).map_err(|e| e.to_string())?;

        if config.schedule.workers == 0 {
            return Err("schedule.workers must be at least 1".to_string());
        }
        if let Some(email) = &config.email
            && email.command.is_empty()
        {
            return Err("email.command must name a program".to_string());
        }
        if let Some(messaging) = &config.messaging
            && messaging.webhook.is_empty()
        {
            return Err("messaging.webhook is empty".to_string());
        }

        Ok(config)
    }

    /// The root directory for Dunning's files: `~/.dunning/`.
    pub fn default_root() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".dunning"))
    }

    /// The config file path: `~/.dunning/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        Self::default_root().map(|r| r.join("config.toml"))
    }

    /// The ledger path, falling back to `~/.dunning/ledger.sqlite`.
    pub fn ledger_path(&self) -> Option<PathBuf> {
        self.ledger
            .clone()
            .or_else(|| Self::default_root().map(|r| r.join("ledger.sqlite")))
    }

    fn with_env(mut self) -> Self {
        if let Some(messaging) = &mut self.messaging
            && let Ok(token) = env::var("DUNNING_MESSAGING_TOKEN")
            && !token.is_empty()
        {
            messaging.token = Some(token);
        }
        self
    }
}
