//! TOML-based provider configuration.
//!
//! Secrets (API token, signing key, passphrase) are never stored in the file.
//! The file names environment variables through `*_env` fields and the values
//! are resolved at runtime via [`ProviderConfig::resolve_env_vars`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::apply::RetryPolicy;
use crate::commit::{SigningKey, DEFAULT_BRANCH_PREFIX};
use crate::errors::ConfigError;
use crate::github::client::DEFAULT_API_URL;
use crate::models::{CommitIdentity, MergeMethod};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub github: GitHubConfig,

    pub commit: CommitConfig,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub log: LogConfig,
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

/// GitHub API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// API base URL (default `https://api.github.com`).
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Environment variable holding the access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.into()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".into()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token_env: default_token_env(),
            token: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// Identity and signing settings for the commits the tool creates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitConfig {
    /// Author and committer name.
    pub username: String,

    /// Author and committer email.
    pub email: String,

    /// Prepended (followed by a space) to every commit message.
    #[serde(default)]
    pub message_prefix: String,

    /// Environment variable holding an ASCII-armored secret key.
    #[serde(default)]
    pub gpg_key_env: Option<String>,

    /// Environment variable holding the key's passphrase.
    #[serde(default)]
    pub gpg_passphrase_env: Option<String>,

    #[serde(skip)]
    pub gpg_key: Option<String>,

    #[serde(skip)]
    pub gpg_passphrase: Option<String>,
}

impl CommitConfig {
    pub fn identity(&self) -> CommitIdentity {
        CommitIdentity::new(&self.username, &self.email)
    }

    /// Resolved signing key, if one is configured.
    pub fn signing_key(&self) -> Option<SigningKey> {
        self.gpg_key.as_ref().map(|key| {
            SigningKey::new(key.clone(), self.gpg_passphrase.clone().unwrap_or_default())
        })
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Shape of the delay between merge attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

/// Pull-request merge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// `merge`, `squash` or `rebase`; anything else means `merge`.
    #[serde(default)]
    pub method: MergeMethod,

    /// Merge attempts before giving up (0 means the default of 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Seconds between attempts (0 means the default of 5).
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,

    #[serde(default)]
    pub backoff: BackoffKind,

    /// Upper bound for exponential backoff.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Prefix of generated temporary branch names.
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
}

fn default_max_attempts() -> u32 {
    RetryPolicy::DEFAULT_ATTEMPTS
}
fn default_retry_backoff() -> u64 {
    RetryPolicy::DEFAULT_DELAY.as_secs()
}
fn default_max_backoff() -> u64 {
    60
}
fn default_branch_prefix() -> String {
    DEFAULT_BRANCH_PREFIX.into()
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            method: MergeMethod::default(),
            max_attempts: default_max_attempts(),
            retry_backoff_secs: default_retry_backoff(),
            backoff: BackoffKind::default(),
            max_backoff_secs: default_max_backoff(),
            branch_prefix: default_branch_prefix(),
        }
    }
}

impl MergeConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        let delay = Duration::from_secs(self.retry_backoff_secs);
        let policy = match self.backoff {
            BackoffKind::Fixed => RetryPolicy::fixed(self.max_attempts, delay),
            BackoffKind::Exponential => RetryPolicy::exponential(
                self.max_attempts,
                delay,
                Duration::from_secs(self.max_backoff_secs),
            ),
        };
        policy.normalized()
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

/// Starter configuration written by `codeowners-sync init`.
pub const EXAMPLE_CONFIG: &str = r#"[github]
api_url = "https://api.github.com"
token_env = "GITHUB_TOKEN"

[commit]
username = "codeowners-bot"
email = "codeowners-bot@example.com"
message_prefix = ""
# gpg_key_env = "GITHUB_GPG_KEY"
# gpg_passphrase_env = "GITHUB_GPG_PASSPHRASE"

[merge]
method = "merge"
max_attempts = 3
retry_backoff_secs = 5
branch_prefix = "codeowners-sync"

[log]
level = "info"
"#;

impl ProviderConfig {
    /// Load a [`ProviderConfig`] from a TOML file.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: ProviderConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve all `*_env` fields from the environment.
    ///
    /// Missing variables are logged and left as `None`; [`validate`](Self::validate)
    /// decides which of them are required.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");

        self.github.token = resolve_optional_env(&self.github.token_env, "github.token_env");

        if let Some(ref env_name) = self.commit.gpg_key_env {
            self.commit.gpg_key = resolve_optional_env(env_name, "commit.gpg_key_env");
        }
        if let Some(ref env_name) = self.commit.gpg_passphrase_env {
            self.commit.gpg_passphrase =
                resolve_optional_env(env_name, "commit.gpg_passphrase_env");
        }

        debug!("environment variable resolution complete");
        Ok(())
    }

    /// Validate that required values are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.github.api_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "github.api_url".into(),
                detail: "API URL must not be empty".into(),
            });
        }
        if self.github.token.is_none() {
            return Err(ConfigError::EnvVarMissing {
                var: self.github.token_env.clone(),
                field: "github.token_env".into(),
            });
        }
        if self.commit.username.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "commit.username".into(),
                detail: "commit username must not be empty".into(),
            });
        }
        if self.commit.email.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "commit.email".into(),
                detail: "commit email must not be empty".into(),
            });
        }
        if self.commit.gpg_passphrase_env.is_some() && self.commit.gpg_key_env.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "commit.gpg_passphrase_env".into(),
                detail: "a passphrase requires commit.gpg_key_env".into(),
            });
        }
        if let Some(ref env_name) = self.commit.gpg_key_env {
            if self.commit.gpg_key.is_none() {
                return Err(ConfigError::EnvVarMissing {
                    var: env_name.clone(),
                    field: "commit.gpg_key_env".into(),
                });
            }
        }
        if self.merge.branch_prefix.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "merge.branch_prefix".into(),
                detail: "temporary branch prefix must not be empty".into(),
            });
        }
        if self.merge.branch_prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidValue {
                field: "merge.branch_prefix".into(),
                detail: "temporary branch prefix must not contain whitespace".into(),
            });
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
