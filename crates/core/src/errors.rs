//! Error types for the codeowners-sync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them for callers that want a single
//! error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

// ---------------------------------------------------------------------------
// GitHub API errors
// ---------------------------------------------------------------------------

/// Errors from GitHub REST API interactions.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// HTTP-level transport error (network, TLS, etc.).
    #[error("GitHub HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The requested object (repository, ref, file, ...) does not exist.
    #[error("GitHub resource not found: {0}")]
    NotFound(String),

    /// The API returned a non-success status code.
    #[error("GitHub API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    /// Authentication token is missing or invalid.
    #[error("GitHub authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Rate limit exceeded.
    #[error("GitHub rate limit exceeded, resets at {reset_at}")]
    RateLimited { reset_at: String },

    /// JSON deserialization failure.
    #[error("GitHub response parse error: {0}")]
    ParseError(String),

    /// File contents could not be decoded.
    #[error("failed to decode content of '{path}': {detail}")]
    ContentDecode { path: String, detail: String },
}

impl GitHubError {
    /// HTTP status code carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpError(e) => e.status().map(|s| s.as_u16()),
            Self::NotFound(_) => Some(404),
            Self::ApiError { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Whether the failure is a 5xx response or a network-level failure.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::HttpError(_) => true,
            Self::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

// ---------------------------------------------------------------------------
// Signing errors
// ---------------------------------------------------------------------------

/// Errors from OpenPGP commit signing.
#[derive(Debug, Error)]
pub enum SigningError {
    /// The armored key material could not be parsed.
    #[error("invalid GPG private key: {0}")]
    InvalidKey(String),

    /// The passphrase does not unlock the key (or one of its subkeys).
    #[error("failed to decrypt GPG private key: {0}")]
    DecryptionFailed(String),

    /// The signature could not be produced or armored.
    #[error("failed to sign commit payload: {0}")]
    SigningFailed(String),
}

// ---------------------------------------------------------------------------
// Apply errors
// ---------------------------------------------------------------------------

/// Errors from the commit / pull-request apply sequence.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// A remote call failed during one of the apply steps.
    #[error("{step} failed for {repo}: {source}")]
    Remote {
        step: &'static str,
        repo: String,
        #[source]
        source: GitHubError,
    },

    /// The signing key could not be used.
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// The pull request could not be merged within the retry budget.
    #[error("failed to merge pull request #{pull_request} after {attempts} attempt(s): {}", describe_merge_failure(.status, .message))]
    MergeFailed {
        pull_request: u64,
        attempts: u32,
        status: Option<u16>,
        message: String,
    },

    /// The caller cancelled the apply while the merge loop was running.
    #[error("apply cancelled while merging pull request #{pull_request}")]
    Cancelled { pull_request: u64 },
}

fn describe_merge_failure(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("HTTP {code}: {message}"),
        None => message.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A required environment variable is not set.
    #[error("required environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing { var: String, field: String },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Manifest errors
// ---------------------------------------------------------------------------

/// Errors from the desired-state manifest and file identities.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Manifest file not found.
    #[error("manifest file not found: {0}")]
    FileNotFound(String),

    /// TOML parse or serialization error.
    #[error("manifest parse error: {0}")]
    ParseError(String),

    /// A file identity string is malformed.
    #[error("invalid file id '{0}': expected '<owner>/<name>:<branch>'")]
    InvalidFileId(String),

    /// A manifest value is invalid.
    #[error("invalid manifest value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// The same file id appears more than once.
    #[error("file '{0}' is declared more than once")]
    DuplicateFile(String),

    /// Generic I/O error reading the manifest.
    #[error("manifest I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
