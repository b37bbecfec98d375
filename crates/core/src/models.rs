//! Domain model types shared by the reconciler, the commit builder and the
//! GitHub client.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::ManifestError;
use crate::ruleset::Ruleset;

/// Location of the managed file inside the repository.
pub const CODEOWNERS_PATH: &str = ".github/CODEOWNERS";

/// Git file mode for a regular, non-executable blob.
pub const BLOB_MODE: &str = "100644";

// ---------------------------------------------------------------------------
// File identity
// ---------------------------------------------------------------------------

/// Identity of one managed CODEOWNERS file: `owner/name:branch`.
///
/// An empty branch means "the repository's default branch".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId {
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub branch: String,
}

impl FileId {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            branch: branch.into(),
        }
    }

    /// `owner/name`, the form the GitHub client expects.
    pub fn repo(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Branch to pass as a `ref` on reads, `None` for the default branch.
    pub fn git_ref(&self) -> Option<&str> {
        if self.branch.is_empty() {
            None
        } else {
            Some(self.branch.as_str())
        }
    }

    pub fn with_branch(&self, branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.owner, self.name, self.branch)
    }
}

impl FromStr for FileId {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (owner, rest) = s
            .split_once('/')
            .ok_or_else(|| ManifestError::InvalidFileId(s.to_string()))?;
        let (name, branch) = rest.split_once(':').unwrap_or((rest, ""));
        if owner.is_empty() || name.is_empty() {
            return Err(ManifestError::InvalidFileId(s.to_string()));
        }
        Ok(Self::new(owner, name, branch))
    }
}

// ---------------------------------------------------------------------------
// CODEOWNERS file
// ---------------------------------------------------------------------------

/// Desired or observed state of one CODEOWNERS file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeownersFile {
    pub id: FileId,
    pub ruleset: Ruleset,
}

impl CodeownersFile {
    pub fn new(id: FileId, ruleset: Ruleset) -> Self {
        Self { id, ruleset }
    }
}

// ---------------------------------------------------------------------------
// Tree entries
// ---------------------------------------------------------------------------

/// One change to submit in a new tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub mode: String,
    pub kind: String,
    /// `None` deletes the path from the base tree.
    pub content: Option<String>,
}

impl TreeEntry {
    /// Regular file with inline content.
    pub fn blob(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: BLOB_MODE.to_string(),
            kind: "blob".to_string(),
            content: Some(content.into()),
        }
    }

    /// Tombstone that removes `path`.
    pub fn deletion(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: BLOB_MODE.to_string(),
            kind: "blob".to_string(),
            content: None,
        }
    }

    pub fn is_deletion(&self) -> bool {
        self.content.is_none()
    }
}

// ---------------------------------------------------------------------------
// Committer identity
// ---------------------------------------------------------------------------

/// Name and email used as both author and committer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

impl CommitIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Merge method
// ---------------------------------------------------------------------------

/// How the temporary pull request is merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MergeMethod {
    #[default]
    Merge,
    Squash,
    Rebase,
}

impl MergeMethod {
    /// Parse a selector, falling back to [`MergeMethod::Merge`] for anything
    /// unrecognised.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "merge" => Self::Merge,
            "squash" => Self::Squash,
            "rebase" => Self::Rebase,
            other => {
                warn!(method = other, "unknown merge method, using 'merge'");
                Self::Merge
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Squash => "squash",
            Self::Rebase => "rebase",
        }
    }
}

impl fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for MergeMethod {
    fn from(s: String) -> Self {
        Self::from_str_lossy(&s)
    }
}

impl From<MergeMethod> for String {
    fn from(m: MergeMethod) -> Self {
        m.as_str().to_string()
    }
}
