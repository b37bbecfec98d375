//! Request and response types for the GitHub REST API.

use serde::{Deserialize, Serialize};

use crate::models::CommitIdentity;

// ---------------------------------------------------------------------------
// Wire types (deserialized from GitHub)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RepositoryInfo {
    pub full_name: String,
    pub default_branch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GitReference {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub object: GitObject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GitObject {
    pub sha: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ShaOnly {
    pub sha: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RawGitCommit {
    pub sha: String,
    pub tree: ShaOnly,
    #[serde(default)]
    pub parents: Vec<ShaOnly>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RawContents {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    pub sha: String,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A commit as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommit {
    pub sha: String,
    pub tree_sha: String,
    pub parent_shas: Vec<String>,
    pub message: String,
}

impl From<RawGitCommit> for GitCommit {
    fn from(raw: RawGitCommit) -> Self {
        Self {
            sha: raw.sha,
            tree_sha: raw.tree.sha,
            parent_shas: raw.parents.into_iter().map(|p| p.sha).collect(),
            message: raw.message,
        }
    }
}

/// A commit ready to be submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommit {
    pub message: String,
    pub tree: String,
    pub parents: Vec<String>,
    pub author: CommitIdentity,
    /// RFC 3339, whole seconds, UTC.
    pub date: String,
    /// Detached armored signature, when signing is configured.
    pub signature: Option<String>,
}

/// Decoded file contents plus the blob SHA needed to delete or update it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContents {
    pub path: String,
    pub sha: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    /// Source branch name (without `refs/heads/`).
    pub head: String,
    pub base: String,
    pub body: String,
    pub maintainer_can_modify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub html_url: String,
    pub state: String,
}

/// Parameters for the contents API delete call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFileRequest {
    pub path: String,
    pub message: String,
    /// Blob SHA of the file being deleted.
    pub sha: String,
    /// Empty for the default branch.
    pub branch: String,
    pub committer: CommitIdentity,
}
