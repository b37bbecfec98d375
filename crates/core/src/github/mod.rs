//! Remote repository API.
//!
//! [`RemoteApi`] is the only interface the rest of the crate uses to talk to
//! the hosting service. [`GitHubClient`] implements it over the GitHub REST
//! API; tests substitute an in-memory implementation.

pub mod client;
pub mod types;

use async_trait::async_trait;

use crate::errors::GitHubError;
use crate::models::{MergeMethod, TreeEntry};

pub use client::GitHubClient;
pub use types::{DeleteFileRequest, FileContents, GitCommit, NewCommit, NewPullRequest, PullRequest};

/// Operations consumed by the reconciler and the apply orchestrator.
///
/// `repo` is always `owner/name`.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Name of the repository's default branch.
    async fn get_default_branch(&self, repo: &str) -> Result<String, GitHubError>;

    /// SHA of the commit `refs/heads/<branch>` points at.
    async fn get_branch_sha(&self, repo: &str, branch: &str) -> Result<String, GitHubError>;

    async fn get_commit(&self, repo: &str, sha: &str) -> Result<GitCommit, GitHubError>;

    /// Create a tree and return its SHA. `base_tree = None` starts empty.
    async fn create_tree(
        &self,
        repo: &str,
        base_tree: Option<&str>,
        entries: &[TreeEntry],
    ) -> Result<String, GitHubError>;

    /// Create a commit object and return its SHA.
    async fn create_commit(&self, repo: &str, commit: &NewCommit) -> Result<String, GitHubError>;

    /// Create `ref_name` (fully qualified, `refs/heads/...`) at `sha`.
    async fn create_ref(&self, repo: &str, ref_name: &str, sha: &str) -> Result<(), GitHubError>;

    async fn delete_ref(&self, repo: &str, ref_name: &str) -> Result<(), GitHubError>;

    async fn create_pull_request(
        &self,
        repo: &str,
        pr: &NewPullRequest,
    ) -> Result<PullRequest, GitHubError>;

    async fn merge_pull_request(
        &self,
        repo: &str,
        number: u64,
        commit_message: &str,
        method: MergeMethod,
    ) -> Result<(), GitHubError>;

    /// Set the pull request's state to closed.
    async fn close_pull_request(&self, repo: &str, number: u64) -> Result<(), GitHubError>;

    /// Read a file. A missing file is [`GitHubError::NotFound`].
    async fn get_file_contents(
        &self,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<FileContents, GitHubError>;

    async fn delete_file(&self, repo: &str, request: &DeleteFileRequest)
        -> Result<(), GitHubError>;
}
