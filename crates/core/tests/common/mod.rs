//! In-memory `RemoteApi` used by the integration tests.
//!
//! Branches, commits and the single managed file are kept in a mutex-guarded
//! state. Merging a pull request copies the head commit's tree entries onto
//! the base branch, so a read after apply observes the new content.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use codeowners_sync_core::errors::GitHubError;
use codeowners_sync_core::github::{
    DeleteFileRequest, FileContents, GitCommit, NewCommit, NewPullRequest, PullRequest, RemoteApi,
};
use codeowners_sync_core::models::{MergeMethod, TreeEntry};

pub const REPO: &str = "acme/widgets";

#[derive(Debug, Default)]
pub struct FakeState {
    pub default_branch: String,
    /// branch -> commit sha
    pub branches: HashMap<String, String>,
    pub commits: HashMap<String, GitCommit>,
    /// tree sha -> (base tree, entries)
    pub trees: HashMap<String, (Option<String>, Vec<TreeEntry>)>,
    /// branch -> CODEOWNERS content
    pub files: HashMap<String, String>,
    /// temporary refs: full ref name -> commit sha
    pub refs: HashMap<String, String>,
    pub created_commits: Vec<NewCommit>,
    pub created_refs: Vec<String>,
    pub deleted_refs: Vec<String>,
    pub pull_requests: Vec<NewPullRequest>,
    pub merge_attempts: u32,
    pub merged: Vec<(u64, String, MergeMethod)>,
    pub closed: Vec<u64>,
    pub deleted_files: Vec<DeleteFileRequest>,
    /// Every trait method invoked, in order.
    pub calls: Vec<&'static str>,

    pub merge_failures: u32,
    pub merge_failure_status: u16,
    pub fail_delete_ref: bool,
    pub fail_close: bool,
    next_id: u64,
}

pub struct FakeRemote {
    state: Mutex<FakeState>,
}

impl FakeRemote {
    /// A repository whose default branch `main` points at commit `c0`.
    pub fn new() -> Self {
        let mut state = FakeState {
            default_branch: "main".into(),
            merge_failure_status: 405,
            ..FakeState::default()
        };
        state.branches.insert("main".into(), "c0".into());
        state.commits.insert(
            "c0".into(),
            GitCommit {
                sha: "c0".into(),
                tree_sha: "t0".into(),
                parent_shas: vec![],
                message: "initial".into(),
            },
        );
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn with_file(self, branch: &str, content: &str) -> Self {
        self.state().files.insert(branch.into(), content.into());
        self
    }

    pub fn with_branch(self, branch: &str) -> Self {
        {
            let mut s = self.state();
            let tip = s.branches["main"].clone();
            s.branches.insert(branch.into(), tip);
        }
        self
    }

    /// Fail the next `n` merge attempts with an API error.
    pub fn failing_merges(self, n: u32) -> Self {
        self.state().merge_failures = n;
        self
    }

    pub fn failing_ref_deletion(self) -> Self {
        self.state().fail_delete_ref = true;
        self
    }

    pub fn failing_close(self) -> Self {
        self.state().fail_close = true;
        self
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn file(&self, branch: &str) -> Option<String> {
        self.state().files.get(branch).cloned()
    }

    pub fn count(&self, call: &str) -> usize {
        self.state().calls.iter().filter(|c| **c == call).count()
    }

    /// True when no method that changes remote state was called.
    pub fn untouched(&self) -> bool {
        let s = self.state();
        s.created_commits.is_empty() && s.created_refs.is_empty() && s.pull_requests.is_empty()
    }
}

impl FakeState {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}{}", prefix, self.next_id)
    }

    fn check_repo(&self, repo: &str) -> Result<(), GitHubError> {
        if repo == REPO {
            Ok(())
        } else {
            Err(GitHubError::NotFound(format!("repos/{}", repo)))
        }
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn get_default_branch(&self, repo: &str) -> Result<String, GitHubError> {
        let mut s = self.state();
        s.calls.push("get_default_branch");
        s.check_repo(repo)?;
        Ok(s.default_branch.clone())
    }

    async fn get_branch_sha(&self, repo: &str, branch: &str) -> Result<String, GitHubError> {
        let mut s = self.state();
        s.calls.push("get_branch_sha");
        s.check_repo(repo)?;
        s.branches
            .get(branch)
            .cloned()
            .ok_or_else(|| GitHubError::NotFound(format!("heads/{}", branch)))
    }

    async fn get_commit(&self, repo: &str, sha: &str) -> Result<GitCommit, GitHubError> {
        let mut s = self.state();
        s.calls.push("get_commit");
        s.check_repo(repo)?;
        s.commits
            .get(sha)
            .cloned()
            .ok_or_else(|| GitHubError::NotFound(format!("commits/{}", sha)))
    }

    async fn create_tree(
        &self,
        repo: &str,
        base_tree: Option<&str>,
        entries: &[TreeEntry],
    ) -> Result<String, GitHubError> {
        let mut s = self.state();
        s.calls.push("create_tree");
        s.check_repo(repo)?;
        let sha = s.next("t");
        s.trees
            .insert(sha.clone(), (base_tree.map(str::to_string), entries.to_vec()));
        Ok(sha)
    }

    async fn create_commit(&self, repo: &str, commit: &NewCommit) -> Result<String, GitHubError> {
        let mut s = self.state();
        s.calls.push("create_commit");
        s.check_repo(repo)?;
        let sha = s.next("c");
        s.commits.insert(
            sha.clone(),
            GitCommit {
                sha: sha.clone(),
                tree_sha: commit.tree.clone(),
                parent_shas: commit.parents.clone(),
                message: commit.message.clone(),
            },
        );
        s.created_commits.push(commit.clone());
        Ok(sha)
    }

    async fn create_ref(&self, repo: &str, ref_name: &str, sha: &str) -> Result<(), GitHubError> {
        let mut s = self.state();
        s.calls.push("create_ref");
        s.check_repo(repo)?;
        s.refs.insert(ref_name.into(), sha.into());
        s.created_refs.push(ref_name.into());
        Ok(())
    }

    async fn delete_ref(&self, repo: &str, ref_name: &str) -> Result<(), GitHubError> {
        let mut s = self.state();
        s.calls.push("delete_ref");
        s.check_repo(repo)?;
        if s.fail_delete_ref {
            return Err(GitHubError::ApiError {
                status: 422,
                body: "Reference does not exist".into(),
            });
        }
        s.refs.remove(ref_name);
        s.deleted_refs.push(ref_name.into());
        Ok(())
    }

    async fn create_pull_request(
        &self,
        repo: &str,
        pr: &NewPullRequest,
    ) -> Result<PullRequest, GitHubError> {
        let mut s = self.state();
        s.calls.push("create_pull_request");
        s.check_repo(repo)?;
        s.pull_requests.push(pr.clone());
        let number = s.pull_requests.len() as u64;
        Ok(PullRequest {
            number,
            html_url: format!("https://github.com/{}/pull/{}", repo, number),
            state: "open".into(),
        })
    }

    async fn merge_pull_request(
        &self,
        repo: &str,
        number: u64,
        commit_message: &str,
        method: MergeMethod,
    ) -> Result<(), GitHubError> {
        let mut s = self.state();
        s.calls.push("merge_pull_request");
        s.check_repo(repo)?;
        s.merge_attempts += 1;
        if s.merge_failures > 0 {
            s.merge_failures -= 1;
            return Err(GitHubError::ApiError {
                status: s.merge_failure_status,
                body: "Base branch was modified. Review and try the merge again.".into(),
            });
        }

        let pr = s.pull_requests[(number - 1) as usize].clone();
        let head_sha = s.refs[&format!("refs/heads/{}", pr.head)].clone();
        let tree_sha = s.commits[&head_sha].tree_sha.clone();
        let (_, entries) = s.trees[&tree_sha].clone();
        for entry in entries {
            match entry.content {
                Some(content) => {
                    s.files.insert(pr.base.clone(), content);
                }
                None => {
                    s.files.remove(&pr.base);
                }
            }
        }
        s.branches.insert(pr.base.clone(), head_sha);
        s.merged.push((number, commit_message.to_string(), method));
        Ok(())
    }

    async fn close_pull_request(&self, repo: &str, number: u64) -> Result<(), GitHubError> {
        let mut s = self.state();
        s.calls.push("close_pull_request");
        s.check_repo(repo)?;
        if s.fail_close {
            return Err(GitHubError::ApiError {
                status: 500,
                body: "Server Error".into(),
            });
        }
        s.closed.push(number);
        Ok(())
    }

    async fn get_file_contents(
        &self,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<FileContents, GitHubError> {
        let mut s = self.state();
        s.calls.push("get_file_contents");
        s.check_repo(repo)?;
        let branch = git_ref.map(str::to_string).unwrap_or_else(|| s.default_branch.clone());
        match s.files.get(&branch) {
            Some(content) => Ok(FileContents {
                path: path.to_string(),
                sha: format!("blob-{}", branch),
                content: content.clone(),
            }),
            None => Err(GitHubError::NotFound(format!("contents/{}", path))),
        }
    }

    async fn delete_file(
        &self,
        repo: &str,
        request: &DeleteFileRequest,
    ) -> Result<(), GitHubError> {
        let mut s = self.state();
        s.calls.push("delete_file");
        s.check_repo(repo)?;
        let branch = if request.branch.is_empty() {
            s.default_branch.clone()
        } else {
            request.branch.clone()
        };
        s.files.remove(&branch);
        s.deleted_files.push(request.clone());
        Ok(())
    }
}
