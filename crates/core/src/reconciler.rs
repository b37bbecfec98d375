//! Reconciliation of desired CODEOWNERS state against a repository.
//!
//! The reconciler is the lifecycle surface of a managed file: it reads the
//! current state, plans the difference, and drives the apply orchestrator to
//! create, update or delete `.github/CODEOWNERS`.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::apply::{ApplyOrchestrator, ApplyOutcome, CancelSignal, RetryPolicy};
use crate::commit::{format_commit_message, CommitOptions, SigningKey, DEFAULT_BRANCH_PREFIX};
use crate::config::ProviderConfig;
use crate::diff_cache::{fingerprint, rules_key, DiffCache, MemoryDiffCache};
use crate::errors::{ApplyError, CoreError, GitHubError};
use crate::github::{DeleteFileRequest, RemoteApi};
use crate::models::{CodeownersFile, CommitIdentity, FileId, MergeMethod, TreeEntry, CODEOWNERS_PATH};
use crate::ruleset::{Rule, Ruleset};

pub const CREATE_MESSAGE: &str = "Adding CODEOWNERS file";
pub const UPDATE_MESSAGE: &str = "Updating CODEOWNERS file";
pub const DELETE_MESSAGE: &str = "Deleting CODEOWNERS file";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Per-process settings applied to every write.
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub committer: CommitIdentity,
    pub message_prefix: String,
    pub signing_key: Option<SigningKey>,
    pub retry: RetryPolicy,
    pub merge_method: MergeMethod,
    pub branch_prefix: String,
    pub pr_body: String,
}

impl ReconcilerSettings {
    pub fn new(committer: CommitIdentity) -> Self {
        Self {
            committer,
            message_prefix: String::new(),
            signing_key: None,
            retry: RetryPolicy::default(),
            merge_method: MergeMethod::default(),
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
            pr_body: String::new(),
        }
    }

    /// Build settings from a resolved configuration.
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            committer: config.commit.identity(),
            message_prefix: config.commit.message_prefix.clone(),
            signing_key: config.commit.signing_key(),
            retry: config.merge.retry_policy(),
            merge_method: config.merge.method,
            branch_prefix: config.merge.branch_prefix.clone(),
            pr_body: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// What an apply would do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
    Create,
    Update,
    NoOp,
}

impl std::fmt::Display for PlanAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::NoOp => write!(f, "no-op"),
        }
    }
}

/// A single rule-level difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleChange {
    Added {
        rule: Rule,
    },
    Removed {
        rule: Rule,
    },
    OwnersChanged {
        pattern: String,
        before: Vec<String>,
        after: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub id: FileId,
    pub action: PlanAction,
    pub changes: Vec<RuleChange>,
    /// Unified diff of the compiled current and desired file.
    pub diff: String,
}

impl Plan {
    pub fn has_changes(&self) -> bool {
        self.action != PlanAction::NoOp
    }
}

/// Result of [`Reconciler::apply`].
#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub plan: Plan,
    /// `None` when nothing needed to change.
    pub outcome: Option<ApplyOutcome>,
    /// State read back after the write.
    pub state: Option<CodeownersFile>,
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Lifecycle operations for managed CODEOWNERS files.
pub struct Reconciler<R: RemoteApi + ?Sized> {
    remote: Arc<R>,
    cache: Arc<dyn DiffCache>,
    settings: ReconcilerSettings,
}

impl<R: RemoteApi + ?Sized> Reconciler<R> {
    pub fn new(remote: Arc<R>, settings: ReconcilerSettings) -> Self {
        Self::with_cache(remote, settings, Arc::new(MemoryDiffCache::new()))
    }

    pub fn with_cache(remote: Arc<R>, settings: ReconcilerSettings, cache: Arc<dyn DiffCache>) -> Self {
        Self {
            remote,
            cache,
            settings,
        }
    }

    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    /// Current state of the file, `None` if it does not exist.
    pub async fn read(&self, id: &FileId) -> Result<Option<CodeownersFile>, CoreError> {
        let repo = id.repo();
        match self
            .remote
            .get_file_contents(&repo, CODEOWNERS_PATH, id.git_ref())
            .await
        {
            Ok(contents) => {
                let ruleset = Ruleset::parse(&contents.content);
                debug!(file = %id, rules = ruleset.len(), "read CODEOWNERS");
                Ok(Some(CodeownersFile::new(id.clone(), ruleset)))
            }
            Err(e) if e.is_not_found() => {
                debug!(file = %id, "CODEOWNERS not found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Compare the desired file with what the repository holds.
    pub async fn plan(&self, desired: &CodeownersFile) -> Result<Plan, CoreError> {
        let current = self.read(&desired.id).await?;
        Ok(self.plan_against(current.as_ref(), desired))
    }

    fn plan_against(&self, current: Option<&CodeownersFile>, desired: &CodeownersFile) -> Plan {
        let empty = Ruleset::default();
        let current_rules = current.map(|c| &c.ruleset).unwrap_or(&empty);

        let action = match current {
            None => PlanAction::Create,
            Some(_) if self.rules_equal(&desired.id, current_rules, &desired.ruleset) => {
                PlanAction::NoOp
            }
            Some(_) => PlanAction::Update,
        };

        let (changes, diff) = if action == PlanAction::NoOp {
            (Vec::new(), String::new())
        } else {
            (
                rule_changes(current_rules, &desired.ruleset),
                text_diff(current_rules, &desired.ruleset),
            )
        };

        Plan {
            id: desired.id.clone(),
            action,
            changes,
            diff,
        }
    }

    fn rules_equal(&self, id: &FileId, current: &Ruleset, desired: &Ruleset) -> bool {
        let key = rules_key(&id.to_string());
        let fp = fingerprint(current.rules(), desired.rules());
        self.cache
            .get_or_compute(&key, fp, &mut || current.equal(desired))
    }

    /// Create or update the file so it matches `desired`.
    pub async fn apply(
        &self,
        desired: &CodeownersFile,
        cancel: Option<&CancelSignal>,
    ) -> Result<ApplyReport, CoreError> {
        let current = self.read(&desired.id).await?;
        let plan = self.plan_against(current.as_ref(), desired);

        let message = match plan.action {
            PlanAction::NoOp => {
                info!(file = %desired.id, "CODEOWNERS already up to date");
                return Ok(ApplyReport {
                    plan,
                    outcome: None,
                    state: current,
                });
            }
            PlanAction::Create => CREATE_MESSAGE,
            PlanAction::Update => UPDATE_MESSAGE,
        };

        let content = String::from_utf8_lossy(&desired.ruleset.compile()).into_owned();
        let options = self
            .commit_options(&desired.id, message)
            .with_entry(TreeEntry::blob(CODEOWNERS_PATH, content));

        let outcome = self.run(&options, cancel, &desired.id).await?;
        info!(
            file = %desired.id,
            action = %plan.action,
            pull_request = outcome.pull_request,
            commit = %outcome.commit_sha,
            "CODEOWNERS applied"
        );

        let state = self
            .read(&desired.id.with_branch(outcome.branch.clone()))
            .await?;

        Ok(ApplyReport {
            plan,
            outcome: Some(outcome),
            state,
        })
    }

    /// Remove the file through a pull request. Absent files are a no-op.
    pub async fn delete(
        &self,
        id: &FileId,
        cancel: Option<&CancelSignal>,
    ) -> Result<Option<ApplyOutcome>, CoreError> {
        if self.read(id).await?.is_none() {
            info!(file = %id, "CODEOWNERS already absent");
            return Ok(None);
        }

        let repo = id.repo();
        let branch = if id.branch.is_empty() {
            self.remote
                .get_default_branch(&repo)
                .await
                .map_err(|source| remote_step("resolve default branch", &repo, source))?
        } else {
            id.branch.clone()
        };
        let tip = self
            .remote
            .get_branch_sha(&repo, &branch)
            .await
            .map_err(|source| remote_step("resolve branch", &repo, source))?;
        let tip_commit = self
            .remote
            .get_commit(&repo, &tip)
            .await
            .map_err(|source| remote_step("get branch tip", &repo, source))?;

        let options = self
            .commit_options(id, DELETE_MESSAGE)
            .with_branch(branch)
            .with_base_tree(tip_commit.tree_sha)
            .with_entry(TreeEntry::deletion(CODEOWNERS_PATH));

        let outcome = self.run(&options, cancel, id).await?;
        info!(file = %id, pull_request = outcome.pull_request, "CODEOWNERS deleted");
        Ok(Some(outcome))
    }

    /// Remove the file with a single contents-API commit, bypassing the pull
    /// request. Only works on unprotected branches.
    pub async fn delete_direct(&self, id: &FileId) -> Result<bool, CoreError> {
        let repo = id.repo();
        let contents = match self
            .remote
            .get_file_contents(&repo, CODEOWNERS_PATH, id.git_ref())
            .await
        {
            Ok(c) => c,
            Err(e) if e.is_not_found() => {
                info!(file = %id, "CODEOWNERS already absent");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        let request = DeleteFileRequest {
            path: CODEOWNERS_PATH.to_string(),
            message: format_commit_message(&self.settings.message_prefix, DELETE_MESSAGE),
            sha: contents.sha,
            branch: id.branch.clone(),
            committer: self.settings.committer.clone(),
        };
        self.remote.delete_file(&repo, &request).await?;
        self.cache.invalidate(&rules_key(&id.to_string()));
        info!(file = %id, "CODEOWNERS deleted directly");
        Ok(true)
    }

    /// Read an existing file by its `owner/name:branch` identity.
    pub async fn import(&self, id: &str) -> Result<Option<CodeownersFile>, CoreError> {
        let id: FileId = id.parse()?;
        info!(file = %id, "importing CODEOWNERS");
        self.read(&id).await
    }

    fn commit_options(&self, id: &FileId, message: &str) -> CommitOptions {
        let s = &self.settings;
        let mut options = CommitOptions::new(
            id.repo(),
            format_commit_message(&s.message_prefix, message),
            s.committer.clone(),
        )
        .with_branch(id.branch.clone())
        .with_retry(s.retry)
        .with_merge_method(s.merge_method)
        .with_pr_body(s.pr_body.clone());
        options.signing_key = s.signing_key.clone();
        options.branch_prefix = s.branch_prefix.clone();
        options
    }

    async fn run(
        &self,
        options: &CommitOptions,
        cancel: Option<&CancelSignal>,
        id: &FileId,
    ) -> Result<ApplyOutcome, CoreError> {
        let result = ApplyOrchestrator::new(self.remote.as_ref())
            .apply(options, cancel)
            .await;
        // The merge may have landed even when a later step failed.
        self.cache.invalidate(&rules_key(&id.to_string()));
        Ok(result?)
    }
}

fn remote_step(step: &'static str, repo: &str, source: GitHubError) -> ApplyError {
    ApplyError::Remote {
        step,
        repo: repo.to_string(),
        source,
    }
}

// ---------------------------------------------------------------------------
// Diffing
// ---------------------------------------------------------------------------

/// Order-insensitive rule differences, in desired order followed by removals
/// in current order.
pub fn rule_changes(current: &Ruleset, desired: &Ruleset) -> Vec<RuleChange> {
    let canonical = |rule: &Rule| {
        let mut owners = rule.usernames.clone();
        owners.sort();
        (rule.pattern.clone(), owners)
    };

    let mut unmatched: Vec<(String, Vec<String>)> = current.iter().map(canonical).collect();
    let mut desired_only = Vec::new();
    for rule in desired {
        let key = canonical(rule);
        match unmatched.iter().position(|c| *c == key) {
            Some(i) => {
                unmatched.remove(i);
            }
            None => desired_only.push(key),
        }
    }

    let mut changes = Vec::new();
    for (pattern, owners) in desired_only {
        match unmatched.iter().position(|(p, _)| *p == pattern) {
            Some(i) => {
                let (_, before) = unmatched.remove(i);
                changes.push(RuleChange::OwnersChanged {
                    pattern,
                    before,
                    after: owners,
                });
            }
            None => changes.push(RuleChange::Added {
                rule: Rule {
                    pattern,
                    usernames: owners,
                },
            }),
        }
    }
    changes.extend(unmatched.into_iter().map(|(pattern, usernames)| RuleChange::Removed {
        rule: Rule { pattern, usernames },
    }));
    changes
}

/// Unified diff between the compiled forms of two rulesets.
pub fn text_diff(current: &Ruleset, desired: &Ruleset) -> String {
    let before = String::from_utf8_lossy(&current.compile()).into_owned();
    let after = String::from_utf8_lossy(&desired.compile()).into_owned();
    diffy::create_patch(&before, &after).to_string()
}
