//! Apply orchestration: publish a commit through a temporary pull request.
//!
//! The sequence is strictly ordered:
//!
//! 1. resolve the working branch and its tip;
//! 2. build (and optionally sign) the commit;
//! 3. point a temporary `refs/heads/<name>` at it;
//! 4. open a pull request from the temporary branch into the working branch;
//! 5. try to merge it up to `max_attempts` times.
//!
//! On success the temporary branch is removed. When the retry budget is spent
//! (or the caller cancels) the pull request is closed and the temporary branch
//! is left in place.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::commit::{remote, CommitBuilder, CommitOptions};
use crate::errors::{ApplyError, GitHubError};
use crate::github::{NewPullRequest, RemoteApi};

const BRANCH_REF_PREFIX: &str = "refs/heads/";

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Delay between merge attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// Doubles after every failed attempt, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

/// Bounded retry budget for the merge step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const DEFAULT_ATTEMPTS: u32 = 3;
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(5);

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    pub fn exponential(max_attempts: u32, initial: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential { initial, max },
        }
    }

    /// Replace unset values: zero attempts becomes 3, a zero delay 5 seconds.
    pub fn normalized(self) -> Self {
        let max_attempts = if self.max_attempts == 0 {
            Self::DEFAULT_ATTEMPTS
        } else {
            self.max_attempts
        };
        let backoff = match self.backoff {
            Backoff::Fixed(d) if d.is_zero() => Backoff::Fixed(Self::DEFAULT_DELAY),
            Backoff::Exponential { initial, max } => {
                let initial = if initial.is_zero() {
                    Self::DEFAULT_DELAY
                } else {
                    initial
                };
                Backoff::Exponential {
                    initial,
                    max: max.max(initial),
                }
            }
            fixed => fixed,
        };
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Delay after the `failed_attempt`-th failure (1-based).
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(d) => d,
            Backoff::Exponential { initial, max } => {
                let shift = failed_attempt.saturating_sub(1).min(16);
                initial.saturating_mul(1u32 << shift).min(max)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Self::DEFAULT_ATTEMPTS, Self::DEFAULT_DELAY)
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Fires a [`CancelSignal`].
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Observed by the merge loop between attempts and during backoff.
#[derive(Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Create a linked handle/signal pair.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelSignal { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Never resolves if the handle
    /// is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Result of a successful apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Working branch the pull request was merged into.
    pub branch: String,
    pub commit_sha: String,
    pub pull_request: u64,
    /// Merge attempts used, including the successful one.
    pub attempts: u32,
}

/// Runs the commit / pull-request / merge sequence against a [`RemoteApi`].
pub struct ApplyOrchestrator<'a, R: RemoteApi + ?Sized> {
    remote: &'a R,
}

impl<'a, R: RemoteApi + ?Sized> ApplyOrchestrator<'a, R> {
    pub fn new(remote: &'a R) -> Self {
        Self { remote }
    }

    pub async fn apply(
        &self,
        options: &CommitOptions,
        cancel: Option<&CancelSignal>,
    ) -> Result<ApplyOutcome, ApplyError> {
        let repo = options.repo.as_str();

        // Key problems must surface before anything is written remotely.
        let signer = options.load_signer()?;
        let retry = options.retry.normalized();

        let branch = if options.branch.is_empty() {
            let b = self
                .remote
                .get_default_branch(repo)
                .await
                .map_err(|source| remote("resolve default branch", repo, source))?;
            debug!(repo, branch = %b, "using default branch");
            b
        } else {
            options.branch.clone()
        };

        let tip = self
            .remote
            .get_branch_sha(repo, &branch)
            .await
            .map_err(|source| remote("resolve branch", repo, source))?;
        info!(repo, branch = %branch, tip = %tip, "resolved working branch");

        let commit_sha = CommitBuilder::new(self.remote, signer.as_ref())
            .build(options, &tip)
            .await?;

        let temp_branch = temporary_branch_name(options);
        let temp_ref = format!("{}{}", BRANCH_REF_PREFIX, temp_branch);
        self.remote
            .create_ref(repo, &temp_ref, &commit_sha)
            .await
            .map_err(|source| remote("create temporary branch", repo, source))?;
        info!(repo, temp_ref = %temp_ref, commit = %commit_sha, "temporary branch created");

        let pr = self
            .remote
            .create_pull_request(
                repo,
                &NewPullRequest {
                    title: options.message.clone(),
                    head: temp_branch.clone(),
                    base: branch.clone(),
                    body: options.pr_body.clone(),
                    maintainer_can_modify: false,
                },
            )
            .await
            .map_err(|source| remote("create pull request", repo, source))?;
        info!(repo, number = pr.number, url = %pr.html_url, "pull request opened");

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            if cancel.is_some_and(CancelSignal::is_cancelled) {
                self.abandon(repo, pr.number).await;
                return Err(ApplyError::Cancelled {
                    pull_request: pr.number,
                });
            }

            let err = match self
                .remote
                .merge_pull_request(repo, pr.number, &options.message, options.merge_method)
                .await
            {
                Ok(()) => {
                    info!(repo, number = pr.number, attempt, "pull request merged");
                    if let Err(e) = self.remote.delete_ref(repo, &temp_ref).await {
                        warn!(repo, temp_ref = %temp_ref, error = %e, "failed to delete temporary branch");
                    }
                    return Ok(ApplyOutcome {
                        branch,
                        commit_sha,
                        pull_request: pr.number,
                        attempts: attempt,
                    });
                }
                Err(e) => e,
            };

            if attempt >= retry.max_attempts {
                warn!(
                    repo,
                    number = pr.number,
                    attempts = attempt,
                    error = %err,
                    "giving up on merge"
                );
                self.abandon(repo, pr.number).await;
                return Err(ApplyError::MergeFailed {
                    pull_request: pr.number,
                    attempts: attempt,
                    status: err.status(),
                    message: merge_error_message(&err),
                });
            }

            let delay = retry.delay_for(attempt);
            warn!(
                repo,
                number = pr.number,
                attempt,
                max_attempts = retry.max_attempts,
                delay_ms = delay.as_millis() as u64,
                transient = err.is_transient(),
                error = %err,
                "merge failed, retrying"
            );

            match cancel {
                Some(signal) => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = signal.cancelled() => {
                            info!(repo, number = pr.number, "cancelled during backoff");
                            self.abandon(repo, pr.number).await;
                            return Err(ApplyError::Cancelled { pull_request: pr.number });
                        }
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }
    }

    /// Close the pull request, logging instead of failing.
    async fn abandon(&self, repo: &str, number: u64) {
        match self.remote.close_pull_request(repo, number).await {
            Ok(()) => info!(repo, number, "pull request closed"),
            Err(e) => warn!(repo, number, error = %e, "failed to close pull request"),
        }
    }
}

fn temporary_branch_name(options: &CommitOptions) -> String {
    match options.pr_branch.as_deref() {
        Some(name) if !name.is_empty() => name
            .strip_prefix(BRANCH_REF_PREFIX)
            .unwrap_or(name)
            .to_string(),
        _ => {
            let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
            format!("{}-{}", options.branch_prefix, nanos)
        }
    }
}

fn merge_error_message(err: &GitHubError) -> String {
    match err {
        GitHubError::ApiError { body, .. } => body.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CommitIdentity;

    #[test]
    fn test_policy_normalization() {
        let p = RetryPolicy::fixed(0, Duration::ZERO).normalized();
        assert_eq!(p.max_attempts, 3);
        assert_eq!(p.backoff, Backoff::Fixed(Duration::from_secs(5)));

        let p = RetryPolicy::fixed(7, Duration::from_millis(250)).normalized();
        assert_eq!(p, RetryPolicy::fixed(7, Duration::from_millis(250)));
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let p = RetryPolicy::exponential(5, Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(p.delay_for(1), Duration::from_secs(1));
        assert_eq!(p.delay_for(2), Duration::from_secs(2));
        assert_eq!(p.delay_for(3), Duration::from_secs(4));
        assert_eq!(p.delay_for(4), Duration::from_secs(5));
        assert_eq!(p.delay_for(40), Duration::from_secs(5));
    }

    #[test]
    fn test_exponential_normalization() {
        let p = RetryPolicy::exponential(0, Duration::ZERO, Duration::from_secs(1)).normalized();
        assert_eq!(p.max_attempts, 3);
        assert_eq!(
            p.backoff,
            Backoff::Exponential {
                initial: Duration::from_secs(5),
                max: Duration::from_secs(5),
            }
        );
    }

    #[test]
    fn test_temporary_branch_name() {
        let opts = CommitOptions::new("acme/widgets", "m", CommitIdentity::new("b", "e"));
        let name = temporary_branch_name(&opts);
        assert!(name.starts_with("codeowners-sync-"));
        assert!(name["codeowners-sync-".len()..].parse::<i64>().is_ok());

        let opts = opts.with_pr_branch("refs/heads/update-owners");
        assert_eq!(temporary_branch_name(&opts), "update-owners");
    }

    #[test]
    fn test_merge_error_message_uses_body() {
        let err = GitHubError::ApiError {
            status: 405,
            body: "Base branch was modified".into(),
        };
        assert_eq!(merge_error_message(&err), "Base branch was modified");
    }

    #[tokio::test]
    async fn test_cancel_signal() {
        let (handle, signal) = cancel_pair();
        let late = handle.signal();
        assert!(!signal.is_cancelled());
        handle.cancel();
        assert!(signal.is_cancelled());
        assert!(late.is_cancelled());
        signal.cancelled().await;
    }
}
