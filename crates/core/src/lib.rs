//! codeowners-sync core library.
//!
//! This crate provides the components for managing GitHub `CODEOWNERS` files
//! declaratively: the ruleset model and its text format, commit construction
//! and OpenPGP signing, pull-request-based apply with bounded retries, the
//! GitHub API client, and the reconciler that ties them together.

pub mod apply;
pub mod commit;
pub mod config;
pub mod diff_cache;
pub mod errors;
pub mod github;
pub mod manifest;
pub mod models;
pub mod reconciler;
pub mod ruleset;
pub mod signing;

// Re-exports for convenience.
pub use apply::{cancel_pair, ApplyOrchestrator, ApplyOutcome, CancelHandle, CancelSignal, RetryPolicy};
pub use commit::{CommitBuilder, CommitOptions, SigningKey};
pub use config::ProviderConfig;
pub use errors::CoreError;
pub use github::{GitHubClient, RemoteApi};
pub use manifest::Manifest;
pub use models::{CodeownersFile, FileId};
pub use reconciler::{Plan, PlanAction, Reconciler, ReconcilerSettings};
pub use ruleset::{Rule, Ruleset};
pub use signing::Signer;
