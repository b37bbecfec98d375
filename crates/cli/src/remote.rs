//! Subcommands that talk to GitHub.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use tokio::task::JoinSet;
use tracing::{info, warn};

use codeowners_sync_core::apply::cancel_pair;
use codeowners_sync_core::config::ProviderConfig;
use codeowners_sync_core::github::GitHubClient;
use codeowners_sync_core::manifest::{FileSpec, Manifest};
use codeowners_sync_core::models::FileId;
use codeowners_sync_core::reconciler::{Plan, PlanAction, Reconciler, ReconcilerSettings, RuleChange};

use crate::{load_config, load_manifest, style};

type GitHubReconciler = Reconciler<GitHubClient>;

fn build_reconciler(config: &ProviderConfig) -> Result<GitHubReconciler> {
    let token = config
        .github
        .token
        .clone()
        .context("GitHub token is not set")?;
    let client = GitHubClient::new(&config.github.api_url, token)
        .context("failed to create GitHub client")?;
    Ok(Reconciler::new(
        Arc::new(client),
        ReconcilerSettings::from_config(config),
    ))
}

// ---------------------------------------------------------------------------
// plan
// ---------------------------------------------------------------------------

pub async fn cmd_plan(config_path: &Path, manifest_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let files = load_manifest(manifest_path)?
        .expand()
        .context("manifest is invalid")?;
    let reconciler = build_reconciler(&config)?;

    let mut pending = 0;
    for file in &files {
        let plan = reconciler
            .plan(file)
            .await
            .with_context(|| format!("failed to plan {}", file.id))?;
        print_plan(&plan);
        if plan.has_changes() {
            pending += 1;
        }
    }

    println!();
    if pending == 0 {
        println!("{}", style::success("All CODEOWNERS files are up to date."));
    } else {
        println!(
            "{}",
            style::warn(&format!("{} of {} file(s) would change.", pending, files.len()))
        );
    }
    Ok(())
}

fn print_plan(plan: &Plan) {
    println!();
    let label = match plan.action {
        PlanAction::Create => style::success(&format!("{} will be created", plan.id)),
        PlanAction::Update => style::warn(&format!("{} will be updated", plan.id)),
        PlanAction::NoOp => style::dim(&format!("{} is up to date", plan.id)),
    };
    println!("{}", label);

    for change in &plan.changes {
        let line = match change {
            RuleChange::Added { rule } => format!("  + {}", rule),
            RuleChange::Removed { rule } => format!("  - {}", rule),
            RuleChange::OwnersChanged {
                pattern,
                before,
                after,
            } => format!(
                "  ~ {}: {} -> {}",
                pattern,
                owners(before),
                owners(after)
            ),
        };
        println!("{}", line);
    }

    if !plan.diff.is_empty() {
        println!();
        println!("{}", style::diff(&plan.diff));
    }
}

fn owners(names: &[String]) -> String {
    if names.is_empty() {
        return "(none)".to_string();
    }
    names
        .iter()
        .map(|n| format!("@{}", n))
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// apply
// ---------------------------------------------------------------------------

pub async fn cmd_apply(config_path: &Path, manifest_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let files = load_manifest(manifest_path)?
        .expand()
        .context("manifest is invalid")?;
    let reconciler = Arc::new(build_reconciler(&config)?);

    let (handle, signal) = cancel_pair();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling in-flight merges");
            handle.cancel();
        }
    });

    let mut tasks = JoinSet::new();
    for file in files {
        let reconciler = reconciler.clone();
        let signal = signal.clone();
        tasks.spawn(async move {
            let result = reconciler.apply(&file, Some(&signal)).await;
            (file.id, result)
        });
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["File", "Action", "Pull request", "Attempts", "Result"]);

    let mut failures = 0;
    while let Some(joined) = tasks.join_next().await {
        let (id, result) = joined.context("apply task panicked")?;
        match result {
            Ok(report) => {
                let (pr, attempts) = match &report.outcome {
                    Some(o) => (format!("#{}", o.pull_request), o.attempts.to_string()),
                    None => ("-".to_string(), "-".to_string()),
                };
                info!(file = %id, action = %report.plan.action, "apply finished");
                table.add_row(vec![
                    Cell::new(id.to_string()),
                    style::action_cell(report.plan.action),
                    Cell::new(pr),
                    Cell::new(attempts),
                    Cell::new("✓ ok").fg(Color::Green),
                ]);
            }
            Err(e) => {
                failures += 1;
                table.add_row(vec![
                    Cell::new(id.to_string()),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new(format!("✗ {}", e)).fg(Color::Red),
                ]);
            }
        }
    }
    ctrl_c.abort();

    println!();
    println!("{}", table);

    if failures > 0 {
        anyhow::bail!("{} file(s) failed to apply", failures);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// import / destroy
// ---------------------------------------------------------------------------

pub async fn cmd_import(
    config_path: &Path,
    manifest_path: &Path,
    id: &str,
    write: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let reconciler = build_reconciler(&config)?;

    let file = reconciler
        .import(id)
        .await
        .with_context(|| format!("failed to import {}", id))?
        .with_context(|| format!("{} has no CODEOWNERS file", id))?;

    let entry = Manifest {
        files: vec![FileSpec::flatten(&file)],
    };
    print!("{}", entry.to_toml_string()?);

    if write {
        let mut manifest = if manifest_path.exists() {
            load_manifest(manifest_path)?
        } else {
            Manifest::default()
        };
        manifest.upsert(&file);
        manifest
            .save(manifest_path)
            .with_context(|| format!("failed to write {}", manifest_path.display()))?;
        eprintln!(
            "{}",
            style::success(&format!("{} added to {}", file.id, manifest_path.display()))
        );
    }
    Ok(())
}

pub async fn cmd_destroy(config_path: &Path, id: &str, direct: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let reconciler = build_reconciler(&config)?;
    let id: FileId = id.parse()?;

    let deleted = if direct {
        reconciler
            .delete_direct(&id)
            .await
            .with_context(|| format!("failed to delete {}", id))?
    } else {
        let (handle, signal) = cancel_pair();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                handle.cancel();
            }
        });
        let outcome = reconciler
            .delete(&id, Some(&signal))
            .await
            .with_context(|| format!("failed to delete {}", id));
        ctrl_c.abort();
        match outcome? {
            Some(o) => {
                println!(
                    "{}",
                    style::dim(&format!("merged pull request #{} into {}", o.pull_request, o.branch))
                );
                true
            }
            None => false,
        }
    };

    if deleted {
        println!("{}", style::success(&format!("Deleted CODEOWNERS from {}", id)));
    } else {
        println!("{}", style::dim(&format!("{} has no CODEOWNERS file; nothing to do", id)));
    }
    Ok(())
}
