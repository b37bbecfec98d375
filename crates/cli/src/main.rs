//! codeowners-sync command-line tool.
//!
//! Reconciles the CODEOWNERS files declared in a manifest against GitHub,
//! and offers offline helpers for validating, compiling and parsing files.

mod remote;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tracing_subscriber::EnvFilter;

use codeowners_sync_core::config::{ProviderConfig, EXAMPLE_CONFIG};
use codeowners_sync_core::manifest::{Manifest, EXAMPLE_MANIFEST};
use codeowners_sync_core::ruleset::Ruleset;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Declarative management of GitHub CODEOWNERS files.
#[derive(Parser, Debug)]
#[command(
    name = "codeowners-sync",
    version,
    about = "Keep GitHub CODEOWNERS files in line with a declarative manifest"
)]
struct Cli {
    /// Path to the provider configuration file.
    #[arg(short, long, global = true, default_value = "codeowners-sync.toml")]
    config: PathBuf,

    /// Path to the desired-state manifest.
    #[arg(short, long, global = true, default_value = "codeowners.toml")]
    manifest: PathBuf,

    /// Log level filter (overrides `log.level` from the config file).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a starter configuration and manifest.
    Init,

    /// Validate the configuration and the manifest.
    Validate,

    /// Print the CODEOWNERS text each manifest entry compiles to.
    Compile,

    /// Parse a local CODEOWNERS file and show its rules.
    Parse {
        /// Path to the CODEOWNERS file.
        file: PathBuf,
    },

    /// Show what `apply` would change.
    Plan,

    /// Create or update every file in the manifest.
    Apply,

    /// Read an existing file and print it as a manifest entry.
    Import {
        /// File identity: `<owner>/<name>:<branch>` (empty branch = default).
        id: String,

        /// Also add the entry to the manifest file.
        #[arg(long)]
        write: bool,
    },

    /// Delete a managed CODEOWNERS file.
    Destroy {
        /// File identity: `<owner>/<name>:<branch>`.
        id: String,

        /// Commit directly through the contents API instead of a pull request.
        #[arg(long)]
        direct: bool,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = cli
        .log_level
        .clone()
        .or_else(|| {
            ProviderConfig::load_from_file(&cli.config)
                .ok()
                .map(|c| c.log.level)
        })
        .unwrap_or_else(|| "warn".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_target(false)
        .without_time()
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init => cmd_init(&cli.config, &cli.manifest),
        Commands::Validate => cmd_validate(&cli.config, &cli.manifest),
        Commands::Compile => cmd_compile(&cli.manifest),
        Commands::Parse { file } => cmd_parse(&file),
        Commands::Plan => remote::cmd_plan(&cli.config, &cli.manifest).await,
        Commands::Apply => remote::cmd_apply(&cli.config, &cli.manifest).await,
        Commands::Import { id, write } => {
            remote::cmd_import(&cli.config, &cli.manifest, &id, write).await
        }
        Commands::Destroy { id, direct } => remote::cmd_destroy(&cli.config, &id, direct).await,
    }
}

// ---------------------------------------------------------------------------
// Loading helpers
// ---------------------------------------------------------------------------

pub(crate) fn load_config(path: &Path) -> Result<ProviderConfig> {
    ProviderConfig::load_and_resolve(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

pub(crate) fn load_manifest(path: &Path) -> Result<Manifest> {
    Manifest::load_from_file(path)
        .with_context(|| format!("failed to load manifest from {}", path.display()))
}

// ---------------------------------------------------------------------------
// Offline subcommands
// ---------------------------------------------------------------------------

fn cmd_init(config: &Path, manifest: &Path) -> Result<()> {
    for path in [config, manifest] {
        if path.exists() {
            anyhow::bail!(
                "file already exists: {}. Use a different path or remove the existing file.",
                path.display()
            );
        }
    }

    std::fs::write(config, EXAMPLE_CONFIG).context("failed to write config file")?;
    std::fs::write(manifest, EXAMPLE_MANIFEST).context("failed to write manifest file")?;

    println!("{}", style::success(&format!("Configuration written to {}", config.display())));
    println!("{}", style::success(&format!("Manifest written to {}", manifest.display())));
    println!();
    println!("Next steps:");
    println!("  1. Edit the manifest with the repositories and rules to manage");
    println!("  2. Export the token variable named in the config (GITHUB_TOKEN by default)");
    println!("  3. Review the changes with: codeowners-sync plan");
    println!("  4. Apply them with: codeowners-sync apply");

    Ok(())
}

fn cmd_validate(config_path: &Path, manifest_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());

    let mut config =
        ProviderConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  {}", style::success("TOML structure is valid"));

    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    println!("  {}", style::success("Environment variable references processed"));

    let config_ok = match config.validate() {
        Ok(()) => {
            println!("  {}", style::success("All required fields are valid"));
            true
        }
        Err(e) => {
            println!("  {}", style::error(&format!("Validation error: {}", e)));
            false
        }
    };

    println!();
    println!("Validating manifest: {}", manifest_path.display());
    let manifest = Manifest::load_from_file(manifest_path).context("failed to parse manifest")?;
    let manifest_ok = match manifest.validate() {
        Ok(()) => {
            println!(
                "  {}",
                style::success(&format!("{} file(s) declared", manifest.files.len()))
            );
            true
        }
        Err(e) => {
            println!("  {}", style::error(&format!("Validation error: {}", e)));
            false
        }
    };

    println!();
    println!("{}", style::header("Configuration summary"));
    println!("  API URL       : {}", config.github.api_url);
    println!(
        "  Token         : {}",
        if config.github.token.is_some() { "set" } else { "NOT SET" }
    );
    println!(
        "  Committer     : {} <{}>",
        config.commit.username, config.commit.email
    );
    println!(
        "  Signing key   : {}",
        if config.commit.gpg_key.is_some() { "set" } else { "not set" }
    );
    println!("  Merge method  : {}", config.merge.method);
    println!(
        "  Merge retries : {} every {}s",
        config.merge.max_attempts, config.merge.retry_backoff_secs
    );

    if !(config_ok && manifest_ok) {
        anyhow::bail!("validation failed");
    }
    println!();
    println!("{}", style::success("Configuration and manifest are valid."));
    Ok(())
}

fn cmd_compile(manifest_path: &Path) -> Result<()> {
    let manifest = load_manifest(manifest_path)?;
    let files = manifest.expand().context("manifest is invalid")?;

    for (i, file) in files.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}", style::dim(&format!("# {}", file.id)));
        print!("{}", String::from_utf8_lossy(&file.ruleset.compile()));
    }
    Ok(())
}

fn cmd_parse(path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let ruleset = Ruleset::parse(&text);

    if ruleset.is_empty() {
        println!("{}", style::warn("No rules found."));
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["#", "Pattern", "Owners"]);
    for (i, rule) in ruleset.iter().enumerate() {
        let owners = if rule.usernames.is_empty() {
            style::dim("(none)")
        } else {
            rule.usernames
                .iter()
                .map(|u| format!("@{}", u))
                .collect::<Vec<_>>()
                .join(" ")
        };
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&rule.pattern),
            Cell::new(owners),
        ]);
    }

    println!("{}", table);
    println!("{}", style::dim(&format!("{} rule(s)", ruleset.len())));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["codeowners-sync", "destroy", "acme/widgets:main", "--direct"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Destroy { ref id, direct: true } if id == "acme/widgets:main"
        ));
        assert_eq!(cli.config, PathBuf::from("codeowners-sync.toml"));
        assert_eq!(cli.manifest, PathBuf::from("codeowners.toml"));

        let cli = Cli::try_parse_from([
            "codeowners-sync",
            "plan",
            "--config",
            "other.toml",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Plan));
        assert_eq!(cli.config, PathBuf::from("other.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_init_writes_starter_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("codeowners-sync.toml");
        let manifest = dir.path().join("codeowners.toml");

        cmd_init(&config, &manifest).unwrap();
        assert!(ProviderConfig::load_from_file(&config).is_ok());
        assert!(load_manifest(&manifest).unwrap().validate().is_ok());

        // Refuses to overwrite.
        assert!(cmd_init(&config, &manifest).is_err());
    }

    #[test]
    fn test_compile_and_parse_local_files() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("codeowners.toml");
        std::fs::write(&manifest, EXAMPLE_MANIFEST).unwrap();
        cmd_compile(&manifest).unwrap();

        let file = dir.path().join("CODEOWNERS");
        std::fs::write(&file, "# comment\n* @a @b\n").unwrap();
        cmd_parse(&file).unwrap();
        assert!(cmd_parse(&dir.path().join("missing")).is_err());
    }
}
