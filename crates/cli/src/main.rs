//! compsync command-line tool.
//!
//! Provides subcommands for mirroring a remote FTP directory of versioned
//! components into a local directory, pruning outdated component versions,
//! and generating / validating configuration files.

mod logging;
mod netprobe;
mod progress;
mod prompt;
mod signals;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::Confirm;
use tracing::{error, info};

use compsync_core::config::{CompsyncConfig, DenyListPolicy, LoggingConfig};
use compsync_core::errors::{ErrorClass, SyncError};
use compsync_core::reconciler::{SyncOutcome, SyncReconciler, SyncRequest};
use compsync_core::remote::{CancelFlag, CurlConnector};
use compsync_core::retention::RetentionResolver;

use crate::progress::SpinnerReporter;
use crate::prompt::ConsolePrompter;

/// Configuration file looked up when `--config` is not given.
const DEFAULT_CONFIG: &str = "compsync.toml";

const EXIT_PARTIAL: u8 = 1;
const EXIT_STRUCTURAL: u8 = 2;
const EXIT_CANCELLED: u8 = 130;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// compsync command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "compsync",
    version,
    about = "Mirror versioned components from an FTP server and prune old versions"
)]
struct Cli {
    /// Path to the TOML configuration file [default: ./compsync.toml, optional].
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download new components from a remote directory.
    Sync(SyncArgs),

    /// Move outdated component versions of a directory into its archive.
    Prune {
        /// Component directory.
        dir: PathBuf,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./compsync.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,
}

#[derive(Args, Debug)]
struct SyncArgs {
    /// Local component directory.
    local_dir: PathBuf,

    /// Directory on the remote server, e.g. /pub/UPDATES.
    remote_dir: String,

    /// Deny-list policy: auto, always or never [default: from config].
    #[arg(long, value_name = "POLICY")]
    deny_list: Option<DenyListPolicy>,

    /// Print the run outcome as JSON.
    #[arg(long)]
    json: bool,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            ExitCode::from(exit_code_for(&e))
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    if let Commands::Init { output } = &cli.command {
        let _guard = logging::init(&console_only())?;
        cmd_init(output)?;
        return Ok(0);
    }

    let config = logging::with_console(|| load_config(cli.config.as_deref()))?;
    let _guard = logging::init(&config.logging)?;

    let result = match cli.command {
        Commands::Sync(args) => cmd_sync(config, args).await,
        Commands::Prune { dir } => cmd_prune(&config, &dir).map(|()| 0),
        Commands::Validate => cmd_validate(&config).map(|()| 0),
        Commands::Init { .. } => Ok(0),
    };

    if let Err(e) = &result {
        error!(error = %format!("{:#}", e), "compsync failed");
    }
    result
}

/// Map a failed run onto the process exit code.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    let class = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<SyncError>())
        .map(SyncError::class);
    match class {
        Some(ErrorClass::Cancelled) => EXIT_CANCELLED,
        _ => EXIT_STRUCTURAL,
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: Option<&str>) -> Result<CompsyncConfig> {
    let explicit = path.is_some();
    let path = PathBuf::from(expand_tilde(path.unwrap_or(DEFAULT_CONFIG)));

    if explicit || path.exists() {
        return CompsyncConfig::load_and_resolve(&path)
            .with_context(|| format!("failed to load configuration from {}", path.display()));
    }

    info!(path = %path.display(), "no configuration file, using defaults");
    let mut config = CompsyncConfig::default();
    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    config.validate().context("configuration validation failed")?;
    Ok(config)
}

fn console_only() -> LoggingConfig {
    LoggingConfig {
        log_file: None,
        ..LoggingConfig::default()
    }
}

/// Expand a leading `~/` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}/{}", home.display(), rest);
        }
    }
    path.to_string()
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

async fn cmd_sync(mut config: CompsyncConfig, args: SyncArgs) -> Result<u8> {
    let policy = args.deny_list.unwrap_or(config.policy.deny_list);
    let deny_list_active = policy.is_active_with(|| {
        netprobe::deny_list_required(&config.remote.host, &config.policy.lan_prefix)
    });
    info!(%policy, deny_list_active, "deny-list policy resolved");

    config.policy.deny_list_file =
        PathBuf::from(expand_tilde(&config.policy.deny_list_file.to_string_lossy()));

    let request = SyncRequest {
        local_root: args.local_dir,
        remote_dir: args.remote_dir,
        deny_list_active,
    };
    let cancel = signals::setup_signal_handlers();

    let outcome = tokio::task::spawn_blocking(move || run_sync(&config, &request, cancel))
        .await
        .context("sync worker terminated unexpectedly")?
        .context("sync run failed")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("failed to serialize outcome")?
        );
    } else {
        print_summary(&outcome);
    }

    Ok(if outcome.is_success() { 0 } else { EXIT_PARTIAL })
}

fn run_sync(
    config: &CompsyncConfig,
    request: &SyncRequest,
    cancel: CancelFlag,
) -> Result<SyncOutcome, SyncError> {
    let connector = CurlConnector::new(&config.remote);
    let prompter = ConsolePrompter;
    let reporter = SpinnerReporter::new();
    let retention = RetentionResolver::new(config.layout.archive_dir.clone(), &prompter)
        .with_cancel(cancel.clone());

    SyncReconciler::new(
        &connector,
        &prompter,
        &config.layout,
        &config.policy,
        cancel,
    )
    .with_progress(&reporter)
    .with_hook(&retention)
    .run(request)
}

fn print_summary(outcome: &SyncOutcome) {
    let elapsed = outcome.completed_at - outcome.started_at;

    println!();
    println!("{}", style::header("Sync summary"));
    println!("  Remote dir  : {}", outcome.remote_dir);
    println!("  State       : {}", style::state(outcome.state));
    println!("  Copied      : {}", outcome.copied);
    println!("  Not copied  : {}", outcome.not_copied);
    if outcome.denied > 0 {
        println!("  Deny-listed : {}", outcome.denied);
    }
    println!("  Promoted    : {}", outcome.promoted);
    println!(
        "  Duration    : {}",
        style::dim(&format!("{}s", elapsed.num_seconds()))
    );

    match &outcome.verification {
        Some(report) if report.passed() => {
            println!("{}", style::success("Local directory matches the remote listing"));
        }
        Some(report) => {
            for name in &report.missing_locally {
                println!("{}", style::warn(&format!("{} is missing locally", name)));
            }
            for name in &report.extra_locally {
                println!("{}", style::warn(&format!("{} is not on the remote", name)));
            }
            for mismatch in &report.size_mismatches {
                println!(
                    "{}",
                    style::warn(&format!(
                        "{}: remote {} bytes, local {} bytes",
                        mismatch.name, mismatch.remote, mismatch.local
                    ))
                );
            }
        }
        None => println!("{}", style::warn("Verification skipped: remote sizes unavailable")),
    }
    println!();
}

fn cmd_prune(config: &CompsyncConfig, dir: &Path) -> Result<()> {
    let prompter = ConsolePrompter;
    let cancel = signals::setup_signal_handlers();
    let report = RetentionResolver::new(config.layout.archive_dir.clone(), &prompter)
        .with_cancel(cancel)
        .resolve(dir)
        .context("version retention failed")?;

    for name in &report.archived {
        println!("  {}", style::dim(name));
    }
    println!(
        "{}",
        style::success(&format!(
            "{} outdated file(s) moved to {}",
            report.archived_count(),
            dir.join(&config.layout.archive_dir).display()
        ))
    );
    Ok(())
}

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        let overwrite = Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", output.display()))
            .default(false)
            .interact()
            .context("failed to read confirmation")?;

        if !overwrite {
            println!(
                "{}",
                style::warn("Init cancelled. Existing file was not modified.")
            );
            return Ok(());
        }
    }

    std::fs::write(output, CompsyncConfig::default_template())
        .with_context(|| format!("failed to write config to {}", output.display()))?;

    println!(
        "{}",
        style::success(&format!("Default configuration written to {}", output.display()))
    );
    println!("Edit the file, then run `compsync validate` to check it.");
    Ok(())
}

fn cmd_validate(config: &CompsyncConfig) -> Result<()> {
    println!("{}", style::success("Configuration is valid"));
    println!();
    println!("Configuration summary:");
    println!("  FTP host      : {}", config.remote.host);
    println!("  FTP user      : {}", config.remote.user);
    println!(
        "  FTP password  : {}",
        if config.remote.password.is_some() {
            "set"
        } else {
            "not set"
        }
    );
    println!("  Transfer tool : {}", config.remote.curl_binary);
    println!("  Staging dir   : {}", config.layout.staging_dir);
    println!("  Archive dir   : {}", config.layout.archive_dir);
    println!(
        "  Deny-list     : {} ({})",
        config.policy.deny_list,
        config.policy.deny_list_file.display()
    );
    println!(
        "  Release batch : {} -> {}",
        config.policy.release_marker, config.policy.manifest_file
    );
    println!(
        "  Log file      : {}",
        config
            .logging
            .log_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "console only".into())
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_sync() {
        let cli = Cli::try_parse_from([
            "compsync",
            "--config",
            "/tmp/c.toml",
            "sync",
            "/data/components",
            "/pub/UPDATES",
            "--deny-list",
            "never",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some("/tmp/c.toml"));
        match cli.command {
            Commands::Sync(args) => {
                assert_eq!(args.local_dir, PathBuf::from("/data/components"));
                assert_eq!(args.remote_dir, "/pub/UPDATES");
                assert_eq!(args.deny_list, Some(DenyListPolicy::Never));
                assert!(args.json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_policy() {
        let result = Cli::try_parse_from(["compsync", "sync", "/d", "/r", "--deny-list", "sometimes"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_exit_code_classification() {
        let cancelled = anyhow::Error::new(SyncError::Cancelled).context("sync run failed");
        assert_eq!(exit_code_for(&cancelled), EXIT_CANCELLED);

        let structural = anyhow::Error::new(SyncError::NotADirectory(PathBuf::from("/x")))
            .context("sync run failed");
        assert_eq!(exit_code_for(&structural), EXIT_STRUCTURAL);

        assert_eq!(exit_code_for(&anyhow::anyhow!("bad config")), EXIT_STRUCTURAL);
    }

    #[test]
    fn test_missing_default_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("compsync.toml");
        // The test binary runs in the crate directory, which has no compsync.toml.
        let config = load_config(None).unwrap();
        assert_eq!(config.layout.staging_dir, "NEW");
        assert!(load_config(Some(absent.to_str().unwrap())).is_err());
    }

    #[test]
    fn test_expand_tilde_leaves_plain_paths() {
        assert_eq!(expand_tilde("/etc/compsync.toml"), "/etc/compsync.toml");
        assert_eq!(expand_tilde("compsync.toml"), "compsync.toml");
    }
}
