//! getenvoy - fetch, run and supervise Envoy builds
//!
//! ## Commands
//!
//! - `versions`: List builds available for this platform
//! - `fetch`: Download a build into the local store
//! - `run`: Launch a build, capture diagnostics and archive the run

use anyhow::{Context, Result};
use binary_store::{BinaryStore, FsBinaryStore};
use clap::{Args, Parser, Subcommand};
use envoy_manifest::{current_platform, fetch_manifest, print_versions, VersionKey};
use getenvoy_core::{
    ArchiveOutcome, DebugOptions, GlobalOptions, RunReport, Runtime, Signal, SignalError,
};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "getenvoy")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fetch, run and supervise Envoy builds", long_about = None)]
struct Cli {
    /// Directory holding fetched builds and run output (default: ~/.getenvoy)
    #[arg(long, global = true)]
    home_dir: Option<PathBuf>,

    /// Manifest location, http(s):// or file://
    #[arg(long, global = true)]
    manifest: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List Envoy builds available for this platform
    Versions,

    /// Download a build, e.g. `standard:1.11.0`
    Fetch {
        /// Build reference `flavor:version[/platform]`
        reference: String,
    },

    /// Run a build under supervision
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Build reference `flavor:version[/platform]`
    reference: String,

    /// Working directory (default: <home>/debug/<timestamp>)
    #[arg(long)]
    working_dir: Option<PathBuf>,

    /// Use this envoy binary instead of the stored build
    #[arg(long)]
    envoy_path: Option<PathBuf>,

    /// Admin API address, host:port
    #[arg(long, default_value = getenvoy_core::options::DEFAULT_ADMIN_ADDRESS)]
    admin_address: String,

    /// Snapshot admin API endpoints into the debug store
    #[arg(long)]
    debug_admin: bool,

    /// Capture envoy stdout/stderr into the debug store
    #[arg(long)]
    debug_logs: bool,

    /// Keep the working directory as-is instead of archiving it
    #[arg(long)]
    no_archive: bool,

    /// Arguments passed through to envoy
    #[arg(last = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    getenvoy_core::init_tracing(cli.json, level);

    let globals = GlobalOptions::resolve(cli.home_dir, cli.manifest);

    match cli.command {
        Commands::Versions => {
            cmd_versions(&globals, &mut std::io::stdout().lock()).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Fetch { reference } => {
            cmd_fetch(&globals, &reference).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run(args) => cmd_run(&globals, args).await,
    }
}

async fn cmd_versions(globals: &GlobalOptions, out: &mut dyn Write) -> Result<()> {
    let manifest = fetch_manifest(&globals.manifest_url)
        .await
        .with_context(|| format!("Failed to load manifest from {}", globals.manifest_url))?;
    print_versions(&manifest, &current_platform(), out)?;
    Ok(())
}

async fn cmd_fetch(globals: &GlobalOptions, reference: &str) -> Result<PathBuf> {
    let key = VersionKey::new(reference)?;
    let store = FsBinaryStore::new(&globals.home_dir)?;

    if store.already_downloaded(&key) {
        println!("{key} is already downloaded");
    } else {
        let location = envoy_manifest::locate(&key, &globals.manifest_url)
            .await
            .with_context(|| format!("Failed to resolve {key}"))?;
        info!("Fetching {} from {}", key, location);
        store
            .fetch(&key, &location)
            .await
            .with_context(|| format!("Failed to fetch {key}"))?;
        println!("Fetched {key}");
    }

    let path = store.binary_path(&key);
    println!("{}", path.display());
    Ok(path)
}

async fn cmd_run(globals: &GlobalOptions, args: RunArgs) -> Result<ExitCode> {
    let key = VersionKey::new(&args.reference)?;

    let mut options = globals.run.clone();
    if let Some(dir) = args.working_dir {
        options.working_dir = dir;
    }
    options.envoy_path = args.envoy_path;
    options.admin_address = args.admin_address;
    options.dont_archive_working_dir = args.no_archive;
    options.debug = DebugOptions {
        admin_data: args.debug_admin,
        logs: args.debug_logs,
        ..DebugOptions::default()
    };

    let store = Arc::new(FsBinaryStore::new(&globals.home_dir)?);
    let explicit_binary = options.envoy_path.is_some();
    let runtime = Arc::new(Runtime::new(options, store));

    if !explicit_binary {
        runtime
            .ensure_downloaded(&key, &globals.manifest_url)
            .await
            .with_context(|| format!("Failed to fetch {key}"))?;
    }

    let run = tokio::spawn({
        let runtime = Arc::clone(&runtime);
        let envoy_args = args.args;
        async move { runtime.run(&key, &envoy_args).await }
    });

    let forward = tokio::spawn({
        let runtime = Arc::clone(&runtime);
        async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                match runtime.send_signal(Signal::SIGINT).await {
                    Ok(()) => {}
                    Err(SignalError::NotRunning) => break,
                    Err(err) => warn!("Failed to forward interrupt: {err}"),
                }
            }
        }
    });

    let report = run.await.context("Runtime task failed")??;
    forward.abort();

    print_report(&report, &mut std::io::stdout().lock())?;
    Ok(ExitCode::from(exit_status(&report)))
}

fn print_report(report: &RunReport, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "Run {} (pid {})", report.run_id, report.pid)?;
    match (report.exit_code, report.signal) {
        (Some(code), _) => writeln!(out, "  exit code: {code}")?,
        (None, Some(signal)) => writeln!(out, "  killed by signal {signal}")?,
        (None, None) => writeln!(out, "  exit status unknown")?,
    }
    writeln!(out, "  reached ready: {}", report.reached_ready)?;
    match &report.archive {
        ArchiveOutcome::Skipped => writeln!(out, "  archive: skipped")?,
        ArchiveOutcome::Written(path) => writeln!(out, "  archive: {}", path.display())?,
        ArchiveOutcome::Failed(err) => writeln!(out, "  archive failed: {err}")?,
    }
    Ok(())
}

/// Shell convention: the child's code, or 128 + signal.
fn exit_status(report: &RunReport) -> u8 {
    match (report.exit_code, report.signal) {
        (Some(code), _) => u8::try_from(code).unwrap_or(1),
        (None, Some(signal)) => u8::try_from(128 + signal).unwrap_or(1),
        (None, None) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(exit_code: Option<i32>, signal: Option<i32>) -> RunReport {
        RunReport {
            run_id: "run-1".to_string(),
            pid: 42,
            exit_code,
            signal,
            reached_ready: true,
            archive: ArchiveOutcome::Skipped,
        }
    }

    #[test]
    fn test_run_args_pass_through_after_separator() {
        let cli = Cli::try_parse_from([
            "getenvoy",
            "run",
            "standard:1.11.0",
            "--debug-admin",
            "--no-archive",
            "--",
            "--config-path",
            "bootstrap.yaml",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.reference, "standard:1.11.0");
        assert!(args.debug_admin);
        assert!(!args.debug_logs);
        assert!(args.no_archive);
        assert_eq!(args.admin_address, "127.0.0.1:15000");
        assert_eq!(args.args, vec!["--config-path", "bootstrap.yaml"]);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["getenvoy", "versions", "--home-dir", "/tmp/ge", "-v"]).unwrap();
        assert_eq!(cli.home_dir, Some(PathBuf::from("/tmp/ge")));
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Versions));
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(exit_status(&report(Some(0), None)), 0);
        assert_eq!(exit_status(&report(Some(3), None)), 3);
        assert_eq!(exit_status(&report(None, Some(2))), 130);
        assert_eq!(exit_status(&report(None, None)), 1);
    }

    #[test]
    fn test_print_report() {
        let mut out = Vec::new();
        print_report(&report(None, Some(2)), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("killed by signal 2"));
        assert!(text.contains("archive: skipped"));
    }

    #[tokio::test]
    async fn test_versions_from_file_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let platform = current_platform().to_uppercase().replace('-', "_");
        let manifest = format!(
            r#"{{"flavors": {{"standard": {{"name": "standard", "filterProfile": "standard",
              "versions": {{"1.11.0": {{"name": "1.11.0", "builds": {{
                "{platform}": {{"platform": "{platform}", "downloadLocationUrl": "file:///envoy.tar.gz"}}
              }}}}}}}}}}}}"#
        );
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, manifest).unwrap();

        let globals = GlobalOptions::resolve(
            Some(dir.path().to_path_buf()),
            Some(format!("file://{}", path.display())),
        );
        let mut out = Vec::new();
        cmd_versions(&globals, &mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "VERSION\tFLAVOR\n1.11.0\tstandard\n");
    }
}
