//! isolate-run CLI - Supervised entry-point harness.

use std::fs::File;
use std::future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use isolate_run::config::{self, Config};
use isolate_run::error::{HarnessError, HarnessResult};
use isolate_run::invoker::{BoundaryResolver, CommandInvoker, DirectInvoker, ExecutionRequest};
use isolate_run::kernel::BuiltinBootstrap;
use isolate_run::kernel::builtin::DISABLED_COMMANDS_KEY;
use isolate_run::report::{self, RunSummary, Strategy};
use isolate_run::streams;
use isolate_run::supervisor::ExecutionSupervisor;

/// Exit status after Ctrl-C, as a shell would report SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Parser)]
#[command(name = "isolate-run")]
#[command(about = "Run an application entry point in a supervised, isolated context", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an entry point found in the boundary
    Run {
        /// Override the configured entry point
        #[arg(long)]
        entry_point: Option<String>,

        /// Override the configured argument string
        #[arg(long, allow_hyphen_values = true)]
        args: Option<String>,
    },

    /// Run a command of the built-in kernel
    Cmd {
        /// Command name, `scope:name` or bare
        #[arg(long)]
        name: Option<String>,

        /// Command argument string
        #[arg(long, allow_hyphen_values = true)]
        args: Option<String>,
    },

    /// Print the execution boundary, in resolution order
    Boundary {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Validate configuration file
    Validate,

    /// Initialize a new configuration file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let host_stderr = streams::host_stderr().context("Failed to duplicate stderr")?;
    init_logging(cli.verbose, host_stderr.try_clone()?)?;

    match cli.command {
        Commands::Run { entry_point, args } => run_entry_point(&cli.config, entry_point, args, host_stderr).await,
        Commands::Cmd { name, args } => run_command(&cli.config, name, args, host_stderr).await,
        Commands::Boundary { format } => show_boundary(&cli.config, &format),
        Commands::Validate => validate_config(&cli.config),
        Commands::Init => init_config(&cli.config),
    }
}

/// Logs go to a private copy of stderr so they survive stream suppression.
fn init_logging(verbose: bool, stderr: File) -> Result<()> {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(console::colors_enabled_stderr())
        .with_writer(Mutex::new(stderr))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

async fn run_entry_point(
    config_path: &Path,
    entry_point: Option<String>,
    args: Option<String>,
    mut report_to: File,
) -> Result<()> {
    let config = load(config_path)?;

    let Some(entry_point) = entry_point.or_else(|| config.harness.entry_point.clone()) else {
        bail!("No entry point given: set harness.entry_point or pass --entry-point");
    };
    let args = args.unwrap_or_else(|| config.harness.args.clone());
    let group = config
        .harness
        .group_name
        .clone()
        .unwrap_or_else(|| entry_point.clone());

    let started = Instant::now();
    let supervisor = ExecutionSupervisor::new().with_group_name(group.clone());
    let outcome = supervise(move || {
        let boundary = config::build_boundary(&config.boundary)?;
        let request = ExecutionRequest::new(entry_point, args, boundary);

        let mut resolver = BoundaryResolver::new(request.boundary.clone());
        for (key, value) in &config.harness.env {
            resolver = resolver.env(key, value);
        }
        if let Some(dir) = &config.harness.working_dir {
            resolver = resolver.working_dir(dir);
        }

        supervisor.run(DirectInvoker::from_request(resolver, &request), request.boundary)
    })
    .await?;

    finish(&mut report_to, &group, Strategy::Direct, started, outcome)
}

async fn run_command(
    config_path: &Path,
    name: Option<String>,
    args: Option<String>,
    mut report_to: File,
) -> Result<()> {
    let config = load(config_path)?;

    let name = name.unwrap_or_else(|| config.command.name.clone());
    let args = args.unwrap_or_else(|| config.command.args.clone());
    let group = name.clone();

    let mut bootstrap = BuiltinBootstrap::new();
    if !config.command.disabled.is_empty() {
        bootstrap = bootstrap.param(DISABLED_COMMANDS_KEY, config.command.disabled.join(","));
    }

    let started = Instant::now();
    let outcome = supervise(move || {
        let boundary = config::build_boundary(&config.boundary)?;
        let request = ExecutionRequest::new(name, args, boundary);
        let invoker = CommandInvoker::from_request(Arc::new(bootstrap), &request)?;

        ExecutionSupervisor::new().run(invoker, request.boundary)
    })
    .await?;

    finish(&mut report_to, &group, Strategy::Command, started, outcome)
}

/// Runs the blocking supervisor off the async runtime. Ctrl-C abandons the
/// supervised group and exits the process.
async fn supervise<F>(work: F) -> Result<HarnessResult<()>>
where
    F: FnOnce() -> HarnessResult<()> + Send + 'static,
{
    let interrupted = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => (),
            Err(e) => {
                warn!("Failed to listen for Ctrl-C: {}", e);
                future::pending::<()>().await
            }
        }
    };

    tokio::select! {
        joined = tokio::task::spawn_blocking(work) => joined.context("Supervisor task failed"),
        _ = interrupted => {
            warn!("Interrupted, abandoning the supervised group");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    }
}

fn finish(
    report_to: &mut File,
    group: &str,
    strategy: Strategy,
    started: Instant,
    outcome: HarnessResult<()>,
) -> Result<()> {
    let summary = RunSummary {
        group,
        strategy,
        duration: started.elapsed(),
        outcome: outcome.as_ref().map(|_| ()),
    };
    report::write_summary(report_to, &summary)?;

    if !summary.success() {
        std::process::exit(1);
    }
    Ok(())
}

fn load(config_path: &Path) -> Result<Config> {
    let config = config::load_config(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    info!("Loaded configuration from {}", config_path.display());
    Ok(config)
}

fn show_boundary(config_path: &Path, format: &str) -> Result<()> {
    let config = load(config_path)?;
    let boundary = config::build_boundary(&config.boundary).map_err(HarnessError::from)?;

    match format {
        "text" => {
            for location in &boundary {
                println!("{}", location.display());
            }
        }
        "json" => println!("{}", serde_json::to_string_pretty(&boundary)?),
        other => bail!("Unknown format: {}. Use: text, json", other),
    }

    Ok(())
}

fn validate_config(config_path: &Path) -> Result<()> {
    match config::load_config(config_path) {
        Ok(config) => {
            println!("Configuration is valid!");
            println!();
            println!("Settings:");
            println!(
                "  Entry point: {}",
                config.harness.entry_point.as_deref().unwrap_or("(none)")
            );
            println!("  Output dir: {}", config.boundary.output_dir.display());
            println!("  Resource dirs: {}", config.boundary.resource_dirs.len());
            println!("  Dependencies: {}", config.boundary.dependencies.len());
            println!("  Command: {}", config.command.name);

            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn init_config(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        eprintln!(
            "{} already exists. Remove it first or edit manually.",
            config_path.display()
        );
        std::process::exit(1);
    }

    std::fs::write(config_path, config::STARTER_CONFIG)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!("Created {}", config_path.display());
    println!();
    println!("Edit the configuration as needed, then run:");
    println!("  isolate-run run");

    Ok(())
}
