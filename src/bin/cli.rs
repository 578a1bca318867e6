//! Restructure CLI - analyze, plan and migrate a JS/TS source tree.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use restructure::{CommandProbe, ProbeOutcome, Restructure, VerificationProbe};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "restructure")]
#[command(about = "Reference-graph analysis and transactional migration for JS/TS trees", long_about = None)]
struct Cli {
    /// Project directory holding restructure.toml (default: current directory)
    #[arg(short, long, default_value = ".")]
    path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the reference graph and classify every module in scope
    Analyze {
        /// Include the full graph, not just usage records
        #[arg(long)]
        graph: bool,
    },

    /// Show the move plan and rewrite rules the grouping rules imply
    Plan,

    /// Plan, then run the migration to commit or roll back
    Migrate {
        /// Verification command (overrides [verify].command)
        #[arg(long)]
        verify: Option<String>,

        /// Verification timeout in seconds (overrides [verify].timeout_secs)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Restore a persisted snapshot
    Restore {
        /// Path to a .snapshot file
        snapshot: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open(path: &Path) -> anyhow::Result<Restructure> {
    Restructure::open(path).with_context(|| format!("opening project at {}", path.display()))
}

/// Used when no verification command is configured.
fn no_verification(_: &Path, _: Duration) -> ProbeOutcome {
    ProbeOutcome::pass("no verification command configured")
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Analyze { graph } => {
            let project = open(&cli.path)?;
            let analysis = project.analyze()?;
            if graph {
                print_json(&serde_json::json!({
                    "graph": analysis.graph.to_record(),
                    "usage": analysis.usage,
                    "summary": analysis.summary(),
                }))?;
            } else {
                print_json(&serde_json::json!({
                    "stats": analysis.graph.stats(),
                    "usage": analysis.usage,
                    "summary": analysis.summary(),
                    "diagnostics": analysis.graph.diagnostics(),
                }))?;
            }
        }

        Commands::Plan => {
            let project = open(&cli.path)?;
            let analysis = project.analyze()?;
            let plan = project.plan(&analysis).context("planning failed; nothing was changed")?;
            print_json(&plan)?;
        }

        Commands::Migrate { verify, timeout } => {
            let project = open(&cli.path)?;
            let analysis = project.analyze()?;
            let plan = project.plan(&analysis).context("planning failed; nothing was changed")?;
            if plan.moves.is_empty() {
                bail!("no grouping rule moves any module");
            }

            let timeout = timeout
                .map(Duration::from_secs)
                .unwrap_or_else(|| project.config().verify_timeout());
            let command = verify.or_else(|| project.config().verify.command.clone());
            let command_probe = command.map(CommandProbe::shell);
            let probe: &dyn VerificationProbe = match &command_probe {
                Some(probe) => probe,
                None => &no_verification,
            };

            let result = project.migration(plan).run(probe, timeout);
            print_json(&result)?;
            if !result.success {
                std::process::exit(2);
            }
        }

        Commands::Restore { snapshot } => {
            let report = Restructure::restore(&snapshot)
                .with_context(|| format!("restoring {}", snapshot.display()))?;
            print_json(&report)?;
        }
    }

    Ok(())
}
