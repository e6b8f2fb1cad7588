mod commands;
mod context;
mod output;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "recon")]
#[command(about = "Reconcile declared Aiven resources with the live control plane", long_about = None)]
struct Cli {
    /// Settings file (default: discovered reconflow.yaml)
    #[arg(long, global = true, env = "RECONFLOW_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or converge every resource in a manifest
    Apply {
        /// YAML manifest: one resource or a list of resources
        manifest: PathBuf,
        /// Delete and recreate resources whose immutable fields changed
        #[arg(long)]
        replace: bool,
    },
    /// Show the live attributes of one resource
    Read {
        /// Resource kind (e.g. kafka, kafka_topic)
        kind: String,
        /// Identity, '/'-separated (e.g. my-project/my-kafka)
        id: String,
    },
    /// Print an existing resource as a manifest entry
    Import {
        kind: String,
        id: String,
    },
    /// Delete one resource
    Delete {
        kind: String,
        id: String,
    },
    /// Delete leftover resources whose name contains a prefix
    Sweep {
        #[arg(long, default_value = "test-acc-")]
        prefix: String,
        /// Only sweep this kind
        #[arg(long)]
        kind: Option<String>,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // No settings needed for version
    if matches!(cli.command, Commands::Version) {
        println!("reconflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let settings = reconflow_config::load(cli.config.as_deref())?;
    let ctx = context::Context::from_settings(&settings)?;

    let result = match cli.command {
        Commands::Apply { manifest, replace } => {
            commands::apply::handle(&ctx, &manifest, replace).await
        }
        Commands::Read { kind, id } => commands::read::handle(&ctx, &kind, &id).await,
        Commands::Import { kind, id } => commands::import::handle(&ctx, &kind, &id).await,
        Commands::Delete { kind, id } => commands::delete::handle(&ctx, &kind, &id).await,
        Commands::Sweep { prefix, kind } => {
            commands::sweep::handle(&ctx, &prefix, kind.as_deref()).await
        }
        Commands::Version => unreachable!("Version is handled before settings are loaded"),
    };

    if ctx.is_canceled() {
        eprintln!("{}", "Interrupted; remote operations may still be in progress".yellow());
    }
    result
}
