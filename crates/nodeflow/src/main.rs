mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nodeflow")]
#[command(about = "Inspect and repair NodeFlow VM orchestration state", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or clear coordination locks
    #[command(subcommand)]
    Lock(LockCommands),
    /// Print the availability set name derived from a logical group
    #[command(name = "avset-name")]
    AvsetName {
        /// Logical group name, e.g. the director's `env.bosh.group`
        group: String,
    },
    /// Check configuration files
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum LockCommands {
    /// List locks with their holders and deletion marks
    List {
        /// Lock directory (defaults to `lock.dir` from the configuration)
        #[arg(long, env = "NODEFLOW_LOCK_DIR")]
        dir: Option<PathBuf>,
    },
    /// Remove a lock left held by a failed operation
    Clear {
        /// Lock name, e.g. availability-set-web
        #[arg(required_unless_present = "marked", conflicts_with = "marked")]
        name: Option<String>,
        /// Clear every lock marked for deletion
        #[arg(long)]
        marked: bool,
        /// Lock directory (defaults to `lock.dir` from the configuration)
        #[arg(long, env = "NODEFLOW_LOCK_DIR")]
        dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Load and validate the cloud properties
    Check {
        /// Configuration file (defaults to discovery)
        #[arg(long)]
        path: Option<PathBuf>,
        /// Also validate a resource pool (cloud_properties) YAML file
        #[arg(long)]
        resource_pool: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays scriptable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match cli.command {
        Commands::Lock(LockCommands::List { dir }) => commands::lock::list(dir).await,
        Commands::Lock(LockCommands::Clear { name, marked, dir }) => {
            commands::lock::clear(name, marked, dir).await
        }
        Commands::AvsetName { group } => {
            commands::avset::handle(&group);
            Ok(())
        }
        Commands::Config(ConfigCommands::Check {
            path,
            resource_pool,
        }) => commands::config::check(path, resource_pool),
        Commands::Version => {
            println!("nodeflow {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
