mod commands;
mod config;
mod provider;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "appfuse")]
#[command(about = "Serve a read-only directory of numbered files over FUSE")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve an already opened FUSE device
    Serve(commands::serve::ServeArgs),

    /// Show version information
    Version(commands::version::VersionArgs),
}

/// Installs the log subscriber. `RUST_LOG` wins over `fallback`.
pub(crate) fn init_logging(fallback: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(fallback.unwrap_or("info")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:?}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Serve(args) => commands::serve::run(args).await,
        Commands::Version(args) => {
            commands::version::run(args);
            Ok(0)
        }
    }
}
