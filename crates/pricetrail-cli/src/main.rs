mod db;
mod sync;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use db::DbCommands;
use sync::SyncArgs;

#[derive(Debug, Parser)]
#[command(name = "pricetrail")]
#[command(about = "Catalog price-history synchronizer")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one sync cycle (the default when no command is given)
    Sync(SyncArgs),
    /// Database management
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match pricetrail_core::load_app_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured level when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        None => sync::run_sync(&config, &SyncArgs::default()).await,
        Some(Commands::Sync(args)) => sync::run_sync(&config, &args).await,
        Some(Commands::Db { command }) => db::run_db(&config, &command).await,
    }
}
