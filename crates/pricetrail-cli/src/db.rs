//! `db` sub-commands.

use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum DbCommands {
    /// Apply pending schema migrations
    Migrate,
    /// Check that the database is reachable
    Ping,
}

pub(crate) async fn run_db(
    config: &pricetrail_core::AppConfig,
    command: &DbCommands,
) -> anyhow::Result<()> {
    let pool = pricetrail_db::connect_pool_from_config(config).await?;

    let result = match command {
        DbCommands::Migrate => match pricetrail_db::run_migrations(&pool).await {
            Ok(applied) => {
                println!("applied {applied} migration(s)");
                Ok(())
            }
            Err(e) => Err(anyhow::Error::from(e).context("migration failed")),
        },
        DbCommands::Ping => match pricetrail_db::ping(&pool).await {
            Ok(()) => {
                println!("database is reachable");
                Ok(())
            }
            Err(e) => Err(anyhow::Error::from(e).context("database ping failed")),
        },
    };

    pool.close().await;
    result
}
