//! The `sync` command.
//!
//! Builds the catalog client and the store, resolves what to crawl, runs one
//! cycle, and prints a summary. Per-product failures are reported in the
//! summary; only configuration errors and total failures abort the run.

mod persist;
mod runner;

use anyhow::Context;
use chrono::Utc;
use clap::Args;
use pricetrail_client::CatalogClient;
use pricetrail_core::{AppConfig, Category};
use pricetrail_db::{DbError, MemoryProductStore, PgProductStore, PoolConfig};

use runner::{SyncSummary, SyncTarget};

#[derive(Debug, Default, Args)]
pub struct SyncArgs {
    /// Restrict the crawl to these category ids (repeatable)
    #[arg(long = "category", value_name = "ID")]
    pub categories: Vec<u64>,

    /// Sync these product ids instead of crawling (repeatable)
    #[arg(
        long = "product",
        value_name = "ID",
        conflicts_with_all = ["categories", "keywords"]
    )]
    pub products: Vec<String>,

    /// Crawl a keyword query instead of categories
    #[arg(long, conflicts_with = "categories")]
    pub keywords: Option<String>,

    /// Write to an in-memory store and print what would be written
    #[arg(long)]
    pub dry_run: bool,
}

pub(crate) async fn run_sync(config: &AppConfig, args: &SyncArgs) -> anyhow::Result<()> {
    let target = resolve_target(config, args)?;
    let client = CatalogClient::from_config(config).context("failed to build catalog client")?;

    if args.dry_run {
        let store = MemoryProductStore::new();
        let summary = runner::run_cycle(&client, &store, config, &target, Utc::now()).await?;
        for line in dry_run_lines(&summary) {
            println!("{line}");
        }
        print_failures(&summary);
        println!("dry-run: {}", summary_line(&summary));
        return Ok(());
    }

    let database_url = config
        .database_url
        .as_deref()
        .ok_or(DbError::MissingDatabaseUrl)?;
    let store = PgProductStore::connect(database_url, PoolConfig::from_app_config(config))
        .await
        .context("failed to connect to the database")?;

    let result = runner::run_cycle(&client, &store, config, &target, Utc::now()).await;
    store.close().await;

    let summary = result?;
    print_failures(&summary);
    println!("{}", summary_line(&summary));
    Ok(())
}

/// Chooses the product source from the flags. Without `--product` or
/// `--keywords`, the category list file is read.
pub(crate) fn resolve_target(config: &AppConfig, args: &SyncArgs) -> anyhow::Result<SyncTarget> {
    if !args.products.is_empty() {
        return Ok(SyncTarget::Products(args.products.clone()));
    }
    if let Some(keywords) = &args.keywords {
        return Ok(SyncTarget::Keywords(keywords.clone()));
    }

    let reference = pricetrail_core::load_categories(&config.categories_path)?;
    Ok(SyncTarget::Categories {
        crawl: crawl_list(&reference, &args.categories),
        reference,
    })
}

/// Every listed category, or the requested subset in request order. A
/// requested id missing from the list is still crawled.
fn crawl_list(reference: &[Category], requested: &[u64]) -> Vec<u64> {
    if requested.is_empty() {
        return reference.iter().map(|c| c.category_id).collect();
    }
    let mut crawl = Vec::with_capacity(requested.len());
    for &id in requested {
        if crawl.contains(&id) {
            continue;
        }
        if !reference.iter().any(|c| c.category_id == id) {
            tracing::warn!(category_id = id, "category is not in the reference list");
        }
        crawl.push(id);
    }
    crawl
}

fn summary_line(summary: &SyncSummary) -> String {
    format!(
        "synced {} products ({} listed, {} below volume threshold, {} detail failures, \
         {} write failures): {} new SKUs, {} prices written, {} corrections, {} SKU rows skipped",
        summary.products.len(),
        summary.listed,
        summary.below_min_volume,
        summary.enrich_failed,
        summary.persist_failed,
        summary.skus_added(),
        summary.prices_written(),
        summary.corrections(),
        summary.skipped_skus(),
    )
}

fn print_failures(summary: &SyncSummary) {
    let failed = summary.enrich_failed + summary.persist_failed;
    if failed == 0 {
        return;
    }
    eprintln!("{failed} product(s) failed; first {}:", summary.failure_sample.len());
    for line in &summary.failure_sample {
        eprintln!("  {line}");
    }
}

fn dry_run_lines(summary: &SyncSummary) -> Vec<String> {
    summary
        .products
        .iter()
        .map(|p| {
            format!(
                "dry-run: product {}: {} new SKUs, {} first-of-day, {} corrections, {} unchanged, {} skipped",
                p.product_id, p.new_skus, p.first_of_day, p.corrections, p.unchanged, p.skipped
            )
        })
        .collect()
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod tests;
