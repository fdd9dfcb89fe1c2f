// src/bin/dedup_scan.rs
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::sync::Arc;

use matching_lib::dedup::DeduplicationService;
use matching_lib::utils::db_connect::connect;
use matching_lib::utils::env::{load_env, log_env_outcome};
use matching_lib::utils::progress_config::ProgressConfig;
use matching_lib::PgRepository;

#[derive(Parser)]
#[command(author, version, about = "Group scraped listings of the same property", long_about = None)]
struct DedupArgs {
    /// Cluster and report without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = DedupArgs::parse();
    let level = if args.verbose { "debug" } else { "info" };
    let env_outcome = load_env();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or(level));
    log_env_outcome(&env_outcome);

    let progress = ProgressConfig::from_env();
    let multi_progress = progress.create_multi_progress();
    let connecting = progress.spinner(multi_progress.as_ref(), "Connecting to database");
    let pool = connect().await.context("Failed to connect to database")?;
    if let Some(spinner) = connecting {
        spinner.finish_and_clear();
    }
    let repo = Arc::new(PgRepository::new(pool));

    let result = DeduplicationService::new(repo)
        .run_deduplication_scan(args.dry_run, multi_progress.as_ref())
        .await?;

    if args.dry_run {
        info!("Dry run, no changes were written");
    }
    println!("Scan ID:                   {}", result.scan_id);
    println!("Clusters found:            {}", result.clusters_found);
    println!("Multi-agency properties:   {}", result.multiagency_properties);
    println!("Exclusive properties:      {}", result.exclusive_properties);
    println!("Properties updated:        {}", result.properties_updated);
    println!("Shared properties created: {}", result.shared_properties_created);
    println!("Excluded candidates:       {}", result.excluded_candidates);
    Ok(())
}
