// src/bin/refresh_client_matches.rs
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use matching_lib::matching::MatchingService;
use matching_lib::models::{Listing, MatchSource};
use matching_lib::utils::config::EngineConfig;
use matching_lib::utils::db_connect::connect;
use matching_lib::utils::env::{load_env, log_env_outcome};
use matching_lib::PgRepository;

#[derive(Parser)]
#[command(author, version, about = "Show the listings matching one buyer", long_about = None)]
struct RefreshArgs {
    /// Client whose buyer profile is matched
    #[arg(long)]
    client_id: i64,

    /// Ignore the cache and recompute
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = RefreshArgs::parse();
    let env_outcome = load_env();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    log_env_outcome(&env_outcome);

    let pool = connect().await.context("Failed to connect to database")?;
    let service = MatchingService::new(Arc::new(PgRepository::new(pool)), EngineConfig::from_env());
    let result = service
        .get_matching_properties_for_client(args.client_id, args.force)
        .await?;

    match &result.source {
        MatchSource::Cache { last_updated } => println!("Source: cache (computed {})", last_updated),
        MatchSource::Recomputed => println!("Source: recomputed"),
        MatchSource::RecomputedUncached { error } => {
            println!("Source: recomputed, cache NOT updated ({})", error)
        }
    }
    println!("{} matches for client {}", result.matches.len(), result.client_id);
    for matched in &result.matches {
        match &matched.listing {
            Listing::Shared(shared) => println!(
                "  [{:>3}] shared #{} {} ({} agencies)",
                matched.score,
                shared.id,
                shared.address,
                shared.agencies.len()
            ),
            Listing::Private(property) => println!(
                "  [{:>3}] private #{} {}",
                matched.score,
                property.id,
                property.address.as_deref().unwrap_or("-")
            ),
        }
    }
    Ok(())
}
