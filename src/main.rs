// src/main.rs - nightly batch: geocode backfill, dedup scan, client match refresh
use anyhow::{Context, Result};
use log::{info, warn};
use std::sync::Arc;
use std::time::Instant;

use matching_lib::dedup::DeduplicationService;
use matching_lib::geocoding::{backfill_missing_locations, CachedGeocoder, NominatimGeocoder};
use matching_lib::matching::MatchingService;
use matching_lib::utils::config::EngineConfig;
use matching_lib::utils::db_connect::{connect, get_pool_status};
use matching_lib::utils::env::{load_env, log_env_outcome};
use matching_lib::utils::progress_config::ProgressConfig;
use matching_lib::PgRepository;

#[tokio::main]
async fn main() -> Result<()> {
    // Before the logger, so RUST_LOG from .env applies.
    let env_outcome = load_env();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    log_env_outcome(&env_outcome);
    info!("Starting property matching batch");
    let start_time = Instant::now();

    let config = EngineConfig::from_env();
    let progress = ProgressConfig::from_env();
    let multi_progress = progress.create_multi_progress();

    let connecting = progress.spinner(multi_progress.as_ref(), "Connecting to database");
    let pool = connect().await.context("Failed to connect to database")?;
    if let Some(spinner) = connecting {
        spinner.finish_and_clear();
    }
    let repo = Arc::new(PgRepository::new(pool.clone()));

    if config.geocoding_enabled {
        let phase_start = Instant::now();
        let geocoder = CachedGeocoder::new(
            NominatimGeocoder::new(&config.nominatim_url, &config.geocoder_user_agent)?,
            config.geocoder_cache_size,
        );
        match backfill_missing_locations(repo.as_ref(), &geocoder, multi_progress.as_ref()).await {
            Ok(located) => {
                let (hits, misses) = geocoder.stats().await;
                info!(
                    "Geocoding located {} properties in {:.2?} (cache hits: {}, misses: {})",
                    located,
                    phase_start.elapsed(),
                    hits,
                    misses
                );
            }
            // Missing coordinates only reduce match quality, so the batch goes on.
            Err(e) => warn!("Geocoding backfill failed: {:#}", e),
        }
    } else {
        info!("Geocoding disabled, skipping location backfill");
    }

    let phase_start = Instant::now();
    let dedup = DeduplicationService::new(repo.clone());
    let scan = dedup
        .run_deduplication_scan(false, multi_progress.as_ref())
        .await
        .context("Deduplication scan failed")?;
    info!(
        "Dedup scan {} finished in {:.2?}: {} clusters, {} multi-agency, {} exclusive, {} properties updated, {} shared properties created",
        scan.scan_id,
        phase_start.elapsed(),
        scan.clusters_found,
        scan.multiagency_properties,
        scan.exclusive_properties,
        scan.properties_updated,
        scan.shared_properties_created
    );

    let phase_start = Instant::now();
    let matching = MatchingService::new(repo, config);
    let stats = matching
        .refresh_all_client_matches(multi_progress.as_ref())
        .await
        .context("Client match refresh failed")?;
    info!(
        "Refreshed {} clients ({} failed, {} matches) in {:.2?}",
        stats.clients_processed,
        stats.clients_failed,
        stats.total_matches,
        phase_start.elapsed()
    );

    let (connections, idle) = get_pool_status(&pool);
    info!(
        "Batch completed in {:.2?}. Pool: {} connections, {} idle",
        start_time.elapsed(),
        connections,
        idle
    );
    Ok(())
}
