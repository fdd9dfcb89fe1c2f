// src/geocoding/mod.rs - Geocoding collaborator that fills in missing property locations
use anyhow::Result;
use async_trait::async_trait;
use indicatif::MultiProgress;
use log::{debug, warn};

use crate::db::PropertyRepository;
use crate::geometry::GeoPoint;
use crate::models::Property;
use crate::utils::logging::{JobKind, MatchingLogger};
use crate::utils::progress_config::counted_bar;

pub mod cached;
pub mod nominatim;

pub use cached::CachedGeocoder;
pub use nominatim::NominatimGeocoder;

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` when the service has no result for the address.
    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>>;
}

fn geocoding_query(property: &Property) -> Option<String> {
    let address = property.address.as_deref()?.trim();
    if address.is_empty() {
        return None;
    }
    Some(match property.city.as_deref().map(str::trim) {
        Some(city) if !city.is_empty() && !address.to_lowercase().contains(&city.to_lowercase()) => {
            format!("{}, {}", address, city)
        }
        _ => address.to_string(),
    })
}

/// Geocodes every property that has an address but no coordinates. Lookup or
/// write failures are logged and skipped. Returns how many properties got a
/// location.
pub async fn backfill_missing_locations<R, G>(
    repo: &R,
    geocoder: &G,
    multi_progress: Option<&MultiProgress>,
) -> Result<usize>
where
    R: PropertyRepository + ?Sized,
    G: Geocoder + ?Sized,
{
    let logger = MatchingLogger::new(JobKind::Geocode);
    let pending = repo.list_properties_missing_location().await?;
    logger.log_data_loaded(pending.len(), "properties without coordinates");

    let pb = counted_bar(multi_progress, pending.len() as u64, "Geocoding properties");
    let mut located = 0usize;
    let mut failed = 0usize;
    for property in &pending {
        pb.inc(1);
        let Some(query) = geocoding_query(property) else {
            continue;
        };
        match geocoder.geocode(&query).await {
            Ok(Some(point)) => match repo.set_property_location(property.id, point).await {
                Ok(()) => located += 1,
                Err(e) => {
                    failed += 1;
                    warn!("Could not store location of property {}: {:#}", property.id, e);
                }
            },
            Ok(None) => debug!("No geocoding result for property {} ('{}')", property.id, query),
            Err(e) => {
                failed += 1;
                warn!("Geocoding failed for property {}: {:#}", property.id, e);
            }
        }
    }
    pb.finish_with_message("Geocoding done");

    if failed > 0 {
        logger.log_warning(&format!("{} properties could not be geocoded", failed));
    }
    logger.log_completion(&format!("{} of {} properties located", located, pending.len()));
    Ok(located)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::InMemoryRepository;
    use crate::test_support::listing;
    use anyhow::anyhow;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers from a fixed table; addresses containing "boom" fail.
    #[derive(Default)]
    pub(crate) struct TableGeocoder {
        pub known: HashMap<String, GeoPoint>,
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl Geocoder for TableGeocoder {
        async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if address.contains("boom") {
                return Err(anyhow!("service unavailable"));
            }
            Ok(self.known.get(address).copied())
        }
    }

    #[test]
    fn test_query_appends_city_once() {
        let mut p = listing(1);
        assert_eq!(geocoding_query(&p).as_deref(), Some("Via Roma 10, Milano"));
        p.address = Some("Via Roma 10, Milano".into());
        assert_eq!(geocoding_query(&p).as_deref(), Some("Via Roma 10, Milano"));
        p.address = Some("  ".into());
        assert_eq!(geocoding_query(&p), None);
    }

    #[tokio::test]
    async fn test_backfill_sets_found_locations_and_skips_failures() {
        let repo = InMemoryRepository::new();
        let mut found = listing(1);
        found.location = None;
        let mut unknown = listing(2);
        unknown.location = None;
        unknown.address = Some("Via Nessuna 1".into());
        let mut failing = listing(3);
        failing.location = None;
        failing.address = Some("Via boom 3".into());
        let already = listing(4);
        for p in [found, unknown, failing, already] {
            repo.insert_property(p).await;
        }

        let mut geocoder = TableGeocoder::default();
        geocoder
            .known
            .insert("Via Roma 10, Milano".into(), GeoPoint::new(45.46, 9.19));

        let located = backfill_missing_locations(&repo, &geocoder, None).await.unwrap();
        assert_eq!(located, 1);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 3);
        assert_eq!(repo.property(1).await.unwrap().location, Some(GeoPoint::new(45.46, 9.19)));
        assert_eq!(repo.property(2).await.unwrap().location, None);
    }
}
