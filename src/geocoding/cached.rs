// src/geocoding/cached.rs - LRU cache in front of any geocoder
use anyhow::Result;
use async_trait::async_trait;
use log::info;
use lru::LruCache;
use std::num::NonZeroUsize;
use tokio::sync::Mutex;

use super::Geocoder;
use crate::geometry::GeoPoint;

struct CacheState {
    entries: LruCache<String, Option<GeoPoint>>,
    hits: usize,
    misses: usize,
}

/// Remembers answers, including "no result", per normalized address.
/// Errors are not cached so a transient failure is retried next time.
pub struct CachedGeocoder<G> {
    inner: G,
    state: Mutex<CacheState>,
}

impl<G: Geocoder> CachedGeocoder<G> {
    pub fn new(inner: G, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// (hits, misses)
    pub async fn stats(&self) -> (usize, usize) {
        let state = self.state.lock().await;
        (state.hits, state.misses)
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }
}

fn cache_key(address: &str) -> String {
    address.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[async_trait]
impl<G: Geocoder> Geocoder for CachedGeocoder<G> {
    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>> {
        let key = cache_key(address);
        {
            let mut state = self.state.lock().await;
            if let Some(cached) = state.entries.get(&key).copied() {
                state.hits += 1;
                if state.hits % 100 == 0 {
                    info!(
                        "Geocoder cache stats - hits: {}, misses: {}, hit rate: {:.2}%",
                        state.hits,
                        state.misses,
                        (state.hits as f64 / (state.hits + state.misses) as f64) * 100.0
                    );
                }
                return Ok(cached);
            }
            state.misses += 1;
        }

        // The lock is not held across the network call.
        let result = self.inner.geocode(address).await?;
        self.state.lock().await.entries.put(key, result);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocoding::tests::TableGeocoder;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_hits_skip_the_inner_geocoder() {
        let mut inner = TableGeocoder::default();
        inner.known.insert("Via Roma 10".into(), GeoPoint::new(45.0, 9.0));
        let geocoder = CachedGeocoder::new(inner, 10);

        assert!(geocoder.geocode("Via Roma 10").await.unwrap().is_some());
        assert!(geocoder.geocode("via  roma 10").await.unwrap().is_some());
        assert!(geocoder.geocode("Via Ignota 1").await.unwrap().is_none());
        assert!(geocoder.geocode("Via Ignota 1").await.unwrap().is_none());

        assert_eq!(geocoder.inner().calls.load(Ordering::SeqCst), 2);
        assert_eq!(geocoder.stats().await, (2, 2));
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let geocoder = CachedGeocoder::new(TableGeocoder::default(), 10);
        assert!(geocoder.geocode("boom").await.is_err());
        assert!(geocoder.geocode("boom").await.is_err());
        assert_eq!(geocoder.inner().calls.load(Ordering::SeqCst), 2);
    }
}
