// src/matching/cache.rs - Per-client match cache with a fixed TTL
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::MatchRepository;
use crate::models::{CachedMatches, ClientId, ListingRef, MatchItem};
use crate::utils::constants::MATCH_CACHE_TTL_MINUTES;

pub fn cache_ttl() -> Duration {
    Duration::minutes(MATCH_CACHE_TTL_MINUTES)
}

/// A generation younger than the TTL is served as-is.
pub fn is_fresh(last_updated: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(last_updated) < cache_ttl()
}

/// Drops excluded (score 0) items and keeps the best score per listing.
/// Output is ordered by score descending, then by listing.
pub fn prepare_items(items: &[MatchItem]) -> Vec<MatchItem> {
    let mut best: HashMap<ListingRef, u8> = HashMap::with_capacity(items.len());
    for item in items.iter().filter(|i| i.score > 0) {
        best.entry(item.listing)
            .and_modify(|s| *s = (*s).max(item.score))
            .or_insert(item.score);
    }
    let mut prepared: Vec<MatchItem> = best
        .into_iter()
        .map(|(listing, score)| MatchItem { listing, score })
        .collect();
    prepared.sort_by(|a, b| b.score.cmp(&a.score).then(a.listing.cmp(&b.listing)));
    prepared
}

pub struct MatchCache<R: ?Sized> {
    repo: Arc<R>,
}

impl<R: ?Sized> Clone for MatchCache<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
        }
    }
}

impl<R: MatchRepository + ?Sized> MatchCache<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Replaces the client's whole cached set. Returns the number of rows written.
    pub async fn save_client_matches(&self, client_id: ClientId, items: &[MatchItem]) -> Result<usize> {
        let prepared = prepare_items(items);
        let written = self
            .repo
            .replace_client_matches(client_id, &prepared, Utc::now())
            .await
            .with_context(|| format!("Failed to save match cache for client {}", client_id))?;
        debug!("Client {}: cached {} matches", client_id, written);
        Ok(written)
    }

    /// `None` when the client has no cached rows.
    pub async fn get_client_matches_from_cache(
        &self,
        client_id: ClientId,
    ) -> Result<Option<CachedMatches>> {
        let matches = self
            .repo
            .get_client_matches(client_id)
            .await
            .with_context(|| format!("Failed to read match cache for client {}", client_id))?;
        let last_updated = match matches.iter().map(|m| m.created_at).min() {
            Some(oldest) => oldest,
            None => return Ok(None),
        };
        Ok(Some(CachedMatches {
            matches,
            last_updated,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryRepository;

    #[test]
    fn test_prepare_items_drops_zero_and_duplicates() {
        let items = [
            MatchItem { listing: ListingRef::Shared(1), score: 70 },
            MatchItem { listing: ListingRef::Property(2), score: 0 },
            MatchItem { listing: ListingRef::Shared(1), score: 88 },
            MatchItem { listing: ListingRef::Property(3), score: 88 },
        ];
        let prepared = prepare_items(&items);
        assert_eq!(
            prepared,
            vec![
                MatchItem { listing: ListingRef::Shared(1), score: 88 },
                MatchItem { listing: ListingRef::Property(3), score: 88 },
            ]
        );
    }

    #[test]
    fn test_freshness_window() {
        let now = Utc::now();
        assert!(is_fresh(now - Duration::minutes(14), now));
        assert!(!is_fresh(now - Duration::minutes(15), now));
    }

    #[tokio::test]
    async fn test_replace_not_merge() {
        let repo = Arc::new(InMemoryRepository::new());
        let cache = MatchCache::new(Arc::clone(&repo));
        let first: Vec<MatchItem> = (1..=5)
            .map(|id| MatchItem { listing: ListingRef::Shared(id), score: 80 })
            .collect();
        assert_eq!(cache.save_client_matches(9, &first).await.unwrap(), 5);

        let second = [
            MatchItem { listing: ListingRef::Shared(2), score: 91 },
            MatchItem { listing: ListingRef::Property(40), score: 66 },
        ];
        cache.save_client_matches(9, &second).await.unwrap();

        let cached = cache.get_client_matches_from_cache(9).await.unwrap().unwrap();
        let mut listings: Vec<ListingRef> = cached.matches.iter().map(|m| m.listing).collect();
        listings.sort();
        assert_eq!(listings, vec![ListingRef::Shared(2), ListingRef::Property(40)]);
    }

    #[tokio::test]
    async fn test_empty_cache_reads_as_none() {
        let repo = Arc::new(InMemoryRepository::new());
        let cache = MatchCache::new(repo);
        assert!(cache.get_client_matches_from_cache(1).await.unwrap().is_none());
        cache
            .save_client_matches(1, &[MatchItem { listing: ListingRef::Shared(1), score: 0 }])
            .await
            .unwrap();
        assert!(cache.get_client_matches_from_cache(1).await.unwrap().is_none());
    }
}
