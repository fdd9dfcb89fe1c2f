// src/matching/service.rs - Matching entry points for both directions plus the cache-aware read
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use indicatif::MultiProgress;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::Repository;
use crate::matching::cache::{is_fresh, MatchCache};
use crate::matching::criteria::{CriteriaMatcher, MatchSubject, ToleranceMatcher};
use crate::models::{
    BuyerProfile, CachedMatches, ClientId, ClientMatches, Listing, ListingRef, MatchItem, MatchSource,
    MatchedListing, Property, PropertyId, RefreshStats, ScoredBuyer, ScoredProperty,
    SharedProperty, SharedPropertyId,
};
use crate::utils::config::EngineConfig;
use crate::utils::logging::{JobKind, MatchingLogger};
use crate::utils::progress_config::counted_bar;

/// Everything a buyer can currently be offered.
struct CandidateSet {
    shared: Vec<SharedProperty>,
    private: Vec<Property>,
}

impl CandidateSet {
    fn len(&self) -> usize {
        self.shared.len() + self.private.len()
    }
}

fn sort_matches(matches: &mut [MatchedListing]) {
    matches.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.listing.reference().cmp(&b.listing.reference()))
    });
}

fn to_items(matches: &[MatchedListing]) -> Vec<MatchItem> {
    matches
        .iter()
        .map(|m| MatchItem {
            listing: m.listing.reference(),
            score: m.score,
        })
        .collect()
}

pub struct MatchingService<R: ?Sized, M = ToleranceMatcher> {
    repo: Arc<R>,
    cache: MatchCache<R>,
    matcher: M,
    config: EngineConfig,
}

impl<R: Repository + ?Sized> MatchingService<R, ToleranceMatcher> {
    pub fn new(repo: Arc<R>, config: EngineConfig) -> Self {
        Self::with_matcher(repo, config, ToleranceMatcher)
    }
}

impl<R: Repository + ?Sized, M: CriteriaMatcher> MatchingService<R, M> {
    pub fn with_matcher(repo: Arc<R>, config: EngineConfig, matcher: M) -> Self {
        Self {
            cache: MatchCache::new(Arc::clone(&repo)),
            repo,
            matcher,
            config,
        }
    }

    pub fn matcher(&self) -> &M {
        &self.matcher
    }

    pub fn cache(&self) -> &MatchCache<R> {
        &self.cache
    }

    async fn require_profile(&self, client_id: ClientId) -> Result<BuyerProfile> {
        self.repo
            .get_buyer(client_id)
            .await?
            .map(|buyer| buyer.profile)
            .ok_or_else(|| anyhow!("Buyer {} not found", client_id))
    }

    /// Every property row that matches the buyer, best first.
    pub async fn match_properties_for_buyer(&self, client_id: ClientId) -> Result<Vec<ScoredProperty>> {
        let profile = self.require_profile(client_id).await?;
        let properties = self
            .repo
            .list_properties()
            .await
            .context("Failed to load properties for buyer matching")?;

        let mut scored: Vec<ScoredProperty> = properties
            .into_iter()
            .filter_map(|property| {
                let outcome = self.matcher.evaluate(&property, &profile);
                outcome.is_match.then_some(ScoredProperty {
                    property,
                    score: outcome.score,
                })
            })
            .collect();
        scored.sort_by(|a, b| b.score.cmp(&a.score).then(a.property.id.cmp(&b.property.id)));
        debug!("Client {}: {} matching properties", client_id, scored.len());
        Ok(scored)
    }

    /// Every active buyer the property matches, best first.
    pub async fn match_buyers_for_property(&self, property_id: PropertyId) -> Result<Vec<ScoredBuyer>> {
        let property = self
            .repo
            .get_properties(&[property_id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Property {} not found", property_id))?;
        self.score_buyers(&property).await
    }

    /// Same as [`Self::match_buyers_for_property`] for a consolidated record.
    /// Records excluded from matching (ignored, or `match_buyers` off) match nobody.
    pub async fn match_buyers_for_shared_property(
        &self,
        shared_id: SharedPropertyId,
    ) -> Result<Vec<ScoredBuyer>> {
        let shared = self
            .repo
            .get_shared_properties(&[shared_id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Shared property {} not found", shared_id))?;
        if !shared.participates_in_matching() {
            debug!("Shared property {} is excluded from matching", shared_id);
            return Ok(Vec::new());
        }
        self.score_buyers(&shared).await
    }

    async fn score_buyers(&self, subject: &dyn MatchSubject) -> Result<Vec<ScoredBuyer>> {
        let buyers = self
            .repo
            .list_active_buyers()
            .await
            .context("Failed to load buyers for property matching")?;
        let mut scored: Vec<ScoredBuyer> = buyers
            .into_iter()
            .filter_map(|buyer| {
                let outcome = self.matcher.evaluate(subject, &buyer.profile);
                if outcome.is_match {
                    debug!(
                        "{} matches {} (score {})",
                        subject.label(),
                        buyer.client.display_name(),
                        outcome.score
                    );
                }
                outcome.is_match.then_some(ScoredBuyer {
                    client: buyer.client,
                    score: outcome.score,
                })
            })
            .collect();
        scored.sort_by(|a, b| b.score.cmp(&a.score).then(a.client.id.cmp(&b.client.id)));
        debug!("{}: {} matching buyers", subject.label(), scored.len());
        Ok(scored)
    }

    async fn load_candidates(&self) -> Result<CandidateSet> {
        let shared = self
            .repo
            .list_matchable_shared_properties()
            .await
            .context("Failed to load shared properties")?;
        let private = if self.config.include_private_listings {
            self.repo
                .list_private_listings()
                .await
                .context("Failed to load private listings")?
        } else {
            Vec::new()
        };
        Ok(CandidateSet { shared, private })
    }

    fn score_candidates(&self, profile: &BuyerProfile, candidates: &CandidateSet) -> Vec<MatchedListing> {
        let shared = candidates.shared.iter().filter_map(|s| {
            let outcome = self.matcher.evaluate(s, profile);
            outcome.is_match.then(|| MatchedListing {
                listing: Listing::Shared(s.clone()),
                score: outcome.score,
            })
        });
        let private = candidates.private.iter().filter_map(|p| {
            let outcome = self.matcher.evaluate(p, profile);
            outcome.is_match.then(|| MatchedListing {
                listing: Listing::Private(p.clone()),
                score: outcome.score,
            })
        });
        let mut matches: Vec<MatchedListing> = shared.chain(private).collect();
        sort_matches(&mut matches);
        matches
    }

    /// Turns cached rows back into full records. Rows whose listing has since
    /// been deleted are dropped.
    async fn resolve_cached(&self, cached: &CachedMatches) -> Result<Vec<MatchedListing>> {
        let mut shared_ids = Vec::new();
        let mut property_ids = Vec::new();
        for record in &cached.matches {
            match record.listing {
                ListingRef::Shared(id) => shared_ids.push(id),
                ListingRef::Property(id) => property_ids.push(id),
            }
        }
        let mut shared: HashMap<SharedPropertyId, SharedProperty> = self
            .repo
            .get_shared_properties(&shared_ids)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();
        let mut private: HashMap<PropertyId, Property> = self
            .repo
            .get_properties(&property_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut matches: Vec<MatchedListing> = cached
            .matches
            .iter()
            .filter_map(|record| {
                let listing = match record.listing {
                    ListingRef::Shared(id) => shared.remove(&id).map(Listing::Shared),
                    ListingRef::Property(id) => private.remove(&id).map(Listing::Private),
                };
                listing.map(|listing| MatchedListing {
                    listing,
                    score: record.score,
                })
            })
            .collect();
        sort_matches(&mut matches);
        Ok(matches)
    }

    /// Cache-aware read of a client's matches over shared properties and,
    /// when enabled, private listings.
    ///
    /// A fresh cache generation is served without evaluating anything.
    /// Otherwise the client is recomputed and the cache replaced. If that
    /// write fails the fresh results are still returned, tagged
    /// [`MatchSource::RecomputedUncached`].
    pub async fn get_matching_properties_for_client(
        &self,
        client_id: ClientId,
        force_recompute: bool,
    ) -> Result<ClientMatches> {
        if !force_recompute {
            match self.cache.get_client_matches_from_cache(client_id).await {
                Ok(Some(cached)) if is_fresh(cached.last_updated, Utc::now()) => {
                    match self.resolve_cached(&cached).await {
                        Ok(matches) => {
                            debug!(
                                "Client {}: serving {} cached matches from {}",
                                client_id,
                                matches.len(),
                                cached.last_updated
                            );
                            return Ok(ClientMatches {
                                client_id,
                                matches,
                                source: MatchSource::Cache {
                                    last_updated: cached.last_updated,
                                },
                            });
                        }
                        Err(e) => warn!(
                            "Client {}: could not resolve cached matches, recomputing: {:#}",
                            client_id, e
                        ),
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Client {}: match cache unreadable, recomputing: {:#}", client_id, e),
            }
        }

        let profile = self.require_profile(client_id).await?;
        let candidates = self.load_candidates().await?;
        let matches = self.score_candidates(&profile, &candidates);
        info!(
            "Client {}: recomputed {} matches over {} candidates",
            client_id,
            matches.len(),
            candidates.len()
        );

        let source = match self.cache.save_client_matches(client_id, &to_items(&matches)).await {
            Ok(_) => MatchSource::Recomputed,
            Err(e) => {
                error!("Client {}: match cache write failed: {:#}", client_id, e);
                MatchSource::RecomputedUncached {
                    error: format!("{:#}", e),
                }
            }
        };
        Ok(ClientMatches {
            client_id,
            matches,
            source,
        })
    }

    /// Recomputes and stores the cache of every active buyer.
    pub async fn refresh_all_client_matches(
        &self,
        multi_progress: Option<&MultiProgress>,
    ) -> Result<RefreshStats> {
        let logger = MatchingLogger::new(JobKind::Match);
        logger.log_phase("Loading buyers and candidates", None);

        let buyers = self
            .repo
            .list_active_buyers()
            .await
            .context("Failed to load buyers for cache refresh")?;
        let candidates = self.load_candidates().await?;
        logger.log_data_loaded(buyers.len(), "active buyers");
        logger.log_data_loaded(candidates.len(), "candidate listings");

        let pb = counted_bar(multi_progress, buyers.len() as u64, "Refreshing client matches");
        let total = buyers.len();
        let candidates = &candidates;

        let outcomes: Vec<(ClientId, Result<usize>)> = stream::iter(buyers.iter())
            .map(|buyer| async move {
                let matches = self.score_candidates(&buyer.profile, candidates);
                let saved = self
                    .cache
                    .save_client_matches(buyer.client.id, &to_items(&matches))
                    .await;
                (buyer.client.id, saved)
            })
            .buffer_unordered(self.config.refresh_concurrency.max(1))
            .collect()
            .await;

        let mut stats = RefreshStats::default();
        for (done, (client_id, outcome)) in outcomes.into_iter().enumerate() {
            pb.inc(1);
            logger.log_progress_update(done + 1, total);
            match outcome {
                Ok(written) => {
                    stats.clients_processed += 1;
                    stats.total_matches += written;
                }
                Err(e) => {
                    stats.clients_failed += 1;
                    logger.log_error(&format!("Client {}: {:#}", client_id, e));
                }
            }
        }
        pb.finish_with_message("Client matches refreshed");

        logger.log_completion(&format!(
            "{} clients refreshed, {} failed, {} matches cached",
            stats.clients_processed, stats.clients_failed, stats.total_matches
        ));
        Ok(stats)
    }

    pub async fn delete_shared_property(&self, shared_id: SharedPropertyId) -> Result<bool> {
        let deleted = self.repo.delete_shared_property(shared_id).await?;
        if !deleted {
            warn!("Shared property {} not found, nothing deleted", shared_id);
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InMemoryRepository, MatchRepository};
    use crate::matching::criteria::evaluate_match;
    use crate::models::{Buyer, MatchOutcome};
    use crate::test_support::{client, listing, private_listing, profile, shared};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingMatcher {
        calls: AtomicUsize,
    }

    impl CriteriaMatcher for CountingMatcher {
        fn evaluate(&self, subject: &dyn MatchSubject, profile: &BuyerProfile) -> MatchOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            evaluate_match(subject, profile)
        }
    }

    fn budget_buyer(id: ClientId, max_price: f64) -> Buyer {
        let mut p = profile(id);
        p.max_price = Some(max_price);
        Buyer {
            client: client(id),
            profile: p,
        }
    }

    async fn seeded_repo() -> Arc<InMemoryRepository> {
        let repo = Arc::new(InMemoryRepository::new());
        repo.insert_shared(shared(1)).await;
        let mut pricey = shared(2);
        pricey.price = Some(340_000.0);
        repo.insert_shared(pricey).await;
        let mut ignored = shared(3);
        ignored.is_ignored = true;
        repo.insert_shared(ignored).await;
        repo.insert_property(private_listing(10)).await;
        repo.insert_property(listing(11)).await;
        repo.insert_buyer(budget_buyer(1, 300_000.0)).await;
        repo
    }

    fn refs(matches: &ClientMatches) -> Vec<ListingRef> {
        matches.matches.iter().map(|m| m.listing.reference()).collect()
    }

    #[tokio::test]
    async fn test_cache_hit_skips_recompute() {
        let repo = seeded_repo().await;
        let service =
            MatchingService::with_matcher(repo, EngineConfig::default(), CountingMatcher::default());

        let first = service.get_matching_properties_for_client(1, false).await.unwrap();
        assert_eq!(first.source, MatchSource::Recomputed);
        assert_eq!(
            refs(&first),
            vec![ListingRef::Shared(1), ListingRef::Property(10), ListingRef::Shared(2)]
        );
        let calls = service.matcher().calls.load(Ordering::SeqCst);
        assert_eq!(calls, 3);

        let second = service.get_matching_properties_for_client(1, false).await.unwrap();
        assert!(matches!(second.source, MatchSource::Cache { .. }));
        assert_eq!(second.matches, first.matches);
        assert_eq!(service.matcher().calls.load(Ordering::SeqCst), calls);

        service.get_matching_properties_for_client(1, true).await.unwrap();
        assert_eq!(service.matcher().calls.load(Ordering::SeqCst), calls * 2);
    }

    #[tokio::test]
    async fn test_stale_cache_is_recomputed() {
        let repo = seeded_repo().await;
        let service = MatchingService::new(Arc::clone(&repo), EngineConfig::default());
        service.get_matching_properties_for_client(1, false).await.unwrap();
        repo.age_client_matches(1, chrono::Duration::minutes(16)).await;

        let again = service.get_matching_properties_for_client(1, false).await.unwrap();
        assert_eq!(again.source, MatchSource::Recomputed);
        assert_eq!(repo.match_write_count(), 2);
    }

    #[tokio::test]
    async fn test_recompute_replaces_previous_generation() {
        let repo = seeded_repo().await;
        let service = MatchingService::new(Arc::clone(&repo), EngineConfig::default());
        service.get_matching_properties_for_client(1, false).await.unwrap();

        let mut pricier = shared(2);
        pricier.price = Some(500_000.0);
        repo.insert_shared(pricier).await;
        service.get_matching_properties_for_client(1, true).await.unwrap();

        let cached = service
            .cache()
            .get_client_matches_from_cache(1)
            .await
            .unwrap()
            .unwrap();
        let mut cached_refs: Vec<ListingRef> = cached.matches.iter().map(|m| m.listing).collect();
        cached_refs.sort();
        assert_eq!(cached_refs, vec![ListingRef::Shared(1), ListingRef::Property(10)]);
    }

    #[tokio::test]
    async fn test_cache_write_failure_still_returns_results() {
        let repo = seeded_repo().await;
        let service = MatchingService::new(Arc::clone(&repo), EngineConfig::default());
        repo.set_fail_match_writes(true);

        let result = service.get_matching_properties_for_client(1, false).await.unwrap();
        assert_eq!(result.matches.len(), 3);
        assert!(matches!(result.source, MatchSource::RecomputedUncached { .. }));

        repo.set_fail_match_writes(false);
        let next = service.get_matching_properties_for_client(1, false).await.unwrap();
        assert_eq!(next.source, MatchSource::Recomputed);
    }

    #[tokio::test]
    async fn test_no_matches_leaves_cache_empty() {
        let repo = seeded_repo().await;
        repo.insert_buyer(budget_buyer(2, 50_000.0)).await;
        let service = MatchingService::new(Arc::clone(&repo), EngineConfig::default());

        let result = service.get_matching_properties_for_client(2, false).await.unwrap();
        assert!(result.matches.is_empty());
        assert!(repo.get_client_matches(2).await.unwrap().is_empty());
        let again = service.get_matching_properties_for_client(2, false).await.unwrap();
        assert_eq!(again.source, MatchSource::Recomputed);
    }

    #[tokio::test]
    async fn test_private_listings_can_be_disabled() {
        let repo = seeded_repo().await;
        let config = EngineConfig {
            include_private_listings: false,
            ..EngineConfig::default()
        };
        let service = MatchingService::new(repo, config);
        let result = service.get_matching_properties_for_client(1, false).await.unwrap();
        assert_eq!(refs(&result), vec![ListingRef::Shared(1), ListingRef::Shared(2)]);
    }

    #[tokio::test]
    async fn test_cached_rows_for_deleted_listings_are_dropped() {
        let repo = seeded_repo().await;
        let service = MatchingService::new(Arc::clone(&repo), EngineConfig::default());
        service.get_matching_properties_for_client(1, false).await.unwrap();

        assert!(service.delete_shared_property(1).await.unwrap());
        let result = service.get_matching_properties_for_client(1, false).await.unwrap();
        assert!(matches!(result.source, MatchSource::Cache { .. }));
        assert_eq!(refs(&result), vec![ListingRef::Property(10), ListingRef::Shared(2)]);
    }

    #[tokio::test]
    async fn test_both_directions_agree() {
        let repo = Arc::new(InMemoryRepository::new());
        let prices = [250_000.0, 300_000.0, 355_000.0, 420_000.0];
        for (i, price) in prices.iter().enumerate() {
            let mut p = listing(i as i64 + 1);
            p.price = Some(*price);
            p.size = Some(70.0 + 15.0 * i as f64);
            repo.insert_property(p).await;
        }
        for (id, budget, min_size) in [(1, 300_000.0, 80.0), (2, 400_000.0, 110.0), (3, 200_000.0, 60.0)] {
            let mut buyer = budget_buyer(id, budget);
            buyer.profile.min_size = Some(min_size);
            repo.insert_buyer(buyer).await;
        }
        let service = MatchingService::new(Arc::clone(&repo), EngineConfig::default());

        for client_id in 1..=3 {
            let forward = service.match_properties_for_buyer(client_id).await.unwrap();
            for property_id in 1..=4 {
                let inverse = service.match_buyers_for_property(property_id).await.unwrap();
                let forward_score = forward
                    .iter()
                    .find(|s| s.property.id == property_id)
                    .map(|s| s.score);
                let inverse_score = inverse
                    .iter()
                    .find(|s| s.client.id == client_id)
                    .map(|s| s.score);
                assert_eq!(forward_score, inverse_score, "client {} property {}", client_id, property_id);
            }
        }
    }

    #[tokio::test]
    async fn test_excluded_shared_property_matches_nobody() {
        let repo = seeded_repo().await;
        let service = MatchingService::new(repo, EngineConfig::default());
        assert!(service.match_buyers_for_shared_property(3).await.unwrap().is_empty());
        assert_eq!(service.match_buyers_for_shared_property(1).await.unwrap().len(), 1);
        assert!(service.match_buyers_for_shared_property(99).await.is_err());
    }

    #[tokio::test]
    async fn test_refresh_all_client_matches() {
        let repo = seeded_repo().await;
        repo.insert_buyer(budget_buyer(2, 350_000.0)).await;
        repo.insert_buyer(budget_buyer(3, 300_000.0)).await;
        repo.set_buyer_active(3, false).await;
        let service = MatchingService::new(Arc::clone(&repo), EngineConfig::default());

        let stats = service.refresh_all_client_matches(None).await.unwrap();
        assert_eq!(
            stats,
            RefreshStats {
                clients_processed: 2,
                clients_failed: 0,
                total_matches: 6,
            }
        );
        assert!(repo.get_client_matches(3).await.unwrap().is_empty());

        repo.set_fail_match_writes(true);
        let failed = service.refresh_all_client_matches(None).await.unwrap();
        assert_eq!(failed.clients_failed, 2);
        assert_eq!(failed.clients_processed, 0);
    }
}
