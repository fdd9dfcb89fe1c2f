// src/models/matching.rs - Match outcomes, cache rows and job results
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::models::buyer::{Client, ClientId};
use crate::models::property::{Property, PropertyId, SharedProperty, SharedPropertyId};

/// Result of evaluating one property against one buyer.
/// `score` is 0 exactly when `is_match` is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub is_match: bool,
    pub score: u8,
}

impl MatchOutcome {
    pub const REJECTED: MatchOutcome = MatchOutcome {
        is_match: false,
        score: 0,
    };

    pub fn matched(score: u8) -> Self {
        debug_assert!(score > 0);
        Self {
            is_match: true,
            score,
        }
    }
}

/// What a cached match row points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ListingRef {
    Shared(SharedPropertyId),
    Property(PropertyId),
}

impl fmt::Display for ListingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListingRef::Shared(id) => write!(f, "shared:{}", id),
            ListingRef::Property(id) => write!(f, "property:{}", id),
        }
    }
}

/// A match to be written to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchItem {
    pub listing: ListingRef,
    pub score: u8,
}

/// A persisted match-cache row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub client_id: ClientId,
    pub listing: ListingRef,
    pub score: u8,
    pub created_at: DateTime<Utc>,
}

/// The current cache generation of one client.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedMatches {
    pub matches: Vec<MatchRecord>,
    /// Oldest `created_at` among the rows.
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Listing {
    Shared(SharedProperty),
    Private(Property),
}

impl Listing {
    pub fn reference(&self) -> ListingRef {
        match self {
            Listing::Shared(shared) => ListingRef::Shared(shared.id),
            Listing::Private(property) => ListingRef::Property(property.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedListing {
    pub listing: Listing,
    pub score: u8,
}

/// Where a client's match list came from.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchSource {
    Cache { last_updated: DateTime<Utc> },
    Recomputed,
    /// Fresh results that could not be written back to the cache.
    RecomputedUncached { error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientMatches {
    pub client_id: ClientId,
    pub matches: Vec<MatchedListing>,
    pub source: MatchSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredProperty {
    pub property: Property,
    pub score: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredBuyer {
    pub client: Client,
    pub score: u8,
}

/// Summary of one deduplication scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DedupScanResult {
    pub scan_id: Uuid,
    pub clusters_found: usize,
    pub multiagency_properties: usize,
    pub exclusive_properties: usize,
    pub properties_updated: usize,
    pub shared_properties_created: usize,
    pub excluded_candidates: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshStats {
    pub clients_processed: usize,
    pub clients_failed: usize,
    pub total_matches: usize,
}
