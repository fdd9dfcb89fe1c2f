// src/db/mod.rs - Storage seams used by the matching and dedup services
//!
//! The services never talk to PostgreSQL directly; they go through these
//! traits so the same code runs against [`postgres::PgRepository`] in
//! production and [`memory::InMemoryRepository`] in tests and local runs.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::geometry::GeoPoint;
use crate::models::{
    Buyer, ClientId, ListingClassification, MatchItem, MatchRecord, NewSharedProperty, Property,
    PropertyId, SharedProperty, SharedPropertyId,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PgRepository;

#[async_trait]
pub trait PropertyRepository: Send + Sync {
    async fn get_properties(&self, ids: &[PropertyId]) -> Result<Vec<Property>>;

    async fn list_properties(&self) -> Result<Vec<Property>>;

    /// Listings ingested from portals or carrying an agency name, ordered by id.
    async fn list_dedup_candidates(&self) -> Result<Vec<Property>>;

    /// Private-owner listings not folded into any shared property.
    async fn list_private_listings(&self) -> Result<Vec<Property>>;

    /// Writes the dedup-owned columns. Returns the number of rows written.
    async fn update_classifications(
        &self,
        updates: &[(PropertyId, ListingClassification)],
    ) -> Result<usize>;

    async fn list_properties_missing_location(&self) -> Result<Vec<Property>>;

    async fn set_property_location(&self, id: PropertyId, location: GeoPoint) -> Result<()>;
}

#[async_trait]
pub trait SharedPropertyRepository: Send + Sync {
    async fn get_shared_properties(&self, ids: &[SharedPropertyId]) -> Result<Vec<SharedProperty>>;

    async fn list_shared_properties(&self) -> Result<Vec<SharedProperty>>;

    /// Shared properties with `match_buyers` set and not ignored.
    async fn list_matchable_shared_properties(&self) -> Result<Vec<SharedProperty>>;

    async fn insert_shared_property(&self, new: NewSharedProperty) -> Result<SharedProperty>;

    /// Persists agencies, multi-agency flag and consolidated attributes.
    async fn update_shared_property(&self, shared: &SharedProperty) -> Result<()>;

    /// Removes the record together with its notes and cached matches.
    /// Returns false when nothing was deleted.
    async fn delete_shared_property(&self, id: SharedPropertyId) -> Result<bool>;
}

#[async_trait]
pub trait BuyerRepository: Send + Sync {
    async fn get_buyer(&self, client_id: ClientId) -> Result<Option<Buyer>>;

    async fn list_active_buyers(&self) -> Result<Vec<Buyer>>;
}

#[async_trait]
pub trait MatchRepository: Send + Sync {
    /// Atomically replaces every cached row of `client_id` with `items`.
    /// Readers see either the previous generation or the new one.
    async fn replace_client_matches(
        &self,
        client_id: ClientId,
        items: &[MatchItem],
        created_at: DateTime<Utc>,
    ) -> Result<usize>;

    async fn get_client_matches(&self, client_id: ClientId) -> Result<Vec<MatchRecord>>;
}

/// Everything the engine needs from storage.
pub trait Repository:
    PropertyRepository + SharedPropertyRepository + BuyerRepository + MatchRepository
{
}

impl<T> Repository for T where
    T: PropertyRepository + SharedPropertyRepository + BuyerRepository + MatchRepository
{
}
