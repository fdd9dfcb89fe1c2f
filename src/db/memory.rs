// src/db/memory.rs - In-process repository for tests and local dry runs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{BuyerRepository, MatchRepository, PropertyRepository, SharedPropertyRepository};
use crate::geometry::GeoPoint;
use crate::models::{
    Buyer, ClientId, ListingClassification, ListingRef, MatchItem, MatchRecord,
    NewSharedProperty, OwnerType, Property, PropertyId, SharedProperty, SharedPropertyId,
};

#[derive(Default)]
struct Store {
    properties: BTreeMap<PropertyId, Property>,
    shared: BTreeMap<SharedPropertyId, SharedProperty>,
    buyers: BTreeMap<ClientId, (Buyer, bool)>,
    notes: HashMap<SharedPropertyId, Vec<String>>,
}

/// Keeps every table in memory. Each client's cached matches are an immutable
/// snapshot that a replace swaps out whole.
pub struct InMemoryRepository {
    store: RwLock<Store>,
    matches: RwLock<HashMap<ClientId, Arc<Vec<MatchRecord>>>>,
    next_shared_id: AtomicI64,
    fail_match_writes: AtomicBool,
    match_writes: AtomicUsize,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            store: RwLock::new(Store::default()),
            matches: RwLock::new(HashMap::new()),
            next_shared_id: AtomicI64::new(1),
            fail_match_writes: AtomicBool::new(false),
            match_writes: AtomicUsize::new(0),
        }
    }

    pub async fn insert_property(&self, property: Property) {
        self.store.write().await.properties.insert(property.id, property);
    }

    pub async fn insert_buyer(&self, buyer: Buyer) {
        self.store
            .write()
            .await
            .buyers
            .insert(buyer.client.id, (buyer, true));
    }

    pub async fn set_buyer_active(&self, client_id: ClientId, active: bool) {
        if let Some(entry) = self.store.write().await.buyers.get_mut(&client_id) {
            entry.1 = active;
        }
    }

    /// Stores `shared` under its own id and keeps generated ids above it.
    pub async fn insert_shared(&self, shared: SharedProperty) {
        self.next_shared_id.fetch_max(shared.id + 1, Ordering::SeqCst);
        self.store.write().await.shared.insert(shared.id, shared);
    }

    pub async fn add_note(&self, shared_id: SharedPropertyId, body: &str) {
        self.store
            .write()
            .await
            .notes
            .entry(shared_id)
            .or_default()
            .push(body.to_string());
    }

    pub async fn note_count(&self, shared_id: SharedPropertyId) -> usize {
        self.store
            .read()
            .await
            .notes
            .get(&shared_id)
            .map_or(0, Vec::len)
    }

    pub async fn property(&self, id: PropertyId) -> Option<Property> {
        self.store.read().await.properties.get(&id).cloned()
    }

    /// Makes subsequent match-cache writes fail, as an unreachable database would.
    pub fn set_fail_match_writes(&self, fail: bool) {
        self.fail_match_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful match-cache replaces so far.
    pub fn match_write_count(&self) -> usize {
        self.match_writes.load(Ordering::SeqCst)
    }

    /// Ages every cached row of `client_id` by `by`.
    pub async fn age_client_matches(&self, client_id: ClientId, by: chrono::Duration) {
        let mut matches = self.matches.write().await;
        if let Some(snapshot) = matches.get(&client_id).cloned() {
            let aged = snapshot
                .iter()
                .cloned()
                .map(|mut record| {
                    record.created_at -= by;
                    record
                })
                .collect();
            matches.insert(client_id, Arc::new(aged));
        }
    }
}

#[async_trait]
impl PropertyRepository for InMemoryRepository {
    async fn get_properties(&self, ids: &[PropertyId]) -> Result<Vec<Property>> {
        let store = self.store.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| store.properties.get(id).cloned())
            .collect())
    }

    async fn list_properties(&self) -> Result<Vec<Property>> {
        Ok(self.store.read().await.properties.values().cloned().collect())
    }

    async fn list_dedup_candidates(&self) -> Result<Vec<Property>> {
        Ok(self
            .store
            .read()
            .await
            .properties
            .values()
            .filter(|p| p.portal.is_some() || p.agency_name.is_some())
            .cloned()
            .collect())
    }

    async fn list_private_listings(&self) -> Result<Vec<Property>> {
        Ok(self
            .store
            .read()
            .await
            .properties
            .values()
            .filter(|p| p.owner_type == OwnerType::Private && p.shared_property_id.is_none())
            .cloned()
            .collect())
    }

    async fn update_classifications(
        &self,
        updates: &[(PropertyId, ListingClassification)],
    ) -> Result<usize> {
        let mut store = self.store.write().await;
        let now = Utc::now();
        let mut written = 0;
        for (id, classification) in updates {
            if let Some(property) = store.properties.get_mut(id) {
                property.is_multiagency = classification.is_multiagency;
                property.exclusivity_hint = classification.exclusivity_hint;
                property.shared_property_id = classification.shared_property_id;
                property.updated_at = now;
                written += 1;
            }
        }
        Ok(written)
    }

    async fn list_properties_missing_location(&self) -> Result<Vec<Property>> {
        Ok(self
            .store
            .read()
            .await
            .properties
            .values()
            .filter(|p| p.location.is_none() && p.address.is_some())
            .cloned()
            .collect())
    }

    async fn set_property_location(&self, id: PropertyId, location: GeoPoint) -> Result<()> {
        let mut store = self.store.write().await;
        let property = store
            .properties
            .get_mut(&id)
            .ok_or_else(|| anyhow!("Property {} not found", id))?;
        property.location = Some(location);
        property.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl SharedPropertyRepository for InMemoryRepository {
    async fn get_shared_properties(&self, ids: &[SharedPropertyId]) -> Result<Vec<SharedProperty>> {
        let store = self.store.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| store.shared.get(id).cloned())
            .collect())
    }

    async fn list_shared_properties(&self) -> Result<Vec<SharedProperty>> {
        Ok(self.store.read().await.shared.values().cloned().collect())
    }

    async fn list_matchable_shared_properties(&self) -> Result<Vec<SharedProperty>> {
        Ok(self
            .store
            .read()
            .await
            .shared
            .values()
            .filter(|s| s.participates_in_matching())
            .cloned()
            .collect())
    }

    async fn insert_shared_property(&self, new: NewSharedProperty) -> Result<SharedProperty> {
        let id = self.next_shared_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let shared = SharedProperty {
            id,
            address: new.address,
            address_key: new.address_key,
            city: new.city,
            price: new.price,
            size: new.size,
            property_type: new.property_type,
            rooms: new.rooms,
            location: new.location,
            agencies: new.agencies,
            is_multiagency: new.is_multiagency,
            is_ignored: false,
            is_acquired: false,
            is_favorite: false,
            match_buyers: new.match_buyers,
            created_at: now,
            updated_at: now,
        };
        self.store.write().await.shared.insert(id, shared.clone());
        Ok(shared)
    }

    async fn update_shared_property(&self, shared: &SharedProperty) -> Result<()> {
        let mut store = self.store.write().await;
        let existing = store
            .shared
            .get_mut(&shared.id)
            .ok_or_else(|| anyhow!("Shared property {} not found", shared.id))?;
        *existing = shared.clone();
        existing.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_shared_property(&self, id: SharedPropertyId) -> Result<bool> {
        // Lock order: store, then matches.
        let mut store = self.store.write().await;
        if store.shared.remove(&id).is_none() {
            return Ok(false);
        }
        store.notes.remove(&id);
        for property in store.properties.values_mut() {
            if property.shared_property_id == Some(id) {
                property.shared_property_id = None;
            }
        }

        let mut matches = self.matches.write().await;
        for snapshot in matches.values_mut() {
            if snapshot.iter().any(|r| r.listing == ListingRef::Shared(id)) {
                let kept: Vec<MatchRecord> = snapshot
                    .iter()
                    .filter(|r| r.listing != ListingRef::Shared(id))
                    .cloned()
                    .collect();
                *snapshot = Arc::new(kept);
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl BuyerRepository for InMemoryRepository {
    async fn get_buyer(&self, client_id: ClientId) -> Result<Option<Buyer>> {
        Ok(self
            .store
            .read()
            .await
            .buyers
            .get(&client_id)
            .map(|(buyer, _)| buyer.clone()))
    }

    async fn list_active_buyers(&self) -> Result<Vec<Buyer>> {
        Ok(self
            .store
            .read()
            .await
            .buyers
            .values()
            .filter(|(_, active)| *active)
            .map(|(buyer, _)| buyer.clone())
            .collect())
    }
}

#[async_trait]
impl MatchRepository for InMemoryRepository {
    async fn replace_client_matches(
        &self,
        client_id: ClientId,
        items: &[MatchItem],
        created_at: DateTime<Utc>,
    ) -> Result<usize> {
        if self.fail_match_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("match cache unavailable"));
        }
        let mut seen = HashSet::new();
        for item in items {
            if !seen.insert(item.listing) {
                return Err(anyhow!(
                    "Duplicate listing {} in match set for client {}",
                    item.listing,
                    client_id
                ));
            }
        }

        let snapshot: Vec<MatchRecord> = items
            .iter()
            .map(|item| MatchRecord {
                client_id,
                listing: item.listing,
                score: item.score,
                created_at,
            })
            .collect();
        let written = snapshot.len();
        self.matches
            .write()
            .await
            .insert(client_id, Arc::new(snapshot));
        self.match_writes.fetch_add(1, Ordering::SeqCst);
        Ok(written)
    }

    async fn get_client_matches(&self, client_id: ClientId) -> Result<Vec<MatchRecord>> {
        let snapshot = self.matches.read().await.get(&client_id).cloned();
        Ok(snapshot.map(|s| s.as_ref().clone()).unwrap_or_default())
    }
}
