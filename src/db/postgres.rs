// src/db/postgres.rs - PostgreSQL-backed repositories (bb8 pool, tokio-postgres)
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use postgres_types::{Json, ToSql};
use tokio_postgres::Row;

use super::{BuyerRepository, MatchRepository, PropertyRepository, SharedPropertyRepository};
use crate::geometry::GeoPoint;
use crate::models::{
    AgencyListing, Buyer, BuyerProfile, Client, ClientId, ListingClassification, ListingRef,
    MatchItem, MatchRecord, NewSharedProperty, Property, PropertyId, SearchArea, SharedProperty,
    SharedPropertyId,
};
use crate::utils::constants::MATCH_INSERT_BATCH_SIZE;
use crate::utils::db_connect::PgPool;

const PROPERTY_COLUMNS: &str = "id, address, city, price, size, property_type, rooms, bedrooms, \
     latitude, longitude, owner_type, portal, agency_name, external_id, external_link, \
     is_multiagency, exclusivity_hint, shared_property_id, created_at, updated_at";

const SHARED_COLUMNS: &str = "id, address, address_key, city, price, size, property_type, rooms, \
     latitude, longitude, agencies, is_multiagency, is_ignored, is_acquired, is_favorite, \
     match_buyers, created_at, updated_at";

const BUYER_SELECT: &str = "SELECT c.id, c.first_name, c.last_name, c.email, c.phone, \
     b.min_size, b.max_price, b.property_type, b.rooms, b.search_area \
     FROM public.buyers b JOIN public.clients c ON c.id = b.client_id";

#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn location_from_row(row: &Row) -> Option<GeoPoint> {
    let lat: Option<f64> = row.get("latitude");
    let lng: Option<f64> = row.get("longitude");
    match (lat, lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
        _ => None,
    }
}

fn property_from_row(row: &Row) -> Result<Property> {
    let owner_type: String = row.get("owner_type");
    Ok(Property {
        id: row.get("id"),
        address: row.get("address"),
        city: row.get("city"),
        price: row.get("price"),
        size: row.get("size"),
        property_type: row.get("property_type"),
        rooms: row.get("rooms"),
        bedrooms: row.get("bedrooms"),
        location: location_from_row(row),
        owner_type: owner_type
            .parse()
            .context("Invalid owner_type on property row")?,
        portal: row.get("portal"),
        agency_name: row.get("agency_name"),
        external_id: row.get("external_id"),
        external_link: row.get("external_link"),
        is_multiagency: row.get("is_multiagency"),
        exclusivity_hint: row.get("exclusivity_hint"),
        shared_property_id: row.get("shared_property_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn shared_from_row(row: &Row) -> SharedProperty {
    let Json(agencies): Json<Vec<AgencyListing>> = row.get("agencies");
    SharedProperty {
        id: row.get("id"),
        address: row.get("address"),
        address_key: row.get("address_key"),
        city: row.get("city"),
        price: row.get("price"),
        size: row.get("size"),
        property_type: row.get("property_type"),
        rooms: row.get("rooms"),
        location: location_from_row(row),
        agencies,
        is_multiagency: row.get("is_multiagency"),
        is_ignored: row.get("is_ignored"),
        is_acquired: row.get("is_acquired"),
        is_favorite: row.get("is_favorite"),
        match_buyers: row.get("match_buyers"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn buyer_from_row(row: &Row) -> Buyer {
    let client_id: ClientId = row.get("id");
    let raw_area: Option<serde_json::Value> = row.get("search_area");
    Buyer {
        client: Client {
            id: client_id,
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            email: row.get("email"),
            phone: row.get("phone"),
        },
        profile: BuyerProfile {
            client_id,
            min_size: row.get("min_size"),
            max_price: row.get("max_price"),
            property_type: row.get("property_type"),
            rooms: row.get("rooms"),
            search_area: raw_area
                .filter(|v| !v.is_null())
                .map(|v| SearchArea::from_stored(&v)),
        },
    }
}

#[async_trait]
impl PropertyRepository for PgRepository {
    async fn get_properties(&self, ids: &[PropertyId]) -> Result<Vec<Property>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for get_properties")?;
        let sql = format!(
            "SELECT {} FROM public.properties WHERE id = ANY($1)",
            PROPERTY_COLUMNS
        );
        let rows = conn
            .query(sql.as_str(), &[&ids])
            .await
            .context("Failed to query properties by id")?;
        rows.iter().map(property_from_row).collect()
    }

    async fn list_properties(&self) -> Result<Vec<Property>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for list_properties")?;
        let sql = format!("SELECT {} FROM public.properties ORDER BY id", PROPERTY_COLUMNS);
        let rows = conn
            .query(sql.as_str(), &[])
            .await
            .context("Failed to query properties")?;
        rows.iter().map(property_from_row).collect()
    }

    async fn list_dedup_candidates(&self) -> Result<Vec<Property>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for list_dedup_candidates")?;
        let sql = format!(
            "SELECT {} FROM public.properties
             WHERE portal IS NOT NULL OR agency_name IS NOT NULL
             ORDER BY id",
            PROPERTY_COLUMNS
        );
        let rows = conn
            .query(sql.as_str(), &[])
            .await
            .context("Failed to query dedup candidates")?;
        rows.iter().map(property_from_row).collect()
    }

    async fn list_private_listings(&self) -> Result<Vec<Property>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for list_private_listings")?;
        let sql = format!(
            "SELECT {} FROM public.properties
             WHERE owner_type = 'private' AND shared_property_id IS NULL
             ORDER BY id",
            PROPERTY_COLUMNS
        );
        let rows = conn
            .query(sql.as_str(), &[])
            .await
            .context("Failed to query private listings")?;
        rows.iter().map(property_from_row).collect()
    }

    async fn update_classifications(
        &self,
        updates: &[(PropertyId, ListingClassification)],
    ) -> Result<usize> {
        if updates.is_empty() {
            return Ok(0);
        }
        let mut conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for update_classifications")?;
        let transaction = conn
            .transaction()
            .await
            .context("Failed to start transaction for classification update")?;
        let statement = transaction
            .prepare(
                "UPDATE public.properties
                 SET is_multiagency = $2, exclusivity_hint = $3, shared_property_id = $4,
                     updated_at = CURRENT_TIMESTAMP
                 WHERE id = $1",
            )
            .await
            .context("Failed to prepare classification update")?;

        let mut written = 0usize;
        for (id, classification) in updates {
            written += transaction
                .execute(
                    &statement,
                    &[
                        id,
                        &classification.is_multiagency,
                        &classification.exclusivity_hint,
                        &classification.shared_property_id,
                    ],
                )
                .await
                .with_context(|| format!("Failed to update classification of property {}", id))?
                as usize;
        }
        transaction
            .commit()
            .await
            .context("Failed to commit classification update")?;
        debug!("Updated classification of {} properties", written);
        Ok(written)
    }

    async fn list_properties_missing_location(&self) -> Result<Vec<Property>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for list_properties_missing_location")?;
        let sql = format!(
            "SELECT {} FROM public.properties
             WHERE (latitude IS NULL OR longitude IS NULL) AND address IS NOT NULL
             ORDER BY id",
            PROPERTY_COLUMNS
        );
        let rows = conn
            .query(sql.as_str(), &[])
            .await
            .context("Failed to query properties missing location")?;
        rows.iter().map(property_from_row).collect()
    }

    async fn set_property_location(&self, id: PropertyId, location: GeoPoint) -> Result<()> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for set_property_location")?;
        conn.execute(
            "UPDATE public.properties
             SET latitude = $2, longitude = $3, updated_at = CURRENT_TIMESTAMP
             WHERE id = $1",
            &[&id, &location.lat, &location.lng],
        )
        .await
        .with_context(|| format!("Failed to set location of property {}", id))?;
        Ok(())
    }
}

#[async_trait]
impl SharedPropertyRepository for PgRepository {
    async fn get_shared_properties(&self, ids: &[SharedPropertyId]) -> Result<Vec<SharedProperty>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for get_shared_properties")?;
        let sql = format!(
            "SELECT {} FROM public.shared_properties WHERE id = ANY($1)",
            SHARED_COLUMNS
        );
        let rows = conn
            .query(sql.as_str(), &[&ids])
            .await
            .context("Failed to query shared properties by id")?;
        Ok(rows.iter().map(shared_from_row).collect())
    }

    async fn list_shared_properties(&self) -> Result<Vec<SharedProperty>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for list_shared_properties")?;
        let sql = format!("SELECT {} FROM public.shared_properties ORDER BY id", SHARED_COLUMNS);
        let rows = conn
            .query(sql.as_str(), &[])
            .await
            .context("Failed to query shared properties")?;
        Ok(rows.iter().map(shared_from_row).collect())
    }

    async fn list_matchable_shared_properties(&self) -> Result<Vec<SharedProperty>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for list_matchable_shared_properties")?;
        let sql = format!(
            "SELECT {} FROM public.shared_properties
             WHERE match_buyers AND NOT is_ignored
             ORDER BY id",
            SHARED_COLUMNS
        );
        let rows = conn
            .query(sql.as_str(), &[])
            .await
            .context("Failed to query matchable shared properties")?;
        Ok(rows.iter().map(shared_from_row).collect())
    }

    async fn insert_shared_property(&self, new: NewSharedProperty) -> Result<SharedProperty> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for insert_shared_property")?;
        let sql = format!(
            "INSERT INTO public.shared_properties (
                address, address_key, city, price, size, property_type, rooms,
                latitude, longitude, agencies, is_multiagency, match_buyers
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING {}",
            SHARED_COLUMNS
        );
        let latitude = new.location.map(|p| p.lat);
        let longitude = new.location.map(|p| p.lng);
        let agencies = Json(&new.agencies);
        let row = conn
            .query_one(
                sql.as_str(),
                &[
                    &new.address,
                    &new.address_key,
                    &new.city,
                    &new.price,
                    &new.size,
                    &new.property_type,
                    &new.rooms,
                    &latitude,
                    &longitude,
                    &agencies,
                    &new.is_multiagency,
                    &new.match_buyers,
                ],
            )
            .await
            .with_context(|| format!("Failed to insert shared property for '{}'", new.address))?;
        Ok(shared_from_row(&row))
    }

    async fn update_shared_property(&self, shared: &SharedProperty) -> Result<()> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for update_shared_property")?;
        let agencies = Json(&shared.agencies);
        conn.execute(
            "UPDATE public.shared_properties
             SET agencies = $2, is_multiagency = $3, price = $4, size = $5, rooms = $6,
                 property_type = $7, updated_at = CURRENT_TIMESTAMP
             WHERE id = $1",
            &[
                &shared.id,
                &agencies,
                &shared.is_multiagency,
                &shared.price,
                &shared.size,
                &shared.rooms,
                &shared.property_type,
            ],
        )
        .await
        .with_context(|| format!("Failed to update shared property {}", shared.id))?;
        Ok(())
    }

    async fn delete_shared_property(&self, id: SharedPropertyId) -> Result<bool> {
        let mut conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for delete_shared_property")?;
        let transaction = conn
            .transaction()
            .await
            .context("Failed to start transaction for shared property delete")?;
        // Notes and cached matches go with the row through ON DELETE CASCADE.
        transaction
            .execute(
                "UPDATE public.properties SET shared_property_id = NULL WHERE shared_property_id = $1",
                &[&id],
            )
            .await
            .context("Failed to detach properties from shared property")?;
        let deleted = transaction
            .execute("DELETE FROM public.shared_properties WHERE id = $1", &[&id])
            .await
            .with_context(|| format!("Failed to delete shared property {}", id))?;
        transaction
            .commit()
            .await
            .context("Failed to commit shared property delete")?;
        if deleted > 0 {
            info!("Deleted shared property {}", id);
        }
        Ok(deleted > 0)
    }
}

#[async_trait]
impl BuyerRepository for PgRepository {
    async fn get_buyer(&self, client_id: ClientId) -> Result<Option<Buyer>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for get_buyer")?;
        let sql = format!("{} WHERE c.id = $1", BUYER_SELECT);
        let row = conn
            .query_opt(sql.as_str(), &[&client_id])
            .await
            .with_context(|| format!("Failed to query buyer {}", client_id))?;
        Ok(row.as_ref().map(buyer_from_row))
    }

    async fn list_active_buyers(&self) -> Result<Vec<Buyer>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for list_active_buyers")?;
        let sql = format!("{} WHERE b.active ORDER BY c.id", BUYER_SELECT);
        let rows = conn
            .query(sql.as_str(), &[])
            .await
            .context("Failed to query active buyers")?;
        Ok(rows.iter().map(buyer_from_row).collect())
    }
}

#[async_trait]
impl MatchRepository for PgRepository {
    async fn replace_client_matches(
        &self,
        client_id: ClientId,
        items: &[MatchItem],
        created_at: DateTime<Utc>,
    ) -> Result<usize> {
        let mut conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for replace_client_matches")?;

        // Delete and insert commit together so readers never see a half-written set.
        let transaction = conn
            .transaction()
            .await
            .context("Failed to start transaction for match cache replace")?;

        let deleted = transaction
            .execute(
                "DELETE FROM public.client_property_matches WHERE client_id = $1",
                &[&client_id],
            )
            .await
            .with_context(|| format!("Failed to clear cached matches of client {}", client_id))?;

        let mut inserted = 0usize;
        for chunk in items.chunks(MATCH_INSERT_BATCH_SIZE) {
            let mut values_clause_parts = Vec::with_capacity(chunk.len());
            let mut params: Vec<Box<dyn ToSql + Sync + Send>> = Vec::with_capacity(chunk.len() * 5);
            let mut param_idx = 1;

            for item in chunk {
                let (shared_id, property_id) = match item.listing {
                    ListingRef::Shared(id) => (Some(id), None::<PropertyId>),
                    ListingRef::Property(id) => (None::<SharedPropertyId>, Some(id)),
                };
                values_clause_parts.push(format!(
                    "(${}, ${}, ${}, ${}, ${})",
                    param_idx,
                    param_idx + 1,
                    param_idx + 2,
                    param_idx + 3,
                    param_idx + 4
                ));
                params.push(Box::new(client_id));
                params.push(Box::new(shared_id));
                params.push(Box::new(property_id));
                params.push(Box::new(i16::from(item.score)));
                params.push(Box::new(created_at));
                param_idx += 5;
            }

            let insert_sql = format!(
                "INSERT INTO public.client_property_matches (
                    client_id, shared_property_id, property_id, score, created_at
                 ) VALUES {}",
                values_clause_parts.join(", ")
            );
            let params_slice: Vec<&(dyn ToSql + Sync)> = params
                .iter()
                .map(|p| p.as_ref() as &(dyn ToSql + Sync))
                .collect();

            inserted += transaction
                .execute(insert_sql.as_str(), params_slice.as_slice())
                .await
                .map_err(|e| {
                    error!("Match cache insert error for client {}: {}", client_id, e);
                    e
                })
                .context("Failed to insert cached matches")? as usize;
        }

        transaction
            .commit()
            .await
            .context("Failed to commit match cache replace")?;

        debug!(
            "Client {}: replaced {} cached matches with {}",
            client_id, deleted, inserted
        );
        Ok(inserted)
    }

    async fn get_client_matches(&self, client_id: ClientId) -> Result<Vec<MatchRecord>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for get_client_matches")?;
        let rows = conn
            .query(
                "SELECT shared_property_id, property_id, score, created_at
                 FROM public.client_property_matches
                 WHERE client_id = $1",
                &[&client_id],
            )
            .await
            .with_context(|| format!("Failed to query cached matches of client {}", client_id))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let shared_id: Option<SharedPropertyId> = row.get("shared_property_id");
            let property_id: Option<PropertyId> = row.get("property_id");
            let listing = match (shared_id, property_id) {
                (Some(id), _) => ListingRef::Shared(id),
                (None, Some(id)) => ListingRef::Property(id),
                (None, None) => continue,
            };
            let score: i16 = row.get("score");
            records.push(MatchRecord {
                client_id,
                listing,
                score: score.clamp(0, 100) as u8,
                created_at: row.get("created_at"),
            });
        }
        Ok(records)
    }
}
