// src/models/property.rs - Listings and consolidated (shared) properties
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::dedup::address::normalize_agency_name;
use crate::geometry::GeoPoint;

pub type PropertyId = i64;
pub type SharedPropertyId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerType {
    Private,
    Agency,
}

impl OwnerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerType::Private => "private",
            OwnerType::Agency => "agency",
        }
    }
}

impl fmt::Display for OwnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnerType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "private" | "privato" => Ok(OwnerType::Private),
            "agency" | "agenzia" => Ok(OwnerType::Agency),
            other => Err(anyhow::anyhow!("Unknown owner type '{}'", other)),
        }
    }
}

/// A property row: either one of the agency's own listings or a listing
/// ingested from a portal by the scraping connectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub address: Option<String>,
    pub city: Option<String>,
    pub price: Option<f64>,
    /// Square metres.
    pub size: Option<f64>,
    pub property_type: Option<String>,
    pub rooms: Option<i32>,
    pub bedrooms: Option<i32>,
    pub location: Option<GeoPoint>,
    pub owner_type: OwnerType,
    /// Portal the listing was scraped from, if any.
    pub portal: Option<String>,
    pub agency_name: Option<String>,
    pub external_id: Option<String>,
    pub external_link: Option<String>,
    pub is_multiagency: bool,
    pub exclusivity_hint: bool,
    pub shared_property_id: Option<SharedPropertyId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Property {
    pub fn room_count(&self) -> Option<i32> {
        self.rooms.or(self.bedrooms)
    }

    pub fn classification(&self) -> ListingClassification {
        ListingClassification {
            is_multiagency: self.is_multiagency,
            exclusivity_hint: self.exclusivity_hint,
            shared_property_id: self.shared_property_id,
        }
    }
}

/// The dedup-owned columns of a property row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListingClassification {
    pub is_multiagency: bool,
    pub exclusivity_hint: bool,
    pub shared_property_id: Option<SharedPropertyId>,
}

/// One agency advertising a shared property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgencyListing {
    pub name: String,
    pub link: Option<String>,
    pub source_property_id: PropertyId,
}

/// One real-world property, possibly advertised by several agencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedProperty {
    pub id: SharedPropertyId,
    pub address: String,
    /// Normalized address the dedup scan grouped on.
    pub address_key: String,
    pub city: Option<String>,
    pub price: Option<f64>,
    pub size: Option<f64>,
    pub property_type: Option<String>,
    pub rooms: Option<i32>,
    pub location: Option<GeoPoint>,
    pub agencies: Vec<AgencyListing>,
    pub is_multiagency: bool,
    pub is_ignored: bool,
    pub is_acquired: bool,
    pub is_favorite: bool,
    /// Whether this record takes part in buyer matching.
    pub match_buyers: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SharedProperty {
    pub fn participates_in_matching(&self) -> bool {
        self.match_buyers && !self.is_ignored
    }

    pub fn refresh_multiagency(&mut self) {
        self.is_multiagency = distinct_agency_count(&self.agencies) > 1;
    }
}

/// Fields needed to create a shared property; ids and timestamps come from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSharedProperty {
    pub address: String,
    pub address_key: String,
    pub city: Option<String>,
    pub price: Option<f64>,
    pub size: Option<f64>,
    pub property_type: Option<String>,
    pub rooms: Option<i32>,
    pub location: Option<GeoPoint>,
    pub agencies: Vec<AgencyListing>,
    pub is_multiagency: bool,
    pub match_buyers: bool,
}

/// Agencies are counted after name normalization, so "Tecnocasa S.r.l." and
/// "tecnocasa srl" are one agency.
pub fn distinct_agency_count(agencies: &[AgencyListing]) -> usize {
    agencies
        .iter()
        .map(|a| normalize_agency_name(&a.name))
        .filter(|name| !name.is_empty())
        .collect::<HashSet<_>>()
        .len()
}
