// src/models/buyer.rs - Buyer clients and their search criteria
use serde::{Deserialize, Serialize};

use crate::models::search_area::SearchArea;

pub type ClientId = i64;

/// The contact fields callers need to act on a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Client {
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|p| !p.trim().is_empty())
            .collect();
        if parts.is_empty() {
            format!("client #{}", self.id)
        } else {
            parts.join(" ")
        }
    }
}

/// Search criteria owned by one buyer client. Every criterion is optional;
/// an absent criterion places no constraint on that dimension.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BuyerProfile {
    pub client_id: ClientId,
    /// Square metres.
    pub min_size: Option<f64>,
    pub max_price: Option<f64>,
    pub property_type: Option<String>,
    pub rooms: Option<i32>,
    pub search_area: Option<SearchArea>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Buyer {
    pub client: Client,
    pub profile: BuyerProfile,
}
