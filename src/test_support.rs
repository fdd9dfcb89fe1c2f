// src/test_support.rs - Fixtures shared by the unit tests
use chrono::Utc;

use crate::geometry::GeoPoint;
use crate::models::{
    AgencyListing, BuyerProfile, Client, ClientId, OwnerType, Property, PropertyId,
    SharedProperty, SharedPropertyId,
};

/// An agency listing in central Milan: 100 m², 300k, 3 rooms, apartment.
pub fn listing(id: PropertyId) -> Property {
    let now = Utc::now();
    Property {
        id,
        address: Some("Via Roma 10".to_string()),
        city: Some("Milano".to_string()),
        price: Some(300_000.0),
        size: Some(100.0),
        property_type: Some("apartment".to_string()),
        rooms: Some(3),
        bedrooms: None,
        location: Some(GeoPoint::new(45.4642, 9.19)),
        owner_type: OwnerType::Agency,
        portal: Some("immobiliare".to_string()),
        agency_name: None,
        external_id: None,
        external_link: None,
        is_multiagency: false,
        exclusivity_hint: false,
        shared_property_id: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn scraped(id: PropertyId, address: &str, price: f64, portal: &str, agency: &str) -> Property {
    let mut p = listing(id);
    p.address = Some(address.to_string());
    p.price = Some(price);
    p.portal = Some(portal.to_string());
    p.agency_name = Some(agency.to_string());
    p.external_link = Some(format!("https://{}.example/{}", portal, id));
    p
}

pub fn private_listing(id: PropertyId) -> Property {
    let mut p = listing(id);
    p.owner_type = OwnerType::Private;
    p.portal = Some("subito".to_string());
    p
}

pub fn shared(id: SharedPropertyId) -> SharedProperty {
    let now = Utc::now();
    SharedProperty {
        id,
        address: "Via Roma 10".to_string(),
        address_key: "via roma 10".to_string(),
        city: Some("Milano".to_string()),
        price: Some(300_000.0),
        size: Some(100.0),
        property_type: Some("apartment".to_string()),
        rooms: Some(3),
        location: Some(GeoPoint::new(45.4642, 9.19)),
        agencies: vec![
            AgencyListing {
                name: "Tecnocasa".to_string(),
                link: None,
                source_property_id: id * 100,
            },
            AgencyListing {
                name: "Gabetti".to_string(),
                link: None,
                source_property_id: id * 100 + 1,
            },
        ],
        is_multiagency: true,
        is_ignored: false,
        is_acquired: false,
        is_favorite: false,
        match_buyers: true,
        created_at: now,
        updated_at: now,
    }
}

pub fn client(id: ClientId) -> Client {
    Client {
        id,
        first_name: Some("Mario".to_string()),
        last_name: Some(format!("Rossi {}", id)),
        email: Some(format!("client{}@example.com", id)),
        phone: None,
    }
}

/// A profile with no constraints at all.
pub fn profile(client_id: ClientId) -> BuyerProfile {
    BuyerProfile {
        client_id,
        ..Default::default()
    }
}
