// src/geocoding/nominatim.rs - Nominatim (OpenStreetMap) search client
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::Geocoder;
use crate::geometry::{validate_point, GeoPoint};

/// Nominatim returns coordinates as strings.
#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

pub struct NominatimGeocoder {
    base_url: Url,
    client: reqwest::Client,
}

impl NominatimGeocoder {
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid Nominatim URL '{}'", base_url))?;
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { base_url, client })
    }

    fn search_url(&self, address: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Nominatim URL '{}' cannot be a base", self.base_url))?
            .pop_if_empty()
            .push("search");
        url.query_pairs_mut()
            .append_pair("q", address)
            .append_pair("format", "json")
            .append_pair("limit", "1");
        Ok(url)
    }
}

fn first_point(places: &[NominatimPlace]) -> Option<GeoPoint> {
    let place = places.first()?;
    let lat = place.lat.trim().parse::<f64>().ok()?;
    let lng = place.lon.trim().parse::<f64>().ok()?;
    let point = GeoPoint::new(lat, lng);
    validate_point(&point).ok().map(|_| point)
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>> {
        let url = self.search_url(address)?;
        debug!("Geocoding '{}' via {}", address, url);
        let places: Vec<NominatimPlace> = self
            .client
            .get(url)
            .send()
            .await
            .context("Nominatim request failed")?
            .error_for_status()
            .context("Nominatim returned an error status")?
            .json()
            .await
            .context("Failed to parse Nominatim response")?;
        Ok(first_point(&places))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_url() {
        let geocoder = NominatimGeocoder::new("http://localhost:8088/nominatim/", "test-agent").unwrap();
        let url = geocoder.search_url("Via Roma 10, Milano").unwrap();
        assert_eq!(url.path(), "/nominatim/search");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("q".to_string(), "Via Roma 10, Milano".to_string()),
                ("format".to_string(), "json".to_string()),
                ("limit".to_string(), "1".to_string()),
            ]
        );
        assert!(NominatimGeocoder::new("not a url", "test-agent").is_err());
    }

    #[test]
    fn test_first_point_parses_string_coordinates() {
        let places: Vec<NominatimPlace> =
            serde_json::from_str(r#"[{"lat": "45.4642", "lon": "9.1900", "display_name": "Milano"}]"#)
                .unwrap();
        assert_eq!(first_point(&places), Some(GeoPoint::new(45.4642, 9.19)));
        assert_eq!(first_point(&[]), None);

        let bogus = vec![NominatimPlace {
            lat: "123".into(),
            lon: "9".into(),
        }];
        assert_eq!(first_point(&bogus), None);
    }
}
