// src/utils/config.rs - Engine settings read from the environment
use log::info;
use std::env;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Offer private-owner listings to buyers alongside shared properties.
    pub include_private_listings: bool,
    pub geocoding_enabled: bool,
    pub nominatim_url: String,
    pub geocoder_cache_size: usize,
    pub geocoder_user_agent: String,
    /// Clients recomputed in parallel by the bulk refresh.
    pub refresh_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            include_private_listings: true,
            geocoding_enabled: false,
            nominatim_url: "https://nominatim.openstreetmap.org".to_string(),
            geocoder_cache_size: 5000,
            geocoder_user_agent: concat!("property_matching/", env!("CARGO_PKG_VERSION")).to_string(),
            refresh_concurrency: 8,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let config = Self {
            include_private_listings: env::var("MATCHING_INCLUDE_PRIVATE_LISTINGS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.include_private_listings),
            geocoding_enabled: env::var("GEOCODING_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.geocoding_enabled),
            nominatim_url: env::var("NOMINATIM_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.nominatim_url),
            geocoder_cache_size: env::var("GEOCODER_CACHE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|size: &usize| *size > 0)
                .unwrap_or(defaults.geocoder_cache_size),
            geocoder_user_agent: env::var("GEOCODER_USER_AGENT")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.geocoder_user_agent),
            refresh_concurrency: env::var("MATCH_REFRESH_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.refresh_concurrency),
        };
        info!(
            "Engine config: private listings={}, geocoding={}, refresh concurrency={}",
            config.include_private_listings, config.geocoding_enabled, config.refresh_concurrency
        );
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_config() {
        env::set_var("MATCHING_INCLUDE_PRIVATE_LISTINGS", "false");
        env::set_var("GEOCODING_ENABLED", "true");
        env::set_var("GEOCODER_CACHE_SIZE", "0");
        env::set_var("MATCH_REFRESH_CONCURRENCY", "3");
        env::set_var("NOMINATIM_URL", "http://localhost:8088");

        let config = EngineConfig::from_env();
        assert!(!config.include_private_listings);
        assert!(config.geocoding_enabled);
        assert_eq!(config.geocoder_cache_size, 5000);
        assert_eq!(config.refresh_concurrency, 3);
        assert_eq!(config.nominatim_url, "http://localhost:8088");

        env::remove_var("MATCHING_INCLUDE_PRIVATE_LISTINGS");
        env::remove_var("GEOCODING_ENABLED");
        env::remove_var("GEOCODER_CACHE_SIZE");
        env::remove_var("MATCH_REFRESH_CONCURRENCY");
        env::remove_var("NOMINATIM_URL");
    }
}
