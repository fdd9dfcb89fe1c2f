// src/utils/constants.rs

// Criteria matcher scoring
pub const BASE_MATCH_SCORE: f64 = 85.0;
/// Smallest score a matching pair can carry; 0 is reserved for "excluded".
pub const MIN_MATCH_SCORE: f64 = 1.0;
pub const MAX_MATCH_SCORE: f64 = 100.0;
/// Absorbs float noise so that exact band edges (80% of size, 120% of price) are inside.
pub const BAND_EPSILON: f64 = 1e-6;

pub const ROOMS_EXACT_BONUS: f64 = 5.0;
pub const ROOMS_FEWER_PENALTY: f64 = 5.0;
pub const ROOMS_MAX_EXTRA: i32 = 1;

pub const SIZE_TOLERANCE_FACTOR: f64 = 0.80;
pub const SIZE_MAX_FACTOR: f64 = 2.5;
pub const SIZE_SHORTFALL_MAX_PENALTY: f64 = 20.0;

pub const PRICE_TOLERANCE_FACTOR: f64 = 1.20;
pub const PRICE_OVERAGE_MAX_PENALTY: f64 = 30.0;
pub const PRICE_SAVINGS_BONUS_RATE: f64 = 50.0;
pub const PRICE_SAVINGS_MAX_BONUS: f64 = 10.0;

// Geography
pub const GEO_TOLERANCE_KM: f64 = 0.5;
pub const DEFAULT_CIRCLE_RADIUS_KM: f64 = 1.0;
pub const DEFAULT_POINT_ZONE_RADIUS_KM: f64 = 0.5;
pub const CIRCLE_DISTANCE_MAX_PENALTY: f64 = 10.0;
pub const ZONE_TOLERANCE_MAX_PENALTY: f64 = 15.0;
pub const POINT_ZONE_MAX_PENALTY: f64 = 5.0;

// Match cache
pub const MATCH_CACHE_TTL_MINUTES: i64 = 15;
/// Rows per multi-row INSERT when writing a client's matches.
pub const MATCH_INSERT_BATCH_SIZE: usize = 500;

// Deduplication
pub const DEDUP_PRICE_TOLERANCE: f64 = 0.10;
pub const DEDUP_SIZE_TOLERANCE: f64 = 0.15;
pub const DEDUP_ROOMS_TOLERANCE: i32 = 1;
/// Street names with the same civic number and at least this similarity share an address group.
pub const ADDRESS_STREET_SIMILARITY: f64 = 0.97;
