// src/matching/mod.rs

pub mod cache;
pub mod criteria;
pub mod geography;
pub mod property_type;
pub mod service;

pub use cache::{is_fresh, MatchCache};
pub use criteria::{
    evaluate_match, explain_match, CriteriaMatcher, MatchSubject, RejectReason, ToleranceMatcher,
};
pub use geography::{evaluate_area, GeoVerdict};
pub use property_type::{normalize_property_type, same_property_type};
pub use service::MatchingService;
