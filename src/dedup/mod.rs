// src/dedup/mod.rs

pub mod address;
pub mod clustering;
pub mod scan;

pub use address::{addresses_match, normalize_address, normalize_agency_name};
pub use clustering::{cluster_candidates, ClusteringOutcome, PropertyCluster};
pub use scan::DeduplicationService;
