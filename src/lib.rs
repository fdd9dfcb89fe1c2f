// src/lib.rs - property matching and deduplication engine
pub mod db;
pub mod dedup;
pub mod geocoding;
pub mod geometry;
pub mod matching;
pub mod models;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use db::{InMemoryRepository, PgRepository, Repository};
pub use utils::db_connect::PgPool;
