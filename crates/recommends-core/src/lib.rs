//! Recommends Core: shared types, errors, identifiers, and the storage port.
//!
//! This crate provides the foundational types used across all Recommends
//! crates. It has no internal Recommends dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error types and Result alias
//! - [`types`]: Ratings, votes, similarity maps, recommendation lists
//! - [`identifier`]: Domain- and site-qualified item identifiers
//! - [`storage`]: The storage port and its memory/file backends

pub mod error;
pub mod identifier;
pub mod storage;
pub mod types;

// Re-export key types at crate root for convenience
pub use error::{Error, Result};
pub use storage::{
    DomainStorage, FileStorage, MemoryStorage, StorageBackend, StorageConfig, StorageKind,
    create_storage_backend,
};
pub use types::{
    Domain, ItemRef, Rating, RecommendationList, ScoredItem, SimilarityMap, SiteId, UserId,
    UserRecommendations, Vote, VoteList,
};
