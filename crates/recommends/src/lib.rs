//! Recommends: pluggable rating domains over one collaborative-filtering
//! pipeline.
//!
//! Each rating domain implements [`RecommendationProvider`] and is registered
//! once with a [`Registry`]. The registry scopes storage to the domain, runs
//! the shared precompute pipeline (votes, similarities, recommendations), and
//! turns deletion events on rated content into background invalidation jobs.
//!
//! # Modules
//!
//! - [`config`]: Process configuration loaded with confyg
//! - [`provider`]: The provider contract and its default behaviour
//! - [`registry`]: Domain-to-provider catalog and deletion wiring
//! - [`signals`]: Deletion events and the handler table
//! - [`tasks`]: Invalidation jobs and the worker pool
//! - [`users`]: The system-wide user directory

pub mod config;
pub mod provider;
pub mod registry;
pub mod signals;
pub mod tasks;
pub mod users;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports
pub use config::{EngineConfig, RecommendsConfig, TaskConfig};
pub use provider::{
    DynProvider, PrecomputeReport, ProviderContext, ProviderSettings, RecommendationProvider,
    extract_rating,
};
pub use registry::Registry;
pub use signals::{DeletionEvent, EventSource, Handler, SignalBus, handler};
pub use tasks::{InvalidationJob, InvalidationKind, TaskQueue, WorkerPool};
pub use users::{NoUserDirectory, StaticUserDirectory, UserDirectory};

pub use recommends_core as core;
pub use recommends_engine as engine;
