//! The provider capability contract.
//!
//! A provider adapts one rating domain to the shared pipeline: it knows how to
//! find the rated items, their ratings, and who wrote them. Everything else
//! (vote caching, similarity, recommendation, invalidation) has a default in
//! [`defaults`] that an implementation may override or call explicitly.
//!
//! # Lifecycle
//!
//! The [`Registry`](crate::Registry) builds each provider once, handing its
//! factory a [`ProviderContext`]. The provider keeps that context and returns
//! it from [`RecommendationProvider::context`].
//!
//! # Example
//!
//! ```
//! use async_trait::async_trait;
//! use recommends::{ProviderContext, RecommendationProvider};
//! use recommends_core::{ItemRef, Rating, Result, UserId};
//!
//! struct ArticleVotes {
//!     context: ProviderContext,
//!     ratings: Vec<Rating>,
//! }
//!
//! #[async_trait]
//! impl RecommendationProvider for ArticleVotes {
//!     type Rating = Rating;
//!
//!     fn context(&self) -> &ProviderContext {
//!         &self.context
//!     }
//!
//!     async fn items(&self) -> Result<Vec<ItemRef>> {
//!         let mut items: Vec<ItemRef> =
//!             self.ratings.iter().map(|r| r.rated_item().clone()).collect();
//!         items.sort();
//!         items.dedup();
//!         Ok(items)
//!     }
//!
//!     async fn ratings(&self, item: &ItemRef) -> Result<Vec<Rating>> {
//!         Ok(self.ratings.iter().filter(|r| r.rated_item() == item).cloned().collect())
//!     }
//!
//!     fn rating_user(&self, rating: &Rating) -> UserId {
//!         rating.user().clone()
//!     }
//!
//!     fn rating_score(&self, rating: &Rating) -> f64 {
//!         rating.score()
//!     }
//!
//!     fn rating_item(&self, rating: &Rating) -> ItemRef {
//!         rating.rated_item().clone()
//!     }
//! }
//! ```

pub mod defaults;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use recommends_core::{
    Domain, DomainStorage, ItemRef, Rating, RecommendationList, Result, SimilarityMap, SiteId,
    StorageBackend, UserId, Vote, VoteList,
};
use recommends_engine::{Metric, sim_distance};
use serde::{Deserialize, Serialize};

use crate::config::RecommendsConfig;
use crate::signals::{DeletionEvent, EventSource};
use crate::tasks::TaskQueue;
use crate::users::UserDirectory;

// ============================================================================
// Settings and context
// ============================================================================

/// Engine defaults handed to every provider.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Site used when a rating has none.
    pub default_site: SiteId,
    /// Default similarity metric.
    pub metric: Metric,
    /// Cap on related items kept per item.
    pub max_similar_items: Option<usize>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            default_site: SiteId::default(),
            metric: sim_distance,
            max_similar_items: None,
        }
    }
}

impl ProviderSettings {
    /// Settings from the process configuration.
    pub fn from_config(config: &RecommendsConfig) -> Result<Self> {
        Ok(Self {
            default_site: config.default_site(),
            metric: config.engine.metric()?,
            max_similar_items: config.engine.max_similar_items,
        })
    }
}

/// Everything a provider needs from the process: storage scoped to its vote
/// domain, the invalidation queue, the user directory, and engine settings.
#[derive(Clone)]
pub struct ProviderContext {
    storage: DomainStorage,
    tasks: Arc<dyn TaskQueue>,
    users: Arc<dyn UserDirectory>,
    settings: ProviderSettings,
}

impl ProviderContext {
    /// Build a context for `vote_domain` on a shared backend.
    pub fn new(
        vote_domain: Domain,
        backend: Arc<dyn StorageBackend>,
        tasks: Arc<dyn TaskQueue>,
        users: Arc<dyn UserDirectory>,
        settings: ProviderSettings,
    ) -> Self {
        Self {
            storage: DomainStorage::new(backend, vote_domain),
            tasks,
            users,
            settings,
        }
    }

    /// Replace the storage, e.g. with a domain-specific backend.
    pub fn with_storage(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.storage = DomainStorage::new(backend, self.storage.scope().clone());
        self
    }

    /// The vote domain this context belongs to.
    pub fn domain(&self) -> &Domain {
        self.storage.scope()
    }

    /// Storage scoped to the vote domain.
    pub fn storage(&self) -> &DomainStorage {
        &self.storage
    }

    /// The invalidation queue.
    pub fn tasks(&self) -> &Arc<dyn TaskQueue> {
        &self.tasks
    }

    /// The system-wide user directory.
    pub fn users(&self) -> &Arc<dyn UserDirectory> {
        &self.users
    }

    /// Engine settings.
    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }
}

impl fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderContext")
            .field("storage", &self.storage)
            .field("tasks", &self.tasks.name())
            .field("settings", &self.settings)
            .finish()
    }
}

// ============================================================================
// PrecomputeReport
// ============================================================================

/// Summary of one precompute run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecomputeReport {
    /// The vote domain that ran.
    pub domain: Domain,
    /// Votes the run worked from.
    pub votes: usize,
    /// Whether the caller supplied the vote list.
    pub votes_supplied: bool,
    /// Whether a fresh vote cache existed when the run looked up its votes.
    /// Always `false` when the caller supplied them.
    pub votes_cached: bool,
    /// Items with a stored similarity entry.
    pub similar_items: usize,
    /// Users with a stored recommendation entry.
    pub recommended_users: usize,
}

// ============================================================================
// RecommendationProvider trait
// ============================================================================

/// Domain adapter feeding the recommendation pipeline.
///
/// Implementations supply the extraction methods; the rest default to the
/// functions in [`defaults`].
#[async_trait]
pub trait RecommendationProvider: Send + Sync + 'static {
    /// The domain's native rating record.
    type Rating: Send + Sync;

    /// The context the registry built this provider with.
    fn context(&self) -> &ProviderContext;

    /// Name for logging. Defaults to the vote domain.
    fn name(&self) -> &str {
        self.context().domain().as_str()
    }

    /// Similarity metric. Defaults to the configured one.
    fn similarity(&self) -> Metric {
        self.context().settings().metric
    }

    /// Deletion events to listen for on every content domain.
    fn rate_signals(&self) -> Vec<EventSource> {
        vec![EventSource::PreDelete]
    }

    /// Every item with at least one rating.
    async fn items(&self) -> Result<Vec<ItemRef>>;

    /// All ratings recorded against `item`.
    async fn ratings(&self, item: &ItemRef) -> Result<Vec<Self::Rating>>;

    /// Author of `rating`.
    fn rating_user(&self, rating: &Self::Rating) -> UserId;

    /// Score of `rating`.
    fn rating_score(&self, rating: &Self::Rating) -> f64;

    /// The item `rating` was given to.
    fn rating_item(&self, rating: &Self::Rating) -> ItemRef;

    /// Site of `rating`; `None` uses the configured default site.
    fn rating_site(&self, _rating: &Self::Rating) -> Option<SiteId> {
        None
    }

    /// Whether `rating` counts. Soft-deleted ratings should return `false`.
    fn is_rating_active(&self, _rating: &Self::Rating) -> bool {
        true
    }

    /// Users to compute recommendations for.
    async fn users(&self) -> Result<Vec<UserId>> {
        defaults::users(self.context()).await
    }

    /// Invalidation hook for a deleted content object.
    fn on_source_deleted(&self, event: &DeletionEvent) -> Result<()> {
        defaults::on_source_deleted(self.context(), event)
    }

    /// Vote list, from cache or rebuilt from the domain.
    async fn vote_list(&self) -> Result<VoteList> {
        defaults::vote_list(self).await
    }

    /// Similarity map for `votes`.
    fn calculate_similarities(&self, votes: &[Vote]) -> SimilarityMap {
        defaults::calculate_similarities(self, votes)
    }

    /// Recommendations for every user in [`users`](Self::users).
    async fn calculate_recommendations(
        &self,
        votes: &[Vote],
        similarities: &SimilarityMap,
    ) -> Result<RecommendationList> {
        defaults::calculate_recommendations(self, votes, similarities).await
    }

    /// Compute and store votes, similarities, and recommendations.
    async fn precompute(&self, votes: Option<VoteList>) -> Result<PrecomputeReport> {
        defaults::precompute(self, votes).await
    }
}

/// Build a [`Rating`] value from a native rating through `provider`'s
/// extractors.
pub fn extract_rating<P>(provider: &P, rating: &P::Rating) -> Rating
where
    P: RecommendationProvider + ?Sized,
{
    Rating::new(
        provider.rating_user(rating),
        provider.rating_item(rating),
        provider.rating_score(rating),
    )
}

// ============================================================================
// DynProvider
// ============================================================================

/// Object-safe view of a registered provider.
#[async_trait]
pub trait DynProvider: Send + Sync {
    /// Provider name.
    fn name(&self) -> &str;

    /// The vote domain.
    fn domain(&self) -> &Domain;

    /// Storage scoped to the vote domain.
    fn storage(&self) -> &DomainStorage;

    /// Deletion events the provider listens for.
    fn rate_signals(&self) -> Vec<EventSource>;

    /// See [`RecommendationProvider::on_source_deleted`].
    fn on_source_deleted(&self, event: &DeletionEvent) -> Result<()>;

    /// See [`RecommendationProvider::vote_list`].
    async fn vote_list(&self) -> Result<VoteList>;

    /// See [`RecommendationProvider::precompute`].
    async fn precompute(&self, votes: Option<VoteList>) -> Result<PrecomputeReport>;
}

/// Adapter from a concrete provider to [`DynProvider`].
pub(crate) struct Registered<P>(pub(crate) Arc<P>);

#[async_trait]
impl<P: RecommendationProvider> DynProvider for Registered<P> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn domain(&self) -> &Domain {
        self.0.context().domain()
    }

    fn storage(&self) -> &DomainStorage {
        self.0.context().storage()
    }

    fn rate_signals(&self) -> Vec<EventSource> {
        self.0.rate_signals()
    }

    fn on_source_deleted(&self, event: &DeletionEvent) -> Result<()> {
        self.0.on_source_deleted(event)
    }

    async fn vote_list(&self) -> Result<VoteList> {
        self.0.vote_list().await
    }

    async fn precompute(&self, votes: Option<VoteList>) -> Result<PrecomputeReport> {
        self.0.precompute(votes).await
    }
}

impl fmt::Debug for dyn DynProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynProvider")
            .field("name", &self.name())
            .field("storage", self.storage())
            .finish()
    }
}
