//! The storage port: persistence for votes, similarities, and recommendations.
//!
//! Every operation is scoped by the vote [`Domain`] that owns the artifacts,
//! so providers sharing one backend never overwrite each other. Providers see
//! a [`DomainStorage`], which binds a backend to a single scope.
//!
//! # Backends
//!
//! - [`MemoryStorage`]: process-local, for tests and short-lived jobs
//! - [`FileStorage`]: JSON files, one directory per scope
//!
//! The backend is chosen once from [`StorageConfig`] by
//! [`create_storage_backend`].

mod file;
mod memory;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifier;
use crate::types::{
    Domain, ItemRef, RecommendationList, ScoredItem, SimilarityMap, SiteId, UserId, Vote,
    VoteList,
};
use crate::{Error, Result};

pub use file::FileStorage;
pub use memory::MemoryStorage;

// ============================================================================
// StorageBackend trait
// ============================================================================

/// Pluggable persistence for precomputed artifacts.
///
/// Artifacts are not written transactionally: a reader may observe a new vote
/// cache next to a similarity map from the previous run.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Backend name for diagnostics.
    fn name(&self) -> &str;

    /// Deterministic, collision-free identifier for `item` on `site`.
    fn identifier(&self, item: &ItemRef, site: &SiteId) -> String {
        identifier::compose(item, site)
    }

    /// Cached vote list for `scope`, or `None` when absent or stale.
    async fn get_votes(&self, scope: &Domain) -> Result<Option<VoteList>>;

    /// Persist the vote list for `scope`, replacing any previous one.
    async fn store_votes(&self, scope: &Domain, votes: &[Vote]) -> Result<()>;

    /// Persist the similarity map for `scope`, replacing any previous one.
    async fn store_similarities(&self, scope: &Domain, similarities: &SimilarityMap)
    -> Result<()>;

    /// Persist the recommendations for `scope`, replacing any previous ones.
    async fn store_recommendations(
        &self,
        scope: &Domain,
        recommendations: &RecommendationList,
    ) -> Result<()>;

    /// The full stored similarity map for `scope`.
    async fn get_similarity_map(&self, scope: &Domain) -> Result<Option<SimilarityMap>>;

    /// The full stored recommendation list for `scope`.
    async fn get_recommendation_list(&self, scope: &Domain)
    -> Result<Option<RecommendationList>>;

    /// Items related to `identifier`, best first.
    async fn get_similarities(&self, scope: &Domain, identifier: &str) -> Result<Vec<ScoredItem>> {
        Ok(self
            .get_similarity_map(scope)
            .await?
            .and_then(|mut map| map.remove(identifier))
            .unwrap_or_default())
    }

    /// Suggestions stored for `user`, best first.
    async fn get_recommendations(&self, scope: &Domain, user: &UserId) -> Result<Vec<ScoredItem>> {
        Ok(self
            .get_recommendation_list(scope)
            .await?
            .and_then(|list| list.into_iter().find(|entry| &entry.user == user))
            .map(|entry| entry.items)
            .unwrap_or_default())
    }

    /// Remove every similarity entry referencing `item` on any site.
    ///
    /// Cached votes for `item` are dropped too, so a precompute served from
    /// the vote cache cannot bring the item back. Returns the number of
    /// removed entries; an unknown item removes nothing.
    async fn remove_similarities(&self, scope: &Domain, item: &ItemRef) -> Result<usize>;

    /// Remove every recommendation entry referencing `item` on any site.
    async fn remove_recommendations(&self, scope: &Domain, item: &ItemRef) -> Result<usize>;
}

// ============================================================================
// DomainStorage
// ============================================================================

/// A storage backend bound to one vote domain.
#[derive(Clone)]
pub struct DomainStorage {
    backend: Arc<dyn StorageBackend>,
    scope: Domain,
}

impl DomainStorage {
    /// Bind `backend` to `scope`.
    pub fn new(backend: Arc<dyn StorageBackend>, scope: Domain) -> Self {
        Self { backend, scope }
    }

    /// The vote domain this storage is bound to.
    pub fn scope(&self) -> &Domain {
        &self.scope
    }

    /// The shared backend.
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// See [`StorageBackend::identifier`].
    pub fn identifier(&self, item: &ItemRef, site: &SiteId) -> String {
        self.backend.identifier(item, site)
    }

    /// See [`StorageBackend::get_votes`].
    pub async fn get_votes(&self) -> Result<Option<VoteList>> {
        self.backend.get_votes(&self.scope).await
    }

    /// See [`StorageBackend::store_votes`].
    pub async fn store_votes(&self, votes: &[Vote]) -> Result<()> {
        self.backend.store_votes(&self.scope, votes).await
    }

    /// See [`StorageBackend::store_similarities`].
    pub async fn store_similarities(&self, similarities: &SimilarityMap) -> Result<()> {
        self.backend.store_similarities(&self.scope, similarities).await
    }

    /// See [`StorageBackend::store_recommendations`].
    pub async fn store_recommendations(&self, recommendations: &RecommendationList) -> Result<()> {
        self.backend
            .store_recommendations(&self.scope, recommendations)
            .await
    }

    /// See [`StorageBackend::get_similarity_map`].
    pub async fn get_similarity_map(&self) -> Result<Option<SimilarityMap>> {
        self.backend.get_similarity_map(&self.scope).await
    }

    /// See [`StorageBackend::get_recommendation_list`].
    pub async fn get_recommendation_list(&self) -> Result<Option<RecommendationList>> {
        self.backend.get_recommendation_list(&self.scope).await
    }

    /// See [`StorageBackend::get_similarities`].
    pub async fn get_similarities(&self, identifier: &str) -> Result<Vec<ScoredItem>> {
        self.backend.get_similarities(&self.scope, identifier).await
    }

    /// See [`StorageBackend::get_recommendations`].
    pub async fn get_recommendations(&self, user: &UserId) -> Result<Vec<ScoredItem>> {
        self.backend.get_recommendations(&self.scope, user).await
    }

    /// See [`StorageBackend::remove_similarities`].
    pub async fn remove_similarities(&self, item: &ItemRef) -> Result<usize> {
        self.backend.remove_similarities(&self.scope, item).await
    }

    /// See [`StorageBackend::remove_recommendations`].
    pub async fn remove_recommendations(&self, item: &ItemRef) -> Result<usize> {
        self.backend.remove_recommendations(&self.scope, item).await
    }
}

impl fmt::Debug for DomainStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainStorage")
            .field("backend", &self.backend.name())
            .field("scope", &self.scope)
            .finish()
    }
}

// ============================================================================
// Shared helpers for backends
// ============================================================================

/// A vote list together with the time it was cached.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VoteSnapshot {
    /// When the snapshot was stored.
    pub stored_at: DateTime<Utc>,
    /// The cached votes.
    pub votes: VoteList,
}

impl VoteSnapshot {
    /// Snapshot `votes` as of now.
    pub fn now(votes: &[Vote]) -> Self {
        Self {
            stored_at: Utc::now(),
            votes: votes.to_vec(),
        }
    }

    /// Whether the snapshot is still usable under `ttl` (`None` never expires).
    pub fn is_fresh(&self, ttl: Option<Duration>) -> bool {
        let Some(ttl) = ttl else {
            return true;
        };
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => Utc::now() - self.stored_at < ttl,
            Err(_) => true,
        }
    }
}

/// Drop keys and related entries referencing `item`. Returns entries removed.
pub fn prune_similarities(map: &mut SimilarityMap, item: &ItemRef) -> usize {
    let keys_before = map.len();
    map.retain(|key, _| !identifier::references(key, item));
    let mut removed = keys_before - map.len();

    for related in map.values_mut() {
        let before = related.len();
        related.retain(|scored| !identifier::references(&scored.identifier, item));
        removed += before - related.len();
    }
    removed
}

/// Drop suggestions referencing `item` from every user. Returns entries removed.
pub fn prune_recommendations(list: &mut RecommendationList, item: &ItemRef) -> usize {
    let mut removed = 0;
    for entry in list.iter_mut() {
        let before = entry.items.len();
        entry
            .items
            .retain(|scored| !identifier::references(&scored.identifier, item));
        removed += before - entry.items.len();
    }
    removed
}

/// Drop votes cast on `item`. Returns votes removed.
pub fn prune_votes(votes: &mut VoteList, item: &ItemRef) -> usize {
    let before = votes.len();
    votes.retain(|vote| !identifier::references(&vote.item, item));
    before - votes.len()
}

/// Reject a vote list holding a NaN or infinite score.
///
/// JSON has no encoding for non-finite numbers, so storing one would leave an
/// artifact that can no longer be read.
pub fn ensure_finite_votes(votes: &[Vote]) -> Result<()> {
    match votes.iter().find(|vote| !vote.score.is_finite()) {
        Some(vote) => Err(Error::invalid_data(format!(
            "non-finite score {} from '{}' on '{}'",
            vote.score, vote.user, vote.item
        ))),
        None => Ok(()),
    }
}

/// Reject a similarity map holding a NaN or infinite score.
pub fn ensure_finite_similarities(map: &SimilarityMap) -> Result<()> {
    for (item, related) in map {
        if let Some(scored) = related.iter().find(|s| !s.score.is_finite()) {
            return Err(Error::invalid_data(format!(
                "non-finite similarity {} between '{item}' and '{}'",
                scored.score, scored.identifier
            )));
        }
    }
    Ok(())
}

/// Reject a recommendation list holding a NaN or infinite score.
pub fn ensure_finite_recommendations(list: &RecommendationList) -> Result<()> {
    for entry in list {
        if let Some(scored) = entry.items.iter().find(|s| !s.score.is_finite()) {
            return Err(Error::invalid_data(format!(
                "non-finite prediction {} of '{}' for '{}'",
                scored.score, scored.identifier, entry.user
            )));
        }
    }
    Ok(())
}

// ============================================================================
// Configuration and factory
// ============================================================================

/// Which storage backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// [`MemoryStorage`].
    #[default]
    Memory,
    /// [`FileStorage`]; requires `path`.
    File,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend selection.
    pub backend: StorageKind,

    /// Root directory for the file backend.
    pub path: Option<String>,

    /// Maximum age of a cached vote list, in seconds. Unset never expires.
    pub votes_ttl_secs: Option<u64>,
}

impl StorageConfig {
    /// The vote cache TTL as a `Duration`.
    pub fn votes_ttl(&self) -> Option<Duration> {
        self.votes_ttl_secs.map(Duration::from_secs)
    }
}

/// Build the storage backend selected by `config`.
pub fn create_storage_backend(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>> {
    let backend: Arc<dyn StorageBackend> = match config.backend {
        StorageKind::Memory => Arc::new(MemoryStorage::new().with_votes_ttl(config.votes_ttl())),
        StorageKind::File => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| Error::config("storage.path is required for the file backend"))?;
            Arc::new(FileStorage::new(PathBuf::from(path)).with_votes_ttl(config.votes_ttl()))
        }
    };
    log::debug!("Using '{}' storage backend", backend.name());
    Ok(backend)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::UserRecommendations;

    fn article(id: &str) -> ItemRef {
        ItemRef::new(Domain::new("blog.article").unwrap(), id)
    }

    fn ident(id: &str) -> String {
        identifier::compose(&article(id), &SiteId::default())
    }

    #[test]
    fn test_prune_similarities_keys_and_neighbours() {
        let mut map = SimilarityMap::new();
        map.insert(
            ident("1"),
            vec![ScoredItem::new(ident("2"), 0.5), ScoredItem::new(ident("3"), 0.2)],
        );
        map.insert(ident("2"), vec![ScoredItem::new(ident("1"), 0.5)]);
        map.insert(ident("3"), vec![ScoredItem::new(ident("1"), 0.2)]);

        let removed = prune_similarities(&mut map, &article("2"));

        assert_eq!(removed, 2);
        assert!(!map.contains_key(&ident("2")));
        assert_eq!(map[&ident("1")], vec![ScoredItem::new(ident("3"), 0.2)]);
    }

    #[test]
    fn test_prune_similarities_absent_item_is_noop() {
        let mut map = SimilarityMap::new();
        map.insert(ident("1"), vec![ScoredItem::new(ident("2"), 0.5)]);
        let before = map.clone();

        assert_eq!(prune_similarities(&mut map, &article("99")), 0);
        assert_eq!(map, before);
    }

    #[test]
    fn test_prune_recommendations() {
        let mut list = vec![
            UserRecommendations {
                user: UserId::new("u1"),
                items: vec![ScoredItem::new(ident("2"), 4.0), ScoredItem::new(ident("3"), 3.0)],
            },
            UserRecommendations {
                user: UserId::new("u2"),
                items: vec![ScoredItem::new(ident("3"), 1.0)],
            },
        ];

        assert_eq!(prune_recommendations(&mut list, &article("3")), 2);
        assert_eq!(list[0].items, vec![ScoredItem::new(ident("2"), 4.0)]);
        assert!(list[1].items.is_empty());
    }

    #[test]
    fn test_ensure_finite_rejects_nan_and_infinity() {
        let ok = vec![Vote::new(UserId::new("u1"), ident("1"), 5.0)];
        assert!(ensure_finite_votes(&ok).is_ok());
        let nan = vec![Vote::new(UserId::new("u1"), ident("1"), f64::NAN)];
        assert!(matches!(ensure_finite_votes(&nan), Err(Error::InvalidData(_))));

        let mut map = SimilarityMap::new();
        map.insert(ident("1"), vec![ScoredItem::new(ident("2"), f64::INFINITY)]);
        assert!(matches!(ensure_finite_similarities(&map), Err(Error::InvalidData(_))));

        let list = vec![UserRecommendations {
            user: UserId::new("u1"),
            items: vec![ScoredItem::new(ident("2"), f64::NEG_INFINITY)],
        }];
        assert!(matches!(ensure_finite_recommendations(&list), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_prune_votes() {
        let mut votes = vec![
            Vote::new(UserId::new("u1"), ident("1"), 5.0),
            Vote::new(UserId::new("u1"), ident("2"), 3.0),
        ];
        assert_eq!(prune_votes(&mut votes, &article("1")), 1);
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].item, ident("2"));
    }

    #[test]
    fn test_vote_snapshot_freshness() {
        let snapshot = VoteSnapshot::now(&[]);
        assert!(snapshot.is_fresh(None));
        assert!(snapshot.is_fresh(Some(Duration::from_secs(60))));

        let old = VoteSnapshot {
            stored_at: Utc::now() - chrono::Duration::seconds(120),
            votes: Vec::new(),
        };
        assert!(!old.is_fresh(Some(Duration::from_secs(60))));
    }

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert_eq!(config.backend, StorageKind::Memory);
        assert!(config.path.is_none());
        assert!(config.votes_ttl().is_none());
    }

    #[test]
    fn test_create_memory_backend() {
        let backend = create_storage_backend(&StorageConfig::default()).unwrap();
        assert_eq!(backend.name(), "memory");
    }

    #[test]
    fn test_create_file_backend_requires_path() {
        let config = StorageConfig {
            backend: StorageKind::File,
            ..Default::default()
        };
        assert!(matches!(
            create_storage_backend(&config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_create_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: StorageKind::File,
            path: Some(dir.path().to_string_lossy().into_owned()),
            votes_ttl_secs: Some(30),
        };
        let backend = create_storage_backend(&config).unwrap();
        assert_eq!(backend.name(), "file");
    }

    #[tokio::test]
    async fn test_domain_storage_scopes_calls() {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
        let articles = DomainStorage::new(backend.clone(), Domain::new("blog.vote").unwrap());
        let products = DomainStorage::new(backend, Domain::new("shop.vote").unwrap());

        articles
            .store_votes(&[Vote::new(UserId::new("u1"), ident("1"), 5.0)])
            .await
            .unwrap();

        assert_eq!(articles.get_votes().await.unwrap().unwrap().len(), 1);
        assert!(products.get_votes().await.unwrap().is_none());
        assert_eq!(articles.scope().as_str(), "blog.vote");
    }

    #[test]
    fn test_domain_storage_debug() {
        let storage = DomainStorage::new(
            Arc::new(MemoryStorage::new()),
            Domain::new("blog.vote").unwrap(),
        );
        let debug = format!("{storage:?}");
        assert!(debug.contains("memory"));
        assert!(debug.contains("blog.vote"));
    }
}
