//! In-memory storage backend.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    StorageBackend, VoteSnapshot, ensure_finite_recommendations, ensure_finite_similarities,
    ensure_finite_votes, prune_recommendations, prune_similarities, prune_votes,
};
use crate::Result;
use crate::types::{Domain, ItemRef, RecommendationList, SimilarityMap, Vote, VoteList};

#[derive(Default)]
struct ScopeState {
    votes: Option<VoteSnapshot>,
    similarities: Option<SimilarityMap>,
    recommendations: Option<RecommendationList>,
}

/// Process-local storage, keyed by vote domain.
///
/// Nothing survives a restart. Useful for tests and one-shot precompute jobs
/// whose results are read in the same process.
#[derive(Default)]
pub struct MemoryStorage {
    scopes: RwLock<HashMap<Domain, ScopeState>>,
    votes_ttl: Option<Duration>,
}

impl MemoryStorage {
    /// Create an empty store whose vote cache never expires.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire cached vote lists older than `ttl`.
    pub fn with_votes_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.votes_ttl = ttl;
        self
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_votes(&self, scope: &Domain) -> Result<Option<VoteList>> {
        let scopes = self.scopes.read().await;
        Ok(scopes
            .get(scope)
            .and_then(|state| state.votes.as_ref())
            .filter(|snapshot| snapshot.is_fresh(self.votes_ttl))
            .map(|snapshot| snapshot.votes.clone()))
    }

    async fn store_votes(&self, scope: &Domain, votes: &[Vote]) -> Result<()> {
        ensure_finite_votes(votes)?;
        let mut scopes = self.scopes.write().await;
        scopes.entry(scope.clone()).or_default().votes = Some(VoteSnapshot::now(votes));
        Ok(())
    }

    async fn store_similarities(
        &self,
        scope: &Domain,
        similarities: &SimilarityMap,
    ) -> Result<()> {
        ensure_finite_similarities(similarities)?;
        let mut scopes = self.scopes.write().await;
        scopes.entry(scope.clone()).or_default().similarities = Some(similarities.clone());
        Ok(())
    }

    async fn store_recommendations(
        &self,
        scope: &Domain,
        recommendations: &RecommendationList,
    ) -> Result<()> {
        ensure_finite_recommendations(recommendations)?;
        let mut scopes = self.scopes.write().await;
        scopes.entry(scope.clone()).or_default().recommendations = Some(recommendations.clone());
        Ok(())
    }

    async fn get_similarity_map(&self, scope: &Domain) -> Result<Option<SimilarityMap>> {
        let scopes = self.scopes.read().await;
        Ok(scopes
            .get(scope)
            .and_then(|state| state.similarities.clone()))
    }

    async fn get_recommendation_list(
        &self,
        scope: &Domain,
    ) -> Result<Option<RecommendationList>> {
        let scopes = self.scopes.read().await;
        Ok(scopes
            .get(scope)
            .and_then(|state| state.recommendations.clone()))
    }

    async fn remove_similarities(&self, scope: &Domain, item: &ItemRef) -> Result<usize> {
        let mut scopes = self.scopes.write().await;
        let Some(state) = scopes.get_mut(scope) else {
            return Ok(0);
        };
        if let Some(snapshot) = state.votes.as_mut() {
            prune_votes(&mut snapshot.votes, item);
        }
        Ok(state
            .similarities
            .as_mut()
            .map(|map| prune_similarities(map, item))
            .unwrap_or(0))
    }

    async fn remove_recommendations(&self, scope: &Domain, item: &ItemRef) -> Result<usize> {
        let mut scopes = self.scopes.write().await;
        Ok(scopes
            .get_mut(scope)
            .and_then(|state| state.recommendations.as_mut())
            .map(|list| prune_recommendations(list, item))
            .unwrap_or(0))
    }
}
