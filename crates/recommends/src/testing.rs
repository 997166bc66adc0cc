//! Test doubles: an in-memory provider, a recording queue, and a storage
//! wrapper that fails on demand.
//!
//! Enabled for this crate's tests and, through the `test-utils` feature, for
//! downstream crates testing their own providers.

#![allow(clippy::expect_used)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use recommends_core::{
    Domain, Error, ItemRef, MemoryStorage, RecommendationList, Result, SimilarityMap, SiteId,
    StorageBackend, UserId, Vote, VoteList, identifier,
};

use crate::provider::{ProviderContext, ProviderSettings, RecommendationProvider};
use crate::tasks::{InvalidationJob, TaskQueue};
use crate::users::{StaticUserDirectory, UserDirectory};

// ============================================================================
// Fixtures
// ============================================================================

/// Parse a domain name known to be valid.
pub fn domain(name: &str) -> Domain {
    Domain::new(name).expect("valid test domain")
}

/// Item `id` in the `blog.article` domain.
pub fn article(id: &str) -> ItemRef {
    ItemRef::new(domain("blog.article"), id)
}

/// Storage identifier of [`article`] `id` on the default site.
pub fn ident(id: &str) -> String {
    identifier::compose(&article(id), &SiteId::default())
}

/// Two users over three articles: `a1` is related to `a2` and `a3`, which
/// share no rater.
pub fn article_ratings() -> Vec<MockRating> {
    vec![
        MockRating::new("u1", article("a1"), 5.0),
        MockRating::new("u1", article("a2"), 3.0),
        MockRating::new("u2", article("a1"), 5.0),
        MockRating::new("u2", article("a3"), 5.0),
    ]
}

/// Context for `vote_domain` on fresh memory storage, a recording queue, and
/// users `u1` and `u2`.
pub fn context(vote_domain: &str) -> ProviderContext {
    let users = StaticUserDirectory::new([UserId::new("u1"), UserId::new("u2")]);
    context_with(vote_domain, Arc::new(MemoryStorage::new()), Arc::new(users))
}

/// Context for `vote_domain` on the given backend and user directory.
pub fn context_with(
    vote_domain: &str,
    backend: Arc<dyn StorageBackend>,
    users: Arc<dyn UserDirectory>,
) -> ProviderContext {
    ProviderContext::new(
        domain(vote_domain),
        backend,
        Arc::new(RecordingTaskQueue::default()),
        users,
        ProviderSettings::default(),
    )
}

// ============================================================================
// MockProvider
// ============================================================================

/// A native rating record for [`MockProvider`].
#[derive(Clone, Debug)]
pub struct MockRating {
    /// Author.
    pub user: UserId,
    /// Rated item.
    pub item: ItemRef,
    /// Score.
    pub score: f64,
    /// Site, if any.
    pub site: Option<SiteId>,
    /// `false` once soft-deleted.
    pub active: bool,
}

impl MockRating {
    /// An active rating with no site.
    pub fn new(user: &str, item: ItemRef, score: f64) -> Self {
        Self {
            user: UserId::new(user),
            item,
            score,
            site: None,
            active: true,
        }
    }

    /// Mark the rating soft-deleted.
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Attach the rating to `site`.
    pub fn on_site(mut self, site: &str) -> Self {
        self.site = Some(SiteId::new(site));
        self
    }
}

/// Provider over a fixed list of ratings that counts its extraction calls.
pub struct MockProvider {
    context: ProviderContext,
    ratings: Vec<MockRating>,
    item_calls: AtomicUsize,
    rating_calls: AtomicUsize,
}

impl MockProvider {
    /// Provider over `ratings`.
    pub fn new(context: ProviderContext, ratings: Vec<MockRating>) -> Self {
        Self {
            context,
            ratings,
            item_calls: AtomicUsize::new(0),
            rating_calls: AtomicUsize::new(0),
        }
    }

    /// How many times `items()` ran.
    pub fn item_calls(&self) -> usize {
        self.item_calls.load(Ordering::SeqCst)
    }

    /// How many times `ratings()` ran.
    pub fn rating_calls(&self) -> usize {
        self.rating_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecommendationProvider for MockProvider {
    type Rating = MockRating;

    fn context(&self) -> &ProviderContext {
        &self.context
    }

    async fn items(&self) -> Result<Vec<ItemRef>> {
        self.item_calls.fetch_add(1, Ordering::SeqCst);
        let mut items: Vec<ItemRef> = self.ratings.iter().map(|r| r.item.clone()).collect();
        items.sort();
        items.dedup();
        Ok(items)
    }

    async fn ratings(&self, item: &ItemRef) -> Result<Vec<MockRating>> {
        self.rating_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .ratings
            .iter()
            .filter(|r| &r.item == item)
            .cloned()
            .collect())
    }

    fn rating_user(&self, rating: &MockRating) -> UserId {
        rating.user.clone()
    }

    fn rating_score(&self, rating: &MockRating) -> f64 {
        rating.score
    }

    fn rating_item(&self, rating: &MockRating) -> ItemRef {
        rating.item.clone()
    }

    fn rating_site(&self, rating: &MockRating) -> Option<SiteId> {
        rating.site.clone()
    }

    fn is_rating_active(&self, rating: &MockRating) -> bool {
        rating.active
    }
}

// ============================================================================
// RecordingTaskQueue
// ============================================================================

/// Queue that holds submitted jobs until [`run_all`](Self::run_all).
#[derive(Default)]
pub struct RecordingTaskQueue {
    jobs: Mutex<Vec<InvalidationJob>>,
}

impl RecordingTaskQueue {
    /// Jobs submitted and not yet run.
    pub fn jobs(&self) -> Vec<InvalidationJob> {
        self.jobs.lock().map(|jobs| jobs.clone()).unwrap_or_default()
    }

    /// Run every held job in submission order. Returns the entries removed.
    pub async fn run_all(&self) -> Result<usize> {
        let jobs = match self.jobs.lock() {
            Ok(mut jobs) => std::mem::take(&mut *jobs),
            Err(_) => return Err(Error::task_queue("recording queue lock poisoned")),
        };
        let mut removed = 0;
        for job in jobs {
            removed += job.run().await?;
        }
        Ok(removed)
    }
}

impl TaskQueue for RecordingTaskQueue {
    fn submit(&self, job: InvalidationJob) -> Result<()> {
        self.jobs
            .lock()
            .map_err(|_| Error::task_queue("recording queue lock poisoned"))?
            .push(job);
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

// ============================================================================
// FlakyStorage
// ============================================================================

/// Backend wrapper that fails selected operations.
pub struct FlakyStorage<S> {
    inner: S,
    failing_removals: AtomicUsize,
    removal_attempts: AtomicUsize,
    fail_similarity_writes: AtomicBool,
}

impl<S: StorageBackend> FlakyStorage<S> {
    /// Wrap `inner`; nothing fails until configured.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing_removals: AtomicUsize::new(0),
            removal_attempts: AtomicUsize::new(0),
            fail_similarity_writes: AtomicBool::new(false),
        }
    }

    /// Fail the next `n` removal calls.
    pub fn fail_removals(self, n: usize) -> Self {
        self.failing_removals.store(n, Ordering::SeqCst);
        self
    }

    /// Fail every `store_similarities` call.
    pub fn fail_similarity_writes(self) -> Self {
        self.fail_similarity_writes.store(true, Ordering::SeqCst);
        self
    }

    /// Removal calls seen, failed or not.
    pub fn removal_attempts(&self) -> usize {
        self.removal_attempts.load(Ordering::SeqCst)
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check_removal(&self) -> Result<()> {
        self.removal_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_removals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match failing {
            Ok(_) => Err(Error::storage("injected removal failure")),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl<S: StorageBackend> StorageBackend for FlakyStorage<S> {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn get_votes(&self, scope: &Domain) -> Result<Option<VoteList>> {
        self.inner.get_votes(scope).await
    }

    async fn store_votes(&self, scope: &Domain, votes: &[Vote]) -> Result<()> {
        self.inner.store_votes(scope, votes).await
    }

    async fn store_similarities(&self, scope: &Domain, similarities: &SimilarityMap) -> Result<()> {
        if self.fail_similarity_writes.load(Ordering::SeqCst) {
            return Err(Error::storage("injected similarity write failure"));
        }
        self.inner.store_similarities(scope, similarities).await
    }

    async fn store_recommendations(
        &self,
        scope: &Domain,
        recommendations: &RecommendationList,
    ) -> Result<()> {
        self.inner.store_recommendations(scope, recommendations).await
    }

    async fn get_similarity_map(&self, scope: &Domain) -> Result<Option<SimilarityMap>> {
        self.inner.get_similarity_map(scope).await
    }

    async fn get_recommendation_list(&self, scope: &Domain) -> Result<Option<RecommendationList>> {
        self.inner.get_recommendation_list(scope).await
    }

    async fn remove_similarities(&self, scope: &Domain, item: &ItemRef) -> Result<usize> {
        self.check_removal()?;
        self.inner.remove_similarities(scope, item).await
    }

    async fn remove_recommendations(&self, scope: &Domain, item: &ItemRef) -> Result<usize> {
        self.check_removal()?;
        self.inner.remove_recommendations(scope, item).await
    }
}
