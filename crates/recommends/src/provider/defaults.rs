//! Default behaviour behind [`RecommendationProvider`]'s provided methods.
//!
//! Each function here is what the matching trait method does when a provider
//! does not override it. Overrides can call them to extend rather than
//! replace the default.

use recommends_core::{
    RecommendationList, Result, SimilarityMap, UserId, UserRecommendations, Vote, VoteList,
};
use recommends_engine::{calculate_similar_items, get_recommended_items};

use super::{PrecomputeReport, ProviderContext, RecommendationProvider};
use crate::signals::DeletionEvent;
use crate::tasks::{InvalidationJob, InvalidationKind};

/// Every active user in the context's user directory.
pub async fn users(context: &ProviderContext) -> Result<Vec<UserId>> {
    context.users().active_users().await
}

/// Schedule removal of the deleted object's similarities and recommendations.
///
/// Returns once both jobs are queued. Running it twice for the same object
/// queues jobs that find nothing left to remove.
pub fn on_source_deleted(context: &ProviderContext, event: &DeletionEvent) -> Result<()> {
    let item = event.item();
    log::debug!(
        "'{}' invalidating {item} after {:?}",
        context.domain(),
        event.source
    );

    let tasks = context.tasks();
    tasks.submit(InvalidationJob::new(
        InvalidationKind::Similarities,
        item.clone(),
        context.storage().clone(),
    ))?;
    tasks.submit(InvalidationJob::new(
        InvalidationKind::Recommendations,
        item,
        context.storage().clone(),
    ))
}

/// Cached vote list, or one rebuilt from the provider's items and ratings.
///
/// A rebuilt list skips inactive ratings and ratings whose score is NaN or
/// infinite, resolves a missing site to the configured default, and is stored
/// before it is returned.
pub async fn vote_list<P>(provider: &P) -> Result<VoteList>
where
    P: RecommendationProvider + ?Sized,
{
    let context = provider.context();
    let storage = context.storage();

    if let Some(votes) = storage.get_votes().await? {
        log::debug!("'{}' vote cache hit ({} votes)", provider.name(), votes.len());
        return Ok(votes);
    }
    log::debug!("'{}' vote cache miss, walking ratings", provider.name());

    let default_site = &context.settings().default_site;
    let mut votes = VoteList::new();
    for item in provider.items().await? {
        for rating in provider.ratings(&item).await? {
            if !provider.is_rating_active(&rating) {
                continue;
            }
            let user = provider.rating_user(&rating);
            let score = provider.rating_score(&rating);
            if !score.is_finite() {
                log::warn!("'{}' skipping score {score} from '{user}' on {item}", provider.name());
                continue;
            }
            let site = provider
                .rating_site(&rating)
                .unwrap_or_else(|| default_site.clone());
            votes.push(Vote::new(user, storage.identifier(&item, &site), score));
        }
    }

    storage.store_votes(&votes).await?;
    Ok(votes)
}

/// Similarity map from the provider's metric and the configured list cap.
pub fn calculate_similarities<P>(provider: &P, votes: &[Vote]) -> SimilarityMap
where
    P: RecommendationProvider + ?Sized,
{
    calculate_similar_items(
        votes,
        provider.similarity(),
        provider.context().settings().max_similar_items,
    )
}

/// One ranked suggestion list per user, in the order `users()` returns them.
pub async fn calculate_recommendations<P>(
    provider: &P,
    votes: &[Vote],
    similarities: &SimilarityMap,
) -> Result<RecommendationList>
where
    P: RecommendationProvider + ?Sized,
{
    let recommendations = provider
        .users()
        .await?
        .into_iter()
        .map(|user| {
            let items = get_recommended_items(votes, similarities, &user);
            UserRecommendations { user, items }
        })
        .collect();
    Ok(recommendations)
}

/// Resolve votes, then compute and store similarities and recommendations.
///
/// Stages run in order and the first error aborts the rest. Rerunning is
/// always safe: each stage recomputes from its input.
pub async fn precompute<P>(provider: &P, votes: Option<VoteList>) -> Result<PrecomputeReport>
where
    P: RecommendationProvider + ?Sized,
{
    let name = provider.name();
    let storage = provider.context().storage();

    let votes_supplied = votes.is_some();
    let mut votes_cached = false;
    let votes = match votes {
        Some(votes) => votes,
        None => {
            log::info!("[{name}] fetching votes from the storage...");
            votes_cached = storage.get_votes().await?.is_some();
            provider.vote_list().await?
        }
    };

    log::info!("[{name}] calculating similarities from {} votes...", votes.len());
    let similarities = provider.calculate_similarities(&votes);

    log::info!("[{name}] saving similarities for {} items...", similarities.len());
    storage.store_similarities(&similarities).await?;

    log::info!("[{name}] calculating recommendations...");
    let recommendations = provider
        .calculate_recommendations(&votes, &similarities)
        .await?;

    log::info!(
        "[{name}] saving recommendations for {} users...",
        recommendations.len()
    );
    storage.store_recommendations(&recommendations).await?;

    Ok(PrecomputeReport {
        domain: provider.context().domain().clone(),
        votes: votes.len(),
        votes_supplied,
        votes_cached,
        similar_items: similarities.len(),
        recommended_users: recommendations.len(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::signals::EventSource;
    use crate::testing::{
        FlakyStorage, MockProvider, MockRating, RecordingTaskQueue, article, article_ratings,
        context, context_with, ident,
    };
    use crate::users::NoUserDirectory;
    use recommends_core::{
        Domain, Error, ItemRef, MemoryStorage, ScoredItem, SiteId, StorageBackend,
    };
    use std::sync::Arc;

    #[tokio::test]
    async fn test_vote_list_builds_from_ratings() {
        let provider = MockProvider::new(context("blog.vote"), article_ratings());
        let votes = provider.vote_list().await.unwrap();

        assert_eq!(votes.len(), 4);
        assert!(votes.contains(&Vote::new(UserId::new("u1"), ident("a1"), 5.0)));
        assert!(votes.contains(&Vote::new(UserId::new("u2"), ident("a3"), 5.0)));
    }

    #[tokio::test]
    async fn test_vote_list_second_call_is_cached() {
        let provider = MockProvider::new(context("blog.vote"), article_ratings());

        let first = provider.vote_list().await.unwrap();
        assert_eq!(provider.item_calls(), 1);
        assert_eq!(provider.rating_calls(), 3);

        let second = provider.vote_list().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.item_calls(), 1);
        assert_eq!(provider.rating_calls(), 3);
    }

    #[tokio::test]
    async fn test_vote_list_skips_inactive_ratings() {
        let mut ratings = article_ratings();
        ratings.push(MockRating::new("u3", article("a2"), 1.0).inactive());
        let provider = MockProvider::new(context("blog.vote"), ratings);

        let votes = provider.vote_list().await.unwrap();
        assert_eq!(votes.len(), 4);
        assert!(votes.iter().all(|v| v.user != UserId::new("u3")));
    }

    #[tokio::test]
    async fn test_vote_list_uses_rating_site() {
        let ratings = vec![
            MockRating::new("u1", article("a1"), 5.0).on_site("7"),
            MockRating::new("u1", article("a2"), 3.0),
        ];
        let provider = MockProvider::new(context("blog.vote"), ratings);

        let votes = provider.vote_list().await.unwrap();
        let a1_on_7 = recommends_core::identifier::compose(&article("a1"), &SiteId::new("7"));
        assert_eq!(votes[0].item, a1_on_7);
        assert_eq!(votes[1].item, ident("a2"));
    }

    #[tokio::test]
    async fn test_vote_list_skips_non_finite_scores() {
        let mut ratings = article_ratings();
        ratings.push(MockRating::new("u3", article("a2"), f64::NAN));
        ratings.push(MockRating::new("u3", article("a3"), f64::INFINITY));
        let provider = MockProvider::new(context("blog.vote"), ratings);

        let votes = provider.vote_list().await.unwrap();
        assert_eq!(votes.len(), 4);
        assert!(votes.iter().all(|v| v.score.is_finite()));

        // The cache was written and reads back.
        let cached = provider.context().storage().get_votes().await.unwrap();
        assert_eq!(cached, Some(votes));
    }

    #[tokio::test]
    async fn test_precompute_reports_cache_hit() {
        let provider = MockProvider::new(context("blog.vote"), article_ratings());

        let first = provider.precompute(None).await.unwrap();
        assert!(!first.votes_cached);

        let second = provider.precompute(None).await.unwrap();
        assert!(second.votes_cached);
        assert!(!second.votes_supplied);
        assert_eq!(second.votes, first.votes);
        assert_eq!(provider.item_calls(), 1);
    }

    #[tokio::test]
    async fn test_users_without_directory_is_not_implemented() {
        let ctx = context_with("blog.vote", Arc::new(MemoryStorage::new()), Arc::new(NoUserDirectory));
        let provider = MockProvider::new(ctx, article_ratings());

        let err = provider.users().await.unwrap_err();
        assert!(matches!(err, Error::NotImplemented(_)));
    }

    #[tokio::test]
    async fn test_precompute_stores_artifacts() {
        let provider = MockProvider::new(context("blog.vote"), article_ratings());
        let report = provider.precompute(None).await.unwrap();

        assert_eq!(report.domain.as_str(), "blog.vote");
        assert_eq!(report.votes, 4);
        assert!(!report.votes_supplied);
        assert!(!report.votes_cached);
        assert_eq!(report.similar_items, 3);
        assert_eq!(report.recommended_users, 2);

        let storage = provider.context().storage();
        let related = storage.get_similarities(&ident("a1")).await.unwrap();
        let related: Vec<&str> = related.iter().map(|s| s.identifier.as_str()).collect();
        assert_eq!(related, vec![ident("a3").as_str(), ident("a2").as_str()]);

        let a2 = storage.get_similarities(&ident("a2")).await.unwrap();
        assert!(a2.iter().all(|s| s.identifier != ident("a3")));

        let u1 = storage.get_recommendations(&UserId::new("u1")).await.unwrap();
        assert_eq!(u1, vec![ScoredItem::new(ident("a3"), 5.0)]);
    }

    #[tokio::test]
    async fn test_precompute_with_supplied_votes_skips_extraction() {
        let provider = MockProvider::new(context("blog.vote"), article_ratings());
        let votes = vec![
            Vote::new(UserId::new("u1"), ident("a1"), 5.0),
            Vote::new(UserId::new("u1"), ident("a2"), 3.0),
        ];

        let report = provider.precompute(Some(votes)).await.unwrap();
        assert!(report.votes_supplied);
        assert!(!report.votes_cached);
        assert_eq!(report.votes, 2);
        assert_eq!(provider.item_calls(), 0);
    }

    #[tokio::test]
    async fn test_precompute_is_deterministic() {
        let provider = MockProvider::new(context("blog.vote"), article_ratings());
        let storage = provider.context().storage();

        provider.precompute(None).await.unwrap();
        let sims_first = serde_json::to_vec(&storage.get_similarity_map().await.unwrap()).unwrap();
        let recs_first =
            serde_json::to_vec(&storage.get_recommendation_list().await.unwrap()).unwrap();

        provider.precompute(None).await.unwrap();
        let sims_second = serde_json::to_vec(&storage.get_similarity_map().await.unwrap()).unwrap();
        let recs_second =
            serde_json::to_vec(&storage.get_recommendation_list().await.unwrap()).unwrap();

        assert_eq!(sims_first, sims_second);
        assert_eq!(recs_first, recs_second);
    }

    #[tokio::test]
    async fn test_precompute_aborts_on_storage_failure() {
        let flaky = Arc::new(FlakyStorage::new(MemoryStorage::new()).fail_similarity_writes());
        let ctx = context("blog.vote").with_storage(flaky.clone());
        let provider = MockProvider::new(ctx, article_ratings());

        let err = provider.precompute(None).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));

        let scope = Domain::new("blog.vote").unwrap();
        // Votes were cached before the failing stage; nothing after it ran.
        assert!(flaky.inner().get_votes(&scope).await.unwrap().is_some());
        assert!(flaky.inner().get_recommendation_list(&scope).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_on_source_deleted_submits_both_jobs() {
        let queue = Arc::new(RecordingTaskQueue::default());
        let ctx = context("blog.vote");
        let ctx = recommends_ctx_with_queue(ctx, queue.clone());

        let event = DeletionEvent::new(
            EventSource::PreDelete,
            Domain::new("blog.article").unwrap(),
            "a2",
        );
        on_source_deleted(&ctx, &event).unwrap();

        let jobs = queue.jobs();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].kind(), InvalidationKind::Similarities);
        assert_eq!(jobs[1].kind(), InvalidationKind::Recommendations);
        assert!(jobs.iter().all(|job| job.item() == &article("a2")));
    }

    #[tokio::test]
    async fn test_invalidation_twice_matches_once() {
        let queue = Arc::new(RecordingTaskQueue::default());
        let provider = MockProvider::new(
            recommends_ctx_with_queue(context("blog.vote"), queue.clone()),
            article_ratings(),
        );
        provider.precompute(None).await.unwrap();
        let storage = provider.context().storage();
        let event = DeletionEvent::pre_delete(Domain::new("blog.article").unwrap(), "a2");

        provider.on_source_deleted(&event).unwrap();
        queue.run_all().await.unwrap();
        let once = (
            storage.get_similarity_map().await.unwrap(),
            storage.get_recommendation_list().await.unwrap(),
        );

        provider.on_source_deleted(&event).unwrap();
        queue.run_all().await.unwrap();
        let twice = (
            storage.get_similarity_map().await.unwrap(),
            storage.get_recommendation_list().await.unwrap(),
        );

        assert_eq!(once, twice);
        let map = once.0.unwrap();
        assert!(!map.contains_key(&ident("a2")));
        assert!(map
            .values()
            .flatten()
            .all(|s| s.identifier != ident("a2")));
    }

    fn recommends_ctx_with_queue(
        ctx: ProviderContext,
        queue: Arc<RecordingTaskQueue>,
    ) -> ProviderContext {
        ProviderContext::new(
            ctx.domain().clone(),
            Arc::clone(ctx.storage().backend()),
            queue,
            Arc::clone(ctx.users()),
            ctx.settings().clone(),
        )
    }

    #[test]
    fn test_item_ref_from_event() {
        let event = DeletionEvent::pre_delete(Domain::new("blog.article").unwrap(), "9");
        assert_eq!(
            event.item(),
            ItemRef::new(Domain::new("blog.article").unwrap(), "9")
        );
    }
}
