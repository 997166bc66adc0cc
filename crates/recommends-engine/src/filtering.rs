//! Item-based collaborative filtering.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use recommends_core::{ScoredItem, SimilarityMap, UserId, Vote};

use crate::similarity::{Metric, item_preferences};

/// Best score first; equal scores fall back to identifier order.
fn rank(a: &ScoredItem, b: &ScoredItem) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.identifier.cmp(&b.identifier))
}

/// Compute, for every voted item, its ranked list of related items.
///
/// Pairs without a co-rating user are omitted rather than scored, as are pairs
/// the metric scores as NaN or infinite. An item is never related to itself.
/// `limit` caps each list after ranking.
pub fn calculate_similar_items(
    votes: &[Vote],
    metric: Metric,
    limit: Option<usize>,
) -> SimilarityMap {
    let prefs = item_preferences(votes);
    let mut similarities = SimilarityMap::new();

    for item in prefs.keys() {
        let mut related: Vec<ScoredItem> = prefs
            .keys()
            .filter(|other| *other != item)
            .filter_map(|other| {
                metric(&prefs, item, other)
                    .filter(|score| score.is_finite())
                    .map(|score| ScoredItem::new(other, score))
            })
            .collect();
        related.sort_by(rank);
        if let Some(limit) = limit {
            related.truncate(limit);
        }
        similarities.insert(item.clone(), related);
    }

    log::debug!("Computed similarities for {} items", similarities.len());
    similarities
}

/// Rank the items `user` has not rated by similarity-weighted prediction.
///
/// For each item the user rated, each neighbour contributes
/// `similarity × rating` to its score and `similarity` to its weight; the
/// prediction is `score / weight`. Neighbours with a non-positive total weight
/// or a non-finite prediction are dropped.
pub fn get_recommended_items(
    votes: &[Vote],
    similarities: &SimilarityMap,
    user: &UserId,
) -> Vec<ScoredItem> {
    let user_ratings: BTreeMap<&str, f64> = votes
        .iter()
        .filter(|vote| &vote.user == user)
        .map(|vote| (vote.item.as_str(), vote.score))
        .collect();

    let mut totals: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for (item, rating) in &user_ratings {
        let Some(neighbours) = similarities.get(*item) else {
            continue;
        };
        for neighbour in neighbours {
            if user_ratings.contains_key(neighbour.identifier.as_str()) {
                continue;
            }
            let entry = totals.entry(neighbour.identifier.as_str()).or_default();
            entry.0 += neighbour.score * rating;
            entry.1 += neighbour.score;
        }
    }

    let mut rankings: Vec<ScoredItem> = totals
        .into_iter()
        .filter(|(_, (_, weight))| *weight > 0.0)
        .map(|(identifier, (score, weight))| ScoredItem::new(identifier, score / weight))
        .filter(|scored| scored.score.is_finite())
        .collect();
    rankings.sort_by(rank);
    rankings
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::similarity::{Preferences, sim_distance, sim_pearson};
    use proptest::prelude::*;

    fn article_votes() -> Vec<Vote> {
        vec![
            Vote::new(UserId::new("u1"), "a1", 5.0),
            Vote::new(UserId::new("u1"), "a2", 3.0),
            Vote::new(UserId::new("u2"), "a1", 4.0),
            Vote::new(UserId::new("u2"), "a3", 5.0),
        ]
    }

    fn identifiers(items: &[ScoredItem]) -> Vec<&str> {
        items.iter().map(|s| s.identifier.as_str()).collect()
    }

    #[test]
    fn test_similar_items_relations() {
        let sims = calculate_similar_items(&article_votes(), sim_distance, None);

        assert_eq!(identifiers(&sims["a1"]), vec!["a3", "a2"]);
        assert_eq!(identifiers(&sims["a2"]), vec!["a1"]);
        assert_eq!(identifiers(&sims["a3"]), vec!["a1"]);
    }

    #[test]
    fn test_similar_items_unrelated_pair_absent() {
        let sims = calculate_similar_items(&article_votes(), sim_distance, None);
        assert!(!identifiers(&sims["a2"]).contains(&"a3"));
        assert!(!identifiers(&sims["a3"]).contains(&"a2"));
    }

    #[test]
    fn test_similar_items_scores() {
        let sims = calculate_similar_items(&article_votes(), sim_distance, None);
        // a1/a2 via u1: 1 / (1 + 4); a1/a3 via u2: 1 / (1 + 1)
        assert_eq!(sims["a1"][0].score, 0.5);
        assert_eq!(sims["a1"][1].score, 0.2);
    }

    #[test]
    fn test_similar_items_limit() {
        let sims = calculate_similar_items(&article_votes(), sim_distance, Some(1));
        assert_eq!(identifiers(&sims["a1"]), vec!["a3"]);
    }

    #[test]
    fn test_similar_items_tie_break_by_identifier() {
        let votes = vec![
            Vote::new(UserId::new("u1"), "x", 1.0),
            Vote::new(UserId::new("u1"), "c", 1.0),
            Vote::new(UserId::new("u1"), "b", 1.0),
        ];
        let sims = calculate_similar_items(&votes, sim_distance, None);
        assert_eq!(identifiers(&sims["x"]), vec!["b", "c"]);
    }

    #[test]
    fn test_similar_items_empty() {
        assert!(calculate_similar_items(&[], sim_pearson, None).is_empty());
    }

    #[test]
    fn test_recommended_items() {
        let votes = article_votes();
        let sims = calculate_similar_items(&votes, sim_distance, None);

        // u1 rated a1 (5) and a2 (3); only a3 is unrated, reachable via a1.
        let recs = get_recommended_items(&votes, &sims, &UserId::new("u1"));
        assert_eq!(recs, vec![ScoredItem::new("a3", 5.0)]);

        // u2 rated a1 (4) and a3 (5); a2 is reachable via a1.
        let recs = get_recommended_items(&votes, &sims, &UserId::new("u2"));
        assert_eq!(recs, vec![ScoredItem::new("a2", 4.0)]);
    }

    #[test]
    fn test_recommended_items_weighted_average() {
        let mut sims = SimilarityMap::new();
        sims.insert(
            "a".into(),
            vec![ScoredItem::new("c", 0.5), ScoredItem::new("d", 0.25)],
        );
        sims.insert("b".into(), vec![ScoredItem::new("c", 0.5)]);
        let votes = vec![
            Vote::new(UserId::new("u"), "a", 4.0),
            Vote::new(UserId::new("u"), "b", 2.0),
        ];

        let recs = get_recommended_items(&votes, &sims, &UserId::new("u"));
        // c: (0.5*4 + 0.5*2) / 1.0 = 3 ; d: 0.25*4 / 0.25 = 4
        assert_eq!(recs, vec![ScoredItem::new("d", 4.0), ScoredItem::new("c", 3.0)]);
    }

    #[test]
    fn test_recommended_items_unknown_user() {
        let votes = article_votes();
        let sims = calculate_similar_items(&votes, sim_distance, None);
        assert!(get_recommended_items(&votes, &sims, &UserId::new("ghost")).is_empty());
    }

    #[test]
    fn test_recommended_items_skip_non_positive_weight() {
        let mut sims = SimilarityMap::new();
        sims.insert("a".into(), vec![ScoredItem::new("b", -0.5)]);
        let votes = vec![Vote::new(UserId::new("u"), "a", 4.0)];
        assert!(get_recommended_items(&votes, &sims, &UserId::new("u")).is_empty());
    }

    #[test]
    fn test_similar_items_drop_non_finite_scores() {
        fn always_nan(_: &Preferences, _: &str, _: &str) -> Option<f64> {
            Some(f64::NAN)
        }
        let sims = calculate_similar_items(&article_votes(), always_nan, None);
        assert_eq!(sims.len(), 3);
        assert!(sims.values().all(|related| related.is_empty()));
    }

    #[test]
    fn test_recommended_items_drop_non_finite_predictions() {
        let mut sims = SimilarityMap::new();
        sims.insert("a".into(), vec![ScoredItem::new("b", 0.5)]);
        let votes = vec![Vote::new(UserId::new("u"), "a", f64::INFINITY)];
        assert!(get_recommended_items(&votes, &sims, &UserId::new("u")).is_empty());
    }

    fn arb_votes() -> impl Strategy<Value = Vec<Vote>> {
        prop::collection::vec((0u8..6, 0u8..8, 1u8..=5), 0..40).prop_map(|raw| {
            raw.into_iter()
                .map(|(user, item, score)| {
                    Vote::new(UserId::new(format!("u{user}")), format!("i{item}"), score as f64)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_items_never_relate_to_themselves(votes in arb_votes()) {
            for metric in [sim_distance as Metric, sim_pearson as Metric] {
                let sims = calculate_similar_items(&votes, metric, None);
                for (item, related) in &sims {
                    prop_assert!(related.iter().all(|s| &s.identifier != item));
                }
            }
        }

        #[test]
        fn prop_related_lists_are_ranked(votes in arb_votes()) {
            let sims = calculate_similar_items(&votes, sim_distance, None);
            for related in sims.values() {
                for pair in related.windows(2) {
                    prop_assert!(rank(&pair[0], &pair[1]) != Ordering::Greater);
                }
            }
        }

        #[test]
        fn prop_similarities_are_deterministic(votes in arb_votes()) {
            let first = calculate_similar_items(&votes, sim_pearson, Some(3));
            let second = calculate_similar_items(&votes, sim_pearson, Some(3));
            prop_assert_eq!(first, second);
        }
    }
}
