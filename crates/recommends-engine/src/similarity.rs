//! Similarity metrics between two items.
//!
//! A metric compares the scores two items received from the users who rated
//! both. It returns `None` when no user rated both items, so callers can tell
//! "unrelated" apart from "related with score 0".

use std::collections::BTreeMap;

use recommends_core::{Error, Result, UserId, Vote};

/// Item identifier → (user → score).
pub type Preferences = BTreeMap<String, BTreeMap<UserId, f64>>;

/// Signature shared by all similarity metrics.
pub type Metric = fn(&Preferences, &str, &str) -> Option<f64>;

/// Pivot a vote list into per-item preferences.
///
/// A repeated `(user, item)` pair keeps the last score.
pub fn item_preferences(votes: &[Vote]) -> Preferences {
    let mut prefs = Preferences::new();
    for vote in votes {
        prefs
            .entry(vote.item.clone())
            .or_default()
            .insert(vote.user.clone(), vote.score);
    }
    prefs
}

/// Score pairs `(a, b)` from users who rated both items.
fn shared_scores(prefs: &Preferences, a: &str, b: &str) -> Vec<(f64, f64)> {
    let (Some(a_scores), Some(b_scores)) = (prefs.get(a), prefs.get(b)) else {
        return Vec::new();
    };
    a_scores
        .iter()
        .filter_map(|(user, a_score)| b_scores.get(user).map(|b_score| (*a_score, *b_score)))
        .collect()
}

/// Euclidean distance score: `1 / (1 + Σ(a − b)²)`, in `(0, 1]`.
pub fn sim_distance(prefs: &Preferences, a: &str, b: &str) -> Option<f64> {
    let shared = shared_scores(prefs, a, b);
    if shared.is_empty() {
        return None;
    }
    let sum_of_squares: f64 = shared.iter().map(|(x, y)| (x - y).powi(2)).sum();
    Some(1.0 / (1.0 + sum_of_squares))
}

/// Pearson correlation coefficient, in `[-1, 1]`.
///
/// Returns `Some(0.0)` when either item's shared scores have no variance.
pub fn sim_pearson(prefs: &Preferences, a: &str, b: &str) -> Option<f64> {
    let shared = shared_scores(prefs, a, b);
    if shared.is_empty() {
        return None;
    }
    let n = shared.len() as f64;

    let sum_a: f64 = shared.iter().map(|(x, _)| x).sum();
    let sum_b: f64 = shared.iter().map(|(_, y)| y).sum();
    let sum_a_sq: f64 = shared.iter().map(|(x, _)| x * x).sum();
    let sum_b_sq: f64 = shared.iter().map(|(_, y)| y * y).sum();
    let sum_products: f64 = shared.iter().map(|(x, y)| x * y).sum();

    let numerator = sum_products - (sum_a * sum_b / n);
    let denominator = ((sum_a_sq - sum_a.powi(2) / n) * (sum_b_sq - sum_b.powi(2) / n)).sqrt();
    if denominator == 0.0 || denominator.is_nan() {
        return Some(0.0);
    }
    Some(numerator / denominator)
}

/// Look up a metric by its configuration name (`"distance"` or `"pearson"`).
pub fn metric_by_name(name: &str) -> Result<Metric> {
    match name {
        "distance" | "euclidean" => Ok(sim_distance as Metric),
        "pearson" => Ok(sim_pearson as Metric),
        other => Err(Error::config(format!("Unknown similarity metric: {other}"))),
    }
}
