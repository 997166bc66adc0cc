//! Similarity and recommendation engines for Recommends.
//!
//! Pure functions over vote lists: no storage, no domain knowledge.
//!
//! - [`calculate_similar_items`]: vote list → similarity map
//! - [`get_recommended_items`]: vote list + similarity map + user → ranked items
//!
//! Metrics ([`sim_distance`], [`sim_pearson`]) are plain function pointers so
//! providers can declare theirs as a value.

pub mod filtering;
pub mod similarity;

pub use filtering::{calculate_similar_items, get_recommended_items};
pub use similarity::{Metric, Preferences, item_preferences, metric_by_name, sim_distance, sim_pearson};
