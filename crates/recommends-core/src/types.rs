//! Data model shared by providers, engines, and storage backends.
//!
//! The pipeline speaks in a handful of small value types:
//!
//! - [`Rating`]: what a provider extracts from a domain's native rating record
//! - [`Vote`]: the normalized `(user, identifier, score)` unit the engines consume
//! - [`SimilarityMap`]: per-item ranked neighbours
//! - [`RecommendationList`]: per-user ranked suggestions

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ============================================================================
// Identity newtypes
// ============================================================================

/// A category of rated entity, e.g. `"blog.article"`.
///
/// Domains qualify storage identifiers and name storage directories, so a
/// domain name must be non-empty, must not contain `:` or a path separator,
/// and must not be `.` or `..`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Domain(String);

impl Domain {
    /// Create a domain, validating its name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::invalid_data("domain name must not be empty"));
        }
        if name.contains(crate::identifier::SEPARATOR) {
            return Err(Error::invalid_data(format!(
                "domain name '{name}' must not contain '{}'",
                crate::identifier::SEPARATOR
            )));
        }
        if name.contains(['/', '\\', '\0']) || name == "." || name == ".." {
            return Err(Error::invalid_data(format!(
                "domain name '{name}' must be a single path component"
            )));
        }
        Ok(Self(name))
    }

    /// The domain name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Domain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Domain {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Domain> for String {
    fn from(domain: Domain) -> Self {
        domain.0
    }
}

/// Identifies a user who rates items and receives recommendations.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a user id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A site or partition a rating belongs to.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(String);

impl SiteId {
    /// Create a site id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SiteId {
    fn default() -> Self {
        Self::new("1")
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SiteId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Reference to a rated object: its domain plus its id within that domain.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    /// Domain the object lives in.
    pub domain: Domain,
    /// Object id, unique within the domain.
    pub id: String,
}

impl ItemRef {
    /// Create an item reference.
    pub fn new(domain: Domain, id: impl Into<String>) -> Self {
        Self {
            domain,
            id: id.into(),
        }
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.domain, self.id)
    }
}

// ============================================================================
// Ratings and votes
// ============================================================================

/// Immutable rating value: who rated what, and how.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    user: UserId,
    rated_item: ItemRef,
    score: f64,
}

impl Rating {
    /// Create a rating.
    pub fn new(user: UserId, rated_item: ItemRef, score: f64) -> Self {
        Self {
            user,
            rated_item,
            score,
        }
    }

    /// The rating's author.
    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// The rated object.
    pub fn rated_item(&self) -> &ItemRef {
        &self.rated_item
    }

    /// The numeric score.
    pub fn score(&self) -> f64 {
        self.score
    }
}

/// Normalized vote: `(user, item identifier, score)`.
///
/// `item` is the site-qualified identifier produced by the storage port, so
/// votes from different domains never collide.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    /// Voting user.
    pub user: UserId,
    /// Storage identifier of the voted item.
    pub item: String,
    /// Score given.
    pub score: f64,
}

impl Vote {
    /// Create a vote.
    pub fn new(user: UserId, item: impl Into<String>, score: f64) -> Self {
        Self {
            user,
            item: item.into(),
            score,
        }
    }
}

/// Ordered sequence of votes, one per active rating.
pub type VoteList = Vec<Vote>;

// ============================================================================
// Computed artifacts
// ============================================================================

/// An item identifier paired with a score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    /// Storage identifier.
    pub identifier: String,
    /// Similarity or predicted score.
    pub score: f64,
}

impl ScoredItem {
    /// Create a scored item.
    pub fn new(identifier: impl Into<String>, score: f64) -> Self {
        Self {
            identifier: identifier.into(),
            score,
        }
    }
}

/// Item identifier → related items, descending by score.
///
/// A `BTreeMap` keeps serialization order stable across runs.
pub type SimilarityMap = BTreeMap<String, Vec<ScoredItem>>;

/// Ranked suggestions for one user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserRecommendations {
    /// Recipient.
    pub user: UserId,
    /// Suggested items, descending by predicted score.
    pub items: Vec<ScoredItem>,
}

/// One entry per user returned by a domain.
pub type RecommendationList = Vec<UserRecommendations>;
