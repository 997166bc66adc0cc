//! JSON file storage backend.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<scope>/votes.json            VoteSnapshot (with stored_at)
//! <root>/<scope>/similarities.json     SimilarityMap
//! <root>/<scope>/recommendations.json  RecommendationList
//! ```
//!
//! Similarities and recommendations carry no timestamps, so identical inputs
//! produce byte-identical files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use super::{
    StorageBackend, VoteSnapshot, ensure_finite_recommendations, ensure_finite_similarities,
    ensure_finite_votes, prune_recommendations, prune_similarities, prune_votes,
};
use crate::types::{Domain, ItemRef, RecommendationList, SimilarityMap, Vote, VoteList};
use crate::{Error, Result};

const VOTES_FILE: &str = "votes.json";
const SIMILARITIES_FILE: &str = "similarities.json";
const RECOMMENDATIONS_FILE: &str = "recommendations.json";

/// Storage backed by JSON files, one directory per vote domain.
pub struct FileStorage {
    root: PathBuf,
    votes_ttl: Option<Duration>,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Store artifacts under `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            votes_ttl: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Expire cached vote lists older than `ttl`.
    pub fn with_votes_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.votes_ttl = ttl;
        self
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of one artifact file for `scope`.
    pub fn artifact_path(&self, scope: &Domain, file: &str) -> PathBuf {
        self.root.join(scope.as_str()).join(file)
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io_with_path(e, path)),
        };
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Serialization(format!("{}: {e}", path.display())))?;
        Ok(Some(value))
    }

    async fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_with_path(e, parent))?;
        }

        let json = serde_json::to_vec_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| Error::io_with_path(e, &tmp))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| Error::io_with_path(e, path))?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    fn name(&self) -> &str {
        "file"
    }

    async fn get_votes(&self, scope: &Domain) -> Result<Option<VoteList>> {
        let path = self.artifact_path(scope, VOTES_FILE);
        let snapshot: Option<VoteSnapshot> = self.read_json(&path).await?;
        Ok(snapshot
            .filter(|snapshot| snapshot.is_fresh(self.votes_ttl))
            .map(|snapshot| snapshot.votes))
    }

    async fn store_votes(&self, scope: &Domain, votes: &[Vote]) -> Result<()> {
        ensure_finite_votes(votes)?;
        let _guard = self.write_lock.lock().await;
        let path = self.artifact_path(scope, VOTES_FILE);
        self.write_json(&path, &VoteSnapshot::now(votes)).await
    }

    async fn store_similarities(
        &self,
        scope: &Domain,
        similarities: &SimilarityMap,
    ) -> Result<()> {
        ensure_finite_similarities(similarities)?;
        let _guard = self.write_lock.lock().await;
        let path = self.artifact_path(scope, SIMILARITIES_FILE);
        self.write_json(&path, similarities).await
    }

    async fn store_recommendations(
        &self,
        scope: &Domain,
        recommendations: &RecommendationList,
    ) -> Result<()> {
        ensure_finite_recommendations(recommendations)?;
        let _guard = self.write_lock.lock().await;
        let path = self.artifact_path(scope, RECOMMENDATIONS_FILE);
        self.write_json(&path, recommendations).await
    }

    async fn get_similarity_map(&self, scope: &Domain) -> Result<Option<SimilarityMap>> {
        self.read_json(&self.artifact_path(scope, SIMILARITIES_FILE))
            .await
    }

    async fn get_recommendation_list(
        &self,
        scope: &Domain,
    ) -> Result<Option<RecommendationList>> {
        self.read_json(&self.artifact_path(scope, RECOMMENDATIONS_FILE))
            .await
    }

    async fn remove_similarities(&self, scope: &Domain, item: &ItemRef) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let votes_path = self.artifact_path(scope, VOTES_FILE);
        if let Some(mut snapshot) = self.read_json::<VoteSnapshot>(&votes_path).await? {
            if prune_votes(&mut snapshot.votes, item) > 0 {
                self.write_json(&votes_path, &snapshot).await?;
            }
        }

        let path = self.artifact_path(scope, SIMILARITIES_FILE);
        let Some(mut map) = self.read_json::<SimilarityMap>(&path).await? else {
            return Ok(0);
        };
        let removed = prune_similarities(&mut map, item);
        if removed > 0 {
            self.write_json(&path, &map).await?;
        }
        Ok(removed)
    }

    async fn remove_recommendations(&self, scope: &Domain, item: &ItemRef) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let path = self.artifact_path(scope, RECOMMENDATIONS_FILE);
        let Some(mut list) = self.read_json::<RecommendationList>(&path).await? else {
            return Ok(0);
        };
        let removed = prune_recommendations(&mut list, item);
        if removed > 0 {
            self.write_json(&path, &list).await?;
        }
        Ok(removed)
    }
}
