// Resolution cache: previously resolved catalog metadata, keyed by ID.
//
// One cache instance per namespace (tracks, artists). Values are JSON so the
// stored shape can evolve without migrations. The trait keeps the pipeline
// independent of the backing store; tests use the in-memory implementation.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::aggregate::models::Image;

pub use memory::MemoryCache;

/// Key-value store for resolved catalog entities.
#[async_trait]
pub trait ResolutionCache: Send + Sync {
    /// Look up an ID. `Ok(None)` is a miss; `Err` is an I/O failure.
    async fn get(&self, id: &str) -> Result<Option<serde_json::Value>>;

    /// Write all entries atomically.
    async fn batch_put(&self, entries: BTreeMap<String, serde_json::Value>) -> Result<()>;

    /// Number of stored entries.
    async fn len(&self) -> Result<u64>;

    /// Release the store. Any later call is an error.
    async fn close(&self) -> Result<()>;
}

/// A cached track: just enough to rebuild its artist memberships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedTrack {
    pub id: String,
    pub artists: Vec<CachedArtistRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedArtistRef {
    pub id: String,
    pub name: String,
    pub application: String,
    pub href: String,
}

/// A cached artist with its image references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedArtist {
    pub id: String,
    pub name: String,
    pub application: String,
    pub href: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

/// The two namespaces the resolver uses.
#[derive(Clone)]
pub struct Caches {
    pub tracks: std::sync::Arc<dyn ResolutionCache>,
    pub artists: std::sync::Arc<dyn ResolutionCache>,
}

impl Caches {
    /// Fresh in-memory caches: nothing survives the run.
    pub fn in_memory() -> Self {
        Self {
            tracks: std::sync::Arc::new(MemoryCache::new()),
            artists: std::sync::Arc::new(MemoryCache::new()),
        }
    }

    /// Close both namespaces, reporting the first failure after trying both.
    pub async fn close(&self) -> Result<()> {
        let tracks = self.tracks.close().await;
        let artists = self.artists.close().await;
        tracks.and(artists)
    }
}
