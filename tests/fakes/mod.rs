// In-memory stand-ins for the record store, the music catalog and the cache.
//
// The record and catalog fakes count their calls so tests can assert on
// network traffic. They decode through the same response types as the real
// clients.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};

use social_analytics::aggregate::models::Image;
use social_analytics::cache::ResolutionCache;
use social_analytics::catalog::client::CatalogApi;
use social_analytics::catalog::models::{CatalogArtist, CatalogTrack, TracksResponse};
use social_analytics::source::store::{rows_to_batch, AllDocsRow};
use social_analytics::source::{BatchRow, RecordSource};

#[derive(Default)]
pub struct FakeRecords {
    pub records: HashMap<String, Value>,
    /// A batch containing any of these IDs fails as a whole.
    pub failing: HashSet<String>,
    pub calls: AtomicU64,
}

impl FakeRecords {
    pub fn with(mut self, id: &str, record: Value) -> Self {
        self.records.insert(id.to_string(), record);
        self
    }

    pub fn fail_on(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }
}

#[async_trait]
impl RecordSource for FakeRecords {
    async fn fetch_batch(&self, ids: &[String]) -> anyhow::Result<Vec<BatchRow>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if ids.iter().any(|id| self.failing.contains(id)) {
            anyhow::bail!("record store unavailable");
        }
        // Same row shapes as an `_all_docs` keys lookup.
        let rows = ids
            .iter()
            .map(|id| match self.records.get(id) {
                Some(doc) => AllDocsRow {
                    key: Value::String(id.clone()),
                    doc: Some(doc.clone()),
                    error: None,
                },
                None => AllDocsRow {
                    key: Value::String(id.clone()),
                    doc: None,
                    error: Some("not_found".to_string()),
                },
            })
            .collect();
        Ok(rows_to_batch(ids, rows))
    }
}

#[derive(Default)]
pub struct FakeCatalog {
    /// track ID -> catalog entity, as the catalog would serve it
    pub tracks: HashMap<String, Value>,
    pub images: HashMap<String, Vec<Image>>,
    /// A bunch containing any of these IDs fails every time.
    pub failing: HashSet<String>,
    pub track_calls: AtomicU64,
    pub artist_calls: AtomicU64,
}

fn artist_refs(artists: &[&str]) -> Vec<Value> {
    artists
        .iter()
        .map(|a| {
            json!({
                "id": a,
                "name": format!("Artist {a}"),
                "href": format!("https://api.spotify.com/v1/artists/{a}"),
            })
        })
        .collect()
}

impl FakeCatalog {
    pub fn track(mut self, id: &str, artists: &[&str]) -> Self {
        self.tracks
            .insert(id.to_string(), json!({"id": id, "artists": artist_refs(artists)}));
        self
    }

    /// A track requested as `requested` but served as its relinked copy `served`.
    pub fn linked(mut self, requested: &str, served: &str, artists: &[&str]) -> Self {
        self.tracks.insert(
            requested.to_string(),
            json!({
                "id": served,
                "artists": artist_refs(artists),
                "linked_from": {"id": requested},
            }),
        );
        self
    }

    /// Serve an arbitrary entity body for `id`.
    pub fn raw_track(mut self, id: &str, entity: Value) -> Self {
        self.tracks.insert(id.to_string(), entity);
        self
    }

    pub fn image(mut self, artist: &str, url: &str) -> Self {
        self.images.insert(
            artist.to_string(),
            vec![Image {
                url: url.to_string(),
                height: Some(640),
                width: Some(640),
            }],
        );
        self
    }

    pub fn fail_on(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub fn total_calls(&self) -> u64 {
        self.track_calls.load(Ordering::SeqCst) + self.artist_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogApi for FakeCatalog {
    async fn tracks(&self, ids: &[String]) -> anyhow::Result<Vec<CatalogTrack>> {
        self.track_calls.fetch_add(1, Ordering::SeqCst);
        if ids.iter().any(|id| self.failing.contains(id)) {
            anyhow::bail!("catalog returned 503");
        }
        // One slot per requested ID, null when unknown.
        let slots: Vec<Value> = ids
            .iter()
            .map(|id| self.tracks.get(id).cloned().unwrap_or(Value::Null))
            .collect();
        let resp: TracksResponse = serde_json::from_value(json!({"tracks": slots}))?;
        Ok(resp.tracks)
    }

    async fn artists(&self, ids: &[String]) -> anyhow::Result<Vec<CatalogArtist>> {
        self.artist_calls.fetch_add(1, Ordering::SeqCst);
        if ids.iter().any(|id| self.failing.contains(id)) {
            anyhow::bail!("catalog returned 503");
        }
        Ok(ids
            .iter()
            .map(|id| CatalogArtist {
                id: id.clone(),
                images: self.images.get(id).cloned(),
            })
            .collect())
    }
}

/// A cache whose every read and write fails.
#[derive(Default)]
pub struct FailingCache {
    pub gets: AtomicU64,
    pub puts: AtomicU64,
}

#[async_trait]
impl ResolutionCache for FailingCache {
    async fn get(&self, _id: &str) -> anyhow::Result<Option<Value>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("disk I/O error")
    }

    async fn batch_put(&self, _entries: BTreeMap<String, Value>) -> anyhow::Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("database is locked")
    }

    async fn len(&self) -> anyhow::Result<u64> {
        Ok(0)
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A customer document listening to the given Spotify tracks.
pub fn listener(gender: Option<&str>, tracks: &[&str], likes: &[&str]) -> Value {
    let listens: Vec<Value> = tracks
        .iter()
        .map(|t| {
            serde_json::json!({
                "application": {"name": "Spotify"},
                "data": {"song": {"url": format!("https://open.spotify.com/track/{t}")}}
            })
        })
        .collect();
    let likes: Vec<Value> = likes
        .iter()
        .map(|l| serde_json::json!({"id": l, "name": format!("Page {l}"), "category": "Musician/Band"}))
        .collect();

    let mut doc = serde_json::json!({"likes": likes, "music_listens": listens});
    if let Some(g) = gender {
        doc["profile"] = serde_json::json!({"gender": g});
    }
    doc
}

pub fn ids(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}
