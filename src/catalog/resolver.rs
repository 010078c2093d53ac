// Catalog resolution passes: tracks -> artists, then artists -> images.
//
// Each pass probes the resolution cache first, folds hits straight into the
// aggregation context, fetches the misses in bunched rounds, and finally
// writes what it newly resolved back to the cache in one batch.

use std::collections::BTreeMap;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::client::CatalogApi;
use super::models::{CatalogArtist, CatalogTrack};
use super::rounds::{fetch_in_rounds, BunchPlan};
use crate::aggregate::models::SPOTIFY_APPLICATION;
use crate::aggregate::AggregationContext;
use crate::cache::{CachedArtist, CachedArtistRef, CachedTrack, ResolutionCache};
use crate::retry::RetryPolicy;

/// Knobs shared by both resolution passes.
#[derive(Debug, Clone, Copy)]
pub struct ResolveSettings {
    pub plan: BunchPlan,
    pub retry: RetryPolicy,
    /// Max cache probes in flight.
    pub probe_concurrency: usize,
}

impl Default for ResolveSettings {
    fn default() -> Self {
        Self {
            plan: BunchPlan::default(),
            retry: RetryPolicy::default(),
            probe_concurrency: 50,
        }
    }
}

/// Counters for one resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionStats {
    pub requested: usize,
    pub cache_hits: usize,
    /// IDs resolved over the network.
    pub fetched: usize,
    /// IDs given up on after the last retry level.
    pub failed: Vec<String>,
    pub cache_writes: usize,
    pub requests: u64,
}

impl ResolutionStats {
    pub fn succeeded(&self) -> usize {
        self.cache_hits + self.fetched
    }
}

/// Probe the cache for every ID. Returns decoded hits and the IDs to fetch.
///
/// I/O errors and undecodable entries are logged and treated as misses.
async fn probe_cache<T: DeserializeOwned>(
    cache: &dyn ResolutionCache,
    ids: Vec<String>,
    concurrency: usize,
) -> (Vec<T>, Vec<String>) {
    let mut hits = Vec::new();
    let mut misses = Vec::new();

    let mut probes = stream::iter(ids.into_iter().map(|id| async move {
        let result = cache.get(&id).await;
        (id, result)
    }))
    .buffered(concurrency.max(1));

    while let Some((id, result)) = probes.next().await {
        match result {
            Ok(Some(value)) => match serde_json::from_value::<T>(value) {
                Ok(entry) => hits.push(entry),
                Err(e) => {
                    warn!(id = %id, error = %e, "Undecodable cache entry, refetching");
                    misses.push(id);
                }
            },
            Ok(None) => misses.push(id),
            Err(e) => {
                warn!(id = %id, error = %e, "Cache read failed, refetching");
                misses.push(id);
            }
        }
    }

    (hits, misses)
}

/// Write newly resolved entries. Failures are logged, never fatal.
async fn write_back<T: Serialize>(
    cache: &dyn ResolutionCache,
    entries: BTreeMap<String, T>,
    namespace: &str,
) -> usize {
    if entries.is_empty() {
        debug!(namespace = namespace, "No new cache entries");
        return 0;
    }

    let encoded: Result<BTreeMap<String, serde_json::Value>, _> = entries
        .into_iter()
        .map(|(id, entry)| serde_json::to_value(entry).map(|v| (id, v)))
        .collect();

    let encoded = match encoded {
        Ok(encoded) => encoded,
        Err(e) => {
            warn!(namespace = namespace, error = %e, "Failed to encode cache entries");
            return 0;
        }
    };

    let count = encoded.len();
    match cache.batch_put(encoded).await {
        Ok(()) => {
            info!(namespace = namespace, count = count, "Cached new entries");
            count
        }
        Err(e) => {
            warn!(namespace = namespace, error = %e, "Failed to write cache batch");
            0
        }
    }
}

/// Fold a cached track's artists into the artist index.
fn fold_cached_track(ctx: &mut AggregationContext, track: &CachedTrack) {
    for artist in &track.artists {
        ctx.absorb_track_artist(&track.id, &artist.id, &artist.name, &artist.href);
    }
}

/// Fold a freshly resolved track and remember its cache entry.
/// Tracks without an artist list are skipped.
fn fold_catalog_track(
    ctx: &mut AggregationContext,
    track: &CatalogTrack,
    new_entries: &mut BTreeMap<String, CachedTrack>,
) {
    let Some(artists) = &track.artists else {
        return;
    };
    let track_id = track.canonical_id();

    let mut refs = Vec::with_capacity(artists.len());
    for artist in artists {
        ctx.absorb_track_artist(track_id, &artist.id, &artist.name, &artist.href);
        refs.push(CachedArtistRef {
            id: artist.id.clone(),
            name: artist.name.clone(),
            application: SPOTIFY_APPLICATION.to_string(),
            href: artist.href.clone(),
        });
    }

    new_entries.insert(
        track_id.to_string(),
        CachedTrack {
            id: track_id.to_string(),
            artists: refs,
        },
    );
}

/// Resolve every indexed track to its artists.
pub async fn resolve_tracks(
    ctx: &mut AggregationContext,
    api: &dyn CatalogApi,
    cache: Option<&dyn ResolutionCache>,
    settings: &ResolveSettings,
) -> ResolutionStats {
    let started = Instant::now();
    let ids = ctx.tracks.ids();
    let mut stats = ResolutionStats {
        requested: ids.len(),
        ..Default::default()
    };

    let to_fetch = match cache {
        Some(cache) => {
            let (hits, misses) = probe_cache::<CachedTrack>(cache, ids, settings.probe_concurrency).await;
            stats.cache_hits = hits.len();
            for track in &hits {
                fold_cached_track(ctx, track);
            }
            misses
        }
        None => ids,
    };
    info!(
        cache_hits = stats.cache_hits,
        need_fetch = to_fetch.len(),
        "Track cache pass complete"
    );

    let mut new_entries = BTreeMap::new();
    let outcome = fetch_in_rounds(
        &to_fetch,
        settings.plan,
        settings.retry,
        |bunch: Vec<String>| async move { api.tracks(&bunch).await },
        |_, tracks: Vec<CatalogTrack>| {
            for track in &tracks {
                fold_catalog_track(ctx, track, &mut new_entries);
            }
        },
    )
    .await;

    stats.fetched = outcome.resolved;
    stats.failed = outcome.failed;
    stats.requests = outcome.requests;

    if let Some(cache) = cache {
        stats.cache_writes = write_back(cache, new_entries, "tracks").await;
    }

    info!(
        succeeded = stats.succeeded(),
        failed = stats.failed.len(),
        artists = ctx.artists.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Track resolution complete"
    );
    stats
}

/// Merge a resolved image list into an indexed artist. Unknown IDs are ignored.
/// Returns the cache entry for the artist when it was indexed.
fn merge_images(
    ctx: &mut AggregationContext,
    artist: &CatalogArtist,
) -> Option<CachedArtist> {
    let entry = ctx.artists.get_mut(&artist.id)?;
    let images = artist.images.clone().unwrap_or_default();
    entry.item.images = Some(images.clone());
    Some(CachedArtist {
        id: artist.id.clone(),
        name: entry.item.name.clone(),
        application: entry.item.application.clone(),
        href: entry.item.href.clone(),
        images,
    })
}

/// Resolve images for the given artist IDs (normally those with fans).
pub async fn resolve_artist_images(
    ctx: &mut AggregationContext,
    api: &dyn CatalogApi,
    cache: Option<&dyn ResolutionCache>,
    artist_ids: Vec<String>,
    settings: &ResolveSettings,
) -> ResolutionStats {
    let started = Instant::now();
    let mut stats = ResolutionStats {
        requested: artist_ids.len(),
        ..Default::default()
    };

    let to_fetch = match cache {
        Some(cache) => {
            let (hits, misses) =
                probe_cache::<CachedArtist>(cache, artist_ids, settings.probe_concurrency).await;
            stats.cache_hits = hits.len();
            for cached in hits {
                if let Some(entry) = ctx.artists.get_mut(&cached.id) {
                    entry.item.images = Some(cached.images);
                }
            }
            misses
        }
        None => artist_ids,
    };
    info!(
        cache_hits = stats.cache_hits,
        need_fetch = to_fetch.len(),
        "Artist cache pass complete"
    );

    let mut new_entries = BTreeMap::new();
    let outcome = fetch_in_rounds(
        &to_fetch,
        settings.plan,
        settings.retry,
        |bunch: Vec<String>| async move { api.artists(&bunch).await },
        |_, artists: Vec<CatalogArtist>| {
            for artist in &artists {
                if let Some(entry) = merge_images(ctx, artist) {
                    new_entries.insert(entry.id.clone(), entry);
                }
            }
        },
    )
    .await;

    stats.fetched = outcome.resolved;
    stats.failed = outcome.failed;
    stats.requests = outcome.requests;

    if let Some(cache) = cache {
        stats.cache_writes = write_back(cache, new_entries, "artists").await;
    }

    info!(
        succeeded = stats.succeeded(),
        failed = stats.failed.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Artist image resolution complete"
    );
    stats
}
