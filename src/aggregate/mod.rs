// Aggregation state for one run.
//
// The context is owned by the run driver and handed by `&mut` to each
// stage. All mutation happens on the driver task between I/O completions,
// so the indexes need no locking.

pub mod compact;
pub mod fans;
pub mod index;
pub mod models;

use std::collections::BTreeMap;

use tracing::warn;

use crate::source::models::{track_id_from_url, CustomerRecord};
use index::OrderedIndex;
use models::{Artist, Like, SPOTIFY_APPLICATION};

/// Gender split of fetched customers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenderCounts {
    pub male: u64,
    /// Includes customers without a profile.
    pub female: u64,
}

/// Per-customer fetch outcomes.
#[derive(Debug, Clone, Default)]
pub struct FetchStats {
    pub succeeded: Vec<String>,
    pub not_found: Vec<String>,
    /// Documents that exist but could not be read as customer records.
    pub malformed: Vec<String>,
    /// IDs from batches that failed after the batch's own retries.
    pub failed: Vec<String>,
    pub likes_loaded: u64,
    pub listens_loaded: u64,
    /// Provider listens whose song URL matched no known shape.
    pub malformed_urls: u64,
}

/// Everything aggregated during a run.
#[derive(Debug, Default)]
pub struct AggregationContext {
    pub likes: OrderedIndex<Like>,
    pub tracks: OrderedIndex<()>,
    pub artists: OrderedIndex<Artist>,
    /// Listen events per application name, resolvable or not.
    pub music_apps: BTreeMap<String, u64>,
    pub gender: GenderCounts,
    pub fetch: FetchStats,
}

impl AggregationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fetched customer record into the likes and track indexes.
    pub fn absorb_customer(&mut self, customer_id: &str, record: &CustomerRecord) {
        // A missing profile lands in `female`. Kept as-is pending a product
        // decision on an "unknown" bucket.
        if record.is_male() {
            self.gender.male += 1;
        } else {
            self.gender.female += 1;
        }

        let likes = record.likes();
        self.fetch.likes_loaded += likes.len() as u64;
        self.fetch.listens_loaded += record.music_listens.as_ref().map_or(0, |l| l.len()) as u64;
        self.fetch.succeeded.push(customer_id.to_string());

        for like in likes {
            let Some(like_id) = like.id.as_deref() else {
                continue;
            };
            self.likes.upsert(like_id, customer_id, || Like {
                name: like.name.clone().unwrap_or_default(),
                category: like.category.clone().unwrap_or_default(),
            });
        }

        for listen in record.listens() {
            let Some(app) = listen.app_name() else {
                continue;
            };
            *self.music_apps.entry(app.to_string()).or_insert(0) += 1;

            if app != SPOTIFY_APPLICATION {
                continue;
            }
            let Some(url) = listen.song_url() else {
                continue;
            };
            match track_id_from_url(url) {
                Some(track_id) => {
                    self.tracks.upsert(&track_id, customer_id, || ());
                }
                None => {
                    self.fetch.malformed_urls += 1;
                    warn!(url = url, customer_id = customer_id, "Unrecognised Spotify URL, skipping");
                }
            }
        }
    }

    /// Record a resolved track's artist. The track ID is the membership
    /// element; name and href come from the first sighting of the artist.
    pub fn absorb_track_artist(&mut self, track_id: &str, artist_id: &str, name: &str, href: &str) {
        self.artists.upsert(artist_id, track_id, || Artist {
            name: name.to_string(),
            application: SPOTIFY_APPLICATION.to_string(),
            href: href.to_string(),
            ..Default::default()
        });
    }
}
