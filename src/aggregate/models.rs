// Aggregated entity payloads.
//
// The count and membership bookkeeping lives in `Tallied<T>`; these are the
// per-kind payloads carried alongside it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::index::{Counted, Tallied};

/// Provider tag stamped on every artist resolved through the catalog.
pub const SPOTIFY_APPLICATION: &str = "Spotify";

/// A liked page/entity. Members are customer IDs.
#[derive(Debug, Clone, PartialEq)]
pub struct Like {
    pub name: String,
    pub category: String,
}

/// A catalog artist. Members are track IDs.
#[derive(Debug, Clone, Default)]
pub struct Artist {
    pub name: String,
    pub application: String,
    pub href: String,
    /// Customer ID -> number of this artist's tracks the customer played.
    /// Filled by the fan-count pass, empty until then.
    pub listeners: HashMap<String, u32>,
    /// Set by the artist-image pass.
    pub images: Option<Vec<Image>>,
}

/// A catalog image reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
}

pub type LikeEntity = Tallied<Like>;
/// Tracks carry no payload: the ID, play count and listeners are the data.
pub type TrackEntity = Tallied<()>;
pub type ArtistEntity = Tallied<Artist>;

/// An artist with at least one fan, derived once after the fan-count pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FanCountEntity {
    pub id: String,
    pub name: String,
    pub application: String,
    pub href: String,
    /// Number of customers meeting the repeat-listen threshold.
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<Image>>,
}

impl Counted for FanCountEntity {
    fn count(&self) -> u64 {
        self.count
    }
}
