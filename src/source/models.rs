// Customer documents as stored in the record store.
//
// Only the fields the aggregation reads are modelled. Every field is
// optional and type-tolerant because documents are written by several
// collectors over the years and none of them can be trusted to be complete.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::lenient;

const TRACK_PATH: &str = "https://open.spotify.com/track/";
const ALBUM_PATH: &str = "https://open.spotify.com/album/";

/// One customer's social and listening data. Read-only once fetched.
///
/// Fields of the wrong JSON type read as absent, and malformed list
/// elements are dropped, so a record only fails to parse when the document
/// itself is not an object.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerRecord {
    #[serde(default, deserialize_with = "lenient::opt_object")]
    pub profile: Option<Profile>,
    #[serde(default, deserialize_with = "lenient::opt_list")]
    pub likes: Option<Vec<LikeRecord>>,
    #[serde(default, deserialize_with = "lenient::opt_slots")]
    pub music_listens: Option<Vec<Option<MusicListen>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub gender: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LikeRecord {
    #[serde(default, deserialize_with = "opt_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MusicListen {
    #[serde(default, deserialize_with = "lenient::opt_object")]
    pub application: Option<Application>,
    #[serde(default, deserialize_with = "lenient::opt_object")]
    pub data: Option<ListenData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Application {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListenData {
    #[serde(default, deserialize_with = "lenient::opt_object")]
    pub song: Option<Song>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Song {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub url: Option<String>,
}

impl CustomerRecord {
    /// Male only when the profile says so. A missing profile or gender
    /// counts as not male (and therefore female in the gender split).
    pub fn is_male(&self) -> bool {
        self.profile
            .as_ref()
            .and_then(|p| p.gender.as_deref())
            .is_some_and(|g| g == "male")
    }

    pub fn likes(&self) -> &[LikeRecord] {
        self.likes.as_deref().unwrap_or_default()
    }

    /// Non-null listen events.
    pub fn listens(&self) -> impl Iterator<Item = &MusicListen> {
        self.music_listens.iter().flatten().flatten()
    }
}

impl MusicListen {
    pub fn app_name(&self) -> Option<&str> {
        self.application.as_ref()?.name.as_deref()
    }

    pub fn song_url(&self) -> Option<&str> {
        self.data.as_ref()?.song.as_ref()?.url.as_deref()
    }
}

/// Extract a Spotify track ID from a song URL.
///
/// Two shapes are recognised, after upgrading `http:` to `https:`:
/// `https://open.spotify.com/track/<id>` and
/// `https://open.spotify.com/album/<album>/<id>`. Query strings and
/// fragments are dropped. Anything else yields `None`.
pub fn track_id_from_url(url: &str) -> Option<String> {
    let url = url.trim().replacen("http:", "https:", 1);
    let url = url.split(['?', '#']).next().unwrap_or_default();

    let id = if let Some(rest) = url.strip_prefix(TRACK_PATH) {
        rest.split('/').next()
    } else if let Some(rest) = url.strip_prefix(ALBUM_PATH) {
        rest.split('/').nth(1)
    } else {
        None
    }?;

    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Normalise a JSON ID (string or number) to a string.
pub fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(id_from_value))
}
