// Serde types for Spotify's several-tracks and several-artists endpoints.
//
// Both endpoints return one slot per requested ID, `null` for unknown IDs,
// and entities can arrive with fields missing or mistyped. Slots are parsed
// one by one: an entity without a usable ID is dropped on its own and the
// rest of the bunch still resolves.

use serde::Deserialize;

use crate::aggregate::models::Image;
use crate::lenient;

/// `GET /tracks?ids=...`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TracksResponse {
    #[serde(default, deserialize_with = "lenient::list")]
    pub tracks: Vec<CatalogTrack>,
}

/// `GET /artists?ids=...`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtistsResponse {
    #[serde(default, deserialize_with = "lenient::list")]
    pub artists: Vec<CatalogArtist>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogTrack {
    pub id: String,
    #[serde(default, deserialize_with = "lenient::opt_list")]
    pub artists: Option<Vec<CatalogArtistRef>>,
    /// Present when the requested track was relinked to another market's copy.
    #[serde(default, deserialize_with = "lenient::opt_object")]
    pub linked_from: Option<LinkedFrom>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LinkedFrom {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogArtistRef {
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string_or_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string_or_empty")]
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogArtist {
    pub id: String,
    #[serde(default, deserialize_with = "lenient::opt_list")]
    pub images: Option<Vec<Image>>,
}

impl CatalogTrack {
    /// The ID the track is indexed under: the `linked_from` ID when present.
    pub fn canonical_id(&self) -> &str {
        self.linked_from
            .as_ref()
            .map(|l| l.id.as_str())
            .unwrap_or(&self.id)
    }
}

/// Token endpoint response for the client-credentials grant.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracks_with_nulls_and_partial_entities() {
        let json = r#"{"tracks": [
            {"id": "t1", "artists": [{"id": "a1", "name": "A", "href": "h"}]},
            null,
            {"id": "t2"},
            {"id": "t3", "artists": [], "linked_from": {"id": "t3-original"}}
        ]}"#;
        let resp: TracksResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.tracks.len(), 3);
        assert_eq!(resp.tracks[0].canonical_id(), "t1");
        assert!(resp.tracks[1].artists.is_none());
        assert_eq!(resp.tracks[2].canonical_id(), "t3-original");
    }

    #[test]
    fn test_malformed_track_does_not_fail_its_bunch() {
        let json = r#"{"tracks": [
            {"id": "t1", "artists": [{"id": "a1", "name": null, "href": 42}]},
            {"artists": [{"id": "a2", "name": "No track id"}]},
            {"id": "t3", "artists": [{"name": "No artist id"}, {"id": "a3"}], "linked_from": {"id": null}}
        ]}"#;
        let resp: TracksResponse = serde_json::from_str(json).unwrap();

        let ids: Vec<&str> = resp.tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t3"]);

        let a1 = &resp.tracks[0].artists.as_ref().unwrap()[0];
        assert_eq!((a1.name.as_str(), a1.href.as_str()), ("", ""));

        let t3 = &resp.tracks[1];
        assert_eq!(t3.canonical_id(), "t3");
        let t3_artists: Vec<&str> = t3.artists.iter().flatten().map(|a| a.id.as_str()).collect();
        assert_eq!(t3_artists, vec!["a3"]);
    }

    #[test]
    fn test_artists_with_images() {
        let json = r#"{"artists": [
            {"id": "a1", "images": [{"url": "https://i/1", "height": 640, "width": 640}, {"height": 64}]},
            {"id": "a2"},
            {"images": []}
        ]}"#;
        let resp: ArtistsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.artists.len(), 2);
        let images = resp.artists[0].images.as_ref().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].height, Some(640));
        assert!(resp.artists[1].images.is_none());
    }
}
