// Fan-count aggregation: artists -> tracks -> customers.
//
// A customer's per-artist count is the number of that artist's tracks the
// customer appears on. A fan is a customer whose count meets the threshold.

use super::index::OrderedIndex;
use super::models::{Artist, FanCountEntity};

/// Fill every artist's per-customer listen map from the track index.
///
/// Tracks named by an artist but missing from the track index are skipped.
/// Existing listener maps are rebuilt from scratch, so calling this twice
/// gives the same result as calling it once.
pub fn tally_listeners(artists: &mut OrderedIndex<Artist>, tracks: &OrderedIndex<()>) {
    for artist in artists.iter_mut() {
        artist.item.listeners.clear();
        for track_id in artist.members.iter() {
            let Some(track) = tracks.get(track_id) else {
                continue;
            };
            for customer_id in track.members.iter() {
                *artist
                    .item
                    .listeners
                    .entry(customer_id.to_string())
                    .or_insert(0) += 1;
            }
        }
    }
}

/// Number of listeners whose count is at least `threshold`.
pub fn fan_count(artist: &Artist, threshold: u32) -> u64 {
    artist
        .listeners
        .values()
        .filter(|&&plays| plays >= threshold)
        .count() as u64
}

/// IDs of artists with at least one fan, in index order.
pub fn fan_artist_ids(artists: &OrderedIndex<Artist>, threshold: u32) -> Vec<String> {
    artists
        .iter()
        .filter(|a| fan_count(&a.item, threshold) > 0)
        .map(|a| a.id.clone())
        .collect()
}

/// Materialize the fan-count sequence. Artists without fans are dropped;
/// survivors keep the artist index's insertion order.
pub fn fan_counts(artists: &OrderedIndex<Artist>, threshold: u32) -> Vec<FanCountEntity> {
    artists
        .iter()
        .filter_map(|artist| {
            let count = fan_count(&artist.item, threshold);
            (count > 0).then(|| FanCountEntity {
                id: artist.id.clone(),
                name: artist.item.name.clone(),
                application: artist.item.application.clone(),
                href: artist.item.href.clone(),
                count,
                images: artist.item.images.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artist_named(name: &str) -> Artist {
        Artist {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_track_is_skipped() {
        let mut artists = OrderedIndex::new();
        artists.upsert("artist-1", "ghost-track", || artist_named("A"));
        let tracks: OrderedIndex<()> = OrderedIndex::new();

        tally_listeners(&mut artists, &tracks);
        assert!(artists.get("artist-1").unwrap().item.listeners.is_empty());
    }

    #[test]
    fn test_tally_is_idempotent() {
        let mut tracks = OrderedIndex::new();
        tracks.upsert("t1", "cust-a", || ());
        tracks.upsert("t2", "cust-a", || ());
        let mut artists = OrderedIndex::new();
        artists.upsert("artist-1", "t1", || artist_named("A"));
        artists.upsert("artist-1", "t2", || artist_named("A"));

        tally_listeners(&mut artists, &tracks);
        tally_listeners(&mut artists, &tracks);

        let listeners = &artists.get("artist-1").unwrap().item.listeners;
        assert_eq!(listeners.get("cust-a"), Some(&2));
    }

    #[test]
    fn test_fan_count_threshold_boundary() {
        let mut artist = artist_named("A");
        artist.listeners.insert("a".into(), 2);
        artist.listeners.insert("b".into(), 1);
        artist.listeners.insert("c".into(), 3);
        assert_eq!(fan_count(&artist, 2), 2);
        assert_eq!(fan_count(&artist, 3), 1);
        assert_eq!(fan_count(&artist, 4), 0);
    }
}
