//! Offline collaborators backed by service payloads already on disk.
//!
//! `CatalogSearch` answers searches from a decoded track catalog using literal
//! matching only. `PayloadChart` serves chart collections from raw items.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::models::Track;
use crate::services::{
    decode_collection, decode_track, radio4zzz_most_played, ChartSource, Search, ServiceKind,
};

// ============================================================================
// Catalog Search
// ============================================================================

/// Search over a fixed set of tracks from one target service.
///
/// A catalog track is a hit when its title appears in the query text and its
/// credits include every artist of the slice. Hits keep catalog order.
pub struct CatalogSearch {
    kind: ServiceKind,
    collection: String,
    catalog: Vec<Track>,
    playlists: BTreeMap<String, Vec<Track>>,
}

impl CatalogSearch {
    /// Empty catalog. Tracks are decoded into `collection`, normally the target playlist id.
    pub fn new(kind: ServiceKind, collection: &str) -> Self {
        Self {
            kind,
            collection: collection.to_string(),
            catalog: Vec::new(),
            playlists: BTreeMap::new(),
        }
    }

    /// Add raw catalog items. Items that fail to decode are skipped with a warning.
    pub fn with_catalog(mut self, items: &[Value]) -> Self {
        for (index, raw) in items.iter().enumerate() {
            let number = self.catalog.len() as u32 + 1;
            match decode_track(self.kind, &self.collection, number, raw) {
                Ok(track) => self.catalog.push(track),
                Err(e) => warn!(service = %self.kind, item = index, error = %e, "Skipping catalog item"),
            }
        }
        self
    }

    /// Add the current contents of a playlist.
    pub fn with_playlist(mut self, playlist_id: &str, items: &[Value]) -> Result<Self> {
        let tracks = decode_collection(self.kind, &self.collection, items, items.len())?;
        self.playlists.insert(playlist_id.to_string(), tracks);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }
}

impl Search for CatalogSearch {
    fn service_name(&self) -> &str {
        self.kind.code()
    }

    fn search_tracks(&self, query: &str, artists: &[&str], limit: usize) -> Result<Vec<Track>> {
        let hits: Vec<Track> = self
            .catalog
            .iter()
            .filter(|t| query.contains(t.title()))
            .filter(|t| {
                let credits = t.artist_credits();
                artists.iter().all(|a| credits.contains(a))
            })
            .take(limit)
            .cloned()
            .collect();
        debug!(service = %self.kind, query, hits = hits.len(), "Catalog search");
        Ok(hits)
    }

    fn get_playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>> {
        self.playlists
            .get(playlist_id)
            .cloned()
            .ok_or_else(|| SyncError::Search {
                service: self.kind.code().to_string(),
                message: format!("Unknown playlist '{}'", playlist_id),
            })
    }
}

// ============================================================================
// Payload Chart
// ============================================================================

/// Chart collections of one source service from raw payload items.
pub struct PayloadChart {
    kind: ServiceKind,
    collections: BTreeMap<String, Vec<Value>>,
}

impl PayloadChart {
    pub fn new(kind: ServiceKind) -> Self {
        Self {
            kind,
            collections: BTreeMap::new(),
        }
    }

    /// Add a collection's raw items. For 4zzz these are individual plays.
    pub fn with_collection(mut self, collection: &str, items: Vec<Value>) -> Self {
        self.collections.insert(collection.to_string(), items);
        self
    }
}

impl ChartSource for PayloadChart {
    fn get_collection_tracks(&self, collection: &str, limit: usize) -> Result<Vec<Track>> {
        let items = self.collections.get(collection).ok_or_else(|| SyncError::Decode {
            service: self.kind.code().to_string(),
            message: format!("No payload for collection '{}'", collection),
        })?;

        let tracks = match self.kind {
            ServiceKind::Radio4zzz => {
                let ranked = radio4zzz_most_played(items, limit);
                decode_collection(self.kind, collection, &ranked, limit)?
            }
            _ => decode_collection(self.kind, collection, items, limit)?,
        };
        debug!(service = %self.kind, collection, tracks = tracks.len(), "Decoded chart collection");
        Ok(tracks)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spotify_item(id: &str, name: &str, artists: &[&str]) -> Value {
        let artists: Vec<Value> = artists.iter().map(|a| json!({"name": a})).collect();
        json!({"id": id, "name": name, "artists": artists})
    }

    fn catalog() -> CatalogSearch {
        CatalogSearch::new(ServiceKind::Spotify, "p1").with_catalog(&[
            spotify_item("s1", "Call My Name", &["Smile", "Robyn"]),
            spotify_item("s2", "Call My Name", &["Tribute Band"]),
            json!({"name": "missing id"}),
            spotify_item("s3", "Dancing On My Own", &["Robyn"]),
        ])
    }

    #[test]
    fn test_catalog_skips_bad_items() {
        assert_eq!(catalog().len(), 3);
    }

    #[test]
    fn test_search_requires_title_and_artists() {
        let search = catalog();
        let hits = search
            .search_tracks("call my name - smile, robyn", &["smile", "robyn"], 5)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].track_id(), "s1");

        let hits = search.search_tracks("call my name - smile", &[], 5).unwrap();
        assert_eq!(hits.len(), 2);

        let hits = search.search_tracks("call my name - smile", &[], 1).unwrap();
        assert_eq!(hits.len(), 1);

        assert!(search.search_tracks("unknown - nobody", &["nobody"], 5).unwrap().is_empty());
    }

    #[test]
    fn test_playlist_tracks() {
        let search = CatalogSearch::new(ServiceKind::Spotify, "p1")
            .with_playlist("p1", &[spotify_item("s3", "Dancing On My Own", &["Robyn"])])
            .unwrap();
        let tracks = search.get_playlist_tracks("p1").unwrap();
        assert_eq!(tracks[0].source_name(), "spotify_p1");
        assert!(matches!(
            search.get_playlist_tracks("p2"),
            Err(SyncError::Search { .. })
        ));
    }

    #[test]
    fn test_payload_chart_4zzz_ranks_plays() {
        let chart = PayloadChart::new(ServiceKind::Radio4zzz).with_collection(
            "most_played",
            vec![
                json!({"type": "track", "artist": "A", "track": "One", "title": "One"}),
                json!({"type": "track", "artist": "B", "track": "Two", "title": "Two"}),
                json!({"type": "track", "artist": "B", "track": "Two", "title": "Two"}),
            ],
        );
        let tracks = chart.get_collection_tracks("most_played", 10).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].track_id(), "b-two");
        assert_eq!(tracks[0].track_number(), 1);
        assert!(chart.get_collection_tracks("other", 10).is_err());
    }
}
