use std::cell::RefCell;
use std::sync::Once;

use crate::error::{Result, SyncError};
use crate::models::Track;
use crate::normalize::NormalizedTrack;
use crate::services::Search;

static INIT: Once = Once::new();

pub fn init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Track built from already-canonical parts.
pub fn track(
    service: &str,
    collection: &str,
    number: u32,
    id: &str,
    title: &str,
    primary: &[&str],
    featured: &[&str],
) -> Track {
    let primary: Vec<String> = primary.iter().map(|s| s.to_string()).collect();
    let featured: Vec<String> = featured.iter().map(|s| s.to_string()).collect();
    let queries = crate::normalize::build_queries(title, &primary[0], &featured);
    let normalized = NormalizedTrack {
        title: title.to_string(),
        primary_artists: primary,
        featured_artists: featured,
        queries,
    };
    Track::from_normalized(service, collection, number, id, normalized, serde_json::json!({}))
}

/// Search double: fixed playlist, a catalog answered literally, scripted failures
/// and a log of every call.
pub struct ScriptedSearch {
    pub playlist: Vec<Track>,
    pub catalog: Vec<Track>,
    pub failing_queries: Vec<String>,
    pub playlist_unavailable: bool,
    pub calls: RefCell<Vec<(String, Vec<String>)>>,
}

impl ScriptedSearch {
    pub fn new(playlist: Vec<Track>, catalog: Vec<Track>) -> Self {
        Self {
            playlist,
            catalog,
            failing_queries: Vec::new(),
            playlist_unavailable: false,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl Search for ScriptedSearch {
    fn service_name(&self) -> &str {
        "spotify"
    }

    fn search_tracks(&self, query: &str, artists: &[&str], limit: usize) -> Result<Vec<Track>> {
        self.calls.borrow_mut().push((
            query.to_string(),
            artists.iter().map(|a| a.to_string()).collect(),
        ));
        if self.failing_queries.iter().any(|q| q == query) {
            return Err(SyncError::Search {
                service: "spotify".to_string(),
                message: "scripted failure".to_string(),
            });
        }
        Ok(self
            .catalog
            .iter()
            .filter(|t| query.contains(t.title()))
            .filter(|t| {
                let credits = t.artist_credits();
                artists.iter().all(|a| credits.contains(a))
            })
            .take(limit)
            .cloned()
            .collect())
    }

    fn get_playlist_tracks(&self, _playlist_id: &str) -> Result<Vec<Track>> {
        if self.playlist_unavailable {
            return Err(SyncError::Search {
                service: "spotify".to_string(),
                message: "playlist unavailable".to_string(),
            });
        }
        Ok(self.playlist.clone())
    }
}
