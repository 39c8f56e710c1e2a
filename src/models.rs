//! Core data models for chart-to-playlist reconciliation.
//!
//! This module contains the track identity value, the persisted record and
//! entry shapes exchanged with storage, and the per-run report.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::matching::{self, ArtistFallback};
use crate::normalize::{normalize_track, NormalizedTrack, SEP_SPACED};

// ============================================================================
// Raw Input
// ============================================================================

/// Artist credits as a service provides them: one credit string or a list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArtistInput {
    One(String),
    Many(Vec<String>),
}

impl ArtistInput {
    /// Join list-valued credits with the canonical separator.
    pub fn joined(&self) -> String {
        match self {
            ArtistInput::One(s) => s.clone(),
            ArtistInput::Many(v) => v.join(SEP_SPACED),
        }
    }
}

impl Default for ArtistInput {
    fn default() -> Self {
        ArtistInput::Many(Vec::new())
    }
}

impl From<&str> for ArtistInput {
    fn from(s: &str) -> Self {
        ArtistInput::One(s.to_string())
    }
}

impl From<String> for ArtistInput {
    fn from(s: String) -> Self {
        ArtistInput::One(s)
    }
}

impl From<Vec<String>> for ArtistInput {
    fn from(v: Vec<String>) -> Self {
        ArtistInput::Many(v)
    }
}

impl From<Vec<&str>> for ArtistInput {
    fn from(v: Vec<&str>) -> Self {
        ArtistInput::Many(v.into_iter().map(String::from).collect())
    }
}

impl From<&[String]> for ArtistInput {
    fn from(v: &[String]) -> Self {
        ArtistInput::Many(v.to_vec())
    }
}

/// Title and credits as fetched, before normalization. Supplied per fetch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTrackInput {
    pub title: String,
    pub primary_artists: ArtistInput,
    #[serde(default)]
    pub featured_artists: ArtistInput,
}

impl RawTrackInput {
    pub fn new(
        title: &str,
        primary_artists: impl Into<ArtistInput>,
        featured_artists: impl Into<ArtistInput>,
    ) -> Self {
        Self {
            title: title.to_string(),
            primary_artists: primary_artists.into(),
            featured_artists: featured_artists.into(),
        }
    }
}

// ============================================================================
// Track Identity
// ============================================================================

/// Display metadata decoded from a service payload, used when persisting a track.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDetails {
    pub title: String,
    pub artists: String,
    pub info_url: String,
    pub image_url: String,
    pub external_code: Option<String>,
}

/// One fetched or searched track in canonical form. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Track {
    service_name: String,
    collection_name: String,
    track_number: u32,
    track_id: String,
    title: String,
    primary_artists: Vec<String>,
    featured_artists: Vec<String>,
    queries: Vec<String>,
    details: Option<TrackDetails>,
    #[serde(skip_serializing)]
    raw: serde_json::Value,
}

impl Track {
    /// Normalize raw metadata into a track.
    pub fn from_raw(
        service_name: &str,
        collection_name: &str,
        track_number: u32,
        track_id: &str,
        input: &RawTrackInput,
        raw: serde_json::Value,
    ) -> Result<Self> {
        let normalized = normalize_track(
            &input.title,
            input.primary_artists.clone(),
            input.featured_artists.clone(),
        )?;
        Ok(Self::from_normalized(
            service_name,
            collection_name,
            track_number,
            track_id,
            normalized,
            raw,
        ))
    }

    /// Build a track from already-normalized parts.
    /// Artist lists keep their first-seen order with duplicates dropped.
    pub fn from_normalized(
        service_name: &str,
        collection_name: &str,
        track_number: u32,
        track_id: &str,
        normalized: NormalizedTrack,
        raw: serde_json::Value,
    ) -> Self {
        Self {
            service_name: service_name.to_string(),
            collection_name: collection_name.to_string(),
            track_number,
            track_id: track_id.to_string(),
            title: normalized.title,
            primary_artists: ordered_set(normalized.primary_artists),
            featured_artists: ordered_set(normalized.featured_artists),
            queries: normalized.queries,
            details: None,
            raw,
        }
    }

    pub fn with_details(mut self, details: TrackDetails) -> Self {
        self.details = Some(details);
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// 1-based rank within the fetched collection.
    pub fn track_number(&self) -> u32 {
        self.track_number
    }

    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn primary_artists(&self) -> &[String] {
        &self.primary_artists
    }

    pub fn featured_artists(&self) -> &[String] {
        &self.featured_artists
    }

    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    pub fn details(&self) -> Option<&TrackDetails> {
        self.details.as_ref()
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.raw
    }

    /// Storage key for records of this track's service and collection.
    pub fn source_name(&self) -> String {
        format!("{}_{}", self.service_name, self.collection_name)
    }

    /// Primary artists followed by featured artists, in stored order.
    pub fn artist_credits(&self) -> Vec<&str> {
        self.primary_artists
            .iter()
            .chain(self.featured_artists.iter())
            .map(String::as_str)
            .collect()
    }

    /// Storage-identity match against a persisted record.
    pub fn matches_record(&self, record: &StoredTrackRecord) -> bool {
        matching::matches_storage(self, record)
    }

    /// Title/artist-identity match against another track.
    pub fn matches_identity(&self, other: &Track) -> bool {
        matching::matches_identity(self, other)
    }

    /// Service-identity match: same service, collection and service-assigned id.
    pub fn matches_service(&self, other: &Track) -> bool {
        matching::matches_service(self, other)
    }

    /// Progressively shorter artist credit slices for search retries.
    pub fn artist_fallback(&self) -> ArtistFallback<'_> {
        ArtistFallback::new(self.artist_credits())
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.service_name,
            self.collection_name,
            self.track_number,
            self.primary_artists.join(", "),
            self.title
        )
    }
}

fn ordered_set(values: Vec<String>) -> Vec<String> {
    let mut result: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        if !result.contains(&value) {
            result.push(value);
        }
    }
    result
}

// ============================================================================
// Storage Models
// ============================================================================

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(TrackRecordId);
id_type!(PlaylistId);
id_type!(EntryId);

/// Persisted canonical identity for a track from one service, keyed by (source_name, code).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTrackRecord {
    pub id: TrackRecordId,
    pub source_name: String,
    pub code: String,
    pub title: String,
    pub artist_credit_string: String,
    pub info_url: String,
    pub image_url: String,
    pub external_code: Option<String>,
}

impl fmt::Display for StoredTrackRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.source_name, self.code, self.artist_credit_string, self.title
        )
    }
}

/// Upsert payload for a stored track record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTrackFields {
    pub title: String,
    pub artist_credit_string: String,
    pub info_url: String,
    pub image_url: String,
    pub external_code: Option<String>,
}

impl StoredTrackFields {
    /// Fields from the track's decoded details, or its canonical title and credits.
    pub fn from_track(track: &Track) -> Self {
        match track.details() {
            Some(details) => Self {
                title: details.title.clone(),
                artist_credit_string: details.artists.clone(),
                info_url: details.info_url.clone(),
                image_url: details.image_url.clone(),
                external_code: details.external_code.clone(),
            },
            None => Self {
                title: track.title().to_string(),
                artist_credit_string: track.artist_credits().join(", "),
                ..Default::default()
            },
        }
    }
}

/// A playlist entry and the stored tracks linked to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub id: EntryId,
    pub playlist_id: PlaylistId,
    /// Unique within a playlist; None once the entry drops out of the chart.
    pub position: Option<u32>,
    /// Previous position minus current position; None without a previous position.
    pub position_change: Option<i64>,
    /// Last position the entry held. Kept when the position is cleared.
    pub last_position: Option<u32>,
    pub track_ids: Vec<TrackRecordId>,
}

/// Result of `get_or_create_entry`: the entry id and the last position it held.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryRef {
    pub id: EntryId,
    pub position: Option<u32>,
    pub created: bool,
}

// ============================================================================
// Reconciliation Output
// ============================================================================

/// Position written for one chart track.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PositionAssignment {
    pub entry_id: EntryId,
    pub track_id: String,
    pub service_track_id: String,
    pub position: u32,
    pub position_change: Option<i64>,
}

/// Outcome of one playlist reconciliation.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub source_name: String,
    pub created: usize,
    pub updated: usize,
    /// Chart tracks with no match in the service playlist or search.
    pub unresolved_source: Vec<Track>,
    /// Service playlist tracks that are not in the chart. Reported only, never removed.
    pub unmatched_service: Vec<Track>,
    /// Chart tracks repeating an earlier chart track in the same run.
    pub skipped_duplicates: Vec<Track>,
    pub positions: Vec<PositionAssignment>,
}

// ============================================================================
// TESTS
// ============================================================================
