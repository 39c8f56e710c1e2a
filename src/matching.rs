//! Track matching for playlist reconciliation.
//!
//! Matching is exact: titles must slug-equal, and only the way credits are
//! split between primary and featured artists is tolerated. There is no
//! scoring. When more than one candidate in a tier matches, the caller gets
//! an integrity error instead of a pick.

use rustc_hash::FxHashSet;
use std::fmt;

use crate::error::{MatchTier, Result, SyncError};
use crate::models::{StoredTrackRecord, Track};
use crate::normalize::slugify;

// ============================================================================
// Identity Rules
// ============================================================================

/// Which artist rule accepted a title/artist-identity match.
/// The rules are an unordered disjunction; the reported one is the first checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityRule {
    /// Primary sets equal and featured sets equal.
    SameCredits,
    /// Primary ∪ featured equal on both sides.
    SameUnion,
    /// This track's credits are contained in the other's.
    SubsetOfOther,
    /// The other track's credits are contained in this one's.
    SupersetOfOther,
}

impl fmt::Display for IdentityRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdentityRule::SameCredits => "same_credits",
            IdentityRule::SameUnion => "same_union",
            IdentityRule::SubsetOfOther => "subset",
            IdentityRule::SupersetOfOther => "superset",
        };
        write!(f, "{}", name)
    }
}

fn artist_set(artists: &[String]) -> FxHashSet<&str> {
    artists.iter().map(String::as_str).collect()
}

fn artist_union(track: &Track) -> FxHashSet<&str> {
    track
        .primary_artists()
        .iter()
        .chain(track.featured_artists().iter())
        .map(String::as_str)
        .collect()
}

/// First artist rule satisfied by two tracks whose title slugs are equal.
pub fn identity_rule(a: &Track, b: &Track) -> Option<IdentityRule> {
    if slugify(a.title()) != slugify(b.title()) {
        return None;
    }

    if artist_set(a.primary_artists()) == artist_set(b.primary_artists())
        && artist_set(a.featured_artists()) == artist_set(b.featured_artists())
    {
        return Some(IdentityRule::SameCredits);
    }

    let union_a = artist_union(a);
    let union_b = artist_union(b);
    if union_a == union_b {
        Some(IdentityRule::SameUnion)
    } else if union_a.is_subset(&union_b) {
        Some(IdentityRule::SubsetOfOther)
    } else if union_b.is_subset(&union_a) {
        Some(IdentityRule::SupersetOfOther)
    } else {
        None
    }
}

// ============================================================================
// Predicates
// ============================================================================

/// Storage identity: record belongs to the track's source and carries its id.
pub fn matches_storage(track: &Track, record: &StoredTrackRecord) -> bool {
    record.source_name == track.source_name() && record.code == track.track_id()
}

/// Title/artist identity. Symmetric.
pub fn matches_identity(a: &Track, b: &Track) -> bool {
    identity_rule(a, b).is_some()
}

/// Service identity: the same search hit seen twice.
pub fn matches_service(a: &Track, b: &Track) -> bool {
    a.service_name() == b.service_name()
        && a.collection_name() == b.collection_name()
        && a.track_id() == b.track_id()
}

// ============================================================================
// Tier Selection
// ============================================================================

/// Pick the single candidate satisfying `pred`.
///
/// Zero matches is `Ok(None)`. More than one is `SyncError::Integrity` listing
/// every matching candidate.
pub fn select_unique<'a, T, F>(
    tier: MatchTier,
    track: &Track,
    candidates: &'a [T],
    mut pred: F,
) -> Result<Option<&'a T>>
where
    T: fmt::Display,
    F: FnMut(&T) -> bool,
{
    let found: Vec<&T> = candidates.iter().filter(|c| pred(*c)).collect();
    match found.as_slice() {
        [] => Ok(None),
        [single] => Ok(Some(*single)),
        many => Err(SyncError::Integrity {
            tier,
            track: track.to_string(),
            candidates: many.iter().map(|c| c.to_string()).collect(),
        }),
    }
}

// ============================================================================
// Artist Fallback
// ============================================================================

/// Prefixes of a credit list, from the full list down to the lead artist.
///
/// Lazy and finite. Clone it to restart from the full list.
#[derive(Debug, Clone)]
pub struct ArtistFallback<'a> {
    credits: Vec<&'a str>,
    next_len: usize,
}

impl<'a> ArtistFallback<'a> {
    pub fn new(credits: Vec<&'a str>) -> Self {
        let next_len = credits.len();
        Self { credits, next_len }
    }
}

impl<'a> Iterator for ArtistFallback<'a> {
    type Item = Vec<&'a str>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_len == 0 {
            return None;
        }
        let slice = self.credits[..self.next_len].to_vec();
        self.next_len -= 1;
        Some(slice)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.next_len, Some(self.next_len))
    }
}

impl ExactSizeIterator for ArtistFallback<'_> {}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrackRecordId;
    use crate::normalize::NormalizedTrack;
    use serde_json::json;

    fn track(service: &str, id: &str, title: &str, primary: &[&str], featured: &[&str]) -> Track {
        let normalized = NormalizedTrack {
            title: title.to_string(),
            primary_artists: primary.iter().map(|s| s.to_string()).collect(),
            featured_artists: featured.iter().map(|s| s.to_string()).collect(),
            queries: vec![format!("{} - {}", title, primary[0])],
        };
        Track::from_normalized(service, "top", 1, id, normalized, json!({}))
    }

    #[test]
    fn test_subset_rule_matches_split_credits() {
        let a = track("abcradio", "1", "call my name", &["smile"], &["robyn"]);
        let b = track("spotify", "2", "call my name", &["smile", "robyn"], &[]);
        assert!(a.matches_identity(&b));
        assert!(b.matches_identity(&a));
        assert_eq!(identity_rule(&a, &b), Some(IdentityRule::SameUnion));
    }

    #[test]
    fn test_subset_and_superset() {
        let a = track("abcradio", "1", "song", &["a"], &[]);
        let b = track("spotify", "2", "song", &["a"], &["b"]);
        assert_eq!(identity_rule(&a, &b), Some(IdentityRule::SubsetOfOther));
        assert_eq!(identity_rule(&b, &a), Some(IdentityRule::SupersetOfOther));
    }

    #[test]
    fn test_same_credits() {
        let a = track("abcradio", "1", "song", &["a"], &["b", "c"]);
        let b = track("spotify", "2", "song", &["a"], &["c", "b"]);
        assert_eq!(identity_rule(&a, &b), Some(IdentityRule::SameCredits));
    }

    #[test]
    fn test_title_must_match_exactly() {
        let a = track("abcradio", "1", "song", &["a"], &[]);
        let b = track("spotify", "2", "song two", &["a"], &[]);
        assert!(!a.matches_identity(&b));

        // Slug comparison ignores apostrophes and hyphen spacing
        let c = track("abcradio", "1", "don't stop", &["a"], &[]);
        let d = track("spotify", "2", "dont stop", &["a"], &[]);
        assert!(c.matches_identity(&d));
    }

    #[test]
    fn test_disjoint_artists_do_not_match() {
        let a = track("abcradio", "1", "song", &["a"], &["b"]);
        let b = track("spotify", "2", "song", &["a"], &["c"]);
        assert!(!a.matches_identity(&b));
        assert!(!b.matches_identity(&a));
    }

    #[test]
    fn test_service_identity() {
        let a = track("spotify", "x1", "song", &["a"], &[]);
        let b = track("spotify", "x1", "other", &["z"], &[]);
        let c = track("spotify", "x2", "song", &["a"], &[]);
        assert!(a.matches_service(&b));
        assert!(!a.matches_service(&c));
    }

    #[test]
    fn test_storage_identity() {
        let t = track("abcradio", "arid-1", "song", &["a"], &[]);
        let mut record = StoredTrackRecord {
            id: TrackRecordId(1),
            source_name: "abcradio_top".to_string(),
            code: "arid-1".to_string(),
            title: "Song".to_string(),
            artist_credit_string: "A".to_string(),
            info_url: String::new(),
            image_url: String::new(),
            external_code: None,
        };
        assert!(t.matches_record(&record));
        record.code = "arid-2".to_string();
        assert!(!t.matches_record(&record));
    }

    #[test]
    fn test_select_unique() {
        let source = track("abcradio", "1", "song", &["a"], &[]);
        let candidates = vec![
            track("spotify", "s1", "song", &["a"], &[]),
            track("spotify", "s2", "other", &["a"], &[]),
        ];
        let found = select_unique(MatchTier::ServicePlaylist, &source, &candidates, |c| {
            source.matches_identity(c)
        })
        .unwrap();
        assert_eq!(found.map(|t| t.track_id()), Some("s1"));

        let none = select_unique(MatchTier::ServicePlaylist, &source, &candidates, |_| false);
        assert!(none.unwrap().is_none());
    }

    #[test]
    fn test_select_unique_rejects_ambiguity() {
        let source = track("abcradio", "1", "song", &["a"], &[]);
        let candidates = vec![
            track("spotify", "s1", "song", &["a"], &[]),
            track("spotify", "s2", "song", &["a"], &["b"]),
        ];
        let err = select_unique(MatchTier::ServicePlaylist, &source, &candidates, |c| {
            source.matches_identity(c)
        })
        .unwrap_err();
        match err {
            SyncError::Integrity { tier, candidates, .. } => {
                assert_eq!(tier, MatchTier::ServicePlaylist);
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_artist_fallback_shrinks_from_tail() {
        let t = track("abcradio", "1", "song", &["a"], &["b", "c"]);
        let slices: Vec<Vec<&str>> = t.artist_fallback().collect();
        assert_eq!(slices, vec![vec!["a", "b", "c"], vec!["a", "b"], vec!["a"]]);
    }

    #[test]
    fn test_artist_fallback_restartable() {
        let t = track("abcradio", "1", "song", &["a"], &["b"]);
        let mut fallback = t.artist_fallback();
        assert_eq!(fallback.len(), 2);
        let restart = fallback.clone();
        assert_eq!(fallback.next(), Some(vec!["a", "b"]));
        assert_eq!(fallback.len(), 1);
        assert_eq!(restart.count(), 2);
    }
}
