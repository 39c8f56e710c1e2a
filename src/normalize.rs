//! Canonical forms for chart and streaming service track metadata.
//! Every service adapter and the matcher go through these functions, so two
//! services describing the same song end up with the same title and credits.
//!
//! CRITICAL: Changing a delimiter or the cleanup rules changes which stored
//! tracks match on the next run. Run tests after changes.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use unicode_normalization::UnicodeNormalization;

use crate::error::{Result, SyncError};
use crate::models::ArtistInput;

// ============================================================================
// SEPARATORS
// ============================================================================

/// Canonical separator token. Every delimiter variant is rewritten to this.
pub const SEP: &str = "|";

/// Canonical separator with surrounding spaces, so later patterns still see word boundaries.
pub const SEP_SPACED: &str = " | ";

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Delimiter patterns (applied in order, on case-folded text).
pub static DELIMITER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // Bracket pairs: "(feat. Robyn)", "[Live]", "{Remix}"
        Regex::new(r"[()\[\]{}]").unwrap(),
        // Credit lists: "Artist1, Artist2"
        Regex::new(r",").unwrap(),
        // Featured credits: "ft", "ft.", "feat", "feat.", "featuring"
        Regex::new(r"\s+(?:ft|feat|featuring)\.?\s+").unwrap(),
        Regex::new(r"\s+w/\s+").unwrap(),
        // Collaborations: "Dom Dolla x Daya", "Kylie Minogue & Jessie Ware"
        Regex::new(r"\s+x\s+").unwrap(),
        Regex::new(r"\s+&\s+").unwrap(),
        // Dash suffixes: "Song - Radio Edit"
        Regex::new(r"\s+-\s+").unwrap(),
        // Recording context: "Song (Live at The Forum)", "Theme from the Movie"
        Regex::new(r"\s+live\s+at\s+").unwrap(),
        Regex::new(r"\s+from\s+the\s+").unwrap(),
    ]
});

/// Anything other than word characters, whitespace, hyphens, apostrophes and periods.
pub static DISALLOWED_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s\-'.]").unwrap());

/// Characters dropped from slugs (slugs also lose periods and apostrophes).
pub static SLUG_DISALLOWED_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s\-]").unwrap());

/// Runs of whitespace, collapsed to a single space.
pub static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Compose Unicode (NFC) and case-fold.
/// e.g., "Beyonce\u{301}" → "beyoncé"
pub fn fold_text(value: &str) -> String {
    value.nfc().collect::<String>().to_lowercase()
}

/// Rewrite every delimiter variant to the canonical separator.
pub fn replace_delimiters(value: &str) -> String {
    let mut result = value.to_string();
    for pattern in DELIMITER_PATTERNS.iter() {
        // Adjacent delimiters share whitespace, so one pass can leave a second match behind.
        while pattern.is_match(&result) {
            result = pattern.replace_all(&result, SEP_SPACED).into_owned();
        }
    }
    result
}

fn has_delimiter(value: &str) -> bool {
    value.contains(SEP) || DELIMITER_PATTERNS.iter().any(|p| p.is_match(value))
}

/// Strip disallowed characters, collapse whitespace, trim.
pub fn clean_part(part: &str) -> String {
    let stripped = DISALLOWED_CHARS.replace_all(part, "");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// Split text into its canonical, non-empty parts.
/// e.g., "Intimidated (feat. H.E.R.)" → ["intimidated", "h.e.r."]
pub fn canonical_parts(value: &str) -> Vec<String> {
    replace_delimiters(&fold_text(value))
        .split(SEP)
        .map(clean_part)
        .filter(|part| !part.is_empty())
        .flat_map(|part| {
            // Stripping characters can bring a delimiter together ("a !x b" → "a x b").
            if has_delimiter(&part) {
                canonical_parts(&part)
            } else {
                vec![part]
            }
        })
        .collect()
}

/// Title slug used for exact title comparison.
/// e.g., "Don't Stop - Me Now" → "dont-stop-me-now"
pub fn slugify(value: &str) -> String {
    let folded = fold_text(value);
    SLUG_DISALLOWED_CHARS
        .replace_all(&folded, "")
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Canonical title, credits and ranked search queries for one track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedTrack {
    pub title: String,
    /// Always exactly one entry: the lead artist.
    pub primary_artists: Vec<String>,
    /// Remaining credits plus extra title parts, deduplicated and sorted.
    pub featured_artists: Vec<String>,
    /// Most specific first, "{title} - {primary}" last.
    pub queries: Vec<String>,
}

/// Normalize a raw title and artist credits.
///
/// Extra title parts ("feat. X", "Live at Y") are folded into the featured
/// artists, because services disagree on where such credits live.
/// Fails with `SyncError::Validation` when the title or lead artist ends up empty.
pub fn normalize_track(
    title: &str,
    primary_artists: impl Into<ArtistInput>,
    featured_artists: impl Into<ArtistInput>,
) -> Result<NormalizedTrack> {
    let primary_artists = primary_artists.into();
    let featured_artists = featured_artists.into();

    let mut artist = primary_artists.joined();
    let featured = featured_artists.joined();
    if !featured.is_empty() {
        artist.push_str(SEP_SPACED);
        artist.push_str(&featured);
    }

    let titles = canonical_parts(title);
    let artists = canonical_parts(&artist);

    let (Some(title_norm), Some(primary)) = (titles.first(), artists.first()) else {
        return Err(SyncError::Validation {
            title: title.to_string(),
            artists: artist,
        });
    };

    let featured_norm: Vec<String> = artists[1..]
        .iter()
        .chain(titles[1..].iter())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let queries = build_queries(title_norm, primary, &featured_norm);

    Ok(NormalizedTrack {
        title: title_norm.clone(),
        primary_artists: vec![primary.clone()],
        featured_artists: featured_norm,
        queries,
    })
}

/// Build ranked search queries, from every featured artist down to none.
/// Sorted by length descending, ties broken lexicographically.
pub fn build_queries(title: &str, primary: &str, featured: &[String]) -> Vec<String> {
    let base = format!("{} - {}", title, primary);

    let mut queries = BTreeSet::new();
    for count in (1..=featured.len()).rev() {
        queries.insert(format!("{}, {}", base, featured[..count].join(", ")));
    }
    queries.insert(base);

    let mut queries: Vec<String> = queries.into_iter().collect();
    queries.sort_by(|a, b| {
        b.chars()
            .count()
            .cmp(&a.chars().count())
            .then_with(|| a.cmp(b))
    });
    queries
}

// ============================================================================
// TESTS
// ============================================================================
