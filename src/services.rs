//! Music services, the collaborator traits they implement, and decoding of
//! their raw payloads into normalized tracks.
//!
//! Raw payloads stay opaque to the reconciler. Everything service specific
//! (field names, artist roles, artwork rules) is handled here.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SyncError};
use crate::models::{ArtistInput, RawTrackInput, Track, TrackDetails};
use crate::normalize::slugify;

// ============================================================================
// Service Registry
// ============================================================================

/// Maximum width and height (exclusive) of a usable image.
pub const IMAGE_MAX_SIZE: u32 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Provides chart collections.
    Source,
    /// Hosts playlists that are kept in sync.
    Target,
    /// Needs credentials to access.
    AuthRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServiceKind {
    AbcRadio,
    LastFm,
    Radio4zzz,
    Spotify,
    YoutubeMusic,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 5] = [
        ServiceKind::AbcRadio,
        ServiceKind::LastFm,
        ServiceKind::Radio4zzz,
        ServiceKind::Spotify,
        ServiceKind::YoutubeMusic,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            ServiceKind::AbcRadio => "abcradio",
            ServiceKind::LastFm => "lastfm",
            ServiceKind::Radio4zzz => "radio4zzz",
            ServiceKind::Spotify => "spotify",
            ServiceKind::YoutubeMusic => "ytmusic",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ServiceKind::AbcRadio => "ABC Radio",
            ServiceKind::LastFm => "Last.fm",
            ServiceKind::Radio4zzz => "Radio 4zzz",
            ServiceKind::Spotify => "Spotify",
            ServiceKind::YoutubeMusic => "YouTube Music",
        }
    }

    pub fn info_url(&self) -> &'static str {
        match self {
            ServiceKind::AbcRadio => "https://www.abc.net.au/triplej/",
            ServiceKind::LastFm => "https://www.last.fm/",
            ServiceKind::Radio4zzz => "https://4zzz.org.au/",
            ServiceKind::Spotify => "https://open.spotify.com/",
            ServiceKind::YoutubeMusic => "https://music.youtube.com/",
        }
    }

    /// Chart collections the service offers. Empty means any playlist id.
    pub fn collections(&self) -> &'static [&'static str] {
        match self {
            ServiceKind::AbcRadio => &[
                "doublej_most_played",
                "triplej_most_played",
                "unearthed_most_played",
            ],
            ServiceKind::LastFm => &["most_popular"],
            ServiceKind::Radio4zzz => &["most_played"],
            ServiceKind::Spotify | ServiceKind::YoutubeMusic => &[],
        }
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        use Capability::*;
        match self {
            ServiceKind::AbcRadio | ServiceKind::Radio4zzz => &[Source],
            ServiceKind::LastFm => &[Source, AuthRequired],
            ServiceKind::Spotify | ServiceKind::YoutubeMusic => &[Source, Target, AuthRequired],
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for ServiceKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        ServiceKind::ALL
            .iter()
            .copied()
            .find(|k| k.code() == s)
            .ok_or_else(|| SyncError::Config(format!("Unknown service '{}'", s)))
    }
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Catalog search and playlist access on a target streaming service.
/// Timeouts and retries belong to the implementation.
pub trait Search {
    fn service_name(&self) -> &str;

    /// Tracks matching the query text, optionally constrained to the artists.
    fn search_tracks(&self, query: &str, artists: &[&str], limit: usize) -> Result<Vec<Track>>;

    /// Tracks currently in the service playlist.
    fn get_playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>>;
}

/// Chart collections of a source service, in rank order.
pub trait ChartSource {
    fn get_collection_tracks(&self, collection: &str, limit: usize) -> Result<Vec<Track>>;
}

// ============================================================================
// Payload Shapes
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Image {
    url: String,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Named {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AbcLink {
    url: String,
    id_component: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AbcArtist {
    name: String,
    #[serde(rename = "type")]
    role: String,
    #[serde(default)]
    links: Vec<AbcLink>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AbcRelease {
    links: Vec<AbcLink>,
    artwork: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct AbcItem {
    arid: String,
    title: String,
    #[serde(default)]
    artists: Vec<AbcArtist>,
    #[serde(default)]
    links: Vec<AbcLink>,
    #[serde(default)]
    releases: Vec<AbcRelease>,
    #[serde(default)]
    artwork: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct LastFmItem {
    url: String,
    name: String,
    artist: Named,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SpotifyUrls {
    spotify: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SpotifyAlbum {
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct SpotifyItem {
    id: String,
    name: String,
    #[serde(default)]
    artists: Vec<Named>,
    #[serde(default)]
    href: String,
    #[serde(default)]
    external_urls: SpotifyUrls,
    #[serde(default)]
    album: SpotifyAlbum,
}

#[derive(Debug, Deserialize)]
struct YoutubeMusicItem {
    #[serde(rename = "videoId")]
    video_id: String,
    title: String,
    #[serde(default)]
    artists: Vec<Named>,
    #[serde(default)]
    thumbnails: Vec<Image>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Radio4zzzItem {
    key: Option<String>,
    title: Option<String>,
    track: Option<String>,
    artist: String,
    url: Option<String>,
}

// ============================================================================
// Decoding
// ============================================================================

fn parse<T: serde::de::DeserializeOwned>(kind: ServiceKind, raw: &Value) -> Result<T> {
    T::deserialize(raw).map_err(|e| SyncError::Decode {
        service: kind.code().to_string(),
        message: e.to_string(),
    })
}

/// Widest image with both sides under [`IMAGE_MAX_SIZE`]. First one wins a tie.
fn best_image(images: &[Image]) -> String {
    let mut best: Option<&Image> = None;
    for image in images {
        let (Some(width), Some(height)) = (image.width, image.height) else {
            continue;
        };
        if image.url.is_empty() || width >= IMAGE_MAX_SIZE || height >= IMAGE_MAX_SIZE {
            continue;
        }
        if best.map_or(true, |b| b.width.unwrap_or(0) < width) {
            best = Some(image);
        }
    }
    best.map(|i| i.url.clone()).unwrap_or_default()
}

fn join_names(names: &[Named]) -> String {
    names
        .iter()
        .map(|n| n.name.as_str())
        .filter(|n| !n.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

struct Decoded {
    track_id: String,
    input: RawTrackInput,
    details: TrackDetails,
}

fn decode_abc(raw: &Value) -> Result<Decoded> {
    let item: AbcItem = parse(ServiceKind::AbcRadio, raw)?;

    let mut primary = Vec::new();
    let mut featured = Vec::new();
    for artist in &item.artists {
        match artist.role.as_str() {
            "primary" => primary.push(artist.name.clone()),
            "featured" => featured.push(artist.name.clone()),
            other => {
                return Err(SyncError::Decode {
                    service: ServiceKind::AbcRadio.code().to_string(),
                    message: format!("Unrecognised artist '{}' ({})", artist.name, other),
                })
            }
        }
    }

    let release_links = item.releases.iter().flat_map(|r| r.links.iter());
    let artist_links = item.artists.iter().flat_map(|a| a.links.iter());
    let info_url = item
        .links
        .iter()
        .chain(release_links.clone())
        .chain(artist_links)
        .find(|l| !l.url.is_empty() && !l.url.contains("musicbrainz"))
        .map(|l| l.url.clone())
        .unwrap_or_default();
    let external_code = item
        .links
        .iter()
        .chain(release_links)
        .find(|l| l.url.contains("musicbrainz"))
        .and_then(|l| l.id_component.clone());

    let images: Vec<Image> = item
        .releases
        .iter()
        .flat_map(|r| r.artwork.iter().cloned())
        .chain(item.artwork.iter().cloned())
        .collect();

    let artists = item
        .artists
        .iter()
        .map(|a| a.name.as_str())
        .filter(|n| !n.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    Ok(Decoded {
        track_id: item.arid,
        input: RawTrackInput {
            title: item.title.clone(),
            primary_artists: ArtistInput::Many(primary),
            featured_artists: ArtistInput::Many(featured),
        },
        details: TrackDetails {
            title: item.title,
            artists,
            info_url,
            image_url: best_image(&images),
            external_code,
        },
    })
}

fn decode_lastfm(raw: &Value) -> Result<Decoded> {
    let item: LastFmItem = parse(ServiceKind::LastFm, raw)?;
    Ok(Decoded {
        input: RawTrackInput::new(&item.name, item.artist.name.as_str(), ""),
        details: TrackDetails {
            title: item.name,
            artists: item.artist.name,
            info_url: item.url.clone(),
            ..Default::default()
        },
        track_id: item.url,
    })
}

fn decode_spotify(raw: &Value) -> Result<Decoded> {
    // Playlist items wrap the track object
    let raw = match raw.get("track") {
        Some(inner) if inner.is_object() => inner,
        _ => raw,
    };
    let item: SpotifyItem = parse(ServiceKind::Spotify, raw)?;

    let info_url = [item.external_urls.spotify.trim(), item.href.trim()]
        .into_iter()
        .find(|u| !u.is_empty())
        .unwrap_or_default()
        .to_string();
    let names: Vec<String> = item.artists.iter().map(|a| a.name.clone()).collect();

    Ok(Decoded {
        input: RawTrackInput::new(&item.name, names, ArtistInput::default()),
        details: TrackDetails {
            title: item.name,
            artists: join_names(&item.artists),
            info_url,
            image_url: best_image(&item.album.images),
            external_code: None,
        },
        track_id: item.id,
    })
}

fn decode_youtube_music(raw: &Value) -> Result<Decoded> {
    let item: YoutubeMusicItem = parse(ServiceKind::YoutubeMusic, raw)?;
    let names: Vec<String> = item.artists.iter().map(|a| a.name.clone()).collect();

    Ok(Decoded {
        input: RawTrackInput::new(&item.title, names, ArtistInput::default()),
        details: TrackDetails {
            title: item.title,
            artists: join_names(&item.artists),
            info_url: format!("https://music.youtube.com/watch?v={}", item.video_id),
            image_url: best_image(&item.thumbnails),
            external_code: None,
        },
        track_id: item.video_id,
    })
}

/// Key identifying one 4zzz song across plays.
pub fn radio4zzz_key(artist: &str, track: &str) -> String {
    format!("{}-{}", slugify(artist), slugify(track))
}

fn decode_radio4zzz(raw: &Value) -> Result<Decoded> {
    let item: Radio4zzzItem = parse(ServiceKind::Radio4zzz, raw)?;
    let title = item.title.or(item.track).unwrap_or_default();
    let key = item
        .key
        .unwrap_or_else(|| radio4zzz_key(&item.artist, &title));

    Ok(Decoded {
        track_id: key,
        input: RawTrackInput::new(&title, item.artist.as_str(), ""),
        details: TrackDetails {
            title,
            artists: item.artist,
            info_url: item.url.unwrap_or_default(),
            ..Default::default()
        },
    })
}

/// Decode one raw service item into a normalized track with display details.
pub fn decode_track(
    kind: ServiceKind,
    collection: &str,
    track_number: u32,
    raw: &Value,
) -> Result<Track> {
    let decoded = match kind {
        ServiceKind::AbcRadio => decode_abc(raw)?,
        ServiceKind::LastFm => decode_lastfm(raw)?,
        ServiceKind::Radio4zzz => decode_radio4zzz(raw)?,
        ServiceKind::Spotify => decode_spotify(raw)?,
        ServiceKind::YoutubeMusic => decode_youtube_music(raw)?,
    };

    let track = Track::from_raw(
        kind.code(),
        collection,
        track_number,
        &decoded.track_id,
        &decoded.input,
        raw.clone(),
    )?;
    Ok(track.with_details(decoded.details))
}

/// Decode items in rank order, numbering them from 1. Stops at the first bad item.
pub fn decode_collection(
    kind: ServiceKind,
    collection: &str,
    items: &[Value],
    limit: usize,
) -> Result<Vec<Track>> {
    items
        .iter()
        .take(limit)
        .zip(1u32..)
        .map(|(raw, number)| decode_track(kind, collection, number, raw))
        .collect()
}

/// Rank 4zzz plays by play count, most played first, ties by key descending.
/// Each returned item is the first play of the song with a `play_count` added.
pub fn radio4zzz_most_played(plays: &[Value], limit: usize) -> Vec<Value> {
    let mut grouped: BTreeMap<String, Vec<&Value>> = BTreeMap::new();
    for play in plays {
        if play.get("type").and_then(Value::as_str).is_some_and(|t| t != "track") {
            continue;
        }
        let artist = play.get("artist").and_then(Value::as_str).unwrap_or_default();
        let track = play
            .get("track")
            .or_else(|| play.get("title"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let key = play
            .get("key")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| radio4zzz_key(artist, track));
        grouped.entry(key).or_default().push(play);
    }

    let mut ranked: Vec<(usize, String, &Value)> = grouped
        .into_iter()
        .map(|(key, plays)| (plays.len(), key, plays[0]))
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

    ranked
        .into_iter()
        .take(limit)
        .map(|(count, key, first)| {
            let mut item = first.clone();
            if let Value::Object(map) = &mut item {
                map.insert("key".to_string(), Value::String(key));
                map.insert("play_count".to_string(), Value::from(count));
            }
            item
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
