//! Error types shared by the normalizer, matcher and reconciler.

use thiserror::Error;

/// The candidate set in which more than one track matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    /// Previously stored tracks, compared by storage identity.
    Storage,
    /// Tracks currently in the target service playlist, compared by title/artist identity.
    ServicePlaylist,
}

impl std::fmt::Display for MatchTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchTier::Storage => write!(f, "stored tracks"),
            MatchTier::ServicePlaylist => write!(f, "service playlist tracks"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    /// Normalization left the title or lead artist empty.
    #[error("Invalid title '{title}' or artist '{artists}'")]
    Validation { title: String, artists: String },

    /// More than one candidate matched a track within one tier.
    #[error("Track '{track}' matched {} {tier}: {}", candidates.len(), candidates.join("; "))]
    Integrity {
        tier: MatchTier,
        track: String,
        candidates: Vec<String>,
    },

    /// A search collaborator call failed.
    #[error("Search error from '{service}': {message}")]
    Search { service: String, message: String },

    /// A raw service payload could not be turned into a track.
    #[error("Cannot decode '{service}' track: {message}")]
    Decode { service: String, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Errors that stop a whole batch. Anything else only fails the affected playlist.
    pub fn aborts_batch(&self) -> bool {
        matches!(
            self,
            SyncError::Storage(_) | SyncError::Database(_) | SyncError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
