//! Collection configuration loaded from TOML.
//!
//! ```toml
//! search_limit = 5
//! chart_limit = 100
//!
//! [[collections]]
//! source_code = "abcradio"
//! source_collection = "triplej_most_played"
//! target_code = "spotify"
//! target_playlist_id = "37i9dQZF1DX0XUsuxWHRQd"
//! target_title = "Triple J Most Played"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SyncError};
use crate::services::{Capability, ServiceKind};

pub const DEFAULT_SEARCH_LIMIT: usize = 5;
pub const DEFAULT_CHART_LIMIT: usize = 100;

/// One chart collection kept in sync with one target playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub source_code: String,
    pub source_collection: String,
    pub target_code: String,
    pub target_playlist_id: String,
    #[serde(default)]
    pub target_title: String,
}

impl CollectionConfig {
    /// Storage key of the chart collection.
    pub fn source_name(&self) -> String {
        format!("{}_{}", self.source_code, self.source_collection)
    }

    pub fn source_kind(&self) -> Result<ServiceKind> {
        self.source_code.parse()
    }

    pub fn target_kind(&self) -> Result<ServiceKind> {
        self.target_code.parse()
    }

    fn validate(&self) -> Result<()> {
        let source = self.source_kind()?;
        if !source.has(Capability::Source) {
            return Err(SyncError::Config(format!(
                "Service '{}' cannot be a playlist source",
                source
            )));
        }
        let collections = source.collections();
        if !collections.is_empty() && !collections.contains(&self.source_collection.as_str()) {
            return Err(SyncError::Config(format!(
                "Unrecognised collection '{}' for service '{}'",
                self.source_collection, source
            )));
        }

        let target = self.target_kind()?;
        if !target.has(Capability::Target) {
            return Err(SyncError::Config(format!(
                "Service '{}' cannot be a playlist target",
                target
            )));
        }
        if self.target_playlist_id.trim().is_empty() {
            return Err(SyncError::Config(format!(
                "Missing target playlist id for '{}'",
                self.source_name()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Hits requested per search call.
    pub search_limit: usize,
    /// Chart ranks considered per collection.
    pub chart_limit: usize,
    pub collections: Vec<CollectionConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            search_limit: DEFAULT_SEARCH_LIMIT,
            chart_limit: DEFAULT_CHART_LIMIT,
            collections: Vec::new(),
        }
    }
}

impl SyncConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SyncConfig =
            toml::from_str(content).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.search_limit == 0 || self.chart_limit == 0 {
            return Err(SyncError::Config(
                "search_limit and chart_limit must be at least 1".to_string(),
            ));
        }

        let mut seen: Vec<String> = Vec::new();
        for collection in &self.collections {
            collection.validate()?;
            let name = collection.source_name();
            if seen.contains(&name) {
                return Err(SyncError::Config(format!(
                    "Collection '{}' is configured more than once",
                    name
                )));
            }
            seen.push(name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        [[collections]]
        source_code = "abcradio"
        source_collection = "triplej_most_played"
        target_code = "spotify"
        target_playlist_id = "p1"
        target_title = "Triple J Most Played"

        [[collections]]
        source_code = "lastfm"
        source_collection = "most_popular"
        target_code = "ytmusic"
        target_playlist_id = "PL2"
    "#;

    #[test]
    fn test_defaults_and_source_name() {
        let config = SyncConfig::from_toml_str(CONFIG).unwrap();
        assert_eq!(config.search_limit, DEFAULT_SEARCH_LIMIT);
        assert_eq!(config.chart_limit, DEFAULT_CHART_LIMIT);
        assert_eq!(config.collections.len(), 2);
        assert_eq!(config.collections[0].source_name(), "abcradio_triplej_most_played");
        assert_eq!(config.collections[1].target_title, "");
        assert_eq!(config.collections[1].target_kind().unwrap(), ServiceKind::YoutubeMusic);
    }

    #[test]
    fn test_rejects_source_only_target() {
        let content = r#"
            [[collections]]
            source_code = "spotify"
            source_collection = "any"
            target_code = "abcradio"
            target_playlist_id = "p1"
        "#;
        let err = SyncConfig::from_toml_str(content).unwrap_err();
        assert!(err.to_string().contains("cannot be a playlist target"));
    }

    #[test]
    fn test_rejects_unknown_collection_and_service() {
        let content = r#"
            [[collections]]
            source_code = "abcradio"
            source_collection = "classic_most_played"
            target_code = "spotify"
            target_playlist_id = "p1"
        "#;
        assert!(SyncConfig::from_toml_str(content).is_err());

        let content = r#"
            [[collections]]
            source_code = "napster"
            source_collection = "x"
            target_code = "spotify"
            target_playlist_id = "p1"
        "#;
        assert!(matches!(
            SyncConfig::from_toml_str(content),
            Err(SyncError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_collection() {
        let content = format!(
            "{}\n{}",
            CONFIG,
            r#"
            [[collections]]
            source_code = "abcradio"
            source_collection = "triplej_most_played"
            target_code = "ytmusic"
            target_playlist_id = "PL9"
            "#
        );
        assert!(SyncConfig::from_toml_str(&content).is_err());
    }

    #[test]
    fn test_zero_limit_rejected() {
        assert!(SyncConfig::from_toml_str("search_limit = 0").is_err());
    }
}
