//! Playlist reconciliation.
//!
//! One run takes the current chart for a collection, the tracks stored for it
//! on earlier runs, and the tracks currently in the target service playlist.
//! Each chart track is resolved to a service track (playlist first, then
//! search), and the playlist entries are positioned in chart-rank order.
//!
//! All writes for a playlist happen inside one storage transaction. Ambiguous
//! matches abort the run before anything is committed. Tracks that cannot be
//! resolved are reported and skipped.

use tracing::{debug, error, info, warn};

use crate::config::{CollectionConfig, SyncConfig};
use crate::error::{MatchTier, Result, SyncError};
use crate::matching::{identity_rule, select_unique};
use crate::models::{
    PlaylistId, PositionAssignment, ReconciliationReport, StoredTrackFields, StoredTrackRecord,
    Track,
};
use crate::services::Search;
use crate::storage::Storage;

/// A chart track and the service track it resolved to.
struct Resolved<'t> {
    source: &'t Track,
    service: Track,
}

pub struct PlaylistReconciler<'a, S, Q: ?Sized> {
    storage: &'a mut S,
    search: &'a Q,
    search_limit: usize,
}

impl<'a, S, Q> PlaylistReconciler<'a, S, Q>
where
    S: Storage,
    Q: Search + ?Sized,
{
    pub fn new(storage: &'a mut S, search: &'a Q, search_limit: usize) -> Self {
        Self {
            storage,
            search,
            search_limit,
        }
    }

    /// Reconcile one collection's playlist with the first `limit` chart tracks.
    ///
    /// `new_source_tracks` must be in chart-rank order.
    pub fn run_reconcile(
        &mut self,
        config: &CollectionConfig,
        new_source_tracks: &[Track],
        limit: usize,
    ) -> Result<ReconciliationReport> {
        let source_name = config.source_name();
        info!(
            playlist = %source_name,
            target = %config.target_code,
            target_playlist = %config.target_playlist_id,
            tracks = new_source_tracks.len().min(limit),
            "Reconciling playlist"
        );

        let old_service_tracks = self
            .search
            .get_playlist_tracks(&config.target_playlist_id)
            .map_err(|e| {
                error!(playlist = %source_name, error = %e, "Cannot fetch target playlist");
                e
            })?;

        let search = self.search;
        let search_limit = self.search_limit;

        self.storage.transaction(|storage| {
            let playlist_id = storage.get_or_create_playlist(&source_name)?;
            let old_stored_tracks = storage.get_stored_tracks(&source_name, playlist_id)?;

            let mut report = ReconciliationReport {
                source_name: source_name.clone(),
                ..Default::default()
            };

            let resolved = plan(
                search,
                search_limit,
                &old_stored_tracks,
                &old_service_tracks,
                new_source_tracks,
                limit,
                &mut report,
            )?;
            apply(storage, playlist_id, &resolved, &mut report)?;

            report.unmatched_service = old_service_tracks
                .iter()
                .filter(|t| !resolved.iter().any(|r| r.service.matches_service(t)))
                .cloned()
                .collect();
            for track in &report.unmatched_service {
                info!(playlist = %source_name, track = %track, "Service playlist track not in chart");
            }

            info!(
                playlist = %source_name,
                created = report.created,
                updated = report.updated,
                unresolved = report.unresolved_source.len(),
                unmatched_service = report.unmatched_service.len(),
                skipped_duplicates = report.skipped_duplicates.len(),
                "Reconciled playlist"
            );
            Ok(report)
        })
    }
}

fn log_integrity(e: SyncError) -> SyncError {
    error!(error = %e, "Ambiguous track match, aborting playlist");
    e
}

/// Resolve chart tracks to service tracks without writing anything.
fn plan<'t, Q: Search + ?Sized>(
    search: &Q,
    search_limit: usize,
    old_stored_tracks: &[StoredTrackRecord],
    old_service_tracks: &[Track],
    new_source_tracks: &'t [Track],
    limit: usize,
    report: &mut ReconciliationReport,
) -> Result<Vec<Resolved<'t>>> {
    let mut resolved: Vec<Resolved<'t>> = Vec::new();
    let mut handled: Vec<&Track> = Vec::new();

    for source in new_source_tracks.iter().take(limit) {
        if handled.iter().any(|h| h.matches_service(source)) {
            warn!(track = %source, "Track already handled in this run, skipping");
            report.skipped_duplicates.push(source.clone());
            continue;
        }
        handled.push(source);

        let stored = select_unique(MatchTier::Storage, source, old_stored_tracks, |r| {
            source.matches_record(r)
        })
        .map_err(log_integrity)?;

        let in_playlist = select_unique(MatchTier::ServicePlaylist, source, old_service_tracks, |t| {
            source.matches_identity(t)
        })
        .map_err(log_integrity)?;

        let service = match in_playlist {
            Some(found) => {
                debug!(
                    track = %source,
                    service_track = %found,
                    stored = stored.is_some(),
                    rule = ?identity_rule(source, found),
                    "Matched service playlist track"
                );
                found.clone()
            }
            None => match search_service_track(search, search_limit, source) {
                Some(hit) => hit,
                None => {
                    warn!(track = %source, "Unresolved track, no match in service playlist or search");
                    report.unresolved_source.push(source.clone());
                    continue;
                }
            },
        };

        resolved.push(Resolved { source, service });
    }

    Ok(resolved)
}

/// Search the target service with each query and artist slice in turn.
///
/// Failed calls count as zero hits. Returns the first hit matching the track's
/// title/artist identity.
fn search_service_track<Q: Search + ?Sized>(
    search: &Q,
    search_limit: usize,
    source: &Track,
) -> Option<Track> {
    let mut seen: Vec<Track> = Vec::new();

    for query in source.queries() {
        for artists in source.artist_fallback() {
            let hits = match search.search_tracks(query, &artists, search_limit) {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(service = search.service_name(), query = %query, error = %e, "Search failed");
                    continue;
                }
            };
            if hits.is_empty() {
                debug!(query = %query, artists = ?artists, "No search hits");
                continue;
            }

            for hit in hits {
                if seen.iter().any(|s| s.matches_service(&hit)) {
                    continue;
                }
                if source.matches_identity(&hit) {
                    debug!(
                        track = %source,
                        service_track = %hit,
                        query = %query,
                        rule = ?identity_rule(source, &hit),
                        "Matched search hit"
                    );
                    return Some(hit);
                }
                seen.push(hit);
            }
        }
    }

    None
}

/// Persist resolved tracks and position their entries by chart rank.
fn apply<S: Storage>(
    storage: &mut S,
    playlist_id: PlaylistId,
    resolved: &[Resolved<'_>],
    report: &mut ReconciliationReport,
) -> Result<()> {
    let mut staged = Vec::with_capacity(resolved.len());
    for item in resolved {
        let source_record = storage.upsert_stored_track(
            &item.source.source_name(),
            item.source.track_id(),
            &StoredTrackFields::from_track(item.source),
        )?;
        let service_record = storage.upsert_stored_track(
            &item.service.source_name(),
            item.service.track_id(),
            &StoredTrackFields::from_track(&item.service),
        )?;
        // Last held position, read before positions are cleared
        let entry = storage.get_or_create_entry(playlist_id, source_record.id)?;
        staged.push((item, entry, [source_record.id, service_record.id]));
    }

    storage.clear_entry_positions(playlist_id)?;

    for (item, entry, record_ids) in staged {
        let position = item.source.track_number();
        let position_change = entry
            .position
            .map(|old| i64::from(old) - i64::from(position));

        storage.set_entry_position(entry.id, position, position_change)?;
        storage.link_entry_tracks(entry.id, &record_ids)?;

        if entry.created {
            report.created += 1;
        } else {
            report.updated += 1;
        }
        debug!(
            track = %item.source,
            position,
            position_change = ?position_change,
            created = entry.created,
            "Positioned playlist entry"
        );
        report.positions.push(PositionAssignment {
            entry_id: entry.id,
            track_id: item.source.track_id().to_string(),
            service_track_id: item.service.track_id().to_string(),
            position,
            position_change,
        });
    }

    Ok(())
}

// ============================================================================
// Batch
// ============================================================================

/// Chart tracks and target service for one configured collection.
pub struct CollectionInput {
    pub source_tracks: Vec<Track>,
    pub search: Box<dyn Search>,
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub source_name: String,
    pub target_code: String,
    pub result: Result<ReconciliationReport>,
}

/// Reconcile every configured collection in order.
///
/// A collection that fails to load or reconcile is recorded and the batch
/// moves on. Errors that [`SyncError::aborts_batch`] stop the batch.
pub fn reconcile_all<S, F>(
    storage: &mut S,
    config: &SyncConfig,
    mut load: F,
) -> Result<Vec<BatchOutcome>>
where
    S: Storage,
    F: FnMut(&CollectionConfig) -> Result<CollectionInput>,
{
    let mut outcomes = Vec::with_capacity(config.collections.len());

    for collection in &config.collections {
        let result = match load(collection) {
            Ok(input) => PlaylistReconciler::new(&mut *storage, input.search.as_ref(), config.search_limit)
                .run_reconcile(collection, &input.source_tracks, config.chart_limit),
            Err(e) => Err(e),
        };

        let result = match result {
            Err(e) if e.aborts_batch() => {
                error!(playlist = %collection.source_name(), error = %e, "Stopping batch");
                return Err(e);
            }
            other => other,
        };
        if let Err(e) = &result {
            error!(playlist = %collection.source_name(), error = %e, "Playlist failed, continuing");
        }

        outcomes.push(BatchOutcome {
            source_name: collection.source_name(),
            target_code: collection.target_code.clone(),
            result,
        });
    }

    Ok(outcomes)
}

// ============================================================================
// TESTS
// ============================================================================
