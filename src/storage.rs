//! Storage collaborator used by the reconciler.
//!
//! The reconciler never touches a database directly. Everything it persists
//! goes through [`Storage`], and each playlist run is wrapped in
//! [`Storage::transaction`] so a failed run leaves nothing behind.

use crate::error::{Result, SyncError};
use crate::models::{
    EntryId, EntryRef, PlaylistEntry, PlaylistId, StoredTrackFields, StoredTrackRecord,
    TrackRecordId,
};

pub trait Storage {
    /// Stored records of `source_name` linked to any entry of the playlist.
    fn get_stored_tracks(
        &self,
        source_name: &str,
        playlist_id: PlaylistId,
    ) -> Result<Vec<StoredTrackRecord>>;

    /// Insert or update the record keyed by `(source_name, code)`.
    fn upsert_stored_track(
        &mut self,
        source_name: &str,
        code: &str,
        fields: &StoredTrackFields,
    ) -> Result<StoredTrackRecord>;

    fn get_or_create_playlist(&mut self, source_name: &str) -> Result<PlaylistId>;

    /// The playlist entry linked to the record, created without a position if missing.
    /// The returned position is the last one the entry held, even if cleared since.
    fn get_or_create_entry(
        &mut self,
        playlist_id: PlaylistId,
        track_record_id: TrackRecordId,
    ) -> Result<EntryRef>;

    fn set_entry_position(
        &mut self,
        entry_id: EntryId,
        position: u32,
        position_change: Option<i64>,
    ) -> Result<()>;

    /// Link records to an entry. Already linked records are ignored.
    fn link_entry_tracks(&mut self, entry_id: EntryId, track_record_ids: &[TrackRecordId])
        -> Result<()>;

    /// Drop the position and position change of every entry in the playlist.
    /// The last held position is kept.
    fn clear_entry_positions(&mut self, playlist_id: PlaylistId) -> Result<()>;

    /// Entries of the playlist, ordered by position with unpositioned entries last.
    fn get_playlist_entries(&self, playlist_id: PlaylistId) -> Result<Vec<PlaylistEntry>>;

    /// Run `f` atomically: on error nothing `f` wrote is kept.
    fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<T>;
}

fn sort_entries(entries: &mut [PlaylistEntry]) {
    entries.sort_by_key(|e| (e.position.is_none(), e.position, e.id));
}

// ============================================================================
// In-memory Storage
// ============================================================================

/// Storage held in memory. Transactions snapshot the whole state and restore it on error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStorage {
    playlists: Vec<(PlaylistId, String)>,
    tracks: Vec<StoredTrackRecord>,
    entries: Vec<PlaylistEntry>,
    last_id: i64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracks(&self) -> &[StoredTrackRecord] {
        &self.tracks
    }

    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn entry_mut(&mut self, entry_id: EntryId) -> Result<&mut PlaylistEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or_else(|| SyncError::Storage(format!("No playlist entry with id {}", entry_id)))
    }
}

impl Storage for MemoryStorage {
    fn get_stored_tracks(
        &self,
        source_name: &str,
        playlist_id: PlaylistId,
    ) -> Result<Vec<StoredTrackRecord>> {
        let mut linked: Vec<TrackRecordId> = self
            .entries
            .iter()
            .filter(|e| e.playlist_id == playlist_id)
            .flat_map(|e| e.track_ids.iter().copied())
            .collect();
        linked.sort();
        linked.dedup();

        Ok(self
            .tracks
            .iter()
            .filter(|t| t.source_name == source_name && linked.binary_search(&t.id).is_ok())
            .cloned()
            .collect())
    }

    fn upsert_stored_track(
        &mut self,
        source_name: &str,
        code: &str,
        fields: &StoredTrackFields,
    ) -> Result<StoredTrackRecord> {
        if let Some(existing) = self
            .tracks
            .iter_mut()
            .find(|t| t.source_name == source_name && t.code == code)
        {
            existing.title = fields.title.clone();
            existing.artist_credit_string = fields.artist_credit_string.clone();
            existing.info_url = fields.info_url.clone();
            existing.image_url = fields.image_url.clone();
            existing.external_code = fields.external_code.clone();
            return Ok(existing.clone());
        }

        let record = StoredTrackRecord {
            id: TrackRecordId(self.next_id()),
            source_name: source_name.to_string(),
            code: code.to_string(),
            title: fields.title.clone(),
            artist_credit_string: fields.artist_credit_string.clone(),
            info_url: fields.info_url.clone(),
            image_url: fields.image_url.clone(),
            external_code: fields.external_code.clone(),
        };
        self.tracks.push(record.clone());
        Ok(record)
    }

    fn get_or_create_playlist(&mut self, source_name: &str) -> Result<PlaylistId> {
        if let Some((id, _)) = self.playlists.iter().find(|(_, name)| name == source_name) {
            return Ok(*id);
        }
        let id = PlaylistId(self.next_id());
        self.playlists.push((id, source_name.to_string()));
        Ok(id)
    }

    fn get_or_create_entry(
        &mut self,
        playlist_id: PlaylistId,
        track_record_id: TrackRecordId,
    ) -> Result<EntryRef> {
        if let Some(entry) = self
            .entries
            .iter()
            .find(|e| e.playlist_id == playlist_id && e.track_ids.contains(&track_record_id))
        {
            return Ok(EntryRef {
                id: entry.id,
                position: entry.last_position,
                created: false,
            });
        }

        let id = EntryId(self.next_id());
        self.entries.push(PlaylistEntry {
            id,
            playlist_id,
            position: None,
            position_change: None,
            last_position: None,
            track_ids: vec![track_record_id],
        });
        Ok(EntryRef {
            id,
            position: None,
            created: true,
        })
    }

    fn set_entry_position(
        &mut self,
        entry_id: EntryId,
        position: u32,
        position_change: Option<i64>,
    ) -> Result<()> {
        let playlist_id = self.entry_mut(entry_id)?.playlist_id;
        if self
            .entries
            .iter()
            .any(|e| e.playlist_id == playlist_id && e.id != entry_id && e.position == Some(position))
        {
            return Err(SyncError::Storage(format!(
                "Position {} already taken in playlist {}",
                position, playlist_id
            )));
        }

        let entry = self.entry_mut(entry_id)?;
        entry.position = Some(position);
        entry.position_change = position_change;
        entry.last_position = Some(position);
        Ok(())
    }

    fn link_entry_tracks(
        &mut self,
        entry_id: EntryId,
        track_record_ids: &[TrackRecordId],
    ) -> Result<()> {
        let entry = self.entry_mut(entry_id)?;
        for id in track_record_ids {
            if !entry.track_ids.contains(id) {
                entry.track_ids.push(*id);
            }
        }
        Ok(())
    }

    fn clear_entry_positions(&mut self, playlist_id: PlaylistId) -> Result<()> {
        for entry in self.entries.iter_mut().filter(|e| e.playlist_id == playlist_id) {
            entry.position = None;
            entry.position_change = None;
        }
        Ok(())
    }

    fn get_playlist_entries(&self, playlist_id: PlaylistId) -> Result<Vec<PlaylistEntry>> {
        let mut entries: Vec<PlaylistEntry> = self
            .entries
            .iter()
            .filter(|e| e.playlist_id == playlist_id)
            .cloned()
            .collect();
        sort_entries(&mut entries);
        Ok(entries)
    }

    fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let snapshot = self.clone();
        let result = f(self);
        if result.is_err() {
            *self = snapshot;
        }
        result
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(title: &str) -> StoredTrackFields {
        StoredTrackFields {
            title: title.to_string(),
            artist_credit_string: "Artist".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_upsert_keyed_on_source_and_code() {
        let mut storage = MemoryStorage::new();
        let first = storage.upsert_stored_track("abcradio_top", "a1", &fields("One")).unwrap();
        let again = storage.upsert_stored_track("abcradio_top", "a1", &fields("One (edit)")).unwrap();
        let other = storage.upsert_stored_track("spotify_p1", "a1", &fields("One")).unwrap();

        assert_eq!(first.id, again.id);
        assert_eq!(again.title, "One (edit)");
        assert_ne!(first.id, other.id);
        assert_eq!(storage.tracks().len(), 2);
    }

    #[test]
    fn test_entries_and_linked_tracks() {
        let mut storage = MemoryStorage::new();
        let playlist = storage.get_or_create_playlist("abcradio_top").unwrap();
        assert_eq!(storage.get_or_create_playlist("abcradio_top").unwrap(), playlist);

        let source = storage.upsert_stored_track("abcradio_top", "a1", &fields("One")).unwrap();
        let service = storage.upsert_stored_track("spotify_p1", "s1", &fields("One")).unwrap();

        let entry = storage.get_or_create_entry(playlist, source.id).unwrap();
        assert!(entry.created);
        assert_eq!(entry.position, None);
        storage.set_entry_position(entry.id, 3, None).unwrap();
        storage.link_entry_tracks(entry.id, &[source.id, service.id]).unwrap();

        let again = storage.get_or_create_entry(playlist, service.id).unwrap();
        assert!(!again.created);
        assert_eq!(again.id, entry.id);
        assert_eq!(again.position, Some(3));

        let entries = storage.get_playlist_entries(playlist).unwrap();
        assert_eq!(entries[0].track_ids, vec![source.id, service.id]);
        let stored = storage.get_stored_tracks("abcradio_top", playlist).unwrap();
        assert_eq!(stored, vec![source]);
    }

    #[test]
    fn test_position_unique_within_playlist() {
        let mut storage = MemoryStorage::new();
        let playlist = storage.get_or_create_playlist("p").unwrap();
        let a = storage.upsert_stored_track("p", "a", &fields("A")).unwrap();
        let b = storage.upsert_stored_track("p", "b", &fields("B")).unwrap();
        let ea = storage.get_or_create_entry(playlist, a.id).unwrap();
        let eb = storage.get_or_create_entry(playlist, b.id).unwrap();

        storage.set_entry_position(ea.id, 1, None).unwrap();
        assert!(storage.set_entry_position(eb.id, 1, None).is_err());

        storage.clear_entry_positions(playlist).unwrap();
        storage.set_entry_position(eb.id, 1, Some(0)).unwrap();
        let entries = storage.get_playlist_entries(playlist).unwrap();
        assert_eq!(entries[0].id, eb.id);
        assert_eq!(entries[1].position, None);
    }

    #[test]
    fn test_cleared_entry_keeps_last_position() {
        let mut storage = MemoryStorage::new();
        let playlist = storage.get_or_create_playlist("p").unwrap();
        let a = storage.upsert_stored_track("p", "a", &fields("A")).unwrap();
        let entry = storage.get_or_create_entry(playlist, a.id).unwrap();
        storage.set_entry_position(entry.id, 3, None).unwrap();
        storage.clear_entry_positions(playlist).unwrap();

        let entries = storage.get_playlist_entries(playlist).unwrap();
        assert_eq!(entries[0].position, None);
        assert_eq!(entries[0].last_position, Some(3));
        assert_eq!(storage.get_or_create_entry(playlist, a.id).unwrap().position, Some(3));
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let mut storage = MemoryStorage::new();
        storage.get_or_create_playlist("kept").unwrap();
        let before = storage.clone();

        let result: Result<()> = storage.transaction(|s| {
            s.get_or_create_playlist("discarded")?;
            s.upsert_stored_track("discarded", "x", &fields("X"))?;
            Err(SyncError::Storage("boom".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(storage, before);

        let id = storage
            .transaction(|s| s.get_or_create_playlist("committed"))
            .unwrap();
        assert_eq!(storage.get_or_create_playlist("committed").unwrap(), id);
    }
}
