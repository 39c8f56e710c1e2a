//! SQLite-backed [`Storage`].

use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, error};

use crate::error::{Result, SyncError};
use crate::models::{
    EntryId, EntryRef, PlaylistEntry, PlaylistId, StoredTrackFields, StoredTrackRecord,
    TrackRecordId,
};
use crate::storage::Storage;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS playlists (
        id INTEGER PRIMARY KEY,
        source_name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS tracks (
        id INTEGER PRIMARY KEY,
        source_name TEXT NOT NULL,
        code TEXT NOT NULL,
        title TEXT NOT NULL,
        artist_credit_string TEXT NOT NULL,
        info_url TEXT NOT NULL,
        image_url TEXT NOT NULL,
        external_code TEXT,
        UNIQUE (source_name, code)
    );

    CREATE TABLE IF NOT EXISTS entries (
        id INTEGER PRIMARY KEY,
        playlist_id INTEGER NOT NULL REFERENCES playlists(id),
        position INTEGER,
        position_change INTEGER,
        last_position INTEGER,
        UNIQUE (playlist_id, position)
    );

    CREATE TABLE IF NOT EXISTS entry_tracks (
        entry_id INTEGER NOT NULL REFERENCES entries(id),
        track_id INTEGER NOT NULL REFERENCES tracks(id),
        PRIMARY KEY (entry_id, track_id)
    );

    CREATE INDEX IF NOT EXISTS idx_entry_tracks_track ON entry_tracks(track_id);
";

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Open (or create) a database file and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    fn get_track(&self, source_name: &str, code: &str) -> Result<StoredTrackRecord> {
        let record = self.conn.query_row(
            "SELECT id, source_name, code, title, artist_credit_string, info_url, image_url, external_code
             FROM tracks WHERE source_name = ?1 AND code = ?2",
            params![source_name, code],
            record_from_row,
        )?;
        Ok(record)
    }

    fn entry_track_ids(&self, entry_id: EntryId) -> Result<Vec<TrackRecordId>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT track_id FROM entry_tracks WHERE entry_id = ?1 ORDER BY rowid")?;
        let ids = stmt
            .query_map(params![entry_id.0], |row| Ok(TrackRecordId(row.get(0)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}

fn record_from_row(row: &Row) -> rusqlite::Result<StoredTrackRecord> {
    Ok(StoredTrackRecord {
        id: TrackRecordId(row.get(0)?),
        source_name: row.get(1)?,
        code: row.get(2)?,
        title: row.get(3)?,
        artist_credit_string: row.get(4)?,
        info_url: row.get(5)?,
        image_url: row.get(6)?,
        external_code: row.get(7)?,
    })
}

impl Storage for SqliteStorage {
    fn get_stored_tracks(
        &self,
        source_name: &str,
        playlist_id: PlaylistId,
    ) -> Result<Vec<StoredTrackRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT DISTINCT t.id, t.source_name, t.code, t.title, t.artist_credit_string,
                    t.info_url, t.image_url, t.external_code
             FROM tracks t
             JOIN entry_tracks et ON et.track_id = t.id
             JOIN entries e ON e.id = et.entry_id
             WHERE t.source_name = ?1 AND e.playlist_id = ?2
             ORDER BY t.id",
        )?;
        let records = stmt
            .query_map(params![source_name, playlist_id.0], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn upsert_stored_track(
        &mut self,
        source_name: &str,
        code: &str,
        fields: &StoredTrackFields,
    ) -> Result<StoredTrackRecord> {
        self.conn.execute(
            "INSERT INTO tracks
                (source_name, code, title, artist_credit_string, info_url, image_url, external_code)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (source_name, code) DO UPDATE SET
                title = excluded.title,
                artist_credit_string = excluded.artist_credit_string,
                info_url = excluded.info_url,
                image_url = excluded.image_url,
                external_code = excluded.external_code",
            params![
                source_name,
                code,
                fields.title,
                fields.artist_credit_string,
                fields.info_url,
                fields.image_url,
                fields.external_code,
            ],
        )?;
        self.get_track(source_name, code)
    }

    fn get_or_create_playlist(&mut self, source_name: &str) -> Result<PlaylistId> {
        self.conn.execute(
            "INSERT OR IGNORE INTO playlists (source_name) VALUES (?1)",
            params![source_name],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM playlists WHERE source_name = ?1",
            params![source_name],
            |row| row.get(0),
        )?;
        Ok(PlaylistId(id))
    }

    fn get_or_create_entry(
        &mut self,
        playlist_id: PlaylistId,
        track_record_id: TrackRecordId,
    ) -> Result<EntryRef> {
        let existing = self
            .conn
            .query_row(
                "SELECT e.id, e.last_position
                 FROM entries e
                 JOIN entry_tracks et ON et.entry_id = e.id
                 WHERE e.playlist_id = ?1 AND et.track_id = ?2
                 ORDER BY e.id
                 LIMIT 1",
                params![playlist_id.0, track_record_id.0],
                |row| Ok((EntryId(row.get(0)?), row.get::<_, Option<u32>>(1)?)),
            )
            .optional()?;

        if let Some((id, position)) = existing {
            return Ok(EntryRef {
                id,
                position,
                created: false,
            });
        }

        self.conn.execute(
            "INSERT INTO entries (playlist_id) VALUES (?1)",
            params![playlist_id.0],
        )?;
        let id = EntryId(self.conn.last_insert_rowid());
        self.conn.execute(
            "INSERT INTO entry_tracks (entry_id, track_id) VALUES (?1, ?2)",
            params![id.0, track_record_id.0],
        )?;
        debug!(playlist = %playlist_id, entry = %id, "Created playlist entry");
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
        let changed = self.conn.execute(
            "UPDATE entries SET position = ?1, position_change = ?2, last_position = ?1 WHERE id = ?3",
            params![position, position_change, entry_id.0],
        )?;
        if changed == 0 {
            return Err(SyncError::Storage(format!(
                "No playlist entry with id {}",
                entry_id
            )));
        }
        Ok(())
    }

    fn link_entry_tracks(
        &mut self,
        entry_id: EntryId,
        track_record_ids: &[TrackRecordId],
    ) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached("INSERT OR IGNORE INTO entry_tracks (entry_id, track_id) VALUES (?1, ?2)")?;
        for id in track_record_ids {
            stmt.execute(params![entry_id.0, id.0])?;
        }
        Ok(())
    }

    fn clear_entry_positions(&mut self, playlist_id: PlaylistId) -> Result<()> {
        self.conn.execute(
            "UPDATE entries SET position = NULL, position_change = NULL WHERE playlist_id = ?1",
            params![playlist_id.0],
        )?;
        Ok(())
    }

    fn get_playlist_entries(&self, playlist_id: PlaylistId) -> Result<Vec<PlaylistEntry>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, position, position_change, last_position FROM entries
             WHERE playlist_id = ?1
             ORDER BY position IS NULL, position, id",
        )?;
        let rows = stmt
            .query_map(params![playlist_id.0], |row| {
                Ok((
                    EntryId(row.get(0)?),
                    row.get::<_, Option<u32>>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, Option<u32>>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, position, position_change, last_position)| {
                Ok(PlaylistEntry {
                    id,
                    playlist_id,
                    position,
                    position_change,
                    last_position,
                    track_ids: self.entry_track_ids(id)?,
                })
            })
            .collect()
    }

    fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    error!(error = %e, rollback_error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
