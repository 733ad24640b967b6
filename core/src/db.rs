/*
    spotfm-rs | Rust CLI tool to mirror a Spotify library and find duplicate tracks.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use crate::utils;
use log::{debug, error, info, trace};
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tracks (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    created_at TEXT,
    last_seen_at TEXT
);

CREATE TABLE IF NOT EXISTS artists (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS artists_genres (
    artist_id TEXT NOT NULL,
    genre TEXT NOT NULL,
    PRIMARY KEY (artist_id, genre),
    FOREIGN KEY (artist_id) REFERENCES artists(id)
);

CREATE TABLE IF NOT EXISTS albums (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    release_date TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS playlists (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    owner TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tracks_artists (
    track_id TEXT NOT NULL,
    artist_id TEXT NOT NULL,
    PRIMARY KEY (track_id, artist_id),
    FOREIGN KEY (track_id) REFERENCES tracks(id),
    FOREIGN KEY (artist_id) REFERENCES artists(id)
);

CREATE TABLE IF NOT EXISTS albums_tracks (
    album_id TEXT NOT NULL,
    track_id TEXT NOT NULL,
    PRIMARY KEY (album_id, track_id),
    FOREIGN KEY (album_id) REFERENCES albums(id),
    FOREIGN KEY (track_id) REFERENCES tracks(id)
);

CREATE TABLE IF NOT EXISTS albums_artists (
    album_id TEXT NOT NULL,
    artist_id TEXT NOT NULL,
    PRIMARY KEY (album_id, artist_id),
    FOREIGN KEY (album_id) REFERENCES albums(id),
    FOREIGN KEY (artist_id) REFERENCES artists(id)
);

CREATE TABLE IF NOT EXISTS playlists_tracks (
    playlist_id TEXT NOT NULL,
    track_id TEXT NOT NULL,
    added_at TEXT,
    PRIMARY KEY (playlist_id, track_id),
    FOREIGN KEY (playlist_id) REFERENCES playlists(id),
    FOREIGN KEY (track_id) REFERENCES tracks(id)
);

CREATE INDEX IF NOT EXISTS idx_tracks_artists_artist ON tracks_artists(artist_id);
CREATE INDEX IF NOT EXISTS idx_albums_tracks_track ON albums_tracks(track_id);
CREATE INDEX IF NOT EXISTS idx_albums_artists_artist ON albums_artists(artist_id);
CREATE INDEX IF NOT EXISTS idx_playlists_tracks_track ON playlists_tracks(track_id);
";

const TABLES: [&str; 9] = [
    "playlists_tracks",
    "albums_artists",
    "albums_tracks",
    "tracks_artists",
    "artists_genres",
    "playlists",
    "albums",
    "artists",
    "tracks",
];

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
}

/// The local mirror of the Spotify library.
pub struct Database {
    conn: Mutex<Connection>,
}

fn log_sql(statement: &str) {
    trace!(target: "spotfm::sql", "{}", statement);
}

/// `REGEXP(pattern, text)`: NULL operands and invalid patterns never match.
fn register_regexp(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let pattern = ctx.get::<Option<String>>(0)?;
            let text = ctx.get::<Option<String>>(1)?;
            let (Some(pattern), Some(text)) = (pattern, text) else {
                return Ok(false);
            };
            match Regex::new(&pattern) {
                Ok(re) => Ok(re.is_match(&text)),
                Err(e) => {
                    debug!("Invalid regular expression in REGEXP {:?}: {}", pattern, e);
                    Ok(false)
                }
            }
        },
    )
}

impl Database {
    /// Opens (or creates) the database file, creating parent directories as needed.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self, DbError> {
        conn.trace(Some(log_sql));
        register_regexp(&conn)?;

        let has_tracks: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'tracks'",
                [],
                |r| r.get::<_, i64>(0),
            )
            .map(|count| count > 0)?;

        if has_tracks {
            if let Err(e) = migrate_lifecycle(&conn) {
                error!("Database migration failed: {}", e);
            }
        }
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Empties every table, keeping the schema.
    pub fn clean_tables(&self) -> Result<(), DbError> {
        let conn = self.conn();
        for table in TABLES {
            conn.execute(&format!("DELETE FROM {}", table), [])?;
        }
        info!("Cleaned {} tables", TABLES.len());
        Ok(())
    }

    /// Resolves playlist ids or name patterns to `(id, name)` pairs.
    ///
    /// A 22-character alphanumeric string is taken as an id even when the
    /// playlist is not in the database yet (the name then falls back to the id).
    /// Anything else is matched by exact id, then by `LIKE` on the name.
    pub fn resolve_playlist_patterns(
        &self,
        patterns: &[String],
    ) -> Result<Vec<(String, String)>, DbError> {
        let conn = self.conn();
        let mut resolved = Vec::new();

        for pattern in patterns {
            if looks_like_id(pattern) {
                let name: Option<String> = conn
                    .query_row(
                        "SELECT name FROM playlists WHERE id = ?1",
                        [pattern],
                        |r| r.get(0),
                    )
                    .optional()?;
                resolved.push((pattern.clone(), name.unwrap_or_else(|| pattern.clone())));
                continue;
            }

            let mut rows = select_pairs(&conn, "SELECT id, name FROM playlists WHERE id = ?1", pattern)?;
            if rows.is_empty() {
                rows = select_pairs(
                    &conn,
                    "SELECT id, name FROM playlists WHERE name LIKE ?1",
                    pattern,
                )?;
            }
            if rows.is_empty() {
                debug!("No playlist matches {:?}", pattern);
            }
            resolved.extend(rows);
        }

        Ok(resolved)
    }

    /// Number of distinct tracks across all playlists.
    pub fn count_tracks(&self) -> Result<usize, DbError> {
        let count = self.conn().query_row(
            "WITH t AS (SELECT DISTINCT track_id FROM playlists_tracks) SELECT count(*) FROM t",
            [],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    /// Number of distinct tracks across the given playlists.
    pub fn count_tracks_in(&self, playlist_ids: &[String]) -> Result<usize, DbError> {
        if playlist_ids.is_empty() {
            return Ok(0);
        }
        let query = format!(
            "WITH t AS (SELECT DISTINCT track_id FROM playlists_tracks WHERE playlist_id IN ({}))
             SELECT count(*) FROM t",
            placeholders(playlist_ids.len())
        );
        let count = self
            .conn()
            .query_row(&query, params_from_iter(playlist_ids), |r| r.get(0))?;
        Ok(count)
    }

    /// `(playlist name, track count)` for every playlist holding tracks.
    pub fn count_tracks_by_playlists(&self) -> Result<Vec<(String, usize)>, DbError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT name, count(*) FROM playlists, playlists_tracks
             WHERE id = playlists_tracks.playlist_id GROUP BY name",
        )?;
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// `(name, id, track count)` for every playlist, ordered by name ignoring case.
    pub fn list_playlists_with_track_counts(&self) -> Result<Vec<(String, String, usize)>, DbError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT p.name, p.id, COUNT(pt.track_id) AS track_count
             FROM playlists AS p
             LEFT JOIN playlists_tracks AS pt ON p.id = pt.playlist_id
             GROUP BY p.id, p.name
             ORDER BY p.name COLLATE NOCASE",
        )?;
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// `(id, name)` of the stored playlists not in `excluded`.
    pub fn playlists(&self, excluded: &[String]) -> Result<Vec<(String, String)>, DbError> {
        let conn = self.conn();
        let mut query = String::from("SELECT id, name FROM playlists");
        if !excluded.is_empty() {
            query.push_str(&format!(" WHERE id NOT IN ({})", placeholders(excluded.len())));
        }
        query.push_str(" ORDER BY name COLLATE NOCASE");
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt
            .query_map(params_from_iter(excluded), |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Adds and back-fills the `created_at`/`last_seen_at` columns on old databases.
fn migrate_lifecycle(conn: &Connection) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare("PRAGMA table_info(tracks)")?;
    let columns = stmt
        .query_map([], |r| r.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;

    let missing: Vec<&str> = ["created_at", "last_seen_at"]
        .into_iter()
        .filter(|c| !columns.iter().any(|existing| existing == c))
        .collect();
    if missing.is_empty() {
        debug!("Database schema is up-to-date");
        return Ok(());
    }

    info!("Migrating database schema to add lifecycle tracking...");
    for column in missing {
        conn.execute(&format!("ALTER TABLE tracks ADD COLUMN {} TEXT", column), [])?;
        info!("Added {} column to tracks table", column);
    }

    let playlists_tracks_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'playlists_tracks'",
        [],
        |r| r.get(0),
    )?;
    if !playlists_tracks_exists {
        conn.execute("UPDATE tracks SET last_seen_at = ?1, created_at = ?1", [utils::today()])?;
        return Ok(());
    }

    let today = utils::today();
    conn.execute(
        "UPDATE tracks
         SET last_seen_at = CASE
             WHEN EXISTS (SELECT 1 FROM playlists_tracks WHERE track_id = tracks.id) THEN ?1
             ELSE (SELECT MAX(added_at) FROM playlists_tracks WHERE track_id = tracks.id)
         END
         WHERE last_seen_at IS NULL",
        [&today],
    )?;
    let backfilled = conn.execute(
        "UPDATE tracks
         SET created_at = COALESCE(
             (SELECT MIN(added_at) FROM playlists_tracks WHERE track_id = tracks.id),
             last_seen_at,
             ?1
         )
         WHERE created_at IS NULL",
        [&today],
    )?;
    info!("Backfilled lifecycle data for {} tracks", backfilled);
    Ok(())
}

fn select_pairs(
    conn: &Connection,
    query: &str,
    param: &str,
) -> rusqlite::Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(query)?;
    let rows = stmt
        .query_map([param], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<Vec<_>, _>>();
    rows
}

fn looks_like_id(value: &str) -> bool {
    value.len() == 22 && value.chars().all(|c| c.is_ascii_alphanumeric())
}

/// `?, ?, ?` for `IN (...)` clauses.
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::Database;

    /// Eleven tracks over four playlists. `track1` and `track4` sit in three
    /// playlists each; the names exercise the fuzzy matcher.
    pub fn populated_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute_batch(
                "
                INSERT INTO tracks (id, name, updated_at) VALUES
                    ('track1', 'Come Together', '2024-01-01'),
                    ('track2', 'Come Together - Remastered', '2024-01-02'),
                    ('track3', 'Yesterday', '2024-01-03'),
                    ('track4', 'Something', '2024-01-04'),
                    ('track5', 'Here Comes the Sun', '2024-01-05'),
                    ('track6', 'Ice', '2024-01-06'),
                    ('track7', 'Ice Cream', '2024-01-07'),
                    ('track8', 'All Bad (feat. Anderson .Paak)', '2024-01-08'),
                    ('track9', 'RNP (feat. Anderson .Paak)', '2024-01-09'),
                    ('track10', 'You', '2024-01-10'),
                    ('track11', 'All Because of You', '2024-01-11');

                INSERT INTO artists (id, name, updated_at) VALUES
                    ('artist1', 'The Beatles', '2024-01-01'),
                    ('artist2', 'Anderson .Paak', '2024-01-01'),
                    ('artist3', 'JID', '2024-01-01');

                INSERT INTO artists_genres (artist_id, genre) VALUES
                    ('artist1', 'rock'),
                    ('artist1', 'British Invasion'),
                    ('artist2', 'neo soul'),
                    ('artist3', 'hip hop'),
                    ('artist3', 'rap');

                INSERT INTO albums (id, name, release_date, updated_at) VALUES
                    ('album1', 'Abbey Road', '1969-09-26', '2024-01-01'),
                    ('album2', 'Help!', '1965-08-06', '2024-01-01'),
                    ('album3', 'The Forever Story', '2022-08-26', '2024-01-01');

                INSERT INTO albums_tracks (album_id, track_id) VALUES
                    ('album1', 'track1'),
                    ('album1', 'track2'),
                    ('album2', 'track3'),
                    ('album1', 'track4'),
                    ('album1', 'track5'),
                    ('album3', 'track6'),
                    ('album3', 'track7');

                INSERT INTO albums_artists (album_id, artist_id) VALUES
                    ('album1', 'artist1'),
                    ('album2', 'artist1'),
                    ('album3', 'artist3');

                INSERT INTO playlists (id, name, owner, updated_at) VALUES
                    ('playlist1', 'Rock Classics', 'user1', '2024-01-01'),
                    ('playlist2', 'My Favorites', 'user1', '2024-01-01'),
                    ('playlist3', 'Chill Vibes', 'user2', '2024-01-01'),
                    ('excluded1', 'Excluded Playlist', 'user1', '2024-01-01');

                INSERT INTO tracks_artists (track_id, artist_id) VALUES
                    ('track1', 'artist1'),
                    ('track2', 'artist1'),
                    ('track3', 'artist1'),
                    ('track4', 'artist1'),
                    ('track5', 'artist1'),
                    ('track6', 'artist3'),
                    ('track7', 'artist3'),
                    ('track8', 'artist3'),
                    ('track9', 'artist3'),
                    ('track10', 'artist3'),
                    ('track11', 'artist3');

                INSERT INTO playlists_tracks (playlist_id, track_id, added_at) VALUES
                    ('playlist1', 'track1', '2024-01-01T00:00:00Z'),
                    ('playlist2', 'track1', '2024-01-02T00:00:00Z'),
                    ('playlist1', 'track2', '2024-01-03T00:00:00Z'),
                    ('playlist3', 'track3', '2024-01-04T00:00:00Z'),
                    ('playlist1', 'track4', '2024-01-05T00:00:00Z'),
                    ('playlist2', 'track4', '2024-01-06T00:00:00Z'),
                    ('playlist3', 'track4', '2024-01-07T00:00:00Z'),
                    ('playlist1', 'track5', '2024-01-08T00:00:00Z'),
                    ('playlist1', 'track6', '2024-01-09T00:00:00Z'),
                    ('playlist2', 'track7', '2024-01-10T00:00:00Z'),
                    ('playlist1', 'track8', '2024-01-11T00:00:00Z'),
                    ('playlist2', 'track9', '2024-01-12T00:00:00Z'),
                    ('playlist1', 'track10', '2024-01-13T00:00:00Z'),
                    ('playlist2', 'track11', '2024-01-14T00:00:00Z'),
                    ('excluded1', 'track1', '2024-01-15T00:00:00Z');
                ",
            )
            .unwrap();
        db
    }
}
