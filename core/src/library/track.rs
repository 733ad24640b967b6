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

use super::{batch_count, unique_ids, Album, Artist, FetchOptions, Library, LibraryError};
use crate::cache::Cacheable;
use crate::catalog::{RawTrack, BATCH_SIZE};
use crate::utils;
use log::{debug, info};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub album_id: String,
    /// Album name.
    pub album: String,
    pub release_date: String,
    pub artists: Vec<Artist>,
    pub updated: String,
}

impl Track {
    fn new(id: String, raw: &RawTrack, album: &Album, artists: Vec<Artist>) -> Self {
        Self {
            id,
            name: utils::sanitize_string(&raw.name),
            album_id: album.id.clone(),
            album: album.name.clone(),
            release_date: album.release_date.clone(),
            artists,
            updated: utils::today(),
        }
    }

    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Genres of all artists, first occurrence first.
    pub fn genres(&self) -> Vec<String> {
        let mut genres: Vec<String> = Vec::new();
        for genre in self.artists.iter().flat_map(|a| a.genres.iter()) {
            if !genres.contains(genre) {
                genres.push(genre.clone());
            }
        }
        genres
    }

    pub fn genre_names(&self) -> String {
        self.genres().join(", ")
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist_names(), self.name)
    }
}

impl Cacheable for Track {
    const KIND: &'static str = "track";

    fn cache_id(&self) -> &str {
        &self.id
    }
}

/// Sorts tracks by their `"artists - name"` rendering.
pub fn sort_tracks(tracks: &mut [Track]) {
    tracks.sort_by_cached_key(|t| t.to_string());
}

impl Library {
    pub async fn get_track(&self, id: &str, opts: FetchOptions) -> Result<Track, LibraryError> {
        let id = utils::parse_url(id);

        if self.use_stored(opts) {
            if let Some(track) = self.cache.get::<Track>(&id) {
                return Ok(track);
            }
            if let Some(track) = self.track_from_db(&id)? {
                return Ok(track);
            }
        }

        let Ok(catalog) = self.catalog() else {
            return Err(LibraryError::NotFound { kind: "track", id });
        };
        info!("Fetching track {} from api", id);
        let raw = catalog.track(&id).await?;
        let Some(album_id) = raw.album_id.clone() else {
            return Err(LibraryError::NotFound { kind: "album", id });
        };
        let album = self.get_album(&album_id, opts.dependent()).await?;
        let artists = self
            .get_artists(&artist_ids([&raw]), opts.dependent())
            .await?;

        let track = Track::new(id, &raw, &album, artists);
        self.store_track(&track, opts).await?;
        Ok(track)
    }

    /// Batch variant of [`Library::get_track`].
    ///
    /// Results follow the order of first appearance in `ids`; ids that cannot
    /// be resolved are skipped.
    pub async fn get_tracks(
        &self,
        ids: &[String],
        opts: FetchOptions,
    ) -> Result<Vec<Track>, LibraryError> {
        let parsed: Vec<String> = ids.iter().map(|id| utils::parse_url(id)).collect();
        let ids = unique_ids(&parsed);
        let mut found: HashMap<String, Track> = HashMap::new();
        let mut to_fetch = Vec::new();

        for id in &ids {
            if self.use_stored(opts) {
                if let Some(track) = self.cache.get::<Track>(id) {
                    found.insert(id.clone(), track);
                    continue;
                }
                if let Some(track) = self.track_from_db(id)? {
                    found.insert(id.clone(), track);
                    continue;
                }
            }
            to_fetch.push(id.clone());
        }

        if !to_fetch.is_empty() {
            let Ok(catalog) = self.catalog() else {
                debug!("{} tracks not found offline", to_fetch.len());
                return Ok(ids.iter().filter_map(|id| found.remove(id)).collect());
            };

            let total = batch_count(to_fetch.len(), BATCH_SIZE);
            for (i, batch) in to_fetch.chunks(BATCH_SIZE).enumerate() {
                if i > 0 && !self.batch_pause.is_zero() {
                    tokio::time::sleep(self.batch_pause).await;
                }
                info!("Fetching track batch {}/{}", i + 1, total);

                let raw_tracks: Vec<(String, RawTrack)> = batch
                    .iter()
                    .cloned()
                    .zip(catalog.tracks(batch).await?)
                    .filter_map(|(id, raw)| match raw {
                        Some(raw) => Some((id, raw)),
                        None => {
                            debug!("Track {} not returned by the api", id);
                            None
                        }
                    })
                    .collect();

                let album_ids: Vec<String> = raw_tracks
                    .iter()
                    .filter_map(|(_, raw)| raw.album_id.clone())
                    .collect();
                let albums: HashMap<String, Album> = self
                    .get_albums(&album_ids, opts.dependent())
                    .await?
                    .into_iter()
                    .map(|a| (a.id.clone(), a))
                    .collect();

                let batch_artist_ids = artist_ids(raw_tracks.iter().map(|(_, raw)| raw));
                let artists: HashMap<String, Artist> = self
                    .get_artists(&batch_artist_ids, opts.dependent())
                    .await?
                    .into_iter()
                    .map(|a| (a.id.clone(), a))
                    .collect();

                for (id, raw) in raw_tracks {
                    let Some(album) = raw.album_id.as_ref().and_then(|a| albums.get(a)) else {
                        debug!("Album of track {} not found, skipping", id);
                        continue;
                    };
                    let track_artists = artist_ids([&raw])
                        .iter()
                        .filter_map(|a| artists.get(a).cloned())
                        .collect();
                    let track = Track::new(id.clone(), &raw, album, track_artists);
                    self.store_track(&track, opts).await?;
                    found.insert(id, track);
                }
            }
        }

        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    async fn store_track(&self, track: &Track, opts: FetchOptions) -> Result<(), LibraryError> {
        self.cache.put(track);
        if opts.sync_to_db {
            self.sync_track(track).await?;
        }
        Ok(())
    }

    /// Reads a track with its album and artists. Incomplete rows count as missing.
    pub fn track_from_db(&self, id: &str) -> Result<Option<Track>, LibraryError> {
        let (name, updated, album_id, artist_ids) = {
            let conn = self.db.conn();
            let row: Option<(String, String)> = conn
                .query_row(
                    "SELECT name, updated_at FROM tracks WHERE id = ?1",
                    [id],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?;
            let Some((name, updated)) = row else {
                debug!("Track ID {} not found in database", id);
                return Ok(None);
            };
            let album_id: Option<String> = conn
                .query_row(
                    "SELECT album_id FROM albums_tracks WHERE track_id = ?1",
                    [id],
                    |r| r.get(0),
                )
                .optional()?;
            let Some(album_id) = album_id else {
                debug!("Album of track {} not found in database", id);
                return Ok(None);
            };
            let mut stmt = conn
                .prepare("SELECT artist_id FROM tracks_artists WHERE track_id = ?1 ORDER BY rowid")?;
            let artist_ids = stmt
                .query_map([id], |r| r.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            (name, updated, album_id, artist_ids)
        };

        let Some(album) = self.album_from_db(&album_id)? else {
            return Ok(None);
        };
        let mut artists = Vec::with_capacity(artist_ids.len());
        for artist_id in &artist_ids {
            match self.artist_from_db(artist_id)? {
                Some(artist) => artists.push(artist),
                None => debug!("Artist {} of track {} missing from database", artist_id, id),
            }
        }

        Ok(Some(Track {
            id: id.to_string(),
            name,
            album_id,
            album: album.name,
            release_date: album.release_date,
            artists,
            updated,
        }))
    }

    /// Persists the track along with its album, the album's artists and its own artists.
    ///
    /// New tracks start their lifecycle today; known tracks keep `created_at`.
    pub async fn sync_track(&self, track: &Track) -> Result<(), LibraryError> {
        debug!("Syncing track {} to database", track.id);
        if self.album_from_db(&track.album_id)?.is_none() {
            let opts = FetchOptions {
                refresh: false,
                sync_to_db: false,
            };
            let album = self.get_album(&track.album_id, opts).await?;
            self.sync_album(&album).await?;
        }
        for artist in &track.artists {
            self.sync_artist(artist)?;
        }

        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO tracks (id, name, updated_at, created_at, last_seen_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, updated_at = excluded.updated_at",
            params![track.id, track.name, track.updated, utils::today()],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO albums_tracks (album_id, track_id) VALUES (?1, ?2)",
            params![track.album_id, track.id],
        )?;
        for artist in &track.artists {
            conn.execute(
                "INSERT OR IGNORE INTO tracks_artists (track_id, artist_id) VALUES (?1, ?2)",
                params![track.id, artist.id],
            )?;
        }
        Ok(())
    }

    pub fn track_exists(&self, id: &str) -> Result<bool, LibraryError> {
        let exists = self.db.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM tracks WHERE id = ?1)",
            [id],
            |r| r.get(0),
        )?;
        Ok(exists)
    }

    /// A stored track that no playlist references anymore.
    pub fn is_orphaned(&self, id: &str) -> Result<bool, LibraryError> {
        let referenced: bool = self.db.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM playlists_tracks WHERE track_id = ?1)",
            [id],
            |r| r.get(0),
        )?;
        Ok(!referenced)
    }

    pub fn last_seen_at(&self, id: &str) -> Result<Option<String>, LibraryError> {
        let seen = self
            .db
            .conn()
            .query_row("SELECT last_seen_at FROM tracks WHERE id = ?1", [id], |r| {
                r.get(0)
            })
            .optional()?;
        Ok(seen.flatten())
    }
}

/// Artist ids referenced by the given tracks, in order.
fn artist_ids<'a>(tracks: impl IntoIterator<Item = &'a RawTrack>) -> Vec<String> {
    tracks
        .into_iter()
        .flat_map(|t| t.artists.iter().filter_map(|a| a.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::testing::{library, library_with_db, raw_track, FakeCatalog};
    use std::sync::Arc;

    fn artist(id: &str, name: &str, genres: &[&str]) -> Artist {
        Artist {
            id: id.to_string(),
            name: name.to_string(),
            genres: genres.iter().map(|g| g.to_string()).collect(),
            updated: "2024-01-01".to_string(),
        }
    }

    fn track(name: &str, artists: Vec<Artist>) -> Track {
        Track {
            id: name.to_lowercase(),
            name: name.to_string(),
            album_id: "album1".to_string(),
            album: "Abbey Road".to_string(),
            release_date: "1969-09-26".to_string(),
            artists,
            updated: "2024-01-01".to_string(),
        }
    }

    #[test]
    fn test_display_and_genres() {
        let t = track(
            "Something",
            vec![
                artist("a1", "The Beatles", &["rock", "british invasion"]),
                artist("a2", "Billy Preston", &["soul", "rock"]),
            ],
        );
        assert_eq!(t.to_string(), "The Beatles, Billy Preston - Something");
        assert_eq!(t.genres(), vec!["rock", "british invasion", "soul"]);
        assert_eq!(t.genre_names(), "rock, british invasion, soul");
    }

    #[test]
    fn test_sort_tracks_by_rendering() {
        let beatles = artist("a1", "The Beatles", &[]);
        let abba = artist("a2", "ABBA", &[]);
        let mut tracks = vec![
            track("Something", vec![beatles.clone()]),
            track("Waterloo", vec![abba]),
            track("Come Together", vec![beatles]),
        ];
        sort_tracks(&mut tracks);
        let names: Vec<&str> = tracks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Waterloo", "Come Together", "Something"]);
    }

    #[tokio::test]
    async fn test_get_track_from_api_syncs_everything() {
        let catalog = Arc::new(FakeCatalog::beatles());
        let (library, _dir) = library(Some(catalog.clone()));

        let t = library.get_track("track2", FetchOptions::default()).await.unwrap();
        assert_eq!(t.to_string(), "The Beatles, Billy Preston - Something");
        assert_eq!(t.album, "Abbey Road");
        assert_eq!(t.release_date, "1969-09-26");

        let stored = library.track_from_db("track2").unwrap().unwrap();
        assert_eq!(stored.to_string(), t.to_string());
        assert!(library.album_from_db("album1").unwrap().is_some());
        assert!(library.artist_from_db("artist2").unwrap().is_some());

        let conn = library.db().conn();
        let (created, seen): (String, String) = conn
            .query_row(
                "SELECT created_at, last_seen_at FROM tracks WHERE id = 'track2'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(created, utils::today());
        assert_eq!(seen, utils::today());
    }

    #[tokio::test]
    async fn test_sync_track_keeps_created_at() {
        let catalog = Arc::new(FakeCatalog::beatles());
        let (library, _dir) = library(Some(catalog));
        let mut t = library.get_track("track1", FetchOptions::default()).await.unwrap();
        library
            .db()
            .conn()
            .execute("UPDATE tracks SET created_at = '2020-01-01' WHERE id = 'track1'", [])
            .unwrap();

        t.name = "Come Together - 2019 Mix".to_string();
        library.sync_track(&t).await.unwrap();

        let (name, created): (String, String) = library
            .db()
            .conn()
            .query_row(
                "SELECT name, created_at FROM tracks WHERE id = 'track1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(name, "Come Together - 2019 Mix");
        assert_eq!(created, "2020-01-01");
    }

    #[tokio::test]
    async fn test_get_track_sanitizes_name() {
        let catalog = Arc::new(FakeCatalog::beatles().with_track(raw_track(
            "track3",
            "Maxwell's Silver Hammer",
            "album1",
            &[("artist1", "The Beatles")],
        )));
        let (library, _dir) = library(Some(catalog));

        let t = library.get_track("track3", FetchOptions::default()).await.unwrap();
        assert_eq!(t.name, "Maxwells Silver Hammer");
    }

    #[tokio::test]
    async fn test_get_tracks_batches_in_request_order() {
        let mut catalog = FakeCatalog::beatles();
        for i in 0..60 {
            catalog = catalog.with_track(raw_track(
                &format!("bulk{}", i),
                &format!("Bulk {}", i),
                "album1",
                &[("artist1", "The Beatles")],
            ));
        }
        let catalog = Arc::new(catalog);
        let (library, _dir) = library(Some(catalog.clone()));

        let mut ids: Vec<String> = (0..60).rev().map(|i| format!("bulk{}", i)).collect();
        ids.push("missing".to_string());
        ids.push("bulk59".to_string());

        let tracks = library.get_tracks(&ids, FetchOptions::default()).await.unwrap();
        assert_eq!(tracks.len(), 60);
        assert_eq!(tracks[0].id, "bulk59");
        assert_eq!(tracks[59].id, "bulk0");
        assert_eq!(catalog.calls("tracks"), 2);
        // The shared album is cached after the first batch.
        assert_eq!(catalog.calls("albums"), 1);
        assert_eq!(catalog.calls("track"), 0);

        // Only the unknown id goes back to the api.
        library.get_tracks(&ids, FetchOptions::default()).await.unwrap();
        assert_eq!(catalog.calls("tracks"), 3);
    }

    #[tokio::test]
    async fn test_get_tracks_skips_gaps_mid_batch() {
        let catalog = Arc::new(FakeCatalog::beatles());
        let (library, _dir) = library(Some(catalog.clone()));

        let ids: Vec<String> = ["track1", "unknown", "track2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let tracks = library.get_tracks(&ids, FetchOptions::default()).await.unwrap();

        let found: Vec<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(found, vec!["track1", "track2"]);
        assert_eq!(catalog.calls("tracks"), 1);
        assert!(library.track_exists("track2").unwrap());
    }

    #[tokio::test]
    async fn test_get_tracks_dedupes_urls_and_ids() {
        let catalog = Arc::new(FakeCatalog::beatles());
        let (library, _dir) = library(Some(catalog.clone()));

        let ids = vec![
            "https://open.spotify.com/track/track1?si=abc".to_string(),
            "track1".to_string(),
            "track2".to_string(),
        ];
        let tracks = library.get_tracks(&ids, FetchOptions::default()).await.unwrap();

        let found: Vec<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(found, vec!["track1", "track2"]);
        assert_eq!(catalog.calls("tracks"), 1);
    }

    #[tokio::test]
    async fn test_offline_lookup_uses_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("spotify.db");

        let catalog = Arc::new(FakeCatalog::beatles());
        let (online, _cache) = library_with_db(Database::open(&path).unwrap(), Some(catalog));
        online.get_track("track1", FetchOptions::default()).await.unwrap();

        // Same database, empty cache, no api.
        let (offline, _cache2) = library_with_db(Database::open(&path).unwrap(), None);
        let t = offline.get_track("track1", FetchOptions::refresh()).await.unwrap();
        assert_eq!(t.to_string(), "The Beatles - Come Together");
        assert!(matches!(
            offline.get_track("track2", FetchOptions::default()).await,
            Err(LibraryError::NotFound { kind: "track", .. })
        ));
    }

    #[tokio::test]
    async fn test_lifecycle_queries() {
        let (library, _dir) = library(None);
        library
            .db()
            .conn()
            .execute_batch(
                "INSERT INTO tracks (id, name, updated_at, created_at, last_seen_at)
                     VALUES ('t1', 'A', '2024-01-01', '2024-01-01', '2024-02-01');
                 INSERT INTO tracks (id, name, updated_at, created_at, last_seen_at)
                     VALUES ('t2', 'B', '2024-01-01', '2024-01-01', NULL);
                 INSERT INTO playlists_tracks (playlist_id, track_id, added_at)
                     VALUES ('p1', 't1', '2024-01-01');",
            )
            .unwrap();

        assert!(library.track_exists("t1").unwrap());
        assert!(!library.track_exists("t3").unwrap());
        assert!(!library.is_orphaned("t1").unwrap());
        assert!(library.is_orphaned("t2").unwrap());
        assert_eq!(library.last_seen_at("t1").unwrap().as_deref(), Some("2024-02-01"));
        assert_eq!(library.last_seen_at("t2").unwrap(), None);
        assert_eq!(library.last_seen_at("t3").unwrap(), None);
    }
}
