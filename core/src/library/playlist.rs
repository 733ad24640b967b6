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

use super::{FetchOptions, Library, LibraryError, Track};
use crate::cache::Cacheable;
use crate::utils;
use log::{debug, info};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub track_id: String,
    pub added_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub items: Vec<PlaylistItem>,
    pub updated: String,
}

impl Playlist {
    pub fn track_ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.track_id.clone()).collect()
    }
}

impl fmt::Display for Playlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.owner, self.name)
    }
}

impl Cacheable for Playlist {
    const KIND: &'static str = "playlist";

    fn cache_id(&self) -> &str {
        &self.id
    }
}

/// Genre histogram of `tracks`, most frequent first, ties by name.
///
/// A track counts once per genre even when several of its artists share it.
pub fn genre_counts(tracks: &[Track]) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for track in tracks {
        for genre in track.genres() {
            *counts.entry(genre).or_insert(0) += 1;
        }
    }
    let mut counts: Vec<(String, usize)> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}

impl Library {
    pub async fn get_playlist(
        &self,
        id: &str,
        opts: FetchOptions,
    ) -> Result<Playlist, LibraryError> {
        let id = utils::parse_url(id);

        if self.use_stored(opts) {
            if let Some(playlist) = self.cache.get::<Playlist>(&id) {
                return Ok(playlist);
            }
            if let Some(playlist) = self.playlist_from_db(&id)? {
                return Ok(playlist);
            }
        }

        let Ok(catalog) = self.catalog() else {
            return Err(LibraryError::NotFound {
                kind: "playlist",
                id,
            });
        };
        info!("Fetching playlist {} from api", id);
        let raw = catalog.playlist(&id).await?;

        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for item in catalog.playlist_items(&id).await? {
            let Some(track) = item.track else {
                debug!("Skipping empty item in playlist {}", id);
                continue;
            };
            let track_id = track.linked_from.unwrap_or(track.id);
            if track_id.is_empty() || !seen.insert(track_id.clone()) {
                continue;
            }
            items.push(PlaylistItem {
                track_id,
                added_at: item.added_at,
            });
        }

        let playlist = Playlist {
            id,
            name: utils::sanitize_string(&raw.name),
            owner: utils::sanitize_string(&raw.owner_id),
            items,
            updated: utils::today(),
        };
        self.cache.put(&playlist);
        if opts.sync_to_db {
            self.sync_playlist(&playlist).await?;
        }
        Ok(playlist)
    }

    pub fn playlist_from_db(&self, id: &str) -> Result<Option<Playlist>, LibraryError> {
        let conn = self.db.conn();
        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT name, owner, updated_at FROM playlists WHERE id = ?1",
                [id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;
        let Some((name, owner, updated)) = row else {
            debug!("Playlist ID {} not found in database", id);
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT track_id, added_at FROM playlists_tracks WHERE playlist_id = ?1 ORDER BY rowid",
        )?;
        let items = stmt
            .query_map([id], |r| {
                Ok(PlaylistItem {
                    track_id: r.get(0)?,
                    added_at: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Playlist {
            id: id.to_string(),
            name,
            owner,
            items,
            updated,
        }))
    }

    /// Persists the playlist, replacing its memberships, and marks its tracks as seen today.
    pub async fn sync_playlist(&self, playlist: &Playlist) -> Result<(), LibraryError> {
        debug!("Syncing playlist {} to database", playlist.id);
        self.db.conn().execute(
            "INSERT INTO playlists (id, name, owner, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 owner = excluded.owner,
                 updated_at = excluded.updated_at",
            params![playlist.id, playlist.name, playlist.owner, playlist.updated],
        )?;

        let tracks = self
            .get_tracks(&playlist.track_ids(), FetchOptions::default())
            .await?;
        for track in &tracks {
            if !self.track_exists(&track.id)? {
                self.sync_track(track).await?;
            }
        }
        let synced: HashSet<&str> = tracks.iter().map(|t| t.id.as_str()).collect();

        let conn = self.db.conn();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM playlists_tracks WHERE playlist_id = ?1",
            [&playlist.id],
        )?;
        for item in &playlist.items {
            if !synced.contains(item.track_id.as_str()) {
                debug!(
                    "Track {} of playlist {} could not be resolved",
                    item.track_id, playlist.id
                );
                continue;
            }
            tx.execute(
                "INSERT OR IGNORE INTO playlists_tracks (playlist_id, track_id, added_at)
                 VALUES (?1, ?2, ?3)",
                params![playlist.id, item.track_id, item.added_at],
            )?;
        }
        tx.execute(
            "UPDATE tracks SET last_seen_at = ?1
             WHERE id IN (SELECT track_id FROM playlists_tracks WHERE playlist_id = ?2)",
            params![utils::today(), playlist.id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub async fn playlist_tracks(
        &self,
        playlist: &Playlist,
        opts: FetchOptions,
    ) -> Result<Vec<Track>, LibraryError> {
        self.get_tracks(&playlist.track_ids(), opts).await
    }

    pub async fn playlist_genres(
        &self,
        playlist: &Playlist,
        opts: FetchOptions,
    ) -> Result<Vec<(String, usize)>, LibraryError> {
        Ok(genre_counts(&self.playlist_tracks(playlist, opts).await?))
    }

    /// Refreshes playlists from the API.
    ///
    /// Without a pattern every playlist owned by the current user, minus
    /// `excluded`, replaces the stored playlists. With a pattern only the
    /// matching playlists are replaced. Tracks, albums and artists are kept.
    pub async fn update_playlists(
        &self,
        excluded: &[String],
        pattern: Option<&str>,
    ) -> Result<Vec<Playlist>, LibraryError> {
        let catalog = self.catalog()?;

        let targets: Vec<(String, String)> = match pattern {
            None => {
                let user_id = catalog.current_user_id().await?;
                let owned: Vec<(String, String)> = catalog
                    .current_user_playlists()
                    .await?
                    .into_iter()
                    .filter(|p| p.owner_id == user_id && !excluded.contains(&p.id))
                    .map(|p| (p.id, p.name))
                    .collect();

                let conn = self.db.conn();
                conn.execute("DELETE FROM playlists_tracks", [])?;
                conn.execute("DELETE FROM playlists", [])?;
                owned
            }
            Some(pattern) => {
                let matches = self.db.resolve_playlist_patterns(&[pattern.to_string()])?;
                let conn = self.db.conn();
                for (id, _) in &matches {
                    conn.execute("DELETE FROM playlists_tracks WHERE playlist_id = ?1", [id])?;
                    conn.execute("DELETE FROM playlists WHERE id = ?1", [id])?;
                }
                matches
            }
        };

        info!("Updating {} playlists", targets.len());
        let mut updated = Vec::with_capacity(targets.len());
        for (i, (id, name)) in targets.iter().enumerate() {
            info!("[{}/{}] Updating playlist: {}", i + 1, targets.len(), name);
            updated.push(self.get_playlist(id, FetchOptions::refresh()).await?);
        }
        Ok(updated)
    }
}
