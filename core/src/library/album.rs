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

use super::{batch_count, unique_ids, FetchOptions, Library, LibraryError};
use crate::cache::Cacheable;
use crate::catalog::{RawAlbum, ALBUM_BATCH_SIZE};
use crate::utils;
use log::{debug, info};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub name: String,
    pub release_date: String,
    pub artist_ids: Vec<String>,
    pub updated: String,
}

impl Album {
    fn from_raw(id: String, raw: RawAlbum) -> Self {
        Self {
            id,
            name: utils::sanitize_string(&raw.name),
            release_date: raw.release_date,
            artist_ids: raw.artist_ids,
            updated: utils::today(),
        }
    }
}

impl fmt::Display for Album {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Cacheable for Album {
    const KIND: &'static str = "album";

    fn cache_id(&self) -> &str {
        &self.id
    }
}

impl Library {
    pub async fn get_album(&self, id: &str, opts: FetchOptions) -> Result<Album, LibraryError> {
        let id = utils::parse_url(id);

        if self.use_stored(opts) {
            if let Some(album) = self.stored_album(&id)? {
                return Ok(album);
            }
        }

        let Ok(catalog) = self.catalog() else {
            return Err(LibraryError::NotFound { kind: "album", id });
        };
        info!("Fetching album {} from api", id);
        let raw = catalog.album(&id).await?;
        let album = Album::from_raw(id, raw);
        self.store_album(&album, opts).await?;
        Ok(album)
    }

    /// Batch variant of [`Library::get_album`], in groups of [`ALBUM_BATCH_SIZE`].
    pub async fn get_albums(
        &self,
        ids: &[String],
        opts: FetchOptions,
    ) -> Result<Vec<Album>, LibraryError> {
        let ids = unique_ids(ids);
        let mut found: HashMap<String, Album> = HashMap::new();
        let mut to_fetch = Vec::new();

        for id in &ids {
            if self.use_stored(opts) {
                if let Some(album) = self.stored_album(id)? {
                    found.insert(id.clone(), album);
                    continue;
                }
            }
            to_fetch.push(id.clone());
        }

        if !to_fetch.is_empty() {
            if let Ok(catalog) = self.catalog() {
                let total = batch_count(to_fetch.len(), ALBUM_BATCH_SIZE);
                for (i, batch) in to_fetch.chunks(ALBUM_BATCH_SIZE).enumerate() {
                    info!("Fetching album batch {}/{}", i + 1, total);
                    let raw_albums = catalog.albums(batch).await?;
                    for (id, raw) in batch.iter().zip(raw_albums) {
                        let Some(raw) = raw else {
                            debug!("Album {} not returned by the api", id);
                            continue;
                        };
                        let album = Album::from_raw(id.clone(), raw);
                        self.store_album(&album, opts).await?;
                        found.insert(id.clone(), album);
                    }
                }
            } else {
                debug!("{} albums not found offline", to_fetch.len());
            }
        }

        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    pub(super) fn stored_album(&self, id: &str) -> Result<Option<Album>, LibraryError> {
        match self.cache.get::<Album>(id) {
            Some(album) => Ok(Some(album)),
            None => self.album_from_db(id),
        }
    }

    async fn store_album(&self, album: &Album, opts: FetchOptions) -> Result<(), LibraryError> {
        self.cache.put(album);
        if opts.sync_to_db {
            self.sync_album(album).await?;
        }
        Ok(())
    }

    pub fn album_from_db(&self, id: &str) -> Result<Option<Album>, LibraryError> {
        let conn = self.db.conn();
        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT name, release_date, updated_at FROM albums WHERE id = ?1",
                [id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;
        let Some((name, release_date, updated)) = row else {
            debug!("Album ID {} not found in database", id);
            return Ok(None);
        };

        let mut stmt =
            conn.prepare("SELECT artist_id FROM albums_artists WHERE album_id = ?1 ORDER BY rowid")?;
        let artist_ids = stmt
            .query_map([id], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(Some(Album {
            id: id.to_string(),
            name,
            release_date,
            artist_ids,
            updated,
        }))
    }

    /// Persists the album together with its artists.
    pub async fn sync_album(&self, album: &Album) -> Result<(), LibraryError> {
        debug!("Syncing album {} to database", album.id);
        let artists = self
            .get_artists(&album.artist_ids, FetchOptions::default())
            .await?;

        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO albums (id, name, release_date, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 release_date = excluded.release_date,
                 updated_at = excluded.updated_at",
            params![album.id, album.name, album.release_date, album.updated],
        )?;
        drop(conn);

        for artist in &artists {
            self.sync_artist(artist)?;
            self.db.conn().execute(
                "INSERT OR IGNORE INTO albums_artists (album_id, artist_id) VALUES (?1, ?2)",
                params![album.id, artist.id],
            )?;
        }
        Ok(())
    }
}
