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
use crate::catalog::{RawArtist, BATCH_SIZE};
use crate::utils;
use log::{debug, info};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub genres: Vec<String>,
    pub updated: String,
}

impl Artist {
    fn from_raw(raw: RawArtist) -> Self {
        Self {
            id: raw.id,
            name: utils::sanitize_string(&raw.name),
            genres: raw.genres,
            updated: utils::today(),
        }
    }
}

impl fmt::Display for Artist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Cacheable for Artist {
    const KIND: &'static str = "artist";

    fn cache_id(&self) -> &str {
        &self.id
    }
}

impl Library {
    pub async fn get_artist(&self, id: &str, opts: FetchOptions) -> Result<Artist, LibraryError> {
        let id = utils::parse_url(id);

        if self.use_stored(opts) {
            if let Some(artist) = self.stored_artist(&id)? {
                return Ok(artist);
            }
        }

        let Ok(catalog) = self.catalog() else {
            return Err(LibraryError::NotFound { kind: "artist", id });
        };
        info!("Fetching artist {} from api", id);
        let artist = Artist::from_raw(catalog.artist(&id).await?);
        self.store_artist(&artist, opts)?;
        Ok(artist)
    }

    /// Batch variant of [`Library::get_artist`]. Ids the API cannot resolve are skipped.
    pub async fn get_artists(
        &self,
        ids: &[String],
        opts: FetchOptions,
    ) -> Result<Vec<Artist>, LibraryError> {
        let ids = unique_ids(ids);
        let mut found: HashMap<String, Artist> = HashMap::new();
        let mut to_fetch = Vec::new();

        for id in &ids {
            if self.use_stored(opts) {
                if let Some(artist) = self.stored_artist(id)? {
                    found.insert(id.clone(), artist);
                    continue;
                }
            }
            to_fetch.push(id.clone());
        }

        if !to_fetch.is_empty() {
            if let Ok(catalog) = self.catalog() {
                let total = batch_count(to_fetch.len(), BATCH_SIZE);
                for (i, batch) in to_fetch.chunks(BATCH_SIZE).enumerate() {
                    info!("Fetching artist batch {}/{}", i + 1, total);
                    let raw_artists = catalog.artists(batch).await?;
                    for (id, raw) in batch.iter().zip(raw_artists) {
                        let Some(raw) = raw else {
                            debug!("Artist {} not returned by the api", id);
                            continue;
                        };
                        let artist = Artist {
                            id: id.clone(),
                            ..Artist::from_raw(raw)
                        };
                        self.store_artist(&artist, opts)?;
                        found.insert(id.clone(), artist);
                    }
                }
            } else {
                debug!("{} artists not found offline", to_fetch.len());
            }
        }

        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    pub(super) fn stored_artist(&self, id: &str) -> Result<Option<Artist>, LibraryError> {
        match self.cache.get::<Artist>(id) {
            Some(artist) => Ok(Some(artist)),
            None => self.artist_from_db(id),
        }
    }

    fn store_artist(&self, artist: &Artist, opts: FetchOptions) -> Result<(), LibraryError> {
        self.cache.put(artist);
        if opts.sync_to_db {
            self.sync_artist(artist)?;
        }
        Ok(())
    }

    pub fn artist_from_db(&self, id: &str) -> Result<Option<Artist>, LibraryError> {
        let conn = self.db.conn();
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT name, updated_at FROM artists WHERE id = ?1",
                [id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let Some((name, updated)) = row else {
            debug!("Artist ID {} not found in database", id);
            return Ok(None);
        };

        let mut stmt = conn.prepare("SELECT genre FROM artists_genres WHERE artist_id = ?1 ORDER BY rowid")?;
        let genres = stmt
            .query_map([id], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(Some(Artist {
            id: id.to_string(),
            name,
            genres,
            updated,
        }))
    }

    pub fn sync_artist(&self, artist: &Artist) -> Result<(), LibraryError> {
        debug!("Syncing artist {} to database", artist.id);
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO artists (id, name, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, updated_at = excluded.updated_at",
            params![artist.id, artist.name, artist.updated],
        )?;
        for genre in &artist.genres {
            conn.execute(
                "INSERT OR IGNORE INTO artists_genres (artist_id, genre) VALUES (?1, ?2)",
                params![artist.id, genre],
            )?;
        }
        Ok(())
    }
}
