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

//! Read-through mirror of Spotify entities.
//!
//! Every lookup tries the object cache, then the database, then the API.
//! Entities fetched from the API are cached and, unless asked otherwise,
//! persisted to the database.

mod album;
mod artist;
mod playlist;
mod track;

pub use album::Album;
pub use artist::Artist;
pub use playlist::{genre_counts, Playlist, PlaylistItem};
pub use track::Track;

use crate::cache::ObjectCache;
use crate::catalog::{CatalogApi, CatalogError};
use crate::db::{Database, DbError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Pause between track batches, to stay clear of API rate limits.
pub const DEFAULT_BATCH_PAUSE: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("This operation needs the Spotify API")]
    Offline,
}

/// How a lookup treats cached data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Bypass the cache and the database when the API is available.
    pub refresh: bool,
    /// Persist entities fetched from the API.
    pub sync_to_db: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            refresh: false,
            sync_to_db: true,
        }
    }
}

impl FetchOptions {
    pub fn refresh() -> Self {
        Self {
            refresh: true,
            ..Default::default()
        }
    }

    /// Options for dependent entities: never refreshed, same persistence.
    fn dependent(&self) -> Self {
        Self {
            refresh: false,
            sync_to_db: self.sync_to_db,
        }
    }
}

pub struct Library {
    db: Database,
    cache: ObjectCache,
    catalog: Option<Arc<dyn CatalogApi>>,
    batch_pause: Duration,
}

impl Library {
    pub fn new(db: Database, cache: ObjectCache, catalog: Option<Arc<dyn CatalogApi>>) -> Self {
        Self {
            db,
            cache,
            catalog,
            batch_pause: DEFAULT_BATCH_PAUSE,
        }
    }

    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    pub fn batch_pause(&self) -> Duration {
        self.batch_pause
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    pub fn is_online(&self) -> bool {
        self.catalog.is_some()
    }

    pub fn catalog(&self) -> Result<&dyn CatalogApi, LibraryError> {
        self.catalog.as_deref().ok_or(LibraryError::Offline)
    }

    /// Whether cached or stored copies may be returned as is.
    ///
    /// Without an API client, `refresh` has nothing to refresh from.
    fn use_stored(&self, opts: FetchOptions) -> bool {
        !opts.refresh || !self.is_online()
    }
}

/// Removes repeated ids, keeping the first occurrence.
fn unique_ids(ids: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect()
}

fn batch_count(total: usize, size: usize) -> usize {
    total.div_ceil(size)
}
