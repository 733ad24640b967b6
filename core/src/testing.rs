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

//! In-memory stand-ins for the remote APIs.

use crate::cache::ObjectCache;
use crate::catalog::{
    CatalogApi, CatalogError, RawAlbum, RawArtist, RawArtistRef, RawPlaylist, RawPlaylistItem,
    RawTrack,
};
use crate::db::Database;
use crate::library::Library;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Default)]
pub struct FakeCatalog {
    pub user_id: String,
    pub tracks: HashMap<String, RawTrack>,
    pub albums: HashMap<String, RawAlbum>,
    pub artists: HashMap<String, RawArtist>,
    pub playlists: HashMap<String, (RawPlaylist, Vec<RawPlaylistItem>)>,
    pub user_playlists: Vec<RawPlaylist>,
    pub added: Mutex<Vec<(String, Vec<String>)>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

pub fn raw_track(id: &str, name: &str, album_id: &str, artists: &[(&str, &str)]) -> RawTrack {
    RawTrack {
        id: id.to_string(),
        name: name.to_string(),
        album_id: Some(album_id.to_string()),
        artists: artists
            .iter()
            .map(|(id, name)| RawArtistRef {
                id: Some(id.to_string()),
                name: name.to_string(),
            })
            .collect(),
        linked_from: None,
    }
}

pub fn item(track: RawTrack, added_at: &str) -> RawPlaylistItem {
    RawPlaylistItem {
        added_at: Some(added_at.to_string()),
        track: Some(track),
    }
}

impl FakeCatalog {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            ..Default::default()
        }
    }

    pub fn with_artist(mut self, id: &str, name: &str, genres: &[&str]) -> Self {
        self.artists.insert(
            id.to_string(),
            RawArtist {
                id: id.to_string(),
                name: name.to_string(),
                genres: genres.iter().map(|g| g.to_string()).collect(),
            },
        );
        self
    }

    pub fn with_album(mut self, id: &str, name: &str, release_date: &str, artist_ids: &[&str]) -> Self {
        self.albums.insert(
            id.to_string(),
            RawAlbum {
                id: id.to_string(),
                name: name.to_string(),
                release_date: release_date.to_string(),
                artist_ids: artist_ids.iter().map(|a| a.to_string()).collect(),
            },
        );
        self
    }

    pub fn with_track(mut self, track: RawTrack) -> Self {
        self.tracks.insert(track.id.clone(), track);
        self
    }

    pub fn with_playlist(
        mut self,
        id: &str,
        name: &str,
        owner_id: &str,
        items: Vec<RawPlaylistItem>,
    ) -> Self {
        let playlist = RawPlaylist {
            id: id.to_string(),
            name: name.to_string(),
            owner_id: owner_id.to_string(),
        };
        self.user_playlists.push(playlist.clone());
        self.playlists.insert(id.to_string(), (playlist, items));
        self
    }

    /// A small catalog: The Beatles' Abbey Road with two tracks.
    pub fn beatles() -> Self {
        Self::new("user1")
            .with_artist("artist1", "The Beatles", &["rock", "british invasion"])
            .with_artist("artist2", "Billy Preston", &["soul", "rock"])
            .with_album("album1", "Abbey Road", "1969-09-26", &["artist1"])
            .with_track(raw_track(
                "track1",
                "Come Together",
                "album1",
                &[("artist1", "The Beatles")],
            ))
            .with_track(raw_track(
                "track2",
                "Something",
                "album1",
                &[("artist1", "The Beatles"), ("artist2", "Billy Preston")],
            ))
    }

    pub fn calls(&self, method: &'static str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(method)
            .copied()
            .unwrap_or(0)
    }

    fn record(&self, method: &'static str) {
        *self.calls.lock().unwrap().entry(method).or_insert(0) += 1;
    }

    fn missing(id: &str) -> CatalogError {
        CatalogError::InvalidId(id.to_string())
    }
}

#[async_trait]
impl CatalogApi for FakeCatalog {
    async fn current_user_id(&self) -> Result<String, CatalogError> {
        self.record("current_user_id");
        Ok(self.user_id.clone())
    }

    async fn current_user_playlists(&self) -> Result<Vec<RawPlaylist>, CatalogError> {
        self.record("current_user_playlists");
        Ok(self.user_playlists.clone())
    }

    async fn track(&self, id: &str) -> Result<RawTrack, CatalogError> {
        self.record("track");
        self.tracks.get(id).cloned().ok_or_else(|| Self::missing(id))
    }

    async fn tracks(&self, ids: &[String]) -> Result<Vec<Option<RawTrack>>, CatalogError> {
        self.record("tracks");
        Ok(ids.iter().map(|id| self.tracks.get(id).cloned()).collect())
    }

    async fn album(&self, id: &str) -> Result<RawAlbum, CatalogError> {
        self.record("album");
        self.albums.get(id).cloned().ok_or_else(|| Self::missing(id))
    }

    async fn albums(&self, ids: &[String]) -> Result<Vec<Option<RawAlbum>>, CatalogError> {
        self.record("albums");
        Ok(ids.iter().map(|id| self.albums.get(id).cloned()).collect())
    }

    async fn artist(&self, id: &str) -> Result<RawArtist, CatalogError> {
        self.record("artist");
        self.artists.get(id).cloned().ok_or_else(|| Self::missing(id))
    }

    async fn artists(&self, ids: &[String]) -> Result<Vec<Option<RawArtist>>, CatalogError> {
        self.record("artists");
        Ok(ids.iter().map(|id| self.artists.get(id).cloned()).collect())
    }

    async fn playlist(&self, id: &str) -> Result<RawPlaylist, CatalogError> {
        self.record("playlist");
        self.playlists
            .get(id)
            .map(|(playlist, _)| playlist.clone())
            .ok_or_else(|| Self::missing(id))
    }

    async fn playlist_items(&self, id: &str) -> Result<Vec<RawPlaylistItem>, CatalogError> {
        self.record("playlist_items");
        self.playlists
            .get(id)
            .map(|(_, items)| items.clone())
            .ok_or_else(|| Self::missing(id))
    }

    async fn playlist_add_items(
        &self,
        playlist_id: &str,
        track_ids: &[String],
    ) -> Result<(), CatalogError> {
        self.record("playlist_add_items");
        self.added
            .lock()
            .unwrap()
            .push((playlist_id.to_string(), track_ids.to_vec()));
        Ok(())
    }
}

/// A library over an in-memory database and a temporary cache directory.
///
/// The `TempDir` must outlive the library.
pub fn library(catalog: Option<Arc<FakeCatalog>>) -> (Library, TempDir) {
    library_with_db(Database::open_in_memory().unwrap(), catalog)
}

pub fn library_with_db(db: Database, catalog: Option<Arc<FakeCatalog>>) -> (Library, TempDir) {
    let dir = TempDir::new().unwrap();
    let catalog = catalog.map(|c| c as Arc<dyn CatalogApi>);
    let library = Library::new(db, ObjectCache::new(dir.path()), catalog)
        .with_batch_pause(Duration::ZERO);
    (library, dir)
}
