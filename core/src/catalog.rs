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

use async_trait::async_trait;
use chrono::SecondsFormat;
use futures::stream::TryStreamExt;
use log::{debug, info, warn};
use rspotify::{
    model::{
        AlbumId, ArtistId, Country, FullAlbum, FullArtist, FullTrack, Market, PlayableId,
        PlayableItem, PlaylistId, TrackId,
    },
    prelude::*,
    AuthCodeSpotify, ClientError,
};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Maximum ids per request for tracks and artists, and items per playlist write.
pub const BATCH_SIZE: usize = 50;
/// Maximum ids per request for albums.
pub const ALBUM_BATCH_SIZE: usize = 20;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Spotify API error: {0}")]
    Spotify(#[from] rspotify::ClientError),
    #[error("Invalid Spotify ID: {0}")]
    InvalidId(String),
    #[error("Invalid market code: {0}")]
    InvalidMarket(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawArtistRef {
    pub id: Option<String>,
    pub name: String,
}

/// A track as returned by the API, names not yet sanitized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTrack {
    pub id: String,
    pub name: String,
    pub album_id: Option<String>,
    pub artists: Vec<RawArtistRef>,
    /// Id originally requested when the API substituted another track.
    pub linked_from: Option<String>,
}

impl RawTrack {
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAlbum {
    pub id: String,
    pub name: String,
    pub release_date: String,
    pub artist_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawArtist {
    pub id: String,
    pub name: String,
    pub genres: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPlaylist {
    pub id: String,
    pub name: String,
    pub owner_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPlaylistItem {
    pub added_at: Option<String>,
    pub track: Option<RawTrack>,
}

/// The slice of the Spotify Web API this tool relies on.
///
/// Batch lookups return one slot per requested id; ids the API could not
/// resolve come back as `None`.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn current_user_id(&self) -> Result<String, CatalogError>;
    async fn current_user_playlists(&self) -> Result<Vec<RawPlaylist>, CatalogError>;
    async fn track(&self, id: &str) -> Result<RawTrack, CatalogError>;
    async fn tracks(&self, ids: &[String]) -> Result<Vec<Option<RawTrack>>, CatalogError>;
    async fn album(&self, id: &str) -> Result<RawAlbum, CatalogError>;
    async fn albums(&self, ids: &[String]) -> Result<Vec<Option<RawAlbum>>, CatalogError>;
    async fn artist(&self, id: &str) -> Result<RawArtist, CatalogError>;
    async fn artists(&self, ids: &[String]) -> Result<Vec<Option<RawArtist>>, CatalogError>;
    async fn playlist(&self, id: &str) -> Result<RawPlaylist, CatalogError>;
    /// Every item of the playlist, across all pages.
    async fn playlist_items(&self, id: &str) -> Result<Vec<RawPlaylistItem>, CatalogError>;
    async fn playlist_add_items(
        &self,
        playlist_id: &str,
        track_ids: &[String],
    ) -> Result<(), CatalogError>;
}

/// `CatalogApi` backed by an authenticated `rspotify` client.
pub struct SpotifyCatalog {
    spotify: Arc<AuthCodeSpotify>,
    market: Market,
}

/// Parses an ISO 3166-1 alpha-2 code such as `FR`.
pub fn parse_market(code: &str) -> Result<Market, CatalogError> {
    let country: Country =
        serde_json::from_value(serde_json::Value::String(code.to_uppercase()))
            .map_err(|_| CatalogError::InvalidMarket(code.to_string()))?;
    Ok(Market::Country(country))
}

fn track_id(id: &str) -> Result<TrackId<'_>, CatalogError> {
    TrackId::from_id(id).map_err(|_| CatalogError::InvalidId(id.to_string()))
}

fn album_id(id: &str) -> Result<AlbumId<'_>, CatalogError> {
    AlbumId::from_id(id).map_err(|_| CatalogError::InvalidId(id.to_string()))
}

fn artist_id(id: &str) -> Result<ArtistId<'_>, CatalogError> {
    ArtistId::from_id(id).map_err(|_| CatalogError::InvalidId(id.to_string()))
}

fn playlist_id(id: &str) -> Result<PlaylistId<'_>, CatalogError> {
    PlaylistId::from_id(id).map_err(|_| CatalogError::InvalidId(id.to_string()))
}

fn convert_track(track: FullTrack) -> Option<RawTrack> {
    let id = track.id?.id().to_string();
    Some(RawTrack {
        id,
        name: track.name,
        album_id: track.album.id.map(|a| a.id().to_string()),
        artists: track
            .artists
            .into_iter()
            .map(|a| RawArtistRef {
                id: a.id.map(|id| id.id().to_string()),
                name: a.name,
            })
            .collect(),
        linked_from: track
            .linked_from
            .and_then(|link| link.id)
            .map(|id| id.id().to_string()),
    })
}

fn convert_album(album: FullAlbum) -> RawAlbum {
    RawAlbum {
        id: album.id.id().to_string(),
        name: album.name,
        release_date: album.release_date,
        artist_ids: album
            .artists
            .into_iter()
            .filter_map(|a| a.id.map(|id| id.id().to_string()))
            .collect(),
    }
}

fn convert_artist(artist: FullArtist) -> RawArtist {
    RawArtist {
        id: artist.id.id().to_string(),
        name: artist.name,
        genres: artist.genres,
    }
}

/// Lines API results up with the requested ids, leaving gaps for missing ones.
fn align<T>(requested: &[String], found: Vec<T>, ids_of: impl Fn(&T) -> Vec<String>) -> Vec<Option<T>> {
    let mut found: Vec<Option<T>> = found.into_iter().map(Some).collect();
    requested
        .iter()
        .map(|wanted| {
            found
                .iter_mut()
                .find(|slot| {
                    slot.as_ref()
                        .is_some_and(|item| ids_of(item).iter().any(|id| id == wanted))
                })
                .and_then(Option::take)
        })
        .collect()
}

/// Pairs each id the API accepts with its parsed form. Malformed ids are
/// logged and left out, so they come back as gaps.
fn valid_ids<'a, T>(
    ids: &'a [String],
    parse: impl Fn(&'a str) -> Result<T, CatalogError>,
) -> Vec<(&'a str, T)> {
    ids.iter()
        .filter_map(|id| match parse(id) {
            Ok(parsed) => Some((id.as_str(), parsed)),
            Err(e) => {
                warn!("{}, skipping", e);
                None
            }
        })
        .collect()
}

/// Looks ids up one at a time. Failed lookups are logged and left out.
async fn fetch_each<T, F, Fut>(kind: &str, ids: &[&str], fetch: F) -> Vec<T>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T, CatalogError>>,
{
    let mut found = Vec::with_capacity(ids.len());
    for id in ids {
        match fetch(id.to_string()).await {
            Ok(item) => found.push(item),
            Err(e) => warn!("{} {} not available: {}", kind, id, e),
        }
    }
    found
}

impl SpotifyCatalog {
    pub fn new(spotify: AuthCodeSpotify, market: &str) -> Result<Self, CatalogError> {
        Ok(Self {
            spotify: Arc::new(spotify),
            market: parse_market(market)?,
        })
    }
}

#[async_trait]
impl CatalogApi for SpotifyCatalog {
    async fn current_user_id(&self) -> Result<String, CatalogError> {
        let user = self.spotify.current_user().await?;
        Ok(user.id.id().to_string())
    }

    async fn current_user_playlists(&self) -> Result<Vec<RawPlaylist>, CatalogError> {
        let mut playlists = Vec::new();
        let mut stream = self.spotify.current_user_playlists();

        while let Some(pl) = stream.try_next().await? {
            playlists.push(RawPlaylist {
                id: pl.id.id().to_string(),
                name: pl.name,
                owner_id: pl.owner.id.id().to_string(),
            });
        }

        Ok(playlists)
    }

    async fn track(&self, id: &str) -> Result<RawTrack, CatalogError> {
        debug!("Fetching track {} from api", id);
        let track = self.spotify.track(track_id(id)?, Some(self.market)).await?;
        convert_track(track).ok_or_else(|| CatalogError::InvalidId(id.to_string()))
    }

    async fn tracks(&self, ids: &[String]) -> Result<Vec<Option<RawTrack>>, CatalogError> {
        let (valid, parsed): (Vec<&str>, Vec<_>) = valid_ids(ids, track_id).into_iter().unzip();
        if parsed.is_empty() {
            return Ok(vec![None; ids.len()]);
        }

        // An unknown id comes back as `null`, which fails the whole batch.
        let tracks = match self.spotify.tracks(parsed, Some(self.market)).await {
            Ok(tracks) => tracks.into_iter().filter_map(convert_track).collect(),
            Err(ClientError::ParseJson(e)) => {
                warn!("Track batch has gaps ({}), fetching one by one", e);
                fetch_each("Track", &valid, |id| async move { self.track(&id).await }).await
            }
            Err(e) => return Err(e.into()),
        };
        Ok(align(ids, tracks, |t: &RawTrack| {
            std::iter::once(t.id.clone())
                .chain(t.linked_from.clone())
                .collect()
        }))
    }

    async fn album(&self, id: &str) -> Result<RawAlbum, CatalogError> {
        debug!("Fetching album {} from api", id);
        let album = self.spotify.album(album_id(id)?, Some(self.market)).await?;
        Ok(convert_album(album))
    }

    async fn albums(&self, ids: &[String]) -> Result<Vec<Option<RawAlbum>>, CatalogError> {
        let (valid, parsed): (Vec<&str>, Vec<_>) = valid_ids(ids, album_id).into_iter().unzip();
        if parsed.is_empty() {
            return Ok(vec![None; ids.len()]);
        }

        let albums = match self.spotify.albums(parsed, Some(self.market)).await {
            Ok(albums) => albums.into_iter().map(convert_album).collect(),
            Err(ClientError::ParseJson(e)) => {
                warn!("Album batch has gaps ({}), fetching one by one", e);
                fetch_each("Album", &valid, |id| async move { self.album(&id).await }).await
            }
            Err(e) => return Err(e.into()),
        };
        Ok(align(ids, albums, |a: &RawAlbum| vec![a.id.clone()]))
    }

    async fn artist(&self, id: &str) -> Result<RawArtist, CatalogError> {
        debug!("Fetching artist {} from api", id);
        let artist = self.spotify.artist(artist_id(id)?).await?;
        Ok(convert_artist(artist))
    }

    async fn artists(&self, ids: &[String]) -> Result<Vec<Option<RawArtist>>, CatalogError> {
        let (valid, parsed): (Vec<&str>, Vec<_>) = valid_ids(ids, artist_id).into_iter().unzip();
        if parsed.is_empty() {
            return Ok(vec![None; ids.len()]);
        }

        let artists = match self.spotify.artists(parsed).await {
            Ok(artists) => artists.into_iter().map(convert_artist).collect(),
            Err(ClientError::ParseJson(e)) => {
                warn!("Artist batch has gaps ({}), fetching one by one", e);
                fetch_each("Artist", &valid, |id| async move { self.artist(&id).await }).await
            }
            Err(e) => return Err(e.into()),
        };
        Ok(align(ids, artists, |a: &RawArtist| vec![a.id.clone()]))
    }

    async fn playlist(&self, id: &str) -> Result<RawPlaylist, CatalogError> {
        debug!("Fetching playlist {} from api", id);
        let playlist = self
            .spotify
            .playlist(playlist_id(id)?, None, Some(self.market))
            .await?;
        Ok(RawPlaylist {
            id: playlist.id.id().to_string(),
            name: playlist.name,
            owner_id: playlist.owner.id.id().to_string(),
        })
    }

    async fn playlist_items(&self, id: &str) -> Result<Vec<RawPlaylistItem>, CatalogError> {
        let mut items = Vec::new();
        let mut stream = self
            .spotify
            .playlist_items(playlist_id(id)?, None, Some(self.market));

        while let Some(item) = stream.try_next().await? {
            let track = match item.track {
                Some(PlayableItem::Track(track)) => convert_track(track),
                _ => None,
            };
            items.push(RawPlaylistItem {
                added_at: item
                    .added_at
                    .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true)),
                track,
            });
        }

        debug!("Fetched {} items of playlist {}", items.len(), id);
        Ok(items)
    }

    async fn playlist_add_items(
        &self,
        playlist_id_str: &str,
        track_ids: &[String],
    ) -> Result<(), CatalogError> {
        let id = playlist_id(playlist_id_str)?;
        let total = track_ids.len().div_ceil(BATCH_SIZE);

        for (i, chunk) in track_ids.chunks(BATCH_SIZE).enumerate() {
            info!("Adding tracks batch {}/{} to {}", i + 1, total, playlist_id_str);
            let items = chunk
                .iter()
                .map(|t| track_id(t).map(PlayableId::Track))
                .collect::<Result<Vec<_>, _>>()?;
            self.spotify
                .playlist_add_items(id.clone(), items, None)
                .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str, linked_from: Option<&str>) -> RawTrack {
        RawTrack {
            id: id.to_string(),
            name: format!("Track {}", id),
            album_id: None,
            artists: vec![],
            linked_from: linked_from.map(str::to_string),
        }
    }

    #[test]
    fn test_parse_market() {
        assert!(matches!(
            parse_market("FR"),
            Ok(Market::Country(Country::France))
        ));
        assert!(matches!(
            parse_market("fr"),
            Ok(Market::Country(Country::France))
        ));
        assert!(matches!(
            parse_market("XX"),
            Err(CatalogError::InvalidMarket(_))
        ));
    }

    #[test]
    fn test_align_keeps_request_order_and_gaps() {
        let requested = vec!["a".to_string(), "missing".to_string(), "b".to_string()];
        let found = vec![raw("b", None), raw("a", None)];

        let aligned = align(&requested, found, |t: &RawTrack| vec![t.id.clone()]);
        let ids: Vec<Option<&str>> = aligned
            .iter()
            .map(|t| t.as_ref().map(|t| t.id.as_str()))
            .collect();
        assert_eq!(ids, vec![Some("a"), None, Some("b")]);
    }

    #[test]
    fn test_align_matches_relinked_tracks() {
        let requested = vec!["original".to_string()];
        let found = vec![raw("replacement", Some("original"))];

        let aligned = align(&requested, found, |t: &RawTrack| {
            std::iter::once(t.id.clone())
                .chain(t.linked_from.clone())
                .collect()
        });
        assert_eq!(aligned[0].as_ref().unwrap().id, "replacement");
    }

    #[test]
    fn test_valid_ids_leaves_malformed_ids_out() {
        let ids = vec![
            "4iV5W9uYEdYUVa79Axb7Rh".to_string(),
            "spotify:track:4iV5W9uYEdYUVa79Axb7Rh".to_string(),
            "not an id".to_string(),
            "track2".to_string(),
        ];
        let valid: Vec<&str> = valid_ids(&ids, track_id)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(valid, vec!["4iV5W9uYEdYUVa79Axb7Rh", "track2"]);
    }

    #[tokio::test]
    async fn test_fetch_each_skips_failed_lookups() {
        let found = fetch_each("Track", &["a", "missing", "b"], |id| async move {
            if id == "missing" {
                Err(CatalogError::InvalidId(id))
            } else {
                Ok(raw(&id, None))
            }
        })
        .await;

        // Gaps stay in place once aligned with the request.
        let requested = vec!["a".to_string(), "missing".to_string(), "b".to_string()];
        let aligned = align(&requested, found, |t: &RawTrack| vec![t.id.clone()]);
        let ids: Vec<Option<&str>> = aligned
            .iter()
            .map(|t| t.as_ref().map(|t| t.id.as_str()))
            .collect();
        assert_eq!(ids, vec![Some("a"), None, Some("b")]);
    }

    #[test]
    fn test_artist_names() {
        let mut track = raw("a", None);
        track.artists = vec![
            RawArtistRef {
                id: Some("1".to_string()),
                name: "Anderson .Paak".to_string(),
            },
            RawArtistRef {
                id: None,
                name: "JID".to_string(),
            },
        ];
        assert_eq!(track.artist_names(), "Anderson .Paak, JID");
    }
}
