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

use crate::config::{Paths, SpotifyConfig};
use log::debug;
use rspotify::{prelude::*, scopes, AuthCodeSpotify, Config, Credentials, OAuth};
use std::fs;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Failed to initialize Spotify client: {0}")]
    ClientConfig(String),
    #[error("Spotify authentication failed: {0}")]
    Spotify(#[from] rspotify::ClientError),
    #[error("Failed to create {0}: {1}")]
    WorkDir(String, std::io::Error),
}

/// Client credentials from the `[spotify]` section, else from
/// `RSPOTIFY_CLIENT_ID` / `RSPOTIFY_CLIENT_SECRET`.
fn credentials(config: &SpotifyConfig) -> Option<Credentials> {
    match (&config.client_id, &config.client_secret) {
        (Some(id), Some(secret)) => Some(Credentials::new(id, secret)),
        _ => {
            debug!("No credentials in config file, falling back to the environment");
            Credentials::from_env()
        }
    }
}

/// Reading and editing the user's playlists.
fn oauth(config: &SpotifyConfig) -> OAuth {
    OAuth {
        redirect_uri: config.redirect_uri().to_string(),
        scopes: scopes!(
            "user-library-read",
            "playlist-read-private",
            "playlist-read-collaborative",
            "playlist-modify-private",
            "playlist-modify-public"
        ),
        ..Default::default()
    }
}

/// Builds an authenticated Spotify client using the Authorization Code Flow.
///
/// The token is cached under the work directory and refreshed automatically.
/// Without a valid cached token the user is prompted (via stdout) to visit
/// the authorization URL.
pub async fn get_spotify_client(
    config: &SpotifyConfig,
    paths: &Paths,
) -> Result<AuthCodeSpotify, AuthError> {
    let creds = credentials(config).ok_or_else(|| {
        AuthError::ClientConfig(
            "Missing client_id/client_secret in config or RSPOTIFY_CLIENT_ID/RSPOTIFY_CLIENT_SECRET"
                .to_string(),
        )
    })?;

    fs::create_dir_all(&paths.work_dir)
        .map_err(|e| AuthError::WorkDir(paths.work_dir.display().to_string(), e))?;

    let client_config = Config {
        token_cached: true,
        token_refreshing: true,
        cache_path: paths.token_cache.clone(),
        ..Default::default()
    };

    let spotify = AuthCodeSpotify::with_config(creds, oauth(config), client_config);

    // Reuses the cached token when there is one.
    let url = spotify.get_authorize_url(false)?;
    spotify.prompt_for_token(&url).await?;

    Ok(spotify)
}
