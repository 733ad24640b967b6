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

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:9090";
pub const DEFAULT_MARKET: &str = "FR";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine the home directory")]
    NoHomeDir,
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Missing [{0}] section in config file")]
    MissingSection(&'static str),
}

/// Well-known locations of the files the tool reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub work_dir: PathBuf,
    pub config_file: PathBuf,
    pub database: PathBuf,
    pub token_cache: PathBuf,
    pub cache_dir: PathBuf,
}

impl Paths {
    pub fn from_home(home: &Path) -> Self {
        let work_dir = home.join(".spotfm");
        Self {
            config_file: work_dir.join("spotfm.toml"),
            database: work_dir.join("spotify.db"),
            token_cache: work_dir.join("spotify-token-cache"),
            cache_dir: home.join(".cache").join("spotfm"),
            work_dir,
        }
    }

    pub fn discover() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(Self::from_home(&home))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub spotify: Option<SpotifyConfig>,
    pub lastfm: Option<LastFmConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpotifyConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub market: Option<String>,
    #[serde(default)]
    pub excluded_playlists: Vec<String>,
    #[serde(default)]
    pub sources_playlists: Vec<String>,
    pub discover_playlist: Option<String>,
}

impl SpotifyConfig {
    pub fn redirect_uri(&self) -> &str {
        self.redirect_uri.as_deref().unwrap_or(DEFAULT_REDIRECT_URI)
    }

    pub fn market(&self) -> &str {
        self.market.as_deref().unwrap_or(DEFAULT_MARKET)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastFmConfig {
    pub api_key: String,
    pub api_secret: String,
    pub username: String,
    pub password_hash: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// The `[spotify]` section, or an empty one when the file has none.
    ///
    /// Credentials can still come from `RSPOTIFY_*` environment variables.
    pub fn spotify(&self) -> SpotifyConfig {
        self.spotify.clone().unwrap_or_default()
    }

    pub fn lastfm(&self) -> Result<&LastFmConfig, ConfigError> {
        self.lastfm
            .as_ref()
            .ok_or(ConfigError::MissingSection("lastfm"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[spotify]
client_id = "test_client_id"
client_secret = "test_client_secret"
excluded_playlists = ["playlist1", "playlist2"]
sources_playlists = ["source1", "source2"]
discover_playlist = "discover_id"

[lastfm]
api_key = "test_api_key"
api_secret = "test_api_secret"
username = "test_user"
password_hash = "test_hash"
"#;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(SAMPLE).unwrap();
        let spotify = config.spotify();

        assert_eq!(spotify.client_id.as_deref(), Some("test_client_id"));
        assert_eq!(spotify.client_secret.as_deref(), Some("test_client_secret"));
        assert_eq!(spotify.excluded_playlists, vec!["playlist1", "playlist2"]);
        assert_eq!(spotify.sources_playlists, vec!["source1", "source2"]);
        assert_eq!(spotify.discover_playlist.as_deref(), Some("discover_id"));
        assert_eq!(spotify.redirect_uri(), DEFAULT_REDIRECT_URI);
        assert_eq!(spotify.market(), "FR");

        let lastfm = config.lastfm().unwrap();
        assert_eq!(lastfm.api_key, "test_api_key");
        assert_eq!(lastfm.username, "test_user");
    }

    #[test]
    fn test_missing_sections() {
        let config = Config::parse("").unwrap();
        assert!(config.spotify().excluded_playlists.is_empty());
        assert!(matches!(
            config.lastfm(),
            Err(ConfigError::MissingSection("lastfm"))
        ));
    }

    #[test]
    fn test_load_errors() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));

        let invalid = dir.path().join("invalid.toml");
        fs::write(&invalid, "this is { not valid toml").unwrap();
        assert!(matches!(Config::load(&invalid), Err(ConfigError::Parse(_))));

        let valid = dir.path().join("spotfm.toml");
        fs::write(&valid, SAMPLE).unwrap();
        assert!(Config::load(&valid).unwrap().lastfm.is_some());
    }

    #[test]
    fn test_paths_layout() {
        let paths = Paths::from_home(Path::new("/home/user"));
        assert_eq!(paths.work_dir, PathBuf::from("/home/user/.spotfm"));
        assert_eq!(paths.config_file, PathBuf::from("/home/user/.spotfm/spotfm.toml"));
        assert_eq!(paths.database, PathBuf::from("/home/user/.spotfm/spotify.db"));
        assert_eq!(
            paths.token_cache,
            PathBuf::from("/home/user/.spotfm/spotify-token-cache")
        );
        assert_eq!(paths.cache_dir, PathBuf::from("/home/user/.cache/spotfm"));
    }
}
