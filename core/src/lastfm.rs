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

//! Last.fm scrobble statistics.

use crate::config::LastFmConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;

const API_URL: &str = "https://ws.audioscrobbler.com/2.0/";
pub const LASTFM_BASE_URL: &str = "https://www.last.fm";
pub const PREDEFINED_PERIODS: [u32; 5] = [7, 30, 90, 180, 365];

/// Last.fm allows five requests per second.
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(200);
const DISPLAY_WIDTH: usize = 50;

#[derive(Error, Debug)]
pub enum LastFmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Last.fm API error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("period should be one of 7, 30, 90, 180 or 365 days, got {0}")]
    UnknownPeriod(u32),
    #[error("Unexpected Last.fm response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One listen, as a UNIX timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scrobble {
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentTrack {
    pub artist: String,
    pub title: String,
    pub url: String,
}

/// Where scrobble data comes from.
#[async_trait]
pub trait ScrobbleSource: Send + Sync {
    /// Name of the authenticated user.
    fn username(&self) -> &str;

    /// Most recent listens, newest first, without the track playing now.
    async fn recent_tracks(&self, limit: usize) -> Result<Vec<RecentTrack>, LastFmError>;

    /// Every scrobble of one track by the user.
    async fn track_scrobbles(&self, artist: &str, title: &str)
        -> Result<Vec<Scrobble>, LastFmError>;
}

// Wire format. Lists collapse to a bare object when they hold one entry.

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Deserialize)]
struct ApiError {
    error: i64,
    message: String,
}

#[derive(Deserialize)]
struct SessionResponse {
    session: Session,
}

#[derive(Deserialize)]
struct Session {
    name: String,
}

#[derive(Deserialize)]
struct Text {
    #[serde(rename = "#text")]
    text: String,
}

#[derive(Deserialize, Default)]
struct NowPlaying {
    #[serde(default)]
    nowplaying: Option<String>,
}

#[derive(Deserialize)]
struct RecentTracksResponse {
    recenttracks: RecentTracksPage,
}

#[derive(Deserialize)]
struct RecentTracksPage {
    #[serde(default)]
    track: OneOrMany<RecentTrackEntry>,
}

#[derive(Deserialize)]
struct RecentTrackEntry {
    artist: Text,
    name: String,
    url: String,
    #[serde(rename = "@attr", default)]
    attr: NowPlaying,
}

#[derive(Deserialize)]
struct TrackScrobblesResponse {
    trackscrobbles: TrackScrobblesPage,
}

#[derive(Deserialize)]
struct TrackScrobblesPage {
    #[serde(default)]
    track: OneOrMany<ScrobbleEntry>,
    #[serde(rename = "@attr")]
    attr: PageAttr,
}

#[derive(Deserialize)]
struct ScrobbleEntry {
    date: Option<Date>,
}

#[derive(Deserialize)]
struct Date {
    uts: String,
}

#[derive(Deserialize)]
struct PageAttr {
    #[serde(rename = "totalPages")]
    total_pages: String,
}

/// `api_sig`: MD5 of every `key + value` sorted by key, followed by the secret.
fn api_signature(params: &BTreeMap<&str, String>, secret: &str) -> String {
    let mut payload = String::new();
    for (key, value) in params {
        if *key == "format" || *key == "callback" {
            continue;
        }
        payload.push_str(key);
        payload.push_str(value);
    }
    payload.push_str(secret);
    format!("{:x}", md5::compute(payload))
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, LastFmError> {
    if let Ok(err) = serde_json::from_str::<ApiError>(body) {
        return Err(LastFmError::Api {
            code: err.error,
            message: err.message,
        });
    }
    Ok(serde_json::from_str(body)?)
}

pub struct LastFmClient {
    http: reqwest::Client,
    api_key: String,
    username: String,
    last_request: Mutex<Option<Instant>>,
}

impl LastFmClient {
    /// Opens a session with the configured credentials.
    pub async fn login(config: &LastFmConfig) -> Result<Self, LastFmError> {
        let client = Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            username: config.username.clone(),
            last_request: Mutex::new(None),
        };

        let auth_token = format!(
            "{:x}",
            md5::compute(format!("{}{}", config.username, config.password_hash))
        );
        let mut params = BTreeMap::new();
        params.insert("method", "auth.getMobileSession".to_string());
        params.insert("username", config.username.clone());
        params.insert("authToken", auth_token);
        params.insert("api_key", config.api_key.clone());
        let signature = api_signature(&params, &config.api_secret);
        params.insert("api_sig", signature);

        let body = client.send(&params, true).await?;
        let session: SessionResponse = decode(&body)?;
        info!("Logged in to Last.fm as {}", session.session.name);

        Ok(Self {
            username: session.session.name,
            ..client
        })
    }

    /// Waits until the previous request is at least [`MIN_REQUEST_INTERVAL`] old.
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + MIN_REQUEST_INTERVAL;
            if Instant::now() < ready_at {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn send(&self, params: &BTreeMap<&str, String>, post: bool) -> Result<String, LastFmError> {
        self.throttle().await;
        let mut form: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        form.push(("format", "json"));

        let request = if post {
            self.http.post(API_URL).form(&form)
        } else {
            self.http.get(API_URL).query(&form)
        };
        debug!("Last.fm request {}", params.get("method").map(String::as_str).unwrap_or(""));
        Ok(request.send().await?.text().await?)
    }

    async fn call(&self, method: &str, args: &[(&'static str, String)]) -> Result<String, LastFmError> {
        let mut params: BTreeMap<&str, String> = args.iter().cloned().collect();
        params.insert("method", method.to_string());
        params.insert("api_key", self.api_key.clone());
        self.send(&params, false).await
    }
}

/// The first `limit` finished listens, skipping the track playing now.
fn played_tracks(entries: Vec<RecentTrackEntry>, limit: usize) -> Vec<RecentTrack> {
    entries
        .into_iter()
        .filter(|t| t.attr.nowplaying.as_deref() != Some("true"))
        .take(limit)
        .map(|t| RecentTrack {
            artist: t.artist.text,
            title: t.name,
            url: t.url,
        })
        .collect()
}

#[async_trait]
impl ScrobbleSource for LastFmClient {
    fn username(&self) -> &str {
        &self.username
    }

    async fn recent_tracks(&self, limit: usize) -> Result<Vec<RecentTrack>, LastFmError> {
        // One extra in case the first entry is the track playing now.
        let body = self
            .call(
                "user.getRecentTracks",
                &[("user", self.username.clone()), ("limit", (limit + 1).to_string())],
            )
            .await?;
        let response: RecentTracksResponse = decode(&body)?;
        Ok(played_tracks(response.recenttracks.track.into_vec(), limit))
    }

    async fn track_scrobbles(
        &self,
        artist: &str,
        title: &str,
    ) -> Result<Vec<Scrobble>, LastFmError> {
        let mut scrobbles = Vec::new();
        let mut page = 1;
        loop {
            let body = self
                .call(
                    "user.getTrackScrobbles",
                    &[
                        ("user", self.username.clone()),
                        ("artist", artist.to_string()),
                        ("track", title.to_string()),
                        ("page", page.to_string()),
                    ],
                )
                .await?;
            let response: TrackScrobblesResponse = decode(&body)?;
            let total_pages: u32 = response.trackscrobbles.attr.total_pages.parse().unwrap_or(1);

            scrobbles.extend(
                response
                    .trackscrobbles
                    .track
                    .into_vec()
                    .into_iter()
                    .filter_map(|entry| entry.date)
                    .filter_map(|date| date.uts.parse().ok())
                    .map(|timestamp| Scrobble { timestamp }),
            );

            if page >= total_pages {
                break;
            }
            page += 1;
        }
        debug!("{} scrobbles for {} - {}", scrobbles.len(), artist, title);
        Ok(scrobbles)
    }
}

/// A scrobbled track. Its scrobbles are fetched at most once.
pub struct Track {
    pub artist: String,
    pub title: String,
    pub url: String,
    scrobbles: OnceCell<Vec<Scrobble>>,
}

impl Track {
    pub fn new(artist: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
            url: url.into(),
            scrobbles: OnceCell::new(),
        }
    }

    pub async fn scrobbles(&self, source: &dyn ScrobbleSource) -> Result<&[Scrobble], LastFmError> {
        let scrobbles = self
            .scrobbles
            .get_or_try_init(|| source.track_scrobbles(&self.artist, &self.title))
            .await?;
        Ok(scrobbles.as_slice())
    }

    /// Scrobbles overall, or within the last `period` days before `now`.
    pub async fn scrobbles_count(
        &self,
        source: &dyn ScrobbleSource,
        period: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<usize, LastFmError> {
        Ok(count_within(self.scrobbles(source).await?, period, now))
    }

    /// The track page inside the user's library, optionally with a date preset.
    pub fn scrobbles_url(&self, username: &str, date_preset: Option<&str>) -> String {
        let mut url = self.url.replace(
            LASTFM_BASE_URL,
            &format!("{}/user/{}/library", LASTFM_BASE_URL, username),
        );
        if let Some(preset) = date_preset {
            url.push_str(&format!("?date_preset={}", preset));
        }
        url
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let artist: String = self.artist.chars().take(DISPLAY_WIDTH).collect();
        let title: String = self.title.chars().take(DISPLAY_WIDTH).collect();
        write!(f, "{} - {}", artist, title)
    }
}

fn count_within(scrobbles: &[Scrobble], period: Option<u32>, now: DateTime<Utc>) -> usize {
    scrobbles
        .iter()
        .filter(|s| match period {
            None => true,
            Some(days) => DateTime::from_timestamp(s.timestamp, 0)
                .map(|at| (now - at).num_days() < i64::from(days))
                .unwrap_or(false),
        })
        .count()
}

/// Recently played tracks with their scrobble counts.
///
/// Each line reads `"<track> - <count in period> - <total> - <library url>"`.
/// Tracks played fewer than `minimum` times overall are left out.
pub async fn recent_tracks_scrobbles(
    source: &dyn ScrobbleSource,
    limit: usize,
    minimum: usize,
    period: u32,
    now: DateTime<Utc>,
) -> Result<Vec<String>, LastFmError> {
    if !PREDEFINED_PERIODS.contains(&period) {
        return Err(LastFmError::UnknownPeriod(period));
    }

    let mut seen = HashSet::new();
    let mut lines = Vec::new();
    for recent in source.recent_tracks(limit).await? {
        if !seen.insert((recent.artist.clone(), recent.title.clone())) {
            continue;
        }
        let track = Track::new(recent.artist, recent.title, recent.url);
        let scrobbles = track.scrobbles(source).await?;
        let total = scrobbles.len();
        let in_period = count_within(scrobbles, Some(period), now);

        if total >= minimum {
            let url = track.scrobbles_url(source.username(), Some(&format!("LAST_{}_DAYS", period)));
            lines.push(format!("{} - {} - {} - {}", track, in_period, total, url));
        }
    }
    Ok(lines)
}
