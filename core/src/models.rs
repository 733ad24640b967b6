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

use crate::similarity::RatioKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A playlist a track belongs to, rendered as `<id>_<name>` in reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistRef {
    pub id: String,
    pub name: String,
}

impl fmt::Display for PlaylistRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.id, self.name)
    }
}

pub fn join_playlists(playlists: &[PlaylistRef]) -> String {
    playlists
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// A track present in more than one playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdDuplicate {
    pub track: String,
    pub count: usize,
    pub playlists: String,
}

impl fmt::Display for IdDuplicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dupe ID - {} - {}", self.track, self.playlists)
    }
}

/// Two distinct tracks whose names look alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameDuplicate {
    pub track1: String,
    pub artists1: String,
    pub playlists1: String,
    pub track2: String,
    pub artists2: String,
    pub playlists2: String,
    /// Similarity on a 0-100 scale.
    pub score: f64,
    pub ratio_type: RatioKind,
}

impl fmt::Display for NameDuplicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Dupe Name - {} - {} - {} - {} - {:.1} - {} - {} - {}",
            self.artists1,
            self.track1,
            self.artists2,
            self.track2,
            self.score,
            self.ratio_type,
            self.playlists1,
            self.playlists2
        )
    }
}

/// A playlist item the API served as another track with different metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelinkedTrack {
    pub playlist_id: String,
    pub playlist_name: String,
    pub original_id: String,
    pub original_track: String,
    pub replacement_id: String,
    pub replacement_track: String,
    pub added_at: Option<String>,
}

impl fmt::Display for RelinkedTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Relinked - {} - {} -> {} - {} - {}",
            self.playlist_name,
            self.original_track,
            self.replacement_track,
            self.original_id,
            self.replacement_id
        )
    }
}

/// One row of a criteria search. Aggregates are `None` when nothing joined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaTrack {
    pub track_id: String,
    pub track_name: String,
    pub release_year: Option<String>,
    pub album_name: Option<String>,
    pub artist_names: Option<String>,
    pub artist_genres: Option<String>,
}

impl fmt::Display for CriteriaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} ({}, {}) [{}] {}",
            self.artist_names.as_deref().unwrap_or_default(),
            self.track_name,
            self.album_name.as_deref().unwrap_or_default(),
            self.release_year.as_deref().unwrap_or_default(),
            self.artist_genres.as_deref().unwrap_or_default(),
            self.track_id
        )
    }
}

/// Outcome of a batch ingestion from a file of track ids.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub requested: usize,
    pub synced: Vec<String>,
    pub missing: Vec<String>,
}

/// Outcome of a discovery run.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DiscoverReport {
    pub discover_playlist: String,
    pub sources_checked: usize,
    pub new_tracks: Vec<String>,
    pub skipped_orphans: Vec<String>,
}
