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

use super::WorkflowError;
use crate::library::{FetchOptions, Library};
use crate::models::IngestReport;
use crate::utils;
use log::{info, warn};
use std::collections::HashSet;
use std::path::Path;

/// Fetches every track listed in `path` (ids or URLs) and persists it.
pub async fn add_tracks_from_file(
    library: &Library,
    path: &Path,
) -> Result<IngestReport, WorkflowError> {
    let ids: Vec<String> = utils::read_track_ids(path)?
        .iter()
        .map(|line| utils::parse_url(line))
        .collect();
    info!("Adding {} tracks from {}", ids.len(), path.display());

    let tracks = library.get_tracks(&ids, FetchOptions::default()).await?;
    for track in &tracks {
        // Cached tracks skip the database on the way out.
        if !library.track_exists(&track.id)? {
            library.sync_track(track).await?;
        }
        info!("Track {} added to db", track.id);
    }

    let synced: HashSet<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
    let mut missing = Vec::new();
    for id in &ids {
        if !synced.contains(id.as_str()) && !missing.contains(id) {
            warn!("Track {} not found", id);
            missing.push(id.clone());
        }
    }

    Ok(IngestReport {
        requested: ids.len(),
        synced: tracks.into_iter().map(|t| t.id).collect(),
        missing,
    })
}
