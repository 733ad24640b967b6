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
use crate::library::{FetchOptions, Library, Track};
use crate::models::DiscoverReport;
use log::{debug, info};
use std::collections::HashSet;

/// Appends the never-seen tracks of `sources` to the discover playlist.
///
/// Playlists are read fresh from the API and not persisted. A track already
/// in the database is not new, even when no playlist holds it anymore: those
/// orphans were removed on purpose and must not come back. New tracks are
/// persisted before being added, so the next run skips them.
pub async fn discover_from_playlists(
    library: &Library,
    discover_id: &str,
    sources: &[String],
) -> Result<DiscoverReport, WorkflowError> {
    let catalog = library.catalog()?;
    let playlist_opts = FetchOptions {
        refresh: true,
        sync_to_db: false,
    };
    let track_opts = FetchOptions {
        refresh: false,
        sync_to_db: false,
    };

    let discover = library.get_playlist(discover_id, playlist_opts).await?;
    let mut report = DiscoverReport {
        discover_playlist: discover.id.clone(),
        ..Default::default()
    };
    let mut seen = HashSet::new();
    let mut new_tracks: Vec<Track> = Vec::new();

    for source in sources {
        let playlist = library.get_playlist(source, playlist_opts).await?;
        info!("Looking for new tracks into {} - {}", playlist.id, playlist.name);
        report.sources_checked += 1;

        for track in library.playlist_tracks(&playlist, track_opts).await? {
            if !seen.insert(track.id.clone()) {
                continue;
            }
            if !library.track_exists(&track.id)? {
                info!("New track found: {}", track.id);
                new_tracks.push(track);
            } else if library.is_orphaned(&track.id)? {
                let last_seen = library
                    .last_seen_at(&track.id)?
                    .unwrap_or_else(|| "unknown".to_string());
                info!("Skipping orphaned track: {} (last seen: {})", track.id, last_seen);
                report.skipped_orphans.push(track.id);
            } else {
                debug!("Skipping track {} (already in playlists)", track.id);
            }
        }
    }

    info!("Adding {} new tracks to db", new_tracks.len());
    for track in &new_tracks {
        library.sync_track(track).await?;
    }

    report.new_tracks = new_tracks.into_iter().map(|t| t.id).collect();
    if !report.new_tracks.is_empty() {
        info!("Adding new tracks to {} - {}", discover.id, discover.name);
        catalog
            .playlist_add_items(&discover.id, &report.new_tracks)
            .await?;
    }

    Ok(report)
}
