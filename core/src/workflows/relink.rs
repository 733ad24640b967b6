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
use crate::library::Library;
use crate::models::RelinkedTrack;
use log::{info, warn};

/// Finds playlist items the API serves as a different track in the market
/// the catalog was built for.
///
/// Relinks that keep the same artists and name are not reported.
pub async fn find_relinked_tracks(
    library: &Library,
    excluded: &[String],
) -> Result<Vec<RelinkedTrack>, WorkflowError> {
    let catalog = library.catalog()?;
    let playlists = library.db().playlists(excluded)?;
    let total = playlists.len();
    info!("Checking {} playlists for relinked tracks", total);

    let mut relinked = Vec::new();
    for (i, (playlist_id, playlist_name)) in playlists.iter().enumerate() {
        info!("[{}/{}] Checking playlist: {}", i + 1, total, playlist_name);

        for item in catalog.playlist_items(playlist_id).await? {
            let Some(track) = item.track else {
                continue;
            };
            let Some(original_id) = track.linked_from.clone() else {
                continue;
            };
            let artists = track.artist_names();

            let pause = library.batch_pause();
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            let (original_artists, original_name) = match catalog.track(&original_id).await {
                Ok(original) => (original.artist_names(), original.name),
                Err(e) => {
                    warn!("Could not fetch original track {}: {}", original_id, e);
                    ("Unknown".to_string(), "Unknown".to_string())
                }
            };

            if original_artists == artists && original_name == track.name {
                continue;
            }
            info!(
                "  Found relinked track: {} - {} -> {} - {}",
                original_artists, original_name, artists, track.name
            );
            relinked.push(RelinkedTrack {
                playlist_id: playlist_id.clone(),
                playlist_name: playlist_name.clone(),
                original_id,
                original_track: format!("{} - {}", original_artists, original_name),
                replacement_id: track.id,
                replacement_track: format!("{} - {}", artists, track.name),
                added_at: item.added_at,
            });
        }
    }

    info!(
        "Found {} relinked tracks across {} playlists",
        relinked.len(),
        total
    );
    Ok(relinked)
}
