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

use crate::db::{Database, DbError};
use log::info;

/// Distinct tracks over every playlist, or over the playlists matching `patterns`.
///
/// Patterns are resolved like everywhere else (id, then `LIKE` on the name);
/// when none of them resolves the count is zero.
pub fn count_tracks(db: &Database, patterns: &[String]) -> Result<usize, DbError> {
    if patterns.is_empty() {
        return db.count_tracks();
    }

    let ids: Vec<String> = db
        .resolve_playlist_patterns(patterns)?
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    if ids.is_empty() {
        info!("No playlists found matching patterns: {}", patterns.join(", "));
        return Ok(0);
    }
    db.count_tracks_in(&ids)
}
