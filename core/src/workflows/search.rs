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

use crate::db::{placeholders, Database, DbError};
use crate::models::CriteriaTrack;
use log::{debug, info};
use rusqlite::params_from_iter;

const CRITERIA_QUERY: &str = "
    SELECT
        t.id AS track_id,
        t.name AS track_name,
        SUBSTR(al.release_date, 1, 4) AS release_year,
        al.name AS album_name,
        GROUP_CONCAT(DISTINCT ar.name) AS artist_names,
        GROUP_CONCAT(DISTINCT ag.genre) AS artist_genres
    FROM tracks AS t
    INNER JOIN playlists_tracks AS pt ON t.id = pt.track_id
    LEFT JOIN albums_tracks AS atr ON t.id = atr.track_id
    LEFT JOIN albums AS al ON atr.album_id = al.id
    LEFT JOIN tracks_artists AS tar ON t.id = tar.track_id
    LEFT JOIN artists AS ar ON tar.artist_id = ar.id
    LEFT JOIN artists_genres AS ag ON ar.id = ag.artist_id";

const GENRE_SUBQUERY: &str = "
    SELECT DISTINCT t2.id
    FROM tracks AS t2
    LEFT JOIN tracks_artists AS tar2 ON t2.id = tar2.track_id
    LEFT JOIN artists AS ar2 ON tar2.artist_id = ar2.id
    LEFT JOIN artists_genres AS ag2 ON ar2.id = ag2.artist_id
    WHERE LOWER(ag2.genre) REGEXP LOWER(?)";

/// Tracks of the playlists matching `patterns`, filtered by album release
/// date (inclusive, compared as text) and by a case-insensitive genre regex.
///
/// Rows are ordered by artists then track name, ignoring case.
pub fn find_tracks_by_criteria(
    db: &Database,
    patterns: &[String],
    start_date: Option<&str>,
    end_date: Option<&str>,
    genre_pattern: Option<&str>,
) -> Result<Vec<CriteriaTrack>, DbError> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }

    let playlists = db.resolve_playlist_patterns(patterns)?;
    if playlists.is_empty() {
        info!("No playlists found matching patterns: {}", patterns.join(", "));
        return Ok(Vec::new());
    }
    let names: Vec<&str> = playlists.iter().map(|(_, name)| name.as_str()).collect();
    info!("Searching in playlists: {}", names.join(", "));

    let mut params: Vec<String> = playlists.iter().map(|(id, _)| id.clone()).collect();
    let mut clauses = vec![format!("pt.playlist_id IN ({})", placeholders(params.len()))];

    match (start_date, end_date) {
        (Some(start), Some(end)) => {
            clauses.push("al.release_date BETWEEN ? AND ?".to_string());
            params.push(start.to_string());
            params.push(end.to_string());
        }
        (Some(start), None) => {
            clauses.push("al.release_date >= ?".to_string());
            params.push(start.to_string());
        }
        (None, Some(end)) => {
            clauses.push("al.release_date <= ?".to_string());
            params.push(end.to_string());
        }
        (None, None) => {}
    }

    if let Some(genre) = genre_pattern {
        clauses.push(format!("t.id IN ({})", GENRE_SUBQUERY));
        params.push(genre.to_string());
    }

    let query = format!(
        "{} WHERE {}
         GROUP BY t.id, t.name, al.name, al.release_date
         ORDER BY artist_names COLLATE NOCASE, track_name COLLATE NOCASE",
        CRITERIA_QUERY,
        clauses.join(" AND ")
    );
    debug!("Executing criteria query with params: {:?}", params);

    let conn = db.conn();
    let mut stmt = conn.prepare(&query)?;
    let rows = stmt
        .query_map(params_from_iter(&params), |r| {
            Ok(CriteriaTrack {
                track_id: r.get(0)?,
                track_name: r.get(1)?,
                release_year: r.get(2)?,
                album_name: r.get(3)?,
                artist_names: r.get(4)?,
                artist_genres: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures::populated_db;

    fn ids(tracks: &[CriteriaTrack]) -> Vec<&str> {
        tracks.iter().map(|t| t.track_id.as_str()).collect()
    }

    fn playlist(pattern: &str) -> Vec<String> {
        vec![pattern.to_string()]
    }

    #[test]
    fn test_no_filters_orders_by_artist_then_name() {
        let db = populated_db();
        let tracks = find_tracks_by_criteria(&db, &playlist("Rock Classics"), None, None, None).unwrap();

        assert_eq!(
            ids(&tracks),
            vec!["track8", "track6", "track10", "track1", "track2", "track5", "track4"]
        );

        let come_together = &tracks[3];
        assert_eq!(come_together.track_name, "Come Together");
        assert_eq!(come_together.release_year.as_deref(), Some("1969"));
        assert_eq!(come_together.album_name.as_deref(), Some("Abbey Road"));
        assert_eq!(come_together.artist_names.as_deref(), Some("The Beatles"));
        let genres = come_together.artist_genres.as_deref().unwrap();
        assert!(genres.contains("rock") && genres.contains("British Invasion"));

        // No album joined.
        assert_eq!(tracks[0].album_name, None);
        assert_eq!(tracks[0].release_year, None);
    }

    #[test]
    fn test_release_date_filters() {
        let db = populated_db();

        let since = find_tracks_by_criteria(&db, &playlist("playlist1"), Some("1969-01-01"), None, None)
            .unwrap();
        assert_eq!(ids(&since), vec!["track6", "track1", "track2", "track5", "track4"]);

        let between = find_tracks_by_criteria(
            &db,
            &playlist("playlist1"),
            Some("1960-01-01"),
            Some("2000-01-01"),
            None,
        )
        .unwrap();
        assert_eq!(ids(&between), vec!["track1", "track2", "track5", "track4"]);

        let until = find_tracks_by_criteria(&db, &playlist("Chill%"), None, Some("1968-12-31"), None)
            .unwrap();
        assert_eq!(ids(&until), vec!["track3"]);
    }

    #[test]
    fn test_genre_filter_ignores_case() {
        let db = populated_db();

        let rock = find_tracks_by_criteria(&db, &playlist("playlist1"), None, None, Some("ROCK")).unwrap();
        assert_eq!(ids(&rock), vec!["track1", "track2", "track5", "track4"]);

        let hip_hop = find_tracks_by_criteria(&db, &playlist("playlist1"), None, None, Some("^hip"))
            .unwrap();
        assert_eq!(ids(&hip_hop), vec!["track8", "track6", "track10"]);

        let british = find_tracks_by_criteria(
            &db,
            &playlist("playlist1"),
            Some("1969-01-01"),
            None,
            Some("british"),
        )
        .unwrap();
        assert_eq!(british.len(), 4);
    }

    #[test]
    fn test_multiple_patterns_and_empty_cases() {
        let db = populated_db();

        let both = find_tracks_by_criteria(
            &db,
            &["playlist3".to_string(), "My Favorites".to_string()],
            None,
            None,
            None,
        )
        .unwrap();
        // track4 sits in both playlists and is listed once.
        assert_eq!(both.iter().filter(|t| t.track_id == "track4").count(), 1);
        assert_eq!(both.len(), 6);

        assert!(find_tracks_by_criteria(&db, &[], None, None, None).unwrap().is_empty());
        assert!(find_tracks_by_criteria(&db, &playlist("Nothing%"), None, None, None)
            .unwrap()
            .is_empty());
    }
}
