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

//! Semicolon separated exports of the duplicate, relink and search results.

use crate::models::{CriteriaTrack, IdDuplicate, NameDuplicate, RelinkedTrack};
use log::info;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

fn write_rows<I>(path: &Path, header: &[&str], rows: I) -> Result<usize, ReportError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::WriterBuilder::new().delimiter(b';').from_path(path)?;
    writer.write_record(header)?;
    let mut count = 0;
    for row in rows {
        writer.write_record(&row)?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

pub fn write_id_duplicates(path: &Path, duplicates: &[IdDuplicate]) -> Result<(), ReportError> {
    let count = write_rows(
        path,
        &["Type", "Track", "Count", "Playlists"],
        duplicates.iter().map(|d| {
            vec![
                "ID".to_string(),
                d.track.clone(),
                d.count.to_string(),
                d.playlists.clone(),
            ]
        }),
    )?;
    info!("Wrote {} duplicates to {}", count, path.display());
    Ok(())
}

pub fn write_name_duplicates(path: &Path, duplicates: &[NameDuplicate]) -> Result<(), ReportError> {
    let count = write_rows(
        path,
        &[
            "Playlists 1",
            "Artist 1",
            "Title 1",
            "Title 2",
            "Artist 2",
            "Playlists 2",
            "Score",
            "Ratio type",
        ],
        duplicates.iter().map(|d| {
            vec![
                d.playlists1.clone(),
                d.artists1.clone(),
                d.track1.clone(),
                d.track2.clone(),
                d.artists2.clone(),
                d.playlists2.clone(),
                format!("{:.1}", d.score),
                d.ratio_type.to_string(),
            ]
        }),
    )?;
    info!("Wrote {} similar pairs to {}", count, path.display());
    Ok(())
}

pub fn write_relinked(path: &Path, tracks: &[RelinkedTrack]) -> Result<(), ReportError> {
    let count = write_rows(
        path,
        &[
            "Playlist",
            "Original Track",
            "Original ID",
            "Replacement Track",
            "Replacement ID",
            "Added At",
        ],
        tracks.iter().map(|t| {
            vec![
                t.playlist_name.clone(),
                t.original_track.clone(),
                t.original_id.clone(),
                t.replacement_track.clone(),
                t.replacement_id.clone(),
                t.added_at.clone().unwrap_or_default(),
            ]
        }),
    )?;
    info!("Wrote {} relinked tracks to {}", count, path.display());
    Ok(())
}

pub fn write_criteria_tracks(path: &Path, tracks: &[CriteriaTrack]) -> Result<(), ReportError> {
    let count = write_rows(
        path,
        &[
            "Artist(s)",
            "Track Name",
            "Album Name",
            "Release Year",
            "Genre(s)",
            "Track ID",
        ],
        tracks.iter().map(|t| {
            vec![
                t.artist_names.clone().unwrap_or_default(),
                t.track_name.clone(),
                t.album_name.clone().unwrap_or_default(),
                t.release_year.clone().unwrap_or_default(),
                t.artist_genres.clone().unwrap_or_default(),
                t.track_id.clone(),
            ]
        }),
    )?;
    info!("Wrote {} tracks to {}", count, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::RatioKind;
    use tempfile::TempDir;

    #[test]
    fn test_id_duplicates_csv_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports/nested/dupes.csv");
        let duplicates = vec![IdDuplicate {
            track: "The Beatles - Come Together".to_string(),
            count: 2,
            playlists: "p1_Rock Classics,p2_My Favorites".to_string(),
        }];

        write_id_duplicates(&path, &duplicates).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Type;Track;Count;Playlists");
        assert_eq!(
            lines[1],
            "ID;The Beatles - Come Together;2;p1_Rock Classics,p2_My Favorites"
        );
    }

    #[test]
    fn test_name_duplicates_csv_column_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("names.csv");
        let duplicates = vec![NameDuplicate {
            track1: "Come Together".to_string(),
            artists1: "The Beatles".to_string(),
            playlists1: "p1_Rock".to_string(),
            track2: "Come Together - Remastered".to_string(),
            artists2: "The Beatles".to_string(),
            playlists2: "p2_Fav".to_string(),
            score: 100.0,
            ratio_type: RatioKind::TokenSetRatio,
        }];

        write_name_duplicates(&path, &duplicates).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            "Playlists 1;Artist 1;Title 1;Title 2;Artist 2;Playlists 2;Score;Ratio type"
        );
        assert_eq!(
            lines[1],
            "p1_Rock;The Beatles;Come Together;Come Together - Remastered;The Beatles;p2_Fav;100.0;token_set_ratio"
        );
    }

    #[test]
    fn test_criteria_csv_quotes_delimiters() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tracks.csv");
        let tracks = vec![CriteriaTrack {
            track_id: "track1".to_string(),
            track_name: "Come Together; Live".to_string(),
            release_year: Some("1969".to_string()),
            album_name: Some("Abbey Road".to_string()),
            artist_names: Some("The Beatles".to_string()),
            artist_genres: None,
        }];

        write_criteria_tracks(&path, &tracks).unwrap();

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .from_path(&path)
            .unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.get(0), Some("Artist(s)"));
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(record.get(1), Some("Come Together; Live"));
        assert_eq!(record.get(4), Some(""));
        assert_eq!(record.get(5), Some("track1"));
    }

    #[test]
    fn test_relinked_csv_header_only_when_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relinked.csv");
        write_relinked(&path, &[]).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content.trim_end(),
            "Playlist;Original Track;Original ID;Replacement Track;Replacement ID;Added At"
        );
    }
}
