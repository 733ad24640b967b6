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

use chrono::Local;
use std::fs;
use std::io;
use std::path::Path;
use url::Url;

/// Extracts a Spotify id from an `open.spotify.com` URL or a `spotify:` URI.
///
/// Plain ids are returned unchanged. Query strings (`?si=...`) are dropped.
pub fn parse_url(value: &str) -> String {
    let Ok(url) = Url::parse(value) else {
        return value.to_string();
    };
    match url.path_segments() {
        Some(segments) => segments
            .filter(|segment| !segment.is_empty())
            .last()
            .unwrap_or_default()
            .to_string(),
        // spotify:track:<id>
        None => url.path().rsplit(':').next().unwrap_or_default().to_string(),
    }
}

/// Strips single quotes from names coming from the API.
pub fn sanitize_string(value: &str) -> String {
    value.replace('\'', "")
}

/// Reads one track id (or URL) per line, skipping blank lines.
pub fn read_track_ids(path: &Path) -> io::Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Current local date as `YYYY-MM-DD`, the format stored in `updated_at` columns.
pub fn today() -> String {
    Local::now().date_naive().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_url_extracts_ids() {
        assert_eq!(
            parse_url("https://open.spotify.com/track/3n3Ppam7vgaVa1iaRUc9Lp"),
            "3n3Ppam7vgaVa1iaRUc9Lp"
        );
        assert_eq!(
            parse_url("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M"),
            "37i9dQZF1DXcBWIGoYBM5M"
        );
        assert_eq!(
            parse_url("https://open.spotify.com/track/3n3Ppam7vgaVa1iaRUc9Lp?si=xyz123"),
            "3n3Ppam7vgaVa1iaRUc9Lp"
        );
    }

    #[test]
    fn test_parse_url_plain_id_and_empty_path() {
        assert_eq!(parse_url("3n3Ppam7vgaVa1iaRUc9Lp"), "3n3Ppam7vgaVa1iaRUc9Lp");
        assert_eq!(parse_url("https://open.spotify.com/"), "");
        assert_eq!(parse_url("https://open.spotify.com"), "");
    }

    #[test]
    fn test_parse_url_uris_and_trailing_slashes() {
        assert_eq!(
            parse_url("spotify:track:3n3Ppam7vgaVa1iaRUc9Lp"),
            "3n3Ppam7vgaVa1iaRUc9Lp"
        );
        assert_eq!(
            parse_url("https://open.spotify.com/intl-fr/track/3n3Ppam7vgaVa1iaRUc9Lp/"),
            "3n3Ppam7vgaVa1iaRUc9Lp"
        );
        assert_eq!(
            parse_url("https://open.spotify.com/album/1klALx0u4AavZNEvC4LrTL#top"),
            "1klALx0u4AavZNEvC4LrTL"
        );
    }

    #[test]
    fn test_sanitize_string() {
        assert_eq!(sanitize_string("O'Connor's song"), "OConnors song");
        assert_eq!(sanitize_string("It's a rock 'n' roll song"), "Its a rock n roll song");
        assert_eq!(sanitize_string(r#"He said "hello""#), r#"He said "hello""#);
        assert_eq!(sanitize_string(""), "");
    }

    #[test]
    fn test_read_track_ids_trims_and_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tracks.txt");
        fs::write(&path, "  track1  \n\ntrack2\n   \ntrack3\n").unwrap();

        let ids = read_track_ids(&path).unwrap();
        assert_eq!(ids, vec!["track1", "track2", "track3"]);
    }

    #[test]
    fn test_read_track_ids_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tracks.txt");
        fs::write(&path, "").unwrap();

        assert!(read_track_ids(&path).unwrap().is_empty());
        assert!(read_track_ids(&dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn test_today_format() {
        let today = today();
        assert_eq!(today.len(), 10);
        assert!(chrono::NaiveDate::parse_from_str(&today, "%Y-%m-%d").is_ok());
    }
}
