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

//! Duplicate detection over the stored playlists.
//!
//! Exact duplicates are tracks referenced by several playlists. Name
//! duplicates are distinct tracks whose names are close enough, found in two
//! passes: tracks sharing a three letter name prefix, then tracks sharing an
//! artist across prefixes.

use crate::db::{placeholders, Database, DbError};
use crate::models::{join_playlists, IdDuplicate, NameDuplicate, PlaylistRef};
use crate::similarity::{self, RatioKind};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::params_from_iter;
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

pub const DEFAULT_THRESHOLD: u8 = 95;
pub const MIN_NAME_LENGTH: usize = 3;

const REMIX_MARKERS: [&str; 8] = [
    "remix", "edit", "mix", "version", "remaster", "feat", "ft", "(",
];

static FEAT_CREDIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\(feat\..*?\)").unwrap());

/// A stored track together with the playlists referencing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackPlaylists {
    pub id: String,
    pub name: String,
    /// Artist names joined with `", "`, empty when none are stored.
    pub artists: String,
    pub playlists: Vec<PlaylistRef>,
    pub playlist_count: usize,
}

impl TrackPlaylists {
    /// `"<artists> - <name>"`, or the bare name for tracks without artists.
    pub fn full_name(&self) -> String {
        if self.artists.is_empty() {
            self.name.clone()
        } else {
            format!("{} - {}", self.artists, self.name)
        }
    }
}

/// A track eligible for fuzzy matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub track: TrackPlaylists,
    /// First three characters of the name, lower-cased.
    pub name_prefix: String,
    pub name_length: usize,
}

const ARTISTS_COLUMN: &str = "REPLACE((SELECT GROUP_CONCAT(DISTINCT artist_name)
                 FROM (SELECT a2.name AS artist_name
                       FROM tracks_artists ta2
                       JOIN artists a2 ON ta2.artist_id = a2.id
                       WHERE ta2.track_id = t.id)), ',', ', ')";

fn exclusion_clause(excluded: &[String]) -> String {
    if excluded.is_empty() {
        String::new()
    } else {
        format!("AND p.id NOT IN ({})", placeholders(excluded.len()))
    }
}

/// Splits the `id~name|||id~name` aggregate built by the queries below.
fn parse_playlists(concat: Option<String>) -> Vec<PlaylistRef> {
    concat
        .unwrap_or_default()
        .split("|||")
        .filter_map(|entry| entry.split_once('~'))
        .map(|(id, name)| PlaylistRef {
            id: id.to_string(),
            name: name.to_string(),
        })
        .collect()
}

/// Playlists containing `track_id`, ordered by name.
pub fn playlists_for_track(db: &Database, track_id: &str) -> Result<Vec<PlaylistRef>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(
        "SELECT p.id, p.name
         FROM playlists p
         JOIN playlists_tracks pt ON p.id = pt.playlist_id
         WHERE pt.track_id = ?1
         ORDER BY p.name",
    )?;
    let rows = stmt
        .query_map([track_id], |r| {
            Ok(PlaylistRef {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Every track referenced by a non-excluded playlist, most referenced first.
pub fn tracks_with_playlists(
    db: &Database,
    excluded: &[String],
) -> Result<Vec<TrackPlaylists>, DbError> {
    let query = format!(
        "SELECT
             t.id,
             t.name,
             {artists} AS artists,
             GROUP_CONCAT(p.id || '~' || p.name, '|||') AS playlists,
             COUNT(DISTINCT p.id) AS playlist_count
         FROM tracks t
         JOIN playlists_tracks pt ON t.id = pt.track_id
         JOIN playlists p ON pt.playlist_id = p.id
         WHERE 1=1 {exclusion}
         GROUP BY t.id, t.name
         ORDER BY playlist_count DESC, t.id",
        artists = ARTISTS_COLUMN,
        exclusion = exclusion_clause(excluded),
    );

    let conn = db.conn();
    let mut stmt = conn.prepare(&query)?;
    let rows = stmt
        .query_map(params_from_iter(excluded), |r| {
            Ok(TrackPlaylists {
                id: r.get(0)?,
                name: r.get(1)?,
                artists: r.get::<_, Option<String>>(2)?.unwrap_or_default(),
                playlists: parse_playlists(r.get(3)?),
                playlist_count: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Tracks present in more than one playlist.
pub fn find_duplicate_ids(db: &Database, excluded: &[String]) -> Result<Vec<IdDuplicate>, DbError> {
    let duplicates: Vec<IdDuplicate> = tracks_with_playlists(db, excluded)?
        .into_iter()
        .filter(|t| t.playlist_count > 1)
        .map(|t| IdDuplicate {
            track: t.full_name(),
            count: t.playlist_count,
            playlists: join_playlists(&t.playlists),
        })
        .collect();
    info!("Found {} tracks with duplicate IDs", duplicates.len());
    Ok(duplicates)
}

/// Tracks with names of at least `min_name_length` characters, ordered by
/// name prefix then name length.
pub fn fuzzy_match_candidates(
    db: &Database,
    excluded: &[String],
    min_name_length: usize,
) -> Result<Vec<Candidate>, DbError> {
    let query = format!(
        "SELECT
             t.id,
             t.name,
             {artists} AS artists,
             GROUP_CONCAT(p.id || '~' || p.name, '|||') AS playlists,
             COUNT(DISTINCT p.id) AS playlist_count,
             LOWER(SUBSTR(t.name, 1, 3)) AS name_prefix,
             LENGTH(t.name) AS name_length
         FROM tracks t
         JOIN playlists_tracks pt ON t.id = pt.track_id
         JOIN playlists p ON pt.playlist_id = p.id
         WHERE LENGTH(t.name) >= ? {exclusion}
         GROUP BY t.id, t.name
         ORDER BY name_prefix, name_length, t.id",
        artists = ARTISTS_COLUMN,
        exclusion = exclusion_clause(excluded),
    );

    let mut params: Vec<rusqlite::types::Value> = vec![(min_name_length as i64).into()];
    params.extend(excluded.iter().cloned().map(Into::into));

    let conn = db.conn();
    let mut stmt = conn.prepare(&query)?;
    let rows = stmt
        .query_map(params_from_iter(params), |r| {
            Ok(Candidate {
                track: TrackPlaylists {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    artists: r.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    playlists: parse_playlists(r.get(3)?),
                    playlist_count: r.get(4)?,
                },
                name_prefix: r.get(5)?,
                name_length: r.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// `(shorter, longer)` by character count; on a tie the second name is the shorter.
fn shorter_longer<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a.chars().count() < b.chars().count() {
        (a, b)
    } else {
        (b, a)
    }
}

fn strip_feat(name: &str) -> String {
    FEAT_CREDIT.replace_all(name, "").trim().to_string()
}

/// True when `name` (lower-cased, at most 15 characters) is just an artist of
/// the other track rather than the start of its title.
fn is_artist_name(name: &str, raw_len: usize, other_artists: &[String], other_name: &str) -> bool {
    if raw_len > 15 {
        return false;
    }
    let name_len = name.chars().count();
    for artist in other_artists {
        if name == artist || (name_len > 3 && artist.contains(name)) {
            let core = strip_feat(other_name);
            let leads_core = core.contains(name)
                && (core.starts_with(&format!("{} ", name))
                    || core.starts_with(&format!("{} (", name))
                    || core == name);
            if !leads_core {
                return true;
            }
        }
    }
    false
}

fn artist_tokens(artists: &str) -> Vec<String> {
    artists
        .to_lowercase()
        .replace(',', " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Heuristics rejecting name matches that are almost never the same recording.
pub fn is_likely_false_positive(name1: &str, name2: &str, artists1: &str, artists2: &str) -> bool {
    let lower1 = name1.to_lowercase();
    let lower2 = name2.to_lowercase();
    let name1_lower = lower1.trim();
    let name2_lower = lower2.trim();

    let len1 = name1_lower.chars().count();
    let len2 = name2_lower.chars().count();
    let min_len = len1.min(len2);
    let max_len = len1.max(len2);
    let (shorter, longer) = shorter_longer(name1_lower, name2_lower);

    // Very short names only match their own remixes.
    if min_len <= 5 && shorter != longer {
        match longer.strip_prefix(&format!("{} ", shorter)) {
            Some(extra) => {
                let extra = extra.trim();
                let is_variant = REMIX_MARKERS
                    .iter()
                    .any(|marker| extra.starts_with(marker) || extra.starts_with("- "));
                if !is_variant {
                    return true;
                }
            }
            None => return true,
        }
    }

    // One title is the name of an artist on the other track.
    let all_artists1 = artist_tokens(artists1);
    let all_artists2 = artist_tokens(artists2);
    if is_artist_name(name1_lower, name1.chars().count(), &all_artists2, name2_lower)
        || is_artist_name(name2_lower, name2.chars().count(), &all_artists1, name1_lower)
    {
        return true;
    }

    // A short common word buried inside a much longer title.
    if min_len > 0
        && min_len < 8
        && max_len as f64 / min_len as f64 > 3.0
        && longer.contains(shorter)
        && !longer.starts_with(shorter)
    {
        return true;
    }

    // Different songs sharing only a featured artist.
    if name1_lower.contains("feat") && name2_lower.contains("feat") {
        let core1 = strip_feat(name1_lower);
        let core2 = strip_feat(name2_lower);
        if similarity::ratio(&core1, &core2) < 60.0 {
            return true;
        }
    }

    if max_len > 0 && (min_len as f64 / max_len as f64) < 0.25 {
        let first_word = longer.split_whitespace().next().unwrap_or_default();
        if !(longer.starts_with(shorter) || shorter.starts_with(first_word)) {
            return true;
        }
    }

    false
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Keeps `initial` unless one of `others` scores strictly higher.
fn best_score(a: &str, b: &str, initial: (f64, RatioKind), others: &[RatioKind]) -> (f64, RatioKind) {
    others.iter().fold(initial, |best, kind| {
        let score = kind.score(a, b);
        if score > best.0 {
            (score, *kind)
        } else {
            best
        }
    })
}

fn name_duplicate(track1: &TrackPlaylists, track2: &TrackPlaylists, score: (f64, RatioKind)) -> NameDuplicate {
    NameDuplicate {
        track1: track1.name.clone(),
        artists1: track1.artists.clone(),
        playlists1: join_playlists(&track1.playlists),
        track2: track2.name.clone(),
        artists2: track2.artists.clone(),
        playlists2: join_playlists(&track2.playlists),
        score: score.0,
        ratio_type: score.1,
    }
}

/// Pairs of distinct tracks with similar names, best scores first.
///
/// A pair is kept when its score reaches `threshold`; scores are not rounded.
pub fn find_duplicate_names(
    db: &Database,
    excluded: &[String],
    threshold: u8,
) -> Result<Vec<NameDuplicate>, DbError> {
    let start = Instant::now();
    let threshold = f64::from(threshold);
    let candidates = fuzzy_match_candidates(db, excluded, MIN_NAME_LENGTH)?;
    info!("Loaded {} tracks for comparison", candidates.len());

    let mut duplicates = Vec::new();
    let mut seen_pairs: HashSet<(String, String)> = HashSet::new();
    let mut comparisons = 0usize;

    let mut prefix_groups: BTreeMap<&str, Vec<&Candidate>> = BTreeMap::new();
    for candidate in &candidates {
        prefix_groups
            .entry(candidate.name_prefix.as_str())
            .or_default()
            .push(candidate);
    }
    info!("Pass 1: Organized into {} prefix groups", prefix_groups.len());

    let group_count = prefix_groups.len();
    for (group_idx, (prefix, group)) in prefix_groups.iter().enumerate() {
        if group.len() < 2 {
            continue;
        }
        if group.len() >= 10 {
            info!(
                "  [{}/{}] Prefix '{}': {} tracks",
                group_idx + 1,
                group_count,
                prefix,
                group.len()
            );
        }

        let full_names: Vec<String> = group.iter().map(|c| c.track.full_name().to_lowercase()).collect();
        for i in 0..group.len() {
            for j in (i + 1)..group.len() {
                comparisons += 1;
                let (track1, track2) = (&group[i].track, &group[j].track);
                let score = similarity::token_set_ratio(&full_names[i], &full_names[j]);
                if score < threshold || track1.id == track2.id {
                    continue;
                }
                let key = pair_key(&track1.id, &track2.id);
                if seen_pairs.contains(&key) {
                    continue;
                }
                if is_likely_false_positive(&track1.name, &track2.name, &track1.artists, &track2.artists) {
                    debug!("Ignoring likely false positive: {} / {}", track1.name, track2.name);
                    continue;
                }
                seen_pairs.insert(key);

                let best = best_score(
                    &full_names[i],
                    &full_names[j],
                    (score, RatioKind::TokenSetRatio),
                    &[RatioKind::Ratio, RatioKind::PartialRatio, RatioKind::TokenSortRatio],
                );
                duplicates.push(name_duplicate(track1, track2, best));
            }
        }
    }
    let pass1_matches = duplicates.len();
    info!("Pass 1 completed: {} matches found", pass1_matches);

    info!("Pass 2: Checking tracks with shared artists across different prefixes");
    let mut artist_index: BTreeMap<String, Vec<&Candidate>> = BTreeMap::new();
    for candidate in &candidates {
        for artist in candidate.track.artists.split(',') {
            let artist = artist.trim().to_lowercase();
            if !artist.is_empty() {
                artist_index.entry(artist).or_default().push(candidate);
            }
        }
    }
    info!("  Indexed {} unique artists", artist_index.len());

    let mut pairs: Vec<(&Candidate, &Candidate)> = Vec::new();
    let mut queued: HashSet<(String, String)> = HashSet::new();
    for tracks in artist_index.values() {
        for (i, first) in tracks.iter().enumerate() {
            for second in &tracks[i + 1..] {
                if first.track.id == second.track.id || first.name_prefix == second.name_prefix {
                    continue;
                }
                let key = pair_key(&first.track.id, &second.track.id);
                if seen_pairs.contains(&key) || !queued.insert(key) {
                    continue;
                }
                pairs.push((first, second));
            }
        }
    }
    info!("  Found {} cross-prefix pairs to check", pairs.len());
    comparisons += pairs.len();

    let pass2_threshold = (threshold - 5.0).max(90.0);
    for (first, second) in pairs {
        let (track1, track2) = (&first.track, &second.track);
        let name1 = track1.name.to_lowercase();
        let name2 = track2.name.to_lowercase();

        let score = similarity::partial_ratio(&name1, &name2);
        if score < pass2_threshold {
            continue;
        }
        if is_likely_false_positive(&track1.name, &track2.name, &track1.artists, &track2.artists) {
            debug!("Ignoring likely false positive: {} / {}", track1.name, track2.name);
            continue;
        }
        seen_pairs.insert(pair_key(&track1.id, &track2.id));

        let best = best_score(
            &name1,
            &name2,
            (score, RatioKind::PartialRatio),
            &[RatioKind::Ratio, RatioKind::TokenSortRatio, RatioKind::TokenSetRatio],
        );
        duplicates.push(name_duplicate(track1, track2, best));
    }
    info!(
        "Pass 2 completed: {} additional matches found",
        duplicates.len() - pass1_matches
    );

    duplicates.sort_by(|a, b| b.score.total_cmp(&a.score));
    info!(
        "Completed in {:.1}s - {} comparisons, {} matches found",
        start.elapsed().as_secs_f64(),
        comparisons,
        duplicates.len()
    );
    Ok(duplicates)
}
