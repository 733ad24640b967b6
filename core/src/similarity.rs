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

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The string similarity algorithms used to compare track names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioKind {
    Ratio,
    PartialRatio,
    TokenSortRatio,
    TokenSetRatio,
}

impl RatioKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RatioKind::Ratio => "ratio",
            RatioKind::PartialRatio => "partial_ratio",
            RatioKind::TokenSortRatio => "token_sort_ratio",
            RatioKind::TokenSetRatio => "token_set_ratio",
        }
    }

    pub fn score(&self, a: &str, b: &str) -> f64 {
        match self {
            RatioKind::Ratio => ratio(a, b),
            RatioKind::PartialRatio => partial_ratio(a, b),
            RatioKind::TokenSortRatio => token_sort_ratio(a, b),
            RatioKind::TokenSetRatio => token_set_ratio(a, b),
        }
    }
}

impl fmt::Display for RatioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Length of the longest common subsequence, one row at a time.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        let mut diagonal = 0;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                diagonal + 1
            } else {
                above.max(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}

fn indel_ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(a, b) as f64 / total as f64
}

/// Normalized InDel similarity on a 0-100 scale: `2 * LCS / (len_a + len_b)`.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    indel_ratio(&a, &b)
}

/// Best `ratio` of `needle` against the windows of `haystack`.
///
/// Windows run from the prefixes of `haystack`, through every full-length
/// window, to its suffixes. A window is only scored when its new edge
/// character appears in `needle`.
fn best_window(needle: &[char], haystack: &[char]) -> f64 {
    let (len1, len2) = (needle.len(), haystack.len());
    let in_needle = |c: &char| needle.contains(c);
    let mut best = 0.0_f64;

    let mut consider = |window: &[char]| {
        best = best.max(indel_ratio(needle, window));
        best >= 100.0
    };

    for end in 1..len1 {
        if in_needle(&haystack[end - 1]) && consider(&haystack[..end]) {
            return 100.0;
        }
    }
    for start in 0..len2 - len1 {
        if in_needle(&haystack[start + len1 - 1]) && consider(&haystack[start..start + len1]) {
            return 100.0;
        }
    }
    for start in len2 - len1..len2 {
        if in_needle(&haystack[start]) && consider(&haystack[start..]) {
            return 100.0;
        }
    }
    best
}

/// Best alignment of the shorter string inside the longer one.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 100.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let (shorter, longer) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    let score = best_window(shorter, longer);
    if score < 100.0 && shorter.len() == longer.len() {
        return score.max(best_window(longer, shorter));
    }
    score
}

fn sorted_tokens(value: &str) -> String {
    let mut tokens: Vec<&str> = value.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// `ratio` after sorting the whitespace-separated tokens of both strings.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

/// Compares the shared tokens against each side's leftovers.
///
/// Scores 100 whenever the token set of one string contains the other's.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let join = |set: Vec<&str>| set.join(" ");
    let sect = join(tokens_a.intersection(&tokens_b).copied().collect());
    let diff_ab = join(tokens_a.difference(&tokens_b).copied().collect());
    let diff_ba = join(tokens_b.difference(&tokens_a).copied().collect());

    if !sect.is_empty() && (diff_ab.is_empty() || diff_ba.is_empty()) {
        return 100.0;
    }

    let combine = |diff: &str| {
        if sect.is_empty() {
            diff.to_string()
        } else {
            format!("{} {}", sect, diff)
        }
    };
    let combined_a = combine(&diff_ab);
    let combined_b = combine(&diff_ba);

    let mut best = ratio(&combined_a, &combined_b);
    if !sect.is_empty() {
        best = best
            .max(ratio(&sect, &combined_a))
            .max(ratio(&sect, &combined_b));
    }
    best
}
