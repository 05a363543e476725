//! Pairwise compatibility scoring

use std::collections::BTreeSet;
use tunelink_common::db::ListeningProfile;

pub const ARTIST_WEIGHT: f64 = 0.35;
pub const TRACK_WEIGHT: f64 = 0.25;
pub const GENRE_WEIGHT: f64 = 0.40;

/// Edges are persisted only for scores strictly above this
pub const MATCH_THRESHOLD: f64 = 10.0;

/// Shared items over the smaller set's size
///
/// The denominator is clamped to 1 so an empty side yields 0 instead of NaN.
pub fn overlap_ratio(a: &BTreeSet<i64>, b: &BTreeSet<i64>) -> f64 {
    let shared = a.intersection(b).count();
    let smaller = a.len().min(b.len()).max(1);
    shared as f64 / smaller as f64
}

/// Round half away from zero to two decimals
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Weighted score in `[0, 100]`, symmetric in its arguments
pub fn compatibility_score(a: &ListeningProfile, b: &ListeningProfile) -> f64 {
    let weighted = ARTIST_WEIGHT * overlap_ratio(&a.artists, &b.artists)
        + TRACK_WEIGHT * overlap_ratio(&a.tracks, &b.tracks)
        + GENRE_WEIGHT * overlap_ratio(&a.genres, &b.genres);

    round2(100.0 * weighted).clamp(0.0, 100.0)
}

pub fn exceeds_threshold(score: f64) -> bool {
    score > MATCH_THRESHOLD
}
