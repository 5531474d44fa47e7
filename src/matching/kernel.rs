//! Similarity kernel: cosine similarity and haversine distance.
//!
//! Both functions are total. Malformed input degrades to a conservative value
//! (`0.0` similarity, infinite distance) so bad data can never block a scan.

use super::types::Coordinate;

/// Mean Earth radius in miles.
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Cosine similarity in `[-1, 1]`.
///
/// Returns `0.0` when the vectors differ in length, either is empty, either
/// has zero norm, or the result is not finite.
pub fn vector_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    if score.is_finite() {
        score.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Highest similarity across the Cartesian product of two embedding sets.
/// `0.0` if either side has no embeddings.
pub fn best_similarity(a: &[Vec<f32>], b: &[Vec<f32>]) -> f64 {
    let mut best: Option<f64> = None;
    for x in a {
        for y in b {
            let s = vector_similarity(x, y);
            best = Some(best.map_or(s, |b| b.max(s)));
        }
    }
    best.unwrap_or(0.0)
}

/// Great-circle distance in miles between two coordinates.
pub fn haversine_miles(from: Coordinate, to: Coordinate) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_MILES * c
}

/// Distance between two optional locations; infinite if either is missing,
/// so such pairs fail any finite max-distance filter.
pub fn geo_distance(from: Option<Coordinate>, to: Option<Coordinate>) -> f64 {
    match (from, to) {
        (Some(a), Some(b)) => haversine_miles(a, b),
        _ => f64::INFINITY,
    }
}
