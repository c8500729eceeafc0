//! Road snapping: projection of raw coordinates onto route polylines
//!
//! All math is planar in `(longitude, latitude)` degrees. At city scale the flat-earth error
//! is far below GPS noise, so no geodesic correction is applied.

use crate::utils::{clamp_unit, planar_distance};
use geo::Coord;

/// Segments shorter than this (squared, in degrees²) are treated as a single vertex
const DEGENERATE_SEGMENT_SQ: f64 = 1e-18;

/// Result of snapping a point onto a polyline
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProjectedPosition {
    pub longitude: f64,
    pub latitude: f64,
    /// Index of the winning segment (vertex `i` to vertex `i + 1`)
    pub segment_index: usize,
    /// Position along the winning segment, in [0, 1]
    pub segment_fraction: f64,
    /// Position along the whole polyline by length, in [0, 1]
    pub path_fraction: f64,
}

impl ProjectedPosition {
    /// The snapped point as a coordinate
    #[inline]
    pub fn coord(&self) -> Coord<f64> {
        Coord {
            x: self.longitude,
            y: self.latitude,
        }
    }
}

/// Cumulative planar length at every vertex; `result[0] == 0`, last entry is the total
pub fn cumulative_lengths(polyline: &[Coord<f64>]) -> Vec<f64> {
    let mut cumulative = Vec::with_capacity(polyline.len());
    let mut total = 0.0;
    cumulative.push(0.0);
    for pair in polyline.windows(2) {
        total += planar_distance(pair[0], pair[1]);
        cumulative.push(total);
    }
    if polyline.is_empty() {
        cumulative.clear();
    }
    cumulative
}

/// Snap `point` to the closest position on `polyline`
///
/// Returns `None` when the polyline has fewer than 2 vertices, has zero total length, or
/// the point is not finite. Exact distance ties keep the lowest segment index.
pub fn snap_to_polyline(point: Coord<f64>, polyline: &[Coord<f64>]) -> Option<ProjectedPosition> {
    if polyline.len() < 2 {
        return None;
    }
    snap_with_lengths(point, polyline, &cumulative_lengths(polyline))
}

/// Snap using precomputed cumulative lengths (see [`cumulative_lengths`])
pub(crate) fn snap_with_lengths(
    point: Coord<f64>,
    polyline: &[Coord<f64>],
    cumulative: &[f64],
) -> Option<ProjectedPosition> {
    if polyline.len() < 2 || cumulative.len() != polyline.len() {
        return None;
    }
    if !point.x.is_finite() || !point.y.is_finite() {
        return None;
    }
    let total = cumulative[cumulative.len() - 1];
    if !total.is_finite() || total <= 0.0 {
        return None;
    }

    let mut best: Option<(usize, f64, Coord<f64>, f64)> = None;

    for (index, pair) in polyline.windows(2).enumerate() {
        let (a, b) = (pair[0], pair[1]);
        let dx = b.x - a.x;
        let dy = b.y - a.y;
        let length_sq = dx * dx + dy * dy;

        let t = if length_sq < DEGENERATE_SEGMENT_SQ {
            0.0
        } else {
            clamp_unit(((point.x - a.x) * dx + (point.y - a.y) * dy) / length_sq)
        };

        let projected = Coord {
            x: a.x + t * dx,
            y: a.y + t * dy,
        };
        let ex = point.x - projected.x;
        let ey = point.y - projected.y;
        let distance_sq = ex * ex + ey * ey;

        // Strict comparison: the first segment wins exact ties
        if best.is_none_or(|(_, _, _, best_sq)| distance_sq < best_sq) {
            best = Some((index, t, projected, distance_sq));
        }
    }

    let (segment_index, segment_fraction, projected, _) = best?;
    let along = if segment_fraction >= 1.0 {
        cumulative[segment_index + 1]
    } else {
        let segment_length = cumulative[segment_index + 1] - cumulative[segment_index];
        cumulative[segment_index] + segment_fraction * segment_length
    };

    Some(ProjectedPosition {
        longitude: projected.x,
        latitude: projected.y,
        segment_index,
        segment_fraction,
        path_fraction: clamp_unit(along / total),
    })
}

/// Point at a blended fraction of the polyline's length
///
/// The fraction is `from + (to - from) * progress` with `progress` clamped to [0, 1].
/// Returns `None` when the polyline has fewer than 2 vertices.
pub fn walk_polyline(
    polyline: &[Coord<f64>],
    from_fraction: f64,
    to_fraction: f64,
    progress: f64,
) -> Option<Coord<f64>> {
    if polyline.len() < 2 {
        return None;
    }
    walk_with_lengths(
        polyline,
        &cumulative_lengths(polyline),
        from_fraction,
        to_fraction,
        progress,
    )
}

/// Walk using precomputed cumulative lengths (see [`cumulative_lengths`])
pub(crate) fn walk_with_lengths(
    polyline: &[Coord<f64>],
    cumulative: &[f64],
    from_fraction: f64,
    to_fraction: f64,
    progress: f64,
) -> Option<Coord<f64>> {
    if polyline.len() < 2 || cumulative.len() != polyline.len() {
        return None;
    }

    let progress = clamp_unit(progress);
    let from = clamp_unit(from_fraction);
    let to = clamp_unit(to_fraction);
    let fraction = clamp_unit(from + (to - from) * progress);

    let total = cumulative[cumulative.len() - 1];
    if !total.is_finite() || total <= 0.0 {
        return Some(polyline[0]);
    }
    if fraction <= 0.0 {
        return Some(polyline[0]);
    }
    if fraction >= 1.0 {
        return Some(polyline[polyline.len() - 1]);
    }

    let target = fraction * total;
    // First vertex whose cumulative length reaches the target distance
    let upper = cumulative.partition_point(|&length| length < target);
    let upper = upper.clamp(1, polyline.len() - 1);
    let lower = upper - 1;

    let segment_length = cumulative[upper] - cumulative[lower];
    if segment_length <= 0.0 {
        return Some(polyline[lower]);
    }
    let local = (target - cumulative[lower]) / segment_length;
    let (a, b) = (polyline[lower], polyline[upper]);
    Some(Coord {
        x: a.x + (b.x - a.x) * local,
        y: a.y + (b.y - a.y) * local,
    })
}
