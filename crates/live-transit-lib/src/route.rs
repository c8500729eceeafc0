//! Route geometry storage module
//!
//! This module provides the `RouteGeometry` struct: an immutable road polyline with
//! precomputed metadata (cumulative lengths, bounding box, haversine length) so that
//! snapping and walking never recompute them per frame.

use crate::snap::{self, ProjectedPosition};
use crate::{Result, RouteId, TransitError, polyline, utils};
use geo::{Coord, Rect};
use std::sync::Arc;

/// A single route shape with raw vertices and precomputed metadata
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RouteGeometry {
    /// Route identifier
    id: RouteId,
    /// Ordered `(longitude, latitude)` vertices
    vertices: Vec<Coord<f64>>,
    /// Planar cumulative length at each vertex (same length as `vertices`)
    cumulative_lengths: Vec<f64>,
    /// Precomputed bounding box in degrees
    bounding_box: Rect<f64>,
    /// Cached total length in meters (haversine)
    cached_length_meters: f64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RouteGeometry {
    /// Create a route from `(longitude, latitude)` vertices
    ///
    /// Vertices outside WGS84 bounds are skipped with a warning. Fewer than 2 remaining
    /// vertices, or a route with zero length, is an error.
    pub fn from_coords(id: impl Into<RouteId>, coords: Vec<Coord<f64>>) -> Result<Arc<Self>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("route::from_coords");

        let id = id.into();
        if coords.is_empty() {
            return Err(TransitError::EmptyRoute);
        }

        let vertices: Vec<Coord<f64>> = coords
            .into_iter()
            .filter(|coord| {
                let valid = utils::is_valid_coord(*coord);
                if !valid {
                    tracing::warn!(
                        "Skipping invalid vertex on route {}: ({}, {})",
                        id,
                        coord.y,
                        coord.x
                    );
                }
                valid
            })
            .collect();

        if vertices.len() < 2 {
            return Err(TransitError::InvalidGeometry(format!(
                "route {id} needs at least 2 valid vertices, got {}",
                vertices.len()
            )));
        }

        let (bounding_box, length_meters) = Self::compute_metadata(&vertices);
        let cumulative_lengths = snap::cumulative_lengths(&vertices);
        if cumulative_lengths.last().copied().unwrap_or(0.0) <= 0.0 {
            return Err(TransitError::InvalidGeometry(format!(
                "route {id} has zero length"
            )));
        }

        Ok(Arc::new(RouteGeometry {
            id,
            vertices,
            cumulative_lengths,
            bounding_box,
            cached_length_meters: length_meters,
        }))
    }

    /// Create a route from `[longitude, latitude]` pairs
    pub fn from_lng_lat_pairs(id: impl Into<RouteId>, pairs: &[[f64; 2]]) -> Result<Arc<Self>> {
        let coords = pairs.iter().map(|[lng, lat]| Coord { x: *lng, y: *lat }).collect();
        Self::from_coords(id, coords)
    }

    /// Create a route from an encoded polyline string
    pub fn from_encoded(id: impl Into<RouteId>, encoded: &str) -> Result<Arc<Self>> {
        let coords = polyline::decode_polyline(encoded)?;
        Self::from_coords(id, coords)
    }

    /// Create a route from GPX data, concatenating every track segment in order
    pub fn from_gpx(id: impl Into<RouteId>, gpx_data: &gpx::Gpx) -> Result<Arc<Self>> {
        let coords: Vec<Coord<f64>> = gpx_data
            .tracks
            .iter()
            .flat_map(|track| &track.segments)
            .flat_map(|segment| &segment.points)
            .map(|waypoint| {
                let point = waypoint.point();
                Coord {
                    x: point.x(),
                    y: point.y(),
                }
            })
            .collect();
        Self::from_coords(id, coords)
    }

    /// Compute the bounding box and haversine length in a single pass
    fn compute_metadata(vertices: &[Coord<f64>]) -> (Rect<f64>, f64) {
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        let mut length = 0.0;
        let mut prev: Option<Coord<f64>> = None;

        for &vertex in vertices {
            min_x = min_x.min(vertex.x);
            min_y = min_y.min(vertex.y);
            max_x = max_x.max(vertex.x);
            max_y = max_y.max(vertex.y);

            if let Some(prev) = prev {
                length += utils::haversine_distance(prev, vertex);
            }
            prev = Some(vertex);
        }

        let bounding_box = Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y });
        (bounding_box, length)
    }

    /// Route identifier
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Ordered `(longitude, latitude)` vertices
    #[inline]
    pub fn vertices(&self) -> &[Coord<f64>] {
        &self.vertices
    }

    /// Number of vertices
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Bounding box in degrees (`x` = longitude, `y` = latitude)
    #[inline]
    pub fn bounding_box(&self) -> Rect<f64> {
        self.bounding_box
    }

    /// Total length in meters
    ///
    /// This is O(1) as the value is cached during construction.
    #[inline]
    pub fn length_meters(&self) -> f64 {
        self.cached_length_meters
    }

    /// Snap a point onto this route. See [`snap::snap_to_polyline`].
    #[inline]
    pub fn snap(&self, point: Coord<f64>) -> Option<ProjectedPosition> {
        snap::snap_with_lengths(point, &self.vertices, &self.cumulative_lengths)
    }

    /// Point at a blended path fraction. See [`snap::walk_polyline`].
    #[inline]
    pub fn walk(&self, from_fraction: f64, to_fraction: f64, progress: f64) -> Option<Coord<f64>> {
        snap::walk_with_lengths(
            &self.vertices,
            &self.cumulative_lengths,
            from_fraction,
            to_fraction,
            progress,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpx::{Gpx, Track, TrackSegment, Waypoint};

    fn create_test_waypoint(lat: f64, lon: f64) -> Waypoint {
        Waypoint::new(geo::Point::new(lon, lat))
    }

    fn create_test_gpx() -> Gpx {
        let mut gpx = Gpx::default();
        let mut track = Track::default();
        let mut first = TrackSegment::default();
        let mut second = TrackSegment::default();

        first.points.push(create_test_waypoint(17.40, 78.40));
        first.points.push(create_test_waypoint(17.40, 78.41));
        second.points.push(create_test_waypoint(17.40, 78.42));

        track.segments.push(first);
        track.segments.push(second);
        gpx.tracks.push(track);
        gpx
    }

    #[test]
    fn test_route_from_pairs() {
        let route =
            RouteGeometry::from_lng_lat_pairs("10H", &[[78.40, 17.40], [78.41, 17.40]]).unwrap();
        assert_eq!(route.id(), "10H");
        assert_eq!(route.vertex_count(), 2);
        // ~1.06 km along the parallel at 17.4N
        assert!(route.length_meters() > 1000.0 && route.length_meters() < 1100.0);
    }

    #[test]
    fn test_empty_route_fails() {
        assert!(matches!(
            RouteGeometry::from_coords("x", Vec::new()),
            Err(TransitError::EmptyRoute)
        ));
    }

    #[test]
    fn test_single_vertex_fails() {
        let result = RouteGeometry::from_lng_lat_pairs("x", &[[78.40, 17.40]]);
        assert!(matches!(result, Err(TransitError::InvalidGeometry(_))));
    }

    #[test]
    fn test_invalid_vertices_skipped() {
        let route = RouteGeometry::from_lng_lat_pairs(
            "x",
            &[[78.40, 17.40], [f64::NAN, 17.40], [78.41, 95.0], [78.41, 17.40]],
        )
        .unwrap();
        assert_eq!(route.vertex_count(), 2);
    }

    #[test]
    fn test_zero_length_fails() {
        let result = RouteGeometry::from_lng_lat_pairs("x", &[[78.40, 17.40], [78.40, 17.40]]);
        assert!(matches!(result, Err(TransitError::InvalidGeometry(_))));
    }

    #[test]
    fn test_from_encoded() {
        let route = RouteGeometry::from_encoded("ref", "_p~iF~ps|U_ulLnnqC_mqNvxq`@").unwrap();
        assert_eq!(route.vertex_count(), 3);
        assert!((route.vertices()[0].x + 120.2).abs() < 1e-9);
    }

    #[test]
    fn test_from_encoded_propagates_decode_error() {
        let result = RouteGeometry::from_encoded("ref", "_p~iF");
        assert!(matches!(result, Err(TransitError::PolylineDecode { .. })));
    }

    #[test]
    fn test_from_gpx_concatenates_segments() {
        let route = RouteGeometry::from_gpx("gpx", &create_test_gpx()).unwrap();
        assert_eq!(route.vertex_count(), 3);
        assert!((route.vertices()[2].x - 78.42).abs() < 1e-12);
    }

    #[test]
    fn test_bounding_box() {
        let route = RouteGeometry::from_gpx("gpx", &create_test_gpx()).unwrap();
        let bbox = route.bounding_box();
        assert!((bbox.width() - 0.02).abs() < 1e-9);
        assert_eq!(bbox.height(), 0.0);
    }

    #[test]
    fn test_snap_and_walk_match_free_functions() {
        let route = RouteGeometry::from_gpx("gpx", &create_test_gpx()).unwrap();
        let point = Coord { x: 78.405, y: 17.41 };
        assert_eq!(
            route.snap(point),
            snap::snap_to_polyline(point, route.vertices())
        );
        assert_eq!(
            route.walk(0.1, 0.9, 0.5),
            snap::walk_polyline(route.vertices(), 0.1, 0.9, 0.5)
        );
    }
}
