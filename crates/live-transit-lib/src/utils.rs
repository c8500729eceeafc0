//! Utility functions for coordinate math shared by snapping, interpolation and ranking

use geo::Coord;

/// Earth's mean radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Maximum valid latitude in degrees
pub const MAX_LATITUDE: f64 = 90.0;

/// Maximum valid longitude in degrees
pub const MAX_LONGITUDE: f64 = 180.0;

/// Build a `(longitude, latitude)` coordinate from latitude-first arguments
#[inline(always)]
pub fn lat_lng(lat: f64, lng: f64) -> Coord<f64> {
    Coord { x: lng, y: lat }
}

/// Check that a coordinate is finite and within WGS84 bounds
///
/// `x` is the longitude and `y` the latitude.
#[inline(always)]
pub fn is_valid_coord(coord: Coord<f64>) -> bool {
    coord.x.is_finite()
        && coord.y.is_finite()
        && coord.x.abs() <= MAX_LONGITUDE
        && coord.y.abs() <= MAX_LATITUDE
}

/// Calculate the Haversine distance between two coordinates in meters
#[inline]
pub fn haversine_distance(p1: Coord<f64>, p2: Coord<f64>) -> f64 {
    let lat1 = p1.y.to_radians();
    let lat2 = p2.y.to_radians();
    let delta_lat = (p2.y - p1.y).to_radians();
    let delta_lon = (p2.x - p1.x).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial great-circle bearing from `from` to `to`, in degrees within [0, 360)
#[inline]
pub fn bearing_degrees(from: Coord<f64>, to: Coord<f64>) -> f64 {
    let lat1 = from.y.to_radians();
    let lat2 = to.y.to_radians();
    let delta_lon = (to.x - from.x).to_radians();

    let y = delta_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();
    normalize_heading(y.atan2(x).to_degrees())
}

/// Wrap any heading into [0, 360). Non-finite input maps to 0.
#[inline(always)]
pub fn normalize_heading(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Linear blend between two coordinates
#[inline(always)]
pub fn lerp_coord(from: Coord<f64>, to: Coord<f64>, t: f64) -> Coord<f64> {
    Coord {
        x: from.x + (to.x - from.x) * t,
        y: from.y + (to.y - from.y) * t,
    }
}

/// Smoothstep easing: monotonic on [0, 1] with zero slope at both ends
///
/// Input is clamped, so consecutive interpolation windows always join at rest.
#[inline(always)]
pub fn smoothstep(t: f64) -> f64 {
    let t = clamp_unit(t);
    t * t * (3.0 - 2.0 * t)
}

/// Clamp to [0, 1], mapping NaN to 0
#[inline(always)]
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Planar (flat-earth) Euclidean distance in coordinate units
#[inline(always)]
pub fn planar_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_known_distance() {
        // One degree of latitude is roughly 111.2 km
        let d = haversine_distance(lat_lng(0.0, 0.0), lat_lng(1.0, 0.0));
        assert!((d - 111_195.0).abs() < 100.0);
    }

    #[test]
    fn test_haversine_zero() {
        let p = lat_lng(17.4, 78.4);
        assert_eq!(haversine_distance(p, p), 0.0);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = lat_lng(0.0, 0.0);
        assert!((bearing_degrees(origin, lat_lng(1.0, 0.0)) - 0.0).abs() < 1e-9);
        assert!((bearing_degrees(origin, lat_lng(0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!((bearing_degrees(origin, lat_lng(-1.0, 0.0)) - 180.0).abs() < 1e-9);
        assert!((bearing_degrees(origin, lat_lng(0.0, -1.0)) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_heading() {
        assert_eq!(normalize_heading(370.0), 10.0);
        assert_eq!(normalize_heading(-90.0), 270.0);
        assert_eq!(normalize_heading(f64::NAN), 0.0);
        assert_eq!(normalize_heading(360.0), 0.0);
    }

    #[test]
    fn test_smoothstep_endpoints_and_monotonic() {
        assert_eq!(smoothstep(0.0), 0.0);
        assert_eq!(smoothstep(1.0), 1.0);
        assert_eq!(smoothstep(0.5), 0.5);
        assert_eq!(smoothstep(-3.0), 0.0);
        assert_eq!(smoothstep(7.0), 1.0);

        let mut last = 0.0;
        for i in 1..=100 {
            let v = smoothstep(i as f64 / 100.0);
            assert!(v >= last);
            last = v;
        }
    }

    #[test]
    fn test_is_valid_coord() {
        assert!(is_valid_coord(lat_lng(17.4, 78.4)));
        assert!(!is_valid_coord(lat_lng(91.0, 0.0)));
        assert!(!is_valid_coord(lat_lng(0.0, 181.0)));
        assert!(!is_valid_coord(lat_lng(f64::NAN, 0.0)));
    }

    #[test]
    fn test_lerp_coord_midpoint() {
        let mid = lerp_coord(lat_lng(0.0, 0.0), lat_lng(2.0, 4.0), 0.5);
        assert_eq!(mid, lat_lng(1.0, 2.0));
    }
}
