//! Geodesy helpers shared by the classifier, integrator and road snapper.
//!
//! Distances that matter for decisions (teleport speed, snap acceptance) are
//! great-circle. Search boxes and dead-reckoning steps use the flat
//! 111 km-per-degree approximation; both are small-radius operations.

use geo::{HaversineDistance, Point};

use crate::types::METERS_PER_DEGREE;

/// Great-circle distance in meters
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    // geo crate uses Point(lon, lat)
    Point::new(lon1, lat1).haversine_distance(&Point::new(lon2, lat2))
}

/// Signed difference `to - from` in degrees, normalized to [-180, 180)
pub fn angle_difference(from: f64, to: f64) -> f64 {
    (to - from + 180.0).rem_euclid(360.0) - 180.0
}

/// Map any bearing in degrees to [0, 360)
pub fn normalize_bearing(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Bearing of a segment treated as planar lat/lon: `atan2(Δlon, Δlat)` in [0, 360)
pub fn planar_bearing(start_lat: f64, start_lon: f64, end_lat: f64, end_lon: f64) -> f64 {
    let d_lon = end_lon - start_lon;
    let d_lat = end_lat - start_lat;
    normalize_bearing(d_lon.atan2(d_lat).to_degrees())
}

/// Closest point on segment A→B to point P in raw degree space
///
/// # Returns
/// (lat, lon, t) where t ∈ [0, 1] is the clamped scalar projection.
/// A zero-length segment projects everything onto A.
pub fn project_to_segment(
    point: (f64, f64),
    start: (f64, f64),
    end: (f64, f64),
) -> (f64, f64, f64) {
    let ab_lat = end.0 - start.0;
    let ab_lon = end.1 - start.1;
    let ap_lat = point.0 - start.0;
    let ap_lon = point.1 - start.1;

    let ab_len_sq = ab_lat * ab_lat + ab_lon * ab_lon;
    if ab_len_sq <= f64::EPSILON * f64::EPSILON {
        return (start.0, start.1, 0.0);
    }

    let t = ((ap_lat * ab_lat + ap_lon * ab_lon) / ab_len_sq).clamp(0.0, 1.0);
    (start.0 + t * ab_lat, start.1 + t * ab_lon, t)
}

/// Rough meters → degrees conversion used for search boxes
pub fn meters_to_degrees(meters: f64) -> f64 {
    meters / METERS_PER_DEGREE
}

/// Move a position by local north/east displacements (flat-earth)
///
/// Near the poles cos(lat) vanishes; the longitude step is skipped there
/// rather than dividing by ~0.
pub fn offset_position(lat: f64, lon: f64, north_m: f64, east_m: f64) -> (f64, f64) {
    let d_lat = north_m / METERS_PER_DEGREE;
    let cos_lat = lat.to_radians().cos();
    let d_lon = if cos_lat.abs() > 1e-9 {
        east_m / (METERS_PER_DEGREE * cos_lat)
    } else {
        0.0
    };
    (lat + d_lat, lon + d_lon)
}
