use log::debug;
use serde::{Deserialize, Serialize};

use super::road_tree::{BoundingBox, RoadSegment, SpatialIndex};
use crate::config::SnapConfig;
use crate::geodesy;
use crate::types::{Fix, LocationSource};

/// Accepted snap with the diagnostics the plain [`Fix`] drops
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapResult {
    pub fix: Fix,
    pub segment_id: i64,
    pub distance_m: f64,
    /// Normalized position along the segment [0, 1]
    pub along_track: f64,
}

/// Projects a position onto the nearest road segment.
///
/// The search radius only selects candidates; acceptance uses the tighter
/// snap distance. Projection happens in raw lat/lon degrees; the accepted
/// distance is great-circle.
pub struct RoadSnapMatcher {
    config: SnapConfig,
}

impl RoadSnapMatcher {
    pub fn new(config: SnapConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SnapConfig {
        &self.config
    }

    pub fn snap<I: SpatialIndex + ?Sized>(&self, fix: &Fix, index: &I) -> Option<Fix> {
        self.snap_detailed(fix, index).map(|result| result.fix)
    }

    pub fn snap_detailed<I: SpatialIndex + ?Sized>(&self, fix: &Fix, index: &I) -> Option<SnapResult> {
        let bbox = BoundingBox::around(fix.latitude, fix.longitude, self.config.search_radius_m);
        let candidates = index.query(&bbox, self.config.max_candidates);

        let mut best: Option<(&RoadSegment, (f64, f64, f64), f64)> = None;
        for segment in candidates {
            let projected = geodesy::project_to_segment(
                (fix.latitude, fix.longitude),
                (segment.start_lat, segment.start_lon),
                (segment.end_lat, segment.end_lon),
            );
            let distance =
                geodesy::haversine_distance(fix.latitude, fix.longitude, projected.0, projected.1);

            if best.map_or(true, |(_, _, best_distance)| distance < best_distance) {
                best = Some((segment, projected, distance));
            }
        }

        let (segment, (lat, lon, along_track), distance) = best?;
        if distance >= self.config.max_snap_distance_m {
            debug!(
                "[snap] nearest segment {} is {:.1} m away, beyond {:.1} m",
                segment.id, distance, self.config.max_snap_distance_m
            );
            return None;
        }

        let mut snapped = fix
            .clone()
            .with_source(LocationSource::MapMatched)
            .with_bearing(segment.bearing() as f32);
        snapped.latitude = lat;
        snapped.longitude = lon;

        Some(SnapResult {
            fix: snapped,
            segment_id: segment.id,
            distance_m: distance,
            along_track,
        })
    }
}

impl Default for RoadSnapMatcher {
    fn default() -> Self {
        Self::new(SnapConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map_match::RoadTree;
    use approx::assert_abs_diff_eq;

    const METERS_PER_DEG_LAT: f64 = 111_195.0;

    /// Plain list index; ignores geometry beyond the bbox test
    struct ListIndex(Vec<RoadSegment>);

    impl SpatialIndex for ListIndex {
        fn insert(&mut self, segment: RoadSegment) {
            self.0.push(segment);
        }

        fn query(&self, bbox: &BoundingBox, limit: usize) -> Vec<&RoadSegment> {
            self.0.iter().filter(|s| s.bbox().intersects(bbox)).take(limit).collect()
        }
    }

    fn east_west_road() -> RoadTree {
        RoadTree::from_segments(vec![RoadSegment::new(7, 45.0, 7.0, 45.0, 7.001)])
    }

    #[test]
    fn test_midpoint_snaps_onto_segment() {
        let matcher = RoadSnapMatcher::default();
        let fix = Fix::satellite(45.0, 7.0005, 13.0, 10.0, 5_000).with_confidence(0.8);

        let result = matcher.snap_detailed(&fix, &east_west_road()).unwrap();
        assert_abs_diff_eq!(result.distance_m, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(result.along_track, 0.5, epsilon = 1e-9);
        assert_eq!(result.segment_id, 7);

        let snapped = result.fix;
        assert_eq!(snapped.source, LocationSource::MapMatched);
        assert_abs_diff_eq!(snapped.bearing, 90.0, epsilon = 1e-4);
        assert_eq!(snapped.speed, 13.0);
        assert_eq!(snapped.confidence, 0.8);
        assert_eq!(snapped.timestamp_millis, 5_000);
    }

    #[test]
    fn test_40m_away_is_rejected() {
        let matcher = RoadSnapMatcher::default();
        let fix = Fix::satellite(45.0 + 40.0 / METERS_PER_DEG_LAT, 7.0005, 0.0, 0.0, 0);
        assert!(matcher.snap(&fix, &east_west_road()).is_none());
    }

    #[test]
    fn test_20m_away_is_accepted() {
        let matcher = RoadSnapMatcher::default();
        let fix = Fix::satellite(45.0 + 20.0 / METERS_PER_DEG_LAT, 7.0005, 0.0, 0.0, 0);
        let result = matcher.snap_detailed(&fix, &east_west_road()).unwrap();
        assert_abs_diff_eq!(result.distance_m, 20.0, epsilon = 0.1);
        assert_abs_diff_eq!(result.fix.latitude, 45.0, epsilon = 1e-12);
    }

    #[test]
    fn test_picks_nearest_candidate() {
        let tree = RoadTree::from_segments(vec![
            RoadSegment::new(1, 45.0, 7.0, 45.0, 7.001),
            RoadSegment::new(2, 45.0002, 7.0, 45.0002, 7.001),
        ]);
        let fix = Fix::satellite(45.00015, 7.0005, 0.0, 0.0, 0);
        let result = RoadSnapMatcher::default().snap_detailed(&fix, &tree).unwrap();
        assert_eq!(result.segment_id, 2);
    }

    #[test]
    fn test_no_candidates() {
        let fix = Fix::satellite(10.0, 10.0, 0.0, 0.0, 0);
        assert!(RoadSnapMatcher::default().snap(&fix, &RoadTree::new()).is_none());
        assert!(RoadSnapMatcher::default().snap(&fix, &east_west_road()).is_none());
    }

    #[test]
    fn test_zero_length_segment_snaps_to_start() {
        let mut index = ListIndex(Vec::new());
        index.insert(RoadSegment::new(3, 45.0, 7.0, 45.0, 7.0));
        let fix = Fix::satellite(45.0 + 10.0 / METERS_PER_DEG_LAT, 7.0, 0.0, 0.0, 0);
        let result = RoadSnapMatcher::default().snap_detailed(&fix, &index).unwrap();
        assert_eq!((result.fix.latitude, result.fix.longitude), (45.0, 7.0));
        assert_abs_diff_eq!(result.distance_m, 10.0, epsilon = 0.1);
    }

    #[test]
    fn test_candidate_cap_is_passed_to_index() {
        // Nearest road is the 4th entry; with a cap of 3 it is never seen
        let mut segments: Vec<_> = (0..3)
            .map(|i| RoadSegment::new(i, 45.0001, 7.0, 45.0001, 7.001))
            .collect();
        segments.push(RoadSegment::new(99, 45.0, 7.0, 45.0, 7.001));
        let index = ListIndex(segments);

        let config = SnapConfig {
            max_candidates: 3,
            ..SnapConfig::default()
        };
        let fix = Fix::satellite(45.0, 7.0005, 0.0, 0.0, 0);
        let result = RoadSnapMatcher::new(config).snap_detailed(&fix, &index).unwrap();
        assert_eq!(result.segment_id, 0);
    }
}
