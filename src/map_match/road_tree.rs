use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

use crate::geodesy;

/// Straight road piece between two coordinates
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoadSegment {
    pub id: i64,
    pub start_lat: f64,
    pub start_lon: f64,
    pub end_lat: f64,
    pub end_lon: f64,
}

impl RoadSegment {
    pub fn new(id: i64, start_lat: f64, start_lon: f64, end_lat: f64, end_lon: f64) -> Self {
        Self {
            id,
            start_lat,
            start_lon,
            end_lat,
            end_lon,
        }
    }

    /// Axis-aligned box around the two endpoints. A filter only, never the shape.
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox {
            min_lat: self.start_lat.min(self.end_lat),
            max_lat: self.start_lat.max(self.end_lat),
            min_lon: self.start_lon.min(self.end_lon),
            max_lon: self.start_lon.max(self.end_lon),
        }
    }

    /// Forward direction start → end, degrees in [0, 360)
    pub fn bearing(&self) -> f64 {
        geodesy::planar_bearing(self.start_lat, self.start_lon, self.end_lat, self.end_lon)
    }

    pub fn length_m(&self) -> f64 {
        geodesy::haversine_distance(self.start_lat, self.start_lon, self.end_lat, self.end_lon)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Square search box of ±`radius_m` converted with the flat 111 km/deg rule
    pub fn around(lat: f64, lon: f64, radius_m: f64) -> Self {
        let radius_deg = geodesy::meters_to_degrees(radius_m);
        Self {
            min_lat: lat - radius_deg,
            max_lat: lat + radius_deg,
            min_lon: lon - radius_deg,
            max_lon: lon + radius_deg,
        }
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
            && self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
    }

    // rstar works in (x, y) = (lon, lat)
    fn to_aabb(self) -> AABB<[f64; 2]> {
        AABB::from_corners([self.min_lon, self.min_lat], [self.max_lon, self.max_lat])
    }
}

/// What the road snapper needs from a segment store
pub trait SpatialIndex {
    fn insert(&mut self, segment: RoadSegment);

    /// Segments whose bounding box intersects `bbox`, at most `limit` of them,
    /// in no particular order
    fn query(&self, bbox: &BoundingBox, limit: usize) -> Vec<&RoadSegment>;
}

/// Wrapper for RoadSegment with spatial indexing envelope
#[derive(Clone, Debug)]
pub struct SpatialRoadSegment {
    pub segment: RoadSegment,
    pub envelope: AABB<[f64; 2]>,
}

impl SpatialRoadSegment {
    fn new(segment: RoadSegment) -> Self {
        let envelope = segment.bbox().to_aabb();
        Self { segment, envelope }
    }
}

impl RTreeObject for SpatialRoadSegment {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-Tree spatial index over road segments
///
/// # Architecture
/// - Indexes RoadSegments by bounding box (envelope)
/// - Envelope intersection queries are O(log n) plus the number of hits
///
/// # Usage
/// ```no_run
/// use location_fusion_rs::map_match::{BoundingBox, RoadSegment, RoadTree, SpatialIndex};
///
/// let tree = RoadTree::from_segments(vec![RoadSegment::new(1, 45.0, 7.0, 45.0, 7.001)]);
/// let hits = tree.query(&BoundingBox::around(45.0, 7.0005, 50.0), 100);
/// ```
pub struct RoadTree {
    tree: RTree<SpatialRoadSegment>,
    segment_count: usize,
}

impl RoadTree {
    /// Create empty R-Tree
    pub fn new() -> Self {
        RoadTree {
            tree: RTree::new(),
            segment_count: 0,
        }
    }

    /// Bulk-load a collection of segments
    pub fn from_segments(segments: Vec<RoadSegment>) -> Self {
        let spatial_segments: Vec<SpatialRoadSegment> =
            segments.into_iter().map(SpatialRoadSegment::new).collect();
        let segment_count = spatial_segments.len();

        RoadTree {
            tree: RTree::bulk_load(spatial_segments),
            segment_count,
        }
    }

    /// Total segments in tree
    pub fn segment_count(&self) -> usize {
        self.segment_count
    }

    pub fn clear(&mut self) {
        self.tree = RTree::new();
        self.segment_count = 0;
    }

    /// All segments whose envelopes intersect the box, uncapped
    pub fn segments_in_bbox(&self, bbox: &BoundingBox) -> Vec<&RoadSegment> {
        self.tree
            .locate_in_envelope_intersecting(&bbox.to_aabb())
            .map(|spatial_seg| &spatial_seg.segment)
            .collect()
    }
}

impl SpatialIndex for RoadTree {
    fn insert(&mut self, segment: RoadSegment) {
        self.tree.insert(SpatialRoadSegment::new(segment));
        self.segment_count += 1;
    }

    fn query(&self, bbox: &BoundingBox, limit: usize) -> Vec<&RoadSegment> {
        self.tree
            .locate_in_envelope_intersecting(&bbox.to_aabb())
            .take(limit)
            .map(|spatial_seg| &spatial_seg.segment)
            .collect()
    }
}

impl Default for RoadTree {
    fn default() -> Self {
        Self::new()
    }
}
