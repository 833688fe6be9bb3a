pub mod road_tree;
pub mod snapper;

pub use road_tree::{BoundingBox, RoadSegment, RoadTree, SpatialIndex, SpatialRoadSegment};
pub use snapper::{RoadSnapMatcher, SnapResult};
