pub mod movement;
pub mod orientation;
pub mod preprocess;

pub use movement::{MovementClassifier, MovementState};
pub use orientation::{OrientationEstimator, OrientationState};
pub use preprocess::{GravityFilter, SensorCalibration, SensorPreprocessor};
