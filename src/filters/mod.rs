pub mod dead_reckoning;

pub use dead_reckoning::{DeadReckoningIntegrator, IntegratorStats, NavigationState};
