// =============================================================================
// Fusion Module
// =============================================================================
//
// The three fusion strategies and the distribution helpers they share:
// - Dempster-Shafer belief combination (pignistic decision)
// - Bayesian sequential updating (posterior decision)
// - Weighted-average risk/profit scoring (escalates on Critical alerts)

pub mod bayesian;
pub mod dempster_shafer;
pub mod distribution;
pub mod weighted;

pub use bayesian::{BayesianEngine, BayesianResult};
pub use dempster_shafer::{DempsterShaferEngine, DstResult};
pub use distribution::ScoreMap;
pub use weighted::{WeightedAverageEngine, WeightedConfig, WeightedResult};
