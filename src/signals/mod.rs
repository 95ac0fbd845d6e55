// =============================================================================
// Signals Module
// =============================================================================
//
// Weak-signal pipeline feeding the fusion strategies:
// - Weak signals and their convenience builders
// - Correlator (category / temporal / cross-source / trend passes)
// - Alerts attached to the tactical decision

pub mod alerts;
pub mod correlator;
pub mod weak_signal;

pub use alerts::{AlertThresholds, SignalAlert};
pub use correlator::{
    Correlation, CorrelationKind, CorrelatorConfig, CorrelatorHandle, RiskType, WeakSignalCorrelator,
};
pub use weak_signal::WeakSignal;
