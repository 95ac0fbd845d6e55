// =============================================================================
// Fusion Nexus — multi-strategy evidence fusion
// =============================================================================
//
// Three fusion strategies (weighted average, Dempster-Shafer, Bayesian) score
// the same candidate scenarios; a meta-fusion layer votes across them and
// emits a tactical decision with an explanation.
// =============================================================================

pub mod decision_envelope;
pub mod error;
pub mod evidence;
pub mod fusion;
pub mod meta_fusion;
pub mod runtime_config;
pub mod signals;
pub mod strategy;
pub mod types;

pub use decision_envelope::{DecisionRecord, MetaFusionResult, PredictedOutcome, TacticalDecision};
pub use error::{FusionError, Result};
pub use evidence::{BayesianEvidence, DstEvidence, Evidence, EvidenceBuilder};
pub use meta_fusion::{FusionRequest, MultiStrategyEngine};
pub use runtime_config::{EngineConfig, Preset, StrategyWeights};
pub use signals::{SignalAlert, WeakSignal, WeakSignalCorrelator};
pub use strategy::{StrategyKind, StrategyResult};
pub use types::{FinancialData, HistoricalPattern, KnowledgeGraphContext, Priority, RiskLevel, Scenario};
