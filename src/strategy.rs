// =============================================================================
// Strategies — the closed set of fusion algorithms behind one `run`
// =============================================================================
//
// Every strategy sees identical inputs and answers with a `StrategyResult`:
// a recommended scenario, a confidence in [0, 1], a normalized score map and
// its own diagnostics.
//
// Evidence:
//   - Explicit `Evidence` in the inputs feeds the strategy it belongs to
//     (DST variants -> Dempster-Shafer, Bayesian variants -> Bayesian).
//   - A belief strategy with no explicit evidence of its kind derives its
//     sources from the financial data with the EvidenceBuilder.
// =============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::evidence::{BayesianEvidence, DstEvidence, Evidence, EvidenceBuilder};
use crate::fusion::distribution::ScoreMap;
use crate::fusion::{BayesianEngine, DempsterShaferEngine, WeightedAverageEngine, WeightedConfig};
use crate::signals::SignalAlert;
use crate::types::{scenario_ids, FinancialData, KnowledgeGraphContext, Priority, Scenario};

// =============================================================================
// StrategyKind
// =============================================================================

/// The fusion strategies, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    WeightedAverage,
    DempsterShafer,
    Bayesian,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [Self::WeightedAverage, Self::DempsterShafer, Self::Bayesian];

    pub fn display_name(self) -> &'static str {
        match self {
            Self::WeightedAverage => "Weighted Average",
            Self::DempsterShafer => "Dempster-Shafer Theory",
            Self::Bayesian => "Bayesian Inference",
        }
    }

    /// Run this strategy against `inputs`.
    pub fn run(self, inputs: &StrategyInputs) -> Result<StrategyResult> {
        let result = match self {
            Self::WeightedAverage => run_weighted_average(inputs),
            Self::DempsterShafer => run_dempster_shafer(inputs),
            Self::Bayesian => run_bayesian(inputs),
        }?;

        debug!(
            strategy = %self,
            recommended = %result.recommended_scenario,
            confidence = format!("{:.4}", result.confidence),
            "Strategy finished"
        );
        Ok(result)
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Sort and deduplicate a strategy selection into canonical order.
pub fn canonical(selection: &[StrategyKind]) -> Vec<StrategyKind> {
    let mut kinds = selection.to_vec();
    kinds.sort();
    kinds.dedup();
    kinds
}

// =============================================================================
// Inputs & results
// =============================================================================

/// Everything a strategy may look at. Owned so it can move onto a worker.
#[derive(Debug, Clone)]
pub struct StrategyInputs {
    pub scenarios: Vec<Scenario>,
    pub financial_data: FinancialData,
    pub context: KnowledgeGraphContext,
    /// Weak-signal alerts known at decision time.
    pub alerts: Vec<SignalAlert>,
    /// Explicit evidence; empty means "derive from the financial data".
    pub evidence: Vec<Evidence>,
    pub weighted: WeightedConfig,
    /// Explicit Bayesian prior; uniform when absent.
    pub prior: Option<ScoreMap>,
}

impl StrategyInputs {
    fn dst_sources(&self) -> Result<Vec<DstEvidence>> {
        let (explicit, _) = Evidence::partition(&self.evidence);
        if !explicit.is_empty() {
            return Ok(explicit);
        }
        let builder = EvidenceBuilder::for_scenarios(&self.scenarios)?;
        Ok(builder.dst_from_inputs(&self.financial_data, &self.context, &self.scenarios))
    }

    fn bayes_sources(&self) -> Result<Vec<BayesianEvidence>> {
        let (_, explicit) = Evidence::partition(&self.evidence);
        if !explicit.is_empty() {
            return Ok(explicit);
        }
        let builder = EvidenceBuilder::for_scenarios(&self.scenarios)?;
        Ok(builder.bayes_from_inputs(&self.financial_data, &self.context, &self.scenarios))
    }
}

/// Strategy-specific diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategyDiagnostics {
    WeightedAverage {
        risk_weight: f64,
        profitability_weight: f64,
        weak_signals_count: usize,
        priority: Priority,
    },
    DempsterShafer {
        conflict_degree: f64,
        max_step_conflict: f64,
        belief: ScoreMap,
        plausibility: ScoreMap,
        uncertainty_intervals: BTreeMap<String, (f64, f64)>,
        sources: Vec<String>,
    },
    Bayesian {
        entropy: f64,
        kl_divergence: f64,
        /// Non-finite factors serialize as null.
        bayes_factors: BTreeMap<String, f64>,
        prior: ScoreMap,
        evidence_updates: usize,
        log_likelihood: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyResult {
    pub strategy: StrategyKind,
    pub recommended_scenario: String,
    pub confidence: f64,
    /// Normalized; sums to 1.
    pub scenario_scores: ScoreMap,
    pub diagnostics: StrategyDiagnostics,
}

// =============================================================================
// Runners
// =============================================================================

fn run_weighted_average(inputs: &StrategyInputs) -> Result<StrategyResult> {
    let engine = WeightedAverageEngine::new(inputs.weighted.clone());
    let r = engine.score(&inputs.scenarios, &inputs.alerts)?;

    Ok(StrategyResult {
        strategy: StrategyKind::WeightedAverage,
        recommended_scenario: r.decision,
        confidence: r.confidence,
        scenario_scores: r.scores,
        diagnostics: StrategyDiagnostics::WeightedAverage {
            risk_weight: r.effective_risk_weight,
            profitability_weight: r.profit_weight,
            weak_signals_count: r.alert_count,
            priority: r.priority,
        },
    })
}

fn run_dempster_shafer(inputs: &StrategyInputs) -> Result<StrategyResult> {
    let engine = DempsterShaferEngine::new(scenario_ids(&inputs.scenarios))?;
    let r = engine.fuse(&inputs.dst_sources()?)?;

    Ok(StrategyResult {
        strategy: StrategyKind::DempsterShafer,
        recommended_scenario: r.decision,
        confidence: r.confidence,
        scenario_scores: r.pignistic,
        diagnostics: StrategyDiagnostics::DempsterShafer {
            conflict_degree: r.cumulative_conflict,
            max_step_conflict: r.max_step_conflict,
            belief: r.belief,
            plausibility: r.plausibility,
            uncertainty_intervals: r.intervals,
            sources: r.sources,
        },
    })
}

fn run_bayesian(inputs: &StrategyInputs) -> Result<StrategyResult> {
    let engine = BayesianEngine::new(scenario_ids(&inputs.scenarios), inputs.prior.clone())?;
    let r = engine.fuse(&inputs.bayes_sources()?)?;

    Ok(StrategyResult {
        strategy: StrategyKind::Bayesian,
        recommended_scenario: r.decision,
        confidence: r.confidence,
        scenario_scores: r.posterior,
        diagnostics: StrategyDiagnostics::Bayesian {
            entropy: r.entropy,
            kl_divergence: r.kl_divergence,
            bayes_factors: r.bayes_factors,
            prior: r.prior,
            evidence_updates: r.evidence_trail.len().saturating_sub(1),
            log_likelihood: r.log_likelihood,
        },
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FusionError;

    fn inputs() -> StrategyInputs {
        StrategyInputs {
            scenarios: vec![
                Scenario::new("A", "Aggressive collection", -20.0, 0.0, 0.85, 30),
                Scenario::new("B", "Early payment discount", 0.0, -5.0, 0.90, 30),
                Scenario::new("C", "Partial hedge", -10.0, -2.0, 0.70, 60),
            ],
            financial_data: FinancialData::new("ACME", 15.0, -12.0, 5.0),
            context: KnowledgeGraphContext::new("restructuring"),
            alerts: Vec::new(),
            evidence: Vec::new(),
            weighted: WeightedConfig::default(),
            prior: None,
        }
    }

    #[test]
    fn canonical_order_and_dedup() {
        let kinds = canonical(&[StrategyKind::Bayesian, StrategyKind::WeightedAverage, StrategyKind::Bayesian]);
        assert_eq!(kinds, vec![StrategyKind::WeightedAverage, StrategyKind::Bayesian]);
    }

    #[test]
    fn every_strategy_returns_a_distribution() {
        let inputs = inputs();
        for kind in StrategyKind::ALL {
            let r = kind.run(&inputs).unwrap();
            assert_eq!(r.strategy, kind);
            let total: f64 = r.scenario_scores.values().sum();
            assert!((total - 1.0).abs() < 1e-6, "{} scores sum to {:.8}", kind, total);
            assert!((0.0..=1.0).contains(&r.confidence));
            assert!(r.scenario_scores.contains_key(&r.recommended_scenario));
        }
    }

    #[test]
    fn explicit_evidence_overrides_builders() {
        let mut inputs = inputs();
        let frame = scenario_ids(&inputs.scenarios);
        inputs.evidence = vec![Evidence::DempsterShafer(DstEvidence::from_assignments(
            "analyst",
            &frame,
            &[("C", 0.9)],
        ))];

        let dst = StrategyKind::DempsterShafer.run(&inputs).unwrap();
        assert_eq!(dst.recommended_scenario, "C");
        match dst.diagnostics {
            StrategyDiagnostics::DempsterShafer { sources, .. } => assert_eq!(sources, vec!["analyst"]),
            other => panic!("unexpected diagnostics {:?}", other),
        }

        // No Bayesian variant supplied: the Bayesian strategy derives its own.
        let bayes = StrategyKind::Bayesian.run(&inputs).unwrap();
        match bayes.diagnostics {
            StrategyDiagnostics::Bayesian { evidence_updates, .. } => assert_eq!(evidence_updates, 5),
            other => panic!("unexpected diagnostics {:?}", other),
        }
    }

    #[test]
    fn evidence_for_unknown_scenario_is_degenerate() {
        let mut inputs = inputs();
        inputs.evidence = vec![Evidence::Bayesian(BayesianEvidence::new(
            "ghost",
            [("Z".to_string(), 0.9)].into_iter().collect(),
        ))];
        let err = StrategyKind::Bayesian.run(&inputs).unwrap_err();
        assert!(matches!(err, FusionError::DegenerateInput(_)));
    }

    #[test]
    fn display_names() {
        assert_eq!(StrategyKind::WeightedAverage.to_string(), "Weighted Average");
        assert_eq!(StrategyKind::DempsterShafer.to_string(), "Dempster-Shafer Theory");
        assert_eq!(StrategyKind::Bayesian.to_string(), "Bayesian Inference");
    }
}
