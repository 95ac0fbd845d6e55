// =============================================================================
// Meta-Fusion — consensus across the fusion strategies
// =============================================================================
//
// Pipeline:
//   1. Validate the scenario set and resolve the strategy selection
//   2. Collect weak-signal alerts (rules + correlator correlations)
//   3. Run each selected strategy on identical inputs
//   4. Confidence-weighted vote:
//
//        consensus(s) = Σ_k w_k · conf_k · score_k(s)      (normalized)
//
//   5. Plurality agreement, consensus confidence, priority
//   6. Explanation, action text, predicted outcome
//
// Agreement is the share of strategies backing the most popular pick.  It
// does not look at which scenario the weighted vote selected, so a split vote
// can still produce a consensus the plurality did not choose.
//
// Any strategy failure aborts the whole call; there are no partial results.
// =============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::decision_envelope::{MetaFusionResult, PredictedOutcome, TacticalDecision};
use crate::error::{FusionError, Result};
use crate::evidence::Evidence;
use crate::fusion::distribution::{argmax, ensure_distribution, normalize, ScoreMap};
use crate::runtime_config::EngineConfig;
use crate::signals::alerts::{detect_alerts, from_correlations};
use crate::signals::{CorrelatorHandle, SignalAlert, WeakSignal, WeakSignalCorrelator};
use crate::strategy::{canonical, StrategyDiagnostics, StrategyInputs, StrategyKind, StrategyResult};
use crate::types::{
    scenario_ids, validate_scenarios, FinancialData, KnowledgeGraphContext, Priority, RiskLevel, Scenario,
};

/// Agreement at or above this is reported as unanimous.
const UNANIMOUS: f64 = 0.99;
/// Agreement at or above this is reported as a majority.
const MAJORITY: f64 = 0.66;

// =============================================================================
// Request
// =============================================================================

/// One fusion request as produced by the upstream collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionRequest {
    pub financial_data: FinancialData,
    #[serde(default)]
    pub context: KnowledgeGraphContext,
    pub scenarios: Vec<Scenario>,
    /// Strategies to run; the engine's configured set when absent.
    #[serde(default)]
    pub strategies: Option<Vec<StrategyKind>>,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub signals: Vec<WeakSignal>,
    #[serde(default)]
    pub prior: Option<ScoreMap>,
}

impl FusionRequest {
    pub fn new(financial_data: FinancialData, context: KnowledgeGraphContext, scenarios: Vec<Scenario>) -> Self {
        Self {
            financial_data,
            context,
            scenarios,
            strategies: None,
            evidence: Vec::new(),
            signals: Vec::new(),
            prior: None,
        }
    }

    pub fn with_strategies(mut self, strategies: Vec<StrategyKind>) -> Self {
        self.strategies = Some(strategies);
        self
    }

    pub fn with_evidence(mut self, evidence: Vec<Evidence>) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_signals(mut self, signals: Vec<WeakSignal>) -> Self {
        self.signals = signals;
        self
    }

    pub fn with_prior(mut self, prior: ScoreMap) -> Self {
        self.prior = Some(prior);
        self
    }
}

// =============================================================================
// MultiStrategyEngine
// =============================================================================

pub struct MultiStrategyEngine {
    config: EngineConfig,
}

impl MultiStrategyEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A fresh correlator using this engine's thresholds, seeded with the
    /// request's signals.
    pub fn correlator_for(&self, request: &FusionRequest) -> WeakSignalCorrelator {
        let mut correlator = WeakSignalCorrelator::new(self.config.correlator.clone());
        correlator.add_signals(request.signals.iter().cloned().map(WeakSignal::clipped));
        correlator
    }

    /// Run the selected strategies one after another and meta-fuse.
    pub fn synthesize(&self, request: &FusionRequest, correlator: &WeakSignalCorrelator) -> Result<MetaFusionResult> {
        let (kinds, inputs) = self.prepare(request, correlator)?;

        let results = kinds
            .iter()
            .map(|kind| kind.run(&inputs))
            .collect::<Result<Vec<_>>>()?;

        self.assemble(request, &inputs.alerts, results)
    }

    /// Same as `synthesize`, with each strategy on the blocking pool. All
    /// strategies are awaited before meta-fusion.
    pub async fn synthesize_concurrent(
        &self,
        request: &FusionRequest,
        correlator: &CorrelatorHandle,
    ) -> Result<MetaFusionResult> {
        let (kinds, inputs) = {
            let guard = correlator.read();
            self.prepare(request, &guard)?
        };
        let inputs = Arc::new(inputs);

        let tasks = kinds.iter().map(|&kind| {
            let inputs = Arc::clone(&inputs);
            tokio::task::spawn_blocking(move || kind.run(&inputs))
        });

        let mut results = Vec::with_capacity(kinds.len());
        for joined in join_all(tasks).await {
            let result = joined.map_err(|e| FusionError::Worker(e.to_string()))??;
            results.push(result);
        }

        self.assemble(request, &inputs.alerts, results)
    }

    fn prepare(
        &self,
        request: &FusionRequest,
        correlator: &WeakSignalCorrelator,
    ) -> Result<(Vec<StrategyKind>, StrategyInputs)> {
        validate_scenarios(&request.scenarios)?;

        let kinds = canonical(request.strategies.as_deref().unwrap_or(self.config.strategies.as_slice()));
        if kinds.is_empty() {
            return Err(FusionError::degenerate("no fusion strategy selected"));
        }

        let mut alerts = detect_alerts(&request.financial_data, &request.context, &self.config.alerts);
        alerts.extend(from_correlations(&correlator.detect_correlations()));

        debug!(
            client = %request.financial_data.client_id,
            scenarios = request.scenarios.len(),
            strategies = kinds.len(),
            alerts = alerts.len(),
            "Fusion request prepared"
        );

        let inputs = StrategyInputs {
            scenarios: request.scenarios.clone(),
            financial_data: request.financial_data.clone(),
            context: request.context.clone(),
            alerts,
            evidence: request.evidence.clone(),
            weighted: self.config.weighted.clone(),
            prior: request.prior.clone(),
        };
        Ok((kinds, inputs))
    }

    // -------------------------------------------------------------------------
    // Consensus
    // -------------------------------------------------------------------------

    /// Confidence-weighted vote, normalized over `ids` (uniform on zero mass).
    pub fn meta_fuse(&self, ids: &[String], results: &[StrategyResult]) -> Result<ScoreMap> {
        let mut votes: ScoreMap = ids.iter().map(|id| (id.clone(), 0.0)).collect();
        for r in results {
            let w = self.config.strategy_weights.weight(r.strategy) * r.confidence;
            for (id, score) in &r.scenario_scores {
                if let Some(v) = votes.get_mut(id) {
                    *v += w * score;
                }
            }
        }

        let consensus = normalize(ids, &votes);
        ensure_distribution("consensus scores", &consensus)?;
        Ok(consensus)
    }

    /// Σ w·conf / Σ w; 0.5 when no weight is assigned.
    pub fn consensus_confidence(&self, results: &[StrategyResult]) -> f64 {
        let total: f64 = results
            .iter()
            .map(|r| self.config.strategy_weights.weight(r.strategy))
            .sum();
        if total <= 0.0 {
            return 0.5;
        }
        results
            .iter()
            .map(|r| self.config.strategy_weights.weight(r.strategy) * r.confidence)
            .sum::<f64>()
            / total
    }

    fn assemble(
        &self,
        request: &FusionRequest,
        alerts: &[SignalAlert],
        results: Vec<StrategyResult>,
    ) -> Result<MetaFusionResult> {
        let ids = scenario_ids(&request.scenarios);
        let consensus_scores = self.meta_fuse(&ids, &results)?;
        let (consensus_scenario, consensus_score) = argmax(&ids, &consensus_scores)
            .ok_or_else(|| FusionError::degenerate("scenario set is empty"))?;
        let best = request
            .scenarios
            .iter()
            .find(|s| s.id == consensus_scenario)
            .ok_or_else(|| FusionError::degenerate(format!("unknown scenario '{}'", consensus_scenario)))?;

        let agreement = calculate_agreement(&results);
        let confidence = self.consensus_confidence(&results);
        let priority = determine_priority(alerts, agreement, confidence);

        let explanation = build_explanation(
            &results,
            &consensus_scenario,
            agreement,
            &request.financial_data,
            &request.context,
            alerts,
        );

        if agreement < MAJORITY {
            warn!(
                consensus = %consensus_scenario,
                agreement = format!("{:.4}", agreement),
                "Fusion strategies disagree"
            );
        }
        info!(
            client = %request.financial_data.client_id,
            consensus = %consensus_scenario,
            confidence = format!("{:.4}", confidence),
            agreement = format!("{:.4}", agreement),
            priority = %priority,
            "Meta-fusion decision"
        );

        let tactical_decision = TacticalDecision {
            tactical_priority: priority,
            recommended_action: recommended_action(best, &request.financial_data.client_id),
            explanation,
            weak_signal_alert: alerts.to_vec(),
            predicted_financial_outcome: PredictedOutcome {
                cash_flow_impact_pct: best.cash_flow_impact,
                margin_impact_pct: best.margin_impact,
                time_to_impact_days: best.time_horizon_days,
                probability: best.probability,
                meta_consensus_score: consensus_score,
                strategy_agreement: agreement,
            },
            confidence_score: confidence,
            alternative_actions: request
                .scenarios
                .iter()
                .filter(|s| s.id != consensus_scenario)
                .map(|s| s.description.clone())
                .collect(),
        };

        Ok(MetaFusionResult {
            strategy_results: results,
            consensus_scenario,
            consensus_confidence: confidence,
            consensus_scores,
            agreement_level: agreement,
            tactical_decision,
        })
    }
}

// =============================================================================
// Agreement, priority, explanation, action
// =============================================================================

/// Share of strategies backing the most common recommendation.
pub fn calculate_agreement(results: &[StrategyResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for r in results {
        *counts.entry(r.recommended_scenario.as_str()).or_insert(0) += 1;
    }
    let plurality = counts.values().copied().max().unwrap_or(0);
    plurality as f64 / results.len() as f64
}

/// First matching rule wins:
/// Critical alert -> High; agreement < 0.5 -> High; ≥ 2 alerts -> High;
/// ≥ 1 alert or confidence < 0.5 -> Medium; otherwise Low.
pub fn determine_priority(alerts: &[SignalAlert], agreement: f64, confidence: f64) -> Priority {
    if alerts.iter().any(|a| a.risk_level == RiskLevel::Critical) {
        Priority::High
    } else if agreement < 0.5 {
        Priority::High
    } else if alerts.len() >= 2 {
        Priority::High
    } else if !alerts.is_empty() || confidence < 0.5 {
        Priority::Medium
    } else {
        Priority::Low
    }
}

/// Action text keyed off the chosen scenario's description.
pub fn recommended_action(scenario: &Scenario, client_id: &str) -> String {
    let desc = scenario.description.to_lowercase();
    if desc.contains("early payment") {
        format!("Trigger early payment incentive for Client {}", client_id)
    } else if desc.contains("renegotiat") {
        format!("Initiate payment term renegotiation with Client {}", client_id)
    } else if desc.contains("hedg") || desc.contains("insurance") {
        format!("Activate hedging/insurance strategy for Client {}", client_id)
    } else if desc.contains("business as usual") {
        format!("Maintain current operations for Client {} (monitor closely)", client_id)
    } else {
        format!("Execute {}: {}", scenario.id, scenario.description)
    }
}

fn conflict_label(conflict: f64) -> &'static str {
    if conflict < 0.3 {
        "Low"
    } else if conflict < 0.6 {
        "Moderate"
    } else {
        "High"
    }
}

fn build_explanation(
    results: &[StrategyResult],
    consensus: &str,
    agreement: f64,
    data: &FinancialData,
    context: &KnowledgeGraphContext,
    alerts: &[SignalAlert],
) -> String {
    let mut out = format!(
        "META-FUSION DECISION: {} selected via multi-strategy consensus \
         ({:.0}% agreement across {} fusion algorithms).",
        consensus,
        agreement * 100.0,
        results.len()
    );

    out.push_str("\n\nSTRATEGY ANALYSIS:");
    for r in results {
        out.push_str(&format!(
            "\n• {}: Recommends {} (confidence: {:.1}%)",
            r.strategy,
            r.recommended_scenario,
            r.confidence * 100.0
        ));
        match &r.diagnostics {
            StrategyDiagnostics::DempsterShafer { conflict_degree, .. } => {
                out.push_str(&format!(
                    "\n  → Inter-source conflict: {:.1}% ({})",
                    conflict_degree * 100.0,
                    conflict_label(*conflict_degree)
                ));
            }
            StrategyDiagnostics::Bayesian { entropy, kl_divergence, .. } => {
                out.push_str(&format!(
                    "\n  → Posterior entropy: {:.3} bits | KL divergence from prior: {:.3}",
                    entropy, kl_divergence
                ));
            }
            StrategyDiagnostics::WeightedAverage { risk_weight, weak_signals_count, .. } => {
                out.push_str(&format!(
                    "\n  → Effective risk weight: {:.2} ({} weak-signal alerts)",
                    risk_weight, weak_signals_count
                ));
            }
        }
    }

    let production = if data.production_output_change < 0.0 {
        format!("{}% production slowdown", data.production_output_change.abs())
    } else {
        format!("{}% production growth", data.production_output_change)
    };
    out.push_str(&format!(
        "\n\nFINANCIAL CONTEXT: Client {}: {}% invoice spike, {}, {}% budget remaining.",
        data.client_id, data.unpaid_invoices_spike, production, data.budget_remaining_q3
    ));

    if let Some(pattern) = &context.similar_historical_pattern {
        out.push_str(&format!(
            "\n\nHISTORICAL INTELLIGENCE: Episodic memory matches pattern from {} years ago \
             ({}-day cash flow delay). Client parent status: {}.",
            pattern.years_ago, pattern.cash_flow_delay_days, context.client_parent_status
        ));
    }

    if !alerts.is_empty() {
        let critical = alerts.iter().filter(|a| a.risk_level == RiskLevel::Critical).count();
        let types: Vec<&str> = alerts.iter().take(3).map(|a| a.signal_type.as_str()).collect();
        out.push_str(&format!(
            "\n\nWEAK SIGNALS: {} alert(s), {} critical, including {}.",
            alerts.len(),
            critical,
            types.join(", ")
        ));
    }

    if agreement >= UNANIMOUS {
        out.push_str(&format!(
            "\n\nCONSENSUS: UNANIMOUS. All fusion methods converge on {}.",
            consensus
        ));
    } else if agreement >= MAJORITY {
        let dissent: Vec<String> = dissenters(results, consensus);
        out.push_str(&format!(
            "\n\nCONSENSUS: MAJORITY. Most fusion methods agree; dissent from {}.",
            dissent.join("; ")
        ));
    } else {
        let dissent: Vec<String> = dissenters(results, consensus);
        out.push_str(&format!(
            "\n\nCONSENSUS: SPLIT. Strategies disagree. Divergent recommendations: {}. \
             Decision made by weighted meta-fusion voting.",
            dissent.join("; ")
        ));
    }

    out
}

/// "Strategy: pick" for every strategy whose pick differs from `consensus`.
fn dissenters(results: &[StrategyResult], consensus: &str) -> Vec<String> {
    results
        .iter()
        .filter(|r| r.recommended_scenario != consensus)
        .map(|r| format!("{}: {}", r.strategy, r.recommended_scenario))
        .collect()
}
