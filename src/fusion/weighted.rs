// =============================================================================
// Weighted-Average Engine — risk vs. profitability scoring of scenarios
// =============================================================================
//
//   score(s) = [ w_risk · (1 - |cash_flow|/100) + w_profit · (1 - |margin|/100) ] · p(s)
//
// The decision is the argmax of the raw scores, so impacts beyond ±100 %
// (negative raw scores) still rank correctly.  The reported scores are the
// raw scores normalized to a distribution: negative scores carry no mass and
// an all-non-positive set is uniform.  Any Critical weak-signal alert
// escalates the risk weight before scoring:
//
//   w_risk := min(max_risk_weight, w_risk + critical_boost)
//
// The profit weight stays as configured.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FusionError, Result};
use crate::fusion::distribution::{argmax, ensure_distribution, normalize, ScoreMap};
use crate::signals::alerts::{mean_strength, SignalAlert};
use crate::types::{scenario_ids, Priority, Scenario};

fn default_risk_weight() -> f64 {
    0.6
}
fn default_profit_weight() -> f64 {
    0.4
}
fn default_critical_boost() -> f64 {
    0.2
}
fn default_max_risk_weight() -> f64 {
    0.8
}

/// Weights for the weighted-average strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedConfig {
    #[serde(default = "default_risk_weight")]
    pub risk_weight: f64,
    #[serde(default = "default_profit_weight")]
    pub profit_weight: f64,
    /// Added to the risk weight when a Critical alert is present.
    #[serde(default = "default_critical_boost")]
    pub critical_boost: f64,
    /// Cap for the escalated risk weight.
    #[serde(default = "default_max_risk_weight")]
    pub max_risk_weight: f64,
}

impl Default for WeightedConfig {
    fn default() -> Self {
        Self {
            risk_weight: default_risk_weight(),
            profit_weight: default_profit_weight(),
            critical_boost: default_critical_boost(),
            max_risk_weight: default_max_risk_weight(),
        }
    }
}

/// How one scenario earned its score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioContribution {
    pub scenario_id: String,
    pub risk_score: f64,
    pub profit_score: f64,
    pub probability: f64,
    /// Score before normalization.
    pub raw_score: f64,
}

/// Result of the weighted scoring pass.
#[derive(Debug, Clone)]
pub struct WeightedResult {
    pub scores: ScoreMap,
    pub contributions: Vec<ScenarioContribution>,
    pub decision: String,
    pub confidence: f64,
    pub effective_risk_weight: f64,
    pub profit_weight: f64,
    pub alert_count: usize,
    pub priority: Priority,
}

pub struct WeightedAverageEngine {
    config: WeightedConfig,
}

impl WeightedAverageEngine {
    pub fn new(config: WeightedConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WeightedConfig {
        &self.config
    }

    /// Risk weight after Critical-alert escalation.
    pub fn effective_risk_weight(&self, alerts: &[SignalAlert]) -> f64 {
        if alerts.iter().any(SignalAlert::is_critical) {
            f64::min(
                self.config.max_risk_weight,
                self.config.risk_weight + self.config.critical_boost,
            )
        } else {
            self.config.risk_weight
        }
    }

    /// Score `scenarios` given the currently known alerts.
    pub fn score(&self, scenarios: &[Scenario], alerts: &[SignalAlert]) -> Result<WeightedResult> {
        let ids = scenario_ids(scenarios);
        let risk_w = self.effective_risk_weight(alerts);
        let profit_w = self.config.profit_weight;

        let mut contributions = Vec::with_capacity(scenarios.len());
        let mut raw = ScoreMap::new();

        for s in scenarios {
            let risk_score = s.cash_flow_score();
            let profit_score = s.margin_score();
            let raw_score = (risk_w * risk_score + profit_w * profit_score) * s.probability;

            raw.insert(s.id.clone(), raw_score);
            contributions.push(ScenarioContribution {
                scenario_id: s.id.clone(),
                risk_score,
                profit_score,
                probability: s.probability,
                raw_score,
            });
        }

        let scores = normalize(&ids, &raw);
        ensure_distribution("weighted-average scores", &scores)?;

        let (decision, _) = argmax(&ids, &raw)
            .ok_or_else(|| FusionError::degenerate("weighted average needs at least one scenario"))?;
        let best = scenarios
            .iter()
            .find(|s| s.id == decision)
            .ok_or_else(|| FusionError::degenerate(format!("unknown scenario '{}'", decision)))?;

        let confidence = f64::min(1.0, best.probability * (0.7 + 0.3 * mean_strength(alerts)));
        let priority = derive_priority(best, alerts);

        debug!(
            decision = %decision,
            risk_weight = format!("{:.2}", risk_w),
            alerts = alerts.len(),
            confidence = format!("{:.4}", confidence),
            priority = %priority,
            "Weighted-average scoring complete"
        );

        Ok(WeightedResult {
            scores,
            contributions,
            decision,
            confidence,
            effective_risk_weight: risk_w,
            profit_weight: profit_w,
            alert_count: alerts.len(),
            priority,
        })
    }
}

impl Default for WeightedAverageEngine {
    fn default() -> Self {
        Self::new(WeightedConfig::default())
    }
}

/// Stand-alone priority for the weighted strategy.
pub fn derive_priority(best: &Scenario, alerts: &[SignalAlert]) -> Priority {
    let impact = best.cash_flow_impact.abs();
    if alerts.iter().any(SignalAlert::is_critical) || impact > 15.0 || alerts.len() >= 2 {
        Priority::High
    } else if impact > 5.0 || !alerts.is_empty() {
        Priority::Medium
    } else {
        Priority::Low
    }
}
