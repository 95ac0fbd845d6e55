// =============================================================================
// Decision Envelope — the meta-fusion result and its auditable record
// =============================================================================
//
// `MetaFusionResult` is a pure function of the request: no ids, no clocks.
// Its serialized form rounds every reported number in `meta_fusion` and
// `strategy_breakdown` to 4 dp; the in-memory values keep full precision.
//
// `DecisionRecord` wraps one result for audit: a UUID v4, an RFC 3339
// creation time and a SHA-256 fingerprint of the canonical result JSON.
// Bit-identical requests produce identical fingerprints.
// =============================================================================

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::fusion::distribution::ScoreMap;
use crate::signals::SignalAlert;
use crate::strategy::StrategyResult;
use crate::types::Priority;

// =============================================================================
// Tactical decision
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedOutcome {
    pub cash_flow_impact_pct: f64,
    pub margin_impact_pct: f64,
    pub time_to_impact_days: u32,
    pub probability: f64,
    pub meta_consensus_score: f64,
    pub strategy_agreement: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TacticalDecision {
    pub tactical_priority: Priority,
    pub recommended_action: String,
    pub explanation: String,
    pub weak_signal_alert: Vec<SignalAlert>,
    pub predicted_financial_outcome: PredictedOutcome,
    pub confidence_score: f64,
    pub alternative_actions: Vec<String>,
}

// =============================================================================
// MetaFusionResult
// =============================================================================

#[derive(Debug, Clone)]
pub struct MetaFusionResult {
    /// Canonical strategy order.
    pub strategy_results: Vec<StrategyResult>,
    pub consensus_scenario: String,
    pub consensus_confidence: f64,
    pub consensus_scores: ScoreMap,
    pub agreement_level: f64,
    pub tactical_decision: TacticalDecision,
}

impl MetaFusionResult {
    /// Pretty-printed output document.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.view())
    }

    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self.view())
    }

    fn view(&self) -> ResultView<'_> {
        ResultView {
            meta_fusion: MetaFusionView {
                consensus_scenario: &self.consensus_scenario,
                consensus_confidence: round4(self.consensus_confidence),
                agreement_level: round4(self.agreement_level),
                consensus_scores: round_map(&self.consensus_scores),
            },
            strategy_breakdown: StrategyBreakdown(&self.strategy_results),
            tactical_decision: &self.tactical_decision,
        }
    }
}

/// Round to 4 decimal places for display.
pub fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

fn round_map(m: &ScoreMap) -> BTreeMap<&str, f64> {
    m.iter().map(|(k, &v)| (k.as_str(), round4(v))).collect()
}

#[derive(Serialize)]
struct ResultView<'a> {
    meta_fusion: MetaFusionView<'a>,
    strategy_breakdown: StrategyBreakdown<'a>,
    tactical_decision: &'a TacticalDecision,
}

#[derive(Serialize)]
struct MetaFusionView<'a> {
    consensus_scenario: &'a str,
    consensus_confidence: f64,
    agreement_level: f64,
    consensus_scores: BTreeMap<&'a str, f64>,
}

#[derive(Serialize)]
struct BreakdownEntry<'a> {
    recommended: &'a str,
    confidence: f64,
    scores: BTreeMap<&'a str, f64>,
}

/// Keyed by display name, emitted in canonical strategy order.
struct StrategyBreakdown<'a>(&'a [StrategyResult]);

impl Serialize for StrategyBreakdown<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for r in self.0 {
            map.serialize_entry(
                r.strategy.display_name(),
                &BreakdownEntry {
                    recommended: &r.recommended_scenario,
                    confidence: round4(r.confidence),
                    scores: round_map(&r.scenario_scores),
                },
            )?;
        }
        map.end()
    }
}

// =============================================================================
// DecisionRecord
// =============================================================================

/// Auditable wrapper around one meta-fusion result.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    /// Unique identifier for this decision (UUID v4).
    pub id: String,

    pub client_id: String,

    pub consensus_scenario: String,

    pub tactical_priority: Priority,

    /// Hex SHA-256 of the canonical result JSON.
    pub fingerprint: String,

    /// ISO 8601 timestamp of when this record was created.
    pub created_at: String,
}

impl DecisionRecord {
    pub fn new(client_id: impl Into<String>, result: &MetaFusionResult) -> serde_json::Result<Self> {
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: client_id.into(),
            consensus_scenario: result.consensus_scenario.clone(),
            tactical_priority: result.tactical_decision.tactical_priority,
            fingerprint: fingerprint(result)?,
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

/// SHA-256 over the compact serialized result.
pub fn fingerprint(result: &MetaFusionResult) -> serde_json::Result<String> {
    let canonical = serde_json::to_vec(&result.view())?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{StrategyDiagnostics, StrategyKind};

    fn result() -> MetaFusionResult {
        let scores: ScoreMap = [("A".to_string(), 0.123456), ("B".to_string(), 0.876544)]
            .into_iter()
            .collect();
        let strategy = |kind: StrategyKind| StrategyResult {
            strategy: kind,
            recommended_scenario: "B".into(),
            confidence: 0.876544,
            scenario_scores: scores.clone(),
            diagnostics: StrategyDiagnostics::WeightedAverage {
                risk_weight: 0.6,
                profitability_weight: 0.4,
                weak_signals_count: 0,
                priority: Priority::Low,
            },
        };
        MetaFusionResult {
            strategy_results: vec![strategy(StrategyKind::WeightedAverage), strategy(StrategyKind::Bayesian)],
            consensus_scenario: "B".into(),
            consensus_confidence: 0.876544,
            consensus_scores: scores,
            agreement_level: 2.0 / 3.0,
            tactical_decision: TacticalDecision {
                tactical_priority: Priority::Medium,
                recommended_action: "Execute B".into(),
                explanation: "because".into(),
                weak_signal_alert: Vec::new(),
                predicted_financial_outcome: PredictedOutcome {
                    cash_flow_impact_pct: 0.0,
                    margin_impact_pct: -5.0,
                    time_to_impact_days: 30,
                    probability: 0.9,
                    meta_consensus_score: 0.876544,
                    strategy_agreement: 2.0 / 3.0,
                },
                confidence_score: 0.876544,
                alternative_actions: vec!["A".into()],
            },
        }
    }

    #[test]
    fn serialization_rounds_to_four_places() {
        let v = result().to_value().unwrap();
        assert_eq!(v["meta_fusion"]["consensus_confidence"], serde_json::json!(0.8765));
        assert_eq!(v["meta_fusion"]["agreement_level"], serde_json::json!(0.6667));
        assert_eq!(v["meta_fusion"]["consensus_scores"]["A"], serde_json::json!(0.1235));
        assert_eq!(v["strategy_breakdown"]["Weighted Average"]["recommended"], "B");
        assert_eq!(v["tactical_decision"]["tactical_priority"], "Medium");
    }

    #[test]
    fn breakdown_keeps_canonical_order() {
        let json = result().to_json().unwrap();
        let wa = json.find("\"Weighted Average\"").unwrap();
        let bayes = json.find("\"Bayesian Inference\"").unwrap();
        assert!(wa < bayes);
    }

    #[test]
    fn fingerprint_is_stable_and_records_are_unique() {
        let r = result();
        assert_eq!(fingerprint(&r).unwrap(), fingerprint(&r.clone()).unwrap());
        let a = DecisionRecord::new("ACME", &r).unwrap();
        let b = DecisionRecord::new("ACME", &r).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.fingerprint.len(), 64);
    }
}
