// =============================================================================
// Signal Alerts — weak-signal alerts attached to a tactical decision
// =============================================================================
//
// Two producers:
//
//   rules         fixed cross-source rules over FinancialData and the
//                 knowledge-graph context (production vs. restructuring,
//                 budget squeeze, historical recurrence)
//   correlations  whatever the WeakSignalCorrelator surfaced, graded by
//                 combined strength
//
// A Critical alert escalates the weighted-average risk weight and pins the
// decision priority to High.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::correlator::Correlation;
use crate::types::{FinancialData, KnowledgeGraphContext, RiskLevel};

fn default_production_slowdown_pct() -> f64 {
    -5.0
}
fn default_budget_critical_pct() -> f64 {
    10.0
}

/// Thresholds for the rule-based alerts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    /// Production change below this (negative %) counts as a slowdown.
    #[serde(default = "default_production_slowdown_pct")]
    pub production_slowdown_pct: f64,
    /// Budget remaining below this (%) is a liquidity squeeze.
    #[serde(default = "default_budget_critical_pct")]
    pub budget_critical_pct: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            production_slowdown_pct: default_production_slowdown_pct(),
            budget_critical_pct: default_budget_critical_pct(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalAlert {
    pub signal_type: String,
    /// Display strength in [0, 1].
    pub correlation_strength: f64,
    pub source_indices: Vec<String>,
    pub risk_level: RiskLevel,
    pub description: String,
}

impl SignalAlert {
    pub fn is_critical(&self) -> bool {
        self.risk_level == RiskLevel::Critical
    }
}

/// Grade a correlation strength.
pub fn risk_level_for(strength: f64) -> RiskLevel {
    if strength >= 0.8 {
        RiskLevel::Critical
    } else if strength >= 0.6 {
        RiskLevel::High
    } else if strength >= 0.3 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Rule-based alerts for one client.
pub fn detect_alerts(
    data: &FinancialData,
    context: &KnowledgeGraphContext,
    thresholds: &AlertThresholds,
) -> Vec<SignalAlert> {
    let mut alerts = Vec::new();

    // Production slowdown while the parent company restructures.
    if data.production_output_change < thresholds.production_slowdown_pct
        && context.client_parent_status.to_lowercase().contains("restructuring")
    {
        let strength = f64::min(data.production_output_change.abs() / 20.0, 1.0);
        alerts.push(SignalAlert {
            signal_type: "Production-Client_Systemic_Risk".into(),
            correlation_strength: strength,
            source_indices: vec!["IoT_Production".into(), "KG_Client_Parent".into(), "ERP_Invoices".into()],
            risk_level: if strength > 0.6 { RiskLevel::High } else { RiskLevel::Medium },
            description: format!(
                "Production slowdown of {}% combined with client parent restructuring \
                 indicates supply chain and payment risk convergence",
                data.production_output_change
            ),
        });
    }

    if data.budget_remaining_q3 < thresholds.budget_critical_pct {
        alerts.push(SignalAlert {
            signal_type: "Budget_Liquidity_Squeeze".into(),
            correlation_strength: 0.8,
            source_indices: vec!["ERP_Budget".into(), "ERP_Invoices".into()],
            risk_level: RiskLevel::Critical,
            description: format!(
                "Only {}% budget remaining with {}% spike in unpaid invoices",
                data.budget_remaining_q3, data.unpaid_invoices_spike
            ),
        });
    }

    if let Some(pattern) = &context.similar_historical_pattern {
        alerts.push(SignalAlert {
            signal_type: "Historical_Pattern_Recurrence".into(),
            correlation_strength: 0.75,
            source_indices: vec!["RAGraph_Episodic_Memory".into(), "ERP_Invoices".into()],
            risk_level: RiskLevel::High,
            description: format!(
                "Current pattern matches historical incident from {} years ago, \
                 which resulted in {}-day cash flow delay",
                pattern.years_ago, pattern.cash_flow_delay_days
            ),
        });
    }

    debug!(client = %data.client_id, alerts = alerts.len(), "Rule-based alerts evaluated");
    alerts
}

/// One alert per correlation, strength clamped for display.
pub fn from_correlations(correlations: &[Correlation]) -> Vec<SignalAlert> {
    correlations
        .iter()
        .map(|c| {
            let strength = c.combined_strength.clamp(0.0, 1.0);
            SignalAlert {
                signal_type: format!("Correlated_{}", c.kind),
                correlation_strength: strength,
                source_indices: c.sources(),
                risk_level: risk_level_for(strength),
                description: format!("[{}] {}", c.risk_type, c.narrative),
            }
        })
        .collect()
}

/// Mean display strength; 0.5 when there are no alerts.
pub fn mean_strength(alerts: &[SignalAlert]) -> f64 {
    if alerts.is_empty() {
        return 0.5;
    }
    alerts.iter().map(|a| a.correlation_strength).sum::<f64>() / alerts.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::correlator::{CorrelatorConfig, WeakSignalCorrelator};
    use crate::signals::WeakSignal;
    use crate::types::HistoricalPattern;

    #[test]
    fn budget_squeeze_is_critical() {
        let data = FinancialData::new("ACME", 15.0, -2.0, 5.0);
        let alerts = detect_alerts(&data, &KnowledgeGraphContext::new("stable"), &AlertThresholds::default());
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].is_critical());
        assert_eq!(alerts[0].signal_type, "Budget_Liquidity_Squeeze");
    }

    #[test]
    fn restructuring_and_slowdown_correlate() {
        let data = FinancialData::new("ACME", 15.0, -14.0, 40.0);
        let ctx = KnowledgeGraphContext::new("Parent under Restructuring").with_pattern(HistoricalPattern {
            years_ago: 3,
            cash_flow_delay_days: 45,
            description: "2021 delay".into(),
        });
        let alerts = detect_alerts(&data, &ctx, &AlertThresholds::default());
        assert_eq!(alerts.len(), 2);
        assert!((alerts[0].correlation_strength - 0.7).abs() < 1e-12);
        assert_eq!(alerts[0].risk_level, RiskLevel::High);
        assert!(alerts[1].description.contains("3 years ago"));
        assert!(alerts[1].description.contains("45-day"));
    }

    #[test]
    fn healthy_client_has_no_alerts() {
        let data = FinancialData::new("ACME", 2.0, 3.0, 60.0);
        let alerts = detect_alerts(&data, &KnowledgeGraphContext::new("stable"), &AlertThresholds::default());
        assert!(alerts.is_empty());
        assert!((mean_strength(&alerts) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn correlations_graded_and_clamped() {
        let mut c = WeakSignalCorrelator::new(CorrelatorConfig::default());
        c.add_signals([
            WeakSignal::new("cashflow", "liquidity", "a", 0.9),
            WeakSignal::new("rag", "liquidity", "b", 0.9),
        ]);
        let alerts = from_correlations(&c.detect_correlations());
        let cross = alerts
            .iter()
            .find(|a| a.signal_type == "Correlated_Cross_Source_Convergence")
            .unwrap();
        assert!((cross.correlation_strength - 1.0).abs() < f64::EPSILON);
        assert!(cross.is_critical());
        assert!(cross.description.starts_with("[emerging_risk]"));
    }

    #[test]
    fn grading_thresholds() {
        assert_eq!(risk_level_for(0.8), RiskLevel::Critical);
        assert_eq!(risk_level_for(0.6), RiskLevel::High);
        assert_eq!(risk_level_for(0.3), RiskLevel::Medium);
        assert_eq!(risk_level_for(0.29), RiskLevel::Low);
    }
}
