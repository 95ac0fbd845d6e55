// =============================================================================
// Shared types consumed by every fusion strategy
// =============================================================================
//
// These are produced by external collaborators (ERP feeds, the knowledge
// graph, the scenario simulator) and are read-only to the fusion core.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FusionError, Result};

/// One simulated outcome the engine can recommend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub description: String,
    /// Signed percentage impact on cash flow.
    pub cash_flow_impact: f64,
    /// Signed percentage impact on margin.
    pub margin_impact: f64,
    pub probability: f64,
    pub time_horizon_days: u32,
}

impl Scenario {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        cash_flow_impact: f64,
        margin_impact: f64,
        probability: f64,
        time_horizon_days: u32,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            cash_flow_impact,
            margin_impact,
            probability,
            time_horizon_days,
        }
    }

    /// Cash-flow stability in [0, 1] for impacts within ±100 %.
    pub fn cash_flow_score(&self) -> f64 {
        1.0 - self.cash_flow_impact.abs() / 100.0
    }

    /// Margin preservation in [0, 1] for impacts within ±100 %.
    pub fn margin_score(&self) -> f64 {
        1.0 - self.margin_impact.abs() / 100.0
    }
}

/// Check the candidate set: non-empty, unique ids, sane probabilities.
pub fn validate_scenarios(scenarios: &[Scenario]) -> Result<()> {
    if scenarios.is_empty() {
        return Err(FusionError::degenerate("scenario set is empty"));
    }

    let mut seen = HashSet::with_capacity(scenarios.len());
    for s in scenarios {
        if s.id.is_empty() {
            return Err(FusionError::degenerate("scenario with empty id"));
        }
        if !seen.insert(s.id.as_str()) {
            return Err(FusionError::degenerate(format!(
                "duplicate scenario id '{}'",
                s.id
            )));
        }
        if !(0.0..=1.0).contains(&s.probability) {
            return Err(FusionError::invalid_evidence(
                s.id.clone(),
                format!("scenario probability {} outside [0, 1]", s.probability),
            ));
        }
        if s.time_horizon_days == 0 {
            return Err(FusionError::degenerate(format!(
                "scenario '{}' has a zero time horizon",
                s.id
            )));
        }
    }
    Ok(())
}

/// Ids of `scenarios` in input order.
pub fn scenario_ids(scenarios: &[Scenario]) -> Vec<String> {
    scenarios.iter().map(|s| s.id.clone()).collect()
}

/// The scenario with the largest |cash_flow_impact| (first wins on ties).
pub fn riskiest(scenarios: &[Scenario]) -> Option<&Scenario> {
    scenarios.iter().fold(None, |best: Option<&Scenario>, s| match best {
        Some(b) if b.cash_flow_impact.abs() >= s.cash_flow_impact.abs() => Some(b),
        _ => Some(s),
    })
}

/// The scenario with the smallest |cash_flow_impact| (first wins on ties).
pub fn safest(scenarios: &[Scenario]) -> Option<&Scenario> {
    scenarios.iter().fold(None, |best: Option<&Scenario>, s| match best {
        Some(b) if b.cash_flow_impact.abs() <= s.cash_flow_impact.abs() => Some(b),
        _ => Some(s),
    })
}

/// ERP / IoT metrics for a single client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialData {
    /// Percentage spike in unpaid invoices.
    pub unpaid_invoices_spike: f64,
    pub client_id: String,
    /// Percentage change in production output (negative = slowdown).
    pub production_output_change: f64,
    /// Percentage of the Q3 budget still available.
    pub budget_remaining_q3: f64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl FinancialData {
    pub fn new(
        client_id: impl Into<String>,
        unpaid_invoices_spike: f64,
        production_output_change: f64,
        budget_remaining_q3: f64,
    ) -> Self {
        Self {
            unpaid_invoices_spike,
            client_id: client_id.into(),
            production_output_change,
            budget_remaining_q3,
            timestamp: Utc::now(),
        }
    }
}

/// An episodic-memory match from the knowledge graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPattern {
    #[serde(default)]
    pub years_ago: u32,
    #[serde(default)]
    pub cash_flow_delay_days: u32,
    #[serde(default)]
    pub description: String,
}

/// Knowledge-graph context about the client and its environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeGraphContext {
    pub client_parent_status: String,
    #[serde(default)]
    pub similar_historical_pattern: Option<HistoricalPattern>,
    #[serde(default)]
    pub external_data_signals: Vec<String>,
    #[serde(default)]
    pub risk_indicators: Vec<String>,
}

impl KnowledgeGraphContext {
    pub fn new(client_parent_status: impl Into<String>) -> Self {
        Self {
            client_parent_status: client_parent_status.into(),
            ..Self::default()
        }
    }

    pub fn with_pattern(mut self, pattern: HistoricalPattern) -> Self {
        self.similar_historical_pattern = Some(pattern);
        self
    }

    pub fn has_historical_pattern(&self) -> bool {
        self.similar_historical_pattern.is_some()
    }
}

/// Tactical decision priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "High"),
            Self::Medium => write!(f, "Medium"),
            Self::Low => write!(f, "Low"),
        }
    }
}

/// Risk level attached to a weak-signal alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "Critical"),
            Self::High => write!(f, "High"),
            Self::Medium => write!(f, "Medium"),
            Self::Low => write!(f, "Low"),
        }
    }
}
