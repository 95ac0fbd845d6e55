// =============================================================================
// Weak Signals — faint indicators that matter only once correlated
// =============================================================================
//
// A weak signal is produced by an upstream collaborator (cash-flow monitor,
// contract registry, budget tracker, retrieval insights) and is immutable once
// built.  Strength is clipped to [0, 1] at construction.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeakSignal {
    /// Producer, e.g. "cashflow", "contract", "rag".
    pub source: String,
    /// Problem area, e.g. "liquidity", "vendor_risk".
    pub category: String,
    pub description: String,
    pub strength: f64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl WeakSignal {
    pub fn new(
        source: impl Into<String>,
        category: impl Into<String>,
        description: impl Into<String>,
        strength: f64,
    ) -> Self {
        Self {
            source: source.into(),
            category: category.into(),
            description: description.into(),
            strength: clip_strength(strength),
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Re-apply the [0, 1] clip; used after deserialization.
    pub fn clipped(mut self) -> Self {
        self.strength = clip_strength(self.strength);
        self
    }

    // -------------------------------------------------------------------------
    // Builders for the usual producers
    // -------------------------------------------------------------------------

    /// Cash-flow deviation; 50 % deviation saturates.
    pub fn cashflow_anomaly(description: impl Into<String>, deviation_pct: f64) -> Self {
        Self::new("cashflow", "liquidity", description, deviation_pct.abs() / 50.0)
            .with_metadata("deviation_pct", json!(deviation_pct))
    }

    /// Contract nearing expiry; urgency rises as the date approaches.
    pub fn contract_expiry(vendor: &str, days_until_expiry: u32, annual_value: f64) -> Self {
        let urgency = f64::max(0.1, 1.0 - days_until_expiry as f64 / 365.0);
        Self::new(
            "contract",
            "vendor_risk",
            format!(
                "Contract with {} expires in {} days ({:.0}/yr)",
                vendor, days_until_expiry, annual_value
            ),
            urgency,
        )
        .with_metadata("vendor", json!(vendor))
        .with_metadata("days", json!(days_until_expiry))
        .with_metadata("value", json!(annual_value))
    }

    /// Budget line drifting from plan; 30 % drift saturates.
    pub fn budget_drift(budget_category: &str, drift_pct: f64) -> Self {
        Self::new(
            "budget",
            "budget_drift",
            format!("{} budget drifting by {:+.1}%", budget_category, drift_pct),
            drift_pct.abs() / 30.0,
        )
        .with_metadata("budget_category", json!(budget_category))
        .with_metadata("drift_pct", json!(drift_pct))
    }

    /// Retrieval insight; starts weak at 60 % of the retriever's confidence.
    pub fn rag_insight(insight: impl Into<String>, confidence: f64) -> Self {
        Self::new("rag", "intelligence", insight, confidence * 0.6)
            .with_metadata("raw_confidence", json!(confidence))
    }
}

fn clip_strength(strength: f64) -> f64 {
    if strength.is_nan() {
        0.0
    } else {
        strength.clamp(0.0, 1.0)
    }
}
