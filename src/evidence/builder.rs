// =============================================================================
// Evidence Builder — raw financial metrics -> strategy-specific evidence
// =============================================================================
//
// Every metric is mapped onto the two scenarios that matter most for it:
//
//   risk scenario  — the candidate with the largest |cash_flow_impact|
//   safe scenario  — the candidate with the smallest |cash_flow_impact|
//
// Dempster-Shafer: a two-point BPA. m({risk}) grows with severity, m({safe})
// is a shrinking complement, and whatever remains goes to Θ ("don't know").
// The step tables are monotonic in severity.
//
// Bayesian: likelihood P(metric | scenario) rises with severity for the risk
// scenario, falls for the safe one, and stays moderate for everything else.
//
// When the frame holds a single scenario risk == safe and both masses land
// on the same focal set.

use std::collections::BTreeMap;

use serde_json::json;
use tracing::trace;

use crate::error::{FusionError, Result};
use crate::evidence::{add_mass, BayesianEvidence, DstEvidence, FocalSet, MassFunction};
use crate::fusion::distribution::ScoreMap;
use crate::types::{riskiest, safest, FinancialData, KnowledgeGraphContext, Scenario};

// Source reliabilities.
const INVOICE_RELIABILITY: f64 = 0.85;
const PRODUCTION_RELIABILITY: f64 = 0.75;
const KNOWLEDGE_GRAPH_RELIABILITY: f64 = 0.80;
const BUDGET_RELIABILITY: f64 = 0.90;
const SIMULATION_RELIABILITY: f64 = 0.70;

/// Share of simulation mass committed to singletons; the rest goes to Θ.
const SIMULATION_COMMITTED_MASS: f64 = 0.8;

/// Builds evidence for one frame of candidate scenarios.
#[derive(Debug, Clone)]
pub struct EvidenceBuilder {
    frame: Vec<String>,
    risk_scenario: String,
    safe_scenario: String,
}

impl EvidenceBuilder {
    /// Derive the frame and the risk/safe anchors from `scenarios`.
    pub fn for_scenarios(scenarios: &[Scenario]) -> Result<Self> {
        let risk = riskiest(scenarios)
            .ok_or_else(|| FusionError::degenerate("cannot build evidence without scenarios"))?;
        let safe = safest(scenarios)
            .ok_or_else(|| FusionError::degenerate("cannot build evidence without scenarios"))?;

        trace!(
            risk = %risk.id,
            safe = %safe.id,
            frame = scenarios.len(),
            "Evidence anchors selected"
        );

        Ok(Self {
            frame: scenarios.iter().map(|s| s.id.clone()).collect(),
            risk_scenario: risk.id.clone(),
            safe_scenario: safe.id.clone(),
        })
    }

    pub fn frame(&self) -> &[String] {
        &self.frame
    }

    pub fn risk_scenario(&self) -> &str {
        &self.risk_scenario
    }

    pub fn safe_scenario(&self) -> &str {
        &self.safe_scenario
    }

    // =========================================================================
    // Dempster-Shafer mass assignments
    // =========================================================================

    fn two_point(&self, name: &str, risk_mass: f64, safe_mass: f64, reliability: f64) -> DstEvidence {
        let ignorance = (1.0 - risk_mass - safe_mass).max(0.0);
        let mut masses = MassFunction::new();
        add_mass(&mut masses, FocalSet::singleton(&self.risk_scenario), risk_mass);
        add_mass(&mut masses, FocalSet::singleton(&self.safe_scenario), safe_mass);
        add_mass(&mut masses, FocalSet::new(self.frame.iter().cloned()), ignorance);
        DstEvidence::new(name, masses).with_reliability(reliability)
    }

    /// Higher unpaid-invoice spike -> more mass on the risk scenario.
    pub fn dst_invoice(&self, spike_pct: f64) -> DstEvidence {
        let (risk, safe) = if spike_pct > 20.0 {
            (0.70, 0.05)
        } else if spike_pct > 10.0 {
            (0.50, 0.10)
        } else if spike_pct > 5.0 {
            (0.30, 0.20)
        } else {
            (0.10, 0.40)
        };
        self.two_point("ERP_Invoice_Evidence", risk, safe, INVOICE_RELIABILITY)
    }

    /// Deeper production decline -> more mass on the risk scenario.
    pub fn dst_production(&self, output_change_pct: f64) -> DstEvidence {
        let (risk, safe) = if output_change_pct < -15.0 {
            (0.60, 0.05)
        } else if output_change_pct < -8.0 {
            (0.40, 0.10)
        } else if output_change_pct < -3.0 {
            (0.25, 0.20)
        } else {
            (0.05, 0.45)
        };
        self.two_point("IoT_Production_Evidence", risk, safe, PRODUCTION_RELIABILITY)
    }

    /// Less budget left -> more mass on the risk scenario.
    pub fn dst_budget(&self, budget_remaining_pct: f64) -> DstEvidence {
        let (risk, safe) = if budget_remaining_pct < 5.0 {
            (0.65, 0.05)
        } else if budget_remaining_pct < 10.0 {
            (0.45, 0.10)
        } else if budget_remaining_pct < 20.0 {
            (0.25, 0.25)
        } else {
            (0.10, 0.40)
        };
        self.two_point("ERP_Budget_Evidence", risk, safe, BUDGET_RELIABILITY)
    }

    /// Parent-company distress and historical recurrence shift mass to risk.
    pub fn dst_knowledge_graph(&self, client_status: &str, has_historical_pattern: bool) -> DstEvidence {
        let mut risk: f64 = 0.10;
        let mut safe: f64 = 0.30;

        match StatusClass::of(client_status) {
            StatusClass::Bankruptcy => {
                risk += 0.35;
                safe -= 0.15;
            }
            StatusClass::Restructuring => {
                risk += 0.25;
                safe -= 0.10;
            }
            StatusClass::Stable => safe += 0.15,
            StatusClass::Unknown => {}
        }

        if has_historical_pattern {
            risk += 0.15;
            safe -= 0.05;
        }

        self.two_point(
            "KnowledgeGraph_Evidence",
            risk.clamp(0.0, 0.8),
            safe.clamp(0.0, 0.8),
            KNOWLEDGE_GRAPH_RELIABILITY,
        )
    }

    /// Simulation performance scores -> proportional singleton masses.
    pub fn dst_simulation(&self, scores: &ScoreMap) -> DstEvidence {
        let total: f64 = self.frame.iter().filter_map(|id| scores.get(id)).sum();
        let n = self.frame.len().max(1) as f64;

        let mut masses = MassFunction::new();
        let mut assigned = 0.0;
        for id in &self.frame {
            let score = scores.get(id).copied().unwrap_or(0.0);
            let share = if total > 0.0 { score / total } else { 1.0 / n };
            let mass = share * SIMULATION_COMMITTED_MASS;
            add_mass(&mut masses, FocalSet::singleton(id), mass);
            assigned += mass;
        }
        add_mass(
            &mut masses,
            FocalSet::new(self.frame.iter().cloned()),
            (1.0 - assigned).max(0.0),
        );

        DstEvidence::new("Scenario_Simulation_Evidence", masses).with_reliability(SIMULATION_RELIABILITY)
    }

    /// The full DST evidence set for one request.
    pub fn dst_from_inputs(
        &self,
        data: &FinancialData,
        context: &KnowledgeGraphContext,
        scenarios: &[Scenario],
    ) -> Vec<DstEvidence> {
        let scores: ScoreMap = scenarios
            .iter()
            .map(|s| (s.id.clone(), simulation_score(s).max(0.01)))
            .collect();

        vec![
            self.dst_invoice(data.unpaid_invoices_spike),
            self.dst_production(data.production_output_change),
            self.dst_budget(data.budget_remaining_q3),
            self.dst_knowledge_graph(&context.client_parent_status, context.has_historical_pattern()),
            self.dst_simulation(&scores),
        ]
    }

    // =========================================================================
    // Bayesian likelihoods
    // =========================================================================

    fn likelihoods(&self, risk: f64, safe: f64, other: f64) -> BTreeMap<String, f64> {
        self.frame
            .iter()
            .map(|id| {
                let l = if *id == self.risk_scenario {
                    risk
                } else if *id == self.safe_scenario {
                    safe
                } else {
                    other
                };
                (id.clone(), l.clamp(0.0, 1.0))
            })
            .collect()
    }

    /// Invoice spikes are likely under the risk scenario, unlikely under safe.
    pub fn bayes_invoice(&self, spike_pct: f64) -> BayesianEvidence {
        let likelihoods = self.likelihoods(
            (0.3 + spike_pct / 30.0).min(0.95),
            (0.8 - spike_pct / 25.0).max(0.05),
            (0.5 - spike_pct / 50.0).max(0.1),
        );
        BayesianEvidence::new("ERP_Invoice_Likelihood", likelihoods)
            .with_weight(INVOICE_RELIABILITY)
            .with_metadata("spike_pct", json!(spike_pct))
    }

    pub fn bayes_production(&self, output_change_pct: f64) -> BayesianEvidence {
        let likelihoods = self.likelihoods(
            (0.3 + output_change_pct.abs() / 25.0).min(0.9),
            (0.7 + output_change_pct / 30.0).max(0.1),
            0.4,
        );
        BayesianEvidence::new("IoT_Production_Likelihood", likelihoods)
            .with_weight(PRODUCTION_RELIABILITY)
            .with_metadata("output_change_pct", json!(output_change_pct))
    }

    pub fn bayes_knowledge_graph(&self, client_status: &str, has_historical_pattern: bool) -> BayesianEvidence {
        let mut kg_risk = match StatusClass::of(client_status) {
            StatusClass::Bankruptcy => 0.85,
            StatusClass::Restructuring => 0.65,
            StatusClass::Stable => 0.20,
            StatusClass::Unknown => 0.40,
        };
        if has_historical_pattern {
            kg_risk = f64::min(0.95, kg_risk + 0.15);
        }

        let likelihoods = self.likelihoods(kg_risk, 1.0 - kg_risk, 0.4);
        BayesianEvidence::new("KnowledgeGraph_Likelihood", likelihoods)
            .with_weight(KNOWLEDGE_GRAPH_RELIABILITY)
            .with_metadata("client_status", json!(client_status))
            .with_metadata("has_historical_pattern", json!(has_historical_pattern))
    }

    pub fn bayes_budget(&self, budget_remaining_pct: f64) -> BayesianEvidence {
        let likelihoods = self.likelihoods(
            (0.2 + (100.0 - budget_remaining_pct) / 120.0).min(0.90),
            (budget_remaining_pct / 120.0).max(0.05),
            0.35,
        );
        BayesianEvidence::new("ERP_Budget_Likelihood", likelihoods)
            .with_weight(BUDGET_RELIABILITY)
            .with_metadata("budget_remaining_pct", json!(budget_remaining_pct))
    }

    /// Simulation scores used directly as likelihoods.
    pub fn bayes_scenario_scores(&self, scores: &ScoreMap) -> BayesianEvidence {
        let likelihoods: BTreeMap<String, f64> = scores
            .iter()
            .map(|(id, &v)| (id.clone(), v.clamp(0.0, 1.0)))
            .collect();
        BayesianEvidence::new("Scenario_Simulation_Likelihood", likelihoods)
            .with_weight(SIMULATION_RELIABILITY)
    }

    /// The full Bayesian evidence set for one request.
    pub fn bayes_from_inputs(
        &self,
        data: &FinancialData,
        context: &KnowledgeGraphContext,
        scenarios: &[Scenario],
    ) -> Vec<BayesianEvidence> {
        let scores: ScoreMap = scenarios
            .iter()
            .map(|s| (s.id.clone(), simulation_score(s).clamp(0.05, 0.95)))
            .collect();

        vec![
            self.bayes_invoice(data.unpaid_invoices_spike),
            self.bayes_production(data.production_output_change),
            self.bayes_budget(data.budget_remaining_q3),
            self.bayes_knowledge_graph(&context.client_parent_status, context.has_historical_pattern()),
            self.bayes_scenario_scores(&scores),
        ]
    }
}

/// Cash-flow stability, margin preservation and probability blended 5:3:2.
pub fn simulation_score(s: &Scenario) -> f64 {
    s.cash_flow_score() * 0.5 + s.margin_score() * 0.3 + s.probability * 0.2
}

/// Coarse reading of the client parent's status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    Bankruptcy,
    Restructuring,
    Stable,
    Unknown,
}

impl StatusClass {
    fn of(status: &str) -> Self {
        let lower = status.to_lowercase();
        if lower.contains("bankruptcy") || lower.contains("chapter 11") {
            Self::Bankruptcy
        } else if lower.contains("restructuring") {
            Self::Restructuring
        } else if lower.contains("stable") {
            Self::Stable
        } else {
            Self::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenarios() -> Vec<Scenario> {
        vec![
            Scenario::new("A", "Early payment incentive", -20.0, 0.0, 0.85, 30),
            Scenario::new("B", "Renegotiate terms", 0.0, -5.0, 0.90, 45),
            Scenario::new("C", "Hedge exposure", -10.0, -2.0, 0.70, 60),
        ]
    }

    fn mass_on(e: &DstEvidence, id: &str) -> f64 {
        e.masses.get(&FocalSet::singleton(id)).copied().unwrap_or(0.0)
    }

    #[test]
    fn anchors_follow_cash_flow_impact() {
        let b = EvidenceBuilder::for_scenarios(&scenarios()).unwrap();
        assert_eq!(b.risk_scenario(), "A");
        assert_eq!(b.safe_scenario(), "B");
    }

    #[test]
    fn invoice_mass_is_monotonic_in_severity() {
        let b = EvidenceBuilder::for_scenarios(&scenarios()).unwrap();
        let mut last = 0.0;
        for spike in [0.0, 6.0, 11.0, 25.0] {
            let e = b.dst_invoice(spike);
            let risk = mass_on(&e, "A");
            assert!(risk >= last, "risk mass fell at spike {}", spike);
            last = risk;
        }
        let high = b.dst_invoice(25.0);
        assert!(mass_on(&high, "A") > mass_on(&high, "B"));
        let low = b.dst_invoice(2.0);
        assert!(mass_on(&low, "A") < mass_on(&low, "B"));
    }

    #[test]
    fn every_dst_source_sums_to_one() {
        let scen = scenarios();
        let b = EvidenceBuilder::for_scenarios(&scen).unwrap();
        let data = FinancialData::new("ACME", 15.0, -12.0, 5.0);
        let ctx = KnowledgeGraphContext::new("Parent in restructuring");
        for e in b.dst_from_inputs(&data, &ctx, &scen) {
            let total: f64 = e.masses.values().sum();
            assert!((total - 1.0).abs() < 1e-9, "{} sums to {}", e.name, total);
        }
    }

    #[test]
    fn budget_critical_puts_majority_on_risk() {
        let b = EvidenceBuilder::for_scenarios(&scenarios()).unwrap();
        assert!(mass_on(&b.dst_budget(3.0), "A") > 0.5);
    }

    #[test]
    fn single_scenario_frame_accumulates_on_one_focal_set() {
        let scen = vec![Scenario::new("ONLY", "Business as usual", -5.0, 0.0, 0.8, 30)];
        let b = EvidenceBuilder::for_scenarios(&scen).unwrap();
        let e = b.dst_invoice(15.0);
        assert_eq!(e.masses.len(), 1);
        assert!((mass_on(&e, "ONLY") - 1.0).abs() < 1e-12);
    }

    #[test]
    fn likelihoods_stay_in_unit_interval() {
        let b = EvidenceBuilder::for_scenarios(&scenarios()).unwrap();
        for e in [
            b.bayes_invoice(-40.0),
            b.bayes_invoice(80.0),
            b.bayes_production(25.0),
            b.bayes_budget(150.0),
        ] {
            for (id, &l) in &e.likelihoods {
                assert!((0.0..=1.0).contains(&l), "{} likelihood for {} is {}", e.name, id, l);
            }
        }
    }

    #[test]
    fn bankruptcy_raises_risk_likelihood() {
        let b = EvidenceBuilder::for_scenarios(&scenarios()).unwrap();
        let e = b.bayes_knowledge_graph("Parent filed Chapter 11", false);
        assert!(e.likelihoods["A"] > e.likelihoods["B"]);
        assert!((e.weight - 0.80).abs() < f64::EPSILON);
    }
}
