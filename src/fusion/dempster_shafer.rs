// =============================================================================
// Dempster-Shafer Engine — belief-function fusion over the scenario frame
// =============================================================================
//
// Frame of discernment Θ = the candidate scenario ids.  Each source commits
// mass to subsets of Θ; mass on Θ itself is explicit ignorance.
//
// Dempster's rule for two sources:
//
//   m12(A) = 1 / (1 - K) · Σ { m1(B) · m2(C) : B ∩ C = A }
//   K      =               Σ { m1(B) · m2(C) : B ∩ C = ∅ }
//
// K = 1 means the sources contradict each other completely and no combined
// belief exists; that is reported as `FusionConflict` instead of guessing.
//
// Decision making uses the pignistic transform:
//
//   BetP(x) = Σ { m(B) / |B| : x ∈ B }
//
// decision = argmax BetP, confidence = max BetP.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{FusionError, Result};
use crate::evidence::{add_mass, DstEvidence, FocalSet, MassFunction};
use crate::fusion::distribution::{argmax, ensure_distribution, ScoreMap, TOLERANCE};

/// K at or above this value is treated as total conflict.
const TOTAL_CONFLICT: f64 = 1.0 - 1e-10;

/// Conflict above which a combination step is logged as a warning.
const HIGH_CONFLICT: f64 = 0.6;

// =============================================================================
// Types
// =============================================================================

/// Outcome of sequentially combining N sources.
#[derive(Debug, Clone)]
pub struct Combination {
    pub mass: MassFunction,
    /// Fraction of mass discarded across all steps: 1 - Π(1 - K_i).
    pub cumulative_conflict: f64,
    /// K of each pairwise step, in combination order.
    pub step_conflicts: Vec<f64>,
}

impl Combination {
    pub fn max_step_conflict(&self) -> f64 {
        self.step_conflicts.iter().copied().fold(0.0, f64::max)
    }
}

/// Full result of a DST fusion pass.
#[derive(Debug, Clone)]
pub struct DstResult {
    pub combined_mass: MassFunction,
    pub belief: ScoreMap,
    pub plausibility: ScoreMap,
    /// (Bel({s}), Pl({s})) per scenario.
    pub intervals: BTreeMap<String, (f64, f64)>,
    pub pignistic: ScoreMap,
    pub cumulative_conflict: f64,
    pub max_step_conflict: f64,
    pub decision: String,
    pub confidence: f64,
    pub sources: Vec<String>,
}

/// Serializable view of the combined focal elements.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FocalElement {
    pub scenarios: Vec<String>,
    pub mass: f64,
}

impl DstResult {
    pub fn focal_elements(&self) -> Vec<FocalElement> {
        self.combined_mass
            .iter()
            .map(|(focal, &mass)| FocalElement {
                scenarios: focal.iter().cloned().collect(),
                mass,
            })
            .collect()
    }
}

// =============================================================================
// DempsterShaferEngine
// =============================================================================

pub struct DempsterShaferEngine {
    frame: Vec<String>,
    theta: FocalSet,
}

impl DempsterShaferEngine {
    /// Create an engine over `frame` (scenario ids, input order kept for
    /// tie-breaking).
    pub fn new(frame: Vec<String>) -> Result<Self> {
        if frame.is_empty() {
            return Err(FusionError::degenerate("frame of discernment is empty"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = frame.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(FusionError::degenerate(format!(
                "duplicate scenario id '{}' in frame",
                dup
            )));
        }

        let theta = FocalSet::new(frame.iter().cloned());
        Ok(Self { frame, theta })
    }

    pub fn frame(&self) -> &[String] {
        &self.frame
    }

    /// The full frame Θ.
    pub fn theta(&self) -> &FocalSet {
        &self.theta
    }

    /// Check one source: masses in [0, 1], non-empty focal sets inside Θ,
    /// total mass 1, reliability in [0, 1].
    pub fn validate(&self, evidence: &DstEvidence) -> Result<()> {
        if !(0.0..=1.0).contains(&evidence.reliability) {
            return Err(FusionError::invalid_evidence(
                &evidence.name,
                format!("reliability {} outside [0, 1]", evidence.reliability),
            ));
        }

        for (focal, &mass) in &evidence.masses {
            if !(0.0..=1.0).contains(&mass) {
                return Err(FusionError::invalid_evidence(
                    &evidence.name,
                    format!("mass {} on {} outside [0, 1]", mass, focal),
                ));
            }
            if focal.is_empty() {
                return Err(FusionError::invalid_evidence(
                    &evidence.name,
                    "mass assigned to the empty set",
                ));
            }
            if !focal.is_subset(&self.theta) {
                let unknown: Vec<&str> = focal
                    .iter()
                    .filter(|id| !self.theta.contains(id))
                    .map(String::as_str)
                    .collect();
                return Err(FusionError::degenerate(format!(
                    "evidence '{}' references unknown scenario(s): {}",
                    evidence.name,
                    unknown.join(", ")
                )));
            }
        }

        let total: f64 = evidence.masses.values().sum();
        if (total - 1.0).abs() > TOLERANCE {
            return Err(FusionError::invalid_distribution(&evidence.name, total));
        }
        Ok(())
    }

    /// Shafer discounting by source reliability α:
    ///
    ///   m'(A) = α · m(A)            for A ≠ Θ
    ///   m'(Θ) = 1 - α · (1 - m(Θ))
    pub fn discount(&self, evidence: &DstEvidence) -> MassFunction {
        let alpha = evidence.reliability;
        if alpha >= 1.0 {
            return evidence.masses.clone();
        }

        let theta_mass = evidence.masses.get(&self.theta).copied().unwrap_or(0.0);
        let mut discounted: MassFunction = evidence
            .masses
            .iter()
            .filter(|(focal, _)| **focal != self.theta)
            .map(|(focal, &mass)| (focal.clone(), alpha * mass))
            .collect();
        discounted.insert(self.theta.clone(), 1.0 - alpha * (1.0 - theta_mass));
        discounted
    }

    /// Dempster's rule for two mass functions. Returns the normalized
    /// combination and the conflict K of this step.
    pub fn combine_pair(
        &self,
        m1: &MassFunction,
        m2: &MassFunction,
        left: &str,
        right: &str,
    ) -> Result<(MassFunction, f64)> {
        let mut combined = MassFunction::new();
        let mut conflict = 0.0_f64;

        for (a, &v1) in m1 {
            for (b, &v2) in m2 {
                let product = v1 * v2;
                let intersection = a.intersection(b);
                if intersection.is_empty() {
                    conflict += product;
                } else {
                    add_mass(&mut combined, intersection, product);
                }
            }
        }

        if conflict >= TOTAL_CONFLICT {
            warn!(
                left,
                right,
                conflict = format!("{:.6}", conflict),
                "DST total conflict: sources are completely contradictory"
            );
            return Err(FusionError::FusionConflict {
                left: left.to_string(),
                right: right.to_string(),
                conflict,
            });
        }

        let norm = 1.0 / (1.0 - conflict);
        for mass in combined.values_mut() {
            *mass *= norm;
        }

        if conflict > HIGH_CONFLICT {
            warn!(
                left,
                right,
                conflict = format!("{:.4}", conflict),
                "DST high inter-source conflict"
            );
        } else {
            trace!(
                left,
                right,
                conflict = format!("{:.4}", conflict),
                focal_elements = combined.len(),
                "DST pair combined"
            );
        }

        Ok((combined, conflict))
    }

    /// Validate, discount and combine all sources left to right.
    ///
    /// With no sources the result is the vacuous mass function m(Θ) = 1.
    pub fn combine_all(&self, sources: &[DstEvidence]) -> Result<Combination> {
        for source in sources {
            self.validate(source)?;
        }

        let Some((first, rest)) = sources.split_first() else {
            let mut mass = MassFunction::new();
            mass.insert(self.theta.clone(), 1.0);
            return Ok(Combination {
                mass,
                cumulative_conflict: 0.0,
                step_conflicts: Vec::new(),
            });
        };

        let mut mass = self.discount(first);
        let mut label = first.name.clone();
        let mut retained = 1.0_f64;
        let mut step_conflicts = Vec::with_capacity(rest.len());

        for source in rest {
            let (next, k) = self.combine_pair(&mass, &self.discount(source), &label, &source.name)?;
            mass = next;
            retained *= 1.0 - k;
            step_conflicts.push(k);
            label = format!("{} ⊕ {}", label, source.name);
        }

        let total: f64 = mass.values().sum();
        if (total - 1.0).abs() > TOLERANCE {
            return Err(FusionError::invalid_distribution("combined mass", total));
        }

        Ok(Combination {
            mass,
            cumulative_conflict: 1.0 - retained,
            step_conflicts,
        })
    }

    /// Bel(A) = Σ { m(B) : B ⊆ A }.
    pub fn belief(&self, mass: &MassFunction, hypothesis: &FocalSet) -> f64 {
        mass.iter()
            .filter(|(focal, _)| !focal.is_empty() && focal.is_subset(hypothesis))
            .map(|(_, &v)| v)
            .sum()
    }

    /// Pl(A) = Σ { m(B) : B ∩ A ≠ ∅ }.
    pub fn plausibility(&self, mass: &MassFunction, hypothesis: &FocalSet) -> f64 {
        mass.iter()
            .filter(|(focal, _)| focal.intersects(hypothesis))
            .map(|(_, &v)| v)
            .sum()
    }

    /// Pignistic transform. The result must sum to 1.
    pub fn pignistic_probability(&self, mass: &MassFunction) -> Result<ScoreMap> {
        let mut bet_p: ScoreMap = self.frame.iter().map(|id| (id.clone(), 0.0)).collect();

        for (focal, &v) in mass {
            if focal.is_empty() {
                continue;
            }
            let share = v / focal.len() as f64;
            for id in focal.iter() {
                if let Some(p) = bet_p.get_mut(id) {
                    *p += share;
                }
            }
        }

        ensure_distribution("pignistic probability", &bet_p)?;
        Ok(bet_p)
    }

    /// Complete pipeline: combine, interval per scenario, pignistic decision.
    pub fn fuse(&self, sources: &[DstEvidence]) -> Result<DstResult> {
        let combination = self.combine_all(sources)?;
        let max_step_conflict = combination.max_step_conflict();
        let mass = combination.mass;

        let mut belief = ScoreMap::new();
        let mut plausibility = ScoreMap::new();
        let mut intervals = BTreeMap::new();
        for id in &self.frame {
            let singleton = FocalSet::singleton(id.clone());
            let bel = self.belief(&mass, &singleton);
            let pl = self.plausibility(&mass, &singleton);
            belief.insert(id.clone(), bel);
            plausibility.insert(id.clone(), pl);
            intervals.insert(id.clone(), (bel, pl));
        }

        let pignistic = self.pignistic_probability(&mass)?;
        let (decision, confidence) = argmax(&self.frame, &pignistic)
            .ok_or_else(|| FusionError::degenerate("frame of discernment is empty"))?;

        debug!(
            sources = sources.len(),
            focal_elements = mass.len(),
            conflict = format!("{:.4}", combination.cumulative_conflict),
            decision = %decision,
            confidence = format!("{:.4}", confidence),
            "DST fusion complete"
        );

        Ok(DstResult {
            combined_mass: mass,
            belief,
            plausibility,
            intervals,
            pignistic,
            cumulative_conflict: combination.cumulative_conflict,
            max_step_conflict,
            decision,
            confidence,
            sources: sources.iter().map(|s| s.name.clone()).collect(),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Vec<String> {
        vec!["A".into(), "B".into(), "C".into()]
    }

    fn engine() -> DempsterShaferEngine {
        DempsterShaferEngine::new(frame()).unwrap()
    }

    fn src(name: &str, assignments: &[(&str, f64)]) -> DstEvidence {
        DstEvidence::from_assignments(name, &frame(), assignments)
    }

    #[test]
    fn empty_frame_is_degenerate() {
        assert!(matches!(
            DempsterShaferEngine::new(Vec::new()),
            Err(FusionError::DegenerateInput(_))
        ));
    }

    #[test]
    fn validate_rejects_mass_out_of_range() {
        let mut masses = MassFunction::new();
        masses.insert(FocalSet::singleton("A"), 1.3);
        masses.insert(FocalSet::singleton("B"), -0.3);
        let err = engine().validate(&DstEvidence::new("bad", masses)).unwrap_err();
        match err {
            FusionError::InvalidEvidence { source_name, reason } => {
                assert_eq!(source_name, "bad");
                assert!(reason.contains("{A}") || reason.contains("{B}"), "reason: {}", reason);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn validate_rejects_unknown_scenario() {
        let mut masses = MassFunction::new();
        masses.insert(FocalSet::singleton("Z"), 1.0);
        let err = engine().validate(&DstEvidence::new("ghost", masses)).unwrap_err();
        assert!(matches!(err, FusionError::DegenerateInput(_)));
    }

    #[test]
    fn validate_rejects_mass_not_summing_to_one() {
        let mut masses = MassFunction::new();
        masses.insert(FocalSet::singleton("A"), 0.5);
        let err = engine().validate(&DstEvidence::new("short", masses)).unwrap_err();
        assert!(matches!(err, FusionError::InvalidDistribution { .. }));
    }

    #[test]
    fn combination_reinforces_agreeing_sources() {
        let e = engine();
        let s1 = src("s1", &[("A", 0.6)]);
        let s2 = src("s2", &[("A", 0.5)]);
        let (m, k) = e.combine_pair(&s1.masses, &s2.masses, "s1", "s2").unwrap();
        assert!(m[&FocalSet::singleton("A")] > 0.6);
        assert!(k.abs() < 1e-12);
    }

    #[test]
    fn conflicting_sources_report_high_conflict() {
        let e = engine();
        let s1 = src("s1", &[("A", 0.9)]);
        let s2 = src("s2", &[("B", 0.9)]);
        let (_, k) = e.combine_pair(&s1.masses, &s2.masses, "s1", "s2").unwrap();
        assert!((k - 0.81).abs() < 1e-12);
    }

    #[test]
    fn total_conflict_is_an_error() {
        let e = engine();
        let s1 = src("s1", &[("A", 1.0)]);
        let s2 = src("s2", &[("B", 1.0)]);
        let err = e.fuse(&[s1, s2]).unwrap_err();
        assert!(matches!(err, FusionError::FusionConflict { .. }));
    }

    #[test]
    fn cumulative_conflict_compounds_steps() {
        let e = engine();
        let sources = vec![
            src("s1", &[("A", 0.5)]),
            src("s2", &[("B", 0.5)]),
            src("s3", &[("C", 0.5)]),
        ];
        let c = e.combine_all(&sources).unwrap();
        assert_eq!(c.step_conflicts.len(), 2);
        let expected = 1.0 - c.step_conflicts.iter().map(|k| 1.0 - k).product::<f64>();
        assert!((c.cumulative_conflict - expected).abs() < 1e-12);
        assert!(c.cumulative_conflict >= c.max_step_conflict());
    }

    #[test]
    fn no_sources_is_vacuous() {
        let e = engine();
        let r = e.fuse(&[]).unwrap();
        for p in r.pignistic.values() {
            assert!((p - 1.0 / 3.0).abs() < 1e-12);
        }
        assert_eq!(r.decision, "A");
        assert!(r.cumulative_conflict.abs() < 1e-12);
    }

    #[test]
    fn vacuous_source_leaves_result_unchanged() {
        let e = engine();
        let informative = src("s1", &[("A", 0.5), ("B", 0.2)]);
        let alone = e.fuse(&[informative.clone()]).unwrap();
        let with_vacuous = e
            .fuse(&[informative, DstEvidence::vacuous("nothing", &frame())])
            .unwrap();
        for id in frame() {
            assert!((alone.pignistic[&id] - with_vacuous.pignistic[&id]).abs() < 1e-12);
        }
    }

    #[test]
    fn belief_never_exceeds_plausibility() {
        let e = engine();
        let r = e
            .fuse(&[src("s1", &[("A", 0.4), ("B", 0.3)]), src("s2", &[("B", 0.3), ("C", 0.2)])])
            .unwrap();
        for (bel, pl) in r.intervals.values() {
            assert!(*bel <= *pl + 1e-10);
        }
    }

    #[test]
    fn pignistic_sums_to_one_and_splits_sets() {
        let e = engine();
        let mut masses = MassFunction::new();
        masses.insert(FocalSet::new(["A", "B"]), 0.6);
        masses.insert(FocalSet::new(frame()), 0.4);
        let p = e.pignistic_probability(&masses).unwrap();
        assert!((p["A"] - (0.3 + 0.4 / 3.0)).abs() < 1e-12);
        assert!((p.values().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn discounting_moves_mass_to_theta() {
        let e = engine();
        let s = src("s", &[("A", 0.8)]).with_reliability(0.5);
        let d = e.discount(&s);
        assert!((d[&FocalSet::singleton("A")] - 0.4).abs() < 1e-12);
        assert!((d[e.theta()] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn full_pipeline_picks_supported_scenario() {
        let e = engine();
        let r = e
            .fuse(&[
                src("s1", &[("A", 0.6), ("B", 0.1)]),
                src("s2", &[("A", 0.5), ("C", 0.2)]),
                src("s3", &[("A", 0.4)]),
            ])
            .unwrap();
        assert_eq!(r.decision, "A");
        assert!((r.confidence - r.pignistic["A"]).abs() < 1e-12);
        assert_eq!(r.sources.len(), 3);
    }
}
