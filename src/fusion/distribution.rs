// =============================================================================
// Distribution helpers — normalization, conservation checks, information
// =============================================================================
//
// Every score map the fusion core hands back claims to be a probability
// distribution over scenario ids.  These helpers normalize, verify the
// sum-to-one invariant, and compute the information-theoretic diagnostics
// shared by the Bayesian engine and the explanation layer:
//
//   H(p)         = -Σ p · log2(p)            (bits, 0 · log2(0) := 0)
//   KL(p || q)   =  Σ p · ln(p / q)          (nats, only where p, q > 0)

use std::collections::BTreeMap;

use crate::error::{FusionError, Result};

/// Scenario id -> probability/score. Ordered so serialization is stable.
pub type ScoreMap = BTreeMap<String, f64>;

/// Tolerance for the sum-to-one invariant.
pub const TOLERANCE: f64 = 1e-6;

/// Normalize `values` (keyed by `ids`) to sum to one.
///
/// Negative values carry no mass. Falls back to uniform when nothing
/// positive remains.
pub fn normalize(ids: &[String], values: &ScoreMap) -> ScoreMap {
    let mass = |id: &String| values.get(id).copied().unwrap_or(0.0).max(0.0);
    let total: f64 = ids.iter().map(mass).sum();

    if total <= 0.0 || !total.is_finite() {
        return uniform(ids);
    }

    ids.iter().map(|id| (id.clone(), mass(id) / total)).collect()
}

/// Uniform distribution over `ids`.
pub fn uniform(ids: &[String]) -> ScoreMap {
    let n = ids.len().max(1) as f64;
    ids.iter().map(|id| (id.clone(), 1.0 / n)).collect()
}

/// Fail with `InvalidDistribution` unless every entry lies in [0, 1] and
/// `dist` sums to 1, both within tolerance.
pub fn ensure_distribution(name: &str, dist: &ScoreMap) -> Result<()> {
    let total: f64 = dist.values().sum();
    if (total - 1.0).abs() > TOLERANCE || !total.is_finite() {
        return Err(FusionError::invalid_distribution(name, total));
    }
    if let Some((id, &p)) = dist
        .iter()
        .find(|(_, p)| !(-TOLERANCE..=1.0 + TOLERANCE).contains(*p))
    {
        return Err(FusionError::invalid_evidence(
            name,
            format!("probability {} for '{}' outside [0, 1]", p, id),
        ));
    }
    Ok(())
}

/// Highest-scoring id. Ties resolve to the id that comes first in `ids`.
pub fn argmax(ids: &[String], dist: &ScoreMap) -> Option<(String, f64)> {
    let mut best: Option<(&String, f64)> = None;
    for id in ids {
        let v = dist.get(id).copied().unwrap_or(0.0);
        match best {
            Some((_, b)) if b >= v => {}
            _ => best = Some((id, v)),
        }
    }
    best.map(|(id, v)| (id.clone(), v))
}

/// Shannon entropy in bits.
pub fn entropy_bits(dist: &ScoreMap) -> f64 {
    dist.values()
        .map(|&p| if p > 0.0 { -p * p.log2() } else { 0.0 })
        .sum()
}

/// Kullback-Leibler divergence KL(p || q) in nats over `ids`.
pub fn kl_divergence(ids: &[String], p: &ScoreMap, q: &ScoreMap) -> f64 {
    ids.iter()
        .map(|id| {
            let pv = p.get(id).copied().unwrap_or(0.0);
            let qv = q.get(id).copied().unwrap_or(0.0);
            if pv > 0.0 && qv > 0.0 {
                pv * (pv / qv).ln()
            } else {
                0.0
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn map(pairs: &[(&str, f64)]) -> ScoreMap {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn normalize_sums_to_one() {
        let ids = ids(&["A", "B", "C"]);
        let d = normalize(&ids, &map(&[("A", 2.0), ("B", 1.0), ("C", 1.0)]));
        assert!((d["A"] - 0.5).abs() < 1e-12);
        assert!(ensure_distribution("test", &d).is_ok());
    }

    #[test]
    fn normalize_zero_mass_falls_back_to_uniform() {
        let ids = ids(&["A", "B", "C", "D"]);
        let d = normalize(&ids, &map(&[("A", 0.0), ("B", 0.0)]));
        for v in d.values() {
            assert!((v - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn ensure_distribution_rejects_bad_sum() {
        let err = ensure_distribution("prior", &map(&[("A", 0.5), ("B", 0.4)])).unwrap_err();
        assert!(matches!(err, FusionError::InvalidDistribution { .. }));
    }

    #[test]
    fn normalize_drops_negative_mass() {
        let ids = ids(&["OK", "BAD"]);
        let d = normalize(&ids, &map(&[("OK", 0.5), ("BAD", -1.26)]));
        assert!((d["OK"] - 1.0).abs() < 1e-12);
        assert!(d["BAD"].abs() < 1e-12);

        let all_negative = normalize(&ids, &map(&[("OK", -0.45), ("BAD", -1.8)]));
        assert!((all_negative["OK"] - 0.5).abs() < 1e-12);
        assert!(ensure_distribution("test", &all_negative).is_ok());
    }

    #[test]
    fn ensure_distribution_rejects_out_of_range_entries() {
        let err = ensure_distribution("scores", &map(&[("A", 1.6579), ("B", -0.6579)])).unwrap_err();
        assert!(matches!(err, FusionError::InvalidEvidence { .. }), "got {:?}", err);
    }

    #[test]
    fn argmax_ties_go_to_input_order() {
        let ids = ids(&["B", "A"]);
        let (best, v) = argmax(&ids, &map(&[("A", 0.5), ("B", 0.5)])).unwrap();
        assert_eq!(best, "B");
        assert!((v - 0.5).abs() < 1e-12);
    }

    #[test]
    fn entropy_bounds() {
        let ids = ids(&["A", "B", "C", "D"]);
        let h = entropy_bits(&uniform(&ids));
        assert!((h - 2.0).abs() < 1e-12, "uniform over 4 should be 2 bits, got {:.6}", h);
        let certain = map(&[("A", 1.0), ("B", 0.0)]);
        assert!(entropy_bits(&certain).abs() < 1e-12);
    }

    #[test]
    fn kl_of_identical_is_zero() {
        let ids = ids(&["A", "B"]);
        let p = map(&[("A", 0.3), ("B", 0.7)]);
        assert!(kl_divergence(&ids, &p, &p).abs() < 1e-12);
        let q = uniform(&ids);
        assert!(kl_divergence(&ids, &p, &q) > 0.0);
    }
}
