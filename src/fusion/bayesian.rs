// =============================================================================
// Bayesian Engine — sequential posterior updating over scenarios
// =============================================================================
//
//   P(H | E1..En) ∝ P(H) · Π P(Ei | H)^wi
//
// Each source is applied in order starting from the prior (explicit or
// uniform).  A likelihood missing for a scenario defaults to 0.5 (no
// information); a source with weight < 1 has its likelihoods tempered as L^w.
//
// Diagnostics:
//   entropy        H(posterior) in bits, ∈ [0, log2 N]
//   KL             KL(posterior || prior) in nats
//   bayes factors  (post_best / post_alt) / (prior_best / prior_alt)
//   log-likelihood Σ_source Σ_s ln L(s) · posterior_before(s)
//
// The log-likelihood weights each term by the posterior *before* the update
// and uses the raw (untempered) likelihood.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::error::{FusionError, Result};
use crate::evidence::BayesianEvidence;
use crate::fusion::distribution::{
    argmax, ensure_distribution, entropy_bits, kl_divergence, normalize, uniform, ScoreMap,
};

/// Likelihood assumed for a scenario a source says nothing about.
pub const DEFAULT_LIKELIHOOD: f64 = 0.5;

/// Full result of a Bayesian fusion pass.
#[derive(Debug, Clone)]
pub struct BayesianResult {
    pub posterior: ScoreMap,
    pub prior: ScoreMap,
    /// Prior followed by the posterior after each source.
    pub evidence_trail: Vec<ScoreMap>,
    pub log_likelihood: f64,
    pub decision: String,
    pub confidence: f64,
    /// "{best}_vs_{alt}" -> Bayes factor; +∞ when degenerate.
    pub bayes_factors: BTreeMap<String, f64>,
    pub entropy: f64,
    pub kl_divergence: f64,
}

pub struct BayesianEngine {
    scenarios: Vec<String>,
    prior: ScoreMap,
}

impl BayesianEngine {
    /// Create an engine over `scenarios` with an explicit or uniform prior.
    pub fn new(scenarios: Vec<String>, prior: Option<ScoreMap>) -> Result<Self> {
        if scenarios.is_empty() {
            return Err(FusionError::degenerate("Bayesian engine needs at least one scenario"));
        }

        let prior = match prior {
            None => uniform(&scenarios),
            Some(p) => {
                for (id, &v) in &p {
                    if !scenarios.contains(id) {
                        return Err(FusionError::degenerate(format!(
                            "prior references unknown scenario '{}'",
                            id
                        )));
                    }
                    if !(0.0..=1.0).contains(&v) {
                        return Err(FusionError::invalid_evidence(
                            "prior",
                            format!("probability {} for '{}' outside [0, 1]", v, id),
                        ));
                    }
                }
                // Scenarios the prior omits carry zero prior mass.
                scenarios
                    .iter()
                    .map(|id| (id.clone(), p.get(id).copied().unwrap_or(0.0)))
                    .collect()
            }
        };
        ensure_distribution("prior", &prior)?;

        Ok(Self { scenarios, prior })
    }

    pub fn prior(&self) -> &ScoreMap {
        &self.prior
    }

    pub fn scenarios(&self) -> &[String] {
        &self.scenarios
    }

    /// Likelihoods in [0, 1], weight in [0, 1], only known scenario ids.
    pub fn validate_evidence(&self, evidence: &BayesianEvidence) -> Result<()> {
        if !(0.0..=1.0).contains(&evidence.weight) {
            return Err(FusionError::invalid_evidence(
                &evidence.name,
                format!("weight {} outside [0, 1]", evidence.weight),
            ));
        }
        for (id, &l) in &evidence.likelihoods {
            if !(0.0..=1.0).contains(&l) {
                return Err(FusionError::invalid_evidence(
                    &evidence.name,
                    format!("likelihood for '{}' is {}, must be in [0, 1]", id, l),
                ));
            }
            if !self.scenarios.contains(id) {
                return Err(FusionError::degenerate(format!(
                    "evidence '{}' references unknown scenario '{}'",
                    evidence.name, id
                )));
            }
        }
        Ok(())
    }

    fn likelihood(evidence: &BayesianEvidence, id: &str) -> f64 {
        evidence.likelihoods.get(id).copied().unwrap_or(DEFAULT_LIKELIHOOD)
    }

    /// One update step: posterior(s) · L(s)^w, normalized.
    pub fn update(&self, posterior: &ScoreMap, evidence: &BayesianEvidence) -> Result<ScoreMap> {
        self.validate_evidence(evidence)?;

        let unnormalized: ScoreMap = self
            .scenarios
            .iter()
            .map(|id| {
                let mut l = Self::likelihood(evidence, id);
                if evidence.weight < 1.0 {
                    l = l.powf(evidence.weight);
                }
                (id.clone(), posterior.get(id).copied().unwrap_or(0.0) * l)
            })
            .collect();

        let updated = normalize(&self.scenarios, &unnormalized);
        ensure_distribution(&format!("posterior after '{}'", evidence.name), &updated)?;

        trace!(
            source = %evidence.name,
            weight = format!("{:.2}", evidence.weight),
            "Bayesian update applied"
        );
        Ok(updated)
    }

    /// Apply every source in order and compute the diagnostics.
    pub fn fuse(&self, sources: &[BayesianEvidence]) -> Result<BayesianResult> {
        let mut current = self.prior.clone();
        let mut evidence_trail = Vec::with_capacity(sources.len() + 1);
        evidence_trail.push(current.clone());
        let mut log_likelihood = 0.0;

        for source in sources {
            self.validate_evidence(source)?;

            for id in &self.scenarios {
                let l = Self::likelihood(source, id);
                if l > 0.0 {
                    log_likelihood += l.ln() * current.get(id).copied().unwrap_or(0.0);
                }
            }

            current = self.update(&current, source)?;
            evidence_trail.push(current.clone());
        }

        let (decision, confidence) = argmax(&self.scenarios, &current)
            .ok_or_else(|| FusionError::degenerate("Bayesian engine needs at least one scenario"))?;
        let bayes_factors = self.bayes_factors(&current, &decision);
        let entropy = entropy_bits(&current);
        let kl = kl_divergence(&self.scenarios, &current, &self.prior);

        debug!(
            sources = sources.len(),
            decision = %decision,
            confidence = format!("{:.4}", confidence),
            entropy = format!("{:.4}", entropy),
            kl = format!("{:.4}", kl),
            "Bayesian fusion complete"
        );

        Ok(BayesianResult {
            posterior: current,
            prior: self.prior.clone(),
            evidence_trail,
            log_likelihood,
            decision,
            confidence,
            bayes_factors,
            entropy,
            kl_divergence: kl,
        })
    }

    /// Bayes factor of `best` against every other scenario.
    pub fn bayes_factors(&self, posterior: &ScoreMap, best: &str) -> BTreeMap<String, f64> {
        let get = |m: &ScoreMap, id: &str| m.get(id).copied().unwrap_or(0.0);
        let best_post = get(posterior, best);
        let best_prior = get(&self.prior, best);

        self.scenarios
            .iter()
            .filter(|id| id.as_str() != best)
            .map(|alt| {
                let alt_post = get(posterior, alt);
                let alt_prior = get(&self.prior, alt);
                let factor = if alt_post > 0.0 && best_prior > 0.0 {
                    let post_odds = best_post / alt_post;
                    let prior_odds = if alt_prior > 0.0 { best_prior / alt_prior } else { 1.0 };
                    post_odds / prior_odds
                } else {
                    f64::INFINITY
                };
                (format!("{}_vs_{}", best, alt), factor)
            })
            .collect()
    }
}
