// =============================================================================
// Evidence Module
// =============================================================================
//
// Strategy-specific evidence produced from raw financial metrics:
// - Dempster-Shafer mass assignments over subsets of the scenario frame
// - Bayesian likelihoods P(evidence | scenario) with a reliability weight
//
// Both kinds travel through the engine as one tagged `Evidence` enum so that
// each strategy only ever sees the variant it understands.

pub mod builder;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub use builder::EvidenceBuilder;

// =============================================================================
// Focal sets & mass functions
// =============================================================================

/// A non-empty subset of the frame of discernment (scenario ids).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FocalSet(BTreeSet<String>);

impl FocalSet {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(ids.into_iter().map(Into::into).collect())
    }

    pub fn singleton(id: impl Into<String>) -> Self {
        let id: String = id.into();
        Self::new([id])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn intersection(&self, other: &FocalSet) -> FocalSet {
        Self(self.0.intersection(&other.0).cloned().collect())
    }

    pub fn is_subset(&self, other: &FocalSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn intersects(&self, other: &FocalSet) -> bool {
        !self.0.is_disjoint(&other.0)
    }
}

impl std::fmt::Display for FocalSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<&str> = self.0.iter().map(String::as_str).collect();
        write!(f, "{{{}}}", ids.join(", "))
    }
}

/// Basic probability assignment: focal set -> committed mass.
pub type MassFunction = BTreeMap<FocalSet, f64>;

/// Add `mass` onto `focal`, accumulating when the set is already present.
pub fn add_mass(m: &mut MassFunction, focal: FocalSet, mass: f64) {
    *m.entry(focal).or_insert(0.0) += mass;
}

/// JSON shape of one focal element: `{ "scenarios": [...], "mass": 0.4 }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FocalMass {
    scenarios: Vec<String>,
    mass: f64,
}

/// JSON object keys must be strings, so mass functions travel as a list.
mod focal_masses {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{add_mass, FocalMass, FocalSet, MassFunction};

    pub fn serialize<S: Serializer>(m: &MassFunction, ser: S) -> Result<S::Ok, S::Error> {
        let entries: Vec<FocalMass> = m
            .iter()
            .map(|(focal, &mass)| FocalMass {
                scenarios: focal.iter().cloned().collect(),
                mass,
            })
            .collect();
        entries.serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<MassFunction, D::Error> {
        let entries = Vec::<FocalMass>::deserialize(de)?;
        let mut m = MassFunction::new();
        for e in entries {
            add_mass(&mut m, FocalSet::new(e.scenarios), e.mass);
        }
        Ok(m)
    }
}

fn default_reliability() -> f64 {
    1.0
}

// =============================================================================
// Evidence variants
// =============================================================================

/// One Dempster-Shafer evidence source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DstEvidence {
    pub name: String,
    #[serde(with = "focal_masses")]
    pub masses: MassFunction,
    /// Source reliability α; (1 - α) of the committed mass is moved to Θ.
    #[serde(default = "default_reliability")]
    pub reliability: f64,
}

impl DstEvidence {
    pub fn new(name: impl Into<String>, masses: MassFunction) -> Self {
        Self {
            name: name.into(),
            masses,
            reliability: 1.0,
        }
    }

    pub fn with_reliability(mut self, reliability: f64) -> Self {
        self.reliability = reliability;
        self
    }

    /// Build from singleton assignments; whatever is left goes to `frame` (Θ).
    pub fn from_assignments(
        name: impl Into<String>,
        frame: &[String],
        assignments: &[(&str, f64)],
    ) -> Self {
        let mut masses = MassFunction::new();
        let mut assigned = 0.0;
        for &(id, mass) in assignments {
            add_mass(&mut masses, FocalSet::singleton(id), mass);
            assigned += mass;
        }
        let remaining = 1.0 - assigned;
        if remaining > 0.0 {
            add_mass(&mut masses, FocalSet::new(frame.iter().cloned()), remaining);
        }
        Self::new(name, masses)
    }

    /// The vacuous source: all mass on Θ ("don't know").
    pub fn vacuous(name: impl Into<String>, frame: &[String]) -> Self {
        let mut masses = MassFunction::new();
        masses.insert(FocalSet::new(frame.iter().cloned()), 1.0);
        Self::new(name, masses)
    }
}

/// One Bayesian evidence source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BayesianEvidence {
    pub name: String,
    /// Scenario id -> P(evidence | scenario).
    pub likelihoods: BTreeMap<String, f64>,
    /// Reliability in [0, 1]; likelihoods are tempered as L^weight when < 1.
    #[serde(default = "default_reliability")]
    pub weight: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl BayesianEvidence {
    pub fn new(name: impl Into<String>, likelihoods: BTreeMap<String, f64>) -> Self {
        Self {
            name: name.into(),
            likelihoods,
            weight: 1.0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Evidence for one of the belief-based strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    DempsterShafer(DstEvidence),
    Bayesian(BayesianEvidence),
}

impl Evidence {
    pub fn name(&self) -> &str {
        match self {
            Self::DempsterShafer(e) => &e.name,
            Self::Bayesian(e) => &e.name,
        }
    }

    /// Split a mixed list into the per-strategy inputs, preserving order.
    pub fn partition(evidence: &[Evidence]) -> (Vec<DstEvidence>, Vec<BayesianEvidence>) {
        let mut dst = Vec::new();
        let mut bayes = Vec::new();
        for e in evidence {
            match e {
                Self::DempsterShafer(d) => dst.push(d.clone()),
                Self::Bayesian(b) => bayes.push(b.clone()),
            }
        }
        (dst, bayes)
    }
}
