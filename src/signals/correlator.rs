// =============================================================================
// Weak-Signal Correlator — surfacing patterns no single indicator shows
// =============================================================================
//
// Collects weak signals and runs four independent, non-exclusive passes over
// the working set:
//
//   1. Category clustering   ≥ N signals share a category
//   2. Temporal clustering   ≥ N signals inside one greedy 72 h window
//   3. Cross-source          one category flagged by ≥ 2 distinct sources
//   4. Escalating trend      strengths rising across a category over time
//
// Independent strengths combine as a probabilistic OR:
//
//   combined = 1 - Π (1 - s_i)
//
// Cross-source strengths are boosted ×1.2 and may exceed 1; callers clamp for
// display.  Results are deduplicated on the first 80 characters of their
// narrative and stably sorted by descending strength.
//
// The working set is owned by one caller.  Share it through a
// `CorrelatorHandle` when more than one task needs it.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::weak_signal::WeakSignal;

/// Shared, externally locked correlator.
pub type CorrelatorHandle = Arc<RwLock<WeakSignalCorrelator>>;

/// Narrative prefix length used for deduplication.
const DEDUP_PREFIX_CHARS: usize = 80;

/// Longest accepted temporal window (100 years).
pub const MAX_TIME_WINDOW_HOURS: i64 = 24 * 365 * 100;

// =============================================================================
// Config
// =============================================================================

fn default_cluster_threshold() -> usize {
    3
}
fn default_time_window_hours() -> i64 {
    72
}
fn default_strength_floor() -> f64 {
    0.15
}
fn default_cross_source_boost() -> f64 {
    1.2
}
fn default_trend_min_signals() -> usize {
    3
}
fn default_trend_increase_ratio() -> f64 {
    0.6
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatorConfig {
    /// Minimum signals for a category or temporal cluster.
    #[serde(default = "default_cluster_threshold")]
    pub cluster_threshold: usize,
    #[serde(default = "default_time_window_hours")]
    pub time_window_hours: i64,
    /// Signals weaker than this are dropped on ingest.
    #[serde(default = "default_strength_floor")]
    pub strength_floor: f64,
    #[serde(default = "default_cross_source_boost")]
    pub cross_source_boost: f64,
    #[serde(default = "default_trend_min_signals")]
    pub trend_min_signals: usize,
    /// Share of consecutive pairs that must increase for a trend.
    #[serde(default = "default_trend_increase_ratio")]
    pub trend_increase_ratio: f64,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            cluster_threshold: default_cluster_threshold(),
            time_window_hours: default_time_window_hours(),
            strength_floor: default_strength_floor(),
            cross_source_boost: default_cross_source_boost(),
            trend_min_signals: default_trend_min_signals(),
            trend_increase_ratio: default_trend_increase_ratio(),
        }
    }
}

// =============================================================================
// Correlation
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskType {
    EmergingRisk,
    Monitoring,
    EmergingOpportunity,
}

impl RiskType {
    /// ≥ 0.7 emerging risk, ≥ 0.4 monitoring, otherwise an opportunity.
    pub fn classify(strength: f64) -> Self {
        if strength >= 0.7 {
            Self::EmergingRisk
        } else if strength >= 0.4 {
            Self::Monitoring
        } else {
            Self::EmergingOpportunity
        }
    }
}

impl std::fmt::Display for RiskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmergingRisk => write!(f, "emerging_risk"),
            Self::Monitoring => write!(f, "monitoring"),
            Self::EmergingOpportunity => write!(f, "emerging_opportunity"),
        }
    }
}

/// Which pass produced a correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationKind {
    CategoryCluster,
    TemporalCluster,
    CrossSource,
    EscalatingTrend,
}

impl std::fmt::Display for CorrelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CategoryCluster => write!(f, "Category_Cluster"),
            Self::TemporalCluster => write!(f, "Temporal_Cluster"),
            Self::CrossSource => write!(f, "Cross_Source_Convergence"),
            Self::EscalatingTrend => write!(f, "Escalating_Trend"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub signals: Vec<WeakSignal>,
    pub combined_strength: f64,
    pub narrative: String,
    pub risk_type: RiskType,
    pub kind: CorrelationKind,
}

impl Correlation {
    /// Distinct sources behind this correlation, sorted.
    pub fn sources(&self) -> Vec<String> {
        self.signals
            .iter()
            .map(|s| s.source.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

// =============================================================================
// WeakSignalCorrelator
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct WeakSignalCorrelator {
    config: CorrelatorConfig,
    signals: Vec<WeakSignal>,
}

impl WeakSignalCorrelator {
    pub fn new(config: CorrelatorConfig) -> Self {
        Self {
            config,
            signals: Vec::new(),
        }
    }

    pub fn into_handle(self) -> CorrelatorHandle {
        Arc::new(RwLock::new(self))
    }

    pub fn config(&self) -> &CorrelatorConfig {
        &self.config
    }

    /// Keep `signal` unless it is below the strength floor. Returns whether it
    /// was kept.
    pub fn add_signal(&mut self, signal: WeakSignal) -> bool {
        if signal.strength >= self.config.strength_floor {
            self.signals.push(signal);
            true
        } else {
            debug!(
                source = %signal.source,
                strength = format!("{:.3}", signal.strength),
                "Weak signal below floor, dropped"
            );
            false
        }
    }

    pub fn add_signals(&mut self, signals: impl IntoIterator<Item = WeakSignal>) {
        for s in signals {
            self.add_signal(s);
        }
    }

    pub fn clear(&mut self) {
        self.signals.clear();
    }

    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    pub fn signals(&self) -> &[WeakSignal] {
        &self.signals
    }

    /// Run every pass, deduplicate and rank.
    pub fn detect_correlations(&self) -> Vec<Correlation> {
        let mut all = self.cluster_by_category();
        all.extend(self.cluster_by_time());
        all.extend(self.cross_source_convergence());
        all.extend(self.trend_detection());

        let mut seen = BTreeSet::new();
        let mut unique: Vec<Correlation> = all
            .into_iter()
            .filter(|c| seen.insert(c.narrative.chars().take(DEDUP_PREFIX_CHARS).collect::<String>()))
            .collect();

        unique.sort_by(|a, b| b.combined_strength.total_cmp(&a.combined_strength));

        debug!(
            signals = self.signals.len(),
            correlations = unique.len(),
            "Weak-signal correlation pass complete"
        );
        unique
    }

    // -------------------------------------------------------------------------
    // Passes
    // -------------------------------------------------------------------------

    /// Signals grouped by category, categories in first-seen order.
    fn by_category(&self) -> Vec<(&str, Vec<&WeakSignal>)> {
        let mut groups: Vec<(&str, Vec<&WeakSignal>)> = Vec::new();
        for s in &self.signals {
            match groups.iter_mut().find(|(cat, _)| *cat == s.category) {
                Some((_, members)) => members.push(s),
                None => groups.push((s.category.as_str(), vec![s])),
            }
        }
        groups
    }

    fn cluster_by_category(&self) -> Vec<Correlation> {
        self.by_category()
            .into_iter()
            .filter(|(_, members)| members.len() >= self.config.cluster_threshold)
            .map(|(cat, members)| {
                let combined = combine_strength(&members);
                Correlation {
                    narrative: format!(
                        "{} weak signals detected in category '{}' from sources: {}. \
                         Combined strength {:.2} suggests an emerging pattern.",
                        members.len(),
                        cat,
                        join_distinct(members.iter().map(|s| s.source.as_str())),
                        combined
                    ),
                    signals: members.into_iter().cloned().collect(),
                    combined_strength: combined,
                    risk_type: RiskType::classify(combined),
                    kind: CorrelationKind::CategoryCluster,
                }
            })
            .collect()
    }

    /// Greedy windows anchored at the earliest unclaimed signal.
    fn cluster_by_time(&self) -> Vec<Correlation> {
        if self.signals.len() < 2 {
            return Vec::new();
        }

        let Some(window) = chrono::Duration::try_hours(self.config.time_window_hours) else {
            warn!(
                hours = self.config.time_window_hours,
                "Temporal window out of range, temporal pass skipped"
            );
            return Vec::new();
        };
        let mut sorted: Vec<&WeakSignal> = self.signals.iter().collect();
        sorted.sort_by_key(|s| s.timestamp);

        let mut correlations = Vec::new();
        let mut i = 0;
        while i < sorted.len() {
            let anchor = sorted[i].timestamp;
            let mut j = i + 1;
            while j < sorted.len() && sorted[j].timestamp - anchor <= window {
                j += 1;
            }

            let cluster = &sorted[i..j];
            if cluster.len() >= self.config.cluster_threshold {
                let combined = combine_strength(cluster);
                let start = cluster[0].timestamp.format("%Y-%m-%d %H:%M");
                let end = cluster[cluster.len() - 1].timestamp.format("%Y-%m-%d %H:%M");
                correlations.push(Correlation {
                    signals: cluster.iter().map(|s| (*s).clone()).collect(),
                    combined_strength: combined,
                    narrative: format!(
                        "Burst of {} weak signals between {} and {}. Categories: {}.",
                        cluster.len(),
                        start,
                        end,
                        join_distinct(cluster.iter().map(|s| s.category.as_str()))
                    ),
                    risk_type: RiskType::classify(combined),
                    kind: CorrelationKind::TemporalCluster,
                });
            }

            i = if j > i + 1 { j } else { i + 1 };
        }
        correlations
    }

    fn cross_source_convergence(&self) -> Vec<Correlation> {
        self.by_category()
            .into_iter()
            .filter_map(|(cat, members)| {
                let sources: BTreeSet<&str> = members.iter().map(|s| s.source.as_str()).collect();
                if sources.len() < 2 {
                    return None;
                }
                let boosted = combine_strength(&members) * self.config.cross_source_boost;
                Some(Correlation {
                    narrative: format!(
                        "Cross-source convergence in '{}': {} independent sources ({}) \
                         flagging the same area. High credibility.",
                        cat,
                        sources.len(),
                        sources.iter().copied().collect::<Vec<_>>().join(", ")
                    ),
                    signals: members.into_iter().cloned().collect(),
                    combined_strength: boosted,
                    risk_type: RiskType::classify(boosted),
                    kind: CorrelationKind::CrossSource,
                })
            })
            .collect()
    }

    fn trend_detection(&self) -> Vec<Correlation> {
        let mut correlations = Vec::new();

        for (cat, mut members) in self.by_category() {
            if members.len() < self.config.trend_min_signals.max(2) {
                continue;
            }
            members.sort_by_key(|s| s.timestamp);

            let strengths: Vec<f64> = members.iter().map(|s| s.strength).collect();
            let pairs = strengths.len() - 1;
            let increases = strengths.windows(2).filter(|w| w[1] > w[0]).count();
            if (increases as f64) < pairs as f64 * self.config.trend_increase_ratio {
                continue;
            }

            let first = strengths[0];
            let last = strengths[pairs];
            let avg_increment = (last - first) / pairs as f64;
            let combined = f64::min(1.0, last + 3.0 * avg_increment);

            correlations.push(Correlation {
                narrative: format!(
                    "Escalating trend detected in '{}': strength rising from {:.2} to {:.2} \
                     over {} observations. Projected to reach significant level soon.",
                    cat,
                    first,
                    last,
                    members.len()
                ),
                signals: members.into_iter().cloned().collect(),
                combined_strength: combined,
                // Classified by where the trend is now, not the projection.
                risk_type: if last > 0.4 {
                    RiskType::EmergingRisk
                } else {
                    RiskType::Monitoring
                },
                kind: CorrelationKind::EscalatingTrend,
            });
        }
        correlations
    }
}

/// Probabilistic OR of independent strengths.
pub fn combine_strength(signals: &[&WeakSignal]) -> f64 {
    let none = signals.iter().fold(1.0, |acc, s| acc * (1.0 - s.strength));
    f64::min(1.0, 1.0 - none)
}

fn join_distinct<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.collect::<BTreeSet<_>>().into_iter().collect::<Vec<_>>().join(", ")
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn t0() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn sig(source: &str, category: &str, strength: f64, hours: i64) -> WeakSignal {
        WeakSignal::new(source, category, format!("{} {}", source, category), strength)
            .at(t0() + Duration::hours(hours))
    }

    fn correlator() -> WeakSignalCorrelator {
        WeakSignalCorrelator::new(CorrelatorConfig::default())
    }

    fn of_kind(cs: &[Correlation], kind: CorrelationKind) -> Vec<&Correlation> {
        cs.iter().filter(|c| c.kind == kind).collect()
    }

    #[test]
    fn floor_drops_faint_signals() {
        let mut c = correlator();
        assert!(!c.add_signal(sig("cashflow", "liquidity", 0.1, 0)));
        assert!(c.add_signal(sig("cashflow", "liquidity", 0.15, 0)));
        assert_eq!(c.signal_count(), 1);
        c.clear();
        assert_eq!(c.signal_count(), 0);
    }

    #[test]
    fn category_cluster_uses_probabilistic_or() {
        let mut c = correlator();
        // Spread a week apart so no temporal window forms.
        c.add_signals([
            sig("cashflow", "liquidity", 0.3, 0),
            sig("cashflow", "liquidity", 0.3, 200),
            sig("cashflow", "liquidity", 0.2, 400),
        ]);
        let cs = c.detect_correlations();
        let cluster = of_kind(&cs, CorrelationKind::CategoryCluster);
        assert_eq!(cluster.len(), 1);
        let expected = 1.0 - 0.7 * 0.7 * 0.8;
        assert!((cluster[0].combined_strength - expected).abs() < 1e-12);
        assert_eq!(cluster[0].risk_type, RiskType::Monitoring);
        assert!(of_kind(&cs, CorrelationKind::TemporalCluster).is_empty());
    }

    #[test]
    fn adding_a_signal_never_weakens_its_category() {
        let mut c = correlator();
        c.add_signals([
            sig("a", "liquidity", 0.3, 0),
            sig("b", "liquidity", 0.4, 300),
            sig("c", "liquidity", 0.2, 600),
        ]);
        let before = of_kind(&c.detect_correlations(), CorrelationKind::CategoryCluster)[0].combined_strength;
        c.add_signal(sig("d", "liquidity", 0.16, 900));
        let after = of_kind(&c.detect_correlations(), CorrelationKind::CategoryCluster)[0].combined_strength;
        assert!(after >= before, "{:.6} < {:.6}", after, before);
    }

    #[test]
    fn temporal_windows_are_greedy_and_non_overlapping() {
        let mut c = correlator();
        c.add_signals([
            sig("a", "w", 0.3, 0),
            sig("b", "x", 0.3, 10),
            sig("c", "y", 0.3, 70),
            // 73 h after the first anchor: starts the next window.
            sig("d", "z", 0.3, 73),
            sig("e", "v", 0.3, 80),
        ]);
        let cs = c.detect_correlations();
        let bursts = of_kind(&cs, CorrelationKind::TemporalCluster);
        assert_eq!(bursts.len(), 1);
        assert_eq!(bursts[0].signals.len(), 3);
        assert!(bursts[0].narrative.starts_with("Burst of 3 weak signals between 2024-03-01 09:00"));
    }

    #[test]
    fn oversized_window_skips_temporal_pass() {
        let mut c = WeakSignalCorrelator::new(CorrelatorConfig {
            time_window_hours: i64::MAX / 2,
            ..CorrelatorConfig::default()
        });
        c.add_signals([sig("a", "w", 0.3, 0), sig("b", "x", 0.3, 1), sig("c", "y", 0.3, 2)]);
        let cs = c.detect_correlations();
        assert!(of_kind(&cs, CorrelationKind::TemporalCluster).is_empty());
    }

    #[test]
    fn single_signal_has_no_temporal_cluster() {
        let mut c = correlator();
        c.add_signal(sig("a", "x", 0.9, 0));
        assert!(c.detect_correlations().is_empty());
    }

    #[test]
    fn cross_source_is_boosted_and_unclamped() {
        let mut c = correlator();
        c.add_signals([sig("cashflow", "liquidity", 0.9, 0), sig("rag", "liquidity", 0.9, 500)]);
        let cs = c.detect_correlations();
        let cross = of_kind(&cs, CorrelationKind::CrossSource);
        assert_eq!(cross.len(), 1);
        assert!((cross[0].combined_strength - 0.99 * 1.2).abs() < 1e-12);
        assert!(cross[0].combined_strength > 1.0);
        assert_eq!(cross[0].risk_type, RiskType::EmergingRisk);
        assert_eq!(cross[0].sources(), vec!["cashflow".to_string(), "rag".to_string()]);
    }

    #[test]
    fn escalating_trend_projects_forward() {
        let mut c = correlator();
        c.add_signals([
            sig("budget", "drift", 0.2, 0),
            sig("budget", "drift", 0.3, 100),
            sig("budget", "drift", 0.5, 200),
        ]);
        let cs = c.detect_correlations();
        let trend = of_kind(&cs, CorrelationKind::EscalatingTrend);
        assert_eq!(trend.len(), 1);
        // last 0.5 + 3 · (0.3 / 2)
        assert!((trend[0].combined_strength - 0.95).abs() < 1e-12);
        assert_eq!(trend[0].risk_type, RiskType::EmergingRisk);
    }

    #[test]
    fn falling_strengths_are_not_a_trend() {
        let mut c = correlator();
        c.add_signals([
            sig("budget", "drift", 0.6, 0),
            sig("budget", "drift", 0.4, 100),
            sig("budget", "drift", 0.5, 200),
        ]);
        let cs = c.detect_correlations();
        assert!(of_kind(&cs, CorrelationKind::EscalatingTrend).is_empty());
    }

    #[test]
    fn results_sorted_descending() {
        let mut c = correlator();
        c.add_signals([
            sig("a", "liquidity", 0.3, 0),
            sig("b", "liquidity", 0.3, 1),
            sig("a", "liquidity", 0.35, 2),
            sig("c", "vendor", 0.2, 400),
        ]);
        let cs = c.detect_correlations();
        assert!(cs.len() >= 3);
        for w in cs.windows(2) {
            assert!(w[0].combined_strength >= w[1].combined_strength);
        }
    }

    #[test]
    fn handle_shares_working_set() {
        let handle = correlator().into_handle();
        handle.write().add_signal(sig("a", "x", 0.5, 0));
        assert_eq!(handle.read().signal_count(), 1);
    }
}
