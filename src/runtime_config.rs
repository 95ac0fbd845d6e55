// =============================================================================
// Runtime Configuration — engine settings with presets and atomic save
// =============================================================================
//
// Central configuration hub for the fusion engine: weighted-average weights,
// meta-fusion strategy weights, correlator thresholds and alert thresholds.
//
// Persistence writes a `.json.tmp` sibling and renames it into place.  Every
// field carries a serde default, so older files missing newer fields load.
//
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::FusionError;
use crate::fusion::WeightedConfig;
use crate::signals::correlator::MAX_TIME_WINDOW_HOURS;
use crate::signals::{AlertThresholds, CorrelatorConfig};
use crate::strategy::StrategyKind;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_weighted_average_weight() -> f64 {
    0.30
}

fn default_dempster_shafer_weight() -> f64 {
    0.40
}

fn default_bayesian_weight() -> f64 {
    0.30
}

fn default_strategies() -> Vec<StrategyKind> {
    StrategyKind::ALL.to_vec()
}

// =============================================================================
// StrategyWeights
// =============================================================================

/// Meta-fusion voting weight per strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyWeights {
    #[serde(default = "default_weighted_average_weight")]
    pub weighted_average: f64,

    #[serde(default = "default_dempster_shafer_weight")]
    pub dempster_shafer: f64,

    #[serde(default = "default_bayesian_weight")]
    pub bayesian: f64,
}

impl Default for StrategyWeights {
    fn default() -> Self {
        Self {
            weighted_average: default_weighted_average_weight(),
            dempster_shafer: default_dempster_shafer_weight(),
            bayesian: default_bayesian_weight(),
        }
    }
}

impl StrategyWeights {
    pub fn weight(&self, kind: StrategyKind) -> f64 {
        match kind {
            StrategyKind::WeightedAverage => self.weighted_average,
            StrategyKind::DempsterShafer => self.dempster_shafer,
            StrategyKind::Bayesian => self.bayesian,
        }
    }
}

// =============================================================================
// Presets
// =============================================================================

/// Operating modes with tuned weights and thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Stability first.
    Conservative,
    /// Normal operating conditions.
    Balanced,
    /// Growth phase, strong cash position.
    Aggressive,
    /// Liquidity emergency; most sensitive alerting.
    Crisis,
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conservative => write!(f, "conservative"),
            Self::Balanced => write!(f, "balanced"),
            Self::Aggressive => write!(f, "aggressive"),
            Self::Crisis => write!(f, "crisis"),
        }
    }
}

impl std::str::FromStr for Preset {
    type Err = FusionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "conservative" => Ok(Self::Conservative),
            "balanced" => Ok(Self::Balanced),
            "aggressive" => Ok(Self::Aggressive),
            "crisis" => Ok(Self::Crisis),
            other => Err(FusionError::config(format!("unknown preset '{}'", other))),
        }
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level configuration for the fusion engine.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Risk / profitability weights and Critical-alert escalation.
    #[serde(default)]
    pub weighted: WeightedConfig,

    /// Meta-fusion voting weights.
    #[serde(default)]
    pub strategy_weights: StrategyWeights,

    /// Strategies run when a request does not name any.
    #[serde(default = "default_strategies")]
    pub strategies: Vec<StrategyKind>,

    #[serde(default)]
    pub correlator: CorrelatorConfig,

    #[serde(default)]
    pub alerts: AlertThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weighted: WeightedConfig::default(),
            strategy_weights: StrategyWeights::default(),
            strategies: default_strategies(),
            correlator: CorrelatorConfig::default(),
            alerts: AlertThresholds::default(),
        }
    }
}

impl EngineConfig {
    pub fn preset(preset: Preset) -> Self {
        let base = Self::default();
        match preset {
            Preset::Conservative => Self {
                weighted: WeightedConfig {
                    risk_weight: 0.8,
                    profit_weight: 0.2,
                    critical_boost: 0.15,
                    max_risk_weight: 0.9,
                },
                alerts: AlertThresholds {
                    budget_critical_pct: 15.0,
                    ..base.alerts
                },
                ..base
            },
            Preset::Balanced => Self {
                weighted: WeightedConfig {
                    risk_weight: 0.5,
                    profit_weight: 0.5,
                    ..base.weighted
                },
                ..base
            },
            Preset::Aggressive => Self {
                weighted: WeightedConfig {
                    risk_weight: 0.3,
                    profit_weight: 0.7,
                    critical_boost: 0.1,
                    ..base.weighted
                },
                alerts: AlertThresholds {
                    budget_critical_pct: 5.0,
                    ..base.alerts
                },
                ..base
            },
            Preset::Crisis => Self {
                weighted: WeightedConfig {
                    risk_weight: 0.9,
                    profit_weight: 0.1,
                    critical_boost: 0.05,
                    max_risk_weight: 0.95,
                },
                alerts: AlertThresholds {
                    production_slowdown_pct: -3.0,
                    budget_critical_pct: 20.0,
                },
                correlator: CorrelatorConfig {
                    strength_floor: 0.1,
                    ..base.correlator
                },
                ..base
            },
        }
    }

    /// Reject configurations the engine cannot honour.
    pub fn validate(&self) -> crate::Result<()> {
        let w = &self.weighted;
        for (name, v) in [("risk_weight", w.risk_weight), ("profit_weight", w.profit_weight)] {
            if !(0.0..=1.0).contains(&v) {
                return Err(FusionError::config(format!("{} must be in [0, 1], got {}", name, v)));
            }
        }
        if (w.risk_weight + w.profit_weight - 1.0).abs() > 0.01 {
            return Err(FusionError::config(format!(
                "risk_weight ({}) and profit_weight ({}) must sum to 1.0",
                w.risk_weight, w.profit_weight
            )));
        }
        if w.critical_boost < 0.0 {
            return Err(FusionError::config("critical_boost must be non-negative"));
        }
        if w.max_risk_weight < w.risk_weight || w.max_risk_weight > 1.0 {
            return Err(FusionError::config(format!(
                "max_risk_weight ({}) must lie in [risk_weight, 1]",
                w.max_risk_weight
            )));
        }

        for kind in StrategyKind::ALL {
            let v = self.strategy_weights.weight(kind);
            if !v.is_finite() || v < 0.0 {
                return Err(FusionError::config(format!("{} weight must be non-negative, got {}", kind, v)));
            }
        }
        if self.strategies.is_empty() {
            return Err(FusionError::config("at least one strategy must be enabled"));
        }

        let c = &self.correlator;
        if !(0.0..=1.0).contains(&c.strength_floor) {
            return Err(FusionError::config("correlator strength_floor must be in [0, 1]"));
        }
        if c.cluster_threshold == 0 || c.time_window_hours <= 0 {
            return Err(FusionError::config("correlator cluster threshold and window must be positive"));
        }
        if c.time_window_hours > MAX_TIME_WINDOW_HOURS {
            return Err(FusionError::config(format!(
                "correlator time_window_hours ({}) exceeds {}",
                c.time_window_hours, MAX_TIME_WINDOW_HOURS
            )));
        }
        if !(0.0..=1.0).contains(&c.trend_increase_ratio) || c.cross_source_boost <= 0.0 {
            return Err(FusionError::config("correlator trend ratio or cross-source boost out of range"));
        }

        Ok(())
    }

    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("invalid engine config in {}", path.display()))?;

        info!(
            path = %path.display(),
            risk_weight = config.weighted.risk_weight,
            strategies = config.strategies.len(),
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = EngineConfig::default();
        assert!((cfg.weighted.risk_weight - 0.6).abs() < f64::EPSILON);
        assert!((cfg.weighted.profit_weight - 0.4).abs() < f64::EPSILON);
        assert!((cfg.strategy_weights.dempster_shafer - 0.4).abs() < f64::EPSILON);
        assert_eq!(cfg.strategies, StrategyKind::ALL.to_vec());
        assert_eq!(cfg.correlator.cluster_threshold, 3);
        assert!((cfg.alerts.budget_critical_pct - 10.0).abs() < f64::EPSILON);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "weighted": { "risk_weight": 0.7, "profit_weight": 0.3 },
                        "strategies": ["bayesian"] }"#;
        let cfg: EngineConfig = serde_json::from_str(json).unwrap();
        assert!((cfg.weighted.max_risk_weight - 0.8).abs() < f64::EPSILON);
        assert_eq!(cfg.strategies, vec![StrategyKind::Bayesian]);
        assert!((cfg.strategy_weights.bayesian - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn every_preset_validates() {
        for p in [Preset::Conservative, Preset::Balanced, Preset::Aggressive, Preset::Crisis] {
            let cfg = EngineConfig::preset(p);
            assert!(cfg.validate().is_ok(), "preset {} failed validation", p);
            assert_eq!(p.to_string().parse::<Preset>().unwrap(), p);
        }
        assert!("reckless".parse::<Preset>().is_err());
    }

    #[test]
    fn weights_must_sum_to_one() {
        let mut cfg = EngineConfig::default();
        cfg.weighted.profit_weight = 0.6;
        assert!(matches!(cfg.validate(), Err(FusionError::Config(_))));
    }

    #[test]
    fn oversized_correlator_window_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.correlator.time_window_hours = i64::MAX / 2;
        assert!(matches!(cfg.validate(), Err(FusionError::Config(_))));
        assert!(crate::meta_fusion::MultiStrategyEngine::new(cfg).is_err());

        let mut cfg = EngineConfig::default();
        cfg.correlator.time_window_hours = MAX_TIME_WINDOW_HOURS;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn negative_strategy_weight_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.strategy_weights.bayesian = -0.1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("fusion-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("engine.json");

        let cfg = EngineConfig::preset(Preset::Crisis);
        cfg.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(cfg, loaded);
        assert!(!path.with_extension("json.tmp").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
