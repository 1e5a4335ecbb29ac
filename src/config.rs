use std::env;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::accumulator::AccumulatorConstraints;
use crate::arbitrage::ArbitrageConfig;
use crate::odds::TotalsConfig;
use crate::probability::FusionConfig;
use crate::slate::SlateConfig;
use crate::value::KellyConfig;

/// Every tunable of the engine in one place. Built once and passed down explicitly.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fusion: FusionConfig,
    pub kelly: KellyConfig,
    pub totals: TotalsConfig,
    pub accumulator: AccumulatorConstraints,
    pub arbitrage: ArbitrageConfig,
    pub slate: SlateConfig,
}

impl EngineConfig {
    /// Reads `ODDSMITH_*` variables. Missing or unparsable values keep their defaults;
    /// out-of-range values are clamped.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let f64_var = |key: &str, default: f64, lo: f64, hi: f64| -> f64 {
            lookup(key)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .unwrap_or(default)
                .clamp(lo, hi)
        };
        let usize_var = |key: &str, default: usize, lo: usize, hi: usize| -> usize {
            lookup(key)
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(default)
                .clamp(lo, hi)
        };
        let bool_var = |key: &str, default: bool| -> bool {
            lookup(key)
                .map(|v| {
                    let t = v.trim().to_ascii_lowercase();
                    !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
                })
                .unwrap_or(default)
        };

        let min_odds = f64_var("ODDSMITH_ACCA_MIN_ODDS", d.accumulator.min_odds, 1.01, 1000.0);
        let max_odds = f64_var("ODDSMITH_ACCA_MAX_ODDS", d.accumulator.max_odds, 1.01, 1000.0);
        let max_legs = usize_var("ODDSMITH_ACCA_MAX_LEGS", d.accumulator.max_legs, 2, 12);

        Self {
            fusion: FusionConfig {
                odds_weight: f64_var("ODDSMITH_ODDS_WEIGHT", d.fusion.odds_weight, 0.0, 1.0),
                model_weight: f64_var("ODDSMITH_MODEL_WEIGHT", d.fusion.model_weight, 0.0, 1.0),
            },
            kelly: KellyConfig {
                multiplier: f64_var("ODDSMITH_KELLY_MULTIPLIER", d.kelly.multiplier, 0.01, 1.0),
                max_fraction: f64_var(
                    "ODDSMITH_KELLY_MAX_FRACTION",
                    d.kelly.max_fraction,
                    0.001,
                    1.0,
                ),
                conservative: bool_var("ODDSMITH_KELLY_CONSERVATIVE", d.kelly.conservative),
            },
            totals: TotalsConfig {
                target_line: f64_var("ODDSMITH_TOTALS_LINE", d.totals.target_line, 0.5, 10.5),
                tolerance: f64_var("ODDSMITH_TOTALS_TOLERANCE", d.totals.tolerance, 0.0, 2.0),
            },
            accumulator: AccumulatorConstraints::new(min_odds, max_odds, max_legs),
            arbitrage: ArbitrageConfig {
                total_stake: f64_var("ODDSMITH_ARB_STAKE", d.arbitrage.total_stake, 1.0, 1e9),
            },
            slate: SlateConfig {
                top_market_picks: usize_var(
                    "ODDSMITH_TOP_MARKET_PICKS",
                    d.slate.top_market_picks,
                    1,
                    100,
                ),
                diversified_size: usize_var(
                    "ODDSMITH_DIVERSIFIED_SIZE",
                    d.slate.diversified_size,
                    1,
                    100,
                ),
                min_ev_pct: f64_var("ODDSMITH_MIN_EV_PCT", d.slate.min_ev_pct, 0.0, 100.0),
                bankroll: f64_var("ODDSMITH_BANKROLL", d.slate.bankroll, 0.0, 1e12),
            },
        }
    }

    /// Partial documents are fine; absent sections keep their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(raw).context("parse engine config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f64| -> Result<()> {
            if !(0.0..=1.0).contains(&v) {
                bail!("{name} must be within [0, 1], got {v}");
            }
            Ok(())
        };
        unit("fusion.odds_weight", self.fusion.odds_weight)?;
        unit("fusion.model_weight", self.fusion.model_weight)?;
        unit("kelly.multiplier", self.kelly.multiplier)?;
        unit("kelly.max_fraction", self.kelly.max_fraction)?;

        let acc = &self.accumulator;
        if !(acc.min_odds > 1.0 && acc.min_odds.is_finite()) {
            bail!("accumulator.min_odds must be above 1.0, got {}", acc.min_odds);
        }
        if acc.min_odds > acc.max_odds {
            bail!(
                "accumulator.min_odds ({}) exceeds accumulator.max_odds ({})",
                acc.min_odds,
                acc.max_odds
            );
        }
        if acc.max_legs < 2 {
            bail!("accumulator.max_legs must be at least 2, got {}", acc.max_legs);
        }
        if !(self.totals.tolerance >= 0.0 && self.totals.target_line > 0.0) {
            bail!(
                "totals need a positive line and a non-negative tolerance, got {} / {}",
                self.totals.target_line,
                self.totals.tolerance
            );
        }
        if !(self.arbitrage.total_stake > 0.0) {
            bail!("arbitrage.total_stake must be positive");
        }
        if self.slate.diversified_size == 0 {
            bail!("slate.diversified_size must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = EngineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.fusion.odds_weight, 0.8);
        assert_eq!(cfg.kelly.max_fraction, 0.05);
        assert_eq!(cfg.totals.target_line, 2.5);
        assert_eq!(cfg.accumulator.max_legs, 3);
        assert_eq!(cfg.arbitrage.total_stake, 1000.0);
    }

    #[test]
    fn lookup_overrides_and_clamps() {
        let cfg = EngineConfig::from_lookup(lookup(&[
            ("ODDSMITH_ODDS_WEIGHT", "0.6"),
            ("ODDSMITH_KELLY_MAX_FRACTION", "7"),
            ("ODDSMITH_KELLY_CONSERVATIVE", "off"),
            ("ODDSMITH_ACCA_MAX_LEGS", "1"),
            ("ODDSMITH_TOTALS_LINE", "nonsense"),
        ]));
        assert_eq!(cfg.fusion.odds_weight, 0.6);
        assert_eq!(cfg.kelly.max_fraction, 1.0);
        assert!(!cfg.kelly.conservative);
        assert_eq!(cfg.accumulator.max_legs, 2);
        assert_eq!(cfg.totals.target_line, 2.5);
        cfg.validate().unwrap();
    }

    #[test]
    fn swapped_odds_band_from_env_is_reordered() {
        let cfg = EngineConfig::from_lookup(lookup(&[
            ("ODDSMITH_ACCA_MIN_ODDS", "5"),
            ("ODDSMITH_ACCA_MAX_ODDS", "3"),
        ]));
        assert_eq!(cfg.accumulator.min_odds, 3.0);
        assert_eq!(cfg.accumulator.max_odds, 5.0);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let raw = r#"{"kelly":{"multiplier":0.5},"slate":{"diversified_size":4}}"#;
        let cfg = EngineConfig::from_json_str(raw).unwrap();
        assert_eq!(cfg.kelly.multiplier, 0.5);
        assert_eq!(cfg.kelly.max_fraction, 0.05);
        assert_eq!(cfg.slate.diversified_size, 4);
        assert_eq!(cfg.fusion.model_weight, 0.2);
    }

    #[test]
    fn inconsistent_json_is_rejected() {
        let raw = r#"{"accumulator":{"min_odds":6.0,"max_odds":3.0,"max_legs":3}}"#;
        let err = EngineConfig::from_json_str(raw).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
        assert!(EngineConfig::from_json_str(r#"{"fusion":{"odds_weight":1.5}}"#).is_err());
        assert!(EngineConfig::from_json_str("not json").is_err());
    }
}
