use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::market::{Fixture, MarketKind, Outcome};

const SUM_TOLERANCE: f64 = 1e-9;

/// Outcome probabilities for one market on one fixture, aligned with
/// `MarketKind::outcomes()`. Always complete and summing to 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbabilityDistribution {
    market: MarketKind,
    probs: Vec<f64>,
}

impl ProbabilityDistribution {
    /// Clamp, then renormalize. `None` when the weights do not fit the market or carry no mass.
    pub fn from_weights(market: MarketKind, weights: &[f64]) -> Option<Self> {
        if weights.len() != market.outcomes().len() {
            return None;
        }
        let clamped: Vec<f64> = weights
            .iter()
            .map(|w| if w.is_finite() { w.max(0.0) } else { 0.0 })
            .collect();
        let sum: f64 = clamped.iter().sum();
        if sum <= 0.0 {
            return None;
        }
        let mut probs: Vec<f64> = clamped.iter().map(|w| (w / sum).clamp(0.0, 1.0)).collect();
        // Second pass absorbs drift from the clamp.
        let sum: f64 = probs.iter().sum();
        for p in probs.iter_mut() {
            *p /= sum;
        }

        let out = Self { market, probs };
        out.assert_valid();
        Some(out)
    }

    pub fn neutral(market: MarketKind) -> Self {
        let prior = market.neutral_prior();
        let sum: f64 = prior.iter().sum();
        let out = Self {
            market,
            probs: prior.iter().map(|p| p / sum).collect(),
        };
        out.assert_valid();
        out
    }

    pub fn from_pairs(market: MarketKind, pairs: &[(Outcome, f64)]) -> Option<Self> {
        let weights: Vec<f64> = market
            .outcomes()
            .iter()
            .map(|o| {
                pairs
                    .iter()
                    .find(|(k, _)| k == o)
                    .map(|(_, p)| *p)
                    .unwrap_or(0.0)
            })
            .collect();
        Self::from_weights(market, &weights)
    }

    pub fn market(&self) -> MarketKind {
        self.market
    }

    pub fn get(&self, outcome: Outcome) -> f64 {
        self.market
            .outcomes()
            .iter()
            .position(|o| *o == outcome)
            .map(|idx| self.probs[idx])
            .unwrap_or(0.0)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.probs
    }

    pub fn iter(&self) -> impl Iterator<Item = (Outcome, f64)> + '_ {
        self.market.outcomes().iter().copied().zip(self.probs.iter().copied())
    }

    pub fn sum(&self) -> f64 {
        self.probs.iter().sum()
    }

    /// Most likely outcome; the first one wins ties.
    pub fn argmax(&self) -> (Outcome, f64) {
        let mut best = (self.market.outcomes()[0], self.probs[0]);
        for (outcome, p) in self.iter().skip(1) {
            if p > best.1 {
                best = (outcome, p);
            }
        }
        best
    }

    /// `w * self + (1 - w) * other`, renormalized.
    pub fn blend(&self, other: &Self, w: f64) -> Self {
        assert_eq!(
            self.market, other.market,
            "cannot blend distributions of different markets"
        );
        let w = w.clamp(0.0, 1.0);
        let mixed: Vec<f64> = self
            .probs
            .iter()
            .zip(&other.probs)
            .map(|(a, b)| w * a + (1.0 - w) * b)
            .collect();
        Self::from_weights(self.market, &mixed).unwrap_or_else(|| Self::neutral(self.market))
    }

    fn assert_valid(&self) {
        let sum = self.sum();
        assert!(
            (sum - 1.0).abs() < SUM_TOLERANCE,
            "{} distribution sums to {sum}",
            self.market.key()
        );
        assert!(
            self.probs.iter().all(|p| (0.0..=1.0).contains(p)),
            "{} distribution has a component outside [0, 1]: {:?}",
            self.market.key(),
            self.probs
        );
    }
}

/// Inputs handed to a learned model. `to_vector` keeps a fixed column order.
#[derive(Debug, Clone, Serialize)]
pub struct MatchFeatures {
    pub market: MarketKind,
    pub form_diff: f64,
    pub home_form: f64,
    pub away_form: f64,
    pub odds: Option<ProbabilityDistribution>,
    pub target_line: Option<f64>,
    pub combined_form: f64,
    pub min_form: f64,
    pub balanced_teams: f64,
}

impl MatchFeatures {
    pub fn new(
        market: MarketKind,
        fixture: &Fixture,
        odds: Option<&ProbabilityDistribution>,
        target_line: Option<f64>,
    ) -> Self {
        let home_form = fixture.home_form.clamp(0.0, 3.0);
        let away_form = fixture.away_form.clamp(0.0, 3.0);
        Self {
            market,
            form_diff: fixture.form_diff().clamp(-3.0, 3.0),
            home_form,
            away_form,
            odds: odds.filter(|d| d.market() == market).cloned(),
            target_line,
            combined_form: (fixture.home_form + fixture.away_form) / 2.0,
            min_form: fixture.home_form.min(fixture.away_form),
            balanced_teams: 1.0 - fixture.form_diff().abs() / 3.0,
        }
    }

    pub fn odds_available(&self) -> bool {
        self.odds.is_some()
    }

    pub fn to_vector(&self) -> Vec<f64> {
        let odds_p = |outcome: Outcome, missing: f64| -> f64 {
            match &self.odds {
                Some(d) => d.get(outcome),
                None if outcome.market() == self.market => missing,
                None => 0.0,
            }
        };
        vec![
            self.form_diff,
            self.home_form,
            self.away_form,
            if self.odds_available() { 1.0 } else { 0.0 },
            odds_p(Outcome::Home, 0.33),
            odds_p(Outcome::Draw, 0.33),
            odds_p(Outcome::Away, 0.33),
            odds_p(Outcome::Over, 0.5),
            odds_p(Outcome::Under, 0.5),
            odds_p(Outcome::Yes, 0.5),
            odds_p(Outcome::No, 0.5),
            self.target_line.unwrap_or(0.0),
            self.combined_form,
            self.min_form,
            self.balanced_teams,
        ]
    }
}

/// An external probability supplier. Returning `None` (or a distribution for another
/// market) leaves the fused result untouched.
pub trait LearnedModel: Send + Sync {
    fn predict(&self, features: &MatchFeatures) -> Option<ProbabilityDistribution>;

    fn name(&self) -> &str {
        "learned"
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub odds_weight: f64,
    pub model_weight: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            odds_weight: 0.8,
            model_weight: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FusionSource {
    Blended,
    OddsOnly,
    FormOnly,
    NeutralPrior,
}

#[derive(Debug, Clone, Serialize)]
pub struct FusedDistribution {
    pub distribution: ProbabilityDistribution,
    pub source: FusionSource,
    pub model_applied: bool,
}

#[derive(Clone, Default)]
pub struct FusionEngine {
    config: FusionConfig,
    model: Option<Arc<dyn LearnedModel>>,
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self {
            config,
            model: None,
        }
    }

    pub fn with_model(mut self, model: Arc<dyn LearnedModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn fuse(
        &self,
        market: MarketKind,
        odds: Option<&ProbabilityDistribution>,
        form: Option<&ProbabilityDistribution>,
        features: Option<&MatchFeatures>,
    ) -> FusedDistribution {
        let odds = odds.filter(|d| same_market(d, market, "odds"));
        let form = form.filter(|d| same_market(d, market, "form"));

        let (base, source) = match (odds, form) {
            (Some(o), Some(f)) => (o.blend(f, self.config.odds_weight), FusionSource::Blended),
            (Some(o), None) => (o.clone(), FusionSource::OddsOnly),
            (None, Some(f)) => (f.clone(), FusionSource::FormOnly),
            (None, None) => {
                debug!(market = market.key(), "no odds or form input, using neutral prior");
                (ProbabilityDistribution::neutral(market), FusionSource::NeutralPrior)
            }
        };

        let learned = match (&self.model, features) {
            (Some(model), Some(features)) => model
                .predict(features)
                .filter(|d| same_market(d, market, model.name())),
            _ => None,
        };

        match learned {
            Some(model_dist) => FusedDistribution {
                distribution: model_dist.blend(&base, self.config.model_weight),
                source,
                model_applied: true,
            },
            None => FusedDistribution {
                distribution: base,
                source,
                model_applied: false,
            },
        }
    }
}

fn same_market(dist: &ProbabilityDistribution, market: MarketKind, what: &str) -> bool {
    if dist.market() == market {
        return true;
    }
    warn!(
        expected = market.key(),
        got = dist.market().key(),
        "ignoring {what} distribution for another market"
    );
    false
}
