use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::market::Pick;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AccumulatorConstraints {
    pub min_odds: f64,
    pub max_odds: f64,
    pub max_legs: usize,
}

impl Default for AccumulatorConstraints {
    fn default() -> Self {
        Self {
            min_odds: 2.0,
            max_odds: 4.0,
            max_legs: 3,
        }
    }
}

impl AccumulatorConstraints {
    /// Bounds are reordered if swapped and `max_legs` is at least 2.
    pub fn new(min_odds: f64, max_odds: f64, max_legs: usize) -> Self {
        Self {
            min_odds: min_odds.min(max_odds),
            max_odds: max_odds.max(min_odds),
            max_legs: max_legs.max(2),
        }
    }

    pub fn in_band(&self, odds: f64) -> bool {
        odds >= self.min_odds && odds <= self.max_odds
    }
}

/// Multi-leg wager on independent picks, one leg per fixture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Accumulator {
    legs: Vec<Pick>,
    within_band: bool,
}

impl Accumulator {
    fn new(legs: Vec<Pick>, within_band: bool) -> Self {
        assert!(!legs.is_empty(), "accumulator needs at least one leg");
        Self { legs, within_band }
    }

    pub fn legs(&self) -> &[Pick] {
        &self.legs
    }

    pub fn leg_count(&self) -> usize {
        self.legs.len()
    }

    /// False for the two-leg fallback returned when nothing fit the odds band.
    pub fn within_band(&self) -> bool {
        self.within_band
    }

    pub fn combined_probability(&self) -> f64 {
        self.legs.iter().map(Pick::probability).product()
    }

    pub fn combined_odds(&self) -> f64 {
        self.legs.iter().map(Pick::odds).product()
    }

    pub fn combined_ev(&self) -> f64 {
        self.combined_probability() * self.combined_odds() - 1.0
    }

    pub fn risk_analysis(&self) -> RiskAnalysis {
        let success = self.combined_probability();
        let odds = self.combined_odds();
        let breakeven = if odds > 0.0 { 1.0 / odds } else { 1.0 };
        RiskAnalysis {
            success_probability: success,
            failure_probability: 1.0 - success,
            breakeven_probability: breakeven,
            edge: success - breakeven,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskAnalysis {
    pub success_probability: f64,
    pub failure_probability: f64,
    pub breakeven_probability: f64,
    pub edge: f64,
}

pub trait AccumulatorStrategy {
    fn name(&self) -> &'static str;

    /// `None` when fewer than two usable picks exist or `max_legs` is below 2.
    fn build(&self, picks: &[Pick], constraints: &AccumulatorConstraints) -> Option<Accumulator>;
}

/// Walks picks from most to least likely and keeps the most probable in-band prefix it
/// passes through. Heuristic, not an optimum: earlier discoveries win ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyHighProbability;

impl AccumulatorStrategy for GreedyHighProbability {
    fn name(&self) -> &'static str {
        "greedy_high_probability"
    }

    fn build(&self, picks: &[Pick], constraints: &AccumulatorConstraints) -> Option<Accumulator> {
        let max_legs = constraints.max_legs;
        if max_legs < 2 {
            return None;
        }
        let ranked = rank_picks(picks);

        let mut best: Option<(Vec<Pick>, f64)> = None;
        let mut combo: Vec<Pick> = Vec::new();
        let mut fixtures: HashSet<&str> = HashSet::new();
        let mut running = 1.0_f64;

        for pick in &ranked {
            if combo.len() >= max_legs {
                break;
            }
            if fixtures.contains(pick.fixture_id.as_str()) {
                debug!(fixture = %pick.fixture_id, "skipping second leg on the same fixture");
                continue;
            }
            let next = running * pick.odds();
            if !(next <= constraints.max_odds || running < constraints.min_odds) {
                continue;
            }
            combo.push(pick.clone());
            fixtures.insert(pick.fixture_id.as_str());
            running = next;

            if combo.len() >= 2 && constraints.in_band(running) {
                let prob: f64 = combo.iter().map(Pick::probability).product();
                if best.as_ref().is_none_or(|(_, best_prob)| prob > *best_prob) {
                    best = Some((combo.clone(), prob));
                }
            }
        }

        match best {
            Some((legs, _)) => Some(Accumulator::new(legs, true)),
            None => fallback_pair(&ranked),
        }
    }
}

/// Exhaustive search over the top `pool_cap` picks for the most probable in-band
/// combination. Cost grows combinatorially, so keep the cap small.
#[derive(Debug, Clone, Copy)]
pub struct BoundedExhaustive {
    pub pool_cap: usize,
}

impl Default for BoundedExhaustive {
    fn default() -> Self {
        Self { pool_cap: 12 }
    }
}

impl AccumulatorStrategy for BoundedExhaustive {
    fn name(&self) -> &'static str {
        "bounded_exhaustive"
    }

    fn build(&self, picks: &[Pick], constraints: &AccumulatorConstraints) -> Option<Accumulator> {
        let max_legs = constraints.max_legs;
        if max_legs < 2 {
            return None;
        }
        let ranked = rank_picks(picks);
        let pool = &ranked[..ranked.len().min(self.pool_cap)];

        let mut search = Search {
            pool,
            constraints,
            max_legs,
            current: Vec::new(),
            best: None,
        };
        search.visit(0, 1.0, 1.0);

        match search.best {
            Some((indices, _)) => Some(Accumulator::new(
                indices.iter().map(|i| pool[*i].clone()).collect(),
                true,
            )),
            None => fallback_pair(&ranked),
        }
    }
}

struct Search<'a> {
    pool: &'a [Pick],
    constraints: &'a AccumulatorConstraints,
    max_legs: usize,
    current: Vec<usize>,
    best: Option<(Vec<usize>, f64)>,
}

impl Search<'_> {
    fn visit(&mut self, start: usize, odds: f64, prob: f64) {
        if self.current.len() >= 2 && self.constraints.in_band(odds) {
            let better = match &self.best {
                Some((_, best_prob)) => prob > *best_prob,
                None => true,
            };
            if better {
                self.best = Some((self.current.clone(), prob));
            }
        }
        if self.current.len() >= self.max_legs {
            return;
        }
        for idx in start..self.pool.len() {
            let pick = &self.pool[idx];
            let clash = self
                .current
                .iter()
                .any(|i| self.pool[*i].fixture_id == pick.fixture_id);
            if clash {
                continue;
            }
            let next_prob = prob * pick.probability();
            // Adding legs never raises probability, so a dominated branch can stop here.
            if let Some((_, best_prob)) = &self.best
                && next_prob <= *best_prob
            {
                continue;
            }
            self.current.push(idx);
            self.visit(idx + 1, odds * pick.odds(), next_prob);
            self.current.pop();
        }
    }
}

/// Ranked by `(probability, EV)` descending; the sort is stable.
pub fn rank_picks(picks: &[Pick]) -> Vec<Pick> {
    let mut ranked = picks.to_vec();
    ranked.sort_by(|a, b| {
        b.probability()
            .partial_cmp(&a.probability())
            .unwrap_or(Ordering::Equal)
            .then(b.ev().partial_cmp(&a.ev()).unwrap_or(Ordering::Equal))
    });
    ranked
}

fn fallback_pair(ranked: &[Pick]) -> Option<Accumulator> {
    let first = ranked.first()?;
    let second = ranked.iter().find(|p| p.fixture_id != first.fixture_id)?;
    debug!("no combination inside the odds band, falling back to the top two picks");
    Some(Accumulator::new(vec![first.clone(), second.clone()], false))
}
