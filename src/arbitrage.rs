use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::market::{Fixture, FixtureOdds, MarketKind, Outcome};
use crate::odds::{BestPrice, best_prices, resolve_quotes};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrageConfig {
    pub total_stake: f64,
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            total_stake: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArbitrageStake {
    pub leg: BestPrice,
    pub stake: f64,
    pub payout: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArbitrageOpportunity {
    pub fixture_id: String,
    pub label: String,
    pub legs: Vec<BestPrice>,
    /// Sum of reciprocal best prices; below 1 for every reported opportunity.
    pub margin: f64,
    pub profit_margin_pct: f64,
    pub stakes: Vec<ArbitrageStake>,
    pub guaranteed_payout: f64,
    pub guaranteed_profit: f64,
}

impl ArbitrageOpportunity {
    /// Re-split for another total stake.
    pub fn stake_split(&self, total_stake: f64) -> Vec<ArbitrageStake> {
        split(&self.legs, self.margin, total_stake)
    }
}

pub fn arbitrage_margin(legs: &[BestPrice]) -> Option<f64> {
    if legs.len() < 2 || legs.iter().any(|l| !(l.price.is_finite() && l.price > 1.0)) {
        return None;
    }
    Some(legs.iter().map(|l| 1.0 / l.price).sum())
}

/// Best 1X2 prices across bookmakers for one fixture, or `None` when they do not beat the
/// book. A market quoted with only two outcomes (no draw) is checked on those two; every
/// outcome some book quotes needs a valid best price.
pub fn evaluate(
    fixture: &Fixture,
    odds: &FixtureOdds,
    config: &ArbitrageConfig,
) -> Option<ArbitrageOpportunity> {
    let quotes = resolve_quotes(fixture, MarketKind::H2h, &odds.h2h, None);
    let quoted: HashSet<Outcome> = quotes.iter().map(|q| q.outcome).collect();
    let legs = best_prices(MarketKind::H2h, &quotes);
    if legs.len() != quoted.len() {
        debug!(
            fixture = %fixture.id,
            quoted = quoted.len(),
            priced = legs.len(),
            "incomplete 1x2 prices"
        );
        return None;
    }
    let margin = arbitrage_margin(&legs)?;
    if margin >= 1.0 {
        return None;
    }

    let stakes = split(&legs, margin, config.total_stake);
    let guaranteed_payout = config.total_stake / margin;
    debug!(fixture = %fixture.id, margin, "arbitrage found");
    Some(ArbitrageOpportunity {
        fixture_id: fixture.id.clone(),
        label: fixture.label(),
        legs,
        margin,
        profit_margin_pct: (1.0 - margin) * 100.0,
        stakes,
        guaranteed_payout,
        guaranteed_profit: config.total_stake * (1.0 / margin - 1.0),
    })
}

/// All opportunities on the slate, largest profit margin first.
pub fn scan<'a, I>(fixtures: I, config: &ArbitrageConfig) -> Vec<ArbitrageOpportunity>
where
    I: IntoIterator<Item = (&'a Fixture, &'a FixtureOdds)>,
{
    let mut out: Vec<ArbitrageOpportunity> = fixtures
        .into_iter()
        .filter_map(|(fixture, odds)| evaluate(fixture, odds, config))
        .collect();
    out.sort_by(|a, b| {
        b.profit_margin_pct
            .partial_cmp(&a.profit_margin_pct)
            .unwrap_or(Ordering::Equal)
    });
    out
}

fn split(legs: &[BestPrice], margin: f64, total_stake: f64) -> Vec<ArbitrageStake> {
    legs.iter()
        .map(|leg| {
            let stake = (total_stake / leg.price) / margin;
            ArbitrageStake {
                leg: leg.clone(),
                stake,
                payout: stake * leg.price,
            }
        })
        .collect()
}
