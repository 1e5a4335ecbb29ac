use std::cmp::Ordering;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::accumulator::{
    Accumulator, AccumulatorConstraints, AccumulatorStrategy, BoundedExhaustive,
    GreedyHighProbability, rank_picks,
};
use crate::arbitrage::{self, ArbitrageConfig, ArbitrageOpportunity};
use crate::config::EngineConfig;
use crate::diversify::diversify;
use crate::form::{self, TeamResult};
use crate::market::{Fixture, FixtureOdds, MarketKind, Pick};
use crate::odds::{self, MarketOdds, MarketOddsLookup, TotalsConfig};
use crate::probability::{
    FusionEngine, FusionSource, LearnedModel, MatchFeatures, ProbabilityDistribution,
};
use crate::value::{ScoredPick, ValueBet, ValueScorer};

const MIN_FAIR_ODDS: f64 = 1.01;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SlateConfig {
    pub top_market_picks: usize,
    pub diversified_size: usize,
    pub min_ev_pct: f64,
    pub bankroll: f64,
}

impl Default for SlateConfig {
    fn default() -> Self {
        Self {
            top_market_picks: 6,
            diversified_size: 10,
            min_ev_pct: 5.0,
            bankroll: 1000.0,
        }
    }
}

/// One fixture as handed over by the data collaborators. Recent results, when present,
/// replace the supplied form scalars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlateEntry {
    #[serde(flatten)]
    pub fixture: Fixture,
    #[serde(default)]
    pub odds: FixtureOdds,
    #[serde(default)]
    pub home_results: Vec<TeamResult>,
    #[serde(default)]
    pub away_results: Vec<TeamResult>,
}

impl SlateEntry {
    pub fn resolved_fixture(&self) -> Fixture {
        let mut fixture = self.fixture.clone();
        if !self.home_results.is_empty() {
            fixture.home_form = form::form_points(&self.home_results);
        }
        if !self.away_results.is_empty() {
            fixture.away_form = form::form_points(&self.away_results);
        }
        fixture
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Slate {
    pub fixtures: Vec<SlateEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketAnalysis {
    pub market: MarketKind,
    pub line: Option<f64>,
    pub distribution: ProbabilityDistribution,
    pub source: FusionSource,
    pub model_applied: bool,
    pub bookmakers_used: usize,
    pub picks: Vec<Pick>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FixtureAnalysis {
    pub fixture: Fixture,
    pub markets: Vec<MarketAnalysis>,
}

impl FixtureAnalysis {
    pub fn market(&self, market: MarketKind) -> Option<&MarketAnalysis> {
        self.markets.iter().find(|m| m.market == market)
    }

    pub fn picks(&self) -> impl Iterator<Item = &Pick> + '_ {
        self.markets.iter().flat_map(|m| m.picks.iter())
    }

    /// Most likely 1X2 outcome; EV breaks probability ties.
    pub fn best_pick(&self) -> Option<&Pick> {
        self.market(MarketKind::H2h)?
            .picks
            .iter()
            .fold(None::<&Pick>, |best, p| match best {
                Some(b) if cmp_probability_then_ev(b, p) != Ordering::Less => Some(b),
                _ => Some(p),
            })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SlateReport {
    pub user_id: String,
    pub date: String,
    pub fixtures: Vec<FixtureAnalysis>,
    pub best_picks: Vec<Pick>,
    pub diversified: Vec<Pick>,
    pub stakes: Vec<ScoredPick>,
    pub accumulator: Option<Accumulator>,
    pub best_accumulator: Option<Accumulator>,
    pub top_market_picks: Vec<Pick>,
    pub value_bets: Vec<ValueBet>,
    pub arbitrage: Vec<ArbitrageOpportunity>,
}

/// Runs fusion, scoring and selection over a slate. Cheap to clone; holds no mutable state.
#[derive(Clone, Default)]
pub struct SlateAnalyzer {
    fusion: FusionEngine,
    scorer: ValueScorer,
    totals: TotalsConfig,
    constraints: AccumulatorConstraints,
    arbitrage: ArbitrageConfig,
    slate: SlateConfig,
}

impl SlateAnalyzer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            fusion: FusionEngine::new(config.fusion),
            scorer: ValueScorer::new(config.kelly),
            totals: config.totals,
            constraints: config.accumulator,
            arbitrage: config.arbitrage,
            slate: config.slate,
        }
    }

    pub fn totals(&self) -> &TotalsConfig {
        &self.totals
    }

    pub fn with_model(mut self, model: Arc<dyn LearnedModel>) -> Self {
        self.fusion = self.fusion.with_model(model);
        self
    }

    pub fn analyze_fixture(&self, fixture: &Fixture, odds: &FixtureOdds) -> FixtureAnalysis {
        let markets = [MarketKind::H2h, MarketKind::Totals, MarketKind::Btts]
            .into_iter()
            .filter_map(|market| self.analyze_market(fixture, odds, market))
            .collect();
        FixtureAnalysis {
            fixture: fixture.clone(),
            markets,
        }
    }

    /// Fixtures are analyzed in parallel; output keeps input order.
    pub fn analyze_slate(&self, entries: &[SlateEntry]) -> Vec<FixtureAnalysis> {
        entries
            .par_iter()
            .map(|entry| self.analyze_fixture(&entry.resolved_fixture(), &entry.odds))
            .collect()
    }

    pub fn report(&self, entries: &[SlateEntry], user_id: &str, date: &str) -> SlateReport {
        let fixtures = self.analyze_slate(entries);
        let best = best_picks(&fixtures);
        let diversified = diversify(&best, user_id, date, self.slate.diversified_size);
        let stakes = diversified
            .iter()
            .map(|p| self.scorer.score(p, self.slate.bankroll))
            .collect();
        let accumulator = GreedyHighProbability.build(&diversified, &self.constraints);
        let best_accumulator = BoundedExhaustive::default().build(&diversified, &self.constraints);
        let top = top_market_picks(&fixtures, self.slate.top_market_picks);

        let all_picks: Vec<Pick> = fixtures.iter().flat_map(|f| f.picks().cloned()).collect();
        let value_bets = self.scorer.value_bets(&all_picks, self.slate.min_ev_pct);
        let arbitrage = arbitrage::scan(
            entries.iter().map(|e| (&e.fixture, &e.odds)),
            &self.arbitrage,
        );

        info!(
            fixtures = fixtures.len(),
            picks = all_picks.len(),
            diversified = diversified.len(),
            value_bets = value_bets.len(),
            arbitrage = arbitrage.len(),
            "slate analyzed"
        );

        SlateReport {
            user_id: user_id.to_string(),
            date: date.to_string(),
            fixtures,
            best_picks: best,
            diversified,
            stakes,
            accumulator,
            best_accumulator,
            top_market_picks: top,
            value_bets,
            arbitrage,
        }
    }

    fn analyze_market(
        &self,
        fixture: &Fixture,
        odds: &FixtureOdds,
        market: MarketKind,
    ) -> Option<MarketAnalysis> {
        let lookup = odds::market_odds(fixture, odds, market, &self.totals);
        let priced: Option<MarketOdds> = match lookup {
            MarketOddsLookup::Priced(m) => Some(m),
            MarketOddsLookup::Unquoted => None,
            MarketOddsLookup::NoLineInRange => {
                debug!(fixture = %fixture.id, "skipping totals, no line near target");
                return None;
            }
        };
        let line = match (&priced, market) {
            (Some(m), _) => m.line,
            (None, MarketKind::Totals) => Some(self.totals.target_line),
            (None, _) => None,
        };

        let odds_dist = priced.as_ref().and_then(|m| m.consensus.as_ref());
        let prior = form::prior_for(market, fixture);
        let features = MatchFeatures::new(market, fixture, odds_dist, line);
        let fused = self
            .fusion
            .fuse(market, odds_dist, Some(&prior), Some(&features));

        let picks = fused
            .distribution
            .iter()
            .map(|(outcome, p)| {
                let price = priced
                    .as_ref()
                    .and_then(|m| m.price_for(outcome))
                    .unwrap_or_else(|| fair_odds(p));
                Pick::new(fixture, outcome, p, price).with_line(line)
            })
            .collect();

        Some(MarketAnalysis {
            market,
            line,
            source: fused.source,
            model_applied: fused.model_applied,
            bookmakers_used: priced.as_ref().map_or(0, |m| m.bookmakers_used),
            distribution: fused.distribution,
            picks,
        })
    }
}

/// Decimal odds with no margin for `probability`, floored at 1.01.
pub fn fair_odds(probability: f64) -> f64 {
    (1.0 / probability.max(1e-6)).max(MIN_FAIR_ODDS)
}

/// Best 1X2 pick of every fixture, ranked by `(probability, EV)`.
pub fn best_picks(analyses: &[FixtureAnalysis]) -> Vec<Pick> {
    let picks: Vec<Pick> = analyses
        .iter()
        .filter_map(|a| a.best_pick().cloned())
        .collect();
    rank_picks(&picks)
}

/// Totals and BTTS picks across the slate ranked by `(EV, probability)`.
pub fn top_market_picks(analyses: &[FixtureAnalysis], top_n: usize) -> Vec<Pick> {
    let mut picks: Vec<Pick> = analyses
        .iter()
        .flat_map(|a| a.picks())
        .filter(|p| p.market != MarketKind::H2h)
        .cloned()
        .collect();
    picks.sort_by(|a, b| {
        b.ev()
            .partial_cmp(&a.ev())
            .unwrap_or(Ordering::Equal)
            .then(
                b.probability()
                    .partial_cmp(&a.probability())
                    .unwrap_or(Ordering::Equal),
            )
    });
    picks.truncate(top_n);
    picks
}

fn cmp_probability_then_ev(a: &Pick, b: &Pick) -> Ordering {
    a.probability()
        .partial_cmp(&b.probability())
        .unwrap_or(Ordering::Equal)
        .then(a.ev().partial_cmp(&b.ev()).unwrap_or(Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{BookmakerQuote, Outcome, QuoteOutcome};

    fn fixture(id: &str, home_form: f64, away_form: f64) -> Fixture {
        Fixture {
            id: id.to_string(),
            competition: "PL".to_string(),
            home: "Everton".to_string(),
            away: "Wolves".to_string(),
            kickoff: None,
            home_form,
            away_form,
        }
    }

    fn book(name: &str, prices: &[(&str, f64, Option<f64>)]) -> BookmakerQuote {
        BookmakerQuote {
            bookmaker: name.to_string(),
            outcomes: prices
                .iter()
                .map(|(n, p, point)| QuoteOutcome {
                    name: n.to_string(),
                    price: *p,
                    point: *point,
                })
                .collect(),
        }
    }

    #[test]
    fn form_only_fixture_gets_every_market_at_fair_odds() {
        let analysis = SlateAnalyzer::default()
            .analyze_fixture(&fixture("f", 2.0, 1.0), &FixtureOdds::default());
        assert_eq!(analysis.markets.len(), 3);
        let h2h = analysis.market(MarketKind::H2h).expect("h2h");
        assert_eq!(h2h.source, FusionSource::FormOnly);
        for pick in &h2h.picks {
            assert!((pick.odds() - fair_odds(pick.probability())).abs() < 1e-12);
        }
        let totals = analysis.market(MarketKind::Totals).expect("totals");
        assert_eq!(totals.line, Some(2.5));
        assert_eq!(analysis.best_pick().map(|p| p.selection), Some(Outcome::Home));
    }

    #[test]
    fn quoted_markets_blend_and_use_median_price() {
        let odds = FixtureOdds {
            h2h: vec![
                book("a", &[("Everton", 2.0, None), ("Draw", 3.4, None), ("Wolves", 4.0, None)]),
                book("b", &[("Everton", 2.2, None), ("Draw", 3.3, None), ("Wolves", 3.6, None)]),
            ],
            ..FixtureOdds::default()
        };
        let analysis = SlateAnalyzer::default().analyze_fixture(&fixture("f", 1.5, 1.5), &odds);
        let h2h = analysis.market(MarketKind::H2h).expect("h2h");
        assert_eq!(h2h.source, FusionSource::Blended);
        assert_eq!(h2h.bookmakers_used, 2);
        let home = h2h.picks.iter().find(|p| p.selection == Outcome::Home).expect("home");
        assert!((home.odds() - 2.1).abs() < 1e-12);
        assert!((h2h.distribution.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn totals_without_a_nearby_line_are_skipped() {
        let odds = FixtureOdds {
            totals: vec![book("a", &[("Over", 1.2, Some(0.5)), ("Under", 4.0, Some(0.5))])],
            ..FixtureOdds::default()
        };
        let analysis = SlateAnalyzer::default().analyze_fixture(&fixture("f", 1.5, 1.5), &odds);
        assert!(analysis.market(MarketKind::Totals).is_none());
        assert!(analysis.market(MarketKind::Btts).is_some());
    }

    #[test]
    fn slate_keeps_input_order() {
        let entries: Vec<SlateEntry> = (0..20)
            .map(|i| SlateEntry {
                fixture: fixture(&format!("f{i}"), 1.0 + (i % 3) as f64 * 0.5, 1.5),
                odds: FixtureOdds::default(),
                home_results: Vec::new(),
                away_results: Vec::new(),
            })
            .collect();
        let out = SlateAnalyzer::default().analyze_slate(&entries);
        let ids: Vec<&str> = out.iter().map(|a| a.fixture.id.as_str()).collect();
        let expected: Vec<String> = (0..20).map(|i| format!("f{i}")).collect();
        assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn recent_results_override_form() {
        let entry = SlateEntry {
            fixture: fixture("f", 1.5, 1.5),
            odds: FixtureOdds::default(),
            home_results: vec![TeamResult {
                utc_date: None,
                goals_for: 3,
                goals_against: 0,
                finished: true,
            }],
            away_results: Vec::new(),
        };
        let resolved = entry.resolved_fixture();
        assert_eq!(resolved.home_form, 3.0);
        assert_eq!(resolved.away_form, 1.5);
    }

    #[test]
    fn top_market_picks_exclude_1x2_and_respect_limit() {
        let analyzer = SlateAnalyzer::default();
        let analyses: Vec<FixtureAnalysis> = (0..4)
            .map(|i| {
                let f = fixture(&format!("f{i}"), 2.5, 0.5);
                analyzer.analyze_fixture(&f, &FixtureOdds::default())
            })
            .collect();
        let top = top_market_picks(&analyses, 3);
        assert_eq!(top.len(), 3);
        assert!(top.iter().all(|p| p.market != MarketKind::H2h));
        for w in top.windows(2) {
            assert!(w[0].ev() >= w[1].ev());
        }
    }

    #[test]
    fn fair_odds_are_floored() {
        assert_eq!(fair_odds(1.0), 1.01);
        assert!((fair_odds(0.5) - 2.0).abs() < 1e-12);
        assert!(fair_odds(0.0).is_finite());
    }
}
