use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::form;
use crate::market::{MarketKind, Outcome, Pick};
use crate::odds::{self, MarketOddsLookup};
use crate::probability::ProbabilityDistribution;
use crate::slate::{SlateAnalyzer, SlateEntry, best_picks};
use crate::value::BetResult;

const WEIGHT_STEPS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalScore {
    pub home: u8,
    pub away: u8,
}

impl FinalScore {
    pub fn total_goals(&self) -> u32 {
        self.home as u32 + self.away as u32
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

pub fn classify_outcome(score: &FinalScore) -> Outcome {
    if score.home > score.away {
        Outcome::Home
    } else if score.home < score.away {
        Outcome::Away
    } else {
        Outcome::Draw
    }
}

/// The outcome that won `market`, or `None` for a push on the totals line (or a totals
/// market with no line).
pub fn realized_outcome(
    market: MarketKind,
    score: &FinalScore,
    line: Option<f64>,
) -> Option<Outcome> {
    match market {
        MarketKind::H2h => Some(classify_outcome(score)),
        MarketKind::Totals => {
            let line = line?;
            let total = score.total_goals() as f64;
            if total > line {
                Some(Outcome::Over)
            } else if total < line {
                Some(Outcome::Under)
            } else {
                None
            }
        }
        MarketKind::Btts => {
            if score.home > 0 && score.away > 0 {
                Some(Outcome::Yes)
            } else {
                Some(Outcome::No)
            }
        }
    }
}

/// `None` when the pick cannot be graded (totals without a line).
pub fn settle_pick(pick: &Pick, score: &FinalScore) -> Option<BetResult> {
    if pick.market == MarketKind::Totals && pick.line.is_none() {
        return None;
    }
    Some(match realized_outcome(pick.market, score, pick.line) {
        Some(outcome) if outcome == pick.selection => BetResult::Won,
        Some(_) => BetResult::Lost,
        None => BetResult::Void,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SettlementSummary {
    pub won: usize,
    pub lost: usize,
    pub void: usize,
    pub hit_rate: f64,
    pub staked: f64,
    pub profit: f64,
    pub roi_pct: f64,
}

/// Flat one-unit stakes; voids return the stake and count as not staked.
pub fn summarize_settlements(settled: &[(Pick, BetResult)]) -> SettlementSummary {
    let mut out = SettlementSummary::default();
    for (pick, result) in settled {
        match result {
            BetResult::Won => {
                out.won += 1;
                out.staked += 1.0;
                out.profit += pick.odds() - 1.0;
            }
            BetResult::Lost => {
                out.lost += 1;
                out.staked += 1.0;
                out.profit -= 1.0;
            }
            BetResult::Void => out.void += 1,
            BetResult::Pending => {}
        }
    }
    let graded = out.won + out.lost;
    if graded > 0 {
        out.hit_rate = out.won as f64 / graded as f64;
    }
    if out.staked > 0.0 {
        out.roi_pct = out.profit / out.staked * 100.0;
    }
    out
}

pub fn evaluate_distributions(
    predictions: &[ProbabilityDistribution],
    outcomes: &[Outcome],
) -> Metrics {
    if predictions.is_empty() || predictions.len() != outcomes.len() {
        return Metrics::default();
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;

    for (p, outcome) in predictions.iter().zip(outcomes) {
        brier_sum += p
            .iter()
            .map(|(o, prob)| {
                let y = if o == *outcome { 1.0 } else { 0.0 };
                (prob - y).powi(2)
            })
            .sum::<f64>();
        log_loss_sum += -p.get(*outcome).clamp(1e-12, 1.0).ln();
        if p.argmax().0 == *outcome {
            correct += 1;
        }
    }

    let n = predictions.len() as f64;
    Metrics {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

pub fn calibration_bins(
    predictions: &[ProbabilityDistribution],
    outcomes: &[Outcome],
    class: Outcome,
    bins: usize,
) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let mut counts = vec![0usize; bins];
    let mut pred_sum = vec![0.0_f64; bins];
    let mut actual_sum = vec![0.0_f64; bins];

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let class_prob = p.get(class).clamp(0.0, 1.0);
        let idx = ((class_prob * bins as f64).floor() as usize).min(bins - 1);
        counts[idx] += 1;
        pred_sum[idx] += class_prob;
        if *outcome == class {
            actual_sum[idx] += 1.0;
        }
    }

    (0..bins)
        .map(|i| {
            let count = counts[i];
            let (avg_pred, actual_rate) = if count > 0 {
                (pred_sum[i] / count as f64, actual_sum[i] / count as f64)
            } else {
                (0.0, 0.0)
            };
            CalibrationBin {
                bucket_start: i as f64 / bins as f64,
                bucket_end: (i + 1) as f64 / bins as f64,
                count,
                avg_pred,
                actual_rate,
            }
        })
        .collect()
}

/// Odds consensus and form prior for one settled fixture.
#[derive(Debug, Clone)]
pub struct WeightSample {
    pub odds: ProbabilityDistribution,
    pub form: ProbabilityDistribution,
    pub outcome: Outcome,
}

/// Grid search over the odds weight in steps of 0.05, minimizing log loss.
/// Returns the default 0.8 with empty metrics when there is nothing to fit.
pub fn fit_odds_weight(samples: &[WeightSample]) -> (f64, Metrics) {
    if samples.is_empty() {
        return (0.8, Metrics::default());
    }
    let outcomes: Vec<Outcome> = samples.iter().map(|s| s.outcome).collect();

    let mut best_w = 0.0;
    let mut best_metrics: Option<Metrics> = None;
    for step in 0..=WEIGHT_STEPS {
        let w = step as f64 / WEIGHT_STEPS as f64;
        let blended: Vec<ProbabilityDistribution> =
            samples.iter().map(|s| s.odds.blend(&s.form, w)).collect();
        let metrics = evaluate_distributions(&blended, &outcomes);
        if best_metrics.is_none_or(|m| metrics.log_loss < m.log_loss) {
            best_w = w;
            best_metrics = Some(metrics);
        }
    }
    (best_w, best_metrics.unwrap_or_default())
}

/// A slate entry together with its final score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettledFixture {
    #[serde(flatten)]
    pub entry: SlateEntry,
    pub final_score: FinalScore,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub h2h: Metrics,
    pub best_picks: SettlementSummary,
    pub all_picks: SettlementSummary,
    pub fitted_odds_weight: f64,
    pub fitted: Metrics,
}

pub fn backtest(analyzer: &SlateAnalyzer, cases: &[SettledFixture]) -> BacktestReport {
    let entries: Vec<SlateEntry> = cases.iter().map(|c| c.entry.clone()).collect();
    let analyses = analyzer.analyze_slate(&entries);

    let mut predictions = Vec::new();
    let mut outcomes = Vec::new();
    let mut settled_all = Vec::new();
    let mut samples = Vec::new();

    for (case, analysis) in cases.iter().zip(&analyses) {
        let score = &case.final_score;
        if let Some(h2h) = analysis.market(MarketKind::H2h) {
            predictions.push(h2h.distribution.clone());
            outcomes.push(classify_outcome(score));
        }
        for pick in analysis.picks() {
            if let Some(result) = settle_pick(pick, score) {
                settled_all.push((pick.clone(), result));
            }
        }

        let fixture = case.entry.resolved_fixture();
        if let MarketOddsLookup::Priced(m) = odds::market_odds(
            &fixture,
            &case.entry.odds,
            MarketKind::H2h,
            analyzer.totals(),
        )
            && let Some(consensus) = m.consensus
        {
            samples.push(WeightSample {
                odds: consensus,
                form: form::prior_for(MarketKind::H2h, &fixture),
                outcome: classify_outcome(score),
            });
        } else {
            debug!(fixture = %fixture.id, "no 1X2 consensus, left out of the weight fit");
        }
    }

    let score_for = |pick: &Pick| {
        cases
            .iter()
            .find(|c| c.entry.fixture.id == pick.fixture_id)
            .map(|c| c.final_score)
    };
    let settled_best: Vec<(Pick, BetResult)> = best_picks(&analyses)
        .into_iter()
        .filter_map(|pick| {
            let score = score_for(&pick)?;
            let result = settle_pick(&pick, &score)?;
            Some((pick, result))
        })
        .collect();

    let (fitted_odds_weight, fitted) = fit_odds_weight(&samples);
    BacktestReport {
        h2h: evaluate_distributions(&predictions, &outcomes),
        best_picks: summarize_settlements(&settled_best),
        all_picks: summarize_settlements(&settled_all),
        fitted_odds_weight,
        fitted,
    }
}
