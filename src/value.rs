use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::market::{Outcome, Pick};
use crate::odds::implied_probability;

pub fn expected_value(probability: f64, odds: f64) -> f64 {
    probability * odds - 1.0
}

/// Full-Kelly fraction `(b*p - q) / b` with `b = odds - 1`.
pub fn kelly_fraction(probability: f64, odds: f64) -> f64 {
    let b = odds - 1.0;
    let q = 1.0 - probability;
    (b * probability - q) / b
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct KellyConfig {
    pub multiplier: f64,
    pub max_fraction: f64,
    pub conservative: bool,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            multiplier: 0.25,
            max_fraction: 0.05,
            conservative: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoBetReason {
    NegativeEdge,
    InvalidProbability,
    InvalidOdds,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KellyStake {
    pub optimal_stake: f64,
    pub fraction_of_bankroll: f64,
    pub expected_growth: f64,
    /// Heuristic indicator in [0, 100], not a calibrated statistic.
    pub risk_of_ruin: f64,
    pub conservative: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum KellyRecommendation {
    Stake(KellyStake),
    NoBet {
        reason: NoBetReason,
        kelly_fraction: f64,
    },
}

impl KellyRecommendation {
    pub fn stake(&self) -> Option<&KellyStake> {
        match self {
            KellyRecommendation::Stake(s) => Some(s),
            KellyRecommendation::NoBet { .. } => None,
        }
    }

    pub fn is_bet(&self) -> bool {
        self.stake().is_some()
    }
}

/// Decreasing in edge and increasing in the staked fraction.
pub fn risk_of_ruin(fraction: f64, probability: f64, odds: f64) -> f64 {
    if fraction <= 0.0 {
        return 0.0;
    }
    let edge = expected_value(probability, odds);
    if edge <= 0.0 {
        return 100.0;
    }
    let variance = probability * (odds - 1.0).powi(2) + (1.0 - probability);
    let risk_factor = (fraction / edge) * variance.sqrt();
    if risk_factor <= 0.0 {
        return 0.0;
    }
    (10.0 * (-5.0 / risk_factor).exp()).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ValueScorer {
    config: KellyConfig,
}

impl ValueScorer {
    pub fn new(config: KellyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KellyConfig {
        &self.config
    }

    pub fn kelly(&self, probability: f64, odds: f64, bankroll: f64) -> KellyRecommendation {
        if !(probability > 0.0 && probability < 1.0) {
            return KellyRecommendation::NoBet {
                reason: NoBetReason::InvalidProbability,
                kelly_fraction: 0.0,
            };
        }
        if !(odds.is_finite() && odds > 1.0) {
            return KellyRecommendation::NoBet {
                reason: NoBetReason::InvalidOdds,
                kelly_fraction: 0.0,
            };
        }

        let full = kelly_fraction(probability, odds);
        if full <= 0.0 {
            return KellyRecommendation::NoBet {
                reason: NoBetReason::NegativeEdge,
                kelly_fraction: full,
            };
        }

        let mut fraction = full;
        if self.config.conservative {
            fraction *= self.config.multiplier;
        }
        fraction = fraction.min(self.config.max_fraction);

        KellyRecommendation::Stake(KellyStake {
            optimal_stake: bankroll.max(0.0) * fraction,
            fraction_of_bankroll: fraction,
            expected_growth: fraction * expected_value(probability, odds),
            risk_of_ruin: risk_of_ruin(fraction, probability, odds),
            conservative: self.config.conservative,
        })
    }

    pub fn score(&self, pick: &Pick, bankroll: f64) -> ScoredPick {
        ScoredPick {
            kelly: self.kelly(pick.probability(), pick.odds(), bankroll),
            pick: pick.clone(),
        }
    }

    /// Picks whose probability beats the implied one with EV (in percent) of at least
    /// `min_ev_pct`, best EV first.
    pub fn value_bets(&self, picks: &[Pick], min_ev_pct: f64) -> Vec<ValueBet> {
        let mut out: Vec<ValueBet> = picks
            .iter()
            .filter_map(|pick| {
                let implied = implied_probability(pick.odds())?;
                if pick.probability() <= implied {
                    return None;
                }
                let ev_pct = pick.ev() * 100.0;
                if ev_pct < min_ev_pct {
                    return None;
                }
                Some(ValueBet {
                    pick: pick.clone(),
                    implied_probability: implied,
                    edge: pick.probability() - implied,
                    ev_pct,
                    suggested_stake_pct: (ev_pct / 2.0).min(self.config.max_fraction * 100.0),
                })
            })
            .collect();
        out.sort_by(|a, b| b.ev_pct.partial_cmp(&a.ev_pct).unwrap_or(Ordering::Equal));
        out
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredPick {
    pub pick: Pick,
    pub kelly: KellyRecommendation,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValueBet {
    pub pick: Pick,
    pub implied_probability: f64,
    pub edge: f64,
    pub ev_pct: f64,
    pub suggested_stake_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HedgePlan {
    pub outcome: Outcome,
    pub odds: f64,
    pub stake: f64,
    pub profit_if_original_wins: f64,
    pub profit_if_hedge_wins: f64,
    pub guaranteed_profit: f64,
    pub profit_margin_pct: f64,
    pub total_risk: f64,
}

/// Hedge an open single against the best price on any other outcome.
pub fn hedge_bet(
    selection: Outcome,
    stake: f64,
    odds: f64,
    current_odds: &[(Outcome, f64)],
) -> Option<HedgePlan> {
    let (outcome, hedge_odds) = current_odds
        .iter()
        .filter(|(o, price)| *o != selection && implied_probability(*price).is_some())
        .fold(None::<(Outcome, f64)>, |best, (o, price)| match best {
            Some((_, p)) if p >= *price => best,
            _ => Some((*o, *price)),
        })?;

    let potential_win = stake * odds;
    let hedge_stake = (potential_win - stake) / (hedge_odds + 1.0);
    if hedge_stake <= 0.0 {
        return None;
    }

    let profit_if_original_wins = potential_win - stake - hedge_stake;
    let profit_if_hedge_wins = hedge_stake * hedge_odds - stake - hedge_stake;
    let guaranteed_profit = profit_if_original_wins.min(profit_if_hedge_wins);
    let total_risk = stake + hedge_stake;

    Some(HedgePlan {
        outcome,
        odds: hedge_odds,
        stake: hedge_stake,
        profit_if_original_wins,
        profit_if_hedge_wins,
        guaranteed_profit,
        profit_margin_pct: guaranteed_profit / total_risk * 100.0,
        total_risk,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetResult {
    Won,
    Lost,
    Void,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetRecord {
    pub stake: f64,
    pub result: BetResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MartingaleStatus {
    Safe,
    Warning,
    Danger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MartingaleAssessment {
    pub status: MartingaleStatus,
    pub doubling_instances: usize,
    pub consecutive_losses: usize,
    pub enough_history: bool,
}

const MARTINGALE_WINDOW: usize = 10;

/// Count stakes that roughly double (x1.8..=x2.2) right after a loss in the last ten bets
/// of a chronological history.
pub fn martingale_check(history: &[BetRecord]) -> MartingaleAssessment {
    if history.len() < 3 {
        return MartingaleAssessment {
            status: MartingaleStatus::Safe,
            doubling_instances: 0,
            consecutive_losses: 0,
            enough_history: false,
        };
    }

    let recent = &history[history.len().saturating_sub(MARTINGALE_WINDOW)..];
    let mut doubling = 0usize;
    let mut consecutive_losses = 0usize;
    for pair in recent.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        if prev.result != BetResult::Lost {
            consecutive_losses = 0;
            continue;
        }
        consecutive_losses += 1;
        if prev.stake > 0.0 {
            let ratio = cur.stake / prev.stake;
            if (1.8..=2.2).contains(&ratio) {
                doubling += 1;
            }
        }
    }

    let status = match doubling {
        n if n >= 3 => MartingaleStatus::Danger,
        2 => MartingaleStatus::Warning,
        _ => MartingaleStatus::Safe,
    };
    MartingaleAssessment {
        status,
        doubling_instances: doubling,
        consecutive_losses,
        enough_history: true,
    }
}
