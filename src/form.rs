use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::market::{DEFAULT_FORM_POINTS, Fixture, MarketKind};
use crate::probability::ProbabilityDistribution;

const FORM_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultKind {
    Win,
    Draw,
    Loss,
}

impl ResultKind {
    pub fn points(self) -> f64 {
        match self {
            ResultKind::Win => 3.0,
            ResultKind::Draw => 1.0,
            ResultKind::Loss => 0.0,
        }
    }
}

/// A past match seen from one team's side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamResult {
    #[serde(default)]
    pub utc_date: Option<String>,
    pub goals_for: u8,
    pub goals_against: u8,
    #[serde(default = "default_finished")]
    pub finished: bool,
}

fn default_finished() -> bool {
    true
}

impl TeamResult {
    pub fn kind(&self) -> ResultKind {
        match self.goals_for.cmp(&self.goals_against) {
            Ordering::Greater => ResultKind::Win,
            Ordering::Less => ResultKind::Loss,
            Ordering::Equal => ResultKind::Draw,
        }
    }
}

/// Mean points per game over the last five finished results. Results carrying a date are
/// ordered by it; undated ones keep their input position relative to each other.
pub fn form_points(results: &[TeamResult]) -> f64 {
    let mut finished: Vec<(usize, Option<i64>, &TeamResult)> = results
        .iter()
        .enumerate()
        .filter(|(_, r)| r.finished)
        .map(|(idx, r)| (idx, r.utc_date.as_deref().and_then(parse_timestamp), r))
        .collect();
    if finished.is_empty() {
        return DEFAULT_FORM_POINTS;
    }

    if finished.iter().all(|(_, ts, _)| ts.is_some()) {
        finished.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
    }

    let start = finished.len().saturating_sub(FORM_WINDOW);
    let window = &finished[start..];
    window.iter().map(|(_, _, r)| r.kind().points()).sum::<f64>() / window.len() as f64
}

/// 1X2 prior from `home_form - away_form`. The draw share shrinks as the teams diverge.
pub fn probs_from_form(form_diff: f64) -> ProbabilityDistribution {
    let form_diff = if form_diff.is_finite() { form_diff } else { 0.0 };
    let p_draw = 0.24 - 0.04 * (form_diff.abs() / 3.0).tanh();
    let rest = (1.0 - p_draw).max(1e-6);
    let p_home = ((0.50 + 0.18 * (form_diff / 2.0).tanh()) * rest).clamp(1e-6, rest - 1e-6);
    let p_away = rest - p_home;

    ProbabilityDistribution::from_weights(MarketKind::H2h, &[p_home, p_draw, p_away])
        .unwrap_or_else(|| ProbabilityDistribution::neutral(MarketKind::H2h))
}

/// Over/Under prior from the teams' average form: livelier sides lean Over.
pub fn totals_from_form(home_form: f64, away_form: f64) -> ProbabilityDistribution {
    let combined = (home_form + away_form) / 2.0;
    let p_over = 0.5 + 0.15 * (combined - DEFAULT_FORM_POINTS).tanh();
    binary(MarketKind::Totals, p_over)
}

/// BTTS prior keyed on the weaker side's form.
pub fn btts_from_form(home_form: f64, away_form: f64) -> ProbabilityDistribution {
    let min_form = home_form.min(away_form);
    let p_yes = 0.5 + 0.12 * (min_form - 1.2).tanh();
    binary(MarketKind::Btts, p_yes)
}

pub fn prior_for(market: MarketKind, fixture: &Fixture) -> ProbabilityDistribution {
    match market {
        MarketKind::H2h => probs_from_form(fixture.form_diff()),
        MarketKind::Totals => totals_from_form(fixture.home_form, fixture.away_form),
        MarketKind::Btts => btts_from_form(fixture.home_form, fixture.away_form),
    }
}

fn binary(market: MarketKind, p_first: f64) -> ProbabilityDistribution {
    let p = if p_first.is_finite() { p_first.clamp(0.0, 1.0) } else { 0.5 };
    ProbabilityDistribution::from_weights(market, &[p, 1.0 - p])
        .unwrap_or_else(|| ProbabilityDistribution::neutral(market))
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.timestamp());
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(Utc.from_utc_datetime(&naive).timestamp());
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive).timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Outcome;

    fn result(date: Option<&str>, gf: u8, ga: u8) -> TeamResult {
        TeamResult {
            utc_date: date.map(str::to_string),
            goals_for: gf,
            goals_against: ga,
            finished: true,
        }
    }

    #[test]
    fn no_results_defaults_to_one_and_a_half() {
        assert_eq!(form_points(&[]), 1.5);
        let mut pending = result(None, 0, 0);
        pending.finished = false;
        assert_eq!(form_points(&[pending]), 1.5);
    }

    #[test]
    fn form_uses_last_five_by_date() {
        // Six results, oldest is a loss listed last in input.
        let results = vec![
            result(Some("2025-03-01T15:00:00Z"), 2, 0),
            result(Some("2025-03-08T15:00:00Z"), 1, 1),
            result(Some("2025-03-15T15:00:00Z"), 3, 1),
            result(Some("2025-03-22T15:00:00Z"), 0, 0),
            result(Some("2025-03-29T15:00:00Z"), 2, 1),
            result(Some("2025-02-01T15:00:00Z"), 0, 4),
        ];
        // Window: W D W D W = 11 / 5
        assert!((form_points(&results) - 2.2).abs() < 1e-12);
    }

    #[test]
    fn undated_results_keep_input_order() {
        let results = vec![result(None, 0, 1), result(None, 1, 0), result(None, 1, 0)];
        assert!((form_points(&results) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn level_form_is_symmetric() {
        let d = probs_from_form(0.0);
        assert!((d.get(Outcome::Draw) - 0.24).abs() < 1e-12);
        assert!((d.get(Outcome::Home) - d.get(Outcome::Away)).abs() < 1e-12);
    }

    #[test]
    fn better_home_form_favours_home() {
        let d = probs_from_form(1.5);
        assert!(d.get(Outcome::Home) > d.get(Outcome::Away));
        assert!(d.get(Outcome::Draw) < 0.24);
        let extreme = probs_from_form(100.0);
        assert!(extreme.get(Outcome::Away) > 0.0);
        assert!((extreme.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn binary_priors_are_monotonic_and_bounded() {
        let low = totals_from_form(0.0, 0.0).get(Outcome::Over);
        let mid = totals_from_form(1.5, 1.5).get(Outcome::Over);
        let high = totals_from_form(3.0, 3.0).get(Outcome::Over);
        assert!(low < mid && mid < high);
        assert!((mid - 0.5).abs() < 1e-12);
        assert!(low > 0.35 && high < 0.65);

        let weak = btts_from_form(3.0, 0.0).get(Outcome::Yes);
        let strong = btts_from_form(2.5, 2.5).get(Outcome::Yes);
        assert!(weak < strong);
        assert!(weak > 0.35 && strong < 0.65);
    }

    #[test]
    fn parses_common_timestamp_shapes() {
        assert!(parse_timestamp("2025-01-01T12:00:00Z").is_some());
        assert!(parse_timestamp("2025-01-01 12:00").is_some());
        assert_eq!(
            parse_timestamp("2025-01-01"),
            parse_timestamp("2025-01-01T00:00:00Z")
        );
        assert!(parse_timestamp("soon").is_none());
    }
}
