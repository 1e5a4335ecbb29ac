use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::market::{BookmakerQuote, Fixture, FixtureOdds, MarketKind, MarketQuote, Outcome};
use crate::probability::ProbabilityDistribution;

const LINE_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TotalsConfig {
    pub target_line: f64,
    pub tolerance: f64,
}

impl Default for TotalsConfig {
    fn default() -> Self {
        Self {
            target_line: 2.5,
            tolerance: 0.25,
        }
    }
}

pub fn implied_probability(odds: f64) -> Option<f64> {
    if odds.is_finite() && odds > 1.0 {
        Some(1.0 / odds)
    } else {
        None
    }
}

/// Strip the bookmaker margin from one book's prices for one market.
/// Prices at or below 1.0 are dropped first; fewer than two survivors yields `None`.
pub fn normalize_prices(prices: &[(Outcome, f64)]) -> Option<Vec<(Outcome, f64)>> {
    let implied: Vec<(Outcome, f64)> = prices
        .iter()
        .filter_map(|(o, price)| implied_probability(*price).map(|p| (*o, p)))
        .collect();
    if implied.len() < 2 {
        return None;
    }
    let sum: f64 = implied.iter().map(|(_, p)| p).sum();
    if sum <= 0.0 {
        return None;
    }
    Some(implied.into_iter().map(|(o, p)| (o, p / sum)).collect())
}

/// Sum of implied probabilities minus one, for the valid prices only.
pub fn overround(prices: &[f64]) -> Option<f64> {
    let implied: Vec<f64> = prices.iter().filter_map(|p| implied_probability(*p)).collect();
    if implied.len() < 2 {
        return None;
    }
    Some(implied.iter().sum::<f64>() - 1.0)
}

/// Margin-free probabilities per bookmaker, averaged outcome by outcome.
/// Outcomes no bookmaker priced get zero mass before the final renormalization.
pub fn consensus(market: MarketKind, quotes: &[MarketQuote]) -> Option<ProbabilityDistribution> {
    let outcomes = market.outcomes();
    let mut sums = vec![0.0_f64; outcomes.len()];
    let mut counts = vec![0usize; outcomes.len()];

    for book in bookmakers_in_order(quotes) {
        let prices: Vec<(Outcome, f64)> = quotes
            .iter()
            .filter(|q| q.bookmaker == book && q.market == market)
            .map(|q| (q.outcome, q.price))
            .collect();
        let Some(normalized) = normalize_prices(&prices) else {
            debug!(
                bookmaker = %book,
                market = market.key(),
                "dropping quote with fewer than two valid prices"
            );
            continue;
        };
        for (outcome, p) in normalized {
            if let Some(idx) = outcomes.iter().position(|o| *o == outcome) {
                sums[idx] += p;
                counts[idx] += 1;
            }
        }
    }

    if counts.iter().all(|c| *c == 0) {
        return None;
    }
    let means: Vec<f64> = sums
        .iter()
        .zip(&counts)
        .map(|(s, c)| if *c > 0 { s / *c as f64 } else { 0.0 })
        .collect();
    ProbabilityDistribution::from_weights(market, &means)
}

pub fn median_price(quotes: &[MarketQuote], outcome: Outcome) -> Option<f64> {
    let prices: Vec<f64> = quotes
        .iter()
        .filter(|q| q.outcome == outcome && implied_probability(q.price).is_some())
        .map(|q| q.price)
        .collect();
    median_f64(&prices)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestPrice {
    pub outcome: Outcome,
    pub price: f64,
    pub bookmaker: String,
}

/// Highest valid price per outcome across bookmakers, in market outcome order.
/// The first bookmaker listed keeps a tied price.
pub fn best_prices(market: MarketKind, quotes: &[MarketQuote]) -> Vec<BestPrice> {
    let mut out: Vec<BestPrice> = Vec::new();
    for outcome in market.outcomes() {
        let best = quotes
            .iter()
            .filter(|q| q.outcome == *outcome && implied_probability(q.price).is_some())
            .fold(None::<&MarketQuote>, |best, q| match best {
                Some(b) if b.price >= q.price => Some(b),
                _ => Some(q),
            });
        if let Some(q) = best {
            out.push(BestPrice {
                outcome: *outcome,
                price: q.price,
                bookmaker: q.bookmaker.clone(),
            });
        }
    }
    out
}

/// Totals line closest to `target` across all books, if one lies within `tolerance`.
/// Equidistant lines resolve to the lower one.
pub fn select_totals_line(books: &[BookmakerQuote], cfg: &TotalsConfig) -> Option<f64> {
    let mut best: Option<(f64, f64)> = None;
    for point in books
        .iter()
        .flat_map(|b| b.outcomes.iter())
        .filter_map(|o| o.point)
        .filter(|p| p.is_finite())
    {
        let diff = (point - cfg.target_line).abs();
        if diff > cfg.tolerance + LINE_EPS {
            continue;
        }
        best = match best {
            Some((line, best_diff))
                if best_diff < diff - LINE_EPS
                    || ((best_diff - diff).abs() <= LINE_EPS && line <= point) =>
            {
                Some((line, best_diff))
            }
            _ => Some((point, diff)),
        };
    }
    best.map(|(line, _)| line)
}

/// Map raw bookmaker blocks onto concrete outcomes for `market`. Totals outcomes are
/// kept only at `line`. A 1X2 book with any outcome name that does not resolve to this
/// fixture is dropped whole, so its remaining legs never pose as a complete market.
pub fn resolve_quotes(
    fixture: &Fixture,
    market: MarketKind,
    books: &[BookmakerQuote],
    line: Option<f64>,
) -> Vec<MarketQuote> {
    let resolver = OutcomeResolver::new(fixture);
    let mut out = Vec::new();
    'books: for book in books {
        let mut seen: HashSet<Outcome> = HashSet::new();
        let mut resolved: Vec<MarketQuote> = Vec::with_capacity(book.outcomes.len());
        for raw in &book.outcomes {
            if !raw.price.is_finite() {
                warn!(bookmaker = %book.bookmaker, outcome = %raw.name, "non-finite price");
                continue;
            }
            if market == MarketKind::Totals {
                match (raw.point, line) {
                    (Some(p), Some(l)) if (p - l).abs() <= LINE_EPS => {}
                    _ => continue,
                }
            }
            let Some(outcome) = resolver.resolve(market, &raw.name) else {
                if market == MarketKind::H2h {
                    warn!(
                        fixture = %fixture.id,
                        bookmaker = %book.bookmaker,
                        outcome = %raw.name,
                        "unresolved 1x2 outcome, dropping book"
                    );
                    continue 'books;
                }
                continue;
            };
            // A book quoting the same outcome twice keeps its first price.
            if !seen.insert(outcome) {
                continue;
            }
            resolved.push(MarketQuote {
                bookmaker: book.bookmaker.clone(),
                market,
                outcome,
                price: raw.price,
                line: if market == MarketKind::Totals { line } else { None },
            });
        }
        out.extend(resolved);
    }
    out
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketOdds {
    pub market: MarketKind,
    pub line: Option<f64>,
    pub quotes: Vec<MarketQuote>,
    pub consensus: Option<ProbabilityDistribution>,
    pub bookmakers_used: usize,
}

impl MarketOdds {
    pub fn price_for(&self, outcome: Outcome) -> Option<f64> {
        median_price(&self.quotes, outcome)
    }
}

#[derive(Debug, Clone)]
pub enum MarketOddsLookup {
    Priced(MarketOdds),
    /// No bookmaker block for the market at all.
    Unquoted,
    /// Totals were quoted, but no line sits close enough to the target.
    NoLineInRange,
}

pub fn market_odds(
    fixture: &Fixture,
    odds: &FixtureOdds,
    market: MarketKind,
    totals: &TotalsConfig,
) -> MarketOddsLookup {
    let books = odds.books(market);
    if books.is_empty() {
        return MarketOddsLookup::Unquoted;
    }

    let line = if market == MarketKind::Totals {
        match select_totals_line(books, totals) {
            Some(line) => Some(line),
            None => {
                debug!(
                    fixture = %fixture.id,
                    target = totals.target_line,
                    "no totals line in range"
                );
                return MarketOddsLookup::NoLineInRange;
            }
        }
    } else {
        None
    };

    let quotes = resolve_quotes(fixture, market, books, line);
    let consensus = consensus(market, &quotes);
    let bookmakers_used = bookmakers_in_order(&quotes).len();
    MarketOddsLookup::Priced(MarketOdds {
        market,
        line,
        quotes,
        consensus,
        bookmakers_used,
    })
}

fn bookmakers_in_order(quotes: &[MarketQuote]) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::new();
    for q in quotes {
        if !out.contains(&q.bookmaker.as_str()) {
            out.push(q.bookmaker.as_str());
        }
    }
    out
}

struct OutcomeResolver {
    home_key: String,
    away_key: String,
    home_aliases: HashSet<String>,
    away_aliases: HashSet<String>,
}

impl OutcomeResolver {
    fn new(fixture: &Fixture) -> Self {
        Self {
            home_key: canonical_words(&fixture.home).join(""),
            away_key: canonical_words(&fixture.away).join(""),
            home_aliases: team_aliases(&fixture.home),
            away_aliases: team_aliases(&fixture.away),
        }
    }

    fn resolve(&self, market: MarketKind, name: &str) -> Option<Outcome> {
        let word = normalize_word(name);
        match market {
            MarketKind::H2h => self.resolve_h2h(name, &word),
            MarketKind::Totals => {
                if word.starts_with("over") {
                    Some(Outcome::Over)
                } else if word.starts_with("under") {
                    Some(Outcome::Under)
                } else {
                    None
                }
            }
            MarketKind::Btts => match word.as_str() {
                "yes" => Some(Outcome::Yes),
                "no" => Some(Outcome::No),
                _ => None,
            },
        }
    }

    fn resolve_h2h(&self, name: &str, word: &str) -> Option<Outcome> {
        if is_draw_label(word) {
            return Some(Outcome::Draw);
        }
        match word {
            "home" | "1" => return Some(Outcome::Home),
            "away" | "2" => return Some(Outcome::Away),
            _ => {}
        }

        let key = canonical_words(name).join("");
        if !key.is_empty() {
            if key == self.home_key {
                return Some(Outcome::Home);
            }
            if key == self.away_key {
                return Some(Outcome::Away);
            }
        }

        let aliases = team_aliases(name);
        let home = aliases_intersect(&aliases, &self.home_aliases);
        let away = aliases_intersect(&aliases, &self.away_aliases);
        match (home, away) {
            (true, false) => Some(Outcome::Home),
            (false, true) => Some(Outcome::Away),
            _ => None,
        }
    }
}

fn is_draw_label(word: &str) -> bool {
    word == "draw" || word == "tie" || word == "x"
}

pub(crate) fn team_aliases(name: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    let words = canonical_words(name);
    if words.is_empty() {
        return out;
    }

    let collapsed = words.join("");
    if collapsed.len() >= 2 {
        out.insert(collapsed.clone());
    }
    if let Some(prefix) = prefix(&collapsed, 3) {
        out.insert(prefix);
    }

    let acronym: String = words.iter().filter_map(|w| w.chars().next()).collect();
    if acronym.len() >= 2 {
        out.insert(acronym);
    }
    if words.len() >= 2 {
        let mut first_plus_last = String::new();
        if let Some(ch) = words[0].chars().next() {
            first_plus_last.push(ch);
        }
        if let Some(last) = words.last()
            && let Some(s) = prefix(last, 2)
        {
            first_plus_last.push_str(&s);
        }
        if first_plus_last.len() >= 2 {
            out.insert(first_plus_last);
        }
    }

    for w in &words {
        if w.len() >= 2 {
            out.insert(w.clone());
        }
        if let Some(p3) = prefix(w, 3) {
            out.insert(p3);
        }
    }

    out
}

pub(crate) fn aliases_intersect(a: &HashSet<String>, b: &HashSet<String>) -> bool {
    a.iter().any(|x| b.contains(x))
}

fn canonical_words(name: &str) -> Vec<String> {
    let mut cleaned = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            cleaned.push(ch.to_ascii_lowercase());
        } else {
            cleaned.push(' ');
        }
    }
    cleaned
        .split_whitespace()
        .filter_map(|w| {
            let w = normalize_word(w);
            if w.is_empty() {
                return None;
            }
            if matches!(w.as_str(), "fc" | "cf" | "afc" | "sc" | "ac" | "club") {
                return None;
            }
            Some(w)
        })
        .collect()
}

fn normalize_word(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn prefix(raw: &str, n: usize) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    Some(raw.chars().take(n).collect())
}

pub(crate) fn median_f64(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::QuoteOutcome;

    fn fixture() -> Fixture {
        Fixture {
            id: "f1".to_string(),
            competition: "PL".to_string(),
            home: "Manchester City".to_string(),
            away: "Manchester United".to_string(),
            kickoff: None,
            home_form: 1.5,
            away_form: 1.5,
        }
    }

    fn book(name: &str, outcomes: &[(&str, f64, Option<f64>)]) -> BookmakerQuote {
        BookmakerQuote {
            bookmaker: name.to_string(),
            outcomes: outcomes
                .iter()
                .map(|(n, price, point)| QuoteOutcome {
                    name: n.to_string(),
                    price: *price,
                    point: *point,
                })
                .collect(),
        }
    }

    #[test]
    fn no_vig_probs_sum_to_one() {
        let out = normalize_prices(&[
            (Outcome::Home, 2.10),
            (Outcome::Draw, 3.40),
            (Outcome::Away, 3.60),
        ])
        .expect("valid");
        let sum: f64 = out.iter().map(|(_, p)| p).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn invalid_prices_are_excluded() {
        let out = normalize_prices(&[
            (Outcome::Home, 1.0),
            (Outcome::Draw, 3.0),
            (Outcome::Away, 3.0),
        ])
        .expect("two valid prices remain");
        assert_eq!(out.len(), 2);
        assert!((out[0].1 - 0.5).abs() < 1e-12);

        assert!(normalize_prices(&[(Outcome::Home, 0.9), (Outcome::Away, 2.0)]).is_none());
    }

    #[test]
    fn overround_of_fair_book_is_zero() {
        assert!(overround(&[2.0, 2.0]).unwrap().abs() < 1e-12);
        assert!(overround(&[1.9, 1.9]).unwrap() > 0.0);
    }

    #[test]
    fn resolves_full_names_between_similar_teams() {
        let quotes = resolve_quotes(
            &fixture(),
            MarketKind::H2h,
            &[book(
                "b1",
                &[
                    ("Manchester United", 3.2, None),
                    ("Draw", 3.5, None),
                    ("Manchester City", 2.1, None),
                ],
            )],
            None,
        );
        assert_eq!(quotes.len(), 3);
        assert_eq!(quotes[0].outcome, Outcome::Away);
        assert_eq!(quotes[1].outcome, Outcome::Draw);
        assert_eq!(quotes[2].outcome, Outcome::Home);
    }

    #[test]
    fn resolves_generic_labels() {
        let quotes = resolve_quotes(
            &fixture(),
            MarketKind::H2h,
            &[book("b1", &[("1", 2.0, None), ("X", 3.3, None), ("2", 4.0, None)])],
            None,
        );
        let outcomes: Vec<Outcome> = quotes.iter().map(|q| q.outcome).collect();
        assert_eq!(outcomes, vec![Outcome::Home, Outcome::Draw, Outcome::Away]);
    }

    #[test]
    fn unresolved_team_name_drops_the_whole_book() {
        let spurs = Fixture {
            home: "Tottenham Hotspur".to_string(),
            away: "Arsenal".to_string(),
            ..fixture()
        };
        let quotes = resolve_quotes(
            &spurs,
            MarketKind::H2h,
            &[
                book(
                    "b1",
                    &[("Spurs", 3.2, None), ("Draw", 3.5, None), ("Arsenal", 2.2, None)],
                ),
                book(
                    "b2",
                    &[("Tottenham", 3.0, None), ("Draw", 3.4, None), ("Arsenal", 2.3, None)],
                ),
            ],
            None,
        );
        assert_eq!(quotes.len(), 3);
        assert!(quotes.iter().all(|q| q.bookmaker == "b2"));

        let d = consensus(MarketKind::H2h, &quotes).expect("b2 is complete");
        assert!(d.get(Outcome::Home) > 0.25);
        assert!((d.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn consensus_averages_bookmakers() {
        let quotes = resolve_quotes(
            &fixture(),
            MarketKind::Btts,
            &[
                book("b1", &[("Yes", 2.0, None), ("No", 2.0, None)]),
                book("b2", &[("Yes", 1.5, None), ("No", 3.0, None)]),
            ],
            None,
        );
        let d = consensus(MarketKind::Btts, &quotes).expect("priced");
        // b1: 0.5 / 0.5, b2: 2/3 / 1/3
        assert!((d.get(Outcome::Yes) - (0.5 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
        assert!((d.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn consensus_drops_books_with_a_single_valid_price() {
        let quotes = resolve_quotes(
            &fixture(),
            MarketKind::Btts,
            &[book("b1", &[("Yes", 1.0, None), ("No", 1.8, None)])],
            None,
        );
        assert!(consensus(MarketKind::Btts, &quotes).is_none());
    }

    #[test]
    fn totals_line_closest_to_target_within_tolerance() {
        let books = vec![
            book("b1", &[("Over", 1.5, Some(1.5)), ("Under", 2.6, Some(1.5))]),
            book("b2", &[("Over", 2.1, Some(2.75)), ("Under", 1.7, Some(2.75))]),
            book("b3", &[("Over", 1.9, Some(2.25)), ("Under", 1.9, Some(2.25))]),
        ];
        // 2.25 and 2.75 are equidistant from 2.5; the lower one wins.
        assert_eq!(select_totals_line(&books, &TotalsConfig::default()), Some(2.25));

        let far = vec![book("b1", &[("Over", 1.5, Some(1.5)), ("Under", 2.6, Some(1.5))])];
        assert_eq!(select_totals_line(&far, &TotalsConfig::default()), None);
    }

    #[test]
    fn totals_lookup_reports_missing_line() {
        let odds = FixtureOdds {
            totals: vec![book("b1", &[("Over", 1.3, Some(0.5)), ("Under", 3.4, Some(0.5))])],
            ..FixtureOdds::default()
        };
        let lookup = market_odds(&fixture(), &odds, MarketKind::Totals, &TotalsConfig::default());
        assert!(matches!(lookup, MarketOddsLookup::NoLineInRange));

        let lookup = market_odds(&fixture(), &odds, MarketKind::Btts, &TotalsConfig::default());
        assert!(matches!(lookup, MarketOddsLookup::Unquoted));
    }

    #[test]
    fn totals_lookup_keeps_only_selected_line() {
        let odds = FixtureOdds {
            totals: vec![book(
                "b1",
                &[
                    ("Over", 1.4, Some(1.5)),
                    ("Under", 2.9, Some(1.5)),
                    ("Over", 1.95, Some(2.5)),
                    ("Under", 1.85, Some(2.5)),
                ],
            )],
            ..FixtureOdds::default()
        };
        let MarketOddsLookup::Priced(m) =
            market_odds(&fixture(), &odds, MarketKind::Totals, &TotalsConfig::default())
        else {
            panic!("expected priced totals");
        };
        assert_eq!(m.line, Some(2.5));
        assert_eq!(m.quotes.len(), 2);
        assert_eq!(m.price_for(Outcome::Over), Some(1.95));
        assert_eq!(m.bookmakers_used, 1);
    }

    #[test]
    fn best_prices_pick_highest_per_outcome() {
        let quotes = resolve_quotes(
            &fixture(),
            MarketKind::Btts,
            &[
                book("b1", &[("Yes", 1.9, None), ("No", 1.8, None)]),
                book("b2", &[("Yes", 1.8, None), ("No", 2.05, None)]),
            ],
            None,
        );
        let best = best_prices(MarketKind::Btts, &quotes);
        assert_eq!(best[0].bookmaker, "b1");
        assert_eq!(best[1].bookmaker, "b2");
        assert_eq!(best[1].price, 2.05);
    }

    #[test]
    fn median_price_handles_even_counts() {
        assert_eq!(median_f64(&[2.0, 1.0, 4.0, 3.0]), Some(2.5));
        assert_eq!(median_f64(&[]), None);
    }

    #[test]
    fn aliases_match_abbreviation_to_full_name() {
        let a = team_aliases("MCI");
        let b = team_aliases("Manchester City");
        assert!(aliases_intersect(&a, &b));
    }
}
