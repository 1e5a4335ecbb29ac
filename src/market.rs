use std::fmt;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

pub const DEFAULT_FORM_POINTS: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketKind {
    H2h,
    Totals,
    Btts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Home,
    Draw,
    Away,
    Over,
    Under,
    Yes,
    No,
}

impl MarketKind {
    pub fn outcomes(self) -> &'static [Outcome] {
        match self {
            MarketKind::H2h => &[Outcome::Home, Outcome::Draw, Outcome::Away],
            MarketKind::Totals => &[Outcome::Over, Outcome::Under],
            MarketKind::Btts => &[Outcome::Yes, Outcome::No],
        }
    }

    /// Fallback distribution used when neither odds nor form are available.
    pub fn neutral_prior(self) -> &'static [f64] {
        match self {
            MarketKind::H2h => &[0.38, 0.24, 0.38],
            MarketKind::Totals | MarketKind::Btts => &[0.5, 0.5],
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            MarketKind::H2h => "h2h",
            MarketKind::Totals => "totals",
            MarketKind::Btts => "btts",
        }
    }
}

impl Outcome {
    pub fn market(self) -> MarketKind {
        match self {
            Outcome::Home | Outcome::Draw | Outcome::Away => MarketKind::H2h,
            Outcome::Over | Outcome::Under => MarketKind::Totals,
            Outcome::Yes | Outcome::No => MarketKind::Btts,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Outcome::Home => "Home",
            Outcome::Draw => "Draw",
            Outcome::Away => "Away",
            Outcome::Over => "Over",
            Outcome::Under => "Under",
            Outcome::Yes => "Yes",
            Outcome::No => "No",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub id: String,
    #[serde(default)]
    pub competition: String,
    #[serde(alias = "home_name")]
    pub home: String,
    #[serde(alias = "away_name")]
    pub away: String,
    #[serde(default)]
    pub kickoff: Option<String>,
    #[serde(default = "default_form")]
    pub home_form: f64,
    #[serde(default = "default_form")]
    pub away_form: f64,
}

fn default_form() -> f64 {
    DEFAULT_FORM_POINTS
}

impl Fixture {
    pub fn label(&self) -> String {
        format!("{} vs {}", self.home, self.away)
    }

    pub fn form_diff(&self) -> f64 {
        self.home_form - self.away_form
    }
}

/// One priced outcome inside a bookmaker block, as delivered by the odds provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteOutcome {
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub point: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookmakerQuote {
    #[serde(alias = "bookmaker_name", alias = "title")]
    pub bookmaker: String,
    #[serde(default)]
    pub outcomes: Vec<QuoteOutcome>,
}

/// Raw bookmaker blocks for one fixture, grouped per market family.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureOdds {
    #[serde(default)]
    pub h2h: Vec<BookmakerQuote>,
    #[serde(default)]
    pub totals: Vec<BookmakerQuote>,
    #[serde(default)]
    pub btts: Vec<BookmakerQuote>,
}

impl FixtureOdds {
    pub fn books(&self, market: MarketKind) -> &[BookmakerQuote] {
        match market {
            MarketKind::H2h => &self.h2h,
            MarketKind::Totals => &self.totals,
            MarketKind::Btts => &self.btts,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.h2h.is_empty() && self.totals.is_empty() && self.btts.is_empty()
    }
}

/// A bookmaker price resolved to a concrete outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketQuote {
    pub bookmaker: String,
    pub market: MarketKind,
    pub outcome: Outcome,
    pub price: f64,
    pub line: Option<f64>,
}

/// A single candidate selection. `ev` is derived from `probability` and `odds` on every
/// read, so the two inputs are only changed through the `with_*` builders.
#[derive(Debug, Clone, PartialEq)]
pub struct Pick {
    pub fixture_id: String,
    pub competition: String,
    pub home: String,
    pub away: String,
    pub market: MarketKind,
    pub line: Option<f64>,
    pub selection: Outcome,
    probability: f64,
    odds: f64,
}

impl Pick {
    pub fn new(fixture: &Fixture, selection: Outcome, probability: f64, odds: f64) -> Self {
        Self {
            fixture_id: fixture.id.clone(),
            competition: fixture.competition.clone(),
            home: fixture.home.clone(),
            away: fixture.away.clone(),
            market: selection.market(),
            line: None,
            selection,
            probability: probability.clamp(0.0, 1.0),
            odds,
        }
    }

    pub fn with_line(mut self, line: Option<f64>) -> Self {
        self.line = line;
        self
    }

    pub fn with_probability(mut self, probability: f64) -> Self {
        self.probability = probability.clamp(0.0, 1.0);
        self
    }

    pub fn with_odds(mut self, odds: f64) -> Self {
        self.odds = odds;
        self
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn odds(&self) -> f64 {
        self.odds
    }

    pub fn ev(&self) -> f64 {
        self.probability * self.odds - 1.0
    }

    pub fn match_label(&self) -> String {
        format!("{} vs {}", self.home, self.away)
    }

    pub fn market_label(&self) -> String {
        match (self.market, self.line) {
            (MarketKind::H2h, _) => "1X2".to_string(),
            (MarketKind::Totals, Some(line)) => format!("O/U {line}"),
            (MarketKind::Totals, None) => "O/U".to_string(),
            (MarketKind::Btts, _) => "BTTS".to_string(),
        }
    }
}

impl Serialize for Pick {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Pick", 10)?;
        s.serialize_field("fixture_id", &self.fixture_id)?;
        s.serialize_field("competition", &self.competition)?;
        s.serialize_field("home", &self.home)?;
        s.serialize_field("away", &self.away)?;
        s.serialize_field("market", &self.market)?;
        s.serialize_field("line", &self.line)?;
        s.serialize_field("selection", &self.selection)?;
        s.serialize_field("probability", &self.probability)?;
        s.serialize_field("odds", &self.odds)?;
        s.serialize_field("ev", &self.ev())?;
        s.end()
    }
}
