use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use oddsmith::calibration::{self, Metrics, SettledFixture, SettlementSummary};
use oddsmith::config::EngineConfig;
use oddsmith::slate::SlateAnalyzer;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tests/fixtures/settled.json"));

    let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cases: Vec<SettledFixture> = serde_json::from_str(&raw).context("parse settled fixtures")?;

    let config = EngineConfig::from_env();
    config.validate().context("invalid ODDSMITH_* settings")?;
    let analyzer = SlateAnalyzer::new(&config);
    let report = calibration::backtest(&analyzer, &cases);

    println!("Backtest: {} fixtures from {}", cases.len(), path.display());
    print_metrics("1X2 fused", &report.h2h);
    print_metrics("1X2 refit", &report.fitted);
    println!(
        "Odds weight: configured={:.2} fitted={:.2}",
        config.fusion.odds_weight, report.fitted_odds_weight
    );
    print_settlement("Best picks", &report.best_picks);
    print_settlement("All picks", &report.all_picks);
    Ok(())
}

fn print_metrics(title: &str, m: &Metrics) {
    println!(
        "{title:<12} n={} brier={:.4} logloss={:.4} acc={:.1}%",
        m.samples,
        m.brier,
        m.log_loss,
        m.accuracy * 100.0
    );
}

fn print_settlement(title: &str, s: &SettlementSummary) {
    println!(
        "{title:<12} won={} lost={} void={} hit={:.1}% profit={:+.2}u roi={:+.1}%",
        s.won,
        s.lost,
        s.void,
        s.hit_rate * 100.0,
        s.profit,
        s.roi_pct
    );
}
