use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing_subscriber::EnvFilter;

use oddsmith::config::EngineConfig;
use oddsmith::slate::{Slate, SlateAnalyzer, SlateReport};

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let path = positional_arg()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tests/fixtures/slate.json"));
    let user = parse_str_arg("--user").unwrap_or_else(|| "guest".to_string());
    let date = parse_str_arg("--date").unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string());

    let config = match parse_str_arg("--config") {
        Some(cfg_path) => {
            let raw = fs::read_to_string(&cfg_path)
                .with_context(|| format!("read config {cfg_path}"))?;
            EngineConfig::from_json_str(&raw)?
        }
        None => {
            let cfg = EngineConfig::from_env();
            cfg.validate().context("invalid ODDSMITH_* settings")?;
            cfg
        }
    };

    let raw = fs::read_to_string(&path).with_context(|| format!("read slate {}", path.display()))?;
    let slate: Slate = serde_json::from_str(&raw).context("parse slate json")?;

    let report = SlateAnalyzer::new(&config).report(&slate.fixtures, &user, &date);
    if has_flag("--json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &SlateReport) {
    println!("Slate for {} on {}", report.user_id, report.date);
    println!("Fixtures: {}", report.fixtures.len());
    println!();

    println!("Picks");
    for pick in &report.diversified {
        println!(
            "  {:<32} {:<6} {:<5} p={:.3} odds={:.2} ev={:+.3}",
            pick.match_label(),
            pick.market_label(),
            pick.selection,
            pick.probability(),
            pick.odds(),
            pick.ev()
        );
    }
    println!();

    println!("Stakes");
    for scored in &report.stakes {
        match scored.kelly.stake() {
            Some(stake) => println!(
                "  {:<32} {:<5} stake={:.2} ({:.2}%) ruin={:.1}",
                scored.pick.match_label(),
                scored.pick.selection,
                stake.optimal_stake,
                stake.fraction_of_bankroll * 100.0,
                stake.risk_of_ruin
            ),
            None => println!(
                "  {:<32} {:<5} no bet",
                scored.pick.match_label(),
                scored.pick.selection
            ),
        }
    }
    println!();

    for (title, acc) in [
        ("Accumulator (greedy)", &report.accumulator),
        ("Accumulator (exhaustive)", &report.best_accumulator),
    ] {
        match acc {
            Some(acc) => {
                println!(
                    "{title}: {} legs, odds={:.2} p={:.3} ev={:+.3}{}",
                    acc.leg_count(),
                    acc.combined_odds(),
                    acc.combined_probability(),
                    acc.combined_ev(),
                    if acc.within_band() { "" } else { " (outside band)" }
                );
                for leg in acc.legs() {
                    println!("  {} {} @ {:.2}", leg.match_label(), leg.selection, leg.odds());
                }
            }
            None => println!("{title}: not enough picks"),
        }
    }
    println!();

    println!("Top markets");
    for pick in &report.top_market_picks {
        println!(
            "  {:<32} {:<6} {:<5} p={:.3} odds={:.2} ev={:+.3}",
            pick.match_label(),
            pick.market_label(),
            pick.selection,
            pick.probability(),
            pick.odds(),
            pick.ev()
        );
    }
    println!();

    println!("Value bets: {}", report.value_bets.len());
    for bet in &report.value_bets {
        println!(
            "  {:<32} {:<6} {:<5} ev={:.1}% stake={:.1}%",
            bet.pick.match_label(),
            bet.pick.market_label(),
            bet.pick.selection,
            bet.ev_pct,
            bet.suggested_stake_pct
        );
    }

    println!("Arbitrage: {}", report.arbitrage.len());
    for arb in &report.arbitrage {
        println!(
            "  {:<32} margin={:.2}% profit={:.2}",
            arb.label, arb.profit_margin_pct, arb.guaranteed_profit
        );
        for stake in &arb.stakes {
            println!(
                "    {:<5} {:.2} @ {} stake={:.2}",
                stake.leg.outcome, stake.leg.price, stake.leg.bookmaker, stake.stake
            );
        }
    }
}

fn positional_arg() -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if matches!(arg.as_str(), "--user" | "--date" | "--config") {
            skip_next = true;
            continue;
        }
        if arg.starts_with("--") {
            continue;
        }
        return Some(arg);
    }
    None
}

fn parse_str_arg(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && !raw.trim().is_empty()
        {
            return Some(raw.trim().to_string());
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}
