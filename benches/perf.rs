use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use oddsmith::accumulator::{
    AccumulatorConstraints, AccumulatorStrategy, BoundedExhaustive, GreedyHighProbability,
};
use oddsmith::diversify::diversify;
use oddsmith::market::{BookmakerQuote, Fixture, FixtureOdds, Outcome, Pick, QuoteOutcome};
use oddsmith::slate::{SlateAnalyzer, SlateEntry};

fn book(name: &str, home: &str, away: &str, shift: f64) -> BookmakerQuote {
    let outcome = |name: &str, price: f64| QuoteOutcome {
        name: name.to_string(),
        price,
        point: None,
    };
    BookmakerQuote {
        bookmaker: name.to_string(),
        outcomes: vec![
            outcome(home, 2.1 + shift),
            outcome("Draw", 3.3 - shift),
            outcome(away, 3.4 + shift),
        ],
    }
}

fn sample_slate(n: usize) -> Vec<SlateEntry> {
    (0..n)
        .map(|i| {
            let home = format!("Home Town {i}");
            let away = format!("Away City {i}");
            let books = (0..4)
                .map(|b| book(&format!("book{b}"), &home, &away, b as f64 * 0.05))
                .collect();
            let totals = (0..3)
                .map(|b| BookmakerQuote {
                    bookmaker: format!("book{b}"),
                    outcomes: vec![
                        QuoteOutcome {
                            name: "Over".to_string(),
                            price: 1.9 + b as f64 * 0.02,
                            point: Some(2.5),
                        },
                        QuoteOutcome {
                            name: "Under".to_string(),
                            price: 1.9 - b as f64 * 0.02,
                            point: Some(2.5),
                        },
                    ],
                })
                .collect();
            SlateEntry {
                fixture: Fixture {
                    id: format!("f{i}"),
                    competition: "Bench League".to_string(),
                    home,
                    away,
                    kickoff: None,
                    home_form: 1.0 + (i % 5) as f64 * 0.3,
                    away_form: 2.2 - (i % 4) as f64 * 0.3,
                },
                odds: FixtureOdds {
                    h2h: books,
                    totals,
                    btts: Vec::new(),
                },
                home_results: Vec::new(),
                away_results: Vec::new(),
            }
        })
        .collect()
}

fn sample_picks(n: usize) -> Vec<Pick> {
    sample_slate(n)
        .iter()
        .enumerate()
        .map(|(i, e)| {
            Pick::new(
                &e.fixture,
                Outcome::Home,
                0.85 - i as f64 * 0.01,
                1.15 + i as f64 * 0.03,
            )
        })
        .collect()
}

fn bench_slate_analysis(c: &mut Criterion) {
    let slate = sample_slate(200);
    let analyzer = SlateAnalyzer::default();
    c.bench_function("slate_analysis_200", |b| {
        b.iter(|| {
            let out = analyzer.analyze_slate(black_box(&slate));
            black_box(out.len());
        })
    });
}

fn bench_slate_report(c: &mut Criterion) {
    let slate = sample_slate(60);
    let analyzer = SlateAnalyzer::default();
    c.bench_function("slate_report_60", |b| {
        b.iter(|| {
            let report = analyzer.report(black_box(&slate), "42", "2025-01-01");
            black_box(report.diversified.len());
        })
    });
}

fn bench_diversify(c: &mut Criterion) {
    let picks = sample_picks(50);
    c.bench_function("diversify_50", |b| {
        b.iter(|| {
            let out = diversify(black_box(&picks), 42, "2025-01-01", 10);
            black_box(out.len());
        })
    });
}

fn bench_accumulators(c: &mut Criterion) {
    let picks = sample_picks(30);
    let constraints = AccumulatorConstraints::new(2.0, 4.0, 4);
    c.bench_function("accumulator_greedy_30", |b| {
        b.iter(|| black_box(GreedyHighProbability.build(black_box(&picks), &constraints)))
    });
    c.bench_function("accumulator_exhaustive_12", |b| {
        b.iter(|| black_box(BoundedExhaustive::default().build(black_box(&picks), &constraints)))
    });
}

criterion_group!(
    benches,
    bench_slate_analysis,
    bench_slate_report,
    bench_diversify,
    bench_accumulators
);
criterion_main!(benches);
