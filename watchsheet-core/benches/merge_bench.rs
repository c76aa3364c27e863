//! Criterion benchmarks for the per-row hot paths of an export.
//!
//! Benchmarks:
//! 1. Market-cap and price formatting
//! 2. Watchlist construction with duplicate symbols
//! 3. Table fingerprinting

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use watchsheet_core::domain::{OutputRow, Symbol, Table, WatchlistEntry};
use watchsheet_core::data::Watchlist;
use watchsheet_core::format::{format_magnitude, format_price};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_caps(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("{:.6}", 10f64.powi((i % 15) as i32) * 1.2345))
        .collect()
}

fn make_entries(n: usize) -> Vec<WatchlistEntry> {
    (0..n)
        .map(|i| WatchlistEntry {
            // Every fourth entry repeats an earlier symbol.
            symbol: Symbol::parse(&format!("SYM{}", if i % 4 == 3 { i / 2 } else { i })).unwrap(),
            name: Some(format!("Company {i}")),
        })
        .collect()
}

fn make_table(n: usize) -> Table {
    (0..n)
        .map(|i| OutputRow {
            name: format!("Company {i}"),
            symbol: format!("SYM{i}"),
            price: format!("${:.2}", 10.0 + i as f64 * 0.37),
            marketcap_value: format!("{:.2}", 1.0 + (i % 999) as f64),
            marketcap_unit: "B".to_string(),
        })
        .collect::<Vec<_>>()
        .into()
}

// ── 1. Formatting ────────────────────────────────────────────────────

fn bench_formatting(c: &mut Criterion) {
    let caps = make_caps(1_000);
    let mut group = c.benchmark_group("formatting");

    group.bench_function("format_magnitude_1000", |b| {
        b.iter(|| {
            for cap in &caps {
                black_box(format_magnitude(Some(cap)));
            }
        })
    });

    group.bench_function("format_price_1000", |b| {
        b.iter(|| {
            for cap in &caps {
                black_box(format_price(Some(cap)));
            }
        })
    });

    group.finish();
}

// ── 2. Watchlist ─────────────────────────────────────────────────────

fn bench_watchlist(c: &mut Criterion) {
    let mut group = c.benchmark_group("watchlist");

    for count in [100, 1_000, 5_000] {
        let entries = make_entries(count);
        group.bench_with_input(BenchmarkId::new("from_entries", count), &entries, |b, e| {
            b.iter(|| black_box(Watchlist::from_entries("bench", e.iter().cloned()).unwrap()))
        });
    }

    group.finish();
}

// ── 3. Fingerprint ───────────────────────────────────────────────────

fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");

    for rows in [100, 1_000] {
        let table = make_table(rows);
        group.bench_with_input(BenchmarkId::new("table", rows), &table, |b, t| {
            b.iter(|| black_box(t.fingerprint()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_formatting, bench_watchlist, bench_fingerprint);
criterion_main!(benches);
