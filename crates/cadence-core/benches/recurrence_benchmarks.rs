use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use cadence_core::models::RecurrencePattern;
use cadence_core::recurrence::{anchor_key, next_occurrence, RecurrenceRule};
use chrono::{DateTime, Duration, Utc};

fn rule(pattern: &str) -> RecurrenceRule {
    RecurrenceRule {
        pattern: Some(pattern.to_string()),
        days: None,
        end_date: None,
    }
}

fn pinned_weekly_rule() -> RecurrenceRule {
    RecurrenceRule {
        pattern: Some("weekly".to_string()),
        days: Some(vec![
            "Monday".to_string(),
            "Wednesday".to_string(),
            "Friday".to_string(),
        ]),
        end_date: None,
    }
}

/// Walks a series the way the materializer does, without the storage side.
fn walk_window(rule: &RecurrenceRule, anchor: DateTime<Utc>, window_end: DateTime<Utc>) -> usize {
    let mut cursor = anchor;
    let mut produced = 0;
    while let Some(next) = next_occurrence(cursor, rule) {
        if next >= window_end {
            break;
        }
        cursor = next;
        produced += 1;
    }
    produced
}

fn bench_next_occurrence(c: &mut Criterion) {
    let after = Utc::now();
    let cases = vec![
        ("daily", rule("daily")),
        ("weekly", rule("weekly")),
        ("weekly_pinned", pinned_weekly_rule()),
        ("monthly", rule("monthly")),
        ("yearly", rule("yearly")),
    ];

    let mut group = c.benchmark_group("next_occurrence");
    for (name, rule) in cases {
        group.bench_with_input(BenchmarkId::new("pattern", name), &rule, |b, rule| {
            b.iter(|| next_occurrence(black_box(after), black_box(rule)))
        });
    }
    group.finish();
}

fn bench_occurrence_walk(c: &mut Criterion) {
    let anchor = Utc::now();
    let daily = rule("daily");

    let mut group = c.benchmark_group("occurrence_walk");
    for days in [7, 30, 90, 365].iter() {
        let window_end = anchor + Duration::days(*days);
        group.bench_with_input(BenchmarkId::new("days", days), days, |b, _| {
            b.iter(|| walk_window(black_box(&daily), black_box(anchor), black_box(window_end)))
        });
    }
    group.finish();
}

fn bench_pattern_parsing(c: &mut Criterion) {
    let patterns = vec!["daily", "weekly", "monthly", "yearly"];

    let mut group = c.benchmark_group("pattern_parsing");
    for pattern in patterns {
        group.bench_with_input(
            BenchmarkId::new("pattern", pattern),
            pattern,
            |b, pattern| b.iter(|| black_box(pattern).parse::<RecurrencePattern>().unwrap()),
        );
    }
    group.finish();
}

fn bench_anchor_key(c: &mut Criterion) {
    let occurrence = Utc::now();

    c.bench_function("anchor_key", |b| {
        b.iter(|| anchor_key(black_box(occurrence)))
    });
}

criterion_group!(
    benches,
    bench_next_occurrence,
    bench_occurrence_walk,
    bench_pattern_parsing,
    bench_anchor_key
);
criterion_main!(benches);
