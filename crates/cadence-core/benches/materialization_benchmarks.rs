use cadence_core::models::{EventException, EventTemplate, ExceptionKind};
use cadence_core::overlay;
use cadence_core::recurrence::{materialize, MaterializationLimits, MaterializationManager};
use cadence_core::rule::Rule;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use uuid::Uuid;

fn create_test_template(rule: &str) -> EventTemplate {
    let anchor = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    EventTemplate {
        id: Uuid::now_v7(),
        title: "Benchmark Event".to_string(),
        description: None,
        location: Some("Room 1".to_string()),
        anchor_start: anchor.and_time(NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
        anchor_end: anchor.and_time(NaiveTime::from_hms_opt(10, 0, 0).unwrap()),
        rule: Rule::parse(rule).unwrap(),
        revision: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn random_exceptions(template: &EventTemplate, count: usize) -> Vec<EventException> {
    (0..count)
        .map(|_| {
            let kind = if fastrand::bool() {
                ExceptionKind::Cancelled
            } else {
                ExceptionKind::Modified
            };
            EventException {
                template_id: template.id,
                occurrence_date: template.anchor_date() + Duration::days(fastrand::i64(0..365)),
                kind,
                title: Some("Moved".to_string()),
                description: None,
                location: None,
                start_time: NaiveTime::from_hms_opt(fastrand::u32(6..20), 0, 0),
                end_time: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }
        })
        .collect()
}

fn bench_rule_parsing(c: &mut Criterion) {
    c.bench_function("rule_parsing", |b| {
        b.iter(|| Rule::parse(black_box("FREQ=WEEKLY;INTERVAL=2;COUNT=52;BYDAY=MO,WE,FR")).unwrap())
    });
}

fn bench_materialization_by_frequency(c: &mut Criterion) {
    let mut group = c.benchmark_group("materialization_by_frequency");
    let manager = MaterializationManager::with_defaults();

    for rule in [
        "FREQ=DAILY;COUNT=365",
        "FREQ=WEEKLY;BYDAY=MO,WE,FR;COUNT=300",
        "FREQ=MONTHLY;COUNT=24",
        "FREQ=YEARLY;COUNT=2",
    ] {
        let template = create_test_template(rule);
        group.bench_with_input(BenchmarkId::from_parameter(rule), &template, |b, template| {
            b.iter(|| manager.materialize(black_box(template)))
        });
    }
    group.finish();
}

fn bench_materialization_caps(c: &mut Criterion) {
    let template = create_test_template("FREQ=DAILY;UNTIL=2099-12-31");
    let mut group = c.benchmark_group("materialization_caps");

    for max_occurrences in [100usize, 1000, 10_000] {
        let limits = MaterializationLimits {
            horizon: NaiveDate::from_ymd_opt(2099, 12, 31).unwrap(),
            default_count: 10,
            max_occurrences,
        };
        group.bench_with_input(
            BenchmarkId::new("max_occurrences", max_occurrences),
            &limits,
            |b, limits| {
                b.iter(|| {
                    materialize(
                        black_box(&template.rule),
                        template.anchor_start,
                        template.anchor_end,
                        limits,
                    )
                })
            },
        );
    }
    group.finish();
}

fn bench_overlay(c: &mut Criterion) {
    let template = create_test_template("FREQ=DAILY;COUNT=365");
    let occurrences = MaterializationManager::with_defaults().materialize(&template);
    let mut group = c.benchmark_group("overlay");

    for exception_count in [0usize, 10, 100, 365] {
        let exceptions = random_exceptions(&template, exception_count);
        group.bench_with_input(
            BenchmarkId::new("exceptions", exception_count),
            &exceptions,
            |b, exceptions| {
                b.iter(|| overlay::apply(black_box(&occurrences), black_box(exceptions), &template))
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_rule_parsing,
    bench_materialization_by_frequency,
    bench_materialization_caps,
    bench_overlay
);
criterion_main!(benches);
