//! 이벤트 라우터 벤치마크
//!
//! 규칙 수와 변환 체인 길이에 따른 `emit` 처리량을 측정합니다.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use serde_json::json;

use swak_core::error::SwakError;
use swak_core::event::{Event, Record};
use swak_core::plugin::{Plugin, Transform};
use swak_pipeline::router::RuleStage;
use swak_pipeline::transform::{Condition, Filter, Reform};
use swak_pipeline::{EventRouter, EventSink};

/// 이벤트를 버리는 싱크
struct NullSink;

impl EventSink for NullSink {
    fn name(&self) -> &str {
        "null"
    }

    fn deliver(&mut self, _tag: &str, event: Event) -> Result<(), SwakError> {
        black_box(event);
        Ok(())
    }
}

fn record() -> Record {
    let mut record = Record::new();
    record.insert("host".to_owned(), json!("web-01"));
    record.insert("level".to_owned(), json!("info"));
    record.insert("message".to_owned(), json!("request processed"));
    record
}

fn reform() -> Box<dyn Transform> {
    let mut reform = Reform::new(
        vec![
            ("source".to_owned(), "${tag_parts[0]}".to_owned()),
            ("origin".to_owned(), "${record[host]}".to_owned()),
        ],
        vec!["message".to_owned()],
    );
    reform.start().unwrap();
    Box::new(reform)
}

fn filter() -> Box<dyn Transform> {
    let mut filter = Filter::new(
        vec![Condition::Equals {
            key: "level".to_owned(),
            value: "info".to_owned(),
        }],
        false,
    )
    .unwrap();
    filter.start().unwrap();
    Box::new(filter)
}

fn bench_default_sink(c: &mut Criterion) {
    let mut router = EventRouter::new(Box::new(NullSink));
    let record = record();

    let mut group = c.benchmark_group("router_default_sink");
    group.throughput(Throughput::Elements(1));
    group.bench_function("no_rules", |b| {
        b.iter(|| router.emit(black_box("app.web"), 0.0, record.clone()).unwrap())
    });
    group.finish();
}

fn bench_rule_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("router_rule_lookup");
    group.throughput(Throughput::Elements(1));
    let record = record();

    for rules in [1usize, 10, 100] {
        let mut router = EventRouter::new(Box::new(NullSink));
        for i in 0..rules {
            router.add_rule(&format!("app.svc{i}.*"), RuleStage::Transform(filter()));
        }
        // 마지막 규칙만 일치
        let tag = format!("app.svc{}.web", rules - 1);
        group.bench_with_input(BenchmarkId::from_parameter(rules), &tag, |b, tag| {
            b.iter(|| router.emit(black_box(tag), 0.0, record.clone()).unwrap())
        });
    }

    group.finish();
}

fn bench_transform_chain(c: &mut Criterion) {
    let mut router = EventRouter::new(Box::new(NullSink));
    router.add_rule("app.**", RuleStage::Transform(filter()));
    router.add_rule("app.**", RuleStage::Transform(reform()));
    let record = record();

    let mut group = c.benchmark_group("router_transform_chain");
    group.throughput(Throughput::Elements(1));
    group.bench_function("filter_then_reform", |b| {
        b.iter(|| router.emit(black_box("app.web"), 0.0, record.clone()).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_default_sink, bench_rule_lookup, bench_transform_chain);
criterion_main!(benches);
