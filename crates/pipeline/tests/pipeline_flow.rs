//! 통합 테스트 -- 라우터, 버퍼, 조립기, 실행기 전체 흐름 검증
//!
//! 공개 API만 사용해 스테이지들을 직접 연결합니다.

use std::io::Write;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio_util::sync::CancellationToken;

use swak_core::chunk::Chunk;
use swak_core::config::BufferSection;
use swak_core::error::SwakError;
use swak_core::event::{EventStream, Record};
use swak_core::plugin::{Buffer, Plugin, StageKind, Transform};
use swak_pipeline::output::{MemoryHandle, MemoryOutput};
use swak_pipeline::router::{BufferSink, RecordOutputSink, RuleStage, SharedBuffer};
use swak_pipeline::transform::{Condition, Filter, Reform};
use swak_pipeline::{
    BufferConfig, EventRouter, PipelineRunner, PipelineSettings, PluginRegistry, Routed,
    SizedBuffer, build_pipeline,
};

fn record(pairs: &[(&str, &str)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), json!(v)))
        .collect()
}

fn memory_router() -> (EventRouter, MemoryHandle) {
    let handle = MemoryHandle::new();
    let mut output = MemoryOutput::new(handle.clone());
    output.start().unwrap();
    (
        EventRouter::new(Box::new(RecordOutputSink::new(Box::new(output)))),
        handle,
    )
}

fn started<T: Transform + 'static>(mut transform: T) -> Box<dyn Transform> {
    transform.start().unwrap();
    Box::new(transform)
}

// =============================================================================
// 라우터
// =============================================================================

#[test]
fn empty_router_passes_events_unchanged() {
    let (mut router, handle) = memory_router();
    let rec = record(&[("k", "v")]);
    router.emit("any.tag", 12.5, rec.clone()).unwrap();

    let events = handle.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "any.tag");
    assert_eq!(events[0].1.time, 12.5);
    assert_eq!(events[0].1.record, rec);
}

#[test]
fn modifier_rule_adds_keys() {
    let (mut router, handle) = memory_router();
    let reform = Reform::new(
        vec![
            ("k1".to_owned(), "v1".to_owned()),
            ("k2".to_owned(), "v2".to_owned()),
        ],
        Vec::new(),
    );
    router.add_rule("test", RuleStage::Transform(started(reform)));

    let routed = router.emit("test", 0.0, Record::new()).unwrap();
    assert_eq!(routed, Routed::Delivered);

    let events = handle.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].1.record["k1"], json!("v1"));
    assert_eq!(events[0].1.record["k2"], json!("v2"));
}

#[test]
fn case_mismatch_filter_drops_event() {
    let (mut router, handle) = memory_router();
    let filter = Filter::new(
        vec![Condition::Equals {
            key: "k".to_owned(),
            value: "V".to_owned(),
        }],
        false,
    )
    .unwrap();
    router.add_rule("test", RuleStage::Transform(started(filter)));

    let routed = router.emit("test", 0.0, record(&[("k", "v")])).unwrap();
    assert!(matches!(routed, Routed::Dropped(_)));
    assert!(handle.events().is_empty());

    router.emit("test", 0.0, record(&[("k", "V")])).unwrap();
    assert_eq!(handle.events().len(), 1);
}

#[test]
fn glob_rule_applies_only_to_matching_tags() {
    let (mut router, handle) = memory_router();
    let reform = Reform::new(vec![("env".to_owned(), "web".to_owned())], Vec::new());
    router.add_rule("app.*", RuleStage::Transform(started(reform)));

    router.emit("app.web", 0.0, Record::new()).unwrap();
    router.emit("app.web.access", 0.0, Record::new()).unwrap();

    let events = handle.events();
    assert_eq!(events[0].1.record.get("env"), Some(&json!("web")));
    assert!(events[1].1.record.get("env").is_none());
}

// =============================================================================
// 라우터 → 버퍼 → 청크
// =============================================================================

#[test]
fn router_into_buffer_seals_by_record_count() {
    let mut buffer = SizedBuffer::new(BufferConfig::with_record_limit(3).unwrap());
    buffer.start().unwrap();
    let buffer: SharedBuffer = Arc::new(Mutex::new(Box::new(buffer)));
    let mut router = EventRouter::new(Box::new(BufferSink::new(Arc::clone(&buffer))));

    for n in 0..4 {
        router
            .emit("t", f64::from(n), record(&[("n", n.to_string().as_str())]))
            .unwrap();
    }

    let mut delivered: Vec<usize> = Vec::new();
    let mut deliver = |chunk: &Chunk| -> Result<(), SwakError> {
        delivered.push(chunk.records());
        Ok(())
    };
    let mut buffer = buffer.lock().unwrap();
    let report = buffer.flush(false, &mut deliver).unwrap();
    assert_eq!(report.chunks, 1);
    assert_eq!(report.records, 3);
    assert_eq!(buffer.pending_records(), 1);

    buffer.flush(true, &mut deliver).unwrap();
    assert_eq!(delivered, vec![3, 1]);
}

#[test]
fn multi_stream_keeps_order_inside_chunk() {
    let mut buffer = SizedBuffer::new(BufferConfig::with_record_limit(10).unwrap());
    buffer.start().unwrap();
    let stream = EventStream::multi(
        vec![1.0, 2.0, 3.0],
        vec![
            record(&[("n", "a")]),
            record(&[("n", "b")]),
            record(&[("n", "c")]),
        ],
    )
    .unwrap();
    buffer.append(stream).unwrap();

    let mut order = Vec::new();
    buffer
        .flush(true, &mut |chunk: &Chunk| {
            order.extend(chunk.events().iter().map(|e| e.record["n"].clone()));
            Ok(())
        })
        .unwrap();
    assert_eq!(order, vec![json!("a"), json!("b"), json!("c")]);
}

// =============================================================================
// 레지스트리 + 조립 + 실행
// =============================================================================

#[test]
fn shape_errors_name_the_position() {
    let registry = PluginRegistry::with_builtins(&BufferSection::default());

    let err = build_pipeline("in.counter | in.counter | out.stdout", &registry).unwrap_err();
    let SwakError::Shape(shape) = err else {
        panic!("expected shape error, got {err}");
    };
    assert_eq!(shape.position, 1);
    assert_eq!(shape.previous, Some(StageKind::RecordInput));

    let err = build_pipeline("par.json | out.stdout", &registry).unwrap_err();
    assert!(matches!(err, SwakError::Shape(ref e) if e.position == 0));
}

#[test]
fn unknown_plugin_is_reported() {
    let registry = PluginRegistry::with_builtins(&BufferSection::default());
    let err = build_pipeline("in.nothing | out.stdout", &registry).unwrap_err();
    assert!(matches!(err, SwakError::Plugin(_)));
}

#[tokio::test]
async fn text_pipeline_writes_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("app.log");
    let output = dir.path().join("out.jsonl");
    {
        let mut file = std::fs::File::create(&input).unwrap();
        writeln!(file, "GET /index 200").unwrap();
        writeln!(file, "POST /login 401").unwrap();
        writeln!(file, "garbage").unwrap();
    }

    let registry = PluginRegistry::with_builtins(&BufferSection::default());
    let command = format!(
        r#"in.file --path {} | par.regex --pattern "^(?P<method>\S+) (?P<path>\S+) (?P<status>\d+)$" | tr.filter --match status 401 --invert | tr.reform -a source ${{tag_parts[0]}} | buf.memory --chunk-max-record 10 | out.file --path {}"#,
        input.display(),
        output.display()
    );
    let sequence = build_pipeline(&command, &registry).unwrap();
    let report = PipelineRunner::new(sequence, PipelineSettings::default())
        .unwrap()
        .run_until(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.events_in, 3);
    assert_eq!(report.parse_errors, 1);
    assert_eq!(report.dropped, 1);
    assert_eq!(report.flushed_records, 1);

    let written = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<serde_json::Value> = written
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["record"]["path"], json!("/index"));
    assert_eq!(lines[0]["record"]["source"], json!("swak"));
}
