//! 이벤트 라우터 -- 태그 규칙 매칭, 변환 체인, 싱크 전달
//!
//! [`EventRouter`]는 기본 싱크 하나와 삽입 순서가 곧 우선순위인 규칙 목록을 가집니다.
//!
//! # 라우팅
//! 1. 태그가 일치하는 첫 번째 규칙을 찾음. 없으면 기본 싱크로 바로 전달
//! 2. 규칙의 변환 체인을 추가된 순서대로 통과. 한 단계라도 DROP이면 즉시 중단
//! 3. 살아남은 이벤트를 규칙의 싱크(없으면 기본 싱크)에 전달
//!
//! 변환 에러는 해당 이벤트만 버리고 카운트합니다. 싱크 에러는 호출자에게 전파합니다.
//!
//! # 태그 패턴
//! `*`는 점으로 구분된 부분 하나, `**`는 0개 이상의 부분과 일치합니다.
//! 와일드카드가 없는 태그는 자기 자신과만 일치합니다.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use swak_core::error::SwakError;
use swak_core::event::{Event, EventStream, Record};
use swak_core::metrics as m;
use swak_core::plugin::{Buffer, RecordOutput, Transform, TransformKind};

/// 여러 생산자가 공유하는 버퍼
pub type SharedBuffer = Arc<Mutex<Box<dyn Buffer>>>;

/// 여러 생산자가 공유하는 레코드 출력
pub type SharedRecordOutput = Arc<Mutex<Box<dyn RecordOutput>>>;

/// 여러 생산자가 공유하는 라우터
pub type SharedRouter = Arc<Mutex<EventRouter>>;

// ─── Sinks ───────────────────────────────────────────────────────────

/// 라우터의 최종 전달 대상
pub trait EventSink: Send {
    /// 로그/메트릭에 쓰는 싱크 이름
    fn name(&self) -> &str;

    /// 이벤트 하나를 전달합니다.
    fn deliver(&mut self, tag: &str, event: Event) -> Result<(), SwakError>;
}

/// 레코드 출력으로 전달하는 싱크
pub struct RecordOutputSink {
    name: String,
    output: SharedRecordOutput,
}

impl RecordOutputSink {
    pub fn new(output: Box<dyn RecordOutput>) -> Self {
        Self::from_shared(Arc::new(Mutex::new(output)))
    }

    /// 실행기와 공유하는 출력으로 싱크를 만듭니다.
    pub fn from_shared(output: SharedRecordOutput) -> Self {
        let name = output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .name()
            .to_owned();
        Self { name, output }
    }

    pub fn output(&self) -> SharedRecordOutput {
        Arc::clone(&self.output)
    }
}

impl EventSink for RecordOutputSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&mut self, tag: &str, event: Event) -> Result<(), SwakError> {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .process(tag, event)
    }
}

/// 공유 버퍼에 단일 이벤트 스트림으로 추가하는 싱크
pub struct BufferSink {
    name: String,
    buffer: SharedBuffer,
}

impl BufferSink {
    pub fn new(buffer: SharedBuffer) -> Self {
        let name = buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .name()
            .to_owned();
        Self { name, buffer }
    }

    pub fn buffer(&self) -> SharedBuffer {
        Arc::clone(&self.buffer)
    }
}

impl EventSink for BufferSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&mut self, _tag: &str, event: Event) -> Result<(), SwakError> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .append(EventStream::from(event))
    }
}

// ─── Tag Pattern ─────────────────────────────────────────────────────

/// 규칙 태그. 와일드카드가 있으면 glob 패턴으로 동작합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPattern {
    source: String,
    /// 와일드카드가 없으면 None (정확히 일치)
    parts: Option<Vec<String>>,
}

impl TagPattern {
    pub fn new(tag: impl Into<String>) -> Self {
        let source = tag.into();
        let parts = source
            .contains('*')
            .then(|| source.split('.').map(str::to_owned).collect());
        Self { source, parts }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_glob(&self) -> bool {
        self.parts.is_some()
    }

    pub fn matches(&self, tag: &str) -> bool {
        match &self.parts {
            None => self.source == tag,
            Some(pattern) => {
                let parts: Vec<&str> = tag.split('.').collect();
                glob_match(pattern, &parts)
            }
        }
    }
}

impl fmt::Display for TagPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn glob_match(pattern: &[String], parts: &[&str]) -> bool {
    match pattern.split_first() {
        None => parts.is_empty(),
        Some((head, rest)) if head == "**" => {
            (0..=parts.len()).any(|skip| glob_match(rest, &parts[skip..]))
        }
        Some((head, rest)) => match parts.split_first() {
            Some((part, remaining)) => {
                (head == "*" || head == part) && glob_match(rest, remaining)
            }
            None => false,
        },
    }
}

// ─── Rules ───────────────────────────────────────────────────────────

/// `add_rule`로 규칙에 붙이는 스테이지
pub enum RuleStage {
    /// 체인 끝에 추가되는 변환
    Transform(Box<dyn Transform>),
    /// 규칙 전용 싱크
    Sink(Box<dyn EventSink>),
}

struct Rule {
    pattern: TagPattern,
    chain: Vec<Box<dyn Transform>>,
    sink: Option<Box<dyn EventSink>>,
    /// 마지막으로 `prepare_for_stream`을 호출한 태그
    prepared_for: Option<String>,
}

impl Rule {
    fn new(pattern: TagPattern) -> Self {
        Self {
            pattern,
            chain: Vec::new(),
            sink: None,
            prepared_for: None,
        }
    }

    fn prepare(&mut self, tag: &str) {
        if self.prepared_for.as_deref() == Some(tag) {
            return;
        }
        for stage in &mut self.chain {
            stage.prepare_for_stream(tag);
        }
        self.prepared_for = Some(tag.to_owned());
    }
}

/// DROP 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// 변환 스테이지가 DROP을 반환
    Filtered,
    /// 변환 스테이지가 에러를 반환
    TransformFailed,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filtered => write!(f, "filtered"),
            Self::TransformFailed => write!(f, "transform_failed"),
        }
    }
}

/// `emit` 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Delivered,
    Dropped(DropReason),
}

/// `emit_stream` 결과 집계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouteCounts {
    pub delivered: u64,
    pub filtered: u64,
    pub failed: u64,
}

impl RouteCounts {
    pub fn record(&mut self, routed: Routed) {
        match routed {
            Routed::Delivered => self.delivered += 1,
            Routed::Dropped(DropReason::Filtered) => self.filtered += 1,
            Routed::Dropped(DropReason::TransformFailed) => self.failed += 1,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.filtered + self.failed
    }
}

// ─── EventRouter ─────────────────────────────────────────────────────

/// 태그 기반 이벤트 라우터
///
/// # 사용 예시
/// ```ignore
/// let mut router = EventRouter::new(Box::new(RecordOutputSink::new(output)));
/// router.add_rule("app.**", RuleStage::Transform(Box::new(reform)));
/// router.emit("app.web", now_secs(), record)?;
/// ```
pub struct EventRouter {
    default_sink: Box<dyn EventSink>,
    rules: Vec<Rule>,
}

impl EventRouter {
    pub fn new(default_sink: Box<dyn EventSink>) -> Self {
        Self {
            default_sink,
            rules: Vec::new(),
        }
    }

    /// 공유 라우터로 감쌉니다.
    pub fn into_shared(self) -> SharedRouter {
        Arc::new(Mutex::new(self))
    }

    /// 태그 규칙에 스테이지를 추가합니다. 규칙이 없으면 새로 만듭니다.
    ///
    /// 같은 태그로 여러 번 호출하면 호출 순서대로 같은 체인에 붙습니다.
    pub fn add_rule(&mut self, tag: &str, stage: RuleStage) {
        let index = match self.rules.iter().position(|r| r.pattern.as_str() == tag) {
            Some(index) => index,
            None => {
                self.rules.push(Rule::new(TagPattern::new(tag)));
                self.rules.len() - 1
            }
        };
        let rule = &mut self.rules[index];
        match stage {
            RuleStage::Transform(transform) => {
                tracing::debug!(tag, stage = transform.name(), "transform added to rule");
                rule.chain.push(transform);
                rule.prepared_for = None;
            }
            RuleStage::Sink(sink) => {
                if let Some(previous) = &rule.sink {
                    tracing::warn!(
                        tag,
                        previous = previous.name(),
                        current = sink.name(),
                        "rule already has a sink, replacing"
                    );
                }
                rule.sink = Some(sink);
            }
        }
    }

    /// 규칙 수
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// 규칙 태그 목록 (우선순위 순서)
    pub fn rule_tags(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.pattern.as_str()).collect()
    }

    pub fn default_sink_name(&self) -> &str {
        self.default_sink.name()
    }

    /// 이벤트 하나를 라우팅합니다.
    pub fn emit(&mut self, tag: &str, time: f64, record: Record) -> Result<Routed, SwakError> {
        self.emit_event(tag, Event::new(time, record))
    }

    pub fn emit_event(&mut self, tag: &str, event: Event) -> Result<Routed, SwakError> {
        metrics::counter!(m::ROUTER_EVENTS_EMITTED_TOTAL, m::LABEL_TAG => tag.to_owned()).increment(1);

        let Some(rule) = self.rules.iter_mut().find(|r| r.pattern.matches(tag)) else {
            self.default_sink.deliver(tag, event)?;
            return Ok(Routed::Delivered);
        };

        rule.prepare(tag);
        let mut current = event;
        for stage in &mut rule.chain {
            match stage.process(tag, current) {
                Ok(Some(next)) => current = next,
                Ok(None) => {
                    metrics::counter!(
                        m::ROUTER_EVENTS_DROPPED_TOTAL,
                        m::LABEL_REASON => DropReason::Filtered.to_string()
                    )
                    .increment(1);
                    tracing::trace!(
                        tag,
                        stage = stage.name(),
                        filter = stage.transform_kind() == TransformKind::Filter,
                        "event dropped"
                    );
                    return Ok(Routed::Dropped(DropReason::Filtered));
                }
                Err(e) => {
                    metrics::counter!(
                        m::ROUTER_TRANSFORM_ERRORS_TOTAL,
                        m::LABEL_STAGE => stage.name().to_owned()
                    )
                    .increment(1);
                    metrics::counter!(
                        m::ROUTER_EVENTS_DROPPED_TOTAL,
                        m::LABEL_REASON => DropReason::TransformFailed.to_string()
                    )
                    .increment(1);
                    tracing::warn!(tag, stage = stage.name(), error = %e, "transform failed, event dropped");
                    return Ok(Routed::Dropped(DropReason::TransformFailed));
                }
            }
        }

        let sink = match rule.sink.as_mut() {
            Some(sink) => sink,
            None => &mut self.default_sink,
        };
        sink.deliver(tag, current)?;
        Ok(Routed::Delivered)
    }

    /// 스트림의 모든 이벤트를 순서대로 라우팅합니다.
    ///
    /// 싱크 에러가 나면 즉시 중단하고 에러를 반환합니다.
    pub fn emit_stream(&mut self, tag: &str, stream: &EventStream) -> Result<RouteCounts, SwakError> {
        let mut counts = RouteCounts::default();
        for (time, record) in stream {
            let routed = self.emit(tag, time, record.clone())?;
            counts.record(routed);
        }
        Ok(counts)
    }

    /// 모든 규칙의 변환 스테이지를 시작합니다.
    pub fn start_transforms(&mut self) -> Result<(), SwakError> {
        self.rules
            .iter_mut()
            .flat_map(|r| r.chain.iter_mut())
            .try_for_each(|stage| stage.start())
    }

    pub fn stop_transforms(&mut self) -> Result<(), SwakError> {
        self.rules
            .iter_mut()
            .flat_map(|r| r.chain.iter_mut())
            .try_for_each(|stage| stage.stop())
    }

    /// 모든 변환 스테이지를 종료합니다. 실패해도 나머지는 계속 종료합니다.
    pub fn terminate_transforms(&mut self) -> Result<(), SwakError> {
        let mut first_err = None;
        for stage in self.rules.iter_mut().flat_map(|r| r.chain.iter_mut()) {
            if let Err(e) = stage.terminate() {
                tracing::warn!(stage = stage.name(), error = %e, "failed to terminate transform");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRouter")
            .field("default_sink", &self.default_sink.name())
            .field("rules", &self.rule_tags())
            .finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
