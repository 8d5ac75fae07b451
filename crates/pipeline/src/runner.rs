//! 파이프라인 실행기
//!
//! 검증된 [`StageSequence`]를 실행합니다.
//!
//! # 데이터 흐름
//! ```text
//! Input 태스크 ──mpsc──> 소비 루프 ─(parse)─> EventRouter ─> Buffer ─(tick/flush)─> Output
//!                                                       └──────(버퍼 없음)─────────> Output
//! ```
//!
//! - 입력은 자체 tokio 태스크에서 실행되어 bounded 채널로 항목을 보냅니다.
//! - 파싱 실패는 기록/카운트하고 다음 줄로 넘어갑니다.
//! - 변환 스테이지는 모든 태그(`**`)에 적용되는 규칙 체인이 됩니다.
//! - 청크가 봉인되면 곧바로 출력에 넘깁니다. 매 tick마다 시간 봉인도 검사합니다.
//!   전달 실패한 청크는 다음 flush까지 버퍼에 남습니다.
//! - 버퍼가 가득 차 추가가 거부되면 봉인된 청크를 flush한 뒤 한 번 더 추가합니다.
//!
//! # 종료
//! 입력 소진 또는 취소 시: 입력 취소 → 채널 잔여 항목 처리 → 버퍼 강제 flush
//! (실패 시 한 번 재시도) → 모든 스테이지를 순서대로 정지/종료.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use swak_core::chunk::{Chunk, FlushReport, SealReason, event_size};
use swak_core::config::PipelineSection;
use swak_core::error::{PipelineError, SwakError};
use swak_core::event::{Event, InputItem, now_secs};
use swak_core::metrics as m;
use swak_core::plugin::{Buffer, ChunkOutput, Command, Input, OutputStage, Parser, Plugin, Stage};

use crate::assembler::StageSequence;
use crate::router::{
    BufferSink, EventRouter, EventSink, RecordOutputSink, Routed, RuleStage, SharedBuffer,
    SharedRecordOutput,
};

/// 모든 태그에 적용되는 규칙 패턴
const ALL_TAGS: &str = "**";

/// 실행 설정
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSettings {
    /// 입력 이벤트에 붙일 태그
    pub tag: String,
    /// 입력 → 소비 루프 채널 용량
    pub channel_capacity: usize,
    /// 버퍼 tick/flush 주기
    pub tick_interval: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&PipelineSection::default())
    }
}

impl From<&PipelineSection> for PipelineSettings {
    fn from(section: &PipelineSection) -> Self {
        Self {
            tag: section.tag.clone(),
            channel_capacity: section.channel_capacity.max(1),
            tick_interval: Duration::from_millis(section.tick_interval_ms.max(1)),
        }
    }
}

/// 실행 결과 요약
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// 입력이 생산한 항목 수
    pub events_in: u64,
    /// 파싱 실패 줄 수
    pub parse_errors: u64,
    /// 싱크까지 전달된 이벤트 수
    pub delivered: u64,
    /// 필터/변환 실패/싱크 거부로 버려진 이벤트 수
    pub dropped: u64,
    /// 출력이 수용한 청크 수
    pub flushed_chunks: usize,
    /// 출력이 수용한 청크의 레코드 수
    pub flushed_records: usize,
    /// 종료 시점에 전달하지 못하고 남은 레코드 수
    pub undelivered: usize,
}

// ─── Output handle ───────────────────────────────────────────────────

type SharedChunkOutput = Arc<Mutex<Box<dyn ChunkOutput>>>;

/// 실행기가 보유하는 출력 (라우터 싱크와 공유)
enum OutputHandle {
    Record(SharedRecordOutput),
    Chunk(SharedChunkOutput),
}

/// 출력 잠금을 잡고 공통 `Plugin` 메서드를 호출합니다.
macro_rules! with_output {
    ($handle:expr, $p:ident => $body:expr) => {
        match $handle {
            OutputHandle::Record(output) => {
                let mut $p = output.lock().unwrap_or_else(PoisonError::into_inner);
                $body
            }
            OutputHandle::Chunk(output) => {
                let mut $p = output.lock().unwrap_or_else(PoisonError::into_inner);
                $body
            }
        }
    };
}

impl OutputHandle {
    fn new(stage: OutputStage) -> Self {
        match stage {
            OutputStage::Record(output) => Self::Record(Arc::new(Mutex::new(output))),
            OutputStage::Chunk(output) => Self::Chunk(Arc::new(Mutex::new(output))),
        }
    }

    /// 버퍼가 없을 때 라우터의 기본 싱크
    fn sink(&self) -> Box<dyn EventSink> {
        match self {
            Self::Record(output) => Box::new(RecordOutputSink::from_shared(Arc::clone(output))),
            Self::Chunk(output) => Box::new(ChunkOutputSink::new(Arc::clone(output))),
        }
    }

    /// 청크 하나를 출력에 넘깁니다. 레코드 출력은 이벤트를 순서대로 처리합니다.
    fn deliver_chunk(&self, tag: &str, chunk: &Chunk) -> Result<(), SwakError> {
        match self {
            Self::Record(output) => {
                let mut output = output.lock().unwrap_or_else(PoisonError::into_inner);
                for event in chunk.events() {
                    output.process(tag, event.clone())?;
                }
                Ok(())
            }
            Self::Chunk(output) => output
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .write(chunk),
        }
    }

    fn name(&self) -> String {
        match self {
            Self::Record(output) => lock_name(output),
            Self::Chunk(output) => lock_name(output),
        }
    }

    fn start(&self) -> Result<(), SwakError> {
        with_output!(self, p => p.start())
    }

    fn shutdown(&self) -> Result<(), SwakError> {
        with_output!(self, p => stop_and_terminate(&mut **p))
    }

    fn terminate(&self) -> Result<(), SwakError> {
        with_output!(self, p => p.terminate())
    }
}

fn lock_name<P: Plugin + ?Sized>(output: &Mutex<Box<P>>) -> String {
    output
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .name()
        .to_owned()
}

/// 버퍼 없이 청크 출력에 직접 전달하는 싱크. 이벤트마다 한 건짜리 청크를 만듭니다.
struct ChunkOutputSink {
    name: String,
    output: SharedChunkOutput,
}

impl ChunkOutputSink {
    fn new(output: SharedChunkOutput) -> Self {
        Self {
            name: lock_name(&output),
            output,
        }
    }
}

impl EventSink for ChunkOutputSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&mut self, _tag: &str, event: Event) -> Result<(), SwakError> {
        let mut chunk = Chunk::new();
        let size = event_size(&event.record);
        chunk.push(event, size);
        chunk.seal(SealReason::Forced);
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(&chunk)
    }
}

// ─── PipelineRunner ──────────────────────────────────────────────────

/// 실행 형태
enum Plan {
    Command(Box<dyn Command>),
    Data(DataPlan),
}

struct DataPlan {
    input: Box<dyn Input>,
    parser: Option<Box<dyn Parser>>,
    router: EventRouter,
    buffer: Option<SharedBuffer>,
    output: OutputHandle,
}

/// 검증된 스테이지 시퀀스 실행기
///
/// # 사용 예시
/// ```ignore
/// let sequence = build_pipeline("in.counter | out.stdout", &registry)?;
/// let runner = PipelineRunner::new(sequence, PipelineSettings::default())?;
/// let report = runner.run_until(CancellationToken::new()).await?;
/// ```
pub struct PipelineRunner {
    settings: PipelineSettings,
    plan: Plan,
}

impl PipelineRunner {
    /// 검증된 시퀀스로 실행기를 만듭니다.
    pub fn new(sequence: StageSequence, settings: PipelineSettings) -> Result<Self, SwakError> {
        if !sequence.is_validated() {
            return Err(PipelineError::NotValidated.into());
        }
        let (_, stages) = sequence.into_parts();
        Ok(Self {
            plan: Self::plan(stages)?,
            settings,
        })
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// 단독 명령 파이프라인인지 확인합니다.
    pub fn is_command(&self) -> bool {
        matches!(self.plan, Plan::Command(_))
    }

    /// 스테이지 목록을 실행 형태로 나눕니다.
    fn plan(stages: Vec<Stage>) -> Result<Plan, SwakError> {
        let mut stages = stages.into_iter();
        let input = match stages.next() {
            Some(Stage::Command(command)) => return Ok(Plan::Command(command)),
            Some(Stage::Input(input)) => input,
            _ => return Err(PipelineError::NotValidated.into()),
        };

        let mut parser = None;
        let mut transforms = Vec::new();
        let mut buffer: Option<SharedBuffer> = None;
        let mut output = None;
        for stage in stages {
            match stage {
                Stage::Parser(p) => parser = Some(p),
                Stage::Transform(t) => transforms.push(t),
                Stage::Buffer(b) => buffer = Some(Arc::new(Mutex::new(b))),
                Stage::Output(o) => output = Some(OutputHandle::new(o)),
                Stage::Input(_) | Stage::Command(_) => {
                    return Err(PipelineError::NotValidated.into());
                }
            }
        }
        let output = output.ok_or(PipelineError::NotValidated)?;

        let default_sink: Box<dyn EventSink> = match &buffer {
            Some(buffer) => Box::new(BufferSink::new(Arc::clone(buffer))),
            None => output.sink(),
        };
        let mut router = EventRouter::new(default_sink);
        for transform in transforms {
            router.add_rule(ALL_TAGS, RuleStage::Transform(transform));
        }

        Ok(Plan::Data(DataPlan {
            input,
            parser,
            router,
            buffer,
            output,
        }))
    }

    /// 입력이 소진되거나 `cancel`이 발동할 때까지 실행합니다.
    ///
    /// 종료 중 발생한 첫 번째 에러(입력 실패 포함)를 반환합니다.
    pub async fn run_until(self, cancel: CancellationToken) -> Result<RunReport, SwakError> {
        match self.plan {
            Plan::Command(command) => {
                run_command(command)?;
                Ok(RunReport::default())
            }
            Plan::Data(plan) => {
                let run = DataRun {
                    settings: self.settings,
                    report: RunReport::default(),
                };
                run.run(plan, cancel).await
            }
        }
    }
}

/// 데이터 파이프라인 한 번의 실행 상태
struct DataRun {
    settings: PipelineSettings,
    report: RunReport,
}

impl DataRun {
    async fn run(mut self, mut plan: DataPlan, cancel: CancellationToken) -> Result<RunReport, SwakError> {
        start_all(&mut plan)?;
        tracing::info!(
            tag = self.settings.tag.as_str(),
            input = plan.input.name(),
            output = plan.output.name(),
            buffered = plan.buffer.is_some(),
            "pipeline started"
        );

        let (tx, mut rx) = mpsc::channel(self.settings.channel_capacity);
        let input_cancel = cancel.child_token();
        let input_task = spawn_input(plan.input, tx, input_cancel.clone());

        let mut ticker = tokio::time::interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.reset();
        let sealed = plan.buffer.as_ref().and_then(|buffer| {
            buffer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .flush_notifier()
        });

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("pipeline cancelled");
                    break;
                }
                item = rx.recv() => match item {
                    Some(item) => self.handle_item(
                        plan.parser.as_deref(),
                        &mut plan.router,
                        plan.buffer.as_ref(),
                        &plan.output,
                        item,
                    ),
                    None => {
                        tracing::info!("input exhausted");
                        break;
                    }
                },
                _ = ticker.tick() => self.tick(plan.buffer.as_ref(), &plan.output),
                _ = chunk_sealed(sealed.as_deref()) => {
                    if let Some(buffer) = plan.buffer.as_ref() {
                        self.flush_sealed(buffer, &plan.output);
                    }
                }
            }
        }

        // 입력 취소 후 남은 항목 처리. 송신 측이 모두 닫히면 끝남
        input_cancel.cancel();
        while let Some(item) = rx.recv().await {
            self.handle_item(
                plan.parser.as_deref(),
                &mut plan.router,
                plan.buffer.as_ref(),
                &plan.output,
                item,
            );
        }

        let mut first_err: Option<SwakError> = None;
        let mut input = match input_task.await {
            Ok((input, result)) => {
                if let Err(e) = result {
                    tracing::error!(stage = input.name(), error = %e, "input failed");
                    first_err = Some(e);
                }
                Some(input)
            }
            Err(e) => {
                tracing::error!(error = %e, "input task panicked");
                first_err = Some(PipelineError::TaskFailed(e.to_string()).into());
                None
            }
        };

        self.final_flush(plan.buffer.as_ref(), &plan.output);

        let mut record = |result: Result<(), SwakError>, stage: &str| {
            if let Err(e) = result {
                tracing::warn!(stage, error = %e, "failed to shut down stage");
                first_err.get_or_insert(e);
            }
        };
        if let Some(input) = input.as_mut() {
            let name = input.name().to_owned();
            record(stop_and_terminate(&mut **input), &name);
        }
        if let Some(parser) = plan.parser.as_mut() {
            let name = parser.name().to_owned();
            record(stop_and_terminate(&mut **parser), &name);
        }
        record(plan.router.stop_transforms(), "transforms");
        record(plan.router.terminate_transforms(), "transforms");
        if let Some(buffer) = &plan.buffer {
            let mut buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
            let name = buffer.name().to_owned();
            record(stop_and_terminate(&mut **buffer), &name);
        }
        record(plan.output.shutdown(), &plan.output.name());

        let report = self.report;
        tracing::info!(
            events_in = report.events_in,
            parse_errors = report.parse_errors,
            delivered = report.delivered,
            dropped = report.dropped,
            flushed_chunks = report.flushed_chunks,
            flushed_records = report.flushed_records,
            undelivered = report.undelivered,
            "pipeline finished"
        );
        match first_err {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// 입력 항목 하나를 파싱하고 라우팅합니다.
    fn handle_item(
        &mut self,
        parser: Option<&dyn Parser>,
        router: &mut EventRouter,
        buffer: Option<&SharedBuffer>,
        output: &OutputHandle,
        item: InputItem,
    ) {
        self.report.events_in += 1;
        let event = match item {
            InputItem::Event(event) => event,
            InputItem::Line(line) => {
                let Some(parser) = parser else {
                    tracing::warn!("text line received without a parser, skipping");
                    self.report.parse_errors += 1;
                    return;
                };
                match parser.parse(&line) {
                    Ok(record) => {
                        let time = parser.event_time(&record).unwrap_or_else(now_secs);
                        Event::new(time, record)
                    }
                    Err(e) => {
                        self.report.parse_errors += 1;
                        metrics::counter!(
                            m::PARSER_ERRORS_TOTAL,
                            m::LABEL_STAGE => parser.name().to_owned()
                        )
                        .increment(1);
                        tracing::warn!(stage = parser.name(), error = %e, "failed to parse line, skipping");
                        return;
                    }
                }
            }
        };

        let Some(buffer) = buffer else {
            let routed = router.emit_event(&self.settings.tag, event);
            self.record_routed(routed);
            return;
        };

        // 거부된 이벤트는 변환 체인부터 다시 거침
        let retry = event.clone();
        let routed = match router.emit_event(&self.settings.tag, event) {
            Err(SwakError::BufferFull(full)) => {
                tracing::debug!(
                    bound = full.bound.as_str(),
                    "buffer full, flushing sealed chunks before retry"
                );
                self.flush_sealed(buffer, output);
                router.emit_event(&self.settings.tag, retry)
            }
            routed => routed,
        };
        self.record_routed(routed);
        self.flush_sealed(buffer, output);
    }

    fn record_routed(&mut self, routed: Result<Routed, SwakError>) {
        match routed {
            Ok(Routed::Delivered) => self.report.delivered += 1,
            Ok(Routed::Dropped(_)) => self.report.dropped += 1,
            Err(e) => {
                self.report.dropped += 1;
                tracing::warn!(tag = self.settings.tag.as_str(), error = %e, "sink rejected event");
            }
        }
    }

    /// 봉인된 청크가 있으면 출력에 넘깁니다.
    fn flush_sealed(&mut self, buffer: &SharedBuffer, output: &OutputHandle) {
        let mut buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
        if buffer.sealed_count() == 0 {
            return;
        }
        if let Err(e) = self.flush(&mut **buffer, output, false) {
            tracing::warn!(error = %e, "flush failed, chunks kept for retry");
        }
    }

    /// 시간 봉인을 검사하고 봉인된 청크를 넘깁니다.
    fn tick(&mut self, buffer: Option<&SharedBuffer>, output: &OutputHandle) {
        let Some(buffer) = buffer else {
            return;
        };
        let mut buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = buffer.tick() {
            tracing::warn!(error = %e, "buffer tick failed");
            return;
        }
        if let Err(e) = self.flush(&mut **buffer, output, false) {
            tracing::warn!(error = %e, "flush failed, chunks kept for retry");
        }
    }

    /// 종료 시 강제 flush. 실패하면 한 번 더 시도합니다.
    fn final_flush(&mut self, buffer: Option<&SharedBuffer>, output: &OutputHandle) {
        let Some(buffer) = buffer else {
            return;
        };
        let mut buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
        for attempt in 1..=2 {
            match self.flush(&mut **buffer, output, true) {
                Ok(()) => break,
                Err(e) => tracing::warn!(attempt, error = %e, "final flush failed"),
            }
        }
        self.report.undelivered = buffer.pending_records();
        if self.report.undelivered > 0 {
            tracing::error!(
                records = self.report.undelivered,
                "records left undelivered in buffer at shutdown"
            );
        }
    }

    fn flush(&mut self, buffer: &mut dyn Buffer, output: &OutputHandle, force: bool) -> Result<(), SwakError> {
        let tag = self.settings.tag.as_str();
        let mut delivered = FlushReport::default();
        let result = buffer.flush(force, &mut |chunk: &Chunk| {
            output.deliver_chunk(tag, chunk)?;
            delivered.merge(FlushReport {
                chunks: 1,
                records: chunk.records(),
            });
            Ok(())
        });
        self.report.flushed_chunks += delivered.chunks;
        self.report.flushed_records += delivered.records;
        result.map(|_| ())
    }
}

/// 버퍼가 청크를 봉인할 때까지 기다립니다. 버퍼가 없으면 끝나지 않습니다.
async fn chunk_sealed(notify: Option<&Notify>) {
    match notify {
        Some(notify) => notify.notified().await,
        None => std::future::pending().await,
    }
}

fn run_command(mut command: Box<dyn Command>) -> Result<(), SwakError> {
    command.start()?;
    tracing::debug!(stage = command.name(), "executing command");
    let result = command.execute();
    let terminated = command.terminate();
    result.and(terminated)
}

/// 모든 스테이지를 순서대로 시작합니다. 실패하면 모두 종료합니다.
fn start_all(plan: &mut DataPlan) -> Result<(), SwakError> {
    let result = start_in_order(plan);
    if let Err(e) = &result {
        tracing::error!(error = %e, "failed to start pipeline, terminating stages");
        // 종료 중 에러는 시작 에러보다 덜 중요함
        let _ = plan.input.terminate();
        if let Some(parser) = plan.parser.as_mut() {
            let _ = parser.terminate();
        }
        let _ = plan.router.terminate_transforms();
        if let Some(buffer) = &plan.buffer {
            let _ = buffer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .terminate();
        }
        let _ = plan.output.terminate();
    }
    result
}

fn start_in_order(plan: &mut DataPlan) -> Result<(), SwakError> {
    plan.input.start()?;
    if let Some(parser) = plan.parser.as_mut() {
        parser.start()?;
    }
    plan.router.start_transforms()?;
    if let Some(buffer) = &plan.buffer {
        buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .start()?;
    }
    plan.output.start()
}

fn stop_and_terminate<P: Plugin + ?Sized>(plugin: &mut P) -> Result<(), SwakError> {
    plugin.stop()?;
    plugin.terminate()
}

type InputTask = JoinHandle<(Box<dyn Input>, Result<u64, SwakError>)>;

fn spawn_input(
    mut input: Box<dyn Input>,
    tx: mpsc::Sender<InputItem>,
    cancel: CancellationToken,
) -> InputTask {
    tokio::spawn(async move {
        let result = input.read(tx, cancel).await;
        if let Ok(sent) = &result {
            tracing::debug!(stage = input.name(), sent, "input task finished");
        }
        (input, result)
    })
}

// ─── Tests ───────────────────────────────────────────────────────────
