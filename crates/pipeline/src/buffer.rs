//! 청크 버퍼 -- 크기/개수/시간 한계로 이벤트를 배치
//!
//! [`SizedBuffer`]는 들어온 이벤트 스트림을 청크에 모으고, 봉인된 청크를
//! 오래된 순서로 출력에 넘깁니다.
//!
//! # 봉인
//! - append 후 `chunk_max_record` 또는 `chunk_max_size`에 도달하면 즉시 봉인
//! - `flush_interval`이 지나면 `tick()`에서 봉인 (standalone 모드는 자체 타이머)
//! - 강제 flush 또는 `stop()` 시 열린 청크를 봉인
//!
//! # 오버플로 정책
//! append는 변경 전에 결과를 계산합니다.
//! - [`OverflowPolicy::Reject`]: 스트림 전체를 거부하고 `BufferFullError` 반환
//! - [`OverflowPolicy::EvictOldest`]: 가장 오래된 봉인 청크부터 버림.
//!   모두 버려도 부족하면 거부
//!
//! # 전달 보장
//! 청크는 출력이 성공을 반환한 뒤에만 제거됩니다. 실패한 청크와 그 뒤의 청크는
//! 다음 flush까지 남아 있습니다 (at-least-once).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use clap::Parser as ClapParser;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use swak_core::chunk::{Chunk, FlushReport, SealReason, event_size};
use swak_core::config::{BufferSection, OverflowPolicy};
use swak_core::error::{BufferFullError, ConfigError, DeliveryError, SwakError};
use swak_core::event::EventStream;
use swak_core::metrics as m;
use swak_core::plugin::{Buffer, Lifecycle, Plugin, StageKind};

use crate::config::{BufferConfig, BufferConfigBuilder};
use crate::registry::parse_args;

/// 버퍼 플러그인 정규 이름
pub const BUFFER_NAME: &str = "buf.memory";

/// `buf.memory` 인자
///
/// 지정하지 않은 값은 `[buffer]` 설정 섹션을 따릅니다.
#[derive(Debug, Clone, Default, ClapParser)]
#[command(name = "buf.memory", about = "Batch events into sized chunks.")]
pub struct BufferArgs {
    /// 청크 최대 레코드 수
    #[arg(long = "chunk-max-record")]
    pub chunk_max_record: Option<u64>,

    /// 청크 최대 크기 (예: 8m)
    #[arg(long = "chunk-max-size")]
    pub chunk_max_size: Option<String>,

    /// 버퍼 최대 청크 수
    #[arg(long = "buffer-max-chunk")]
    pub buffer_max_chunk: Option<u64>,

    /// 버퍼 최대 크기 (예: 64m)
    #[arg(long = "buffer-max-size")]
    pub buffer_max_size: Option<String>,

    /// 시간 기반 봉인 주기 (초)
    #[arg(long = "flush-interval")]
    pub flush_interval: Option<f64>,

    /// 자체 타이머 사용
    #[arg(long)]
    pub standalone: bool,

    /// 전역 한계 초과 정책 (reject, evict_oldest)
    #[arg(long)]
    pub overflow: Option<OverflowPolicy>,
}

impl BufferArgs {
    /// 설정 섹션 위에 인자를 덮어써 버퍼 설정을 만듭니다.
    pub fn resolve(&self, section: &BufferSection) -> Result<BufferConfig, ConfigError> {
        let mut builder = BufferConfigBuilder::from_section(section);
        if let Some(count) = self.chunk_max_record {
            builder = builder.chunk_max_record(count);
        }
        if let Some(size) = self.chunk_max_size.as_deref() {
            builder = builder.chunk_max_size(size);
        }
        if let Some(count) = self.buffer_max_chunk {
            builder = builder.buffer_max_chunk(count);
        }
        if let Some(size) = self.buffer_max_size.as_deref() {
            builder = builder.buffer_max_size(size);
        }
        if let Some(secs) = self.flush_interval {
            builder = builder.flush_interval(secs);
        }
        if self.standalone {
            builder = builder.standalone(true);
        }
        if let Some(policy) = self.overflow {
            builder = builder.overflow(policy);
        }
        builder.build()
    }
}

/// 청크 요약 (조회용)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkSummary {
    pub id: String,
    pub records: usize,
    pub bytes: u64,
    pub sealed: Option<SealReason>,
}

/// 잠금으로 보호되는 버퍼 내부 상태
#[derive(Debug, Default)]
struct BufferState {
    /// 오래된 순서. 마지막 청크만 열려 있을 수 있음
    chunks: VecDeque<Chunk>,
    total_bytes: u64,
    total_records: usize,
}

impl BufferState {
    fn open_chunk(&self) -> Option<&Chunk> {
        self.chunks.back().filter(|c| !c.is_sealed())
    }

    fn sealed_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_sealed()).count()
    }

    /// 비어 있지 않은 열린 청크를 봉인합니다.
    fn seal_open(&mut self, reason: SealReason) -> bool {
        match self.chunks.back_mut() {
            Some(chunk) if !chunk.is_sealed() && !chunk.is_empty() => {
                chunk.seal(reason);
                record_seal(chunk, reason);
                true
            }
            _ => false,
        }
    }

    /// 열린 청크가 `interval` 이상 지났으면 봉인합니다.
    /// 열린 청크가 시간 봉인될 시각
    fn open_deadline(&self, interval: Duration) -> Option<Instant> {
        self.open_chunk()
            .filter(|c| !c.is_empty())
            .map(|c| c.created_at() + interval)
    }

    fn seal_expired(&mut self, interval: Duration) -> bool {
        let expired = self
            .open_chunk()
            .is_some_and(|c| !c.is_empty() && c.age() >= interval);
        expired && self.seal_open(SealReason::Interval)
    }

    fn publish_gauges(&self) {
        metrics::gauge!(m::BUFFER_SIZE_BYTES).set(self.total_bytes as f64);
        metrics::gauge!(m::BUFFER_CHUNKS).set(self.chunks.len() as f64);
    }
}

fn record_seal(chunk: &Chunk, reason: SealReason) {
    metrics::counter!(m::BUFFER_CHUNKS_SEALED_TOTAL, m::LABEL_REASON => reason.to_string())
        .increment(1);
    tracing::debug!(
        chunk_id = %chunk.id(),
        records = chunk.records(),
        bytes = chunk.bytes(),
        reason = %reason,
        "chunk sealed"
    );
}

/// append를 적용했을 때의 예상 결과
struct AppendPlan {
    chunks: u64,
    bytes: u64,
}

/// 크기/개수/시간 한계를 가진 청크 버퍼
///
/// 상태는 `Arc<Mutex<_>>`로 보호되어 standalone 타이머 태스크와 공유됩니다.
pub struct SizedBuffer {
    lifecycle: Lifecycle,
    config: BufferConfig,
    state: Arc<Mutex<BufferState>>,
    notify: Arc<Notify>,
    opened: Arc<Notify>,
    timer: Option<(CancellationToken, JoinHandle<()>)>,
}

impl SizedBuffer {
    /// `buf.memory` 이름으로 버퍼를 생성합니다.
    pub fn new(config: BufferConfig) -> Self {
        Self::with_name(BUFFER_NAME, config)
    }

    /// 인자 목록과 설정 섹션으로 버퍼를 생성합니다.
    pub fn from_args(args: &[String], section: &BufferSection) -> Result<Self, SwakError> {
        let args: BufferArgs = parse_args(BUFFER_NAME, args)?;
        Ok(Self::new(args.resolve(section)?))
    }

    /// 지정한 이름으로 버퍼를 생성합니다.
    pub fn with_name(name: impl Into<String>, config: BufferConfig) -> Self {
        Self {
            lifecycle: Lifecycle::new(name),
            config,
            state: Arc::new(Mutex::new(BufferState::default())),
            notify: Arc::new(Notify::new()),
            opened: Arc::new(Notify::new()),
            timer: None,
        }
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// 열린 청크를 포함한 청크 수
    pub fn chunk_count(&self) -> usize {
        self.lock().chunks.len()
    }

    pub fn total_records(&self) -> usize {
        self.lock().total_records
    }

    pub fn total_bytes(&self) -> u64 {
        self.lock().total_bytes
    }

    /// 가장 엄격한 전역 한계 대비 사용률 (0.0~1.0). 전역 한계가 없으면 0.0
    pub fn utilization(&self) -> f64 {
        let state = self.lock();
        let by_chunks = self
            .config
            .buffer_max_chunk
            .map(|max| state.chunks.len() as f64 / max as f64);
        let by_bytes = self
            .config
            .buffer_max_size
            .map(|max| state.total_bytes as f64 / max as f64);
        by_chunks
            .into_iter()
            .chain(by_bytes)
            .fold(0.0_f64, f64::max)
            .min(1.0)
    }

    /// 현재 청크 요약 목록 (오래된 순서)
    pub fn snapshot(&self) -> Vec<ChunkSummary> {
        self.lock()
            .chunks
            .iter()
            .map(|c| ChunkSummary {
                id: c.id().to_string(),
                records: c.records(),
                bytes: c.bytes(),
                sealed: c.seal_reason(),
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 청크 봉인 한계 검사
    fn seal_reason_for(&self, records: usize, bytes: u64) -> Option<SealReason> {
        if records as u64 >= self.config.chunk_max_record {
            Some(SealReason::RecordLimit)
        } else if self.config.chunk_max_size.is_some_and(|max| bytes >= max) {
            Some(SealReason::SizeLimit)
        } else {
            None
        }
    }

    /// append 결과(청크 수, 바이트)를 변경 없이 계산합니다.
    fn plan(&self, state: &BufferState, sizes: &[u64]) -> AppendPlan {
        let mut chunks = state.chunks.len() as u64;
        let mut open = state.open_chunk().map(|c| (c.records(), c.bytes()));
        for &size in sizes {
            let (records, bytes) = open.get_or_insert_with(|| {
                chunks += 1;
                (0, 0)
            });
            *records += 1;
            *bytes += size;
            if self.seal_reason_for(*records, *bytes).is_some() {
                open = None;
            }
        }
        AppendPlan {
            chunks,
            bytes: state.total_bytes + sizes.iter().sum::<u64>(),
        }
    }

    /// 계획이 전역 한계를 넘는지 검사합니다.
    fn exceeded(&self, plan: &AppendPlan) -> Option<BufferFullError> {
        if let Some(limit) = self.config.buffer_max_chunk {
            if plan.chunks > limit {
                return Some(BufferFullError {
                    bound: "buffer_max_chunk".to_owned(),
                    limit,
                    required: plan.chunks,
                });
            }
        }
        if let Some(limit) = self.config.buffer_max_size {
            if plan.bytes > limit {
                return Some(BufferFullError {
                    bound: "buffer_max_size".to_owned(),
                    limit,
                    required: plan.bytes,
                });
            }
        }
        None
    }

    /// 한계 안으로 들어올 때까지 버려야 할 오래된 봉인 청크 수를 찾습니다.
    fn eviction_count(&self, state: &BufferState, mut plan: AppendPlan) -> Option<usize> {
        let mut evict = 0;
        for chunk in state.chunks.iter().take_while(|c| c.is_sealed()) {
            if self.exceeded(&plan).is_none() {
                return Some(evict);
            }
            plan.chunks -= 1;
            plan.bytes -= chunk.bytes();
            evict += 1;
        }
        self.exceeded(&plan).is_none().then_some(evict)
    }

    fn reject(&self, err: BufferFullError) -> SwakError {
        metrics::counter!(m::BUFFER_APPEND_REJECTED_TOTAL).increment(1);
        tracing::warn!(
            stage = self.name(),
            bound = err.bound.as_str(),
            limit = err.limit,
            required = err.required,
            "buffer full, append rejected"
        );
        err.into()
    }

    fn spawn_timer(&mut self, interval: Duration) -> Result<(), SwakError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| ConfigError::InvalidValue {
            field: "standalone".to_owned(),
            reason: "standalone buffer must be started inside a tokio runtime".to_owned(),
        })?;
        let state = Arc::clone(&self.state);
        let notify = Arc::clone(&self.notify);
        let opened = Arc::clone(&self.opened);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        // 열린 청크의 마감 시각에 깨어나고, 열린 청크가 없으면 새 청크를 기다림
        let task = handle.spawn(async move {
            loop {
                let deadline = state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .open_deadline(interval);
                match deadline {
                    Some(deadline) => tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep_until(deadline) => {
                            let sealed = state
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .seal_expired(interval);
                            if sealed {
                                notify.notify_one();
                            }
                        }
                    },
                    None => tokio::select! {
                        _ = token.cancelled() => break,
                        _ = opened.notified() => {}
                    },
                }
            }
        });
        self.timer = Some((cancel, task));
        tracing::debug!(stage = self.name(), ?interval, "standalone flush timer started");
        Ok(())
    }

    fn cancel_timer(&mut self) {
        if let Some((cancel, task)) = self.timer.take() {
            cancel.cancel();
            // 취소 신호로 루프가 끝나므로 join을 기다리지 않음
            drop(task);
        }
    }
}

impl Plugin for SizedBuffer {
    fn kind(&self) -> StageKind {
        StageKind::Buffer
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    fn start(&mut self) -> Result<(), SwakError> {
        let changed = self.lifecycle.start()?;
        if changed && self.config.standalone {
            if let Some(interval) = self.config.flush_interval {
                if let Err(e) = self.spawn_timer(interval) {
                    self.lifecycle.stop()?;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SwakError> {
        if self.lifecycle.stop()? {
            self.cancel_timer();
            let mut state = self.lock();
            if state.seal_open(SealReason::Forced) {
                self.notify.notify_one();
            }
            state.publish_gauges();
        }
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), SwakError> {
        self.lifecycle.terminate()?;
        self.cancel_timer();
        let mut state = self.lock();
        state.seal_open(SealReason::Forced);
        if state.total_records > 0 {
            tracing::warn!(
                stage = self.lifecycle.name(),
                records = state.total_records,
                chunks = state.chunks.len(),
                "buffer terminated with undelivered records"
            );
        }
        Ok(())
    }
}

impl Buffer for SizedBuffer {
    fn append(&mut self, stream: EventStream) -> Result<(), SwakError> {
        self.lifecycle.ensure_active("append")?;
        let sizes: Vec<u64> = stream.iter().map(|(_, record)| event_size(record)).collect();

        let state_arc = Arc::clone(&self.state);
        let mut state = state_arc.lock().unwrap_or_else(PoisonError::into_inner);

        let plan = self.plan(&state, &sizes);
        if let Some(err) = self.exceeded(&plan) {
            match self.config.overflow {
                OverflowPolicy::Reject => return Err(self.reject(err)),
                OverflowPolicy::EvictOldest => match self.eviction_count(&state, plan) {
                    Some(count) => {
                        for _ in 0..count {
                            if let Some(chunk) = state.chunks.pop_front() {
                                state.total_bytes -= chunk.bytes();
                                state.total_records -= chunk.records();
                                tracing::warn!(
                                    stage = self.name(),
                                    chunk_id = %chunk.id(),
                                    records = chunk.records(),
                                    "buffer full, evicted oldest sealed chunk"
                                );
                            }
                        }
                        metrics::counter!(m::BUFFER_CHUNKS_EVICTED_TOTAL).increment(count as u64);
                    }
                    None => return Err(self.reject(err)),
                },
            }
        }

        let mut sealed_any = false;
        let mut opened_any = false;
        for (event, size) in stream.into_events().zip(sizes) {
            if state.open_chunk().is_none() {
                state.chunks.push_back(Chunk::new());
                opened_any = true;
            }
            let Some(chunk) = state.chunks.back_mut() else {
                continue;
            };
            chunk.push(event, size);
            let reason = self.seal_reason_for(chunk.records(), chunk.bytes());
            if let Some(reason) = reason {
                chunk.seal(reason);
                record_seal(chunk, reason);
                sealed_any = true;
            }
            state.total_bytes += size;
            state.total_records += 1;
        }
        state.publish_gauges();
        drop(state);

        if sealed_any {
            self.notify.notify_one();
        }
        if opened_any {
            self.opened.notify_one();
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<bool, SwakError> {
        self.lifecycle.ensure_active("tick")?;
        let Some(interval) = self.config.flush_interval else {
            return Ok(false);
        };
        let sealed = self.lock().seal_expired(interval);
        if sealed {
            self.notify.notify_one();
        }
        Ok(sealed)
    }

    fn flush(
        &mut self,
        force: bool,
        deliver: &mut dyn FnMut(&Chunk) -> Result<(), SwakError>,
    ) -> Result<FlushReport, SwakError> {
        self.lifecycle.ensure_active("flush")?;
        let name = self.lifecycle.name().to_owned();
        let state_arc = Arc::clone(&self.state);
        let mut state = state_arc.lock().unwrap_or_else(PoisonError::into_inner);

        if force {
            state.seal_open(SealReason::Forced);
        }

        let mut report = FlushReport::default();
        while let Some(chunk) = state.chunks.front().filter(|c| c.is_sealed()) {
            if let Err(e) = deliver(chunk) {
                metrics::counter!(m::BUFFER_DELIVERY_FAILURES_TOTAL).increment(1);
                tracing::warn!(
                    stage = name.as_str(),
                    chunk_id = %chunk.id(),
                    records = chunk.records(),
                    delivered_chunks = report.chunks,
                    error = %e,
                    "chunk delivery failed, keeping chunk for retry"
                );
                state.publish_gauges();
                let err = match e {
                    SwakError::Delivery(d) => d,
                    other => DeliveryError {
                        stage: name,
                        reason: other.to_string(),
                    },
                };
                return Err(err.into());
            }
            if let Some(done) = state.chunks.pop_front() {
                state.total_bytes -= done.bytes();
                state.total_records -= done.records();
                report.chunks += 1;
                report.records += done.records();
                metrics::counter!(m::BUFFER_CHUNKS_FLUSHED_TOTAL).increment(1);
            }
        }
        state.publish_gauges();

        if report.chunks > 0 {
            tracing::debug!(
                stage = name.as_str(),
                chunks = report.chunks,
                records = report.records,
                "buffer flushed"
            );
        }
        Ok(report)
    }

    fn pending_records(&self) -> usize {
        self.total_records()
    }

    fn sealed_count(&self) -> usize {
        self.lock().sealed_count()
    }

    fn flush_notifier(&self) -> Option<Arc<Notify>> {
        Some(Arc::clone(&self.notify))
    }
}

impl Drop for SizedBuffer {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}
