//! 메모리 출력 (`out.memory`)
//!
//! 전달받은 이벤트/청크를 공유 핸들에 모읍니다. 파이프라인 시험 실행과
//! 테스트에서 결과를 확인하는 용도입니다.
//!
//! - [`MemoryOutput`]: 레코드 출력
//! - [`MemoryChunkOutput`]: 청크 출력 (`--chunked`)
//!
//! [`MemoryHandle`]로 실패를 주입할 수 있습니다. 실패한 전달은 아무것도 기록하지 않습니다.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use clap::Parser as ClapParser;

use swak_core::chunk::Chunk;
use swak_core::error::{DeliveryError, SwakError};
use swak_core::event::Event;
use swak_core::plugin::{ChunkOutput, Lifecycle, Plugin, RecordOutput, StageKind};

/// `out.memory` 인자
#[derive(Debug, Clone, Default, ClapParser)]
#[command(name = "out.memory", about = "Collect events in memory.")]
pub struct MemoryOutputArgs {
    /// 청크 단위로 받음
    #[arg(long)]
    pub chunked: bool,
}

#[derive(Debug, Default)]
struct Collected {
    events: Vec<(String, Event)>,
    chunks: Vec<Vec<Event>>,
    fail_next: usize,
    failing: bool,
    attempts: usize,
}

impl Collected {
    /// 이번 전달을 실패시켜야 하면 true
    fn take_failure(&mut self) -> bool {
        self.attempts += 1;
        if self.failing {
            return true;
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return true;
        }
        false
    }
}

/// 메모리 출력이 모은 결과를 여러 곳에서 보는 핸들
#[derive(Debug, Clone, Default)]
pub struct MemoryHandle {
    inner: Arc<Mutex<Collected>>,
}

impl MemoryHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Collected> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 레코드 출력이 받은 `(태그, 이벤트)` 목록
    pub fn events(&self) -> Vec<(String, Event)> {
        self.lock().events.clone()
    }

    /// 청크 출력이 받은 청크별 이벤트 목록
    pub fn chunks(&self) -> Vec<Vec<Event>> {
        self.lock().chunks.clone()
    }

    /// 받은 레코드 총수 (이벤트 + 청크)
    pub fn record_count(&self) -> usize {
        let inner = self.lock();
        inner.events.len() + inner.chunks.iter().map(Vec::len).sum::<usize>()
    }

    /// 성공/실패를 포함한 전달 시도 수
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    /// 다음 `count`번의 전달을 실패시킵니다.
    pub fn fail_next(&self, count: usize) {
        self.lock().fail_next = count;
    }

    /// 해제할 때까지 모든 전달을 실패시킵니다.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// 모은 결과와 실패 설정을 지웁니다.
    pub fn reset(&self) {
        *self.lock() = Collected::default();
    }
}

fn injected(stage: &str) -> SwakError {
    DeliveryError {
        stage: stage.to_owned(),
        reason: "injected failure".to_owned(),
    }
    .into()
}

// ─── MemoryOutput ────────────────────────────────────────────────────

/// 레코드 단위 메모리 출력
pub struct MemoryOutput {
    lifecycle: Lifecycle,
    handle: MemoryHandle,
}

impl MemoryOutput {
    pub const NAME: &'static str = "out.memory";

    pub fn new(handle: MemoryHandle) -> Self {
        Self {
            lifecycle: Lifecycle::new(Self::NAME),
            handle,
        }
    }

    pub fn handle(&self) -> MemoryHandle {
        self.handle.clone()
    }
}

impl Plugin for MemoryOutput {
    fn kind(&self) -> StageKind {
        StageKind::Output
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }
}

impl RecordOutput for MemoryOutput {
    fn process(&mut self, tag: &str, event: Event) -> Result<(), SwakError> {
        self.lifecycle.ensure_active("process")?;
        let mut inner = self.handle.lock();
        if inner.take_failure() {
            return Err(injected(Self::NAME));
        }
        inner.events.push((tag.to_owned(), event));
        Ok(())
    }
}

// ─── MemoryChunkOutput ───────────────────────────────────────────────

/// 청크 단위 메모리 출력
pub struct MemoryChunkOutput {
    lifecycle: Lifecycle,
    handle: MemoryHandle,
}

impl MemoryChunkOutput {
    pub fn new(handle: MemoryHandle) -> Self {
        Self {
            lifecycle: Lifecycle::new(MemoryOutput::NAME),
            handle,
        }
    }

    pub fn handle(&self) -> MemoryHandle {
        self.handle.clone()
    }
}

impl Plugin for MemoryChunkOutput {
    fn kind(&self) -> StageKind {
        StageKind::Output
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }
}

impl ChunkOutput for MemoryChunkOutput {
    fn write(&mut self, chunk: &Chunk) -> Result<(), SwakError> {
        self.lifecycle.ensure_active("write")?;
        let mut inner = self.handle.lock();
        if inner.take_failure() {
            return Err(injected(MemoryOutput::NAME));
        }
        inner.chunks.push(chunk.events().to_vec());
        Ok(())
    }
}
