//! 청크 — 버퍼 안에서 이벤트를 모으는 배치 단위
//!
//! 청크는 추가 전용 이벤트 시퀀스와 누적 집계(레코드 수, 근사 바이트 크기)를 가집니다.
//! 봉인된 청크는 변경할 수 없으며 flush 후보가 됩니다.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::event::{Event, MultiEventStream, Record};

/// 타임스탬프 몫으로 더하는 고정 바이트 수
const TIMESTAMP_BYTES: u64 = 8;

/// 레코드 하나가 청크에서 차지하는 근사 바이트 크기를 계산합니다.
///
/// 직렬화된 JSON 길이에 타임스탬프 8바이트를 더한 값입니다.
pub fn event_size(record: &Record) -> u64 {
    let json_len = serde_json::to_string(record).map_or(0, |s| s.len());
    json_len as u64 + TIMESTAMP_BYTES
}

/// 청크가 봉인된 이유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SealReason {
    /// `chunk_max_record` 도달
    RecordLimit,
    /// `chunk_max_size` 도달
    SizeLimit,
    /// `flush_interval` 경과
    Interval,
    /// 강제 flush 또는 정지
    Forced,
}

impl fmt::Display for SealReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RecordLimit => write!(f, "record_limit"),
            Self::SizeLimit => write!(f, "size_limit"),
            Self::Interval => write!(f, "interval"),
            Self::Forced => write!(f, "forced"),
        }
    }
}

/// 이벤트 배치
#[derive(Debug, Clone)]
pub struct Chunk {
    id: Uuid,
    events: Vec<Event>,
    bytes: u64,
    sealed: Option<SealReason>,
    created_at: Instant,
}

impl Chunk {
    /// 빈 열린 청크를 생성합니다.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            events: Vec::new(),
            bytes: 0,
            sealed: None,
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// 레코드 수
    pub fn records(&self) -> usize {
        self.events.len()
    }

    /// 근사 바이트 크기
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.is_some()
    }

    pub fn seal_reason(&self) -> Option<SealReason> {
        self.sealed
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// 생성 후 경과 시간
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// 이벤트를 추가합니다. `size`는 [`event_size`]로 미리 계산한 값입니다.
    ///
    /// 봉인된 청크에는 추가하지 않고 false를 반환합니다.
    pub fn push(&mut self, event: Event, size: u64) -> bool {
        if self.is_sealed() {
            return false;
        }
        self.events.push(event);
        self.bytes = self.bytes.saturating_add(size);
        true
    }

    /// 청크를 봉인합니다. 이미 봉인된 경우 처음 이유를 유지합니다.
    pub fn seal(&mut self, reason: SealReason) {
        if self.sealed.is_none() {
            self.sealed = Some(reason);
        }
    }

    /// 청크 내용을 다중 이벤트 스트림으로 복사합니다.
    pub fn to_stream(&self) -> MultiEventStream {
        MultiEventStream::from_events(self.events.iter().cloned())
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new()
    }
}

/// flush 한 번의 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// 전달되어 제거된 청크 수
    pub chunks: usize,
    /// 전달된 레코드 수
    pub records: usize,
}

impl FlushReport {
    /// 다른 결과를 누적합니다.
    pub fn merge(&mut self, other: FlushReport) {
        self.chunks += other.chunks;
        self.records += other.records;
    }
}
