//! 이벤트 데이터 모델 — 레코드, 이벤트, 이벤트 스트림
//!
//! 스테이지 사이에서 주고받는 데이터 단위를 정의합니다.
//!
//! - [`Record`]: 스키마가 없는 문자열 키 매핑
//! - [`Event`]: `(타임스탬프, 레코드)` 쌍, 라우팅과 버퍼링의 원자 단위
//! - [`EventStream`]: 단일 이벤트 또는 같은 길이의 타임스탬프/레코드 시퀀스
//!
//! 이벤트 스트림은 유한하며 재시작 가능합니다. [`EventStream::iter`]를 여러 번 호출해도
//! 항상 첫 번째 이벤트부터 같은 순서로 순회합니다.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::StreamError;

/// 구조화된 레코드
///
/// 문자열 키에서 JSON 값(문자열, 숫자, 중첩 매핑, 배열)으로의 매핑입니다.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// 현재 시각을 epoch 기준 부동소수점 초로 반환합니다.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}

/// 타임스탬프가 붙은 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// epoch 기준 초
    pub time: f64,
    /// 레코드 본문
    pub record: Record,
}

impl Event {
    /// 새 이벤트를 생성합니다.
    pub fn new(time: f64, record: Record) -> Self {
        Self { time, record }
    }

    /// 현재 시각으로 이벤트를 생성합니다.
    pub fn now(record: Record) -> Self {
        Self::new(now_secs(), record)
    }
}

/// 입력 스테이지가 생산하는 항목
///
/// 텍스트 입력은 파싱 전 원시 줄을, 레코드 입력은 완성된 이벤트를 보냅니다.
#[derive(Debug, Clone, PartialEq)]
pub enum InputItem {
    /// 파싱되지 않은 원시 줄
    Line(Bytes),
    /// 레코드 입력이 직접 만든 이벤트
    Event(Event),
}

/// 정확히 하나의 이벤트를 감싸는 스트림
#[derive(Debug, Clone, PartialEq)]
pub struct OneEventStream {
    event: Event,
}

impl OneEventStream {
    /// 단일 이벤트 스트림을 생성합니다.
    pub fn new(time: f64, record: Record) -> Self {
        Self {
            event: Event::new(time, record),
        }
    }

    /// 감싼 이벤트를 반환합니다.
    pub fn event(&self) -> &Event {
        &self.event
    }
}

/// 같은 길이의 타임스탬프/레코드 시퀀스
///
/// 생성 시 `times.len() == records.len()`을 검사하며, 이후에는 변경할 수 없습니다.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiEventStream {
    times: Vec<f64>,
    records: Vec<Record>,
}

impl MultiEventStream {
    /// 다중 이벤트 스트림을 생성합니다.
    ///
    /// # Errors
    ///
    /// 두 시퀀스의 길이가 다르면 [`StreamError::LengthMismatch`]를 반환합니다.
    pub fn new(times: Vec<f64>, records: Vec<Record>) -> Result<Self, StreamError> {
        if times.len() != records.len() {
            return Err(StreamError::LengthMismatch {
                times: times.len(),
                records: records.len(),
            });
        }
        Ok(Self { times, records })
    }

    /// 이벤트 목록에서 스트림을 만듭니다. 길이는 항상 일치합니다.
    pub fn from_events(events: impl IntoIterator<Item = Event>) -> Self {
        let (times, records) = events.into_iter().map(|e| (e.time, e.record)).unzip();
        Self { times, records }
    }

    /// 타임스탬프 시퀀스
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// 레코드 시퀀스
    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

/// 스테이지 사이에서 전달되는 이벤트 스트림
#[derive(Debug, Clone, PartialEq)]
pub enum EventStream {
    /// 단일 이벤트
    Single(OneEventStream),
    /// 다중 이벤트
    Multi(MultiEventStream),
}

impl EventStream {
    /// 단일 이벤트 스트림을 생성합니다.
    pub fn single(time: f64, record: Record) -> Self {
        Self::Single(OneEventStream::new(time, record))
    }

    /// 다중 이벤트 스트림을 생성합니다.
    pub fn multi(times: Vec<f64>, records: Vec<Record>) -> Result<Self, StreamError> {
        MultiEventStream::new(times, records).map(Self::Multi)
    }

    /// 스트림의 이벤트 수
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Multi(m) => m.times.len(),
        }
    }

    /// 이벤트가 없으면 true
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 첫 번째 이벤트부터 새로 순회합니다.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            stream: self,
            pos: 0,
        }
    }

    /// 소유권을 넘기며 이벤트를 순서대로 꺼냅니다.
    pub fn into_events(self) -> IntoIter {
        self.into_iter()
    }
}

impl From<Event> for EventStream {
    fn from(event: Event) -> Self {
        Self::Single(OneEventStream { event })
    }
}

impl<'a> IntoIterator for &'a EventStream {
    type Item = (f64, &'a Record);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for EventStream {
    type Item = Event;
    type IntoIter = IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        match self {
            Self::Single(s) => IntoIter::Single(Some(s.event)),
            Self::Multi(m) => IntoIter::Multi(m.times.into_iter().zip(m.records)),
        }
    }
}

/// [`EventStream`]의 빌림 순회자
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    stream: &'a EventStream,
    pos: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (f64, &'a Record);

    fn next(&mut self) -> Option<Self::Item> {
        let stream: &'a EventStream = self.stream;
        let item = match stream {
            EventStream::Single(s) if self.pos == 0 => Some((s.event.time, &s.event.record)),
            EventStream::Single(_) => None,
            EventStream::Multi(m) => m
                .times
                .get(self.pos)
                .copied()
                .zip(m.records.get(self.pos)),
        };
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.stream.len().saturating_sub(self.pos);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

/// [`EventStream`]의 소유 순회자
#[derive(Debug)]
pub enum IntoIter {
    #[doc(hidden)]
    Single(Option<Event>),
    #[doc(hidden)]
    Multi(std::iter::Zip<std::vec::IntoIter<f64>, std::vec::IntoIter<Record>>),
}

impl Iterator for IntoIter {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        match self {
            Self::Single(slot) => slot.take(),
            Self::Multi(it) => it.next().map(|(time, record)| Event::new(time, record)),
        }
    }
}
