//! 스테이지 계약 — 종류 태그, 생명주기, 기능 trait
//!
//! 모든 플러그인은 [`Plugin`] trait을 구현하고 여섯 가지 기능 trait 중 하나를 추가로 구현합니다.
//! 기능은 이름 검사가 아니라 명시적인 [`StageKind`] 태그로 식별합니다.
//!
//! # 생명주기
//! ```text
//! Created → start() → Started ⇄ stop()/start() ⇄ Stopped
//!    └──────────────┴──── terminate() ───────────┴──→ Terminated
//! ```
//!
//! `start`/`stop`은 멱등이며, 데이터 연산은 `Started` 상태에서만 허용됩니다.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;

use crate::chunk::{Chunk, FlushReport};
use crate::error::{LifecycleError, PluginError, SwakError};
use crate::event::{Event, EventStream, InputItem, Record};

/// 박싱된 Send future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 정규 플러그인 이름 접두어
pub const PREFIXES: &[&str] = &["in", "par", "tr", "buf", "out", "cmd"];

// ─── StageKind ───────────────────────────────────────────────────────

/// 스테이지 종류 태그
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// 원시 줄을 내보내는 입력
    TextInput,
    /// 레코드를 직접 내보내는 입력
    RecordInput,
    /// 원시 줄 → 레코드
    Parser,
    /// 수정자 또는 필터
    Transform,
    /// 청크 버퍼
    Buffer,
    /// 최종 출력
    Output,
    /// 데이터 흐름이 없는 단독 명령
    Command,
}

impl StageKind {
    /// 정규 이름 접두어를 반환합니다.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::TextInput | Self::RecordInput => "in",
            Self::Parser => "par",
            Self::Transform => "tr",
            Self::Buffer => "buf",
            Self::Output => "out",
            Self::Command => "cmd",
        }
    }

    pub fn is_input(self) -> bool {
        matches!(self, Self::TextInput | Self::RecordInput)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TextInput => write!(f, "in(text)"),
            Self::RecordInput => write!(f, "in(record)"),
            other => write!(f, "{}", other.prefix()),
        }
    }
}

/// 플러그인 이름(`in.counter`)에서 가능한 스테이지 종류를 찾습니다.
///
/// 입력 접두어는 텍스트/레코드 두 종류가 모두 후보가 됩니다.
pub fn kind_from_name(name: &str) -> Result<&'static [StageKind], PluginError> {
    let (prefix, base) = name.split_once('.').ok_or_else(|| PluginError::UnknownPrefix {
        name: name.to_owned(),
    })?;
    if base.is_empty() {
        return Err(PluginError::UnknownPrefix {
            name: name.to_owned(),
        });
    }
    let kinds: &'static [StageKind] = match prefix {
        "in" => &[StageKind::TextInput, StageKind::RecordInput],
        "par" => &[StageKind::Parser],
        "tr" => &[StageKind::Transform],
        "buf" => &[StageKind::Buffer],
        "out" => &[StageKind::Output],
        "cmd" => &[StageKind::Command],
        _ => {
            return Err(PluginError::UnknownPrefix {
                name: name.to_owned(),
            });
        }
    };
    Ok(kinds)
}

// ─── PluginState / Lifecycle ─────────────────────────────────────────

/// 플러그인 생명주기 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    Created,
    Started,
    Stopped,
    Terminated,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Started => write!(f, "started"),
            Self::Stopped => write!(f, "stopped"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// 모든 플러그인이 공유하는 생명주기 상태 기계
#[derive(Debug, Clone)]
pub struct Lifecycle {
    name: String,
    state: PluginState,
}

impl Lifecycle {
    /// `Created` 상태의 생명주기를 생성합니다.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: PluginState::Created,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    pub fn is_started(&self) -> bool {
        self.state == PluginState::Started
    }

    pub fn is_terminated(&self) -> bool {
        self.state == PluginState::Terminated
    }

    /// `Created`/`Stopped` → `Started`. 이미 시작된 경우 아무것도 하지 않습니다.
    ///
    /// 상태가 실제로 바뀌었으면 true를 반환합니다.
    pub fn start(&mut self) -> Result<bool, LifecycleError> {
        match self.state {
            PluginState::Started => Ok(false),
            PluginState::Created | PluginState::Stopped => {
                self.state = PluginState::Started;
                Ok(true)
            }
            PluginState::Terminated => Err(self.terminated("start")),
        }
    }

    /// `Started` → `Stopped`. `Created`/`Stopped`에서는 아무것도 하지 않습니다.
    pub fn stop(&mut self) -> Result<bool, LifecycleError> {
        match self.state {
            PluginState::Started => {
                self.state = PluginState::Stopped;
                Ok(true)
            }
            PluginState::Created | PluginState::Stopped => Ok(false),
            PluginState::Terminated => Err(self.terminated("stop")),
        }
    }

    /// 살아 있는 모든 상태 → `Terminated`. 되돌릴 수 없습니다.
    pub fn terminate(&mut self) -> Result<(), LifecycleError> {
        if self.is_terminated() {
            return Err(self.terminated("terminate"));
        }
        self.state = PluginState::Terminated;
        Ok(())
    }

    /// 데이터 연산 전에 `Started` 상태인지 확인합니다.
    pub fn ensure_active(&self, operation: &str) -> Result<(), LifecycleError> {
        match self.state {
            PluginState::Started => Ok(()),
            PluginState::Terminated => Err(self.terminated(operation)),
            state => Err(LifecycleError::NotStarted {
                stage: self.name.clone(),
                operation: operation.to_owned(),
                state,
            }),
        }
    }

    fn terminated(&self, operation: &str) -> LifecycleError {
        LifecycleError::Terminated {
            stage: self.name.clone(),
            operation: operation.to_owned(),
        }
    }
}

// ─── Plugin Trait ────────────────────────────────────────────────────

/// 모든 스테이지가 구현하는 기본 trait
///
/// 생명주기 훅은 기본적으로 [`Lifecycle`]에 위임합니다.
/// 자원을 가진 플러그인(타이머, 파일 핸들 등)은 훅을 재정의하고
/// 마지막에 생명주기를 전환합니다.
///
/// # 구현 예시
/// ```ignore
/// struct Upper {
///     lifecycle: Lifecycle,
/// }
///
/// impl Plugin for Upper {
///     fn kind(&self) -> StageKind { StageKind::Transform }
///     fn lifecycle(&self) -> &Lifecycle { &self.lifecycle }
///     fn lifecycle_mut(&mut self) -> &mut Lifecycle { &mut self.lifecycle }
/// }
/// ```
pub trait Plugin: Send {
    /// 스테이지 종류
    fn kind(&self) -> StageKind;

    fn lifecycle(&self) -> &Lifecycle;

    fn lifecycle_mut(&mut self) -> &mut Lifecycle;

    /// 정규 플러그인 이름
    fn name(&self) -> &str {
        self.lifecycle().name()
    }

    fn state(&self) -> PluginState {
        self.lifecycle().state()
    }

    /// 플러그인을 시작(또는 재개)합니다.
    fn start(&mut self) -> Result<(), SwakError> {
        self.lifecycle_mut().start()?;
        Ok(())
    }

    /// 플러그인을 일시 정지합니다.
    fn stop(&mut self) -> Result<(), SwakError> {
        self.lifecycle_mut().stop()?;
        Ok(())
    }

    /// 플러그인을 종료합니다. 이후 어떤 연산도 허용되지 않습니다.
    fn terminate(&mut self) -> Result<(), SwakError> {
        self.lifecycle_mut().terminate()?;
        Ok(())
    }
}

// ─── Capability Traits ───────────────────────────────────────────────

/// 외부 소스에서 이벤트를 생산하는 입력
pub trait Input: Plugin {
    /// 소스가 소진되거나 `cancel`이 발동할 때까지 항목을 `tx`로 보냅니다.
    ///
    /// 보낸 항목 수를 반환합니다. 수신 측이 닫히면 조용히 종료합니다.
    fn read(
        &mut self,
        tx: mpsc::Sender<InputItem>,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<u64, SwakError>>;
}

/// 원시 줄을 레코드로 변환하는 파서
pub trait Parser: Plugin {
    /// 한 줄을 파싱합니다. 실패는 해당 줄에만 영향을 줍니다.
    fn parse(&self, raw: &[u8]) -> Result<Record, SwakError>;

    /// 파싱된 레코드에서 이벤트 시각을 꺼냅니다. None이면 수신 시각을 씁니다.
    fn event_time(&self, _record: &Record) -> Option<f64> {
        None
    }
}

/// 변환 스테이지 변형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// 레코드를 바꾸어 전달
    Modifier,
    /// 조건에 맞으면 그대로 전달, 아니면 DROP
    Filter,
}

/// 수정자/필터 공통 계약
pub trait Transform: Plugin {
    fn transform_kind(&self) -> TransformKind;

    /// 새 태그의 스트림을 처리하기 전에 호출됩니다. 태그별 준비 작업에 사용합니다.
    fn prepare_for_stream(&mut self, _tag: &str) {}

    /// 이벤트를 처리합니다. `Ok(None)`은 DROP입니다.
    fn process(&mut self, tag: &str, event: Event) -> Result<Option<Event>, SwakError>;
}

/// 청크 버퍼
pub trait Buffer: Plugin {
    /// 스트림을 열린 청크에 추가합니다. 전역 한계를 넘으면 `BufferFullError`가 될 수 있습니다.
    fn append(&mut self, stream: EventStream) -> Result<(), SwakError>;

    /// 시간 기반 봉인을 검사합니다. 청크를 봉인했으면 true를 반환합니다.
    fn tick(&mut self) -> Result<bool, SwakError>;

    /// 봉인된 청크를 오래된 순서로 `deliver`에 넘깁니다.
    ///
    /// `force`이면 열린 청크를 먼저 봉인합니다. 전달에 성공한 청크만 제거됩니다.
    fn flush(
        &mut self,
        force: bool,
        deliver: &mut dyn FnMut(&Chunk) -> Result<(), SwakError>,
    ) -> Result<FlushReport, SwakError>;

    /// 버퍼에 남아 있는 레코드 수
    fn pending_records(&self) -> usize;

    /// flush 후보(봉인된) 청크 수
    fn sealed_count(&self) -> usize;

    /// 청크가 봉인될 때마다 신호를 받는 알림 핸들
    fn flush_notifier(&self) -> Option<Arc<Notify>> {
        None
    }
}

/// 레코드 단위 출력
pub trait RecordOutput: Plugin {
    fn process(&mut self, tag: &str, event: Event) -> Result<(), SwakError>;
}

/// 청크 단위 출력
pub trait ChunkOutput: Plugin {
    fn write(&mut self, chunk: &Chunk) -> Result<(), SwakError>;
}

/// 단독 명령
pub trait Command: Plugin {
    fn execute(&mut self) -> Result<(), SwakError>;
}

// ─── Stage ───────────────────────────────────────────────────────────

/// 출력 스테이지 전달 방식 (정확히 하나)
pub enum OutputStage {
    Record(Box<dyn RecordOutput>),
    Chunk(Box<dyn ChunkOutput>),
}

/// 해석된 스테이지 인스턴스
pub enum Stage {
    Input(Box<dyn Input>),
    Parser(Box<dyn Parser>),
    Transform(Box<dyn Transform>),
    Buffer(Box<dyn Buffer>),
    Output(OutputStage),
    Command(Box<dyn Command>),
}

macro_rules! each_stage {
    ($stage:expr, $p:ident => $body:expr) => {
        match $stage {
            Stage::Input($p) => $body,
            Stage::Parser($p) => $body,
            Stage::Transform($p) => $body,
            Stage::Buffer($p) => $body,
            Stage::Output(OutputStage::Record($p)) => $body,
            Stage::Output(OutputStage::Chunk($p)) => $body,
            Stage::Command($p) => $body,
        }
    };
}

impl Stage {
    /// 스테이지 종류. 입력은 플러그인이 보고한 텍스트/레코드 구분을 따릅니다.
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Input(p) => p.kind(),
            Self::Parser(_) => StageKind::Parser,
            Self::Transform(_) => StageKind::Transform,
            Self::Buffer(_) => StageKind::Buffer,
            Self::Output(_) => StageKind::Output,
            Self::Command(_) => StageKind::Command,
        }
    }

    pub fn name(&self) -> &str {
        each_stage!(self, p => p.name())
    }

    pub fn state(&self) -> PluginState {
        each_stage!(self, p => p.state())
    }

    pub fn start(&mut self) -> Result<(), SwakError> {
        each_stage!(self, p => p.start())
    }

    pub fn stop(&mut self) -> Result<(), SwakError> {
        each_stage!(self, p => p.stop())
    }

    pub fn terminate(&mut self) -> Result<(), SwakError> {
        each_stage!(self, p => p.terminate())
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("state", &self.state())
            .finish()
    }
}

/// 플러그인 이름과 인자 목록을 스테이지 인스턴스로 해석합니다.
pub trait StageResolver {
    fn resolve(&self, name: &str, args: &[String]) -> Result<Stage, SwakError>;
}

// ─── Tests ───────────────────────────────────────────────────────────
