//! 에러 타입 — 도메인별 에러 정의
//!
//! [`SwakError`]는 모든 도메인 에러를 감싸는 최상위 에러입니다.
//! 각 도메인 에러는 `#[from]` 변환이 구현되어 있어 `?` 연산자로 전파됩니다.
//!
//! # 분류
//! - 설정/형태 에러 ([`ConfigError`], [`PipelineShapeError`]): 시작 단계에서 치명적, 재시도하지 않음
//! - 생명주기 에러 ([`LifecycleError`]): 프로그래밍 오류
//! - 이벤트 단위 에러 ([`ParseError`]): 해당 이벤트만 건너뜀
//! - 역압 에러 ([`BufferFullError`]): 호출자가 재시도 또는 상위에서 드롭
//! - 전달 에러 ([`DeliveryError`]): 청크는 재시도를 위해 버퍼에 남음

use crate::plugin::{PluginState, StageKind};

/// Swak 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum SwakError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 생명주기 위반
    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// 파싱 에러
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// 버퍼 역압
    #[error("buffer full: {0}")]
    BufferFull(#[from] BufferFullError),

    /// 파이프라인 형태 검증 실패
    #[error("pipeline shape error: {0}")]
    Shape(#[from] PipelineShapeError),

    /// 출력 전달 실패
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// 플러그인 해석/인자 에러
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// 이벤트 스트림 구성 에러
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    /// 파이프라인 실행 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SwakError {
    /// 시작 단계에서 발생하면 파이프라인 기동을 중단해야 하는 에러인지 확인합니다.
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Shape(_) | Self::Plugin(_) | Self::Lifecycle(_)
        )
    }
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// 크기 문자열 파싱 실패
    #[error("invalid size for '{field}': '{value}': {reason}")]
    InvalidSize {
        field: String,
        value: String,
        reason: String,
    },

    /// 청크를 봉인할 수 있는 한계값이 없음
    #[error("missing chunk bound: {reason}")]
    MissingBound { reason: String },
}

/// 생명주기 상태 밖에서 호출된 연산
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// 시작되지 않았거나 일시 정지된 스테이지에 데이터 연산 호출
    #[error("stage '{stage}' cannot {operation} while {state}")]
    NotStarted {
        stage: String,
        operation: String,
        state: PluginState,
    },

    /// 종료된 스테이지에 연산 호출
    #[error("stage '{stage}' is terminated, cannot {operation}")]
    Terminated { stage: String, operation: String },
}

/// 한 줄 단위 파싱 에러 (스트림 전체에는 치명적이지 않음)
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// 형식이 잘못된 입력
    #[error("{format} at offset {offset}: {reason}")]
    Malformed {
        format: String,
        offset: usize,
        reason: String,
    },

    /// 입력이 허용 크기를 초과
    #[error("{format} input too large: {size} bytes (max: {max})")]
    InputTooLarge {
        format: String,
        size: usize,
        max: usize,
    },

    /// 패턴에 매칭되지 않는 입력
    #[error("{format}: line does not match pattern")]
    NoMatch { format: String },
}

/// 버퍼 전역 한계 초과 (거부 정책)
#[derive(Debug, thiserror::Error)]
#[error("{bound} limit {limit} exceeded (required {required})")]
pub struct BufferFullError {
    /// 초과된 한계 (`buffer_max_chunk` 또는 `buffer_max_size`)
    pub bound: String,
    /// 설정된 한계값
    pub limit: u64,
    /// append를 수용하려면 필요했던 값
    pub required: u64,
}

/// 파이프라인 형태 검증 실패
///
/// 문제가 된 위치와 충돌하는 인접 스테이지 종류를 함께 보고합니다.
#[derive(Debug, thiserror::Error)]
#[error("illegal stage at position {position} ({}): {reason}", adjacency(.previous, .current))]
pub struct PipelineShapeError {
    /// 문제가 된 스테이지 위치 (0부터 시작)
    pub position: usize,
    /// 바로 앞 스테이지 종류
    pub previous: Option<StageKind>,
    /// 문제가 된 스테이지 종류 (시퀀스 끝이면 None)
    pub current: Option<StageKind>,
    /// 위반 사유
    pub reason: String,
}

fn adjacency(previous: &Option<StageKind>, current: &Option<StageKind>) -> String {
    let show = |k: &Option<StageKind>| k.map_or_else(|| "<none>".to_owned(), |k| k.to_string());
    format!("{} -> {}", show(previous), show(current))
}

/// 출력 스테이지가 청크/레코드를 수용하지 못함
#[derive(Debug, thiserror::Error)]
#[error("stage '{stage}' failed to deliver: {reason}")]
pub struct DeliveryError {
    /// 출력 스테이지 이름
    pub stage: String,
    /// 실패 사유
    pub reason: String,
}

/// 플러그인 해석/인자 에러
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// 이미 등록된 플러그인
    #[error("plugin already registered: {name}")]
    AlreadyRegistered { name: String },

    /// 플러그인을 찾을 수 없음
    #[error("plugin not found: {name}")]
    NotFound { name: String },

    /// 플러그인 인자가 잘못됨
    #[error("invalid arguments for '{name}': {reason}")]
    InvalidArgs { name: String, reason: String },

    /// 알 수 없는 종류 접두어
    #[error("unknown stage kind prefix in '{name}'")]
    UnknownPrefix { name: String },
}

/// 이벤트 스트림 구성 에러
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// 타임스탬프와 레코드 길이 불일치
    #[error("length mismatch: {times} timestamps, {records} records")]
    LengthMismatch { times: usize, records: usize },
}

/// 파이프라인 실행 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널이 닫힘
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// 백그라운드 태스크 실패
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// 검증되지 않은 시퀀스로 실행 시도
    #[error("stage sequence has not been validated")]
    NotValidated,

    /// 이미 실행 중
    #[error("pipeline is already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline is not running")]
    NotRunning,
}
