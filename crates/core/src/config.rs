//! 설정 관리 — swak.toml 파싱 및 런타임 설정
//!
//! [`SwakConfig`]는 로깅, 파이프라인 실행, 버퍼 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`SWAK_BUFFER_CHUNK_MAX_RECORD=100` 형식)
//! 3. 설정 파일 (`swak.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 크기 문자열
//! 크기 옵션은 TOML 정수(바이트) 또는 `<정수>(b|k|m|g)` 문자열을 받습니다.
//! 단위는 대소문자를 구분하지 않으며 1024 배수입니다.
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), swak_core::error::SwakError> {
//! use swak_core::config::SwakConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = SwakConfig::load("swak.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = SwakConfig::parse("[buffer]\nchunk_max_record = 3")?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, SwakError};

/// 허용되는 로그 레벨
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// 허용되는 로그 형식
pub const LOG_FORMATS: &[&str] = &["json", "pretty"];

/// 채널 용량 상한
pub const MAX_CHANNEL_CAPACITY: usize = 1_000_000;

/// Swak 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwakConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 파이프라인 실행 설정
    #[serde(default)]
    pub pipeline: PipelineSection,
    /// 버퍼 설정
    #[serde(default)]
    pub buffer: BufferSection,
}

impl SwakConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SwakError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, SwakError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SwakError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                SwakError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, SwakError> {
        toml::from_str(toml_str).map_err(|e| {
            SwakError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `SWAK_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "SWAK_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "SWAK_GENERAL_LOG_FORMAT");

        // Pipeline
        override_string(&mut self.pipeline.tag, "SWAK_PIPELINE_TAG");
        override_usize(
            &mut self.pipeline.channel_capacity,
            "SWAK_PIPELINE_CHANNEL_CAPACITY",
        );
        override_u64(
            &mut self.pipeline.tick_interval_ms,
            "SWAK_PIPELINE_TICK_INTERVAL_MS",
        );

        // Buffer
        override_size(
            &mut self.buffer.chunk_max_size,
            "SWAK_BUFFER_CHUNK_MAX_SIZE",
        );
        override_opt_u64(
            &mut self.buffer.chunk_max_record,
            "SWAK_BUFFER_CHUNK_MAX_RECORD",
        );
        override_opt_u64(
            &mut self.buffer.buffer_max_chunk,
            "SWAK_BUFFER_BUFFER_MAX_CHUNK",
        );
        override_size(
            &mut self.buffer.buffer_max_size,
            "SWAK_BUFFER_BUFFER_MAX_SIZE",
        );
        override_opt_f64(
            &mut self.buffer.flush_interval,
            "SWAK_BUFFER_FLUSH_INTERVAL",
        );
        override_bool(&mut self.buffer.standalone, "SWAK_BUFFER_STANDALONE");
        override_parsed(&mut self.buffer.overflow, "SWAK_BUFFER_OVERFLOW");
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// 버퍼 한계 조합 검증은 버퍼를 구성할 때 수행하며,
    /// 여기서는 크기 문자열이 해석 가능한지만 확인합니다.
    pub fn validate(&self) -> Result<(), SwakError> {
        self.general.validate()?;
        self.pipeline.validate()?;
        self.buffer.validate_sizes()?;
        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

impl GeneralConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of {LOG_LEVELS:?}"),
            });
        }
        if !LOG_FORMATS.contains(&self.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of {LOG_FORMATS:?}"),
            });
        }
        Ok(())
    }
}

/// 파이프라인 실행 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// 입력 이벤트에 붙일 태그
    pub tag: String,
    /// 입력 → 소비자 채널 용량
    pub channel_capacity: usize,
    /// 버퍼 tick/flush 주기 (밀리초)
    pub tick_interval_ms: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            tag: "swak.test".to_owned(),
            channel_capacity: 1024,
            tick_interval_ms: 200,
        }
    }
}

impl PipelineSection {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.tag.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.tag".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        if self.channel_capacity == 0 || self.channel_capacity > MAX_CHANNEL_CAPACITY {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.channel_capacity".to_owned(),
                reason: format!("must be between 1 and {MAX_CHANNEL_CAPACITY}"),
            });
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.tick_interval_ms".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        Ok(())
    }
}

/// 버퍼 전역 한계 초과 시 동작
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// append 전체를 거부하고 `BufferFullError`를 반환
    #[default]
    Reject,
    /// 가장 오래된 봉인 청크를 버리고 공간 확보
    EvictOldest,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reject => write!(f, "reject"),
            Self::EvictOldest => write!(f, "evict_oldest"),
        }
    }
}

impl FromStr for OverflowPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "evict_oldest" | "evict-oldest" => Ok(Self::EvictOldest),
            other => Err(ConfigError::InvalidValue {
                field: "buffer.overflow".to_owned(),
                reason: format!("unknown policy '{other}', expected reject or evict_oldest"),
            }),
        }
    }
}

/// 버퍼 설정 원본
///
/// 값은 해석 전 형태로 보관합니다. 한계 조합 검증과 바이트 변환은
/// 버퍼 구성 시점에 필드 이름과 함께 수행됩니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferSection {
    /// 청크 최대 크기
    pub chunk_max_size: Option<SizeValue>,
    /// 청크 최대 레코드 수
    pub chunk_max_record: Option<u64>,
    /// 버퍼 최대 청크 수
    pub buffer_max_chunk: Option<u64>,
    /// 버퍼 최대 크기
    pub buffer_max_size: Option<SizeValue>,
    /// 시간 기반 봉인 주기 (초)
    pub flush_interval: Option<f64>,
    /// 버퍼가 자체 타이머를 소유하는지 여부
    pub standalone: bool,
    /// 전역 한계 초과 정책
    pub overflow: OverflowPolicy,
}

impl BufferSection {
    fn validate_sizes(&self) -> Result<(), ConfigError> {
        if let Some(v) = &self.chunk_max_size {
            v.resolve("buffer.chunk_max_size")?;
        }
        if let Some(v) = &self.buffer_max_size {
            v.resolve("buffer.buffer_max_size")?;
        }
        Ok(())
    }
}

// ─── Size values ─────────────────────────────────────────────────────

/// 설정 파일의 크기 값 (정수 바이트 또는 크기 문자열)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizeValue {
    Bytes(u64),
    Text(String),
}

impl SizeValue {
    /// 바이트 수로 해석합니다. 실패하면 필드 이름을 담은 `InvalidSize`를 반환합니다.
    pub fn resolve(&self, field: &str) -> Result<u64, ConfigError> {
        match self {
            Self::Bytes(n) => Ok(*n),
            Self::Text(s) => parse_size(field, s),
        }
    }
}

impl From<&str> for SizeValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<u64> for SizeValue {
    fn from(n: u64) -> Self {
        Self::Bytes(n)
    }
}

/// 바이트 크기
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl FromStr for ByteSize {
    type Err = String;

    /// `<정수>(b|k|m|g)` 형식을 해석합니다.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let unit = s
            .chars()
            .last()
            .ok_or_else(|| "empty size string".to_owned())?;
        let multiplier: u64 = match unit.to_ascii_lowercase() {
            'b' => 1,
            'k' => 1024,
            'm' => 1024 * 1024,
            'g' => 1024 * 1024 * 1024,
            c if c.is_ascii_digit() => {
                return Err("missing unit, expected one of b, k, m, g".to_owned());
            }
            c => return Err(format!("unknown unit '{c}', expected one of b, k, m, g")),
        };
        let digits = &s[..s.len() - unit.len_utf8()];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("'{digits}' is not a non-negative integer"));
        }
        let number: u64 = digits
            .parse()
            .map_err(|_| format!("'{digits}' is out of range"))?;
        number
            .checked_mul(multiplier)
            .map(ByteSize)
            .ok_or_else(|| "size overflows 64 bits".to_owned())
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [(u64, &str); 3] = [(1024 * 1024 * 1024, "g"), (1024 * 1024, "m"), (1024, "k")];
        for (mult, unit) in UNITS {
            if self.0 >= mult && self.0 % mult == 0 {
                return write!(f, "{}{unit}", self.0 / mult);
            }
        }
        write!(f, "{}b", self.0)
    }
}

/// 크기 문자열을 바이트 수로 해석합니다.
pub fn parse_size(field: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse::<ByteSize>()
        .map(ByteSize::as_u64)
        .map_err(|reason| ConfigError::InvalidSize {
            field: field.to_owned(),
            value: value.to_owned(),
            reason,
        })
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_opt_u64(target: &mut Option<u64>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = Some(parsed),
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_opt_f64(target: &mut Option<f64>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<f64>() {
            Ok(parsed) => *target = Some(parsed),
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse f64 from env var, ignoring"
            ),
        }
    }
}

fn override_size(target: &mut Option<SizeValue>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        // 단위 없는 정수는 바이트로 취급
        *target = Some(match val.trim().parse::<u64>() {
            Ok(n) => SizeValue::Bytes(n),
            Err(_) => SizeValue::Text(val),
        });
    }
}

fn override_parsed<T: FromStr>(target: &mut T, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse value from env var, ignoring"
            ),
        }
    }
}
