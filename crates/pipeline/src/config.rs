//! 버퍼 설정
//!
//! [`BufferConfig`]는 core의 [`BufferSection`](swak_core::config::BufferSection)을
//! 해석하고 검증한 결과입니다. 크기 문자열은 바이트로, `flush_interval`은
//! [`Duration`]으로 변환됩니다.
//!
//! # 허용 조합
//!
//! | chunk_max_record | chunk_max_size | buffer_max_* | 결과 |
//! |---|---|---|---|
//! | 설정 (>0) | 무관 | 유효한 값 | 허용 |
//! | 미설정 | 설정 | 무관 | `MissingBound` |
//! | 미설정 | 미설정 | 설정 | `MissingBound` |
//! | 미설정 | 미설정 | 미설정 | `MissingBound` |
//! | 0 | - | - | `InvalidValue` |
//!
//! # 사용 예시
//! ```ignore
//! use swak_pipeline::config::BufferConfigBuilder;
//!
//! let config = BufferConfigBuilder::new()
//!     .chunk_max_record(3)
//!     .chunk_max_size("10k")
//!     .build()?;
//! ```

use std::time::Duration;

use serde::Serialize;
use swak_core::config::{BufferSection, OverflowPolicy, SizeValue};
use swak_core::error::ConfigError;

/// 검증된 버퍼 설정
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferConfig {
    /// 청크 최대 바이트
    pub chunk_max_size: Option<u64>,
    /// 청크 최대 레코드 수 (항상 설정됨)
    pub chunk_max_record: u64,
    /// 버퍼 최대 청크 수
    pub buffer_max_chunk: Option<u64>,
    /// 버퍼 최대 바이트
    pub buffer_max_size: Option<u64>,
    /// 시간 기반 봉인 주기
    pub flush_interval: Option<Duration>,
    /// 자체 타이머 사용 여부
    pub standalone: bool,
    /// 전역 한계 초과 정책
    pub overflow: OverflowPolicy,
}

impl BufferConfig {
    /// core 설정 섹션에서 버퍼 설정을 생성합니다.
    pub fn from_section(section: &BufferSection) -> Result<Self, ConfigError> {
        BufferConfigBuilder::from_section(section).build()
    }

    /// 레코드 수만 제한하는 최소 설정
    pub fn with_record_limit(chunk_max_record: u64) -> Result<Self, ConfigError> {
        BufferConfigBuilder::new()
            .chunk_max_record(chunk_max_record)
            .build()
    }
}

/// 버퍼 설정 빌더
///
/// 값은 원본 형태로 모아 두었다가 `build()`에서 한 번에 해석/검증합니다.
#[derive(Debug, Clone, Default)]
pub struct BufferConfigBuilder {
    section: BufferSection,
}

impl BufferConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// core 설정 섹션 값으로 시작하는 빌더를 생성합니다.
    pub fn from_section(section: &BufferSection) -> Self {
        Self {
            section: section.clone(),
        }
    }

    /// 청크 최대 크기를 설정합니다 (`"10k"` 또는 바이트 정수).
    pub fn chunk_max_size(mut self, size: impl Into<SizeValue>) -> Self {
        self.section.chunk_max_size = Some(size.into());
        self
    }

    /// 청크 최대 레코드 수를 설정합니다.
    pub fn chunk_max_record(mut self, count: u64) -> Self {
        self.section.chunk_max_record = Some(count);
        self
    }

    /// 버퍼 최대 청크 수를 설정합니다.
    pub fn buffer_max_chunk(mut self, count: u64) -> Self {
        self.section.buffer_max_chunk = Some(count);
        self
    }

    /// 버퍼 최대 크기를 설정합니다.
    pub fn buffer_max_size(mut self, size: impl Into<SizeValue>) -> Self {
        self.section.buffer_max_size = Some(size.into());
        self
    }

    /// 시간 기반 봉인 주기(초)를 설정합니다.
    pub fn flush_interval(mut self, secs: f64) -> Self {
        self.section.flush_interval = Some(secs);
        self
    }

    /// 자체 타이머 사용 여부를 설정합니다.
    pub fn standalone(mut self, standalone: bool) -> Self {
        self.section.standalone = standalone;
        self
    }

    /// 오버플로 정책을 설정합니다.
    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.section.overflow = policy;
        self
    }

    /// 설정을 해석/검증하고 `BufferConfig`를 생성합니다.
    pub fn build(self) -> Result<BufferConfig, ConfigError> {
        let s = self.section;

        let chunk_max_size = s
            .chunk_max_size
            .as_ref()
            .map(|v| v.resolve("chunk_max_size"))
            .transpose()?;
        let buffer_max_size = s
            .buffer_max_size
            .as_ref()
            .map(|v| v.resolve("buffer_max_size"))
            .transpose()?;

        for (field, value) in [
            ("chunk_max_size", chunk_max_size),
            ("chunk_max_record", s.chunk_max_record),
            ("buffer_max_chunk", s.buffer_max_chunk),
            ("buffer_max_size", buffer_max_size),
        ] {
            if value == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_owned(),
                    reason: "must be greater than 0".to_owned(),
                });
            }
        }

        let chunk_max_record = s.chunk_max_record.ok_or_else(|| ConfigError::MissingBound {
            reason: match (chunk_max_size, s.buffer_max_chunk.or(buffer_max_size)) {
                (Some(_), _) => "chunk_max_record is required, chunk_max_size alone is not accepted",
                (None, Some(_)) => "chunk_max_record is required, buffer-level bounds do not seal chunks",
                (None, None) => "chunk_max_record is required",
            }
            .to_owned(),
        })?;

        if let (Some(chunk), Some(buffer)) = (chunk_max_size, buffer_max_size) {
            if buffer < chunk {
                return Err(ConfigError::InvalidValue {
                    field: "buffer_max_size".to_owned(),
                    reason: format!("{buffer} bytes is smaller than chunk_max_size ({chunk} bytes)"),
                });
            }
        }

        let flush_interval = match s.flush_interval {
            Some(secs) if !secs.is_finite() || secs <= 0.0 => {
                return Err(ConfigError::InvalidValue {
                    field: "flush_interval".to_owned(),
                    reason: format!("must be a positive number of seconds, got {secs}"),
                });
            }
            Some(secs) => Some(Duration::from_secs_f64(secs)),
            None => None,
        };

        if s.standalone && flush_interval.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "standalone".to_owned(),
                reason: "standalone mode requires flush_interval".to_owned(),
            });
        }

        Ok(BufferConfig {
            chunk_max_size,
            chunk_max_record,
            buffer_max_chunk: s.buffer_max_chunk,
            buffer_max_size,
            flush_interval,
            standalone: s.standalone,
            overflow: s.overflow,
        })
    }
}
