#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`config`]: 버퍼 설정 해석과 경계 검증
//! - [`buffer`]: 크기/레코드 수 기준 청크 버퍼 (`buf.memory`)
//! - [`router`]: 태그 패턴 규칙 체인과 싱크
//! - [`assembler`]: 명령 문자열 분해, 스테이지 조립, 형태 검증
//! - [`registry`]: 플러그인 이름 → 생성자 레지스트리
//! - [`runner`]: 검증된 파이프라인 실행기
//! - [`input`], [`parser`], [`transform`], [`output`], [`command`]: 표준 플러그인
//!
//! # 아키텍처
//!
//! ```text
//! Input ──> Parser ──> EventRouter(Transform...) ──> Buffer ──> Output
//!  |          |              |                         |          |
//! counter   json/regex   reform/filter             청크 봉인   stdout/file/memory
//! ```

pub mod assembler;
pub mod buffer;
pub mod config;
pub mod registry;
pub mod router;
pub mod runner;

pub mod command;
pub mod input;
pub mod output;
pub mod parser;
pub mod transform;

// --- 주요 타입 re-export ---

// 조립/실행
pub use assembler::{StageSequence, StageToken, assemble, build_pipeline, parse_command};
pub use runner::{PipelineRunner, PipelineSettings, RunReport};

// 레지스트리
pub use registry::{PluginInfo, PluginRegistry};

// 버퍼
pub use buffer::{BufferArgs, SizedBuffer};
pub use config::{BufferConfig, BufferConfigBuilder};

// 라우터
pub use router::{EventRouter, EventSink, Routed, TagPattern};
