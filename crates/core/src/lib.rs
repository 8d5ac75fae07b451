#![doc = include_str!("../README.md")]

pub mod chunk;
pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod plugin;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{
    BufferFullError, ConfigError, DeliveryError, LifecycleError, ParseError, PipelineError,
    PipelineShapeError, PluginError, StreamError, SwakError,
};

// 설정
pub use config::{ByteSize, OverflowPolicy, SizeValue, SwakConfig};

// 데이터 모델
pub use chunk::{Chunk, FlushReport, SealReason};
pub use event::{Event, EventStream, InputItem, MultiEventStream, OneEventStream, Record};

// 스테이지 계약
pub use plugin::{
    BoxFuture, Buffer, ChunkOutput, Command, Input, Lifecycle, OutputStage, Parser, Plugin,
    PluginState, RecordOutput, Stage, StageKind, StageResolver, Transform, TransformKind,
};
