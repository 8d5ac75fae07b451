//! JSON 파서 -- 한 줄의 JSON 객체를 레코드로 변환
//!
//! 최상위 값은 객체여야 합니다. 객체의 필드는 그대로 레코드가 됩니다.
//!
//! # 이벤트 시각
//! `--time-key`를 지정하면 해당 필드에서 시각을 꺼냅니다. 필드는 레코드에 남습니다.
//! - RFC 3339 (ISO 8601): `2024-01-15T12:00:00Z`
//! - Unix timestamp 숫자 또는 숫자 문자열 (초, 13자리 이상이면 밀리초)
//!
//! # 사용 예시
//! ```ignore
//! let parser = JsonParser::from_args(&["--time-key".into(), "ts".into()])?;
//! let record = parser.parse(br#"{"ts":"2024-01-15T12:00:00Z","msg":"hi"}"#)?;
//! assert_eq!(parser.event_time(&record), Some(1705320000.0));
//! ```

use chrono::DateTime;
use clap::Parser as ClapParser;
use serde_json::Value;

use swak_core::error::{ParseError, SwakError};
use swak_core::event::Record;
use swak_core::plugin::{Lifecycle, Parser, Plugin, StageKind};

use crate::registry::parse_args;

const FORMAT: &str = "json";

/// 기본 최대 입력 크기 (1MB)
pub const DEFAULT_MAX_INPUT_SIZE: usize = 1024 * 1024;

/// 이 값보다 크면 밀리초로 간주
const MILLIS_THRESHOLD: f64 = 9_999_999_999.0;

/// `par.json` 인자
#[derive(Debug, Clone, ClapParser)]
#[command(name = "par.json", about = "Parse each line as a JSON object.")]
pub struct JsonParserArgs {
    /// 이벤트 시각을 담은 필드
    #[arg(long = "time-key")]
    pub time_key: Option<String>,

    /// 최대 입력 크기 (바이트)
    #[arg(long = "max-input-size", default_value_t = DEFAULT_MAX_INPUT_SIZE)]
    pub max_input_size: usize,
}

/// JSON 줄 파서
#[derive(Debug)]
pub struct JsonParser {
    lifecycle: Lifecycle,
    time_key: Option<String>,
    max_input_size: usize,
}

impl JsonParser {
    pub const NAME: &'static str = "par.json";

    pub fn new(args: JsonParserArgs) -> Self {
        Self {
            lifecycle: Lifecycle::new(Self::NAME),
            time_key: args.time_key,
            max_input_size: args.max_input_size,
        }
    }

    pub fn from_args(args: &[String]) -> Result<Self, SwakError> {
        Ok(Self::new(parse_args(Self::NAME, args)?))
    }

    /// 최대 입력 크기를 설정합니다.
    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = size;
        self
    }

    fn parse_json(&self, raw: &[u8]) -> Result<Record, ParseError> {
        if raw.len() > self.max_input_size {
            return Err(ParseError::InputTooLarge {
                format: FORMAT.to_owned(),
                size: raw.len(),
                max: self.max_input_size,
            });
        }

        let value: Value = serde_json::from_slice(raw).map_err(|e| ParseError::Malformed {
            format: FORMAT.to_owned(),
            offset: e.column(),
            reason: e.to_string(),
        })?;

        let Value::Object(record) = value else {
            return Err(ParseError::Malformed {
                format: FORMAT.to_owned(),
                offset: 0,
                reason: "expected JSON object at top level".to_owned(),
            });
        };

        if let Some(key) = &self.time_key {
            if let Some(value) = record.get(key) {
                if parse_timestamp(value).is_none() {
                    return Err(ParseError::Malformed {
                        format: FORMAT.to_owned(),
                        offset: 0,
                        reason: format!("invalid timestamp in '{key}': {value}"),
                    });
                }
            }
        }
        Ok(record)
    }
}

/// 타임스탬프 값을 epoch 초로 변환합니다.
fn parse_timestamp(value: &Value) -> Option<f64> {
    let secs = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => match DateTime::parse_from_rfc3339(s) {
            Ok(dt) => return Some(dt.timestamp_micros() as f64 / 1_000_000.0),
            Err(_) => s.trim().parse::<f64>().ok()?,
        },
        _ => return None,
    };
    if !secs.is_finite() {
        return None;
    }
    Some(if secs > MILLIS_THRESHOLD {
        secs / 1000.0
    } else {
        secs
    })
}

impl Default for JsonParser {
    fn default() -> Self {
        Self::new(JsonParserArgs {
            time_key: None,
            max_input_size: DEFAULT_MAX_INPUT_SIZE,
        })
    }
}

impl Plugin for JsonParser {
    fn kind(&self) -> StageKind {
        StageKind::Parser
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }
}

impl Parser for JsonParser {
    fn parse(&self, raw: &[u8]) -> Result<Record, SwakError> {
        self.lifecycle.ensure_active("parse")?;
        Ok(self.parse_json(raw)?)
    }

    fn event_time(&self, record: &Record) -> Option<f64> {
        let key = self.time_key.as_ref()?;
        parse_timestamp(record.get(key)?)
    }
}
