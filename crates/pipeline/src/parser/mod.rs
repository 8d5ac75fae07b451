//! 파서 플러그인 -- 원시 줄을 레코드로 변환
//!
//! 각 파서는 core의 [`Parser`](swak_core::plugin::Parser) trait을 구현합니다.
//! 파싱 실패는 해당 줄에만 영향을 주며, 실행기는 실패를 기록하고 다음 줄로 넘어갑니다.
//!
//! # 지원 형식
//! - 구조화 JSON ([`JsonParser`], `par.json`)
//! - 이름 있는 캡처 그룹 정규식 ([`RegexParser`], `par.regex`)

pub mod json;
pub mod regex;

pub use json::{JsonParser, JsonParserArgs};
pub use self::regex::{RegexParser, RegexParserArgs};
