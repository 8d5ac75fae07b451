//! 정규식 파서 -- 이름 있는 캡처 그룹을 레코드 필드로 변환
//!
//! 패턴은 생성 시 한 번만 컴파일합니다. 이름 있는 캡처 그룹이 최소 하나 필요합니다.
//! 매칭에 참여하지 않은 선택적 그룹은 레코드에 넣지 않습니다.

use clap::Parser as ClapParser;
use regex::Regex;
use serde_json::Value;

use swak_core::error::{ParseError, PluginError, SwakError};
use swak_core::event::Record;
use swak_core::plugin::{Lifecycle, Parser, Plugin, StageKind};

use crate::registry::parse_args;

const FORMAT: &str = "regex";

/// `par.regex` 인자
#[derive(Debug, Clone, ClapParser)]
#[command(name = "par.regex", about = "Parse lines with a regex of named groups.")]
pub struct RegexParserArgs {
    /// 이름 있는 캡처 그룹을 가진 정규식
    #[arg(long)]
    pub pattern: String,
}

/// 정규식 줄 파서
#[derive(Debug)]
pub struct RegexParser {
    lifecycle: Lifecycle,
    regex: Regex,
    names: Vec<String>,
}

impl RegexParser {
    pub const NAME: &'static str = "par.regex";

    pub fn new(pattern: &str) -> Result<Self, PluginError> {
        let regex = Regex::new(pattern).map_err(|e| PluginError::InvalidArgs {
            name: Self::NAME.to_owned(),
            reason: format!("invalid pattern: {e}"),
        })?;
        let names: Vec<String> = regex.capture_names().flatten().map(str::to_owned).collect();
        if names.is_empty() {
            return Err(PluginError::InvalidArgs {
                name: Self::NAME.to_owned(),
                reason: "pattern needs at least one named group, e.g. (?P<msg>.*)".to_owned(),
            });
        }
        Ok(Self {
            lifecycle: Lifecycle::new(Self::NAME),
            regex,
            names,
        })
    }

    pub fn from_args(args: &[String]) -> Result<Self, SwakError> {
        let args: RegexParserArgs = parse_args(Self::NAME, args)?;
        Ok(Self::new(&args.pattern)?)
    }

    /// 캡처 그룹 이름 목록
    pub fn field_names(&self) -> &[String] {
        &self.names
    }

    fn parse_line(&self, raw: &[u8]) -> Result<Record, ParseError> {
        let line = std::str::from_utf8(raw).map_err(|e| ParseError::Malformed {
            format: FORMAT.to_owned(),
            offset: e.valid_up_to(),
            reason: "invalid UTF-8".to_owned(),
        })?;
        let captures = self.regex.captures(line).ok_or_else(|| ParseError::NoMatch {
            format: FORMAT.to_owned(),
        })?;

        let record = self
            .names
            .iter()
            .filter_map(|name| {
                captures
                    .name(name)
                    .map(|m| (name.clone(), Value::String(m.as_str().to_owned())))
            })
            .collect();
        Ok(record)
    }
}

impl Plugin for RegexParser {
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

impl Parser for RegexParser {
    fn parse(&self, raw: &[u8]) -> Result<Record, SwakError> {
        self.lifecycle.ensure_active("parse")?;
        Ok(self.parse_line(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn started(pattern: &str) -> RegexParser {
        let mut parser = RegexParser::new(pattern).unwrap();
        parser.start().unwrap();
        parser
    }

    #[test]
    fn named_groups_become_fields() {
        let parser = started(r"^(?P<level>\w+) (?P<msg>.*)$");
        let record = parser.parse(b"WARN disk almost full").unwrap();
        assert_eq!(record["level"], json!("WARN"));
        assert_eq!(record["msg"], json!("disk almost full"));
        assert_eq!(parser.field_names(), ["level", "msg"]);
    }

    #[test]
    fn optional_group_omitted_when_absent() {
        let parser = started(r"^(?P<a>\d+)(?:-(?P<b>\d+))?$");
        let record = parser.parse(b"42").unwrap();
        assert_eq!(record.len(), 1);
        assert!(!record.contains_key("b"));
    }

    #[test]
    fn non_matching_line_is_no_match() {
        let parser = started(r"^(?P<n>\d+)$");
        let err = parser.parse(b"abc").unwrap_err();
        assert!(matches!(err, SwakError::Parse(ParseError::NoMatch { .. })));
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let parser = started(r"(?P<all>.*)");
        let err = parser.parse(&[b'o', b'k', 0xff]).unwrap_err();
        assert!(matches!(
            err,
            SwakError::Parse(ParseError::Malformed { offset: 2, .. })
        ));
    }

    #[test]
    fn rejects_bad_patterns() {
        assert!(matches!(
            RegexParser::new("(unclosed"),
            Err(PluginError::InvalidArgs { .. })
        ));
        assert!(matches!(
            RegexParser::new(r"\d+"),
            Err(PluginError::InvalidArgs { .. })
        ));
    }

    #[test]
    fn from_args_requires_pattern() {
        assert!(RegexParser::from_args(&[]).is_err());
        let args = vec!["--pattern".to_owned(), "(?P<x>.)".to_owned()];
        assert!(RegexParser::from_args(&args).is_ok());
    }
}
