//! 레코드 필터 (`tr.filter`)
//!
//! 모든 조건을 만족하는 레코드만 통과시키고 나머지는 DROP합니다.
//! `--invert`는 전체 조건을 뒤집습니다. 조건에 쓰인 키가 없는 레코드는
//! `--invert` 여부와 관계없이 DROP합니다.

use clap::{ArgAction, Parser as ClapParser};
use regex::Regex;
use serde_json::Value;

use swak_core::error::{PluginError, SwakError};
use swak_core::event::{Event, Record};
use swak_core::plugin::{Lifecycle, Plugin, StageKind, Transform, TransformKind};

use crate::registry::parse_args;

/// `tr.filter` 인자
#[derive(Debug, Clone, Default, ClapParser)]
#[command(name = "tr.filter", about = "Pass or drop records by field value.")]
pub struct FilterArgs {
    /// 필드 값이 정확히 일치해야 함
    #[arg(long = "match", num_args = 2, value_names = ["KEY", "VALUE"], action = ArgAction::Append)]
    pub matches: Vec<String>,

    /// 필드 값이 정규식에 매칭되어야 함
    #[arg(long = "regex", num_args = 2, value_names = ["KEY", "PATTERN"], action = ArgAction::Append)]
    pub regexes: Vec<String>,

    /// 조건을 뒤집음
    #[arg(long)]
    pub invert: bool,
}

/// 필드 조건
#[derive(Debug, Clone)]
pub enum Condition {
    Equals { key: String, value: String },
    Matches { key: String, regex: Regex },
}

impl Condition {
    fn key(&self) -> &str {
        match self {
            Self::Equals { key, .. } | Self::Matches { key, .. } => key,
        }
    }

    /// 레코드에 키가 없으면 None
    fn evaluate(&self, record: &Record) -> Option<bool> {
        let value = render(record.get(self.key())?);
        Some(match self {
            Self::Equals { value: expected, .. } => value == *expected,
            Self::Matches { regex, .. } => regex.is_match(&value),
        })
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 조건 필터
#[derive(Debug)]
pub struct Filter {
    lifecycle: Lifecycle,
    conditions: Vec<Condition>,
    invert: bool,
}

impl Filter {
    pub const NAME: &'static str = "tr.filter";

    pub fn new(conditions: Vec<Condition>, invert: bool) -> Result<Self, PluginError> {
        if conditions.is_empty() {
            return Err(invalid("at least one --match or --regex is required"));
        }
        Ok(Self {
            lifecycle: Lifecycle::new(Self::NAME),
            conditions,
            invert,
        })
    }

    pub fn from_args(args: &[String]) -> Result<Self, SwakError> {
        let args: FilterArgs = parse_args(Self::NAME, args)?;
        let mut conditions = Vec::new();
        for pair in args.matches.chunks(2) {
            let [key, value] = pair else {
                return Err(invalid("--match takes a KEY and a VALUE").into());
            };
            conditions.push(Condition::Equals {
                key: key.clone(),
                value: value.clone(),
            });
        }
        for pair in args.regexes.chunks(2) {
            let [key, pattern] = pair else {
                return Err(invalid("--regex takes a KEY and a PATTERN").into());
            };
            let regex = Regex::new(pattern)
                .map_err(|e| invalid(&format!("invalid pattern for '{key}': {e}")))?;
            conditions.push(Condition::Matches {
                key: key.clone(),
                regex,
            });
        }
        Ok(Self::new(conditions, args.invert)?)
    }

    /// 레코드가 통과하는지 판정합니다.
    pub fn accepts(&self, record: &Record) -> bool {
        let mut all = true;
        for condition in &self.conditions {
            match condition.evaluate(record) {
                None => return false,
                Some(hit) => all &= hit,
            }
        }
        all != self.invert
    }
}

fn invalid(reason: &str) -> PluginError {
    PluginError::InvalidArgs {
        name: Filter::NAME.to_owned(),
        reason: reason.to_owned(),
    }
}

impl Plugin for Filter {
    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }
}

impl Transform for Filter {
    fn transform_kind(&self) -> TransformKind {
        TransformKind::Filter
    }

    fn process(&mut self, _tag: &str, event: Event) -> Result<Option<Event>, SwakError> {
        self.lifecycle.ensure_active("process")?;
        Ok(self.accepts(&event.record).then_some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter(args: &[&str]) -> Filter {
        let args: Vec<String> = args.iter().map(|s| (*s).to_owned()).collect();
        let mut filter = Filter::from_args(&args).unwrap();
        filter.start().unwrap();
        filter
    }

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn requires_a_condition() {
        assert!(Filter::from_args(&[]).is_err());
        assert!(Filter::from_args(&["--invert".to_owned()]).is_err());
    }

    #[test]
    fn exact_match_passes_or_drops() {
        let mut f = filter(&["--match", "level", "error"]);
        assert_eq!(f.transform_kind(), TransformKind::Filter);

        let hit = Event::new(1.0, record(&[("level", json!("error"))]));
        let miss = Event::new(1.0, record(&[("level", json!("info"))]));
        assert!(f.process("app", hit).unwrap().is_some());
        assert!(f.process("app", miss).unwrap().is_none());
    }

    #[test]
    fn non_string_values_compare_rendered() {
        let f = filter(&["--match", "status", "500"]);
        assert!(f.accepts(&record(&[("status", json!(500))])));
        assert!(!f.accepts(&record(&[("status", json!(200))])));
    }

    #[test]
    fn regex_and_match_combine() {
        let f = filter(&["--match", "host", "web", "--regex", "path", "^/api/"]);
        assert!(f.accepts(&record(&[
            ("host", json!("web")),
            ("path", json!("/api/users"))
        ])));
        assert!(!f.accepts(&record(&[
            ("host", json!("web")),
            ("path", json!("/static/x.css"))
        ])));
    }

    #[test]
    fn invert_negates_predicate() {
        let f = filter(&["--match", "level", "debug", "--invert"]);
        assert!(f.accepts(&record(&[("level", json!("info"))])));
        assert!(!f.accepts(&record(&[("level", json!("debug"))])));
    }

    #[test]
    fn missing_key_always_drops() {
        let plain = filter(&["--match", "level", "debug"]);
        let inverted = filter(&["--match", "level", "debug", "--invert"]);
        let empty = Record::new();
        assert!(!plain.accepts(&empty));
        assert!(!inverted.accepts(&empty));
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let args: Vec<String> = ["--regex", "k", "(open"]
            .iter()
            .map(|s| (*s).to_owned())
            .collect();
        let err = Filter::from_args(&args).unwrap_err();
        assert!(matches!(
            err,
            SwakError::Plugin(PluginError::InvalidArgs { .. })
        ));
    }

    #[test]
    fn process_requires_started() {
        let args = vec!["--match".to_owned(), "a".to_owned(), "b".to_owned()];
        let mut f = Filter::from_args(&args).unwrap();
        let event = Event::new(1.0, Record::new());
        assert!(matches!(
            f.process("t", event).unwrap_err(),
            SwakError::Lifecycle(_)
        ));
    }
}
