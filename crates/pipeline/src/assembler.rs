//! 파이프라인 조립/검증
//!
//! 파이프(`|`)로 구분된 명령 문자열을 토큰으로 나누고, 각 토큰을 스테이지로 해석한 뒤,
//! 스테이지 종류 시퀀스가 허용된 형태인지 검사합니다.
//!
//! # 허용 형태
//! ```text
//! cmd
//! in(text)   par  tr*  [buf]  out
//! in(record)      tr*  [buf]  out
//! ```
//!
//! 검증은 스테이지 종류만 봅니다. 어떤 스테이지도 실행하지 않습니다.

use std::fmt;

use serde::Serialize;

use swak_core::error::{PipelineShapeError, PluginError, SwakError};
use swak_core::plugin::{Stage, StageKind, StageResolver};

/// 명령 문자열의 한 구간: 플러그인 이름과 인자 목록
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageToken {
    pub name: String,
    pub args: Vec<String>,
}

impl StageToken {
    pub fn new(name: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for StageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

// ─── Tokenizer ───────────────────────────────────────────────────────

/// 파이프로 구분된 명령 문자열을 토큰 목록으로 나눕니다.
///
/// 구간 안에서는 공백으로 단어를 나누며, 작은따옴표/큰따옴표 안의 공백과 `|`는
/// 그대로 유지됩니다. 빈 구간이나 닫히지 않은 따옴표는 에러입니다.
///
/// ```ignore
/// let tokens = parse_command("in.counter --fields 3 | out.stdout")?;
/// assert_eq!(tokens[0].args, vec!["--fields", "3"]);
/// ```
pub fn parse_command(command: &str) -> Result<Vec<StageToken>, PluginError> {
    let mut segments: Vec<Vec<String>> = vec![Vec::new()];
    let mut word = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for ch in command.chars() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => word.push(c),
            (None, '\'' | '"') => {
                quote = Some(ch);
                in_word = true;
            }
            (None, '|') => {
                finish_word(&mut segments, &mut word, &mut in_word);
                segments.push(Vec::new());
            }
            (None, c) if c.is_whitespace() => finish_word(&mut segments, &mut word, &mut in_word),
            (None, c) => {
                word.push(c);
                in_word = true;
            }
        }
    }
    if let Some(q) = quote {
        return Err(PluginError::InvalidArgs {
            name: format!("segment {}", segments.len() - 1),
            reason: format!("unterminated {q} quote"),
        });
    }
    finish_word(&mut segments, &mut word, &mut in_word);

    segments
        .into_iter()
        .enumerate()
        .map(|(position, mut words)| {
            if words.is_empty() {
                return Err(PluginError::InvalidArgs {
                    name: format!("segment {position}"),
                    reason: "empty pipeline segment".to_owned(),
                });
            }
            let name = words.remove(0);
            Ok(StageToken { name, args: words })
        })
        .collect()
}

fn finish_word(segments: &mut [Vec<String>], word: &mut String, in_word: &mut bool) {
    if *in_word {
        if let Some(current) = segments.last_mut() {
            current.push(std::mem::take(word));
        }
        *in_word = false;
    }
}

// ─── Validation ──────────────────────────────────────────────────────

/// 스테이지 종류 시퀀스의 형태를 검사합니다.
pub fn validate_kinds(kinds: &[StageKind]) -> Result<(), PipelineShapeError> {
    let shape_error = |position: usize,
                       previous: Option<StageKind>,
                       current: Option<StageKind>,
                       reason: &str| PipelineShapeError {
        position,
        previous,
        current,
        reason: reason.to_owned(),
    };

    let Some((&first, rest)) = kinds.split_first() else {
        return Err(shape_error(0, None, None, "pipeline is empty"));
    };

    if first == StageKind::Command {
        if rest.is_empty() {
            return Ok(());
        }
        return Err(shape_error(
            0,
            None,
            Some(first),
            "a command must be the only stage",
        ));
    }
    if !first.is_input() {
        return Err(shape_error(
            0,
            None,
            Some(first),
            "pipeline must start with an input",
        ));
    }

    for (position, pair) in kinds.windows(2).enumerate().map(|(i, w)| (i + 1, w)) {
        let (previous, current) = (pair[0], pair[1]);
        if let Some(reason) = adjacency_violation(previous, current) {
            return Err(shape_error(
                position,
                Some(previous),
                Some(current),
                reason,
            ));
        }
    }

    let last = kinds[kinds.len() - 1];
    if last != StageKind::Output {
        let reason = match last {
            StageKind::TextInput => "text input must be followed by a parser",
            StageKind::Buffer => "buffer must immediately precede the output",
            _ => "pipeline must end with an output",
        };
        return Err(shape_error(kinds.len(), Some(last), None, reason));
    }
    Ok(())
}

/// 인접한 두 종류가 충돌하면 사유를 반환합니다.
fn adjacency_violation(previous: StageKind, current: StageKind) -> Option<&'static str> {
    use StageKind::*;

    match (previous, current) {
        (_, TextInput | RecordInput) => Some("only one input is allowed"),
        (_, Command) => Some("a command must be the only stage"),
        (Output, _) => Some("output must be the last stage"),
        (Buffer, Buffer) => Some("at most one buffer is allowed"),
        (Buffer, c) if c != Output => Some("buffer must immediately precede the output"),
        (TextInput, c) if c != Parser => Some("text input must be followed by a parser"),
        (RecordInput, Parser) => Some("record input must not be followed by a parser"),
        (p, Parser) if p != TextInput => Some("parser must directly follow a text input"),
        _ => None,
    }
}

// ─── StageSequence ───────────────────────────────────────────────────

/// 조립된 스테이지 시퀀스
///
/// 토큰 순서를 그대로 유지합니다. [`validate`](Self::validate)를 통과해야 실행할 수 있습니다.
pub struct StageSequence {
    tokens: Vec<StageToken>,
    stages: Vec<Stage>,
    validated: bool,
}

impl StageSequence {
    pub fn kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(Stage::kind).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn is_validated(&self) -> bool {
        self.validated
    }

    /// 단독 명령 시퀀스인지 확인합니다.
    pub fn is_command(&self) -> bool {
        matches!(self.stages.as_slice(), [Stage::Command(_)])
    }

    pub fn tokens(&self) -> &[StageToken] {
        &self.tokens
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// 형태를 검사하고 결과를 기록합니다.
    pub fn validate(&mut self) -> Result<(), PipelineShapeError> {
        let kinds = self.kinds();
        match validate_kinds(&kinds) {
            Ok(()) => {
                self.validated = true;
                tracing::debug!(stages = kinds.len(), "pipeline shape validated");
                Ok(())
            }
            Err(e) => {
                self.validated = false;
                let stage = self.tokens.get(e.position).map(|t| t.name.as_str());
                tracing::error!(
                    position = e.position,
                    stage = stage.unwrap_or("<end>"),
                    reason = e.reason.as_str(),
                    "pipeline shape rejected"
                );
                Err(e)
            }
        }
    }

    /// 실행기에 넘길 스테이지 목록으로 분해합니다.
    pub fn into_parts(self) -> (Vec<StageToken>, Vec<Stage>) {
        (self.tokens, self.stages)
    }
}

impl fmt::Debug for StageSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageSequence")
            .field("stages", &self.stages)
            .field("validated", &self.validated)
            .finish()
    }
}

/// 토큰을 순서대로 스테이지로 해석합니다. 검증은 하지 않습니다.
pub fn assemble(
    tokens: Vec<StageToken>,
    resolver: &dyn StageResolver,
) -> Result<StageSequence, SwakError> {
    let mut stages = Vec::with_capacity(tokens.len());
    for (position, token) in tokens.iter().enumerate() {
        let stage = resolver.resolve(&token.name, &token.args).inspect_err(|e| {
            tracing::error!(position, stage = token.name.as_str(), error = %e, "failed to resolve stage");
        })?;
        tracing::debug!(position, stage = stage.name(), kind = %stage.kind(), "stage resolved");
        stages.push(stage);
    }
    Ok(StageSequence {
        tokens,
        stages,
        validated: false,
    })
}

/// 명령 문자열을 나누고, 조립하고, 검증합니다.
pub fn build_pipeline(
    command: &str,
    resolver: &dyn StageResolver,
) -> Result<StageSequence, SwakError> {
    let tokens = parse_command(command)?;
    let mut sequence = assemble(tokens, resolver)?;
    sequence.validate()?;
    Ok(sequence)
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use swak_core::plugin::{Command as CommandStage, Lifecycle, Plugin};
    use StageKind::*;

    // ── parse_command ──

    #[test]
    fn splits_pipes_and_arguments() {
        let tokens = parse_command("in.counter --fields 3 | out.stdout").unwrap();
        assert_eq!(
            tokens,
            vec![
                StageToken::new("in.counter", ["--fields", "3"]),
                StageToken::new("out.stdout", Vec::<String>::new()),
            ]
        );
    }

    #[test]
    fn quotes_keep_spaces_and_pipes() {
        let tokens =
            parse_command(r#"in.counter | tr.reform -a msg "hello | world" -a k '' | out.stdout"#)
                .unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].args, vec!["-a", "msg", "hello | world", "-a", "k", ""]);
    }

    #[test]
    fn extra_whitespace_is_ignored() {
        let tokens = parse_command("  in.counter\t|out.stdout  ").unwrap();
        assert_eq!(tokens[0].name, "in.counter");
        assert_eq!(tokens[1].name, "out.stdout");
    }

    #[test]
    fn empty_segment_is_rejected() {
        for cmd in ["", "in.counter | | out.stdout", "in.counter |", "| out.stdout"] {
            let err = parse_command(cmd).unwrap_err();
            assert!(
                matches!(err, PluginError::InvalidArgs { ref reason, .. } if reason.contains("empty")),
                "{cmd:?} should fail"
            );
        }
    }

    #[test]
    fn empty_segment_names_its_position() {
        let err = parse_command("in.counter | | out.stdout").unwrap_err();
        assert!(matches!(err, PluginError::InvalidArgs { ref name, .. } if name == "segment 1"));
    }

    #[test]
    fn unterminated_quote_is_rejected() {
        let err = parse_command(r#"in.counter | tr.reform -a k "oops"#).unwrap_err();
        assert!(matches!(err, PluginError::InvalidArgs { ref reason, .. } if reason.contains("quote")));
    }

    proptest! {
        #[test]
        fn plain_words_round_trip(
            segments in prop::collection::vec(
                prop::collection::vec("[a-z0-9.-]{1,8}", 1..4),
                1..5,
            )
        ) {
            let command = segments
                .iter()
                .map(|words| words.join(" "))
                .collect::<Vec<_>>()
                .join(" | ");
            let tokens = parse_command(&command).unwrap();
            prop_assert_eq!(tokens.len(), segments.len());
            for (token, words) in tokens.iter().zip(&segments) {
                prop_assert_eq!(&token.name, &words[0]);
                prop_assert_eq!(&token.args[..], &words[1..]);
            }
        }
    }

    // ── validate_kinds ──

    #[test]
    fn accepts_legal_shapes() {
        for kinds in [
            vec![Command],
            vec![RecordInput, Output],
            vec![RecordInput, Transform, Transform, Output],
            vec![TextInput, Parser, Output],
            vec![TextInput, Parser, Transform, Buffer, Output],
            vec![RecordInput, Buffer, Output],
        ] {
            assert!(validate_kinds(&kinds).is_ok(), "{kinds:?} should be valid");
        }
    }

    #[test]
    fn rejects_double_input() {
        let err = validate_kinds(&[RecordInput, RecordInput, Output]).unwrap_err();
        assert_eq!(err.position, 1);
        assert_eq!(err.previous, Some(RecordInput));
        assert_eq!(err.current, Some(RecordInput));
    }

    #[test]
    fn rejects_missing_leading_input() {
        let err = validate_kinds(&[Parser, Output]).unwrap_err();
        assert_eq!(err.position, 0);
        assert_eq!(err.previous, None);
        assert_eq!(err.current, Some(Parser));
    }

    #[test]
    fn text_input_requires_parser() {
        let err = validate_kinds(&[TextInput, Transform, Output]).unwrap_err();
        assert_eq!(err.position, 1);
        assert!(err.reason.contains("parser"));

        let err = validate_kinds(&[TextInput, Output]).unwrap_err();
        assert_eq!((err.previous, err.current), (Some(TextInput), Some(Output)));
    }

    #[test]
    fn record_input_rejects_parser() {
        let err = validate_kinds(&[RecordInput, Parser, Output]).unwrap_err();
        assert_eq!(err.position, 1);
        assert!(err.reason.contains("must not"));
    }

    #[test]
    fn parser_only_after_text_input() {
        let err = validate_kinds(&[TextInput, Parser, Transform, Parser, Output]).unwrap_err();
        assert_eq!(err.position, 3);
        assert_eq!(err.previous, Some(Transform));
    }

    #[test]
    fn buffer_must_precede_output() {
        let err = validate_kinds(&[RecordInput, Buffer, Transform, Output]).unwrap_err();
        assert_eq!(err.position, 2);
        assert_eq!((err.previous, err.current), (Some(Buffer), Some(Transform)));

        let err = validate_kinds(&[RecordInput, Buffer, Buffer, Output]).unwrap_err();
        assert!(err.reason.contains("at most one buffer"));

        let err = validate_kinds(&[RecordInput, Transform, Buffer]).unwrap_err();
        assert_eq!(err.position, 3);
        assert_eq!((err.previous, err.current), (Some(Buffer), None));
    }

    #[test]
    fn requires_terminal_output() {
        let err = validate_kinds(&[RecordInput, Transform]).unwrap_err();
        assert_eq!(err.position, 2);
        assert_eq!(err.current, None);
        assert!(err.reason.contains("end with an output"));

        let err = validate_kinds(&[RecordInput]).unwrap_err();
        assert_eq!(err.position, 1);
    }

    #[test]
    fn output_must_be_last() {
        let err = validate_kinds(&[RecordInput, Output, Output]).unwrap_err();
        assert_eq!(err.position, 2);
        let err = validate_kinds(&[RecordInput, Output, Transform]).unwrap_err();
        assert!(err.reason.contains("last"));
    }

    #[test]
    fn command_must_be_alone() {
        let err = validate_kinds(&[Command, Output]).unwrap_err();
        assert_eq!(err.position, 0);
        let err = validate_kinds(&[RecordInput, Command, Output]).unwrap_err();
        assert_eq!(err.position, 1);
    }

    #[test]
    fn empty_pipeline_rejected_at_zero() {
        let err = validate_kinds(&[]).unwrap_err();
        assert_eq!(err.position, 0);
        assert_eq!((err.previous, err.current), (None, None));
    }

    // ── assemble ──

    struct Echo {
        lifecycle: Lifecycle,
    }

    impl Plugin for Echo {
        fn kind(&self) -> StageKind {
            StageKind::Command
        }
        fn lifecycle(&self) -> &Lifecycle {
            &self.lifecycle
        }
        fn lifecycle_mut(&mut self) -> &mut Lifecycle {
            &mut self.lifecycle
        }
    }

    impl CommandStage for Echo {
        fn execute(&mut self) -> Result<(), SwakError> {
            self.lifecycle.ensure_active("execute")?;
            Ok(())
        }
    }

    /// `cmd.*`만 해석하는 리졸버
    struct CommandsOnly;

    impl StageResolver for CommandsOnly {
        fn resolve(&self, name: &str, _args: &[String]) -> Result<Stage, SwakError> {
            if name.starts_with("cmd.") {
                Ok(Stage::Command(Box::new(Echo {
                    lifecycle: Lifecycle::new(name),
                })))
            } else {
                Err(PluginError::NotFound {
                    name: name.to_owned(),
                }
                .into())
            }
        }
    }

    #[test]
    fn assemble_preserves_token_order() {
        let tokens = parse_command("cmd.a | cmd.b x").unwrap();
        let mut seq = assemble(tokens, &CommandsOnly).unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.stages()[0].name(), "cmd.a");
        assert_eq!(seq.stages()[1].name(), "cmd.b");
        assert_eq!(seq.tokens()[1].args, vec!["x"]);
        assert!(!seq.is_validated());
        // 명령 두 개는 허용되지 않음
        assert!(seq.validate().is_err());
        assert!(!seq.is_validated());
    }

    #[test]
    fn build_pipeline_accepts_sole_command() {
        let seq = build_pipeline("cmd.echo hello", &CommandsOnly).unwrap();
        assert!(seq.is_validated());
        assert!(seq.is_command());
        assert_eq!(seq.kinds(), vec![Command]);
    }

    #[test]
    fn unknown_plugin_fails_assembly() {
        let err = build_pipeline("in.nope | out.stdout", &CommandsOnly).unwrap_err();
        assert!(matches!(err, SwakError::Plugin(PluginError::NotFound { .. })));
    }
}
