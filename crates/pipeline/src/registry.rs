//! 플러그인 레지스트리 -- 이름으로 스테이지를 찾고 생성
//!
//! [`PluginRegistry`]는 플러그인 이름, 종류, 설명, 인자 도움말, 생성 함수를 등록 순서대로 보관하고
//! [`StageResolver`]를 구현해 조립기에 스테이지를 공급합니다.
//!
//! # 사용 예시
//! ```ignore
//! let registry = PluginRegistry::with_builtins(&config.buffer);
//! let sequence = build_pipeline("in.counter | out.stdout", &registry)?;
//! for info in registry.list() {
//!     println!("{} {}", info.name, info.description);
//! }
//! ```

use std::fmt;

use clap::{CommandFactory, Parser as ClapParser};
use serde::Serialize;

use swak_core::config::BufferSection;
use swak_core::error::{PluginError, SwakError};
use swak_core::plugin::{OutputStage, Stage, StageKind, StageResolver, kind_from_name};

use crate::buffer::{BUFFER_NAME, BufferArgs, SizedBuffer};
use crate::command::{Echo, EchoArgs};
use crate::input::{CounterArgs, CounterInput, FileInput, FileInputArgs};
use crate::output::{
    FileOutput, FileOutputArgs, MemoryChunkOutput, MemoryHandle, MemoryOutput, MemoryOutputArgs,
    StdoutArgs, StdoutOutput,
};
use crate::parser::{JsonParser, JsonParserArgs, RegexParser, RegexParserArgs};
use crate::transform::{Filter, FilterArgs, Reform, ReformArgs};

/// 플러그인 인자 목록을 clap 파서로 해석합니다.
///
/// 인자 목록에는 플러그인 이름이 포함되지 않습니다. 실패(도움말 요청 포함)는
/// `PluginError::InvalidArgs`가 됩니다.
pub fn parse_args<A: ClapParser>(name: &str, args: &[String]) -> Result<A, PluginError> {
    A::try_parse_from(std::iter::once(name).chain(args.iter().map(String::as_str))).map_err(|e| {
        PluginError::InvalidArgs {
            name: name.to_owned(),
            reason: e.to_string().trim_end().to_owned(),
        }
    })
}

/// 스테이지 생성 함수
pub type StageFactory = Box<dyn Fn(&[String]) -> Result<Stage, SwakError> + Send + Sync>;

/// 플러그인 메타데이터 (목록 출력용)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginInfo {
    /// 정규 이름 (예: `in.counter`)
    pub name: String,
    /// 스테이지 종류
    pub kind: StageKind,
    /// 한 줄 설명
    pub description: String,
}

/// 등록된 플러그인 하나
pub struct PluginSpec {
    info: PluginInfo,
    command: fn() -> clap::Command,
    factory: StageFactory,
}

impl PluginSpec {
    /// 인자 파서 `A`의 설명과 도움말을 쓰는 플러그인 항목을 만듭니다.
    pub fn new<A: CommandFactory>(
        name: &str,
        kind: StageKind,
        factory: impl Fn(&[String]) -> Result<Stage, SwakError> + Send + Sync + 'static,
    ) -> Self {
        let description = A::command()
            .get_about()
            .map(ToString::to_string)
            .unwrap_or_default();
        Self {
            info: PluginInfo {
                name: name.to_owned(),
                kind,
                description,
            },
            command: A::command,
            factory: Box::new(factory),
        }
    }

    pub fn info(&self) -> &PluginInfo {
        &self.info
    }

    /// 인자 도움말을 렌더링합니다.
    pub fn help(&self) -> String {
        (self.command)().render_help().to_string()
    }
}

impl fmt::Debug for PluginSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginSpec")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

// ─── PluginRegistry ──────────────────────────────────────────────────

/// 플러그인 레지스트리
///
/// 등록 순서가 보존됩니다. 같은 이름은 한 번만 등록할 수 있습니다.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: Vec<PluginSpec>,
    memory: MemoryHandle,
}

impl PluginRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 표준 플러그인을 모두 등록한 레지스트리를 생성합니다.
    ///
    /// `buf.memory`는 인자로 지정하지 않은 값을 `buffer` 섹션에서 가져옵니다.
    pub fn with_builtins(buffer: &BufferSection) -> Self {
        let mut registry = Self::new();
        for spec in builtin_specs(buffer.clone(), registry.memory.clone()) {
            // 빈 레지스트리이므로 이름 충돌이 없음
            if let Err(e) = registry.register(spec) {
                tracing::error!(error = %e, "failed to register builtin plugin");
            }
        }
        registry
    }

    /// 플러그인을 등록합니다. 같은 이름이 있으면 에러를 반환합니다.
    pub fn register(&mut self, spec: PluginSpec) -> Result<(), PluginError> {
        let name = &spec.info.name;
        kind_from_name(name)?;
        if self.plugins.iter().any(|p| p.info.name == *name) {
            return Err(PluginError::AlreadyRegistered { name: name.clone() });
        }
        tracing::debug!(plugin = name.as_str(), kind = %spec.info.kind, "plugin registered");
        self.plugins.push(spec);
        Ok(())
    }

    /// 등록된 플러그인 수
    pub fn count(&self) -> usize {
        self.plugins.len()
    }

    /// 이름으로 플러그인을 조회합니다.
    pub fn get(&self, name: &str) -> Option<&PluginSpec> {
        self.plugins.iter().find(|p| p.info.name == name)
    }

    /// 등록된 모든 플러그인 정보 (등록 순서)
    pub fn list(&self) -> Vec<&PluginInfo> {
        self.plugins.iter().map(PluginSpec::info).collect()
    }

    /// 플러그인 설명과 인자 도움말을 반환합니다.
    pub fn describe(&self, name: &str) -> Result<(PluginInfo, String), PluginError> {
        let spec = self.get(name).ok_or_else(|| PluginError::NotFound {
            name: name.to_owned(),
        })?;
        Ok((spec.info.clone(), spec.help()))
    }

    /// `out.memory`가 공유하는 결과 핸들
    pub fn memory_handle(&self) -> MemoryHandle {
        self.memory.clone()
    }
}

impl StageResolver for PluginRegistry {
    fn resolve(&self, name: &str, args: &[String]) -> Result<Stage, SwakError> {
        let Some(spec) = self.get(name) else {
            kind_from_name(name)?;
            return Err(PluginError::NotFound {
                name: name.to_owned(),
            }
            .into());
        };
        (spec.factory)(args)
    }
}

// ─── Builtins ────────────────────────────────────────────────────────

fn builtin_specs(buffer: BufferSection, memory: MemoryHandle) -> Vec<PluginSpec> {
    vec![
        PluginSpec::new::<CounterArgs>(CounterInput::NAME, StageKind::RecordInput, |args| {
            Ok(Stage::Input(Box::new(CounterInput::from_args(args)?)))
        }),
        PluginSpec::new::<FileInputArgs>(FileInput::NAME, StageKind::TextInput, |args| {
            Ok(Stage::Input(Box::new(FileInput::from_args(args)?)))
        }),
        PluginSpec::new::<JsonParserArgs>(JsonParser::NAME, StageKind::Parser, |args| {
            Ok(Stage::Parser(Box::new(JsonParser::from_args(args)?)))
        }),
        PluginSpec::new::<RegexParserArgs>(RegexParser::NAME, StageKind::Parser, |args| {
            Ok(Stage::Parser(Box::new(RegexParser::from_args(args)?)))
        }),
        PluginSpec::new::<ReformArgs>(Reform::NAME, StageKind::Transform, |args| {
            Ok(Stage::Transform(Box::new(Reform::from_args(args)?)))
        }),
        PluginSpec::new::<FilterArgs>(Filter::NAME, StageKind::Transform, |args| {
            Ok(Stage::Transform(Box::new(Filter::from_args(args)?)))
        }),
        PluginSpec::new::<BufferArgs>(BUFFER_NAME, StageKind::Buffer, move |args| {
            Ok(Stage::Buffer(Box::new(SizedBuffer::from_args(args, &buffer)?)))
        }),
        PluginSpec::new::<StdoutArgs>(StdoutOutput::NAME, StageKind::Output, |args| {
            let output = StdoutOutput::from_args(args)?;
            Ok(Stage::Output(OutputStage::Record(Box::new(output))))
        }),
        PluginSpec::new::<FileOutputArgs>(FileOutput::NAME, StageKind::Output, |args| {
            let output = FileOutput::from_args(args)?;
            Ok(Stage::Output(OutputStage::Chunk(Box::new(output))))
        }),
        PluginSpec::new::<MemoryOutputArgs>(MemoryOutput::NAME, StageKind::Output, move |args| {
            let parsed: MemoryOutputArgs = parse_args(MemoryOutput::NAME, args)?;
            let stage = if parsed.chunked {
                OutputStage::Chunk(Box::new(MemoryChunkOutput::new(memory.clone())))
            } else {
                OutputStage::Record(Box::new(MemoryOutput::new(memory.clone())))
            };
            Ok(Stage::Output(stage))
        }),
        PluginSpec::new::<EchoArgs>(Echo::NAME, StageKind::Command, |args| {
            Ok(Stage::Command(Box::new(Echo::from_args(args)?)))
        }),
    ]
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use swak_core::plugin::PluginState;

    fn builtins() -> PluginRegistry {
        PluginRegistry::with_builtins(&BufferSection::default())
    }

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn builtins_are_listed_in_order() {
        let registry = builtins();
        let names: Vec<&str> = registry.list().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "in.counter",
                "in.file",
                "par.json",
                "par.regex",
                "tr.reform",
                "tr.filter",
                "buf.memory",
                "out.stdout",
                "out.file",
                "out.memory",
                "cmd.echo",
            ]
        );
        assert_eq!(registry.count(), 11);
    }

    #[test]
    fn every_builtin_name_matches_its_kind_prefix() {
        for info in builtins().list() {
            let kinds = kind_from_name(&info.name).unwrap();
            assert!(kinds.contains(&info.kind), "{}", info.name);
            assert!(!info.description.is_empty(), "{}", info.name);
        }
    }

    #[test]
    fn describe_includes_help() {
        let registry = builtins();
        let (info, help) = registry.describe("in.counter").unwrap();
        assert_eq!(info.description, "Generate incremental numbers.");
        assert!(help.contains("--max-count"));

        assert!(matches!(
            registry.describe("in.nothing"),
            Err(PluginError::NotFound { .. })
        ));
    }

    #[test]
    fn register_rejects_duplicates_and_bad_prefix() {
        let mut registry = builtins();
        let dup = PluginSpec::new::<EchoArgs>(Echo::NAME, StageKind::Command, |args| {
            Ok(Stage::Command(Box::new(Echo::from_args(args)?)))
        });
        assert!(matches!(
            registry.register(dup),
            Err(PluginError::AlreadyRegistered { .. })
        ));

        let bad = PluginSpec::new::<EchoArgs>("echo", StageKind::Command, |args| {
            Ok(Stage::Command(Box::new(Echo::from_args(args)?)))
        });
        assert!(matches!(
            registry.register(bad),
            Err(PluginError::UnknownPrefix { .. })
        ));
    }

    #[test]
    fn resolve_builds_fresh_stages() {
        let registry = builtins();
        let stage = registry.resolve("in.counter", &strings(&["--fields", "2"])).unwrap();
        assert_eq!(stage.kind(), StageKind::RecordInput);
        assert_eq!(stage.state(), PluginState::Created);

        let stage = registry.resolve("in.file", &strings(&["--path", "/tmp/x"])).unwrap();
        assert_eq!(stage.kind(), StageKind::TextInput);
    }

    #[test]
    fn resolve_distinguishes_unknown_prefix_and_missing_plugin() {
        let registry = builtins();
        assert!(matches!(
            registry.resolve("foo.bar", &[]),
            Err(SwakError::Plugin(PluginError::UnknownPrefix { .. }))
        ));
        assert!(matches!(
            registry.resolve("out.kafka", &[]),
            Err(SwakError::Plugin(PluginError::NotFound { .. }))
        ));
    }

    #[test]
    fn resolve_reports_bad_arguments() {
        let registry = builtins();
        let err = registry
            .resolve("in.counter", &strings(&["--fields", "many"]))
            .unwrap_err();
        match err {
            SwakError::Plugin(PluginError::InvalidArgs { name, .. }) => {
                assert_eq!(name, "in.counter");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn memory_output_mode_follows_flag() {
        let registry = builtins();
        let record = registry.resolve("out.memory", &[]).unwrap();
        assert!(matches!(record, Stage::Output(OutputStage::Record(_))));
        let chunk = registry.resolve("out.memory", &strings(&["--chunked"])).unwrap();
        assert!(matches!(chunk, Stage::Output(OutputStage::Chunk(_))));
    }

    #[test]
    fn buffer_uses_config_section() {
        let section = BufferSection {
            chunk_max_record: Some(5),
            ..BufferSection::default()
        };
        let registry = PluginRegistry::with_builtins(&section);
        assert!(registry.resolve("buf.memory", &[]).is_ok());
        // 섹션에 한계가 없으면 인자가 필요
        assert!(builtins().resolve("buf.memory", &[]).is_err());
        assert!(
            builtins()
                .resolve("buf.memory", &strings(&["--chunk-max-record", "2"]))
                .is_ok()
        );
    }

    #[test]
    fn parse_args_maps_help_to_invalid_args() {
        let err = parse_args::<CounterArgs>("in.counter", &strings(&["--help"])).unwrap_err();
        match err {
            PluginError::InvalidArgs { reason, .. } => assert!(reason.contains("--fields")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
