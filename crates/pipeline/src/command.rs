//! 단독 명령 플러그인
//!
//! 명령은 데이터 흐름 없이 한 번 실행되고 끝납니다. 파이프라인에 명령이 있으면
//! 그 명령이 유일한 스테이지여야 합니다.

use std::io::Write;

use clap::Parser as ClapParser;

use swak_core::error::SwakError;
use swak_core::plugin::{Command, Lifecycle, Plugin, StageKind};

use crate::registry::parse_args;

/// `cmd.echo` 인자
#[derive(Debug, Clone, Default, ClapParser)]
#[command(name = "cmd.echo", about = "Print the given words.")]
pub struct EchoArgs {
    /// 출력할 단어
    #[arg(num_args = 0.., trailing_var_arg = true, allow_hyphen_values = true)]
    pub words: Vec<String>,
}

/// 인자를 공백으로 이어 한 줄로 출력하는 명령
pub struct Echo {
    lifecycle: Lifecycle,
    words: Vec<String>,
    writer: Box<dyn Write + Send>,
}

impl Echo {
    pub const NAME: &'static str = "cmd.echo";

    pub fn new(words: Vec<String>) -> Self {
        Self::with_writer(words, Box::new(std::io::stdout()))
    }

    pub fn with_writer(words: Vec<String>, writer: Box<dyn Write + Send>) -> Self {
        Self {
            lifecycle: Lifecycle::new(Self::NAME),
            words,
            writer,
        }
    }

    pub fn from_args(args: &[String]) -> Result<Self, SwakError> {
        let args: EchoArgs = parse_args(Self::NAME, args)?;
        Ok(Self::new(args.words))
    }
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

impl Command for Echo {
    fn execute(&mut self) -> Result<(), SwakError> {
        self.lifecycle.ensure_active("execute")?;
        writeln!(self.writer, "{}", self.words.join(" "))?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn echo_prints_words() {
        let captured = Captured::default();
        let words = vec!["hello".to_owned(), "swak".to_owned()];
        let mut echo = Echo::with_writer(words, Box::new(captured.clone()));
        echo.start().unwrap();
        echo.execute().unwrap();
        assert_eq!(captured.0.lock().unwrap().as_slice(), b"hello swak\n");
    }

    #[test]
    fn echo_accepts_hyphenated_words() {
        let args: Vec<String> = ["x", "-n", "--not-a-flag"]
            .iter()
            .map(|s| (*s).to_owned())
            .collect();
        let echo = Echo::from_args(&args).unwrap();
        assert_eq!(echo.words, args);
    }

    #[test]
    fn execute_requires_started() {
        let mut echo = Echo::with_writer(Vec::new(), Box::new(Captured::default()));
        assert!(matches!(
            echo.execute().unwrap_err(),
            SwakError::Lifecycle(_)
        ));
    }
}
