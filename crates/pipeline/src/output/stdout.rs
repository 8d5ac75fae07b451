//! 표준 출력 (`out.stdout`)
//!
//! 이벤트마다 `<time> <tag> <json>` 한 줄을 씁니다.
//! 시각은 RFC 3339 (밀리초, UTC)로 표시합니다. 기본 대상은 표준 출력이며
//! 테스트에서는 임의의 writer를 주입할 수 있습니다.

use std::io::Write;

use chrono::{DateTime, SecondsFormat};
use clap::Parser as ClapParser;

use swak_core::error::{DeliveryError, SwakError};
use swak_core::event::Event;
use swak_core::plugin::{Lifecycle, Plugin, RecordOutput, StageKind};

use crate::registry::parse_args;

/// `out.stdout` 인자
#[derive(Debug, Clone, Default, ClapParser)]
#[command(name = "out.stdout", about = "Print events to standard output.")]
pub struct StdoutArgs {
    /// 시각을 epoch 초 그대로 출력
    #[arg(long)]
    pub raw_time: bool,
}

/// 이벤트 한 줄 출력
pub struct StdoutOutput {
    lifecycle: Lifecycle,
    writer: Box<dyn Write + Send>,
    raw_time: bool,
}

impl StdoutOutput {
    pub const NAME: &'static str = "out.stdout";

    pub fn new(args: StdoutArgs) -> Self {
        Self::with_writer(args, Box::new(std::io::stdout()))
    }

    /// 출력 대상을 지정해 생성합니다.
    pub fn with_writer(args: StdoutArgs, writer: Box<dyn Write + Send>) -> Self {
        Self {
            lifecycle: Lifecycle::new(Self::NAME),
            writer,
            raw_time: args.raw_time,
        }
    }

    pub fn from_args(args: &[String]) -> Result<Self, SwakError> {
        Ok(Self::new(parse_args(Self::NAME, args)?))
    }

    fn delivery_error(&self, reason: impl ToString) -> SwakError {
        DeliveryError {
            stage: Self::NAME.to_owned(),
            reason: reason.to_string(),
        }
        .into()
    }
}

/// epoch 초를 RFC 3339로 바꿉니다. 표현할 수 없는 값은 숫자 그대로 씁니다.
pub fn format_time(time: f64) -> String {
    let secs = time.floor();
    let nanos = ((time - secs) * 1_000_000_000.0).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| time.to_string())
}

impl Plugin for StdoutOutput {
    fn kind(&self) -> StageKind {
        StageKind::Output
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    fn stop(&mut self) -> Result<(), SwakError> {
        if self.lifecycle.stop()? {
            self.writer.flush()?;
        }
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), SwakError> {
        self.lifecycle.terminate()?;
        self.writer.flush()?;
        Ok(())
    }
}

impl RecordOutput for StdoutOutput {
    fn process(&mut self, tag: &str, event: Event) -> Result<(), SwakError> {
        self.lifecycle.ensure_active("process")?;
        let body = serde_json::to_string(&event.record).map_err(|e| self.delivery_error(e))?;
        let time = if self.raw_time {
            event.time.to_string()
        } else {
            format_time(event.time)
        };
        writeln!(self.writer, "{time} {tag} {body}").map_err(|e| self.delivery_error(e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// 테스트용 공유 writer
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

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn event() -> Event {
        let mut record = swak_core::event::Record::new();
        record.insert("f1".to_owned(), json!(1));
        Event::new(1_705_320_000.25, record)
    }

    #[test]
    fn prints_time_tag_and_json() {
        let captured = Captured::default();
        let mut out = StdoutOutput::with_writer(StdoutArgs::default(), Box::new(captured.clone()));
        out.start().unwrap();
        out.process("swak.test", event()).unwrap();
        assert_eq!(
            captured.text(),
            "2024-01-15T12:00:00.250Z swak.test {\"f1\":1}\n"
        );
    }

    #[test]
    fn raw_time_prints_epoch_seconds() {
        let captured = Captured::default();
        let args = StdoutArgs { raw_time: true };
        let mut out = StdoutOutput::with_writer(args, Box::new(captured.clone()));
        out.start().unwrap();
        out.process("t", event()).unwrap();
        assert!(captured.text().starts_with("1705320000.25 t "));
    }

    #[test]
    fn write_failure_is_delivery_error() {
        let mut out = StdoutOutput::with_writer(StdoutArgs::default(), Box::new(Broken));
        out.start().unwrap();
        let err = out.process("t", event()).unwrap_err();
        assert!(matches!(err, SwakError::Delivery(_)));
    }

    #[test]
    fn process_requires_started() {
        let mut out = StdoutOutput::with_writer(StdoutArgs::default(), Box::new(Captured::default()));
        assert!(matches!(
            out.process("t", event()).unwrap_err(),
            SwakError::Lifecycle(_)
        ));
    }

    #[test]
    fn format_time_handles_out_of_range() {
        assert_eq!(format_time(0.0), "1970-01-01T00:00:00.000Z");
        assert_eq!(format_time(f64::MAX), f64::MAX.to_string());
    }
}
