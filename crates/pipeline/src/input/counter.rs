//! 카운터 입력 -- `f1..fN` 키에 같은 증가 값을 담은 레코드 생성

use std::time::Duration;

use clap::Parser as ClapParser;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use swak_core::error::SwakError;
use swak_core::event::{Event, InputItem, Record};
use swak_core::plugin::{BoxFuture, Input, Lifecycle, Plugin, StageKind};

use crate::registry::parse_args;

/// `in.counter` 인자
#[derive(Debug, Clone, ClapParser)]
#[command(name = "in.counter", about = "Generate incremental numbers.")]
pub struct CounterArgs {
    /// 레코드당 필드 수 (f1..fN)
    #[arg(long, default_value_t = 3)]
    pub fields: usize,

    /// 생성할 레코드 수 (0 = 무제한)
    #[arg(long = "max-count", default_value_t = 3)]
    pub max_count: u64,

    /// 레코드 사이 지연 (밀리초)
    #[arg(long = "delay-ms", default_value_t = 0)]
    pub delay_ms: u64,
}

impl Default for CounterArgs {
    fn default() -> Self {
        Self {
            fields: 3,
            max_count: 3,
            delay_ms: 0,
        }
    }
}

/// 증가하는 숫자를 생성하는 레코드 입력
pub struct CounterInput {
    lifecycle: Lifecycle,
    args: CounterArgs,
}

impl CounterInput {
    pub const NAME: &'static str = "in.counter";

    pub fn new(args: CounterArgs) -> Self {
        Self {
            lifecycle: Lifecycle::new(Self::NAME),
            args,
        }
    }

    pub fn from_args(args: &[String]) -> Result<Self, SwakError> {
        Ok(Self::new(parse_args(Self::NAME, args)?))
    }

    fn record(&self, n: u64) -> Record {
        (1..=self.args.fields)
            .map(|i| (format!("f{i}"), json!(n)))
            .collect()
    }
}

impl Plugin for CounterInput {
    fn kind(&self) -> StageKind {
        StageKind::RecordInput
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }
}

impl Input for CounterInput {
    fn read(
        &mut self,
        tx: mpsc::Sender<InputItem>,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<u64, SwakError>> {
        Box::pin(async move {
            self.lifecycle.ensure_active("read")?;
            let delay = Duration::from_millis(self.args.delay_ms);
            let mut sent = 0u64;

            for n in 1.. {
                if self.args.max_count != 0 && n > self.args.max_count {
                    break;
                }
                let item = InputItem::Event(Event::now(self.record(n)));
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = tx.send(item) => {
                        if result.is_err() {
                            tracing::debug!(stage = Self::NAME, "receiver closed, stopping counter");
                            break;
                        }
                    }
                }
                sent += 1;

                if !delay.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }

            tracing::debug!(stage = Self::NAME, sent, "counter finished");
            Ok(sent)
        })
    }
}
