//! 파일 입력 -- 파일의 줄을 원시 텍스트로 생산
//!
//! 기본 동작은 각 파일을 끝까지 읽고 종료하는 것입니다.
//! `--follow`를 주면 `tail -f`처럼 파일 끝에서 폴링하며 새 줄을 계속 읽습니다.
//!
//! # 줄 처리
//! - 끝의 `\n`, `\r\n`은 제거
//! - `--max-line-length`를 넘는 줄은 잘라내고 경고. 넘치는 부분은 메모리에 쌓지 않고 버림
//! - 추적 모드에서 개행 없이 끝난 부분 줄은 나머지가 쓰일 때까지 보류

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use clap::Parser as ClapParser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use swak_core::error::{PipelineError, SwakError};
use swak_core::event::InputItem;
use swak_core::plugin::{BoxFuture, Input, Lifecycle, Plugin, StageKind};

use crate::registry::parse_args;

/// `in.file` 인자
#[derive(Debug, Clone, ClapParser)]
#[command(name = "in.file", about = "Read lines from files.")]
pub struct FileInputArgs {
    /// 읽을 파일 경로 (여러 번 지정 가능)
    #[arg(long = "path", required = true)]
    pub paths: Vec<PathBuf>,

    /// 최대 줄 길이 (바이트)
    #[arg(long = "max-line-length", default_value_t = 64 * 1024)]
    pub max_line_length: usize,

    /// 파일 끝에서 새 줄을 계속 기다림
    #[arg(long)]
    pub follow: bool,

    /// 추적 모드 폴링 주기 (밀리초)
    #[arg(long = "poll-interval-ms", default_value_t = 500)]
    pub poll_interval_ms: u64,
}

/// 파일 줄을 읽는 텍스트 입력
pub struct FileInput {
    lifecycle: Lifecycle,
    args: FileInputArgs,
}

/// 파일 하나를 읽는 데 필요한 설정 (태스크로 복사)
#[derive(Debug, Clone, Copy)]
struct ReadOptions {
    max_line_length: usize,
    follow: bool,
    poll_interval: Duration,
}

impl FileInput {
    pub const NAME: &'static str = "in.file";

    pub fn new(args: FileInputArgs) -> Self {
        Self {
            lifecycle: Lifecycle::new(Self::NAME),
            args,
        }
    }

    pub fn from_args(args: &[String]) -> Result<Self, SwakError> {
        Ok(Self::new(parse_args(Self::NAME, args)?))
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.args.paths
    }

    fn options(&self) -> ReadOptions {
        ReadOptions {
            max_line_length: self.args.max_line_length,
            follow: self.args.follow,
            poll_interval: Duration::from_millis(self.args.poll_interval_ms.max(1)),
        }
    }
}

impl Plugin for FileInput {
    fn kind(&self) -> StageKind {
        StageKind::TextInput
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }
}

impl Input for FileInput {
    fn read(
        &mut self,
        tx: mpsc::Sender<InputItem>,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<u64, SwakError>> {
        Box::pin(async move {
            self.lifecycle.ensure_active("read")?;
            let options = self.options();

            if !options.follow {
                // 순서대로 하나씩 끝까지 읽음
                let mut sent = 0;
                for path in &self.args.paths {
                    sent += read_lines(path, options, &tx, &cancel).await?;
                    if cancel.is_cancelled() || tx.is_closed() {
                        break;
                    }
                }
                return Ok(sent);
            }

            let mut tasks = JoinSet::new();
            for path in self.args.paths.clone() {
                let tx = tx.clone();
                let cancel = cancel.clone();
                tasks.spawn(async move { read_lines(&path, options, &tx, &cancel).await });
            }
            let mut sent = 0;
            while let Some(joined) = tasks.join_next().await {
                let count = joined.map_err(|e| PipelineError::TaskFailed(e.to_string()))??;
                sent += count;
            }
            Ok(sent)
        })
    }
}

/// 파일 하나에서 줄을 읽어 보냅니다. 보낸 줄 수를 반환합니다.
async fn read_lines(
    path: &Path,
    options: ReadOptions,
    tx: &mpsc::Sender<InputItem>,
    cancel: &CancellationToken,
) -> Result<u64, SwakError> {
    let file = tokio::fs::File::open(path).await.inspect_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "failed to open input file");
    })?;
    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    let mut skipped = 0usize;
    let mut sent = 0u64;
    let max = options.max_line_length;

    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            read = read_line_bounded(&mut reader, &mut line, max, &mut skipped) => read?,
        };

        if read == 0 {
            if !options.follow {
                if !line.is_empty() || skipped > 0 {
                    if !send_line(path, &mut line, &mut skipped, max, tx).await {
                        break;
                    }
                    sent += 1;
                }
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(options.poll_interval) => continue,
            }
        }

        if options.follow && line.last() != Some(&b'\n') {
            continue;
        }
        if !send_line(path, &mut line, &mut skipped, max, tx).await {
            break;
        }
        sent += 1;
    }

    tracing::debug!(path = %path.display(), sent, "file input finished");
    Ok(sent)
}

/// 개행까지 한 줄을 `line`에 이어 읽습니다.
///
/// 줄 내용은 `max + 1`바이트까지만 보관하고 나머지는 읽고 버리며 그 길이를 `skipped`에 더합니다.
/// 개행을 만나면 `line` 끝에 붙입니다. 버린 바이트를 포함해 읽은 바이트 수를 반환하며, 0이면 EOF입니다.
async fn read_line_bounded<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    line: &mut Vec<u8>,
    max: usize,
    skipped: &mut usize,
) -> std::io::Result<usize> {
    let mut read = 0;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(read);
        }
        let newline = available.iter().position(|&b| b == b'\n');
        let content = &available[..newline.unwrap_or(available.len())];
        let room = (max + 1).saturating_sub(line.len());
        let keep = content.len().min(room);
        line.extend_from_slice(&content[..keep]);
        *skipped += content.len() - keep;

        let used = newline.map_or(available.len(), |i| i + 1);
        reader.consume(used);
        read += used;
        if newline.is_some() {
            line.push(b'\n');
            return Ok(read);
        }
    }
}

/// 줄 끝을 정리해 보냅니다. 수신 측이 닫혔으면 false를 반환합니다.
async fn send_line(
    path: &Path,
    line: &mut Vec<u8>,
    skipped: &mut usize,
    max_line_length: usize,
    tx: &mpsc::Sender<InputItem>,
) -> bool {
    let mut data = std::mem::take(line);
    let dropped = std::mem::take(skipped);
    if data.last() == Some(&b'\n') {
        data.pop();
        if data.last() == Some(&b'\r') {
            data.pop();
        }
    }
    if data.len() > max_line_length {
        tracing::warn!(
            path = %path.display(),
            length = data.len() + dropped,
            max = max_line_length,
            "line too long, truncating"
        );
        data.truncate(max_line_length);
    }
    tx.send(InputItem::Line(Bytes::from(data))).await.is_ok()
}
