//! 파일 출력 (`out.file`)
//!
//! 청크 단위 출력입니다. 청크의 이벤트를 JSON 줄(`{"time":..,"record":{..}}`)로
//! 파일 끝에 덧붙입니다. 파일은 `start()`에서 열고 청크마다 flush합니다.
//! 청크 전체를 한 번에 쓰므로 실패하면 청크 전체가 버퍼에 남습니다.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use clap::Parser as ClapParser;
use serde::Serialize;

use swak_core::chunk::Chunk;
use swak_core::error::{DeliveryError, SwakError};
use swak_core::event::Record;
use swak_core::plugin::{ChunkOutput, Lifecycle, Plugin, StageKind};

use crate::registry::parse_args;

/// `out.file` 인자
#[derive(Debug, Clone, ClapParser)]
#[command(name = "out.file", about = "Append chunks to a file as JSON lines.")]
pub struct FileOutputArgs {
    /// 출력 파일 경로
    #[arg(long)]
    pub path: PathBuf,
}

#[derive(Serialize)]
struct Line<'a> {
    time: f64,
    record: &'a Record,
}

/// JSON 줄 파일 출력
pub struct FileOutput {
    lifecycle: Lifecycle,
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileOutput {
    pub const NAME: &'static str = "out.file";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            lifecycle: Lifecycle::new(Self::NAME),
            path: path.into(),
            writer: None,
        }
    }

    pub fn from_args(args: &[String]) -> Result<Self, SwakError> {
        let args: FileOutputArgs = parse_args(Self::NAME, args)?;
        Ok(Self::new(args.path))
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn write_chunk(&mut self, chunk: &Chunk) -> std::io::Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(std::io::Error::other("output file is not open"));
        };
        let mut body = Vec::with_capacity(chunk.bytes() as usize);
        for event in chunk.events() {
            serde_json::to_writer(
                &mut body,
                &Line {
                    time: event.time,
                    record: &event.record,
                },
            )?;
            body.push(b'\n');
        }
        writer.write_all(&body)?;
        writer.flush()
    }
}

impl Plugin for FileOutput {
    fn kind(&self) -> StageKind {
        StageKind::Output
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    fn start(&mut self) -> Result<(), SwakError> {
        if self.writer.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .inspect_err(|e| {
                    tracing::error!(path = %self.path.display(), error = %e, "failed to open output file");
                })?;
            self.writer = Some(BufWriter::new(file));
        }
        self.lifecycle.start()?;
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), SwakError> {
        self.lifecycle.terminate()?;
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl ChunkOutput for FileOutput {
    fn write(&mut self, chunk: &Chunk) -> Result<(), SwakError> {
        self.lifecycle.ensure_active("write")?;
        self.write_chunk(chunk).map_err(|e| {
            tracing::warn!(
                path = %self.path.display(),
                chunk_id = %chunk.id(),
                error = %e,
                "failed to write chunk"
            );
            DeliveryError {
                stage: Self::NAME.to_owned(),
                reason: e.to_string(),
            }
        })?;
        tracing::debug!(
            path = %self.path.display(),
            chunk_id = %chunk.id(),
            records = chunk.records(),
            "chunk written"
        );
        Ok(())
    }
}
