//! 출력 플러그인
//!
//! 출력은 레코드 단위([`RecordOutput`](swak_core::plugin::RecordOutput)) 또는
//! 청크 단위([`ChunkOutput`](swak_core::plugin::ChunkOutput)) 중 정확히 하나를 구현합니다.
//!
//! | 이름 | 방식 |
//! |---|---|
//! | `out.stdout` | 레코드 |
//! | `out.file` | 청크 |
//! | `out.memory` | 레코드 (`--chunked`이면 청크) |

pub mod file;
pub mod memory;
pub mod stdout;

pub use file::{FileOutput, FileOutputArgs};
pub use memory::{MemoryChunkOutput, MemoryHandle, MemoryOutput, MemoryOutputArgs};
pub use stdout::{StdoutArgs, StdoutOutput, format_time};
