#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use swak_core::chunk::Chunk;
use swak_core::config::OverflowPolicy;
use swak_core::error::{DeliveryError, SwakError};
use swak_core::event::{EventStream, Record};
use swak_core::plugin::{Buffer, Plugin};
use swak_pipeline::{BufferConfigBuilder, SizedBuffer};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    chunk_max_record: u8,
    chunk_max_size: Option<u16>,
    buffer_max_chunk: Option<u8>,
    evict: bool,
    ops: Vec<Op>,
}

#[derive(Arbitrary, Debug)]
enum Op {
    /// 레코드 n개짜리 스트림 추가 (각 레코드 값 길이 len)
    Append { n: u8, len: u8 },
    Tick,
    Flush { force: bool, fail: bool },
}

fuzz_target!(|input: FuzzInput| {
    let mut builder = BufferConfigBuilder::new()
        .chunk_max_record(u64::from(input.chunk_max_record))
        .overflow(if input.evict {
            OverflowPolicy::EvictOldest
        } else {
            OverflowPolicy::Reject
        });
    if let Some(size) = input.chunk_max_size {
        builder = builder.chunk_max_size(u64::from(size));
    }
    if let Some(chunks) = input.buffer_max_chunk {
        builder = builder.buffer_max_chunk(u64::from(chunks));
    }
    // 잘못된 조합은 생성 단계에서 거부됨
    let Ok(config) = builder.build() else {
        return;
    };

    let mut buffer = SizedBuffer::new(config);
    if buffer.start().is_err() {
        return;
    }

    for op in input.ops.into_iter().take(64) {
        match op {
            Op::Append { n, len } => {
                let records: Vec<Record> = (0..n.min(16))
                    .map(|i| {
                        let mut r = Record::new();
                        r.insert("v".to_owned(), "x".repeat(usize::from(len)).into());
                        r.insert("i".to_owned(), i.into());
                        r
                    })
                    .collect();
                let times = vec![0.0; records.len()];
                let Ok(stream) = EventStream::multi(times, records) else {
                    return;
                };
                let before = buffer.total_records();
                let added = stream.len();
                match buffer.append(stream) {
                    Ok(()) => assert!(buffer.total_records() <= before + added),
                    // 거부된 추가는 버퍼를 바꾸지 않음
                    Err(SwakError::BufferFull(_)) if !input.evict => {
                        assert_eq!(buffer.total_records(), before);
                    }
                    Err(_) => {}
                }
            }
            Op::Tick => {
                let _ = buffer.tick();
            }
            Op::Flush { force, fail } => {
                let before = buffer.total_records();
                let mut deliver = |_: &Chunk| -> Result<(), SwakError> {
                    if fail {
                        Err(DeliveryError {
                            stage: "fuzz".to_owned(),
                            reason: "injected".to_owned(),
                        }
                        .into())
                    } else {
                        Ok(())
                    }
                };
                match buffer.flush(force, &mut deliver) {
                    Ok(report) => assert_eq!(buffer.total_records(), before - report.records),
                    // 실패한 청크는 버려지지 않음
                    Err(_) => assert_eq!(buffer.total_records(), before),
                }
            }
        }
    }
});
