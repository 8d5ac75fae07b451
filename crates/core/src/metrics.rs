//! 메트릭 상수 및 설명 등록
//!
//! 라우터, 파서, 버퍼가 기록하는 메트릭 이름을 중앙에서 정의합니다.
//! 각 모듈은 이 상수로 `metrics::counter!()`, `metrics::gauge!()`를 호출합니다.
//! 레코더가 설치되지 않으면 기록은 no-op입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `swak_`
//! - 컴포넌트: `router_`, `parser_`, `buffer_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(swak_core::metrics::ROUTER_EVENTS_EMITTED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 태그 레이블 키
pub const LABEL_TAG: &str = "tag";

/// 스테이지 이름 레이블 키
pub const LABEL_STAGE: &str = "stage";

/// 드롭 사유 레이블 키 (filtered, transform_failed)
pub const LABEL_REASON: &str = "reason";

// ─── Router 메트릭 ──────────────────────────────────────────────────

/// Router: emit 호출 수 (counter, label: tag)
pub const ROUTER_EVENTS_EMITTED_TOTAL: &str = "swak_router_events_emitted_total";

/// Router: 체인에서 드롭된 이벤트 수 (counter, label: reason)
pub const ROUTER_EVENTS_DROPPED_TOTAL: &str = "swak_router_events_dropped_total";

/// Router: 변환 스테이지 실패 수 (counter, label: stage)
pub const ROUTER_TRANSFORM_ERRORS_TOTAL: &str = "swak_router_transform_errors_total";

// ─── Parser 메트릭 ──────────────────────────────────────────────────

/// Parser: 파싱 실패 줄 수 (counter, label: stage)
pub const PARSER_ERRORS_TOTAL: &str = "swak_parser_errors_total";

// ─── Buffer 메트릭 ──────────────────────────────────────────────────

/// Buffer: 봉인된 청크 수 (counter, label: reason)
pub const BUFFER_CHUNKS_SEALED_TOTAL: &str = "swak_buffer_chunks_sealed_total";

/// Buffer: 전달 완료된 청크 수 (counter)
pub const BUFFER_CHUNKS_FLUSHED_TOTAL: &str = "swak_buffer_chunks_flushed_total";

/// Buffer: 오버플로로 버려진 청크 수 (counter)
pub const BUFFER_CHUNKS_EVICTED_TOTAL: &str = "swak_buffer_chunks_evicted_total";

/// Buffer: 거부된 append 수 (counter)
pub const BUFFER_APPEND_REJECTED_TOTAL: &str = "swak_buffer_append_rejected_total";

/// Buffer: 전달 실패 수 (counter)
pub const BUFFER_DELIVERY_FAILURES_TOTAL: &str = "swak_buffer_delivery_failures_total";

/// Buffer: 현재 보유 바이트 (gauge)
pub const BUFFER_SIZE_BYTES: &str = "swak_buffer_size_bytes";

/// Buffer: 현재 보유 청크 수 (gauge)
pub const BUFFER_CHUNKS: &str = "swak_buffer_chunks";

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다. 레코더가 없어도 안전합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    // Router
    describe_counter!(
        ROUTER_EVENTS_EMITTED_TOTAL,
        "Total number of events passed to the router"
    );
    describe_counter!(
        ROUTER_EVENTS_DROPPED_TOTAL,
        "Total number of events dropped by a rule chain"
    );
    describe_counter!(
        ROUTER_TRANSFORM_ERRORS_TOTAL,
        "Total number of transform stage failures isolated by the router"
    );

    // Parser
    describe_counter!(PARSER_ERRORS_TOTAL, "Total number of lines that failed to parse");

    // Buffer
    describe_counter!(
        BUFFER_CHUNKS_SEALED_TOTAL,
        "Total number of chunks sealed, by reason"
    );
    describe_counter!(
        BUFFER_CHUNKS_FLUSHED_TOTAL,
        "Total number of chunks acknowledged by the output"
    );
    describe_counter!(
        BUFFER_CHUNKS_EVICTED_TOTAL,
        "Total number of sealed chunks evicted by the overflow policy"
    );
    describe_counter!(
        BUFFER_APPEND_REJECTED_TOTAL,
        "Total number of appends rejected by the overflow policy"
    );
    describe_counter!(
        BUFFER_DELIVERY_FAILURES_TOTAL,
        "Total number of chunk deliveries that failed and were kept for retry"
    );
    describe_gauge!(BUFFER_SIZE_BYTES, "Approximate bytes currently held in the buffer");
    describe_gauge!(BUFFER_CHUNKS, "Number of chunks currently held in the buffer");
}
