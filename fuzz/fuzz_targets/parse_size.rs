#![no_main]

use libfuzzer_sys::fuzz_target;
use swak_core::config::parse_size;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(bytes) = parse_size("chunk_max_size", s) {
            // 성공한 값은 단위를 바꿔 다시 써도 같은 바이트 수
            let again = parse_size("chunk_max_size", &format!("{bytes}b"));
            assert_eq!(again.ok(), Some(bytes));
        }
    }
});
