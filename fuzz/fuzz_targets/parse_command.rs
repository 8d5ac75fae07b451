#![no_main]

use libfuzzer_sys::fuzz_target;
use swak_pipeline::parse_command;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(tokens) = parse_command(s) {
            // 구간 수는 인용 밖의 파이프 수 + 1
            assert!(!tokens.is_empty());
            assert!(tokens.len() <= s.matches('|').count() + 1);
        }
    }
});
