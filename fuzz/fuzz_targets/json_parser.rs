#![no_main]

use libfuzzer_sys::fuzz_target;
use swak_core::plugin::{Parser, Plugin};
use swak_pipeline::parser::{JsonParser, JsonParserArgs};

fuzz_target!(|data: &[u8]| {
    let mut parser = JsonParser::new(JsonParserArgs {
        time_key: Some("time".to_owned()),
        max_input_size: 64 * 1024,
    });
    if parser.start().is_err() {
        return;
    }
    if let Ok(record) = parser.parse(data) {
        let _ = parser.event_time(&record);
    }
});
