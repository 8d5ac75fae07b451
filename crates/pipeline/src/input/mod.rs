//! 입력 플러그인 -- 외부 소스에서 이벤트를 생산합니다.
//!
//! # 입력 종류
//! - [`CounterInput`] (`in.counter`): 증가하는 숫자 레코드 (레코드 입력)
//! - [`FileInput`] (`in.file`): 파일의 줄 (텍스트 입력, `tail -f` 방식 추적 지원)
//!
//! 각 입력은 자체 tokio 태스크에서 실행되며, 생산한 항목을
//! `tokio::mpsc::Sender<InputItem>` 채널로 실행기에 전달합니다.

pub mod counter;
pub mod file;

pub use counter::{CounterArgs, CounterInput};
pub use file::{FileInput, FileInputArgs};
