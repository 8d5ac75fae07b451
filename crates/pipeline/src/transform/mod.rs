//! 변환 플러그인 -- 수정자와 필터
//!
//! - [`Reform`] (`tr.reform`): 필드 추가/삭제, 자리표시자 치환
//! - [`Filter`] (`tr.filter`): 조건에 맞지 않는 레코드 DROP

pub mod filter;
pub mod reform;

pub use filter::{Condition, Filter, FilterArgs};
pub use reform::{HostInfo, Reform, ReformArgs, tag_prefix, tag_suffix};
