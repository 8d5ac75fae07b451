//! 레코드 재구성 수정자 (`tr.reform`)
//!
//! 필드를 추가/덮어쓰기(`-a KEY VALUE`)하거나 삭제(`-d KEY`)합니다.
//! 같은 키를 추가하고 삭제하면 삭제가 이깁니다.
//!
//! # 값 치환
//! | 자리표시자 | 값 |
//! |---|---|
//! | `${hostname}` | 호스트 이름 |
//! | `${hostaddr}` | 호스트 IPv4 주소 |
//! | `${hostaddr_parts[i]}` | 주소의 i번째 옥텟 (음수는 뒤에서부터) |
//! | `${tag}` | 이벤트 태그 |
//! | `${tag_parts[i]}` | 태그의 i번째 부분 (음수는 뒤에서부터) |
//! | `${tag_prefix[i]}` | 앞에서 i+1개 부분 (`a`, `a.b`, `a.b.c`) |
//! | `${tag_suffix[i]}` | 뒤에서 i+1개 부분 (`c`, `b.c`, `a.b.c`) |
//! | `${record[key]}` | 현재 레코드 값 (앞선 추가가 반영된 값) |
//! | `${time}` | 이벤트 시각 |
//!
//! 알 수 없거나 범위를 벗어난 자리표시자는 글자 그대로 남습니다.
//! 태그 관련 값은 태그가 바뀔 때 한 번만 계산합니다.

use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};

use clap::{ArgAction, Parser as ClapParser};
use serde_json::Value;

use swak_core::error::{PluginError, SwakError};
use swak_core::event::{Event, Record};
use swak_core::plugin::{Lifecycle, Plugin, StageKind, Transform, TransformKind};

use crate::registry::parse_args;

/// `tr.reform` 인자
#[derive(Debug, Clone, Default, ClapParser)]
#[command(name = "tr.reform", about = "Add, delete, overwrite record field.")]
pub struct ReformArgs {
    /// 추가할 키/값 쌍
    #[arg(short = 'a', long = "add", num_args = 2, value_names = ["KEY", "VALUE"], action = ArgAction::Append)]
    pub add: Vec<String>,

    /// 삭제할 키
    #[arg(short = 'd', long = "del", value_name = "KEY", action = ArgAction::Append)]
    pub del: Vec<String>,
}

/// 태그 부분 목록의 접두어 목록을 만듭니다. `[a, b, c]` → `[a, a.b, a.b.c]`
pub fn tag_prefix(parts: &[&str]) -> Vec<String> {
    (1..=parts.len()).map(|i| parts[..i].join(".")).collect()
}

/// 태그 부분 목록의 접미어 목록을 만듭니다. `[a, b, c]` → `[c, b.c, a.b.c]`
pub fn tag_suffix(parts: &[&str]) -> Vec<String> {
    (1..=parts.len())
        .map(|i| parts[parts.len() - i..].join("."))
        .collect()
}

/// 호스트 정보 (생성 시 한 번 조회)
#[derive(Debug, Clone)]
pub struct HostInfo {
    pub hostname: String,
    pub hostaddr: String,
}

impl HostInfo {
    /// 현재 호스트 정보를 조회합니다. 실패하면 `localhost`/`127.0.0.1`을 씁니다.
    pub fn detect() -> Self {
        let hostname = hostname::get()
            .inspect_err(|e| tracing::warn!(error = %e, "failed to read hostname, using localhost"))
            .ok()
            .map(|h| h.to_string_lossy().trim().to_owned())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_owned());
        let hostaddr = resolve_ipv4(&hostname).unwrap_or(Ipv4Addr::LOCALHOST);
        Self {
            hostname,
            hostaddr: hostaddr.to_string(),
        }
    }
}

fn resolve_ipv4(hostname: &str) -> Option<Ipv4Addr> {
    (hostname, 0)
        .to_socket_addrs()
        .ok()?
        .find_map(|addr| match addr.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
}

/// 태그별로 미리 계산한 값
#[derive(Debug, Clone, Default)]
struct TagContext {
    tag: String,
    parts: Vec<String>,
    prefix: Vec<String>,
    suffix: Vec<String>,
}

impl TagContext {
    fn new(tag: &str) -> Self {
        let parts: Vec<&str> = tag.split('.').collect();
        Self {
            tag: tag.to_owned(),
            prefix: tag_prefix(&parts),
            suffix: tag_suffix(&parts),
            parts: parts.into_iter().map(str::to_owned).collect(),
        }
    }
}

/// 필드 추가/삭제 수정자
pub struct Reform {
    lifecycle: Lifecycle,
    adds: Vec<(String, String)>,
    dels: Vec<String>,
    host: HostInfo,
    context: Option<TagContext>,
}

impl Reform {
    pub const NAME: &'static str = "tr.reform";

    pub fn new(adds: Vec<(String, String)>, dels: Vec<String>) -> Self {
        Self::with_host(adds, dels, HostInfo::detect())
    }

    /// 호스트 정보를 지정해 생성합니다.
    pub fn with_host(adds: Vec<(String, String)>, dels: Vec<String>, host: HostInfo) -> Self {
        Self {
            lifecycle: Lifecycle::new(Self::NAME),
            adds,
            dels,
            host,
            context: None,
        }
    }

    pub fn from_args(args: &[String]) -> Result<Self, SwakError> {
        let args: ReformArgs = parse_args(Self::NAME, args)?;
        if args.add.len() % 2 != 0 {
            return Err(PluginError::InvalidArgs {
                name: Self::NAME.to_owned(),
                reason: "--add takes a KEY and a VALUE".to_owned(),
            }
            .into());
        }
        let adds = args
            .add
            .chunks(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect();
        Ok(Self::new(adds, args.del))
    }

    fn prepare(&mut self, tag: &str) {
        if self.context.as_ref().is_some_and(|c| c.tag == tag) {
            return;
        }
        self.context = Some(TagContext::new(tag));
    }

    /// 값 문자열의 자리표시자를 치환합니다.
    fn expand(&self, value: &str, time: f64, record: &Record) -> String {
        let mut out = String::with_capacity(value.len());
        let mut rest = value;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                out.push_str(&rest[start..]);
                return out;
            };
            let name = &after[..end];
            match self.lookup(name, time, record) {
                Some(resolved) => out.push_str(&resolved),
                None => out.push_str(&rest[start..start + 2 + end + 1]),
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        out
    }

    fn lookup(&self, name: &str, time: f64, record: &Record) -> Option<String> {
        let context = self.context.as_ref();
        match name {
            "hostname" => return Some(self.host.hostname.clone()),
            "hostaddr" => return Some(self.host.hostaddr.clone()),
            "tag" => return context.map(|c| c.tag.clone()),
            "time" => return Some(time.to_string()),
            _ => {}
        }

        let (base, index) = name.strip_suffix(']')?.split_once('[')?;
        if base == "record" {
            return record.get(index).map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        }

        let index: isize = index.parse().ok()?;
        let addr_parts: Vec<String>;
        let list: &[String] = match base {
            "tag_parts" => &context?.parts,
            "tag_prefix" => &context?.prefix,
            "tag_suffix" => &context?.suffix,
            "hostaddr_parts" => {
                addr_parts = self.host.hostaddr.split('.').map(str::to_owned).collect();
                &addr_parts
            }
            _ => return None,
        };
        let position = if index < 0 {
            list.len().checked_sub(index.unsigned_abs())?
        } else {
            index as usize
        };
        list.get(position).cloned()
    }
}

impl Plugin for Reform {
    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }
}

impl Transform for Reform {
    fn transform_kind(&self) -> TransformKind {
        TransformKind::Modifier
    }

    fn prepare_for_stream(&mut self, tag: &str) {
        self.prepare(tag);
    }

    fn process(&mut self, tag: &str, mut event: Event) -> Result<Option<Event>, SwakError> {
        self.lifecycle.ensure_active("process")?;
        self.prepare(tag);

        for (key, value) in &self.adds {
            let expanded = self.expand(value, event.time, &event.record);
            event.record.insert(key.clone(), Value::String(expanded));
        }
        for key in &self.dels {
            event.record.remove(key);
        }
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn host() -> HostInfo {
        HostInfo {
            hostname: "web-01".to_owned(),
            hostaddr: "10.1.2.3".to_owned(),
        }
    }

    fn started(adds: &[(&str, &str)], dels: &[&str]) -> Reform {
        let adds = adds
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        let dels = dels.iter().map(|d| (*d).to_owned()).collect();
        let mut reform = Reform::with_host(adds, dels, host());
        reform.start().unwrap();
        reform
    }

    fn run(reform: &mut Reform, tag: &str, record: Record) -> Record {
        reform
            .process(tag, Event::new(1.5, record))
            .unwrap()
            .unwrap()
            .record
    }

    #[test]
    fn tag_prefix_and_suffix() {
        assert_eq!(tag_prefix(&["a", "b", "c"]), vec!["a", "a.b", "a.b.c"]);
        assert_eq!(tag_suffix(&["a", "b", "c"]), vec!["c", "b.c", "a.b.c"]);
        assert_eq!(tag_suffix(&["test"]), vec!["test"]);
        assert!(tag_prefix(&[]).is_empty());
    }

    #[test]
    fn adds_and_deletes_fields() {
        let mut reform = started(&[("k1", "v1"), ("k2", "v2")], &[]);
        let record = run(&mut reform, "test", Record::new());
        assert_eq!(record.len(), 2);
        assert_eq!(record["k1"], json!("v1"));

        let mut reform = started(&[], &["k1"]);
        let mut input = Record::new();
        input.insert("k1".to_owned(), json!("v1"));
        input.insert("k2".to_owned(), json!("v2"));
        let record = run(&mut reform, "test", input);
        assert_eq!(record.len(), 1);
        assert!(!record.contains_key("k1"));
    }

    #[test]
    fn delete_wins_over_add() {
        let mut reform = started(&[("k", "v")], &["k"]);
        let record = run(&mut reform, "test", Record::new());
        assert!(!record.contains_key("k"));
    }

    #[test]
    fn expands_placeholders() {
        let mut reform = started(
            &[
                ("f1", "${record[f1]}_mod"),
                ("f2", "${record[f1]}_2"),
                ("host", "${hostname}"),
                ("addr", "${hostaddr}"),
                ("firsttag", "${tag_parts[0]}"),
                ("lasttag", "${tag_parts[-1]}"),
                ("first2addr", "${hostaddr_parts[0]}.${hostaddr_parts[1]}"),
                ("last2addr", "${hostaddr_parts[-2]}.${hostaddr_parts[-1]}"),
                ("prefix", "${tag_prefix[1]}"),
                ("suffix", "${tag_suffix[1]}"),
                ("whole", "${tag}@${time}"),
            ],
            &[],
        );
        let mut input = Record::new();
        input.insert("f1".to_owned(), json!("1"));
        let record = run(&mut reform, "a.b.c", input);

        assert_eq!(record["f1"], json!("1_mod"));
        // 앞선 추가가 반영된 레코드를 봄
        assert_eq!(record["f2"], json!("1_mod_2"));
        assert_eq!(record["host"], json!("web-01"));
        assert_eq!(record["addr"], json!("10.1.2.3"));
        assert_eq!(record["firsttag"], json!("a"));
        assert_eq!(record["lasttag"], json!("c"));
        assert_eq!(record["first2addr"], json!("10.1"));
        assert_eq!(record["last2addr"], json!("2.3"));
        assert_eq!(record["prefix"], json!("a.b"));
        assert_eq!(record["suffix"], json!("b.c"));
        assert_eq!(record["whole"], json!("a.b.c@1.5"));
    }

    #[test]
    fn unknown_placeholders_stay_literal() {
        let mut reform = started(
            &[
                ("a", "${nope}"),
                ("b", "${tag_parts[9]}"),
                ("c", "${record[missing]}"),
                ("d", "open ${tag"),
                ("e", "{lit}"),
            ],
            &[],
        );
        let record = run(&mut reform, "x.y", Record::new());
        assert_eq!(record["a"], json!("${nope}"));
        assert_eq!(record["b"], json!("${tag_parts[9]}"));
        assert_eq!(record["c"], json!("${record[missing]}"));
        assert_eq!(record["d"], json!("open ${tag"));
        assert_eq!(record["e"], json!("{lit}"));
    }

    #[test]
    fn non_string_record_values_are_rendered() {
        let mut reform = started(&[("copy", "n=${record[n]}")], &[]);
        let mut input = Record::new();
        input.insert("n".to_owned(), json!(42));
        let record = run(&mut reform, "t", input);
        assert_eq!(record["copy"], json!("n=42"));
    }

    #[test]
    fn tag_context_follows_tag_changes() {
        let mut reform = started(&[("first", "${tag_parts[0]}")], &[]);
        reform.prepare_for_stream("alpha.one");
        let a = run(&mut reform, "alpha.one", Record::new());
        let b = run(&mut reform, "beta.two", Record::new());
        assert_eq!(a["first"], json!("alpha"));
        assert_eq!(b["first"], json!("beta"));
    }

    #[test]
    fn from_args_pairs_add_values() {
        let args: Vec<String> = ["-a", "k1", "v1", "--add", "k2", "v 2", "-d", "old"]
            .iter()
            .map(|s| (*s).to_owned())
            .collect();
        let reform = Reform::from_args(&args).unwrap();
        assert_eq!(
            reform.adds,
            vec![
                ("k1".to_owned(), "v1".to_owned()),
                ("k2".to_owned(), "v 2".to_owned())
            ]
        );
        assert_eq!(reform.dels, vec!["old"]);
    }

    #[test]
    fn add_requires_two_values() {
        let args = vec!["-a".to_owned(), "lonely".to_owned()];
        assert!(Reform::from_args(&args).is_err());
    }

    #[test]
    fn detect_host_never_empty() {
        let info = HostInfo::detect();
        assert!(!info.hostname.is_empty());
        assert_eq!(info.hostaddr.split('.').count(), 4);
    }

    #[test]
    fn detect_host_uses_system_hostname() {
        let system = hostname::get().unwrap();
        let info = HostInfo::detect();
        assert_eq!(info.hostname, system.to_string_lossy().trim());
    }
}
