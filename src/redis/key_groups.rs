//! Folds the keys matching a glob pattern into a bounded set of groups.
//!
//! The text captured by each wildcard of the pattern is canonicalized, ids,
//! hashes and UUIDs collapse to `*`. So `user:1:profile` and
//! `user:2:profile` both land in the group `user:*:profile` of pattern
//! `user:*`.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::time::Instant;

use regex::Regex;

use super::Error;
use super::connection::{Executor, Reply};
use super::info::REDACTED;
use super::keys::KeyArg;
use super::output::Output;
use super::scan::{scan, select};

/// Keys of new groups beyond the cap are counted here.
pub const OVERFLOW: &str = "overflow";

const SEPARATORS: [char; 5] = [':', '.', '-', '_', '/'];

#[derive(Debug)]
enum Piece {
    Literal(String),
    Wildcard,
}

/// A compiled glob pattern
#[derive(Debug)]
pub struct Matcher {
    regex: Regex,
    pieces: Vec<Piece>,
}

impl Matcher {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut expr = String::from("^(?s)");

        let mut chars = pattern.chars();
        while let Some(c) = chars.next() {
            match c {
                '*' | '?' | '[' => {
                    let capture = match c {
                        '*' => Some("(.*)".to_string()),
                        '?' => Some("(.)".to_string()),
                        _ => class(&mut chars),
                    };

                    match capture {
                        Some(capture) => {
                            if !literal.is_empty() {
                                expr.push_str(&regex::escape(&literal));
                                pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                            }
                            expr.push_str(&capture);
                            pieces.push(Piece::Wildcard);
                        }
                        // unterminated class, redis matches it literally
                        None => literal.push('['),
                    }
                }
                '\\' => literal.push(chars.next().unwrap_or('\\')),
                c => literal.push(c),
            }
        }

        if !literal.is_empty() {
            expr.push_str(&regex::escape(&literal));
            pieces.push(Piece::Literal(literal));
        }
        expr.push('$');

        Ok(Matcher {
            regex: Regex::new(&expr)?,
            pieces,
        })
    }

    /// The group id of `key`, `None` if the key does not match.
    pub fn group(&self, key: &str) -> Option<String> {
        let captures = self.regex.captures(key)?;

        let mut group = String::with_capacity(key.len());
        let mut index = 1;
        for piece in &self.pieces {
            match piece {
                Piece::Literal(literal) => group.push_str(literal),
                Piece::Wildcard => {
                    let capture = captures.get(index).map(|m| m.as_str()).unwrap_or_default();
                    group.push_str(&canonicalize(capture));
                    index += 1;
                }
            }
        }

        Some(group)
    }
}

/// Consume a `[...]` class after the opening bracket, and returns it as a
/// regex capture group. The iterator is left untouched when there is no
/// closing bracket.
fn class(chars: &mut std::str::Chars<'_>) -> Option<String> {
    let mut iter = chars.clone();
    let mut body = String::new();
    let mut consumed = 0;

    while let Some(c) = iter.next() {
        consumed += 1;
        match c {
            ']' if !body.is_empty() && body != "^" => {
                for _ in 0..consumed {
                    chars.next();
                }
                return Some(format!("([{body}])"));
            }
            '\\' => {
                let escaped = iter.next()?;
                consumed += 1;
                body.push_str(&regex::escape(&escaped.to_string()));
            }
            '[' => body.push_str("\\["),
            c => body.push(c),
        }
    }

    None
}

/// Collapse every separated segment which looks like an id to `*`.
fn canonicalize(capture: &str) -> String {
    let mut segments = Vec::new();
    let mut seps = Vec::new();
    let mut start = 0;
    for (i, c) in capture.char_indices() {
        if SEPARATORS.contains(&c) {
            segments.push(&capture[start..i]);
            seps.push(c);
            start = i + c.len_utf8();
        }
    }
    segments.push(&capture[start..]);

    let mut canonical = String::with_capacity(capture.len());
    let mut i = 0;
    while i < segments.len() {
        if is_uuid(&segments[i..], &seps[i..]) {
            canonical.push('*');
            i += 5;
        } else {
            let segment = segments[i];
            if is_numeric(segment) || is_hash(segment) {
                canonical.push('*');
            } else {
                canonical.push_str(segment);
            }
            i += 1;
        }

        if i < segments.len() {
            canonical.push(seps[i - 1]);
        }
    }

    canonical
}

fn is_numeric(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|c| c.is_ascii_digit())
}

fn is_hash(segment: &str) -> bool {
    segment.len() >= 8
        && segment.bytes().all(|c| c.is_ascii_hexdigit())
        && segment.bytes().any(|c| c.is_ascii_digit())
}

/// `8-4-4-4-12` hex digits
fn is_uuid(segments: &[&str], seps: &[char]) -> bool {
    const LENGTHS: [usize; 5] = [8, 4, 4, 4, 12];

    segments.len() >= 5
        && seps.len() >= 4
        && seps[..4].iter().all(|sep| *sep == '-')
        && segments
            .iter()
            .zip(LENGTHS)
            .all(|(segment, len)| {
                segment.len() == len && segment.bytes().all(|c| c.is_ascii_hexdigit())
            })
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Usage {
    pub count: u64,
    pub memory: u64,
}

impl Usage {
    #[inline]
    fn record(&mut self, memory: u64) {
        self.count += 1;
        self.memory += memory;
    }
}

/// Per database accumulator, which holds at most `max` groups plus the
/// overflow bucket.
#[derive(Debug)]
pub struct Groups {
    max: usize,
    groups: BTreeMap<String, Usage>,
    overflow: Usage,
}

impl Groups {
    pub fn new(max: usize) -> Self {
        Self {
            max,
            groups: BTreeMap::new(),
            overflow: Usage::default(),
        }
    }

    pub fn add(&mut self, group: &str, memory: u64) {
        if let Some(usage) = self.groups.get_mut(group) {
            usage.record(memory);
            return;
        }

        if group != OVERFLOW && self.groups.len() < self.max {
            self.groups
                .entry(group.to_string())
                .or_default()
                .record(memory);
        } else {
            self.overflow.record(memory);
        }
    }

    /// Retained groups in order, then the overflow bucket if it is not empty
    pub fn iter(&self) -> impl Iterator<Item = (&str, Usage)> {
        let overflow = (self.overflow.count > 0).then_some((OVERFLOW, self.overflow));

        self.groups
            .iter()
            .map(|(group, usage)| (group.as_str(), *usage))
            .chain(overflow)
    }

    /// The number of group labels `iter` yields
    pub fn distinct(&self) -> usize {
        self.groups.len() + usize::from(self.overflow.count > 0)
    }
}

/// A `check_key_groups` entry
#[derive(Debug)]
pub struct KeyGroup {
    pub db: u32,
    pub pattern: String,
    matcher: Matcher,
}

impl KeyGroup {
    pub fn new(arg: KeyArg) -> Result<Self, Error> {
        let matcher = Matcher::new(&arg.pattern).map_err(|err| Error::Pattern {
            pattern: arg.pattern.clone(),
            err,
        })?;

        Ok(KeyGroup {
            db: arg.db,
            pattern: arg.pattern,
            matcher,
        })
    }
}

/// Scan the keys of one rule and resolve their groups, any failed command
/// drops the whole contribution of the rule.
async fn scan_rule(
    conn: &mut dyn Executor,
    rule: &KeyGroup,
    batch_size: usize,
    exceeded: &AtomicU64,
) -> Result<Vec<(String, u64)>, Error> {
    select(conn, rule.db).await?;

    let keys = scan(conn, &rule.pattern, batch_size, None, exceeded).await?;
    let mut resolved = Vec::with_capacity(keys.len());
    for key in keys {
        let Ok(key) = std::str::from_utf8(&key) else {
            resolved.push((REDACTED.to_string(), 0));
            continue;
        };

        let Some(group) = rule.matcher.group(key) else {
            continue;
        };

        let memory = match conn.execute(&["MEMORY", "USAGE", key]).await? {
            Reply::Integer(bytes) => bytes.max(0) as u64,
            _ => 0,
        };

        resolved.push((group, memory));
    }

    Ok(resolved)
}

pub async fn collect(
    conn: &mut dyn Executor,
    rules: &[KeyGroup],
    max_distinct_groups: usize,
    batch_size: usize,
    exceeded: &AtomicU64,
    out: &mut Output<'_>,
) -> Result<(), Error> {
    if rules.is_empty() {
        return Ok(());
    }

    let start = Instant::now();
    let mut databases = BTreeMap::new();
    for rule in rules {
        let groups = databases
            .entry(rule.db)
            .or_insert_with(|| Groups::new(max_distinct_groups));

        match scan_rule(conn, rule, batch_size, exceeded).await {
            Ok(resolved) => {
                for (group, memory) in resolved {
                    groups.add(&group, memory);
                }
            }
            Err(err) => {
                warn!(
                    message = "collect key groups failed",
                    db = rule.db,
                    pattern = %rule.pattern,
                    %err
                );
            }
        }
    }

    for (db, groups) in databases {
        let db = format!("db{db}");

        for (group, usage) in groups.iter() {
            out.emit("key_group_count", usage.count, &[&db, group]);
            out.emit("key_group_memory_usage_bytes", usage.memory, &[&db, group]);
        }

        out.emit("number_of_distinct_key_groups", groups.distinct(), &[&db]);
    }

    out.emit(
        "last_key_groups_scrape_duration_milliseconds",
        start.elapsed().as_secs_f64() * 1000.0,
        &[],
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::redis::registry::Registry;
    use crate::redis::testing::{MockExecutor, scan_reply, text_reply};

    fn group(pattern: &str, key: &str) -> Option<String> {
        Matcher::new(pattern).unwrap().group(key)
    }

    #[test]
    fn equivalent_keys_collapse() {
        for (pattern, key, want) in [
            ("user:*:profile", "user:1:profile", "user:*:profile"),
            ("user:*:profile", "user:2:profile", "user:*:profile"),
            ("user:*", "user:42:profile", "user:*:profile"),
            ("user:*", "user:alice:profile", "user:alice:profile"),
            ("session:*", "session:5f2b9c7e1a", "session:*"),
            ("session:*", "session:deadbeef", "session:deadbeef"),
            (
                "order:*",
                "order:123e4567-e89b-12d3-a456-426614174000:items",
                "order:*:items",
            ),
            ("cache/*", "cache/v1/2024/index.html", "cache/v1/*/index.html"),
            ("item:?", "item:7", "item:*"),
            ("item:?", "item:x", "item:x"),
            ("shard[0-9]:*", "shard3:10", "shard*:*"),
            ("plain", "plain", "plain"),
            ("a.b*", "a.b_1_x", "a.b_*_x"),
        ] {
            assert_eq!(group(pattern, key).as_deref(), Some(want), "{pattern} {key}");
        }
    }

    #[test]
    fn not_matching() {
        assert_eq!(group("user:*", "order:1"), None);
        assert_eq!(group("a.b", "axb"), None);
        assert_eq!(group("[unterminated", "[unterminated"), Some("[unterminated".to_string()));
    }

    #[test]
    fn uuid() {
        assert_eq!(canonicalize("123e4567-e89b-12d3-a456-426614174000"), "*");
        assert_eq!(canonicalize("abc-123e4567-e89b-12d3-a456-426614174000"), "abc-*");
        assert_eq!(canonicalize("not-a-uuid"), "not-a-uuid");
        assert_eq!(canonicalize(""), "");
        assert_eq!(canonicalize("1:"), "*:");
    }

    #[test]
    fn cap_and_overflow() {
        let mut groups = Groups::new(2);

        groups.add("a", 1);
        groups.add("b", 2);
        groups.add("a", 3);
        groups.add("c", 4);
        groups.add("d", 5);
        groups.add("b", 6);

        assert_eq!(
            groups.iter().collect::<Vec<_>>(),
            vec![
                ("a", Usage { count: 2, memory: 4 }),
                ("b", Usage { count: 2, memory: 8 }),
                (OVERFLOW, Usage { count: 2, memory: 9 }),
            ]
        );
        assert_eq!(groups.distinct(), 3);
    }

    #[test]
    fn cap_is_never_exceeded() {
        for max in [0, 1, 5, 100] {
            let mut groups = Groups::new(max);
            for i in 0..500 {
                groups.add(&format!("group-{i}"), 1);
            }

            let labels = groups.iter().map(|(group, _)| group).collect::<Vec<_>>();
            assert!(labels.len() <= max + 1);
            assert_eq!(labels.iter().filter(|g| **g == OVERFLOW).count(), 1);
            assert_eq!(groups.iter().map(|(_, usage)| usage.count).sum::<u64>(), 500);
        }
    }

    #[test]
    fn no_overflow_when_under_cap() {
        let mut groups = Groups::new(10);
        groups.add("a", 1);

        assert_eq!(groups.distinct(), 1);
        assert!(groups.iter().all(|(group, _)| group != OVERFLOW));
    }

    #[tokio::test]
    async fn collect_groups() {
        let mut conn = MockExecutor::default()
            .reply("SELECT 0", text_reply("OK"))
            .reply(
                "SCAN 0 MATCH user:* COUNT 100",
                scan_reply("0", &["user:1:profile", "user:2:profile", "user:3:cart"]),
            )
            .reply("MEMORY USAGE user:1:profile", Reply::Integer(10))
            .reply("MEMORY USAGE user:2:profile", Reply::Integer(20))
            .reply("MEMORY USAGE user:3:cart", Reply::Integer(5))
            .reply("SELECT 1", text_reply("OK"))
            .reply("SCAN 0 MATCH broken:* COUNT 100", scan_reply("0", &["broken:1"]));

        let rules = [
            KeyGroup::new("db0=user:*".parse().unwrap()).unwrap(),
            // MEMORY USAGE is not scripted for broken:1
            KeyGroup::new("db1=broken:*".parse().unwrap()).unwrap(),
        ];

        let registry = Registry::new(false).unwrap();
        let mut out = Output::new(&registry, "");
        let exceeded = AtomicU64::new(0);

        collect(&mut conn, &rules, 1, 100, &exceeded, &mut out)
            .await
            .unwrap();

        let metrics = out
            .into_metrics()
            .iter()
            .filter(|m| m.name() != "last_key_groups_scrape_duration_milliseconds")
            .map(|m| m.to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            metrics,
            vec![
                r#"key_group_count{db="db0",key_group="user:*:profile"} 2"#,
                r#"key_group_memory_usage_bytes{db="db0",key_group="user:*:profile"} 30"#,
                r#"key_group_count{db="db0",key_group="overflow"} 1"#,
                r#"key_group_memory_usage_bytes{db="db0",key_group="overflow"} 5"#,
                r#"number_of_distinct_key_groups{db="db0"} 2"#,
                r#"number_of_distinct_key_groups{db="db1"} 0"#,
            ]
        );
    }
}
