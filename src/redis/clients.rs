use std::collections::BTreeMap;

use bytes::Bytes;
use event::tags::Tags;

use super::Error;
use super::connection::{Executor, ExecutorExt};
use super::info::REDACTED;
use super::output::Output;

/// One line of `CLIENT LIST`, values which are not UTF-8 are redacted
///
/// ```text
/// id=3 addr=127.0.0.1:52555 laddr=127.0.0.1:6379 fd=8 name= age=10 idle=0
///   flags=N db=0 ... omem=0 tot-mem=22298 ... cmd=client|list user=default
/// ```
fn parse_line(line: &[u8]) -> Option<BTreeMap<&str, &str>> {
    if !line.starts_with(b"id=") {
        return None;
    }

    let client = line
        .split(|c| c.is_ascii_whitespace())
        .filter_map(|part| {
            let pos = part.iter().position(|c| *c == b'=')?;
            let key = std::str::from_utf8(&part[..pos]).ok()?;
            let value = std::str::from_utf8(&part[pos + 1..]).unwrap_or(REDACTED);
            Some((key, value))
        })
        .collect::<BTreeMap<_, _>>();

    client.contains_key("addr").then_some(client)
}

/// `now - seconds`, as a unix timestamp
fn since(now: f64, field: Option<&&str>) -> String {
    let seconds = field
        .and_then(|value| value.parse::<f64>().ok())
        .unwrap_or_default();

    format!("{}", (now - seconds) as i64)
}

pub async fn collect(
    conn: &mut dyn Executor,
    export_port: bool,
    now: f64,
    out: &mut Output<'_>,
) -> Result<(), Error> {
    let raw: Bytes = conn.query(&["CLIENT", "LIST"]).await?;

    for line in raw.split(|c| *c == b'\n') {
        let Some(client) = parse_line(line) else {
            continue;
        };

        let field = |key: &str| client.get(key).copied().unwrap_or_default();
        let (host, port) = field("addr").rsplit_once(':').unwrap_or((field("addr"), ""));

        let mut tags = Tags::with_capacity(11);
        tags.insert("id", field("id"));
        tags.insert("name", field("name"));
        tags.insert("user", field("user"));
        tags.insert("created_at", since(now, client.get("age")));
        tags.insert("idle_since", since(now, client.get("idle")));
        tags.insert("flags", field("flags"));
        tags.insert("db", field("db"));
        tags.insert("omem", field("omem"));
        tags.insert("cmd", field("cmd"));
        tags.insert("host", host);
        if export_port {
            tags.insert("port", port);
        }
        out.dynamic(
            "connected_client_info",
            "Details about a connected client",
            1,
            tags,
        );

        let mut tags = Tags::with_capacity(5);
        tags.insert("id", field("id"));
        tags.insert("name", field("name"));
        tags.insert("flags", field("flags"));
        tags.insert("host", host);
        if export_port {
            tags.insert("port", port);
        }

        if let Ok(omem) = field("omem").parse::<f64>() {
            out.dynamic(
                "connected_client_output_buffer_memory_usage_bytes",
                "A connected client's output buffer memory usage in bytes",
                omem,
                tags.clone(),
            );
        }
        if let Ok(total) = field("tot-mem").parse::<f64>() {
            out.dynamic(
                "connected_client_total_memory_consumed_bytes",
                "Total memory consumed by a client in its various buffers",
                total,
                tags,
            );
        }
    }

    Ok(())
}
