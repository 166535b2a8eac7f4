use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;

use super::Error;
use super::connection::{Error as ConnectionError, Executor, Reply};
use super::keys::KeyArg;
use super::output::Output;
use super::scan::{is_glob, scan, select};

type Fields = BTreeMap<String, Reply>;

/// Turn a flat `[k1, v1, k2, v2, ...]` reply into a map, non UTF-8 keys are
/// skipped.
fn fields(reply: Reply) -> Result<Fields, ConnectionError> {
    Ok(reply
        .into_pairs()?
        .into_iter()
        .filter_map(|(key, value)| key.as_str().map(|key| (key.to_string(), value)))
        .collect())
}

fn list(reply: Reply) -> Result<Vec<Reply>, ConnectionError> {
    match reply {
        Reply::List(list) => Ok(list),
        Reply::Nil => Ok(vec![]),
        _ => Err(ConnectionError::UnexpectedReply("array")),
    }
}

/// `1518951480106-0` -> `1518951480106`
fn id_millis(reply: &Reply) -> Option<f64> {
    reply.as_str()?.split('-').next()?.parse().ok()
}

/// `first-entry` and `last-entry` are `[id, [field, value, ...]]` or nil
fn entry_millis(reply: Option<&Reply>) -> Option<f64> {
    match reply? {
        Reply::List(entry) => entry.first().and_then(id_millis),
        _ => None,
    }
}

async fn collect_stream(
    conn: &mut dyn Executor,
    db: &str,
    stream: &str,
    exclude_consumers: bool,
    out: &mut Output<'_>,
) -> Result<(), Error> {
    let info = fields(conn.execute(&["XINFO", "STREAM", stream]).await?)?;
    let labels = [db, stream];

    for (field, name) in [
        ("length", "stream_length"),
        ("radix-tree-keys", "stream_radix_tree_keys"),
        ("radix-tree-nodes", "stream_radix_tree_nodes"),
        ("groups", "stream_groups"),
    ] {
        if let Some(value) = info.get(field).and_then(Reply::as_f64) {
            out.emit(name, value, &labels);
        }
    }

    if let Some(millis) = info.get("last-generated-id").and_then(id_millis) {
        out.emit("stream_last_generated_id", millis, &labels);
    }
    // since 7.0
    if let Some(millis) = info.get("max-deleted-entry-id").and_then(id_millis) {
        out.emit("stream_max_deleted_entry_id", millis, &labels);
    }
    if let Some(millis) = entry_millis(info.get("first-entry")) {
        out.emit("stream_first_entry_id", millis, &labels);
    }
    if let Some(millis) = entry_millis(info.get("last-entry")) {
        out.emit("stream_last_entry_id", millis, &labels);
    }

    let groups = list(conn.execute(&["XINFO", "GROUPS", stream]).await?)?;
    for group in groups {
        let group = fields(group)?;
        let Some(name) = group.get("name").and_then(Reply::as_str) else {
            continue;
        };
        let labels = [db, stream, name];

        if let Some(consumers) = group.get("consumers").and_then(Reply::as_f64) {
            out.emit("stream_group_consumers", consumers, &labels);
        }
        if let Some(pending) = group.get("pending").and_then(Reply::as_f64) {
            out.emit("stream_group_messages_pending", pending, &labels);
        }
        if let Some(millis) = group.get("last-delivered-id").and_then(id_millis) {
            out.emit("stream_group_last_delivered_id", millis, &labels);
        }
        // entries-read and lag are nil when they can not be determined
        if let Some(read) = group.get("entries-read").and_then(Reply::as_f64) {
            out.emit("stream_group_entries_read", read, &labels);
        }
        if let Some(lag) = group.get("lag").and_then(Reply::as_f64) {
            out.emit("stream_group_lag", lag, &labels);
        }

        if exclude_consumers {
            continue;
        }

        let consumers = list(conn.execute(&["XINFO", "CONSUMERS", stream, name]).await?)?;
        for consumer in consumers {
            let consumer = fields(consumer)?;
            let Some(consumer_name) = consumer.get("name").and_then(Reply::as_str) else {
                continue;
            };
            let labels = [db, stream, name, consumer_name];

            if let Some(pending) = consumer.get("pending").and_then(Reply::as_f64) {
                out.emit("stream_group_consumer_messages_pending", pending, &labels);
            }
            if let Some(idle) = consumer.get("idle").and_then(Reply::as_f64) {
                out.emit("stream_group_consumer_idle_seconds", idle / 1e3, &labels);
            }
        }
    }

    Ok(())
}

/// Export `XINFO` of the configured streams, patterns are expanded with
/// `SCAN ... TYPE stream`.
pub async fn collect(
    conn: &mut dyn Executor,
    singles: &[KeyArg],
    patterns: &[KeyArg],
    batch_size: usize,
    exclude_consumers: bool,
    exceeded: &AtomicU64,
    out: &mut Output<'_>,
) -> Result<(), Error> {
    let mut streams = BTreeMap::<u32, Vec<String>>::new();
    for arg in singles {
        streams.entry(arg.db).or_default().push(arg.pattern.clone());
    }

    for arg in patterns {
        if !is_glob(&arg.pattern) {
            streams.entry(arg.db).or_default().push(arg.pattern.clone());
            continue;
        }

        if let Err(err) = select(conn, arg.db).await {
            warn!(message = "select database failed", pattern = %arg, %err);
            continue;
        }

        match scan(conn, &arg.pattern, batch_size, Some("stream"), exceeded).await {
            Ok(keys) => streams.entry(arg.db).or_default().extend(
                keys.into_iter()
                    .filter_map(|key| String::from_utf8(key.to_vec()).ok()),
            ),
            Err(err) => {
                warn!(message = "scan streams failed", pattern = %arg, %err);
            }
        }
    }

    for (db, mut keys) in streams {
        keys.sort();
        keys.dedup();

        if let Err(err) = select(conn, db).await {
            warn!(message = "select database failed", db, %err);
            continue;
        }

        let db = format!("db{db}");
        for stream in keys {
            if let Err(err) = collect_stream(conn, &db, &stream, exclude_consumers, out).await {
                warn!(message = "collect stream metrics failed", %db, %stream, %err);
            }
        }
    }

    Ok(())
}
