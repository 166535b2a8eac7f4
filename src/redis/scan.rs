use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use super::connection::{Error, Executor, Reply};

/// A well behaved server returns cursor "0" eventually, this caps the
/// round trips of a single pattern when it does not.
pub const MAX_SCAN_ITERATIONS: usize = 10_000;

/// Iterate the keyspace of the selected database with `SCAN`.
///
/// Keys are deduplicated since `SCAN` may return a key more than once.
/// Hitting `MAX_SCAN_ITERATIONS` is not an error, the keys found so far are
/// returned and `exceeded` is incremented.
pub async fn scan(
    conn: &mut dyn Executor,
    pattern: &str,
    count: usize,
    typ: Option<&str>,
    exceeded: &AtomicU64,
) -> Result<Vec<Bytes>, Error> {
    let count = count.to_string();
    let mut cursor = String::from("0");
    let mut seen = HashSet::new();
    let mut keys = Vec::new();

    for _ in 0..MAX_SCAN_ITERATIONS {
        let mut args = vec!["SCAN", cursor.as_str(), "MATCH", pattern, "COUNT", count.as_str()];
        if let Some(typ) = typ {
            args.extend(["TYPE", typ]);
        }

        let reply = conn.execute(&args).await?;
        let (next, batch) = split(reply)?;

        for key in batch {
            if seen.insert(key.clone()) {
                keys.push(key);
            }
        }

        if next == "0" {
            return Ok(keys);
        }
        cursor = next;
    }

    exceeded.fetch_add(1, Ordering::Relaxed);
    warn!(
        message = "scan stopped by the iteration cap",
        pattern,
        iterations = MAX_SCAN_ITERATIONS,
        found = keys.len(),
    );

    Ok(keys)
}

/// `[cursor, [key, ...]]`
fn split(reply: Reply) -> Result<(String, Vec<Bytes>), Error> {
    let Reply::List(mut parts) = reply else {
        return Err(Error::UnexpectedReply("array"));
    };
    if parts.len() != 2 {
        return Err(Error::UnexpectedReply("cursor and keys"));
    }

    let batch = parts.pop().unwrap_or(Reply::Nil);
    let cursor = parts.pop().unwrap_or(Reply::Nil);

    let cursor = cursor
        .as_str()
        .ok_or(Error::UnexpectedReply("cursor"))?
        .to_string();

    let batch = match batch {
        Reply::List(list) => list
            .into_iter()
            .map(|key| match key {
                Reply::Text(key) => Ok(key),
                _ => Err(Error::UnexpectedReply("key")),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Reply::Nil => vec![],
        _ => return Err(Error::UnexpectedReply("array")),
    };

    Ok((cursor, batch))
}

/// Switch the connection to database `db`.
pub async fn select(conn: &mut dyn Executor, db: u32) -> Result<(), Error> {
    let db = db.to_string();
    conn.execute(&["SELECT", db.as_str()]).await.map(|_| ())
}

/// Glob patterns need a `SCAN`, anything else is a plain key.
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}
