use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::AtomicU64;

use percent_encoding::percent_decode_str;

use super::Error;
use super::connection::{Executor, ExecutorExt, Reply};
use super::output::Output;
use super::scan::{is_glob, scan, select};

/// A key, or a glob pattern of keys, in a database.
///
/// Written as `db3=user:*`, `db3:user:*` or just `user:*` for database 0.
/// The key part may be percent-encoded.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyArg {
    pub db: u32,
    pub pattern: String,
}

impl FromStr for KeyArg {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (db, pattern) = match split_db(s, '=').or_else(|| split_db(s, ':')) {
            Some((db, pattern)) => (db, pattern),
            None => (0, s),
        };

        let pattern = percent_decode_str(pattern)
            .decode_utf8()
            .map_err(|_err| Error::Config(format!("invalid key {s:?}")))?;
        if pattern.is_empty() {
            return Err(Error::Config(format!("empty key {s:?}")));
        }

        Ok(KeyArg {
            db,
            pattern: pattern.into_owned(),
        })
    }
}

impl fmt::Display for KeyArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "db{}={}", self.db, self.pattern)
    }
}

/// `db12=rest` -> `(12, rest)`
fn split_db(s: &str, sep: char) -> Option<(u32, &str)> {
    let (db, rest) = s.split_once(sep)?;
    let num = db.strip_prefix("db")?;
    if num.is_empty() || !num.bytes().all(|c| c.is_ascii_digit()) {
        return None;
    }

    num.parse().ok().map(|num| (num, rest))
}

struct KeyInfo {
    typ: String,
    size: Option<f64>,
}

/// Resolves the type and size of a key, `None` if it does not exist.
async fn key_info(conn: &mut dyn Executor, key: &str) -> Result<Option<KeyInfo>, Error> {
    let typ: String = conn.query(&["TYPE", key]).await?;

    let size = match typ.as_str() {
        "none" => return Ok(None),
        // a HyperLogLog is a string too, PFCOUNT fails on plain strings
        "string" => match conn.query::<f64>(&["PFCOUNT", key]).await {
            Ok(size) => Some(size),
            Err(_) => conn.query::<f64>(&["STRLEN", key]).await.ok(),
        },
        typ => match size_command(typ) {
            Some(cmd) => conn.query::<f64>(&[cmd, key]).await.ok(),
            None => None,
        },
    };

    Ok(Some(KeyInfo { typ, size }))
}

fn size_command(typ: &str) -> Option<&'static str> {
    match typ {
        "list" => Some("LLEN"),
        "set" => Some("SCARD"),
        "zset" => Some("ZCARD"),
        "hash" => Some("HLEN"),
        "stream" => Some("XLEN"),
        _ => None,
    }
}

/// Expand the patterns into keys, grouped by database.
///
/// A failed `SELECT` or `SCAN` only drops the keys of its own pattern.
async fn resolve(
    conn: &mut dyn Executor,
    singles: &[KeyArg],
    patterns: &[KeyArg],
    batch_size: usize,
    exceeded: &AtomicU64,
) -> Result<BTreeMap<u32, Vec<String>>, Error> {
    let mut keys = BTreeMap::<u32, Vec<String>>::new();

    for arg in singles {
        keys.entry(arg.db).or_default().push(arg.pattern.clone());
    }

    for arg in patterns {
        if !is_glob(&arg.pattern) {
            keys.entry(arg.db).or_default().push(arg.pattern.clone());
            continue;
        }

        if let Err(err) = select(conn, arg.db).await {
            warn!(message = "select database failed", pattern = %arg, %err);
            continue;
        }

        match scan(conn, &arg.pattern, batch_size, None, exceeded).await {
            Ok(found) => {
                let entry = keys.entry(arg.db).or_default();
                for key in found {
                    match String::from_utf8(key.to_vec()) {
                        Ok(key) => entry.push(key),
                        Err(_) => {
                            debug!(message = "skip key which is not valid UTF-8", pattern = %arg)
                        }
                    }
                }
            }
            Err(err) => {
                warn!(message = "scan keys failed", pattern = %arg, %err);
            }
        }
    }

    for list in keys.values_mut() {
        list.sort();
        list.dedup();
    }

    Ok(keys)
}

/// Export size, value and memory usage of the configured keys.
pub async fn check_keys(
    conn: &mut dyn Executor,
    singles: &[KeyArg],
    patterns: &[KeyArg],
    batch_size: usize,
    export_values: bool,
    exceeded: &AtomicU64,
    out: &mut Output<'_>,
) -> Result<(), Error> {
    if singles.is_empty() && patterns.is_empty() {
        return Ok(());
    }

    let keys = resolve(conn, singles, patterns, batch_size, exceeded).await?;

    for (db, keys) in keys {
        if let Err(err) = select(conn, db).await {
            warn!(message = "select database failed", db, %err);
            continue;
        }
        let db = format!("db{db}");

        for key in keys {
            let info = match key_info(conn, &key).await {
                Ok(Some(info)) => info,
                Ok(None) => continue,
                Err(err) => {
                    warn!(message = "fetch key info failed", %db, %key, %err);
                    continue;
                }
            };

            if let Some(size) = info.size {
                out.emit("key_size", size, &[&db, &key]);
            }

            if export_values && info.typ == "string" {
                match conn.query::<Option<String>>(&["GET", key.as_str()]).await {
                    Ok(Some(value)) => match value.parse::<f64>() {
                        Ok(num) => out.emit("key_value", num, &[&db, &key]),
                        Err(_) => out.emit("key_value_as_string", 1, &[&db, &key, &value]),
                    },
                    Ok(None) => {}
                    Err(err) => {
                        debug!(message = "get key value failed", %db, %key, %err);
                    }
                }
            }

            match conn.execute(&["MEMORY", "USAGE", key.as_str()]).await {
                Ok(Reply::Integer(bytes)) => {
                    out.emit("key_memory_usage_bytes", bytes, &[&db, &key]);
                }
                Ok(_) => {}
                Err(err) => {
                    debug!(message = "memory usage of key failed", %db, %key, %err);
                }
            }
        }
    }

    Ok(())
}

/// Export the number of keys matching each pattern as `keys_count`.
pub async fn count_keys(
    conn: &mut dyn Executor,
    patterns: &[KeyArg],
    batch_size: usize,
    exceeded: &AtomicU64,
    out: &mut Output<'_>,
) -> Result<(), Error> {
    for arg in patterns {
        if let Err(err) = select(conn, arg.db).await {
            warn!(message = "select database failed", pattern = %arg, %err);
            continue;
        }

        match scan(conn, &arg.pattern, batch_size, None, exceeded).await {
            Ok(keys) => {
                let db = format!("db{}", arg.db);
                out.emit("keys_count", keys.len(), &[&db, &arg.pattern]);
            }
            Err(err) => {
                warn!(message = "count keys failed", pattern = %arg, %err);
            }
        }
    }

    Ok(())
}
