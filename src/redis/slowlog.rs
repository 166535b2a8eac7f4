use super::Error;
use super::connection::{Executor, ExecutorExt, Reply};
use super::output::Output;

pub async fn collect(conn: &mut dyn Executor, out: &mut Output<'_>) -> Result<(), Error> {
    match conn.query::<i64>(&["SLOWLOG", "LEN"]).await {
        Ok(length) => out.emit("slowlog_length", length, &[]),
        // sentinel does not support it
        Err(err) if err.is_unknown_command() => return Ok(()),
        Err(err) => {
            warn!(message = "slowlog length query failed", %err);
        }
    }

    // [[id, timestamp, duration_usec, [args...], client, name], ...]
    let reply = conn.execute(&["SLOWLOG", "GET", "1"]).await?;
    let (last_id, duration) = match reply {
        Reply::List(entries) => match entries.into_iter().next() {
            Some(Reply::List(entry)) => {
                let id = entry.first().and_then(Reply::as_i64).unwrap_or_default();
                let usec = entry.get(2).and_then(Reply::as_f64).unwrap_or_default();
                (id, usec / 1e6)
            }
            _ => (0, 0.0),
        },
        _ => (0, 0.0),
    };

    out.emit("slowlog_last_id", last_id, &[]);
    out.emit("last_slow_execution_duration_seconds", duration, &[]);

    Ok(())
}
