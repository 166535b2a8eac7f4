use std::collections::BTreeMap;

use event::Bucket;

use super::Error;
use super::connection::{Error as ConnectionError, Executor, Reply};
use super::info::{Entry, Report};
use super::output::Output;

// https://redis.io/commands/latency-latest
pub async fn collect(
    conn: &mut dyn Executor,
    report: &Report<'_>,
    out: &mut Output<'_>,
) -> Result<(), Error> {
    let reply = conn.execute(&["LATENCY", "LATEST"]).await?;
    latest(reply, out)?;

    // LATENCY HISTOGRAM is available since 7.0
    let major = report
        .get("redis_version")
        .and_then(|version| version.split('.').next())
        .and_then(|major| major.parse::<u32>().ok())
        .unwrap_or_default();
    if major < 7 {
        return Ok(());
    }

    match conn.execute(&["LATENCY", "HISTOGRAM"]).await {
        Ok(reply) => histogram(reply, report, out)?,
        Err(err) => {
            warn!(message = "query latency histogram failed", %err);
        }
    }

    Ok(())
}

/// `[[event, timestamp, latest_ms, max_ms], ...]`
fn latest(reply: Reply, out: &mut Output<'_>) -> Result<(), Error> {
    let Reply::List(events) = reply else {
        return Err(ConnectionError::UnexpectedReply("array").into());
    };

    for event in events {
        let Reply::List(parts) = event else {
            continue;
        };
        if parts.len() < 3 {
            continue;
        }

        let Some(name) = parts[0].as_str() else {
            continue;
        };
        let (Some(last), Some(duration)) = (parts[1].as_f64(), parts[2].as_f64()) else {
            debug!(message = "malformed latency event", event = name);
            continue;
        };

        out.emit("latency_spike_last", last, &[name]);
        out.emit("latency_spike_duration_seconds", duration / 1e3, &[name]);
    }

    Ok(())
}

/// `[cmd, ["calls", n, "histogram_usec", [usec, count, ...]], ...]`, bucket
/// counts are cumulative already.
fn histogram(reply: Reply, report: &Report<'_>, out: &mut Output<'_>) -> Result<(), Error> {
    let usecs = report
        .entries()
        .iter()
        .filter_map(|entry| match entry {
            Entry::CommandStats(stats) => Some((stats.cmd, stats.usec)),
            _ => None,
        })
        .collect::<BTreeMap<_, _>>();

    for (cmd, details) in reply.into_pairs()? {
        let Some(cmd) = cmd.as_str() else {
            continue;
        };

        let mut calls = None;
        let mut buckets = Vec::new();
        for (key, value) in details.into_pairs()? {
            match key.as_str() {
                Some("calls") => calls = value.as_i64(),
                Some("histogram_usec") => {
                    for (upper, count) in value.into_pairs()? {
                        if let (Some(upper), Some(count)) = (upper.as_f64(), count.as_i64()) {
                            buckets.push(Bucket {
                                upper,
                                count: count.max(0) as u64,
                            });
                        }
                    }
                }
                _ => {}
            }
        }

        let Some(calls) = calls else {
            debug!(message = "latency histogram without calls", cmd);
            continue;
        };

        let sum = usecs.get(cmd).copied().unwrap_or_default();
        out.histogram(
            "commands_latencies_usec",
            calls.max(0) as u64,
            sum,
            buckets,
            &[cmd],
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use event::MetricValue;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::redis::info::parse;
    use crate::redis::registry::Registry;
    use crate::redis::testing::{MockExecutor, list_reply, text_reply};

    fn event(name: &str, timestamp: i64, latest: i64, max: i64) -> Reply {
        Reply::List(vec![
            text_reply(name),
            Reply::Integer(timestamp),
            Reply::Integer(latest),
            Reply::Integer(max),
        ])
    }

    #[tokio::test]
    async fn spikes_only_before_7() {
        let mut conn = MockExecutor::default().reply(
            "LATENCY LATEST",
            Reply::List(vec![event("command", 1405067976, 251, 1001)]),
        );
        let registry = Registry::new(false).unwrap();
        let mut out = Output::new(&registry, "");
        let report = parse("redis_version:6.2.14\n");

        collect(&mut conn, &report, &mut out).await.unwrap();

        let metrics = out
            .into_metrics()
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            metrics,
            vec![
                r#"latency_spike_last{event_name="command"} 1405067976"#,
                r#"latency_spike_duration_seconds{event_name="command"} 0.251"#,
            ]
        );
        assert_eq!(conn.commands(), ["LATENCY LATEST"]);
    }

    #[tokio::test]
    async fn histograms() {
        let details = Reply::List(vec![
            text_reply("calls"),
            Reply::Integer(3),
            text_reply("histogram_usec"),
            Reply::List(vec![
                Reply::Integer(1),
                Reply::Integer(1),
                Reply::Integer(4),
                Reply::Integer(3),
            ]),
        ]);
        let mut conn = MockExecutor::default()
            .reply("LATENCY LATEST", Reply::List(vec![]))
            .reply(
                "LATENCY HISTOGRAM",
                Reply::List(vec![text_reply("set"), details]),
            );
        let registry = Registry::new(false).unwrap();
        let mut out = Output::new(&registry, "");
        let report = parse("redis_version:7.2.4\ncmdstat_set:calls=3,usec=7,usec_per_call=2.33\n");

        collect(&mut conn, &report, &mut out).await.unwrap();

        let metrics = out.into_metrics();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].tag_value("cmd"), Some("set"));
        assert_eq!(
            metrics[0].value,
            MetricValue::Histogram {
                count: 3,
                sum: 7.0,
                buckets: vec![
                    Bucket { upper: 1.0, count: 1 },
                    Bucket { upper: 4.0, count: 3 },
                ],
            }
        );
    }

    #[tokio::test]
    async fn unexpected() {
        let mut conn = MockExecutor::default().reply("LATENCY LATEST", list_reply(&["a"]));
        let registry = Registry::new(false).unwrap();
        let mut out = Output::new(&registry, "");

        // events which are not arrays are skipped
        collect(&mut conn, &parse(""), &mut out).await.unwrap();
        assert!(out.is_empty());

        let mut conn = MockExecutor::default().reply("LATENCY LATEST", Reply::Integer(1));
        assert!(collect(&mut conn, &parse(""), &mut out).await.is_err());
    }
}
