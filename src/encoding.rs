//! The Prometheus text exposition format, version 0.0.4

use std::collections::HashMap;
use std::fmt::{self, Write};

use event::tags::Tags;
use event::{Metric, MetricValue};

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Encode metrics, series with the same name are grouped into one family
/// and families keep the order in which they were first seen.
pub fn encode(metrics: &[Metric]) -> Result<String, fmt::Error> {
    let mut families: Vec<(&str, Vec<&Metric>)> = Vec::new();
    let mut index = HashMap::<&str, usize>::with_capacity(metrics.len());
    for metric in metrics {
        match index.get(metric.name()) {
            Some(pos) => families[*pos].1.push(metric),
            None => {
                index.insert(metric.name(), families.len());
                families.push((metric.name(), vec![metric]));
            }
        }
    }

    let mut buf = String::with_capacity(metrics.len() * 64);
    for (name, metrics) in families {
        write_family(&mut buf, name, &metrics)?;
    }

    Ok(buf)
}

fn write_family(buf: &mut String, name: &str, metrics: &[&Metric]) -> fmt::Result {
    let Some(first) = metrics.first() else {
        return Ok(());
    };

    buf.push_str("# HELP ");
    buf.push_str(name);
    buf.push(' ');
    escape_help(buf, first.description());
    buf.push('\n');
    writeln!(buf, "# TYPE {} {}", name, first.kind().as_str())?;

    for metric in metrics {
        let tags = metric.tags();

        match &metric.value {
            MetricValue::Gauge(value) | MetricValue::Sum(value) => {
                write_sample(buf, name, tags, None, *value)?;
            }
            MetricValue::Summary {
                count,
                sum,
                quantiles,
            } => {
                for q in quantiles {
                    let quantile = format_value(q.quantile);
                    write_sample(buf, name, tags, Some(("quantile", &quantile)), q.value)?;
                }

                write_sample(buf, &format!("{name}_sum"), tags, None, *sum)?;
                write_sample(buf, &format!("{name}_count"), tags, None, *count as f64)?;
            }
            MetricValue::Histogram {
                count,
                sum,
                buckets,
            } => {
                let bucket = format!("{name}_bucket");
                let mut infinite = false;
                for b in buckets {
                    infinite = b.upper.is_infinite() || b.upper == f64::MAX;
                    let le = if infinite {
                        "+Inf".to_string()
                    } else {
                        format_value(b.upper)
                    };

                    write_sample(buf, &bucket, tags, Some(("le", &le)), b.count as f64)?;
                }
                if !infinite {
                    write_sample(buf, &bucket, tags, Some(("le", "+Inf")), *count as f64)?;
                }

                write_sample(buf, &format!("{name}_sum"), tags, None, *sum)?;
                write_sample(buf, &format!("{name}_count"), tags, None, *count as f64)?;
            }
        }
    }

    Ok(())
}

fn write_sample(
    buf: &mut String,
    name: &str,
    tags: &Tags,
    extra: Option<(&str, &str)>,
    value: f64,
) -> fmt::Result {
    buf.push_str(name);

    if !tags.is_empty() || extra.is_some() {
        buf.push('{');

        let mut first = true;
        let pairs = tags
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .chain(extra);
        for (key, value) in pairs {
            if !first {
                buf.push(',');
            }
            first = false;

            buf.push_str(key);
            buf.push_str("=\"");
            escape_label(buf, value);
            buf.push('"');
        }

        buf.push('}');
    }

    writeln!(buf, " {}", format_value(value))
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

fn escape_label(buf: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\\' => buf.push_str(r"\\"),
            '"' => buf.push_str("\\\""),
            '\n' => buf.push_str(r"\n"),
            c => buf.push(c),
        }
    }
}

fn escape_help(buf: &mut String, help: &str) {
    for c in help.chars() {
        match c {
            '\\' => buf.push_str(r"\\"),
            '\n' => buf.push_str(r"\n"),
            c => buf.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use event::{Bucket, Quantile, tags};
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn families() {
        let metrics = vec![
            Metric::gauge_with_tags(
                "redis_db_keys",
                "Total number of keys by DB",
                3,
                tags!("db" => "db0"),
            ),
            Metric::gauge("redis_up", "Information about the Redis instance", 1),
            Metric::gauge_with_tags(
                "redis_db_keys",
                "Total number of keys by DB",
                0,
                tags!("db" => "db1"),
            ),
            Metric::sum(
                "redis_commands_processed_total",
                "Total number of commands processed by the server",
                12,
            ),
        ];

        assert_eq!(
            encode(&metrics).unwrap(),
            r#"# HELP redis_db_keys Total number of keys by DB
# TYPE redis_db_keys gauge
redis_db_keys{db="db0"} 3
redis_db_keys{db="db1"} 0
# HELP redis_up Information about the Redis instance
# TYPE redis_up gauge
redis_up 1
# HELP redis_commands_processed_total Total number of commands processed by the server
# TYPE redis_commands_processed_total counter
redis_commands_processed_total 12
"#
        );
    }

    #[test]
    fn escape() {
        let metrics = vec![Metric::gauge_with_tags(
            "redis_key_value_as_string",
            "The value of \"key\" as a string",
            1,
            tags!("val" => "a \"quoted\"\nline\\"),
        )];

        assert_eq!(
            encode(&metrics).unwrap(),
            "# HELP redis_key_value_as_string The value of \"key\" as a string\n\
# TYPE redis_key_value_as_string gauge\n\
redis_key_value_as_string{val=\"a \\\"quoted\\\"\\nline\\\\\"} 1\n"
        );
    }

    #[test]
    fn summary() {
        let metrics = vec![Metric::new(
            "redis_latency_percentiles_usec",
            Some("A summary of latency percentile distribution per command".into()),
            tags!("cmd" => "get"),
            MetricValue::Summary {
                count: 10,
                sum: 120.5,
                quantiles: vec![
                    Quantile { quantile: 50.0, value: 8.0 },
                    Quantile { quantile: 99.9, value: 27.5 },
                ],
            },
        )];

        assert_eq!(
            encode(&metrics).unwrap(),
            r#"# HELP redis_latency_percentiles_usec A summary of latency percentile distribution per command
# TYPE redis_latency_percentiles_usec summary
redis_latency_percentiles_usec{cmd="get",quantile="50"} 8
redis_latency_percentiles_usec{cmd="get",quantile="99.9"} 27.5
redis_latency_percentiles_usec_sum{cmd="get"} 120.5
redis_latency_percentiles_usec_count{cmd="get"} 10
"#
        );
    }

    #[test]
    fn histogram() {
        let metrics = vec![Metric::new(
            "redis_commands_latencies_usec",
            Some("A histogram of latencies per command".into()),
            tags!("cmd" => "set"),
            MetricValue::Histogram {
                count: 3,
                sum: 7.0,
                buckets: vec![
                    Bucket { upper: 1.0, count: 1 },
                    Bucket { upper: 4.0, count: 3 },
                ],
            },
        )];

        assert_eq!(
            encode(&metrics).unwrap(),
            r#"# HELP redis_commands_latencies_usec A histogram of latencies per command
# TYPE redis_commands_latencies_usec histogram
redis_commands_latencies_usec_bucket{cmd="set",le="1"} 1
redis_commands_latencies_usec_bucket{cmd="set",le="4"} 3
redis_commands_latencies_usec_bucket{cmd="set",le="+Inf"} 3
redis_commands_latencies_usec_sum{cmd="set"} 7
redis_commands_latencies_usec_count{cmd="set"} 3
"#
        );
    }
}
