use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use event::Quantile;

use super::output::Output;
use super::registry::parse_value;

/// Replaces keys and values which are not valid UTF-8.
pub const REDACTED: &str = "<redacted>";

const INSTANCE_INFO_FIELDS: [&str; 10] = [
    "role",
    "redis_version",
    "redis_build_id",
    "redis_mode",
    "os",
    "maxmemory_policy",
    "tcp_port",
    "run_id",
    "process_id",
    "master_replid",
];

const SLAVE_INFO_FIELDS: [&str; 3] = ["master_host", "master_port", "slave_read_only"];

const SENTINEL_FIELDS: [&str; 5] = [
    "sentinel_masters",
    "sentinel_tilt",
    "sentinel_running_scripts",
    "sentinel_scripts_queue_length",
    "sentinel_simulate_failure_flags",
];

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("missing {0}")]
    Missing(&'static str),

    #[error("invalid number {0:?}")]
    Number(String),

    #[error("unexpected key {0:?}")]
    Key(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    Master,
    Slave,
    Unknown,
}

/// `db0:keys=1,expires=0,avg_ttl=0,subexpiry=0`
#[derive(Debug, PartialEq)]
pub struct Keyspace {
    pub db: u32,
    pub keys: u64,
    pub expires: u64,
    /// milliseconds
    pub avg_ttl: Option<u64>,
    pub subexpiry: Option<u64>,
    /// KeyDB only
    pub cached_keys: Option<u64>,
}

/// `slave0:ip=10.254.11.1,port=6379,state=online,offset=1751844676,lag=0`
#[derive(Debug, PartialEq)]
pub struct Replica<'a> {
    pub ip: &'a str,
    pub port: &'a str,
    pub state: &'a str,
    pub offset: f64,
    pub lag: Option<f64>,
}

/// There are 2 formats, one before Redis 6.2 and one after it
///
/// ```text
/// cmdstat_get:calls=21,usec=175,usec_per_call=8.33
/// cmdstat_get:calls=21,usec=175,usec_per_call=8.33,rejected_calls=0,failed_calls=0
/// ```
#[derive(Debug, PartialEq)]
pub struct CommandStats<'a> {
    pub cmd: &'a str,
    pub calls: u64,
    pub usec: f64,
    pub rejected_calls: Option<f64>,
    pub failed_calls: Option<f64>,
}

/// `latency_percentiles_usec_config|get:p50=8.031,p99=27.007,p99.9=27.007`
#[derive(Debug, PartialEq)]
pub struct LatencyPercentiles<'a> {
    pub cmd: &'a str,
    pub quantiles: Vec<Quantile>,
}

/// `master0:name=user03,status=sdown,address=192.169.2.52:6381,slaves=1,sentinels=5`
#[derive(Debug, PartialEq)]
pub struct SentinelMaster<'a> {
    pub name: &'a str,
    pub status: &'a str,
    pub address: &'a str,
    pub slaves: f64,
    pub sentinels: f64,
}

/// `module:name=search,ver=20803,api=1,filters=0,usedby=[],using=[ReJSON],options=[]`
#[derive(Debug, Default, PartialEq)]
pub struct Module<'a> {
    pub name: &'a str,
    pub ver: &'a str,
    pub api: &'a str,
    pub filters: &'a str,
    pub usedby: &'a str,
    pub using: &'a str,
}

#[derive(Debug, PartialEq)]
pub enum Entry<'a> {
    Field {
        section: &'a str,
        key: &'a str,
        value: &'a str,
    },
    Keyspace(Keyspace),
    Replica(Replica<'a>),
    CommandStats(CommandStats<'a>),
    Latency(LatencyPercentiles<'a>),
    ErrorStats {
        err: &'a str,
        count: u64,
    },
    SentinelMaster(SentinelMaster<'a>),
    Module(Module<'a>),
}

/// The parsed status report, entries are kept in input order.
#[derive(Debug, Default, PartialEq)]
pub struct Report<'a> {
    sections: Vec<&'a str>,
    entries: Vec<Entry<'a>>,
}

impl<'a> Report<'a> {
    #[inline]
    pub fn entries(&self) -> &[Entry<'a>] {
        &self.entries
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.iter().any(|s| s.eq_ignore_ascii_case(name))
    }

    /// The value of the first scalar field named `key`
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.entries.iter().find_map(|entry| match entry {
            Entry::Field { key: k, value, .. } if *k == key => Some(*value),
            _ => None,
        })
    }

    pub fn is_cluster(&self) -> bool {
        self.get("cluster_enabled") == Some("1")
    }

    pub fn role(&self) -> Role {
        match self.get("role") {
            Some("master") => Role::Master,
            Some("slave") => Role::Slave,
            _ => Role::Unknown,
        }
    }
}

/// Make the raw reply printable, the value part of a line which is not
/// valid UTF-8 is replaced by `REDACTED`, and the whole line is dropped
/// if its key is not valid UTF-8 either.
pub fn sanitize(raw: &[u8]) -> Cow<'_, str> {
    if let Ok(text) = std::str::from_utf8(raw) {
        return Cow::Borrowed(text);
    }

    let mut text = String::with_capacity(raw.len());
    for line in raw.split(|c| *c == b'\n') {
        match std::str::from_utf8(line) {
            Ok(line) => text.push_str(line),
            Err(_) => {
                let Some(pos) = line.iter().position(|c| *c == b':') else {
                    continue;
                };
                let Ok(key) = std::str::from_utf8(&line[..pos]) else {
                    continue;
                };

                text.push_str(key);
                text.push(':');
                text.push_str(REDACTED);
            }
        }

        text.push('\n');
    }

    Cow::Owned(text)
}

/// Parse the output of `INFO`, `CLUSTER INFO` or `INFO MODULES`.
///
/// Unrecognized lines are skipped, malformed records are dropped, neither
/// of them aborts the parsing.
pub fn parse(text: &str) -> Report<'_> {
    let mut report = Report::default();
    let mut section = "";

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(name) = line.strip_prefix('#') {
            section = name.trim();
            report.sections.push(section);
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };

        match parse_record(key, value) {
            Ok(Some(entry)) => report.entries.push(entry),
            Ok(None) => report.entries.push(Entry::Field {
                section,
                key,
                value,
            }),
            Err(err) => {
                debug!(message = "drop malformed line", section, key, %err);
            }
        }
    }

    report
}

fn parse_record<'a>(key: &'a str, value: &'a str) -> Result<Option<Entry<'a>>, ParseError> {
    if let Some(db) = numbered(key, "db") {
        return parse_keyspace(db, value).map(|ks| Some(Entry::Keyspace(ks)));
    }

    if numbered(key, "slave").is_some() && value.contains('=') {
        return parse_replica(value).map(|r| Some(Entry::Replica(r)));
    }

    if numbered(key, "master").is_some() && value.contains('=') {
        return parse_sentinel_master(value).map(|m| Some(Entry::SentinelMaster(m)));
    }

    if let Some(cmd) = key.strip_prefix("cmdstat_") {
        return parse_command_stats(cmd, value).map(|c| Some(Entry::CommandStats(c)));
    }

    if let Some(cmd) = key.strip_prefix("latency_percentiles_usec_") {
        return parse_latency_stats(cmd, value).map(|l| Some(Entry::Latency(l)));
    }

    if let Some(err) = key.strip_prefix("errorstat_") {
        let count = pairs(value)
            .find_map(|(k, v)| (k == "count").then_some(v))
            .ok_or(ParseError::Missing("count"))
            .and_then(number)?;

        return Ok(Some(Entry::ErrorStats { err, count }));
    }

    if key == "module" {
        return parse_module(value).map(|m| Some(Entry::Module(m)));
    }

    Ok(None)
}

/// `db12` -> `12`
fn numbered(key: &str, prefix: &str) -> Option<u32> {
    let num = key.strip_prefix(prefix)?;
    if num.is_empty() || !num.bytes().all(|c| c.is_ascii_digit()) {
        return None;
    }

    num.parse().ok()
}

fn pairs(value: &str) -> impl Iterator<Item = (&str, &str)> {
    value.split(',').filter_map(|kv| kv.split_once('='))
}

fn number<T: FromStr>(value: &str) -> Result<T, ParseError> {
    value
        .parse::<T>()
        .map_err(|_| ParseError::Number(value.to_string()))
}

fn parse_keyspace(db: u32, value: &str) -> Result<Keyspace, ParseError> {
    let mut keys = None;
    let mut expires = None;
    let mut avg_ttl = None;
    let mut subexpiry = None;
    let mut cached_keys = None;

    for (k, v) in pairs(value) {
        match k {
            "keys" => keys = Some(number(v)?),
            "expires" => expires = Some(number(v)?),
            "avg_ttl" => avg_ttl = Some(number(v)?),
            "subexpiry" => subexpiry = Some(number(v)?),
            "cached_keys" => cached_keys = Some(number(v)?),
            _ => {}
        }
    }

    Ok(Keyspace {
        db,
        keys: keys.ok_or(ParseError::Missing("keys"))?,
        expires: expires.ok_or(ParseError::Missing("expires"))?,
        avg_ttl,
        subexpiry,
        cached_keys,
    })
}

fn parse_replica(value: &str) -> Result<Replica<'_>, ParseError> {
    let mut ip = None;
    let mut port = None;
    let mut state = None;
    let mut offset = None;
    let mut lag = None;

    for (k, v) in pairs(value) {
        match k {
            "ip" => ip = Some(v),
            "port" => port = Some(v),
            "state" => state = Some(v),
            "offset" => offset = Some(number(v)?),
            // lag is missing on very old versions
            "lag" => lag = number(v).ok(),
            _ => {}
        }
    }

    Ok(Replica {
        ip: ip.ok_or(ParseError::Missing("ip"))?,
        port: port.ok_or(ParseError::Missing("port"))?,
        state: state.ok_or(ParseError::Missing("state"))?,
        offset: offset.ok_or(ParseError::Missing("offset"))?,
        lag,
    })
}

fn parse_command_stats<'a>(cmd: &'a str, value: &str) -> Result<CommandStats<'a>, ParseError> {
    let mut calls = None;
    let mut usec = None;
    let mut rejected_calls = None;
    let mut failed_calls = None;

    for (k, v) in pairs(value) {
        match k {
            "calls" => calls = Some(number(v)?),
            "usec" => usec = Some(number(v)?),
            "rejected_calls" => rejected_calls = Some(number(v)?),
            "failed_calls" => failed_calls = Some(number(v)?),
            _ => {}
        }
    }

    Ok(CommandStats {
        cmd,
        calls: calls.ok_or(ParseError::Missing("calls"))?,
        usec: usec.ok_or(ParseError::Missing("usec"))?,
        rejected_calls,
        failed_calls,
    })
}

fn parse_latency_stats<'a>(
    cmd: &'a str,
    value: &str,
) -> Result<LatencyPercentiles<'a>, ParseError> {
    let mut quantiles = Vec::with_capacity(3);

    for (k, v) in pairs(value) {
        let Some(quantile) = k.strip_prefix('p') else {
            return Err(ParseError::Key(k.to_string()));
        };

        quantiles.push(Quantile {
            quantile: number(quantile)?,
            value: number(v)?,
        });
    }

    if quantiles.is_empty() {
        return Err(ParseError::Missing("percentiles"));
    }

    Ok(LatencyPercentiles { cmd, quantiles })
}

fn parse_sentinel_master(value: &str) -> Result<SentinelMaster<'_>, ParseError> {
    let mut name = None;
    let mut status = None;
    let mut address = None;
    let mut slaves = None;
    let mut sentinels = None;

    for (k, v) in pairs(value) {
        match k {
            "name" => name = Some(v),
            "status" => status = Some(v),
            "address" => address = Some(v),
            "slaves" => slaves = Some(number(v)?),
            "sentinels" => sentinels = Some(number(v)?),
            _ => {}
        }
    }

    Ok(SentinelMaster {
        name: name.ok_or(ParseError::Missing("name"))?,
        status: status.ok_or(ParseError::Missing("status"))?,
        address: address.ok_or(ParseError::Missing("address"))?,
        slaves: slaves.ok_or(ParseError::Missing("slaves"))?,
        sentinels: sentinels.ok_or(ParseError::Missing("sentinels"))?,
    })
}

fn parse_module(value: &str) -> Result<Module<'_>, ParseError> {
    let mut module = Module::default();

    for (k, v) in pairs(value) {
        match k {
            "name" => module.name = v,
            "ver" => module.ver = v,
            "api" => module.api = v,
            "filters" => module.filters = v,
            "usedby" => module.usedby = v,
            "using" => module.using = v,
            _ => {}
        }
    }

    if module.name.is_empty() {
        return Err(ParseError::Missing("name"));
    }

    Ok(module)
}

/// Inputs of `extract` which do not come from the report itself.
#[derive(Clone, Copy, Debug)]
pub struct Context {
    pub databases: u32,
    pub include_empty_databases: bool,
    /// Seconds since unix epoch, it is the only time dependent input.
    pub now: f64,
}

/// Turn the report into observations and returns the role of the instance.
pub fn extract(report: &Report<'_>, cx: Context, out: &mut Output<'_>) -> Role {
    let master_host = report.get("master_host").unwrap_or_default();
    let master_port = report.get("master_port").unwrap_or_default();
    let mut instance_info = BTreeMap::new();
    let mut slave_info = BTreeMap::new();
    let mut handled_dbs = BTreeSet::new();
    let mut cmd_stats = BTreeMap::new();
    let mut latencies = Vec::new();

    for entry in report.entries() {
        match entry {
            Entry::Field {
                section,
                key,
                value,
            } => {
                if INSTANCE_INFO_FIELDS.contains(key) {
                    instance_info.entry(*key).or_insert(*value);
                    continue;
                }

                if SLAVE_INFO_FIELDS.contains(key) {
                    slave_info.entry(*key).or_insert(*value);
                    continue;
                }

                match (*section, *key) {
                    (_, "master_link_status") => {
                        out.emit(
                            "master_link_up",
                            *value == "up",
                            &[master_host, master_port],
                        );
                        continue;
                    }
                    (
                        _,
                        "master_last_io_seconds_ago" | "slave_repl_offset"
                        | "master_sync_in_progress",
                    ) => {
                        if let Some(value) = parse_value(value) {
                            out.emit(key, value, &[master_host, master_port]);
                        }
                        continue;
                    }
                    ("Server", "uptime_in_seconds") => {
                        if let Some(uptime) = parse_value(value) {
                            out.emit("start_time_seconds", cx.now - uptime, &[]);
                        }
                    }
                    ("Sentinel", key) if SENTINEL_FIELDS.contains(&key) => {
                        if let Some(value) = parse_value(value) {
                            out.emit(key, value, &[]);
                        }
                        continue;
                    }
                    _ => {}
                }

                out.field(key, value);
            }
            Entry::Keyspace(ks) => {
                let db = format!("db{}", ks.db);

                out.emit("db_keys", ks.keys, &[&db]);
                out.emit("db_keys_expiring", ks.expires, &[&db]);
                if let Some(avg_ttl) = ks.avg_ttl {
                    out.emit("db_avg_ttl_seconds", avg_ttl as f64 / 1000.0, &[&db]);
                }
                if let Some(cached) = ks.cached_keys {
                    out.emit("db_keys_cached", cached, &[&db]);
                }
                if let Some(subexpiry) = ks.subexpiry {
                    out.emit("db_keys_subexpiry", subexpiry, &[&db]);
                }

                handled_dbs.insert(ks.db);
            }
            Entry::Replica(replica) => {
                let labels = [replica.ip, replica.port, replica.state];

                out.emit("connected_slave_offset_bytes", replica.offset, &labels);
                if let Some(lag) = replica.lag {
                    out.emit("connected_slave_lag_seconds", lag, &labels);
                }
            }
            Entry::CommandStats(stats) => {
                out.emit("commands_total", stats.calls, &[stats.cmd]);
                out.emit(
                    "commands_duration_seconds_total",
                    stats.usec / 1e6,
                    &[stats.cmd],
                );
                if let Some(rejected) = stats.rejected_calls {
                    out.emit("commands_rejected_calls_total", rejected, &[stats.cmd]);
                }
                if let Some(failed) = stats.failed_calls {
                    out.emit("commands_failed_calls_total", failed, &[stats.cmd]);
                }

                cmd_stats.insert(stats.cmd, (stats.calls, stats.usec));
            }
            Entry::Latency(latency) => latencies.push(latency),
            Entry::ErrorStats { err, count } => {
                out.emit("errors_total", *count, &[*err]);
            }
            Entry::SentinelMaster(master) => {
                out.emit(
                    "sentinel_master_status",
                    master.status == "ok",
                    &[master.name, master.address, master.status],
                );
                out.emit(
                    "sentinel_master_slaves",
                    master.slaves,
                    &[master.name, master.address],
                );
                out.emit(
                    "sentinel_master_sentinels",
                    master.sentinels,
                    &[master.name, master.address],
                );
            }
            // reported by the modules step with `INFO MODULES`
            Entry::Module(_) => {}
        }
    }

    // the summary needs both the calls and the percentiles of a command
    for latency in latencies {
        let Some((calls, usec)) = cmd_stats.get(latency.cmd) else {
            continue;
        };

        out.summary(
            "latency_percentiles_usec",
            *calls,
            *usec,
            latency.quantiles.clone(),
            &[latency.cmd],
        );
    }

    if cx.include_empty_databases {
        for db in 0..cx.databases {
            if handled_dbs.contains(&db) {
                continue;
            }

            let db = format!("db{db}");
            out.emit("db_keys", 0, &[&db]);
            out.emit("db_keys_expiring", 0, &[&db]);
        }
    }

    let labels =
        INSTANCE_INFO_FIELDS.map(|field| instance_info.get(field).copied().unwrap_or_default());
    out.emit("instance_info", 1, &labels);

    let role = report.role();
    if role == Role::Slave {
        let labels =
            SLAVE_INFO_FIELDS.map(|field| slave_info.get(field).copied().unwrap_or_default());
        out.emit("slave_info", 1, &labels);
    }

    role
}
