mod clients;
mod config;
pub mod connection;
pub mod info;
mod key_groups;
mod keys;
mod latency;
mod lua;
mod modules;
pub mod output;
pub mod registry;
mod scan;
mod sentinel;
mod slowlog;
mod streams;
mod target;
mod tile38;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use event::Metric;
use tokio::sync::Mutex;

pub use key_groups::KeyGroup;
pub use keys::KeyArg;
pub use lua::Script;
pub use target::Target;

use connection::{Connection, Executor, ExecutorExt};
use info::{Entry, Role};
use output::Output;
use registry::Registry;

const CLIENT_NAME: &str = "redis_exporter";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("connect to {addr} failed, {err}")]
    Connect {
        addr: String,
        err: connection::Error,
    },

    #[error("invalid config, {0}")]
    Config(String),

    #[error("query info failed, {0}")]
    Info(connection::Error),

    #[error(transparent)]
    Command(#[from] connection::Error),

    #[error("invalid key pattern {pattern:?}, {err}")]
    Pattern { pattern: String, err: regex::Error },

    #[error("invalid target {0}")]
    Target(String),

    #[error(transparent)]
    Registry(#[from] registry::Error),
}

/// Everything a scrape needs to know, besides the target.
#[derive(Debug)]
pub struct Options {
    pub namespace: String,
    pub timeout: Duration,
    pub user: Option<String>,
    pub password: Option<String>,

    /// Renamed `CONFIG` command, `-` disables it
    pub config_command: String,
    pub include_config_metrics: bool,
    pub redact_config_metrics: bool,

    pub check_keys: Vec<KeyArg>,
    pub check_single_keys: Vec<KeyArg>,
    pub count_keys: Vec<KeyArg>,
    pub check_streams: Vec<KeyArg>,
    pub check_single_streams: Vec<KeyArg>,
    pub streams_exclude_consumer_metrics: bool,
    pub key_groups: Vec<KeyGroup>,
    pub batch_size: usize,
    pub max_distinct_key_groups: usize,
    pub disable_exporting_key_values: bool,
    pub skip_checks_for_master: bool,

    pub lua_scripts: Vec<Script>,

    pub include_modules_metrics: bool,
    pub include_system_metrics: bool,
    pub include_metrics_for_empty_databases: bool,
    pub exclude_latency_histogram_metrics: bool,
    pub export_client_list: bool,
    pub export_client_port: bool,
    pub ping_on_connect: bool,
    pub set_client_name: bool,
    pub is_tile38: bool,
    pub is_cluster: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            namespace: "redis".to_string(),
            timeout: Duration::from_secs(15),
            user: None,
            password: None,
            config_command: "CONFIG".to_string(),
            include_config_metrics: false,
            redact_config_metrics: true,
            check_keys: vec![],
            check_single_keys: vec![],
            count_keys: vec![],
            check_streams: vec![],
            check_single_streams: vec![],
            streams_exclude_consumer_metrics: false,
            key_groups: vec![],
            batch_size: 1000,
            max_distinct_key_groups: 100,
            disable_exporting_key_values: false,
            skip_checks_for_master: false,
            lua_scripts: vec![],
            include_modules_metrics: false,
            include_system_metrics: false,
            include_metrics_for_empty_databases: true,
            exclude_latency_histogram_metrics: false,
            export_client_list: false,
            export_client_port: false,
            ping_on_connect: false,
            set_client_name: false,
            is_tile38: false,
            is_cluster: false,
        }
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Log a failed optional step, it contributes nothing but the scrape goes on.
fn skip(step: &'static str, result: Result<(), Error>) {
    if let Err(err) = result {
        warn!(message = "collect metrics failed", step, %err);
    }
}

pub struct Exporter {
    options: Options,
    registry: Arc<Registry>,

    // one scrape at a time
    lock: Mutex<()>,

    scrapes: AtomicU64,
    scrape_duration_micros: AtomicU64,
    scan_budget_exceeded: AtomicU64,
}

impl Exporter {
    pub fn new(options: Options) -> Result<Self, Error> {
        let registry = Registry::new(options.include_system_metrics)?;

        Ok(Exporter {
            options,
            registry: Arc::new(registry),
            lock: Mutex::new(()),
            scrapes: AtomicU64::new(0),
            scrape_duration_micros: AtomicU64::new(0),
            scan_budget_exceeded: AtomicU64::new(0),
        })
    }

    /// Connect to the target and collect everything that is enabled.
    ///
    /// A failed connect yields only `up` and `exporter_last_scrape_error`,
    /// otherwise `up` is 0 only when `CONFIG` or `INFO` fails.
    ///
    /// Credentials embedded in `target` win, the configured `user` and
    /// `password` are sent otherwise. That includes targets requested through
    /// `/scrape`, so a configured password is disclosed to whatever host the
    /// caller names. Leave `password` unset when `/scrape` is reachable by
    /// untrusted clients and put credentials into the target URL instead.
    pub async fn scrape(&self, target: &Target) -> Vec<Metric> {
        let _guard = self.lock.lock().await;
        let start = Instant::now();
        self.scrapes.fetch_add(1, Ordering::Relaxed);

        let mut out = Output::new(&self.registry, &self.options.namespace);
        match self.connect(target).await {
            Ok(mut conn) => {
                out.emit(
                    "exporter_last_scrape_connect_time_seconds",
                    start.elapsed().as_secs_f64(),
                    &[],
                );

                let result = self.collect(&mut conn, &mut out).await;
                self.finish(result, start, &mut out);
            }
            Err(err) => {
                warn!(message = "connect to redis failed", addr = %target, %err);

                out.emit("exporter_last_scrape_error", 1, &[&err.to_string()]);
                out.emit("up", 0, &[]);
                self.observe(start);
            }
        }

        out.into_metrics()
    }

    /// Scrape over an established connection.
    pub async fn scrape_with(&self, conn: &mut dyn Executor) -> Vec<Metric> {
        let _guard = self.lock.lock().await;
        let start = Instant::now();
        self.scrapes.fetch_add(1, Ordering::Relaxed);

        let mut out = Output::new(&self.registry, &self.options.namespace);
        let result = self.collect(conn, &mut out).await;
        self.finish(result, start, &mut out);

        out.into_metrics()
    }

    /// Counters of the exporter itself, across all scrapes.
    pub fn exporter_metrics(&self) -> Vec<Metric> {
        let mut out = Output::new(&self.registry, &self.options.namespace);

        let scrapes = self.scrapes.load(Ordering::Relaxed);
        let micros = self.scrape_duration_micros.load(Ordering::Relaxed);
        out.emit("exporter_scrapes_total", scrapes, &[]);
        out.summary(
            "exporter_scrape_duration_seconds",
            scrapes,
            micros as f64 / 1e6,
            vec![],
            &[],
        );
        out.emit(
            "exporter_scan_budget_exceeded_total",
            self.scan_budget_exceeded.load(Ordering::Relaxed),
            &[],
        );

        out.into_metrics()
    }

    fn observe(&self, start: Instant) -> f64 {
        let elapsed = start.elapsed();
        self.scrape_duration_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        elapsed.as_secs_f64()
    }

    fn finish(&self, result: Result<(), Error>, start: Instant, out: &mut Output<'_>) {
        match result {
            Ok(()) => {
                out.emit("exporter_last_scrape_error", 0, &[""]);
                out.emit("up", 1, &[]);
            }
            Err(err) => {
                warn!(message = "scrape redis failed", %err);

                out.emit("exporter_last_scrape_error", 1, &[&err.to_string()]);
                out.emit("up", 0, &[]);
            }
        }

        let elapsed = self.observe(start);
        out.emit("exporter_last_scrape_duration_seconds", elapsed, &[]);
    }

    async fn connect(&self, target: &Target) -> Result<Connection, Error> {
        let addr = target.addr();
        let mut conn = Connection::connect(&addr, self.options.timeout)
            .await
            .map_err(|err| Error::Connect {
                addr: addr.clone(),
                err,
            })?;

        let user = target.user.as_deref().or(self.options.user.as_deref());
        let password = target
            .password
            .as_deref()
            .or(self.options.password.as_deref());
        let auth = match (user, password) {
            (Some(user), Some(password)) => conn.execute(&["AUTH", user, password]).await,
            (None, Some(password)) => conn.execute(&["AUTH", password]).await,
            _ => return Ok(conn),
        };

        match auth {
            Ok(_) => Ok(conn),
            Err(err) => Err(Error::Connect { addr, err }),
        }
    }

    async fn collect(&self, conn: &mut dyn Executor, out: &mut Output<'_>) -> Result<(), Error> {
        let opts = &self.options;
        let exceeded = &self.scan_budget_exceeded;

        if opts.ping_on_connect {
            let start = Instant::now();
            match conn.execute(&["PING"]).await {
                Ok(_) => out.emit(
                    "exporter_last_scrape_ping_time_seconds",
                    start.elapsed().as_secs_f64(),
                    &[],
                ),
                Err(err) => {
                    warn!(message = "ping redis failed", %err);
                }
            }
        }

        if opts.set_client_name {
            if let Err(err) = conn.execute(&["CLIENT", "SETNAME", CLIENT_NAME]).await {
                warn!(message = "set client name failed", %err);
            }
        }

        let mut databases = None;
        if opts.config_command != "-" {
            match conn.execute(&[opts.config_command.as_str(), "GET", "*"]).await {
                Ok(reply) => {
                    databases = config::extract(
                        reply,
                        opts.include_config_metrics,
                        opts.redact_config_metrics,
                        out,
                    )?;
                }
                Err(err) if err.is_unknown_command() => {
                    debug!(message = "config command is not available", %err);
                }
                Err(err) => return Err(Error::Config(err.to_string())),
            }
        }

        // some proxies and old servers reject `INFO ALL` or answer it with
        // nothing
        let raw = match conn.query::<Bytes>(&["INFO", "ALL"]).await {
            Ok(raw) if !raw.is_empty() => raw,
            Ok(_) => {
                debug!(message = "INFO ALL is empty, fallback to INFO");
                conn.query::<Bytes>(&["INFO"]).await.map_err(Error::Info)?
            }
            Err(err) => {
                debug!(message = "INFO ALL failed, fallback to INFO", %err);
                conn.query::<Bytes>(&["INFO"]).await.map_err(Error::Info)?
            }
        };
        let text = info::sanitize(&raw);
        let report = info::parse(&text);

        let databases = if report.is_cluster() || opts.is_cluster {
            skip("cluster", cluster(conn, out).await);
            // cluster mode supports only one database
            1
        } else {
            match databases {
                None | Some(0) => 16,
                Some(n) => n,
            }
        };

        let now = unix_now();
        let role = info::extract(
            &report,
            info::Context {
                databases,
                include_empty_databases: opts.include_metrics_for_empty_databases,
                now,
            },
            out,
        );

        if !opts.exclude_latency_histogram_metrics {
            skip("latency", latency::collect(conn, &report, out).await);
        }

        if role != Role::Master || !opts.skip_checks_for_master {
            skip(
                "check keys",
                keys::check_keys(
                    conn,
                    &opts.check_single_keys,
                    &opts.check_keys,
                    opts.batch_size,
                    !opts.disable_exporting_key_values,
                    exceeded,
                    out,
                )
                .await,
            );
            skip(
                "count keys",
                keys::count_keys(conn, &opts.count_keys, opts.batch_size, exceeded, out).await,
            );
            skip(
                "streams",
                streams::collect(
                    conn,
                    &opts.check_single_streams,
                    &opts.check_streams,
                    opts.batch_size,
                    opts.streams_exclude_consumer_metrics,
                    exceeded,
                    out,
                )
                .await,
            );
        }

        skip("slowlog", slowlog::collect(conn, out).await);

        skip(
            "key groups",
            key_groups::collect(
                conn,
                &opts.key_groups,
                opts.max_distinct_key_groups,
                opts.batch_size,
                exceeded,
                out,
            )
            .await,
        );

        if report.has_section("Sentinel") {
            skip("sentinel", sentinel::collect(conn, out).await);
        }

        if opts.export_client_list {
            skip(
                "client list",
                clients::collect(conn, opts.export_client_port, now, out).await,
            );
        }

        if opts.is_tile38 {
            skip("tile38", tile38::collect(conn, out).await);
        }

        if opts.include_modules_metrics {
            skip("modules", modules::collect(conn, out).await);
        }

        for script in &opts.lua_scripts {
            skip("lua script", lua::collect(conn, script, out).await);
        }

        Ok(())
    }
}

async fn cluster(conn: &mut dyn Executor, out: &mut Output<'_>) -> Result<(), Error> {
    let raw: Bytes = conn.query(&["CLUSTER", "INFO"]).await?;
    let text = info::sanitize(&raw);

    for entry in info::parse(&text).entries() {
        if let Entry::Field { key, value, .. } = entry {
            out.field(key, value);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use connection::Reply;
    use testing::{MockExecutor, list_reply, scan_reply, text_reply};

    const INFO: &str = "# Server\r\n\
redis_version:7.2.4\r\n\
redis_mode:standalone\r\n\
os:Linux 6.1.0 x86_64\r\n\
tcp_port:6379\r\n\
uptime_in_seconds:100\r\n\
# Memory\r\n\
used_memory:1048576\r\n\
maxmemory:0\r\n\
# Replication\r\n\
role:master\r\n\
connected_slaves:0\r\n\
# Keyspace\r\n\
db0:keys=3,expires=1,avg_ttl=5000\r\n";

    fn names(metrics: &[Metric]) -> Vec<&str> {
        metrics.iter().map(|m| m.name()).collect()
    }

    fn find<'a>(metrics: &'a [Metric], name: &str) -> Option<&'a Metric> {
        metrics.iter().find(|m| m.name() == name)
    }

    fn base() -> MockExecutor {
        MockExecutor::default()
            .reply("CONFIG GET *", list_reply(&["databases", "2", "maxmemory", "0"]))
            .text("INFO ALL", INFO)
            .reply("LATENCY LATEST", Reply::List(vec![]))
            .reply("LATENCY HISTOGRAM", Reply::List(vec![]))
            .reply("SLOWLOG LEN", Reply::Integer(0))
            .reply("SLOWLOG GET 1", Reply::List(vec![]))
    }

    #[tokio::test]
    async fn connect_failure() {
        let exporter = Exporter::new(Options {
            timeout: Duration::from_millis(500),
            ..Default::default()
        })
        .unwrap();

        // nothing listens on port 1
        let target = "127.0.0.1:1".parse::<Target>().unwrap();
        let metrics = exporter.scrape(&target).await;

        assert_eq!(
            names(&metrics),
            vec!["redis_exporter_last_scrape_error", "redis_up"]
        );
        assert_eq!(metrics[0].value.as_f64(), Some(1.0));
        assert!(metrics[0].tag_value("err").is_some_and(|err| !err.is_empty()));
        assert_eq!(metrics[1].value.as_f64(), Some(0.0));
    }

    #[tokio::test]
    async fn standalone() {
        let exporter = Exporter::new(Options::default()).unwrap();
        let mut conn = base();

        let metrics = exporter.scrape_with(&mut conn).await;

        let up = find(&metrics, "redis_up").unwrap();
        assert_eq!(up.value.as_f64(), Some(1.0));
        let err = find(&metrics, "redis_exporter_last_scrape_error").unwrap();
        assert_eq!(err.value.as_f64(), Some(0.0));
        assert_eq!(err.tag_value("err"), Some(""));

        let memory = find(&metrics, "redis_memory_used_bytes").unwrap();
        assert_eq!(memory.value.as_f64(), Some(1048576.0));

        // databases from CONFIG, db1 is padded
        let dbs = metrics
            .iter()
            .filter(|m| m.name() == "redis_db_keys")
            .map(|m| m.tag_value("db").unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        assert_eq!(dbs, ["db0", "db1"]);

        assert_eq!(
            conn.commands(),
            [
                "CONFIG GET *",
                "INFO ALL",
                "LATENCY LATEST",
                "LATENCY HISTOGRAM",
                "SLOWLOG LEN",
                "SLOWLOG GET 1"
            ]
        );

        // the last three are always emitted last
        let tail = names(&metrics[metrics.len() - 3..]).to_vec();
        assert_eq!(
            tail,
            vec![
                "redis_exporter_last_scrape_error",
                "redis_up",
                "redis_exporter_last_scrape_duration_seconds"
            ]
        );
    }

    #[tokio::test]
    async fn cluster_forces_one_database() {
        let exporter = Exporter::new(Options::default()).unwrap();
        let info = format!("{INFO}# Cluster\r\ncluster_enabled:1\r\n");
        let mut conn = base()
            .text("INFO ALL", &info)
            .text("CLUSTER INFO", "cluster_state:ok\r\ncluster_known_nodes:6\r\n");

        let metrics = exporter.scrape_with(&mut conn).await;

        assert_eq!(
            find(&metrics, "redis_cluster_state").unwrap().value.as_f64(),
            Some(1.0)
        );
        assert_eq!(
            find(&metrics, "redis_cluster_known_nodes").unwrap().value.as_f64(),
            Some(6.0)
        );
        assert_eq!(
            metrics.iter().filter(|m| m.name() == "redis_db_keys").count(),
            1
        );
    }

    #[tokio::test]
    async fn config_unavailable_falls_back() {
        let exporter = Exporter::new(Options::default()).unwrap();
        let mut conn = base().error("CONFIG GET *", "ERR unknown command 'CONFIG'");

        // MockExecutor reports scripted errors as server errors, only
        // unscripted commands are unknown
        let metrics = exporter.scrape_with(&mut conn).await;
        assert_eq!(
            find(&metrics, "redis_up").unwrap().value.as_f64(),
            Some(0.0)
        );

        let mut conn = MockExecutor::default()
            .text("INFO ALL", INFO)
            .reply("SLOWLOG LEN", Reply::Integer(0))
            .reply("SLOWLOG GET 1", Reply::List(vec![]));
        let metrics = exporter.scrape_with(&mut conn).await;
        assert_eq!(find(&metrics, "redis_up").unwrap().value.as_f64(), Some(1.0));
        assert_eq!(
            metrics.iter().filter(|m| m.name() == "redis_db_keys").count(),
            16
        );
    }

    #[tokio::test]
    async fn config_disabled() {
        let exporter = Exporter::new(Options {
            config_command: "-".to_string(),
            exclude_latency_histogram_metrics: true,
            ..Default::default()
        })
        .unwrap();
        let mut conn = base();

        exporter.scrape_with(&mut conn).await;
        assert_eq!(
            conn.commands(),
            ["INFO ALL", "SLOWLOG LEN", "SLOWLOG GET 1"]
        );
    }

    #[tokio::test]
    async fn info_failure_is_terminal() {
        let exporter = Exporter::new(Options::default()).unwrap();
        let mut conn = MockExecutor::default()
            .reply("CONFIG GET *", list_reply(&["databases", "16"]))
            .error("INFO ALL", "ERR oops")
            .timeout("INFO");

        let metrics = exporter.scrape_with(&mut conn).await;

        let err = find(&metrics, "redis_exporter_last_scrape_error").unwrap();
        assert_eq!(err.value.as_f64(), Some(1.0));
        assert!(err.tag_value("err").is_some_and(|err| err.starts_with("query info failed")));
        assert_eq!(find(&metrics, "redis_up").unwrap().value.as_f64(), Some(0.0));
        assert_eq!(conn.commands(), ["CONFIG GET *", "INFO ALL", "INFO"]);
    }

    #[tokio::test]
    async fn empty_info_all_falls_back() {
        let exporter = Exporter::new(Options::default()).unwrap();
        let mut conn = base().text("INFO ALL", "").text("INFO", INFO);

        let metrics = exporter.scrape_with(&mut conn).await;

        assert_eq!(find(&metrics, "redis_up").unwrap().value.as_f64(), Some(1.0));
        assert_eq!(
            find(&metrics, "redis_memory_used_bytes").unwrap().value.as_f64(),
            Some(1048576.0)
        );
        assert_eq!(&conn.commands()[..3], ["CONFIG GET *", "INFO ALL", "INFO"]);
    }

    #[tokio::test]
    async fn set_client_name_failure_keeps_up() {
        let exporter = Exporter::new(Options {
            set_client_name: true,
            ..Default::default()
        })
        .unwrap();
        let mut conn = base().error("CLIENT SETNAME redis_exporter", "NOPERM no permissions");

        let metrics = exporter.scrape_with(&mut conn).await;

        assert_eq!(find(&metrics, "redis_up").unwrap().value.as_f64(), Some(1.0));
        assert_eq!(
            &conn.commands()[..3],
            ["CLIENT SETNAME redis_exporter", "CONFIG GET *", "INFO ALL"]
        );
    }

    #[tokio::test]
    async fn invalid_databases_is_terminal() {
        let exporter = Exporter::new(Options::default()).unwrap();
        let mut conn = base().reply("CONFIG GET *", list_reply(&["databases", "many"]));

        let metrics = exporter.scrape_with(&mut conn).await;
        assert_eq!(find(&metrics, "redis_up").unwrap().value.as_f64(), Some(0.0));
        assert_eq!(conn.commands(), ["CONFIG GET *"]);
    }

    #[tokio::test]
    async fn step_failure_keeps_up() {
        let exporter = Exporter::new(Options::default()).unwrap();
        let mut conn = base()
            .timeout("LATENCY LATEST")
            .error("SLOWLOG GET 1", "ERR broken");

        let metrics = exporter.scrape_with(&mut conn).await;
        assert_eq!(find(&metrics, "redis_up").unwrap().value.as_f64(), Some(1.0));
        assert!(find(&metrics, "redis_latency_spike_last").is_none());
    }

    #[tokio::test]
    async fn skip_checks_for_master() {
        let exporter = Exporter::new(Options {
            skip_checks_for_master: true,
            count_keys: vec!["db0=user:*".parse().unwrap()],
            ..Default::default()
        })
        .unwrap();
        let mut conn = base();

        let metrics = exporter.scrape_with(&mut conn).await;
        assert!(find(&metrics, "redis_keys_count").is_none());
        assert!(!conn.commands().iter().any(|cmd| cmd.starts_with("SCAN")));
    }

    #[tokio::test]
    async fn key_groups() {
        let exporter = Exporter::new(Options {
            key_groups: vec![KeyGroup::new("db0=user:*".parse().unwrap()).unwrap()],
            max_distinct_key_groups: 1,
            ..Default::default()
        })
        .unwrap();
        let mut conn = base()
            .reply("SELECT 0", text_reply("OK"))
            .reply(
                "SCAN 0 MATCH user:* COUNT 1000",
                scan_reply("0", &["user:1", "user:2", "user:admin"]),
            )
            .reply("MEMORY USAGE user:1", Reply::Integer(10))
            .reply("MEMORY USAGE user:2", Reply::Integer(20))
            .reply("MEMORY USAGE user:admin", Reply::Integer(5));

        let metrics = exporter.scrape_with(&mut conn).await;

        let groups = metrics
            .iter()
            .filter(|m| m.name() == "redis_key_group_count")
            .map(|m| {
                (
                    m.tag_value("key_group").unwrap_or_default().to_string(),
                    m.value.as_f64().unwrap_or_default(),
                )
            })
            .collect::<Vec<_>>();
        assert_eq!(
            groups,
            vec![("user:*".to_string(), 2.0), ("overflow".to_string(), 1.0)]
        );
        assert_eq!(
            find(&metrics, "redis_number_of_distinct_key_groups")
                .unwrap()
                .value
                .as_f64(),
            Some(2.0)
        );
    }

    #[tokio::test]
    async fn exporter_metrics() {
        let exporter = Exporter::new(Options::default()).unwrap();
        let mut conn = base();

        exporter.scrape_with(&mut conn).await;
        exporter.scrape_with(&mut conn).await;

        let metrics = exporter.exporter_metrics();
        assert_eq!(
            names(&metrics),
            vec![
                "redis_exporter_scrapes_total",
                "redis_exporter_scrape_duration_seconds",
                "redis_exporter_scan_budget_exceeded_total"
            ]
        );
        assert_eq!(metrics[0].value.as_f64(), Some(2.0));
    }
}
