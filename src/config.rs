use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::redis::{self, KeyArg, KeyGroup, Options, Script, Target};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("read {path:?} failed, {err}")]
    Io { path: PathBuf, err: std::io::Error },

    #[error("decode config failed, {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Redis(#[from] redis::Error),
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9121))
}

fn default_target() -> String {
    "redis://localhost:6379".to_string()
}

fn default_namespace() -> String {
    "redis".to_string()
}

const fn default_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_config_command() -> String {
    "CONFIG".to_string()
}

const fn default_batch_size() -> usize {
    1000
}

const fn default_max_distinct_key_groups() -> usize {
    100
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The address the HTTP server listens on
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// The server scraped by `/metrics`, e.g. `redis://localhost:6379`
    #[serde(default = "default_target")]
    pub target: String,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Prefix of all metric names
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Timeout of connecting and of every command
    #[serde(default = "default_timeout", with = "humanize::duration::serde")]
    pub timeout: Duration,

    /// Name of the `CONFIG` command, in case it is renamed. `-` skips it.
    #[serde(default = "default_config_command")]
    pub config_command: String,

    /// Key patterns, `db3=user:*` or just `user:*` for db0
    #[serde(default)]
    pub check_keys: Vec<String>,

    /// Single keys, never expanded with `SCAN`
    #[serde(default)]
    pub check_single_keys: Vec<String>,

    #[serde(default)]
    pub check_streams: Vec<String>,

    #[serde(default)]
    pub check_single_streams: Vec<String>,

    #[serde(default)]
    pub streams_exclude_consumer_metrics: bool,

    /// Patterns whose matches are counted into `keys_count`
    #[serde(default)]
    pub count_keys: Vec<String>,

    /// Patterns whose matches are aggregated into key groups
    #[serde(default)]
    pub check_key_groups: Vec<String>,

    #[serde(default = "default_batch_size")]
    pub check_keys_batch_size: usize,

    /// Keys of new groups are folded into `overflow` once this many
    /// groups exist in a database
    #[serde(default = "default_max_distinct_key_groups")]
    pub max_distinct_key_groups: usize,

    /// Lua scripts evaluated on every scrape
    #[serde(default)]
    pub lua_scripts: Vec<PathBuf>,

    #[serde(default)]
    pub include_config_metrics: bool,

    #[serde(default = "default_true")]
    pub redact_config_metrics: bool,

    #[serde(default)]
    pub include_modules_metrics: bool,

    #[serde(default)]
    pub include_system_metrics: bool,

    #[serde(default = "default_true")]
    pub include_metrics_for_empty_databases: bool,

    #[serde(default)]
    pub exclude_latency_histogram_metrics: bool,

    #[serde(default)]
    pub disable_exporting_key_values: bool,

    #[serde(default)]
    pub skip_checks_for_master: bool,

    #[serde(default)]
    pub export_client_list: bool,

    #[serde(default)]
    pub export_client_port: bool,

    #[serde(default)]
    pub ping_on_connect: bool,

    #[serde(default)]
    pub set_client_name: bool,

    #[serde(default)]
    pub is_tile38: bool,

    #[serde(default)]
    pub is_cluster: bool,
}

fn key_args(list: &[String]) -> Result<Vec<KeyArg>, redis::Error> {
    list.iter().map(|s| s.parse()).collect()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|err| Error::Io {
            path: path.to_path_buf(),
            err,
        })?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, Error> {
        serde_yaml::from_str(content).map_err(Into::into)
    }

    pub fn target(&self) -> Result<Target, Error> {
        self.target.parse::<Target>().map_err(Into::into)
    }

    /// Validate patterns and load scripts
    pub fn options(&self) -> Result<Options, Error> {
        let key_groups = key_args(&self.check_key_groups)?
            .into_iter()
            .map(KeyGroup::new)
            .collect::<Result<Vec<_>, _>>()?;

        let mut lua_scripts = Vec::with_capacity(self.lua_scripts.len());
        for path in &self.lua_scripts {
            let content = std::fs::read_to_string(path).map_err(|err| Error::Io {
                path: path.clone(),
                err,
            })?;

            lua_scripts.push(Script {
                filename: path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.to_string_lossy().into_owned()),
                content,
            });
        }

        Ok(Options {
            namespace: self.namespace.clone(),
            timeout: self.timeout,
            user: self.user.clone(),
            password: self.password.clone(),
            config_command: self.config_command.clone(),
            include_config_metrics: self.include_config_metrics,
            redact_config_metrics: self.redact_config_metrics,
            check_keys: key_args(&self.check_keys)?,
            check_single_keys: key_args(&self.check_single_keys)?,
            count_keys: key_args(&self.count_keys)?,
            check_streams: key_args(&self.check_streams)?,
            check_single_streams: key_args(&self.check_single_streams)?,
            streams_exclude_consumer_metrics: self.streams_exclude_consumer_metrics,
            key_groups,
            batch_size: self.check_keys_batch_size.max(1),
            max_distinct_key_groups: self.max_distinct_key_groups,
            disable_exporting_key_values: self.disable_exporting_key_values,
            skip_checks_for_master: self.skip_checks_for_master,
            lua_scripts,
            include_modules_metrics: self.include_modules_metrics,
            include_system_metrics: self.include_system_metrics,
            include_metrics_for_empty_databases: self.include_metrics_for_empty_databases,
            exclude_latency_histogram_metrics: self.exclude_latency_histogram_metrics,
            export_client_list: self.export_client_list,
            export_client_port: self.export_client_port,
            ping_on_connect: self.ping_on_connect,
            set_client_name: self.set_client_name,
            is_tile38: self.is_tile38,
            is_cluster: self.is_cluster,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults() {
        let config = Config::from_yaml("{}").unwrap();

        assert_eq!(config.listen, default_listen());
        assert_eq!(config.target, "redis://localhost:6379");
        assert_eq!(config.namespace, "redis");
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert_eq!(config.config_command, "CONFIG");
        assert_eq!(config.check_keys_batch_size, 1000);
        assert_eq!(config.max_distinct_key_groups, 100);
        assert!(config.redact_config_metrics);
        assert!(config.include_metrics_for_empty_databases);
        assert!(!config.include_config_metrics);
        assert!(!config.is_tile38);
    }

    #[test]
    fn full() {
        let config = Config::from_yaml(
            r#"
listen: 127.0.0.1:9200
target: valkey://cache:6380
password: secret
namespace: valkey
timeout: 3s
config_command: "-"
check_keys:
  - db1=user:*
  - session%3A*
check_single_keys:
  - db0=counter
count_keys:
  - db2=job:*
check_key_groups:
  - db0=cache:*:meta
max_distinct_key_groups: 50
include_config_metrics: true
redact_config_metrics: false
"#,
        )
        .unwrap();

        assert_eq!(config.listen, "127.0.0.1:9200".parse::<SocketAddr>().unwrap());
        assert_eq!(config.timeout, Duration::from_secs(3));
        let target = config.target().unwrap();
        assert_eq!(target.addr(), "cache:6380");

        let options = config.options().unwrap();
        assert_eq!(options.namespace, "valkey");
        assert_eq!(options.config_command, "-");
        assert_eq!(options.password.as_deref(), Some("secret"));
        assert_eq!(
            options
                .check_keys
                .iter()
                .map(|arg| arg.to_string())
                .collect::<Vec<_>>(),
            vec!["db1=user:*", "db0=session:*"]
        );
        assert_eq!(options.count_keys[0].db, 2);
        assert_eq!(options.key_groups.len(), 1);
        assert_eq!(options.max_distinct_key_groups, 50);
        assert!(options.include_config_metrics);
        assert!(!options.redact_config_metrics);
    }

    #[test]
    fn unknown_field() {
        assert!(Config::from_yaml("endpoint: localhost:6379").is_err());
    }

    #[test]
    fn invalid_key() {
        let config = Config::from_yaml("check_keys: [\"db3=\"]").unwrap();
        assert!(config.options().is_err());
    }

    #[test]
    fn missing_script() {
        let config = Config::from_yaml("lua_scripts: [/definitely/not/here.lua]").unwrap();
        assert!(matches!(config.options(), Err(Error::Io { .. })));
    }
}
