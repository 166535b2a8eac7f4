use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use argh::FromArgs;
use exitcode::ExitCode;
use redis_exporter::config::Config;
use redis_exporter::http::State;
use redis_exporter::redis::Exporter;
use tokio::net::TcpListener;
use tracing::{error, info};

fn default_worker_threads() -> usize {
    match std::env::var("REDIS_EXPORTER_WORKER_THREADS") {
        Ok(value) => value.parse::<usize>().unwrap_or(2),
        Err(_) => 2,
    }
}

#[derive(FromArgs)]
#[argh(
    description = "Export Redis, Valkey, KeyDB and Tile38 status as Prometheus metrics",
    help_triggers("-h", "--help")
)]
pub struct RootCommand {
    #[argh(switch, short = 'v', description = "show version")]
    version: bool,

    #[argh(
        option,
        short = 'l',
        default = "\"info\".to_string()",
        description = "log level, REDIS_EXPORTER_LOG takes precedence"
    )]
    log_level: String,

    #[argh(switch, description = "log in JSON")]
    log_json: bool,

    #[argh(
        option,
        short = 'c',
        long = "config",
        description = "read configuration from the YAML file, defaults apply without it"
    )]
    config: Option<PathBuf>,

    #[argh(
        option,
        short = 't',
        default = "default_worker_threads()",
        description = "specify how many threads the Tokio runtime will use"
    )]
    threads: usize,

    #[argh(subcommand)]
    sub_commands: Option<SubCommands>,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum SubCommands {
    Validate(Validate),
}

#[derive(FromArgs)]
#[argh(
    subcommand,
    name = "validate",
    description = "Validate the configuration, then exit"
)]
struct Validate {}

fn load_config(path: Option<&PathBuf>) -> Result<Config, ExitCode> {
    let result = match path {
        Some(path) => Config::load(path),
        None => Config::from_yaml("{}"),
    };

    result.map_err(|err| {
        error!(message = "load config failed", %err);
        exitcode::CONFIG
    })
}

fn build_state(config: &Config) -> Result<State, ExitCode> {
    let target = config.target().map_err(|err| {
        error!(message = "invalid target", %err);
        exitcode::CONFIG
    })?;
    let options = config.options().map_err(|err| {
        error!(message = "invalid options", %err);
        exitcode::CONFIG
    })?;
    let exporter = Exporter::new(options).map_err(|err| {
        error!(message = "build exporter failed", %err);
        exitcode::SOFTWARE
    })?;

    Ok(State { exporter, target })
}

impl RootCommand {
    #![allow(clippy::print_stdout)]
    fn show_version(&self) {
        println!(
            "{} {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        );
    }

    pub fn run(&self) -> Result<(), ExitCode> {
        if self.version {
            self.show_version();
            return Ok(());
        }

        let levels = std::env::var("REDIS_EXPORTER_LOG").unwrap_or(self.log_level.clone());
        let color = std::io::stdout().is_terminal();
        redis_exporter::trace::init(color, self.log_json, &levels);

        let config = load_config(self.config.as_ref())?;
        let state = build_state(&config)?;

        if let Some(SubCommands::Validate(_)) = &self.sub_commands {
            println!("Validated");
            return Ok(());
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("redis-exporter-worker")
            .worker_threads(self.threads.max(1))
            .enable_io()
            .enable_time()
            .build()
            .map_err(|err| {
                error!(message = "build runtime failed", %err);
                exitcode::OSERR
            })?;

        runtime.block_on(async move {
            let listener = TcpListener::bind(config.listen).await.map_err(|err| {
                error!(message = "bind listener failed", listen = %config.listen, %err);
                exitcode::UNAVAILABLE
            })?;

            info!(
                message = "start redis exporter",
                listen = %config.listen,
                redis = %state.target,
                threads = self.threads,
            );

            let shutdown = async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    error!(message = "listen for shutdown signal failed", %err);
                    // never resolve, there is no way to be stopped gracefully
                    std::future::pending::<()>().await;
                }

                info!(message = "shutdown signal received");
            };

            redis_exporter::http::serve(listener, Arc::new(state), shutdown).await;

            Ok::<(), ExitCode>(())
        })
    }
}
