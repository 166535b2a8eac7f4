use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use redis_exporter::http::{State, serve};
use redis_exporter::redis::{Exporter, Options, Target};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const INFO: &str = "# Server\r\n\
redis_version:7.2.4\r\n\
redis_mode:standalone\r\n\
uptime_in_seconds:100\r\n\
# Memory\r\n\
used_memory:1048576\r\n\
# Replication\r\n\
role:master\r\n\
connected_slaves:0\r\n\
# Keyspace\r\n\
db0:keys=3,expires=1,avg_ttl=5000\r\n";

type Handler = fn(&[String]) -> String;

fn bulk(text: &str) -> String {
    format!("${}\r\n{}\r\n", text.len(), text)
}

fn unknown(args: &[String]) -> String {
    format!("-ERR unknown command '{}'\r\n", args[0])
}

/// Answers like a standalone server with two databases
fn standalone(args: &[String]) -> String {
    let args_ref = args.iter().map(String::as_str).collect::<Vec<_>>();
    match args_ref.as_slice() {
        ["AUTH", "secret"] => "+OK\r\n".to_string(),
        ["AUTH", ..] => "-WRONGPASS invalid username-password pair\r\n".to_string(),
        ["CONFIG", "GET", "*"] => format!("*2\r\n{}{}", bulk("databases"), bulk("2")),
        ["INFO", "ALL"] => bulk(INFO),
        ["SLOWLOG", "LEN"] => ":0\r\n".to_string(),
        ["SLOWLOG", "GET", "1"] => "*0\r\n".to_string(),
        _ => unknown(args),
    }
}

fn broken_info(args: &[String]) -> String {
    match args[0].as_str() {
        "INFO" => "-LOADING Redis is loading the dataset in memory\r\n".to_string(),
        _ => unknown(args),
    }
}

async fn read_command<R>(reader: &mut BufReader<R>) -> Option<Vec<String>>
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let num = line.trim_end().strip_prefix('*')?.parse::<usize>().ok()?;

    let mut args = Vec::with_capacity(num);
    for _ in 0..num {
        line.clear();
        reader.read_line(&mut line).await.ok()?;
        let len = line.trim_end().strip_prefix('$')?.parse::<usize>().ok()?;

        let mut data = vec![0; len + 2];
        reader.read_exact(&mut data).await.ok()?;
        data.truncate(len);
        args.push(String::from_utf8(data).ok()?);
    }

    Some(args)
}

/// A tiny RESP server, every received command is recorded
async fn fake_server(handler: Handler) -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let commands = Arc::new(Mutex::new(vec![]));

    let recorded = Arc::clone(&commands);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _peer)) = listener.accept().await else {
                return;
            };

            let recorded = Arc::clone(&recorded);
            tokio::spawn(async move {
                let (read, mut write) = stream.into_split();
                let mut reader = BufReader::new(read);

                while let Some(args) = read_command(&mut reader).await {
                    recorded.lock().unwrap().push(args.join(" "));

                    let resp = handler(&args);
                    if write.write_all(resp.as_bytes()).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    (addr, commands)
}

fn exporter() -> Exporter {
    Exporter::new(Options {
        timeout: Duration::from_secs(2),
        ..Default::default()
    })
    .unwrap()
}

fn value(metrics: &[event::Metric], name: &str) -> Option<f64> {
    metrics
        .iter()
        .find(|m| m.name() == name)
        .and_then(|m| m.value.as_f64())
}

#[tokio::test]
async fn scrape_standalone() {
    let (addr, commands) = fake_server(standalone).await;
    let target = addr.to_string().parse::<Target>().unwrap();

    let metrics = exporter().scrape(&target).await;

    assert_eq!(value(&metrics, "redis_up"), Some(1.0));
    assert_eq!(value(&metrics, "redis_memory_used_bytes"), Some(1048576.0));
    assert_eq!(value(&metrics, "redis_uptime_in_seconds"), Some(100.0));
    assert!(value(&metrics, "redis_exporter_last_scrape_connect_time_seconds").is_some());

    let dbs = metrics
        .iter()
        .filter(|m| m.name() == "redis_db_keys")
        .map(|m| (m.tag_value("db").unwrap_or_default().to_string(), m.value.as_f64()))
        .collect::<Vec<_>>();
    assert_eq!(
        dbs,
        vec![("db0".to_string(), Some(3.0)), ("db1".to_string(), Some(0.0))]
    );

    let commands = commands.lock().unwrap().clone();
    assert_eq!(&commands[..2], ["CONFIG GET *", "INFO ALL"]);
}

#[tokio::test]
async fn scrape_with_password() {
    let (addr, commands) = fake_server(standalone).await;
    let target = format!("redis://:secret@{addr}").parse::<Target>().unwrap();

    let metrics = exporter().scrape(&target).await;

    assert_eq!(value(&metrics, "redis_up"), Some(1.0));
    assert_eq!(commands.lock().unwrap()[0], "AUTH secret");
}

#[tokio::test]
async fn configured_password_goes_to_any_target() {
    let (addr, commands) = fake_server(standalone).await;
    let exporter = Exporter::new(Options {
        timeout: Duration::from_secs(2),
        password: Some("secret".to_string()),
        ..Default::default()
    })
    .unwrap();
    let target = addr.to_string().parse::<Target>().unwrap();

    let metrics = exporter.scrape(&target).await;

    assert_eq!(value(&metrics, "redis_up"), Some(1.0));
    assert_eq!(commands.lock().unwrap()[0], "AUTH secret");
}

#[tokio::test]
async fn wrong_password() {
    let (addr, _commands) = fake_server(standalone).await;
    let target = format!("redis://:nope@{addr}").parse::<Target>().unwrap();

    let metrics = exporter().scrape(&target).await;

    let names = metrics.iter().map(|m| m.name()).collect::<Vec<_>>();
    assert_eq!(names, vec!["redis_exporter_last_scrape_error", "redis_up"]);
    assert_eq!(value(&metrics, "redis_up"), Some(0.0));
    assert_eq!(
        value(&metrics, "redis_exporter_last_scrape_error"),
        Some(1.0)
    );
}

#[tokio::test]
async fn info_unavailable() {
    let (addr, commands) = fake_server(broken_info).await;
    let target = addr.to_string().parse::<Target>().unwrap();

    let metrics = exporter().scrape(&target).await;

    assert_eq!(value(&metrics, "redis_up"), Some(0.0));
    assert!(value(&metrics, "redis_exporter_last_scrape_duration_seconds").is_some());
    assert_eq!(
        commands.lock().unwrap().clone(),
        vec!["CONFIG GET *", "INFO ALL", "INFO"]
    );
}

#[tokio::test]
async fn serve_metrics() {
    let (addr, _commands) = fake_server(standalone).await;
    let state = Arc::new(State {
        exporter: exporter(),
        target: addr.to_string().parse().unwrap(),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http_addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(serve(listener, state, async move {
        let _ = rx.await;
    }));

    let mut stream = TcpStream::connect(http_addr).await.unwrap();
    stream
        .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut resp = String::new();
    stream.read_to_string(&mut resp).await.unwrap();

    assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"), "{resp}");
    assert!(resp.contains("# TYPE redis_up gauge\n"));
    assert!(resp.contains("\nredis_up 1\n"));
    assert!(resp.contains("\nredis_exporter_scrapes_total 1\n"));

    tx.send(()).unwrap();
    server.await.unwrap();
}
