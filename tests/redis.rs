#![cfg(feature = "redis-integration-tests")]

//! Scrape a real server, `REDIS_ADDR` defaults to `localhost:6379`
//!
//! ```shell
//! docker run --rm -p 6379:6379 redis:7
//! cargo test --features redis-integration-tests --test redis
//! ```

use std::time::Duration;

use redis_exporter::redis::connection::{Connection, ExecutorExt};
use redis_exporter::redis::{Exporter, Options, Target};

fn addr() -> String {
    std::env::var("REDIS_ADDR").unwrap_or_else(|_| "localhost:6379".to_string())
}

async fn write_testdata(addr: &str) {
    let mut conn = Connection::connect(addr, Duration::from_secs(5))
        .await
        .unwrap();

    for i in 0..20 {
        let key = format!("it:user:{i}:profile");
        let resp = conn.query::<String>(&["SET", &key, "value"]).await.unwrap();
        assert_eq!(resp, "OK");
    }

    for i in 0..5 {
        let key = format!("it:job:{i}");
        conn.query::<i64>(&["LPUSH", &key, "a", "b"]).await.unwrap();
    }
}

fn value(metrics: &[event::Metric], name: &str) -> Option<f64> {
    metrics
        .iter()
        .find(|m| m.name() == name)
        .and_then(|m| m.value.as_f64())
}

#[tokio::test]
async fn scrape() {
    let addr = addr();
    write_testdata(&addr).await;

    let options = Options {
        check_keys: vec!["db0=it:job:*".parse().unwrap()],
        count_keys: vec!["db0=it:user:*".parse().unwrap()],
        key_groups: vec![
            redis_exporter::redis::KeyGroup::new("db0=it:user:*:profile".parse().unwrap())
                .unwrap(),
        ],
        ping_on_connect: true,
        set_client_name: true,
        export_client_list: true,
        include_config_metrics: true,
        ..Default::default()
    };
    let exporter = Exporter::new(options).unwrap();
    let target = addr.parse::<Target>().unwrap();

    let metrics = exporter.scrape(&target).await;

    assert_eq!(value(&metrics, "redis_up"), Some(1.0));
    assert!(value(&metrics, "redis_uptime_in_seconds").is_some());
    assert!(value(&metrics, "redis_exporter_last_scrape_ping_time_seconds").is_some());
    assert_eq!(value(&metrics, "redis_keys_count"), Some(20.0));

    let lengths = metrics
        .iter()
        .filter(|m| m.name() == "redis_key_size")
        .count();
    assert_eq!(lengths, 5);

    let clients = metrics
        .iter()
        .filter(|m| m.name() == "redis_connected_client_info")
        .count();
    assert!(clients >= 1);
}

#[tokio::test]
async fn scrape_twice() {
    let exporter = Exporter::new(Options::default()).unwrap();
    let target = addr().parse::<Target>().unwrap();

    for _ in 0..2 {
        let metrics = exporter.scrape(&target).await;
        assert_eq!(value(&metrics, "redis_up"), Some(1.0));
    }

    assert_eq!(
        value(&exporter.exporter_metrics(), "redis_exporter_scrapes_total"),
        Some(2.0)
    );
}
