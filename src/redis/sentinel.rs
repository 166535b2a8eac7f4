use std::collections::BTreeMap;

use super::Error;
use super::connection::{Executor, ExecutorExt};
use super::output::Output;

type Info = BTreeMap<String, String>;

const SETTINGS: [(&str, &str); 4] = [
    ("quorum", "sentinel_master_setting_ckquorum"),
    ("failover-timeout", "sentinel_master_setting_failover_timeout"),
    ("parallel-syncs", "sentinel_master_setting_parallel_syncs"),
    ("down-after-milliseconds", "sentinel_master_setting_down_after_milliseconds"),
];

pub async fn collect(conn: &mut dyn Executor, out: &mut Output<'_>) -> Result<(), Error> {
    let masters: Vec<Info> = conn.query(&["SENTINEL", "MASTERS"]).await?;

    for info in masters {
        let (Some(master), Some(ip), Some(port)) =
            (info.get("name"), info.get("ip"), info.get("port"))
        else {
            continue;
        };
        let address = format!("{ip}:{port}");

        let (status, message) = match conn
            .query::<String>(&["SENTINEL", "CKQUORUM", master.as_str()])
            .await
        {
            Ok(message) => (1, message),
            Err(err) => (0, err.to_string()),
        };
        out.emit(
            "sentinel_master_ckquorum_status",
            status,
            &[master, &message],
        );

        for (key, name) in SETTINGS {
            let value = info
                .get(key)
                .and_then(|value| value.parse::<f64>().ok())
                .unwrap_or_default();

            out.emit(name, value, &[master, &address]);
        }

        // this master is in ok state if we are here, so it counts itself
        match conn
            .query::<Vec<Info>>(&["SENTINEL", "SENTINELS", master.as_str()])
            .await
        {
            Ok(sentinels) => out.emit(
                "sentinel_master_ok_sentinels",
                1 + healthy(&sentinels),
                &[master, &address],
            ),
            Err(err) => {
                debug!(message = "query sentinels failed", %master, %err);
            }
        }

        match conn
            .query::<Vec<Info>>(&["SENTINEL", "SLAVES", master.as_str()])
            .await
        {
            Ok(slaves) => out.emit(
                "sentinel_master_ok_slaves",
                healthy(&slaves),
                &[master, &address],
            ),
            Err(err) => {
                debug!(message = "query slaves failed", %master, %err);
            }
        }
    }

    Ok(())
}

/// Instances which are neither subjectively nor objectively down
fn healthy(infos: &[Info]) -> usize {
    infos
        .iter()
        .filter(|info| match info.get("flags") {
            Some(flags) => !flags.contains("o_down") && !flags.contains("s_down"),
            None => false,
        })
        .count()
}
