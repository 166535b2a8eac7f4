use super::Error;
use super::connection::Reply;
use super::info::REDACTED;
use super::output::Output;

/// Values of these keys are secrets.
const REDACTED_KEYS: [&str; 4] = [
    "masterauth",
    "requirepass",
    "tls-key-file-pass",
    "tls-client-key-file-pass",
];

/// Exported as `config_<key>` regardless of `include_config_metrics`
const DIRECTIVES: [(&str, &str); 3] = [
    ("io-threads", "config_io_threads"),
    ("maxclients", "config_maxclients"),
    ("maxmemory", "config_maxmemory"),
];

/// Extract metrics from the reply of `CONFIG GET *`, returns the value of
/// `databases` if the server reports it.
///
/// An odd-length reply or an invalid `databases` value is an error, any
/// other unexpected key or value is skipped.
pub fn extract(
    reply: Reply,
    include: bool,
    redact: bool,
    out: &mut Output<'_>,
) -> Result<Option<u32>, Error> {
    let pairs = reply
        .into_pairs()
        .map_err(|err| Error::Config(err.to_string()))?;

    let mut databases = None;
    for (key, value) in pairs {
        let Some(key) = key.as_str() else {
            warn!(message = "invalid config key, skipped", ?key);
            continue;
        };

        let value = match &value {
            Reply::Text(_) => value.as_str().unwrap_or(REDACTED),
            _ => {
                debug!(message = "invalid config value, skipped", key, ?value);
                continue;
            }
        };

        if key == "databases" {
            let num = value
                .parse::<u32>()
                .map_err(|_err| Error::Config(format!("invalid databases {value:?}")))?;
            databases = Some(num);
        }

        if include {
            let secret = redact && REDACTED_KEYS.contains(&key);
            if secret {
                out.emit("config_key_value", 1, &[key, REDACTED]);
            } else {
                out.emit("config_key_value", 1, &[key, value]);
                if let Ok(num) = value.parse::<f64>() {
                    out.emit("config_value", num, &[key]);
                }
            }
        }

        if let Some((_, name)) = DIRECTIVES.iter().find(|(directive, _)| *directive == key) {
            if let Ok(num) = value.parse::<f64>() {
                out.emit(name, num, &[]);
            }
        }

        if key == "client-output-buffer-limit" {
            client_output_buffer_limit(value, out);
        }
    }

    Ok(databases)
}

/// `normal 0 0 0 slave 1610612736 1610612736 0 pubsub 33554432 8388608 60`
///
/// Every class takes 4 tokens, `class hard soft seconds`.
fn client_output_buffer_limit(value: &str, out: &mut Output<'_>) {
    let tokens = value.split_ascii_whitespace().collect::<Vec<_>>();
    if tokens.len() % 4 != 0 {
        debug!(message = "trailing tokens of client-output-buffer-limit", value);
    }

    for class in tokens.chunks_exact(4) {
        let name = class[0];

        if let Ok(hard) = class[1].parse::<f64>() {
            out.emit(
                "config_client_output_buffer_limit_bytes",
                hard,
                &[name, "hard"],
            );
        }
        if let Ok(soft) = class[2].parse::<f64>() {
            out.emit(
                "config_client_output_buffer_limit_bytes",
                soft,
                &[name, "soft"],
            );
        }
        if let Ok(seconds) = class[3].parse::<f64>() {
            out.emit(
                "config_client_output_buffer_limit_overcome_seconds",
                seconds,
                &[name, "soft"],
            );
        }
    }
}
