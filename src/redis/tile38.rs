use super::Error;
use super::connection::{Executor, Reply};
use super::output::Output;

/// Tile38 speaks RESP but has no `INFO`, its server stats come from
/// `SERVER EXT` as a flat list of field value pairs.
pub async fn collect(conn: &mut dyn Executor, out: &mut Output<'_>) -> Result<(), Error> {
    let reply = conn.execute(&["SERVER", "EXT"]).await?;

    for (key, value) in reply.into_pairs()? {
        let Some(key) = key.as_str() else {
            continue;
        };

        let value = match &value {
            Reply::Integer(i) => i.to_string(),
            other => match other.as_str() {
                Some(text) => text.to_string(),
                None => continue,
            },
        };

        out.field(&format!("tile38_{key}"), &value);
    }

    Ok(())
}
