use super::Error;
use super::connection::{Executor, Reply};
use super::output::Output;

/// A user script which returns a flat `{key, value, key, value, ...}` table
#[derive(Clone, Debug)]
pub struct Script {
    pub filename: String,
    pub content: String,
}

const FAILED: i32 = 0;
const SUCCEEDED: i32 = 1;
const EMPTY: i32 = 2;

fn values(reply: Reply) -> Result<Vec<(String, f64)>, Error> {
    let mut values = Vec::new();

    for (key, value) in reply.into_pairs()? {
        let Some(key) = key.as_str() else {
            continue;
        };

        match value.as_f64() {
            Some(value) => values.push((key.to_string(), value)),
            None => {
                debug!(message = "script value is not a number", key);
            }
        }
    }

    Ok(values)
}

/// Evaluate the script, its result is reported with `script_result` even
/// if the evaluation fails.
pub async fn collect(
    conn: &mut dyn Executor,
    script: &Script,
    out: &mut Output<'_>,
) -> Result<(), Error> {
    let filename = script.filename.as_str();

    let result = match conn.execute(&["EVAL", &script.content, "0"]).await {
        Ok(Reply::Nil) => Ok(None),
        Ok(reply) => values(reply).map(Some),
        Err(err) => Err(err.into()),
    };

    match result {
        Ok(None) => {
            out.emit("script_result", EMPTY, &[filename]);
            Ok(())
        }
        Ok(Some(values)) if values.is_empty() => {
            out.emit("script_result", EMPTY, &[filename]);
            Ok(())
        }
        Ok(Some(values)) => {
            out.emit("script_result", SUCCEEDED, &[filename]);
            for (key, value) in values {
                out.emit("script_values", value, &[&key, filename]);
            }
            Ok(())
        }
        Err(err) => {
            out.emit("script_result", FAILED, &[filename]);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::redis::registry::Registry;
    use crate::redis::testing::{MockExecutor, list_reply};

    const SCRIPT: &str = "return {'a', '11', 'b', '12', 'c', 'x'}";

    fn script() -> Script {
        Script {
            filename: "collect.lua".to_string(),
            content: SCRIPT.to_string(),
        }
    }

    fn series(out: Output<'_>) -> Vec<String> {
        out.into_metrics().iter().map(|m| m.to_string()).collect()
    }

    #[tokio::test]
    async fn values() {
        let cmd = format!("EVAL {SCRIPT} 0");
        let mut conn =
            MockExecutor::default().reply(&cmd, list_reply(&["a", "11", "b", "12", "c", "x"]));
        let registry = Registry::new(false).unwrap();
        let mut out = Output::new(&registry, "");

        collect(&mut conn, &script(), &mut out).await.unwrap();

        assert_eq!(
            series(out),
            vec![
                r#"script_result{filename="collect.lua"} 1"#,
                r#"script_values{key="a",filename="collect.lua"} 11"#,
                r#"script_values{key="b",filename="collect.lua"} 12"#,
            ]
        );
    }

    #[tokio::test]
    async fn empty() {
        let cmd = format!("EVAL {SCRIPT} 0");
        let mut conn = MockExecutor::default().reply(&cmd, Reply::List(vec![]));
        let registry = Registry::new(false).unwrap();
        let mut out = Output::new(&registry, "");

        collect(&mut conn, &script(), &mut out).await.unwrap();

        assert_eq!(series(out), vec![r#"script_result{filename="collect.lua"} 2"#]);
    }

    #[tokio::test]
    async fn failure() {
        let cmd = format!("EVAL {SCRIPT} 0");
        let mut conn = MockExecutor::default().error(&cmd, "ERR Error compiling script");
        let registry = Registry::new(false).unwrap();
        let mut out = Output::new(&registry, "");

        assert!(collect(&mut conn, &script(), &mut out).await.is_err());
        assert_eq!(series(out), vec![r#"script_result{filename="collect.lua"} 0"#]);
    }

    #[tokio::test]
    async fn odd_length() {
        let cmd = format!("EVAL {SCRIPT} 0");
        let mut conn = MockExecutor::default().reply(&cmd, list_reply(&["a", "1", "b"]));
        let registry = Registry::new(false).unwrap();
        let mut out = Output::new(&registry, "");

        assert!(collect(&mut conn, &script(), &mut out).await.is_err());
        assert_eq!(series(out), vec![r#"script_result{filename="collect.lua"} 0"#]);
    }
}
