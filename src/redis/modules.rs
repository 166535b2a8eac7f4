use bytes::Bytes;

use super::Error;
use super::connection::{Executor, ExecutorExt};
use super::info::{Entry, parse, sanitize};
use super::output::Output;

/// `INFO MODULES` lists the loaded modules, RediSearch appends its own
/// `search_*` sections.
pub async fn collect(conn: &mut dyn Executor, out: &mut Output<'_>) -> Result<(), Error> {
    let raw: Bytes = conn.query(&["INFO", "MODULES"]).await?;
    let text = sanitize(&raw);
    let report = parse(&text);

    for entry in report.entries() {
        match entry {
            Entry::Module(module) => out.emit(
                "module_info",
                1,
                &[
                    module.name,
                    module.ver,
                    module.api,
                    module.filters,
                    module.usedby,
                    module.using,
                ],
            ),
            Entry::Field { key, value, .. } if key.starts_with("search_") => {
                out.field(key, value);
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::redis::registry::Registry;
    use crate::redis::testing::MockExecutor;

    #[tokio::test]
    async fn modules() {
        let text = "# Modules\r\n\
module:name=search,ver=20803,api=1,filters=0,usedby=[],using=[ReJSON],options=[handle-io-errors]\r\n\
module:name=ReJSON,ver=20606,api=1,filters=0,usedby=[search],using=[],options=[handle-io-errors]\r\n\
\r\n\
# search_version\r\n\
search_version:2.8.3\r\n\
# search_indexes\r\n\
search_number_of_indexes:2\r\n\
search_used_memory_indexes:1024\r\n\
search_not_a_metric:3\r\n";
        let mut conn = MockExecutor::default().text("INFO MODULES", text);
        let registry = Registry::new(false).unwrap();
        let mut out = Output::new(&registry, "redis");

        collect(&mut conn, &mut out).await.unwrap();

        let metrics = out
            .into_metrics()
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            metrics,
            vec![
                r#"redis_module_info{name="search",ver="20803",api="1",filters="0",usedby="[]",using="[ReJSON]"} 1"#,
                r#"redis_module_info{name="ReJSON",ver="20606",api="1",filters="0",usedby="[search]",using="[]"} 1"#,
                "redis_search_number_of_indexes 2",
                "redis_search_used_memory_indexes_bytes 1024",
            ]
        );
    }

    #[tokio::test]
    async fn unsupported() {
        let mut conn = MockExecutor::default();
        let registry = Registry::new(false).unwrap();
        let mut out = Output::new(&registry, "redis");

        assert!(collect(&mut conn, &mut out).await.is_err());
        assert!(out.is_empty());
    }
}
