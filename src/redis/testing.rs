use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;

use super::connection::{Error, Executor, Reply};

#[derive(Clone, Debug)]
enum Scripted {
    Reply(Reply),
    Server(String),
    Timeout,
}

/// An in-memory `Executor` with scripted replies.
///
/// Replies are keyed by the command line, i.e. the arguments joined with a
/// space. Unscripted commands fail with `ERR unknown command`.
#[derive(Debug, Default)]
pub struct MockExecutor {
    replies: HashMap<String, Scripted>,
    commands: Vec<String>,
}

impl MockExecutor {
    pub fn reply(mut self, cmd: &str, reply: Reply) -> Self {
        self.replies.insert(cmd.to_string(), Scripted::Reply(reply));
        self
    }

    pub fn text(self, cmd: &str, text: &str) -> Self {
        self.reply(cmd, text_reply(text))
    }

    pub fn error(mut self, cmd: &str, err: &str) -> Self {
        self.replies
            .insert(cmd.to_string(), Scripted::Server(err.to_string()));
        self
    }

    pub fn timeout(mut self, cmd: &str) -> Self {
        self.replies.insert(cmd.to_string(), Scripted::Timeout);
        self
    }

    /// Every command executed so far, in order
    pub fn commands(&self) -> &[String] {
        &self.commands
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn execute(&mut self, args: &[&str]) -> Result<Reply, Error> {
        let cmd = args.join(" ");
        self.commands.push(cmd.clone());

        match self.replies.get(&cmd) {
            Some(Scripted::Reply(reply)) => Ok(reply.clone()),
            Some(Scripted::Server(err)) => Err(Error::Server(err.clone())),
            Some(Scripted::Timeout) => Err(Error::Timeout(std::time::Duration::from_secs(1))),
            None => Err(Error::UnknownCommand(format!(
                "ERR unknown command '{}'",
                args.first().copied().unwrap_or_default()
            ))),
        }
    }
}

pub fn text_reply(text: &str) -> Reply {
    Reply::Text(Bytes::copy_from_slice(text.as_bytes()))
}

pub fn list_reply(items: &[&str]) -> Reply {
    Reply::List(items.iter().map(|item| text_reply(item)).collect())
}

/// The reply of `SCAN`
pub fn scan_reply(cursor: &str, keys: &[&str]) -> Reply {
    Reply::List(vec![text_reply(cursor), list_reply(keys)])
}
