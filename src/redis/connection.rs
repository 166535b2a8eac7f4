use std::collections::BTreeMap;
use std::num::ParseIntError;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    UnknownCommand(String),

    #[error("server error {0}")]
    Server(String),

    #[error("parse reply failed, {0}")]
    Parse(String),

    #[error("unknown frame type {0:?}")]
    UnknownFrameType(char),

    #[error("unexpected reply, want {0}")]
    UnexpectedReply(&'static str),

    #[error("connection is out of sync with the server")]
    Desync,
}

impl Error {
    /// Sentinel and renamed commands reply with `ERR unknown command`, callers
    /// usually treat it as "not available".
    #[inline]
    pub fn is_unknown_command(&self) -> bool {
        matches!(self, Error::UnknownCommand(_))
    }
}

#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::Io(a), Error::Io(b)) => a.kind() == b.kind(),
            (Error::Timeout(a), Error::Timeout(b)) => a == b,
            (Error::UnknownCommand(a), Error::UnknownCommand(b)) => a == b,
            (Error::Server(a), Error::Server(b)) => a == b,
            (Error::Parse(a), Error::Parse(b)) => a == b,
            (Error::UnknownFrameType(a), Error::UnknownFrameType(b)) => a == b,
            (Error::UnexpectedReply(a), Error::UnexpectedReply(b)) => a == b,
            (Error::Desync, Error::Desync) => true,
            _ => false,
        }
    }
}

impl From<ParseIntError> for Error {
    fn from(err: ParseIntError) -> Self {
        Error::Parse(err.to_string())
    }
}

/// A decoded RESP2 reply.
///
/// Simple strings and bulk strings are both `Text`, the payload is kept
/// as raw bytes since keys and values are not guaranteed to be UTF-8.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Text(Bytes),
    Integer(i64),
    List(Vec<Reply>),
    Nil,
    Error(String),
}

impl Reply {
    /// Returns the text if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Reply::Text(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Reply::Integer(i) => Some(*i),
            Reply::Text(_) => self.as_str().and_then(|s| s.parse().ok()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Reply::Integer(i) => Some(*i as f64),
            Reply::Text(_) => self.as_str().and_then(|s| s.parse().ok()),
            _ => None,
        }
    }

    /// Split a flat `[k1, v1, k2, v2, ...]` list into pairs.
    pub fn into_pairs(self) -> Result<Vec<(Reply, Reply)>, Error> {
        let Reply::List(list) = self else {
            return Err(Error::UnexpectedReply("array"));
        };

        if list.len() % 2 != 0 {
            return Err(Error::Parse(
                "array length is not divisible by 2".to_string(),
            ));
        }

        let mut pairs = Vec::with_capacity(list.len() / 2);
        let mut iter = list.into_iter();
        while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
            pairs.push((key, value));
        }

        Ok(pairs)
    }

    // https://redis.io/docs/latest/develop/reference/protocol-spec/
    fn parse(buf: &[u8], pos: &mut usize) -> Result<Option<Reply>, Error> {
        // the shortest reply looks like `:0\r\n` which is 4 bytes
        if buf.len() < *pos + 4 {
            return Ok(None);
        }

        let typ = buf[*pos];
        *pos += 1;

        let Some(line) = read_until_crlf(buf, pos) else {
            return Ok(None);
        };

        match typ {
            b'+' => Ok(Some(Reply::Text(Bytes::copy_from_slice(line)))),
            b'-' => Ok(Some(Reply::Error(
                String::from_utf8_lossy(line).into_owned(),
            ))),
            b':' => Ok(Some(Reply::Integer(parse_int(line)?))),
            b'$' => {
                let len = parse_int(line)?;
                if len < 0 {
                    return Ok(Some(Reply::Nil));
                }

                let len = len as usize;
                if buf.len() < *pos + len + 2 {
                    return Ok(None);
                }

                let data = Bytes::copy_from_slice(&buf[*pos..*pos + len]);
                *pos += len + 2;

                Ok(Some(Reply::Text(data)))
            }
            b'*' => {
                let len = parse_int(line)?;
                if len < 0 {
                    return Ok(Some(Reply::Nil));
                }

                // every element takes at least 3 bytes, so the header
                // cannot ask for more than what is buffered
                let mut list = Vec::with_capacity((len as usize).min(buf.len() - *pos));
                for _ in 0..len {
                    match Reply::parse(buf, pos)? {
                        Some(reply) => list.push(reply),
                        None => return Ok(None),
                    }
                }

                Ok(Some(Reply::List(list)))
            }
            typ => Err(Error::UnknownFrameType(typ as char)),
        }
    }
}

#[inline]
fn read_until_crlf<'a>(buf: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
    let start = *pos;
    let len = buf[start..]
        .windows(2)
        .position(|window| window == b"\r\n")?;

    *pos += len + 2;

    Some(&buf[start..start + len])
}

#[inline]
fn parse_int(line: &[u8]) -> Result<i64, Error> {
    let s = std::str::from_utf8(line).map_err(|err| Error::Parse(err.to_string()))?;
    Ok(s.parse::<i64>()?)
}

/// Encode one command as a RESP array of bulk strings.
fn encode(args: &[&str], buf: &mut BytesMut) {
    buf.put_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        buf.put_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.put_slice(arg.as_bytes());
        buf.put_slice(b"\r\n");
    }
}

/// Anything that can run a command against the server.
///
/// Error replies at the top level are surfaced as `Err`, so the returned
/// `Reply` only carries `Reply::Error` for nested errors, e.g. inside an
/// array returned by `EVAL`.
#[async_trait]
pub trait Executor: Send {
    async fn execute(&mut self, args: &[&str]) -> Result<Reply, Error>;
}

#[async_trait]
pub trait ExecutorExt: Executor {
    /// Execute the command and convert the reply to `T`
    async fn query<T>(&mut self, args: &[&str]) -> Result<T, Error>
    where
        T: FromReply + Send,
    {
        let reply = self.execute(args).await?;
        T::from_reply(reply)
    }
}

impl<E: Executor + ?Sized> ExecutorExt for E {}

#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    buf: BytesMut,
    timeout: Duration,

    // set once a reply is lost or unparsable, requests and replies can no
    // longer be paired
    broken: bool,
}

impl Connection {
    /// Connect to `addr`, which looks like `host:port`
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self, Error> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Timeout(timeout))??;
        stream.set_nodelay(true)?;

        Ok(Self {
            stream,
            buf: BytesMut::with_capacity(4 * 1024),
            timeout,
            broken: false,
        })
    }

    async fn roundtrip(&mut self, args: &[&str]) -> Result<Reply, Error> {
        let mut req = BytesMut::with_capacity(256);
        encode(args, &mut req);
        self.stream.write_all(&req).await?;

        loop {
            // replies are parsed from what is buffered so far, a partial
            // reply just waits for more data
            let mut pos = 0;
            if let Some(reply) = Reply::parse(&self.buf, &mut pos)? {
                self.buf.advance(pos);

                return match reply {
                    Reply::Error(err) => {
                        if err.starts_with("ERR unknown command") {
                            Err(Error::UnknownCommand(err))
                        } else {
                            Err(Error::Server(err))
                        }
                    }
                    reply => Ok(reply),
                };
            }

            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into()));
            }
        }
    }
}

#[async_trait]
impl Executor for Connection {
    async fn execute(&mut self, args: &[&str]) -> Result<Reply, Error> {
        if self.broken {
            return Err(Error::Desync);
        }

        let timeout = self.timeout;
        let result = tokio::time::timeout(timeout, self.roundtrip(args)).await;

        match result {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(err)) => {
                // server errors are complete replies, anything else leaves
                // the stream in an unknown state
                if !matches!(err, Error::Server(_) | Error::UnknownCommand(_)) {
                    self.broken = true;
                }
                Err(err)
            }
            Err(_) => {
                // the reply may still arrive later
                self.broken = true;
                Err(Error::Timeout(timeout))
            }
        }
    }
}

pub trait FromReply: Sized {
    fn from_reply(reply: Reply) -> Result<Self, Error>;
}

impl FromReply for Reply {
    fn from_reply(reply: Reply) -> Result<Self, Error> {
        Ok(reply)
    }
}

impl FromReply for () {
    fn from_reply(_: Reply) -> Result<(), Error> {
        Ok(())
    }
}

impl FromReply for i64 {
    fn from_reply(reply: Reply) -> Result<Self, Error> {
        reply.as_i64().ok_or(Error::UnexpectedReply("integer"))
    }
}

impl FromReply for f64 {
    fn from_reply(reply: Reply) -> Result<Self, Error> {
        reply.as_f64().ok_or(Error::UnexpectedReply("number"))
    }
}

impl FromReply for String {
    fn from_reply(reply: Reply) -> Result<Self, Error> {
        match reply {
            Reply::Text(b) => String::from_utf8(b.to_vec())
                .map_err(|_err| Error::Parse("invalid utf8 text".to_string())),
            _ => Err(Error::UnexpectedReply("text")),
        }
    }
}

impl FromReply for Bytes {
    fn from_reply(reply: Reply) -> Result<Self, Error> {
        match reply {
            Reply::Text(b) => Ok(b),
            _ => Err(Error::UnexpectedReply("text")),
        }
    }
}

impl<T: FromReply> FromReply for Option<T> {
    fn from_reply(reply: Reply) -> Result<Self, Error> {
        match reply {
            Reply::Nil => Ok(None),
            reply => T::from_reply(reply).map(Some),
        }
    }
}

impl<T: FromReply> FromReply for Vec<T> {
    fn from_reply(reply: Reply) -> Result<Self, Error> {
        match reply {
            Reply::List(list) => list.into_iter().map(T::from_reply).collect(),
            Reply::Nil => Ok(vec![]),
            _ => Err(Error::UnexpectedReply("array")),
        }
    }
}

impl FromReply for BTreeMap<String, String> {
    fn from_reply(reply: Reply) -> Result<Self, Error> {
        reply
            .into_pairs()?
            .into_iter()
            .map(|(key, value)| Ok((String::from_reply(key)?, String::from_reply(value)?)))
            .collect()
    }
}
