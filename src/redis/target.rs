use std::fmt;
use std::str::FromStr;

use percent_encoding::percent_decode_str;
use url::Url;

use super::Error;

const DEFAULT_PORT: u16 = 6379;

/// The server to scrape.
///
/// Accepts `redis://[user:password@]host[:port]`, `valkey://...` or a bare
/// `host:port`. Credentials embedded in the URL take precedence over the
/// configured ones.
#[derive(Clone, Debug, PartialEq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Target {
    /// `host:port`, IPv6 hosts are bracketed already
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "redis://{}:{}", self.host, self.port)
    }
}

fn decode(text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }

    Some(percent_decode_str(text).decode_utf8_lossy().into_owned())
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let url = if s.contains("://") {
            Url::parse(s)
        } else {
            Url::parse(&format!("redis://{s}"))
        }
        .map_err(|err| Error::Target(format!("{s:?} {err}")))?;

        match url.scheme() {
            "redis" | "valkey" => {}
            "rediss" | "valkeys" => {
                return Err(Error::Target(format!("{s:?} tls is not supported")));
            }
            scheme => {
                return Err(Error::Target(format!("{s:?} unknown scheme {scheme}")));
            }
        }

        let host = match url.host() {
            Some(url::Host::Ipv6(addr)) => format!("[{addr}]"),
            Some(host) => host.to_string(),
            None => return Err(Error::Target(format!("{s:?} host is missing"))),
        };

        Ok(Target {
            host,
            port: url.port().unwrap_or(DEFAULT_PORT),
            user: decode(url.username()),
            password: url.password().and_then(decode),
        })
    }
}
