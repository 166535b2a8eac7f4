#[macro_use]
extern crate tracing;

pub mod config;
pub mod encoding;
pub mod http;
pub mod redis;
pub mod trace;
