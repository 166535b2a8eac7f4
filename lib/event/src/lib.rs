mod macros;
mod metric;
pub mod tags;

pub use metric::*;
