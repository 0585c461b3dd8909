//! Query request types and their resolution into specs

mod error;
mod parse;
mod request;
mod time;

pub use error::QueryError;
pub use parse::{QueryParser, QuerySpec};
pub use request::QueryRequest;
pub use time::{format_time, parse_time, TimeRangeConstraint};
