//! SQL emitter (verb module)
//!
//! - `convert`: dataflow plan → SQL query plan
//! - `render`: SQL query plan → SQL text with bind parameters

mod convert;
mod error;
mod render;

pub use convert::{DataflowToSqlQueryPlanConverter, SqlDataSet, SqlQueryPlan};
pub use error::EmitError;
pub use render::{render_sql, SqlPlanRenderResult};
