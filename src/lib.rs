//! semquel - Compile metric queries over a semantic model into warehouse SQL
//!
//! This library provides:
//! - Semantic model types (data sources, measures, dimensions, identifiers, metrics)
//! - Model parsing from YAML
//! - Query parsing and validation
//! - Join resolution over the identifier graph
//! - Dataflow plan building with cost-based join selection
//! - SQL lowering, optimization and rendering
//! - Execution plans run against a `SqlClient`
//!
//! # Architecture
//!
//! **Noun modules** (data structures):
//! - `semantic_model/` - domain concepts (SemanticModel, DataSource, Measure, Metric)
//! - `specs/` - resolved element references (LinkableSpec, MeasureSpec, MetricSpec)
//! - `instances/` - specs bound to columns of a data set
//! - `query/` - query request types and their resolution (QueryRequest, QuerySpec)
//! - `dataflow/` - dataflow plan types (DataflowNode, DataflowPlan)
//! - `sql/` - SQL plan types (SqlExpr, SqlSelectStatement)
//!
//! **Verb modules** (transformations):
//! - `parser/` - YAML → SemanticModel
//! - `resolver/` - SemanticModel → join paths and join recipes
//! - `planner/` - QuerySpec → DataflowPlan
//! - `emitter/` - DataflowPlan → SQL plan → SQL text
//! - `optimizer/` - SQL plan → SQL plan
//! - `execution/` - SQL text → rows
//!
//! # Example
//!
//! ```ignore
//! use semquel::{parser, CompilerConfig, Engine, QueryRequest};
//!
//! let model = parser::load_model_file("model.yaml")?;
//! let engine = Engine::new(model, CompilerConfig::default());
//! let request = QueryRequest::new(["bookings"], ["metric_time__day", "listing__country_latest"]);
//! let explained = engine.explain(&request)?;
//! println!("{}", explained.sql);
//! ```

pub mod config;
pub mod dataflow;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod execution;
pub mod ids;
pub mod instances;
pub mod optimizer;
pub mod parser;
pub mod planner;
pub mod query;
pub mod resolver;
pub mod semantic_model;
pub mod specs;
pub mod sql;

// Re-export commonly used types
pub use config::{CompilerConfig, TimeSpineSource};
pub use dataflow::{DataflowNode, DataflowPlan};
pub use emitter::{render_sql, EmitError};
pub use engine::{Engine, ExplainResult, QueryOutput, QueryResult};
pub use error::{Error, Result};
pub use execution::{ExecutionError, ExecutionPlan, RowSet, SqlClient, SqlClientError};
pub use optimizer::OptimizationLevel;
pub use parser::ParseError;
pub use planner::{DataflowPlanBuilder, PlanError};
pub use query::{QueryError, QueryParser, QueryRequest, QuerySpec};
pub use semantic_model::{ModelError, SemanticModel};
