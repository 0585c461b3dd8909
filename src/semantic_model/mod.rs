//! Semantic model types (nouns)
//!
//! Data sources with their measures, dimensions and identifiers, plus metrics.
//! A `SemanticModel` is built once from a `SemanticManifest` and is read-only afterwards.

mod data_source;
mod dimension;
mod error;
mod measure;
mod metric;
mod model;
mod types;

pub use data_source::{DataSource, DataSourceOrigin, ValidityWindow};
pub use dimension::{Dimension, Identifier, TimeDimensionParams, ValidityParams};
pub use error::ModelError;
pub use measure::{Measure, MeasureAggregationParameters, NonAdditiveDimension};
pub use metric::{CumulativeWindow, Metric, MetricInput, MetricTimeWindow, MetricTypeParams};
pub use model::{SemanticManifest, SemanticModel, DUNDER, METRIC_TIME};
pub use types::{AggregationType, DimensionType, IdentifierType, MetricType, TimeGranularity};
