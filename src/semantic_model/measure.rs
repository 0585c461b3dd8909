//! Measure types

use serde::{Deserialize, Serialize};
use super::types::AggregationType;

/// A measure definition with aggregation
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Measure {
    pub name: String,
    /// Aggregation function applied when the measure is rolled up
    pub agg: AggregationType,
    /// SQL expression over the data source; defaults to the measure name
    #[serde(default)]
    pub expr: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub agg_params: Option<MeasureAggregationParameters>,
    #[serde(default)]
    pub non_additive_dimension: Option<NonAdditiveDimension>,
    /// Time dimension used as `metric_time`; defaults to the source's primary time dimension
    #[serde(default)]
    pub agg_time_dimension: Option<String>,
}

impl Measure {
    /// The SQL expression read from the data source
    pub fn expr(&self) -> &str {
        self.expr.as_deref().unwrap_or(&self.name)
    }

    /// Percentile argument, for percentile aggregations
    pub fn percentile(&self) -> Option<f64> {
        self.agg_params.as_ref().and_then(|p| p.percentile)
    }

    pub fn use_discrete_percentile(&self) -> bool {
        self.agg_params
            .as_ref()
            .map(|p| p.use_discrete_percentile)
            .unwrap_or(false)
    }

    /// Rewrite SUM_BOOLEAN and MEDIAN into the primitive aggregations they stand for
    pub(crate) fn normalized(mut self) -> Measure {
        match self.agg {
            AggregationType::SumBoolean => {
                self.expr = Some(format!("CASE WHEN {} THEN 1 ELSE 0 END", self.expr()));
                self.agg = AggregationType::Sum;
            }
            AggregationType::Median => {
                self.agg = AggregationType::Percentile;
                self.agg_params = Some(MeasureAggregationParameters {
                    percentile: Some(0.5),
                    use_discrete_percentile: false,
                });
            }
            _ => {}
        }
        self
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MeasureAggregationParameters {
    pub percentile: Option<f64>,
    #[serde(default)]
    pub use_discrete_percentile: bool,
}

/// Semi-additive constraint: the measure only adds up across one row per window
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NonAdditiveDimension {
    /// Time dimension the measure is non-additive over
    pub name: String,
    /// MIN or MAX: which end of the window is kept
    pub window_choice: AggregationType,
    /// Identifiers the window is partitioned by
    #[serde(default)]
    pub window_groupings: Vec<String>,
}
