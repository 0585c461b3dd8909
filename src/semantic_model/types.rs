//! Enumerated types used throughout the semantic model

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Aggregation
// ============================================================================

/// Aggregation functions for measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationType {
    Sum,
    Min,
    Max,
    Count,
    CountDistinct,
    Average,
    Percentile,
    Median,
    /// Sum over a boolean expression. Normalized to `Sum` when the model is built.
    SumBoolean,
}

impl AggregationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationType::Sum => "sum",
            AggregationType::Min => "min",
            AggregationType::Max => "max",
            AggregationType::Count => "count",
            AggregationType::CountDistinct => "count_distinct",
            AggregationType::Average => "average",
            AggregationType::Percentile => "percentile",
            AggregationType::Median => "median",
            AggregationType::SumBoolean => "sum_boolean",
        }
    }

    /// Whether this aggregation can pick the row for a non-additive dimension window
    pub fn is_window_choice(&self) -> bool {
        matches!(self, AggregationType::Min | AggregationType::Max)
    }
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing an aggregation string
#[derive(Debug, Clone)]
pub struct ParseAggregationError {
    pub input: String,
}

impl fmt::Display for ParseAggregationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unknown aggregation '{}'. Valid options: sum, min, max, count, count_distinct, average, percentile, median, sum_boolean",
            self.input
        )
    }
}

impl std::error::Error for ParseAggregationError {}

impl FromStr for AggregationType {
    type Err = ParseAggregationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sum" => Ok(AggregationType::Sum),
            "min" | "minimum" => Ok(AggregationType::Min),
            "max" | "maximum" => Ok(AggregationType::Max),
            "count" => Ok(AggregationType::Count),
            "count_distinct" | "countdistinct" | "distinct_count" => Ok(AggregationType::CountDistinct),
            "average" | "avg" => Ok(AggregationType::Average),
            "percentile" => Ok(AggregationType::Percentile),
            "median" => Ok(AggregationType::Median),
            "sum_boolean" | "boolean" => Ok(AggregationType::SumBoolean),
            _ => Err(ParseAggregationError { input: s.to_string() }),
        }
    }
}

impl<'de> Deserialize<'de> for AggregationType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        AggregationType::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl Serialize for AggregationType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// Time granularity
// ============================================================================

/// Granularity of a time dimension, ordered from finest to coarsest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeGranularity {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl TimeGranularity {
    pub const ALL: [TimeGranularity; 5] = [
        TimeGranularity::Day,
        TimeGranularity::Week,
        TimeGranularity::Month,
        TimeGranularity::Quarter,
        TimeGranularity::Year,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeGranularity::Day => "day",
            TimeGranularity::Week => "week",
            TimeGranularity::Month => "month",
            TimeGranularity::Quarter => "quarter",
            TimeGranularity::Year => "year",
        }
    }

    /// This granularity and every coarser one
    pub fn with_coarser(self) -> impl Iterator<Item = TimeGranularity> {
        TimeGranularity::ALL.into_iter().filter(move |g| *g >= self)
    }

    /// Parse a granularity keyword, also accepting plural forms ("days")
    pub fn parse_keyword(s: &str) -> Option<TimeGranularity> {
        let lower = s.to_lowercase();
        let singular = lower.strip_suffix('s').unwrap_or(&lower);
        TimeGranularity::ALL.into_iter().find(|g| g.as_str() == singular)
    }
}

impl fmt::Display for TimeGranularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ParseGranularityError {
    pub input: String,
}

impl fmt::Display for ParseGranularityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown time granularity '{}'. Valid options: day, week, month, quarter, year", self.input)
    }
}

impl std::error::Error for ParseGranularityError {}

impl FromStr for TimeGranularity {
    type Err = ParseGranularityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeGranularity::parse_keyword(s).ok_or_else(|| ParseGranularityError { input: s.to_string() })
    }
}

impl<'de> Deserialize<'de> for TimeGranularity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        TimeGranularity::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl Serialize for TimeGranularity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// Identifier / dimension kinds
// ============================================================================

/// How an identifier relates rows of its data source to the entity it names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierType {
    /// One row per entity
    Primary,
    /// At most one row per entity, not every entity present
    Unique,
    /// Many rows per entity
    Foreign,
    /// Entity key of a slowly changing dimension; unique only within a validity window
    Natural,
}

impl IdentifierType {
    pub const ALL: [IdentifierType; 4] = [
        IdentifierType::Primary,
        IdentifierType::Unique,
        IdentifierType::Foreign,
        IdentifierType::Natural,
    ];

    /// Identifier types that "own" the dimensions of their data source
    pub fn links_local_dimensions(&self) -> bool {
        matches!(self, IdentifierType::Primary | IdentifierType::Unique | IdentifierType::Natural)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionType {
    Categorical,
    Time,
}

/// Metric computation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    MeasureProxy,
    Ratio,
    Expr,
    Cumulative,
    Derived,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aggregation() {
        assert_eq!("sum".parse::<AggregationType>().unwrap(), AggregationType::Sum);
        assert_eq!("SUM".parse::<AggregationType>().unwrap(), AggregationType::Sum);
        assert_eq!("avg".parse::<AggregationType>().unwrap(), AggregationType::Average);
        assert_eq!("count_distinct".parse::<AggregationType>().unwrap(), AggregationType::CountDistinct);
        assert_eq!("median".parse::<AggregationType>().unwrap(), AggregationType::Median);
        assert_eq!("sum_boolean".parse::<AggregationType>().unwrap(), AggregationType::SumBoolean);
        assert!("foo".parse::<AggregationType>().is_err());
    }

    #[test]
    fn test_granularity_ordering() {
        assert!(TimeGranularity::Day < TimeGranularity::Week);
        assert!(TimeGranularity::Quarter < TimeGranularity::Year);
        let coarser: Vec<_> = TimeGranularity::Month.with_coarser().collect();
        assert_eq!(
            coarser,
            vec![TimeGranularity::Month, TimeGranularity::Quarter, TimeGranularity::Year]
        );
    }

    #[test]
    fn test_parse_granularity_plural() {
        assert_eq!(TimeGranularity::parse_keyword("days"), Some(TimeGranularity::Day));
        assert_eq!(TimeGranularity::parse_keyword("MONTH"), Some(TimeGranularity::Month));
        assert_eq!(TimeGranularity::parse_keyword("fortnight"), None);
    }

    #[test]
    fn test_serde_roundtrip() {
        let json = serde_json::to_string(&TimeGranularity::Quarter).unwrap();
        assert_eq!(json, "\"quarter\"");
        let parsed: AggregationType = serde_json::from_str("\"count\"").unwrap();
        assert_eq!(parsed, AggregationType::Count);
        let id: IdentifierType = serde_json::from_str("\"natural\"").unwrap();
        assert_eq!(id, IdentifierType::Natural);
        let mt: MetricType = serde_json::from_str("\"measure_proxy\"").unwrap();
        assert_eq!(mt, MetricType::MeasureProxy);
    }
}
