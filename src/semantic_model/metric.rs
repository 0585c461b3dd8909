//! Metric types

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use super::types::{MetricType, TimeGranularity};

/// A metric: what a query asks for by name
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Metric {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    #[serde(default)]
    pub type_params: MetricTypeParams,
    /// SQL filter applied to the metric's inputs, written over linkable names
    #[serde(default)]
    pub constraint: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetricTypeParams {
    #[serde(default)]
    pub measure: Option<String>,
    #[serde(default)]
    pub measures: Vec<String>,
    #[serde(default)]
    pub numerator: Option<String>,
    #[serde(default)]
    pub denominator: Option<String>,
    /// Expression over measure names (expr) or metric names (derived)
    #[serde(default)]
    pub expr: Option<String>,
    /// Trailing window for cumulative metrics, e.g. "7 days"
    #[serde(default)]
    pub window: Option<MetricTimeWindow>,
    /// Grain-to-date accumulation for cumulative metrics
    #[serde(default)]
    pub grain_to_date: Option<TimeGranularity>,
    #[serde(default)]
    pub metrics: Vec<MetricInput>,
}

/// How a cumulative metric accumulates its measure over time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CumulativeWindow {
    /// Rows in `(t - window, t]`
    Trailing(MetricTimeWindow),
    /// Rows from the start of `t`'s period up to `t`
    GrainToDate(TimeGranularity),
    /// Every row up to `t`
    AllTime,
}

impl Metric {
    /// Names of the measures this metric reads directly, in declaration order
    pub fn input_measures(&self) -> Vec<&str> {
        let p = &self.type_params;
        match self.metric_type {
            MetricType::MeasureProxy | MetricType::Cumulative => p
                .measure
                .as_deref()
                .into_iter()
                .chain(p.measures.iter().map(String::as_str))
                .take(1)
                .collect(),
            MetricType::Ratio => p
                .numerator
                .as_deref()
                .into_iter()
                .chain(p.denominator.as_deref())
                .collect(),
            MetricType::Expr => p
                .measure
                .as_deref()
                .into_iter()
                .chain(p.measures.iter().map(String::as_str))
                .collect(),
            MetricType::Derived => Vec::new(),
        }
    }

    /// Input metrics of a derived metric
    pub fn input_metrics(&self) -> &[MetricInput] {
        match self.metric_type {
            MetricType::Derived => &self.type_params.metrics,
            _ => &[],
        }
    }

    pub fn cumulative_window(&self) -> Option<CumulativeWindow> {
        if self.metric_type != MetricType::Cumulative {
            return None;
        }
        let p = &self.type_params;
        Some(match (p.window, p.grain_to_date) {
            (Some(window), _) => CumulativeWindow::Trailing(window),
            (None, Some(grain)) => CumulativeWindow::GrainToDate(grain),
            (None, None) => CumulativeWindow::AllTime,
        })
    }
}

/// A metric referenced by a derived metric, optionally renamed inside its expression
#[derive(Debug, Clone, Serialize)]
pub struct MetricInput {
    pub name: String,
    pub alias: Option<String>,
}

impl MetricInput {
    /// Name the input goes by inside the derived expression
    pub fn expr_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MetricInputDef {
    Name(String),
    Full { name: String, alias: Option<String> },
}

impl<'de> Deserialize<'de> for MetricInput {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match MetricInputDef::deserialize(deserializer)? {
            MetricInputDef::Name(name) => MetricInput { name, alias: None },
            MetricInputDef::Full { name, alias } => MetricInput { name, alias },
        })
    }
}

/// A count of granularity periods, written as "7 days" or "1 month"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricTimeWindow {
    pub count: u32,
    pub granularity: TimeGranularity,
}

impl fmt::Display for MetricTimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.count, self.granularity)
    }
}

#[derive(Debug, Clone)]
pub struct ParseWindowError {
    pub input: String,
}

impl fmt::Display for ParseWindowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid window '{}'. Expected '<count> <granularity>', e.g. '7 days'", self.input)
    }
}

impl std::error::Error for ParseWindowError {}

impl FromStr for MetricTimeWindow {
    type Err = ParseWindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseWindowError { input: s.to_string() };
        let mut parts = s.split_whitespace();
        let count = parts.next().and_then(|c| c.parse::<u32>().ok()).ok_or_else(err)?;
        let granularity = parts.next().and_then(TimeGranularity::parse_keyword).ok_or_else(err)?;
        if parts.next().is_some() || count == 0 {
            return Err(err());
        }
        Ok(MetricTimeWindow { count, granularity })
    }
}

impl<'de> Deserialize<'de> for MetricTimeWindow {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        MetricTimeWindow::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl Serialize for MetricTimeWindow {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_window() {
        let w: MetricTimeWindow = "7 days".parse().unwrap();
        assert_eq!(w.count, 7);
        assert_eq!(w.granularity, TimeGranularity::Day);
        assert_eq!(w.to_string(), "7 day");
        assert!("0 days".parse::<MetricTimeWindow>().is_err());
        assert!("days".parse::<MetricTimeWindow>().is_err());
        assert!("3 fortnights".parse::<MetricTimeWindow>().is_err());
    }

    #[test]
    fn test_ratio_inputs() {
        let m: Metric = serde_yaml::from_str(
            "name: bookings_per_view\ntype: ratio\ntype_params:\n  numerator: bookings\n  denominator: views\n",
        )
        .unwrap();
        assert_eq!(m.input_measures(), vec!["bookings", "views"]);
        assert!(m.cumulative_window().is_none());
    }

    #[test]
    fn test_cumulative_window_kinds() {
        let trailing: Metric = serde_yaml::from_str(
            "name: t\ntype: cumulative\ntype_params:\n  measure: bookings\n  window: 7 days\n",
        )
        .unwrap();
        assert!(matches!(trailing.cumulative_window(), Some(CumulativeWindow::Trailing(w)) if w.count == 7));

        let gtd: Metric = serde_yaml::from_str(
            "name: g\ntype: cumulative\ntype_params:\n  measure: bookings\n  grain_to_date: month\n",
        )
        .unwrap();
        assert_eq!(gtd.cumulative_window(), Some(CumulativeWindow::GrainToDate(TimeGranularity::Month)));

        let all: Metric = serde_yaml::from_str("name: a\ntype: cumulative\ntype_params:\n  measure: bookings\n").unwrap();
        assert_eq!(all.cumulative_window(), Some(CumulativeWindow::AllTime));
    }

    #[test]
    fn test_derived_inputs_accept_shorthand() {
        let m: Metric = serde_yaml::from_str(
            "name: d\ntype: derived\ntype_params:\n  expr: a - b\n  metrics:\n    - bookings\n    - name: views\n      alias: v\n",
        )
        .unwrap();
        let inputs = m.input_metrics();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].expr_name(), "bookings");
        assert_eq!(inputs[1].expr_name(), "v");
        assert!(m.input_measures().is_empty());
    }
}
