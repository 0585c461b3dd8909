//! Data source: one table or query of the warehouse plus the elements it defines

use serde::{Deserialize, Serialize};

use super::dimension::{Dimension, Identifier};
use super::measure::Measure;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataSource {
    pub name: String,
    pub description: Option<String>,
    /// Fully qualified table name, e.g. "warehouse.fct_bookings"
    #[serde(default)]
    pub sql_table: Option<String>,
    /// Alternatively, a SELECT the source is read from
    #[serde(default)]
    pub sql_query: Option<String>,
    #[serde(default)]
    pub identifiers: Vec<Identifier>,
    #[serde(default)]
    pub measures: Vec<Measure>,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
}

/// Start and end dimensions of an SCD type 2 source
#[derive(Debug, Clone, Copy)]
pub struct ValidityWindow<'a> {
    pub start: &'a Dimension,
    pub end: &'a Dimension,
}

impl DataSource {
    pub fn get_measure(&self, name: &str) -> Option<&Measure> {
        self.measures.iter().find(|m| m.name == name)
    }

    pub fn get_dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn get_identifier(&self, name: &str) -> Option<&Identifier> {
        self.identifiers.iter().find(|i| i.name == name)
    }

    pub fn time_dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.iter().filter(|d| d.is_time())
    }

    pub fn primary_time_dimension(&self) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.is_primary_time())
    }

    pub fn partition_dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.iter().filter(|d| d.is_partition)
    }

    /// Time dimension a measure is aggregated over
    pub fn agg_time_dimension(&self, measure: &Measure) -> Option<&Dimension> {
        match &measure.agg_time_dimension {
            Some(name) => self.get_dimension(name).filter(|d| d.is_time()),
            None => self.primary_time_dimension(),
        }
    }

    pub fn validity_window(&self) -> Option<ValidityWindow<'_>> {
        let start = self.dimensions.iter().find(|d| d.is_validity_start())?;
        let end = self.dimensions.iter().find(|d| d.is_validity_end())?;
        Some(ValidityWindow { start, end })
    }

    pub fn has_validity_window(&self) -> bool {
        self.validity_window().is_some()
    }

    /// The FROM target: the table name, or the query wrapped as a derived table
    pub fn from_source(&self) -> Option<DataSourceOrigin<'_>> {
        match (&self.sql_table, &self.sql_query) {
            (Some(table), _) => Some(DataSourceOrigin::Table(table)),
            (None, Some(query)) => Some(DataSourceOrigin::Query(query)),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSourceOrigin<'a> {
    Table(&'a str),
    Query(&'a str),
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTINGS_SCD: &str = r#"
name: listings_scd
sql_table: dim_listings_history
identifiers:
  - name: listing
    type: natural
    expr: listing_id
dimensions:
  - name: window_start
    type: time
    type_params:
      time_granularity: day
      validity_params:
        is_start: true
  - name: window_end
    type: time
    type_params:
      time_granularity: day
      validity_params:
        is_end: true
  - name: capacity
    type: categorical
"#;

    #[test]
    fn test_validity_window() {
        let ds: DataSource = serde_yaml::from_str(LISTINGS_SCD).unwrap();
        let window = ds.validity_window().unwrap();
        assert_eq!(window.start.name, "window_start");
        assert_eq!(window.end.name, "window_end");
        assert!(ds.primary_time_dimension().is_none());
        assert_eq!(ds.from_source(), Some(DataSourceOrigin::Table("dim_listings_history")));
    }

    #[test]
    fn test_agg_time_dimension_override() {
        let ds: DataSource = serde_yaml::from_str(
            r#"
name: bookings
sql_query: SELECT * FROM raw_bookings
measures:
  - name: bookings
    agg: sum
  - name: paid
    agg: sum
    agg_time_dimension: paid_at
dimensions:
  - name: ds
    type: time
    type_params:
      time_granularity: day
      is_primary: true
  - name: paid_at
    type: time
    type_params:
      time_granularity: day
"#,
        )
        .unwrap();
        let bookings = ds.get_measure("bookings").unwrap();
        let paid = ds.get_measure("paid").unwrap();
        assert_eq!(ds.agg_time_dimension(bookings).unwrap().name, "ds");
        assert_eq!(ds.agg_time_dimension(paid).unwrap().name, "paid_at");
        assert!(!ds.has_validity_window());
        assert_eq!(ds.from_source(), Some(DataSourceOrigin::Query("SELECT * FROM raw_bookings")));
    }
}
