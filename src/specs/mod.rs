//! Specs: hashable identities of the elements a query can ask for
//!
//! A spec names a measure, dimension, time dimension, identifier or metric together with the
//! identifier links traversed to reach it. Its qualified name joins links, element name and
//! granularity with `__`, and is also the default column name of its instances.

mod column;
mod name;
mod set;
mod where_filter;

pub use column::{ColumnAssociationResolver, DunderColumnAssociationResolver};
pub use name::StructuredLinkableSpecName;
pub use set::InstanceSpecSet;
pub use where_filter::WhereFilterSpec;

use std::fmt;

use crate::semantic_model::{TimeGranularity, DUNDER, METRIC_TIME};

fn qualify(links: &[String], element_name: &str, granularity: Option<TimeGranularity>) -> String {
    let mut parts: Vec<&str> = links.iter().map(String::as_str).collect();
    parts.push(element_name);
    if let Some(g) = granularity {
        parts.push(g.as_str());
    }
    parts.join(DUNDER)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeasureSpec {
    pub element_name: String,
}

impl MeasureSpec {
    pub fn new(element_name: impl Into<String>) -> Self {
        MeasureSpec { element_name: element_name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricSpec {
    pub element_name: String,
}

impl MetricSpec {
    pub fn new(element_name: impl Into<String>) -> Self {
        MetricSpec { element_name: element_name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DimensionSpec {
    pub element_name: String,
    pub identifier_links: Vec<String>,
}

impl DimensionSpec {
    pub fn new(element_name: impl Into<String>, identifier_links: Vec<String>) -> Self {
        DimensionSpec { element_name: element_name.into(), identifier_links }
    }

    pub fn qualified_name(&self) -> String {
        qualify(&self.identifier_links, &self.element_name, None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeDimensionSpec {
    pub element_name: String,
    pub identifier_links: Vec<String>,
    pub time_granularity: TimeGranularity,
}

impl TimeDimensionSpec {
    pub fn new(element_name: impl Into<String>, identifier_links: Vec<String>, time_granularity: TimeGranularity) -> Self {
        TimeDimensionSpec {
            element_name: element_name.into(),
            identifier_links,
            time_granularity,
        }
    }

    pub fn metric_time(time_granularity: TimeGranularity) -> Self {
        TimeDimensionSpec::new(METRIC_TIME, Vec::new(), time_granularity)
    }

    pub fn is_metric_time(&self) -> bool {
        self.element_name == METRIC_TIME && self.identifier_links.is_empty()
    }

    pub fn qualified_name(&self) -> String {
        qualify(&self.identifier_links, &self.element_name, Some(self.time_granularity))
    }

    pub fn with_granularity(&self, time_granularity: TimeGranularity) -> Self {
        TimeDimensionSpec { time_granularity, ..self.clone() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentifierSpec {
    pub element_name: String,
    pub identifier_links: Vec<String>,
}

impl IdentifierSpec {
    pub fn new(element_name: impl Into<String>, identifier_links: Vec<String>) -> Self {
        IdentifierSpec { element_name: element_name.into(), identifier_links }
    }

    pub fn qualified_name(&self) -> String {
        qualify(&self.identifier_links, &self.element_name, None)
    }
}

/// A spec that can be used to group or filter a query
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LinkableSpec {
    Dimension(DimensionSpec),
    TimeDimension(TimeDimensionSpec),
    Identifier(IdentifierSpec),
}

impl LinkableSpec {
    pub fn element_name(&self) -> &str {
        match self {
            LinkableSpec::Dimension(s) => &s.element_name,
            LinkableSpec::TimeDimension(s) => &s.element_name,
            LinkableSpec::Identifier(s) => &s.element_name,
        }
    }

    pub fn identifier_links(&self) -> &[String] {
        match self {
            LinkableSpec::Dimension(s) => &s.identifier_links,
            LinkableSpec::TimeDimension(s) => &s.identifier_links,
            LinkableSpec::Identifier(s) => &s.identifier_links,
        }
    }

    pub fn qualified_name(&self) -> String {
        match self {
            LinkableSpec::Dimension(s) => s.qualified_name(),
            LinkableSpec::TimeDimension(s) => s.qualified_name(),
            LinkableSpec::Identifier(s) => s.qualified_name(),
        }
    }

    fn with_links(&self, identifier_links: Vec<String>) -> LinkableSpec {
        match self {
            LinkableSpec::Dimension(s) => LinkableSpec::Dimension(DimensionSpec {
                identifier_links,
                ..s.clone()
            }),
            LinkableSpec::TimeDimension(s) => LinkableSpec::TimeDimension(TimeDimensionSpec {
                identifier_links,
                ..s.clone()
            }),
            LinkableSpec::Identifier(s) => LinkableSpec::Identifier(IdentifierSpec {
                identifier_links,
                ..s.clone()
            }),
        }
    }

    /// The same spec as seen from the data source one join further away
    pub fn without_first_link(&self) -> Option<LinkableSpec> {
        self.without_leading_links(1)
    }

    /// The same spec as seen `count` joins further away
    pub fn without_leading_links(&self, count: usize) -> Option<LinkableSpec> {
        let links = self.identifier_links();
        if count == 0 || links.len() < count {
            return None;
        }
        Some(self.with_links(links[count..].to_vec()))
    }

    /// The same spec as seen across a join on `link`
    pub fn with_prefix_link(&self, link: &str) -> LinkableSpec {
        let mut links = Vec::with_capacity(self.identifier_links().len() + 1);
        links.push(link.to_string());
        links.extend(self.identifier_links().iter().cloned());
        self.with_links(links)
    }

    pub fn is_metric_time(&self) -> bool {
        matches!(self, LinkableSpec::TimeDimension(s) if s.is_metric_time())
    }
}

impl fmt::Display for LinkableSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

impl From<DimensionSpec> for LinkableSpec {
    fn from(spec: DimensionSpec) -> Self {
        LinkableSpec::Dimension(spec)
    }
}

impl From<TimeDimensionSpec> for LinkableSpec {
    fn from(spec: TimeDimensionSpec) -> Self {
        LinkableSpec::TimeDimension(spec)
    }
}

impl From<IdentifierSpec> for LinkableSpec {
    fn from(spec: IdentifierSpec) -> Self {
        LinkableSpec::Identifier(spec)
    }
}

/// Any spec an instance can carry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstanceSpec {
    Measure(MeasureSpec),
    Metric(MetricSpec),
    Linkable(LinkableSpec),
}

impl InstanceSpec {
    pub fn qualified_name(&self) -> String {
        match self {
            InstanceSpec::Measure(s) => s.element_name.clone(),
            InstanceSpec::Metric(s) => s.element_name.clone(),
            InstanceSpec::Linkable(s) => s.qualified_name(),
        }
    }
}

/// A requested ordering: a metric or linkable spec, ascending or descending
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderBySpec {
    pub item: OrderByItem,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderByItem {
    Metric(MetricSpec),
    Linkable(LinkableSpec),
}

impl OrderBySpec {
    pub fn qualified_name(&self) -> String {
        match &self.item {
            OrderByItem::Metric(m) => m.element_name.clone(),
            OrderByItem::Linkable(l) => l.qualified_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_names() {
        let dim = DimensionSpec::new("country_latest", vec!["listing".into()]);
        assert_eq!(dim.qualified_name(), "listing__country_latest");

        let td = TimeDimensionSpec::metric_time(TimeGranularity::Month);
        assert_eq!(td.qualified_name(), "metric_time__month");
        assert!(td.is_metric_time());

        let id = IdentifierSpec::new("user", vec!["listing".into()]);
        assert_eq!(id.qualified_name(), "listing__user");
    }

    #[test]
    fn test_link_manipulation() {
        let spec: LinkableSpec =
            DimensionSpec::new("customer_name", vec!["account_id".into(), "customer_id".into()]).into();
        let stripped = spec.without_first_link().unwrap();
        assert_eq!(stripped.qualified_name(), "customer_id__customer_name");
        assert_eq!(stripped.with_prefix_link("account_id"), spec);

        let local: LinkableSpec = DimensionSpec::new("is_instant", vec![]).into();
        assert!(local.without_first_link().is_none());

        assert_eq!(spec.without_leading_links(2).unwrap().qualified_name(), "customer_name");
        assert!(spec.without_leading_links(3).is_none());
    }

    #[test]
    fn test_linked_time_dimension_is_not_metric_time() {
        let td = TimeDimensionSpec::new(METRIC_TIME, vec!["listing".into()], TimeGranularity::Day);
        assert!(!td.is_metric_time());
        assert_eq!(td.qualified_name(), "listing__metric_time__day");
    }
}
