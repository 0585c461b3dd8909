//! Ordered, de-duplicated collections of specs

use super::{DimensionSpec, IdentifierSpec, LinkableSpec, MeasureSpec, MetricSpec, TimeDimensionSpec};

/// Specs grouped by kind. Each list keeps first-insertion order and holds no duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceSpecSet {
    pub measures: Vec<MeasureSpec>,
    pub dimensions: Vec<DimensionSpec>,
    pub time_dimensions: Vec<TimeDimensionSpec>,
    pub identifiers: Vec<IdentifierSpec>,
    pub metrics: Vec<MetricSpec>,
}

fn push_unique<T: PartialEq>(list: &mut Vec<T>, item: T) {
    if !list.contains(&item) {
        list.push(item);
    }
}

impl InstanceSpecSet {
    pub fn from_linkable<'a>(specs: impl IntoIterator<Item = &'a LinkableSpec>) -> Self {
        let mut set = InstanceSpecSet::default();
        for spec in specs {
            set.add_linkable(spec.clone());
        }
        set
    }

    pub fn add_linkable(&mut self, spec: LinkableSpec) {
        match spec {
            LinkableSpec::Dimension(s) => push_unique(&mut self.dimensions, s),
            LinkableSpec::TimeDimension(s) => push_unique(&mut self.time_dimensions, s),
            LinkableSpec::Identifier(s) => push_unique(&mut self.identifiers, s),
        }
    }

    pub fn add_measure(&mut self, spec: MeasureSpec) {
        push_unique(&mut self.measures, spec);
    }

    pub fn add_metric(&mut self, spec: MetricSpec) {
        push_unique(&mut self.metrics, spec);
    }

    /// Union, keeping the order of `self` then the new items of `other`
    pub fn merge(mut self, other: &InstanceSpecSet) -> InstanceSpecSet {
        for s in &other.measures {
            push_unique(&mut self.measures, s.clone());
        }
        for s in &other.dimensions {
            push_unique(&mut self.dimensions, s.clone());
        }
        for s in &other.time_dimensions {
            push_unique(&mut self.time_dimensions, s.clone());
        }
        for s in &other.identifiers {
            push_unique(&mut self.identifiers, s.clone());
        }
        for s in &other.metrics {
            push_unique(&mut self.metrics, s.clone());
        }
        self
    }

    /// Dimensions, time dimensions and identifiers, in that order
    pub fn linkable_specs(&self) -> Vec<LinkableSpec> {
        self.dimensions
            .iter()
            .cloned()
            .map(LinkableSpec::Dimension)
            .chain(self.time_dimensions.iter().cloned().map(LinkableSpec::TimeDimension))
            .chain(self.identifiers.iter().cloned().map(LinkableSpec::Identifier))
            .collect()
    }

    pub fn contains_linkable(&self, spec: &LinkableSpec) -> bool {
        match spec {
            LinkableSpec::Dimension(s) => self.dimensions.contains(s),
            LinkableSpec::TimeDimension(s) => self.time_dimensions.contains(s),
            LinkableSpec::Identifier(s) => self.identifiers.contains(s),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.measures.is_empty()
            && self.dimensions.is_empty()
            && self.time_dimensions.is_empty()
            && self.identifiers.is_empty()
            && self.metrics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic_model::TimeGranularity;

    #[test]
    fn test_merge_dedupes_and_keeps_order() {
        let mut a = InstanceSpecSet::default();
        a.add_measure(MeasureSpec::new("bookings"));
        a.add_linkable(DimensionSpec::new("is_instant", vec![]).into());

        let mut b = InstanceSpecSet::default();
        b.add_measure(MeasureSpec::new("views"));
        b.add_measure(MeasureSpec::new("bookings"));
        b.add_linkable(TimeDimensionSpec::metric_time(TimeGranularity::Day).into());

        let merged = a.merge(&b);
        assert_eq!(
            merged.measures,
            vec![MeasureSpec::new("bookings"), MeasureSpec::new("views")]
        );
        assert_eq!(merged.linkable_specs().len(), 2);
    }

    #[test]
    fn test_contains_linkable() {
        let spec: LinkableSpec = IdentifierSpec::new("listing", vec![]).into();
        let set = InstanceSpecSet::from_linkable([&spec]);
        assert!(set.contains_linkable(&spec));
        assert!(!set.contains_linkable(&IdentifierSpec::new("user", vec![]).into()));
        assert!(!set.is_empty());
    }
}
