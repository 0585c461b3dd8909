//! Instances: specs bound to the columns of a data set

use crate::specs::{
    ColumnAssociationResolver, DimensionSpec, IdentifierSpec, InstanceSpec, InstanceSpecSet, LinkableSpec,
    MeasureSpec, MetricSpec, TimeDimensionSpec,
};

/// Where an instance originally came from in the semantic model
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementReference {
    pub data_source: String,
    pub element_name: String,
}

/// Whether a measure column holds raw rows or aggregated values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationState {
    NonAggregated,
    Complete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instance<S> {
    pub spec: S,
    pub column_name: String,
    pub defined_from: Vec<ElementReference>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasureInstance {
    pub spec: MeasureSpec,
    pub column_name: String,
    pub defined_from: Vec<ElementReference>,
    pub aggregation_state: AggregationState,
}

pub type DimensionInstance = Instance<DimensionSpec>;
pub type TimeDimensionInstance = Instance<TimeDimensionSpec>;
pub type IdentifierInstance = Instance<IdentifierSpec>;
pub type MetricInstance = Instance<MetricSpec>;

/// The columns of a data set, keyed by spec. No spec appears twice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceSet {
    pub measures: Vec<MeasureInstance>,
    pub dimensions: Vec<DimensionInstance>,
    pub time_dimensions: Vec<TimeDimensionInstance>,
    pub identifiers: Vec<IdentifierInstance>,
    pub metrics: Vec<MetricInstance>,
}

fn push_new<S: PartialEq + Clone>(list: &mut Vec<Instance<S>>, items: &[Instance<S>]) {
    for item in items {
        if !list.iter().any(|i| i.spec == item.spec) {
            list.push(item.clone());
        }
    }
}

impl InstanceSet {
    pub fn spec_set(&self) -> InstanceSpecSet {
        InstanceSpecSet {
            measures: self.measures.iter().map(|i| i.spec.clone()).collect(),
            dimensions: self.dimensions.iter().map(|i| i.spec.clone()).collect(),
            time_dimensions: self.time_dimensions.iter().map(|i| i.spec.clone()).collect(),
            identifiers: self.identifiers.iter().map(|i| i.spec.clone()).collect(),
            metrics: self.metrics.iter().map(|i| i.spec.clone()).collect(),
        }
    }

    /// Every column name, in output order: measures, dimensions, time dimensions,
    /// identifiers, metrics
    pub fn column_names(&self) -> Vec<&str> {
        self.measures
            .iter()
            .map(|i| i.column_name.as_str())
            .chain(self.dimensions.iter().map(|i| i.column_name.as_str()))
            .chain(self.time_dimensions.iter().map(|i| i.column_name.as_str()))
            .chain(self.identifiers.iter().map(|i| i.column_name.as_str()))
            .chain(self.metrics.iter().map(|i| i.column_name.as_str()))
            .collect()
    }

    /// Columns of the linkable instances, in output order
    pub fn linkable_column_names(&self) -> Vec<&str> {
        self.dimensions
            .iter()
            .map(|i| i.column_name.as_str())
            .chain(self.time_dimensions.iter().map(|i| i.column_name.as_str()))
            .chain(self.identifiers.iter().map(|i| i.column_name.as_str()))
            .collect()
    }

    pub fn column_for_linkable(&self, spec: &LinkableSpec) -> Option<&str> {
        match spec {
            LinkableSpec::Dimension(s) => self.dimensions.iter().find(|i| &i.spec == s).map(|i| i.column_name.as_str()),
            LinkableSpec::TimeDimension(s) => self
                .time_dimensions
                .iter()
                .find(|i| &i.spec == s)
                .map(|i| i.column_name.as_str()),
            LinkableSpec::Identifier(s) => self.identifiers.iter().find(|i| &i.spec == s).map(|i| i.column_name.as_str()),
        }
    }

    pub fn column_for_measure(&self, spec: &MeasureSpec) -> Option<&str> {
        self.measures.iter().find(|i| &i.spec == spec).map(|i| i.column_name.as_str())
    }

    pub fn column_for_metric(&self, spec: &MetricSpec) -> Option<&str> {
        self.metrics.iter().find(|i| &i.spec == spec).map(|i| i.column_name.as_str())
    }

    /// Union keeping the first instance seen for each spec
    pub fn merge(sets: &[InstanceSet]) -> InstanceSet {
        let mut out = InstanceSet::default();
        for set in sets {
            for m in &set.measures {
                if !out.measures.iter().any(|i| i.spec == m.spec) {
                    out.measures.push(m.clone());
                }
            }
            push_new(&mut out.dimensions, &set.dimensions);
            push_new(&mut out.time_dimensions, &set.time_dimensions);
            push_new(&mut out.identifiers, &set.identifiers);
            push_new(&mut out.metrics, &set.metrics);
        }
        out
    }

    /// Keep only the instances whose spec is in `specs`, in this set's order
    pub fn filter(&self, specs: &InstanceSpecSet) -> InstanceSet {
        InstanceSet {
            measures: self.measures.iter().filter(|i| specs.measures.contains(&i.spec)).cloned().collect(),
            dimensions: self.dimensions.iter().filter(|i| specs.dimensions.contains(&i.spec)).cloned().collect(),
            time_dimensions: self
                .time_dimensions
                .iter()
                .filter(|i| specs.time_dimensions.contains(&i.spec))
                .cloned()
                .collect(),
            identifiers: self.identifiers.iter().filter(|i| specs.identifiers.contains(&i.spec)).cloned().collect(),
            metrics: self.metrics.iter().filter(|i| specs.metrics.contains(&i.spec)).cloned().collect(),
        }
    }

    /// Linkable instances only; measures and metrics dropped
    pub fn linkable_only(&self) -> InstanceSet {
        InstanceSet {
            dimensions: self.dimensions.clone(),
            time_dimensions: self.time_dimensions.clone(),
            identifiers: self.identifiers.clone(),
            ..InstanceSet::default()
        }
    }

    /// The instances as seen across a join on `link`: measures and metrics are dropped,
    /// every linkable spec gains `link` as its first identifier link. The join identifier
    /// itself would become `link__link` and is dropped.
    ///
    /// Returns the transformed set paired with the source column of each instance.
    pub fn with_prefix_link(
        &self,
        link: &str,
        resolver: &dyn ColumnAssociationResolver,
    ) -> (InstanceSet, Vec<(String, String)>) {
        self.with_prefix_links(&[link.to_string()], resolver)
    }

    /// Like `with_prefix_link`, for a join reached through a chain of links. The last link
    /// is the join identifier.
    pub fn with_prefix_links(
        &self,
        links: &[String],
        resolver: &dyn ColumnAssociationResolver,
    ) -> (InstanceSet, Vec<(String, String)>) {
        let link = links.last().map(String::as_str).unwrap_or_default();
        let mut out = InstanceSet::default();
        let mut columns = Vec::new();

        for i in &self.dimensions {
            let spec = DimensionSpec {
                identifier_links: prefixed(links, &i.spec.identifier_links),
                ..i.spec.clone()
            };
            let column_name = resolver.column_name(&InstanceSpec::Linkable(spec.clone().into()));
            columns.push((i.column_name.clone(), column_name.clone()));
            out.dimensions.push(Instance { spec, column_name, defined_from: i.defined_from.clone() });
        }
        for i in &self.time_dimensions {
            let spec = TimeDimensionSpec {
                identifier_links: prefixed(links, &i.spec.identifier_links),
                ..i.spec.clone()
            };
            let column_name = resolver.column_name(&InstanceSpec::Linkable(spec.clone().into()));
            columns.push((i.column_name.clone(), column_name.clone()));
            out.time_dimensions.push(Instance { spec, column_name, defined_from: i.defined_from.clone() });
        }
        for i in &self.identifiers {
            if i.spec.identifier_links.is_empty() && i.spec.element_name == link {
                continue;
            }
            let spec = IdentifierSpec {
                identifier_links: prefixed(links, &i.spec.identifier_links),
                ..i.spec.clone()
            };
            let column_name = resolver.column_name(&InstanceSpec::Linkable(spec.clone().into()));
            columns.push((i.column_name.clone(), column_name.clone()));
            out.identifiers.push(Instance { spec, column_name, defined_from: i.defined_from.clone() });
        }
        (out, columns)
    }

    pub fn with_aggregation_state(&self, state: AggregationState) -> InstanceSet {
        let mut out = self.clone();
        for m in &mut out.measures {
            m.aggregation_state = state;
        }
        out
    }
}

fn prefixed(prefix: &[String], links: &[String]) -> Vec<String> {
    prefix.iter().chain(links).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specs::DunderColumnAssociationResolver;

    fn listing_set() -> InstanceSet {
        let from = vec![ElementReference {
            data_source: "listings_latest".into(),
            element_name: "listing".into(),
        }];
        InstanceSet {
            measures: vec![MeasureInstance {
                spec: MeasureSpec::new("listings"),
                column_name: "listings".into(),
                defined_from: from.clone(),
                aggregation_state: AggregationState::NonAggregated,
            }],
            dimensions: vec![Instance {
                spec: DimensionSpec::new("country_latest", vec![]),
                column_name: "country_latest".into(),
                defined_from: from.clone(),
            }],
            identifiers: vec![
                Instance {
                    spec: IdentifierSpec::new("listing", vec![]),
                    column_name: "listing".into(),
                    defined_from: from.clone(),
                },
                Instance {
                    spec: IdentifierSpec::new("user", vec![]),
                    column_name: "user".into(),
                    defined_from: from,
                },
            ],
            ..InstanceSet::default()
        }
    }

    #[test]
    fn test_prefix_link_drops_measures_and_self_link() {
        let (joined, columns) = listing_set().with_prefix_link("listing", &DunderColumnAssociationResolver);
        assert!(joined.measures.is_empty());
        assert_eq!(joined.dimensions[0].column_name, "listing__country_latest");
        let ids: Vec<_> = joined.identifiers.iter().map(|i| i.column_name.as_str()).collect();
        assert_eq!(ids, vec!["listing__user"]);
        assert_eq!(
            columns,
            vec![
                ("country_latest".to_string(), "listing__country_latest".to_string()),
                ("user".to_string(), "listing__user".to_string()),
            ]
        );
    }

    #[test]
    fn test_prefix_links_chain() {
        let links = vec!["booking".to_string(), "listing".to_string()];
        let (joined, _) = listing_set().with_prefix_links(&links, &DunderColumnAssociationResolver);
        assert_eq!(joined.dimensions[0].column_name, "booking__listing__country_latest");
        assert_eq!(
            joined.dimensions[0].spec.identifier_links,
            vec!["booking".to_string(), "listing".to_string()]
        );
        let ids: Vec<_> = joined.identifiers.iter().map(|i| i.column_name.as_str()).collect();
        assert_eq!(ids, vec!["booking__listing__user"]);
    }

    #[test]
    fn test_merge_keeps_first_instance() {
        let a = listing_set();
        let mut b = listing_set();
        b.dimensions[0].column_name = "other".into();
        let merged = InstanceSet::merge(&[a, b]);
        assert_eq!(merged.dimensions.len(), 1);
        assert_eq!(merged.dimensions[0].column_name, "country_latest");
    }

    #[test]
    fn test_filter_and_state() {
        let set = listing_set();
        let mut keep = InstanceSpecSet::default();
        keep.add_measure(MeasureSpec::new("listings"));
        let filtered = set.filter(&keep).with_aggregation_state(AggregationState::Complete);
        assert_eq!(filtered.column_names(), vec!["listings"]);
        assert_eq!(filtered.measures[0].aggregation_state, AggregationState::Complete);
    }
}
