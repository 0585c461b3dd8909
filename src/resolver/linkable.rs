//! Linkable specs a data source exposes, locally and through joins

use crate::semantic_model::{DataSource, DimensionType, SemanticModel};
use crate::specs::{DimensionSpec, IdentifierSpec, LinkableSpec, TimeDimensionSpec};
use super::join::JoinEvaluator;

/// Specs read straight from a data source: every dimension (time dimensions at their declared
/// and every coarser granularity) and identifier, unlinked, then the same elements linked by
/// each identifier that owns the source's rows.
pub fn local_linkable_specs(ds: &DataSource) -> Vec<LinkableSpec> {
    let unlinked = unlinked_specs(ds);
    let mut out = unlinked.clone();
    for owner in ds.identifiers.iter().filter(|i| i.identifier_type.links_local_dimensions()) {
        for spec in &unlinked {
            if matches!(spec, LinkableSpec::Identifier(s) if s.element_name == owner.name) {
                continue;
            }
            out.push(spec.with_prefix_link(&owner.name));
        }
    }
    out
}

fn unlinked_specs(ds: &DataSource) -> Vec<LinkableSpec> {
    let mut out = Vec::new();
    for dim in &ds.dimensions {
        match (dim.dimension_type, dim.time_granularity()) {
            (DimensionType::Time, Some(declared)) => {
                for granularity in declared.with_coarser() {
                    out.push(TimeDimensionSpec::new(dim.name.clone(), Vec::new(), granularity).into());
                }
            }
            _ => out.push(DimensionSpec::new(dim.name.clone(), Vec::new()).into()),
        }
    }
    for identifier in &ds.identifiers {
        out.push(IdentifierSpec::new(identifier.name.clone(), Vec::new()).into());
    }
    out
}

/// Enumerates the linkable specs reachable from a data source
#[derive(Debug, Clone, Copy)]
pub struct LinkableSpecResolver<'a> {
    model: &'a SemanticModel,
    include_multi_hop: bool,
}

impl<'a> LinkableSpecResolver<'a> {
    pub fn new(model: &'a SemanticModel, include_multi_hop: bool) -> Self {
        LinkableSpecResolver { model, include_multi_hop }
    }

    /// Local specs, then the unlinked specs of each joinable data source prefixed with the
    /// identifiers of its join path
    pub fn reachable_specs(&self, data_source: &str) -> Vec<LinkableSpec> {
        let Some(ds) = self.model.data_source(data_source) else {
            return Vec::new();
        };
        let mut out = local_linkable_specs(ds);
        let paths = JoinEvaluator::new(self.model).get_joinable_data_sources(data_source, self.include_multi_hop);
        for (target_name, path) in &paths {
            let Some(target) = self.model.data_source(target_name) else {
                continue;
            };
            // Multi-hop joins stop short of validity-window sources.
            if path.len() > 1 && target.has_validity_window() {
                continue;
            }
            let links = path.identifier_links();
            let Some(last_link) = links.last() else {
                continue;
            };
            for spec in unlinked_specs(target) {
                if matches!(&spec, LinkableSpec::Identifier(s) if &s.element_name == last_link) {
                    continue;
                }
                let mut linked = spec;
                for link in links.iter().rev() {
                    linked = linked.with_prefix_link(link);
                }
                if !out.contains(&linked) {
                    out.push(linked.clone());
                }
                // One join away, and also named through each identifier the source owns
                if self.include_multi_hop && path.len() == 1 {
                    let owners = ds
                        .identifiers
                        .iter()
                        .filter(|i| i.identifier_type.links_local_dimensions() && &i.name != last_link);
                    for owner in owners {
                        let owned = linked.with_prefix_link(&owner.name);
                        if !out.contains(&owned) {
                            out.push(owned);
                        }
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::load_model_file;

    fn names(specs: &[LinkableSpec]) -> Vec<String> {
        specs.iter().map(|s| s.qualified_name()).collect()
    }

    #[test]
    fn test_local_specs_include_owner_links() {
        let model = load_model_file("tests/test_data/simple_model.yaml").unwrap();
        let listings = model.data_source("listings_latest").unwrap();
        let specs = names(&local_linkable_specs(listings));
        assert!(specs.contains(&"country_latest".to_string()));
        assert!(specs.contains(&"listing__country_latest".to_string()));
        assert!(specs.contains(&"created_at__day".to_string()));
        assert!(specs.contains(&"listing__created_at__year".to_string()));
        assert!(specs.contains(&"listing__user".to_string()));
        assert!(!specs.contains(&"listing__listing".to_string()));
    }

    #[test]
    fn test_reachable_specs_respect_multi_hop_toggle() {
        let model = load_model_file("tests/test_data/simple_model.yaml").unwrap();
        let with = names(&LinkableSpecResolver::new(&model, true).reachable_specs("bookings_source"));
        let without = names(&LinkableSpecResolver::new(&model, false).reachable_specs("bookings_source"));

        assert!(with.contains(&"listing__country_latest".to_string()));
        assert!(with.contains(&"listing__user__home_state".to_string()));
        assert!(without.contains(&"listing__country_latest".to_string()));
        assert!(!without.contains(&"listing__user__home_state".to_string()));
        assert!(!with.contains(&"listing__listing".to_string()));
    }

    #[test]
    fn test_owner_reaches_joined_specs_through_its_identifier() {
        let model = load_model_file("tests/test_data/simple_model.yaml").unwrap();
        let with = names(&LinkableSpecResolver::new(&model, true).reachable_specs("listings_latest"));
        let without = names(&LinkableSpecResolver::new(&model, false).reachable_specs("listings_latest"));

        assert!(with.contains(&"user__home_state".to_string()));
        assert!(with.contains(&"listing__user__home_state".to_string()));
        assert!(without.contains(&"user__home_state".to_string()));
        assert!(!without.contains(&"listing__user__home_state".to_string()));
    }
}
