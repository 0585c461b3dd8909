//! Join evaluator: which data sources may be joined to which, and through what path

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::semantic_model::{DataSource, IdentifierType, SemanticModel};

/// Joins traversed by the longest permitted path (`a__b__dimension`)
pub const MAX_JOIN_HOPS: usize = 2;

/// Whether joining a left identifier to a right identifier keeps the left side's row count.
/// Used when the right data source has no validity window.
pub fn is_valid_join(left: IdentifierType, right: IdentifierType) -> bool {
    use IdentifierType::*;
    match (left, right) {
        (Primary | Unique | Foreign | Natural, Primary) => true,
        (Primary | Unique | Foreign | Natural, Unique) => true,
        (Primary | Unique | Foreign | Natural, Foreign) => false,
        // A natural key is only unique once restricted to a validity window.
        (Primary | Unique | Foreign | Natural, Natural) => false,
    }
}

/// Like [`is_valid_join`], for right data sources that declare a validity window. The window
/// predicate makes a natural key unique for each left row.
pub fn is_valid_join_to_validity_window(left: IdentifierType, right: IdentifierType) -> bool {
    use IdentifierType::*;
    match (left, right) {
        (Primary | Unique | Foreign | Natural, Primary) => true,
        (Primary | Unique | Foreign | Natural, Unique) => true,
        (Primary | Unique | Foreign | Natural, Natural) => true,
        (Primary | Unique | Foreign | Natural, Foreign) => false,
    }
}

/// One join along a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinHop {
    pub left_data_source: String,
    pub right_data_source: String,
    pub identifier: String,
}

/// The joins that reach a data source from a starting one, first hop first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPath {
    pub hops: Vec<JoinHop>,
}

impl JoinPath {
    /// Identifier links a spec reached through this path carries
    pub fn identifier_links(&self) -> Vec<String> {
        self.hops.iter().map(|h| h.identifier.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct JoinEvaluator<'a> {
    model: &'a SemanticModel,
}

impl<'a> JoinEvaluator<'a> {
    pub fn new(model: &'a SemanticModel) -> Self {
        JoinEvaluator { model }
    }

    /// Whether `left` may be joined to `right` on `identifier`
    pub fn is_valid_data_source_join(&self, left: &DataSource, right: &DataSource, identifier: &str) -> bool {
        let (Some(left_id), Some(right_id)) = (left.get_identifier(identifier), right.get_identifier(identifier))
        else {
            return false;
        };
        match (left.has_validity_window(), right.has_validity_window()) {
            (true, true) => false,
            (_, true) => is_valid_join_to_validity_window(left_id.identifier_type, right_id.identifier_type),
            (_, false) => is_valid_join(left_id.identifier_type, right_id.identifier_type),
        }
    }

    /// Data sources directly joinable from `left`, as (identifier, data source) in
    /// declaration order
    pub fn direct_joins(&self, left: &'a DataSource) -> Vec<(&'a str, &'a DataSource)> {
        let mut out = Vec::new();
        for identifier in &left.identifiers {
            for right in self.model.sources_for_identifier(&identifier.name) {
                if right.name == left.name {
                    continue;
                }
                if self.is_valid_data_source_join(left, right, &identifier.name) {
                    out.push((identifier.name.as_str(), right));
                }
            }
        }
        out
    }

    /// Every data source reachable from `left_name`, keyed by name. Breadth-first: a target
    /// keeps the first path found, so a shorter path is never replaced by a longer one.
    pub fn get_joinable_data_sources(&self, left_name: &str, include_multi_hop: bool) -> BTreeMap<String, JoinPath> {
        let mut paths = BTreeMap::new();
        let Some(start) = self.model.data_source(left_name) else {
            return paths;
        };
        let max_hops = if include_multi_hop { MAX_JOIN_HOPS } else { 1 };

        let mut visited: HashSet<&str> = HashSet::from([start.name.as_str()]);
        let mut frontier: Vec<(&DataSource, Vec<JoinHop>)> = vec![(start, Vec::new())];

        for _ in 0..max_hops {
            let mut next = Vec::new();
            for (left, hops) in &frontier {
                for (identifier, right) in self.direct_joins(*left) {
                    if !visited.insert(right.name.as_str()) {
                        continue;
                    }
                    let mut path = hops.clone();
                    path.push(JoinHop {
                        left_data_source: left.name.clone(),
                        right_data_source: right.name.clone(),
                        identifier: identifier.to_string(),
                    });
                    paths.insert(right.name.clone(), JoinPath { hops: path.clone() });
                    next.push((right, path));
                }
            }
            frontier = next;
        }

        debug!(data_source = left_name, include_multi_hop, reachable = paths.len(), "Resolved joinable data sources");
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::load_model_file;

    #[test]
    fn test_join_grid_without_validity_window() {
        for left in IdentifierType::ALL {
            assert!(is_valid_join(left, IdentifierType::Primary));
            assert!(is_valid_join(left, IdentifierType::Unique));
            assert!(!is_valid_join(left, IdentifierType::Foreign));
            assert!(!is_valid_join(left, IdentifierType::Natural));
        }
    }

    #[test]
    fn test_join_grid_with_validity_window() {
        for left in IdentifierType::ALL {
            assert!(is_valid_join_to_validity_window(left, IdentifierType::Primary));
            assert!(is_valid_join_to_validity_window(left, IdentifierType::Unique));
            assert!(is_valid_join_to_validity_window(left, IdentifierType::Natural));
            assert!(!is_valid_join_to_validity_window(left, IdentifierType::Foreign));
        }
    }

    #[test]
    fn test_single_hop() {
        let model = load_model_file("tests/test_data/simple_model.yaml").unwrap();
        let evaluator = JoinEvaluator::new(&model);
        let paths = evaluator.get_joinable_data_sources("bookings_source", false);
        assert!(paths.contains_key("listings_latest"));
        assert!(!paths.contains_key("users_ds_source"));
        // foreign to foreign never joins
        assert!(!paths.contains_key("views_source"));
    }

    #[test]
    fn test_multi_hop_keeps_shortest_path() {
        let model = load_model_file("tests/test_data/simple_model.yaml").unwrap();
        let evaluator = JoinEvaluator::new(&model);
        let paths = evaluator.get_joinable_data_sources("bookings_source", true);

        let listings = &paths["listings_latest"];
        assert_eq!(listings.len(), 1);
        let users = &paths["users_ds_source"];
        assert_eq!(users.identifier_links(), vec!["listing".to_string(), "user".to_string()]);
    }

    #[test]
    fn test_validity_window_sources() {
        let model = load_model_file("tests/test_data/scd_model.yaml").unwrap();
        let evaluator = JoinEvaluator::new(&model);
        let bookings = model.data_source("bookings_source").unwrap();
        let scd = model.data_source("listings_scd").unwrap();
        assert!(evaluator.is_valid_data_source_join(bookings, scd, "listing"));
        assert!(!evaluator.is_valid_data_source_join(scd, bookings, "listing"));
        assert!(!evaluator.is_valid_data_source_join(scd, scd, "listing"));
    }
}
