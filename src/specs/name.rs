//! Parsing of `__`-qualified names

use crate::semantic_model::{TimeGranularity, DUNDER};

/// A qualified name split into its parts: `listing__user__ds__month` is links
/// `[listing, user]`, element `ds`, granularity `month`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredLinkableSpecName {
    pub identifier_link_names: Vec<String>,
    pub element_name: String,
    pub time_granularity: Option<TimeGranularity>,
}

impl StructuredLinkableSpecName {
    /// Split a qualified name. Returns `None` for empty names or empty parts (`a____b`).
    pub fn parse(qualified_name: &str) -> Option<Self> {
        let mut parts: Vec<&str> = qualified_name.split(DUNDER).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return None;
        }

        let mut time_granularity = None;
        if parts.len() > 1 {
            if let Some(last) = parts.last() {
                let exact = TimeGranularity::ALL.into_iter().find(|g| g.as_str() == *last);
                if exact.is_some() {
                    time_granularity = exact;
                    parts.pop();
                }
            }
        }

        let element_name = parts.pop()?.to_string();
        Some(StructuredLinkableSpecName {
            identifier_link_names: parts.into_iter().map(str::to_string).collect(),
            element_name,
            time_granularity,
        })
    }

    pub fn qualified_name(&self) -> String {
        let mut parts: Vec<&str> = self.identifier_link_names.iter().map(String::as_str).collect();
        parts.push(&self.element_name);
        if let Some(g) = self.time_granularity {
            parts.push(g.as_str());
        }
        parts.join(DUNDER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain() {
        let n = StructuredLinkableSpecName::parse("is_instant").unwrap();
        assert!(n.identifier_link_names.is_empty());
        assert_eq!(n.element_name, "is_instant");
        assert_eq!(n.time_granularity, None);
    }

    #[test]
    fn test_parse_linked_with_granularity() {
        let n = StructuredLinkableSpecName::parse("listing__user__ds__month").unwrap();
        assert_eq!(n.identifier_link_names, vec!["listing", "user"]);
        assert_eq!(n.element_name, "ds");
        assert_eq!(n.time_granularity, Some(TimeGranularity::Month));
        assert_eq!(n.qualified_name(), "listing__user__ds__month");
    }

    #[test]
    fn test_bare_granularity_word_is_an_element() {
        let n = StructuredLinkableSpecName::parse("day").unwrap();
        assert_eq!(n.element_name, "day");
        assert_eq!(n.time_granularity, None);
    }

    #[test]
    fn test_parse_rejects_empty_parts() {
        assert!(StructuredLinkableSpecName::parse("").is_none());
        assert!(StructuredLinkableSpecName::parse("listing____country").is_none());
    }
}
