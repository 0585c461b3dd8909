//! Column naming for instances

use super::InstanceSpec;

/// Decides the SQL column name an instance is stored under
pub trait ColumnAssociationResolver: Send + Sync + std::fmt::Debug {
    fn column_name(&self, spec: &InstanceSpec) -> String;
}

/// Names columns after the spec's qualified name, e.g. `listing__country_latest`
#[derive(Debug, Clone, Copy, Default)]
pub struct DunderColumnAssociationResolver;

impl ColumnAssociationResolver for DunderColumnAssociationResolver {
    fn column_name(&self, spec: &InstanceSpec) -> String {
        spec.qualified_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic_model::TimeGranularity;
    use crate::specs::{LinkableSpec, MeasureSpec, TimeDimensionSpec};

    #[test]
    fn test_dunder_names() {
        let resolver = DunderColumnAssociationResolver;
        let td: LinkableSpec = TimeDimensionSpec::new("ds", vec!["listing".into()], TimeGranularity::Week).into();
        assert_eq!(resolver.column_name(&InstanceSpec::Linkable(td)), "listing__ds__week");
        assert_eq!(
            resolver.column_name(&InstanceSpec::Measure(MeasureSpec::new("bookings"))),
            "bookings"
        );
    }
}
