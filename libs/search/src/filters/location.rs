use crate::catalog::TableSchema;
use crate::criteria::SearchKind;

use super::{FilterCriterion, FilterValue, SearchFilter};

/// Restricts results to one location (exact match on `locations_id`).
pub struct LocationFilter;

impl SearchFilter for LocationFilter {
    fn id(&self) -> &'static str {
        "location"
    }

    fn name(&self) -> &'static str {
        "Location"
    }

    fn criteria(&self, schema: &TableSchema, value: &FilterValue) -> Vec<FilterCriterion> {
        if !schema.has_column("locations_id") {
            tracing::debug!(table = %schema.table, "location filter not applicable");
            return Vec::new();
        }
        let FilterValue::Id(id) = value else {
            return Vec::new();
        };
        vec![FilterCriterion::new(
            "locations_id",
            SearchKind::Equals,
            id.to_string(),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn schema_with(columns: &[&str]) -> TableSchema {
        TableSchema {
            itemtype: "Thing".to_string(),
            table: "things".to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect::<BTreeSet<_>>(),
            parent_field: None,
        }
    }

    #[test]
    fn contributes_an_equals_criterion_when_applicable() {
        let criteria = LocationFilter.criteria(
            &schema_with(&["id", "locations_id"]),
            &FilterValue::Id(12),
        );
        assert_eq!(
            criteria,
            vec![FilterCriterion::new("locations_id", SearchKind::Equals, "12".to_string())]
        );
    }

    #[test]
    fn missing_column_means_no_contribution() {
        let criteria = LocationFilter.criteria(&schema_with(&["id", "name"]), &FilterValue::Id(12));
        assert!(criteria.is_empty());
    }
}
