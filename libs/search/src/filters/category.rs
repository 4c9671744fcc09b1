use crate::catalog::TableSchema;
use crate::criteria::SearchKind;

use super::{FilterCriterion, FilterValue, SearchFilter};

/// Restricts results to a category subtree (`itilcategories_id` under the
/// selected node). The under-closure is expanded by the engine like any
/// other hierarchical criterion.
pub struct CategoryFilter;

impl SearchFilter for CategoryFilter {
    fn id(&self) -> &'static str {
        "category"
    }

    fn name(&self) -> &'static str {
        "Category"
    }

    fn criteria(&self, schema: &TableSchema, value: &FilterValue) -> Vec<FilterCriterion> {
        if !schema.has_column("itilcategories_id") {
            tracing::debug!(table = %schema.table, "category filter not applicable");
            return Vec::new();
        }
        let FilterValue::Id(id) = value else {
            return Vec::new();
        };
        vec![FilterCriterion::new(
            "itilcategories_id",
            SearchKind::Under,
            id.to_string(),
        )]
    }
}
