use crate::catalog::TableSchema;
use crate::escape::contains_pattern;
use crate::plan::{push_text, BindValue, JoinSpec};

use super::{FilterContribution, FilterValue, SearchFilter};

/// Restricts results by manufacturer name, joining the `manufacturers`
/// dropdown table. The stable join alias lets two filters (or a filter and
/// a criterion) traversing the relation share one join.
pub struct ManufacturerFilter;

const ALIAS: &str = "filter_manufacturers";

impl SearchFilter for ManufacturerFilter {
    fn id(&self) -> &'static str {
        "manufacturer"
    }

    fn name(&self) -> &'static str {
        "Manufacturer"
    }

    fn contribution(
        &self,
        schema: &TableSchema,
        value: &FilterValue,
        binds: &mut Vec<BindValue>,
    ) -> FilterContribution {
        if !schema.has_column("manufacturers_id") {
            tracing::debug!(table = %schema.table, "manufacturer filter not applicable");
            return FilterContribution::default();
        }
        let FilterValue::Text(pattern) = value else {
            return FilterContribution::default();
        };
        if pattern.is_empty() {
            return FilterContribution::default();
        }

        let idx = push_text(binds, contains_pattern(pattern));
        FilterContribution {
            where_fragments: vec![format!("{}.name ILIKE ${} ESCAPE E'\\\\'", ALIAS, idx)],
            joins: vec![JoinSpec::left(
                ALIAS,
                "manufacturers",
                format!("t.manufacturers_id = {}.id", ALIAS),
            )],
        }
    }
}
