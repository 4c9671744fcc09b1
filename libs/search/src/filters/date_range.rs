use crate::catalog::TableSchema;
use crate::plan::{push_timestamp, BindValue};

use super::{FilterContribution, FilterValue, SearchFilter};

/// Restricts results to a modification-date window on `date_mod`.
///
/// Uses raw fragments rather than the criterion path because open-ended
/// bounds (only `from`, only `to`) have no criterion spelling.
pub struct DateRangeFilter;

impl SearchFilter for DateRangeFilter {
    fn id(&self) -> &'static str {
        "date_range"
    }

    fn name(&self) -> &'static str {
        "Modification date"
    }

    fn contribution(
        &self,
        schema: &TableSchema,
        value: &FilterValue,
        binds: &mut Vec<BindValue>,
    ) -> FilterContribution {
        if !schema.has_column("date_mod") {
            tracing::debug!(table = %schema.table, "date range filter not applicable");
            return FilterContribution::default();
        }
        let FilterValue::DateRange { from, to } = value else {
            return FilterContribution::default();
        };

        let mut contribution = FilterContribution::default();
        if let Some(from) = from {
            let idx = push_timestamp(binds, *from);
            contribution
                .where_fragments
                .push(format!("t.date_mod >= ${}", idx));
        }
        if let Some(to) = to {
            let idx = push_timestamp(binds, *to);
            contribution
                .where_fragments
                .push(format!("t.date_mod < ${}", idx));
        }
        contribution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeSet;

    #[test]
    fn open_ended_range_contributes_one_fragment() {
        let schema = TableSchema {
            itemtype: "Computer".to_string(),
            table: "computers".to_string(),
            columns: ["id", "date_mod"]
                .iter()
                .map(|c| c.to_string())
                .collect::<BTreeSet<_>>(),
            parent_field: None,
        };
        let mut binds = Vec::new();
        let contribution = DateRangeFilter.contribution(
            &schema,
            &FilterValue::DateRange {
                from: Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()),
                to: None,
            },
            &mut binds,
        );
        assert_eq!(contribution.where_fragments, vec!["t.date_mod >= $1"]);
        assert_eq!(binds.len(), 1);
    }
}
