use crate::criteria::SearchKind;
use crate::plan::{push_timestamp, BindValue};

use super::super::{join_or_parts, ResolveCtx, ResolvedValue};

/// Date and datetime comparisons against the half-open window carried by
/// the normalized value: `equals` means containment in the window,
/// `lessthan`/`morethan` compare against its bounds so that "more than
/// 2024" starts at 2025-01-01.
pub(super) fn build(
    ctx: &ResolveCtx<'_>,
    col: &str,
    binds: &mut Vec<BindValue>,
) -> Option<String> {
    let mut parts = Vec::new();
    for value in ctx.values {
        let ResolvedValue::Range { lower, upper } = value else {
            continue;
        };
        match ctx.kind {
            SearchKind::Equals => {
                let lower_idx = push_timestamp(binds, *lower);
                let upper_idx = push_timestamp(binds, *upper);
                parts.push(format!(
                    "({col} >= ${lower_idx} AND {col} < ${upper_idx})"
                ));
            }
            SearchKind::LessThan => {
                let idx = push_timestamp(binds, *lower);
                parts.push(format!("{} < ${}", col, idx));
            }
            SearchKind::MoreThan => {
                let idx = push_timestamp(binds, *upper);
                parts.push(format!("{} >= ${}", col, idx));
            }
            _ => return None,
        }
    }
    join_or_parts(parts)
}
