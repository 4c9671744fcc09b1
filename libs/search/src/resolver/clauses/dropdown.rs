use crate::criteria::SearchKind;
use crate::plan::{push_int, push_int_array, BindValue};

use super::super::{join_or_parts, ResolveCtx, ResolvedValue};

pub(super) fn build(
    ctx: &ResolveCtx<'_>,
    col: &str,
    binds: &mut Vec<BindValue>,
) -> Option<String> {
    match ctx.kind {
        SearchKind::Equals => {
            let ids: Vec<i64> = ctx
                .values
                .iter()
                .filter_map(|v| match v {
                    ResolvedValue::Int(n) => Some(*n),
                    _ => None,
                })
                .collect();
            match ids.as_slice() {
                [] => None,
                [single] => {
                    let idx = push_int(binds, *single);
                    Some(format!("{} = ${}", col, idx))
                }
                _ => {
                    let idx = push_int_array(binds, ids);
                    Some(format!("{} = ANY(${})", col, idx))
                }
            }
        }

        // The id set was closure-expanded during normalization and already
        // contains the node itself.
        SearchKind::Under | SearchKind::Over => {
            let mut parts = Vec::new();
            for value in ctx.values {
                let ResolvedValue::IdSet(ids) = value else {
                    continue;
                };
                let idx = push_int_array(binds, ids.clone());
                parts.push(format!("{} = ANY(${})", col, idx));
            }
            join_or_parts(parts)
        }

        _ => None,
    }
}
