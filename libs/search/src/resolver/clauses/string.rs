use crate::criteria::SearchKind;
use crate::escape::contains_pattern;
use crate::plan::{push_text, BindValue};

use super::super::{join_or_parts, ResolveCtx, ResolvedValue};

pub(super) fn build(
    ctx: &ResolveCtx<'_>,
    col: &str,
    binds: &mut Vec<BindValue>,
) -> Option<String> {
    let mut parts = Vec::new();
    for value in ctx.values {
        let ResolvedValue::Text(text) = value else {
            continue;
        };
        if text.is_empty() {
            continue;
        }
        match ctx.kind {
            SearchKind::Equals => {
                let idx = push_text(binds, text.clone());
                parts.push(format!("{} = ${}", col, idx));
            }
            SearchKind::Contains => {
                let idx = push_text(binds, contains_pattern(text));
                parts.push(format!("{} ILIKE ${} ESCAPE E'\\\\'", col, idx));
            }
            _ => return None,
        }
    }
    join_or_parts(parts)
}
