use crate::criteria::SearchKind;
use crate::plan::{push_bool, push_int, push_text, BindValue};

use super::super::{join_or_parts, ResolveCtx, ResolvedValue};

pub(super) fn build_integer(
    ctx: &ResolveCtx<'_>,
    col: &str,
    binds: &mut Vec<BindValue>,
) -> Option<String> {
    let op = comparison_op(ctx.kind)?;
    let mut parts = Vec::new();
    for value in ctx.values {
        let ResolvedValue::Int(n) = value else {
            continue;
        };
        let idx = push_int(binds, *n);
        parts.push(format!("{} {} ${}", col, op, idx));
    }
    join_or_parts(parts)
}

pub(super) fn build_decimal(
    ctx: &ResolveCtx<'_>,
    col: &str,
    binds: &mut Vec<BindValue>,
) -> Option<String> {
    let op = comparison_op(ctx.kind)?;
    let mut parts = Vec::new();
    for value in ctx.values {
        let ResolvedValue::Decimal(repr) = value else {
            continue;
        };
        let idx = push_text(binds, repr.clone());
        parts.push(format!("{} {} ${}::numeric", col, op, idx));
    }
    join_or_parts(parts)
}

pub(super) fn build_bool(
    ctx: &ResolveCtx<'_>,
    col: &str,
    binds: &mut Vec<BindValue>,
) -> Option<String> {
    if ctx.kind != SearchKind::Equals {
        return None;
    }
    let mut parts = Vec::new();
    for value in ctx.values {
        let ResolvedValue::Bool(b) = value else {
            continue;
        };
        let idx = push_bool(binds, *b);
        parts.push(format!("{} = ${}", col, idx));
    }
    join_or_parts(parts)
}

fn comparison_op(kind: SearchKind) -> Option<&'static str> {
    match kind {
        SearchKind::Equals => Some("="),
        SearchKind::LessThan => Some("<"),
        SearchKind::MoreThan => Some(">"),
        _ => None,
    }
}
