//! Default datatype-driven WHERE generation.

use crate::catalog::DataType;
use crate::criteria::SearchKind;
use crate::plan::BindValue;

use super::{negate_fragment, ResolveCtx};

mod date;
mod dropdown;
mod number;
mod string;

/// Build the standard comparison for a criterion, or None when the
/// combination cannot be compiled (the caller drops it).
pub fn default_where(ctx: &ResolveCtx<'_>, binds: &mut Vec<BindValue>) -> Option<String> {
    let col = ctx.column_expr();

    let fragment = match ctx.kind {
        // NULL or empty string, uniformly for every datatype. The text cast
        // keeps the empty-string leg valid on non-text columns.
        SearchKind::Empty => Some(format!("({col} IS NULL OR {col}::text = '')")),

        _ => match ctx.option.datatype {
            DataType::String | DataType::ItemLink => string::build(ctx, &col, binds),
            DataType::Integer => number::build_integer(ctx, &col, binds),
            DataType::Decimal => number::build_decimal(ctx, &col, binds),
            DataType::Bool => number::build_bool(ctx, &col, binds),
            DataType::Date | DataType::DateTime => date::build(ctx, &col, binds),
            DataType::Dropdown => dropdown::build(ctx, &col, binds),
        },
    }?;

    if ctx.negate {
        Some(negate_fragment(&col, fragment))
    } else {
        Some(fragment)
    }
}
