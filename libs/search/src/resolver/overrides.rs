//! Bespoke per-table resolvers for the built-in item types.

use crate::criteria::SearchKind;
use crate::plan::{push_int, push_int_array, BindValue};

use super::{negate_fragment, Resolution, ResolveCtx, ResolvedValue, WhereResolver};

/// Resolves symbolic ticket status names ("new", "closed", ...) against the
/// numeric status column. Numeric values fall through to default generation.
pub struct TicketStatusResolver;

fn status_code(name: &str) -> Option<i64> {
    match name.to_ascii_lowercase().as_str() {
        "new" => Some(1),
        "assigned" => Some(2),
        "planned" => Some(3),
        "waiting" => Some(4),
        "solved" => Some(5),
        "closed" => Some(6),
        _ => None,
    }
}

impl WhereResolver for TicketStatusResolver {
    fn id(&self) -> &'static str {
        "ticket_status"
    }

    fn resolve(&self, ctx: &ResolveCtx<'_>, binds: &mut Vec<BindValue>) -> Resolution {
        if ctx.option.field != "status" || ctx.kind != SearchKind::Equals {
            return Resolution::NotHandled;
        }

        let mut codes = Vec::new();
        for value in ctx.values {
            let ResolvedValue::Text(name) = value else {
                return Resolution::NotHandled;
            };
            let Some(code) = status_code(name) else {
                return Resolution::NotHandled;
            };
            codes.push(code);
        }
        if codes.is_empty() {
            return Resolution::NotHandled;
        }

        let col = ctx.column_expr();
        let fragment = if codes.len() == 1 {
            let idx = push_int(binds, codes[0]);
            format!("{} = ${}", col, idx)
        } else {
            let idx = push_int_array(binds, codes);
            format!("{} = ANY(${})", col, idx)
        };

        if ctx.negate {
            Resolution::Handled(negate_fragment(&col, fragment))
        } else {
            Resolution::Handled(fragment)
        }
    }
}
