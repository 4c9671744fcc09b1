//! WHERE-fragment resolution for criteria.
//!
//! Resolution is a first-match-wins chain: item types may register bespoke
//! resolvers for their table (composite fields, symbolic values, computed
//! columns); whatever they do not claim falls through to the default
//! datatype-driven generation in [`clauses`]. Dispatch is keyed by the
//! owning table name, so runtime-defined asset types participate without
//! any class hierarchy. Only one resolver ever handles a given criterion —
//! partial results are never merged.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::catalog::SearchOption;
use crate::criteria::SearchKind;
use crate::plan::BindValue;

mod clauses;
mod overrides;

pub use clauses::default_where;
pub use overrides::TicketStatusResolver;

/// A criterion value after datatype normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedValue {
    Text(String),
    Int(i64),
    Decimal(String),
    Bool(bool),
    /// Half-open instant window derived from a date value's precision.
    Range {
        lower: DateTime<Utc>,
        upper: DateTime<Utc>,
    },
    /// Closure-expanded id set for under/over searches.
    IdSet(Vec<i64>),
}

/// Everything a resolver needs to build one WHERE fragment.
#[derive(Debug)]
pub struct ResolveCtx<'a> {
    pub itemtype: &'a str,
    pub option: &'a SearchOption,
    pub kind: SearchKind,
    pub values: &'a [ResolvedValue],
    pub negate: bool,
    /// Alias of the table the option lives on in the assembled query.
    pub alias: &'a str,
}

impl ResolveCtx<'_> {
    /// Column (or computation) expression under the effective alias.
    pub fn column_expr(&self) -> String {
        self.option.column_expr(self.alias)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Handled(String),
    NotHandled,
}

pub trait WhereResolver: Send + Sync {
    fn id(&self) -> &'static str;

    fn resolve(&self, ctx: &ResolveCtx<'_>, binds: &mut Vec<BindValue>) -> Resolution;
}

/// Ordered per-table resolver chains, consulted before default generation.
#[derive(Default)]
pub struct ResolverRegistry {
    by_table: HashMap<String, Vec<Arc<dyn WhereResolver>>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the overrides shipped for the built-in item types.
    pub fn with_builtin_overrides() -> Self {
        let mut registry = Self::new();
        registry.register("tickets", Arc::new(TicketStatusResolver));
        registry
    }

    pub fn register(&mut self, table: &str, resolver: Arc<dyn WhereResolver>) {
        self.by_table
            .entry(table.to_string())
            .or_default()
            .push(resolver);
    }

    /// Resolve one criterion to a WHERE fragment.
    ///
    /// Returns None when neither an override nor the default generation can
    /// handle the combination; the caller drops the criterion.
    pub fn resolve(&self, ctx: &ResolveCtx<'_>, binds: &mut Vec<BindValue>) -> Option<String> {
        if let Some(chain) = self.by_table.get(&ctx.option.table) {
            for resolver in chain {
                match resolver.resolve(ctx, binds) {
                    Resolution::Handled(fragment) => {
                        tracing::debug!(
                            resolver = resolver.id(),
                            option = ctx.option.id,
                            "criterion resolved by override"
                        );
                        return Some(fragment);
                    }
                    Resolution::NotHandled => continue,
                }
            }
        }
        default_where(ctx, binds)
    }
}

/// Wrap a fragment for negation under three-valued logic.
///
/// `NOT (col LIKE ...)` alone would let NULL rows through; the explicit
/// `IS NOT NULL` keeps the negated set inside the non-NULL rows.
pub(crate) fn negate_fragment(column_expr: &str, fragment: String) -> String {
    format!("({} IS NOT NULL AND NOT ({}))", column_expr, fragment)
}

/// Join OR-combined value parts the way a single fragment is expected.
pub(crate) fn join_or_parts(mut parts: Vec<String>) -> Option<String> {
    match parts.len() {
        0 => None,
        1 => Some(parts.remove(0)),
        _ => Some(format!("({})", parts.join(" OR "))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataType;
    use crate::plan::BindValue;

    struct RejectEverything;

    impl WhereResolver for RejectEverything {
        fn id(&self) -> &'static str {
            "reject"
        }

        fn resolve(&self, _ctx: &ResolveCtx<'_>, _binds: &mut Vec<BindValue>) -> Resolution {
            Resolution::NotHandled
        }
    }

    struct ClaimEverything;

    impl WhereResolver for ClaimEverything {
        fn id(&self) -> &'static str {
            "claim"
        }

        fn resolve(&self, _ctx: &ResolveCtx<'_>, _binds: &mut Vec<BindValue>) -> Resolution {
            Resolution::Handled("1=1".to_string())
        }
    }

    fn ctx_for<'a>(option: &'a SearchOption, values: &'a [ResolvedValue]) -> ResolveCtx<'a> {
        ResolveCtx {
            itemtype: "Ticket",
            option,
            kind: SearchKind::Equals,
            values,
            negate: false,
            alias: "t",
        }
    }

    #[test]
    fn first_match_wins_over_later_resolvers_and_default() {
        let mut registry = ResolverRegistry::new();
        registry.register("tickets", Arc::new(RejectEverything));
        registry.register("tickets", Arc::new(ClaimEverything));

        let option = SearchOption::new(12, "tickets", "status", "Status", DataType::Integer);
        let values = vec![ResolvedValue::Int(2)];
        let mut binds = Vec::new();
        let fragment = registry.resolve(&ctx_for(&option, &values), &mut binds).unwrap();
        assert_eq!(fragment, "1=1");
        assert!(binds.is_empty());
    }

    #[test]
    fn falls_back_to_default_when_nothing_claims() {
        let mut registry = ResolverRegistry::new();
        registry.register("tickets", Arc::new(RejectEverything));

        let option = SearchOption::new(12, "tickets", "status", "Status", DataType::Integer);
        let values = vec![ResolvedValue::Int(2)];
        let mut binds = Vec::new();
        let fragment = registry.resolve(&ctx_for(&option, &values), &mut binds).unwrap();
        assert_eq!(fragment, "t.status = $1");
        assert_eq!(binds, vec![BindValue::Int(2)]);
    }

    #[test]
    fn negation_injects_is_not_null() {
        let fragment = negate_fragment("t.name", "t.name ILIKE $1".to_string());
        assert_eq!(
            fragment,
            "(t.name IS NOT NULL AND NOT (t.name ILIKE $1))"
        );
    }
}
