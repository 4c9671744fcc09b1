//! Plan assembly: merge resolved criteria and filter contributions into one
//! deduplicated query plan.

use crate::catalog::{Catalog, TableSchema};
use crate::criteria::Link;
use crate::filters::AppliedFilter;
use crate::plan::{push_text, JoinSpec, QueryPlan, WhereNode};
use crate::resolver::ResolveCtx;

use super::resolve::{JoinRecipe, JoinRecipeKind, ResolvedNode};
use super::SearchEngine;

impl SearchEngine {
    pub(super) fn assemble(
        &self,
        schema: &TableSchema,
        catalog: &Catalog,
        nodes: Vec<ResolvedNode>,
        filter_nodes: Vec<ResolvedNode>,
        applied_filters: &[AppliedFilter],
    ) -> QueryPlan {
        let mut plan = QueryPlan::new(&schema.table);
        plan.select = select_list(catalog, &schema.table);

        let mut criteria_group = WhereNode::group();
        self.append_nodes(&mut plan, nodes, &mut criteria_group);
        if !criteria_group.is_empty() {
            plan.where_tree.push(Link::And, criteria_group);
        }

        let mut filter_group = WhereNode::group();
        for node in filter_nodes {
            self.append_node(&mut plan, node, Link::And, &mut filter_group);
        }
        if !filter_group.is_empty() {
            plan.where_tree.push(Link::And, filter_group);
        }

        self.apply_raw_contributions(&mut plan, schema, applied_filters);

        plan
    }

    fn append_nodes(&self, plan: &mut QueryPlan, nodes: Vec<ResolvedNode>, target: &mut WhereNode) {
        for node in nodes {
            let link = match &node {
                ResolvedNode::Leaf(c) => c.link,
                ResolvedNode::Group { link, .. } => *link,
            };
            self.append_node(plan, node, link, target);
        }
    }

    fn append_node(
        &self,
        plan: &mut QueryPlan,
        node: ResolvedNode,
        link: Link,
        target: &mut WhereNode,
    ) {
        match node {
            ResolvedNode::Leaf(resolved) => {
                let alias = match &resolved.join {
                    Some(recipe) => {
                        let alias = recipe.alias.clone();
                        self.ensure_join(plan, recipe);
                        alias
                    }
                    None => plan.base_alias.clone(),
                };

                let ctx = ResolveCtx {
                    itemtype: &resolved.itemtype,
                    option: &resolved.option,
                    kind: resolved.kind,
                    values: &resolved.values,
                    negate: resolved.negate,
                    alias: &alias,
                };
                match self.resolvers.resolve(&ctx, &mut plan.binds) {
                    Some(fragment) => target.push(link, WhereNode::Fragment(fragment)),
                    None => {
                        tracing::warn!(
                            itemtype = %resolved.itemtype,
                            option = resolved.option.id,
                            kind = resolved.kind.as_str(),
                            "no resolver produced a fragment, dropping criterion"
                        );
                    }
                }
            }
            ResolvedNode::Group {
                negate, children, ..
            } => {
                let mut group = if negate {
                    WhereNode::negated_group()
                } else {
                    WhereNode::group()
                };
                self.append_nodes(plan, children, &mut group);
                if !group.is_empty() {
                    target.push(link, group);
                }
            }
        }
    }

    fn ensure_join(&self, plan: &mut QueryPlan, recipe: &JoinRecipe) {
        if plan.has_join(&recipe.alias) {
            return;
        }
        let on = match &recipe.kind {
            JoinRecipeKind::ForeignKey { fk } => format!(
                "{}.{} = {}.id",
                plan.base_alias, fk, recipe.alias
            ),
            JoinRecipeKind::ItemsId { itemtype } => {
                let idx = push_text(&mut plan.binds, itemtype.clone());
                format!(
                    "{alias}.items_id = {base}.id AND {alias}.itemtype = ${idx}",
                    alias = recipe.alias,
                    base = plan.base_alias,
                )
            }
        };
        plan.add_join(JoinSpec::left(&recipe.alias, &recipe.table, on));
        if recipe.is_meta {
            plan.meta = true;
        }
    }

    fn apply_raw_contributions(
        &self,
        plan: &mut QueryPlan,
        schema: &TableSchema,
        applied_filters: &[AppliedFilter],
    ) {
        for applied in applied_filters {
            let Some(provider) = self.filters.get(&applied.filter_id) else {
                continue;
            };
            let contribution = provider.contribution(schema, &applied.value, &mut plan.binds);
            if contribution.is_empty() {
                continue;
            }
            for join in contribution.joins {
                plan.add_join(join);
            }
            for fragment in contribution.where_fragments {
                plan.where_tree.push(Link::And, WhereNode::Fragment(fragment));
            }
        }
    }
}

/// Select list: base id first, then every base-table option column in
/// option-id order. Computed options are projected under their field name.
fn select_list(catalog: &Catalog, base_table: &str) -> Vec<String> {
    let mut out = vec!["t.id".to_string()];
    for opt in catalog.iter() {
        if opt.table != base_table {
            continue;
        }
        let rendered = if opt.computation.is_some() {
            format!("{} AS {}", opt.column_expr("t"), opt.field)
        } else {
            opt.column_expr("t")
        };
        if !out.contains(&rendered) {
            out.push(rendered);
        }
    }
    out
}
