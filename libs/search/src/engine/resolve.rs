//! Criterion resolution against a catalog snapshot.
//!
//! Every criterion is mapped to its search option here, validity-checked,
//! and value-normalized. Whatever does not resolve — unknown option id,
//! searchtype incompatible with the datatype, missing meta join path — is
//! dropped with a warning; the rest of the request keeps compiling.

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::catalog::{Catalog, JoinLink, SearchOption, TableSchema};
use crate::criteria::{is_kind_valid_for, CriteriaNode, Criterion, Link, SearchKind};
use crate::resolver::ResolvedValue;
use crate::Result;

use super::SearchEngine;

#[derive(Debug, Clone)]
pub(super) struct JoinRecipe {
    pub alias: String,
    pub table: String,
    pub kind: JoinRecipeKind,
    pub is_meta: bool,
}

#[derive(Debug, Clone)]
pub(super) enum JoinRecipeKind {
    /// `t.<fk> = <alias>.id`
    ForeignKey { fk: String },
    /// `<alias>.items_id = t.id AND <alias>.itemtype = $n`
    ItemsId { itemtype: String },
}

#[derive(Debug)]
pub(super) struct ResolvedCriterion {
    pub link: Link,
    pub itemtype: String,
    pub option: SearchOption,
    pub kind: SearchKind,
    pub values: Vec<ResolvedValue>,
    pub negate: bool,
    pub join: Option<JoinRecipe>,
}

#[derive(Debug)]
pub(super) enum ResolvedNode {
    Leaf(ResolvedCriterion),
    Group {
        link: Link,
        negate: bool,
        children: Vec<ResolvedNode>,
    },
}

impl SearchEngine {
    pub(super) fn prepare_nodes<'a>(
        &'a self,
        catalog: &'a Catalog,
        schema: &'a TableSchema,
        nodes: &'a [CriteriaNode],
    ) -> BoxFuture<'a, Result<Vec<ResolvedNode>>> {
        async move {
            let mut out = Vec::new();
            for node in nodes {
                match node {
                    CriteriaNode::Leaf(criterion) => {
                        if let Some(resolved) =
                            self.prepare_leaf(catalog, schema, criterion).await?
                        {
                            out.push(ResolvedNode::Leaf(resolved));
                        }
                    }
                    CriteriaNode::Group {
                        link,
                        negate,
                        children,
                    } => {
                        let children = self.prepare_nodes(catalog, schema, children).await?;
                        if !children.is_empty() {
                            out.push(ResolvedNode::Group {
                                link: *link,
                                negate: *negate,
                                children,
                            });
                        }
                    }
                }
            }
            Ok(out)
        }
        .boxed()
    }

    async fn prepare_leaf(
        &self,
        catalog: &Catalog,
        schema: &TableSchema,
        criterion: &Criterion,
    ) -> Result<Option<ResolvedCriterion>> {
        let (itemtype, option, join) = match &criterion.meta_itemtype {
            Some(meta) => {
                let Some(resolved) = self.resolve_meta(schema, meta, criterion.option_id)? else {
                    return Ok(None);
                };
                resolved
            }
            None => {
                let Some(option) = catalog.get(criterion.option_id) else {
                    tracing::warn!(
                        itemtype = catalog.itemtype(),
                        option = criterion.option_id,
                        "unknown search option id, dropping criterion"
                    );
                    return Ok(None);
                };
                let join = option.join.as_ref().map(|jc| JoinRecipe {
                    alias: jc.table.clone(),
                    table: jc.table.clone(),
                    kind: match &jc.link {
                        JoinLink::ItemsId => JoinRecipeKind::ItemsId {
                            itemtype: schema.itemtype.clone(),
                        },
                        JoinLink::ForeignKey(fk) => {
                            JoinRecipeKind::ForeignKey { fk: fk.clone() }
                        }
                    },
                    is_meta: false,
                });
                (catalog.itemtype().to_string(), option.clone(), join)
            }
        };

        if !is_kind_valid_for(&option.datatype, criterion.kind) {
            tracing::warn!(
                itemtype = %itemtype,
                option = option.id,
                kind = criterion.kind.as_str(),
                datatype = ?option.datatype,
                "searchtype not valid for datatype, dropping criterion"
            );
            return Ok(None);
        }

        let values = self
            .normalize_values(&option, criterion.kind, &criterion.values)
            .await?;
        if values.is_empty() && criterion.kind != SearchKind::Empty {
            tracing::warn!(
                itemtype = %itemtype,
                option = option.id,
                "no usable value after normalization, dropping criterion"
            );
            return Ok(None);
        }

        Ok(Some(ResolvedCriterion {
            link: criterion.link,
            itemtype,
            option,
            kind: criterion.kind,
            values,
            negate: criterion.negate,
            join,
        }))
    }

    /// Resolve a meta criterion: attach the join path to the foreign item
    /// type's base table, then resolve the option in the foreign catalog.
    fn resolve_meta(
        &self,
        schema: &TableSchema,
        meta_itemtype: &str,
        option_id: u32,
    ) -> Result<Option<(String, SearchOption, Option<JoinRecipe>)>> {
        let foreign = match self.registry.catalog(meta_itemtype) {
            Ok(catalog) => catalog,
            Err(crate::Error::UnknownItemType(_)) => {
                tracing::warn!(meta_itemtype, "unknown meta item type, dropping criterion");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let fk = format!("{}_id", foreign.table());
        if !schema.has_column(&fk) {
            tracing::warn!(
                table = %schema.table,
                meta_itemtype,
                fk = %fk,
                "no join path to meta item type, dropping criterion"
            );
            return Ok(None);
        }

        let Some(option) = foreign.get(option_id) else {
            tracing::warn!(
                meta_itemtype,
                option = option_id,
                "unknown search option id on meta item type, dropping criterion"
            );
            return Ok(None);
        };
        // Capacity options of the foreign type would need a second-level
        // join; meta search stops at the foreign base table.
        if option.join.is_some() || option.table != foreign.table() {
            tracing::warn!(
                meta_itemtype,
                option = option_id,
                "meta criteria are limited to base-table options, dropping criterion"
            );
            return Ok(None);
        }

        let join = JoinRecipe {
            alias: format!("meta_{}", foreign.table()),
            table: foreign.table().to_string(),
            kind: JoinRecipeKind::ForeignKey { fk },
            is_meta: true,
        };
        Ok(Some((
            meta_itemtype.to_string(),
            option.clone(),
            Some(join),
        )))
    }

    pub(super) async fn prepare_filter_nodes(
        &self,
        catalog: &Catalog,
        schema: &TableSchema,
        filters: &[crate::filters::AppliedFilter],
    ) -> Result<Vec<ResolvedNode>> {
        let mut out = Vec::new();
        for applied in filters {
            let Some(provider) = self.filters.get(&applied.filter_id) else {
                tracing::warn!(filter = %applied.filter_id, "unknown filter id, ignoring it");
                continue;
            };
            for fc in provider.criteria(schema, &applied.value) {
                let Some(option) = catalog.by_field(&schema.table, &fc.field) else {
                    tracing::debug!(
                        filter = provider.id(),
                        field = %fc.field,
                        "filter field has no search option, contributing nothing"
                    );
                    continue;
                };
                let criterion = Criterion {
                    link: Link::And,
                    option_id: option.id,
                    kind: fc.kind,
                    values: fc.values.clone(),
                    negate: fc.negate,
                    meta_itemtype: None,
                };
                if let Some(resolved) = self.prepare_leaf(catalog, schema, &criterion).await? {
                    out.push(ResolvedNode::Leaf(resolved));
                }
            }
        }
        Ok(out)
    }
}
