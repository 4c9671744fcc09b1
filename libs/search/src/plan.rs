//! Assembled query plans and their SQL rendering.
//!
//! A `QueryPlan` is the compiler's output: select list, base table, joins
//! deduplicated by alias, a boolean WHERE tree, and positional bind values.
//! Rendering is pure; executing the rendered SQL is the storage
//! collaborator's job.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::criteria::Link;

/// Bind values for `sqlx` queries.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(String),
    TextArray(Vec<String>),
    Int(i64),
    IntArray(Vec<i64>),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

pub(crate) fn push_text(binds: &mut Vec<BindValue>, value: String) -> usize {
    binds.push(BindValue::Text(value));
    binds.len()
}

pub(crate) fn push_int(binds: &mut Vec<BindValue>, value: i64) -> usize {
    binds.push(BindValue::Int(value));
    binds.len()
}

pub(crate) fn push_int_array(binds: &mut Vec<BindValue>, values: Vec<i64>) -> usize {
    binds.push(BindValue::IntArray(values));
    binds.len()
}

pub(crate) fn push_bool(binds: &mut Vec<BindValue>, value: bool) -> usize {
    binds.push(BindValue::Bool(value));
    binds.len()
}

pub(crate) fn push_timestamp(binds: &mut Vec<BindValue>, value: DateTime<Utc>) -> usize {
    binds.push(BindValue::Timestamp(value));
    binds.len()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Left,
    Inner,
}

impl JoinKind {
    fn sql(&self) -> &'static str {
        match self {
            Self::Left => "LEFT JOIN",
            Self::Inner => "INNER JOIN",
        }
    }
}

/// One join of the plan, keyed by a stable alias.
///
/// Two criteria traversing the same relation produce the same alias and
/// therefore a single join entry.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub alias: String,
    pub table: String,
    /// Full ON condition; may embed `$n` placeholders for binds pushed when
    /// the join was created.
    pub on: String,
    pub kind: JoinKind,
}

impl JoinSpec {
    pub fn left(alias: &str, table: &str, on: String) -> Self {
        Self {
            alias: alias.to_string(),
            table: table.to_string(),
            on,
            kind: JoinKind::Left,
        }
    }
}

/// Boolean WHERE tree. Fragments are already-rendered SQL conditions; each
/// child carries the connector linking it to the previous sibling (the
/// first child's connector is ignored).
#[derive(Debug, Clone, PartialEq)]
pub enum WhereNode {
    Fragment(String),
    Group {
        negate: bool,
        children: Vec<(Link, WhereNode)>,
    },
}

impl WhereNode {
    pub fn group() -> Self {
        Self::Group {
            negate: false,
            children: Vec::new(),
        }
    }

    pub fn negated_group() -> Self {
        Self::Group {
            negate: true,
            children: Vec::new(),
        }
    }

    pub fn push(&mut self, link: Link, node: WhereNode) {
        match self {
            Self::Group { children, .. } => children.push((link, node)),
            Self::Fragment(_) => panic!("cannot push into a fragment"),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Fragment(_) => false,
            Self::Group { children, .. } => children.iter().all(|(_, c)| c.is_empty()),
        }
    }

    /// Render the tree, or None when no fragment survives.
    pub fn render(&self) -> Option<String> {
        match self {
            Self::Fragment(sql) => Some(sql.clone()),
            Self::Group { negate, children } => {
                let parts: Vec<(Link, String)> = children
                    .iter()
                    .filter_map(|(link, child)| child.render().map(|sql| (*link, sql)))
                    .collect();
                if parts.is_empty() {
                    return None;
                }

                let mut joined = String::new();
                for (i, (link, sql)) in parts.iter().enumerate() {
                    if i > 0 {
                        joined.push(' ');
                        joined.push_str(link.sql());
                        joined.push(' ');
                    }
                    joined.push_str(sql);
                }
                if parts.len() > 1 {
                    joined = format!("({})", joined);
                }
                if *negate {
                    Some(format!("NOT ({})", joined))
                } else {
                    Some(joined)
                }
            }
        }
    }
}

/// The compiled description of one search query.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub select: Vec<String>,
    pub from: String,
    pub base_alias: String,
    joins: BTreeMap<String, JoinSpec>,
    pub where_tree: WhereNode,
    pub binds: Vec<BindValue>,
    /// Whether a cross-itemtype join is active.
    pub meta: bool,
    pub limit: Option<usize>,
}

impl QueryPlan {
    pub fn new(from: &str) -> Self {
        Self {
            select: Vec::new(),
            from: from.to_string(),
            base_alias: "t".to_string(),
            joins: BTreeMap::new(),
            where_tree: WhereNode::group(),
            binds: Vec::new(),
            meta: false,
            limit: None,
        }
    }

    /// Add a join unless one with the same alias is already present.
    ///
    /// Returns true when the join was inserted. The first join registered
    /// for an alias wins; later duplicates are no-ops by construction (the
    /// alias is derived from the traversed relation, so duplicates describe
    /// the same join).
    pub fn add_join(&mut self, join: JoinSpec) -> bool {
        if self.joins.contains_key(&join.alias) {
            return false;
        }
        self.joins.insert(join.alias.clone(), join);
        true
    }

    pub fn has_join(&self, alias: &str) -> bool {
        self.joins.contains_key(alias)
    }

    pub fn joins(&self) -> impl Iterator<Item = &JoinSpec> {
        self.joins.values()
    }

    pub fn join_count(&self) -> usize {
        self.joins.len()
    }

    fn render_from(&self, sql: &mut String) {
        sql.push_str(" FROM ");
        sql.push_str(&self.from);
        sql.push(' ');
        sql.push_str(&self.base_alias);
        for join in self.joins.values() {
            sql.push(' ');
            sql.push_str(join.kind.sql());
            sql.push(' ');
            sql.push_str(&join.table);
            sql.push(' ');
            sql.push_str(&join.alias);
            sql.push_str(" ON ");
            sql.push_str(&join.on);
        }
    }

    fn render_where(&self, sql: &mut String) {
        if let Some(clause) = self.where_tree.render() {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }
    }

    /// Render the plan to executable SQL plus its bind values.
    pub fn render_sql(&self) -> (String, Vec<BindValue>) {
        let mut sql = String::from("SELECT ");
        if self.select.is_empty() {
            sql.push_str(&format!("{}.id", self.base_alias));
        } else {
            sql.push_str(&self.select.join(", "));
        }
        self.render_from(&mut sql);
        self.render_where(&mut sql);
        sql.push_str(&format!(" ORDER BY {}.id ASC", self.base_alias));
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        (sql, self.binds.clone())
    }

    /// Render the matching COUNT query (same joins and WHERE, no paging).
    pub fn render_count_sql(&self) -> (String, Vec<BindValue>) {
        let mut sql = format!("SELECT COUNT(DISTINCT {}.id)", self.base_alias);
        self.render_from(&mut sql);
        self.render_where(&mut sql);
        (sql, self.binds.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan() -> QueryPlan {
        let mut plan = QueryPlan::new("tickets");
        plan.select = vec!["t.id".to_string(), "t.name".to_string()];
        plan.where_tree
            .push(Link::And, WhereNode::Fragment("t.status = $1".to_string()));
        push_int(&mut plan.binds, 2);
        plan
    }

    #[test]
    fn renders_base_query() {
        let (sql, binds) = sample_plan().render_sql();
        assert_eq!(
            sql,
            "SELECT t.id, t.name FROM tickets t WHERE t.status = $1 ORDER BY t.id ASC"
        );
        assert_eq!(binds, vec![BindValue::Int(2)]);
    }

    #[test]
    fn joins_are_deduplicated_by_alias() {
        let mut plan = sample_plan();
        let join = JoinSpec::left(
            "meta_computers",
            "computers",
            "t.computers_id = meta_computers.id".to_string(),
        );
        assert!(plan.add_join(join.clone()));
        assert!(!plan.add_join(join));
        assert_eq!(plan.join_count(), 1);

        let (sql, _) = plan.render_sql();
        assert_eq!(sql.matches("LEFT JOIN computers").count(), 1);
    }

    #[test]
    fn join_order_is_deterministic() {
        let mut a = sample_plan();
        let mut b = sample_plan();
        for plan in [&mut a, &mut b] {
            plan.add_join(JoinSpec::left("zz", "zebras", "t.zebras_id = zz.id".to_string()));
            plan.add_join(JoinSpec::left("aa", "apples", "t.apples_id = aa.id".to_string()));
        }
        assert_eq!(a.render_sql().0, b.render_sql().0);
        let (sql, _) = a.render_sql();
        let apples = sql.find("apples").unwrap();
        let zebras = sql.find("zebras").unwrap();
        assert!(apples < zebras);
    }

    #[test]
    fn empty_where_tree_renders_no_where() {
        let plan = QueryPlan::new("tickets");
        let (sql, binds) = plan.render_sql();
        assert_eq!(sql, "SELECT t.id FROM tickets t ORDER BY t.id ASC");
        assert!(binds.is_empty());
    }

    #[test]
    fn mixed_links_render_in_sequence() {
        let mut group = WhereNode::group();
        group.push(Link::And, WhereNode::Fragment("a".to_string()));
        group.push(Link::And, WhereNode::Fragment("b".to_string()));
        group.push(Link::Or, WhereNode::Fragment("c".to_string()));
        assert_eq!(group.render().unwrap(), "(a AND b OR c)");
    }

    #[test]
    fn nested_groups_render_with_parentheses() {
        let mut plan = QueryPlan::new("tickets");
        let mut group = WhereNode::group();
        group.push(Link::And, WhereNode::Fragment("t.status = 1".to_string()));
        group.push(Link::Or, WhereNode::Fragment("t.status = 2".to_string()));
        plan.where_tree
            .push(Link::And, WhereNode::Fragment("t.name IS NOT NULL".to_string()));
        plan.where_tree.push(Link::And, group);
        let (sql, _) = plan.render_sql();
        assert!(sql.contains("WHERE (t.name IS NOT NULL AND (t.status = 1 OR t.status = 2))"));
    }

    #[test]
    fn negated_group_wraps_with_not() {
        let mut group = WhereNode::negated_group();
        group.push(Link::And, WhereNode::Fragment("t.status = 1".to_string()));
        assert_eq!(group.render().unwrap(), "NOT (t.status = 1)");
    }

    #[test]
    fn empty_nested_group_disappears() {
        let mut plan = QueryPlan::new("tickets");
        plan.where_tree.push(Link::And, WhereNode::group());
        plan.where_tree
            .push(Link::Or, WhereNode::Fragment("t.status = 1".to_string()));
        let (sql, _) = plan.render_sql();
        assert!(sql.contains("WHERE t.status = 1"));
        assert!(!sql.contains(" OR "));
    }

    #[test]
    fn count_query_shares_joins_and_where() {
        let mut plan = sample_plan();
        plan.add_join(JoinSpec::left("ap", "antiviruses", "ap.items_id = t.id".to_string()));
        plan.limit = Some(50);
        let (sql, _) = plan.render_count_sql();
        assert!(sql.starts_with("SELECT COUNT(DISTINCT t.id)"));
        assert!(sql.contains("LEFT JOIN antiviruses ap"));
        assert!(sql.contains("WHERE t.status = $1"));
        assert!(!sql.contains("LIMIT"));
    }
}
