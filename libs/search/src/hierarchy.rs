//! Iterative hierarchy closure expansion for under/over searches.
//!
//! Descendants and ancestors are computed by repeatedly following
//! parent/child links, one frontier per round trip, instead of a recursive
//! SQL query. The iterative contract is deliberate: it stays portable across
//! SQL dialects and gives explicit control over cycle handling in malformed
//! hierarchy data (a visited set plus a depth cap guarantee termination).

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::catalog::is_safe_identifier;
use crate::{Error, Result};

/// Provides parent/child links of a hierarchical table.
#[async_trait]
pub trait HierarchySource: Send + Sync {
    /// Ids whose `parent_field` is one of `parents`.
    async fn children_of(
        &self,
        table: &str,
        parent_field: &str,
        parents: &[i64],
    ) -> Result<Vec<i64>>;

    /// Parent id of `id`, or None at a root.
    async fn parent_of(&self, table: &str, parent_field: &str, id: i64) -> Result<Option<i64>>;
}

/// The node itself plus all of its descendants.
pub async fn expand_under(
    source: &dyn HierarchySource,
    table: &str,
    parent_field: &str,
    root: i64,
    max_depth: usize,
) -> Result<Vec<i64>> {
    let mut seen: HashSet<i64> = HashSet::new();
    seen.insert(root);
    let mut frontier = vec![root];

    for _ in 0..max_depth {
        if frontier.is_empty() {
            break;
        }
        let children = source.children_of(table, parent_field, &frontier).await?;
        frontier = children
            .into_iter()
            .filter(|id| seen.insert(*id))
            .collect();
    }
    if !frontier.is_empty() {
        tracing::warn!(
            table,
            parent_field,
            root,
            max_depth,
            "hierarchy closure truncated at depth cap"
        );
    }

    let mut out: Vec<i64> = seen.into_iter().collect();
    out.sort_unstable();
    Ok(out)
}

/// The node itself plus all of its ancestors.
pub async fn expand_over(
    source: &dyn HierarchySource,
    table: &str,
    parent_field: &str,
    node: i64,
    max_depth: usize,
) -> Result<Vec<i64>> {
    let mut seen: HashSet<i64> = HashSet::new();
    seen.insert(node);
    let mut current = node;

    for _ in 0..max_depth {
        match source.parent_of(table, parent_field, current).await? {
            Some(parent) if seen.insert(parent) => current = parent,
            // Root reached, or a cycle closed on an already-seen node.
            _ => break,
        }
    }

    let mut out: Vec<i64> = seen.into_iter().collect();
    out.sort_unstable();
    Ok(out)
}

/// PostgreSQL-backed hierarchy source.
///
/// Table and column names come from catalog declarations, not user input,
/// but are still validated before interpolation.
pub struct PgHierarchySource {
    pool: PgPool,
}

impl PgHierarchySource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn check_identifiers(table: &str, parent_field: &str) -> Result<()> {
        if !is_safe_identifier(table) || !is_safe_identifier(parent_field) {
            return Err(Error::Hierarchy {
                table: table.to_string(),
                field: parent_field.to_string(),
                message: "unsafe identifier".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl HierarchySource for PgHierarchySource {
    async fn children_of(
        &self,
        table: &str,
        parent_field: &str,
        parents: &[i64],
    ) -> Result<Vec<i64>> {
        Self::check_identifiers(table, parent_field)?;
        let sql = format!("SELECT id FROM {} WHERE {} = ANY($1)", table, parent_field);
        let rows: Vec<(i64,)> = sqlx::query_as(&sql)
            .bind(parents)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn parent_of(&self, table: &str, parent_field: &str, id: i64) -> Result<Option<i64>> {
        Self::check_identifiers(table, parent_field)?;
        let sql = format!("SELECT {} FROM {} WHERE id = $1", parent_field, table);
        let row: Option<(Option<i64>,)> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.and_then(|(parent,)| parent).filter(|p| *p != 0))
    }
}

/// In-memory hierarchy source for tests and fixture-driven tooling.
#[derive(Debug, Default)]
pub struct MemoryHierarchySource {
    /// (table, child id) -> parent id
    parents: std::collections::HashMap<(String, i64), i64>,
}

impl MemoryHierarchySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_edge(mut self, table: &str, child: i64, parent: i64) -> Self {
        self.add_edge(table, child, parent);
        self
    }

    pub fn add_edge(&mut self, table: &str, child: i64, parent: i64) {
        self.parents.insert((table.to_string(), child), parent);
    }
}

#[async_trait]
impl HierarchySource for MemoryHierarchySource {
    async fn children_of(
        &self,
        table: &str,
        _parent_field: &str,
        parents: &[i64],
    ) -> Result<Vec<i64>> {
        let mut out: Vec<i64> = self
            .parents
            .iter()
            .filter(|((t, _), parent)| t == table && parents.contains(parent))
            .map(|((_, child), _)| *child)
            .collect();
        out.sort_unstable();
        Ok(out)
    }

    async fn parent_of(&self, table: &str, _parent_field: &str, id: i64) -> Result<Option<i64>> {
        Ok(self.parents.get(&(table.to_string(), id)).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> MemoryHierarchySource {
        // 1 -> (2, 3), 2 -> (4), 4 -> (5)
        MemoryHierarchySource::new()
            .with_edge("locations", 2, 1)
            .with_edge("locations", 3, 1)
            .with_edge("locations", 4, 2)
            .with_edge("locations", 5, 4)
    }

    #[tokio::test]
    async fn under_includes_node_and_all_descendants() {
        let ids = expand_under(&tree(), "locations", "locations_id", 1, 50)
            .await
            .unwrap();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn under_of_mid_node_excludes_ancestors_and_siblings() {
        let ids = expand_under(&tree(), "locations", "locations_id", 2, 50)
            .await
            .unwrap();
        assert_eq!(ids, vec![2, 4, 5]);
    }

    #[tokio::test]
    async fn over_is_the_dual_of_under() {
        let ids = expand_over(&tree(), "locations", "locations_id", 5, 50)
            .await
            .unwrap();
        assert_eq!(ids, vec![1, 2, 4, 5]);
    }

    #[tokio::test]
    async fn leaf_under_is_just_the_node() {
        let ids = expand_under(&tree(), "locations", "locations_id", 3, 50)
            .await
            .unwrap();
        assert_eq!(ids, vec![3]);
    }

    #[tokio::test]
    async fn cyclic_data_terminates() {
        // 10 -> 11 -> 12 -> 10
        let source = MemoryHierarchySource::new()
            .with_edge("locations", 11, 10)
            .with_edge("locations", 12, 11)
            .with_edge("locations", 10, 12);
        let under = expand_under(&source, "locations", "locations_id", 10, 50)
            .await
            .unwrap();
        assert_eq!(under, vec![10, 11, 12]);
        let over = expand_over(&source, "locations", "locations_id", 10, 50)
            .await
            .unwrap();
        assert_eq!(over, vec![10, 11, 12]);
    }

    #[tokio::test]
    async fn depth_cap_truncates_instead_of_looping() {
        let mut source = MemoryHierarchySource::new();
        for i in 1..100i64 {
            source.add_edge("locations", i + 1, i);
        }
        let ids = expand_under(&source, "locations", "locations_id", 1, 10)
            .await
            .unwrap();
        assert_eq!(ids.len(), 11);
    }
}
