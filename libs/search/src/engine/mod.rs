//! Search engine: resolve, normalize, assemble, execute.
//!
//! `compile` is the query assembler of the crate: it resolves criteria
//! against a catalog snapshot, normalizes values (expanding hierarchy
//! closures), merges filter contributions, and produces one `QueryPlan`.
//! Unresolvable criteria are dropped with a warning rather than failing the
//! whole search — partial results beat a blank page when one saved filter
//! goes stale.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use serde_json::Value as JsonValue;

use crate::catalog::ItemTypeRegistry;
use crate::config::{ConfigKey, ConfigService};
use crate::criteria::CriteriaNode;
use crate::filters::{AppliedFilter, FilterRegistry};
use crate::hierarchy::HierarchySource;
use crate::plan::QueryPlan;
use crate::resolver::ResolverRegistry;
use crate::Result;

mod assemble;
mod execute;
mod normalize;
mod resolve;

pub use execute::{PgQueryExecutor, QueryExecutor};

type ClosureKey = (String, String, bool, i64);

/// Compiles search requests into query plans and runs them through a
/// storage executor.
pub struct SearchEngine {
    registry: Arc<ItemTypeRegistry>,
    resolvers: ResolverRegistry,
    filters: FilterRegistry,
    hierarchy: Arc<dyn HierarchySource>,
    config: Arc<ConfigService>,
    closure_cache: Mutex<LruCache<ClosureKey, Arc<Vec<i64>>>>,
}

/// Rows plus optional total, as returned by [`SearchEngine::search`].
#[derive(Debug)]
pub struct SearchOutcome {
    pub rows: Vec<JsonValue>,
    pub total: Option<i64>,
}

impl SearchEngine {
    pub fn new(registry: Arc<ItemTypeRegistry>, hierarchy: Arc<dyn HierarchySource>) -> Self {
        Self::with_config(registry, hierarchy, Arc::new(ConfigService::default()))
    }

    pub fn with_config(
        registry: Arc<ItemTypeRegistry>,
        hierarchy: Arc<dyn HierarchySource>,
        config: Arc<ConfigService>,
    ) -> Self {
        let cache_size: usize = config.get(ConfigKey::HierarchyCacheSize);
        let cache_size = NonZeroUsize::new(cache_size.max(1)).unwrap();
        Self {
            registry,
            resolvers: ResolverRegistry::with_builtin_overrides(),
            filters: FilterRegistry::with_builtin_filters(),
            hierarchy,
            config,
            closure_cache: Mutex::new(LruCache::new(cache_size)),
        }
    }

    pub fn registry(&self) -> &Arc<ItemTypeRegistry> {
        &self.registry
    }

    pub fn resolvers_mut(&mut self) -> &mut ResolverRegistry {
        &mut self.resolvers
    }

    pub fn filters_mut(&mut self) -> &mut FilterRegistry {
        &mut self.filters
    }

    /// Drop cached closures and catalogs after a definition change.
    pub fn invalidate(&self) {
        self.closure_cache.lock().unwrap().clear();
        self.registry.invalidate_all();
    }

    /// Compile a search request into a query plan.
    ///
    /// Pure with respect to its inputs plus the catalog snapshot taken at
    /// entry: a concurrent definition change affects later compiles only.
    pub async fn compile(
        &self,
        itemtype: &str,
        criteria: &[CriteriaNode],
        filters: &[AppliedFilter],
    ) -> Result<QueryPlan> {
        let catalog = self.registry.catalog(itemtype)?;
        let schema = self.registry.schema(itemtype)?;

        let nodes = self.prepare_nodes(&catalog, &schema, criteria).await?;
        let filter_nodes = self.prepare_filter_nodes(&catalog, &schema, filters).await?;

        let mut plan = self.assemble(&schema, &catalog, nodes, filter_nodes, filters);

        let default_limit: usize = self.config.get(ConfigKey::SearchDefaultLimit);
        let max_limit: usize = self.config.get(ConfigKey::SearchMaxLimit);
        plan.limit = Some(default_limit.min(max_limit));
        Ok(plan)
    }

    /// Compile and execute, optionally counting the unpaged total.
    pub async fn search(
        &self,
        executor: &dyn QueryExecutor,
        itemtype: &str,
        criteria: &[CriteriaNode],
        filters: &[AppliedFilter],
        with_total: bool,
    ) -> Result<SearchOutcome> {
        let plan = self.compile(itemtype, criteria, filters).await?;
        let rows = executor.fetch(&plan).await?;
        let total = if with_total {
            Some(executor.count(&plan).await?)
        } else {
            None
        };
        Ok(SearchOutcome { rows, total })
    }
}
