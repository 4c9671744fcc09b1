//! Cross-cutting filter providers.
//!
//! A filter is a reusable criterion contributor applied on top of explicit
//! search criteria (location, category, date range, ...). Providers are
//! consulted through one capability set and are polymorphic over it; the
//! engine treats them uniformly. A filter whose target column does not
//! exist on the searched table contributes nothing — absence of a column is
//! a normal "not applicable" condition, never an error.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::catalog::TableSchema;
use crate::criteria::SearchKind;
use crate::plan::{BindValue, JoinSpec};

mod category;
mod date_range;
mod location;
mod manufacturer;

pub use category::CategoryFilter;
pub use date_range::DateRangeFilter;
pub use location::LocationFilter;
pub use manufacturer::ManufacturerFilter;

/// Runtime value carried by one applied filter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Id(i64),
    DateRange {
        #[serde(default)]
        from: Option<DateTime<Utc>>,
        #[serde(default)]
        to: Option<DateTime<Utc>>,
    },
    Text(String),
}

/// One filter activated for a search request.
#[derive(Debug, Clone, Deserialize)]
pub struct AppliedFilter {
    #[serde(rename = "filter")]
    pub filter_id: String,
    pub value: FilterValue,
}

/// A criterion contributed by a filter, addressed by column name rather
/// than option id; the engine maps it onto the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCriterion {
    pub field: String,
    pub kind: SearchKind,
    pub values: Vec<String>,
    pub negate: bool,
}

impl FilterCriterion {
    pub fn new(field: &str, kind: SearchKind, value: String) -> Self {
        Self {
            field: field.to_string(),
            kind,
            values: vec![value],
            negate: false,
        }
    }
}

/// Raw WHERE/JOIN fragments contributed by one applied filter.
#[derive(Debug, Clone, Default)]
pub struct FilterContribution {
    pub where_fragments: Vec<String>,
    pub joins: Vec<JoinSpec>,
}

impl FilterContribution {
    pub fn is_empty(&self) -> bool {
        self.where_fragments.is_empty() && self.joins.is_empty()
    }
}

/// Capability set implemented by every concrete filter.
pub trait SearchFilter: Send + Sync {
    /// Stable identifier used in applied-filter payloads.
    fn id(&self) -> &'static str;

    /// Display label for the rendering surface.
    fn name(&self) -> &'static str;

    /// Criteria to route through the normal resolver pipeline.
    fn criteria(&self, _schema: &TableSchema, _value: &FilterValue) -> Vec<FilterCriterion> {
        Vec::new()
    }

    /// Bespoke WHERE/JOIN fragments for filters the criterion model cannot
    /// express. Binds are pushed onto the plan's bind list.
    fn contribution(
        &self,
        _schema: &TableSchema,
        _value: &FilterValue,
        _binds: &mut Vec<BindValue>,
    ) -> FilterContribution {
        FilterContribution::default()
    }
}

/// Filter providers keyed by id.
pub struct FilterRegistry {
    by_id: HashMap<&'static str, Arc<dyn SearchFilter>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self {
            by_id: HashMap::new(),
        }
    }

    pub fn with_builtin_filters() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LocationFilter));
        registry.register(Arc::new(CategoryFilter));
        registry.register(Arc::new(DateRangeFilter));
        registry.register(Arc::new(ManufacturerFilter));
        registry
    }

    pub fn register(&mut self, filter: Arc<dyn SearchFilter>) {
        self.by_id.insert(filter.id(), filter);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn SearchFilter>> {
        self.by_id.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<&'static str> = self.by_id.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::with_builtin_filters()
    }
}
