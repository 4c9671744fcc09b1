//! Field catalogs: declarative search option lists per item type.
//!
//! A `Catalog` is the ordered set of searchable fields ("search options") an
//! item type exposes. Catalogs are declared at registration time and extended
//! by the capacities granted to the item type; they are cached by the
//! registry and snapshotted per compile.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

mod capacity;
mod registry;

pub use capacity::{
    builtin_capacities, AntivirusCapacity, Capacity, DocumentsCapacity, NetworkPortCapacity,
};
pub use registry::{AssetDefinition, CustomFieldDef, DropdownTable, ItemTypeRegistry};

/// Option id range reserved for fields of runtime-defined asset types.
pub const CUSTOM_OPTION_BASE: u32 = 45000;

/// Semantic type of a searchable field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Integer,
    Decimal,
    Bool,
    Date,
    DateTime,
    Dropdown,
    ItemLink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDataTypeError;

impl FromStr for DataType {
    type Err = ParseDataTypeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "integer" => Ok(Self::Integer),
            "decimal" => Ok(Self::Decimal),
            "bool" => Ok(Self::Bool),
            "date" => Ok(Self::Date),
            "datetime" => Ok(Self::DateTime),
            "dropdown" => Ok(Self::Dropdown),
            "itemlink" => Ok(Self::ItemLink),
            _ => Err(ParseDataTypeError),
        }
    }
}

impl DataType {
    pub fn try_from_str(s: &str) -> Option<Self> {
        Self::from_str(s).ok()
    }
}

/// How a search option's table is reached from the searched item's base table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinLink {
    /// Child rows keyed polymorphically: `child.items_id = t.id AND child.itemtype = '<itemtype>'`.
    ItemsId,
    /// The base table holds a foreign key to the joined table: `t.<fk> = j.id`.
    ForeignKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinClause {
    pub table: String,
    pub link: JoinLink,
}

/// Declarative descriptor of one searchable field.
///
/// Identified by `(itemtype, id)`; ids are stable once published because
/// saved searches reference options by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOption {
    pub id: u32,
    /// Table the field lives on. Equal to the item type's base table unless
    /// the option was contributed by a capacity over a related table.
    pub table: String,
    pub field: String,
    pub name: String,
    pub datatype: DataType,
    /// SQL expression replacing the plain column reference. `TABLE.` is
    /// substituted with the effective alias at compile time.
    pub computation: Option<String>,
    /// Join required to reach `table` when it is not the base table.
    pub join: Option<JoinClause>,
}

impl SearchOption {
    pub fn new(id: u32, table: &str, field: &str, name: &str, datatype: DataType) -> Self {
        Self {
            id,
            table: table.to_string(),
            field: field.to_string(),
            name: name.to_string(),
            datatype,
            computation: None,
            join: None,
        }
    }

    pub fn with_computation(mut self, expr: &str) -> Self {
        self.computation = Some(expr.to_string());
        self
    }

    pub fn with_join(mut self, table: &str, link: JoinLink) -> Self {
        self.join = Some(JoinClause {
            table: table.to_string(),
            link,
        });
        self
    }

    /// SQL expression for this option under the given table alias.
    pub fn column_expr(&self, alias: &str) -> String {
        match &self.computation {
            Some(expr) => expr.replace("TABLE.", &format!("{}.", alias)),
            None => format!("{}.{}", alias, self.field),
        }
    }
}

/// Ordered, immutable search option catalog of one item type.
///
/// Iteration order is ascending option id, so catalog output (and anything
/// derived from it, select lists included) is deterministic.
#[derive(Debug, Clone)]
pub struct Catalog {
    itemtype: String,
    table: String,
    options: BTreeMap<u32, SearchOption>,
    by_field: BTreeMap<(String, String), u32>,
}

impl Catalog {
    pub(crate) fn build(def: &ItemTypeDef) -> Result<Self> {
        let mut options: BTreeMap<u32, SearchOption> = BTreeMap::new();
        let mut by_field = BTreeMap::new();

        let mut insert = |opt: SearchOption| -> Result<()> {
            if let Some(existing) = options.get(&opt.id) {
                return Err(Error::Catalog {
                    itemtype: def.name.clone(),
                    message: format!(
                        "duplicate search option id {} ({} vs {})",
                        opt.id, existing.field, opt.field
                    ),
                });
            }
            by_field.insert((opt.table.clone(), opt.field.clone()), opt.id);
            options.insert(opt.id, opt);
            Ok(())
        };

        for field in &def.fields {
            insert(field.to_option(&def.table))?;
        }
        for capacity in &def.capacities {
            for opt in capacity.search_options(def) {
                insert(opt)?;
            }
        }

        Ok(Self {
            itemtype: def.name.clone(),
            table: def.table.clone(),
            options,
            by_field,
        })
    }

    pub fn itemtype(&self) -> &str {
        &self.itemtype
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn get(&self, id: u32) -> Option<&SearchOption> {
        self.options.get(&id)
    }

    /// Look up an option by the (table, column) pair it maps to.
    pub fn by_field(&self, table: &str, field: &str) -> Option<&SearchOption> {
        self.by_field
            .get(&(table.to_string(), field.to_string()))
            .and_then(|id| self.options.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SearchOption> {
        self.options.values()
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

/// One declared column of an item type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub option_id: u32,
    pub column: String,
    pub label: String,
    pub datatype: DataType,
    #[serde(default)]
    pub computation: Option<String>,
}

impl FieldDef {
    pub fn new(option_id: u32, column: &str, label: &str, datatype: DataType) -> Self {
        Self {
            option_id,
            column: column.to_string(),
            label: label.to_string(),
            datatype,
            computation: None,
        }
    }

    pub fn computed(mut self, expr: &str) -> Self {
        self.computation = Some(expr.to_string());
        self
    }

    fn to_option(&self, table: &str) -> SearchOption {
        let mut opt = SearchOption::new(
            self.option_id,
            table,
            &self.column,
            &self.label,
            self.datatype.clone(),
        );
        opt.computation = self.computation.clone();
        opt
    }
}

/// Definition of one item type: base table, declared fields, hierarchy
/// column, granted capacities.
#[derive(Clone)]
pub struct ItemTypeDef {
    pub name: String,
    pub table: String,
    /// Self-referencing parent column for hierarchical types.
    pub parent_field: Option<String>,
    pub fields: Vec<FieldDef>,
    pub capacities: Vec<Arc<dyn Capacity>>,
}

impl std::fmt::Debug for ItemTypeDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemTypeDef")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("parent_field", &self.parent_field)
            .field("fields", &self.fields.len())
            .field(
                "capacities",
                &self
                    .capacities
                    .iter()
                    .map(|c| c.id())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ItemTypeDef {
    pub fn new(name: &str, table: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            parent_field: None,
            fields: Vec::new(),
            capacities: Vec::new(),
        }
    }

    pub fn with_parent_field(mut self, field: &str) -> Self {
        self.parent_field = Some(field.to_string());
        self
    }

    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_capacity(mut self, capacity: Arc<dyn Capacity>) -> Self {
        self.capacities.push(capacity);
        self
    }

    /// Columns present on the base table. Capacity options live on related
    /// tables and do not show up here.
    pub fn columns(&self) -> BTreeSet<String> {
        let mut cols: BTreeSet<String> = BTreeSet::new();
        cols.insert("id".to_string());
        for f in &self.fields {
            if f.computation.is_none() {
                cols.insert(f.column.clone());
            }
        }
        if let Some(pf) = &self.parent_field {
            cols.insert(pf.clone());
        }
        cols
    }
}

/// Column-level view of an item type, consumed by filter providers to decide
/// applicability without touching the database.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub itemtype: String,
    pub table: String,
    pub columns: BTreeSet<String>,
    pub parent_field: Option<String>,
}

impl TableSchema {
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }
}

/// Table name a foreign key column points to, by naming convention
/// (`locations_id` -> `locations`). Returns None for columns that are not
/// foreign keys under the convention.
pub fn table_for_foreign_key(column: &str) -> Option<&str> {
    let table = column.strip_suffix("_id")?;
    if table.is_empty() {
        return None;
    }
    Some(table)
}

/// Identifiers interpolated into SQL (table and column names out of catalog
/// declarations) must stay in this restricted alphabet.
pub fn is_safe_identifier(s: &str) -> bool {
    if s.is_empty() || s.len() > 64 {
        return false;
    }
    let mut chars = s.chars();
    let first = chars.next().unwrap();
    if !first.is_ascii_lowercase() {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_rejects_duplicate_option_ids() {
        let def = ItemTypeDef::new("Widget", "widgets")
            .with_field(FieldDef::new(1, "name", "Name", DataType::String))
            .with_field(FieldDef::new(1, "serial", "Serial", DataType::String));
        let err = Catalog::build(&def).unwrap_err();
        assert!(matches!(err, Error::Catalog { .. }));
    }

    #[test]
    fn catalog_iterates_in_option_id_order() {
        let def = ItemTypeDef::new("Widget", "widgets")
            .with_field(FieldDef::new(19, "date_mod", "Last update", DataType::DateTime))
            .with_field(FieldDef::new(1, "name", "Name", DataType::String))
            .with_field(FieldDef::new(2, "id", "ID", DataType::Integer));
        let catalog = Catalog::build(&def).unwrap();
        let ids: Vec<u32> = catalog.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![1, 2, 19]);
    }

    #[test]
    fn every_declared_option_maps_to_a_column_or_computation() {
        let def = ItemTypeDef::new("Widget", "widgets")
            .with_field(FieldDef::new(1, "name", "Name", DataType::String))
            .with_field(
                FieldDef::new(900, "full_label", "Full label", DataType::String)
                    .computed("CONCAT(TABLE.name, ' / ', TABLE.serial)"),
            );
        let catalog = Catalog::build(&def).unwrap();
        let columns = def.columns();
        for opt in catalog.iter() {
            assert!(
                columns.contains(&opt.field) || opt.computation.is_some(),
                "option {} maps to nothing",
                opt.id
            );
        }
    }

    #[test]
    fn computed_option_substitutes_alias() {
        let opt = SearchOption::new(900, "widgets", "full_label", "Full label", DataType::String)
            .with_computation("CONCAT(TABLE.name, ' / ', TABLE.serial)");
        assert_eq!(opt.column_expr("t"), "CONCAT(t.name, ' / ', t.serial)");
    }

    #[test]
    fn foreign_key_convention() {
        assert_eq!(table_for_foreign_key("locations_id"), Some("locations"));
        assert_eq!(table_for_foreign_key("itilcategories_id"), Some("itilcategories"));
        assert_eq!(table_for_foreign_key("name"), None);
        assert_eq!(table_for_foreign_key("_id"), None);
    }

    #[test]
    fn identifier_safety() {
        assert!(is_safe_identifier("locations_id"));
        assert!(is_safe_identifier("assets_rack42"));
        assert!(!is_safe_identifier("Locations"));
        assert!(!is_safe_identifier("loc;drop table"));
        assert!(!is_safe_identifier(""));
    }
}
