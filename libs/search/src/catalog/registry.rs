//! Item type registry and catalog cache.
//!
//! The registry owns every known item type definition: the built-in ones
//! declared below and runtime asset definitions registered by
//! administrators. Catalogs are built lazily per item type and cached for
//! the process lifetime; registration of a definition invalidates only the
//! affected entry. Reads hand out `Arc` snapshots so an invalidation midway
//! through a compile never corrupts it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Deserialize;

use super::{
    builtin_capacities, is_safe_identifier, Capacity, Catalog, DataType, FieldDef, ItemTypeDef,
    TableSchema, CUSTOM_OPTION_BASE,
};
use crate::{Error, Result};

/// A dropdown target table and its hierarchy column, if hierarchical.
#[derive(Debug, Clone)]
pub struct DropdownTable {
    pub table: String,
    pub parent_field: Option<String>,
}

/// Runtime definition of a custom asset type.
///
/// Registering one creates a searchable item type backed by the
/// `assets_<system_name>` table, with a catalog generated from the declared
/// fields plus the granted capacities. Field order is append-only: option
/// ids are assigned from [`CUSTOM_OPTION_BASE`] in declaration order and
/// must stay stable for saved searches.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetDefinition {
    pub system_name: String,
    pub label: String,
    #[serde(default)]
    pub fields: Vec<CustomFieldDef>,
    /// Capacity ids, resolved against the registered capacity implementations.
    #[serde(default)]
    pub capacities: Vec<String>,
    /// When set, the asset table carries a self-referencing parent column of
    /// this name and supports under/over searches.
    #[serde(default)]
    pub parent_field: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomFieldDef {
    pub name: String,
    pub label: String,
    pub datatype: DataType,
}

pub struct ItemTypeRegistry {
    defs: RwLock<HashMap<String, Arc<ItemTypeDef>>>,
    catalogs: RwLock<HashMap<String, Arc<Catalog>>>,
    capacities: RwLock<HashMap<&'static str, Arc<dyn Capacity>>>,
    dropdowns: RwLock<HashMap<String, DropdownTable>>,
}

impl ItemTypeRegistry {
    /// Empty registry with the built-in capacity implementations available.
    pub fn new() -> Self {
        let registry = Self {
            defs: RwLock::new(HashMap::new()),
            catalogs: RwLock::new(HashMap::new()),
            capacities: RwLock::new(HashMap::new()),
            dropdowns: RwLock::new(HashMap::new()),
        };
        for capacity in builtin_capacities() {
            registry.register_capacity(capacity);
        }
        registry
    }

    /// Registry pre-loaded with the standard inventory item types.
    pub fn with_builtin_types() -> Self {
        let registry = Self::new();
        for def in builtin_item_types(&registry) {
            registry.register_item_type(def);
        }
        for dropdown in builtin_dropdown_tables() {
            registry.register_dropdown_table(dropdown);
        }
        registry
    }

    pub fn register_capacity(&self, capacity: Arc<dyn Capacity>) {
        self.capacities
            .write()
            .unwrap()
            .insert(capacity.id(), capacity);
    }

    pub fn capacity(&self, id: &str) -> Option<Arc<dyn Capacity>> {
        self.capacities.read().unwrap().get(id).cloned()
    }

    pub fn register_item_type(&self, def: ItemTypeDef) {
        let name = def.name.clone();
        self.defs.write().unwrap().insert(name.clone(), Arc::new(def));
        self.invalidate(&name);
    }

    pub fn register_dropdown_table(&self, dropdown: DropdownTable) {
        self.dropdowns
            .write()
            .unwrap()
            .insert(dropdown.table.clone(), dropdown);
    }

    /// Create an item type from a runtime asset definition.
    ///
    /// Returns the item type name under which the asset is searchable.
    pub fn register_asset_definition(&self, definition: &AssetDefinition) -> Result<String> {
        if !is_safe_identifier(&definition.system_name) {
            return Err(Error::InvalidDefinition(format!(
                "asset system name '{}' is not a valid identifier",
                definition.system_name
            )));
        }

        let table = format!("assets_{}", definition.system_name);
        let mut def = ItemTypeDef::new(&definition.label, &table);

        if let Some(parent_field) = &definition.parent_field {
            if !is_safe_identifier(parent_field) {
                return Err(Error::InvalidDefinition(format!(
                    "parent field '{}' is not a valid identifier",
                    parent_field
                )));
            }
            def = def.with_parent_field(parent_field);
        }

        def = def
            .with_field(FieldDef::new(1, "name", "Name", DataType::ItemLink))
            .with_field(FieldDef::new(2, "id", "ID", DataType::Integer));

        for (index, field) in definition.fields.iter().enumerate() {
            if !is_safe_identifier(&field.name) {
                return Err(Error::InvalidDefinition(format!(
                    "field name '{}' is not a valid identifier",
                    field.name
                )));
            }
            def = def.with_field(FieldDef::new(
                CUSTOM_OPTION_BASE + index as u32,
                &field.name,
                &field.label,
                field.datatype.clone(),
            ));
        }

        for capacity_id in &definition.capacities {
            let Some(capacity) = self.capacity(capacity_id) else {
                return Err(Error::InvalidDefinition(format!(
                    "unknown capacity '{}'",
                    capacity_id
                )));
            };
            def = def.with_capacity(capacity);
        }

        // Building now surfaces option id collisions at registration time
        // instead of on the first search against the new type.
        Catalog::build(&def)?;

        let name = def.name.clone();
        if def.parent_field.is_some() {
            self.register_dropdown_table(DropdownTable {
                table: def.table.clone(),
                parent_field: def.parent_field.clone(),
            });
        }
        self.register_item_type(def);
        Ok(name)
    }

    pub fn item_type(&self, name: &str) -> Result<Arc<ItemTypeDef>> {
        self.defs
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownItemType(name.to_string()))
    }

    pub fn item_type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.defs.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Catalog for an item type, built on first use and cached.
    pub fn catalog(&self, name: &str) -> Result<Arc<Catalog>> {
        {
            let catalogs = self.catalogs.read().unwrap();
            if let Some(catalog) = catalogs.get(name) {
                tracing::debug!(itemtype = name, "catalog cache hit");
                return Ok(catalog.clone());
            }
        }

        let def = self.item_type(name)?;
        let catalog = Arc::new(Catalog::build(&def)?);
        self.catalogs
            .write()
            .unwrap()
            .insert(name.to_string(), catalog.clone());
        tracing::debug!(itemtype = name, options = catalog.len(), "catalog built");
        Ok(catalog)
    }

    pub fn schema(&self, name: &str) -> Result<TableSchema> {
        let def = self.item_type(name)?;
        Ok(TableSchema {
            itemtype: def.name.clone(),
            table: def.table.clone(),
            columns: def.columns(),
            parent_field: def.parent_field.clone(),
        })
    }

    /// Hierarchy column of a dropdown target table, when the table is
    /// hierarchical. Item type base tables are consulted as well so meta and
    /// dropdown criteria share one lookup.
    pub fn parent_field_of_table(&self, table: &str) -> Option<String> {
        if let Some(dropdown) = self.dropdowns.read().unwrap().get(table) {
            return dropdown.parent_field.clone();
        }
        let defs = self.defs.read().unwrap();
        defs.values()
            .find(|def| def.table == table)
            .and_then(|def| def.parent_field.clone())
    }

    /// Base table of a registered item type, by item type name.
    pub fn table_of(&self, name: &str) -> Result<String> {
        Ok(self.item_type(name)?.table.clone())
    }

    pub fn invalidate(&self, name: &str) {
        self.catalogs.write().unwrap().remove(name);
    }

    pub fn invalidate_all(&self) {
        self.catalogs.write().unwrap().clear();
    }
}

impl Default for ItemTypeRegistry {
    fn default() -> Self {
        Self::with_builtin_types()
    }
}

fn builtin_item_types(registry: &ItemTypeRegistry) -> Vec<ItemTypeDef> {
    let documents = registry
        .capacity("documents")
        .expect("builtin capacity registered");
    let antivirus = registry
        .capacity("antivirus")
        .expect("builtin capacity registered");
    let network_ports = registry
        .capacity("network_ports")
        .expect("builtin capacity registered");

    vec![
        ItemTypeDef::new("Ticket", "tickets")
            .with_field(FieldDef::new(1, "name", "Title", DataType::ItemLink))
            .with_field(FieldDef::new(2, "id", "ID", DataType::Integer))
            .with_field(FieldDef::new(7, "itilcategories_id", "Category", DataType::Dropdown))
            .with_field(FieldDef::new(12, "status", "Status", DataType::Integer))
            .with_field(FieldDef::new(15, "date", "Opening date", DataType::DateTime))
            .with_field(FieldDef::new(19, "date_mod", "Last update", DataType::DateTime))
            .with_field(FieldDef::new(21, "content", "Description", DataType::String))
            .with_field(FieldDef::new(83, "locations_id", "Location", DataType::Dropdown))
            .with_capacity(documents.clone()),
        ItemTypeDef::new("Computer", "computers")
            .with_field(FieldDef::new(1, "name", "Name", DataType::ItemLink))
            .with_field(FieldDef::new(2, "id", "ID", DataType::Integer))
            .with_field(FieldDef::new(3, "locations_id", "Location", DataType::Dropdown))
            .with_field(FieldDef::new(5, "serial", "Serial number", DataType::String))
            .with_field(FieldDef::new(19, "date_mod", "Last update", DataType::DateTime))
            .with_field(FieldDef::new(23, "manufacturers_id", "Manufacturer", DataType::Dropdown))
            .with_field(
                FieldDef::new(900, "inventory_label", "Inventory label", DataType::String)
                    .computed("CONCAT(TABLE.name, ' / ', TABLE.serial)"),
            )
            .with_capacity(antivirus)
            .with_capacity(network_ports)
            .with_capacity(documents),
        ItemTypeDef::new("Location", "locations")
            .with_parent_field("locations_id")
            .with_field(FieldDef::new(1, "name", "Name", DataType::ItemLink))
            .with_field(FieldDef::new(2, "id", "ID", DataType::Integer))
            .with_field(FieldDef::new(13, "locations_id", "Parent location", DataType::Dropdown))
            .with_field(FieldDef::new(16, "comment", "Comments", DataType::String)),
    ]
}

fn builtin_dropdown_tables() -> Vec<DropdownTable> {
    vec![
        DropdownTable {
            table: "locations".to_string(),
            parent_field: Some("locations_id".to_string()),
        },
        DropdownTable {
            table: "itilcategories".to_string(),
            parent_field: Some("itilcategories_id".to_string()),
        },
        DropdownTable {
            table: "manufacturers".to_string(),
            parent_field: None,
        },
        DropdownTable {
            table: "documents".to_string(),
            parent_field: None,
        },
        DropdownTable {
            table: "users".to_string(),
            parent_field: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_item_type_is_a_catalog_error() {
        let registry = ItemTypeRegistry::with_builtin_types();
        let err = registry.catalog("Frobnicator").unwrap_err();
        assert!(matches!(err, Error::UnknownItemType(_)));
    }

    #[test]
    fn builtin_catalogs_have_unique_ids() {
        let registry = ItemTypeRegistry::with_builtin_types();
        for name in registry.item_type_names() {
            // Catalog::build rejects duplicates, so building at all is the check.
            let catalog = registry.catalog(&name).unwrap();
            assert!(!catalog.is_empty());
        }
    }

    #[test]
    fn catalog_is_cached_and_snapshot_survives_invalidation() {
        let registry = ItemTypeRegistry::with_builtin_types();
        let first = registry.catalog("Ticket").unwrap();
        let second = registry.catalog("Ticket").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        registry.invalidate("Ticket");
        // The held snapshot is still fully usable after invalidation.
        assert!(first.get(7).is_some());
        let rebuilt = registry.catalog("Ticket").unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
    }

    #[test]
    fn asset_definition_generates_catalog_with_capacities() {
        let registry = ItemTypeRegistry::with_builtin_types();
        let definition = AssetDefinition {
            system_name: "rack".to_string(),
            label: "Rack".to_string(),
            fields: vec![
                CustomFieldDef {
                    name: "height_units".to_string(),
                    label: "Height (U)".to_string(),
                    datatype: DataType::Integer,
                },
                CustomFieldDef {
                    name: "room".to_string(),
                    label: "Room".to_string(),
                    datatype: DataType::String,
                },
            ],
            capacities: vec!["network_ports".to_string()],
            parent_field: None,
        };
        let name = registry.register_asset_definition(&definition).unwrap();
        assert_eq!(name, "Rack");

        let catalog = registry.catalog("Rack").unwrap();
        assert_eq!(catalog.table(), "assets_rack");
        assert!(catalog.get(CUSTOM_OPTION_BASE).is_some());
        assert!(catalog.get(CUSTOM_OPTION_BASE + 1).is_some());
        // Capacity options came along.
        assert!(catalog.get(121).is_some());
    }

    #[test]
    fn asset_definition_rejects_bad_identifiers() {
        let registry = ItemTypeRegistry::with_builtin_types();
        let definition = AssetDefinition {
            system_name: "Rack; DROP".to_string(),
            label: "Rack".to_string(),
            fields: Vec::new(),
            capacities: Vec::new(),
            parent_field: None,
        };
        assert!(registry.register_asset_definition(&definition).is_err());
    }

    #[test]
    fn asset_definition_with_unknown_capacity_fails() {
        let registry = ItemTypeRegistry::with_builtin_types();
        let definition = AssetDefinition {
            system_name: "rack".to_string(),
            label: "Rack".to_string(),
            fields: Vec::new(),
            capacities: vec!["teleportation".to_string()],
            parent_field: None,
        };
        let err = registry.register_asset_definition(&definition).unwrap_err();
        assert!(matches!(err, Error::InvalidDefinition(_)));
    }

    #[test]
    fn hierarchical_tables_expose_parent_fields() {
        let registry = ItemTypeRegistry::with_builtin_types();
        assert_eq!(
            registry.parent_field_of_table("locations").as_deref(),
            Some("locations_id")
        );
        assert_eq!(registry.parent_field_of_table("manufacturers"), None);
        assert_eq!(registry.parent_field_of_table("nonexistent"), None);
    }
}
