//! Capacities: composable schema extensions for item types.
//!
//! A capacity is a pure contributor of search options. Granting a capacity
//! to an item type (built-in or runtime asset definition) extends its
//! catalog with the capacity's fields, reached through a join on a related
//! table. Capacities never generate classes or tables themselves.

use std::sync::Arc;

use super::{DataType, ItemTypeDef, JoinLink, SearchOption};

pub trait Capacity: Send + Sync {
    /// Stable identifier used when asset definitions grant the capacity.
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    /// Search options this capacity contributes to the given item type.
    fn search_options(&self, def: &ItemTypeDef) -> Vec<SearchOption>;
}

/// Antivirus inventory fields, contributed over the `antiviruses` child table.
pub struct AntivirusCapacity;

impl Capacity for AntivirusCapacity {
    fn id(&self) -> &'static str {
        "antivirus"
    }

    fn name(&self) -> &'static str {
        "Antivirus"
    }

    fn search_options(&self, _def: &ItemTypeDef) -> Vec<SearchOption> {
        vec![
            SearchOption::new(160, "antiviruses", "name", "Antivirus name", DataType::String)
                .with_join("antiviruses", JoinLink::ItemsId),
            SearchOption::new(
                161,
                "antiviruses",
                "antivirus_version",
                "Antivirus version",
                DataType::String,
            )
            .with_join("antiviruses", JoinLink::ItemsId),
            SearchOption::new(
                162,
                "antiviruses",
                "signature_version",
                "Signature database version",
                DataType::String,
            )
            .with_join("antiviruses", JoinLink::ItemsId),
            SearchOption::new(
                163,
                "antiviruses",
                "is_uptodate",
                "Antivirus up to date",
                DataType::Bool,
            )
            .with_join("antiviruses", JoinLink::ItemsId),
        ]
    }
}

/// Network port fields, contributed over the `networkports` child table.
pub struct NetworkPortCapacity;

impl Capacity for NetworkPortCapacity {
    fn id(&self) -> &'static str {
        "network_ports"
    }

    fn name(&self) -> &'static str {
        "Network ports"
    }

    fn search_options(&self, _def: &ItemTypeDef) -> Vec<SearchOption> {
        vec![
            SearchOption::new(120, "networkports", "name", "Port name", DataType::String)
                .with_join("networkports", JoinLink::ItemsId),
            SearchOption::new(121, "networkports", "mac", "MAC address", DataType::String)
                .with_join("networkports", JoinLink::ItemsId),
            SearchOption::new(
                122,
                "networkports",
                "logical_number",
                "Port number",
                DataType::Integer,
            )
            .with_join("networkports", JoinLink::ItemsId),
        ]
    }
}

/// Attached-document fields, contributed over the `documents_items` link table.
pub struct DocumentsCapacity;

impl Capacity for DocumentsCapacity {
    fn id(&self) -> &'static str {
        "documents"
    }

    fn name(&self) -> &'static str {
        "Documents"
    }

    fn search_options(&self, _def: &ItemTypeDef) -> Vec<SearchOption> {
        vec![
            SearchOption::new(
                140,
                "documents_items",
                "documents_id",
                "Attached document",
                DataType::Dropdown,
            )
            .with_join("documents_items", JoinLink::ItemsId),
            SearchOption::new(
                141,
                "documents_items",
                "date_creation",
                "Document attach date",
                DataType::DateTime,
            )
            .with_join("documents_items", JoinLink::ItemsId),
        ]
    }
}

/// Capacity implementations shipped with the compiler, in registration order.
pub fn builtin_capacities() -> Vec<Arc<dyn Capacity>> {
    vec![
        Arc::new(AntivirusCapacity),
        Arc::new(NetworkPortCapacity),
        Arc::new(DocumentsCapacity),
    ]
}

#[cfg(test)]
mod tests {
    use super::super::Catalog;
    use super::*;
    use crate::catalog::FieldDef;

    #[test]
    fn capacity_options_extend_the_catalog() {
        let def = ItemTypeDef::new("Computer", "computers")
            .with_field(FieldDef::new(1, "name", "Name", DataType::String))
            .with_capacity(Arc::new(AntivirusCapacity));
        let catalog = Catalog::build(&def).unwrap();
        assert!(catalog.get(161).is_some());
        let opt = catalog.get(163).unwrap();
        assert_eq!(opt.table, "antiviruses");
        assert!(opt.join.is_some());
    }

    #[test]
    fn capacity_ids_are_disjoint_across_builtins() {
        let def = ItemTypeDef::new("Computer", "computers")
            .with_field(FieldDef::new(1, "name", "Name", DataType::String))
            .with_capacity(Arc::new(AntivirusCapacity))
            .with_capacity(Arc::new(NetworkPortCapacity))
            .with_capacity(Arc::new(DocumentsCapacity));
        let catalog = Catalog::build(&def).unwrap();
        assert_eq!(catalog.len(), 1 + 4 + 3 + 2);
    }
}
