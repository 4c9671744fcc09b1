//! End-to-end compile scenarios against the built-in item types.

use std::sync::Arc;

use serde_json::json;
use stockpile_search::catalog::{AssetDefinition, ItemTypeRegistry};
use stockpile_search::config::{ConfigKey, ConfigService};
use stockpile_search::criteria::{parse_criteria_blob, Criterion, Link, SearchKind};
use stockpile_search::filters::{AppliedFilter, FilterValue};
use stockpile_search::hierarchy::MemoryHierarchySource;
use stockpile_search::plan::BindValue;
use stockpile_search::SearchEngine;

fn engine_with_categories() -> SearchEngine {
    // Category tree: 5 -> (8), 8 -> (9); 7 is unrelated.
    let hierarchy = MemoryHierarchySource::new()
        .with_edge("itilcategories", 8, 5)
        .with_edge("itilcategories", 9, 8)
        .with_edge("itilcategories", 7, 3)
        .with_edge("locations", 2, 1);
    SearchEngine::new(
        Arc::new(ItemTypeRegistry::with_builtin_types()),
        Arc::new(hierarchy),
    )
}

fn leaf(criterion: Criterion) -> stockpile_search::criteria::CriteriaNode {
    stockpile_search::criteria::CriteriaNode::Leaf(criterion)
}

#[tokio::test]
async fn ticket_under_category_with_location_filter() {
    let engine = engine_with_categories();

    let criteria = vec![leaf(Criterion::new(7, SearchKind::Under, "5"))];
    let filters = vec![AppliedFilter {
        filter_id: "location".to_string(),
        value: FilterValue::Id(12),
    }];

    let plan = engine.compile("Ticket", &criteria, &filters).await.unwrap();
    let (sql, binds) = plan.render_sql();

    assert!(sql.contains("t.itilcategories_id = ANY($1)"));
    assert!(sql.contains("t.locations_id = $2"));
    assert_eq!(binds[0], BindValue::IntArray(vec![5, 8, 9]));
    assert_eq!(binds[1], BindValue::Int(12));
}

#[tokio::test]
async fn compilation_is_deterministic() {
    let engine = engine_with_categories();

    let criteria = vec![
        leaf(Criterion::new(7, SearchKind::Under, "5")),
        leaf(Criterion::new(21, SearchKind::Contains, "printer").with_link(Link::Or)),
        leaf(Criterion::new(1, SearchKind::Contains, "hp").negated()),
    ];
    let filters = vec![AppliedFilter {
        filter_id: "category".to_string(),
        value: FilterValue::Id(5),
    }];

    let first = engine.compile("Ticket", &criteria, &filters).await.unwrap();
    let second = engine.compile("Ticket", &criteria, &filters).await.unwrap();
    assert_eq!(first.render_sql(), second.render_sql());
    assert_eq!(first.join_count(), second.join_count());
}

#[tokio::test]
async fn two_criteria_over_one_relation_share_a_join() {
    let engine = engine_with_categories();

    // Both options live on the antiviruses child table of Computer.
    let criteria = vec![
        leaf(Criterion::new(160, SearchKind::Contains, "Defender")),
        leaf(Criterion::new(161, SearchKind::Contains, "4.18")),
    ];

    let plan = engine.compile("Computer", &criteria, &[]).await.unwrap();
    assert_eq!(plan.join_count(), 1);
    assert!(plan.has_join("antiviruses"));

    let (sql, binds) = plan.render_sql();
    assert_eq!(sql.matches("LEFT JOIN antiviruses").count(), 1);
    // The polymorphic join binds the itemtype once.
    assert_eq!(binds[0], BindValue::Text("Computer".to_string()));
    assert!(sql.contains("antiviruses.itemtype = $1"));
}

#[tokio::test]
async fn not_applicable_filter_leaves_the_plan_unchanged() {
    let engine = engine_with_categories();
    engine
        .registry()
        .register_asset_definition(&AssetDefinition {
            system_name: "badge".to_string(),
            label: "Badge".to_string(),
            fields: Vec::new(),
            capacities: Vec::new(),
            parent_field: None,
        })
        .unwrap();

    let criteria = vec![leaf(Criterion::new(1, SearchKind::Contains, "blue"))];
    let location = vec![AppliedFilter {
        filter_id: "location".to_string(),
        value: FilterValue::Id(12),
    }];

    let with_filter = engine.compile("Badge", &criteria, &location).await.unwrap();
    let without_filter = engine.compile("Badge", &criteria, &[]).await.unwrap();
    assert_eq!(with_filter.render_sql(), without_filter.render_sql());
}

#[tokio::test]
async fn saved_search_with_deleted_option_id_compiles_without_it() {
    let engine = engine_with_categories();

    let stale = parse_criteria_blob(&json!([
        {"link": "AND", "field": 9999, "searchtype": "contains", "value": "ghost"},
        {"link": "AND", "field": 21, "searchtype": "contains", "value": "printer"},
    ]));
    let fresh = parse_criteria_blob(&json!([
        {"link": "AND", "field": 21, "searchtype": "contains", "value": "printer"},
    ]));

    let from_stale = engine.compile("Ticket", &stale, &[]).await.unwrap();
    let from_fresh = engine.compile("Ticket", &fresh, &[]).await.unwrap();
    assert_eq!(from_stale.render_sql(), from_fresh.render_sql());
}

#[tokio::test]
async fn meta_criterion_joins_the_foreign_base_table_once() {
    let engine = engine_with_categories();

    let criteria = vec![
        leaf(Criterion::new(1, SearchKind::Contains, "Paris").meta("Location")),
        leaf(Criterion::new(16, SearchKind::Contains, "basement").meta("Location")),
    ];

    let plan = engine.compile("Computer", &criteria, &[]).await.unwrap();
    assert!(plan.meta);
    assert_eq!(plan.join_count(), 1);
    assert!(plan.has_join("meta_locations"));

    let (sql, _) = plan.render_sql();
    assert!(sql.contains("LEFT JOIN locations meta_locations ON t.locations_id = meta_locations.id"));
    assert!(sql.contains("meta_locations.name ILIKE $1"));
    assert!(sql.contains("meta_locations.comment ILIKE $2"));
}

#[tokio::test]
async fn meta_criterion_without_join_path_is_dropped() {
    let engine = engine_with_categories();

    // Tickets have no computers_id column, so there is no path to Computer.
    let criteria = vec![
        leaf(Criterion::new(5, SearchKind::Contains, "SN-1").meta("Computer")),
        leaf(Criterion::new(21, SearchKind::Contains, "printer")),
    ];

    let plan = engine.compile("Ticket", &criteria, &[]).await.unwrap();
    assert!(!plan.meta);
    assert_eq!(plan.join_count(), 0);
    let (sql, _) = plan.render_sql();
    assert!(sql.contains("t.content ILIKE $1"));
}

#[tokio::test]
async fn symbolic_status_goes_through_the_override_resolver() {
    let engine = engine_with_categories();

    let criteria = vec![leaf(Criterion::new(12, SearchKind::Equals, "closed"))];
    let plan = engine.compile("Ticket", &criteria, &[]).await.unwrap();
    let (sql, binds) = plan.render_sql();
    assert!(sql.contains("t.status = $1"));
    assert_eq!(binds[0], BindValue::Int(6));
}

#[tokio::test]
async fn nested_group_renders_its_own_parentheses() {
    let engine = engine_with_categories();

    let criteria = vec![
        leaf(Criterion::new(21, SearchKind::Contains, "printer")),
        stockpile_search::criteria::CriteriaNode::Group {
            link: Link::And,
            negate: false,
            children: vec![
                leaf(Criterion::new(12, SearchKind::Equals, "1")),
                leaf(Criterion::new(12, SearchKind::Equals, "2").with_link(Link::Or)),
            ],
        },
    ];

    let plan = engine.compile("Ticket", &criteria, &[]).await.unwrap();
    let (sql, _) = plan.render_sql();
    assert!(sql.contains("(t.status = $2 OR t.status = $3)"));
}

#[tokio::test]
async fn invalid_searchtype_for_datatype_is_dropped_not_miscompiled() {
    let engine = engine_with_categories();

    // `under` on a plain string column is invalid.
    let criteria = vec![
        leaf(Criterion::new(21, SearchKind::Under, "5")),
        leaf(Criterion::new(21, SearchKind::Contains, "printer")),
    ];
    let plan = engine.compile("Ticket", &criteria, &[]).await.unwrap();
    let (sql, binds) = plan.render_sql();
    assert_eq!(binds.len(), 1);
    assert!(sql.contains("t.content ILIKE $1"));
    assert!(!sql.contains("ANY"));
}

#[tokio::test]
async fn configured_limit_is_applied_and_clamped() {
    let config = Arc::new(ConfigService::default());
    config.set(ConfigKey::SearchDefaultLimit, json!(5000));
    let engine = SearchEngine::with_config(
        Arc::new(ItemTypeRegistry::with_builtin_types()),
        Arc::new(MemoryHierarchySource::new()),
        config.clone(),
    );

    let plan = engine.compile("Ticket", &[], &[]).await.unwrap();
    let max: usize = config.get(ConfigKey::SearchMaxLimit);
    assert_eq!(plan.limit, Some(max));

    let (sql, _) = plan.render_sql();
    assert!(sql.ends_with(&format!("LIMIT {}", max)));
}

#[tokio::test]
async fn unknown_filter_id_is_ignored() {
    let engine = engine_with_categories();
    let filters = vec![AppliedFilter {
        filter_id: "astrology".to_string(),
        value: FilterValue::Id(3),
    }];
    let plan = engine.compile("Ticket", &[], &filters).await.unwrap();
    let without = engine.compile("Ticket", &[], &[]).await.unwrap();
    assert_eq!(plan.render_sql(), without.render_sql());
}

#[tokio::test]
async fn under_on_flat_dropdown_is_dropped() {
    let engine = engine_with_categories();
    // manufacturers is not hierarchical.
    let criteria = vec![leaf(Criterion::new(23, SearchKind::Under, "4"))];
    let plan = engine.compile("Computer", &criteria, &[]).await.unwrap();
    let (sql, binds) = plan.render_sql();
    assert!(binds.is_empty());
    assert!(!sql.contains("WHERE"));
}

#[tokio::test]
async fn category_filter_expands_the_subtree() {
    let engine = engine_with_categories();
    let filters = vec![AppliedFilter {
        filter_id: "category".to_string(),
        value: FilterValue::Id(5),
    }];
    let plan = engine.compile("Ticket", &[], &filters).await.unwrap();
    let (sql, binds) = plan.render_sql();
    assert!(sql.contains("t.itilcategories_id = ANY($1)"));
    assert_eq!(binds[0], BindValue::IntArray(vec![5, 8, 9]));
}

#[tokio::test]
async fn manufacturer_filter_contributes_join_and_where() {
    let engine = engine_with_categories();
    let filters = vec![AppliedFilter {
        filter_id: "manufacturer".to_string(),
        value: FilterValue::Text("Dell".to_string()),
    }];
    let plan = engine.compile("Computer", &[], &filters).await.unwrap();
    assert!(plan.has_join("filter_manufacturers"));
    let (sql, _) = plan.render_sql();
    assert!(sql.contains("LEFT JOIN manufacturers filter_manufacturers"));
    assert!(sql.contains("filter_manufacturers.name ILIKE $1"));
}

#[tokio::test]
async fn runtime_asset_definition_is_searchable_with_capacity_fields() {
    let engine = engine_with_categories();
    engine
        .registry()
        .register_asset_definition(&AssetDefinition {
            system_name: "rack".to_string(),
            label: "Rack".to_string(),
            fields: vec![],
            capacities: vec!["network_ports".to_string()],
            parent_field: None,
        })
        .unwrap();

    let criteria = vec![leaf(Criterion::new(121, SearchKind::Contains, "aa:bb"))];
    let plan = engine.compile("Rack", &criteria, &[]).await.unwrap();
    let (sql, binds) = plan.render_sql();
    assert!(sql.contains("FROM assets_rack t"));
    assert!(sql.contains("LEFT JOIN networkports"));
    assert_eq!(binds[0], BindValue::Text("Rack".to_string()));
}

struct StubExecutor;

#[async_trait::async_trait]
impl stockpile_search::QueryExecutor for StubExecutor {
    async fn fetch(
        &self,
        plan: &stockpile_search::plan::QueryPlan,
    ) -> stockpile_search::Result<Vec<serde_json::Value>> {
        let (sql, _) = plan.render_sql();
        Ok(vec![json!({"sql": sql})])
    }

    async fn count(
        &self,
        _plan: &stockpile_search::plan::QueryPlan,
    ) -> stockpile_search::Result<i64> {
        Ok(42)
    }
}

#[tokio::test]
async fn search_compiles_then_delegates_to_the_executor() {
    let engine = engine_with_categories();
    let criteria = vec![leaf(Criterion::new(21, SearchKind::Contains, "printer"))];

    let outcome = engine
        .search(&StubExecutor, "Ticket", &criteria, &[], true)
        .await
        .unwrap();
    assert_eq!(outcome.rows.len(), 1);
    assert_eq!(outcome.total, Some(42));
    let sql = outcome.rows[0]["sql"].as_str().unwrap();
    assert!(sql.contains("t.content ILIKE $1"));
}
