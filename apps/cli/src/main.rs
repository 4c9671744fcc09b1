//! Stockpile CLI: compile and run searches from the terminal.
//!
//! `stockpile options` lists the search options of an item type,
//! `stockpile compile` prints the SQL a request compiles to (dry run), and
//! `stockpile run` executes it against PostgreSQL.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgPoolOptions;

use stockpile_search::catalog::{AssetDefinition, ItemTypeRegistry};
use stockpile_search::config::{ConfigService, SearchConfig};
use stockpile_search::criteria::{parse_criteria_blob, CriteriaNode};
use stockpile_search::filters::{AppliedFilter, FilterValue};
use stockpile_search::hierarchy::{HierarchySource, MemoryHierarchySource, PgHierarchySource};
use stockpile_search::plan::BindValue;
use stockpile_search::{PgQueryExecutor, SearchEngine};

mod logging;

#[derive(Parser)]
#[command(name = "stockpile", about = "Stockpile search compiler", version)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Asset definition file (JSON array) to register before running
    #[arg(long, global = true)]
    definitions: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the search options of an item type
    Options {
        #[arg(long)]
        itemtype: String,
    },

    /// Compile a search request and print the SQL (dry run)
    Compile {
        #[arg(long)]
        itemtype: String,

        /// Criteria file (JSON list); empty request when omitted
        #[arg(long)]
        criteria: Option<PathBuf>,

        /// Applied filter, as id=value (repeatable)
        #[arg(long = "filter")]
        filters: Vec<String>,

        /// Hierarchy fixture file for under/over expansion
        #[arg(long)]
        hierarchy: Option<PathBuf>,

        /// Also print the COUNT query
        #[arg(long)]
        count: bool,
    },

    /// Compile and execute against PostgreSQL (DATABASE_URL)
    Run {
        #[arg(long)]
        itemtype: String,

        #[arg(long)]
        criteria: Option<PathBuf>,

        #[arg(long = "filter")]
        filters: Vec<String>,

        /// Also fetch the unpaged total
        #[arg(long)]
        total: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _guard = logging::init_logging(cli.log_json)?;

    let registry = Arc::new(ItemTypeRegistry::with_builtin_types());
    if let Some(path) = &cli.definitions {
        register_definitions(&registry, path)?;
    }
    let config = Arc::new(ConfigService::new(SearchConfig::load()?));

    match cli.command {
        Command::Options { itemtype } => {
            let catalog = registry.catalog(&itemtype)?;
            for option in catalog.iter() {
                println!(
                    "{:>6}  {:<28}  {:<10}  {}.{}",
                    option.id,
                    option.name,
                    format!("{:?}", option.datatype).to_lowercase(),
                    option.table,
                    option.field
                );
            }
        }

        Command::Compile {
            itemtype,
            criteria,
            filters,
            hierarchy,
            count,
        } => {
            let criteria = load_criteria(criteria.as_deref())?;
            let filters = parse_filters(&filters)?;
            let hierarchy: Arc<dyn HierarchySource> = match hierarchy {
                Some(path) => Arc::new(load_hierarchy(&path)?),
                None => Arc::new(MemoryHierarchySource::new()),
            };

            let engine = SearchEngine::with_config(registry, hierarchy, config);
            let plan = engine.compile(&itemtype, &criteria, &filters).await?;

            let (sql, binds) = plan.render_sql();
            println!("{}", sql);
            print_binds(&binds);
            if count {
                let (count_sql, _) = plan.render_count_sql();
                println!();
                println!("{}", count_sql);
            }
        }

        Command::Run {
            itemtype,
            criteria,
            filters,
            total,
        } => {
            let criteria = load_criteria(criteria.as_deref())?;
            let filters = parse_filters(&filters)?;

            let database_url = std::env::var("DATABASE_URL")
                .context("DATABASE_URL must be set for `stockpile run`")?;
            let pool = PgPoolOptions::new()
                .max_connections(4)
                .connect(&database_url)
                .await
                .context("failed to connect to the database")?;

            let hierarchy = Arc::new(PgHierarchySource::new(pool.clone()));
            let executor = PgQueryExecutor::new(pool);
            let engine = SearchEngine::with_config(registry, hierarchy, config);

            let outcome = engine
                .search(&executor, &itemtype, &criteria, &filters, total)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e.user_message()))?;

            for row in &outcome.rows {
                println!("{}", row);
            }
            if let Some(total) = outcome.total {
                eprintln!("total: {}", total);
            }
        }
    }

    Ok(())
}

fn register_definitions(registry: &ItemTypeRegistry, path: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let definitions: Vec<AssetDefinition> =
        serde_json::from_str(&raw).context("malformed asset definition file")?;
    for definition in &definitions {
        let name = registry.register_asset_definition(definition)?;
        tracing::info!(itemtype = %name, "registered asset definition");
    }
    Ok(())
}

fn load_criteria(path: Option<&Path>) -> anyhow::Result<Vec<CriteriaNode>> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => return Ok(Vec::new()),
    };
    let blob: JsonValue = serde_json::from_str(&raw).context("criteria file is not JSON")?;
    Ok(parse_criteria_blob(&blob))
}

/// Parse `id=value` filter arguments. Integer values become id filters,
/// JSON objects date ranges, anything else text.
fn parse_filters(raw: &[String]) -> anyhow::Result<Vec<AppliedFilter>> {
    let mut out = Vec::new();
    for item in raw {
        let Some((id, value)) = item.split_once('=') else {
            bail!("filter '{}' is not of the form id=value", item);
        };
        let value = if let Ok(n) = value.parse::<i64>() {
            FilterValue::Id(n)
        } else if value.trim_start().starts_with('{') {
            serde_json::from_str(value)
                .with_context(|| format!("filter '{}' has a malformed range value", id))?
        } else {
            FilterValue::Text(value.to_string())
        };
        out.push(AppliedFilter {
            filter_id: id.to_string(),
            value,
        });
    }
    Ok(out)
}

/// Hierarchy fixture: `{"<table>": {"<child id>": <parent id>}}`.
fn load_hierarchy(path: &Path) -> anyhow::Result<MemoryHierarchySource> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let fixture: JsonValue = serde_json::from_str(&raw).context("hierarchy file is not JSON")?;
    let Some(tables) = fixture.as_object() else {
        bail!("hierarchy file must be a JSON object keyed by table");
    };

    let mut source = MemoryHierarchySource::new();
    for (table, edges) in tables {
        let Some(edges) = edges.as_object() else {
            bail!("hierarchy for '{}' must map child ids to parent ids", table);
        };
        for (child, parent) in edges {
            let child: i64 = child
                .parse()
                .with_context(|| format!("bad child id '{}' in '{}'", child, table))?;
            let parent = parent
                .as_i64()
                .with_context(|| format!("bad parent id for child {} in '{}'", child, table))?;
            source.add_edge(table, child, parent);
        }
    }
    Ok(source)
}

fn print_binds(binds: &[BindValue]) {
    for (i, bind) in binds.iter().enumerate() {
        println!("  ${} = {:?}", i + 1, bind);
    }
}
