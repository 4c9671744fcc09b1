//! Plan execution through a storage collaborator.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::PgPool;

use crate::plan::{BindValue, QueryPlan};
use crate::{Error, Result};

/// Renders and runs an assembled plan against the target store.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Matching rows as JSON objects, in plan order.
    async fn fetch(&self, plan: &QueryPlan) -> Result<Vec<JsonValue>>;

    /// Unpaged total of matching rows.
    async fn count(&self, plan: &QueryPlan) -> Result<i64>;
}

/// PostgreSQL executor.
pub struct PgQueryExecutor {
    pool: PgPool,
}

impl PgQueryExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

macro_rules! bind_all {
    ($query:expr, $binds:expr) => {{
        let mut query = $query;
        for bind in $binds {
            query = match bind {
                BindValue::Text(v) => query.bind(v),
                BindValue::TextArray(v) => query.bind(v),
                BindValue::Int(v) => query.bind(v),
                BindValue::IntArray(v) => query.bind(v),
                BindValue::Bool(v) => query.bind(v),
                BindValue::Timestamp(v) => query.bind(v),
            };
        }
        query
    }};
}

#[async_trait]
impl QueryExecutor for PgQueryExecutor {
    async fn fetch(&self, plan: &QueryPlan) -> Result<Vec<JsonValue>> {
        let (sql, binds) = plan.render_sql();
        // Row shape follows the plan's select list; row_to_json keeps the
        // executor generic over it.
        let wrapped = format!("SELECT row_to_json(sub) FROM ({}) sub", sql);
        let query = bind_all!(sqlx::query_scalar::<_, JsonValue>(&wrapped), &binds);
        query.fetch_all(&self.pool).await.map_err(|e| {
            tracing::error!(error = %e, sql = %sql, "search query failed");
            Error::Execution(e)
        })
    }

    async fn count(&self, plan: &QueryPlan) -> Result<i64> {
        let (sql, binds) = plan.render_count_sql();
        let query = bind_all!(sqlx::query_scalar::<_, i64>(&sql), &binds);
        query.fetch_one(&self.pool).await.map_err(|e| {
            tracing::error!(error = %e, sql = %sql, "count query failed");
            Error::Execution(e)
        })
    }
}
