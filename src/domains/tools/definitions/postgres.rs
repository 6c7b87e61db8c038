//! PostgreSQL tools: ad-hoc read-only queries and schema introspection.
//!
//! Every statement runs inside a READ ONLY transaction (see
//! [`SqlStore::fetch`]). Introspection queries cast catalog columns to `text`
//! so they decode the same way on every server version.

use serde::Deserialize;

use crate::backends::{BackendId, SqlQuery, SqlStore};
use crate::domains::tools::descriptor::{Acquired, ArgSpec, InvokeResult, ToolDescriptor};
use crate::domains::tools::normalize::RawOutput;

const LIST_TABLES: &str = "SELECT table_name::text AS table_name \
    FROM information_schema.tables \
    WHERE table_schema = $1 \
    ORDER BY table_name";

const DESCRIBE_TABLE: &str = "SELECT column_name::text AS column_name, \
        data_type::text AS data_type, \
        is_nullable::text AS is_nullable, \
        column_default::text AS column_default \
    FROM information_schema.columns \
    WHERE table_schema = $1 AND table_name = $2 \
    ORDER BY ordinal_position";

const LIST_INDEXES: &str = "SELECT indexname::text AS indexname, indexdef \
    FROM pg_indexes \
    WHERE schemaname = $1 AND tablename = $2 \
    ORDER BY indexname";

fn schema_arg() -> ArgSpec {
    ArgSpec::string("schema", "Schema name").default("public")
}

// ============================================================================
// Query
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct PgQueryParams {
    pub sql: String,
}

/// Runs caller-supplied SQL read-only and returns the rows.
pub struct PgQueryTool;

impl PgQueryTool {
    pub const NAME: &'static str = "pg_query";
    pub const DESCRIPTION: &'static str =
        "Run a read-only SQL query against PostgreSQL and return the rows.";

    pub async fn execute(params: PgQueryParams, store: &dyn SqlStore) -> InvokeResult {
        let rows = store.fetch(SqlQuery::new(params.sql)).await?;
        Ok(RawOutput::Rows(rows))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Postgres,
            vec![ArgSpec::string("sql", "SQL statement").required()],
            |params: PgQueryParams, acquired: Acquired| async move {
                let store = acquired.sql(BackendId::Postgres)?;
                Self::execute(params, store.as_ref()).await
            },
        )
    }
}

// ============================================================================
// Introspection
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct PgListTablesParams {
    pub schema: String,
}

pub struct PgListTablesTool;

impl PgListTablesTool {
    pub const NAME: &'static str = "pg_list_tables";
    pub const DESCRIPTION: &'static str = "List all tables in a PostgreSQL schema.";

    pub async fn execute(params: PgListTablesParams, store: &dyn SqlStore) -> InvokeResult {
        let rows = store
            .fetch(SqlQuery::new(LIST_TABLES).bind_text(params.schema))
            .await?;
        Ok(RawOutput::Rows(rows))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Postgres,
            vec![schema_arg()],
            |params: PgListTablesParams, acquired: Acquired| async move {
                let store = acquired.sql(BackendId::Postgres)?;
                Self::execute(params, store.as_ref()).await
            },
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PgTableParams {
    pub table_name: String,
    pub schema: String,
}

/// Describes the columns of a table, or says the table does not exist.
pub struct PgDescribeTableTool;

impl PgDescribeTableTool {
    pub const NAME: &'static str = "pg_describe_table";
    pub const DESCRIPTION: &'static str =
        "Describe columns of a PostgreSQL table (name, type, nullable, default).";

    pub async fn execute(params: PgTableParams, store: &dyn SqlStore) -> InvokeResult {
        let query = SqlQuery::new(DESCRIBE_TABLE)
            .bind_text(params.schema.as_str())
            .bind_text(params.table_name.as_str());
        let rows = store.fetch(query).await?;
        if rows.is_empty() {
            return Ok(RawOutput::Text(format!(
                "Table '{}.{}' not found.",
                params.schema, params.table_name
            )));
        }
        Ok(RawOutput::Rows(rows))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Postgres,
            vec![ArgSpec::string("table_name", "Table name").required(), schema_arg()],
            |params: PgTableParams, acquired: Acquired| async move {
                let store = acquired.sql(BackendId::Postgres)?;
                Self::execute(params, store.as_ref()).await
            },
        )
    }
}

pub struct PgListIndexesTool;

impl PgListIndexesTool {
    pub const NAME: &'static str = "pg_list_indexes";
    pub const DESCRIPTION: &'static str = "List indexes on a PostgreSQL table.";

    pub async fn execute(params: PgTableParams, store: &dyn SqlStore) -> InvokeResult {
        let query = SqlQuery::new(LIST_INDEXES)
            .bind_text(params.schema)
            .bind_text(params.table_name);
        Ok(RawOutput::Rows(store.fetch(query).await?))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Postgres,
            vec![ArgSpec::string("table_name", "Table name").required(), schema_arg()],
            |params: PgTableParams, acquired: Acquired| async move {
                let store = acquired.sql(BackendId::Postgres)?;
                Self::execute(params, store.as_ref()).await
            },
        )
    }
}

/// Every PostgreSQL tool.
pub fn tools() -> Vec<ToolDescriptor> {
    vec![
        PgQueryTool::descriptor(),
        PgListTablesTool::descriptor(),
        PgDescribeTableTool::descriptor(),
        PgListIndexesTool::descriptor(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemorySql;
    use crate::backends::sql::SqlParam;
    use crate::backends::{RowSet, SqlValue};

    fn table_params() -> PgTableParams {
        PgTableParams {
            table_name: "users".to_string(),
            schema: "public".to_string(),
        }
    }

    #[tokio::test]
    async fn test_describe_missing_table() {
        let store = MemorySql::rows(RowSet::default());
        let output = PgDescribeTableTool::execute(table_params(), &store).await.unwrap();
        assert_eq!(
            output,
            RawOutput::Text("Table 'public.users' not found.".to_string())
        );
        assert_eq!(
            store.queries()[0].params,
            vec![
                SqlParam::Text("public".to_string()),
                SqlParam::Text("users".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_describe_returns_rows() {
        let rows = RowSet {
            columns: vec!["column_name".to_string(), "data_type".to_string()],
            rows: vec![vec![
                SqlValue::Text("id".to_string()),
                SqlValue::Text("integer".to_string()),
            ]],
        };
        let store = MemorySql::rows(rows.clone());
        let output = PgDescribeTableTool::execute(table_params(), &store).await.unwrap();
        assert_eq!(output, RawOutput::Rows(rows));
    }

    #[tokio::test]
    async fn test_query_passes_sql_through() {
        let store = MemorySql::rows(RowSet::default());
        let output = PgQueryTool::execute(
            PgQueryParams {
                sql: "SELECT 1".to_string(),
            },
            &store,
        )
        .await
        .unwrap();
        assert_eq!(output, RawOutput::Rows(RowSet::default()));
        assert_eq!(store.queries()[0].sql, "SELECT 1");
        assert!(store.queries()[0].params.is_empty());
    }

    #[tokio::test]
    async fn test_list_tables_binds_schema() {
        let store = MemorySql::rows(RowSet::default());
        PgListTablesTool::execute(
            PgListTablesParams {
                schema: "audit".to_string(),
            },
            &store,
        )
        .await
        .unwrap();
        let query = &store.queries()[0];
        assert!(query.sql.contains("information_schema.tables"));
        assert_eq!(query.params, vec![SqlParam::Text("audit".to_string())]);
    }
}
