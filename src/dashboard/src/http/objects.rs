// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Browsing of tables, streams, tasks and materialized views.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use guardian_warehouse::fanout;
use guardian_warehouse::project::{self, Field, Projection};
use guardian_warehouse::{quote_literal, Ident, Row};
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::http::{fetch, statement, ApiError, DashboardState};

/// Lists the dimension and fact tables of the fact schema.
pub async fn handle_tables(
    State(state): State<Arc<DashboardState>>,
) -> Result<Json<Value>, ApiError> {
    let schema = &state.layout.fact_schema;
    let batch = [
        statement(format!("SHOW TABLES LIKE 'DIM%' IN SCHEMA {schema};"))?,
        statement(format!("SHOW TABLES LIKE 'FACT_%' IN SCHEMA {schema};"))?,
    ];
    let results = fanout::run_all(&*state.warehouse, &batch)
        .await
        .map_err(|e| ApiError::internal("Error fetching tables", e))?;
    let [dimensions, facts] = &results[..] else {
        return Err(ApiError::internal(
            "Error fetching tables",
            "wrong number of results",
        ));
    };
    Ok(Json(json!({
        "dimensions": project::column(dimensions, "name"),
        "facts": project::column(facts, "name"),
    })))
}

#[derive(Debug, Deserialize)]
pub struct TableQuery {
    table: Option<String>,
}

/// Returns the first rows of a table in the fact schema.
pub async fn handle_table_preview(
    State(state): State<Arc<DashboardState>>,
    Query(query): Query<TableQuery>,
) -> Result<Json<Vec<Row>>, ApiError> {
    let table = match query.table {
        Some(table) if !table.is_empty() => Ident::new(table)?,
        _ => return Err(ApiError::bad_request("Table name required")),
    };
    let sql = format!(
        "SELECT * FROM {} LIMIT 10;",
        state.layout.fact_schema.qualify(&table)
    );
    Ok(Json(fetch(&state, sql, "Error fetching table data").await?))
}

/// Lists the streams of the ingest schema followed by those of the fact
/// schema.
pub async fn handle_streams(
    State(state): State<Arc<DashboardState>>,
) -> Result<Json<Vec<Row>>, ApiError> {
    let batch = [
        statement(format!(
            "SHOW STREAMS IN SCHEMA {};",
            state.layout.ingest_schema
        ))?,
        statement(format!(
            "SHOW STREAMS IN SCHEMA {};",
            state.layout.fact_schema
        ))?,
    ];
    let rows = fanout::run_merge(&*state.warehouse, &batch)
        .await
        .map_err(|e| ApiError::internal("Error fetching streams", e))?;
    Ok(Json(rows))
}

static TASKS: Lazy<Projection> = Lazy::new(|| {
    Projection::new(vec![
        Field::copy("name", "name"),
        Field::copy("schema", "schema_name"),
        Field::copy_or("warehouse", "warehouse", "--"),
        Field::copy_or("schedule", "schedule", "Manual / Hourly"),
        Field::copy_or("state", "state", "--"),
        Field::copy("created_on", "created_on"),
        Field::copy_or("last_run", "last_committed_on", "--"),
        Field::copy_or("predecessors", "predecessors", "--"),
        Field::copy_or("owner", "owner", "--"),
    ])
});

/// Lists the monitored tasks of the fact schema.
pub async fn handle_tasks(
    State(state): State<Arc<DashboardState>>,
) -> Result<Json<Vec<Row>>, ApiError> {
    let sql = format!("SHOW TASKS IN SCHEMA {};", state.layout.fact_schema);
    let rows = fetch(&state, sql, "Error fetching tasks").await?;
    let projection = TASKS
        .clone()
        .allow("name", state.layout.monitored_tasks.iter().cloned());
    Ok(Json(projection.project(&rows)))
}

/// Returns the ten most recent runs of a task.
pub async fn handle_task_history(
    State(state): State<Arc<DashboardState>>,
    Path(task_name): Path<String>,
) -> Result<Json<Vec<Row>>, ApiError> {
    let task = Ident::new(task_name)?;
    let sql = format!(
        r#"SELECT "NAME", "STATE", "QUERY_TEXT", "ERROR_MESSAGE", "SCHEDULED_TIME", "COMPLETED_TIME"
FROM TABLE({}.INFORMATION_SCHEMA.TASK_HISTORY())
WHERE "NAME" ILIKE {}
ORDER BY "SCHEDULED_TIME" DESC
LIMIT 10;"#,
        state.layout.fact_schema.database,
        quote_literal(task.as_str()),
    );
    Ok(Json(
        fetch(&state, sql, "Error fetching task history").await?,
    ))
}

fn validity(invalid: Option<&Value>) -> Value {
    match invalid.and_then(Value::as_str) {
        Some("Y") => json!("Invalid"),
        _ => json!("Valid"),
    }
}

static MATERIALIZED_VIEWS: Lazy<Projection> = Lazy::new(|| {
    Projection::new(vec![
        Field::copy("name", "name"),
        Field::copy("schema_name", "schema_name"),
        Field::copy("database_name", "database_name"),
        Field::copy("created_on", "created_on"),
        Field::copy_or("refreshed_on", "refreshed_on", "--"),
        Field::copy_or("owner", "owner", "--"),
        Field::map("invalid", "invalid", validity),
        Field::copy_or("invalid_reason", "invalid_reason", ""),
        Field::copy("is_secure", "is_secure"),
        Field::copy_or("automatic_clustering", "automatic_clustering", "N"),
        Field::copy_or("behind_by", "behind_by", "0 sec"),
        Field::copy("rows", "rows"),
    ])
});

pub async fn handle_materialized_views(
    State(state): State<Arc<DashboardState>>,
) -> Result<Json<Vec<Row>>, ApiError> {
    let sql = format!(
        "SHOW MATERIALIZED VIEWS IN SCHEMA {};",
        state.layout.ingest_schema
    );
    let rows = fetch(&state, sql, "Error fetching materialized views").await?;
    Ok(Json(MATERIALIZED_VIEWS.project(&rows)))
}

async fn preview(state: &DashboardState, name: String, context: &str) -> Result<Vec<Row>, ApiError> {
    let name = Ident::new(name)?;
    let sql = format!(
        "SELECT * FROM {} LIMIT 20;",
        state.layout.ingest_schema.qualify(&name)
    );
    fetch(state, sql, context).await
}

pub async fn handle_stream_preview(
    State(state): State<Arc<DashboardState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Row>>, ApiError> {
    Ok(Json(preview(&state, name, "Error previewing stream").await?))
}

pub async fn handle_mv_preview(
    State(state): State<Arc<DashboardState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Row>>, ApiError> {
    Ok(Json(preview(&state, name, "Error previewing MV").await?))
}
