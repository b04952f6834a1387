// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Account-level information: version, session context, credit usage and
//! the names offered by the context picker.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use guardian_warehouse::project::{self, is_present, Field, Projection};
use guardian_warehouse::Row;
use once_cell::sync::Lazy;
use serde_json::{json, Value};

use crate::http::{fetch, ApiError, DashboardState};

pub async fn handle_version(
    State(state): State<Arc<DashboardState>>,
) -> Result<Json<Row>, ApiError> {
    let rows = fetch(
        &state,
        "SELECT CURRENT_VERSION() AS VERSION;".into(),
        "Error running query",
    )
    .await?;
    Ok(Json(rows.into_iter().next().unwrap_or_default()))
}

/// Reports the current role, warehouse, database and schema of the session.
///
/// Always asks the warehouse, so the answer reflects any context change
/// made since startup.
pub async fn handle_env_details(
    State(state): State<Arc<DashboardState>>,
) -> Result<Json<Row>, ApiError> {
    let sql = "SELECT CURRENT_ROLE() AS role, \
               CURRENT_WAREHOUSE() AS warehouse, \
               CURRENT_DATABASE() AS database, \
               CURRENT_SCHEMA() AS schema;";
    let rows = fetch(&state, sql.into(), "Error fetching environment details").await?;
    Ok(Json(rows.into_iter().next().unwrap_or_default()))
}

static RESOURCE_MONITOR: Lazy<Projection> = Lazy::new(|| {
    Projection::new(vec![
        Field::copy("name", "name"),
        Field::copy_or("usedCredits", "used_credits", 0),
        Field::copy_or("creditQuota", "credit_quota", 100),
        Field::copy("remainingCredits", "remaining_credits"),
        Field::copy("frequency", "frequency"),
        Field::copy("startTime", "start_time"),
        Field::copy_or("endTime", "end_time", "Cycle Active"),
        Field::copy("notifyAt", "notify_at"),
        Field::copy("suspendAt", "suspend_at"),
        Field::copy("suspendImmediateAt", "suspend_immediately_at"),
        Field::copy("createdOn", "created_on"),
        Field::copy("owner", "owner"),
        Field::copy("notifyUsers", "notify_users"),
    ])
});

/// Interprets a numeric cell, which the warehouse may report as text.
fn as_f64(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// Formats `used` as a percentage of `quota` with one decimal place.
fn percent_used(used: Option<&Value>, quota: Option<&Value>) -> String {
    format!("{:.1}", as_f64(used) / as_f64(quota) * 100.0)
}

pub async fn handle_resource_monitor(
    State(state): State<Arc<DashboardState>>,
) -> Result<Response, ApiError> {
    let rows = fetch(
        &state,
        "SHOW RESOURCE MONITORS;".into(),
        "Error fetching monitor data",
    )
    .await?;
    let monitor = rows
        .iter()
        .find(|row| row.get_str("name") == Some(state.layout.resource_monitor.as_str()));
    let Some(monitor) = monitor else {
        return Ok(Json(json!({ "message": "Resource monitor not found." })).into_response());
    };
    let mut snapshot = RESOURCE_MONITOR.project_row(monitor);
    let percent = percent_used(snapshot.get("usedCredits"), snapshot.get("creditQuota"));
    snapshot.insert("percentUsed", percent);
    Ok(Json(snapshot).into_response())
}

/// Reports the row count of the configured table.
pub async fn handle_rowcount(
    State(state): State<Arc<DashboardState>>,
) -> Result<Json<Value>, ApiError> {
    let context = "Error fetching row count";
    let sql = format!(
        "SELECT COUNT(*) AS total FROM {};",
        state.layout.rowcount_table
    );
    let rows = fetch(&state, sql, context)
        .await
        .map_err(ApiError::json_message)?;
    let Some(row) = rows.first() else {
        return Err(ApiError::internal(context, "no rows returned").json_message());
    };
    let count = ["TOTAL", "TOTAL_COUNT"]
        .into_iter()
        .filter_map(|column| row.get(column))
        .find(|v| is_present(v))
        .or_else(|| row.values().next())
        .cloned()
        .unwrap_or(Value::Null);
    Ok(Json(json!({ "after_count": count })))
}

async fn names(state: &DashboardState, sql: &str, context: &str) -> Result<Json<Vec<Value>>, ApiError> {
    let rows = fetch(state, sql.into(), context).await?;
    Ok(Json(project::column(&rows, "name")))
}

pub async fn handle_warehouses(
    State(state): State<Arc<DashboardState>>,
) -> Result<Json<Vec<Value>>, ApiError> {
    names(&state, "SHOW WAREHOUSES;", "Error fetching warehouses").await
}

pub async fn handle_databases(
    State(state): State<Arc<DashboardState>>,
) -> Result<Json<Vec<Value>>, ApiError> {
    names(&state, "SHOW DATABASES;", "Error fetching databases").await
}

pub async fn handle_schemas(
    State(state): State<Arc<DashboardState>>,
) -> Result<Json<Vec<Value>>, ApiError> {
    names(&state, "SHOW SCHEMAS;", "Error fetching schemas").await
}

pub async fn handle_roles(
    State(state): State<Arc<DashboardState>>,
) -> Result<Json<Vec<Value>>, ApiError> {
    names(&state, "SHOW ROLES;", "Error fetching roles").await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_used() {
        assert_eq!(percent_used(Some(&json!(25)), Some(&json!(100))), "25.0");
        assert_eq!(
            percent_used(Some(&json!("12.5")), Some(&json!("50.00"))),
            "25.0"
        );
        assert_eq!(percent_used(Some(&json!(1)), Some(&json!(3))), "33.3");
        assert_eq!(percent_used(None, Some(&json!(100))), "NaN");
    }
}
