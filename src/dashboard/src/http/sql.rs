// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Execution of caller-supplied SQL.
//!
//! These routes are privileged: the text is sent to the warehouse verbatim
//! and runs with the session's role. They can be turned off entirely.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use guardian_warehouse::{Row, Statement};
use serde::Deserialize;
use tracing::warn;

use crate::http::{ApiError, DashboardState, JsonOrForm};

const DISABLED: &str = "raw SQL execution is disabled";

#[derive(Debug, Deserialize)]
pub struct CustomQueryRequest {
    query: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawQueryRequest {
    sql: Option<String>,
}

fn nonempty(sql: Option<String>) -> Option<Statement> {
    sql.and_then(|sql| Statement::new(sql).ok())
}

/// Runs `{query}`, reporting failures as `{"error": ...}`.
pub async fn handle_custom_query(
    State(state): State<Arc<DashboardState>>,
    JsonOrForm(request): JsonOrForm<CustomQueryRequest>,
) -> Result<Json<Vec<Row>>, ApiError> {
    if !state.raw_sql_enabled {
        return Err(ApiError::forbidden(DISABLED).json_error());
    }
    let Some(statement) = nonempty(request.query) else {
        return Err(ApiError::bad_request("query missing").json_error());
    };
    warn!(%statement, "executing caller-supplied SQL");
    let rows = state
        .warehouse
        .execute(&statement)
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()).json_error())?;
    Ok(Json(rows))
}

/// Runs `{sql}`, reporting failures as plain text.
pub async fn handle_raw_query(
    State(state): State<Arc<DashboardState>>,
    JsonOrForm(request): JsonOrForm<RawQueryRequest>,
) -> Result<Json<Vec<Row>>, ApiError> {
    if !state.raw_sql_enabled {
        return Err(ApiError::forbidden(DISABLED));
    }
    let Some(statement) = nonempty(request.sql) else {
        return Err(ApiError::bad_request("SQL query missing."));
    };
    warn!(%statement, "executing caller-supplied SQL");
    let rows = state
        .warehouse
        .execute(&statement)
        .await
        .map_err(|e| ApiError::internal("Error executing query", e))?;
    Ok(Json(rows))
}
