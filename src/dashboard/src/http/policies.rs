// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Masking and row access policies.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use guardian_warehouse::project::{Field, Projection};
use guardian_warehouse::{quote_literal, Ident, Row};
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use tracing::warn;

use crate::http::{fetch, ApiError, DashboardState};

const NO_LINKED_TABLE: &str = "No linked table found for this policy.";
const POLICY_LOOKUP_FAILED: &str = "Error looking up policy references";

static MASKING_POLICIES: Lazy<Projection> = Lazy::new(|| {
    Projection::new(vec![
        Field::copy("name", "name"),
        Field::copy("database", "database_name"),
        Field::copy("schema", "schema_name"),
        Field::copy("expression", "body"),
        Field::copy_or("applies_to", "kind", "--"),
        Field::copy("owner", "owner"),
    ])
});

static ROW_POLICIES: Lazy<Projection> = Lazy::new(|| {
    Projection::new(vec![
        Field::copy("name", "name"),
        Field::copy("database", "database_name"),
        Field::copy("schema", "schema_name"),
        Field::copy_or("expression", "body", "--"),
        Field::copy("owner", "owner"),
    ])
});

pub async fn handle_masking_policies(
    State(state): State<Arc<DashboardState>>,
) -> Result<Json<Vec<Row>>, ApiError> {
    let rows = fetch(
        &state,
        "SHOW MASKING POLICIES;".into(),
        "Error fetching masking policies",
    )
    .await?;
    Ok(Json(MASKING_POLICIES.project(&rows)))
}

pub async fn handle_row_policies(
    State(state): State<Arc<DashboardState>>,
) -> Result<Json<Vec<Row>>, ApiError> {
    let rows = fetch(
        &state,
        "SHOW ROW ACCESS POLICIES;".into(),
        "Error fetching row access policies",
    )
    .await?;
    Ok(Json(ROW_POLICIES.project(&rows)))
}

/// Finds the first table a policy is attached to, as `DB.SCHEMA.TABLE`.
async fn policy_target(
    state: &DashboardState,
    policy_name: String,
    kind: &str,
) -> Result<Json<Value>, ApiError> {
    let policy = Ident::new(policy_name)?;
    let sql = format!(
        "SELECT POLICY_DB, POLICY_SCHEMA, POLICY_NAME, REF_DATABASE_NAME, REF_SCHEMA_NAME, REF_ENTITY_NAME
FROM SNOWFLAKE.ACCOUNT_USAGE.POLICY_REFERENCES
WHERE POLICY_NAME = {}
AND POLICY_KIND = {}
LIMIT 1;",
        quote_literal(policy.as_str()),
        quote_literal(kind),
    );
    let rows = fetch(state, sql, POLICY_LOOKUP_FAILED).await?;
    let Some(reference) = rows.first() else {
        warn!(%policy, kind, "policy has no references");
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            NO_LINKED_TABLE,
        ));
    };
    let part = |column: &str| {
        reference
            .get(column)
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default()
    };
    let table = format!(
        "{}.{}.{}",
        part("REF_DATABASE_NAME"),
        part("REF_SCHEMA_NAME"),
        part("REF_ENTITY_NAME"),
    );
    Ok(Json(json!({ "table": table })))
}

pub async fn handle_masking_policy_target(
    State(state): State<Arc<DashboardState>>,
    Path(policy_name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    policy_target(&state, policy_name, "MASKING_POLICY").await
}

pub async fn handle_row_policy_target(
    State(state): State<Arc<DashboardState>>,
    Path(policy_name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    policy_target(&state, policy_name, "ROW_ACCESS_POLICY").await
}
