// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;

use axum::extract::State;
use guardian_warehouse::{CommandChain, Ident};
use serde::Deserialize;
use tracing::info;

use crate::http::{statement, ApiError, DashboardState, JsonOrForm};

#[derive(Debug, Deserialize)]
pub struct SetContextRequest {
    warehouse: Option<String>,
    database: Option<String>,
    schema: Option<String>,
    role: Option<String>,
}

fn required(value: Option<String>) -> Result<Ident, ApiError> {
    match value {
        Some(value) if !value.is_empty() => Ok(Ident::new(value)?),
        _ => Err(ApiError::bad_request(
            "Missing warehouse, database, schema or role.",
        )),
    }
}

/// Switches the session's warehouse, database, schema and role, in that
/// order.
///
/// Stops at the first statement that fails. Earlier switches stay in effect.
pub async fn handle_set_context(
    State(state): State<Arc<DashboardState>>,
    JsonOrForm(request): JsonOrForm<SetContextRequest>,
) -> Result<String, ApiError> {
    let warehouse = required(request.warehouse)?;
    let database = required(request.database)?;
    let schema = required(request.schema)?;
    let role = required(request.role)?;

    let chain = CommandChain::new()
        .then(statement(format!("USE WAREHOUSE {warehouse};"))?)
        .then(statement(format!("USE DATABASE {database};"))?)
        .then(statement(format!("USE SCHEMA {schema};"))?)
        .then(statement(format!("USE ROLE {role};"))?);
    chain
        .run(&*state.warehouse)
        .await
        .map_err(|e| ApiError::internal("Error setting context", e))?;

    info!(%warehouse, %database, %schema, %role, "session context changed");
    Ok(format!(
        "Context successfully set to:\nWarehouse={warehouse}, Database={database}, Schema={schema}, Role={role}"
    ))
}
