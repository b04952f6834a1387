// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The dashboard's HTTP surface.
//!
//! Every route turns into one or more warehouse statements. Routes that run
//! a single statement use [`fetch`]; multi-statement routes use a
//! [`CommandChain`](guardian_warehouse::CommandChain) when the statements
//! depend on each other and [`fanout`](guardian_warehouse::fanout) when they
//! do not.

use std::path::Path;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use guardian_warehouse::{Row, Statement, Warehouse};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::layout::Layout;
use crate::now::NowFn;
use crate::upload::Uploader;

mod auth;
mod body;
mod catalog;
mod context;
mod error;
mod ingest;
mod objects;
mod policies;
mod shares;
mod sql;

pub use auth::Credentials;
pub use body::JsonOrForm;
pub use error::{ApiError, ErrorFormat};

/// State shared by every route.
#[derive(Debug)]
pub struct DashboardState {
    pub warehouse: Arc<dyn Warehouse>,
    pub uploader: Uploader,
    pub layout: Layout,
    pub credentials: Credentials,
    /// Whether the routes that run caller-supplied SQL are enabled.
    pub raw_sql_enabled: bool,
    pub now: NowFn,
}

/// Builds the dashboard router.
///
/// Static assets are served from `static_dir`, with `/` mapped to the login
/// page.
pub fn router(state: DashboardState, static_dir: &Path) -> Router {
    let api = Router::new()
        .route("/version", get(catalog::handle_version))
        .route("/resource-monitor", get(catalog::handle_resource_monitor))
        .route("/get-warehouses", get(catalog::handle_warehouses))
        .route("/get-databases", get(catalog::handle_databases))
        .route("/get-schemas", get(catalog::handle_schemas))
        .route("/get-roles", get(catalog::handle_roles))
        .route("/get-tables", get(objects::handle_tables))
        .route("/query", get(objects::handle_table_preview))
        .route("/show-streams", get(objects::handle_streams))
        .route("/show-tasks", get(objects::handle_tasks))
        .route("/task-history/:task_name", get(objects::handle_task_history))
        .route("/show-mvs", get(objects::handle_materialized_views))
        .route("/preview-stream/:name", get(objects::handle_stream_preview))
        .route("/preview-mv/:name", get(objects::handle_mv_preview))
        .route("/set-context", post(context::handle_set_context))
        .route(
            "/show-masking-policies",
            get(policies::handle_masking_policies),
        )
        .route("/show-row-policies", get(policies::handle_row_policies))
        .route(
            "/preview-masked-data/:policy_name",
            get(policies::handle_masking_policy_target),
        )
        .route(
            "/preview-row-policy/:policy_name",
            get(policies::handle_row_policy_target),
        )
        .route("/show-shares", get(shares::handle_shares))
        .route("/create-share", post(shares::handle_create_share))
        .route(
            "/remove-share-account",
            post(shares::handle_remove_share_account),
        );

    Router::new()
        .route_service("/", ServeFile::new(static_dir.join("login.html")))
        .route("/login", post(auth::handle_login))
        .route("/get-env-details", get(catalog::handle_env_details))
        .route("/get-stages", get(ingest::handle_stages))
        .route("/get-pipes", get(ingest::handle_pipes))
        .route(
            "/upload-s3",
            post(ingest::handle_upload).layer(DefaultBodyLimit::disable()),
        )
        .route("/refresh-pipe", post(ingest::handle_refresh_pipe))
        .route("/get-rowcount", get(catalog::handle_rowcount))
        .route("/run-custom-query", post(sql::handle_custom_query))
        .route("/run-query", post(sql::handle_raw_query))
        .nest("/api", api)
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Wraps generated SQL text in a [`Statement`].
fn statement(sql: String) -> Result<Statement, ApiError> {
    Statement::new(sql).map_err(|e| ApiError::internal("Error building statement", e))
}

/// Runs a single generated statement, attributing failures to `context`.
async fn fetch(state: &DashboardState, sql: String, context: &str) -> Result<Vec<Row>, ApiError> {
    let statement = statement(sql)?;
    debug!(%statement, "executing");
    state
        .warehouse
        .execute(&statement)
        .await
        .map_err(|e| ApiError::internal(context, e))
}
