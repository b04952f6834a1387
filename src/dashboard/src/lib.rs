// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! An administrative web dashboard for a Snowflake account and the S3 bucket
//! that feeds it.
//!
//! The dashboard serves a static single-page frontend plus a JSON API. Each
//! API route is a thin translation onto one or more warehouse statements run
//! through [`guardian_warehouse`]. Files uploaded through the dashboard land
//! in the bucket via [`upload::Uploader`].
//!
//! The warehouse session and object store are constructed by the caller and
//! handed in through [`Config`]; nothing here reaches for global state.

#![warn(missing_debug_implementations)]

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use guardian_warehouse::Warehouse;
use tokio::net::TcpListener;

pub mod http;
pub mod layout;
pub mod logging;
pub mod now;
pub mod upload;

use crate::http::{Credentials, DashboardState};
use crate::layout::Layout;
use crate::now::NowFn;
use crate::upload::{ObjectStore, Uploader};

/// Everything the dashboard needs to serve requests.
#[derive(Debug, Clone)]
pub struct Config {
    pub warehouse: Arc<dyn Warehouse>,
    pub object_store: Arc<dyn ObjectStore>,
    pub layout: Layout,
    pub credentials: Credentials,
    /// Whether `/run-query` and `/run-custom-query` accept requests.
    pub raw_sql_enabled: bool,
    /// Directory holding the frontend's static files.
    pub static_dir: PathBuf,
    pub now: NowFn,
}

/// Builds the dashboard's router from `config`.
pub fn router(config: Config) -> axum::Router {
    let state = DashboardState {
        warehouse: config.warehouse,
        uploader: Uploader::new(config.object_store, config.now.clone()),
        layout: config.layout,
        credentials: config.credentials,
        raw_sql_enabled: config.raw_sql_enabled,
        now: config.now,
    };
    http::router(state, &config.static_dir)
}

/// Serves the dashboard on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, config: Config, shutdown: F) -> Result<(), io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(config))
        .with_graceful_shutdown(shutdown)
        .await
}
