// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The login form.
//!
//! A single configured admin account. Logging in issues no session; it only
//! redirects to the dashboard page.

use std::fmt;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header::LOCATION;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;
use tracing::info;

use crate::http::{DashboardState, JsonOrForm};

const DASHBOARD_PAGE: &str = "/dashboard.html";
const INVALID_CREDENTIALS: &str = r#"<h3>Invalid credentials. <a href="/">Try again</a></h3>"#;

/// The admin account's login.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub const DEFAULT_EMAIL: &'static str = "admin@guardian.com";
    pub const DEFAULT_PASSWORD: &'static str = "admin123";

    fn matches(&self, login: &LoginRequest) -> bool {
        self.email == login.email && self.password == login.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    email: String,
    password: String,
}

pub async fn handle_login(
    State(state): State<Arc<DashboardState>>,
    JsonOrForm(login): JsonOrForm<LoginRequest>,
) -> Response {
    if state.credentials.matches(&login) {
        info!(email = %login.email, "login succeeded");
        (StatusCode::FOUND, [(LOCATION, DASHBOARD_PAGE)]).into_response()
    } else {
        info!(email = %login.email, "login rejected");
        Html(INVALID_CREDENTIALS).into_response()
    }
}
