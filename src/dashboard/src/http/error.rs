// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use guardian_warehouse::IdentError;
use serde_json::json;
use tracing::{debug, error};

/// How an [`ApiError`] is rendered in the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorFormat {
    /// A plain text body.
    Text,
    /// A JSON body of the form `{"message": ...}`.
    Message,
    /// A JSON body of the form `{"error": ...}`.
    Error,
}

/// An error returned from a route.
#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    format: ErrorFormat,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> ApiError {
        ApiError {
            status,
            message: message.into(),
            format: ErrorFormat::Text,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> ApiError {
        ApiError::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> ApiError {
        ApiError::new(StatusCode::FORBIDDEN, message)
    }

    /// A server-side failure, described as `context: cause`.
    pub fn internal(context: &str, cause: impl fmt::Display) -> ApiError {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{context}: {cause}"),
        )
    }

    /// Renders the error as `{"message": ...}`.
    pub fn json_message(mut self) -> ApiError {
        self.format = ErrorFormat::Message;
        self
    }

    /// Renders the error as `{"error": ...}`.
    pub fn json_error(mut self) -> ApiError {
        self.format = ErrorFormat::Error;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn format(&self) -> ErrorFormat {
        self.format
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.status, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<IdentError> for ApiError {
    fn from(err: IdentError) -> ApiError {
        ApiError::bad_request(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, "{}", self.message);
        } else {
            debug!(status = %self.status, "{}", self.message);
        }
        match self.format {
            ErrorFormat::Text => (self.status, self.message).into_response(),
            ErrorFormat::Message => {
                (self.status, Json(json!({ "message": self.message }))).into_response()
            }
            ErrorFormat::Error => {
                (self.status, Json(json!({ "error": self.message }))).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statuses() {
        assert_eq!(
            ApiError::bad_request("Table name required").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::forbidden("no").status(), StatusCode::FORBIDDEN);

        let err = ApiError::internal("Error fetching stages", "warehouse is suspended");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "Error fetching stages: warehouse is suspended");
        assert_eq!(err.format(), ErrorFormat::Text);
        assert_eq!(err.json_message().format(), ErrorFormat::Message);
    }

    #[test]
    fn test_ident_error_is_bad_request() {
        let err = ApiError::from(IdentError::Empty);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "identifier is empty");
    }

    #[test]
    fn test_response_formats() {
        let response = ApiError::bad_request("query missing")
            .json_error()
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()["content-type"],
            "application/json"
        );

        let response = ApiError::bad_request("SQL query missing.").into_response();
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
    }
}
