// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The ingest path: landing files in the bucket and watching the pipes that
//! load them.

use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::Json;
use guardian_warehouse::fanout;
use guardian_warehouse::{quote_literal, ExecutionError, Row, Statement};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::http::{fetch, ApiError, DashboardState};
use crate::upload::UploadArtifact;

const STATUS_UNKNOWN: &str = "UNKNOWN";
const STATUS_ERROR: &str = "ERROR";
const NO_LOAD: &str = "—";

pub async fn handle_stages(
    State(state): State<Arc<DashboardState>>,
) -> Result<Json<Vec<Row>>, ApiError> {
    let sql = format!("SHOW STAGES IN SCHEMA {};", state.layout.ingest_schema);
    Ok(Json(fetch(&state, sql, "Error fetching stages").await?))
}

/// A pipe together with its live status.
#[derive(Debug, Serialize)]
pub struct PipeSummary {
    name: Value,
    created_on: Value,
    status: String,
    last_load: String,
}

/// The subset of `SYSTEM$PIPE_STATUS` output the dashboard shows.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipeStatus {
    execution_state: Option<String>,
    last_ingested_timestamp: Option<String>,
}

fn pipe_status_statement(schema: &str, pipe: &Row) -> Result<Statement, ExecutionError> {
    let name = pipe
        .get_str("name")
        .ok_or_else(|| ExecutionError::Decode("pipe listing has no name".into()))?;
    Statement::new(format!(
        "SELECT SYSTEM$PIPE_STATUS({}) AS STATUS;",
        quote_literal(&format!("{schema}.{name}"))
    ))
}

/// Decodes the status lookup for one pipe into `(status, last load)`.
fn parse_pipe_status(result: Result<Vec<Row>, ExecutionError>) -> Option<(String, String)> {
    let rows = result.ok()?;
    let raw = rows.first()?.get_str("STATUS")?;
    let status: PipeStatus = serde_json::from_str(raw).ok()?;
    Some((
        status
            .execution_state
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| STATUS_UNKNOWN.into()),
        status
            .last_ingested_timestamp
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| NO_LOAD.into()),
    ))
}

/// Lists the ingest pipes with their execution state and last load time.
///
/// A pipe whose status cannot be determined is reported as `ERROR` rather
/// than failing the whole listing.
pub async fn handle_pipes(
    State(state): State<Arc<DashboardState>>,
) -> Result<Json<Vec<PipeSummary>>, ApiError> {
    let schema = state.layout.ingest_schema.to_string();
    let sql = format!("SHOW PIPES IN SCHEMA {schema};");
    let pipes = fetch(&state, sql, "Error fetching pipes").await?;
    let summaries = fanout::run_enrich(
        &*state.warehouse,
        pipes,
        |pipe| pipe_status_statement(&schema, pipe),
        |pipe, result| {
            let (status, last_load) = parse_pipe_status(result)
                .unwrap_or_else(|| (STATUS_ERROR.into(), NO_LOAD.into()));
            PipeSummary {
                name: pipe.get("name").cloned().unwrap_or(Value::Null),
                created_on: pipe.get("created_on").cloned().unwrap_or(Value::Null),
                status,
                last_load,
            }
        },
    )
    .await;
    Ok(Json(summaries))
}

pub async fn handle_refresh_pipe(
    State(state): State<Arc<DashboardState>>,
) -> Result<Json<Value>, ApiError> {
    let sql = format!("ALTER PIPE {} REFRESH;", state.layout.refresh_pipe);
    fetch(&state, sql, "Failed to refresh pipe")
        .await
        .map_err(ApiError::json_message)?;
    info!(pipe = %state.layout.refresh_pipe, "pipe refreshed");
    Ok(Json(json!({ "message": "Pipe refreshed successfully" })))
}

/// Pulls the multipart field named `file` out of the request.
async fn read_file(multipart: &mut Multipart) -> Result<Option<UploadArtifact>, ApiError> {
    let malformed = |e: axum::extract::multipart::MultipartError| {
        ApiError::bad_request(format!("Malformed upload: {}", e.body_text())).json_message()
    };
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        if field.name() != Some("file") {
            continue;
        }
        // A field without a filename is a plain form value, not a file.
        let Some(filename) = field.file_name().map(String::from) else {
            continue;
        };
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field.bytes().await.map_err(malformed)?;
        return Ok(Some(UploadArtifact {
            filename,
            content_type,
            data,
        }));
    }
    Ok(None)
}

pub async fn handle_upload(
    State(state): State<Arc<DashboardState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let Some(artifact) = read_file(&mut multipart).await? else {
        return Err(ApiError::bad_request("No file uploaded").json_message());
    };
    let key = state.uploader.upload(artifact).await.map_err(|e| {
        warn!("upload failed: {e}");
        ApiError::internal("Error uploading to S3", e).json_message()
    })?;
    Ok(Json(json!({
        "message": "File uploaded to S3 successfully",
        "key": key,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_row(status: &str) -> Vec<Row> {
        vec![[("STATUS", status)].into_iter().collect()]
    }

    #[test]
    fn test_parse_pipe_status() {
        let rows = status_row(
            r#"{"executionState":"RUNNING","pendingFileCount":0,"lastIngestedTimestamp":"2024-05-01T10:00:00.000Z"}"#,
        );
        assert_eq!(
            parse_pipe_status(Ok(rows)),
            Some((
                String::from("RUNNING"),
                String::from("2024-05-01T10:00:00.000Z")
            ))
        );

        assert_eq!(
            parse_pipe_status(Ok(status_row(r#"{"pendingFileCount":0}"#))),
            Some((String::from(STATUS_UNKNOWN), String::from(NO_LOAD)))
        );
        assert_eq!(parse_pipe_status(Ok(status_row("not json"))), None);
        assert_eq!(parse_pipe_status(Ok(vec![])), None);
        assert_eq!(
            parse_pipe_status(Err(ExecutionError::NotConnected)),
            None
        );
    }

    #[test]
    fn test_pipe_status_statement() {
        let pipe: Row = [("name", "CLAIMSPIPE")].into_iter().collect();
        let stmt = pipe_status_statement("DB.SCH", &pipe).unwrap();
        assert_eq!(
            stmt.as_str(),
            "SELECT SYSTEM$PIPE_STATUS('DB.SCH.CLAIMSPIPE') AS STATUS;"
        );
        assert!(pipe_status_statement("DB.SCH", &Row::new()).is_err());
    }
}
