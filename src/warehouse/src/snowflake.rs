// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! A [`Warehouse`] backed by Snowflake's session REST protocol.
//!
//! The client logs in once with a user name and password and then issues
//! every statement over the resulting session. Results are requested in JSON
//! format, where every cell arrives as a string (or null) and is decoded
//! according to the column type the warehouse reports alongside it.
//!
//! Session tokens expire after a while. When a statement is rejected with an
//! expired session the client exchanges its master token for a new session
//! token and reissues that statement once.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::error::{ConnectionError, ExecutionError};
use crate::row::Row;
use crate::statement::Statement;
use crate::Warehouse;

const LOGIN_PATH: &str = "/session/v1/login-request";
const QUERY_PATH: &str = "/queries/v1/query-request";
const TOKEN_REQUEST_PATH: &str = "/session/token-request";

const CLIENT_APP_ID: &str = "guardian-warehouse";
const CLIENT_APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Codes reported while a query is still executing.
const QUERY_IN_PROGRESS: &str = "333333";
const QUERY_IN_PROGRESS_ASYNC: &str = "333334";

/// Code reported when the session token is no longer valid.
const SESSION_EXPIRED: &str = "390112";

/// How long to wait between polls of an in-progress query.
const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Connection parameters for a Snowflake account.
#[derive(Clone)]
pub struct SnowflakeConfig {
    /// The account identifier, e.g. `xy12345.us-east-1`.
    pub account: String,
    pub user: String,
    pub password: String,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub role: Option<String>,
    /// Overrides the endpoint derived from `account`.
    pub base_url: Option<Url>,
}

impl SnowflakeConfig {
    fn base_url(&self) -> Result<Url, url::ParseError> {
        match &self.base_url {
            Some(url) => Ok(url.clone()),
            None => Url::parse(&format!("https://{}.snowflakecomputing.com", self.account)),
        }
    }

    /// The account name sent at login, which excludes any region suffix.
    fn account_name(&self) -> &str {
        self.account.split('.').next().unwrap_or(&self.account)
    }
}

impl fmt::Debug for SnowflakeConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SnowflakeConfig")
            .field("account", &self.account)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("warehouse", &self.warehouse)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("role", &self.role)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// A client for a single Snowflake session.
///
/// Until [`SnowflakeClient::connect`] succeeds every statement fails with
/// [`ExecutionError::NotConnected`].
pub struct SnowflakeClient {
    config: SnowflakeConfig,
    base_url: Url,
    http: reqwest::Client,
    session: RwLock<Option<Session>>,
    sequence_id: AtomicU64,
}

impl fmt::Debug for SnowflakeClient {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SnowflakeClient")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl SnowflakeClient {
    pub fn new(config: SnowflakeConfig) -> Result<SnowflakeClient, ConnectionError> {
        let base_url = config.base_url()?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("guardian-warehouse/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(SnowflakeClient {
            config,
            base_url,
            http,
            session: RwLock::new(None),
            sequence_id: AtomicU64::new(0),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.session.read().expect("lock poisoned").is_some()
    }

    /// Logs in and establishes the session used by all later statements.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let mut url = self.base_url.join(LOGIN_PATH)?;
        {
            let mut query = url.query_pairs_mut();
            let params = [
                ("warehouse", &self.config.warehouse),
                ("databaseName", &self.config.database),
                ("schemaName", &self.config.schema),
                ("roleName", &self.config.role),
            ];
            for (key, value) in params {
                if let Some(value) = value {
                    query.append_pair(key, value);
                }
            }
            query.append_pair("requestId", &Uuid::new_v4().to_string());
        }

        let body = json!({
            "data": {
                "CLIENT_APP_ID": CLIENT_APP_ID,
                "CLIENT_APP_VERSION": CLIENT_APP_VERSION,
                "ACCOUNT_NAME": self.config.account_name(),
                "LOGIN_NAME": self.config.user,
                "PASSWORD": self.config.password,
                "SESSION_PARAMETERS": {
                    "QUERY_RESULT_FORMAT": "JSON",
                },
            },
        });
        let response: RawResponse = self
            .http
            .post(url)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if !response.success {
            return Err(ConnectionError::Rejected {
                code: response.code.unwrap_or_default(),
                message: response.message.unwrap_or_default(),
            });
        }
        let data: LoginData = response.data().map_err(|e| ConnectionError::Rejected {
            code: String::new(),
            message: e.to_string(),
        })?;
        *self.session.write().expect("lock poisoned") = Some(Session {
            token: data.token,
            master_token: data.master_token,
        });
        info!(
            account = %self.config.account,
            user = %self.config.user,
            "connected to Snowflake"
        );
        Ok(())
    }

    fn session(&self) -> Result<Session, ExecutionError> {
        self.session
            .read()
            .expect("lock poisoned")
            .clone()
            .ok_or(ExecutionError::NotConnected)
    }

    /// Submits `statement`, renewing the session once if it has expired.
    async fn submit(&self, statement: &Statement) -> Result<QueryData, ExecutionError> {
        let session = self.session()?;
        match self.submit_with(&session.token, statement).await {
            Err(ExecutionError::Backend { code, message }) if code == SESSION_EXPIRED => {
                let Some(master_token) = session.master_token.as_deref() else {
                    return Err(ExecutionError::Backend { code, message });
                };
                let token = self.renew(&session.token, master_token).await?;
                self.submit_with(&token, statement).await
            }
            result => result,
        }
    }

    /// Exchanges the master token for a new session token.
    ///
    /// Returns the current token without a request if another statement has
    /// already replaced `expired`.
    async fn renew(&self, expired: &str, master_token: &str) -> Result<String, ExecutionError> {
        let current = self.session()?;
        if current.token != expired {
            return Ok(current.token);
        }
        let mut url = self
            .base_url
            .join(TOKEN_REQUEST_PATH)
            .map_err(|e| ExecutionError::Transport(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("requestId", &Uuid::new_v4().to_string());
        let body = json!({
            "oldSessionToken": expired,
            "requestType": "RENEW",
        });
        let response: RawResponse = self
            .http
            .post(url)
            .headers(token_headers(master_token)?)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if !response.success {
            return Err(ExecutionError::Backend {
                code: response.code.unwrap_or_default(),
                message: response
                    .message
                    .unwrap_or_else(|| "session renewal failed".to_string()),
            });
        }
        let renewed: RenewData = response.data()?;
        let token = renewed.session_token.clone();
        let mut session = self.session.write().expect("lock poisoned");
        let master_token = renewed
            .master_token
            .or_else(|| session.as_ref().and_then(|s| s.master_token.clone()));
        *session = Some(Session {
            token: renewed.session_token,
            master_token,
        });
        info!(account = %self.config.account, "renewed Snowflake session");
        Ok(token)
    }

    async fn submit_with(
        &self,
        token: &str,
        statement: &Statement,
    ) -> Result<QueryData, ExecutionError> {
        let headers = token_headers(token)?;
        let mut url = self
            .base_url
            .join(QUERY_PATH)
            .map_err(|e| ExecutionError::Transport(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("requestId", &Uuid::new_v4().to_string());

        let submission_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let body = json!({
            "sqlText": statement.as_str(),
            "asyncExec": false,
            "sequenceId": self.sequence_id.fetch_add(1, Ordering::Relaxed) + 1,
            "querySubmissionTime": u64::try_from(submission_time).unwrap_or(u64::MAX),
        });
        let mut response: RawResponse = self
            .http
            .post(url)
            .headers(headers.clone())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // Long-running statements hand back a URL to poll for the result.
        while response.in_progress() {
            let data: QueryData = response.data()?;
            let Some(result_url) = data.get_result_url else {
                return Err(ExecutionError::Decode(
                    "query in progress without a result URL".into(),
                ));
            };
            let result_url = self
                .base_url
                .join(&result_url)
                .map_err(|e| ExecutionError::Decode(e.to_string()))?;
            tokio::time::sleep(RESULT_POLL_INTERVAL).await;
            response = self
                .http
                .get(result_url)
                .headers(headers.clone())
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
        }

        if !response.success {
            return Err(ExecutionError::Backend {
                code: response.code.unwrap_or_default(),
                message: response
                    .message
                    .unwrap_or_else(|| "statement failed".to_string()),
            });
        }
        response.data()
    }

    async fn fetch_chunk(
        &self,
        chunk: &Chunk,
        headers: &HeaderMap,
    ) -> Result<Vec<Vec<Option<String>>>, ExecutionError> {
        let body = self
            .http
            .get(&chunk.url)
            .headers(headers.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        // Chunks hold comma-separated row arrays without the enclosing array.
        serde_json::from_str(&format!("[{body}]"))
            .map_err(|e| ExecutionError::Decode(format!("result chunk: {e}")))
    }
}

#[async_trait]
impl Warehouse for SnowflakeClient {
    async fn execute(&self, statement: &Statement) -> Result<Vec<Row>, ExecutionError> {
        debug!(%statement, "executing statement");
        let data = self.submit(statement).await?;

        let mut cells = data.rowset;
        if !data.chunks.is_empty() {
            let headers = chunk_headers(&data.chunk_headers, data.qrmk.as_deref())?;
            for chunk in &data.chunks {
                cells.extend(self.fetch_chunk(chunk, &headers).await?);
            }
        }
        Ok(decode_rows(&data.rowtype, cells))
    }
}

/// The envelope around every Snowflake response.
#[derive(Debug, Deserialize)]
struct RawResponse {
    data: Option<Value>,
    #[serde(default)]
    success: bool,
    message: Option<String>,
    code: Option<String>,
}

impl RawResponse {
    fn in_progress(&self) -> bool {
        matches!(
            self.code.as_deref(),
            Some(QUERY_IN_PROGRESS | QUERY_IN_PROGRESS_ASYNC)
        )
    }

    fn data<T: DeserializeOwned>(&self) -> Result<T, ExecutionError> {
        let data = self.data.clone().unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(|e| ExecutionError::Decode(e.to_string()))
    }
}

#[derive(Clone)]
struct Session {
    token: String,
    master_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginData {
    token: String,
    master_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenewData {
    session_token: String,
    master_token: Option<String>,
}

/// Headers that authenticate a request with `token`.
fn token_headers(token: &str) -> Result<HeaderMap, ExecutionError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/snowflake"));
    let auth = HeaderValue::from_str(&format!("Snowflake Token=\"{token}\""))
        .map_err(|e| ExecutionError::Decode(format!("session token: {e}")))?;
    headers.insert(AUTHORIZATION, auth);
    Ok(headers)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    #[serde(default)]
    rowtype: Vec<ColumnType>,
    #[serde(default)]
    rowset: Vec<Vec<Option<String>>>,
    #[serde(default)]
    chunks: Vec<Chunk>,
    #[serde(default)]
    chunk_headers: BTreeMap<String, String>,
    qrmk: Option<String>,
    get_result_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ColumnType {
    name: String,
    #[serde(rename = "type")]
    ty: String,
    scale: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Chunk {
    url: String,
}

fn chunk_headers(
    provided: &BTreeMap<String, String>,
    qrmk: Option<&str>,
) -> Result<HeaderMap, ExecutionError> {
    let mut headers = HeaderMap::new();
    let invalid = |e: &dyn fmt::Display| ExecutionError::Decode(format!("chunk header: {e}"));
    if !provided.is_empty() {
        for (name, value) in provided {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(&e))?;
            let value = HeaderValue::from_str(value).map_err(|e| invalid(&e))?;
            headers.insert(name, value);
        }
    } else if let Some(qrmk) = qrmk {
        headers.insert(
            "x-amz-server-side-encryption-customer-algorithm",
            HeaderValue::from_static("AES256"),
        );
        headers.insert(
            "x-amz-server-side-encryption-customer-key",
            HeaderValue::from_str(qrmk).map_err(|e| invalid(&e))?,
        );
    }
    Ok(headers)
}

/// Pairs each row of string cells with the column types to build [`Row`]s.
pub(crate) fn decode_rows(columns: &[ColumnType], cells: Vec<Vec<Option<String>>>) -> Vec<Row> {
    cells
        .into_iter()
        .map(|row| {
            columns
                .iter()
                .zip(row)
                .map(|(column, cell)| (column.name.clone(), decode_cell(column, cell)))
                .collect()
        })
        .collect()
}

fn decode_cell(column: &ColumnType, cell: Option<String>) -> Value {
    let Some(cell) = cell else {
        return Value::Null;
    };
    let decoded = match column.ty.as_str() {
        "fixed" if column.scale.unwrap_or(0) == 0 => cell.parse::<i64>().ok().map(Value::from),
        "fixed" | "real" => cell
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        "boolean" => match cell.as_str() {
            "1" | "true" | "TRUE" => Some(Value::Bool(true)),
            "0" | "false" | "FALSE" => Some(Value::Bool(false)),
            _ => None,
        },
        "timestamp_ltz" | "timestamp_ntz" | "timestamp_tz" => {
            decode_timestamp(&column.ty, &cell).map(Value::String)
        }
        "date" => cell
            .parse::<i32>()
            .ok()
            .and_then(|days| days.checked_add(UNIX_EPOCH_DAYS_FROM_CE))
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .map(|date| Value::String(date.format("%Y-%m-%d").to_string())),
        "variant" | "object" | "array" => serde_json::from_str(&cell).ok(),
        _ => None,
    };
    decoded.unwrap_or(Value::String(cell))
}

/// Days from 0001-01-01 to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Decodes `<seconds>.<fraction>[ <offset>]` into RFC 3339.
///
/// `timestamp_tz` values carry their UTC offset as minutes plus 1440.
fn decode_timestamp(ty: &str, cell: &str) -> Option<String> {
    let mut parts = cell.split_whitespace();
    let epoch = parts.next()?;
    let offset_minutes = parts.next().map(|o| o.parse::<i32>()).transpose().ok()?;

    let (secs, fraction) = epoch.split_once('.').unwrap_or((epoch, "0"));
    let mut secs: i64 = secs.parse().ok()?;
    let digits = fraction.get(..9).unwrap_or(fraction);
    let mut nanos: u32 = format!("{digits:0<9}").parse().ok()?;
    if epoch.starts_with('-') && nanos > 0 {
        secs -= 1;
        nanos = 1_000_000_000 - nanos;
    }
    let utc = DateTime::from_timestamp(secs, nanos)?;

    match ty {
        "timestamp_ntz" => Some(
            utc.naive_utc()
                .format("%Y-%m-%dT%H:%M:%S%.3f")
                .to_string(),
        ),
        "timestamp_tz" => {
            let minutes = offset_minutes.unwrap_or(1440) - 1440;
            let offset = FixedOffset::east_opt(minutes.checked_mul(60)?)?;
            Some(
                utc.with_timezone(&offset)
                    .to_rfc3339_opts(SecondsFormat::Millis, false),
            )
        }
        _ => Some(utc.to_rfc3339_opts(SecondsFormat::Millis, true)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, ty: &str, scale: Option<i64>) -> ColumnType {
        ColumnType {
            name: name.to_string(),
            ty: ty.to_string(),
            scale,
        }
    }

    fn cell(column: &ColumnType, s: &str) -> Value {
        decode_cell(column, Some(s.to_string()))
    }

    #[test]
    fn test_decode_numbers() {
        let int = column("TOTAL", "fixed", Some(0));
        assert_eq!(cell(&int, "42"), json!(42));
        // Out of range for i64 stays a string.
        assert_eq!(
            cell(&int, "99999999999999999999999"),
            json!("99999999999999999999999")
        );
        let decimal = column("used_credits", "fixed", Some(2));
        assert_eq!(cell(&decimal, "12.50"), json!(12.5));
        let real = column("r", "real", None);
        assert_eq!(cell(&real, "0.25"), json!(0.25));
    }

    #[test]
    fn test_decode_misc() {
        assert_eq!(cell(&column("b", "boolean", None), "1"), json!(true));
        assert_eq!(cell(&column("b", "boolean", None), "false"), json!(false));
        assert_eq!(cell(&column("d", "date", None), "19675"), json!("2023-11-14"));
        assert_eq!(
            cell(&column("v", "variant", None), r#"{"a": [1, 2]}"#),
            json!({"a": [1, 2]})
        );
        assert_eq!(
            cell(&column("v", "variant", None), "not json"),
            json!("not json")
        );
        assert_eq!(cell(&column("s", "text", None), "hello"), json!("hello"));
        assert_eq!(decode_cell(&column("s", "text", None), None), Value::Null);
    }

    #[test]
    fn test_decode_timestamps() {
        let ltz = column("created_on", "timestamp_ltz", Some(3));
        assert_eq!(
            cell(&ltz, "1700000000.123000000"),
            json!("2023-11-14T22:13:20.123Z")
        );
        let ntz = column("t", "timestamp_ntz", Some(9));
        assert_eq!(cell(&ntz, "1700000000.5"), json!("2023-11-14T22:13:20.500"));
        let tz = column("t", "timestamp_tz", Some(3));
        // 1440 + 60 minutes is UTC+01:00.
        assert_eq!(
            cell(&tz, "1700000000.000 1500"),
            json!("2023-11-14T23:13:20.000+01:00")
        );
        let negative = column("t", "timestamp_ltz", Some(3));
        assert_eq!(cell(&negative, "-1.5"), json!("1969-12-31T23:59:58.500Z"));
        assert_eq!(cell(&ltz, "garbage"), json!("garbage"));
    }

    #[test]
    fn test_decode_rows() {
        let columns = vec![column("name", "text", None), column("rows", "fixed", Some(0))];
        let rows = decode_rows(
            &columns,
            vec![
                vec![Some("A".into()), Some("3".into())],
                vec![Some("B".into()), None],
            ],
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("rows"), Some(&json!(3)));
        assert_eq!(rows[1].get_str("name"), Some("B"));
        assert_eq!(rows[1].get("rows"), Some(&Value::Null));
    }

    #[test]
    fn test_base_url_and_account_name() {
        let config = SnowflakeConfig {
            account: "xy12345.us-east-1".into(),
            user: "u".into(),
            password: "secret".into(),
            warehouse: None,
            database: None,
            schema: None,
            role: None,
            base_url: None,
        };
        assert_eq!(
            config.base_url().unwrap().as_str(),
            "https://xy12345.us-east-1.snowflakecomputing.com/"
        );
        assert_eq!(config.account_name(), "xy12345");
        assert!(!format!("{config:?}").contains("secret"));
    }
}
