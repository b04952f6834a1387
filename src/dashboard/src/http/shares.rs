// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Secure shares: listing them, sharing a single object with another
//! account, and revoking an account's access.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use guardian_warehouse::project::{Field, Projection};
use guardian_warehouse::{CommandChain, Ident, QualifiedName, Row};
use once_cell::sync::Lazy;
use serde::Deserialize;
use tracing::info;

use crate::http::{fetch, statement, ApiError, DashboardState, JsonOrForm};
use crate::now::EpochMillis;

static SHARES: Lazy<Projection> = Lazy::new(|| {
    Projection::new(vec![
        Field::copy("name", "name"),
        Field::copy("kind", "kind"),
        Field::copy("owner", "owner"),
        Field::copy("created_on", "created_on"),
        Field::copy("to", "to"),
        Field::copy("comment", "comment"),
    ])
});

pub async fn handle_shares(
    State(state): State<Arc<DashboardState>>,
) -> Result<Json<Vec<Row>>, ApiError> {
    let rows = fetch(&state, "SHOW SHARES;".into(), "Error fetching shares").await?;
    Ok(Json(SHARES.project(&rows)))
}

/// The kinds of object that can be granted to a share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareObjectKind {
    Table,
    View,
    MaterializedView,
}

impl FromStr for ShareObjectKind {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<ShareObjectKind, ApiError> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "TABLE" => Ok(ShareObjectKind::Table),
            "VIEW" => Ok(ShareObjectKind::View),
            "MATERIALIZED VIEW" => Ok(ShareObjectKind::MaterializedView),
            _ => Err(ApiError::bad_request(format!(
                "Unsupported object type {s:?}. Use TABLE, VIEW or MATERIALIZED VIEW"
            ))),
        }
    }
}

impl fmt::Display for ShareObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ShareObjectKind::Table => "TABLE",
            ShareObjectKind::View => "VIEW",
            ShareObjectKind::MaterializedView => "MATERIALIZED VIEW",
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShareRequest {
    object_type: Option<String>,
    object_name: Option<String>,
    receiver: Option<String>,
}

/// Names a new share for `object`, unique per creation time.
fn share_name(object: &Ident, created_at: EpochMillis) -> Result<Ident, ApiError> {
    let name = format!("SHARE_{}_{}", object.as_str().to_ascii_uppercase(), created_at);
    Ok(Ident::new(name)?)
}

/// The statements that create `share` and grant it read access to `object`
/// for `receiver`.
fn create_share_chain(
    share: &Ident,
    kind: ShareObjectKind,
    object: &QualifiedName,
    receiver: &QualifiedName,
) -> Result<CommandChain, ApiError> {
    let [db, schema, _] = object.parts() else {
        return Err(ApiError::bad_request(INVALID_OBJECT_NAME));
    };
    Ok(CommandChain::new()
        .then(statement(format!("CREATE OR REPLACE SHARE {share};"))?)
        .then(statement(format!(
            "GRANT USAGE ON DATABASE {db} TO SHARE {share};"
        ))?)
        .then(statement(format!(
            "GRANT USAGE ON SCHEMA {db}.{schema} TO SHARE {share};"
        ))?)
        .then(statement(format!(
            "GRANT SELECT ON {kind} {object} TO SHARE {share};"
        ))?)
        .then(statement(format!(
            "ALTER SHARE {share} ADD ACCOUNT = {receiver};"
        ))?))
}

const INVALID_OBJECT_NAME: &str = "Invalid object name format. Use DB.SCHEMA.OBJECT";

fn nonempty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Creates a share exposing one object and adds `receiver` to it.
///
/// A failure part way through leaves the share and any grants made so far in
/// place.
pub async fn handle_create_share(
    State(state): State<Arc<DashboardState>>,
    JsonOrForm(request): JsonOrForm<CreateShareRequest>,
) -> Result<String, ApiError> {
    let (Some(object_type), Some(object_name), Some(receiver)) = (
        nonempty(request.object_type),
        nonempty(request.object_name),
        nonempty(request.receiver),
    ) else {
        return Err(ApiError::bad_request("Missing parameters."));
    };
    let object = QualifiedName::parse_exact(&object_name, 3)
        .map_err(|_| ApiError::bad_request(INVALID_OBJECT_NAME))?;
    let kind: ShareObjectKind = object_type.parse()?;
    let receiver = QualifiedName::parse(&receiver)?;
    let share = share_name(object.item(), state.now.now())?;

    create_share_chain(&share, kind, &object, &receiver)?
        .run(&*state.warehouse)
        .await
        .map_err(|e| ApiError::internal("Error creating share", e))?;

    info!(%share, %object, %receiver, "share created");
    Ok(format!(
        "Secure Share \"{share}\" successfully created and shared with {receiver}."
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveShareAccountRequest {
    share_name: Option<String>,
    receiver: Option<String>,
}

pub async fn handle_remove_share_account(
    State(state): State<Arc<DashboardState>>,
    JsonOrForm(request): JsonOrForm<RemoveShareAccountRequest>,
) -> Result<String, ApiError> {
    let (Some(share), Some(receiver)) = (nonempty(request.share_name), nonempty(request.receiver))
    else {
        return Err(ApiError::bad_request("Missing shareName or receiver."));
    };
    let share = Ident::new(share)?;
    let receiver = QualifiedName::parse(&receiver)?;
    let sql = format!("ALTER SHARE {share} REMOVE ACCOUNT = {receiver};");
    fetch(&state, sql, "Error removing account").await?;
    info!(%share, %receiver, "account removed from share");
    Ok(format!("Account {receiver} removed from share {share}."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_kind() {
        assert_eq!(
            "table".parse::<ShareObjectKind>().unwrap(),
            ShareObjectKind::Table
        );
        assert_eq!(
            "Materialized  View".parse::<ShareObjectKind>().unwrap(),
            ShareObjectKind::MaterializedView
        );
        assert_eq!(ShareObjectKind::MaterializedView.to_string(), "MATERIALIZED VIEW");
        assert!("TABLE; DROP SHARE X".parse::<ShareObjectKind>().is_err());
        assert!("STAGE".parse::<ShareObjectKind>().is_err());
    }

    #[test]
    fn test_share_name() {
        let object = Ident::new("FactClaims").unwrap();
        assert_eq!(
            share_name(&object, 1_700_000_000_000).unwrap().as_str(),
            "SHARE_FACTCLAIMS_1700000000000"
        );
    }

    #[test]
    fn test_create_share_chain() {
        let share = Ident::new("SHARE_T_1").unwrap();
        let object = QualifiedName::parse("DB.SCH.T").unwrap();
        let receiver = QualifiedName::parse("ORG.ACCT").unwrap();
        let chain =
            create_share_chain(&share, ShareObjectKind::View, &object, &receiver).unwrap();
        let statements: Vec<_> = chain.statements().iter().map(|s| s.to_string()).collect();
        assert_eq!(
            statements,
            vec![
                "CREATE OR REPLACE SHARE SHARE_T_1;",
                "GRANT USAGE ON DATABASE DB TO SHARE SHARE_T_1;",
                "GRANT USAGE ON SCHEMA DB.SCH TO SHARE SHARE_T_1;",
                "GRANT SELECT ON VIEW DB.SCH.T TO SHARE SHARE_T_1;",
                "ALTER SHARE SHARE_T_1 ADD ACCOUNT = ORG.ACCT;",
            ]
        );
    }
}
