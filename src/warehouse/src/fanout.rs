// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Concurrent execution of independent statements.
//!
//! Every function here issues all of its statements at once and waits for all
//! of them to finish; a failing member never cancels its siblings. Results are
//! always reported in the order the statements were given, not the order in
//! which they completed.

use futures::future::join_all;
use tracing::warn;

use crate::error::ExecutionError;
use crate::row::Row;
use crate::statement::Statement;
use crate::Warehouse;

/// Runs every statement in `batch` concurrently and returns each one's rows.
///
/// Fails if any member fails. When several fail, the error of the earliest
/// one in `batch` is returned.
pub async fn run_all(
    warehouse: &dyn Warehouse,
    batch: &[Statement],
) -> Result<Vec<Vec<Row>>, ExecutionError> {
    join_all(batch.iter().map(|statement| warehouse.execute(statement)))
        .await
        .into_iter()
        .collect()
}

/// Runs every statement in `batch` concurrently and concatenates their rows
/// in batch order.
///
/// This is all-or-nothing: if any member fails, so does the merge.
pub async fn run_merge(
    warehouse: &dyn Warehouse,
    batch: &[Statement],
) -> Result<Vec<Row>, ExecutionError> {
    let results = run_all(warehouse, batch).await?;
    Ok(results.into_iter().flatten().collect())
}

/// Enriches each of `base` with the result of a derived statement.
///
/// `statement_for` builds the lookup for a base row; the lookups run
/// concurrently. `combine` receives each base row together with the outcome
/// of its lookup and produces the output record, so it decides what a failed
/// lookup looks like. A failure only ever affects its own row: the output has
/// exactly one record per base row, in base order.
pub async fn run_enrich<T, F, C>(
    warehouse: &dyn Warehouse,
    base: Vec<Row>,
    statement_for: F,
    combine: C,
) -> Vec<T>
where
    F: Fn(&Row) -> Result<Statement, ExecutionError>,
    C: Fn(Row, Result<Vec<Row>, ExecutionError>) -> T,
{
    let lookups = base.iter().map(|row| {
        let statement = statement_for(row);
        async move {
            let result = match statement {
                Ok(statement) => warehouse.execute(&statement).await,
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                warn!("enrichment lookup failed: {e}");
            }
            result
        }
    });
    let results = join_all(lookups).await;
    base.into_iter()
        .zip(results)
        .map(|(row, result)| combine(row, result))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::mem::MemWarehouse;

    fn stmt(sql: &str) -> Statement {
        Statement::new(sql).unwrap()
    }

    fn named(name: &str) -> Row {
        [("name", json!(name))].into_iter().collect()
    }

    const SCHEMA_A: &str = "SHOW STREAMS IN SCHEMA DB.A;";
    const SCHEMA_B: &str = "SHOW STREAMS IN SCHEMA DB.B;";

    #[tokio::test]
    async fn test_merge_preserves_batch_order() {
        let warehouse = MemWarehouse::new();
        warehouse.respond(SCHEMA_A, vec![named("a1"), named("a2"), named("a3")]);
        warehouse.respond(SCHEMA_B, vec![named("b1"), named("b2")]);
        // Make the first member finish last.
        warehouse.delay(SCHEMA_A, Duration::from_millis(50));

        let rows = run_merge(&warehouse, &[stmt(SCHEMA_A), stmt(SCHEMA_B)])
            .await
            .unwrap();
        let names: Vec<_> = rows.iter().map(|r| r.get_str("name").unwrap()).collect();
        assert_eq!(names, vec!["a1", "a2", "a3", "b1", "b2"]);
    }

    #[tokio::test]
    async fn test_merge_fails_if_any_member_fails() {
        let warehouse = MemWarehouse::new();
        warehouse.respond(SCHEMA_A, vec![named("a1")]);
        warehouse.fail(SCHEMA_B, "Schema 'DB.B' does not exist");

        let err = run_merge(&warehouse, &[stmt(SCHEMA_A), stmt(SCHEMA_B)])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("DB.B"));
        // Both members were still issued.
        assert_eq!(warehouse.issued().len(), 2);
    }

    #[tokio::test]
    async fn test_all_keeps_members_apart() {
        let warehouse = MemWarehouse::new();
        warehouse.respond(SCHEMA_A, vec![named("a1")]);
        warehouse.respond(SCHEMA_B, vec![named("b1"), named("b2")]);

        let results = run_all(&warehouse, &[stmt(SCHEMA_A), stmt(SCHEMA_B)])
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].len(), 1);
        assert_eq!(results[1].len(), 2);
    }

    #[tokio::test]
    async fn test_enrich_tolerates_row_failures() {
        let warehouse = MemWarehouse::new();
        warehouse.respond(
            "SELECT STATUS('P1');",
            vec![[("STATUS", json!("RUNNING"))].into_iter().collect()],
        );
        warehouse.fail("SELECT STATUS('P2');", "no ingest history");
        warehouse.delay("SELECT STATUS('P1');", Duration::from_millis(50));

        let base = vec![named("P1"), named("P2"), named("P3")];
        let out = run_enrich(
            &warehouse,
            base,
            |row| stmt_for(row),
            |row, result| {
                let name = row.get_str("name").unwrap().to_string();
                let state = match result {
                    Ok(rows) => rows
                        .first()
                        .and_then(|r| r.get_str("STATUS"))
                        .unwrap_or("UNKNOWN")
                        .to_string(),
                    Err(_) => "ERROR".to_string(),
                };
                (name, state)
            },
        )
        .await;

        assert_eq!(
            out,
            vec![
                ("P1".to_string(), "RUNNING".to_string()),
                ("P2".to_string(), "ERROR".to_string()),
                ("P3".to_string(), "UNKNOWN".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_enrich_unbuildable_statement_is_row_failure() {
        let warehouse = MemWarehouse::new();
        let base = vec![named("P1"), Row::new()];
        let out = run_enrich(&warehouse, base, stmt_for, |_, result| result.is_ok()).await;
        assert_eq!(out, vec![true, false]);
        assert_eq!(warehouse.issued(), vec!["SELECT STATUS('P1');"]);
    }

    fn stmt_for(row: &Row) -> Result<Statement, ExecutionError> {
        match row.get_str("name") {
            Some(name) => Statement::new(format!("SELECT STATUS('{name}');")),
            None => Err(ExecutionError::Decode("row has no name".into())),
        }
    }
}
