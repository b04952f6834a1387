// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! In-memory implementations for testing.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecutionError;
use crate::row::Row;
use crate::statement::Statement;
use crate::Warehouse;

#[derive(Debug, Default)]
struct MemWarehouseCore {
    responses: BTreeMap<String, Result<Vec<Row>, ExecutionError>>,
    delays: BTreeMap<String, Duration>,
    issued: Vec<String>,
}

/// A [`Warehouse`] that answers from a fixed script.
///
/// Statements are matched on their trimmed text. Unscripted statements
/// succeed with no rows. Every statement is recorded in the order it was
/// issued.
#[derive(Debug, Clone, Default)]
pub struct MemWarehouse {
    core: Arc<Mutex<MemWarehouseCore>>,
}

impl MemWarehouse {
    pub fn new() -> MemWarehouse {
        MemWarehouse::default()
    }

    /// Answers `sql` with `rows`.
    pub fn respond(&self, sql: &str, rows: Vec<Row>) {
        let mut core = self.core.lock().expect("lock poisoned");
        core.responses.insert(sql.trim().to_string(), Ok(rows));
    }

    /// Answers `sql` with a backend error carrying `message`.
    pub fn fail(&self, sql: &str, message: &str) {
        let mut core = self.core.lock().expect("lock poisoned");
        core.responses.insert(
            sql.trim().to_string(),
            Err(ExecutionError::Backend {
                code: "002003".to_string(),
                message: message.to_string(),
            }),
        );
    }

    /// Holds the answer to `sql` back for `delay`.
    pub fn delay(&self, sql: &str, delay: Duration) {
        let mut core = self.core.lock().expect("lock poisoned");
        core.delays.insert(sql.trim().to_string(), delay);
    }

    /// Returns the text of every statement issued so far.
    pub fn issued(&self) -> Vec<String> {
        self.core.lock().expect("lock poisoned").issued.clone()
    }
}

#[async_trait]
impl Warehouse for MemWarehouse {
    async fn execute(&self, statement: &Statement) -> Result<Vec<Row>, ExecutionError> {
        let sql = statement.as_str().trim().to_string();
        let (response, delay) = {
            let mut core = self.core.lock().expect("lock poisoned");
            core.issued.push(sql.clone());
            (
                core.responses.get(&sql).cloned(),
                core.delays.get(&sql).copied(),
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        response.unwrap_or_else(|| Ok(Vec::new()))
    }
}
