// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use tracing::{debug, warn};

use crate::error::ChainError;
use crate::statement::Statement;
use crate::Warehouse;

/// An ordered list of statements where each one depends on the ones before it
/// having succeeded.
///
/// The warehouse offers no multi-statement transaction on this path, so a
/// chain only guarantees ordering and fail-fast: once a statement fails the
/// rest are never issued, and the effects of earlier statements remain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandChain {
    statements: Vec<Statement>,
}

impl CommandChain {
    pub fn new() -> CommandChain {
        CommandChain::default()
    }

    /// Appends a statement to the end of the chain.
    pub fn then(mut self, statement: Statement) -> CommandChain {
        self.statements.push(statement);
        self
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Runs each statement in order, awaiting it before issuing the next.
    pub async fn run(&self, warehouse: &dyn Warehouse) -> Result<(), ChainError> {
        for (i, statement) in self.statements.iter().enumerate() {
            debug!(step = i, %statement, "running chained statement");
            if let Err(source) = warehouse.execute(statement).await {
                warn!(step = i, %statement, "chained statement failed: {source}");
                return Err(ChainError {
                    failed_index: i,
                    failed_statement: statement.clone(),
                    source,
                });
            }
        }
        Ok(())
    }
}

impl FromIterator<Statement> for CommandChain {
    fn from_iter<I: IntoIterator<Item = Statement>>(iter: I) -> CommandChain {
        CommandChain {
            statements: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::MemWarehouse;
    use crate::ExecutionError;

    fn use_chain() -> CommandChain {
        ["USE WAREHOUSE W;", "USE DATABASE D;", "USE SCHEMA S;", "USE ROLE R;"]
            .into_iter()
            .map(|sql| Statement::new(sql).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let warehouse = MemWarehouse::new();
        use_chain().run(&warehouse).await.unwrap();
        assert_eq!(
            warehouse.issued(),
            vec![
                "USE WAREHOUSE W;",
                "USE DATABASE D;",
                "USE SCHEMA S;",
                "USE ROLE R;"
            ]
        );
    }

    #[tokio::test]
    async fn test_chain_stops_at_first_failure() {
        let warehouse = MemWarehouse::new();
        warehouse.fail("USE DATABASE D;", "Database 'D' does not exist");

        let err = use_chain().run(&warehouse).await.unwrap_err();
        assert_eq!(err.failed_index, 1);
        assert_eq!(err.failed_statement.as_str(), "USE DATABASE D;");
        assert!(matches!(err.source, ExecutionError::Backend { .. }));

        // Steps after the failure are never issued.
        assert_eq!(
            warehouse.issued(),
            vec!["USE WAREHOUSE W;", "USE DATABASE D;"]
        );
    }

    #[tokio::test]
    async fn test_empty_chain_succeeds() {
        let warehouse = MemWarehouse::new();
        CommandChain::new().run(&warehouse).await.unwrap();
        assert!(warehouse.issued().is_empty());
    }
}
