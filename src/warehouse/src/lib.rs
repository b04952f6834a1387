// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Execution of warehouse statements on behalf of the dashboard.
//!
//! The key exports are:
//!
//!  * The **[`Warehouse`]** trait, which executes a single [`Statement`] and
//!    returns its [`Row`]s. [`SnowflakeClient`] is the production
//!    implementation; [`mem::MemWarehouse`] is an in-memory fake for tests.
//!
//!  * The **[`CommandChain`]** type, which runs dependent statements one at a
//!    time and stops at the first failure.
//!
//!  * The **[`fanout`]** module, which runs independent statements
//!    concurrently and either merges their rows or enriches a base result
//!    row-by-row.
//!
//!  * The **[`project`]** module, which reshapes open-ended rows into stable
//!    output records.
//!
//! Statements are assembled from validated identifiers ([`Ident`],
//! [`QualifiedName`]) and quoted literals, as warehouse identifiers cannot be
//! bound as parameters.

#![warn(missing_debug_implementations)]

mod chain;
mod error;
mod row;
mod statement;

pub mod fanout;
pub mod mem;
pub mod project;
pub mod snowflake;

use async_trait::async_trait;

pub use crate::chain::CommandChain;
pub use crate::error::{ChainError, ConnectionError, ExecutionError, IdentError};
pub use crate::row::Row;
pub use crate::snowflake::{SnowflakeClient, SnowflakeConfig};
pub use crate::statement::{quote_literal, Ident, QualifiedName, Statement};

/// Executes single statements against a warehouse session.
///
/// Implementations perform exactly one attempt per call and keep no state
/// between calls other than what is needed to talk to the backend.
#[async_trait]
pub trait Warehouse: std::fmt::Debug + Send + Sync {
    /// Executes `statement`, returning its rows in the order the backend
    /// produced them.
    async fn execute(&self, statement: &Statement) -> Result<Vec<Row>, ExecutionError>;
}
