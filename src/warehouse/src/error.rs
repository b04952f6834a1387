// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use thiserror::Error;

use crate::statement::Statement;

/// An error executing a single statement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("statement text is empty")]
    EmptyStatement,
    #[error("not connected to the warehouse")]
    NotConnected,
    /// The warehouse rejected the statement.
    #[error("{message} (code {code})")]
    Backend { code: String, message: String },
    /// The request never produced a warehouse response.
    #[error("warehouse transport: {0}")]
    Transport(String),
    /// The warehouse responded with something we could not decode.
    #[error("malformed warehouse response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ExecutionError {
    fn from(err: reqwest::Error) -> ExecutionError {
        ExecutionError::Transport(err.to_string())
    }
}

/// An error establishing the warehouse session at startup.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("invalid account URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("login transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("login rejected: {message} (code {code})")]
    Rejected { code: String, message: String },
}

/// A statement in a [`CommandChain`](crate::CommandChain) failed.
///
/// Statements before `failed_index` were applied and are not rolled back;
/// statements after it were never issued.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("statement {failed_index} ({failed_statement}) failed: {source}")]
pub struct ChainError {
    pub failed_index: usize,
    pub failed_statement: Statement,
    pub source: ExecutionError,
}

/// A caller-supplied name is not a plain identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentError {
    #[error("identifier is empty")]
    Empty,
    #[error("invalid identifier {name:?}: only letters, digits and underscores are allowed")]
    InvalidCharacter { name: String },
    #[error("invalid identifier {name:?}: must not start with a digit")]
    LeadingDigit { name: String },
    #[error("invalid name {name:?}: expected at most {max} dot-separated parts")]
    TooManyParts { name: String, max: usize },
    #[error("invalid name {name:?}: expected exactly {expected} dot-separated parts")]
    WrongPartCount { name: String, expected: usize },
}
