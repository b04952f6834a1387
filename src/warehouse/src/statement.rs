// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Statements and the names interpolated into them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ExecutionError, IdentError};

/// The SQL text of a single statement.
///
/// The text is never empty. It runs against whatever warehouse, database,
/// schema and role the session currently has.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Statement(String);

impl Statement {
    pub fn new(sql: impl Into<String>) -> Result<Statement, ExecutionError> {
        let sql = sql.into();
        if sql.trim().is_empty() {
            return Err(ExecutionError::EmptyStatement);
        }
        Ok(Statement(sql))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.0.trim())
    }
}

/// A caller-supplied identifier that is safe to splice into SQL text.
///
/// Identifiers are ASCII letters, digits and underscores, not starting with
/// a digit. They are rendered verbatim, so the warehouse resolves them with
/// its usual case folding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Ident(String);

impl Ident {
    pub fn new(name: impl Into<String>) -> Result<Ident, IdentError> {
        let name = name.into();
        let Some(first) = name.chars().next() else {
            return Err(IdentError::Empty);
        };
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(IdentError::InvalidCharacter { name });
        }
        if first.is_ascii_digit() {
            return Err(IdentError::LeadingDigit { name });
        }
        Ok(Ident(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Ident {
    type Err = IdentError;

    fn from_str(s: &str) -> Result<Ident, IdentError> {
        Ident::new(s)
    }
}

impl<'de> Deserialize<'de> for Ident {
    fn deserialize<D>(deserializer: D) -> Result<Ident, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ident::new(s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A dot-separated name of up to three [`Ident`]s, e.g. `DB.SCHEMA.OBJECT`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "String")]
pub struct QualifiedName(Vec<Ident>);

impl QualifiedName {
    pub const MAX_PARTS: usize = 3;

    pub fn parse(name: &str) -> Result<QualifiedName, IdentError> {
        let parts = name
            .split('.')
            .map(Ident::new)
            .collect::<Result<Vec<_>, _>>()?;
        if parts.len() > Self::MAX_PARTS {
            return Err(IdentError::TooManyParts {
                name: name.to_string(),
                max: Self::MAX_PARTS,
            });
        }
        Ok(QualifiedName(parts))
    }

    /// Like [`QualifiedName::parse`], but requires exactly `expected` parts.
    pub fn parse_exact(name: &str, expected: usize) -> Result<QualifiedName, IdentError> {
        let parsed = QualifiedName::parse(name)?;
        if parsed.0.len() != expected {
            return Err(IdentError::WrongPartCount {
                name: name.to_string(),
                expected,
            });
        }
        Ok(parsed)
    }

    pub fn parts(&self) -> &[Ident] {
        &self.0
    }

    /// Returns the last part of the name.
    pub fn item(&self) -> &Ident {
        self.0.last().expect("qualified names are never empty")
    }

    /// Returns a new name with `ident` appended.
    pub fn join(&self, ident: &Ident) -> Result<QualifiedName, IdentError> {
        let mut parts = self.0.clone();
        parts.push(ident.clone());
        if parts.len() > Self::MAX_PARTS {
            return Err(IdentError::TooManyParts {
                name: format!("{self}.{ident}"),
                max: Self::MAX_PARTS,
            });
        }
        Ok(QualifiedName(parts))
    }
}

impl From<Ident> for QualifiedName {
    fn from(ident: Ident) -> QualifiedName {
        QualifiedName(vec![ident])
    }
}

impl From<QualifiedName> for String {
    fn from(name: QualifiedName) -> String {
        name.to_string()
    }
}

impl FromStr for QualifiedName {
    type Err = IdentError;

    fn from_str(s: &str) -> Result<QualifiedName, IdentError> {
        QualifiedName::parse(s)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(part.as_str())?;
        }
        Ok(())
    }
}

/// Renders `s` as a single-quoted SQL string literal.
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ident_validation() {
        assert!(Ident::new("FACT_CLAIMS").is_ok());
        assert!(Ident::new("_hidden2").is_ok());
        assert_eq!(Ident::new(""), Err(IdentError::Empty));
        for bad in ["t; DROP TABLE x", "a'b", "a\"b", "a.b", "a b", "tbl--"] {
            assert!(
                matches!(Ident::new(bad), Err(IdentError::InvalidCharacter { .. })),
                "{bad} accepted"
            );
        }
        assert!(matches!(
            Ident::new("1abc"),
            Err(IdentError::LeadingDigit { .. })
        ));
    }

    #[test]
    fn test_qualified_name() {
        let name = QualifiedName::parse("INSURANCE_GROUP_DB.INSURANCE_GROUP_SCHEMA").unwrap();
        assert_eq!(name.parts().len(), 2);
        assert_eq!(name.item().as_str(), "INSURANCE_GROUP_SCHEMA");

        let table = name.join(&Ident::new("CLAIMS").unwrap()).unwrap();
        assert_eq!(
            table.to_string(),
            "INSURANCE_GROUP_DB.INSURANCE_GROUP_SCHEMA.CLAIMS"
        );
        assert!(matches!(
            table.join(&Ident::new("X").unwrap()),
            Err(IdentError::TooManyParts { .. })
        ));

        assert!(QualifiedName::parse_exact("DB.SCHEMA.T", 3).is_ok());
        assert!(matches!(
            QualifiedName::parse_exact("DB.T", 3),
            Err(IdentError::WrongPartCount { expected: 3, .. })
        ));

        assert!(QualifiedName::parse("a..b").is_err());
        assert!(QualifiedName::parse("a.b.c.d").is_err());
        assert!(QualifiedName::parse("").is_err());
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("PIPE_A"), "'PIPE_A'");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn test_statement_rejects_empty() {
        assert_eq!(Statement::new("  \n"), Err(ExecutionError::EmptyStatement));
        let stmt = Statement::new("\n  SHOW ROLES;\n").unwrap();
        assert_eq!(stmt.to_string(), "SHOW ROLES;");
    }
}
