// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Reshaping of warehouse rows into stable output records.
//!
//! A [`Projection`] declares exactly which fields an output record has and
//! where each one comes from. Projected records contain every declared field
//! and nothing else, whatever columns the warehouse happened to return.

use std::collections::BTreeSet;
use std::fmt;

use serde_json::Value;

use crate::row::Row;

/// How a single output field is derived from a source row.
#[derive(Clone)]
enum Rule {
    /// The source column, or null when absent.
    Copy(&'static str),
    /// The source column when present, otherwise a fixed default.
    CopyOr(&'static str, Value),
    /// A transform of the (possibly absent) source column.
    Map(&'static str, fn(Option<&Value>) -> Value),
}

/// One field of a [`Projection`].
#[derive(Clone)]
pub struct Field {
    output: &'static str,
    rule: Rule,
}

impl Field {
    /// Copies `source` verbatim, yielding null when the row lacks it.
    pub fn copy(output: &'static str, source: &'static str) -> Field {
        Field {
            output,
            rule: Rule::Copy(source),
        }
    }

    /// Copies `source` if it is present, otherwise uses `default`.
    ///
    /// See [`is_present`] for what counts as present.
    pub fn copy_or(output: &'static str, source: &'static str, default: impl Into<Value>) -> Field {
        Field {
            output,
            rule: Rule::CopyOr(source, default.into()),
        }
    }

    /// Derives the field from `source` with `f`.
    pub fn map(
        output: &'static str,
        source: &'static str,
        f: fn(Option<&Value>) -> Value,
    ) -> Field {
        Field {
            output,
            rule: Rule::Map(source, f),
        }
    }

    fn apply(&self, row: &Row) -> Value {
        match &self.rule {
            Rule::Copy(source) => row.get(source).cloned().unwrap_or(Value::Null),
            Rule::CopyOr(source, default) => match row.get(source) {
                Some(v) if is_present(v) => v.clone(),
                _ => default.clone(),
            },
            Rule::Map(source, f) => f(row.get(source)),
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let source = match &self.rule {
            Rule::Copy(s) | Rule::CopyOr(s, _) | Rule::Map(s, _) => s,
        };
        f.debug_struct("Field")
            .field("output", &self.output)
            .field("source", source)
            .finish()
    }
}

/// Reports whether `value` counts as present for [`Field::copy_or`].
///
/// Nulls, empty strings, `false` and zero are all treated as absent, so the
/// default also covers columns the warehouse reports but leaves blank.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// A declared output shape plus an optional allow-list filter.
#[derive(Debug, Clone, Default)]
pub struct Projection {
    fields: Vec<Field>,
    allow: Option<(&'static str, BTreeSet<String>)>,
}

impl Projection {
    pub fn new(fields: Vec<Field>) -> Projection {
        Projection {
            fields,
            allow: None,
        }
    }

    /// Only keeps rows whose `column` holds one of `names`.
    pub fn allow<I, S>(mut self, column: &'static str, names: I) -> Projection
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow = Some((column, names.into_iter().map(Into::into).collect()));
        self
    }

    fn admits(&self, row: &Row) -> bool {
        match &self.allow {
            None => true,
            Some((column, names)) => row
                .get_str(column)
                .map_or(false, |value| names.contains(value)),
        }
    }

    /// Projects a single row, ignoring the allow-list.
    pub fn project_row(&self, row: &Row) -> Row {
        self.fields
            .iter()
            .map(|field| (field.output, field.apply(row)))
            .collect()
    }

    /// Projects `rows`, dropping those the allow-list rejects.
    pub fn project(&self, rows: &[Row]) -> Vec<Row> {
        rows.iter()
            .filter(|row| self.admits(row))
            .map(|row| self.project_row(row))
            .collect()
    }
}

/// Collects one column of `rows` into a flat list, null where absent.
pub fn column(rows: &[Row], column: &str) -> Vec<Value> {
    rows.iter()
        .map(|row| row.get(column).cloned().unwrap_or(Value::Null))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn task(name: &str, warehouse: Value) -> Row {
        [
            ("name", json!(name)),
            ("schema_name", json!("FACTS")),
            ("warehouse", warehouse),
            ("extra_column", json!(42)),
        ]
        .into_iter()
        .collect()
    }

    fn task_projection() -> Projection {
        Projection::new(vec![
            Field::copy("name", "name"),
            Field::copy("schema", "schema_name"),
            Field::copy_or("warehouse", "warehouse", "--"),
            Field::copy_or("owner", "owner", "--"),
        ])
        .allow("name", ["CLAIMS_INSERT_TASK", "FACTFRAUD_TASK"])
    }

    #[test]
    fn test_projection_shape() {
        let rows = vec![
            task("CLAIMS_INSERT_TASK", json!("WH")),
            task("FACTFRAUD_TASK", json!("")),
        ];
        let out = task_projection().project(&rows);
        assert_eq!(out.len(), 2);
        for row in &out {
            let columns: Vec<_> = row.columns().collect();
            assert_eq!(columns, vec!["name", "schema", "warehouse", "owner"]);
        }
        assert_eq!(out[0].get_str("warehouse"), Some("WH"));
        assert_eq!(out[1].get_str("warehouse"), Some("--"));
        assert_eq!(out[1].get_str("owner"), Some("--"));
        assert_eq!(out[0].get_str("schema"), Some("FACTS"));
    }

    #[test]
    fn test_allow_list_drops_rows() {
        let rows = vec![
            task("OTHER_TASK", json!("WH")),
            task("FACTFRAUD_TASK", json!("WH")),
            Row::new(),
        ];
        let out = task_projection().project(&rows);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_str("name"), Some("FACTFRAUD_TASK"));
    }

    #[test]
    fn test_copy_yields_null_when_absent() {
        let projection = Projection::new(vec![Field::copy("rows", "rows")]);
        let out = projection.project_row(&Row::new());
        assert_eq!(out.get("rows"), Some(&Value::Null));
    }

    #[test]
    fn test_map() {
        let projection = Projection::new(vec![Field::map("invalid", "invalid", |v| {
            match v.and_then(Value::as_str) {
                Some("Y") => json!("Invalid"),
                _ => json!("Valid"),
            }
        })]);
        let invalid: Row = [("invalid", json!("Y"))].into_iter().collect();
        let valid: Row = [("invalid", json!("N"))].into_iter().collect();
        assert_eq!(projection.project_row(&invalid).get_str("invalid"), Some("Invalid"));
        assert_eq!(projection.project_row(&valid).get_str("invalid"), Some("Valid"));
        assert_eq!(projection.project_row(&Row::new()).get_str("invalid"), Some("Valid"));
    }

    #[test]
    fn test_is_present() {
        assert!(!is_present(&json!(null)));
        assert!(!is_present(&json!("")));
        assert!(!is_present(&json!(0)));
        assert!(!is_present(&json!(false)));
        assert!(is_present(&json!("0 sec")));
        assert!(is_present(&json!(3)));
    }

    #[test]
    fn test_column() {
        let rows = vec![task("A", json!(null)), Row::new()];
        assert_eq!(column(&rows, "name"), vec![json!("A"), Value::Null]);
    }
}
