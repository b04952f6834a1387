// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Where the dashboard's warehouse objects live.

use std::fmt;
use std::str::FromStr;

use guardian_warehouse::{Ident, IdentError, QualifiedName};

/// A `DATABASE.SCHEMA` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaName {
    pub database: Ident,
    pub schema: Ident,
}

impl SchemaName {
    /// Returns the fully qualified name of `item` within this schema.
    pub fn qualify(&self, item: &Ident) -> String {
        format!("{}.{}.{}", self.database, self.schema, item)
    }
}

impl FromStr for SchemaName {
    type Err = IdentError;

    fn from_str(s: &str) -> Result<SchemaName, IdentError> {
        let name = QualifiedName::parse_exact(s, 2)?;
        let [database, schema] = name.parts() else {
            unreachable!("parse_exact returned the wrong number of parts");
        };
        Ok(SchemaName {
            database: database.clone(),
            schema: schema.clone(),
        })
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.schema)
    }
}

/// The objects the dashboard reports on.
#[derive(Debug, Clone)]
pub struct Layout {
    /// Schema holding the landing stages, pipes, streams and materialized
    /// views.
    pub ingest_schema: SchemaName,
    /// Schema holding the dimension and fact tables and their tasks.
    pub fact_schema: SchemaName,
    /// Pipe refreshed on demand after an upload.
    pub refresh_pipe: QualifiedName,
    /// Table whose row count is reported after an upload.
    pub rowcount_table: QualifiedName,
    /// Resource monitor whose credit usage is reported.
    pub resource_monitor: String,
    /// Tasks listed on the tasks page. Others are hidden.
    pub monitored_tasks: Vec<String>,
}

impl Layout {
    pub const DEFAULT_INGEST_SCHEMA: &'static str = "INSURANCE_GROUP_DB.INSURANCE_GROUP_SCHEMA";
    pub const DEFAULT_FACT_SCHEMA: &'static str = "INSURANCE_GROUP_DB.INSURANCE_SCHEMA_FACT_TABLES";
    pub const DEFAULT_REFRESH_PIPE: &'static str = "FRAUDALERTPIPE";
    pub const DEFAULT_ROWCOUNT_TABLE: &'static str = "FRAUD_ALERTS";
    pub const DEFAULT_RESOURCE_MONITOR: &'static str = "MONITOR_INSURANCE";
    pub const DEFAULT_MONITORED_TASKS: &'static str =
        "CLAIMS_INSERT_TASK,SETTLEMENT_UPDATE_TASK,FACTFRAUD_TASK";
}

impl Default for Layout {
    fn default() -> Layout {
        let parse_err = "default layout names are valid";
        Layout {
            ingest_schema: Self::DEFAULT_INGEST_SCHEMA.parse().expect(parse_err),
            fact_schema: Self::DEFAULT_FACT_SCHEMA.parse().expect(parse_err),
            refresh_pipe: Self::DEFAULT_REFRESH_PIPE.parse().expect(parse_err),
            rowcount_table: Self::DEFAULT_ROWCOUNT_TABLE.parse().expect(parse_err),
            resource_monitor: Self::DEFAULT_RESOURCE_MONITOR.into(),
            monitored_tasks: Self::DEFAULT_MONITORED_TASKS
                .split(',')
                .map(String::from)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_name() {
        let schema: SchemaName = "INSURANCE_GROUP_DB.INSURANCE_GROUP_SCHEMA".parse().unwrap();
        assert_eq!(schema.database.as_str(), "INSURANCE_GROUP_DB");
        let pipe = Ident::new("CLAIMSPIPE").unwrap();
        assert_eq!(
            schema.qualify(&pipe),
            "INSURANCE_GROUP_DB.INSURANCE_GROUP_SCHEMA.CLAIMSPIPE"
        );

        assert!("JUST_A_SCHEMA".parse::<SchemaName>().is_err());
        assert!("A.B.C".parse::<SchemaName>().is_err());
        assert!("A.B;--".parse::<SchemaName>().is_err());
    }

    #[test]
    fn test_default_layout() {
        let layout = Layout::default();
        assert_eq!(
            layout.fact_schema.to_string(),
            Layout::DEFAULT_FACT_SCHEMA
        );
        assert_eq!(layout.monitored_tasks.len(), 3);
    }
}
