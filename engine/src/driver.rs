//! The physical database driver boundary (spec.md §6 "Driver interface
//! (consumed)"): `execute(sql, params) -> Rows`, with the driver owning
//! parameter substitution. Out of scope for the core per spec.md §1; this
//! module only defines the trait the core consumes and an in-memory
//! implementation for the demo CLI and engine tests, grounded on the
//! teacher's `datastore::ops::query::run_query` (prepare a statement, bind
//! params, stream rows back as plain maps).

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::{EngineError, Result};
use crate::security::CancellationToken;
use crate::value::{Row, Value};

/// Executes already-generated, parameterized SQL and returns rows. The
/// core never inspects `sql` beyond passing it through; all literal
/// interpolation happens upstream in the generator.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn execute(&self, sql: &str, params: &[Value], cancel: &CancellationToken) -> Result<Vec<Row>>;
}

/// An in-memory table keyed by object name, used by the demo CLI and by
/// engine tests that need a driver without a real database. It does not
/// parse SQL; callers register the rows a given generated statement should
/// yield by `sql` text, mimicking a fixture-backed test double.
#[derive(Default)]
pub struct MockDriver {
    fixtures: HashMap<String, Vec<Row>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the rows that a subsequent `execute` call with SQL text
    /// containing `sql_fragment` should return.
    pub fn fixture(&mut self, sql_fragment: impl Into<String>, rows: Vec<Row>) {
        self.fixtures.insert(sql_fragment.into(), rows);
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn execute(&self, sql: &str, _params: &[Value], cancel: &CancellationToken) -> Result<Vec<Row>> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        for (fragment, rows) in &self.fixtures {
            if sql.contains(fragment.as_str()) {
                return Ok(rows.clone());
            }
        }
        Ok(Vec::new())
    }
}
