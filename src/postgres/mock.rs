//! In-memory [`QueryTemplate`], returning canned rows.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::template::{QueryParam, QueryTemplate, ResultRow, RowHandler};
use crate::errors::{BinderError, BinderResult};

#[derive(Debug, Clone)]
pub(crate) enum MockValue {
    Text(&'static str),
    Int(i64),
    Bool(bool),
    TimestampMillis(i64),
    Null,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockRow(HashMap<&'static str, MockValue>);

impl MockRow {
    pub(crate) fn with(mut self, column: &'static str, value: MockValue) -> Self {
        self.0.insert(column, value);
        self
    }

    fn value(&self, column: &str) -> BinderResult<&MockValue> {
        self.0.get(column).ok_or_else(|| BinderError::Mapping(format!("no column '{column}'")))
    }

    fn mismatch(column: &str, v: &MockValue) -> BinderError {
        BinderError::Mapping(format!("column '{column}' has unexpected value {v:?}"))
    }
}

impl ResultRow for MockRow {
    fn get_string(&self, column: &str) -> BinderResult<Option<String>> {
        match self.value(column)? {
            MockValue::Text(s) => Ok(Some(s.to_string())),
            MockValue::Null => Ok(None),
            v => Err(Self::mismatch(column, v)),
        }
    }

    fn get_i64(&self, column: &str) -> BinderResult<Option<i64>> {
        match self.value(column)? {
            MockValue::Int(i) => Ok(Some(*i)),
            MockValue::Null => Ok(None),
            v => Err(Self::mismatch(column, v)),
        }
    }

    fn get_bool(&self, column: &str) -> BinderResult<Option<bool>> {
        match self.value(column)? {
            MockValue::Bool(b) => Ok(Some(*b)),
            MockValue::Null => Ok(None),
            v => Err(Self::mismatch(column, v)),
        }
    }

    fn get_timestamp_millis(&self, column: &str) -> BinderResult<Option<i64>> {
        match self.value(column)? {
            MockValue::TimestampMillis(ts) => Ok(Some(*ts)),
            MockValue::Null => Ok(None),
            v => Err(Self::mismatch(column, v)),
        }
    }
}

/// Answers each SQL text with the rows registered for it (no rows, if none were).
#[derive(Default)]
pub(crate) struct MockTemplate {
    rows: Mutex<HashMap<String, Vec<MockRow>>>,
    executed: Mutex<Vec<(String, Vec<QueryParam>)>>,
    failing: Mutex<bool>,
}

impl MockTemplate {
    pub(crate) fn set_rows(&self, sql: &str, rows: Vec<MockRow>) {
        self.rows.lock().unwrap().insert(sql.to_string(), rows);
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    /// Every query executed so far, with its parameters.
    pub(crate) fn executed(&self) -> Vec<(String, Vec<QueryParam>)> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryTemplate for MockTemplate {
    async fn query(&self, sql: &str, params: &[QueryParam], handler: &mut RowHandler<'_>) -> BinderResult<()> {
        self.executed.lock().unwrap().push((sql.to_string(), params.to_vec()));
        if *self.failing.lock().unwrap() {
            return Err(BinderError::call("query", "mock query failure"));
        }

        let rows = self.rows.lock().unwrap().get(sql).cloned().unwrap_or_default();
        for row in &rows {
            handler(row)?;
        }
        Ok(())
    }
}

pub(crate) fn row() -> MockRow {
    MockRow::default()
}
