use async_trait::async_trait;

use crate::errors::{BinderError, BinderResult};

/// A positional (`$1`, `$2`...) query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryParam {
    Text(String),
    Int(i64),
}

impl From<&str> for QueryParam {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<i64> for QueryParam {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

/// A single row of a query result, with values accessed by column name.
///
/// Getters fail with [`BinderError::Mapping`] if the column doesn't exist or has a different type,
/// and return `None` if the value is `NULL`.
pub trait ResultRow {
    fn get_string(&self, column: &str) -> BinderResult<Option<String>>;

    fn get_i64(&self, column: &str) -> BinderResult<Option<i64>>;

    fn get_bool(&self, column: &str) -> BinderResult<Option<bool>>;

    /// Timestamp as milliseconds since the UNIX epoch.
    fn get_timestamp_millis(&self, column: &str) -> BinderResult<Option<i64>>;

    /// Like [`Self::get_string`], but `NULL` is a [`BinderError::Mapping`] too.
    fn required_string(&self, column: &str) -> BinderResult<String> {
        self.get_string(column)?.ok_or_else(|| null_column(column))
    }

    /// Like [`Self::get_bool`], but `NULL` is a [`BinderError::Mapping`] too.
    fn required_bool(&self, column: &str) -> BinderResult<bool> {
        self.get_bool(column)?.ok_or_else(|| null_column(column))
    }
}

fn null_column(column: &str) -> BinderError {
    BinderError::Mapping(format!("column '{column}' is NULL"))
}

/// Callback invoked for each row of a query result.
///
/// Returning an error stops the iteration, and fails the whole query.
pub type RowHandler<'a> = dyn FnMut(&dyn ResultRow) -> BinderResult<()> + Send + 'a;

/// Runs parameterized SQL, streaming the resulting rows into a [`RowHandler`].
#[async_trait]
pub trait QueryTemplate: Send + Sync {
    async fn query(&self, sql: &str, params: &[QueryParam], handler: &mut RowHandler<'_>) -> BinderResult<()>;
}
