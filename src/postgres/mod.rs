//! Binders observing a Postgres database through its statistics views (`pg_stat_*`, `pg_locks`...).
//!
//! Binders don't talk to the database directly: they run their SQL through a [`QueryTemplate`].
//! With the `postgres` feature enabled, [`PostgresTemplate`] provides one backed by `tokio-postgres`.

// Inner modules
mod autovacuum;
mod columns;
mod database;
mod index;
mod lock;
#[cfg(test)]
pub(crate) mod mock;
#[cfg(feature = "postgres")]
mod pg;
mod query;
mod settings;
mod statio;
mod table_size;
mod template;
mod transaction;
mod tuple;

/// Prefix of every Postgres metric name.
const POSTGRES_METRIC_PREFIX: &str = "postgres";

// Exports
pub use autovacuum::AutoVacuumMetrics;
pub use database::DatabaseMetrics;
pub use index::IndexMetrics;
pub use lock::LockMetrics;
#[cfg(feature = "postgres")]
pub use pg::{PostgresConnector, PostgresTemplate};
pub use query::QueryMetrics;
pub use settings::SettingsMetrics;
pub use statio::StatioMetrics;
pub use table_size::TableSizeMetrics;
pub use template::{QueryParam, QueryTemplate, ResultRow, RowHandler};
pub use transaction::TransactionMetrics;
pub use tuple::TupleMetrics;
