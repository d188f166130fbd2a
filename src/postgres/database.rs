use std::sync::Arc;

use async_trait::async_trait;
use const_format::formatcp;
use prometheus::Registry;

use super::columns::{ColumnGauges, ColumnMetric};
use super::template::{QueryParam, QueryTemplate, ResultRow};
use super::POSTGRES_METRIC_PREFIX;
use crate::errors::BinderResult;
use crate::internals::{BinderConfig, MeterBinder, RefreshAction, RefreshHandle, Scheduler};
use crate::prometheus_metrics::LABEL_DATNAME;

const SQL: &str = include_str!("sql/database.sql");

const TASK_NAME: &str = formatcp!("{POSTGRES_METRIC_PREFIX}_database");

const METRICS: &[ColumnMetric] = &[
    ColumnMetric {
        column: "deadlocks",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_deadlocks"),
        help: "Number of deadlocks detected in this database",
    },
    ColumnMetric {
        column: "xact_commit",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_xact_commit"),
        help: "Number of transactions in this database that have been committed",
    },
    ColumnMetric {
        column: "xact_rollback",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_xact_rollback"),
        help: "Number of transactions in this database that have been rolled back",
    },
];

/// Publishes database-wide transaction statistics, for each database whose name matches.
pub struct DatabaseMetrics {
    template: Arc<dyn QueryTemplate>,
    database: String,
    config: BinderConfig,
}

impl DatabaseMetrics {
    /// Create a new [`DatabaseMetrics`]
    ///
    /// # Arguments
    ///
    /// * `template` - Runs the queries
    /// * `database` - SQL `LIKE` pattern of the databases to observe
    /// * `config` - Static tags and refresh schedule
    pub fn new(template: Arc<dyn QueryTemplate>, database: impl Into<String>, config: BinderConfig) -> Self {
        Self {
            template,
            database: database.into(),
            config,
        }
    }
}

#[async_trait]
impl MeterBinder for DatabaseMetrics {
    async fn attach(self, registry: Arc<Registry>, scheduler: &Scheduler) -> BinderResult<RefreshHandle> {
        let refresh = RefreshDatabases {
            template: self.template,
            database: self.database,
            gauges: ColumnGauges::new(METRICS, LABEL_DATNAME, "datname", &self.config.tags, &registry),
        };

        scheduler.run(Arc::new(refresh), self.config.schedule).await
    }
}

struct RefreshDatabases {
    template: Arc<dyn QueryTemplate>,
    database: String,
    gauges: ColumnGauges,
}

#[async_trait]
impl RefreshAction for RefreshDatabases {
    fn name(&self) -> &str {
        TASK_NAME
    }

    async fn refresh(&self) -> BinderResult<()> {
        let params = [QueryParam::from(self.database.as_str())];
        self.template.query(SQL, &params, &mut |row: &dyn ResultRow| self.gauges.observe(row)).await
    }
}

#[cfg(test)]
mod test {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::internals::Schedule;
    use crate::postgres::mock::{row, MockTemplate, MockValue};
    use crate::prometheus_metrics::testing::{gauge_value, instrument_count};
    use crate::BinderError;

    #[tokio::test]
    async fn should_publish_per_database() {
        let template = Arc::new(MockTemplate::default());
        template.set_rows(
            SQL,
            vec![row()
                .with("datname", MockValue::Text("shop"))
                .with("deadlocks", MockValue::Int(2))
                .with("xact_commit", MockValue::Int(1_000))
                .with("xact_rollback", MockValue::Int(7))],
        );

        let registry = Arc::new(Registry::new());
        let binder = DatabaseMetrics::new(template, "sh%", BinderConfig::new(Schedule::Once));
        binder.attach(registry.clone(), &Scheduler::current(CancellationToken::new())).await.unwrap();

        assert_eq!(gauge_value(&registry, "postgres_deadlocks", &[(LABEL_DATNAME, "shop")]), Some(2.0));
        assert_eq!(gauge_value(&registry, "postgres_xact_commit", &[(LABEL_DATNAME, "shop")]), Some(1_000.0));
        assert_eq!(gauge_value(&registry, "postgres_xact_rollback", &[(LABEL_DATNAME, "shop")]), Some(7.0));
    }

    #[tokio::test]
    async fn missing_column_should_fail_refresh() {
        let template = Arc::new(MockTemplate::default());
        template.set_rows(SQL, vec![row().with("datname", MockValue::Text("shop"))]);

        let registry = Arc::new(Registry::new());
        let refresh = RefreshDatabases {
            template,
            database: "%".to_string(),
            gauges: ColumnGauges::new(METRICS, LABEL_DATNAME, "datname", &Default::default(), &registry),
        };

        assert!(matches!(refresh.refresh().await, Err(BinderError::Mapping(_))));
        assert_eq!(instrument_count(&registry, "postgres_deadlocks"), 0);
    }
}
