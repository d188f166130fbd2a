use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use const_format::formatcp;
use prometheus::{IntGauge, Registry};

use super::columns::{ColumnGauges, ColumnMetric};
use super::template::{QueryParam, QueryTemplate, ResultRow};
use super::POSTGRES_METRIC_PREFIX;
use crate::errors::BinderResult;
use crate::internals::{BinderConfig, InstrumentCache, MeterBinder, RefreshAction, RefreshHandle, Scheduler};
use crate::prometheus_metrics::{MetricDescriptor, Tags, LABEL_RELNAME};

const SQL: &str = include_str!("sql/autovacuum.sql");
const RUNNING_VACUUMS_SQL: &str = include_str!("sql/running_vacuums.sql");

const TASK_NAME: &str = formatcp!("{POSTGRES_METRIC_PREFIX}_autovacuum");

const COUNTS: &[ColumnMetric] = &[
    ColumnMetric {
        column: "autovacuum_count",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_autovacuum_count"),
        help: "Number of times this table has been vacuumed by the autovacuum daemon",
    },
    ColumnMetric {
        column: "autoanalyze_count",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_autoanalyze_count"),
        help: "Number of times this table has been analyzed by the autovacuum daemon",
    },
];

const RUNNING_VACUUMS: &str = formatcp!("{POSTGRES_METRIC_PREFIX}_running_vacuums");

/// Gauges about the last time something happened to a table.
struct LastRun {
    column: &'static str,
    timestamp: InstrumentCache<IntGauge>,
    offset: InstrumentCache<IntGauge>,
}

impl LastRun {
    fn new(column: &'static str, what: &str, tags: &Tags, registry: &Arc<Registry>) -> Self {
        let timestamp = MetricDescriptor::new(
            format!("{POSTGRES_METRIC_PREFIX}_{column}"),
            format!("Last time (ms since UNIX epoch) this table was {what} by the autovacuum daemon"),
            tags.clone(),
        );
        let offset = MetricDescriptor::new(
            format!("{POSTGRES_METRIC_PREFIX}_{column}_offset"),
            format!("Time (ms) since this table was last {what} by the autovacuum daemon"),
            tags.clone(),
        );

        Self {
            column,
            timestamp: InstrumentCache::new(timestamp, &[LABEL_RELNAME], registry.clone()),
            offset: InstrumentCache::new(offset, &[LABEL_RELNAME], registry.clone()),
        }
    }

    fn observe(&self, relname: &str, row: &dyn ResultRow, now_ms: i64) -> BinderResult<()> {
        match row.get_timestamp_millis(self.column)? {
            Some(ts) => {
                self.timestamp.get_or_create(&[relname])?.set(ts);
                self.offset.get_or_create(&[relname])?.set(now_ms - ts);
            },
            // Never happened: nothing to report, rather than pretending it happened at the epoch
            None => trace!("'{}' of {LABEL_RELNAME}='{relname}' is NULL", self.column),
        }
        Ok(())
    }
}

/// Publishes autovacuum activity of the matching tables, and the number of vacuums currently running.
pub struct AutoVacuumMetrics {
    template: Arc<dyn QueryTemplate>,
    relname: String,
    config: BinderConfig,
}

impl AutoVacuumMetrics {
    /// Create a new [`AutoVacuumMetrics`]
    ///
    /// # Arguments
    ///
    /// * `template` - Runs the queries
    /// * `relname` - SQL `LIKE` pattern of the tables to observe
    /// * `config` - Static tags and refresh schedule
    pub fn new(template: Arc<dyn QueryTemplate>, relname: impl Into<String>, config: BinderConfig) -> Self {
        Self {
            template,
            relname: relname.into(),
            config,
        }
    }
}

#[async_trait]
impl MeterBinder for AutoVacuumMetrics {
    async fn attach(self, registry: Arc<Registry>, scheduler: &Scheduler) -> BinderResult<RefreshHandle> {
        let tags = &self.config.tags;
        let running_vacuums = MetricDescriptor::new(RUNNING_VACUUMS, "Number of vacuums currently running", tags.clone())
            .register(&registry)?;

        let refresh = RefreshAutoVacuum {
            template: self.template,
            relname: self.relname,
            counts: ColumnGauges::new(COUNTS, LABEL_RELNAME, "relname", tags, &registry),
            last_runs: [
                LastRun::new("last_autovacuum", "vacuumed", tags, &registry),
                LastRun::new("last_autoanalyze", "analyzed", tags, &registry),
            ],
            running_vacuums,
        };

        scheduler.run(Arc::new(refresh), self.config.schedule).await
    }
}

struct RefreshAutoVacuum {
    template: Arc<dyn QueryTemplate>,
    relname: String,
    counts: ColumnGauges,
    last_runs: [LastRun; 2],
    running_vacuums: IntGauge,
}

#[async_trait]
impl RefreshAction for RefreshAutoVacuum {
    fn name(&self) -> &str {
        TASK_NAME
    }

    async fn refresh(&self) -> BinderResult<()> {
        let params = [QueryParam::from(self.relname.as_str())];
        let now_ms = Utc::now().timestamp_millis();
        self.template
            .query(SQL, &params, &mut |row: &dyn ResultRow| {
                self.counts.observe(row)?;

                let relname = row.required_string("relname")?;
                for last_run in &self.last_runs {
                    last_run.observe(&relname, row, now_ms)?;
                }
                Ok(())
            })
            .await?;

        self.template
            .query(RUNNING_VACUUMS_SQL, &[], &mut |row: &dyn ResultRow| {
                if let Some(count) = row.get_i64("count")? {
                    self.running_vacuums.set(count);
                }
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod test {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::internals::Schedule;
    use crate::postgres::mock::{row, MockTemplate, MockValue};
    use crate::prometheus_metrics::testing::{gauge_value, instrument_count};

    #[tokio::test]
    async fn should_publish_counts_timestamps_and_running_vacuums() {
        let vacuumed_at = Utc::now().timestamp_millis() - 5_000;

        let template = Arc::new(MockTemplate::default());
        template.set_rows(
            SQL,
            vec![row()
                .with("relname", MockValue::Text("orders"))
                .with("autovacuum_count", MockValue::Int(4))
                .with("autoanalyze_count", MockValue::Int(9))
                .with("last_autovacuum", MockValue::TimestampMillis(vacuumed_at))
                .with("last_autoanalyze", MockValue::Null)],
        );
        template.set_rows(RUNNING_VACUUMS_SQL, vec![row().with("count", MockValue::Int(2))]);

        let registry = Arc::new(Registry::new());
        let binder = AutoVacuumMetrics::new(template.clone(), "%", BinderConfig::new(Schedule::Once));
        binder.attach(registry.clone(), &Scheduler::current(CancellationToken::new())).await.unwrap();

        let orders = [(LABEL_RELNAME, "orders")];
        assert_eq!(gauge_value(&registry, "postgres_autovacuum_count", &orders), Some(4.0));
        assert_eq!(gauge_value(&registry, "postgres_autoanalyze_count", &orders), Some(9.0));
        assert_eq!(gauge_value(&registry, "postgres_last_autovacuum", &orders), Some(vacuumed_at as f64));

        let offset = gauge_value(&registry, "postgres_last_autovacuum_offset", &orders).unwrap();
        assert!((5_000.0..60_000.0).contains(&offset), "unexpected offset {offset}");

        // Never analyzed
        assert_eq!(instrument_count(&registry, "postgres_last_autoanalyze"), 0);
        assert_eq!(instrument_count(&registry, "postgres_last_autoanalyze_offset"), 0);

        assert_eq!(gauge_value(&registry, "postgres_running_vacuums", &[]), Some(2.0));
        assert_eq!(template.executed().len(), 2);
    }

    #[tokio::test]
    async fn should_fail_attach_when_already_registered() {
        let template: Arc<dyn QueryTemplate> = Arc::new(MockTemplate::default());
        let registry = Arc::new(Registry::new());
        let scheduler = Scheduler::current(CancellationToken::new());

        AutoVacuumMetrics::new(template.clone(), "%", BinderConfig::new(Schedule::Once))
            .attach(registry.clone(), &scheduler)
            .await
            .unwrap();
        let res = AutoVacuumMetrics::new(template, "%", BinderConfig::new(Schedule::Once))
            .attach(registry, &scheduler)
            .await;

        assert!(matches!(res, Err(crate::BinderError::Registration { .. })));
    }
}
