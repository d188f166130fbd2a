use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use const_format::formatcp;
use prometheus::{IntGauge, Registry};

use super::template::{QueryTemplate, ResultRow};
use super::POSTGRES_METRIC_PREFIX;
use crate::errors::BinderResult;
use crate::internals::{BinderConfig, InstrumentCache, MeterBinder, RefreshAction, RefreshHandle, Scheduler};
use crate::prometheus_metrics::{MetricDescriptor, LABEL_WAIT_EVENT, LABEL_WAIT_EVENT_TYPE};

const SLOW_QUERY_SQL: &str = include_str!("sql/slow_query_count.sql");
const WAITS_SQL: &str = include_str!("sql/query_by_wait.sql");

/// Replaced, in [`SLOW_QUERY_SQL`], with the threshold in seconds.
const THRESHOLD_TOKEN: &str = ":::threshold";

const TASK_NAME: &str = formatcp!("{POSTGRES_METRIC_PREFIX}_queries");

const SLOW_QUERIES: &str = formatcp!("{POSTGRES_METRIC_PREFIX}_slow_queries");
const QUERY_WAITS: &str = formatcp!("{POSTGRES_METRIC_PREFIX}_query_waits");

fn slow_query_sql(threshold: Duration) -> String {
    SLOW_QUERY_SQL.replace(THRESHOLD_TOKEN, &threshold.as_secs().to_string())
}

/// Publishes how many queries have been active for longer than a threshold,
/// and what the active queries are waiting on.
pub struct QueryMetrics {
    template: Arc<dyn QueryTemplate>,
    slow_query_threshold: Duration,
    config: BinderConfig,
}

impl QueryMetrics {
    /// Create a new [`QueryMetrics`]
    ///
    /// # Arguments
    ///
    /// * `template` - Runs the queries
    /// * `slow_query_threshold` - How long a query must be active to be counted as slow (whole seconds)
    /// * `config` - Static tags and refresh schedule
    pub fn new(template: Arc<dyn QueryTemplate>, slow_query_threshold: Duration, config: BinderConfig) -> Self {
        Self {
            template,
            slow_query_threshold,
            config,
        }
    }
}

#[async_trait]
impl MeterBinder for QueryMetrics {
    async fn attach(self, registry: Arc<Registry>, scheduler: &Scheduler) -> BinderResult<RefreshHandle> {
        let slow_queries = MetricDescriptor::new(
            SLOW_QUERIES,
            format!("Number of queries active for more than {}s", self.slow_query_threshold.as_secs()),
            self.config.tags.clone(),
        )
        .register(&registry)?;

        let waits = MetricDescriptor::new(QUERY_WAITS, "Number of queries waiting, by wait event", self.config.tags.clone());

        let refresh = RefreshQueries {
            template: self.template,
            slow_query_sql: slow_query_sql(self.slow_query_threshold),
            slow_queries,
            waits: InstrumentCache::new(waits, &[LABEL_WAIT_EVENT, LABEL_WAIT_EVENT_TYPE], registry),
        };

        scheduler.run(Arc::new(refresh), self.config.schedule).await
    }
}

struct RefreshQueries {
    template: Arc<dyn QueryTemplate>,
    slow_query_sql: String,
    slow_queries: IntGauge,
    waits: InstrumentCache<IntGauge>,
}

#[async_trait]
impl RefreshAction for RefreshQueries {
    fn name(&self) -> &str {
        TASK_NAME
    }

    async fn refresh(&self) -> BinderResult<()> {
        self.template
            .query(&self.slow_query_sql, &[], &mut |row: &dyn ResultRow| {
                if let Some(count) = row.get_i64("count")? {
                    self.slow_queries.set(count);
                }
                Ok(())
            })
            .await?;

        self.template
            .query(WAITS_SQL, &[], &mut |row: &dyn ResultRow| {
                let event = row.required_string("wait_event")?;
                let event_type = row.required_string("wait_event_type")?;
                if let Some(count) = row.get_i64("count")? {
                    self.waits.get_or_create(&[event.as_str(), event_type.as_str()])?.set(count);
                }
                Ok(())
            })
            .await
    }
}
