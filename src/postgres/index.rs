use std::sync::Arc;

use async_trait::async_trait;
use const_format::formatcp;
use prometheus::Registry;

use super::columns::{ColumnGauges, ColumnMetric};
use super::template::{QueryParam, QueryTemplate, ResultRow};
use super::POSTGRES_METRIC_PREFIX;
use crate::errors::BinderResult;
use crate::internals::{BinderConfig, MeterBinder, RefreshAction, RefreshHandle, Scheduler};
use crate::prometheus_metrics::LABEL_INDEX;

const SQL: &str = include_str!("sql/index.sql");

const TASK_NAME: &str = formatcp!("{POSTGRES_METRIC_PREFIX}_index");

const METRICS: &[ColumnMetric] = &[
    ColumnMetric {
        column: "index_size",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_index_size_bytes"),
        help: "Disk space usage for the main fork of the index",
    },
    ColumnMetric {
        column: "idx_tup_read",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_idx_tup_read"),
        help: "The number of index entries returned by scans on this index",
    },
    ColumnMetric {
        column: "idx_tup_fetch",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_idx_tup_fetch"),
        help: "The number of live table rows fetched by simple index scans using this index",
    },
    ColumnMetric {
        column: "idx_scan",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_idx_scan"),
        help: "Number of index scans initiated on this index",
    },
];

/// Publishes size and usage of the indexes of the matching tables.
///
/// Indexes smaller than `min_size` bytes are ignored.
pub struct IndexMetrics {
    template: Arc<dyn QueryTemplate>,
    relname: String,
    min_size: i64,
    config: BinderConfig,
}

impl IndexMetrics {
    /// Create a new [`IndexMetrics`]
    ///
    /// # Arguments
    ///
    /// * `template` - Runs the queries
    /// * `relname` - SQL `LIKE` pattern of the tables whose indexes to observe
    /// * `min_size` - Minimum size of an index (in bytes) to be observed
    /// * `config` - Static tags and refresh schedule
    pub fn new(
        template: Arc<dyn QueryTemplate>,
        relname: impl Into<String>,
        min_size: i64,
        config: BinderConfig,
    ) -> Self {
        Self {
            template,
            relname: relname.into(),
            min_size,
            config,
        }
    }
}

#[async_trait]
impl MeterBinder for IndexMetrics {
    async fn attach(self, registry: Arc<Registry>, scheduler: &Scheduler) -> BinderResult<RefreshHandle> {
        let refresh = RefreshIndexes {
            template: self.template,
            params: [QueryParam::from(self.relname.as_str()), QueryParam::from(self.min_size)],
            gauges: ColumnGauges::new(METRICS, LABEL_INDEX, "index", &self.config.tags, &registry),
        };

        scheduler.run(Arc::new(refresh), self.config.schedule).await
    }
}

struct RefreshIndexes {
    template: Arc<dyn QueryTemplate>,
    params: [QueryParam; 2],
    gauges: ColumnGauges,
}

#[async_trait]
impl RefreshAction for RefreshIndexes {
    fn name(&self) -> &str {
        TASK_NAME
    }

    async fn refresh(&self) -> BinderResult<()> {
        self.template.query(SQL, &self.params, &mut |row: &dyn ResultRow| self.gauges.observe(row)).await
    }
}
