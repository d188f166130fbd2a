use std::sync::Arc;

use async_trait::async_trait;
use const_format::formatcp;
use prometheus::Registry;

use super::columns::{ColumnGauges, ColumnMetric};
use super::template::{QueryParam, QueryTemplate, ResultRow};
use super::POSTGRES_METRIC_PREFIX;
use crate::errors::BinderResult;
use crate::internals::{BinderConfig, MeterBinder, RefreshAction, RefreshHandle, Scheduler};
use crate::prometheus_metrics::LABEL_RELNAME;

const SQL: &str = include_str!("sql/statio.sql");

const TASK_NAME: &str = formatcp!("{POSTGRES_METRIC_PREFIX}_statio");

const METRICS: &[ColumnMetric] = &[
    ColumnMetric {
        column: "heap_blks_read",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_heap_blks_read"),
        help: "Number of disk blocks read from this table",
    },
    ColumnMetric {
        column: "heap_blks_hit",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_heap_blks_hit"),
        help: "Number of buffer hits in this table",
    },
    ColumnMetric {
        column: "idx_blks_read",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_idx_blks_read"),
        help: "Number of disk blocks read from all indexes on this table",
    },
    ColumnMetric {
        column: "idx_blks_hit",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_idx_blks_hit"),
        help: "Number of buffer hits in all indexes on this table",
    },
    ColumnMetric {
        column: "toast_blks_read",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_toast_blks_read"),
        help: "Number of disk blocks read from this table's TOAST table",
    },
    ColumnMetric {
        column: "toast_blks_hit",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_toast_blks_hit"),
        help: "Number of buffer hits in this table's TOAST table",
    },
    ColumnMetric {
        column: "tidx_blks_read",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_tidx_blks_read"),
        help: "Number of disk blocks read from this table's TOAST table indexes",
    },
    ColumnMetric {
        column: "tidx_blks_hit",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_tidx_blks_hit"),
        help: "Number of buffer hits in this table's TOAST table indexes",
    },
];

/// Publishes block-level I/O statistics of the matching tables.
///
/// Tables without indexes, or without a TOAST table, have no value for the corresponding gauges.
pub struct StatioMetrics {
    template: Arc<dyn QueryTemplate>,
    relname: String,
    config: BinderConfig,
}

impl StatioMetrics {
    pub fn new(template: Arc<dyn QueryTemplate>, relname: impl Into<String>, config: BinderConfig) -> Self {
        Self {
            template,
            relname: relname.into(),
            config,
        }
    }
}

#[async_trait]
impl MeterBinder for StatioMetrics {
    async fn attach(self, registry: Arc<Registry>, scheduler: &Scheduler) -> BinderResult<RefreshHandle> {
        let refresh = RefreshStatio {
            template: self.template,
            relname: self.relname,
            gauges: ColumnGauges::new(METRICS, LABEL_RELNAME, "relname", &self.config.tags, &registry),
        };

        scheduler.run(Arc::new(refresh), self.config.schedule).await
    }
}

struct RefreshStatio {
    template: Arc<dyn QueryTemplate>,
    relname: String,
    gauges: ColumnGauges,
}

#[async_trait]
impl RefreshAction for RefreshStatio {
    fn name(&self) -> &str {
        TASK_NAME
    }

    async fn refresh(&self) -> BinderResult<()> {
        let params = [QueryParam::from(self.relname.as_str())];
        self.template.query(SQL, &params, &mut |row: &dyn ResultRow| self.gauges.observe(row)).await
    }
}
