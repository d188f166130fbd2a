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

const SQL: &str = include_str!("sql/table_size.sql");

const TASK_NAME: &str = formatcp!("{POSTGRES_METRIC_PREFIX}_table_size");

const METRICS: &[ColumnMetric] = &[
    ColumnMetric {
        column: "pg_relation_size_main",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_relation_size_main_bytes"),
        help: "The size of the main data fork of the relation",
    },
    ColumnMetric {
        column: "pg_relation_size_fsm",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_relation_size_fsm_bytes"),
        help: "The size of the Free Space Map",
    },
    ColumnMetric {
        column: "pg_relation_size_vm",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_relation_size_vm_bytes"),
        help: "The size of the Visibility Map",
    },
    ColumnMetric {
        column: "pg_table_size",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_table_size_bytes"),
        help: "The size of the table, excluding indexes",
    },
    ColumnMetric {
        column: "pg_total_relation_size",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_total_relation_size_bytes"),
        help: "The size of the table, including indexes and TOAST data",
    },
];

/// Publishes the on-disk size of the matching tables, in bytes.
pub struct TableSizeMetrics {
    template: Arc<dyn QueryTemplate>,
    relname: String,
    config: BinderConfig,
}

impl TableSizeMetrics {
    pub fn new(template: Arc<dyn QueryTemplate>, relname: impl Into<String>, config: BinderConfig) -> Self {
        Self {
            template,
            relname: relname.into(),
            config,
        }
    }
}

#[async_trait]
impl MeterBinder for TableSizeMetrics {
    async fn attach(self, registry: Arc<Registry>, scheduler: &Scheduler) -> BinderResult<RefreshHandle> {
        let refresh = RefreshTableSizes {
            template: self.template,
            relname: self.relname,
            gauges: ColumnGauges::new(METRICS, LABEL_RELNAME, "relname", &self.config.tags, &registry),
        };

        scheduler.run(Arc::new(refresh), self.config.schedule).await
    }
}

struct RefreshTableSizes {
    template: Arc<dyn QueryTemplate>,
    relname: String,
    gauges: ColumnGauges,
}

#[async_trait]
impl RefreshAction for RefreshTableSizes {
    fn name(&self) -> &str {
        TASK_NAME
    }

    async fn refresh(&self) -> BinderResult<()> {
        let params = [QueryParam::from(self.relname.as_str())];
        self.template.query(SQL, &params, &mut |row: &dyn ResultRow| self.gauges.observe(row)).await
    }
}
