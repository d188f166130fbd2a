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

const SQL: &str = include_str!("sql/relfrozenxid.sql");

const METRICS: &[ColumnMetric] = &[ColumnMetric {
    column: "greatest",
    name: formatcp!("{POSTGRES_METRIC_PREFIX}_relfrozenxid_age"),
    help: "Max age of the frozen xid of the table and of its TOAST table",
}];

/// Publishes how close the matching tables are to a transaction ID wraparound.
pub struct TransactionMetrics {
    template: Arc<dyn QueryTemplate>,
    relname: String,
    config: BinderConfig,
}

impl TransactionMetrics {
    pub fn new(template: Arc<dyn QueryTemplate>, relname: impl Into<String>, config: BinderConfig) -> Self {
        Self {
            template,
            relname: relname.into(),
            config,
        }
    }
}

#[async_trait]
impl MeterBinder for TransactionMetrics {
    async fn attach(self, registry: Arc<Registry>, scheduler: &Scheduler) -> BinderResult<RefreshHandle> {
        let refresh = RefreshFrozenXids {
            template: self.template,
            relname: self.relname,
            gauges: ColumnGauges::new(METRICS, LABEL_RELNAME, "relname", &self.config.tags, &registry),
        };

        scheduler.run(Arc::new(refresh), self.config.schedule).await
    }
}

struct RefreshFrozenXids {
    template: Arc<dyn QueryTemplate>,
    relname: String,
    gauges: ColumnGauges,
}

#[async_trait]
impl RefreshAction for RefreshFrozenXids {
    fn name(&self) -> &str {
        METRICS[0].name
    }

    async fn refresh(&self) -> BinderResult<()> {
        let params = [QueryParam::from(self.relname.as_str())];
        self.template.query(SQL, &params, &mut |row: &dyn ResultRow| self.gauges.observe(row)).await
    }
}
