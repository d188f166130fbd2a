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

const SQL: &str = include_str!("sql/tuples.sql");

const TASK_NAME: &str = formatcp!("{POSTGRES_METRIC_PREFIX}_tuples");

const METRICS: &[ColumnMetric] = &[
    ColumnMetric {
        column: "n_live_tup",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_n_live_tup"),
        help: "Estimated number of live rows",
    },
    ColumnMetric {
        column: "n_dead_tup",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_n_dead_tup"),
        help: "Estimated number of dead rows",
    },
    ColumnMetric {
        column: "n_tup_ins",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_n_tup_ins"),
        help: "Number of rows inserted",
    },
    ColumnMetric {
        column: "n_tup_upd",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_n_tup_upd"),
        help: "Number of rows updated (includes HOT updated rows)",
    },
    ColumnMetric {
        column: "n_tup_del",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_n_tup_del"),
        help: "Number of rows deleted",
    },
    ColumnMetric {
        column: "n_tup_hot_upd",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_n_tup_hot_upd"),
        help: "Number of rows HOT updated",
    },
    ColumnMetric {
        column: "n_mod_since_analyze",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_n_mod_since_analyze"),
        help: "Estimated number of rows modified since this table was last analyzed",
    },
    ColumnMetric {
        column: "n_ins_since_vacuum",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_n_ins_since_vacuum"),
        help: "Estimated number of rows inserted since this table was last vacuumed",
    },
    ColumnMetric {
        column: "seq_tup_read",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_seq_tup_read"),
        help: "Number of live rows fetched by sequential scans",
    },
    // Not `idx_tup_fetch`: that one is per-index, and published by `IndexMetrics`
    ColumnMetric {
        column: "idx_tup_fetch",
        name: formatcp!("{POSTGRES_METRIC_PREFIX}_table_idx_tup_fetch"),
        help: "Number of live rows fetched by index scans",
    },
];

/// Publishes row-level activity (inserts, updates, dead rows...) of the matching tables.
pub struct TupleMetrics {
    template: Arc<dyn QueryTemplate>,
    relname: String,
    config: BinderConfig,
}

impl TupleMetrics {
    /// Create a new [`TupleMetrics`]
    ///
    /// # Arguments
    ///
    /// * `template` - Runs the queries
    /// * `relname` - SQL `LIKE` pattern of the tables to observe (e.g. `%orders%`)
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
impl MeterBinder for TupleMetrics {
    async fn attach(self, registry: Arc<Registry>, scheduler: &Scheduler) -> BinderResult<RefreshHandle> {
        let refresh = RefreshTuples {
            template: self.template,
            relname: self.relname,
            gauges: ColumnGauges::new(METRICS, LABEL_RELNAME, "relname", &self.config.tags, &registry),
        };

        scheduler.run(Arc::new(refresh), self.config.schedule).await
    }
}

struct RefreshTuples {
    template: Arc<dyn QueryTemplate>,
    relname: String,
    gauges: ColumnGauges,
}

#[async_trait]
impl RefreshAction for RefreshTuples {
    fn name(&self) -> &str {
        TASK_NAME
    }

    async fn refresh(&self) -> BinderResult<()> {
        let params = [QueryParam::from(self.relname.as_str())];
        self.template.query(SQL, &params, &mut |row: &dyn ResultRow| self.gauges.observe(row)).await
    }
}
