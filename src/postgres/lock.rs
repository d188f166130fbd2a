use std::sync::Arc;

use async_trait::async_trait;
use const_format::formatcp;
use prometheus::{IntGauge, Registry};

use super::template::{QueryParam, QueryTemplate, ResultRow};
use super::POSTGRES_METRIC_PREFIX;
use crate::errors::BinderResult;
use crate::internals::{BinderConfig, InstrumentCache, MeterBinder, RefreshAction, RefreshHandle, Scheduler};
use crate::prometheus_metrics::{MetricDescriptor, LABEL_FASTPATH, LABEL_GRANTED, LABEL_MODE, LABEL_RELNAME};

const FAST_PATH_SQL: &str = include_str!("sql/fast_path_locks.sql");
const BY_MODE_SQL: &str = include_str!("sql/locks_by_mode.sql");
const BY_GRANT_SQL: &str = include_str!("sql/locks_by_grant.sql");

const TASK_NAME: &str = formatcp!("{POSTGRES_METRIC_PREFIX}_locks");

const FAST_PATH_LOCKS: &str = formatcp!("{POSTGRES_METRIC_PREFIX}_fast_path_locks");
const LOCKS_BY_MODE: &str = formatcp!("{POSTGRES_METRIC_PREFIX}_locks_by_mode");
const LOCKS_BY_GRANT: &str = formatcp!("{POSTGRES_METRIC_PREFIX}_locks_by_grant");

/// Publishes the locks held (or awaited) on the matching tables.
///
/// Three views of the same `pg_locks` data:
///
/// * by `(mode, fastpath)`, across all the matching tables
/// * by `(relname, mode)`
/// * by `(relname, granted)`
pub struct LockMetrics {
    template: Arc<dyn QueryTemplate>,
    relname: String,
    config: BinderConfig,
}

impl LockMetrics {
    pub fn new(template: Arc<dyn QueryTemplate>, relname: impl Into<String>, config: BinderConfig) -> Self {
        Self {
            template,
            relname: relname.into(),
            config,
        }
    }
}

#[async_trait]
impl MeterBinder for LockMetrics {
    async fn attach(self, registry: Arc<Registry>, scheduler: &Scheduler) -> BinderResult<RefreshHandle> {
        let tags = &self.config.tags;
        let cache = |name: &str, help: &str, labels: &[&'static str]| {
            InstrumentCache::new(MetricDescriptor::new(name, help, tags.clone()), labels, registry.clone())
        };

        let refresh = RefreshLocks {
            template: self.template,
            relname: self.relname,
            fast_path: cache(FAST_PATH_LOCKS, "Locks by mode and fast-path acquisition", &[LABEL_MODE, LABEL_FASTPATH]),
            by_mode: cache(LOCKS_BY_MODE, "Locks on the table, by mode", &[LABEL_RELNAME, LABEL_MODE]),
            by_grant: cache(LOCKS_BY_GRANT, "Locks on the table, held or awaited", &[LABEL_RELNAME, LABEL_GRANTED]),
        };

        scheduler.run(Arc::new(refresh), self.config.schedule).await
    }
}

struct RefreshLocks {
    template: Arc<dyn QueryTemplate>,
    relname: String,
    fast_path: InstrumentCache<IntGauge>,
    by_mode: InstrumentCache<IntGauge>,
    by_grant: InstrumentCache<IntGauge>,
}

impl RefreshLocks {
    fn set_count(cache: &InstrumentCache<IntGauge>, labels: &[&str], row: &dyn ResultRow) -> BinderResult<()> {
        if let Some(count) = row.get_i64("count")? {
            cache.get_or_create(labels)?.set(count);
        }
        Ok(())
    }
}

#[async_trait]
impl RefreshAction for RefreshLocks {
    fn name(&self) -> &str {
        TASK_NAME
    }

    async fn refresh(&self) -> BinderResult<()> {
        let params = [QueryParam::from(self.relname.as_str())];

        self.template
            .query(FAST_PATH_SQL, &params, &mut |row: &dyn ResultRow| {
                let mode = row.required_string("mode")?;
                let fastpath = row.required_bool("fastpath")?.to_string();
                Self::set_count(&self.fast_path, &[mode.as_str(), fastpath.as_str()], row)
            })
            .await?;

        self.template
            .query(BY_MODE_SQL, &params, &mut |row: &dyn ResultRow| {
                let relname = row.required_string("relname")?;
                let mode = row.required_string("mode")?;
                Self::set_count(&self.by_mode, &[relname.as_str(), mode.as_str()], row)
            })
            .await?;

        self.template
            .query(BY_GRANT_SQL, &params, &mut |row: &dyn ResultRow| {
                let relname = row.required_string("relname")?;
                let granted = row.required_bool("granted")?.to_string();
                Self::set_count(&self.by_grant, &[relname.as_str(), granted.as_str()], row)
            })
            .await
    }
}
