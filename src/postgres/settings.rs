use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use const_format::formatcp;
use prometheus::{Gauge, Registry};

use super::template::{QueryParam, QueryTemplate, ResultRow};
use super::POSTGRES_METRIC_PREFIX;
use crate::errors::BinderResult;
use crate::internals::{BinderConfig, InstrumentCache, MeterBinder, RefreshAction, RefreshHandle, Scheduler};
use crate::prometheus_metrics::{MetricDescriptor, LABEL_RELNAME};

const SQL: &str = include_str!("sql/settings.sql");

const TASK_NAME: &str = formatcp!("{POSTGRES_METRIC_PREFIX}_settings");

/// Storage parameters published, with their description.
const SETTINGS: &[(&str, &str)] = &[
    ("fillfactor", "Fill factor of the table, as a percentage"),
    (
        "autovacuum_vacuum_scale_factor",
        "Fraction of the table size added to the threshold that triggers a vacuum",
    ),
    (
        "autovacuum_freeze_max_age",
        "Maximum age (in transactions) before the table is vacuumed to prevent xid wraparound",
    ),
];

/// Parses the textual form of `pg_class.reloptions`, for example `{fillfactor=70,autovacuum_enabled=off}`.
///
/// Entries not in the `key=value` form are ignored.
pub(crate) fn parse_reloptions(text: &str) -> HashMap<&str, &str> {
    text.trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .split(',')
        .filter_map(|entry| entry.split_once('='))
        .map(|(k, v)| (k.trim().trim_matches('"'), v.trim().trim_matches('"')))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// Publishes the per-table storage parameters that tune autovacuum.
///
/// Only parameters explicitly set on a table are published: the server defaults are not.
pub struct SettingsMetrics {
    template: Arc<dyn QueryTemplate>,
    relname: String,
    config: BinderConfig,
}

impl SettingsMetrics {
    pub fn new(template: Arc<dyn QueryTemplate>, relname: impl Into<String>, config: BinderConfig) -> Self {
        Self {
            template,
            relname: relname.into(),
            config,
        }
    }
}

#[async_trait]
impl MeterBinder for SettingsMetrics {
    async fn attach(self, registry: Arc<Registry>, scheduler: &Scheduler) -> BinderResult<RefreshHandle> {
        let gauges = SETTINGS
            .iter()
            .map(|(setting, help)| {
                let descriptor =
                    MetricDescriptor::new(format!("{POSTGRES_METRIC_PREFIX}_{setting}"), *help, self.config.tags.clone());
                (*setting, InstrumentCache::new(descriptor, &[LABEL_RELNAME], registry.clone()))
            })
            .collect();

        let refresh = RefreshSettings {
            template: self.template,
            relname: self.relname,
            gauges,
        };

        scheduler.run(Arc::new(refresh), self.config.schedule).await
    }
}

struct RefreshSettings {
    template: Arc<dyn QueryTemplate>,
    relname: String,
    gauges: Vec<(&'static str, InstrumentCache<Gauge>)>,
}

impl RefreshSettings {
    fn observe(&self, row: &dyn ResultRow) -> BinderResult<()> {
        let relname = row.required_string("relname")?;
        let Some(reloptions) = row.get_string("reloptions")? else {
            return Ok(());
        };

        let options = parse_reloptions(&reloptions);
        for (setting, cache) in &self.gauges {
            let Some(raw) = options.get(setting) else {
                continue;
            };
            match raw.parse::<f64>() {
                Ok(v) => cache.get_or_create(&[relname.as_str()])?.set(v),
                Err(e) => warn!("Ignoring '{setting}={raw}' of {LABEL_RELNAME}='{relname}': {e}"),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RefreshAction for RefreshSettings {
    fn name(&self) -> &str {
        TASK_NAME
    }

    async fn refresh(&self) -> BinderResult<()> {
        let params = [QueryParam::from(self.relname.as_str())];
        self.template.query(SQL, &params, &mut |row: &dyn ResultRow| self.observe(row)).await
    }
}
