use std::sync::Arc;

use prometheus::{IntGauge, Registry};

use super::template::ResultRow;
use crate::errors::BinderResult;
use crate::internals::InstrumentCache;
use crate::prometheus_metrics::{MetricDescriptor, Tags};

/// A numeric result column, published as a gauge.
pub(crate) struct ColumnMetric {
    pub(crate) column: &'static str,
    pub(crate) name: &'static str,
    pub(crate) help: &'static str,
}

/// One gauge per [`ColumnMetric`], all labelled by the value of the same (string) column.
///
/// Used by the binders whose rows are "one relation, many counters".
pub(crate) struct ColumnGauges {
    label_name: &'static str,
    label_column: &'static str,
    gauges: Vec<(&'static str, InstrumentCache<IntGauge>)>,
}

impl ColumnGauges {
    /// # Arguments
    ///
    /// * `metrics` - Columns to publish
    /// * `label_name` - Name of the label identifying each row (e.g. `relname`)
    /// * `label_column` - Column holding the value of the label
    /// * `tags` - Static tags of the binder
    /// * `registry` - Where the gauges get registered
    pub(crate) fn new(
        metrics: &[ColumnMetric],
        label_name: &'static str,
        label_column: &'static str,
        tags: &Tags,
        registry: &Arc<Registry>,
    ) -> Self {
        Self {
            label_name,
            label_column,
            gauges: metrics
                .iter()
                .map(|m| {
                    let descriptor = MetricDescriptor::new(m.name, m.help, tags.clone());
                    (m.column, InstrumentCache::new(descriptor, &[label_name], registry.clone()))
                })
                .collect(),
        }
    }

    /// Sets the gauges of the row's label to the values of their columns.
    ///
    /// `NULL` values leave the corresponding gauge untouched.
    pub(crate) fn observe(&self, row: &dyn ResultRow) -> BinderResult<()> {
        let label_value = row.required_string(self.label_column)?;

        for (column, cache) in &self.gauges {
            match row.get_i64(column)? {
                Some(v) => cache.get_or_create(&[label_value.as_str()])?.set(v),
                None => trace!("'{column}' of {}='{label_value}' is NULL", self.label_name),
            }
        }
        Ok(())
    }
}
