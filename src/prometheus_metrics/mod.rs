use std::collections::{BTreeMap, HashMap};

use prometheus::Registry;

use crate::errors::{BinderError, BinderResult};
use crate::internals::Instrument;

pub const NAMESPACE: &str = "meterbinder";

pub const LABEL_TOPIC: &str = "topic";
pub const LABEL_CONSUMER_GROUP: &str = "consumer_group";
pub const LABEL_STATE: &str = "state";
pub const LABEL_RELNAME: &str = "relname";
pub const LABEL_INDEX: &str = "index";
pub const LABEL_DATNAME: &str = "datname";
pub const LABEL_MODE: &str = "mode";
pub const LABEL_FASTPATH: &str = "fastpath";
pub const LABEL_GRANTED: &str = "granted";
pub const LABEL_WAIT_EVENT: &str = "wait_event";
pub const LABEL_WAIT_EVENT_TYPE: &str = "wait_event_type";
pub const LABEL_OPERATION: &str = "operation";
pub const LABEL_CLIENT_TYPE: &str = "client_type";
pub const LABEL_STATUS: &str = "status";

/// Static key-value pairs added to every instrument of a binder.
///
/// Kept ordered so that the same set of tags always produces the same instrument identity.
pub type Tags = BTreeMap<String, String>;

/// Creates the [`Registry`] every binder of the process registers into.
///
/// All the metrics gathered from it are prefixed with [`NAMESPACE`],
/// and carry the given `default_tags` as labels.
pub fn init(default_tags: Tags) -> BinderResult<Registry> {
    let prom_def_labels: HashMap<String, String> = default_tags.into_iter().collect();

    info!("Prometheus Metrics default labels:\n{:#?}", prom_def_labels);

    let labels = if prom_def_labels.is_empty() {
        None
    } else {
        Some(prom_def_labels)
    };
    Registry::new_custom(Some(NAMESPACE.to_string()), labels).map_err(|e| {
        BinderError::Registration {
            name: NAMESPACE.to_string(),
            source: e,
        }
    })
}

/// Immutable identity of a metric: name, human readable description and static tags.
///
/// Created once per binder, when the binder gets attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    pub name: String,
    pub description: String,
    pub tags: Tags,
}

impl MetricDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, tags: Tags) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tags,
        }
    }

    /// Creates and registers a single instrument, with no dynamic label.
    ///
    /// Used when the observed quantity has no dimension (e.g. "running vacuums").
    pub fn register<I: Instrument>(&self, registry: &Registry) -> BinderResult<I> {
        let instrument = self.build::<I>(&[])?;
        registry.register(Box::new(instrument.clone())).map_err(|e| self.registration_error(e))?;
        Ok(instrument)
    }

    /// Builds (without registering) an instrument carrying the static tags,
    /// plus the given `(label, value)` pairs.
    ///
    /// A label with the same name of a static tag takes precedence over it.
    pub(crate) fn build<I: Instrument>(&self, labels: &[(&str, &str)]) -> BinderResult<I> {
        let mut const_labels: HashMap<String, String> =
            self.tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        for (name, value) in labels {
            const_labels.insert(name.to_string(), value.to_string());
        }

        I::create(&self.name, &self.description, const_labels).map_err(|e| self.registration_error(e))
    }

    pub(crate) fn registration_error(&self, source: prometheus::Error) -> BinderError {
        BinderError::Registration {
            name: self.name.clone(),
            source,
        }
    }
}


#[cfg(test)]
mod test {
    use prometheus::{IntGauge, Registry};

    use super::testing::gauge_value;
    use super::*;

    #[test]
    fn should_prefix_and_label_gathered_metrics() {
        let registry = init(Tags::from([("env".to_string(), "test".to_string())])).unwrap();

        let descriptor = MetricDescriptor::new("answer", "The answer", Tags::new());
        let gauge: IntGauge = descriptor.register(&registry).unwrap();
        gauge.set(42);

        assert_eq!(gauge_value(&registry, "meterbinder_answer", &[("env", "test")]), Some(42.0));
    }

    #[test]
    fn registered_instrument_should_be_gathered() {
        let registry = Registry::new();
        let descriptor = MetricDescriptor::new("running_vacuums", "Vacuums running", Tags::new());

        let gauge = descriptor.register::<IntGauge>(&registry).unwrap();
        gauge.set(3);

        let families = registry.gather();
        let family = families.iter().find(|mf| mf.get_name() == "running_vacuums").unwrap();
        assert_eq!(family.get_metric().len(), 1);
        assert_eq!(family.get_metric()[0].get_gauge().get_value(), 3.0);
    }

    #[test]
    fn should_merge_static_tags_and_labels() {
        let registry = Registry::new();
        let descriptor = MetricDescriptor::new(
            "sized",
            "Something with a size",
            Tags::from([("team".to_string(), "data".to_string()), ("topic".to_string(), "static".to_string())]),
        );

        let gauge: IntGauge = descriptor.build(&[(LABEL_TOPIC, "dynamic")]).unwrap();
        registry.register(Box::new(gauge.clone())).unwrap();
        gauge.set(7);

        assert_eq!(gauge_value(&registry, "sized", &[("team", "data"), ("topic", "dynamic")]), Some(7.0));
        assert_eq!(gauge_value(&registry, "sized", &[("topic", "static")]), None);
    }

    #[test]
    fn should_refuse_registering_twice() {
        let registry = Registry::new();
        let descriptor = MetricDescriptor::new("once", "Only once", Tags::new());

        let _: IntGauge = descriptor.register(&registry).unwrap();
        let res: BinderResult<IntGauge> = descriptor.register(&registry);
        assert!(matches!(res, Err(BinderError::Registration { .. })));
    }
}
