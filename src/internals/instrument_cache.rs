use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use prometheus::core::{Atomic, Collector, GenericGauge};
use prometheus::{Histogram, HistogramOpts, Opts, Registry};

use crate::errors::{BinderError, BinderResult};
use crate::prometheus_metrics::MetricDescriptor;

/// A numeric holder that can be registered with a [`Registry`].
///
/// The `const_labels` identify this specific instrument among all the ones sharing the same name.
pub trait Instrument: Collector + Clone + 'static {
    fn create(name: &str, help: &str, const_labels: HashMap<String, String>) -> prometheus::Result<Self>;
}

impl<P: Atomic + 'static> Instrument for GenericGauge<P> {
    fn create(name: &str, help: &str, const_labels: HashMap<String, String>) -> prometheus::Result<Self> {
        GenericGauge::with_opts(Opts::new(name, help).const_labels(const_labels))
    }
}

impl Instrument for Histogram {
    fn create(name: &str, help: &str, const_labels: HashMap<String, String>) -> prometheus::Result<Self> {
        Histogram::with_opts(HistogramOpts::new(name, help).const_labels(const_labels))
    }
}

/// Label values identifying one instrument of an [`InstrumentCache`].
type Key = Vec<String>;

/// Lazily creates, registers and memoizes one [`Instrument`] per distinct combination of
/// label values, for a given [`MetricDescriptor`].
///
/// Repeated refreshes get back the same instrument, and update it in place,
/// instead of registering duplicates. Instruments are never removed: once created,
/// they stay registered for as long as the [`Registry`] lives.
///
/// It's safe to share across threads: concurrent first observations of the same label values
/// result in a single registration.
pub struct InstrumentCache<I: Instrument> {
    descriptor: MetricDescriptor,
    label_names: Vec<&'static str>,
    registry: Arc<Registry>,
    instruments: RwLock<HashMap<Key, I>>,
}

impl<I: Instrument> InstrumentCache<I> {
    /// Create a new, empty [`InstrumentCache`].
    ///
    /// # Arguments
    ///
    /// * `descriptor` - Name, description and static tags shared by every instrument of the cache
    /// * `label_names` - Names of the dynamic labels, in the order their values are given to [`Self::get_or_create`]
    /// * `registry` - Where instruments get registered on first observation
    pub fn new(descriptor: MetricDescriptor, label_names: &[&'static str], registry: Arc<Registry>) -> Self {
        Self {
            descriptor,
            label_names: label_names.to_vec(),
            registry,
            instruments: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the instrument for the given `label_values`, creating and registering it
    /// if this is the first time they are observed.
    ///
    /// # Arguments
    ///
    /// * `label_values` - One value per label name given at construction, in the same order
    pub fn get_or_create(&self, label_values: &[&str]) -> BinderResult<I> {
        if label_values.len() != self.label_names.len() {
            return Err(BinderError::LabelArity {
                name: self.descriptor.name.clone(),
                expected: self.label_names.len(),
                actual: label_values.len(),
            });
        }

        let key: Key = label_values.iter().map(|v| v.to_string()).collect();

        // Fast path: already known
        if let Some(instrument) = self.instruments.read().unwrap_or_else(PoisonError::into_inner).get(&key) {
            return Ok(instrument.clone());
        }

        // Slow path: holding the write lock from lookup to insertion, so that only one
        // of the racing callers creates and registers the instrument
        let mut guard = self.instruments.write().unwrap_or_else(PoisonError::into_inner);
        match guard.entry(key) {
            Entry::Occupied(o) => Ok(o.get().clone()),
            Entry::Vacant(v) => {
                let labels: Vec<(&str, &str)> =
                    self.label_names.iter().copied().zip(label_values.iter().copied()).collect();
                let instrument: I = self.descriptor.build(&labels)?;
                self.registry
                    .register(Box::new(instrument.clone()))
                    .map_err(|e| self.descriptor.registration_error(e))?;

                trace!("Registered '{}' for {:?}", self.descriptor.name, labels);
                Ok(v.insert(instrument).clone())
            },
        }
    }

    /// Amount of instruments created so far.
    pub fn len(&self) -> usize {
        self.instruments.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use prometheus::{Gauge, Histogram, IntGauge, Registry};

    use super::*;
    use crate::prometheus_metrics::testing::{gauge_value, histogram_count, instrument_count};
    use crate::prometheus_metrics::{Tags, LABEL_RELNAME};

    fn relname_cache<I: Instrument>(registry: &Arc<Registry>) -> InstrumentCache<I> {
        InstrumentCache::new(
            MetricDescriptor::new(
                "relation_size",
                "Size of the relation",
                Tags::from([("db".to_string(), "main".to_string())]),
            ),
            &[LABEL_RELNAME],
            registry.clone(),
        )
    }

    #[test]
    fn should_register_one_instrument_per_distinct_label() {
        let registry = Arc::new(Registry::new());
        let cache: InstrumentCache<IntGauge> = relname_cache(&registry);

        for (i, relname) in ["a", "b", "c", "d"].iter().enumerate() {
            cache.get_or_create(&[relname]).unwrap().set(i as i64);
        }

        assert_eq!(cache.len(), 4);
        assert_eq!(instrument_count(&registry, "relation_size"), 4);
        for (i, relname) in ["a", "b", "c", "d"].iter().enumerate() {
            assert_eq!(
                gauge_value(&registry, "relation_size", &[(LABEL_RELNAME, relname), ("db", "main")]),
                Some(i as f64)
            );
        }
    }

    #[test]
    fn should_reuse_instrument_for_repeated_label() {
        let registry = Arc::new(Registry::new());
        let cache: InstrumentCache<IntGauge> = relname_cache(&registry);

        for v in 1..=5 {
            cache.get_or_create(&["a"]).unwrap().set(v);
        }

        assert_eq!(cache.len(), 1);
        assert_eq!(instrument_count(&registry, "relation_size"), 1);
        assert_eq!(gauge_value(&registry, "relation_size", &[(LABEL_RELNAME, "a")]), Some(5.0));
    }

    #[test]
    fn should_keep_instruments_independent() {
        let registry = Arc::new(Registry::new());
        let cache: InstrumentCache<Gauge> = relname_cache(&registry);

        cache.get_or_create(&["a"]).unwrap().set(0.5);
        cache.get_or_create(&["b"]).unwrap().set(1.5);
        cache.get_or_create(&["a"]).unwrap().set(2.5);

        assert_eq!(gauge_value(&registry, "relation_size", &[(LABEL_RELNAME, "a")]), Some(2.5));
        assert_eq!(gauge_value(&registry, "relation_size", &[(LABEL_RELNAME, "b")]), Some(1.5));
    }

    #[test]
    fn should_register_once_under_concurrent_first_observation() {
        const THREADS: usize = 16;

        let registry = Arc::new(Registry::new());
        let cache: Arc<InstrumentCache<IntGauge>> = Arc::new(relname_cache(&registry));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let cache = cache.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let gauge = cache.get_or_create(&["contended"]).unwrap();
                    gauge.inc();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(cache.len(), 1);
        assert_eq!(instrument_count(&registry, "relation_size"), 1);
        // Every thread got the very same instrument
        assert_eq!(
            gauge_value(&registry, "relation_size", &[(LABEL_RELNAME, "contended")]),
            Some(THREADS as f64)
        );
    }

    #[test]
    fn should_reject_wrong_label_arity() {
        let registry = Arc::new(Registry::new());
        let cache: InstrumentCache<IntGauge> = relname_cache(&registry);

        assert!(matches!(
            cache.get_or_create(&["a", "b"]),
            Err(BinderError::LabelArity {
                expected: 1,
                actual: 2,
                ..
            })
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn should_cache_timers() {
        let registry = Arc::new(Registry::new());
        let cache: InstrumentCache<Histogram> = InstrumentCache::new(
            MetricDescriptor::new("call_seconds", "Call duration", Tags::new()),
            &["operation", "status"],
            registry.clone(),
        );

        cache.get_or_create(&["GetItem", "200"]).unwrap().observe(0.1);
        cache.get_or_create(&["GetItem", "200"]).unwrap().observe(0.2);
        cache.get_or_create(&["PutItem", "500"]).unwrap().observe(0.3);

        assert_eq!(histogram_count(&registry, "call_seconds", &[("operation", "GetItem")]), Some(2));
        assert_eq!(histogram_count(&registry, "call_seconds", &[("operation", "PutItem")]), Some(1));
    }
}
