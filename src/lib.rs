//! Metric binders: small adapters that poll an external system (a Kafka cluster, a Postgres
//! database, a cloud SDK client) and publish what they observe as Prometheus instruments.
//!
//! Every polling binder follows the same shape: it is constructed with a [`BinderConfig`],
//! it is [`MeterBinder::attach`]-ed to a [`prometheus::Registry`] through an explicit
//! [`Scheduler`], and from then on a refresh task keeps its instruments up to date
//! until the returned [`RefreshHandle`] is cancelled.

#[macro_use]
extern crate log;

pub mod constants;
pub mod errors;
pub mod internals;
pub mod kafka;
pub mod kafka_types;
pub mod postgres;
pub mod prometheus_metrics;
pub mod sdk;

pub use errors::{BinderError, BinderResult};
pub use internals::{
    BinderConfig, ClientFactory, FailureObserver, InstrumentCache, LogFailureObserver, MeterBinder,
    RefreshAction, RefreshHandle, Schedule, Scheduler,
};
pub use prometheus_metrics::{MetricDescriptor, Tags};
