use std::sync::Arc;

use async_trait::async_trait;
use prometheus::Registry;

use super::refresh::{RefreshHandle, Schedule, Scheduler};
use crate::errors::BinderResult;
use crate::prometheus_metrics::Tags;

/// Capability to create a client of an external system.
///
/// Binders receive one of these, rather than a ready-made client, so they can
/// (re)open connections when they need to, and tests can substitute mocks.
#[async_trait]
pub trait ClientFactory: Send + Sync + 'static {
    type Client: Send + Sync;

    /// Fails with [`crate::BinderError::Connection`] if the client cannot be created.
    async fn open_client(&self) -> BinderResult<Self::Client>;
}

/// Constructor-time configuration shared by all polling binders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinderConfig {
    /// Static tags added to every instrument of the binder.
    pub tags: Tags,

    /// How often the binder refreshes its instruments.
    pub schedule: Schedule,
}

impl BinderConfig {
    pub fn new(schedule: Schedule) -> Self {
        Self {
            tags: Tags::new(),
            schedule,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags.extend(tags);
        self
    }
}

/// Something that publishes observations of an external system into a [`Registry`].
///
/// A binder is _unattached_ when constructed: nothing registered, nothing running.
/// [`Self::attach`] consumes it, registers its instruments and starts its refresh task,
/// so the transition can only ever happen once.
/// The returned [`RefreshHandle`] is the only way back: cancelling it stops the refresh task,
/// while the instruments stay registered with their last value.
#[async_trait]
pub trait MeterBinder: Send + Sized + 'static {
    /// Registers the instruments of this binder and starts refreshing them.
    ///
    /// Downstream failures (e.g. an unreachable broker) are not returned:
    /// they are reported by the [`Scheduler`] like any other refresh failure.
    /// An error is returned only if the [`Registry`] refuses the instruments.
    ///
    /// # Arguments
    ///
    /// * `registry` - Where instruments get registered
    /// * `scheduler` - Runs the refresh task
    async fn attach(self, registry: Arc<Registry>, scheduler: &Scheduler) -> BinderResult<RefreshHandle>;
}
