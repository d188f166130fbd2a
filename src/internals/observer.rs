use crate::errors::BinderError;

/// Notified every time a refresh fails.
///
/// Failures never stop a refresh loop: reporting them is the only thing that happens.
pub trait FailureObserver: Send + Sync {
    /// # Arguments
    ///
    /// * `task` - Name of the failed [`super::RefreshAction`]
    /// * `error` - Cause of the failure
    fn on_failure(&self, task: &str, error: &BinderError);
}

/// Default [`FailureObserver`]: logs every failure at `WARN` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFailureObserver;

impl FailureObserver for LogFailureObserver {
    fn on_failure(&self, task: &str, error: &BinderError) {
        warn!("Failed to refresh '{task}': {error}");
    }
}
