use thiserror::Error;

/// Possible errors of a binder, either while attaching it or while refreshing its instruments.
///
/// The first three variants are the failures a refresh can run into talking to the
/// outside world. They are never propagated out of a refresh loop: they are reported
/// to a [`crate::FailureObserver`] and the loop carries on.
#[derive(Error, Debug)]
pub enum BinderError {
    /// The underlying client could not be created or could not connect.
    #[error("Failed to open client: {0}")]
    Connection(String),

    /// A call to the external system failed (timeout, permission, malformed request...).
    #[error("Call '{call}' failed: {reason}")]
    Call {
        call: &'static str,
        reason: String,
    },

    /// The result of a call did not have the expected shape (e.g. missing column).
    #[error("Unexpected result: {0}")]
    Mapping(String),

    /// The metrics registry refused an instrument.
    #[error("Failed to register metric '{name}': {source}")]
    Registration {
        name: String,
        #[source]
        source: prometheus::Error,
    },

    /// An instrument was requested with the wrong number of label values.
    #[error("Metric '{name}' expects {expected} label values, got {actual}")]
    LabelArity {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// A [`crate::Schedule`] that cannot be run (e.g. a zero interval).
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// Binder was already attached to a registry.
    #[error("'{0}' is already attached")]
    AlreadyAttached(String),
}

impl BinderError {
    pub(crate) fn call(call: &'static str, reason: impl ToString) -> Self {
        Self::Call {
            call,
            reason: reason.to_string(),
        }
    }
}

pub type BinderResult<T> = Result<T, BinderError>;
