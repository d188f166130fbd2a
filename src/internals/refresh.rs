use std::sync::Arc;

use async_trait::async_trait;
use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{sleep, Duration},
};
use tokio_util::sync::CancellationToken;

use super::observer::{FailureObserver, LogFailureObserver};
use crate::errors::{BinderError, BinderResult};

/// When a [`RefreshAction`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Wait the interval, run, and repeat until cancelled.
    /// The first run happens after one interval, not immediately.
    Fixed(Duration),

    /// Run a single time, right away, and then stop.
    /// Useful when re-invocation is controlled externally (e.g. by a cron job).
    Once,
}

impl Schedule {
    /// A [`Schedule::Fixed`] schedule, refusing a zero `interval`.
    pub fn fixed(interval: Duration) -> BinderResult<Self> {
        let schedule = Self::Fixed(interval);
        schedule.validate()?;
        Ok(schedule)
    }

    fn validate(&self) -> BinderResult<()> {
        match self {
            Self::Fixed(interval) if interval.is_zero() => {
                Err(BinderError::InvalidSchedule("fixed interval must be greater than zero".to_string()))
            },
            _ => Ok(()),
        }
    }
}

/// A fallible, zero-argument refresh of some instruments.
#[async_trait]
pub trait RefreshAction: Send + Sync + 'static {
    /// Identifies the action in logs and failure reports.
    fn name(&self) -> &str;

    async fn refresh(&self) -> BinderResult<()>;
}

/// What a refresh loop does after an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    WaitThenRun(Duration),
    Stop,
}

/// Decides what happens after an execution of a [`RefreshAction`].
///
/// The outcome never changes the decision: a failing action is retried
/// on the next tick, with no backoff and no limit.
pub fn next_step<T, E>(schedule: &Schedule, _outcome: &Result<T, E>) -> Next {
    match schedule {
        Schedule::Fixed(interval) => Next::WaitThenRun(*interval),
        Schedule::Once => Next::Stop,
    }
}

/// Handle to a refresh task started by a [`Scheduler`].
///
/// Dropping it does _not_ stop the task: use [`Self::cancel`].
#[derive(Debug)]
pub struct RefreshHandle {
    name: String,
    token: CancellationToken,
    join_handle: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    /// Requests the task to stop scheduling further runs.
    ///
    /// Non-blocking: a run that is already in-flight is allowed to complete.
    pub fn cancel(&self) {
        debug!("Cancelling '{}'", self.name);
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// `true` once the task has terminated (always `true` for [`Schedule::Once`]).
    pub fn is_finished(&self) -> bool {
        self.join_handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the task to terminate.
    pub async fn join(self) {
        if let Some(jh) = self.join_handle {
            if let Err(e) = jh.await {
                error!("Refresh task '{}' terminated abnormally: {e}", self.name);
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Runs [`RefreshAction`]s according to their [`Schedule`].
///
/// It's owned by the caller and passed explicitly to every binder: all the tasks it starts
/// are stopped by [`Self::shutdown`], or when the [`CancellationToken`] it was created with
/// gets cancelled.
#[derive(Clone)]
pub struct Scheduler {
    runtime: Handle,
    shutdown_token: CancellationToken,
    observer: Arc<dyn FailureObserver>,
}

impl Scheduler {
    /// Create a new [`Scheduler`] spawning onto the given runtime.
    ///
    /// # Arguments
    ///
    /// * `runtime` - Runtime where refresh tasks are spawned
    /// * `shutdown_token` - When cancelled, all refresh tasks terminate
    pub fn new(runtime: Handle, shutdown_token: CancellationToken) -> Self {
        Self {
            runtime,
            shutdown_token,
            observer: Arc::new(LogFailureObserver),
        }
    }

    /// Create a new [`Scheduler`] spawning onto the runtime this is called from.
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn current(shutdown_token: CancellationToken) -> Self {
        Self::new(Handle::current(), shutdown_token)
    }

    /// Replaces the [`FailureObserver`] notified of every failed run.
    pub fn with_observer(mut self, observer: Arc<dyn FailureObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Runs the given action according to `schedule`.
    ///
    /// With [`Schedule::Once`], the action is executed before this returns.
    /// With [`Schedule::Fixed`], a dedicated task is spawned: executions of the same action
    /// never overlap, and do not wait on other actions.
    ///
    /// Failures are reported to the [`FailureObserver`], never returned.
    /// Fails only if `schedule` is invalid, before the action is ever executed.
    pub async fn run<A: RefreshAction>(&self, action: Arc<A>, schedule: Schedule) -> BinderResult<RefreshHandle> {
        schedule.validate()?;

        let name = action.name().to_string();
        let token = self.shutdown_token.child_token();

        let join_handle = match schedule {
            Schedule::Once => {
                let outcome = run_reporting(action.as_ref(), self.observer.as_ref()).await;
                debug_assert_eq!(next_step(&schedule, &outcome), Next::Stop);
                None
            },
            Schedule::Fixed(interval) => {
                let observer = self.observer.clone();
                let task_token = token.clone();
                Some(self.runtime.spawn(async move {
                    refresh_loop(action, interval, observer, task_token).await;
                }))
            },
        };

        Ok(RefreshHandle {
            name,
            token,
            join_handle,
        })
    }

    /// Stops all the tasks started by this [`Scheduler`] (and by its clones).
    pub fn shutdown(&self) {
        info!("Shutting down refresh tasks");
        self.shutdown_token.cancel();
    }
}

async fn run_reporting<A: RefreshAction + ?Sized>(action: &A, observer: &dyn FailureObserver) -> BinderResult<()> {
    trace!("Refreshing '{}'", action.name());
    let outcome = action.refresh().await;
    if let Err(e) = &outcome {
        observer.on_failure(action.name(), e);
    }
    outcome
}

async fn refresh_loop<A: RefreshAction>(
    action: Arc<A>,
    interval: Duration,
    observer: Arc<dyn FailureObserver>,
    token: CancellationToken,
) {
    debug!("Begin refreshing '{}' every {:?}", action.name(), interval);

    let schedule = Schedule::Fixed(interval);
    let mut next = Next::WaitThenRun(interval);
    while let Next::WaitThenRun(delay) = next {
        // Wait for next "tick", or get interrupted by shutdown
        tokio::select! {
            biased;

            _ = token.cancelled() => {
                info!("Shutting down '{}'", action.name());
                break;
            },
            _ = sleep(delay) => {
                // No-op
            },
        }

        // In-flight runs are not interrupted by cancellation
        let outcome = run_reporting(action.as_ref(), observer.as_ref()).await;
        next = next_step(&schedule, &outcome);
    }
}
