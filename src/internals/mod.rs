// Inner modules
mod binder;
mod instrument_cache;
mod observer;
mod refresh;

// Exports
pub use binder::{BinderConfig, ClientFactory, MeterBinder};
pub use instrument_cache::{Instrument, InstrumentCache};
pub use observer::{FailureObserver, LogFailureObserver};
pub use refresh::{next_step, Next, RefreshAction, RefreshHandle, Schedule, Scheduler};
