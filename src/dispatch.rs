//! Async work units and the pool that runs them.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::foundation::error::{BridgeError, BridgeResult};
use crate::host::{CallbackKey, HostMsg, HostPoster, Outcome};

/// Lifecycle of a work unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WorkState {
    Pending,
    Running,
    Completed,
}

type Job<T> = Box<dyn FnOnce() -> BridgeResult<T> + Send>;

/// One scheduled background execution.
///
/// All inputs are moved into `job` when the unit is built, on the host thread, so later host-side
/// mutation of the originals cannot race the worker.
pub(crate) struct WorkUnit<T> {
    label: &'static str,
    key: CallbackKey,
    state: WorkState,
    job: Option<Job<T>>,
    into_outcome: fn(BridgeResult<T>) -> Outcome,
}

impl<T: Send + 'static> WorkUnit<T> {
    pub(crate) fn new(
        label: &'static str,
        key: CallbackKey,
        job: impl FnOnce() -> BridgeResult<T> + Send + 'static,
        into_outcome: fn(BridgeResult<T>) -> Outcome,
    ) -> Self {
        Self {
            label,
            key,
            state: WorkState::Pending,
            job: Some(Box::new(job)),
            into_outcome,
        }
    }

    pub(crate) fn state(&self) -> WorkState {
        self.state
    }

    /// Run the job, capturing engine errors and panics into the completion message.
    pub(crate) fn run(&mut self) -> HostMsg {
        self.state = WorkState::Running;
        let result = match self.job.take() {
            Some(job) => catch_unwind(AssertUnwindSafe(job))
                .unwrap_or_else(|payload| Err(panic_to_error(self.label, payload))),
            None => Err(BridgeError::engine(format!(
                "{} work unit was already run",
                self.label
            ))),
        };
        if let Err(e) = &result {
            tracing::debug!(unit = self.label, error = %e, "work unit failed");
        }
        self.state = WorkState::Completed;
        HostMsg {
            key: self.key,
            outcome: (self.into_outcome)(result),
        }
    }
}

pub(crate) fn panic_to_error(label: &str, payload: Box<dyn Any + Send>) -> BridgeError {
    let msg = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    BridgeError::engine(format!("{label} panicked: {msg}"))
}

/// Submits work units to the background pool and posts their completion to the host.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    pool: Arc<rayon::ThreadPool>,
    poster: HostPoster,
}

impl Dispatcher {
    pub(crate) fn new(threads: Option<usize>, poster: HostPoster) -> BridgeResult<Self> {
        Ok(Self {
            pool: Arc::new(build_thread_pool(threads)?),
            poster,
        })
    }

    pub(crate) fn poster(&self) -> &HostPoster {
        &self.poster
    }

    /// Schedule `unit`; returns without waiting for it.
    pub(crate) fn submit<T: Send + 'static>(&self, mut unit: WorkUnit<T>) {
        debug_assert_eq!(unit.state(), WorkState::Pending);
        let poster = self.poster.clone();
        tracing::debug!(unit = unit.label, "work unit submitted");
        self.pool.spawn(move || {
            let msg = unit.run();
            poster.post(msg);
        });
    }
}

fn build_thread_pool(threads: Option<usize>) -> BridgeResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(BridgeError::argument(
            "'worker_threads' must be >= 1 when set",
        ));
    }
    let mut builder = rayon::ThreadPoolBuilder::new()
        .thread_name(|i| format!("compbridge-worker-{i}"));
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| BridgeError::engine(format!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
#[path = "../tests/unit/dispatch/work_unit.rs"]
mod tests;
