//! Search session state machine: `Idle -> Running -> Stopping -> Idle`.
//!
//! One session exists per engine instance, shared by every bridge wrapping that engine. The state
//! lives behind a mutex shared with the work unit that performs the stop join, so the transition
//! back to `Idle` happens on that worker before any stop completion is posted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use crate::foundation::error::{BridgeError, BridgeResult};
use crate::host::{CallbackKey, HostMsg, HostPoster, Outcome};

/// Observable state of an engine's search session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No search is running.
    Idle,
    /// The engine's search loop is producing samples.
    Running,
    /// A stop was requested; the engine's threads have not all joined yet.
    Stopping,
}

/// What a stop request has to do.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StopRequest {
    /// Nothing is running; complete right away without touching the engine.
    AlreadyIdle,
    /// This request moved the session to `Stopping` and must run the join.
    Begin,
    /// A stop is already in flight; the waiter completes with it.
    Joined,
}

/// A stop callback parked on an in-flight stop, possibly from another bridge.
#[derive(Debug)]
pub(crate) struct StopWaiter {
    pub(crate) key: CallbackKey,
    pub(crate) poster: HostPoster,
}

impl StopWaiter {
    /// Post the stop result to the bridge that registered this waiter.
    pub(crate) fn complete(self, result: &BridgeResult<()>) {
        let outcome = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(BridgeError::engine(e.to_string())),
        };
        self.poster.post(HostMsg {
            key: self.key,
            outcome: Outcome::Unit(outcome),
        });
    }
}

struct Inner {
    state: SessionState,
    generation: u64,
    closing: Option<Arc<AtomicBool>>,
    waiters: Vec<StopWaiter>,
}

pub(crate) struct SearchSession {
    inner: Mutex<Inner>,
}

type SessionMap = Mutex<HashMap<usize, Weak<SearchSession>>>;

fn sessions() -> &'static SessionMap {
    static SESSIONS: OnceLock<SessionMap> = OnceLock::new();
    SESSIONS.get_or_init(SessionMap::default)
}

impl SearchSession {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                generation: 0,
                closing: None,
                waiters: Vec::new(),
            }),
        }
    }

    /// Session of the engine behind `engine`, created on first use.
    ///
    /// Entries are keyed by the engine's address and hold weak references. While an entry is
    /// live some bridge holds both the session and the engine, so the address cannot be reused.
    pub(crate) fn for_engine<E: ?Sized>(engine: &Arc<E>) -> Arc<Self> {
        let key = Arc::as_ptr(engine).cast::<()>() as usize;
        let mut map = sessions().lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = map.get(&key).and_then(Weak::upgrade) {
            return session;
        }
        map.retain(|_, weak| weak.strong_count() > 0);
        let session = Arc::new(Self::new());
        map.insert(key, Arc::downgrade(&session));
        session
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> SessionState {
        self.lock().state
    }

    /// `Idle -> Running`. Any other state is left untouched and reported as busy.
    pub(crate) fn begin(&self) -> BridgeResult<u64> {
        let mut inner = self.lock();
        match inner.state {
            SessionState::Idle => {
                inner.state = SessionState::Running;
                inner.generation += 1;
                inner.closing = None;
                tracing::debug!(generation = inner.generation, "search session running");
                Ok(inner.generation)
            }
            SessionState::Running => Err(BridgeError::session_busy(
                "a search is already running on this engine",
            )),
            SessionState::Stopping => Err(BridgeError::session_busy(
                "the previous search is still stopping",
            )),
        }
    }

    /// Remember the closing flag of the sink handed to the engine for `generation`.
    pub(crate) fn attach_closing(&self, generation: u64, closing: Arc<AtomicBool>) {
        let mut inner = self.lock();
        if inner.state == SessionState::Running && inner.generation == generation {
            inner.closing = Some(closing);
        }
    }

    /// Undo [`SearchSession::begin`] when the engine refused to start.
    pub(crate) fn abort_begin(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.state == SessionState::Running && inner.generation == generation {
            inner.state = SessionState::Idle;
            inner.closing = None;
        }
    }

    /// Register a stop and report what the caller has to do.
    ///
    /// `waiter` is parked only when joining an in-flight stop; otherwise the caller completes its
    /// own callback.
    pub(crate) fn request_stop(&self, waiter: Option<StopWaiter>) -> StopRequest {
        let mut inner = self.lock();
        match inner.state {
            SessionState::Idle => StopRequest::AlreadyIdle,
            SessionState::Running => {
                inner.state = SessionState::Stopping;
                if let Some(flag) = inner.closing.take() {
                    flag.store(true, Ordering::Release);
                }
                tracing::debug!(generation = inner.generation, "search session stopping");
                StopRequest::Begin
            }
            SessionState::Stopping => {
                inner.waiters.extend(waiter);
                StopRequest::Joined
            }
        }
    }

    /// Like [`SearchSession::request_stop`], but only when `generation` is the running session.
    pub(crate) fn request_stop_of(&self, generation: u64) -> bool {
        let mut inner = self.lock();
        if inner.state != SessionState::Running || inner.generation != generation {
            return false;
        }
        inner.state = SessionState::Stopping;
        if let Some(flag) = inner.closing.take() {
            flag.store(true, Ordering::Release);
        }
        tracing::debug!(generation, "search session stopping on teardown");
        true
    }

    /// `Stopping -> Idle`, returning every joined waiter that must now be completed.
    pub(crate) fn finish_stop(&self) -> Vec<StopWaiter> {
        let mut inner = self.lock();
        inner.state = SessionState::Idle;
        tracing::debug!(generation = inner.generation, "search session idle");
        std::mem::take(&mut inner.waiters)
    }
}

/// Hardware thread count reported by the OS (at least 1).
pub fn hardware_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Clamp a requested search thread count to `1..=hardware`.
pub(crate) fn clamp_threads(requested: usize, hardware: usize) -> BridgeResult<usize> {
    if requested == 0 {
        return Err(BridgeError::argument("search thread count must be >= 1"));
    }
    Ok(requested.min(hardware.max(1)))
}

#[cfg(test)]
#[path = "../tests/unit/session/state.rs"]
mod tests;
