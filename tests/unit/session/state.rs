use super::*;
use crate::host::HostQueue;
use slotmap::SlotMap;

fn waiters(host: &HostQueue, n: usize) -> Vec<StopWaiter> {
    let mut map = SlotMap::<CallbackKey, ()>::with_key();
    (0..n)
        .map(|_| StopWaiter {
            key: map.insert(()),
            poster: host.poster(),
        })
        .collect()
}

fn keys(ws: &[StopWaiter]) -> Vec<CallbackKey> {
    ws.iter().map(|w| w.key).collect()
}

#[test]
fn full_cycle() {
    let host = HostQueue::new();
    let s = SearchSession::new();
    assert_eq!(s.state(), SessionState::Idle);
    let g = s.begin().unwrap();
    assert_eq!(g, 1);
    assert_eq!(s.state(), SessionState::Running);

    let mut w = waiters(&host, 1);
    assert_eq!(s.request_stop(w.pop()), StopRequest::Begin);
    assert_eq!(s.state(), SessionState::Stopping);
    // The caller that began the stop completes its own callback.
    assert!(s.finish_stop().is_empty());
    assert_eq!(s.state(), SessionState::Idle);
    assert_eq!(s.begin().unwrap(), 2);
}

#[test]
fn stop_when_idle_needs_no_join() {
    let host = HostQueue::new();
    let s = SearchSession::new();
    let mut w = waiters(&host, 1);
    assert_eq!(s.request_stop(w.pop()), StopRequest::AlreadyIdle);
    assert_eq!(s.state(), SessionState::Idle);
    assert!(s.finish_stop().is_empty());
}

#[test]
fn begin_while_stopping_is_busy_and_keeps_state() {
    let s = SearchSession::new();
    s.begin().unwrap();
    s.request_stop(None);
    let err = s.begin().unwrap_err();
    assert!(matches!(err, BridgeError::SessionBusy(_)));
    assert_eq!(s.state(), SessionState::Stopping);
}

#[test]
fn begin_while_running_is_busy() {
    let s = SearchSession::new();
    s.begin().unwrap();
    assert!(matches!(s.begin(), Err(BridgeError::SessionBusy(_))));
    assert_eq!(s.state(), SessionState::Running);
}

#[test]
fn later_stops_join_the_in_flight_stop() {
    let host = HostQueue::new();
    let s = SearchSession::new();
    s.begin().unwrap();
    let w = waiters(&host, 3);
    let expected = keys(&w[1..]);
    let mut w = w.into_iter();
    assert_eq!(s.request_stop(w.next()), StopRequest::Begin);
    assert_eq!(s.request_stop(w.next()), StopRequest::Joined);
    assert_eq!(s.request_stop(w.next()), StopRequest::Joined);

    let joined = s.finish_stop();
    assert_eq!(keys(&joined), expected);
    for waiter in joined {
        waiter.complete(&Ok(()));
    }
    let mut posted = Vec::new();
    while let Some(msg) = host.try_recv() {
        assert!(matches!(msg.outcome, Outcome::Unit(Ok(()))));
        posted.push(msg.key);
    }
    assert_eq!(posted, expected);
}

#[test]
fn stop_raises_the_attached_closing_flag() {
    let s = SearchSession::new();
    let g = s.begin().unwrap();
    let flag = Arc::new(AtomicBool::new(false));
    s.attach_closing(g + 1, Arc::new(AtomicBool::new(false)));
    s.attach_closing(g, flag.clone());
    assert_eq!(s.request_stop(None), StopRequest::Begin);
    assert!(flag.load(Ordering::Acquire));
}

#[test]
fn teardown_stop_only_targets_its_own_generation() {
    let s = SearchSession::new();
    let g = s.begin().unwrap();
    assert!(!s.request_stop_of(g + 1));
    assert_eq!(s.state(), SessionState::Running);
    assert!(s.request_stop_of(g));
    assert_eq!(s.state(), SessionState::Stopping);
    assert!(!s.request_stop_of(g));
}

#[test]
fn abort_begin_only_reverts_its_own_generation() {
    let s = SearchSession::new();
    let g = s.begin().unwrap();
    s.abort_begin(g + 1);
    assert_eq!(s.state(), SessionState::Running);
    s.abort_begin(g);
    assert_eq!(s.state(), SessionState::Idle);
}

#[test]
fn one_session_per_engine_instance() {
    let a = Arc::new(1u32);
    let b = Arc::new(1u32);
    let sa = SearchSession::for_engine(&a);
    assert!(Arc::ptr_eq(&sa, &SearchSession::for_engine(&a.clone())));
    assert!(!Arc::ptr_eq(&sa, &SearchSession::for_engine(&b)));

    sa.begin().unwrap();
    assert_eq!(SearchSession::for_engine(&a).state(), SessionState::Running);
}

#[test]
fn thread_clamping() {
    assert_eq!(clamp_threads(64, 8).unwrap(), 8);
    assert_eq!(clamp_threads(3, 8).unwrap(), 3);
    assert_eq!(clamp_threads(4, 0).unwrap(), 1);
    assert!(matches!(clamp_threads(0, 8), Err(BridgeError::Argument(_))));
    assert!(hardware_concurrency() >= 1);
}
