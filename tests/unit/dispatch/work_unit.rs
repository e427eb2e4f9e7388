use super::*;
use crate::foundation::core::Image;
use crate::host::HostQueue;
use slotmap::SlotMap;
use std::time::Duration;

fn key() -> CallbackKey {
    SlotMap::<CallbackKey, ()>::with_key().insert(())
}

#[test]
fn unit_walks_pending_running_completed() {
    let k = key();
    let mut unit = WorkUnit::new("render", k, || Ok(Image::new(1, 1)), Outcome::Image);
    assert_eq!(unit.state(), WorkState::Pending);
    let msg = unit.run();
    assert_eq!(unit.state(), WorkState::Completed);
    assert_eq!(msg.key, k);
    assert!(matches!(msg.outcome, Outcome::Image(Ok(_))));
}

#[test]
fn engine_error_lands_in_error_slot() {
    let mut unit = WorkUnit::<Image>::new(
        "render",
        key(),
        || Err(BridgeError::engine("no such layer")),
        Outcome::Image,
    );
    match unit.run().outcome {
        Outcome::Image(Err(BridgeError::Engine(msg))) => assert!(msg.contains("no such layer")),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn panic_is_captured_not_propagated() {
    let mut unit = WorkUnit::<()>::new("stop", key(), || panic!("join exploded"), Outcome::Unit);
    match unit.run().outcome {
        Outcome::Unit(Err(BridgeError::Engine(msg))) => {
            assert!(msg.contains("stop panicked"));
            assert!(msg.contains("join exploded"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn running_twice_reports_error_instead_of_rerunning() {
    let mut unit = WorkUnit::new("stop", key(), || Ok(()), Outcome::Unit);
    assert!(matches!(unit.run().outcome, Outcome::Unit(Ok(()))));
    assert!(matches!(unit.run().outcome, Outcome::Unit(Err(_))));
}

#[test]
fn dispatcher_posts_completion_to_host_queue() {
    let host = HostQueue::new();
    let d = Dispatcher::new(Some(2), host.poster()).unwrap();
    let k = key();
    d.submit(WorkUnit::new(
        "render",
        k,
        || Ok(Image::new(2, 2)),
        Outcome::Image,
    ));
    let msg = host
        .receiver()
        .recv_timeout(Duration::from_secs(5))
        .expect("completion posted");
    assert_eq!(msg.key, k);
}

#[test]
fn zero_worker_threads_is_rejected() {
    let host = HostQueue::new();
    assert!(matches!(
        Dispatcher::new(Some(0), host.poster()),
        Err(BridgeError::Argument(_))
    ));
}
