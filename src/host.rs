//! Host-thread delivery queue.
//!
//! Worker threads never call host code. They post [`HostMsg`] values into a multi-producer
//! channel; the host drains it from its own thread when it calls `Bridge::pump`.

use std::thread::ThreadId;

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use slotmap::new_key_type;

use crate::foundation::core::Image;
use crate::foundation::error::BridgeResult;

new_key_type! {
    /// Key of a host callback waiting for its completion.
    pub(crate) struct CallbackKey;
}

/// Payload of a finished work unit.
#[derive(Debug)]
pub(crate) enum Outcome {
    Image(BridgeResult<Image>),
    Unit(BridgeResult<()>),
}

#[derive(Debug)]
pub(crate) struct HostMsg {
    pub(crate) key: CallbackKey,
    pub(crate) outcome: Outcome,
}

/// Cloneable, `Send` posting side of the host queue.
#[derive(Clone, Debug)]
pub(crate) struct HostPoster {
    tx: Sender<HostMsg>,
}

impl HostPoster {
    /// Post a completion. Returns `false` when the host side is gone.
    pub(crate) fn post(&self, msg: HostMsg) -> bool {
        match self.tx.send(msg) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    key = ?err.0.key,
                    "host queue closed, completion dropped with its bridge"
                );
                false
            }
        }
    }
}

/// Receiving side, owned by the host thread.
pub(crate) struct HostQueue {
    tx: Sender<HostMsg>,
    rx: Receiver<HostMsg>,
    thread: ThreadId,
}

impl HostQueue {
    /// Create a queue bound to the calling thread.
    pub(crate) fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            thread: std::thread::current().id(),
        }
    }

    pub(crate) fn poster(&self) -> HostPoster {
        HostPoster {
            tx: self.tx.clone(),
        }
    }

    pub(crate) fn try_recv(&self) -> Option<HostMsg> {
        match self.rx.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub(crate) fn receiver(&self) -> &Receiver<HostMsg> {
        &self.rx
    }

    pub(crate) fn host_thread(&self) -> ThreadId {
        self.thread
    }

    /// Return `true` when called from the thread that created the queue.
    pub(crate) fn on_host_thread(&self) -> bool {
        std::thread::current().id() == self.thread
    }
}
