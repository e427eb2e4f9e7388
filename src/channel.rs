//! Search sample streaming from engine threads to the host thread.
//!
//! The engine's search loop calls [`SampleSink::emit`] from any of its worker threads. Each call
//! moves one [`Sample`] into a record on a multi-producer channel; the host drains records during
//! `Bridge::pump` and turns them into handles. Records from the same producer thread arrive in
//! emission order. There is no ordering across producers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{
    Receiver, SendTimeoutError, Sender, TryRecvError, TrySendError, bounded, unbounded,
};

use crate::foundation::core::{Context, Image, MetaValue, Metadata};
use crate::foundation::opts::{OverflowPolicy, SampleChannelOpts};

/// How long a blocked producer waits before re-checking whether its session is closing.
const BLOCKED_SEND_POLL: Duration = Duration::from_millis(10);

/// One unit of search progress produced by the engine.
#[derive(Clone, Debug)]
pub struct Sample {
    /// Freshly allocated result image; ownership moves to the host on delivery.
    pub image: Image,
    /// Context that produced `image`.
    pub context: Context,
    /// Numeric metadata.
    pub numeric: BTreeMap<String, f64>,
    /// String metadata.
    pub text: BTreeMap<String, String>,
}

impl Sample {
    /// Create a sample without metadata.
    pub fn new(image: Image, context: Context) -> Self {
        Self {
            image,
            context,
            numeric: BTreeMap::new(),
            text: BTreeMap::new(),
        }
    }

    /// Add a numeric metadata entry.
    pub fn with_number(mut self, key: impl Into<String>, value: f64) -> Self {
        self.numeric.insert(key.into(), value);
        self
    }

    /// Add a string metadata entry.
    pub fn with_text(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.text.insert(key.into(), value.into());
        self
    }

    /// Merge both metadata maps. String entries win on key collisions.
    pub(crate) fn merged_metadata(
        numeric: BTreeMap<String, f64>,
        text: BTreeMap<String, String>,
    ) -> Metadata {
        let mut out: Metadata = numeric
            .into_iter()
            .map(|(k, v)| (k, MetaValue::Number(v)))
            .collect();
        for (k, v) in text {
            out.insert(k, MetaValue::Text(v));
        }
        out
    }
}

/// Result of offering a sample to the channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Emit {
    /// The sample is queued for host delivery.
    Queued,
    /// The sample was dropped (channel full under `DropNewest`, or the session is closing).
    Dropped,
    /// The bridge is gone; the search loop should wind down.
    Disconnected,
}

/// Transport record carried across the channel.
#[derive(Debug)]
pub(crate) struct SampleRecord {
    pub(crate) session: u64,
    pub(crate) sample: Sample,
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    stale: AtomicU64,
}

/// Snapshot of sample channel counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SampleChannelStats {
    /// Records accepted into the channel.
    pub queued: u64,
    /// Records dropped by the overflow policy or while closing.
    pub dropped: u64,
    /// Records handed to a host listener.
    pub delivered: u64,
    /// Records discarded at delivery because their session had ended.
    pub stale: u64,
}

/// Producer side handed to the engine's search loop.
///
/// Cheap to clone; every engine worker thread may hold its own copy.
#[derive(Clone, Debug)]
pub struct SampleSink {
    tx: Sender<SampleRecord>,
    session: u64,
    closing: Arc<AtomicBool>,
    overflow: OverflowPolicy,
    counters: Arc<Counters>,
}

impl SampleSink {
    /// Offer one sample to the host.
    ///
    /// Under [`OverflowPolicy::Block`] this blocks the calling engine thread while the channel is
    /// full, but returns [`Emit::Dropped`] once the session starts stopping.
    pub fn emit(&self, sample: Sample) -> Emit {
        if self.is_closing() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return Emit::Dropped;
        }
        let mut record = SampleRecord {
            session: self.session,
            sample,
        };
        match self.overflow {
            OverflowPolicy::DropNewest => match self.tx.try_send(record) {
                Ok(()) => self.queued(),
                Err(TrySendError::Full(_)) => {
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(session = self.session, "sample channel full, dropped");
                    Emit::Dropped
                }
                Err(TrySendError::Disconnected(_)) => Emit::Disconnected,
            },
            OverflowPolicy::Block => loop {
                match self.tx.send_timeout(record, BLOCKED_SEND_POLL) {
                    Ok(()) => return self.queued(),
                    Err(SendTimeoutError::Timeout(back)) => {
                        if self.is_closing() {
                            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                            return Emit::Dropped;
                        }
                        record = back;
                    }
                    Err(SendTimeoutError::Disconnected(_)) => return Emit::Disconnected,
                }
            },
        }
    }

    /// Return `true` once the session this sink belongs to has been asked to stop.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    pub(crate) fn closing_flag(&self) -> Arc<AtomicBool> {
        self.closing.clone()
    }

    fn queued(&self) -> Emit {
        self.counters.queued.fetch_add(1, Ordering::Relaxed);
        Emit::Queued
    }
}

/// Host side of the sample channel.
pub(crate) struct EventChannel {
    tx: Sender<SampleRecord>,
    rx: Receiver<SampleRecord>,
    overflow: OverflowPolicy,
    counters: Arc<Counters>,
    closing: Option<Arc<AtomicBool>>,
}

impl EventChannel {
    pub(crate) fn new(opts: SampleChannelOpts) -> Self {
        let (tx, rx) = match opts.capacity {
            Some(cap) => bounded(cap.max(1)),
            None => unbounded(),
        };
        Self {
            tx,
            rx,
            overflow: opts.overflow,
            counters: Arc::new(Counters::default()),
            closing: None,
        }
    }

    /// Create the producer side for a new session.
    pub(crate) fn open_session(&mut self, session: u64) -> SampleSink {
        let closing = Arc::new(AtomicBool::new(false));
        self.closing = Some(closing.clone());
        SampleSink {
            tx: self.tx.clone(),
            session,
            closing,
            overflow: self.overflow,
            counters: self.counters.clone(),
        }
    }

    /// Mark the current session as closing; blocked producers return promptly.
    pub(crate) fn close_session(&mut self) {
        if let Some(flag) = self.closing.take() {
            flag.store(true, Ordering::Release);
        }
    }

    pub(crate) fn try_recv(&self) -> Option<SampleRecord> {
        match self.rx.try_recv() {
            Ok(rec) => Some(rec),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub(crate) fn receiver(&self) -> &Receiver<SampleRecord> {
        &self.rx
    }

    pub(crate) fn record_delivered(&self) {
        self.counters.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stale(&self) {
        self.counters.stale.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stats(&self) -> SampleChannelStats {
        SampleChannelStats {
            queued: self.counters.queued.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            stale: self.counters.stale.load(Ordering::Relaxed),
        }
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        self.close_session();
    }
}

#[cfg(test)]
#[path = "../tests/unit/channel/sample_channel.rs"]
mod tests;
