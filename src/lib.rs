//! A thread-safe bridge between a multi-threaded compositing engine and a single-threaded host.
//!
//! The public API is bridge-oriented:
//!
//! - Wrap an [`Engine`] (for example a [`CpuEngine`] built from a [`SceneDef`]) in a [`Bridge`]
//! - Render synchronously, or asynchronously with callbacks run by [`Bridge::pump`]
//! - Start a search session and receive [`SampleEvent`]s on the host thread
//! - Stop it through the async-only cancellation path
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Host-facing bridge surface.
pub mod bridge;
pub(crate) mod channel;
pub(crate) mod dispatch;
pub(crate) mod engine;
pub(crate) mod handle;
pub(crate) mod host;
/// JSON scene files for the reference engine.
pub mod scene;
pub(crate) mod session;

pub use crate::foundation::core::{
    BlendMode, Context, FULL_SIZE, Image, LayerState, MetaValue, Metadata, SearchMode,
    SearchOptions, SizeKey,
};
pub use crate::foundation::error::{BridgeError, BridgeResult};
pub use crate::foundation::opts::{BridgeOpts, OverflowPolicy, SampleChannelOpts};

pub use crate::bridge::{Bridge, PumpStats, SampleEvent};
pub use crate::channel::{Emit, Sample, SampleChannelStats, SampleSink};
pub use crate::engine::cpu::{CpuEngine, RANDOM_SEARCH};
pub use crate::engine::{Engine, SearchRequest};
pub use crate::handle::{
    BridgeId, Borrowing, Handle, HandleId, Ownership, OwnershipKind, Owning, Resource,
};
pub use crate::scene::{FillDef, LayerDef, SceneDef};
pub use crate::session::{SessionState, hardware_concurrency};
