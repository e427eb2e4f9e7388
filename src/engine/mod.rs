//! The engine contract the bridge marshals for.
//!
//! The bridge never interprets engine values. An engine is shared across the host thread, the
//! async work pool, and its own search threads, so every method takes `&self`.

pub(crate) mod composite;
pub(crate) mod cpu;

use std::sync::Arc;

use crate::channel::SampleSink;
use crate::foundation::core::{Context, FULL_SIZE, Image, SearchMode, SearchOptions, SizeKey};
use crate::foundation::error::{BridgeError, BridgeResult};

/// Parameters of one search session, after bridge-side validation and clamping.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchRequest {
    /// Engine-defined search mode.
    pub mode: SearchMode,
    /// Named numeric options.
    pub options: SearchOptions,
    /// Effective worker thread count (already clamped to hardware concurrency).
    pub threads: usize,
    /// Resolution used for sample renders.
    pub size: SizeKey,
}

/// A compositing/optimization engine.
pub trait Engine: Send + Sync + 'static {
    /// Snapshot (copy) of the engine's primary context.
    fn context(&self) -> Context;

    /// Replace the primary context with a copy of `ctx`.
    fn set_context(&self, ctx: &Context) -> BridgeResult<()>;

    /// Render an arbitrary context. Returns a freshly allocated image.
    fn render_context(&self, ctx: &Context, size: &SizeKey) -> BridgeResult<Image>;

    /// Render `ctx` up to and including `layer`, attenuating what lies above it by `dim`.
    fn render_up_to_layer(
        &self,
        ctx: &Context,
        layer: &str,
        precomp: &str,
        dim: f32,
        size: &SizeKey,
    ) -> BridgeResult<Image>;

    /// Start the engine's search loop. Must return once the loop's threads are spawned.
    fn start_search(&self, sink: SampleSink, request: SearchRequest) -> BridgeResult<()>;

    /// Signal the search loop to stop and block until all of its threads have joined.
    fn stop_search(&self) -> BridgeResult<()>;

    /// Render the primary context.
    fn render(&self, size: &SizeKey) -> BridgeResult<Image> {
        self.render_context(&self.context(), size)
    }

    /// Render a single layer of `ctx` in isolation.
    fn render_only_layer(&self, ctx: &Context, layer: &str, size: &SizeKey) -> BridgeResult<Image> {
        let state = ctx
            .get(layer)
            .copied()
            .ok_or_else(|| BridgeError::engine(format!("unknown layer '{layer}'")))?;
        let mut only = Context::new();
        only.insert(layer, state);
        self.render_context(&only, size)
    }

    /// Image stored for `layer` in engine-owned storage.
    fn layer_image(&self, layer: &str) -> BridgeResult<Arc<Image>> {
        Err(BridgeError::engine(format!(
            "engine does not expose layer storage (requested '{layer}')"
        )))
    }

    /// Cached image of `layer` at `size`, in engine-owned storage.
    fn cached_image(&self, layer: &str, size: &SizeKey) -> BridgeResult<Arc<Image>> {
        if size.is_full() {
            return self.layer_image(layer);
        }
        Err(BridgeError::engine(format!(
            "engine has no cache '{size}' for layer '{layer}'"
        )))
    }

    /// Layer names in compositing order, bottom first.
    fn layer_names(&self) -> Vec<String> {
        self.context().keys().map(str::to_string).collect()
    }

    /// Known size keys.
    fn cache_sizes(&self) -> Vec<String> {
        vec![FULL_SIZE.to_string()]
    }

    /// Register a scaled cache.
    fn add_cache_size(&self, key: &str, scale: f32) -> BridgeResult<()> {
        let _ = scale;
        Err(BridgeError::engine(format!(
            "engine does not support cache sizes (requested '{key}')"
        )))
    }

    /// Output dimensions at `size`.
    fn dimensions(&self, size: &SizeKey) -> BridgeResult<(u32, u32)>;
}
