//! Reference CPU compositing engine.
//!
//! Layers are full-frame premultiplied RGBA8 rasters composited bottom-up. Scaled caches are built
//! by nearest-neighbour downsampling when a size key is registered. The search loop perturbs layer
//! opacities on a set of named threads and streams every render as a sample.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::channel::{Emit, Sample, SampleSink};
use crate::engine::composite::blend_in_place;
use crate::engine::{Engine, SearchRequest};
use crate::foundation::core::{Context, FULL_SIZE, Image, LayerState, SearchMode, SizeKey};
use crate::foundation::error::{BridgeError, BridgeResult};

/// The only search mode this engine implements: independent random opacity proposals.
pub const RANDOM_SEARCH: SearchMode = SearchMode(0);

struct LayerEntry {
    name: String,
    image: Arc<Image>,
}

struct ScaledCache {
    scale: f32,
    width: u32,
    height: u32,
    layers: BTreeMap<String, Arc<Image>>,
}

struct EngineState {
    width: u32,
    height: u32,
    layers: Vec<LayerEntry>,
    caches: BTreeMap<String, ScaledCache>,
    context: Context,
}

impl EngineState {
    fn layer_index(&self, name: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.name == name)
    }

    fn dimensions(&self, size: &SizeKey) -> BridgeResult<(u32, u32)> {
        if size.is_full() {
            return Ok((self.width, self.height));
        }
        self.caches
            .get(size.as_str())
            .map(|c| (c.width, c.height))
            .ok_or_else(|| unknown_size(size))
    }

    fn layer_at(&self, idx: usize, size: &SizeKey) -> BridgeResult<&Arc<Image>> {
        let entry = &self.layers[idx];
        if size.is_full() {
            return Ok(&entry.image);
        }
        self.caches
            .get(size.as_str())
            .ok_or_else(|| unknown_size(size))?
            .layers
            .get(&entry.name)
            .ok_or_else(|| {
                BridgeError::engine(format!("cache '{size}' has no layer '{}'", entry.name))
            })
    }

    /// Composite `ctx` at `size`; `state_for` may rewrite each layer's state before blending.
    fn composite(
        &self,
        ctx: &Context,
        size: &SizeKey,
        mut state_for: impl FnMut(usize, LayerState) -> LayerState,
    ) -> BridgeResult<Image> {
        if let Some(unknown) = ctx.keys().find(|k| self.layer_index(k).is_none()) {
            return Err(BridgeError::engine(format!(
                "context names unknown layer '{unknown}'"
            )));
        }
        let (w, h) = self.dimensions(size)?;
        let mut out = Image::new(w, h);
        for idx in 0..self.layers.len() {
            let Some(state) = ctx.get(&self.layers[idx].name).copied() else {
                continue;
            };
            let state = state_for(idx, state);
            if !state.visible || state.opacity <= 0.0 {
                continue;
            }
            let src = self.layer_at(idx, size)?;
            blend_in_place(out.data_mut(), src.data(), state.blend, state.opacity)?;
        }
        Ok(out)
    }
}

fn unknown_size(size: &SizeKey) -> BridgeError {
    BridgeError::engine(format!("unknown size key '{size}'"))
}

#[derive(Default)]
struct SearchWorkers {
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

/// In-process CPU compositor.
pub struct CpuEngine {
    state: Arc<RwLock<EngineState>>,
    search: Mutex<SearchWorkers>,
}

impl CpuEngine {
    /// Create an engine with an empty layer stack.
    pub fn new(width: u32, height: u32) -> BridgeResult<Self> {
        if width == 0 || height == 0 {
            return Err(BridgeError::argument(format!(
                "engine dimensions must be non-zero, got {width}x{height}"
            )));
        }
        Ok(Self {
            state: Arc::new(RwLock::new(EngineState {
                width,
                height,
                layers: Vec::new(),
                caches: BTreeMap::new(),
                context: Context::new(),
            })),
            search: Mutex::new(SearchWorkers::default()),
        })
    }

    /// Append a layer on top of the stack with the default state.
    pub fn add_layer(&self, name: impl Into<String>, image: Image) -> BridgeResult<()> {
        self.add_layer_with_state(name, image, LayerState::default())
    }

    /// Append a layer on top of the stack.
    pub fn add_layer_with_state(
        &self,
        name: impl Into<String>,
        image: Image,
        state: LayerState,
    ) -> BridgeResult<()> {
        let name = name.into();
        let mut st = self.write();
        if name.is_empty() {
            return Err(BridgeError::argument("layer name must be non-empty"));
        }
        if st.layer_index(&name).is_some() {
            return Err(BridgeError::argument(format!("layer '{name}' already exists")));
        }
        if image.width() != st.width || image.height() != st.height {
            return Err(BridgeError::argument(format!(
                "layer '{name}' is {}x{}, engine is {}x{}",
                image.width(),
                image.height(),
                st.width,
                st.height
            )));
        }
        for cache in st.caches.values_mut() {
            let scaled = downscale(&image, cache.width, cache.height);
            cache.layers.insert(name.clone(), Arc::new(scaled));
        }
        st.context.insert(name.clone(), state);
        st.layers.push(LayerEntry {
            name,
            image: Arc::new(image),
        });
        Ok(())
    }

    /// Remove a layer and its cached images. Returns `false` when the layer does not exist.
    pub fn delete_layer(&self, name: &str) -> bool {
        let mut st = self.write();
        let Some(idx) = st.layer_index(name) else {
            return false;
        };
        st.layers.remove(idx);
        st.context.remove(name);
        for cache in st.caches.values_mut() {
            cache.layers.remove(name);
        }
        true
    }

    /// Scale factor registered for `key`.
    pub fn cache_scale(&self, key: &str) -> Option<f32> {
        if key == FULL_SIZE {
            return Some(1.0);
        }
        self.read().caches.get(key).map(|c| c.scale)
    }

    fn read(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn workers(&self) -> MutexGuard<'_, SearchWorkers> {
        self.search.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Engine for CpuEngine {
    fn context(&self) -> Context {
        self.read().context.clone()
    }

    fn set_context(&self, ctx: &Context) -> BridgeResult<()> {
        let mut st = self.write();
        if let Some(unknown) = ctx.keys().find(|k| st.layer_index(k).is_none()) {
            return Err(BridgeError::engine(format!(
                "context names unknown layer '{unknown}'"
            )));
        }
        st.context = ctx.clone();
        Ok(())
    }

    #[tracing::instrument(skip(self, ctx), fields(layers = ctx.len()))]
    fn render_context(&self, ctx: &Context, size: &SizeKey) -> BridgeResult<Image> {
        self.read().composite(ctx, size, |_, s| s)
    }

    #[tracing::instrument(skip(self, ctx))]
    fn render_up_to_layer(
        &self,
        ctx: &Context,
        layer: &str,
        precomp: &str,
        dim: f32,
        size: &SizeKey,
    ) -> BridgeResult<Image> {
        if !precomp.is_empty() && precomp != "root" {
            return Err(BridgeError::engine(format!(
                "unknown precomp '{precomp}'; this engine only has 'root'"
            )));
        }
        let st = self.read();
        let cut = st
            .layer_index(layer)
            .ok_or_else(|| BridgeError::engine(format!("unknown layer '{layer}'")))?;
        let dim = if dim.is_finite() { dim.clamp(0.0, 1.0) } else { 0.0 };
        st.composite(ctx, size, |idx, mut s| {
            if idx > cut {
                s.opacity *= dim;
            }
            s
        })
    }

    fn start_search(&self, sink: SampleSink, request: SearchRequest) -> BridgeResult<()> {
        if request.mode != RANDOM_SEARCH {
            return Err(BridgeError::engine(format!(
                "unsupported search mode {}",
                request.mode.0
            )));
        }
        self.read().dimensions(&request.size)?;

        let mut workers = self.workers();
        if !workers.handles.is_empty() {
            return Err(BridgeError::engine("search loop is already running"));
        }
        let stop = Arc::new(AtomicBool::new(false));
        let params = LoopParams::from_request(&request);

        for thread in 0..request.threads {
            let worker = SearchThread {
                thread,
                state: self.state.clone(),
                stop: stop.clone(),
                sink: sink.clone(),
                size: request.size.clone(),
                params,
            };
            let spawned = std::thread::Builder::new()
                .name(format!("cpu-search-{thread}"))
                .spawn(move || worker.run());
            match spawned {
                Ok(h) => workers.handles.push(h),
                Err(e) => {
                    stop.store(true, Ordering::Release);
                    for h in workers.handles.drain(..) {
                        let _ = h.join();
                    }
                    return Err(BridgeError::engine(format!(
                        "failed to spawn search thread {thread}: {e}"
                    )));
                }
            }
        }
        workers.stop = stop;
        tracing::info!(threads = request.threads, size = %request.size, "search loop started");
        Ok(())
    }

    fn stop_search(&self) -> BridgeResult<()> {
        let handles = {
            let mut workers = self.workers();
            workers.stop.store(true, Ordering::Release);
            std::mem::take(&mut workers.handles)
        };
        let mut panicked = 0usize;
        for h in handles {
            if h.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            return Err(BridgeError::engine(format!(
                "{panicked} search thread(s) panicked"
            )));
        }
        tracing::info!("search loop joined");
        Ok(())
    }

    fn layer_image(&self, layer: &str) -> BridgeResult<Arc<Image>> {
        let st = self.read();
        st.layer_index(layer)
            .map(|i| st.layers[i].image.clone())
            .ok_or_else(|| BridgeError::engine(format!("unknown layer '{layer}'")))
    }

    fn cached_image(&self, layer: &str, size: &SizeKey) -> BridgeResult<Arc<Image>> {
        let st = self.read();
        let idx = st
            .layer_index(layer)
            .ok_or_else(|| BridgeError::engine(format!("unknown layer '{layer}'")))?;
        st.layer_at(idx, size).cloned()
    }

    fn layer_names(&self) -> Vec<String> {
        self.read().layers.iter().map(|l| l.name.clone()).collect()
    }

    fn cache_sizes(&self) -> Vec<String> {
        let st = self.read();
        std::iter::once(FULL_SIZE.to_string())
            .chain(st.caches.keys().cloned())
            .collect()
    }

    fn add_cache_size(&self, key: &str, scale: f32) -> BridgeResult<()> {
        if key.trim().is_empty() || key == FULL_SIZE {
            return Err(BridgeError::argument(format!(
                "cache key '{key}' is reserved or empty"
            )));
        }
        if !(scale > 0.0 && scale <= 1.0) {
            return Err(BridgeError::argument(format!(
                "cache scale must be in (0, 1], got {scale}"
            )));
        }
        let mut st = self.write();
        let width = ((st.width as f32 * scale).round() as u32).max(1);
        let height = ((st.height as f32 * scale).round() as u32).max(1);
        let layers = st
            .layers
            .iter()
            .map(|l| (l.name.clone(), Arc::new(downscale(&l.image, width, height))))
            .collect();
        st.caches.insert(
            key.to_string(),
            ScaledCache {
                scale,
                width,
                height,
                layers,
            },
        );
        tracing::debug!(key, width, height, "cache size added");
        Ok(())
    }

    fn dimensions(&self, size: &SizeKey) -> BridgeResult<(u32, u32)> {
        self.read().dimensions(size)
    }
}

impl Drop for CpuEngine {
    fn drop(&mut self) {
        let _ = self.stop_search();
    }
}

fn downscale(src: &Image, width: u32, height: u32) -> Image {
    if src.width() == width && src.height() == height {
        return src.clone();
    }
    let mut out = Image::new(width, height);
    let sw = src.width() as usize;
    let (w, h) = (width as usize, height as usize);
    let dst = out.data_mut();
    for y in 0..h {
        let sy = (y * src.height() as usize / h).min(src.height() as usize - 1);
        for x in 0..w {
            let sx = (x * sw / w).min(sw - 1);
            let si = (sy * sw + sx) * 4;
            let di = (y * w + x) * 4;
            dst[di..di + 4].copy_from_slice(&src.data()[si..si + 4]);
        }
    }
    out
}

#[derive(Clone, Copy, Debug)]
struct LoopParams {
    max_samples: Option<u64>,
    interval: Duration,
    seed: u64,
}

impl LoopParams {
    fn from_request(request: &SearchRequest) -> Self {
        let opt = |k: &str| request.options.get(k).copied().filter(|v| *v > 0.0);
        Self {
            max_samples: opt("maxSamples").map(|v| v as u64),
            interval: opt("intervalMs")
                .map(|v| Duration::from_micros((v * 1000.0) as u64))
                .unwrap_or(Duration::ZERO),
            seed: opt("seed").map(|v| v as u64).unwrap_or(0x5EED),
        }
    }
}

struct SearchThread {
    thread: usize,
    state: Arc<RwLock<EngineState>>,
    stop: Arc<AtomicBool>,
    sink: SampleSink,
    size: SizeKey,
    params: LoopParams,
}

impl SearchThread {
    fn run(self) {
        let mut rng = SplitMix64(self.params.seed ^ (self.thread as u64).wrapping_mul(0x9E37));
        let mut iteration = 0u64;
        loop {
            if self.stop.load(Ordering::Acquire) || self.sink.is_closing() {
                break;
            }
            if self.params.max_samples.is_some_and(|max| iteration >= max) {
                break;
            }
            let rendered = {
                let st = self.state.read().unwrap_or_else(PoisonError::into_inner);
                let mut ctx = st.context.clone();
                for (_, layer) in ctx.iter_mut() {
                    layer.opacity = rng.next_f32();
                }
                st.composite(&ctx, &self.size, |_, s| s).map(|img| (img, ctx))
            };
            let (image, ctx) = match rendered {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(thread = self.thread, error = %e, "search render failed");
                    break;
                }
            };
            let sample = Sample::new(image, ctx)
                .with_number("thread", self.thread as f64)
                .with_number("iteration", iteration as f64)
                .with_text("mode", "random");
            if self.sink.emit(sample) == Emit::Disconnected {
                break;
            }
            iteration += 1;
            if !self.params.interval.is_zero() {
                std::thread::sleep(self.params.interval);
            }
        }
        tracing::debug!(thread = self.thread, iteration, "search thread exiting");
    }
}

struct SplitMix64(u64);

impl SplitMix64 {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }
}

#[cfg(test)]
#[path = "../../tests/unit/engine/cpu.rs"]
mod tests;
