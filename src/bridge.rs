//! The host-facing surface: a [`Bridge`] wraps one engine instance for the host thread.
//!
//! A bridge lives on the host thread (it is `!Send`). Synchronous calls run the engine inline and
//! return handles right away. Asynchronous calls validate their inputs on the spot, capture them
//! by value into a work unit, and return; their callbacks run later, inside [`Bridge::pump`].
//! Search samples reach the host listener through the same pump.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use slotmap::SlotMap;

use crate::channel::{EventChannel, Sample, SampleChannelStats, SampleRecord};
use crate::dispatch::{Dispatcher, WorkUnit, panic_to_error};
use crate::engine::{Engine, SearchRequest};
use crate::foundation::core::{
    Context, Image, LayerState, Metadata, SearchMode, SearchOptions, SizeKey,
};
use crate::foundation::error::{BridgeError, BridgeResult};
use crate::foundation::opts::BridgeOpts;
use crate::handle::{
    BridgeId, Borrowing, Handle, HandleRegistry, Ownership, Owning, Resource,
};
use crate::host::{CallbackKey, HostMsg, HostQueue, Outcome};
use crate::session::{
    SearchSession, SessionState, StopRequest, StopWaiter, clamp_threads, hardware_concurrency,
};

type RenderCallback<E> = Box<dyn FnOnce(&mut Bridge<E>, BridgeResult<Handle<Image, Owning>>)>;
type StopCallback<E> = Box<dyn FnOnce(&mut Bridge<E>, BridgeResult<()>)>;
type SampleListener<E> = Box<dyn FnMut(&mut Bridge<E>, SampleEvent)>;

enum PendingCallback<E: Engine> {
    Render(RenderCallback<E>),
    Stop {
        /// Listener session current when the stop was requested.
        generation: Option<u64>,
        done: StopCallback<E>,
    },
}

impl<E: Engine> PendingCallback<E> {
    fn fail(self, bridge: &mut Bridge<E>, err: BridgeError) {
        match self {
            PendingCallback::Render(f) => f(bridge, Err(err)),
            PendingCallback::Stop { done, .. } => done(bridge, Err(err)),
        }
    }
}

struct Listener<E: Engine> {
    generation: u64,
    on_sample: SampleListener<E>,
}

/// One search sample, as delivered to the host listener.
#[derive(Debug)]
pub struct SampleEvent {
    /// Image produced by the search step. The listener owns it.
    pub image: Handle<Image, Owning>,
    /// Snapshot of the context that produced `image`.
    pub context: Handle<Context, Owning>,
    /// Numeric and string metadata merged into one map.
    pub metadata: Metadata,
}

/// Work done by one [`Bridge::pump`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PumpStats {
    /// Completion callbacks invoked.
    pub completions: usize,
    /// Samples handed to the listener.
    pub samples: usize,
    /// Samples discarded because their session had ended.
    pub stale: usize,
}

impl PumpStats {
    /// Return `true` when the pump did nothing.
    pub fn is_idle(&self) -> bool {
        self.completions == 0 && self.samples == 0 && self.stale == 0
    }
}

/// Bridge between one engine and the single-threaded host.
///
/// Several bridges may wrap the same engine through [`Bridge::from_arc`]; they share that
/// engine's search session, so at most one search runs on it at a time.
pub struct Bridge<E: Engine> {
    id: BridgeId,
    engine: Arc<E>,
    hardware_threads: usize,
    registry: HandleRegistry,
    host: HostQueue,
    callbacks: SlotMap<CallbackKey, PendingCallback<E>>,
    dispatcher: Dispatcher,
    session: Arc<SearchSession>,
    samples: EventChannel,
    listener: Option<Listener<E>>,
    torn_down: bool,
}

impl<E: Engine> Bridge<E> {
    /// Wrap `engine`. The calling thread becomes the host thread.
    pub fn new(engine: E, opts: BridgeOpts) -> BridgeResult<Self> {
        Self::from_arc(Arc::new(engine), opts)
    }

    /// Wrap an engine that is already shared.
    pub fn from_arc(engine: Arc<E>, opts: BridgeOpts) -> BridgeResult<Self> {
        opts.validate()?;
        let id = BridgeId::next();
        let host = HostQueue::new();
        let dispatcher = Dispatcher::new(opts.worker_threads, host.poster())?;
        let hardware_threads = opts.hardware_threads.unwrap_or_else(hardware_concurrency);
        let session = SearchSession::for_engine(&engine);
        tracing::debug!(?id, hardware_threads, "bridge created");
        Ok(Self {
            id,
            engine,
            hardware_threads,
            registry: HandleRegistry::new(id),
            host,
            callbacks: SlotMap::with_key(),
            dispatcher,
            session,
            samples: EventChannel::new(opts.sample_channel),
            listener: None,
            torn_down: false,
        })
    }

    /// Identity stamped into every handle this bridge issues.
    pub fn id(&self) -> BridgeId {
        self.id
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Thread that created the bridge; every callback runs here.
    pub fn host_thread(&self) -> ThreadId {
        self.host.host_thread()
    }

    /// Hardware concurrency figure used to clamp search threads.
    pub fn hardware_threads(&self) -> usize {
        self.hardware_threads
    }

    /// Async callbacks registered but not yet invoked.
    pub fn pending_callbacks(&self) -> usize {
        self.callbacks.len()
    }

    // ---------------------------------------------------------------------------------------
    // Dispatch adapters
    // ---------------------------------------------------------------------------------------

    /// Render the engine's primary context.
    #[tracing::instrument(skip(self))]
    pub fn render(&mut self, size: Option<&str>) -> BridgeResult<Handle<Image, Owning>> {
        let size = SizeKey::resolve(size)?;
        let image = self.engine.render(&size)?;
        Ok(self.registry.adopt(image))
    }

    /// Asynchronous [`Bridge::render`].
    #[tracing::instrument(skip(self, callback))]
    pub fn render_async(
        &mut self,
        size: Option<&str>,
        callback: impl FnOnce(&mut Bridge<E>, BridgeResult<Handle<Image, Owning>>) + 'static,
    ) -> BridgeResult<()> {
        let size = SizeKey::resolve(size)?;
        self.submit_render("render", Box::new(callback), move |e| e.render(&size))
    }

    /// Render an arbitrary context.
    #[tracing::instrument(skip(self))]
    pub fn render_with_context<O: Ownership>(
        &mut self,
        ctx: &Handle<Context, O>,
        size: Option<&str>,
    ) -> BridgeResult<Handle<Image, Owning>> {
        let size = SizeKey::resolve(size)?;
        let image = self
            .registry
            .with(ctx, |c| self.engine.render_context(c, &size))??;
        Ok(self.registry.adopt(image))
    }

    /// Asynchronous [`Bridge::render_with_context`]. The context is copied before this returns.
    #[tracing::instrument(skip(self, callback))]
    pub fn render_with_context_async<O: Ownership>(
        &mut self,
        ctx: &Handle<Context, O>,
        size: Option<&str>,
        callback: impl FnOnce(&mut Bridge<E>, BridgeResult<Handle<Image, Owning>>) + 'static,
    ) -> BridgeResult<()> {
        let size = SizeKey::resolve(size)?;
        let snapshot = self.registry.cloned(ctx)?;
        self.submit_render("render_context", Box::new(callback), move |e| {
            e.render_context(&snapshot, &size)
        })
    }

    /// Render `ctx` up to `layer`, scaling the opacity of every layer above it by `dim`.
    #[tracing::instrument(skip(self))]
    pub fn render_up_to_layer<O: Ownership>(
        &mut self,
        ctx: &Handle<Context, O>,
        layer: &str,
        precomp: &str,
        dim: f32,
        size: Option<&str>,
    ) -> BridgeResult<Handle<Image, Owning>> {
        let size = SizeKey::resolve(size)?;
        check_up_to_layer_args(layer, dim)?;
        let image = self.registry.with(ctx, |c| {
            self.engine.render_up_to_layer(c, layer, precomp, dim, &size)
        })??;
        Ok(self.registry.adopt(image))
    }

    /// Asynchronous [`Bridge::render_up_to_layer`].
    #[tracing::instrument(skip(self, callback))]
    pub fn render_up_to_layer_async<O: Ownership>(
        &mut self,
        ctx: &Handle<Context, O>,
        layer: &str,
        precomp: &str,
        dim: f32,
        size: Option<&str>,
        callback: impl FnOnce(&mut Bridge<E>, BridgeResult<Handle<Image, Owning>>) + 'static,
    ) -> BridgeResult<()> {
        let size = SizeKey::resolve(size)?;
        check_up_to_layer_args(layer, dim)?;
        let snapshot = self.registry.cloned(ctx)?;
        let (layer, precomp) = (layer.to_string(), precomp.to_string());
        self.submit_render("render_up_to_layer", Box::new(callback), move |e| {
            e.render_up_to_layer(&snapshot, &layer, &precomp, dim, &size)
        })
    }

    /// Render a single layer of `ctx` in isolation. Synchronous only.
    pub fn render_only_layer<O: Ownership>(
        &mut self,
        ctx: &Handle<Context, O>,
        layer: &str,
        size: Option<&str>,
    ) -> BridgeResult<Handle<Image, Owning>> {
        let size = SizeKey::resolve(size)?;
        if layer.is_empty() {
            return Err(BridgeError::argument("layer name must be non-empty"));
        }
        let image = self
            .registry
            .with(ctx, |c| self.engine.render_only_layer(c, layer, &size))??;
        Ok(self.registry.adopt(image))
    }

    fn submit_render(
        &mut self,
        label: &'static str,
        callback: RenderCallback<E>,
        job: impl FnOnce(&E) -> BridgeResult<Image> + Send + 'static,
    ) -> BridgeResult<()> {
        self.ensure_live()?;
        let key = self.callbacks.insert(PendingCallback::Render(callback));
        let engine = self.engine.clone();
        self.dispatcher.submit(WorkUnit::new(
            label,
            key,
            move || job(&engine),
            Outcome::Image,
        ));
        Ok(())
    }

    fn ensure_live(&self) -> BridgeResult<()> {
        if self.torn_down {
            return Err(BridgeError::invalid_handle("bridge was torn down"));
        }
        Ok(())
    }

    // ---------------------------------------------------------------------------------------
    // Search session
    // ---------------------------------------------------------------------------------------

    /// Start the engine's search loop. Returns the effective thread count.
    ///
    /// `on_sample` is invoked from [`Bridge::pump`], once per delivered sample, until this
    /// bridge's stop completes or the next session starts. Fails with `SessionBusy` while any
    /// bridge sharing the engine has a search running or stopping.
    #[tracing::instrument(skip(self, options, on_sample), fields(options = options.len()))]
    pub fn start_search(
        &mut self,
        mode: SearchMode,
        options: SearchOptions,
        thread_count: usize,
        size: Option<&str>,
        on_sample: impl FnMut(&mut Bridge<E>, SampleEvent) + 'static,
    ) -> BridgeResult<usize> {
        let size = SizeKey::resolve(size)?;
        if let Some((k, v)) = options.iter().find(|(_, v)| !v.is_finite()) {
            return Err(BridgeError::argument(format!(
                "search option '{k}' must be finite, got {v}"
            )));
        }
        let threads = clamp_threads(thread_count, self.hardware_threads)?;
        self.ensure_live()?;
        let generation = self.session.begin()?;

        let sink = self.samples.open_session(generation);
        self.session.attach_closing(generation, sink.closing_flag());
        let request = SearchRequest {
            mode,
            options,
            threads,
            size,
        };
        if let Err(e) = self.engine.start_search(sink, request) {
            self.samples.close_session();
            self.session.abort_begin(generation);
            return Err(e);
        }
        self.listener = Some(Listener {
            generation,
            on_sample: Box::new(on_sample),
        });
        tracing::info!(generation, threads, requested = thread_count, "search started");
        Ok(threads)
    }

    /// Stop the running search. Always asynchronous: `on_done` fires from [`Bridge::pump`] once
    /// the session is back to `Idle`.
    ///
    /// The stop applies to the engine, whichever bridge started its search. Samples queued before
    /// the stop completed are delivered ahead of `on_done`; none arrive after it.
    #[tracing::instrument(skip(self, on_done))]
    pub fn stop_search(&mut self, on_done: impl FnOnce(&mut Bridge<E>, BridgeResult<()>) + 'static) {
        let key = self.callbacks.insert(PendingCallback::Stop {
            generation: self.listener.as_ref().map(|l| l.generation),
            done: Box::new(on_done),
        });
        if self.torn_down {
            // Teardown fails every pending callback, this one included.
            return;
        }
        let waiter = StopWaiter {
            key,
            poster: self.dispatcher.poster().clone(),
        };
        match self.session.request_stop(Some(waiter)) {
            StopRequest::AlreadyIdle => {
                self.dispatcher.poster().post(HostMsg {
                    key,
                    outcome: Outcome::Unit(Ok(())),
                });
            }
            StopRequest::Joined => {
                tracing::debug!("stop joined the in-flight stop");
            }
            StopRequest::Begin => {
                let engine = self.engine.clone();
                let session = self.session.clone();
                let job = move || {
                    let result = catch_unwind(AssertUnwindSafe(|| engine.stop_search()))
                        .unwrap_or_else(|payload| Err(panic_to_error("stop_search", payload)));
                    for waiter in session.finish_stop() {
                        waiter.complete(&result);
                    }
                    result
                };
                self.dispatcher
                    .submit(WorkUnit::new("stop_search", key, job, Outcome::Unit));
            }
        }
    }

    /// Current search session state.
    pub fn search_state(&self) -> SessionState {
        self.session.state()
    }

    /// Sample channel counters.
    pub fn sample_stats(&self) -> SampleChannelStats {
        self.samples.stats()
    }

    // ---------------------------------------------------------------------------------------
    // Host pump
    // ---------------------------------------------------------------------------------------

    /// Run every completion callback and deliver every sample queued so far.
    ///
    /// Work queued while the pump runs (including by the callbacks themselves) is left for the
    /// next call.
    pub fn pump(&mut self) -> PumpStats {
        debug_assert!(self.host.on_host_thread(), "pump called off the host thread");
        let mut stats = PumpStats::default();

        // Count completions first: a stop is posted only after its session's last sample was
        // queued, so those samples are all in the snapshot below and go out before `on_done`.
        let completions = self.host.receiver().len();
        for _ in 0..self.samples.receiver().len() {
            let Some(rec) = self.samples.try_recv() else {
                break;
            };
            if self.deliver(rec) {
                stats.samples += 1;
            } else {
                stats.stale += 1;
            }
        }
        for _ in 0..completions {
            let Some(msg) = self.host.try_recv() else {
                break;
            };
            self.complete(msg);
            stats.completions += 1;
        }
        if !stats.is_idle() {
            tracing::trace!(?stats, "pump");
        }
        stats
    }

    /// Wait up to `timeout` for queued work, then [`Bridge::pump`].
    pub fn pump_wait(&mut self, timeout: Duration) -> PumpStats {
        if self.host.receiver().is_empty() && self.samples.receiver().is_empty() {
            let mut sel = crossbeam_channel::Select::new();
            sel.recv(self.host.receiver());
            sel.recv(self.samples.receiver());
            let _ = sel.ready_timeout(timeout);
        }
        self.pump()
    }

    fn complete(&mut self, msg: HostMsg) {
        let Some(callback) = self.callbacks.remove(msg.key) else {
            tracing::warn!(key = ?msg.key, "completion for unknown callback dropped");
            return;
        };
        match (callback, msg.outcome) {
            (PendingCallback::Render(f), Outcome::Image(result)) => {
                let result = result.map(|image| self.registry.adopt(image));
                f(self, result);
            }
            (PendingCallback::Stop { generation, done }, Outcome::Unit(result)) => {
                if generation.is_some()
                    && self.listener.as_ref().map(|l| l.generation) == generation
                {
                    self.listener = None;
                }
                done(self, result);
            }
            (cb @ PendingCallback::Render(_), Outcome::Unit(_)) => {
                cb.fail(self, BridgeError::engine("render completed without an image"));
            }
            (cb @ PendingCallback::Stop { .. }, Outcome::Image(_)) => {
                cb.fail(self, BridgeError::engine("stop completed with an image"));
            }
        }
    }

    fn deliver(&mut self, rec: SampleRecord) -> bool {
        let Some(mut listener) = self.listener.take() else {
            self.samples.record_stale();
            return false;
        };
        if listener.generation != rec.session {
            self.listener = Some(listener);
            self.samples.record_stale();
            return false;
        }
        let Sample {
            image,
            context,
            numeric,
            text,
        } = rec.sample;
        let event = SampleEvent {
            image: self.registry.adopt(image),
            context: self.registry.adopt(context),
            metadata: Sample::merged_metadata(numeric, text),
        };
        self.samples.record_delivered();
        (listener.on_sample)(self, event);
        // The listener may have started a new session from inside the callback.
        if self.listener.is_none() {
            self.listener = Some(listener);
        }
        true
    }

    // ---------------------------------------------------------------------------------------
    // Handles
    // ---------------------------------------------------------------------------------------

    /// Resolve a handle and read the object.
    pub fn with<T: Resource, O: Ownership, R>(
        &self,
        handle: &Handle<T, O>,
        f: impl FnOnce(&T) -> R,
    ) -> BridgeResult<R> {
        self.registry.with(handle, f)
    }

    /// Resolve an owning handle and edit the object.
    pub fn with_mut<T: Resource, R>(
        &mut self,
        handle: &Handle<T, Owning>,
        f: impl FnOnce(&mut T) -> R,
    ) -> BridgeResult<R> {
        self.registry.with_mut(handle, f)
    }

    /// Destroy a handle; idempotent.
    pub fn destroy<T: Resource, O: Ownership>(&mut self, handle: &Handle<T, O>) -> bool {
        self.registry.destroy(handle)
    }

    /// Return `true` when `handle` still resolves.
    pub fn is_live<T: Resource, O: Ownership>(&self, handle: &Handle<T, O>) -> bool {
        self.registry.is_live(handle)
    }

    /// Number of registered handles.
    pub fn live_handles(&self) -> usize {
        self.registry.len()
    }

    /// Hand a host-built image to the bridge.
    pub fn adopt_image(&mut self, image: Image) -> Handle<Image, Owning> {
        self.registry.adopt(image)
    }

    /// Move an owned image out of the bridge.
    pub fn take_image(&mut self, handle: Handle<Image, Owning>) -> BridgeResult<Image> {
        self.registry.take(handle)
    }

    /// Image width in pixels.
    pub fn image_width<O: Ownership>(&self, handle: &Handle<Image, O>) -> BridgeResult<u32> {
        self.registry.with(handle, Image::width)
    }

    /// Image height in pixels.
    pub fn image_height<O: Ownership>(&self, handle: &Handle<Image, O>) -> BridgeResult<u32> {
        self.registry.with(handle, Image::height)
    }

    /// Copy of the premultiplied RGBA8 bytes.
    pub fn image_data<O: Ownership>(&self, handle: &Handle<Image, O>) -> BridgeResult<Vec<u8>> {
        self.registry.with(handle, |img| img.data().to_vec())
    }

    /// Straight-alpha copy of the image.
    pub fn to_rgba_image<O: Ownership>(
        &self,
        handle: &Handle<Image, O>,
    ) -> BridgeResult<image::RgbaImage> {
        self.registry.with(handle, Image::to_rgba_image)?
    }

    /// Write the image as a PNG file.
    pub fn save_png<O: Ownership>(&self, handle: &Handle<Image, O>, path: &Path) -> BridgeResult<()> {
        self.registry.with(handle, |img| img.save_png(path))?
    }

    /// Empty context snapshot owned by the host.
    pub fn new_context(&mut self) -> Handle<Context, Owning> {
        self.registry.adopt(Context::new())
    }

    /// Layer names carried by a context snapshot.
    pub fn context_keys<O: Ownership>(&self, ctx: &Handle<Context, O>) -> BridgeResult<Vec<String>> {
        self.registry
            .with(ctx, |c| c.keys().map(str::to_string).collect())
    }

    /// Copy of one layer's state in a context snapshot.
    pub fn context_layer<O: Ownership>(
        &self,
        ctx: &Handle<Context, O>,
        layer: &str,
    ) -> BridgeResult<Option<LayerState>> {
        self.registry.with(ctx, |c| c.get(layer).copied())
    }

    /// Edit one layer's state in an owned context snapshot.
    pub fn with_layer_mut<R>(
        &mut self,
        ctx: &Handle<Context, Owning>,
        layer: &str,
        f: impl FnOnce(&mut LayerState) -> R,
    ) -> BridgeResult<R> {
        self.registry
            .with_mut(ctx, |c| c.get_mut(layer).map(f))?
            .ok_or_else(|| BridgeError::argument(format!("context has no layer '{layer}'")))
    }

    // ---------------------------------------------------------------------------------------
    // Engine accessors
    // ---------------------------------------------------------------------------------------

    /// Fresh copy of the engine's primary context.
    pub fn context(&mut self) -> Handle<Context, Owning> {
        let ctx = self.engine.context();
        self.registry.adopt(ctx)
    }

    /// Copy `ctx` into the engine.
    pub fn set_context<O: Ownership>(&mut self, ctx: &Handle<Context, O>) -> BridgeResult<()> {
        self.registry.with(ctx, |c| self.engine.set_context(c))?
    }

    /// Image in engine-owned layer storage.
    pub fn layer_image(&mut self, layer: &str) -> BridgeResult<Handle<Image, Borrowing>> {
        let image = self.engine.layer_image(layer)?;
        Ok(self.registry.lend(&image))
    }

    /// Cached image of `layer` at `size`, in engine-owned storage.
    pub fn cached_image(
        &mut self,
        layer: &str,
        size: Option<&str>,
    ) -> BridgeResult<Handle<Image, Borrowing>> {
        let size = SizeKey::resolve(size)?;
        let image = self.engine.cached_image(layer, &size)?;
        Ok(self.registry.lend(&image))
    }

    /// Engine layer names, bottom first.
    pub fn layer_names(&self) -> Vec<String> {
        self.engine.layer_names()
    }

    /// Return `true` when the engine has a layer called `name`.
    pub fn is_layer(&self, name: &str) -> bool {
        self.engine.layer_names().iter().any(|n| n == name)
    }

    /// Size keys the engine can render at.
    pub fn cache_sizes(&self) -> Vec<String> {
        self.engine.cache_sizes()
    }

    /// Register a scaled cache on the engine.
    pub fn add_cache_size(&self, key: &str, scale: f32) -> BridgeResult<()> {
        if key.trim().is_empty() {
            return Err(BridgeError::argument("cache key must be non-empty"));
        }
        if !scale.is_finite() {
            return Err(BridgeError::argument(format!(
                "cache scale must be finite, got {scale}"
            )));
        }
        self.engine.add_cache_size(key, scale)
    }

    /// Output dimensions at `size`.
    pub fn dimensions(&self, size: Option<&str>) -> BridgeResult<(u32, u32)> {
        let size = SizeKey::resolve(size)?;
        self.engine.dimensions(&size)
    }
}

fn check_up_to_layer_args(layer: &str, dim: f32) -> BridgeResult<()> {
    if layer.is_empty() {
        return Err(BridgeError::argument("layer name must be non-empty"));
    }
    if !dim.is_finite() {
        return Err(BridgeError::argument(format!("dim must be finite, got {dim}")));
    }
    Ok(())
}

impl<E: Engine> Drop for Bridge<E> {
    fn drop(&mut self) {
        self.torn_down = true;
        // Pending callbacks fail here, on the host thread.
        loop {
            let Some(key) = self.callbacks.keys().next() else {
                break;
            };
            if let Some(callback) = self.callbacks.remove(key) {
                callback.fail(self, BridgeError::invalid_handle("bridge was torn down"));
            }
        }
        self.samples.close_session();

        let Some(generation) = self.listener.take().map(|l| l.generation) else {
            return;
        };
        if !self.session.request_stop_of(generation) {
            return;
        }
        // Stop and join off the host thread; nobody on this bridge is left to be told about it.
        let engine = self.engine.clone();
        let session = self.session.clone();
        let spawned = std::thread::Builder::new()
            .name("compbridge-teardown".to_string())
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| engine.stop_search()))
                    .unwrap_or_else(|payload| Err(panic_to_error("stop_search", payload)));
                if let Err(e) = &result {
                    tracing::warn!(error = %e, "search stop during teardown failed");
                }
                for waiter in session.finish_stop() {
                    waiter.complete(&result);
                }
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "could not spawn teardown thread; search left running");
        }
    }
}
