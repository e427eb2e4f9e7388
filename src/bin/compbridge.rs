use std::cell::{Cell, RefCell};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use compositor_bridge::{
    Bridge, BridgeOpts, BridgeResult, CpuEngine, Handle, Image, Owning, RANDOM_SEARCH, SceneDef,
    SearchOptions, SessionState,
};

#[derive(Parser, Debug)]
#[command(name = "compbridge", version)]
struct Cli {
    /// Log filter (overridden by `RUST_LOG`).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Write logs to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Override rayon worker threads used for async work.
    #[arg(long, global = true)]
    worker_threads: Option<usize>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the scene's context as a PNG.
    Render(RenderArgs),
    /// Run a search session and collect samples.
    Search(SearchArgs),
    /// Print layers, cache sizes and hardware concurrency.
    Info(InfoArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input scene JSON.
    #[arg(long)]
    scene: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Size key to render at (defaults to full resolution).
    #[arg(long)]
    size: Option<String>,

    /// Dispatch on the worker pool and wait for the completion callback.
    #[arg(long, default_value_t = false)]
    r#async: bool,
}

#[derive(Parser, Debug)]
struct SearchArgs {
    /// Input scene JSON.
    #[arg(long)]
    scene: PathBuf,

    /// Requested search threads (clamped to hardware concurrency).
    #[arg(long, default_value_t = 2)]
    threads: usize,

    /// Stop after this many samples have been delivered.
    #[arg(long, default_value_t = 16)]
    samples: usize,

    /// Size key used for sample renders.
    #[arg(long)]
    size: Option<String>,

    /// Give up after this many seconds.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Write every delivered sample as `sample-NNNN.png` into this directory.
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Input scene JSON.
    #[arg(long)]
    scene: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_file.as_deref())?;
    let opts = BridgeOpts {
        worker_threads: cli.worker_threads,
        ..BridgeOpts::default()
    };
    match cli.cmd {
        Command::Render(args) => cmd_render(args, opts),
        Command::Search(args) => cmd_search(args, opts),
        Command::Info(args) => cmd_info(args, opts),
    }
}

fn init_logging(level: &str, file: Option<&Path>) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level '{level}'"))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match file {
        Some(path) => {
            let f = File::create(path)
                .with_context(|| format!("create log file '{}'", path.display()))?;
            builder.with_writer(Mutex::new(f)).with_ansi(false).try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    }
    .map_err(|e| anyhow::anyhow!("install tracing subscriber: {e}"))
}

fn open_bridge(scene: &Path, opts: BridgeOpts) -> anyhow::Result<Bridge<CpuEngine>> {
    let def = SceneDef::load(scene)?;
    let root = scene.parent().unwrap_or_else(|| Path::new("."));
    let engine = def
        .build_engine(root)
        .with_context(|| format!("build engine from '{}'", scene.display()))?;
    Ok(Bridge::new(engine, opts)?)
}

fn create_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    Ok(())
}

fn cmd_render(args: RenderArgs, opts: BridgeOpts) -> anyhow::Result<()> {
    let mut bridge = open_bridge(&args.scene, opts)?;
    let size = args.size.as_deref();

    let image = if args.r#async {
        let slot: Rc<RefCell<Option<BridgeResult<Handle<Image, Owning>>>>> = Rc::default();
        let out = slot.clone();
        bridge.render_async(size, move |_, result| {
            *out.borrow_mut() = Some(result);
        })?;
        loop {
            bridge.pump_wait(Duration::from_millis(50));
            if let Some(result) = slot.borrow_mut().take() {
                break result?;
            }
        }
    } else {
        bridge.render(size)?
    };

    create_parent(&args.out)?;
    bridge.save_png(&image, &args.out)?;
    let (w, h) = (bridge.image_width(&image)?, bridge.image_height(&image)?);
    bridge.destroy(&image);
    eprintln!("wrote {} ({w}x{h})", args.out.display());
    Ok(())
}

fn cmd_search(args: SearchArgs, opts: BridgeOpts) -> anyhow::Result<()> {
    let mut bridge = open_bridge(&args.scene, opts)?;
    if let Some(dir) = &args.out_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create output dir '{}'", dir.display()))?;
    }

    let delivered = Rc::new(Cell::new(0usize));
    let failure: Rc<RefCell<Option<anyhow::Error>>> = Rc::default();
    let threads = {
        let delivered = delivered.clone();
        let failure = failure.clone();
        let out_dir = args.out_dir.clone();
        let limit = args.samples;
        bridge.start_search(
            RANDOM_SEARCH,
            SearchOptions::new(),
            args.threads,
            args.size.as_deref(),
            move |bridge, event| {
                let n = delivered.get();
                if n < limit
                    && let Some(dir) = &out_dir
                {
                    let path = dir.join(format!("sample-{n:04}.png"));
                    if let Err(e) = bridge.save_png(&event.image, &path) {
                        failure.borrow_mut().get_or_insert(e.into());
                    }
                }
                bridge.destroy(&event.image);
                bridge.destroy(&event.context);
                delivered.set(n + 1);
            },
        )?
    };
    eprintln!(
        "search running on {threads} thread(s) (requested {}, hardware {})",
        args.threads,
        bridge.hardware_threads()
    );

    let deadline = Instant::now() + Duration::from_secs(args.timeout_secs);
    while delivered.get() < args.samples && Instant::now() < deadline {
        bridge.pump_wait(Duration::from_millis(50));
        if failure.borrow().is_some() {
            break;
        }
    }

    let stopped: Rc<RefCell<Option<BridgeResult<()>>>> = Rc::default();
    let done = stopped.clone();
    bridge.stop_search(move |_, result| {
        *done.borrow_mut() = Some(result);
    });
    let stop_result = loop {
        bridge.pump_wait(Duration::from_millis(50));
        if let Some(result) = stopped.borrow_mut().take() {
            break result;
        }
    };
    stop_result?;
    debug_assert_eq!(bridge.search_state(), SessionState::Idle);

    if let Some(e) = failure.borrow_mut().take() {
        return Err(e);
    }
    let stats = bridge.sample_stats();
    eprintln!(
        "delivered {} sample(s); queued {}, dropped {}, stale {}",
        delivered.get(),
        stats.queued,
        stats.dropped,
        stats.stale
    );
    Ok(())
}

fn cmd_info(args: InfoArgs, opts: BridgeOpts) -> anyhow::Result<()> {
    let bridge = open_bridge(&args.scene, opts)?;
    let (w, h) = bridge.dimensions(None)?;
    println!("size: {w}x{h}");
    println!("layers: {}", bridge.layer_names().join(", "));
    println!("cache sizes: {}", bridge.cache_sizes().join(", "));
    println!("hardware concurrency: {}", bridge.hardware_threads());
    Ok(())
}
