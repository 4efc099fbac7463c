// Scrub Preview CLI binary

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scrub_preview::config::{OutputLayout, PreviewConfig};
use scrub_preview::constants::{DEFAULT_BIND_ADDRESS, DEFAULT_OUTPUT_FOLDER, DEFAULT_PORT};
use scrub_preview::jobs::PreviewJob;
use scrub_preview::metadata::ffprobe;
use scrub_preview::preview::index::{is_fresh, params_hash, read_record};
use scrub_preview::preview::lookup::locate;
use scrub_preview::preview::{BuildRequest, FfmpegBackend};
use scrub_preview::server::{self, AppState};
use scrub_preview::tools;
use scrub_preview::IndexRecord;

#[derive(Parser)]
#[command(name = "scrubprev")]
#[command(about = "Scrub Preview - sprite-sheet hover previews for video", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Build parameters. Flags override values from `--config`.
#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Seconds between thumbnails
    #[arg(long)]
    interval: Option<f64>,
    /// Thumbnail width in pixels
    #[arg(long)]
    thumb_width: Option<u32>,
    /// Thumbnail height in pixels
    #[arg(long)]
    thumb_height: Option<u32>,
    /// Thumbnails per sprite row
    #[arg(long)]
    columns: Option<u32>,
    /// Thumbnail rows per sprite
    #[arg(long)]
    rows: Option<u32>,
    /// Concurrent sprite builds
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build sprites and the index for a video
    Build {
        /// Source video
        video: PathBuf,
        /// Output root (sprites/ and metadata/ are created inside)
        #[arg(short, long, default_value = DEFAULT_OUTPUT_FOLDER)]
        output: PathBuf,
        #[command(flatten)]
        config: ConfigArgs,
        /// Reuse the existing record if it was built from the same inputs
        #[arg(long)]
        skip_if_fresh: bool,
    },

    /// Serve the build endpoint and the generated files
    Serve {
        /// Source video
        video: PathBuf,
        /// Output root
        #[arg(short, long, default_value = DEFAULT_OUTPUT_FOLDER)]
        output: PathBuf,
        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Address to bind
        #[arg(long, default_value = DEFAULT_BIND_ADDRESS)]
        bind: String,
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Show which sprite cell covers a playback time
    Locate {
        /// Playback time in seconds
        seconds: f64,
        /// Output root
        #[arg(short, long, default_value = DEFAULT_OUTPUT_FOLDER)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build { video, output, config, skip_if_fresh } => {
            cmd_build(video, output, config, skip_if_fresh)
        }
        Commands::Serve { video, output, port, bind, config } => cmd_serve(video, output, port, bind, config),
        Commands::Locate { seconds, output } => cmd_locate(seconds, output),
    }
}

fn resolve_config(args: &ConfigArgs) -> Result<PreviewConfig> {
    let mut config = match &args.config {
        Some(path) => PreviewConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PreviewConfig::default(),
    };

    if let Some(v) = args.interval {
        config.interval = v;
    }
    if let Some(v) = args.thumb_width {
        config.thumb_width = v;
    }
    if let Some(v) = args.thumb_height {
        config.thumb_height = v;
    }
    if let Some(v) = args.columns {
        config.columns = v;
    }
    if let Some(v) = args.rows {
        config.rows = v;
    }
    if let Some(v) = args.workers {
        config.workers = v;
    }

    config.validate()?;
    Ok(config)
}

fn require_tools() -> Result<()> {
    if !tools::is_tool_available("ffmpeg") {
        anyhow::bail!(
            "ffmpeg not found at {} (set SCRUBPREV_FFMPEG_PATH)",
            tools::ffmpeg_path().display()
        );
    }
    if !ffprobe::is_available() {
        log::warn!("ffprobe not found; duration will be derived from the frame count");
    }
    Ok(())
}

fn make_job(video: PathBuf, output: PathBuf, config: PreviewConfig) -> PreviewJob {
    let request = BuildRequest {
        video,
        layout: OutputLayout::new(output),
        config,
    };
    PreviewJob::new(Arc::new(FfmpegBackend), request)
}

fn cmd_build(video: PathBuf, output: PathBuf, args: ConfigArgs, skip_if_fresh: bool) -> Result<()> {
    let config = resolve_config(&args)?;
    let job = make_job(video, output, config);
    let request = job.request();

    if skip_if_fresh {
        let hash = params_hash(&request.config, &request.video)?;
        if let Ok(record) = read_record(&request.layout.metadata_path()) {
            if is_fresh(&record, &hash) {
                println!("Preview is up to date ({})", request.layout.metadata_path().display());
                print_summary(&record);
                return Ok(());
            }
        }
    }

    require_tools()?;
    let record = job.run(&AtomicBool::new(false))?;

    println!("Preview built in {}", request.layout.root.display());
    print_summary(&record);
    Ok(())
}

fn cmd_serve(video: PathBuf, output: PathBuf, port: u16, bind: String, args: ConfigArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    require_tools()?;

    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", bind, port))?;

    let state = AppState::new(make_job(video, output, config));
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server::start_server(addr, state))
}

fn cmd_locate(seconds: f64, output: PathBuf) -> Result<()> {
    let layout = OutputLayout::new(output);
    let path = layout.metadata_path();
    let record = read_record(&path).with_context(|| format!("No preview at {}", path.display()))?;

    match locate(seconds, &record) {
        Some(hit) => {
            println!("Time:     {:.2}s (frame {})", seconds, hit.index);
            println!("Sprite:   {} (#{}, cell {})", hit.sprite_url, hit.sprite_index, hit.local_index);
            println!("Rect:     x={} y={} w={} h={}", hit.pixel_x, hit.pixel_y, hit.width, hit.height);
            println!("CSS:      background-position: {}", hit.background_position());
        }
        None => println!("no preview at {:.2}s (duration {:.2}s)", seconds, record.duration),
    }

    Ok(())
}

fn print_summary(record: &IndexRecord) {
    println!("  Duration:    {:.2}s", record.duration);
    println!("  Interval:    {}s", record.interval);
    println!("  Thumbnail:   {}x{}", record.thumb_width, record.thumb_height);
    println!("  Frames:      {}", record.total_frames);
    println!("  Per sprite:  {}", record.thumbs_per_sprite);
    println!("  Sprites:     {}", record.sprite_count());
    for sprite in &record.sprites {
        println!(
            "    {}  frames {}..{}",
            sprite.url,
            sprite.start_index,
            sprite.start_index + sprite.frames
        );
    }
}
