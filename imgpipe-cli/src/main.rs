//! imgpipe CLI - Command-line interface
//!
//! Fetches images through the imgpipe request pipeline and reports each
//! request's outcome.

mod error;

use clap::{Parser, Subcommand};
use error::CliError;
use imgpipe::config::{config_file_path, format_size, ConfigFile};
use imgpipe::identity::{Resize, TransformOptions};
use imgpipe::logging::init_logging;
use imgpipe::request::{
    CancelCause, FailedCause, ImageFrom, Listener, Options, RequestLevel, Target,
};
use imgpipe::resource::DecodedResource;
use imgpipe::service::ImagePipeline;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "imgpipe")]
#[command(version = imgpipe::VERSION)]
#[command(about = "Load images through a cached, deduplicating request pipeline", long_about = None)]
struct Cli {
    /// Config file (default: ~/.imgpipe/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Load one or more images and print where each came from
    Fetch(FetchArgs),
}

#[derive(clap::Args)]
struct FetchArgs {
    /// Image locators: http(s) URLs, file:// URLs or absolute paths
    #[arg(required = true)]
    uris: Vec<String>,

    /// Never touch the network; serve from the caches only
    #[arg(long)]
    local_only: bool,

    /// Start with downloads paused
    #[arg(long)]
    pause: bool,

    /// Skip the disk cache for these requests
    #[arg(long)]
    no_disk_cache: bool,

    /// Skip the memory cache for these requests
    #[arg(long)]
    no_memory_cache: bool,

    /// Downscale to fit WIDTHxHEIGHT, e.g. 200x100
    #[arg(long)]
    resize: Option<String>,

    /// Prefer faster, lower quality resampling
    #[arg(long)]
    low_quality: bool,

    /// Submit the whole batch this many times
    #[arg(long, default_value = "1")]
    repeat: usize,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(config_file_path);

    let result = match cli.command {
        Commands::Init { force } => run_init(config_path, force),
        Commands::Fetch(args) => run_fetch(config_path, args).await,
    };

    if let Err(e) = result {
        e.exit();
    }
}

fn run_init(path: PathBuf, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        println!("Config already exists: {}", path.display());
        println!("Use --force to overwrite it with defaults.");
        return Ok(());
    }
    ConfigFile::default().save_to(&path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

async fn run_fetch(config_path: PathBuf, args: FetchArgs) -> Result<(), CliError> {
    let file = ConfigFile::load_from(&config_path)?;
    let _logging = init_logging(&file.logging.directory, &file.logging.file)
        .map_err(CliError::LoggingInit)?;
    info!(version = imgpipe::VERSION, config = %config_path.display(), "imgpipe starting");

    let options = fetch_options(&args)?;
    let mut config = file.to_pipeline_config();
    if args.pause {
        config = config.with_pause_download(true);
    }
    let pipeline = ImagePipeline::new(config)?;

    let total = args.uris.len() * args.repeat;
    let mut failed = 0;
    for round in 1..=args.repeat {
        let handles: Vec<_> = args
            .uris
            .iter()
            .map(|uri| {
                let handle = pipeline.display(
                    uri.as_str(),
                    options.clone(),
                    Arc::new(ConsoleTarget),
                    Some(Arc::new(ConsoleListener) as Arc<dyn Listener>),
                );
                (uri, handle)
            })
            .collect();

        for (uri, handle) in handles {
            let outcome = handle.wait().await;
            if !outcome.is_completed() {
                failed += 1;
            }
            println!("[{}] {}: {}", round, uri, outcome);
        }
    }

    print_cache_summary(&pipeline);

    if failed > 0 {
        return Err(CliError::RequestsFailed { failed, total });
    }
    Ok(())
}

fn fetch_options(args: &FetchArgs) -> Result<Options, CliError> {
    let mut transform = TransformOptions::default().with_low_quality(args.low_quality);
    if let Some(size) = &args.resize {
        let resize: Resize = size.parse().map_err(CliError::InvalidArgument)?;
        transform = transform.with_resize(resize);
    }

    let mut options = Options::default()
        .with_cache_in_disk(!args.no_disk_cache)
        .with_cache_in_memory(!args.no_memory_cache)
        .with_transform(transform);
    if args.local_only {
        options = options.with_request_level(RequestLevel::Local);
    }
    Ok(options)
}

fn print_cache_summary(pipeline: &ImagePipeline) {
    let stats = pipeline.memory_cache().stats();
    println!();
    println!("Memory cache:");
    println!(
        "  {} entries, {} of {}",
        stats.entry_count,
        format_size(stats.size_bytes),
        format_size(pipeline.memory_cache().max_size_bytes())
    );
    println!(
        "  {} hits, {} misses ({:.0}% hit rate), {} evictions",
        stats.hits,
        stats.misses,
        stats.hit_rate() * 100.0,
        stats.evictions
    );
}

/// Prints the decoded dimensions in place of a real display surface.
struct ConsoleTarget;

impl Target for ConsoleTarget {
    fn display(&self, resource: &Arc<DecodedResource>, from: ImageFrom) {
        let info = resource.info();
        let size = resource.with_buffer(|buffer| (buffer.width, buffer.height));
        if let Some((width, height)) = size {
            println!(
                "    {} {}x{} (source {}x{}) from {}",
                info.mime_type, width, height, info.origin_width, info.origin_height, from
            );
        }
    }
}

struct ConsoleListener;

impl Listener for ConsoleListener {
    fn on_completed(&self, from: ImageFrom, mime_type: &str) {
        debug!(%from, mime_type, "Completed");
    }

    fn on_failed(&self, cause: FailedCause) {
        debug!(%cause, "Failed");
    }

    fn on_canceled(&self, cause: CancelCause) {
        debug!(%cause, "Canceled");
    }

    fn on_progress(&self, total: u64, completed: u64) {
        debug!(total, completed, "Download progress");
    }
}
