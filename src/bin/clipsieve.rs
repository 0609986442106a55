//! Batch CLI: process footage folders without the interactive console.
//!
//! Usage:
//!   clipsieve run [FOLDER] [--input <dir>] [--output <dir>]   Process footage
//!   clipsieve list [--input <dir>]                            Folder overview
//!   clipsieve probe <video>                                   Stream metadata
//!   clipsieve weights [--fetch <name>]                        Weights status
//!   clipsieve schema                                          Detector wire schema

use anyhow::Result;
use clap::{Parser, Subcommand};
use clipsieve::config::{ProcessingConfig, RunPaths};
use clipsieve::console::render;
use clipsieve::detect::detector_wire_schema;
use clipsieve::journal::Journal;
use clipsieve::observe::{self, ObserveOptions};
use clipsieve::pipeline::{
    discover_videos, list_subfolders, run_folders, CancelFlag, ProgressSink, TracingSink,
};
use clipsieve::probe::probe_video;
use clipsieve::tools::FfmpegTools;
use clipsieve::weights::{self, WeightsStore};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "clipsieve",
    about = "Motion and object gated clip extraction for folders of camera footage",
    version
)]
struct Cli {
    /// Config file (YAML or JSON), applied before the other flags
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write a plain-text copy of the log to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Log debug detail
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process all footage folders, or just one
    Run {
        /// Only this subfolder of the input base
        folder: Option<String>,

        /// Footage base directory
        #[arg(long, default_value = "/data/Input")]
        input: PathBuf,

        /// Where clips and journals land
        #[arg(long, default_value = "/data/Output")]
        output: PathBuf,

        /// Parallel video workers
        #[arg(long)]
        workers: Option<usize>,

        /// External detector command; omit to gate on motion alone
        #[arg(long)]
        detector: Option<String>,

        /// Weights file the detector receives
        #[arg(long)]
        model: Option<String>,

        /// Minimum detector confidence
        #[arg(long)]
        confidence: Option<f32>,

        /// Only process videos whose file name matches this regex
        #[arg(long)]
        filter: Option<String>,

        /// Write per-frame diff masks under <output>/debug
        #[arg(long)]
        debug_masks: bool,
    },

    /// List footage folders and their journal state
    List {
        /// Footage base directory
        #[arg(long, default_value = "/data/Input")]
        input: PathBuf,
    },

    /// Show stream metadata for one video
    Probe {
        /// Video file
        video: PathBuf,
    },

    /// Known weights names and where they are searched for
    Weights {
        /// Resolve this weights file now, downloading from the mirror if set
        #[arg(long)]
        fetch: Option<String>,
    },

    /// Print the detector wire schema as JSON
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut opts =
        ObserveOptions::new().with_directive(if cli.verbose { "debug" } else { "info" });
    if let Some(path) = &cli.log_file {
        opts = opts.with_log_file(path.clone());
    }
    observe::init(opts)?;

    let config = match &cli.config {
        Some(path) => ProcessingConfig::load(path).await?,
        None => ProcessingConfig::default(),
    };

    match cli.command {
        Commands::Run {
            folder,
            input,
            output,
            workers,
            detector,
            model,
            confidence,
            filter,
            debug_masks,
        } => {
            cmd_run(
                config, folder, input, output, workers, detector, model, confidence, filter,
                debug_masks,
            )
            .await
        }
        Commands::List { input } => cmd_list(input).await,
        Commands::Probe { video } => cmd_probe(video).await,
        Commands::Weights { fetch } => cmd_weights(fetch).await,
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&detector_wire_schema())?);
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_run(
    mut config: ProcessingConfig,
    folder: Option<String>,
    input: PathBuf,
    output: PathBuf,
    workers: Option<usize>,
    detector: Option<String>,
    model: Option<String>,
    confidence: Option<f32>,
    filter: Option<String>,
    debug_masks: bool,
) -> Result<()> {
    if let Some(workers) = workers {
        config.max_workers = Some(workers);
    }
    if let Some(detector) = detector {
        config.detector_command = Some(detector);
    }
    if let Some(model) = model {
        config.model = model;
    }
    if let Some(confidence) = confidence {
        config.confidence = confidence;
    }
    if let Some(filter) = filter {
        config.file_filter = Some(filter);
    }
    if debug_masks {
        config.debug = true;
    }

    let paths = RunPaths {
        base_dir: input,
        output_dir: output,
    };

    // Ctrl-C stops dispatching new videos and interrupts the ones mid-scan
    // at their next analyzed frame.
    let cancel = CancelFlag::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping scans");
            signal_cancel.cancel();
        }
    });

    let sink: Arc<dyn ProgressSink> = Arc::new(TracingSink);
    let summaries = run_folders(&config, &paths, folder.as_deref(), sink, cancel).await?;

    println!(
        "{}",
        render::summary_table(&summaries, &render::Palette::plain())
    );

    let failed: usize = summaries.iter().map(|s| s.failed.len()).sum();
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_list(input: PathBuf) -> Result<()> {
    let folders = list_subfolders(&input).await?;
    if folders.is_empty() {
        println!("No footage folders under {}", input.display());
        return Ok(());
    }

    println!("{:<20} {:>8} {:>10}", "Folder", "Videos", "Processed");
    println!("{}", "-".repeat(40));
    for folder in &folders {
        let name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| folder.display().to_string());
        let videos = discover_videos(folder).await.map(|v| v.len()).unwrap_or(0);
        let processed = match Journal::in_dir(folder).peek().await {
            Ok(entries) => entries.iter().filter(|e| e.is_processed()).count(),
            Err(_) => 0,
        };
        println!("{:<20} {:>8} {:>10}", name, videos, processed);
    }
    println!("\nTotal: {} folder(s)", folders.len());
    Ok(())
}

async fn cmd_probe(video: PathBuf) -> Result<()> {
    let tools = FfmpegTools::discover()?;
    let meta = probe_video(&tools.ffprobe, &video).await?;
    println!(
        "{}",
        render::meta_table(&video.display().to_string(), &meta)
    );
    Ok(())
}

async fn cmd_weights(fetch: Option<String>) -> Result<()> {
    if let Some(name) = fetch {
        let weights = weights::fetch_weights(&name).await?;
        println!("{:<20} {}", "file", weights.path.display());
        println!("{:<20} {}", "size", weights.size_bytes);
        if let Some(digest) = &weights.sha256 {
            println!("{:<20} {}", "sha256", digest);
        }
        return Ok(());
    }

    println!("Known weights:");
    for name in WeightsStore::known_model_names() {
        println!("  {}", name);
    }
    println!("\nSearch roots:");
    let roots = weights::global_store().search_roots();
    if roots.is_empty() {
        println!("  (none)");
    }
    for root in roots {
        println!("  {}", root.display());
    }
    if let Ok(dir) = std::env::var(weights::WEIGHTS_DIR_ENV) {
        println!("\n{}={}", weights::WEIGHTS_DIR_ENV, dir);
    }
    Ok(())
}
