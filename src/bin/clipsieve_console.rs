//! Interactive console binary. Goes through the launch shim so packaged
//! installs get the weights search path and session detection.

use anyhow::Result;
use clap::Parser;
use clipsieve::launch::{self, LaunchOptions};
use clipsieve::observe::{self, ObserveOptions, DEFAULT_LOG_FILE};
use std::path::PathBuf;

const ENTRY_ENV: &str = "CLIPSIEVE_ENTRY";

#[derive(Parser)]
#[command(
    name = "clipsieve-console",
    about = "Interactive console for motion and object gated clip extraction",
    version
)]
struct Cli {
    /// Start the console even when no interactive session is detected
    #[arg(short, long)]
    terminal: bool,

    /// Install root; defaults to the parent of the working directory
    #[arg(long)]
    root: Option<PathBuf>,

    /// Plain-text log copy
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// Log debug detail
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    observe::init(
        ObserveOptions::new()
            .with_directive(if cli.verbose { "debug" } else { "info" })
            .with_log_file(cli.log_file.clone()),
    )?;

    let mut options = LaunchOptions::default().with_force_terminal(cli.terminal);
    if let Some(root) = cli.root {
        options = options.with_root(root);
    }
    if let Ok(entry) = std::env::var(ENTRY_ENV) {
        options = options.with_entry(entry);
    }

    launch::run(options).await?;
    Ok(())
}
