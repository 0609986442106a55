//! Interactive console for driving runs from a terminal.
//!
//! The console owns a mutable copy of the processing config and a pair of
//! footage paths. Commands edit that state; `run` hands a snapshot of it to
//! the pipeline on a background task and keeps the prompt responsive while
//! progress events stream back over a channel.
//!
//! ```text
//! stdin ──> command loop ──> pipeline task
//!              ^                  │
//!              └── progress ──────┘
//! ```
//!
//! One pipeline run at a time. `cancel` stops dispatching new videos and
//! interrupts the ones mid-scan.

pub mod render;

use crate::config::{ProcessingConfig, RunPaths};
use crate::entry::EntryFuture;
use crate::journal::Journal;
use crate::observe;
use crate::pipeline::{
    discover_videos, list_subfolders, run_folders, CancelFlag, ChannelSink, FolderSummary,
    ProgressEvent, ProgressSink,
};
use crate::probe::ProbeCache;
use crate::tools::FfmpegTools;
use crate::weights::{self, WeightsStore};
use render::Palette;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::Level;

/// Entry point registered under [`crate::entry::CONSOLE_ENTRY`].
pub fn entry() -> EntryFuture {
    Box::pin(async {
        Console::new().run().await;
        Ok(())
    })
}

struct ActiveRun {
    cancel: CancelFlag,
}

/// Console state. Lives on one task; the pipeline never sees it.
pub struct Console {
    config: ProcessingConfig,
    paths: RunPaths,
    palette: Palette,
    active: Option<ActiveRun>,
    // Probing a folder twice should not re-spawn ffprobe per video.
    probes: ProbeCache,
    // Last printed progress decile per video, so a long scan prints ten
    // lines instead of hundreds.
    last_percent: HashMap<String, u8>,
}

impl Console {
    pub fn new() -> Self {
        Self {
            config: ProcessingConfig::default(),
            paths: RunPaths::default(),
            palette: Palette::dark(),
            active: None,
            probes: ProbeCache::new(),
            last_percent: HashMap::new(),
        }
    }

    /// Read commands until `quit` or end of input.
    pub async fn run(&mut self) {
        self.print_banner();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        // Both channels outlive every run; each run gets clones of the
        // senders, so a finished run never closes the receiving side.
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ProgressEvent>();
        let (done_tx, mut done_rx) =
            mpsc::unbounded_channel::<crate::Result<Vec<FolderSummary>>>();

        loop {
            self.print_prompt();
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if !self.handle_command(line.trim(), &event_tx, &done_tx).await {
                                break;
                            }
                        }
                        Ok(None) => {
                            // stdin closed, same as quit.
                            println!();
                            self.quit();
                            break;
                        }
                        Err(e) => {
                            tracing::warn!("could not read from stdin: {}", e);
                            self.quit();
                            break;
                        }
                    }
                }
                Some(event) = event_rx.recv() => {
                    self.on_event(event);
                }
                Some(result) = done_rx.recv() => {
                    self.on_run_done(result);
                }
            }
        }
    }

    fn print_banner(&self) {
        println!("{}", render::rule());
        println!("clipsieve console");
        println!("type 'help' for commands");
        println!("{}", render::rule());
    }

    fn print_prompt(&self) {
        print!("> ");
        let _ = std::io::stdout().flush();
    }

    /// Returns false when the console should exit.
    async fn handle_command(
        &mut self,
        line: &str,
        event_tx: &mpsc::UnboundedSender<ProgressEvent>,
        done_tx: &mpsc::UnboundedSender<crate::Result<Vec<FolderSummary>>>,
    ) -> bool {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = parts.first() else {
            return true;
        };

        match command {
            "help" => println!("{}", render::help_text()),
            "list" => self.cmd_list().await,
            "probe" => self.cmd_probe(parts.get(1).copied()).await,
            "set" => self.cmd_set(&parts),
            "run" => self.cmd_run(parts.get(1).copied(), event_tx, done_tx),
            "cancel" => self.cmd_cancel(),
            "recent" => self.cmd_recent(parts.get(1).copied()),
            "models" => self.cmd_models(),
            "quit" | "exit" => {
                self.quit();
                return false;
            }
            other => println!("unknown command: {} (try 'help')", other),
        }
        true
    }

    async fn cmd_list(&self) {
        let folders = match list_subfolders(&self.paths.base_dir).await {
            Ok(folders) => folders,
            Err(e) => {
                println!(
                    "{}could not list {}: {}{}",
                    self.palette.err,
                    self.paths.base_dir.display(),
                    e,
                    self.palette.reset
                );
                return;
            }
        };
        if folders.is_empty() {
            println!(
                "no footage folders under {}",
                self.paths.base_dir.display()
            );
            return;
        }

        println!("{}", render::rule());
        for (n, folder) in folders.iter().enumerate() {
            let name = folder
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| folder.display().to_string());
            let videos = discover_videos(folder).await.map(|v| v.len()).unwrap_or(0);
            let processed = match Journal::in_dir(folder).peek().await {
                Ok(entries) => entries.iter().filter(|e| e.is_processed()).count(),
                Err(_) => 0,
            };
            println!(
                "  {:>2}. {:<20} {:>3} videos, {:>3} processed",
                n + 1,
                name,
                videos,
                processed
            );
        }
        println!("{}", render::rule());
    }

    /// `probe <n|name>`: per-video metadata for one footage folder, with
    /// journal status per row and the folder's total length as the footer.
    async fn cmd_probe(&self, arg: Option<&str>) {
        let Some(arg) = arg else {
            println!("usage: probe <n|name> (see 'list')");
            return;
        };
        let folder = match self.resolve_folder(arg).await {
            Ok(folder) => folder,
            Err(reason) => {
                println!("{}{}{}", self.palette.err, reason, self.palette.reset);
                return;
            }
        };
        let tools = match FfmpegTools::discover() {
            Ok(tools) => tools,
            Err(e) => {
                println!("{}{}{}", self.palette.err, e, self.palette.reset);
                return;
            }
        };
        let files = match discover_videos(&folder).await {
            Ok(files) => files,
            Err(e) => {
                println!("{}{}{}", self.palette.err, e, self.palette.reset);
                return;
            }
        };
        let entries = Journal::in_dir(&folder).peek().await.unwrap_or_default();

        let mut rows = Vec::with_capacity(files.len());
        let mut total_seconds = 0.0;
        for file in files {
            let status = if entries
                .iter()
                .any(|e| e.filename == file && e.is_processed())
            {
                "processed"
            } else {
                "pending"
            };
            match self.probes.probe(&tools.ffprobe, &folder.join(&file)).await {
                Ok(meta) => {
                    total_seconds += meta.duration_seconds;
                    rows.push(render::ProbeRow {
                        name: file,
                        resolution: format!("{}x{}", meta.width, meta.height),
                        fps: format!("{:.2}", meta.fps),
                        duration: render::hms(meta.duration_seconds),
                        status: status.to_string(),
                    });
                }
                Err(e) => {
                    tracing::debug!(video = %file, "probe failed: {}", e);
                    rows.push(render::ProbeRow {
                        name: file,
                        resolution: "-".to_string(),
                        fps: "-".to_string(),
                        duration: "-".to_string(),
                        status: "unreadable".to_string(),
                    });
                }
            }
        }

        let name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| folder.display().to_string());
        println!("{}", render::probe_table(&name, &rows, total_seconds));
    }

    /// A number picks from the sorted folder list the way `list` shows it;
    /// anything else is a folder name under the footage base.
    async fn resolve_folder(&self, arg: &str) -> Result<PathBuf, String> {
        if let Ok(index) = arg.parse::<usize>() {
            let folders = list_subfolders(&self.paths.base_dir)
                .await
                .map_err(|e| e.to_string())?;
            return index
                .checked_sub(1)
                .and_then(|i| folders.get(i))
                .cloned()
                .ok_or_else(|| format!("no folder #{} (see 'list')", index));
        }
        let folder = self.paths.base_dir.join(arg);
        if folder.is_dir() {
            Ok(folder)
        } else {
            Err(format!("no footage folder named {}", arg))
        }
    }

    fn cmd_set(&mut self, parts: &[&str]) {
        match parts.len() {
            1 => println!("{}", render::config_table(&self.config)),
            2 => println!("usage: set <key> <value>"),
            _ => {
                let key = parts[1];
                // Detector commands may contain spaces.
                let value = parts[2..].join(" ");
                match self.apply_setting(key, &value) {
                    Ok(applied) => println!("{}", applied),
                    Err(reason) => println!(
                        "{}{}{}",
                        self.palette.err, reason, self.palette.reset
                    ),
                }
            }
        }
    }

    /// Apply one `set` command. Config edits go through a clone so a value
    /// that fails validation leaves the current config untouched.
    fn apply_setting(&mut self, key: &str, value: &str) -> Result<String, String> {
        match key {
            "theme" => {
                self.palette = match value {
                    "dark" => Palette::dark(),
                    "light" => Palette::light(),
                    "plain" => Palette::plain(),
                    other => return Err(format!("unknown theme: {} (dark, light, plain)", other)),
                };
            }
            "input" => self.paths.base_dir = PathBuf::from(value),
            "output" => self.paths.output_dir = PathBuf::from(value),
            _ => {
                let mut updated = self.config.clone();
                match key {
                    "confidence" => updated.confidence = parse_value(value)?,
                    "motion_threshold" => updated.motion_threshold = parse_value(value)?,
                    "skip_frames" => updated.skip_frames = parse_value(value)?,
                    "resize_factor" => updated.resize_factor = parse_value(value)?,
                    "buffer_seconds" => updated.buffer_seconds = parse_value(value)?,
                    "min_area" => updated.min_object_area_ratio = parse_value(value)?,
                    "memory_limit" => updated.memory_limit_percent = parse_value(value)?,
                    "adaptive_skip" => updated.adaptive_skip = parse_value(value)?,
                    "debug" => updated.debug = parse_value(value)?,
                    "model" => updated.model = value.to_string(),
                    "workers" => {
                        updated.max_workers = if value == "auto" {
                            None
                        } else {
                            Some(parse_value(value)?)
                        };
                    }
                    "detector" => {
                        updated.detector_command = if value == "off" {
                            None
                        } else {
                            Some(value.to_string())
                        };
                    }
                    "filter" => {
                        updated.file_filter = if value == "off" {
                            None
                        } else {
                            Some(value.to_string())
                        };
                    }
                    "classes" => {
                        updated.target_classes = value
                            .split(',')
                            .map(|part| part.trim().parse::<u32>())
                            .collect::<Result<Vec<_>, _>>()
                            .map_err(|_| format!("invalid class list: {}", value))?;
                    }
                    other => return Err(format!("unknown setting: {}", other)),
                }
                updated.validate().map_err(|e| e.to_string())?;
                self.config = updated;
            }
        }
        Ok(format!("{} = {}", key, value))
    }

    fn cmd_run(
        &mut self,
        folder: Option<&str>,
        event_tx: &mpsc::UnboundedSender<ProgressEvent>,
        done_tx: &mpsc::UnboundedSender<crate::Result<Vec<FolderSummary>>>,
    ) {
        if self.active.is_some() {
            println!("a run is already active, use 'cancel' to stop it");
            return;
        }

        let cancel = CancelFlag::new();
        let sink: Arc<dyn ProgressSink> = Arc::new(ChannelSink::new(event_tx.clone()));
        let config = self.config.clone();
        let paths = self.paths.clone();
        let folder: Option<String> = folder.map(str::to_string);
        let named = folder.is_some();
        let done_tx = done_tx.clone();
        let task_cancel = cancel.clone();

        self.active = Some(ActiveRun { cancel });
        self.last_percent.clear();

        tokio::spawn(async move {
            let result =
                run_folders(&config, &paths, folder.as_deref(), sink, task_cancel).await;
            let _ = done_tx.send(result);
        });

        if named {
            println!("run started");
        } else {
            println!(
                "run started over all folders under {}",
                self.paths.base_dir.display()
            );
        }
    }

    fn cmd_cancel(&mut self) {
        match &self.active {
            Some(run) => {
                run.cancel.cancel();
                println!("canceling, videos mid-scan will stop shortly");
            }
            None => println!("no active run"),
        }
    }

    fn cmd_recent(&self, arg: Option<&str>) {
        let count = arg.and_then(|n| n.parse::<usize>().ok()).unwrap_or(10);
        let lines = observe::recent();
        if lines.is_empty() {
            println!("no recent events");
            return;
        }
        let start = lines.len().saturating_sub(count);
        for line in &lines[start..] {
            let color = match line.level {
                Level::ERROR => self.palette.err,
                Level::WARN => self.palette.warn,
                Level::INFO => "",
                _ => self.palette.dim,
            };
            println!(
                "  {}{:<5} {}{}",
                color, line.level, line.message, self.palette.reset
            );
        }
    }

    fn cmd_models(&self) {
        let store = weights::global_store();
        println!("{}", render::rule());
        println!("known weights:");
        for name in WeightsStore::known_model_names() {
            let marker = if name == self.config.model {
                " (current)"
            } else {
                ""
            };
            println!("  {}{}", name, marker);
        }
        println!("search roots:");
        let roots = store.search_roots();
        if roots.is_empty() {
            println!("  (none)");
        }
        for root in roots {
            println!("  {}", root.display());
        }
        println!("{}", render::rule());
    }

    fn quit(&mut self) {
        if let Some(run) = &self.active {
            run.cancel.cancel();
            println!("canceling active run");
        }
        println!("bye");
    }

    fn on_event(&mut self, event: ProgressEvent) {
        let p = &self.palette;
        match event {
            ProgressEvent::FolderStarted { folder, videos } => {
                println!(
                    "{}-- {} ({} videos) --{}",
                    p.header, folder, videos, p.reset
                );
            }
            ProgressEvent::VideoStarted { video } => {
                println!("  {}scanning {}{}", p.dim, video, p.reset);
            }
            ProgressEvent::VideoProgress {
                video,
                percent,
                detections,
                segments,
            } => {
                if self.should_print_progress(&video, percent) {
                    println!(
                        "  {}: {}% ({} detections, {} segments)",
                        video, percent, detections, segments
                    );
                }
            }
            ProgressEvent::VideoCompleted { video, clips } => {
                self.last_percent.remove(&video);
                println!("  {}{} done, {} clips{}", p.ok, video, clips, p.reset);
            }
            ProgressEvent::VideoFailed { video, reason } => {
                self.last_percent.remove(&video);
                println!("  {}{} failed: {}{}", p.err, video, reason, p.reset);
            }
            ProgressEvent::MemoryPressure { used_percent } => {
                println!(
                    "  {}memory usage at {:.1}%{}",
                    p.warn, used_percent, p.reset
                );
            }
            ProgressEvent::FolderFinished {
                folder,
                processed,
                failed,
            } => {
                println!(
                    "{}-- {} finished: {} processed, {} failed --{}",
                    p.header, folder, processed, failed, p.reset
                );
            }
        }
    }

    /// True when a progress line crosses into a new decile for its video.
    fn should_print_progress(&mut self, video: &str, percent: u8) -> bool {
        let decile = percent / 10 * 10;
        match self.last_percent.get(video) {
            Some(&last) if last >= decile => false,
            _ => {
                self.last_percent.insert(video.to_string(), decile);
                true
            }
        }
    }

    fn on_run_done(&mut self, result: crate::Result<Vec<FolderSummary>>) {
        self.active = None;
        self.last_percent.clear();
        match result {
            Ok(summaries) => {
                if summaries.is_empty() {
                    println!("nothing to process");
                } else {
                    println!("{}", render::summary_table(&summaries, &self.palette));
                }
            }
            Err(e) => {
                println!("{}run failed: {}{}", self.palette.err, e, self.palette.reset);
            }
        }
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_value<T: FromStr>(value: &str) -> Result<T, String> {
    value
        .parse::<T>()
        .map_err(|_| format!("invalid value: {}", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_confidence() {
        let mut console = Console::new();
        console.apply_setting("confidence", "0.6").unwrap();
        assert!((console.config.confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_value_leaves_config_untouched() {
        let mut console = Console::new();
        let before = console.config.confidence;
        assert!(console.apply_setting("confidence", "3.5").is_err());
        assert!((console.config.confidence - before).abs() < 1e-6);
    }

    #[test]
    fn test_set_workers_auto_and_fixed() {
        let mut console = Console::new();
        console.apply_setting("workers", "2").unwrap();
        assert_eq!(console.config.max_workers, Some(2));
        console.apply_setting("workers", "auto").unwrap();
        assert_eq!(console.config.max_workers, None);
    }

    #[test]
    fn test_set_detector_command_and_off() {
        let mut console = Console::new();
        console
            .apply_setting("detector", "python3 detect.py --quiet")
            .unwrap();
        assert_eq!(
            console.config.detector_command.as_deref(),
            Some("python3 detect.py --quiet")
        );
        console.apply_setting("detector", "off").unwrap();
        assert_eq!(console.config.detector_command, None);
    }

    #[test]
    fn test_set_filter_and_off() {
        let mut console = Console::new();
        console.apply_setting("filter", "^front_").unwrap();
        assert_eq!(console.config.file_filter.as_deref(), Some("^front_"));
        // A pattern that fails validation never lands.
        assert!(console.apply_setting("filter", "cam[").is_err());
        assert_eq!(console.config.file_filter.as_deref(), Some("^front_"));
        console.apply_setting("filter", "off").unwrap();
        assert_eq!(console.config.file_filter, None);
    }

    #[test]
    fn test_set_classes_parses_csv() {
        let mut console = Console::new();
        console.apply_setting("classes", "0, 2,7").unwrap();
        assert_eq!(console.config.target_classes, vec![0, 2, 7]);
        assert!(console.apply_setting("classes", "0,dog").is_err());
    }

    #[test]
    fn test_unknown_setting_rejected() {
        let mut console = Console::new();
        let err = console.apply_setting("frobnicate", "1").unwrap_err();
        assert!(err.contains("frobnicate"));
    }

    #[test]
    fn test_theme_switch() {
        let mut console = Console::new();
        console.apply_setting("theme", "plain").unwrap();
        assert_eq!(console.palette, Palette::plain());
        assert!(console.apply_setting("theme", "solarized").is_err());
    }

    #[test]
    fn test_progress_prints_once_per_decile() {
        let mut console = Console::new();
        assert!(console.should_print_progress("a.mp4", 3));
        assert!(!console.should_print_progress("a.mp4", 7));
        assert!(console.should_print_progress("a.mp4", 12));
        assert!(!console.should_print_progress("a.mp4", 19));
        // Other videos track their own deciles.
        assert!(console.should_print_progress("b.mp4", 4));
    }

    #[tokio::test]
    async fn test_resolve_folder_by_index_and_name() {
        let base = std::env::temp_dir().join(format!(
            "clipsieve-console-probe-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .subsec_nanos()
        ));
        std::fs::create_dir_all(base.join("cam01")).unwrap();
        std::fs::create_dir_all(base.join("cam02")).unwrap();

        let mut console = Console::new();
        console.paths.base_dir = base.clone();

        // Indices follow the numbering 'list' prints, starting at one.
        assert_eq!(console.resolve_folder("2").await.unwrap(), base.join("cam02"));
        assert_eq!(
            console.resolve_folder("cam01").await.unwrap(),
            base.join("cam01")
        );
        assert!(console.resolve_folder("0").await.is_err());
        assert!(console.resolve_folder("3").await.is_err());
        assert!(console.resolve_folder("cam99").await.is_err());

        std::fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn test_set_paths() {
        let mut console = Console::new();
        console.apply_setting("input", "/srv/footage").unwrap();
        console.apply_setting("output", "/srv/clips").unwrap();
        assert_eq!(console.paths.base_dir, PathBuf::from("/srv/footage"));
        assert_eq!(console.paths.output_dir, PathBuf::from("/srv/clips"));
    }
}
