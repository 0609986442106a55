//! Folder orchestration: discovery, journaling, parallel jobs.
//!
//! A folder run works through every unprocessed .mp4 in one footage
//! subfolder. Videos run on a bounded set of workers; journal updates
//! happen on the orchestrating task as results come in, so the journal
//! never sees concurrent writers.

use crate::config::{ProcessingConfig, RunPaths};
use crate::detect::{CommandDetector, Detector, NullDetector};
use crate::journal::{Journal, JournalEntry};
use crate::memory::MemoryMonitor;
use crate::pipeline::progress::{ProgressEvent, ProgressSink};
use crate::pipeline::video::{VideoJob, VideoOutcome};
use crate::pipeline::VideoError;
use crate::tools::FfmpegTools;
use crate::weights;
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const MEMORY_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Requests that a run stop. Queued videos are never dispatched and videos
/// mid-scan bail at the next analyzed frame.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs one video end to end. The pipeline implementation spawns real
/// ffmpeg and detector processes; tests substitute scripted runners.
#[async_trait]
pub trait VideoRunner: Send + Sync {
    async fn run_video(&self, video: &Path, output_dir: &Path)
        -> Result<VideoOutcome, VideoError>;
}

/// The real runner: a fresh [`VideoJob`] per video, with a detector child
/// spawned for the video's lifetime when one is configured.
pub struct PipelineRunner {
    config: ProcessingConfig,
    tools: FfmpegTools,
    sink: Arc<dyn ProgressSink>,
    cancel: CancelFlag,
    weights_path: Option<PathBuf>,
}

impl PipelineRunner {
    /// Build a runner, resolving the configured model's weights once when a
    /// detector command is set. Missing weights disable nothing here; the
    /// detector child decides what to do without them.
    pub async fn prepare(
        config: ProcessingConfig,
        tools: FfmpegTools,
        sink: Arc<dyn ProgressSink>,
        cancel: CancelFlag,
    ) -> Self {
        let weights_path = if config.detector_command.is_some() {
            match weights::fetch_weights(&config.model).await {
                Ok(resolved) => Some(resolved.path.clone()),
                Err(e) => {
                    tracing::warn!("weights unavailable for detector: {}", e);
                    None
                }
            }
        } else {
            None
        };
        Self {
            config,
            tools,
            sink,
            cancel,
            weights_path,
        }
    }
}

#[async_trait]
impl VideoRunner for PipelineRunner {
    async fn run_video(
        &self,
        video: &Path,
        output_dir: &Path,
    ) -> Result<VideoOutcome, VideoError> {
        match &self.config.detector_command {
            Some(command) => {
                let detector =
                    Arc::new(CommandDetector::spawn(command, self.weights_path.as_deref())?);
                let job = VideoJob::new(
                    self.config.clone(),
                    self.tools.clone(),
                    detector.clone() as Arc<dyn Detector>,
                    self.sink.clone(),
                    self.cancel.clone(),
                );
                let result = job.run(video, output_dir).await;
                detector.shutdown().await;
                result
            }
            None => {
                let job = VideoJob::new(
                    self.config.clone(),
                    self.tools.clone(),
                    Arc::new(NullDetector),
                    self.sink.clone(),
                    self.cancel.clone(),
                );
                job.run(video, output_dir).await
            }
        }
    }
}

/// What a folder run did, for callers and the console summary table.
#[derive(Debug, Clone)]
pub struct FolderSummary {
    pub folder: String,
    pub processed: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub skipped: usize,
    pub canceled: usize,
    pub clips_total: usize,
    pub execution_time: Duration,
}

/// Orchestrates one footage subfolder.
pub struct FolderRun {
    config: ProcessingConfig,
    runner: Arc<dyn VideoRunner>,
    sink: Arc<dyn ProgressSink>,
    cancel: CancelFlag,
}

impl FolderRun {
    pub fn new(
        config: ProcessingConfig,
        runner: Arc<dyn VideoRunner>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            config,
            runner,
            sink,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Process every unprocessed video in `subfolder`, writing clips under
    /// `<output_base>/<subfolder name>/` and keeping the folder's journal
    /// current as results arrive.
    pub async fn execute(
        &self,
        subfolder: &Path,
        output_base: &Path,
    ) -> crate::Result<FolderSummary> {
        let started = Instant::now();
        let folder = subfolder
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| subfolder.display().to_string());
        let output_dir = output_base.join(&folder);
        tokio::fs::create_dir_all(&output_dir).await?;

        let mut files = discover_videos(subfolder).await?;
        if let Some(pattern) = &self.config.file_filter {
            // validate() vetted the pattern before the run started.
            let filter = Regex::new(pattern).map_err(|e| {
                crate::Error::validation_with_context(
                    "file_filter is not a valid regex",
                    crate::ErrorContext::new()
                        .with_field_path("config.file_filter")
                        .with_details(e.to_string()),
                )
            })?;
            let before = files.len();
            files.retain(|name| filter.is_match(name));
            tracing::debug!(
                folder = %folder,
                pattern,
                matched = files.len(),
                dropped = before - files.len(),
                "file filter applied"
            );
        }
        let journal = Journal::in_dir(subfolder);
        let entries = journal.ensure_rows(&files).await?;
        let pending: Vec<String> = entries
            .iter()
            .filter(|e| !e.is_processed())
            .map(|e| e.filename.clone())
            .collect();
        let skipped = files.len() - pending.len();

        self.sink.emit(ProgressEvent::FolderStarted {
            folder: folder.clone(),
            videos: pending.len(),
        });
        tracing::info!(
            folder = %folder,
            total = files.len(),
            pending = pending.len(),
            skipped,
            "folder run starting"
        );

        let mut summary = FolderSummary {
            folder: folder.clone(),
            processed: Vec::new(),
            failed: Vec::new(),
            skipped,
            canceled: 0,
            clips_total: 0,
            execution_time: Duration::default(),
        };

        if pending.is_empty() {
            summary.execution_time = started.elapsed();
            self.sink.emit(ProgressEvent::FolderFinished {
                folder,
                processed: 0,
                failed: 0,
            });
            return Ok(summary);
        }

        let workers = self
            .config
            .max_workers
            .unwrap_or_else(auto_workers)
            .max(1);
        tracing::info!(workers, "dispatching videos");

        let watchdog = spawn_memory_watchdog(
            MemoryMonitor::new(self.config.memory_limit_percent),
            self.sink.clone(),
        );

        let semaphore = Arc::new(tokio::sync::Semaphore::new(workers));
        let mut join_set = tokio::task::JoinSet::new();
        for file in &pending {
            let file = file.clone();
            let video_path = subfolder.join(&file);
            let output_dir = output_dir.clone();
            let runner = self.runner.clone();
            let semaphore = semaphore.clone();
            let cancel = self.cancel.clone();
            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (file, None),
                };
                if cancel.is_canceled() {
                    return (file, None);
                }
                let result = runner.run_video(&video_path, &output_dir).await;
                (file, Some(result))
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((file, Some(Ok(outcome)))) => {
                    let objects = outcome.clips.iter().filter(|c| c.objects).count() as u32;
                    let motion = outcome.clips.iter().filter(|c| c.motion).count() as u32;
                    let names: Vec<String> =
                        outcome.clips.iter().map(|c| c.file_name.clone()).collect();
                    journal
                        .update(JournalEntry::processed(&file, objects, motion, names))
                        .await?;
                    summary.clips_total += outcome.clips.len();
                    self.sink.emit(ProgressEvent::VideoCompleted {
                        video: file.clone(),
                        clips: outcome.clips.len(),
                    });
                    summary.processed.push(file);
                }
                Ok((file, Some(Err(VideoError::Cancelled)))) => {
                    // Blank journal row stays, so the next run retries it.
                    tracing::info!(video = %file, "video canceled mid-scan");
                    summary.canceled += 1;
                }
                Ok((file, Some(Err(e)))) => {
                    let reason = e.to_string();
                    journal.update(JournalEntry::failed(&file)).await?;
                    self.sink.emit(ProgressEvent::VideoFailed {
                        video: file.clone(),
                        reason: reason.clone(),
                    });
                    summary.failed.push((file, reason));
                }
                Ok((_, None)) => summary.canceled += 1,
                Err(e) => {
                    tracing::warn!("video task panicked: {}", e);
                    summary
                        .failed
                        .push(("<unknown>".to_string(), e.to_string()));
                }
            }
        }
        watchdog.abort();

        summary.execution_time = started.elapsed();
        self.sink.emit(ProgressEvent::FolderFinished {
            folder: folder.clone(),
            processed: summary.processed.len(),
            failed: summary.failed.len(),
        });
        tracing::info!(
            folder = %folder,
            processed = summary.processed.len(),
            failed = summary.failed.len(),
            canceled = summary.canceled,
            clips = summary.clips_total,
            seconds = summary.execution_time.as_secs_f64(),
            "folder run finished"
        );
        for (file, reason) in &summary.failed {
            tracing::warn!(video = %file, "failed: {}", reason);
        }

        Ok(summary)
    }
}

/// Process every footage subfolder under the input base, or one named
/// subfolder. Shared by the CLI and the console.
pub async fn run_folders(
    config: &ProcessingConfig,
    paths: &RunPaths,
    only: Option<&str>,
    sink: Arc<dyn ProgressSink>,
    cancel: CancelFlag,
) -> crate::Result<Vec<FolderSummary>> {
    config.validate()?;
    let tools = FfmpegTools::discover()?;
    let runner = Arc::new(
        PipelineRunner::prepare(config.clone(), tools, sink.clone(), cancel.clone()).await,
    );

    let folders = match only {
        Some(name) => {
            let folder = paths.base_dir.join(name);
            if !folder.is_dir() {
                return Err(crate::Error::validation_with_context(
                    format!("No such footage folder: {}", name),
                    crate::ErrorContext::new()
                        .with_field_path(folder.display().to_string())
                        .with_source("run_folders"),
                ));
            }
            vec![folder]
        }
        None => list_subfolders(&paths.base_dir).await?,
    };

    let mut summaries = Vec::new();
    for folder in folders {
        if cancel.is_canceled() {
            tracing::info!(folder = %folder.display(), "run canceled before folder");
            break;
        }
        let run = FolderRun::new(config.clone(), runner.clone(), sink.clone())
            .with_cancel(cancel.clone());
        summaries.push(run.execute(&folder, &paths.output_dir).await?);
    }
    Ok(summaries)
}

/// Subfolders of the footage base, sorted by name.
pub async fn list_subfolders(base: &Path) -> crate::Result<Vec<PathBuf>> {
    let mut folders = Vec::new();
    let mut dir = tokio::fs::read_dir(base).await?;
    while let Some(entry) = dir.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            folders.push(entry.path());
        }
    }
    folders.sort();
    Ok(folders)
}

/// The .mp4 files directly inside a folder, sorted by name.
pub async fn discover_videos(folder: &Path) -> crate::Result<Vec<String>> {
    let mut files = Vec::new();
    let mut dir = tokio::fs::read_dir(folder).await?;
    while let Some(entry) = dir.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.to_lowercase().ends_with(".mp4") {
            files.push(name);
        }
    }
    files.sort();
    Ok(files)
}

/// Worker count when the config leaves it automatic: half the CPUs,
/// between one and four.
fn auto_workers() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cpus / 2).clamp(1, 4)
}

fn spawn_memory_watchdog(
    monitor: MemoryMonitor,
    sink: Arc<dyn ProgressSink>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(MEMORY_CHECK_INTERVAL).await;
            if let Some(used) = monitor.over_limit() {
                tracing::warn!("memory usage at {:.1}% exceeds configured limit", used);
                sink.emit(ProgressEvent::MemoryPressure { used_percent: used });
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TempDirGuard {
        path: PathBuf,
    }

    impl TempDirGuard {
        fn new(tag: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "clipsieve-folder-{}-{}-{}",
                tag,
                std::process::id(),
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap()
                    .subsec_nanos()
            ));
            std::fs::create_dir_all(&path).unwrap();
            Self { path }
        }
    }

    impl Drop for TempDirGuard {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn test_auto_workers_bounds() {
        let workers = auto_workers();
        assert!(workers >= 1);
        assert!(workers <= 4);
    }

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        assert!(!flag.is_canceled());
        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_canceled());
    }

    #[tokio::test]
    async fn test_discover_videos_filters_and_sorts() {
        let dir = TempDirGuard::new("discover");
        for name in ["b.mp4", "a.MP4", "notes.txt", "c.mkv"] {
            std::fs::write(dir.path.join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path.join("nested.mp4")).unwrap();

        let files = discover_videos(&dir.path).await.unwrap();
        assert_eq!(files, vec!["a.MP4".to_string(), "b.mp4".to_string()]);
    }

    #[tokio::test]
    async fn test_list_subfolders_sorted() {
        let dir = TempDirGuard::new("subfolders");
        std::fs::create_dir(dir.path.join("cam2")).unwrap();
        std::fs::create_dir(dir.path.join("cam1")).unwrap();
        std::fs::write(dir.path.join("stray.mp4"), b"x").unwrap();

        let folders = list_subfolders(&dir.path).await.unwrap();
        let names: Vec<_> = folders
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["cam1", "cam2"]);
    }
}
