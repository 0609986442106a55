//! Console text rendering: palette, tables, summaries.

use crate::config::ProcessingConfig;
use crate::pipeline::FolderSummary;
use crate::probe::VideoMeta;

pub const RULE_WIDTH: usize = 40;

/// ANSI styling for console output. Two schemes, one per terminal
/// background family, plus a colorless one for pipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub header: &'static str,
    pub ok: &'static str,
    pub warn: &'static str,
    pub err: &'static str,
    pub dim: &'static str,
    pub reset: &'static str,
}

impl Palette {
    pub fn dark() -> Self {
        Self {
            header: "\x1b[1;36m",
            ok: "\x1b[32m",
            warn: "\x1b[33m",
            err: "\x1b[31m",
            dim: "\x1b[90m",
            reset: "\x1b[0m",
        }
    }

    pub fn light() -> Self {
        Self {
            header: "\x1b[1;34m",
            ok: "\x1b[32m",
            warn: "\x1b[35m",
            err: "\x1b[31m",
            dim: "\x1b[37m",
            reset: "\x1b[0m",
        }
    }

    pub fn plain() -> Self {
        Self {
            header: "",
            ok: "",
            warn: "",
            err: "",
            dim: "",
            reset: "",
        }
    }
}

pub fn rule() -> String {
    "-".repeat(RULE_WIDTH)
}

pub fn row(label: &str, value: impl std::fmt::Display) -> String {
    format!("  {:<20} {}", label, value)
}

pub fn help_text() -> String {
    let mut out = String::new();
    out.push_str("Commands:\n");
    out.push_str(&row("help", "show this help"));
    out.push('\n');
    out.push_str(&row("list", "footage folders and their journal state"));
    out.push('\n');
    out.push_str(&row("probe <n|name>", "per-video metadata for one folder"));
    out.push('\n');
    out.push_str(&row("set", "show current settings"));
    out.push('\n');
    out.push_str(&row("set <key> <value>", "change a setting"));
    out.push('\n');
    out.push_str(&row("run [folder]", "process all folders, or just one"));
    out.push('\n');
    out.push_str(&row("cancel", "stop the active run"));
    out.push('\n');
    out.push_str(&row("recent [n]", "last log lines"));
    out.push('\n');
    out.push_str(&row("models", "known weights and search roots"));
    out.push('\n');
    out.push_str(&row("quit", "leave the console"));
    out
}

pub fn config_table(config: &ProcessingConfig) -> String {
    let mut out = String::new();
    out.push_str(&rule());
    out.push('\n');
    out.push_str(&row("confidence", config.confidence));
    out.push('\n');
    out.push_str(&row("motion_threshold", config.motion_threshold));
    out.push('\n');
    out.push_str(&row("skip_frames", config.skip_frames));
    out.push('\n');
    out.push_str(&row("resize_factor", config.resize_factor));
    out.push('\n');
    out.push_str(&row("buffer_seconds", config.buffer_seconds));
    out.push('\n');
    out.push_str(&row("min_area", config.min_object_area_ratio));
    out.push('\n');
    out.push_str(&row(
        "classes",
        config
            .target_classes
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(","),
    ));
    out.push('\n');
    out.push_str(&row(
        "roi",
        match config.roi {
            Some([x1, y1, x2, y2]) => format!("[{}, {}, {}, {}]", x1, y1, x2, y2),
            None => "off".to_string(),
        },
    ));
    out.push('\n');
    out.push_str(&row("adaptive_skip", config.adaptive_skip));
    out.push('\n');
    out.push_str(&row("debug", config.debug));
    out.push('\n');
    out.push_str(&row("memory_limit", format!("{}%", config.memory_limit_percent)));
    out.push('\n');
    out.push_str(&row(
        "workers",
        match config.max_workers {
            Some(n) => n.to_string(),
            None => "auto".to_string(),
        },
    ));
    out.push('\n');
    out.push_str(&row("model", &config.model));
    out.push('\n');
    out.push_str(&row(
        "detector",
        config.detector_command.as_deref().unwrap_or("off"),
    ));
    out.push('\n');
    out.push_str(&row(
        "filter",
        config.file_filter.as_deref().unwrap_or("off"),
    ));
    out.push('\n');
    out.push_str(&rule());
    out
}

pub fn meta_table(path: &str, meta: &VideoMeta) -> String {
    let mut out = String::new();
    out.push_str(&rule());
    out.push('\n');
    out.push_str(&row("file", path));
    out.push('\n');
    out.push_str(&row("resolution", format!("{}x{}", meta.width, meta.height)));
    out.push('\n');
    out.push_str(&row("fps", format!("{:.3}", meta.fps)));
    out.push('\n');
    out.push_str(&row("frames", meta.frame_count));
    out.push('\n');
    out.push_str(&row(
        "duration",
        format!("{:.1}s", meta.duration_seconds),
    ));
    out.push('\n');
    out.push_str(&rule());
    out
}

/// `seconds` rendered as `H:MM:SS`, hours unpadded.
pub fn hms(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{}:{:02}:{:02}", total / 3600, total % 3600 / 60, total % 60)
}

/// One line of the folder probe table.
pub struct ProbeRow {
    pub name: String,
    pub resolution: String,
    pub fps: String,
    pub duration: String,
    pub status: String,
}

/// Per-video metadata for one footage folder, with the folder's total
/// footage length as the footer.
pub fn probe_table(folder: &str, rows: &[ProbeRow], total_seconds: f64) -> String {
    let mut out = String::new();
    out.push_str(&rule());
    out.push('\n');
    out.push_str(folder);
    out.push('\n');
    out.push_str(&format!(
        "  {:<28} {:>9} {:>7} {:>9}  {}\n",
        "file", "res", "fps", "length", "status"
    ));
    for r in rows {
        out.push_str(&format!(
            "  {:<28} {:>9} {:>7} {:>9}  {}\n",
            r.name, r.resolution, r.fps, r.duration, r.status
        ));
    }
    out.push_str(&rule());
    out.push('\n');
    out.push_str(&row("total", hms(total_seconds)));
    out
}

pub fn summary_table(summaries: &[FolderSummary], palette: &Palette) -> String {
    let mut out = String::new();
    out.push_str(&rule());
    out.push('\n');
    let mut processed = 0;
    let mut failed = 0;
    let mut clips = 0;
    let mut canceled = 0;
    for summary in summaries {
        let marker = if summary.failed.is_empty() {
            format!("{}ok{}", palette.ok, palette.reset)
        } else {
            format!("{}{} failed{}", palette.err, summary.failed.len(), palette.reset)
        };
        out.push_str(&format!(
            "  {:<20} {:>3} processed, {:>3} clips, {}\n",
            summary.folder,
            summary.processed.len(),
            summary.clips_total,
            marker
        ));
        processed += summary.processed.len();
        failed += summary.failed.len();
        clips += summary.clips_total;
        canceled += summary.canceled;
    }
    let seconds: f64 = summaries.iter().map(|s| s.execution_time.as_secs_f64()).sum();
    out.push_str(&rule());
    out.push('\n');
    out.push_str(&row("processed", processed));
    out.push('\n');
    out.push_str(&row("failed", failed));
    out.push('\n');
    if canceled > 0 {
        out.push_str(&row("canceled", canceled));
        out.push('\n');
    }
    out.push_str(&row("clips", clips));
    out.push('\n');
    out.push_str(&row("elapsed", format!("{:.1}s", seconds)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_row_alignment() {
        let line = row("fps", "30");
        assert!(line.starts_with("  fps"));
        assert!(line.ends_with("30"));
        // Label column is 20 wide plus the two-space indent and separator.
        assert_eq!(line.find("30"), Some(23));
    }

    #[test]
    fn test_config_table_mentions_every_tunable() {
        let table = config_table(&ProcessingConfig::default());
        for key in [
            "confidence",
            "motion_threshold",
            "skip_frames",
            "resize_factor",
            "buffer_seconds",
            "classes",
            "model",
            "detector",
            "workers",
        ] {
            assert!(table.contains(key), "missing {}", key);
        }
        assert!(table.contains("yolo11n.pt"));
        assert!(table.contains("off"));
    }

    #[test]
    fn test_summary_table_totals() {
        let summaries = vec![FolderSummary {
            folder: "cam01".to_string(),
            processed: vec!["a.mp4".to_string(), "b.mp4".to_string()],
            failed: vec![],
            skipped: 1,
            canceled: 0,
            clips_total: 5,
            execution_time: Duration::from_secs(12),
        }];
        let table = summary_table(&summaries, &Palette::plain());
        assert!(table.contains("cam01"));
        assert!(table.contains("5 clips"));
        assert!(table.contains("12.0s"));
    }

    #[test]
    fn test_hms_rounds_and_pads() {
        assert_eq!(hms(0.0), "0:00:00");
        assert_eq!(hms(83.4), "0:01:23");
        assert_eq!(hms(3723.0), "1:02:03");
        assert_eq!(hms(36000.0), "10:00:00");
    }

    #[test]
    fn test_probe_table_lists_rows_and_total() {
        let rows = vec![
            ProbeRow {
                name: "a.mp4".to_string(),
                resolution: "1920x1080".to_string(),
                fps: "29.97".to_string(),
                duration: hms(600.0),
                status: "processed".to_string(),
            },
            ProbeRow {
                name: "b.mp4".to_string(),
                resolution: "-".to_string(),
                fps: "-".to_string(),
                duration: "-".to_string(),
                status: "unreadable".to_string(),
            },
        ];
        let table = probe_table("cam01", &rows, 600.0);
        assert!(table.contains("cam01"));
        assert!(table.contains("1920x1080"));
        assert!(table.contains("unreadable"));
        assert!(table.contains("0:10:00"));
    }

    #[test]
    fn test_palettes_differ() {
        assert_ne!(Palette::dark(), Palette::light());
        assert_eq!(Palette::plain().ok, "");
    }
}
