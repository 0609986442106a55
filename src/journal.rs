//! Per-folder processing journal.
//!
//! One CSV per footage folder records which videos were processed, when,
//! and which clips came out. The format is shared with older tooling that
//! still reads these files, so rows keep their historical shape: counts as
//! plain numbers, the clip list as a JSON array inside one CSV cell, and
//! CRLF row endings.

use chrono::Local;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const JOURNAL_FILE: &str = "processing_log.csv";
const JOURNAL_TEMP_FILE: &str = "processing_log_temp.csv";
const HEADER: &str = "filename,processed_datetime,objects,motion,segment_files";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("Journal I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed journal line {line} in {path}: {reason}")]
    Malformed {
        path: String,
        line: usize,
        reason: String,
    },
}

/// One journal row. Blank cells stay `None` so rewriting the file does not
/// invent values older readers would misread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub filename: String,
    pub processed_datetime: String,
    pub objects: Option<u32>,
    pub motion: Option<u32>,
    pub segment_files: Option<Vec<String>>,
}

impl JournalEntry {
    /// Row for a video that has never been attempted.
    pub fn blank(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            processed_datetime: String::new(),
            objects: None,
            motion: None,
            segment_files: None,
        }
    }

    /// Row for a completed video, stamped with the local wall clock.
    pub fn processed(
        filename: impl Into<String>,
        objects: u32,
        motion: u32,
        segment_files: Vec<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            processed_datetime: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            objects: Some(objects),
            motion: Some(motion),
            segment_files: Some(segment_files),
        }
    }

    /// Row for a failed attempt. The empty timestamp keeps the video
    /// eligible for the next run.
    pub fn failed(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            processed_datetime: String::new(),
            objects: Some(0),
            motion: Some(0),
            segment_files: Some(Vec::new()),
        }
    }

    pub fn is_processed(&self) -> bool {
        !self.processed_datetime.is_empty()
    }
}

/// The journal file for one footage folder.
pub struct Journal {
    path: PathBuf,
    temp_path: PathBuf,
}

impl Journal {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            path: dir.join(JOURNAL_FILE),
            temp_path: dir.join(JOURNAL_TEMP_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all rows, creating an empty journal first if none exists.
    pub async fn load(&self) -> Result<Vec<JournalEntry>, JournalError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::write(&self.path, format!("{}\r\n", HEADER))
                    .await
                    .map_err(|e| self.io_error(e))?;
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.io_error(e)),
        };
        self.parse(&text)
    }

    /// Like [`load`](Self::load) but without creating a missing journal.
    /// Read-only callers such as folder listings use this.
    pub async fn peek(&self) -> Result<Vec<JournalEntry>, JournalError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => self.parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    /// Make sure every listed file has a row, appending blank rows for the
    /// ones the journal has never seen. Returns the full row set.
    pub async fn ensure_rows(&self, files: &[String]) -> Result<Vec<JournalEntry>, JournalError> {
        let mut entries = self.load().await?;
        let mut appended = String::new();
        for file in files {
            if !entries.iter().any(|e| &e.filename == file) {
                let entry = JournalEntry::blank(file.clone());
                appended.push_str(&encode_entry(&entry));
                entries.push(entry);
            }
        }
        if !appended.is_empty() {
            use tokio::io::AsyncWriteExt;
            let mut file = tokio::fs::OpenOptions::new()
                .append(true)
                .open(&self.path)
                .await
                .map_err(|e| self.io_error(e))?;
            file.write_all(appended.as_bytes())
                .await
                .map_err(|e| self.io_error(e))?;
            file.flush().await.map_err(|e| self.io_error(e))?;
        }
        Ok(entries)
    }

    /// Replace the row matching the entry's filename, appending it when no
    /// row matches. The journal is rewritten through a temp file and
    /// renamed into place so a crash never leaves a half-written log.
    pub async fn update(&self, entry: JournalEntry) -> Result<(), JournalError> {
        let mut entries = self.load().await?;
        match entries.iter_mut().find(|e| e.filename == entry.filename) {
            Some(row) => *row = entry,
            None => entries.push(entry),
        }

        let mut text = String::with_capacity(entries.len() * 64 + HEADER.len() + 2);
        text.push_str(HEADER);
        text.push_str("\r\n");
        for entry in &entries {
            text.push_str(&encode_entry(entry));
        }

        tokio::fs::write(&self.temp_path, text)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&self.temp_path, &self.path)
            .await
            .map_err(|e| self.io_error(e))
    }

    fn parse(&self, text: &str) -> Result<Vec<JournalEntry>, JournalError> {
        let mut entries = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if idx == 0 {
                if line != HEADER {
                    return Err(JournalError::Malformed {
                        path: self.path.display().to_string(),
                        line: 1,
                        reason: format!("unexpected header '{}'", line),
                    });
                }
                continue;
            }
            if line.is_empty() {
                continue;
            }
            let fields = parse_line(line).map_err(|reason| JournalError::Malformed {
                path: self.path.display().to_string(),
                line: idx + 1,
                reason,
            })?;
            entries.push(decode_fields(&fields));
        }
        Ok(entries)
    }

    fn io_error(&self, source: std::io::Error) -> JournalError {
        JournalError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

fn decode_fields(fields: &[String]) -> JournalEntry {
    let cell = |i: usize| fields.get(i).map(|s| s.as_str()).unwrap_or("");
    JournalEntry {
        filename: cell(0).to_string(),
        processed_datetime: cell(1).to_string(),
        objects: cell(2).parse().ok(),
        motion: cell(3).parse().ok(),
        segment_files: if cell(4).is_empty() {
            None
        } else {
            // Unparseable clip lists read as empty, same as always.
            Some(serde_json::from_str(cell(4)).unwrap_or_default())
        },
    }
}

fn encode_entry(entry: &JournalEntry) -> String {
    let objects = entry.objects.map(|n| n.to_string()).unwrap_or_default();
    let motion = entry.motion.map(|n| n.to_string()).unwrap_or_default();
    let segment_files = match &entry.segment_files {
        Some(files) => serde_json::to_string(files).unwrap_or_else(|_| "[]".to_string()),
        None => String::new(),
    };
    format!(
        "{},{},{},{},{}\r\n",
        quote_field(&entry.filename),
        quote_field(&entry.processed_datetime),
        quote_field(&objects),
        quote_field(&motion),
        quote_field(&segment_files)
    )
}

fn quote_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn parse_line(line: &str) -> Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else {
            match c {
                ',' => fields.push(std::mem::take(&mut field)),
                '"' if field.is_empty() => in_quotes = true,
                _ => field.push(c),
            }
        }
    }
    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    fields.push(field);
    Ok(fields)
}
