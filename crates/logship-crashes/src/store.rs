//! Crash record storage
//!
//! Raw crash records live as `crash-{date}-{uuid}.json` files in the crash
//! reports directory, next to the `always_send` marker that persists the
//! user's "always send" preference across restarts.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::capture::CrashRecord;
use crate::error::Result;

const ALWAYS_SEND_MARKER: &str = "always_send";

/// Entry in the crash reports directory
#[derive(Debug, Clone)]
pub struct CrashFileEntry {
    pub id: String,
    pub date: String,
    pub size_bytes: u64,
    pub path: PathBuf,
}

/// Manages the directory of raw crash record files.
#[derive(Debug, Clone)]
pub struct CrashReportStore {
    reports_dir: PathBuf,
}

impl CrashReportStore {
    /// Creates a new store pointing at `reports_dir`.
    pub fn new(reports_dir: PathBuf) -> Self {
        Self { reports_dir }
    }

    /// Returns the reports directory path.
    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    /// Writes a crash record, creating the directory if needed.
    pub fn save(&self, record: &CrashRecord) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.reports_dir)?;

        let date = record.timestamp.format("%Y%m%d");
        let path = self
            .reports_dir
            .join(format!("crash-{date}-{}.json", record.id));

        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    /// Lists crash files, oldest first.
    pub fn list(&self) -> Result<Vec<CrashFileEntry>> {
        if !self.reports_dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.reports_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }

            let stem = path
                .file_stem()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();
            let Some((date, id)) = parse_crash_filename(&stem) else {
                continue;
            };

            entries.push(CrashFileEntry {
                id,
                date,
                size_bytes: entry.metadata()?.len(),
                path,
            });
        }

        entries.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(entries)
    }

    /// Finds the entry whose id equals `id`, or else the first one starting
    /// with it.
    pub fn find(&self, id: &str) -> Result<Option<CrashFileEntry>> {
        if id.is_empty() {
            return Ok(None);
        }
        let entries = self.list()?;
        if let Some(exact) = entries.iter().position(|entry| entry.id == id) {
            return Ok(Some(entries[exact].clone()));
        }
        Ok(entries.into_iter().find(|entry| entry.id.starts_with(id)))
    }

    /// Reads the crash record stored at `entry`.
    pub fn read(&self, entry: &CrashFileEntry) -> Result<CrashRecord> {
        let content = std::fs::read_to_string(&entry.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Reads a crash record by id (or id prefix).
    pub fn load(&self, id: &str) -> Result<Option<CrashRecord>> {
        match self.find(id)? {
            Some(entry) => Ok(Some(self.read(&entry)?)),
            None => Ok(None),
        }
    }

    /// Deletes a crash record by id (or id prefix).
    pub fn delete(&self, id: &str) -> Result<bool> {
        match self.find(id)? {
            Some(entry) => {
                std::fs::remove_file(&entry.path)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Deletes exactly the file behind `entry`.
    pub fn remove(&self, entry: &CrashFileEntry) -> Result<()> {
        std::fs::remove_file(&entry.path)?;
        Ok(())
    }

    /// Deletes every crash record. The always-send marker is kept.
    pub fn delete_all(&self) -> Result<u32> {
        let mut count = 0;
        for entry in self.list()? {
            if std::fs::remove_file(&entry.path).is_ok() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Whether the user chose to always send crash reports.
    pub fn always_send(&self) -> bool {
        self.reports_dir.join(ALWAYS_SEND_MARKER).exists()
    }

    /// Persists or clears the always-send preference.
    pub fn set_always_send(&self, always_send: bool) -> Result<()> {
        let marker = self.reports_dir.join(ALWAYS_SEND_MARKER);
        if always_send {
            std::fs::create_dir_all(&self.reports_dir)?;
            std::fs::write(&marker, Utc::now().to_rfc3339())?;
        } else if marker.exists() {
            std::fs::remove_file(&marker)?;
        }
        Ok(())
    }
}

/// Parses `crash-20260207-<uuid>` into (date, id).
fn parse_crash_filename(stem: &str) -> Option<(String, String)> {
    let mut parts = stem.splitn(3, '-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("crash"), Some(date), Some(id)) if !id.is_empty() => {
            Some((date.to_string(), id.to_string()))
        }
        _ => None,
    }
}
