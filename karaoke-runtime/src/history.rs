use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use karaoke_core::score::Grade;
use karaoke_core::types::{Mode, PerformanceId};
use karaoke_engine::session::PerformanceRecord;
use serde::{Deserialize, Serialize};

use crate::fs_util::write_replacing;

pub const DEFAULT_MAX_ENTRIES: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceHistoryEntry {
    pub id: PerformanceId,
    pub ts_unix_ms: i64,
    pub song: String,
    pub mode: Mode,
    pub player: String,
    pub score: u32,
    pub grade: Grade,
    #[serde(default)]
    pub feedback: Option<String>,
}

impl PerformanceHistoryEntry {
    pub fn from_record(record: &PerformanceRecord, ts_unix_ms: i64) -> Self {
        let feedback = record.feedback.feedback.trim();
        Self {
            id: record.id,
            ts_unix_ms,
            song: record.song.clone(),
            mode: record.mode,
            player: record.player_name.clone(),
            score: record.display_score(),
            grade: record.grade(),
            feedback: (!feedback.is_empty()).then(|| feedback.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    max_entries: usize,
}

impl HistoryStore {
    pub fn at_path(path: PathBuf) -> Self {
        Self {
            path,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max.max(1);
        self
    }

    pub fn load(&self) -> anyhow::Result<Vec<PerformanceHistoryEntry>> {
        if !self.path.exists() {
            return Ok(vec![]);
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read history: {}", self.path.display()))?;
        let entries: Vec<PerformanceHistoryEntry> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse history: {}", self.path.display()))?;
        Ok(entries)
    }

    /// Oldest entries fall off once the cap is reached.
    pub fn append(&self, entry: PerformanceHistoryEntry) -> anyhow::Result<()> {
        let mut entries = self.load()?;
        entries.push(entry);
        if entries.len() > self.max_entries {
            let start = entries.len() - self.max_entries;
            entries = entries.split_off(start);
        }

        let json = serde_json::to_string_pretty(&entries).context("encode history JSON")?;
        write_replacing(&self.path, "tmp", json.as_bytes())
            .with_context(|| format!("failed to replace history: {}", self.path.display()))
    }

    /// Highest recorded score for one player on one song.
    pub fn personal_best(&self, player: &str, song: &str) -> anyhow::Result<Option<u32>> {
        Ok(self
            .load()?
            .iter()
            .filter(|e| e.player == player && e.song == song)
            .map(|e| e.score)
            .max())
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("failed to remove history: {}", self.path.display()))?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
