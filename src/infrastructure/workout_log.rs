//! Append-only JSON lines file of finished workouts.

use crate::domain::models::WorkoutRecord;
use anyhow::Context;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Totals over every stored workout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkoutSummary {
    pub count: usize,
    pub distance_km: f64,
    pub steps: u64,
    pub last: Option<WorkoutRecord>,
}

#[derive(Debug, Clone)]
pub struct WorkoutLog {
    path: PathBuf,
}

impl WorkoutLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `<data dir>/WalkpadController/workouts.jsonl`
    pub fn default_path() -> anyhow::Result<PathBuf> {
        let data_dir = dirs::data_dir().context("Could not find data directory")?;
        Ok(data_dir.join("WalkpadController").join("workouts.jsonl"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &WorkoutRecord) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        writeln!(file, "{}", line)?;
        info!(
            "Saved workout: {:.2} km, {} steps, {}s",
            record.distance_km, record.steps, record.duration_seconds
        );
        Ok(())
    }

    /// All stored records; unreadable lines are skipped.
    pub fn read_all(&self) -> anyhow::Result<Vec<WorkoutRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&self.path)?;
        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping workout line {}: {}", index + 1, e),
            }
        }
        Ok(records)
    }

    pub fn summary(&self) -> anyhow::Result<WorkoutSummary> {
        let records = self.read_all()?;
        Ok(WorkoutSummary {
            count: records.len(),
            distance_km: records.iter().map(|r| r.distance_km).sum(),
            steps: records.iter().map(|r| u64::from(r.steps)).sum(),
            last: records.last().cloned(),
        })
    }
}
