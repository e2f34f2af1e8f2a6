//! JSONL observation log and JSON snapshot file
//!
//! Layout inside the output directory:
//! - `observations.jsonl`: one observation per line, append-only
//! - `snapshot.json`: latest run snapshot, replaced atomically

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use crashrank_core::{OrdinalObservation, Persistence, PersistenceError, RunSnapshot};
use tracing::{debug, info, warn};

pub const OBSERVATIONS_FILE: &str = "observations.jsonl";
pub const SNAPSHOT_FILE: &str = "snapshot.json";

/// File-backed persistence rooted at an output directory
#[derive(Debug, Clone)]
pub struct JsonlPersistence {
    observations_path: PathBuf,
    snapshot_path: PathBuf,
}

impl JsonlPersistence {
    /// Open (creating if needed) the output directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;

        let storage = Self {
            observations_path: dir.join(OBSERVATIONS_FILE),
            snapshot_path: dir.join(SNAPSHOT_FILE),
        };
        info!(
            "Storage ready: observations={}, snapshot={}",
            storage.observations_path.display(),
            storage.snapshot_path.display()
        );
        Ok(storage)
    }

    /// Open an output directory that must already exist (read-only commands)
    pub fn open_existing(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            bail!("output directory does not exist: {}", dir.display());
        }
        Self::open(dir)
    }

    pub fn observations_path(&self) -> &Path {
        &self.observations_path
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot_path.exists()
    }

    fn temp_snapshot_path(&self) -> PathBuf {
        self.snapshot_path.with_extension("json.tmp")
    }
}

impl Persistence for JsonlPersistence {
    fn append_observation(&mut self, observation: &OrdinalObservation) -> Result<(), PersistenceError> {
        let mut line = serde_json::to_string(observation)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.observations_path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;

        debug!("Logged observation {:?}", observation.ordered_ids);
        Ok(())
    }

    fn load_observations(&self) -> Result<Vec<OrdinalObservation>, PersistenceError> {
        if !self.observations_path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.observations_path)?);
        let mut observations = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<OrdinalObservation>(line) {
                Ok(observation) => observations.push(observation),
                Err(e) => warn!(
                    "Skipping corrupt line {} of {}: {}",
                    index + 1,
                    self.observations_path.display(),
                    e
                ),
            }
        }
        Ok(observations)
    }

    fn save_snapshot(&mut self, snapshot: &RunSnapshot) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        let temp = self.temp_snapshot_path();
        {
            let mut file = File::create(&temp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &self.snapshot_path)?;
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Option<RunSnapshot>, PersistenceError> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.snapshot_path)?;
        let snapshot: RunSnapshot = serde_json::from_slice(&bytes)?;
        Ok(Some(snapshot))
    }

    fn snapshot_location(&self) -> String {
        self.snapshot_path.display().to_string()
    }
}
