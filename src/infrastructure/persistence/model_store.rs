//! JSON persistence for fitted regime models.
//!
//! One snapshot per file. Writes go to a temporary sibling first and are
//! renamed into place, so a crash never leaves a half-written model behind.

use crate::application::ml::GaussianRegimeModel;
use crate::domain::errors::SnapshotError;
use crate::domain::ml::model_snapshot::ModelSnapshot;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Reads and writes one model snapshot file.
pub struct ModelStore {
    file_path: PathBuf,
}

impl ModelStore {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn exists(&self) -> bool {
        self.file_path.exists()
    }

    pub fn save(&self, snapshot: &ModelSnapshot) -> Result<(), SnapshotError> {
        snapshot.validate()?;
        let content = serde_json::to_string_pretty(snapshot)?;

        if let Some(parent) = self.file_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }

        // Atomic write: write to temp file then rename
        let temp_path = self.file_path.with_extension("tmp");
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, &self.file_path)?;

        info!(
            "Saved regime model ({} states) to {:?}",
            snapshot.hmm.n_states(),
            self.file_path
        );
        Ok(())
    }

    /// Load and validate the snapshot, including its schema version.
    pub fn load(&self) -> Result<ModelSnapshot, SnapshotError> {
        if !self.file_path.exists() {
            return Err(SnapshotError::NotFound {
                path: self.file_path.display().to_string(),
            });
        }
        let content = fs::read_to_string(&self.file_path)?;
        let snapshot: ModelSnapshot = serde_json::from_str(&content)?;
        snapshot.validate()?;

        info!("Loaded regime model from {:?}", self.file_path);
        Ok(snapshot)
    }

    pub fn save_model(&self, model: &GaussianRegimeModel) -> Result<(), SnapshotError> {
        self.save(&model.snapshot()?)
    }

    pub fn load_model(&self) -> Result<GaussianRegimeModel, SnapshotError> {
        GaussianRegimeModel::from_snapshot(&self.load()?)
    }
}
