//! Run manifest: what produced an output directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata for one exam run, written next to its outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Exam file the run was taken from.
    pub exam: PathBuf,
    /// Student model identifiers, one per config run.
    pub student_models: Vec<String>,
    /// Grader model identifier when grading was enabled.
    #[serde(default)]
    pub grader_model: Option<String>,
}

impl RunManifest {
    pub fn new(exam: &Path, student_models: Vec<String>, grader_model: Option<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            exam: exam.to_path_buf(),
            student_models,
            grader_model,
        }
    }

    /// Write the manifest as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write manifest: {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse manifest: {}", path.display()))
    }
}
