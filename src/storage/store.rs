//! Stage output store for per-image OCR records

use std::path::{Path, PathBuf};
use tracing::info;

use super::{file_name, list_files};
use crate::error::{PipelineError, PipelineResult};
use crate::vision::ImageRecord;

/// Directory holding one JSON record per screenshot
#[derive(Debug, Clone)]
pub struct StageStore {
    root: PathBuf,
}

impl StageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory if needed
    pub fn ensure(&self) -> PipelineResult<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Remove every stored record for a fresh run
    pub fn reset(&self) -> PipelineResult<()> {
        if self.root.is_dir() {
            info!("Clearing {} for a fresh run", self.root.display());
            std::fs::remove_dir_all(&self.root)?;
        }
        self.ensure()
    }

    /// Record path for a screenshot (`shot.png` -> `<root>/shot.json`)
    pub fn record_path(&self, image_filename: &str) -> PathBuf {
        let stem = Path::new(image_filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| image_filename.to_string());
        self.root.join(format!("{stem}.json"))
    }

    pub fn contains(&self, image_filename: &str) -> bool {
        self.record_path(image_filename).is_file()
    }

    pub fn save(&self, record: &ImageRecord) -> PipelineResult<PathBuf> {
        self.ensure()?;
        let path = self.record_path(&record.filename);
        let content = serde_json::to_string_pretty(record)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Load a record; a record without a filename takes the JSON file's name
    pub fn load(path: &Path) -> PipelineResult<ImageRecord> {
        let content = std::fs::read_to_string(path)?;
        let mut record: ImageRecord = serde_json::from_str(&content)?;
        if record.filename.is_empty() {
            record.filename = file_name(&path.with_extension(""));
        }
        Ok(record)
    }

    /// Fail on the first screenshot that has no stored record
    pub fn require_records(&self, images: &[PathBuf], stage: u8) -> PipelineResult<()> {
        match images.iter().map(|image| self.record_path(&file_name(image))).find(|path| !path.is_file()) {
            Some(path) => Err(PipelineError::MissingInput { stage, path }),
            None => Ok(()),
        }
    }

    /// Stored record files in natural order.
    ///
    /// A missing directory means the OCR stage never ran for this run.
    pub fn list(&self, stage: u8) -> PipelineResult<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(PipelineError::MissingInput {
                stage,
                path: self.root.clone(),
            });
        }
        Ok(list_files(&self.root, &["json".to_string()])?)
    }
}
