//! OCR collaborator
//!
//! Text recognition itself happens outside this crate. A `TextRecognizer`
//! turns one screenshot into fragments; `CommandRecognizer` runs an external
//! program that prints an image record as JSON.

pub mod command;

pub use command::CommandRecognizer;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::vision::Fragment;

/// Recognizes text in a single screenshot
pub trait TextRecognizer: Send + Sync {
    /// Fragments in detection order
    fn recognize(&self, image_path: &Path) -> Result<Vec<Fragment>>;
}

/// OCR stage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Program invoked once per image, with the image path as last argument
    pub command: Option<String>,
    /// Arguments placed before the image path
    pub args: Vec<String>,
    /// Screenshot file extensions, matched case-insensitively
    pub image_extensions: Vec<String>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            image_extensions: ["png", "jpg", "jpeg", "bmp"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Drop fragments below `min_confidence` or without visible text
pub fn clean_fragments(fragments: Vec<Fragment>, min_confidence: f64) -> Vec<Fragment> {
    fragments
        .into_iter()
        .filter(|f| f.confidence >= min_confidence && !f.text.trim().is_empty())
        .collect()
}
