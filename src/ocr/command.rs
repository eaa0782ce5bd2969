//! External OCR program runner

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;
use tracing::debug;

use super::{OcrSettings, TextRecognizer};
use crate::vision::{Fragment, ImageRecord};

/// Runs `<command> <args...> <image>` and parses the image record it prints
#[derive(Debug, Clone)]
pub struct CommandRecognizer {
    program: String,
    args: Vec<String>,
}

impl CommandRecognizer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Recognizer for the configured command, if there is one
    pub fn from_settings(settings: &OcrSettings) -> Option<Self> {
        settings
            .command
            .as_ref()
            .map(|program| Self::new(program.clone(), settings.args.clone()))
    }
}

impl TextRecognizer for CommandRecognizer {
    fn recognize(&self, image_path: &Path) -> Result<Vec<Fragment>> {
        debug!("Running {} on {:?}", self.program, image_path);

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(image_path)
            .output()
            .with_context(|| format!("Failed to start OCR command '{}'", self.program))?;

        if !output.status.success() {
            bail!(
                "OCR command '{}' exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let record: ImageRecord = serde_json::from_slice(&output.stdout)
            .with_context(|| format!("OCR command '{}' printed invalid JSON", self.program))?;

        Ok(record.fragments)
    }
}
