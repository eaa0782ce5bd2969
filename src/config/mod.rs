//! Pipeline Configuration
//!
//! Paths, thresholds and region boundaries stored in TOML format.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::analysis::{ExportSettings, LabelSettings};
use crate::ocr::OcrSettings;
use crate::vision::FilterSettings;

/// Pipeline settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Input and output locations
    pub paths: PathsConfig,
    /// Confidence threshold and region boundaries
    pub filter: FilterSettings,
    /// Table export settings
    pub export: ExportSettings,
    /// Human label source
    pub labels: LabelSettings,
    /// External OCR program
    pub ocr: OcrSettings,
}

/// Input and output locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Folder with screenshots
    pub input_dir: PathBuf,
    /// Folder with one OCR JSON record per screenshot
    pub ocr_data_dir: PathBuf,
    /// Folder receiving the CSV outputs
    pub output_dir: PathBuf,
    /// Human label CSV
    pub labels_csv: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("screenshot_data"),
            ocr_data_dir: PathBuf::from("OCR_data"),
            output_dir: PathBuf::from("."),
            labels_csv: PathBuf::from("human_labels.csv"),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: PipelineConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &PipelineConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::merge::JoinPolicy;
    use crate::analysis::DuplicatePolicy;
    use crate::vision::filter::FragmentOrder;
    use crate::vision::keyboard::KeyboardDetectorConfig;
    use crate::vision::regions::{KeyboardBoundary, StatusBarBoundary};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_pipeline_config() {
        let config = PipelineConfig::default();

        // Check filter defaults
        assert!((config.filter.min_confidence - 0.30).abs() < 1e-9);
        assert_eq!(config.filter.status_bar, StatusBarBoundary::Fraction(0.05));
        assert_eq!(config.filter.keyboard, KeyboardBoundary::Detect(KeyboardDetectorConfig::default()));
        assert_eq!(config.filter.order, FragmentOrder::Detection);

        // Check export and label defaults
        assert_eq!(config.export.duplicates, DuplicatePolicy::LastWriteWins);
        assert_eq!(config.labels.key_column, "filename");
        assert_eq!(config.labels.label_column, "label");
        assert_eq!(config.labels.join, JoinPolicy::Left);

        // Check path defaults
        assert_eq!(config.paths.ocr_data_dir, PathBuf::from("OCR_data"));
        assert!(config.ocr.command.is_none());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = PipelineConfig::default();

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: PipelineConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: PipelineConfig = toml::from_str(
            r#"
            [filter]
            min_confidence = 0.5
            keyboard = { bottom_fraction = 0.3 }

            [labels]
            key_column = "Screenshot Filename"
            join = "full_outer"
            "#,
        )
        .unwrap();

        assert!((parsed.filter.min_confidence - 0.5).abs() < 1e-9);
        assert_eq!(parsed.filter.keyboard, KeyboardBoundary::BottomFraction(0.3));
        assert_eq!(parsed.filter.status_bar, StatusBarBoundary::Fraction(0.05));
        assert_eq!(parsed.labels.key_column, "Screenshot Filename");
        assert_eq!(parsed.labels.label_column, "label");
        assert_eq!(parsed.labels.join, JoinPolicy::FullOuter);
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = PipelineConfig::default();
        config.ocr.command = Some("easyocr-json".to_string());
        config.filter.status_bar = StatusBarBoundary::Pixels(96.0);

        let temp_file = NamedTempFile::new().unwrap();
        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}
