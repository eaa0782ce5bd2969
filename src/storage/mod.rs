//! Storage Layer
//!
//! Per-image OCR records on disk, CSV tables, and the configuration directory.

pub mod store;
pub mod tables;

pub use store::StageStore;
pub use tables::{read_labels, read_table, write_merged, write_table};

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::sorting::natural_cmp;

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("org", "screenocr", "ScreenOcrPipeline")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Files in `dir` whose extension matches one of `extensions`
/// (case-insensitive), in natural filename order
pub fn list_files(dir: &Path, extensions: &[String]) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)));
        if matches {
            files.push(path);
        }
    }

    files.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));
    Ok(files)
}

/// Final path component as a string
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["shot_10.PNG", "shot_2.png", "notes.txt", "shot_1.jpg"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let extensions = vec!["png".to_string(), "jpg".to_string()];
        let files = list_files(dir.path(), &extensions).unwrap();
        let names: Vec<String> = files.iter().map(|p| file_name(p)).collect();

        assert_eq!(names, vec!["shot_1.jpg", "shot_2.png", "shot_10.PNG"]);
    }
}
