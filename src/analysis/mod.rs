//! Analysis Layer
//!
//! Turns per-image filter results into the exported tables and reconciles
//! them with human labels.

pub mod evaluate;
pub mod merge;

pub use evaluate::evaluate;
pub use merge::{merge, LabelSettings, LabelTable, MergedRow};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::error::{PipelineError, PipelineResult};
use crate::sorting::natural_cmp;
use crate::vision::FilterResult;

/// What to do when two results share a filename
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// The later result replaces the earlier one
    #[default]
    LastWriteWins,
    /// Fail the aggregation
    Reject,
}

/// Export settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Duplicate filename handling
    pub duplicates: DuplicatePolicy,
}

/// Column layout of an exported table
pub trait TableRow {
    const HEADERS: &'static [&'static str];
}

/// `filtered_only` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredOnlyRow {
    pub filename: String,
    pub filtered_text: String,
}

impl TableRow for FilteredOnlyRow {
    const HEADERS: &'static [&'static str] = &["filename", "filtered_text"];
}

/// `filtered_unfiltered` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredUnfilteredRow {
    pub filename: String,
    pub unfiltered_text: String,
    pub filtered_text: String,
}

impl TableRow for FilteredUnfilteredRow {
    const HEADERS: &'static [&'static str] = &["filename", "unfiltered_text", "filtered_text"];
}

/// `filtered_unfiltered_diff` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffRow {
    pub filename: String,
    pub unfiltered_text: String,
    pub filtered_text: String,
    pub status_bar_text: String,
    pub keyboard_text: String,
}

impl TableRow for DiffRow {
    const HEADERS: &'static [&'static str] = &[
        "filename",
        "unfiltered_text",
        "filtered_text",
        "status_bar_text",
        "keyboard_text",
    ];
}

/// The three corpus-wide tables, rows in natural filename order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportTables {
    pub filtered_only: Vec<FilteredOnlyRow>,
    pub filtered_unfiltered: Vec<FilteredUnfilteredRow>,
    pub diff: Vec<DiffRow>,
}

impl ExportTables {
    pub fn len(&self) -> usize {
        self.diff.len()
    }
}

/// Collect per-image results into the export tables.
///
/// Input order only matters for duplicates; output rows are sorted by
/// natural filename order so parallel producers give identical tables.
pub fn aggregate<I>(results: I, policy: DuplicatePolicy) -> PipelineResult<ExportTables>
where
    I: IntoIterator<Item = (String, FilterResult)>,
{
    let mut by_name: HashMap<String, FilterResult> = HashMap::new();

    for (filename, result) in results {
        if by_name.contains_key(&filename) {
            match policy {
                DuplicatePolicy::Reject => return Err(PipelineError::DuplicateFilename { filename }),
                DuplicatePolicy::LastWriteWins => warn!("Duplicate result for '{}', keeping the later one", filename),
            }
        }
        by_name.insert(filename, result);
    }

    let mut entries: Vec<(String, FilterResult)> = by_name.into_iter().collect();
    entries.sort_by(|(a, _), (b, _)| natural_cmp(a, b));

    let mut tables = ExportTables::default();
    for (filename, r) in entries {
        tables.filtered_only.push(FilteredOnlyRow {
            filename: filename.clone(),
            filtered_text: r.filtered_text.clone(),
        });
        tables.filtered_unfiltered.push(FilteredUnfilteredRow {
            filename: filename.clone(),
            unfiltered_text: r.unfiltered_text.clone(),
            filtered_text: r.filtered_text.clone(),
        });
        tables.diff.push(DiffRow {
            filename,
            unfiltered_text: r.unfiltered_text,
            filtered_text: r.filtered_text,
            status_bar_text: r.status_bar_text,
            keyboard_text: r.keyboard_text,
        });
    }

    Ok(tables)
}
