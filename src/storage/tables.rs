//! CSV tables: exported results and the human label source

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

use crate::analysis::{LabelSettings, LabelTable, MergedRow, TableRow};
use crate::error::{PipelineError, PipelineResult};

pub const FILTERED_ONLY_CSV: &str = "filtered_only.csv";
pub const FILTERED_UNFILTERED_CSV: &str = "filtered_unfiltered.csv";
pub const DIFF_CSV: &str = "filtered_unfiltered_diff.csv";
pub const MERGED_CSV: &str = "merged_results.csv";

const MERGED_HEADERS: &[&str] = &["filename", "unfiltered_text", "filtered_text", "human_labelled"];

/// Write rows under the row type's header, even when there are no rows
pub fn write_table<T: Serialize + TableRow>(path: &Path, rows: &[T]) -> PipelineResult<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(T::HEADERS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a table written by `write_table`
pub fn read_table<T: DeserializeOwned + TableRow>(path: &Path) -> PipelineResult<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)?;
    let found = header_names(&mut reader)?;

    for expected in T::HEADERS {
        if !found.iter().any(|h| h == expected) {
            return Err(PipelineError::SchemaMismatch {
                path: path.to_path_buf(),
                expected: expected.to_string(),
                found,
            });
        }
    }

    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Write merged rows, spelling out missing labels with `no_label_marker`
pub fn write_merged(path: &Path, rows: &[MergedRow], no_label_marker: &str) -> PipelineResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(MERGED_HEADERS)?;
    for row in rows {
        writer.write_record([
            row.filename.as_str(),
            row.unfiltered_text.as_str(),
            row.filtered_text.as_str(),
            row.human_labelled.as_deref().unwrap_or(no_label_marker),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Load human labels, checking both configured columns before reading rows
pub fn read_labels(path: &Path, settings: &LabelSettings) -> PipelineResult<LabelTable> {
    // Label rows may be ragged
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let found = header_names(&mut reader)?;

    let column = |name: &str| -> PipelineResult<usize> {
        found.iter().position(|h| h == name).ok_or_else(|| PipelineError::SchemaMismatch {
            path: path.to_path_buf(),
            expected: name.to_string(),
            found: found.clone(),
        })
    };
    let key_idx = column(&settings.key_column)?;
    let label_idx = column(&settings.label_column)?;

    let mut table = LabelTable::new();
    for record in reader.records() {
        let record = record?;
        let key = record.get(key_idx).unwrap_or_default();
        let label = record.get(label_idx).unwrap_or_default();
        table.insert(key, label);
    }
    Ok(table)
}

fn header_names<R: std::io::Read>(reader: &mut csv::Reader<R>) -> PipelineResult<Vec<String>> {
    Ok(reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect())
}
