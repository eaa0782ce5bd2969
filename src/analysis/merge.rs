//! Human label reconciliation
//!
//! Joins the `filtered_unfiltered` table with externally maintained labels by
//! exact filename.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use super::FilteredUnfilteredRow;
use crate::sorting::natural_cmp;

/// Join semantics between OCR rows and labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinPolicy {
    /// Every OCR row, labelled or not
    #[default]
    Left,
    /// Only OCR rows that have a label
    Inner,
    /// Every OCR row plus labels that have no OCR row
    FullOuter,
}

/// Label source settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelSettings {
    /// Column holding the screenshot filename
    pub key_column: String,
    /// Column holding the human label
    pub label_column: String,
    /// Join semantics
    pub join: JoinPolicy,
    /// Written in place of a missing label
    pub no_label_marker: String,
}

impl Default for LabelSettings {
    fn default() -> Self {
        Self {
            key_column: "filename".to_string(),
            label_column: "label".to_string(),
            join: JoinPolicy::Left,
            no_label_marker: "<no label>".to_string(),
        }
    }
}

/// Human labels keyed by filename
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelTable {
    labels: HashMap<String, String>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a label; a repeated filename replaces the earlier label
    pub fn insert(&mut self, filename: impl Into<String>, label: impl Into<String>) {
        let filename = filename.into();
        if let Some(previous) = self.labels.insert(filename.clone(), label.into()) {
            warn!("Label for '{}' given more than once, dropping {:?}", filename, previous);
        }
    }

    pub fn get(&self, filename: &str) -> Option<&str> {
        self.labels.get(filename).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Filenames in natural order
    pub fn filenames(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.labels.keys().map(String::as_str).collect();
        names.sort_by(|a, b| natural_cmp(a, b));
        names
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelTable {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut table = LabelTable::new();
        for (k, v) in iter {
            table.insert(k, v);
        }
        table
    }
}

/// OCR row reconciled with its human label
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub filename: String,
    pub unfiltered_text: String,
    pub filtered_text: String,
    /// `None` when no label matched
    pub human_labelled: Option<String>,
}

impl MergedRow {
    pub fn is_labelled(&self) -> bool {
        self.human_labelled.is_some()
    }
}

/// Merge OCR rows with labels.
///
/// Each OCR filename appears at most once; when the table holds it twice the
/// later row's texts are kept at the earlier row's position.
pub fn merge(rows: &[FilteredUnfilteredRow], labels: &LabelTable, join: JoinPolicy) -> Vec<MergedRow> {
    let mut merged: Vec<MergedRow> = Vec::with_capacity(rows.len());
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for row in rows {
        let entry = MergedRow {
            filename: row.filename.clone(),
            unfiltered_text: row.unfiltered_text.clone(),
            filtered_text: row.filtered_text.clone(),
            human_labelled: labels.get(&row.filename).map(str::to_string),
        };

        match positions.get(row.filename.as_str()) {
            Some(&pos) => {
                warn!("'{}' appears more than once in OCR rows, keeping the later row", row.filename);
                merged[pos] = entry;
            }
            None => {
                positions.insert(row.filename.as_str(), merged.len());
                merged.push(entry);
            }
        }
    }

    let unmatched = merged.iter().filter(|r| !r.is_labelled()).count();
    debug!("Merge: {} OCR rows, {} without label", merged.len(), unmatched);

    match join {
        JoinPolicy::Left => {}
        JoinPolicy::Inner => merged.retain(MergedRow::is_labelled),
        JoinPolicy::FullOuter => {
            let seen: HashSet<&str> = rows.iter().map(|r| r.filename.as_str()).collect();
            let label_only: Vec<MergedRow> = labels
                .filenames()
                .into_iter()
                .filter(|name| !seen.contains(name))
                .map(|name| MergedRow {
                    filename: name.to_string(),
                    unfiltered_text: String::new(),
                    filtered_text: String::new(),
                    human_labelled: labels.get(name).map(str::to_string),
                })
                .collect();
            merged.extend(label_only);
        }
    }

    merged
}
