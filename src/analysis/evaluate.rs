//! Accuracy of OCR text against human labels

use super::MergedRow;

/// Similarity of OCR output to labels over labelled rows
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EvaluationSummary {
    /// Rows with a human label
    pub labelled: usize,
    /// Rows without one
    pub unlabelled: usize,
    /// Mean normalized Levenshtein similarity of filtered text (0.0 - 1.0)
    pub filtered_similarity: f64,
    /// Mean normalized Levenshtein similarity of unfiltered text (0.0 - 1.0)
    pub unfiltered_similarity: f64,
    /// Rows where filtering moved the text closer to the label
    pub improved: usize,
}

/// Lowercase and collapse whitespace before comparing
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn similarity(ocr: &str, label: &str) -> f64 {
    strsim::normalized_levenshtein(&normalize(ocr), &normalize(label))
}

/// Compare filtered and unfiltered text with the human labels
pub fn evaluate(rows: &[MergedRow]) -> EvaluationSummary {
    let mut summary = EvaluationSummary::default();
    let mut filtered_total = 0.0;
    let mut unfiltered_total = 0.0;

    for row in rows {
        let Some(label) = &row.human_labelled else {
            summary.unlabelled += 1;
            continue;
        };

        let filtered = similarity(&row.filtered_text, label);
        let unfiltered = similarity(&row.unfiltered_text, label);

        summary.labelled += 1;
        filtered_total += filtered;
        unfiltered_total += unfiltered;
        if filtered > unfiltered {
            summary.improved += 1;
        }
    }

    if summary.labelled > 0 {
        summary.filtered_similarity = filtered_total / summary.labelled as f64;
        summary.unfiltered_similarity = unfiltered_total / summary.labelled as f64;
    }

    summary
}
