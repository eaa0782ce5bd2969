//! Text filtering
//!
//! Splits one image's fragments into content, status-bar and keyboard text.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::regions::{classify, validate_geometry, KeyboardBoundary, RegionConfig, RegionLabel, StatusBarBoundary};
use super::{BoundingBox, Fragment, ImageRecord};

/// Separator placed between joined fragment texts
const JOIN_SEPARATOR: &str = " ";

/// Order of fragments inside each joined text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentOrder {
    /// Order the recognizer reported them in
    #[default]
    Detection,
    /// Top-to-bottom, then left-to-right
    Reading,
}

/// Filtering parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Fragments below this confidence are dropped entirely (0.0 - 1.0)
    pub min_confidence: f64,
    /// Status bar boundary
    pub status_bar: StatusBarBoundary,
    /// Keyboard boundary
    pub keyboard: KeyboardBoundary,
    /// Fragment order within joined texts
    pub order: FragmentOrder,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            min_confidence: 0.30,
            status_bar: StatusBarBoundary::default(),
            keyboard: KeyboardBoundary::default(),
            order: FragmentOrder::Detection,
        }
    }
}

/// Joined texts for one image.
///
/// Every fragment that passed the threshold and has valid geometry is in
/// `unfiltered_text` and in exactly one of the other three.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterResult {
    pub unfiltered_text: String,
    pub filtered_text: String,
    pub status_bar_text: String,
    pub keyboard_text: String,
    /// Fragments in `filtered_text`
    pub content_count: usize,
    /// Fragments in `status_bar_text`
    pub status_bar_count: usize,
    /// Fragments in `keyboard_text`
    pub keyboard_count: usize,
    /// Fragments dropped for malformed geometry
    pub skipped: usize,
}

impl FilterResult {
    /// Fragments that made it into `unfiltered_text`
    pub fn unfiltered_count(&self) -> usize {
        self.content_count + self.status_bar_count + self.keyboard_count
    }

    pub fn has_keyboard(&self) -> bool {
        self.keyboard_count > 0
    }

    pub fn has_status_bar(&self) -> bool {
        self.status_bar_count > 0
    }
}

/// Filter one image's fragments
pub fn filter(record: &ImageRecord, settings: &FilterSettings) -> FilterResult {
    // NaN confidence counts as below threshold
    let confident: Vec<&Fragment> = record
        .fragments
        .iter()
        .filter(|f| f.confidence >= settings.min_confidence)
        .collect();

    let dims = record.dimensions_for(confident.iter().copied());

    let mut skipped = 0;
    let mut valid: Vec<(&Fragment, BoundingBox)> = Vec::with_capacity(confident.len());
    for (index, fragment) in confident.into_iter().enumerate() {
        match fragment.bbox.bounds().and_then(|b| validate_geometry(&b, dims).map(|_| b)) {
            Ok(bbox) => valid.push((fragment, bbox)),
            Err(e) => {
                warn!("{}: skipping fragment {} ({:?}): {}", record.filename, index, fragment.text, e);
                skipped += 1;
            }
        }
    }

    if settings.order == FragmentOrder::Reading {
        valid.sort_by(|(_, a), (_, b)| a.top.total_cmp(&b.top).then(a.left.total_cmp(&b.left)));
    }

    let boxes: Vec<(&str, BoundingBox)> = valid.iter().map(|(f, b)| (f.text.as_str(), *b)).collect();
    let regions = RegionConfig::resolve(settings.status_bar, &settings.keyboard, &boxes, dims);

    let mut labelled: Vec<(&Fragment, RegionLabel)> = Vec::with_capacity(valid.len());
    for (fragment, bbox) in &valid {
        match classify(bbox, dims, &regions) {
            Ok(label) => labelled.push((*fragment, label)),
            Err(e) => {
                warn!("{}: skipping fragment {:?}: {}", record.filename, fragment.text, e);
                skipped += 1;
            }
        }
    }

    let (filtered_text, content_count) = join_region(&labelled, Some(RegionLabel::Content));
    let (status_bar_text, status_bar_count) = join_region(&labelled, Some(RegionLabel::StatusBar));
    let (keyboard_text, keyboard_count) = join_region(&labelled, Some(RegionLabel::Keyboard));
    let (unfiltered_text, _) = join_region(&labelled, None);

    FilterResult {
        unfiltered_text,
        filtered_text,
        status_bar_text,
        keyboard_text,
        content_count,
        status_bar_count,
        keyboard_count,
        skipped,
    }
}

/// Join the texts of one region (all regions for `None`), returning the
/// number of fragments that region holds
fn join_region(labelled: &[(&Fragment, RegionLabel)], region: Option<RegionLabel>) -> (String, usize) {
    let members: Vec<&Fragment> = labelled
        .iter()
        .filter(|(_, label)| region.map_or(true, |r| r == *label))
        .map(|(fragment, _)| *fragment)
        .collect();

    let text = members
        .iter()
        .map(|f| f.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(JOIN_SEPARATOR);

    (text, members.len())
}
