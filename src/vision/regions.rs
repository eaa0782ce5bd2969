//! Region classification
//!
//! Decides whether a fragment sits in the keyboard, the status bar or the
//! main content area of a portrait screenshot. Membership is decided by the
//! vertical center of the fragment's box. Keyboard wins over status bar,
//! status bar wins over content.

use serde::{Deserialize, Serialize};

use super::keyboard::{KeyboardDetector, KeyboardDetectorConfig};
use super::{BoundingBox, ImageDimensions};
use crate::error::{PipelineError, PipelineResult};

/// Region a fragment belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionLabel {
    Content,
    Keyboard,
    StatusBar,
}

/// Lower edge of the status bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusBarBoundary {
    /// Fraction of image height, measured from the top (0.0 - 1.0)
    Fraction(f64),
    /// Absolute pixels from the top
    Pixels(f64),
}

impl StatusBarBoundary {
    /// Boundary in pixels for an image of the given height
    pub fn limit_px(&self, image_height: f64) -> f64 {
        match *self {
            StatusBarBoundary::Fraction(f) => image_height * f,
            StatusBarBoundary::Pixels(px) => px,
        }
    }
}

impl Default for StatusBarBoundary {
    fn default() -> Self {
        StatusBarBoundary::Fraction(0.05)
    }
}

/// How the keyboard region is found
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyboardBoundary {
    /// Fixed band covering the bottom fraction of the image height
    BottomFraction(f64),
    /// Locate keyboard rows from the fragments themselves
    Detect(KeyboardDetectorConfig),
}

impl Default for KeyboardBoundary {
    fn default() -> Self {
        KeyboardBoundary::Detect(KeyboardDetectorConfig::default())
    }
}

/// Region boundaries for one image
#[derive(Debug, Clone, PartialEq)]
pub struct RegionConfig {
    /// Status bar boundary
    pub status_bar: StatusBarBoundary,
    /// Keyboard bands as (start, end) fractions of image height, inclusive
    pub keyboard_bands: Vec<(f64, f64)>,
}

impl RegionConfig {
    pub fn new(status_bar: StatusBarBoundary, keyboard_bands: Vec<(f64, f64)>) -> Self {
        Self {
            status_bar,
            keyboard_bands,
        }
    }

    /// Boundaries for an image, running keyboard detection when configured.
    ///
    /// `fragments` are (text, box) pairs that already passed the confidence
    /// threshold and geometry validation. Detection only looks at fragments
    /// below the status bar.
    pub fn resolve(
        status_bar: StatusBarBoundary,
        keyboard: &KeyboardBoundary,
        fragments: &[(&str, BoundingBox)],
        dims: ImageDimensions,
    ) -> Self {
        let keyboard_bands = match keyboard {
            KeyboardBoundary::BottomFraction(f) => {
                vec![((1.0 - f).clamp(0.0, 1.0), 1.0)]
            }
            KeyboardBoundary::Detect(detector_config) => {
                let limit = status_bar.limit_px(dims.height);
                let body: Vec<(&str, BoundingBox)> = fragments
                    .iter()
                    .filter(|(_, b)| b.center_y() > limit)
                    .copied()
                    .collect();
                KeyboardDetector::new(detector_config.clone()).detect_regions(&body, dims.height)
            }
        };

        Self::new(status_bar, keyboard_bands)
    }

    fn in_keyboard(&self, center_frac: f64) -> bool {
        self.keyboard_bands
            .iter()
            .any(|&(start, end)| start <= center_frac && center_frac <= end)
    }
}

/// Reject boxes that are empty or outside the image
pub fn validate_geometry(bbox: &BoundingBox, dims: ImageDimensions) -> PipelineResult<()> {
    if bbox.width() <= 0.0 || bbox.height() <= 0.0 {
        return Err(PipelineError::invalid_geometry(format!(
            "non-positive size {:.1}x{:.1}",
            bbox.width(),
            bbox.height()
        )));
    }

    if bbox.left < 0.0 || bbox.top < 0.0 || bbox.right > dims.width || bbox.bottom > dims.height {
        return Err(PipelineError::invalid_geometry(format!(
            "box ({:.1}, {:.1})-({:.1}, {:.1}) outside {}x{} image",
            bbox.left, bbox.top, bbox.right, bbox.bottom, dims.width, dims.height
        )));
    }

    Ok(())
}

/// Classify a fragment box into exactly one region
pub fn classify(bbox: &BoundingBox, dims: ImageDimensions, config: &RegionConfig) -> PipelineResult<RegionLabel> {
    validate_geometry(bbox, dims)?;

    let center = bbox.center_y();

    if config.in_keyboard(center / dims.height) {
        return Ok(RegionLabel::Keyboard);
    }

    if center <= config.status_bar.limit_px(dims.height) {
        return Ok(RegionLabel::StatusBar);
    }

    Ok(RegionLabel::Content)
}
